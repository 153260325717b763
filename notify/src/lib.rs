pub mod dispatcher;
pub mod telegram;
pub mod types;

pub use dispatcher::{NoopNotificationDispatcher, NotificationDispatcher};
pub use telegram::TelegramNotifier;
pub use types::MatchFoundEvent;
