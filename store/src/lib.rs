pub mod db;
pub mod model;
pub mod repository;
pub mod schema;
pub mod sqlx_repository;

pub use db::Db;
pub use model::{FilterSpec, FoundItem, MonitoringTask, ParsedListing, Proxy, StickerFilter, StickerInfo};
pub use repository::{FoundItemRepository, ProxyRepository, SettingsRepository, TaskRepository};
pub use sqlx_repository::{
    SqlxFoundItemRepository, SqlxProxyRepository, SqlxSettingsRepository, SqlxTaskRepository,
};
