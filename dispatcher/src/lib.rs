pub mod constants;
pub mod dispatcher;
pub mod executor;

pub use constants::*;
pub use dispatcher::{run_maintenance_gc, run_sweep_loop, run_worker_loop};
pub use executor::TaskExecutor;
