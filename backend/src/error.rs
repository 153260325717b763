use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("startup failed: {0}")]
    Startup(String),
}
