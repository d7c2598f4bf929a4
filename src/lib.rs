pub mod app;
pub mod config;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod health_monitor;
pub mod middleware;
pub mod relay;
pub mod store;
pub mod streaming;
pub mod types;
pub mod upstream;

pub use app::{build_router, AppState};
pub use config::AppConfig;
pub use error::ApiError;
