pub mod admission;
pub mod clock;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod store;
pub mod web;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
