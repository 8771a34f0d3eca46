pub mod application;
pub mod collector;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fsutil;
pub mod scheduler;
pub mod vault;

#[cfg(test)]
mod testing;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
