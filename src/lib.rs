pub mod cli;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use error::AppError;
pub use models::Config;
