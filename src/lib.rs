pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod quote;
pub mod storage;
pub mod ui;
pub mod utils;

pub use cache::{CacheOptions, CacheState, QuoteCache};
pub use error::{AppError, Result};
