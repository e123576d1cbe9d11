pub mod aggregate;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod stream;
