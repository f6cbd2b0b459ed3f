pub mod error;
pub mod config;
pub mod util;
pub mod assistant;
pub mod db;
pub mod service;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
