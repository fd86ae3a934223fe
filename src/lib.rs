pub mod commands;
pub mod database;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use error::{EngineError, EngineResult};
