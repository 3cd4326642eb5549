pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod telemetry;

pub use config::{PolicyAideConfig, CONFIG_CANDIDATES};
pub use error::PolicyAideError;
