pub mod config;

use std::path::PathBuf;

pub use config::{AppConfig, ConfigError, Environment};

/// Loads `.env` into the process environment and returns the file used.
/// A missing or unreadable file leaves the environment untouched.
pub fn load_env_file() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}
