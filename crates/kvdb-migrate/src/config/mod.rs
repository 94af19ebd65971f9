//! Configuration loading and validation.

mod node;
mod types;
mod validation;

pub use node::{node_config_path, read_db_backend, update_db_backend};
pub use types::*;

use crate::error::Result;

impl MigrationConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: MigrationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}
