use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Api {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    5
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Storage {
    pub dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub api: Api,
    #[serde(default)]
    pub storage: Storage,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config.toml").required(false))
            .add_source(Environment::with_prefix("COFRE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
