use anyhow::Result;
use config::{Config, Environment, File};
use log::LevelFilter;
use serde::Deserialize;

use crate::api::Network;

pub const CONFIG_FILE: &str = "tipster";
pub const ENV_PREFIX: &str = "TIPSTER";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub port: u16,
    /// sqlx connection string, in-memory when unset
    pub db: Option<String>,
    pub admins: Vec<String>,
    pub cache_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub network: Network,
    /// Solana account token payments must be sent to.
    pub treasury: Option<String>,
    pub log_level: String,
    /// Grants root to every caller and accepts every payment.
    pub test: bool,
}
impl Settings {
    /// Defaults, then `tipster.toml` (or `path`) if present, then `TIPSTER_*`
    /// environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let settings = Config::builder()
            .set_default("port", 8081)?
            .set_default("admins", Vec::<String>::new())?
            .set_default("cache_ttl_secs", 60)?
            .set_default("request_timeout_secs", 30)?
            .set_default("network", "devnet")?
            .set_default("log_level", "debug")?
            .set_default("test", false)?
            .add_source(File::with_name(path.unwrap_or(CONFIG_FILE)).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("admins"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Debug)
    }
}
