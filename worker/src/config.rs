use std::{env, num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use url::Url;

use crate::error::ConfigErr;

const API_BASE_URL: &str = "FLORA_API_BASE_URL";
const WS_URL: &str = "FLORA_WS_URL";
const TOKEN: &str = "FLORA_TOKEN";
const DATA_DIR: &str = "FLORA_DATA_DIR";
const EPOCHS: &str = "FLORA_EPOCHS";
const BATCH_SIZE: &str = "FLORA_BATCH_SIZE";
const LOG_INTERVAL_MS: &str = "FLORA_LOG_INTERVAL_MS";

const DEFAULT_DATA_DIR: &str = "./flora-data";
const DEFAULT_EPOCHS: usize = 5;
const DEFAULT_BATCH_SIZE: usize = 4;
const DEFAULT_LOG_INTERVAL_MS: u64 = 100;

/// Everything the client needs to join the coordinator's rounds.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    api_base: Url,
    ws_base: String,
    token: String,
    data_dir: PathBuf,
    epochs: NonZeroUsize,
    batch_size: NonZeroUsize,
    log_interval: Duration,
}

impl ClientConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigErr> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Arguments
    /// * `lookup` - Returns the value of a variable, if it's set.
    ///
    /// # Returns
    /// The configuration or the first missing or malformed variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigErr>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |var: &'static str| lookup(var).ok_or(ConfigErr::Missing(var));

        let raw_base = require(API_BASE_URL)?;
        let api_base = Url::parse(&raw_base).map_err(|_| ConfigErr::Invalid {
            var: API_BASE_URL,
            value: raw_base,
        })?;

        let epochs = parse_or(&lookup, EPOCHS, NonZeroUsize::new(DEFAULT_EPOCHS))?;
        let batch_size = parse_or(&lookup, BATCH_SIZE, NonZeroUsize::new(DEFAULT_BATCH_SIZE))?;
        let log_interval_ms = parse_or(&lookup, LOG_INTERVAL_MS, Some(DEFAULT_LOG_INTERVAL_MS))?;

        Ok(Self {
            api_base,
            ws_base: require(WS_URL)?,
            token: require(TOKEN)?,
            data_dir: lookup(DATA_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            epochs,
            batch_size,
            log_interval: Duration::from_millis(log_interval_ms),
        })
    }

    /// The coordinator's http api base url.
    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// The coordinator's websocket host.
    pub fn ws_base(&self) -> &str {
        &self.ws_base
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// The directory holding every user's local store.
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// The amount of local epochs per round.
    pub fn epochs(&self) -> NonZeroUsize {
        self.epochs
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    /// The minimum time between two status flushes.
    pub fn log_interval(&self) -> Duration {
        self.log_interval
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: Option<T>) -> Result<T, ConfigErr>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let invalid = |value: String| ConfigErr::Invalid { var, value };

    match lookup(var) {
        Some(raw) => raw.trim().parse().map_err(|_| invalid(raw)),
        None => default.ok_or_else(|| invalid(String::new())),
    }
}
