//! YAML configuration
//!
//! ```yaml
//! username: N0CALL
//! password: secret
//! load_recent: 20
//! auto_advance: true
//! bands: { 20m: true, 6m: false }
//! sources: { pota: true, cluster: false }
//! rig: { address: "localhost:4532" }
//! wavelog: { url: "https://log.example.org", key: "wl123", radio: "IC-705" }
//! ```

use crate::client::ClientOptions;
use crate::filter::{FilterError, FilterSet};
use crate::rig::DEFAULT_RIGCTLD_ADDRESS;
use crate::scheduler::DEFAULT_MIN_INTERVAL;
use crate::session::{Credentials, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_LOAD_RECENT};
use crate::transport::tcp::{DEFAULT_HOST, DEFAULT_PORT};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot read {0}: {1}")]
    Read(String, #[source] std::io::Error),
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("invalid value for {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    /// Recent spots to replay after login, 0 to disable.
    pub load_recent: u32,
    pub auto_advance: bool,
    /// Seconds.
    pub min_advance_interval: f64,
    /// Seconds.
    pub handshake_timeout: f64,
    pub bands: BTreeMap<String, bool>,
    pub sources: BTreeMap<String, bool>,
    pub rig: Option<RigConfig>,
    pub wavelog: Option<WavelogConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RigConfig {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WavelogConfig {
    pub url: String,
    pub key: String,
    pub radio: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            username: String::new(),
            password: String::new(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            load_recent: DEFAULT_LOAD_RECENT,
            auto_advance: false,
            min_advance_interval: DEFAULT_MIN_INTERVAL.as_secs_f64(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT.as_secs_f64(),
            bands: BTreeMap::new(),
            sources: BTreeMap::new(),
            rig: None,
            wavelog: None,
        }
    }
}

impl Default for RigConfig {
    fn default() -> Self {
        RigConfig {
            address: DEFAULT_RIGCTLD_ADDRESS.to_string(),
        }
    }
}

fn seconds(value: f64, name: &'static str) -> Result<Duration, Error> {
    if !(value.is_finite() && value > 0.0) {
        return Err(Error::Invalid(name));
    }
    Duration::try_from_secs_f64(value).map_err(|_| Error::Invalid(name))
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Config, Error> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Read(path.display().to_string(), e))?;
        Config::from_yaml(&text)
    }

    fn validate(&self) -> Result<(), Error> {
        self.min_advance_interval()?;
        self.handshake_timeout()?;
        // Catches unknown band/source names early.
        self.filters()?;
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn min_advance_interval(&self) -> Result<Duration, Error> {
        seconds(self.min_advance_interval, "min_advance_interval")
    }

    pub fn handshake_timeout(&self) -> Result<Duration, Error> {
        seconds(self.handshake_timeout, "handshake_timeout")
    }

    /// Initial filter state.
    pub fn filters(&self) -> Result<FilterSet, Error> {
        let filters = FilterSet::new();
        for (band, allowed) in &self.bands {
            filters.set_band(band, Some(*allowed))?;
        }
        for (source, allowed) in &self.sources {
            filters.set_source(source, Some(*allowed))?;
        }
        Ok(filters)
    }

    pub fn client_options(&self) -> Result<ClientOptions, Error> {
        let mut options = ClientOptions::new(
            self.address(),
            Credentials::new(self.username.clone(), self.password.clone()),
        );
        options.load_recent = Some(self.load_recent);
        options.handshake_timeout = self.handshake_timeout()?;
        Ok(options)
    }
}
