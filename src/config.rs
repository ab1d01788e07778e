//! YAML configuration
//!
//! ```yaml
//! connect_timeout: 10     # seconds, 0 = default, negative = no timeout
//! keepalive_period: 60    # seconds, 0 = default, negative = disabled
//! auths:
//!   bob: secret           # plaintext, hashed at startup
//! as_cluster:
//!   "10\\.0\\.0\\.5:3000": "proxy.local:3000"
//! ```

use crate::auth::CredentialStore;
use crate::error::{ProxyError, Result};
use crate::proxy::{DEFAULT_DIAL_TIMEOUT, DEFAULT_KEEPALIVE_PERIOD};
use crate::topology::ClusterMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Config is the validated content of the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend dial timeout in seconds
    pub connect_timeout: i64,

    /// TCP keep-alive period in seconds
    pub keepalive_period: i64,

    /// User name to plaintext password
    pub auths: BTreeMap<String, String>,

    /// Backend address pattern to proxy address
    pub as_cluster: BTreeMap<String, String>,
}

/// Config implementation block
impl Config {
    /// validate rejects entries that can never match anything
    pub fn validate(&self) -> Result<()> {
        if self.auths.keys().any(|user| user.is_empty()) {
            return Err(ProxyError::Config("auths: empty user name".into()));
        }
        let blank = self
            .as_cluster
            .iter()
            .find(|(pattern, addr)| pattern.is_empty() || addr.is_empty());
        if let Some((pattern, _)) = blank {
            return Err(ProxyError::Config(format!(
                "as_cluster: empty pattern or address in entry {pattern:?}"
            )));
        }
        Ok(())
    }

    /// connect_timeout resolves the configured dial timeout
    pub fn connect_timeout(&self) -> Option<Duration> {
        resolve_seconds(self.connect_timeout, DEFAULT_DIAL_TIMEOUT)
    }

    /// keepalive_period resolves the configured keep-alive period
    pub fn keepalive_period(&self) -> Option<Duration> {
        resolve_seconds(self.keepalive_period, DEFAULT_KEEPALIVE_PERIOD)
    }

    /// credential_store hashes every configured password
    pub fn credential_store(&self) -> Result<CredentialStore> {
        CredentialStore::from_passwords(&self.auths)
    }

    /// cluster_map compiles every configured backend pattern
    pub fn cluster_map(&self) -> Result<ClusterMap> {
        ClusterMap::from_patterns(&self.as_cluster)
    }
}

/// resolve_seconds maps 0 to `default` and negative values to None
fn resolve_seconds(secs: i64, default: Duration) -> Option<Duration> {
    match secs {
        0 => Some(default),
        s if s < 0 => None,
        s => Some(Duration::from_secs(s as u64)),
    }
}

/// Load configuration from a YAML file
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(ProxyError::Config(format!(
            "config file {} does not exist",
            path.display()
        )));
    }
    let contents = std::fs::read_to_string(path)?;
    load_config_from_str(&contents)
}

/// Load configuration from a YAML string
pub fn load_config_from_str(yaml: &str) -> Result<Config> {
    let config: Config = if yaml.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(yaml)?
    };
    config.validate()?;
    Ok(config)
}
