//! Runtime configuration for a NoobCash peer.
//!
//! Builder-with-validated-defaults shape follows
//! `0x000NULL-obscura2.0/core/src/config.rs`; the specific knobs (`N`,
//! `CAPACITY`, `MINING_DIFFICULTY`, `BOOTSTRAP_IP`/`BOOTSTRAP_PORT`) come
//! from `original_source/app.py`'s startup arguments.

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_NODE_COUNT: usize = 5;
pub const DEFAULT_CAPACITY: usize = 10;
pub const DEFAULT_MINING_DIFFICULTY: usize = 4;
pub const DEFAULT_TOTAL_SUPPLY: u64 = 1_000_000;

/// Network-wide parameters every peer must agree on, plus this peer's own
/// bootstrap address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Expected size of the ring. The bootstrap peer waits for this many
    /// registrations before broadcasting the ring and seeding transactions.
    pub node_count: usize,
    /// Number of transactions a block holds before mining starts.
    pub capacity: usize,
    /// Required leading hex zero digits in an accepted block's hash.
    pub mining_difficulty: usize,
    /// Total NBCs minted to the bootstrap peer in the genesis block.
    pub total_supply: u64,
    /// Address of the bootstrap peer, used by every other peer to register.
    pub bootstrap_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_count: DEFAULT_NODE_COUNT,
            capacity: DEFAULT_CAPACITY,
            mining_difficulty: DEFAULT_MINING_DIFFICULTY,
            total_supply: DEFAULT_TOTAL_SUPPLY,
            bootstrap_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5000),
        }
    }
}

impl Config {
    /// Loads configuration from the process environment, falling back to
    /// defaults for anything unset. `BOOTSTRAP_IP`/`BOOTSTRAP_PORT` must
    /// either both be set or both be absent.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = env_var("N")? {
            config.node_count = parse(v, "N")?;
        }
        if let Some(v) = env_var("CAPACITY")? {
            config.capacity = parse(v, "CAPACITY")?;
        }
        if let Some(v) = env_var("MINING_DIFFICULTY")? {
            config.mining_difficulty = parse(v, "MINING_DIFFICULTY")?;
        }
        if let Some(v) = env_var("TOTAL_SUPPLY")? {
            config.total_supply = parse(v, "TOTAL_SUPPLY")?;
        }

        let ip = env_var("BOOTSTRAP_IP")?;
        let port = env_var("BOOTSTRAP_PORT")?;
        match (ip, port) {
            (Some(ip), Some(port)) => {
                let ip: IpAddr = parse(ip, "BOOTSTRAP_IP")?;
                let port: u16 = parse(port, "BOOTSTRAP_PORT")?;
                config.bootstrap_addr = SocketAddr::new(ip, port);
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::Invalid {
                    name: "BOOTSTRAP_IP/BOOTSTRAP_PORT",
                    value: "must both be set or both be absent".into(),
                })
            }
        }

        if config.node_count < 1 {
            return Err(ConfigError::Invalid { name: "N", value: config.node_count.to_string() });
        }
        if config.capacity < 1 {
            return Err(ConfigError::Invalid { name: "CAPACITY", value: config.capacity.to_string() });
        }
        if config.mining_difficulty < 1 {
            return Err(ConfigError::Invalid {
                name: "MINING_DIFFICULTY",
                value: config.mining_difficulty.to_string(),
            });
        }

        Ok(config)
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

fn env_var(name: &'static str) -> Result<Option<String>, ConfigError> {
    match env::var(name) {
        Ok(v) => Ok(Some(v)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => {
            Err(ConfigError::Invalid { name, value: "<non-unicode>".into() })
        }
    }
}

fn parse<T: std::str::FromStr>(raw: String, name: &'static str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid { name, value: raw })
}

/// Fluent builder for [`Config`], for callers constructing one in-process
/// (tests, the loopback demo) rather than from the environment.
pub struct ConfigBuilder {
    inner: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self { inner: Config::default() }
    }

    pub fn node_count(mut self, n: usize) -> Self {
        self.inner.node_count = n;
        self
    }

    pub fn capacity(mut self, c: usize) -> Self {
        self.inner.capacity = c;
        self
    }

    pub fn mining_difficulty(mut self, d: usize) -> Self {
        self.inner.mining_difficulty = d;
        self
    }

    pub fn total_supply(mut self, s: u64) -> Self {
        self.inner.total_supply = s;
        self
    }

    pub fn bootstrap_addr(mut self, addr: SocketAddr) -> Self {
        self.inner.bootstrap_addr = addr;
        self
    }

    pub fn finish(self) -> Config {
        self.inner
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let config = Config::default();
        assert_eq!(config.node_count, DEFAULT_NODE_COUNT);
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn builder_overrides_selected_fields() {
        let config = Config::builder().capacity(3).mining_difficulty(2).finish();
        assert_eq!(config.capacity, 3);
        assert_eq!(config.mining_difficulty, 2);
        assert_eq!(config.node_count, DEFAULT_NODE_COUNT);
    }

    #[test]
    fn from_env_rejects_zero_node_count() {
        let _guard = EnvGuard::set("N", "0");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "N", .. }));
    }

    #[test]
    fn from_env_rejects_zero_capacity() {
        let _guard = EnvGuard::set("CAPACITY", "0");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "CAPACITY", .. }));
    }

    #[test]
    fn from_env_rejects_zero_mining_difficulty() {
        let _guard = EnvGuard::set("MINING_DIFFICULTY", "0");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "MINING_DIFFICULTY", .. }));
    }

    /// Sets an environment variable for the duration of the test and
    /// restores its previous value on drop. `Config::from_env` reads the
    /// real process environment, and `cargo test` runs a crate's tests in
    /// one process, so mutating `env` here must be scoped and serialised
    /// against the other `from_env` tests in this module.
    struct EnvGuard {
        name: &'static str,
        previous: Option<String>,
        _lock: std::sync::MutexGuard<'static, ()>,
    }

    impl EnvGuard {
        fn set(name: &'static str, value: &str) -> Self {
            static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let previous = env::var(name).ok();
            env::set_var(name, value);
            Self { name, previous, _lock: lock }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(v) => env::set_var(self.name, v),
                None => env::remove_var(self.name),
            }
        }
    }
}
