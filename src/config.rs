use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::engine::ConditionManagerConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node_name: String,
    pub api_server: String,
    /// Read from the file or environment, never written back out.
    #[serde(skip_serializing)]
    pub bearer_token: Option<String>,
    pub listen_address: IpAddr,
    pub port: u16,
    pub tick_period_secs: u64,
    pub resync_period_secs: u64,
    pub heartbeat_period_secs: u64,
    pub update_timeout_secs: u64,
    /// Component name attached to emitted events.
    pub event_source: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            api_server: "https://127.0.0.1:6443".to_string(),
            bearer_token: None,
            listen_address: IpAddr::from([127, 0, 0, 1]),
            port: 20256,
            tick_period_secs: 1,
            resync_period_secs: 10,
            heartbeat_period_secs: 60,
            update_timeout_secs: 30,
            event_source: "nodewatch".to_string(),
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(node_name) = lookup("NODE_NAME").or_else(|| lookup("NODEWATCH_NODE_NAME")) {
            self.node_name = node_name;
        }
        if let Some(api_server) = lookup("NODEWATCH_API_SERVER") {
            self.api_server = api_server;
        }
        if let Some(token) = lookup("NODEWATCH_BEARER_TOKEN") {
            self.bearer_token = Some(token);
        }
        if let Some(address) = lookup("NODEWATCH_LISTEN_ADDRESS") {
            self.listen_address = address
                .parse()
                .with_context(|| format!("NODEWATCH_LISTEN_ADDRESS: invalid address {}", address))?;
        }
        if let Some(port) = lookup("NODEWATCH_PORT") {
            self.port = port
                .parse()
                .with_context(|| format!("NODEWATCH_PORT: invalid port {}", port))?;
        }
        for (key, field) in [
            ("NODEWATCH_TICK_PERIOD_SECS", &mut self.tick_period_secs),
            ("NODEWATCH_RESYNC_PERIOD_SECS", &mut self.resync_period_secs),
            ("NODEWATCH_HEARTBEAT_PERIOD_SECS", &mut self.heartbeat_period_secs),
            ("NODEWATCH_UPDATE_TIMEOUT_SECS", &mut self.update_timeout_secs),
        ] {
            if let Some(value) = lookup(key) {
                *field = value
                    .parse()
                    .with_context(|| format!("{}: expected seconds, got {}", key, value))?;
            }
        }
        if let Some(source) = lookup("NODEWATCH_EVENT_SOURCE") {
            self.event_source = source;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_name.trim().is_empty() {
            bail!("node name is required (set NODE_NAME or --node-name)");
        }
        if self.tick_period_secs == 0
            || self.resync_period_secs == 0
            || self.heartbeat_period_secs == 0
            || self.update_timeout_secs == 0
        {
            bail!("tick, resync, heartbeat and update timeout periods must be positive");
        }
        if self.heartbeat_period_secs < self.resync_period_secs {
            bail!(
                "heartbeat period ({}s) must not be shorter than resync period ({}s)",
                self.heartbeat_period_secs,
                self.resync_period_secs
            );
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.port)
    }

    pub fn condition_manager(&self) -> ConditionManagerConfig {
        ConditionManagerConfig {
            tick_period: Duration::from_secs(self.tick_period_secs),
            resync_period: Duration::from_secs(self.resync_period_secs),
            heartbeat_period: Duration::from_secs(self.heartbeat_period_secs),
            update_timeout: Duration::from_secs(self.update_timeout_secs),
        }
    }
}
