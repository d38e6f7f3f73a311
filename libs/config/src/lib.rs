//! # Runtime Configuration
//!
//! One [`RuntimeConfig`] describes a node: how actions are encoded, how the
//! dispatcher routes them, where the UDP socket binds and how logging is set
//! up. Every section has defaults, so an empty file is a valid configuration.
//!
//! ```toml
//! [wire]
//! endianness = "little"
//! length_prefix = "u32"
//!
//! [dispatch]
//! route_policy = "first_match"
//! unknown_action = "drop_and_log"
//!
//! [transport]
//! bind_address = "0.0.0.0:7400"
//! peer = "10.0.0.2:7400"
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! [`RuntimeConfig::load`] layers environment variables over the file:
//! `WEFT_DISPATCH__MAX_BATCH=16` overrides `dispatch.max_batch`.

use actors::{DispatchOptions, RoutePolicy, UnknownActionPolicy};
use anyhow::{bail, Context, Result};
use codec::WireConfig;
use config_crate::{Config, Environment, File};
use network::{UdpConfig, MAX_UDP_PAYLOAD};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tracing::{debug, info};
use types::{Catalog, MessageHeader};

/// Environment variable prefix used by the service binaries
pub const ENV_PREFIX: &str = "WEFT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub wire: WireConfig,
    pub dispatch: DispatchSettings,
    pub transport: TransportSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub route_policy: RoutePolicy,
    pub unknown_action: UnknownActionPolicy,
    /// Reject actions whose payload does not match the header hash
    pub verify_integrity: bool,
    pub max_batch: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        let options = DispatchOptions::default();
        Self {
            route_policy: options.route_policy,
            unknown_action: options.unknown_action,
            verify_integrity: true,
            max_batch: options.max_batch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub bind_address: SocketAddr,
    /// Remote node the service talks to; unset means run both sides locally
    pub peer: Option<SocketAddr>,
    pub max_datagram_size: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        let udp = UdpConfig::default();
        Self {
            bind_address: udp.bind_address,
            peer: None,
            max_datagram_size: udp.max_message_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info` or `actors=debug`
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl RuntimeConfig {
    /// Parse a TOML file without environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        info!("Loaded runtime config from {}", path.display());
        Ok(config)
    }

    /// Layer an optional TOML file and `{env_prefix}_SECTION__KEY` variables
    pub fn load(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!("Reading config file {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatch.max_batch == 0 {
            bail!("dispatch.max_batch must be at least 1");
        }
        let size = self.transport.max_datagram_size;
        if !(MessageHeader::SIZE..=MAX_UDP_PAYLOAD).contains(&size) {
            bail!(
                "transport.max_datagram_size must be between {} and {}, got {}",
                MessageHeader::SIZE,
                MAX_UDP_PAYLOAD,
                size
            );
        }
        if self.logging.level.trim().is_empty() {
            bail!("logging.level must not be empty");
        }
        if self.transport.peer == Some(self.transport.bind_address) {
            bail!("transport.peer must differ from transport.bind_address");
        }
        Ok(())
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.wire).with_integrity_check(self.dispatch.verify_integrity)
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            route_policy: self.dispatch.route_policy,
            unknown_action: self.dispatch.unknown_action,
            max_batch: self.dispatch.max_batch,
        }
    }

    pub fn udp_config(&self) -> UdpConfig {
        UdpConfig {
            bind_address: self.transport.bind_address,
            max_message_size: self.transport.max_datagram_size,
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}
