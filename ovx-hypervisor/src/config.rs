//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

// Hypervisor core configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    // Bits of the MAC and IP address spaces reserved for tenant IDs.
    pub tenant_bits: u8,
    pub discovery: DiscoveryConfig,
    pub routing: RoutingConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    // Probe cycle period in milliseconds.
    pub probe_interval: u64,
    pub max_missed_probes: u8,
    // Send broadcast-domain probes alongside LLDP.
    pub bddp: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingConfig {
    pub default_backups: u8,
    // Priority of primary paths. Backups get decreasing values.
    pub base_priority: u8,
    // Metric assigned to newly discovered physical links.
    pub default_metric: u32,
}

// ===== impl Config =====

impl Config {
    pub const MAX_TENANT_BITS: u8 = 24;

    /// Parses and validates a TOML configuration.
    pub fn from_toml(config_str: &str) -> Result<Config, Error> {
        let config: Config = toml::from_str(config_str)
            .map_err(|error| Error::Config(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from a TOML file.
    pub fn load(path: &str) -> Result<Config, Error> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("{path}: {error}")))?;
        Config::from_toml(&config_str)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.tenant_bits == 0 || self.tenant_bits > Self::MAX_TENANT_BITS {
            return Err(Error::Config(format!(
                "tenant_bits must be between 1 and {}",
                Self::MAX_TENANT_BITS
            )));
        }
        if self.discovery.probe_interval == 0 {
            return Err(Error::Config(
                "probe_interval must be greater than zero".to_owned(),
            ));
        }
        if self.discovery.max_missed_probes == 0 {
            return Err(Error::Config(
                "max_missed_probes must be greater than zero".to_owned(),
            ));
        }
        if self.routing.default_backups >= self.routing.base_priority {
            return Err(Error::Config(
                "base_priority must leave room for every backup path".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            tenant_bits: 8,
            discovery: Default::default(),
            routing: Default::default(),
        }
    }
}

// ===== impl DiscoveryConfig =====

impl DiscoveryConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> DiscoveryConfig {
        DiscoveryConfig {
            probe_interval: 1000,
            max_missed_probes: 3,
            bddp: false,
        }
    }
}

// ===== impl RoutingConfig =====

impl Default for RoutingConfig {
    fn default() -> RoutingConfig {
        RoutingConfig {
            default_backups: 0,
            base_priority: 128,
            default_metric: 1,
        }
    }
}
