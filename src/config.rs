//! Configuration loading and validation.
//!
//! Shaped after `rust-dns-dhcp/src/config/mod.rs`: a `serde`-derived struct
//! tree with per-field `#[serde(default = "...")]`, loaded from a JSON file
//! via `Config::load_from_file`, written back atomically (tmp file + rename)
//! via `Config::save_to_file`. This crate's config only carries the two
//! DHCP address families, not a wider DNS/adblock section tree.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub dhcp4: DhcpV4Config,
    #[serde(default)]
    pub dhcp6: DhcpV6Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhcpV4Config {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub interface: String,
    pub subnet: Ipv4Addr,
    #[serde(default = "default_netmask")]
    pub netmask: Ipv4Addr,
    pub range_start: Ipv4Addr,
    pub range_end: Ipv4Addr,
    #[serde(default)]
    pub gateway: Option<Ipv4Addr>,
    #[serde(default)]
    pub dns_servers: Vec<Ipv4Addr>,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_lease_time")]
    pub lease_time: u32,
    /// Reserved MAC -> IP bindings, exempt from pool range checks.
    #[serde(default)]
    pub static_leases: Vec<StaticLease>,
    /// Extra fixed options appended to every OFFER/ACK, in config order.
    #[serde(default)]
    pub extra_options: Vec<RawOptionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticLease {
    pub mac: String,
    pub ip: Ipv4Addr,
    #[serde(default)]
    pub hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhcpV6Config {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub interface: String,
    pub prefix: Ipv6Addr,
    #[serde(default = "default_prefix_length")]
    pub prefix_length: u8,
    pub range_start: Ipv6Addr,
    pub range_end: Ipv6Addr,
    #[serde(default)]
    pub dns_servers: Vec<Ipv6Addr>,
    #[serde(default = "default_lease_time")]
    pub lease_time: u32,
    #[serde(default)]
    pub rapid_commit: bool,
    /// Server DUID, stored as already-encoded opaque bytes (hex in JSON).
    #[serde(default = "default_server_duid", with = "hex::serde")]
    pub server_duid: Vec<u8>,
    #[serde(default)]
    pub extra_options: Vec<RawOptionConfig>,
}

/// A config-supplied option that is emitted on the wire verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOptionConfig {
    pub code: u16,
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
}

fn default_true() -> bool {
    true
}
fn default_netmask() -> Ipv4Addr {
    Ipv4Addr::new(255, 255, 255, 0)
}
fn default_lease_time() -> u32 {
    3600
}
fn default_prefix_length() -> u8 {
    64
}
fn default_server_duid() -> Vec<u8> {
    // DUID-LLT-shaped placeholder, matching the simplified constant the
    // source material uses for `hr-ipv6::dhcpv6::server_duid`.
    vec![0x00, 0x03, 0x00, 0x01, 0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]
}

impl Default for DhcpV4Config {
    fn default() -> Self {
        serde_json::from_str(
            r#"{"subnet":"0.0.0.0","range_start":"0.0.0.0","range_end":"0.0.0.0"}"#,
        )
        .unwrap()
    }
}

impl Default for DhcpV6Config {
    fn default() -> Self {
        serde_json::from_str(r#"{"prefix":"::","range_start":"::","range_end":"::"}"#).unwrap()
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename config into place at {}", path.display()))?;
        Ok(())
    }
}

impl DhcpV4Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.range_start > self.range_end {
            return Err(ConfigError::RangeOrder);
        }
        use crate::addr::v4_in_subnet;
        if !v4_in_subnet(self.range_start, self.subnet, self.netmask)
            || !v4_in_subnet(self.range_end, self.subnet, self.netmask)
        {
            return Err(ConfigError::RangeOutsideSubnet);
        }
        if self.lease_time < 60 {
            return Err(ConfigError::LeaseTimeTooShort { min: 60 });
        }
        Ok(())
    }
}

impl DhcpV6Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix_length > 128 {
            return Err(ConfigError::InvalidPrefixLength(self.prefix_length));
        }
        use crate::addr::v6_in_prefix;
        if !v6_in_prefix(self.range_start, self.prefix, self.prefix_length)
            || !v6_in_prefix(self.range_end, self.prefix, self.prefix_length)
        {
            return Err(ConfigError::RangeOutsideSubnet);
        }
        if self.lease_time < 60 {
            return Err(ConfigError::LeaseTimeTooShort { min: 60 });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_v4() -> DhcpV4Config {
        DhcpV4Config {
            enabled: true,
            interface: String::new(),
            subnet: Ipv4Addr::new(192, 168, 1, 0),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            range_start: Ipv4Addr::new(192, 168, 1, 100),
            range_end: Ipv4Addr::new(192, 168, 1, 200),
            gateway: Some(Ipv4Addr::new(192, 168, 1, 1)),
            dns_servers: vec![Ipv4Addr::new(8, 8, 8, 8)],
            domain: String::new(),
            lease_time: 3600,
            static_leases: vec![],
            extra_options: vec![],
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert!(valid_v4().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_range() {
        let mut cfg = valid_v4();
        cfg.range_start = Ipv4Addr::new(192, 168, 1, 200);
        cfg.range_end = Ipv4Addr::new(192, 168, 1, 100);
        assert_eq!(cfg.validate(), Err(ConfigError::RangeOrder));
    }

    #[test]
    fn rejects_range_outside_subnet() {
        let mut cfg = valid_v4();
        cfg.range_end = Ipv4Addr::new(192, 168, 2, 200);
        assert_eq!(cfg.validate(), Err(ConfigError::RangeOutsideSubnet));
    }

    #[test]
    fn rejects_short_lease_time() {
        let mut cfg = valid_v4();
        cfg.lease_time = 30;
        assert_eq!(cfg.validate(), Err(ConfigError::LeaseTimeTooShort { min: 60 }));
    }

    #[test]
    fn config_roundtrips_through_json() {
        let json = r#"{
            "dhcp4": {
                "subnet": "10.0.0.0",
                "netmask": "255.255.255.0",
                "range_start": "10.0.0.10",
                "range_end": "10.0.0.250",
                "gateway": "10.0.0.1",
                "dns_servers": ["1.1.1.1"],
                "lease_time": 7200
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.dhcp4.lease_time, 7200);
        assert_eq!(config.dhcp4.gateway, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(config.dhcp4.validate().is_ok());

        let serialized = serde_json::to_string(&config).unwrap();
        let config2: Config = serde_json::from_str(&serialized).unwrap();
        assert_eq!(config2.dhcp4.range_start, config.dhcp4.range_start);
    }
}
