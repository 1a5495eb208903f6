//! Controller configuration file.
//!
//! YAML or JSON, chosen by file extension:
//!
//! ```yaml
//! loadbalancer_table: 0
//! routing_table: 1
//! instances:
//!   - virtual_ip: 10.0.0.100
//!     virtual_mac: "00:00:00:00:00:64"
//!     servers: [10.0.0.1, 10.0.0.2]
//! instances_compact: "10.0.0.101 00:00:00:00:00:65 10.0.0.3,10.0.0.4"
//! ```

use log::{error, info};
use sdn_types::{DeviceId, MacAddress, PortNo, TableId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::daemon::ControllerDaemonConfig;
use crate::flow::IDLE_TIMEOUT_SECS;
use crate::l3routing::RoutingConfig;
use crate::loadbalancer::{parse_instance_list, InstanceConfig, LoadBalancerConfig};
use crate::topology::{Device, Host, Link};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config file type: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// A host in the static topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub mac: MacAddress,
    #[serde(default)]
    pub ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub device: Option<DeviceId>,
    #[serde(default)]
    pub port: Option<PortNo>,
}

impl HostConfig {
    pub fn to_host(&self) -> Host {
        let mut host = Host::new(self.mac);
        if let Some(ip) = self.ip {
            host = host.with_ipv4(ip);
        }
        if let (Some(device), Some(port)) = (self.device, self.port) {
            host = host.attached_to(device, port);
        }
        host
    }
}

/// Static topology replayed in simulation mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticTopologyConfig {
    pub devices: Vec<Device>,
    pub links: Vec<Link>,
    pub hosts: Vec<HostConfig>,
}

/// Top-level controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Table of the load balancer's bootstrap and connection rules.
    pub loadbalancer_table: TableId,
    /// Table of the per-host routes.
    pub routing_table: TableId,
    /// Table the routing catch-all continues to; defaults to the table
    /// after `routing_table`.
    pub routing_next_table: Option<TableId>,
    pub event_queue_depth: usize,
    pub idle_timeout_secs: u16,
    pub instances: Vec<InstanceConfig>,
    /// `;`-separated `"<vip> <vmac> <ip1>,<ip2>"` definitions.
    pub instances_compact: Option<String>,
    pub topology: Option<StaticTopologyConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            loadbalancer_table: TableId::new(0),
            routing_table: TableId::new(1),
            routing_next_table: None,
            event_queue_depth: 1024,
            idle_timeout_secs: IDLE_TIMEOUT_SECS,
            instances: Vec::new(),
            instances_compact: None,
            topology: None,
        }
    }
}

impl ControllerConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let config: ControllerConfig = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&text)?,
            "json" => serde_json::from_str(&text)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Checks table assignments and limits.
    ///
    /// Rules may only continue to a later table, so the pipeline order
    /// load balancer, routing, next must be strictly ascending.
    pub fn validate(&self) -> Result<()> {
        let next = self.next_table()?;
        if self.loadbalancer_table >= self.routing_table {
            return Err(ConfigError::Invalid(format!(
                "load balancer {} must precede routing {}",
                self.loadbalancer_table, self.routing_table
            )));
        }
        if next <= self.routing_table {
            return Err(ConfigError::Invalid(format!(
                "routing next table {} must follow routing {}",
                next, self.routing_table
            )));
        }
        if self.event_queue_depth == 0 {
            return Err(ConfigError::Invalid("event_queue_depth must be positive".into()));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid("idle_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// Resolves the routing catch-all's target table.
    pub fn next_table(&self) -> Result<TableId> {
        match self.routing_next_table {
            Some(table) => Ok(table),
            None => self.routing_table.next().ok_or_else(|| {
                ConfigError::Invalid(format!("{} has no following table", self.routing_table))
            }),
        }
    }

    /// Typed instances followed by the compact ones.
    ///
    /// Malformed compact definitions are skipped with an error log.
    pub fn instance_configs(&self) -> Vec<InstanceConfig> {
        let mut configs = self.instances.clone();
        if let Some(compact) = &self.instances_compact {
            for parsed in parse_instance_list(compact) {
                match parsed {
                    Ok(config) => configs.push(config),
                    Err(e) => error!("Skipping instance: {}", e),
                }
            }
        }
        configs
    }

    pub fn routing_config(&self, virtual_ips: Vec<Ipv4Addr>) -> Result<RoutingConfig> {
        Ok(RoutingConfig {
            table: self.routing_table,
            next_table: self.next_table()?,
            virtual_ips,
        })
    }

    pub fn loadbalancer_config(&self) -> LoadBalancerConfig {
        LoadBalancerConfig {
            table: self.loadbalancer_table,
            routing_table: self.routing_table,
            idle_timeout: self.idle_timeout_secs,
        }
    }

    pub fn daemon_config(&self) -> ControllerDaemonConfig {
        ControllerDaemonConfig {
            event_queue_depth: self.event_queue_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml() {
        let file = write_temp(
            ".yaml",
            r#"
loadbalancer_table: 0
routing_table: 1
instances:
  - virtual_ip: 10.0.0.100
    virtual_mac: "00:00:00:00:00:64"
    servers: [10.0.0.1, 10.0.0.2]
instances_compact: "10.0.0.101 00:00:00:00:00:65 10.0.0.3,10.0.0.4; broken"
topology:
  devices: [{ id: 1, ports: [1, 2] }, { id: 2 }]
  links: [{ src: 1, src_port: 1, dst: 2, dst_port: 1 }]
  hosts: [{ mac: "00:00:00:00:00:01", ip: 10.0.0.1, device: 1, port: 2 }]
"#,
        );

        let config = ControllerConfig::load(file.path()).unwrap();
        assert_eq!(config.next_table().unwrap(), TableId::new(2));
        assert_eq!(config.idle_timeout_secs, IDLE_TIMEOUT_SECS);

        let instances = config.instance_configs();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[1].virtual_ip, Ipv4Addr::new(10, 0, 0, 101));

        let topology = config.topology.unwrap();
        assert_eq!(topology.devices.len(), 2);
        assert_eq!(topology.links[0].dst, DeviceId::new(2));
        assert!(topology.hosts[0].to_host().is_attached());
    }

    #[test]
    fn test_load_json() {
        let file = write_temp(
            ".json",
            r#"{ "loadbalancer_table": 3, "routing_table": 4, "routing_next_table": 7 }"#,
        );
        let config = ControllerConfig::load(file.path()).unwrap();
        assert_eq!(config.loadbalancer_config().table, TableId::new(3));
        assert_eq!(config.routing_config(vec![]).unwrap().next_table, TableId::new(7));
        assert!(config.instance_configs().is_empty());
    }

    #[test]
    fn test_rejects_shared_tables() {
        let file = write_temp(".yml", "loadbalancer_table: 1\nrouting_table: 1\n");
        assert!(matches!(
            ControllerConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let config = ControllerConfig {
            routing_table: TableId::new(255),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_backward_table_order() {
        let backward = ControllerConfig {
            loadbalancer_table: TableId::new(3),
            routing_table: TableId::new(1),
            ..Default::default()
        };
        assert!(matches!(backward.validate(), Err(ConfigError::Invalid(_))));

        let next_before_routing = ControllerConfig {
            routing_next_table: Some(TableId::new(0)),
            ..Default::default()
        };
        assert!(matches!(
            next_before_routing.validate(),
            Err(ConfigError::Invalid(_))
        ));

        let ascending = ControllerConfig {
            loadbalancer_table: TableId::new(2),
            routing_table: TableId::new(5),
            routing_next_table: Some(TableId::new(9)),
            ..Default::default()
        };
        assert!(ascending.validate().is_ok());
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_temp(".toml", "routing_table = 1");
        assert!(matches!(
            ControllerConfig::load(file.path()),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "toml"
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ControllerConfig::load("/nonexistent/controller.yaml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
