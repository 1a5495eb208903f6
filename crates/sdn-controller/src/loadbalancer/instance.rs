//! Load balancer instances and their configuration.

use log::error;
use sdn_types::MacAddress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use super::orch::{LoadBalancerError, Result};

/// Definition of one virtual service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub virtual_ip: Ipv4Addr,
    pub virtual_mac: MacAddress,
    pub servers: Vec<Ipv4Addr>,
}

impl fmt::Display for InstanceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let servers: Vec<String> = self.servers.iter().map(Ipv4Addr::to_string).collect();
        write!(f, "{} {} {}", self.virtual_ip, self.virtual_mac, servers.join(","))
    }
}

fn malformed(definition: &str, reason: impl Into<String>) -> LoadBalancerError {
    LoadBalancerError::MalformedInstanceConfig {
        definition: definition.to_string(),
        reason: reason.into(),
    }
}

/// Parses one `"<vip> <vmac> <ip1>,<ip2>,..."` definition.
pub fn parse_instance(definition: &str) -> Result<InstanceConfig> {
    let items: Vec<&str> = definition.split_whitespace().collect();
    let [vip, vmac, servers] = items.as_slice() else {
        return Err(malformed(
            definition,
            format!("expected 3 fields, found {}", items.len()),
        ));
    };

    let virtual_ip = vip
        .parse()
        .map_err(|_| malformed(definition, format!("bad virtual IP '{}'", vip)))?;
    let virtual_mac = vmac
        .parse()
        .map_err(|e| malformed(definition, format!("{}", e)))?;
    let servers = servers
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| malformed(definition, format!("bad server IP '{}'", s)))
        })
        .collect::<Result<Vec<Ipv4Addr>>>()?;

    Ok(InstanceConfig {
        virtual_ip,
        virtual_mac,
        servers,
    })
}

/// Parses a `;`-separated list of instance definitions.
///
/// Each definition is parsed independently so one bad entry does not hide
/// the others.
pub fn parse_instance_list(list: &str) -> Vec<Result<InstanceConfig>> {
    list.split(';')
        .map(str::trim)
        .filter(|def| !def.is_empty())
        .map(parse_instance)
        .collect()
}

/// A virtual service and its round-robin backend cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerInstance {
    virtual_ip: Ipv4Addr,
    virtual_mac: MacAddress,
    servers: Vec<Ipv4Addr>,
    cursor: usize,
    assignments: Vec<u64>,
}

impl LoadBalancerInstance {
    pub fn new(config: InstanceConfig) -> Result<Self> {
        if config.servers.is_empty() {
            return Err(malformed(&config.to_string(), "no backend servers"));
        }
        let assignments = vec![0; config.servers.len()];
        Ok(Self {
            virtual_ip: config.virtual_ip,
            virtual_mac: config.virtual_mac,
            servers: config.servers,
            cursor: 0,
            assignments,
        })
    }

    pub fn virtual_ip(&self) -> Ipv4Addr {
        self.virtual_ip
    }

    pub fn virtual_mac(&self) -> MacAddress {
        self.virtual_mac
    }

    pub fn servers(&self) -> &[Ipv4Addr] {
        &self.servers
    }

    /// Returns the next backend and advances the cursor.
    pub fn next_server(&mut self) -> Ipv4Addr {
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.servers.len();
        self.assignments[index] += 1;
        self.servers[index]
    }

    /// Connections dispatched to each backend so far.
    pub fn assignments(&self) -> impl Iterator<Item = (Ipv4Addr, u64)> + '_ {
        self.servers.iter().copied().zip(self.assignments.iter().copied())
    }
}

/// Builds the instance table keyed by virtual IP.
///
/// Definitions without backends and repeated virtual IPs are skipped with
/// an error log; the first definition of a virtual IP wins.
pub fn build_instances(configs: impl IntoIterator<Item = InstanceConfig>) -> BTreeMap<Ipv4Addr, LoadBalancerInstance> {
    let mut instances = BTreeMap::new();
    for config in configs {
        let vip = config.virtual_ip;
        if instances.contains_key(&vip) {
            error!("LoadBalancerOrch: Duplicate virtual IP {}, skipping '{}'", vip, config);
            continue;
        }
        match LoadBalancerInstance::new(config) {
            Ok(instance) => {
                instances.insert(vip, instance);
            }
            Err(e) => error!("LoadBalancerOrch: {}", e),
        }
    }
    instances
}
