use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{QuorumError, Result};

/// One row of the cluster roster file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberEntry {
    pub name: String,
    /// host:port, supports both IP addresses and hostnames
    pub address: String,
    pub dbpath: PathBuf,
}

/// Resolved configuration for the local node.
///
/// The roster entry matching the local node name yields self-identity and
/// storage path; every other entry becomes a participant.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub name: String,
    pub listen_addr: String,
    pub dbpath: PathBuf,
    /// participant name -> host:port (the roster minus the local node)
    pub participants: HashMap<String, String>,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub reconnect_interval_ms: u64,
}

impl NodeConfig {
    /// Total cluster size, participants plus self.
    pub fn cluster_size(&self) -> usize {
        self.participants.len() + 1
    }

    pub fn with_participant(mut self, name: &str, address: &str) -> Self {
        self.participants
            .insert(name.to_string(), address.to_string());
        self
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "node-1".to_string(),
            listen_addr: "127.0.0.1:7701".to_string(),
            dbpath: PathBuf::from("/tmp/quorumd/node-1"),
            participants: HashMap::new(),
            election_timeout_min_ms: 150,
            election_timeout_max_ms: 300,
            heartbeat_interval_ms: 50,
            reconnect_interval_ms: 2000,
        }
    }
}

/// Parse the YAML roster file into its raw member list.
pub fn parse_roster(path: &Path) -> Result<Vec<MemberEntry>> {
    let raw = std::fs::read_to_string(path)?;
    let members: Vec<MemberEntry> = serde_yaml::from_str(&raw)?;
    Ok(members)
}

/// Build the local node's configuration from the roster file.
pub fn cluster_config(path: &Path, node_name: &str) -> Result<NodeConfig> {
    let members = parse_roster(path)?;
    if members.is_empty() {
        return Err(QuorumError::Config("empty roster".to_string()));
    }

    let mut config = NodeConfig {
        name: String::new(),
        ..NodeConfig::default()
    };

    for member in members {
        validate_address(&member.address)?;
        if member.name == node_name {
            config.name = member.name;
            config.listen_addr = member.address;
            config.dbpath = member.dbpath;
        } else {
            config.participants.insert(member.name, member.address);
        }
    }

    if config.name.is_empty() {
        return Err(QuorumError::UnknownNode(node_name.to_string()));
    }

    Ok(config)
}

fn validate_address(address: &str) -> Result<()> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| QuorumError::Config(format!("address {address:?} is not host:port")))?;
    if host.is_empty() {
        return Err(QuorumError::Config(format!(
            "address {address:?} has an empty host"
        )));
    }
    port.parse::<u16>()
        .map_err(|_| QuorumError::Config(format!("address {address:?} has an invalid port")))?;
    Ok(())
}
