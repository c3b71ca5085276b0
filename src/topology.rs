//! Cluster topology and its discovery
//!
//! A [`Topology`] maps each role to the nodes playing it and, per node, to
//! the parameter records of the services it runs (one record per OSD, for
//! instance). It is built once before the run and shared read-only.
//!
//! Every host registered under a service role is also registered under
//! [`Role::Node`] with a single empty record, so base host collection runs
//! regardless of what else the host does.

use crate::error::DiscoveryError;
use crate::exec::{CommandExecutor, CommandSpec};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Node id used for the control-plane pseudo-node
pub const MASTER_NODE: &str = "master";

/// Role a node plays in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// Control plane, collected locally
    Master,
    /// Any cluster host
    Node,
    /// Monitor daemon host
    Monitor,
    /// OSD (data node) daemon host
    Osd,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Master, Role::Node, Role::Monitor, Role::Osd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Node => "node",
            Role::Monitor => "monitor",
            Role::Osd => "osd",
        }
    }

    /// Roles whose node ids are real hosts
    pub fn is_host_role(&self) -> bool {
        !matches!(self, Role::Master)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown role '{}'", s))
    }
}

/// Per-service parameter record (string -> scalar)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    /// String value; numbers are rendered as text
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Role -> node id -> parameter records
#[derive(Debug, Clone, Default)]
pub struct Topology {
    roles: BTreeMap<Role, BTreeMap<String, Vec<Params>>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service of `role` on `node`
    ///
    /// Host roles also register the node under [`Role::Node`].
    pub fn add(&mut self, role: Role, node: impl Into<String>, params: Params) {
        let node = node.into();

        if role.is_host_role() && role != Role::Node {
            self.roles
                .entry(Role::Node)
                .or_default()
                .insert(node.clone(), vec![Params::new()]);
        }

        let records = self.roles.entry(role).or_default().entry(node).or_default();
        if role == Role::Node {
            // A host carries exactly one empty node record
            if records.is_empty() {
                records.push(Params::new());
            }
        } else {
            records.push(params);
        }
    }

    /// Register the control-plane pseudo-node
    pub fn add_master(&mut self) {
        self.roles
            .entry(Role::Master)
            .or_default()
            .insert(MASTER_NODE.to_string(), vec![Params::new()]);
    }

    /// Nodes (with their records) playing a role
    pub fn nodes(&self, role: Role) -> impl Iterator<Item = (&str, &[Params])> {
        self.roles
            .get(&role)
            .into_iter()
            .flat_map(|nodes| nodes.iter().map(|(n, p)| (n.as_str(), p.as_slice())))
    }

    /// All discovered hosts
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.nodes(Role::Node).map(|(node, _)| node)
    }

    pub fn host_count(&self) -> usize {
        self.roles.get(&Role::Node).map_or(0, BTreeMap::len)
    }

    /// Roles present in this topology, in a stable order
    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.roles.keys().copied()
    }

    /// Number of services (parameter records) for a role
    pub fn service_count(&self, role: Role) -> usize {
        self.nodes(role).map(|(_, params)| params.len()).sum()
    }

    /// Every host under a service role is also a node
    pub fn hosts_cover_roles(&self) -> bool {
        let hosts = self.roles.get(&Role::Node);
        self.roles
            .iter()
            .filter(|(role, _)| role.is_host_role() && **role != Role::Node)
            .flat_map(|(_, nodes)| nodes.keys())
            .all(|node| hosts.is_some_and(|h| h.contains_key(node)))
    }

    /// Log per-role host and service counts
    pub fn log_summary(&self) {
        for role in self.roles() {
            if role == Role::Node {
                continue;
            }
            let hosts = self.nodes(role).count();
            info!(role = %role, hosts, services = self.service_count(role), "Discovered role");
        }
        info!(hosts = self.host_count(), "Discovered hosts total");
    }
}

/// Source of cluster topology
pub trait Discovery {
    fn discover(&self) -> Result<Topology, DiscoveryError>;
}

/// Fixed topology, for tests and offline runs
impl Discovery for Topology {
    fn discover(&self) -> Result<Topology, DiscoveryError> {
        Ok(self.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MonStatus {
    monmap: MonMap,
}

#[derive(Debug, Deserialize)]
struct MonMap {
    mons: Vec<MonEntry>,
}

#[derive(Debug, Deserialize)]
struct MonEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct OsdTree {
    nodes: Vec<OsdTreeNode>,
}

#[derive(Debug, Deserialize)]
struct OsdTreeNode {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    children: Vec<i64>,
}

/// Discovery through the `ceph` CLI on the local machine
pub struct CephDiscovery<'a> {
    executor: &'a dyn CommandExecutor,
    ceph_cmd: String,
}

impl<'a> CephDiscovery<'a> {
    pub fn new(executor: &'a dyn CommandExecutor, ceph_cmd: impl Into<String>) -> Self {
        Self {
            executor,
            ceph_cmd: ceph_cmd.into(),
        }
    }

    fn query<T: for<'de> Deserialize<'de>>(&self, subcommand: &str) -> Result<T, DiscoveryError> {
        let command = format!("{}{}", self.ceph_cmd, subcommand);
        let out = self.executor.execute(&CommandSpec::local(&command));
        if !out.success {
            return Err(DiscoveryError::QueryFailed {
                command,
                output: out.text().trim().to_string(),
            });
        }

        serde_json::from_slice(&out.output).map_err(|e| DiscoveryError::InvalidReply {
            command,
            reason: e.to_string(),
        })
    }
}

impl Discovery for CephDiscovery<'_> {
    fn discover(&self) -> Result<Topology, DiscoveryError> {
        let mut topology = Topology::new();

        let mon_status: MonStatus = self.query("mon_status")?;
        for mon in mon_status.monmap.mons {
            let params = Params::new().with("name", mon.name.clone());
            topology.add(Role::Monitor, mon.name, params);
        }

        let osd_tree: OsdTree = self.query("osd tree")?;
        for node in osd_tree.nodes.into_iter().filter(|n| n.kind == "host") {
            for osd_id in node.children {
                topology.add(Role::Osd, node.name.clone(), Params::new().with("osd_id", osd_id));
            }
        }

        Ok(topology)
    }
}
