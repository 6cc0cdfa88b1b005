//! Cluster profile discovery.
//!
//! Run once when a session opens: locate the PBS command-line tools,
//! record their versions, detect Cray XT machines and estimate how many
//! cores a compute node offers.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{SchedError, SchedResult};
use crate::pbs::parser;
use crate::transport::CommandChannel;

/// Tools a PBS cluster must provide, in lookup order.
pub const REQUIRED_TOOLS: &[&str] = &["pbsnodes", "qstat", "qsub", "qdel"];

/// Tools that are not asked for a version.
const UNVERSIONED_TOOLS: &[&str] = &["qdel"];

/// Version recorded when a tool does not report one.
pub const UNKNOWN_VERSION: &str = "?";

/// Location and version of one PBS tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInfo {
    /// Absolute path on the cluster.
    pub path: String,
    /// Reported version, or `?`.
    pub version: String,
}

/// What a session knows about the cluster behind its endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterProfile {
    /// Most common core count among the compute nodes.
    pub cores_per_node: u32,
    /// Whether this is a Cray XT machine (`aprun` is available).
    pub is_cray: bool,
    /// Required tools, keyed by name, in lookup order.
    pub tools: IndexMap<String, ToolInfo>,
}

impl ClusterProfile {
    /// Path of `tool`, falling back to the bare name.
    pub fn tool_path<'a>(&'a self, tool: &'a str) -> &'a str {
        self.tools.get(tool).map_or(tool, |info| info.path.as_str())
    }
}

/// Most frequent value in `counts`; ties go to the value seen first.
pub fn estimate_cores_per_node(counts: &[u32]) -> Option<u32> {
    let mut tally: IndexMap<u32, usize> = IndexMap::new();
    for &count in counts {
        *tally.entry(count).or_default() += 1;
    }

    let mut best: Option<(u32, usize)> = None;
    for (value, votes) in tally {
        if best.is_none_or(|(_, most)| votes > most) {
            best = Some((value, votes));
        }
    }
    best.map(|(value, _)| value)
}

/// Probe the cluster reachable through `channel`.
pub fn discover(channel: &mut dyn CommandChannel) -> SchedResult<ClusterProfile> {
    let mut tools = IndexMap::new();

    for &tool in REQUIRED_TOOLS {
        let found = channel.run_sync(&format!("which {tool}"))?;
        if !found.success() {
            return Err(SchedError::ToolDiscovery {
                tool: tool.to_string(),
                message: found.diagnostic(),
            });
        }
        let path = found.stdout.trim().to_string();

        let version = if UNVERSIONED_TOOLS.contains(&tool) {
            UNKNOWN_VERSION.to_string()
        } else {
            let out = channel.run_sync(&format!("{path} --version"))?;
            if !out.success() {
                return Err(SchedError::ToolDiscovery {
                    tool: tool.to_string(),
                    message: out.diagnostic(),
                });
            }
            parser::parse_tool_version(&out.stdout).unwrap_or_else(|| {
                warn!("{} reported no version: '{}'", tool, out.stdout.trim());
                UNKNOWN_VERSION.to_string()
            })
        };

        debug!("found {} {} at {}", tool, version, path);
        tools.insert(tool.to_string(), ToolInfo { path, version });
    }

    let is_cray = channel.run_sync("which aprun")?.success();

    let pbsnodes = tools
        .get("pbsnodes")
        .map_or("pbsnodes", |info| info.path.as_str());
    let nodes = channel.run_sync(&format!("{pbsnodes} -a | grep np"))?;
    if !nodes.success() {
        return Err(SchedError::ClusterDiscovery(nodes.diagnostic()));
    }

    let counts = parser::parse_node_core_counts(&nodes.stdout);
    let cores_per_node = estimate_cores_per_node(&counts).ok_or_else(|| {
        SchedError::ClusterDiscovery(format!(
            "no node core counts in pbsnodes output: '{}'",
            nodes.stdout.trim()
        ))
    })?;

    info!(
        "Discovered PBS cluster: {} cores per node over {} nodes, cray: {}",
        cores_per_node,
        counts.len(),
        is_cray
    );

    Ok(ClusterProfile {
        cores_per_node,
        is_cray,
        tools,
    })
}
