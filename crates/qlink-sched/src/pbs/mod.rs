//! PBS/Torque integration.
//!
//! Jobs are driven entirely through the PBS command-line tools (`qsub`,
//! `qstat`, `qdel`, `pbsnodes`) over a command channel, so the same code
//! serves a local head node and remote clusters reached over ssh.

pub mod discovery;
pub mod parser;
mod service;
pub mod templates;

pub use discovery::{ClusterProfile, ToolInfo, estimate_cores_per_node};
pub use parser::translate_state;
pub use service::{
    DEFAULT_POLL_INTERVAL, PbsJobService, PbsSession, SUPPORTED_ATTRIBUTES, wait_timeout_from_secs,
};
pub use templates::compile_script;
