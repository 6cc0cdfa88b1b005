//! qlink: PBS/Torque job adaptor
//!
//! This crate submits and tracks batch jobs on PBS/Torque clusters, exposing a
//! canonical job lifecycle independent of the scheduler and the transport
//! underneath.
//!
//! # Overview
//!
//! A session is bound to one resource-manager endpoint:
//! 1. **Discovery**: locate the PBS tools and infer the cluster profile
//! 2. **Submission**: compile a job description into a `#PBS` script and pipe
//!    it into `qsub`
//! 3. **Monitoring**: translate `qstat` output into canonical states
//! 4. **Control**: cancel jobs and wait for them with a timeout
//!
//! # Endpoints
//!
//! | Scheme | Transport | Example |
//! |--------|-----------|---------|
//! | `pbs` | local shell | `pbs://localhost` |
//! | `pbs+ssh` | ssh | `pbs+ssh://alice@cluster.example.org` |
//! | `pbs+gsissh` | gsissh | `pbs+gsissh://login.example.org` |
//!
//! # Example: Submit and Wait
//!
//! ```ignore
//! use qlink_sched::{JobDescription, PbsJobService};
//!
//! let service = PbsJobService::connect("pbs+ssh://alice@cluster.example.org")?;
//!
//! let jd = JobDescription::new("/opt/sim/bin/run")
//!     .with_name("sim01")
//!     .with_queue("batch")
//!     .with_wall_time_limit(90)
//!     .with_total_cpu_count(32);
//!
//! let mut job = service.submit(&jd)?;
//! println!("Submitted: {}", job.id().unwrap());
//!
//! if service.wait(&mut job, None)? {
//!     println!("{} exit code {:?}", job.state(), job.exit_code());
//! }
//! ```
//!
//! # Example: Async
//!
//! ```ignore
//! use qlink_sched::{AsyncPbsJobService, JobService};
//!
//! let service = AsyncPbsJobService::connect("pbs://localhost").await?;
//! let mut job = service.submit(&jd).await?;
//! service.wait(&mut job, Some(Duration::from_secs(600))).await?;
//! ```
//!
//! # Re-attaching
//!
//! A job id such as `[pbs+ssh://cluster.example.org]-[4711.head01]` is all
//! that is needed to address the job again from another process:
//!
//! ```ignore
//! let mut job = service.attach("[pbs+ssh://cluster.example.org]-[4711.head01]")?;
//! service.poll(&mut job)?;
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod id;
pub mod job;
pub mod pbs;
pub mod task;
pub mod transport;

// Re-exports
pub use config::{ConfigError, LoggingConfig, QlinkConfig};
pub use endpoint::{Endpoint, TransportScheme};
pub use error::{SchedError, SchedResult};
pub use id::JobId;
pub use job::{JobAttribute, JobDescription, JobHandle, JobInfo, JobState};
pub use pbs::{ClusterProfile, PbsJobService, PbsSession, ToolInfo, wait_timeout_from_secs};
pub use task::{AsyncPbsJobService, JobService, JobTask};
pub use transport::{CommandChannel, CommandOutput, LocalShell, MockChannel, SshShell};
