//! Job types: descriptions, canonical states and caller-owned handles.

use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{SchedError, SchedResult};
use crate::id::JobId;

/// Attributes a job description can carry.
///
/// The description type is backend-agnostic; each adaptor declares which of
/// these it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobAttribute {
    Name,
    Executable,
    Arguments,
    Environment,
    WorkingDirectory,
    Input,
    Output,
    Error,
    WallTimeLimit,
    Queue,
    Project,
    TotalCpuCount,
    JobContact,
    SpmdVariation,
    ProcessesPerHost,
    CandidateHosts,
    TotalPhysicalMemory,
}

impl JobAttribute {
    /// Attribute name as exposed to callers.
    pub fn name(&self) -> &'static str {
        match self {
            JobAttribute::Name => "Name",
            JobAttribute::Executable => "Executable",
            JobAttribute::Arguments => "Arguments",
            JobAttribute::Environment => "Environment",
            JobAttribute::WorkingDirectory => "WorkingDirectory",
            JobAttribute::Input => "Input",
            JobAttribute::Output => "Output",
            JobAttribute::Error => "Error",
            JobAttribute::WallTimeLimit => "WallTimeLimit",
            JobAttribute::Queue => "Queue",
            JobAttribute::Project => "Project",
            JobAttribute::TotalCpuCount => "TotalCpuCount",
            JobAttribute::JobContact => "JobContact",
            JobAttribute::SpmdVariation => "SPMDVariation",
            JobAttribute::ProcessesPerHost => "ProcessesPerHost",
            JobAttribute::CandidateHosts => "CandidateHosts",
            JobAttribute::TotalPhysicalMemory => "TotalPhysicalMemory",
        }
    }
}

impl fmt::Display for JobAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A backend-agnostic description of a job to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescription {
    /// Job name.
    pub name: Option<String>,

    /// Program to run.
    pub executable: String,

    /// Program arguments, in order.
    pub arguments: Vec<String>,

    /// Environment variables to set for the job.
    pub environment: IndexMap<String, String>,

    /// Directory the job starts in.
    pub working_directory: Option<PathBuf>,

    /// File to read standard input from.
    pub input: Option<PathBuf>,

    /// File standard output is written to.
    pub output: Option<PathBuf>,

    /// File standard error is written to.
    pub error: Option<PathBuf>,

    /// Wall-time limit in minutes.
    pub wall_time_limit: Option<u32>,

    /// Queue to submit to.
    pub queue: Option<String>,

    /// Project/account to charge.
    pub project: Option<String>,

    /// Total number of CPUs requested.
    pub total_cpu_count: Option<u32>,

    /// Whether to notify the owner when the job ends.
    pub notify: Option<bool>,

    /// Parallel launch flavour (e.g. "MPI").
    pub spmd_variation: Option<String>,

    /// Processes per host.
    pub processes_per_host: Option<u32>,

    /// Hosts the job may run on.
    pub candidate_hosts: Vec<String>,

    /// Memory requested, in megabytes.
    pub total_physical_memory: Option<u64>,
}

impl JobDescription {
    /// Create a description running `executable` with no arguments.
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            ..Default::default()
        }
    }

    /// Set the job name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    /// Replace the argument list.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Set the standard output file.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Set the standard error file.
    pub fn with_error(mut self, path: impl Into<PathBuf>) -> Self {
        self.error = Some(path.into());
        self
    }

    /// Set the wall-time limit in minutes.
    pub fn with_wall_time_limit(mut self, minutes: u32) -> Self {
        self.wall_time_limit = Some(minutes);
        self
    }

    /// Set the queue.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Set the project/account.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Set the total CPU count.
    pub fn with_total_cpu_count(mut self, cpus: u32) -> Self {
        self.total_cpu_count = Some(cpus);
        self
    }

    /// Request (or explicitly decline) a notification on completion.
    pub fn with_notify(mut self, notify: bool) -> Self {
        self.notify = Some(notify);
        self
    }

    /// Attributes that are set on this description.
    ///
    /// The executable is always considered set; collections count as set
    /// when they are non-empty.
    pub fn attributes(&self) -> Vec<JobAttribute> {
        let mut set = vec![JobAttribute::Executable];
        let mut mark = |present: bool, attribute: JobAttribute| {
            if present {
                set.push(attribute);
            }
        };

        mark(self.name.is_some(), JobAttribute::Name);
        mark(!self.arguments.is_empty(), JobAttribute::Arguments);
        mark(!self.environment.is_empty(), JobAttribute::Environment);
        mark(self.working_directory.is_some(), JobAttribute::WorkingDirectory);
        mark(self.input.is_some(), JobAttribute::Input);
        mark(self.output.is_some(), JobAttribute::Output);
        mark(self.error.is_some(), JobAttribute::Error);
        mark(self.wall_time_limit.is_some(), JobAttribute::WallTimeLimit);
        mark(self.queue.is_some(), JobAttribute::Queue);
        mark(self.project.is_some(), JobAttribute::Project);
        mark(self.total_cpu_count.is_some(), JobAttribute::TotalCpuCount);
        mark(self.notify.is_some(), JobAttribute::JobContact);
        mark(self.spmd_variation.is_some(), JobAttribute::SpmdVariation);
        mark(self.processes_per_host.is_some(), JobAttribute::ProcessesPerHost);
        mark(!self.candidate_hosts.is_empty(), JobAttribute::CandidateHosts);
        mark(
            self.total_physical_memory.is_some(),
            JobAttribute::TotalPhysicalMemory,
        );

        set
    }

    /// Check that every set attribute is in `supported`.
    pub fn check_attributes(&self, supported: &[JobAttribute]) -> SchedResult<()> {
        match self
            .attributes()
            .into_iter()
            .find(|attribute| !supported.contains(attribute))
        {
            Some(attribute) => Err(SchedError::UnsupportedAttribute { attribute }),
            None => Ok(()),
        }
    }
}

/// Canonical job state, independent of the scheduler underneath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Created locally, not yet submitted.
    New,
    /// Waiting in a queue.
    Pending,
    /// Executing.
    Running,
    /// Finished.
    Done,
    /// Cancelled by the user or the scheduler.
    Canceled,
    /// Failed.
    Failed,
    /// The scheduler reported something we do not recognize.
    Unknown,
}

impl JobState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Canceled | JobState::Failed)
    }

    /// Get a human-readable state name.
    pub fn name(&self) -> &'static str {
        match self {
            JobState::New => "NEW",
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Done => "DONE",
            JobState::Canceled => "CANCELED",
            JobState::Failed => "FAILED",
            JobState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of the observable fields of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Canonical state.
    pub state: JobState,

    /// Exit code, only known once the job is in a terminal state.
    pub exit_code: Option<i32>,

    /// Hosts (with slot suffixes) the job runs on, in scheduler order.
    pub execution_hosts: Vec<String>,

    /// Creation time as reported by the scheduler.
    pub created: Option<String>,

    /// Start time as reported by the scheduler.
    pub started: Option<String>,

    /// Completion time as reported by the scheduler.
    pub finished: Option<String>,
}

impl JobInfo {
    fn with_state(state: JobState) -> Self {
        Self {
            state,
            exit_code: None,
            execution_hosts: Vec::new(),
            created: None,
            started: None,
            finished: None,
        }
    }
}

/// A caller-owned handle on one job.
///
/// The service never keeps handles; every query is addressed through the
/// handle the caller passes in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    id: Option<JobId>,
    info: JobInfo,
}

impl JobHandle {
    /// A handle for a job that has not been submitted yet.
    pub fn new() -> Self {
        Self {
            id: None,
            info: JobInfo::with_state(JobState::New),
        }
    }

    /// A freshly submitted job.
    pub(crate) fn submitted(id: JobId) -> Self {
        Self {
            id: Some(id),
            info: JobInfo::with_state(JobState::Pending),
        }
    }

    /// Re-attach to a job through its textual identifier.
    ///
    /// The state starts as [`JobState::Unknown`] so the first poll asks the
    /// scheduler.
    pub fn attach(id: &str) -> SchedResult<Self> {
        Ok(Self {
            id: Some(id.parse()?),
            info: JobInfo::with_state(JobState::Unknown),
        })
    }

    /// Composite identifier, if the job has been submitted.
    pub fn id(&self) -> Option<&JobId> {
        self.id.as_ref()
    }

    /// Current canonical state.
    pub fn state(&self) -> JobState {
        self.info.state
    }

    /// Exit code, if a terminal state has been observed.
    pub fn exit_code(&self) -> Option<i32> {
        self.info.exit_code
    }

    /// Execution hosts; empty until the job is scheduled.
    pub fn execution_hosts(&self) -> &[String] {
        &self.info.execution_hosts
    }

    /// Creation time reported by the scheduler.
    pub fn created(&self) -> Option<&str> {
        self.info.created.as_deref()
    }

    /// Start time reported by the scheduler.
    pub fn started(&self) -> Option<&str> {
        self.info.started.as_deref()
    }

    /// Completion time reported by the scheduler.
    pub fn finished(&self) -> Option<&str> {
        self.info.finished.as_deref()
    }

    /// All observable fields.
    pub fn info(&self) -> &JobInfo {
        &self.info
    }

    pub(crate) fn info_mut(&mut self) -> &mut JobInfo {
        &mut self.info
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_terminal() {
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Canceled.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::New.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Unknown.is_terminal());
    }

    #[test]
    fn test_description_attributes() {
        let jd = JobDescription::new("/bin/sleep")
            .with_arg("10")
            .with_queue("batch")
            .with_total_cpu_count(4);

        assert_eq!(
            jd.attributes(),
            vec![
                JobAttribute::Executable,
                JobAttribute::Arguments,
                JobAttribute::Queue,
                JobAttribute::TotalCpuCount,
            ]
        );
    }

    #[test]
    fn test_check_attributes_names_offender() {
        let mut jd = JobDescription::new("/bin/hostname");
        jd.candidate_hosts = vec!["node01".to_string()];

        let err = jd
            .check_attributes(&[JobAttribute::Executable])
            .unwrap_err();
        assert!(matches!(
            err,
            SchedError::UnsupportedAttribute {
                attribute: JobAttribute::CandidateHosts
            }
        ));
    }

    #[test]
    fn test_environment_keeps_insertion_order() {
        let jd = JobDescription::new("env")
            .with_env("ZETA", "1")
            .with_env("ALPHA", "2");
        let keys: Vec<&str> = jd.environment.keys().map(String::as_str).collect();
        assert_eq!(keys, ["ZETA", "ALPHA"]);
    }

    #[test]
    fn test_new_handle() {
        let handle = JobHandle::new();
        assert!(handle.id().is_none());
        assert_eq!(handle.state(), JobState::New);
        assert!(handle.execution_hosts().is_empty());
        assert!(handle.exit_code().is_none());
    }

    #[test]
    fn test_attach_handle() {
        let handle = JobHandle::attach("[pbs+ssh://cluster.example.org]-[4711.head]").unwrap();
        let id = handle.id().unwrap();
        assert_eq!(id.endpoint(), "pbs+ssh://cluster.example.org");
        assert_eq!(id.raw(), "4711.head");
        assert_eq!(handle.state(), JobState::Unknown);

        assert!(matches!(
            JobHandle::attach("4711.head"),
            Err(SchedError::MalformedIdentifier(_))
        ));
    }
}
