//! Error handling for the PBS job adaptor.

use thiserror::Error;

use crate::job::JobAttribute;

/// Result type for adaptor operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur while driving a PBS cluster.
///
/// Every variant raised by a remote command carries the raw command output,
/// so a failure can be diagnosed without re-running the command.
#[derive(Error, Debug)]
pub enum SchedError {
    /// A required PBS tool could not be found or did not report a version.
    #[error("Error finding PBS tool '{tool}': {message}")]
    ToolDiscovery { tool: String, message: String },

    /// The node listing used to infer the cluster profile failed.
    #[error("Error discovering cluster profile: {0}")]
    ClusterDiscovery(String),

    /// The job description sets an attribute this adaptor does not support.
    #[error("'{attribute}' is not supported by the PBS adaptor")]
    UnsupportedAttribute { attribute: JobAttribute },

    /// qsub rejected the job.
    #[error("Error running qsub: {message}. Script was:\n{script}")]
    Submission { message: String, script: String },

    /// qstat failed while querying a job.
    #[error("Error retrieving job info via qstat: {0}")]
    Query(String),

    /// qdel failed.
    #[error("Error canceling job via qdel: {0}")]
    Cancellation(String),

    /// qstat failed while listing jobs.
    #[error("Failed to list jobs via qstat: {0}")]
    List(String),

    /// A job identifier does not follow the `[endpoint]-[id]` grammar.
    #[error("Cannot parse job id '{0}'")]
    MalformedIdentifier(String),

    /// The handle has no scheduler id yet.
    #[error("Job has not been submitted")]
    NotSubmitted,

    /// The endpoint URL uses a scheme this adaptor does not serve.
    #[error("Unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),

    /// The endpoint URL could not be parsed.
    #[error("Invalid endpoint '{url}': {message}")]
    InvalidEndpoint { url: String, message: String },

    /// The transport could not run the command at all.
    #[error("Command failed: {command} - {message}")]
    Transport { command: String, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error, e.g. a background task that panicked.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for SchedError {
    fn from(e: tokio::task::JoinError) -> Self {
        SchedError::Internal(format!("background task failed: {e}"))
    }
}

impl From<crate::config::ConfigError> for SchedError {
    fn from(e: crate::config::ConfigError) -> Self {
        SchedError::Config(e.to_string())
    }
}
