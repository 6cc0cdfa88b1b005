//! Parsers for PBS command output.
//!
//! Parsing is lenient throughout: lines and codes that are not understood
//! are skipped, so output drift across Torque/PBS versions degrades to
//! missing fields instead of errors.

use tracing::trace;

use crate::id::JobId;
use crate::job::{JobInfo, JobState};

/// Status fields extracted by the filtered `qstat -f1` query.
pub const STATUS_FIELDS: &[&str] = &[
    "job_state",
    "exec_host",
    "exit_status",
    "ctime",
    "start_time",
    "comp_time",
];

/// Translate a PBS one-letter state code into a canonical state.
///
/// ```text
/// C  completed            -> DONE
/// E  exiting              -> RUNNING
/// H  held                 -> PENDING
/// Q  queued               -> PENDING
/// R  running              -> RUNNING
/// T  being moved          -> RUNNING
/// W  waiting for start    -> PENDING
/// S  suspended            -> PENDING
/// X  expired/deleted      -> CANCELED
/// *                       -> UNKNOWN
/// ```
pub fn translate_state(code: &str) -> JobState {
    match code.trim() {
        "C" => JobState::Done,
        "E" => JobState::Running,
        "H" => JobState::Pending,
        "Q" => JobState::Pending,
        "R" => JobState::Running,
        "T" => JobState::Running,
        "W" => JobState::Pending,
        "S" => JobState::Pending,
        "X" => JobState::Canceled,
        _ => JobState::Unknown,
    }
}

/// Fields recognized in a status query response. Absent fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusRecord {
    /// Canonical state translated from `job_state`.
    pub state: Option<JobState>,
    /// `exec_host`, split on `+`.
    pub execution_hosts: Option<Vec<String>>,
    /// `exit_status`, when it parses as an integer.
    pub exit_status: Option<i32>,
    /// `ctime`, verbatim.
    pub created: Option<String>,
    /// `start_time`, verbatim.
    pub started: Option<String>,
    /// `comp_time`, verbatim.
    pub finished: Option<String>,
}

impl StatusRecord {
    /// Merge this record into `info`.
    ///
    /// Present fields overwrite; absent fields leave the previous values in
    /// place. The exit code is only taken once the merged state is terminal.
    pub fn apply_to(&self, info: &mut JobInfo) {
        if let Some(state) = self.state {
            info.state = state;
        }
        if let Some(hosts) = &self.execution_hosts {
            info.execution_hosts = hosts.clone();
        }
        if let Some(created) = &self.created {
            info.created = Some(created.clone());
        }
        if let Some(started) = &self.started {
            info.started = Some(started.clone());
        }
        if let Some(finished) = &self.finished {
            info.finished = Some(finished.clone());
        }
        if info.state.is_terminal() && self.exit_status.is_some() {
            info.exit_code = self.exit_status;
        }
    }
}

/// Parse `key = value` lines of a `qstat -f1` response.
///
/// ```text
///     job_state = C
///     exec_host = i72/0+i72/1
///     exit_status = 0
///     ctime = Mon Oct 19 10:12:01 2026
/// ```
///
/// Lines without exactly one `=` are ignored, as are unknown keys.
pub fn parse_status_record(output: &str) -> StatusRecord {
    let mut record = StatusRecord::default();

    for line in output.lines() {
        let mut parts = line.split('=');
        let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "job_state" => record.state = Some(translate_state(value)),
            "exec_host" => {
                record.execution_hosts = Some(value.split('+').map(str::to_string).collect());
            }
            "exit_status" => match value.parse() {
                Ok(code) => record.exit_status = Some(code),
                Err(_) => trace!("ignoring non-numeric exit_status '{}'", value),
            },
            "ctime" => record.created = Some(value.to_string()),
            "start_time" => record.started = Some(value.to_string()),
            "comp_time" => record.finished = Some(value.to_string()),
            _ => {}
        }
    }

    record
}

/// Extract the version from `<tool> --version` output.
///
/// Torque prints `version: 4.2.10`; the version is the second
/// whitespace-separated token.
pub fn parse_tool_version(output: &str) -> Option<String> {
    output.split_whitespace().nth(1).map(str::to_string)
}

/// Collect per-node core counts from `pbsnodes -a` output, in listing
/// order. Only `np = <n>` lines are counted.
pub fn parse_node_core_counts(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(" = ")?;
            if key.trim() != "np" {
                return None;
            }
            value.trim().parse().ok()
        })
        .collect()
}

/// Parse `qstat -a` output into job ids on `endpoint`.
///
/// ```text
/// cluster.example.org:
///                                                          Req'd  Req'd   Elap
/// Job ID          Username Queue    Jobname  SessID NDS TSK Memory Time  S Time
/// --------------- -------- -------- -------- ------ --- --- ------ ----- - -----
/// 4711.cluster    alice    batch    sim01     12345   1   8    --  01:00 R 00:12
/// ```
///
/// Every line whose first token starts with a digit is a job line.
pub fn parse_qstat_list(output: &str, endpoint: &str) -> Vec<JobId> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|token| token.starts_with(|c: char| c.is_ascii_digit()))
        .map(|raw| JobId::new(endpoint, raw))
        .collect()
}
