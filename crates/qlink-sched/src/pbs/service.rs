//! PBS job service: submission, status, cancellation and waiting.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::QlinkConfig;
use crate::endpoint::{Endpoint, TransportScheme};
use crate::error::{SchedError, SchedResult};
use crate::id::JobId;
use crate::job::{JobAttribute, JobDescription, JobHandle, JobInfo, JobState};
use crate::pbs::discovery::{self, ClusterProfile};
use crate::pbs::parser::{self, STATUS_FIELDS};
use crate::pbs::templates;
use crate::transport::{self, CommandChannel, CommandOutput};

/// Job description attributes the PBS adaptor accepts.
pub const SUPPORTED_ATTRIBUTES: &[JobAttribute] = &[
    JobAttribute::Name,
    JobAttribute::Executable,
    JobAttribute::Arguments,
    JobAttribute::Environment,
    JobAttribute::WorkingDirectory,
    JobAttribute::Output,
    JobAttribute::Error,
    JobAttribute::WallTimeLimit,
    JobAttribute::Queue,
    JobAttribute::Project,
    JobAttribute::TotalCpuCount,
    JobAttribute::JobContact,
];

/// Default interval between status queries in [`PbsJobService::wait`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Base delimiter of the here-document that feeds the script to qsub.
const HEREDOC_DELIMITER: &str = "QLINK_EOF";

/// A connection to one PBS resource manager.
///
/// Holds the endpoint, the profile discovered when the session opened and
/// the command channel. Commands are serialized through the channel lock.
pub struct PbsSession {
    endpoint: Endpoint,
    profile: ClusterProfile,
    channel: Mutex<Box<dyn CommandChannel>>,
}

impl PbsSession {
    /// Open a session over `channel`, discovering the cluster profile.
    pub fn open(endpoint: Endpoint, mut channel: Box<dyn CommandChannel>) -> SchedResult<Self> {
        info!(
            "Opening PBS session to {} via {}",
            endpoint,
            endpoint.transport()
        );
        let profile = discovery::discover(channel.as_mut())?;
        Ok(Self {
            endpoint,
            profile,
            channel: Mutex::new(channel),
        })
    }

    /// Endpoint the session is bound to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Transport used to reach the resource manager.
    pub fn transport(&self) -> TransportScheme {
        self.endpoint.transport()
    }

    /// Cluster profile discovered when the session opened.
    pub fn profile(&self) -> &ClusterProfile {
        &self.profile
    }

    /// Run one command on the resource manager.
    pub fn run(&self, command: &str) -> SchedResult<CommandOutput> {
        debug!("running: {}", command);
        let output = self.channel.lock().run_sync(command)?;
        debug!("exit code {}", output.exit_code);
        Ok(output)
    }

    fn tool(&self, name: &'static str) -> &str {
        self.profile.tool_path(name)
    }
}

impl std::fmt::Debug for PbsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PbsSession")
            .field("endpoint", &self.endpoint)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

/// Synchronous PBS job service.
///
/// The service holds no job state: every operation works on the
/// [`JobHandle`] the caller passes in.
#[derive(Debug)]
pub struct PbsJobService {
    session: PbsSession,
    poll_interval: Duration,
}

impl PbsJobService {
    /// Connect to the resource manager at `url` with default settings.
    pub fn connect(url: &str) -> SchedResult<Self> {
        let endpoint = Endpoint::parse(url)?;
        let channel = transport::open_channel(&endpoint, None)?;
        Self::open(endpoint, channel, DEFAULT_POLL_INTERVAL)
    }

    /// Connect using a loaded configuration.
    pub fn from_config(config: &QlinkConfig) -> SchedResult<Self> {
        let endpoint = config.endpoint()?;
        let channel = transport::open_channel(&endpoint, config.ssh_port)?;
        Self::open(endpoint, channel, config.poll_interval())
    }

    /// Connect over a caller-supplied channel.
    pub fn with_channel<C>(endpoint: Endpoint, channel: C) -> SchedResult<Self>
    where
        C: CommandChannel + 'static,
    {
        Self::open(endpoint, Box::new(channel), DEFAULT_POLL_INTERVAL)
    }

    fn open(
        endpoint: Endpoint,
        channel: Box<dyn CommandChannel>,
        poll_interval: Duration,
    ) -> SchedResult<Self> {
        Ok(Self {
            session: PbsSession::open(endpoint, channel)?,
            poll_interval,
        })
    }

    /// Set the interval between status queries while waiting.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The underlying session.
    pub fn session(&self) -> &PbsSession {
        &self.session
    }

    /// Endpoint the service is bound to.
    pub fn endpoint(&self) -> &Endpoint {
        self.session.endpoint()
    }

    /// Cluster profile discovered at connect time.
    pub fn profile(&self) -> &ClusterProfile {
        self.session.profile()
    }

    /// Interval between status queries while waiting.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Attributes a description may set.
    pub fn supported_attributes(&self) -> &'static [JobAttribute] {
        SUPPORTED_ATTRIBUTES
    }

    /// Render the submission script for `jd` without submitting it.
    pub fn compile(&self, jd: &JobDescription) -> SchedResult<String> {
        jd.check_attributes(SUPPORTED_ATTRIBUTES)?;
        Ok(templates::compile_script(jd, self.profile()))
    }

    /// Submit a job.
    ///
    /// The description is checked against [`SUPPORTED_ATTRIBUTES`] before
    /// anything is sent to the cluster.
    pub fn submit(&self, jd: &JobDescription) -> SchedResult<JobHandle> {
        let script = self.compile(jd)?;
        debug!("generated PBS script:\n{}", script);

        let delimiter = heredoc_delimiter(&script);
        let command = format!(
            "{} <<'{delimiter}'\n{script}{delimiter}",
            self.session.tool("qsub")
        );
        let output = self.session.run(&command)?;
        if !output.success() {
            return Err(SchedError::Submission {
                message: output.diagnostic(),
                script,
            });
        }

        let raw = output.stdout.trim();
        if raw.is_empty() {
            return Err(SchedError::Submission {
                message: "qsub printed no job id".to_string(),
                script,
            });
        }

        let id = JobId::new(self.endpoint().as_str(), raw);
        info!("Submitted PBS job {}", id);
        Ok(JobHandle::submitted(id))
    }

    /// Refresh `handle` from the scheduler and return its fields.
    ///
    /// Handles in a terminal state, and handles that were never submitted,
    /// are answered from the cached values without a remote query.
    pub fn poll(&self, handle: &mut JobHandle) -> SchedResult<JobInfo> {
        if handle.state().is_terminal() {
            return Ok(handle.info().clone());
        }
        let Some(id) = handle.id().cloned() else {
            return Ok(handle.info().clone());
        };

        let command = format!(
            "{} -f1 {} | egrep '{}'",
            self.session.tool("qstat"),
            id.raw(),
            status_pattern()
        );
        let output = self.session.run(&command)?;
        if !output.success() {
            return Err(SchedError::Query(output.diagnostic()));
        }

        let previous = handle.state();
        parser::parse_status_record(&output.stdout).apply_to(handle.info_mut());
        if handle.state() != previous {
            info!("Job {} changed state: {} -> {}", id, previous, handle.state());
        }

        Ok(handle.info().clone())
    }

    /// Cancel a job.
    ///
    /// On success the handle is marked CANCELED right away; the scheduler
    /// is not asked to confirm.
    pub fn cancel(&self, handle: &mut JobHandle) -> SchedResult<()> {
        let id = handle.id().ok_or(SchedError::NotSubmitted)?;

        let command = format!("{} {}", self.session.tool("qdel"), id.raw());
        let output = self.session.run(&command)?;
        if !output.success() {
            return Err(SchedError::Cancellation(output.diagnostic()));
        }

        info!("Cancelled PBS job {}", id);
        handle.info_mut().state = JobState::Canceled;
        Ok(())
    }

    /// Wait for a job to reach a terminal state.
    ///
    /// Returns `true` once the job is terminal and `false` when `timeout`
    /// passes first. `None` waits without limit. The timeout is checked
    /// after each sleep, so a zero timeout still polls once.
    pub fn wait(&self, handle: &mut JobHandle, timeout: Option<Duration>) -> SchedResult<bool> {
        if handle.id().is_none() {
            return Err(SchedError::NotSubmitted);
        }

        let start = Instant::now();
        loop {
            let info = self.poll(handle)?;
            if info.state.is_terminal() {
                return Ok(true);
            }

            std::thread::sleep(self.poll_interval);

            if timeout.is_some_and(|limit| start.elapsed() > limit) {
                debug!("wait timed out after {:?}", start.elapsed());
                return Ok(false);
            }
        }
    }

    /// Ids of the calling user's jobs known to the scheduler.
    pub fn list(&self) -> SchedResult<Vec<JobId>> {
        let command = format!("{} -a -u $(whoami)", self.session.tool("qstat"));
        let output = self.session.run(&command)?;
        if !output.success() {
            return Err(SchedError::List(output.diagnostic()));
        }
        Ok(parser::parse_qstat_list(&output.stdout, self.endpoint().as_str()))
    }

    /// Re-address a job from its textual id.
    pub fn attach(&self, id: &str) -> SchedResult<JobHandle> {
        JobHandle::attach(id)
    }
}

/// Convert a timeout in seconds, negative meaning "no limit".
pub fn wait_timeout_from_secs(secs: f64) -> Option<Duration> {
    if secs < 0.0 {
        None
    } else {
        Duration::try_from_secs_f64(secs).ok()
    }
}

/// Here-document delimiter that no line of `script` equals.
fn heredoc_delimiter(script: &str) -> String {
    let mut delimiter = HEREDOC_DELIMITER.to_string();
    while script.lines().any(|line| line == delimiter) {
        delimiter.push('_');
    }
    delimiter
}

/// `egrep` pattern selecting the status fields.
fn status_pattern() -> String {
    STATUS_FIELDS
        .iter()
        .map(|field| format!("({field})"))
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockChannel;

    fn service(mock: &MockChannel) -> PbsJobService {
        let endpoint = Endpoint::parse("pbs+ssh://alice@cluster.example.org").unwrap();
        PbsJobService::with_channel(endpoint, mock.clone())
            .unwrap()
            .with_poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn test_status_pattern() {
        assert_eq!(
            status_pattern(),
            "(job_state)|(exec_host)|(exit_status)|(ctime)|(start_time)|(comp_time)"
        );
    }

    #[test]
    fn test_wait_timeout_from_secs() {
        assert_eq!(wait_timeout_from_secs(-1.0), None);
        assert_eq!(wait_timeout_from_secs(0.0), Some(Duration::ZERO));
        assert_eq!(wait_timeout_from_secs(2.5), Some(Duration::from_millis(2500)));
        assert_eq!(wait_timeout_from_secs(f64::INFINITY), None);
    }

    #[test]
    fn test_submit_pipes_script_to_qsub() {
        let mock = MockChannel::pbs_cluster(&[8], false);
        mock.respond("/usr/bin/qsub <<", CommandOutput::ok("4711.head01\n"));
        let svc = service(&mock);
        mock.clear_log();

        let jd = JobDescription::new("/bin/date").with_name("clock");
        let handle = svc.submit(&jd).unwrap();

        assert_eq!(
            handle.id().unwrap().to_string(),
            "[pbs+ssh://alice@cluster.example.org]-[4711.head01]"
        );
        assert_eq!(handle.state(), JobState::Pending);

        let commands = mock.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(
            commands[0],
            "/usr/bin/qsub <<'QLINK_EOF'\n#!/bin/bash\n#PBS -N clock\n#PBS -V\n/bin/date\nQLINK_EOF"
        );
    }

    #[test]
    fn test_heredoc_delimiter_avoids_script_lines() {
        assert_eq!(heredoc_delimiter("#!/bin/bash\n/bin/date\n"), "QLINK_EOF");
        assert_eq!(
            heredoc_delimiter("#!/bin/bash\nQLINK_EOF\nQLINK_EOF_\n"),
            "QLINK_EOF__"
        );
        assert_eq!(heredoc_delimiter("echo QLINK_EOF\n"), "QLINK_EOF");
    }

    #[test]
    fn test_submit_keeps_command_matching_delimiter() {
        let mock = MockChannel::pbs_cluster(&[8], false);
        mock.respond("/usr/bin/qsub <<", CommandOutput::ok("4712.head01\n"));
        let svc = service(&mock);
        mock.clear_log();

        svc.submit(&JobDescription::new("QLINK_EOF")).unwrap();

        let commands = mock.commands();
        assert_eq!(
            commands[0],
            "/usr/bin/qsub <<'QLINK_EOF_'\n#!/bin/bash\n#PBS -V\nQLINK_EOF\nQLINK_EOF_"
        );
    }

    #[test]
    fn test_submit_failure_carries_script() {
        let mock = MockChannel::pbs_cluster(&[8], false);
        mock.respond(
            "/usr/bin/qsub <<",
            CommandOutput::failed(1, "qsub: Unknown queue MSG=cannot locate queue"),
        );
        let svc = service(&mock);

        let err = svc
            .submit(&JobDescription::new("a.out").with_queue("nope"))
            .unwrap_err();
        match err {
            SchedError::Submission { message, script } => {
                assert!(message.contains("Unknown queue"));
                assert!(script.contains("#PBS -q nope"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_submit_without_job_id() {
        let mock = MockChannel::pbs_cluster(&[8], false);
        mock.respond("/usr/bin/qsub <<", CommandOutput::ok("\n"));
        let svc = service(&mock);
        assert!(matches!(
            svc.submit(&JobDescription::new("a.out")),
            Err(SchedError::Submission { .. })
        ));
    }

    #[test]
    fn test_poll_unsubmitted_handle_is_local() {
        let mock = MockChannel::pbs_cluster(&[8], false);
        let svc = service(&mock);
        mock.clear_log();

        let mut handle = JobHandle::new();
        let info = svc.poll(&mut handle).unwrap();
        assert_eq!(info.state, JobState::New);
        assert_eq!(mock.command_count(), 0);
    }

    #[test]
    fn test_poll_query_failure() {
        let mock = MockChannel::pbs_cluster(&[8], false);
        mock.respond(
            "qstat -f1",
            CommandOutput::failed(153, "qstat: Unknown Job Id 9.head01"),
        );
        let svc = service(&mock);

        let mut handle = svc.attach("[pbs+ssh://alice@cluster.example.org]-[9.head01]").unwrap();
        assert!(matches!(
            svc.poll(&mut handle),
            Err(SchedError::Query(ref m)) if m.contains("Unknown Job Id")
        ));
        assert_eq!(handle.state(), JobState::Unknown);
    }

    #[test]
    fn test_cancel() {
        let mock = MockChannel::pbs_cluster(&[8], false);
        mock.respond("/usr/bin/qdel 12.head01", CommandOutput::ok(""));
        let svc = service(&mock);
        mock.clear_log();

        let mut handle = svc.attach("[pbs+ssh://alice@cluster.example.org]-[12.head01]").unwrap();
        svc.cancel(&mut handle).unwrap();
        assert_eq!(handle.state(), JobState::Canceled);
        assert_eq!(mock.commands(), ["/usr/bin/qdel 12.head01"]);

        // Terminal now: no further queries
        svc.poll(&mut handle).unwrap();
        assert_eq!(mock.command_count(), 1);
    }

    #[test]
    fn test_cancel_errors() {
        let mock = MockChannel::pbs_cluster(&[8], false);
        mock.respond("qdel", CommandOutput::failed(1, "qdel: Unknown Job Id 3.x"));
        let svc = service(&mock);

        let mut unsubmitted = JobHandle::new();
        assert!(matches!(
            svc.cancel(&mut unsubmitted),
            Err(SchedError::NotSubmitted)
        ));

        let mut handle = svc.attach("[pbs://x]-[3.x]").unwrap();
        assert!(matches!(
            svc.cancel(&mut handle),
            Err(SchedError::Cancellation(_))
        ));
        assert_eq!(handle.state(), JobState::Unknown);
    }

    #[test]
    fn test_wait_unsubmitted() {
        let mock = MockChannel::pbs_cluster(&[8], false);
        let svc = service(&mock);
        assert!(matches!(
            svc.wait(&mut JobHandle::new(), Some(Duration::ZERO)),
            Err(SchedError::NotSubmitted)
        ));
    }

    #[test]
    fn test_compile_uses_profile() {
        let mock = MockChannel::pbs_cluster(&[12, 12, 24], false);
        let svc = service(&mock);
        let script = svc
            .compile(&JobDescription::new("a.out").with_total_cpu_count(30))
            .unwrap();
        assert!(script.contains("#PBS -l nodes=3:ppn=12\n"));
    }

    #[test]
    fn test_session_accessors() {
        let mock = MockChannel::pbs_cluster(&[8], true);
        let svc = service(&mock);
        assert_eq!(svc.session().transport(), TransportScheme::Ssh);
        assert!(svc.profile().is_cray);
        assert_eq!(svc.poll_interval(), Duration::from_millis(5));
        assert_eq!(svc.supported_attributes().len(), 12);
    }
}
