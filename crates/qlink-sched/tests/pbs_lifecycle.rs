//! PBS Lifecycle Tests
//!
//! These tests drive the PBS job service end to end against a scripted
//! command channel: discovery, submission, status polling, waiting,
//! cancellation and listing.
//!
//! Note: No cluster is required. Every command the service issues is
//! answered by a `MockChannel` and recorded, so tests can also assert which
//! commands were (or were not) sent.

use std::time::{Duration, Instant};

use qlink_sched::{
    CommandOutput, Endpoint, JobAttribute, JobDescription, JobHandle, JobState, MockChannel,
    PbsJobService, SchedError, wait_timeout_from_secs,
};

const ENDPOINT: &str = "pbs+ssh://alice@cluster.example.org";

/// Connect a service to a mock cluster with 8-core nodes.
fn connect(mock: &MockChannel) -> PbsJobService {
    let endpoint = Endpoint::parse(ENDPOINT).unwrap();
    let service = PbsJobService::with_channel(endpoint, mock.clone())
        .unwrap()
        .with_poll_interval(Duration::from_millis(10));
    mock.clear_log();
    service
}

fn attach(service: &PbsJobService, raw: &str) -> JobHandle {
    service.attach(&format!("[{ENDPOINT}]-[{raw}]")).unwrap()
}

#[test]
fn test_unsupported_attribute_issues_no_commands() {
    let mock = MockChannel::pbs_cluster(&[8, 8], false);
    let service = connect(&mock);

    let mut jd = JobDescription::new("/bin/hostname");
    jd.input = Some("/dev/null".into());

    let err = service.submit(&jd).unwrap_err();
    assert!(matches!(
        err,
        SchedError::UnsupportedAttribute {
            attribute: JobAttribute::Input
        }
    ));
    assert_eq!(mock.command_count(), 0);

    let mut jd = JobDescription::new("/bin/hostname");
    jd.total_physical_memory = Some(4096);
    assert!(service.submit(&jd).is_err());
    assert_eq!(mock.command_count(), 0);
}

#[test]
fn test_submit_poll_to_completion() {
    let mock = MockChannel::pbs_cluster(&[8, 8, 16], false);
    mock.respond("qsub <<", CommandOutput::ok("4711.head01\n"));
    mock.respond("qstat -f1 4711.head01", CommandOutput::ok("    job_state = Q\n"))
        .respond(
            "qstat -f1 4711.head01",
            CommandOutput::ok(
                "    job_state = R\n    exec_host = n07/0+n07/1\n    ctime = Mon Oct 19 10:12:01 2026\n    start_time = Mon Oct 19 10:14:37 2026\n",
            ),
        )
        .respond(
            "qstat -f1 4711.head01",
            CommandOutput::ok(
                "    job_state = C\n    exit_status = 0\n    comp_time = Mon Oct 19 11:02:10 2026\n",
            ),
        );
    let service = connect(&mock);

    let jd = JobDescription::new("/opt/sim/bin/run")
        .with_name("sim01")
        .with_total_cpu_count(17);
    let mut job = service.submit(&jd).unwrap();
    assert_eq!(job.state(), JobState::Pending);
    assert!(mock.commands()[0].contains("#PBS -l nodes=3:ppn=8\n"));

    assert_eq!(service.poll(&mut job).unwrap().state, JobState::Pending);

    let info = service.poll(&mut job).unwrap();
    assert_eq!(info.state, JobState::Running);
    assert_eq!(info.execution_hosts, ["n07/0", "n07/1"]);
    assert_eq!(info.exit_code, None);

    let info = service.poll(&mut job).unwrap();
    assert_eq!(info.state, JobState::Done);
    assert_eq!(info.exit_code, Some(0));
    // Fields missing from the last response keep their earlier values
    assert_eq!(info.execution_hosts, ["n07/0", "n07/1"]);
    assert_eq!(job.created(), Some("Mon Oct 19 10:12:01 2026"));
    assert_eq!(job.started(), Some("Mon Oct 19 10:14:37 2026"));
    assert_eq!(job.finished(), Some("Mon Oct 19 11:02:10 2026"));
}

#[test]
fn test_terminal_handles_are_not_queried() {
    let mock = MockChannel::pbs_cluster(&[8], false);
    mock.respond(
        "qstat -f1 5.head01",
        CommandOutput::ok("job_state = C\nexec_host = a/0+a/1\nexit_status = 0\n"),
    );
    let service = connect(&mock);

    let mut job = attach(&service, "5.head01");
    let first = service.poll(&mut job).unwrap();
    assert_eq!(first.state, JobState::Done);
    assert_eq!(first.execution_hosts, ["a/0", "a/1"]);
    assert_eq!(first.exit_code, Some(0));
    assert_eq!(mock.command_count(), 1);

    for _ in 0..3 {
        assert_eq!(service.poll(&mut job).unwrap(), first);
    }
    assert_eq!(mock.command_count(), 1);
}

#[test]
fn test_wait_zero_timeout_terminal() {
    let mock = MockChannel::pbs_cluster(&[8], false);
    mock.respond("qstat -f1", CommandOutput::ok("job_state = X\n"));
    let service = connect(&mock);

    let mut job = attach(&service, "6.head01");
    assert!(service.wait(&mut job, Some(Duration::ZERO)).unwrap());
    assert_eq!(job.state(), JobState::Canceled);
    assert_eq!(mock.command_count(), 1);
}

#[test]
fn test_wait_zero_timeout_never_terminal() {
    let mock = MockChannel::pbs_cluster(&[8], false);
    mock.respond("qstat -f1", CommandOutput::ok("job_state = R\n"));
    let service = connect(&mock);

    let mut job = attach(&service, "7.head01");
    let start = Instant::now();
    assert!(!service.wait(&mut job, Some(Duration::ZERO)).unwrap());
    assert!(start.elapsed() >= Duration::from_millis(10));
    assert_eq!(job.state(), JobState::Running);
    assert_eq!(mock.command_count(), 1);
}

#[test]
fn test_wait_times_out_after_several_polls() {
    let mock = MockChannel::pbs_cluster(&[8], false);
    mock.respond("qstat -f1", CommandOutput::ok("job_state = Q\n"));
    let service = connect(&mock);

    let mut job = attach(&service, "8.head01");
    let timeout = wait_timeout_from_secs(0.05);
    assert!(!service.wait(&mut job, timeout).unwrap());
    assert!(mock.command_count() >= 2);
}

#[test]
fn test_wait_propagates_query_errors() {
    let mock = MockChannel::pbs_cluster(&[8], false);
    mock.respond("qstat -f1", CommandOutput::ok("job_state = R\n"))
        .respond(
            "qstat -f1",
            CommandOutput::failed(153, "qstat: Unknown Job Id 9.head01"),
        );
    let service = connect(&mock);

    let mut job = attach(&service, "9.head01");
    let err = service.wait(&mut job, None).unwrap_err();
    assert!(matches!(err, SchedError::Query(ref m) if m.contains("Unknown Job Id")));
    assert_eq!(job.state(), JobState::Running);
}

#[test]
fn test_cancel_is_optimistic() {
    let mock = MockChannel::pbs_cluster(&[8], false);
    mock.respond("qsub <<", CommandOutput::ok("10.head01\n"));
    mock.respond("qdel 10.head01", CommandOutput::ok(""));
    let service = connect(&mock);

    let mut job = service.submit(&JobDescription::new("/bin/sleep").with_arg("600")).unwrap();
    service.cancel(&mut job).unwrap();
    assert_eq!(job.state(), JobState::Canceled);

    // No confirming status query, before or after
    assert!(service.wait(&mut job, Some(Duration::ZERO)).unwrap());
    assert!(!mock.commands().iter().any(|c| c.contains("qstat")));
}

#[test]
fn test_list_jobs() {
    let mock = MockChannel::pbs_cluster(&[8], false);
    mock.respond(
        "qstat -a -u $(whoami)",
        CommandOutput::ok(
            "\nhead01:\n                                                          Req'd  Req'd   Elap\nJob ID          Username Queue    Jobname  SessID NDS TSK Memory Time  S Time\n--------------- -------- -------- -------- ------ --- --- ------ ----- - -----\n11.head01       alice    batch    sim01     12345   1   8    --  01:00 R 00:12\n12.head01       alice    batch    sim02       --    1   8    --  01:00 Q   --\n",
        ),
    );
    let service = connect(&mock);

    let ids = service.list().unwrap();
    let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        [
            "[pbs+ssh://alice@cluster.example.org]-[11.head01]",
            "[pbs+ssh://alice@cluster.example.org]-[12.head01]",
        ]
    );

    // Listed ids re-attach to live handles
    let handle = service.attach(&rendered[0]).unwrap();
    assert_eq!(handle.id(), Some(&ids[0]));
}

#[test]
fn test_list_failure() {
    let mock = MockChannel::pbs_cluster(&[8], false);
    mock.respond("qstat -a", CommandOutput::failed(2, "qstat: cannot connect to server"));
    let service = connect(&mock);
    assert!(matches!(service.list(), Err(SchedError::List(_))));
}

#[test]
fn test_discovery_failures_abort_connect() {
    let endpoint = Endpoint::parse(ENDPOINT).unwrap();

    let mock = MockChannel::pbs_cluster(&[8], false);
    mock.forget("which qdel");
    mock.respond("which qdel", CommandOutput::failed(1, ""));
    let err = PbsJobService::with_channel(endpoint.clone(), mock).unwrap_err();
    assert!(matches!(err, SchedError::ToolDiscovery { ref tool, .. } if tool == "qdel"));

    let mock = MockChannel::pbs_cluster(&[], false);
    let err = PbsJobService::with_channel(endpoint, mock).unwrap_err();
    assert!(matches!(err, SchedError::ClusterDiscovery(_)));
}

#[test]
fn test_cray_cluster_requests_cores() {
    let mock = MockChannel::pbs_cluster(&[24, 24], true);
    mock.respond("qsub <<", CommandOutput::ok("13.sdb\n"));
    let service = connect(&mock);
    assert!(service.profile().is_cray);

    service
        .submit(&JobDescription::new("a.out").with_total_cpu_count(48))
        .unwrap();
    let script = &mock.commands()[0];
    assert!(script.contains("#PBS -l size=48\n"));
    assert!(!script.contains("ppn="));
}
