//! Shared helpers for CLI commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use console::{StyledObject, style};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use qlink_sched::{
    AsyncPbsJobService, JobDescription, JobHandle, JobId, JobState, LoggingConfig, QlinkConfig,
};

/// Job description options shared by `submit` and `script`.
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Program to run
    pub executable: String,

    /// Program arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Job name
    #[arg(short = 'N', long)]
    pub name: Option<String>,

    /// Queue to submit to
    #[arg(short, long)]
    pub queue: Option<String>,

    /// Project/account to charge
    #[arg(short = 'A', long)]
    pub project: Option<String>,

    /// Wall-time limit in minutes
    #[arg(short, long)]
    pub walltime: Option<u32>,

    /// Total number of CPUs
    #[arg(short = 'n', long)]
    pub cpus: Option<u32>,

    /// Working directory on the cluster
    #[arg(short = 'd', long)]
    pub workdir: Option<PathBuf>,

    /// Standard output file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Standard error file
    #[arg(short, long)]
    pub error: Option<PathBuf>,

    /// Environment variable (KEY=VALUE), repeatable
    #[arg(long = "env", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Mail the owner when the job begins, ends or aborts
    #[arg(long)]
    pub notify: bool,
}

impl JobArgs {
    /// Build the job description.
    pub fn into_description(self) -> JobDescription {
        let mut jd = JobDescription::new(self.executable).with_args(self.args);
        for (key, value) in self.env {
            jd = jd.with_env(key, value);
        }
        jd.name = self.name;
        jd.queue = self.queue;
        jd.project = self.project;
        jd.wall_time_limit = self.walltime;
        jd.total_cpu_count = self.cpus;
        jd.working_directory = self.workdir;
        jd.output = self.output;
        jd.error = self.error;
        if self.notify {
            jd.notify = Some(true);
        }
        jd
    }
}

/// Parse a `KEY=VALUE` pair.
pub fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// Load configuration: file, then environment, then the `--url` flag.
pub fn load_config(path: Option<&Path>, url: Option<&str>) -> Result<QlinkConfig> {
    let mut config = QlinkConfig::load(path).context("Failed to load configuration")?;
    if let Some(url) = url {
        config.endpoint = url.to_string();
        config.validate().context("Invalid --url")?;
    }
    Ok(config)
}

/// Install the tracing subscriber.
///
/// `-v` flags take precedence over the configured level.
pub fn init_logging(verbose: u8, logging: &LoggingConfig) {
    let filter = match verbose {
        0 => logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Connect to the configured endpoint.
pub async fn connect(config: &QlinkConfig) -> Result<AsyncPbsJobService> {
    debug!("Connecting to {}", config.endpoint);
    AsyncPbsJobService::from_config(config.clone())
        .await
        .with_context(|| format!("Failed to connect to {}", config.endpoint))
}

/// Parse a job id and connect to the endpoint it names.
pub async fn connect_for_job(
    config: &QlinkConfig,
    job_id: &str,
) -> Result<(AsyncPbsJobService, JobHandle)> {
    let handle =
        JobHandle::attach(job_id).map_err(|e| anyhow::anyhow!("Invalid job ID '{job_id}': {e}"))?;
    let config = config_for_job(config, handle.id());
    let service = connect(&config).await?;
    Ok((service, handle))
}

/// The configuration with its endpoint replaced by the job's.
pub fn config_for_job(config: &QlinkConfig, id: Option<&JobId>) -> QlinkConfig {
    let mut config = config.clone();
    if let Some(id) = id {
        config.endpoint = id.endpoint().to_string();
    }
    config
}

/// Print a value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Style a state name by how it ended.
pub fn styled_state(state: JobState) -> StyledObject<&'static str> {
    let name = state.name();
    match state {
        JobState::Done => style(name).green().bold(),
        JobState::Failed | JobState::Canceled => style(name).red().bold(),
        JobState::Pending | JobState::New => style(name).yellow().bold(),
        JobState::Running => style(name).cyan().bold(),
        JobState::Unknown => style(name).dim().bold(),
    }
}

/// Print the fields of a handle.
pub fn print_handle(handle: &JobHandle) {
    if let Some(id) = handle.id() {
        println!("  {:<10} {}", style("Job").bold(), style(id).dim());
    }
    println!("  {:<10} {}", style("State").bold(), styled_state(handle.state()));
    if let Some(code) = handle.exit_code() {
        println!("  {:<10} {}", style("Exit code").bold(), code);
    }
    if !handle.execution_hosts().is_empty() {
        println!(
            "  {:<10} {}",
            style("Hosts").bold(),
            handle.execution_hosts().join(", ")
        );
    }
    for (label, value) in [
        ("Created", handle.created()),
        ("Started", handle.started()),
        ("Finished", handle.finished()),
    ] {
        if let Some(value) = value {
            println!("  {:<10} {}", style(label).bold(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_pair() {
        assert_eq!(
            parse_env_pair("OMP_NUM_THREADS=4").unwrap(),
            ("OMP_NUM_THREADS".to_string(), "4".to_string())
        );
        assert_eq!(
            parse_env_pair("OPTS=a=b").unwrap(),
            ("OPTS".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_env_pair("EMPTY=").unwrap().1, "");
        assert!(parse_env_pair("NOVALUE").is_err());
        assert!(parse_env_pair("=x").is_err());
    }

    #[test]
    fn test_into_description() {
        let args = JobArgs {
            executable: "/bin/sleep".to_string(),
            args: vec!["60".to_string()],
            name: Some("nap".to_string()),
            queue: Some("batch".to_string()),
            project: None,
            walltime: Some(5),
            cpus: Some(2),
            workdir: None,
            output: None,
            error: None,
            env: vec![("B".to_string(), "2".to_string()), ("A".to_string(), "1".to_string())],
            notify: false,
        };
        let jd = args.into_description();
        assert_eq!(jd.executable, "/bin/sleep");
        assert_eq!(jd.arguments, ["60"]);
        assert_eq!(jd.name.as_deref(), Some("nap"));
        assert_eq!(jd.wall_time_limit, Some(5));
        assert_eq!(jd.notify, None);
        let keys: Vec<&str> = jd.environment.keys().map(String::as_str).collect();
        assert_eq!(keys, ["B", "A"]);
    }

    #[test]
    fn test_config_for_job_uses_job_endpoint() {
        let config = QlinkConfig::default();
        let id = JobId::new("pbs+ssh://bob@hpc.example.org", "1.hpc");
        assert_eq!(
            config_for_job(&config, Some(&id)).endpoint,
            "pbs+ssh://bob@hpc.example.org"
        );
        assert_eq!(config_for_job(&config, None).endpoint, "pbs://localhost");
    }
}
