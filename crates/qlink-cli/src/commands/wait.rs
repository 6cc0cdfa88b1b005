//! Wait command implementation.
//!
//! Block until a job reaches a terminal state or the timeout passes.

use std::time::Duration;

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use qlink_sched::{AsyncPbsJobService, JobHandle, JobService, QlinkConfig, wait_timeout_from_secs};

use super::common::{connect_for_job, print_handle, print_json};

/// Execute the wait command.
pub async fn execute(config: &QlinkConfig, job_id: &str, timeout: f64, json: bool) -> Result<()> {
    let (service, mut handle) = connect_for_job(config, job_id).await?;

    if !json {
        let limit = if timeout < 0.0 {
            "none".to_string()
        } else {
            format!("{timeout}s")
        };
        println!(
            "{} Waiting for job {} (timeout: {})",
            style("→").cyan().bold(),
            style(job_id).dim(),
            limit
        );
    }

    let finished =
        wait_with_spinner(&service, &mut handle, wait_timeout_from_secs(timeout), json).await?;

    if !finished {
        anyhow::bail!(
            "Timeout after {}s. Job {} is still {}. Use 'qlink status {}' to check later.",
            timeout,
            job_id,
            handle.state(),
            job_id
        );
    }

    if json {
        print_json(&handle)
    } else {
        print_handle(&handle);
        Ok(())
    }
}

/// Wait on `handle`, showing a spinner unless JSON output was requested.
pub async fn wait_with_spinner(
    service: &AsyncPbsJobService,
    handle: &mut JobHandle,
    timeout: Option<Duration>,
    json: bool,
) -> Result<bool> {
    let spinner = if json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message("Waiting for job to complete...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = service.wait(handle, timeout).await;
    spinner.finish_and_clear();

    result.map_err(|e| anyhow::anyhow!("Failed to wait for job: {e}"))
}
