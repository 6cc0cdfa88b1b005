//! Submit command implementation.
//!
//! Compiles a job description into a PBS script and submits it, optionally
//! waiting for the job to finish.

use anyhow::Result;
use console::style;

use qlink_sched::{JobService, QlinkConfig, wait_timeout_from_secs};

use super::common::{JobArgs, connect, print_handle, print_json};
use super::wait::wait_with_spinner;

/// Execute the submit command.
pub async fn execute(
    config: &QlinkConfig,
    job: JobArgs,
    wait: bool,
    timeout: f64,
    json: bool,
) -> Result<()> {
    let jd = job.into_description();
    let service = connect(config).await?;

    if !json {
        println!(
            "{} Submitting {} to {}",
            style("→").cyan().bold(),
            style(&jd.executable).green(),
            style(service.service().endpoint()).magenta()
        );
    }

    let mut handle = service
        .submit(&jd)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to submit job: {e}"))?;

    if !json {
        if let Some(id) = handle.id() {
            println!("{} Submitted {}", style("✓").green().bold(), style(id).cyan());
        }
    }

    if wait {
        let finished =
            wait_with_spinner(&service, &mut handle, wait_timeout_from_secs(timeout), json).await?;
        if !finished {
            anyhow::bail!(
                "Timeout after {}s. Job is still {}.",
                timeout,
                handle.state()
            );
        }
    }

    if json {
        print_json(&handle)
    } else {
        if wait {
            print_handle(&handle);
        }
        Ok(())
    }
}
