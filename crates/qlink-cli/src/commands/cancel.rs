//! Cancel command implementation.

use anyhow::Result;
use console::style;

use qlink_sched::{JobService, QlinkConfig};

use super::common::{connect_for_job, print_json};

/// Execute the cancel command.
pub async fn execute(config: &QlinkConfig, job_id: &str, json: bool) -> Result<()> {
    let (service, mut handle) = connect_for_job(config, job_id).await?;

    service
        .cancel(&mut handle)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to cancel job: {e}"))?;

    if json {
        return print_json(&handle);
    }

    println!(
        "{} Cancelled {}",
        style("✓").green().bold(),
        style(job_id).dim()
    );
    Ok(())
}
