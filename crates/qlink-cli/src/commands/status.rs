//! Status command implementation.

use anyhow::Result;

use qlink_sched::{JobService, QlinkConfig};

use super::common::{connect_for_job, print_handle, print_json};

/// Execute the status command.
pub async fn execute(config: &QlinkConfig, job_id: &str, json: bool) -> Result<()> {
    let (service, mut handle) = connect_for_job(config, job_id).await?;

    service
        .poll(&mut handle)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get status: {e}"))?;

    if json {
        print_json(&handle)
    } else {
        print_handle(&handle);
        Ok(())
    }
}
