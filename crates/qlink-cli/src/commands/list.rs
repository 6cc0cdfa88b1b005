//! List command implementation.

use anyhow::Result;
use console::style;

use qlink_sched::{JobService, QlinkConfig};

use super::common::{connect, print_json};

/// Execute the list command.
pub async fn execute(config: &QlinkConfig, json: bool) -> Result<()> {
    let service = connect(config).await?;

    let ids = service
        .list()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list jobs: {e}"))?;

    if json {
        return print_json(&ids);
    }

    if ids.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    println!("{} {} job(s):\n", style("→").cyan().bold(), ids.len());
    for id in &ids {
        println!("  {id}");
    }

    Ok(())
}
