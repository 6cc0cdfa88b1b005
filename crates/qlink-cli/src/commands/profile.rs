//! Profile command implementation.
//!
//! Show what session discovery found out about the cluster.

use anyhow::Result;
use console::style;
use serde::Serialize;

use qlink_sched::{ClusterProfile, QlinkConfig};

use super::common::{connect, print_json};

#[derive(Serialize)]
struct ProfileReport<'a> {
    endpoint: &'a str,
    transport: &'static str,
    #[serde(flatten)]
    profile: &'a ClusterProfile,
}

/// Execute the profile command.
pub async fn execute(config: &QlinkConfig, json: bool) -> Result<()> {
    let service = connect(config).await?;
    let session = service.service().session();

    if json {
        return print_json(&ProfileReport {
            endpoint: session.endpoint().as_str(),
            transport: session.transport().as_str(),
            profile: session.profile(),
        });
    }

    let profile = session.profile();
    println!("{} {}", style("Endpoint:").bold(), session.endpoint());
    println!("{} {}", style("Transport:").bold(), session.transport());
    println!(
        "{} {}",
        style("Cores per node:").bold(),
        style(profile.cores_per_node).yellow()
    );
    println!("{} {}", style("Cray:").bold(), profile.is_cray);

    println!("\n{}", style("Tools:").bold());
    for (name, tool) in &profile.tools {
        println!(
            "  {:<10} {:<10} {}",
            style(name).cyan(),
            tool.version,
            style(&tool.path).dim()
        );
    }

    Ok(())
}
