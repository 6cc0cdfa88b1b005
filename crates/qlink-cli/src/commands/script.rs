//! Script command implementation.
//!
//! Print the PBS script a job description compiles to, using the profile
//! of the configured cluster, without submitting anything.

use anyhow::Result;

use qlink_sched::QlinkConfig;

use super::common::{JobArgs, connect};

/// Execute the script command.
pub async fn execute(config: &QlinkConfig, job: JobArgs) -> Result<()> {
    let jd = job.into_description();
    let service = connect(config).await?;

    let script = service
        .service()
        .compile(&jd)
        .map_err(|e| anyhow::anyhow!("Failed to compile job: {e}"))?;
    print!("{script}");

    Ok(())
}
