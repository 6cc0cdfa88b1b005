//! qlink Command-Line Interface
//!
//! Submit, monitor and cancel jobs on PBS/Torque clusters.
//!
//! ```text
//! qlink --url pbs+ssh://alice@cluster.example.org submit -q batch -n 16 /opt/sim/bin/run --steps 100
//! qlink status '[pbs+ssh://alice@cluster.example.org]-[4711.head01]'
//! qlink wait -t 600 '[pbs+ssh://alice@cluster.example.org]-[4711.head01]'
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

mod commands;

use commands::common::{self, JobArgs};
use commands::{cancel, list, profile, script, status, submit, wait};

/// qlink - batch jobs on PBS/Torque clusters
#[derive(Parser)]
#[command(name = "qlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (YAML)
    #[arg(short, long, env = "QLINK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Resource manager URL (pbs://, pbs+ssh://, pbs+gsissh://)
    #[arg(short, long, global = true)]
    url: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job
    Submit {
        #[command(flatten)]
        job: JobArgs,

        /// Wait for the job to finish
        #[arg(short = 'W', long)]
        wait: bool,

        /// Timeout in seconds when waiting (negative waits forever)
        #[arg(short, long, default_value_t = -1.0, allow_negative_numbers = true)]
        timeout: f64,
    },

    /// Query job status
    Status {
        /// Job ID ([endpoint]-[id])
        job_id: String,
    },

    /// Cancel a job
    Cancel {
        /// Job ID ([endpoint]-[id])
        job_id: String,
    },

    /// Wait for a job to finish
    Wait {
        /// Job ID ([endpoint]-[id])
        job_id: String,

        /// Timeout in seconds (negative waits forever)
        #[arg(short, long, default_value_t = -1.0, allow_negative_numbers = true)]
        timeout: f64,
    },

    /// List your jobs
    List,

    /// Show the discovered cluster profile
    Profile,

    /// Print the submission script without submitting
    Script {
        #[command(flatten)]
        job: JobArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let result = run(cli).await;

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = common::load_config(cli.config.as_deref(), cli.url.as_deref())?;
    common::init_logging(cli.verbose, &config.logging);
    tracing::debug!(
        endpoint = %config.endpoint,
        poll_interval_ms = config.poll_interval_ms,
        "Loaded configuration"
    );

    let json = cli.json;
    match cli.command {
        Commands::Submit {
            job,
            wait: do_wait,
            timeout,
        } => submit::execute(&config, job, do_wait, timeout, json).await,

        Commands::Status { job_id } => status::execute(&config, &job_id, json).await,

        Commands::Cancel { job_id } => cancel::execute(&config, &job_id, json).await,

        Commands::Wait { job_id, timeout } => wait::execute(&config, &job_id, timeout, json).await,

        Commands::List => list::execute(&config, json).await,

        Commands::Profile => profile::execute(&config, json).await,

        Commands::Script { job } => script::execute(&config, job).await,
    }
}
