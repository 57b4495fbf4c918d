use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use log::{error, info};

use linksync::conf::Config;
use linksync::core::{CliArgs, setup_logging};
use linksync::dataset::{RunReport, discover_spec_files, run_datasets};
use linksync::refresh::SyncContext;

async fn run(args: &CliArgs) -> anyhow::Result<RunReport> {
    let mut config = Config::load(args.config.as_deref()).context("loading config")?;
    if let Some(dir) = &args.schemas {
        config.schemas_dir = dir.clone();
    }

    let ctx = SyncContext::from_config(&config).context("connecting to the API and the store")?;
    let files = discover_spec_files(&config.schemas_dir)?;
    info!(
        "Found {} dataset specs in {}.",
        files.len(),
        config.schemas_dir.display()
    );

    let as_of = args.as_of_date();
    info!("Updating tables for {}.", as_of);
    Ok(run_datasets(&ctx, &files, as_of).await)
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_logging();
    let args = CliArgs::parse();
    info!(args = args; "Linksync started.");

    match run(&args).await {
        Ok(report) => {
            report.log_summary();
            if args.strict && report.has_failures() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            error!("Startup failed: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
