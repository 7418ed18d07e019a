use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use log::{debug, error};
use std::process::ExitCode;

use ems_shot::cli::Args;
use ems_shot::config::{ConfigFile, Settings};
use ems_shot::shutdown::Shutdown;
use ems_shot::{logging, scheduler};

fn load_settings(args: Args) -> Result<Settings> {
    let mut file = ConfigFile::discover(args.config.as_deref())?;
    args.apply(&mut file)?;
    Settings::from_config(file)
}

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match load_settings(Args::parse()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_file = settings.log.then_some(settings.log_file.as_path());
    if let Err(e) = logging::init(settings.verbose, log_file) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }
    debug!("Execution time: {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
    debug!("{:#?}", settings);

    let shutdown = Shutdown::new();
    if let Err(e) = shutdown.register_ctrlc() {
        error!("{:#}", e);
    }

    match scheduler::run(settings, shutdown).await {
        Ok(summary) => {
            if summary.saved > 0 {
                println!(
                    "Successfully took {} screenshot(s), last round at {}",
                    summary.saved,
                    Utc::now().format("%Y-%m-%d %H:%M:%S")
                );
            }
            if summary.failed > 0 {
                eprintln!("{} screenshot(s) failed", summary.failed);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
