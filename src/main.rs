mod error;
mod logging;
mod mail_reader;
mod notification;
mod scheduler;
mod settings;
mod storage;


use std::path::PathBuf;

use clap::Parser;
use log::info;

/// Polls a mailbox, stores new messages as CSV, XLSX and SQLite rows, and mails a summary.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// YAML settings file
    #[arg(long, default_value = "src/resources/settings.yaml")]
    config: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = settings::load_settings(&cli.config)?;
    logging::init(&config.paths.log_dir, config.logging.level_filter()?)?;

    info!("Starting Email Scraper");
    info!(
        "Checking {} on {} every {} minutes",
        config.imap.mailbox, config.imap.server, config.scheduler.interval_minutes
    );

    let mut scheduler = scheduler::Scheduler::from_config(config)?;
    scheduler.run_forever().await;
    Ok(())
}
