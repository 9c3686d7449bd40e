//! SMC zone scanner - main entry point
//!
//! This binary provides four subcommands:
//! - scan: Run scan cycles over the configured watch list
//! - detect: Detect zones in a single CSV file without touching the store
//! - zones: List tracked zones from the store
//! - export: Export all tracked zones as JSON

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "smc-scanner")]
#[command(about = "Supply/demand zone detection, scoring and tracking", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan the watch list for new and mitigated zones
    Scan {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/nse_fo_5minute.json")]
        config: String,

        /// Instruments to scan (comma-separated), overrides the config list
        #[arg(short, long)]
        instruments: Option<String>,

        /// Repeat the scan every N seconds instead of running once
        #[arg(long)]
        interval: Option<u64>,

        /// Scan instruments in parallel
        #[arg(long)]
        parallel: bool,
    },

    /// Detect zones in one CSV file and print them
    Detect {
        /// CSV file with datetime,open,high,low,close,volume columns
        #[arg(short, long)]
        file: PathBuf,

        /// Instrument name used for zone identity
        #[arg(short, long)]
        instrument: String,

        /// Optional configuration file for detection thresholds
        #[arg(short, long)]
        config: Option<String>,

        /// Print zones as JSON
        #[arg(long)]
        json: bool,
    },

    /// List tracked zones
    Zones {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/nse_fo_5minute.json")]
        config: String,

        /// Only zones of this instrument
        #[arg(short, long)]
        instrument: Option<String>,

        /// Include mitigated zones
        #[arg(long)]
        all: bool,
    },

    /// Export all tracked zones to a JSON file
    Export {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/nse_fo_5minute.json")]
        config: String,

        /// Output file
        #[arg(short, long, default_value = "zones_export.json")]
        output: PathBuf,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    if file_only {
        // Progress bar owns the console
        let file_appender = tracing_appender::rolling::never("logs", &log_filename);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_appender = tracing_appender::rolling::never("logs", &log_filename);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        // a one-shot scan shows a progress bar; repeated scans log to console
        Commands::Scan { interval, .. } => ("scan", interval.is_none()),
        Commands::Detect { .. } => ("detect", false),
        Commands::Zones { .. } => ("zones", false),
        Commands::Export { .. } => ("export", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Scan {
            config,
            instruments,
            interval,
            parallel,
        } => commands::scan::run(config, instruments, interval, parallel),

        Commands::Detect {
            file,
            instrument,
            config,
            json,
        } => commands::detect::run(file, instrument, config, json),

        Commands::Zones {
            config,
            instrument,
            all,
        } => commands::zones::run(config, instrument, all),

        Commands::Export { config, output } => commands::export::run(config, output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();

        let cli = Cli::parse_from(["smc-scanner", "-v", "scan", "--parallel"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Scan { parallel: true, interval: None, .. }));
    }

    #[test]
    fn test_setup_logging_installs_subscriber() {
        // only test in this binary that installs the global subscriber
        setup_logging(false, "unit_test", true).unwrap();
        info!("file-only logging active");
        assert!(tracing::dispatcher::has_been_set());
    }
}
