//! Ringshift CLI - Real-Time Staged Audio Pipeline
//!
//! Command-line interface for the ringshift pipeline.

use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::info;

use ringshift::cli::commands;
use ringshift::cli::{Cli, Commands};
use ringshift::RingshiftError;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Ringshift v{}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Ringshift v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Run(args) => commands::run_pipeline(&args),
        Commands::Baseline(args) => commands::run_baseline(&args),
        Commands::Tone {
            output,
            frequency,
            duration,
            sample_rate,
            amplitude,
        } => commands::write_tone(&output, frequency, duration, sample_rate, amplitude),
        Commands::Config { config, overrides } => {
            commands::print_config(config.as_deref(), &overrides)
        }
    }
}

fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<RingshiftError>() {
        Some(cause) => {
            eprintln!("error[{}]: {:#}", cause.error_code(), err);
            let suggestions = cause.recovery_suggestions();
            if !suggestions.is_empty() {
                eprintln!("suggestions:");
                for suggestion in suggestions {
                    eprintln!("  - {}", suggestion);
                }
            }
        }
        None => eprintln!("error: {:#}", err),
    }
}
