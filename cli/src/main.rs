use std::path::PathBuf;
use std::process::ExitCode;

use archiver::{
    init_logging, load_config, ArchiveCoordinator, ArchiveSource, ArchiveStatus, ArchiverConfig,
    LogFormat,
};
use clap::Parser;
use log::{error, info};

/// Zip files and folders, printing each archive's progress.
#[derive(Parser, Debug)]
#[command(name = "archiver", version, about)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory the archives are written to (overrides the config)
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Files, folders or staging directories to archive
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    if let Err(e) = init_logging(format, level) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!("Starting archiver v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => ArchiverConfig::default(),
    };
    if let Some(temp_dir) = cli.temp_dir {
        config.temp_directory = temp_dir;
    }

    let coordinator = match ArchiveCoordinator::new(config) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!("Failed to start archiver: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let streams: Vec<_> = cli
        .paths
        .into_iter()
        .map(|path| coordinator.subscribe(ArchiveSource::new(path), true))
        .collect();

    let mut failures = 0;
    for stream in streams {
        let label = stream.source().path().display().to_string();
        let mut last = None;
        for status in stream {
            println!("{}: {}", label, status);
            last = Some(status);
        }
        match last {
            Some(ArchiveStatus::Done(path)) => println!("{} -> {}", label, path.display()),
            _ => failures += 1,
        }
    }

    coordinator.shutdown();

    if failures > 0 {
        error!("{} archive(s) failed", failures);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
