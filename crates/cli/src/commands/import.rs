use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::Args;
use courier_loader::{HttpDestination, Interrupt, LoadError, Loader};
use courier_protocol::{JsonEncoder, NdjsonRecords};
use courier_runtime::load_config;
use log::{error, info, warn};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag,
};

use super::EXIT_ERROR;

/// Workers did not stop within both shutdown windows.
pub const EXIT_SHUTDOWN_TIMEOUT: u8 = 1;
pub const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Base URL of the target map; documents go to <MAP_URL>/<id>
    pub map_url: String,

    /// Read documents from this file instead of stdin
    #[arg(long, short = 'i')]
    pub input: Option<PathBuf>,

    /// Config file to read instead of the default location
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

pub fn run(args: ImportArgs) -> ExitCode {
    match execute(args) {
        Ok(code) => code,
        Err(e) => {
            error!("[error] {e:#}");
            eprintln!("[import] {e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn execute(args: ImportArgs) -> Result<ExitCode> {
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    let destination =
        HttpDestination::new(&config.http).context("Failed to build the HTTP client")?;
    let interrupt = register_interrupt()?;

    let loader = Loader::new(&args.map_url, JsonEncoder, destination, &config)
        .context("Invalid loader configuration")?
        .with_interrupt(interrupt);

    let input: Box<dyn BufRead> = match &args.input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    };

    let mut records = NdjsonRecords::new(input);
    let result = loader.run(&mut records);

    if records.skipped() > 0 {
        warn!("Skipped {} unusable input lines", records.skipped());
    }

    match result {
        Ok(report) => {
            info!(
                "Imported {} documents into {}",
                report.observed,
                loader.prefix()
            );
            eprintln!("[import] {} documents: {}", report.observed, report.summary);
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ LoadError::ShutdownTimedOut { .. }) => {
            error!("[fatal] {e}");
            eprintln!("[import] {e}");
            Ok(ExitCode::from(EXIT_SHUTDOWN_TIMEOUT))
        }
        Err(e @ LoadError::Interrupted { .. }) => {
            warn!("{e}");
            eprintln!("[import] {e}");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(e) => Err(e).context("Import failed"),
    }
}

/// Wire SIGINT/SIGTERM onto a fresh interrupt flag.
///
/// The first signal only raises the flag so the load can cancel its workers. A
/// second one, arriving while the flag is already up, terminates the process.
fn register_interrupt() -> Result<Interrupt> {
    let interrupt = Interrupt::new();

    for sig in [SIGINT, SIGTERM] {
        flag::register_conditional_shutdown(sig, i32::from(EXIT_INTERRUPTED), interrupt.flag())
            .with_context(|| format!("Failed to register shutdown handler for {sig}"))?;
        flag::register(sig, interrupt.flag())
            .with_context(|| format!("Failed to register signal handler for {sig}"))?;
    }

    Ok(interrupt)
}
