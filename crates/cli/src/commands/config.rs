use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Args;
use courier_runtime::load_config;
use log::error;

use super::EXIT_ERROR;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config file to read instead of the default location
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

pub fn run(args: ConfigArgs) -> ExitCode {
    match execute(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("[error] {e:#}");
            eprintln!("[config] {e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn execute(args: ConfigArgs) -> Result<()> {
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    let rendered =
        serde_json::to_string_pretty(&config).context("Failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}
