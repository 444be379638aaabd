use std::process::ExitCode;

use clap::Parser;

mod commands;

use commands::Command;
use courier_runtime::logging;

#[derive(Debug, Parser)]
#[command(
    name = "courier",
    version,
    about = "Bulk-load JSON documents into a remote map",
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

fn main() -> ExitCode {
    logging::init().ok();

    let cli = Cli::parse();
    match cli.command {
        Command::Import(args) => commands::import::run(args),
        Command::Config(args) => commands::config::run(args),
    }
}
