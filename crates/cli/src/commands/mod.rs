pub mod config;
pub mod import;

use clap::Subcommand;
pub use config::ConfigArgs;
pub use import::ImportArgs;

/// Exit code for usage, config and startup failures.
pub const EXIT_ERROR: u8 = 2;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load newline-delimited JSON documents into a map.
    ///
    /// Every document needs an "id" field and is written to <MAP_URL>/<id>.
    ///
    /// Example:
    ///   courier import http://localhost:8080/map/docs < docs.ndjson
    ///   courier import --input docs.ndjson --config loader.json http://localhost:8080/map/docs
    Import(ImportArgs),

    /// Print the effective loader configuration as JSON.
    Config(ConfigArgs),
}
