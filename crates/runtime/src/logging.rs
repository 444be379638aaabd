use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Mutex, OnceLock, PoisonError},
    thread,
};

use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::config::{PROGRAM_LOG_FILE, PROGRAM_LOG_LEVEL};

enum LogTarget {
    Stderr,
    File(Mutex<File>),
}

pub struct Logger {
    level: Level,
    target: LogTarget,
}

impl Logger {
    fn format(record: &Record<'_>) -> String {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let current = thread::current();
        let thread_name = current.name().unwrap_or("unnamed");
        format!(
            "{} {} [{}] [{}] {}",
            timestamp,
            record.level(),
            thread_name,
            record.target(),
            record.args()
        )
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let msg = Self::format(record);

        match &self.target {
            LogTarget::Stderr => {
                eprintln!("{msg}")
            }
            LogTarget::File(file) => {
                let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
                // A failing log sink has nowhere to report to.
                let _ = writeln!(file, "{msg}");
            }
        }
    }

    fn flush(&self) {
        if let LogTarget::File(file) = &self.target {
            let _ = file.lock().unwrap_or_else(PoisonError::into_inner).flush();
        }
    }
}

fn get_level_from_env() -> Level {
    std::env::var(PROGRAM_LOG_LEVEL)
        .ok()
        .and_then(|s| s.parse::<LevelFilter>().ok())
        .and_then(|filter| filter.to_level())
        .unwrap_or(Level::Info)
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn get_target_from_env() -> LogTarget {
    match std::env::var_os(PROGRAM_LOG_FILE) {
        Some(path) if !path.is_empty() => match open_log_file(Path::new(&path)) {
            Ok(file) => LogTarget::File(Mutex::new(file)),
            Err(e) => {
                eprintln!(
                    "cannot open log file {}: {e}; logging to stderr",
                    Path::new(&path).display()
                );
                LogTarget::Stderr
            }
        },
        _ => LogTarget::Stderr,
    }
}

pub fn init() -> Result<(), SetLoggerError> {
    _init(get_level_from_env(), get_target_from_env())
}

fn _init(level: Level, target: LogTarget) -> Result<(), SetLoggerError> {
    static LOGGER: OnceLock<Logger> = OnceLock::new();

    // Only the first call installs the logger. The level handed to
    // log::set_max_level has to be the one stored in LOGGER, which may differ
    // from `level` on later calls.
    let init_call = LOGGER.get().is_none();

    let logger = LOGGER.get_or_init(|| Logger { level, target });

    if init_call {
        log::set_logger(logger)?;
        log::set_max_level(logger.level.to_level_filter());
    }

    Ok(())
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;
