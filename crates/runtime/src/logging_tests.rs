use super::*;
use log::{Level, Metadata, Record};
use serial_test::serial;
use std::fs;

#[test]
#[serial]
fn get_level_from_env_parses_cases() {
    let cases: &[(Option<&str>, Level)] = &[
        (None, Level::Info),
        (Some("debug"), Level::Debug),
        (Some("DEBUG"), Level::Debug),
        (Some("info"), Level::Info),
        (Some("warn"), Level::Warn),
        (Some("WARN"), Level::Warn),
        (Some("error"), Level::Error),
        (Some("trace"), Level::Trace),
        (Some("garbage"), Level::Info),
        (Some("off"), Level::Info),
    ];

    for (value, expected) in cases {
        match value {
            Some(v) => unsafe { std::env::set_var(PROGRAM_LOG_LEVEL, v) },
            None => unsafe { std::env::remove_var(PROGRAM_LOG_LEVEL) },
        }

        let lvl = get_level_from_env();
        assert_eq!(
            lvl, *expected,
            "env {:?} should yield level {:?}, got {:?}",
            value, expected, lvl
        );
    }

    unsafe { std::env::remove_var(PROGRAM_LOG_LEVEL) };
}

#[test]
fn enabled_respects_level_threshold() {
    let levels = [
        Level::Error,
        Level::Warn,
        Level::Info,
        Level::Debug,
        Level::Trace,
    ];

    for logger_level in levels {
        let logger = Logger {
            level: logger_level,
            target: LogTarget::Stderr,
        };

        for record_level in levels {
            let meta = Metadata::builder()
                .level(record_level)
                .target("courier_loader::pool")
                .build();

            assert_eq!(
                logger.enabled(&meta),
                record_level <= logger_level,
                "logger level {:?}, record level {:?}",
                logger_level,
                record_level
            );
        }
    }
}

#[test]
fn file_target_appends_formatted_lines() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("courier.log");

    let logger = Logger {
        level: Level::Info,
        target: LogTarget::File(Mutex::new(open_log_file(&path).expect("open log file"))),
    };

    let cases = [
        (Level::Debug, "filtered out"),
        (Level::Info, "queued 50000 records"),
        (Level::Error, "no retries left"),
    ];

    for (lvl, msg) in &cases {
        logger.log(
            &Record::builder()
                .args(format_args!("{msg}"))
                .level(*lvl)
                .target("courier_loader")
                .build(),
        );
    }
    logger.flush();

    let written = fs::read_to_string(&path).expect("read log file");
    let lines: Vec<&str> = written.lines().collect();

    assert_eq!(lines.len(), 2, "debug record must be filtered: {written}");
    assert!(lines[0].contains("INFO"));
    assert!(lines[0].contains("[courier_loader] queued 50000 records"));
    assert!(lines[1].contains("ERROR"));
    assert!(lines[1].ends_with("no retries left"));
}

#[test]
#[serial]
fn unopenable_log_file_falls_back_to_stderr() {
    let dir = tempfile::tempdir().expect("create temp dir");
    // A directory cannot be opened for appending.
    unsafe { std::env::set_var(PROGRAM_LOG_FILE, dir.path()) };

    assert!(matches!(get_target_from_env(), LogTarget::Stderr));

    unsafe { std::env::remove_var(PROGRAM_LOG_FILE) };
    assert!(matches!(get_target_from_env(), LogTarget::Stderr));
}
