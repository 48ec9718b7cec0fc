//! Logging for control executables
//!
//! Records go to stdout with coloured level tags and to the session's log file in plain text.
//! Every line is stamped with the seconds elapsed since the session epoch. The solver modules log
//! each iteration, so [`LogConfig`] carries per-target levels to quieten them independently of the
//! rest of the executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{info, Level, Metadata};
use std::fmt;
use thiserror::Error;

// Internal imports
use crate::session::{self, Session};

// Re-exports
pub use log::LevelFilter;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Log levels for an execution.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level for every target without an override
    pub level: LevelFilter,

    /// Overrides keyed by module path, e.g. `ctrl_lib::mpc`
    pub targets: Vec<(String, LevelFilter)>,
}

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Error opening the log file: {0}")]
    LogFileError(std::io::Error),

    #[error("A logger has already been set: {0}")]
    AlreadySet(log::SetLoggerError),
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl LogConfig {
    pub fn new(level: LevelFilter) -> Self {
        Self {
            level,
            targets: Vec::new(),
        }
    }

    /// Override the level of `target` and every module beneath it.
    pub fn with_target(mut self, target: &str, level: LevelFilter) -> Self {
        self.targets.push((target.to_string(), level));
        self
    }

    /// The level which applies to `target`, taken from the most specific matching override.
    pub fn level_for(&self, target: &str) -> LevelFilter {
        self.targets
            .iter()
            .filter(|(t, _)| {
                target == t.as_str()
                    || (target.starts_with(t.as_str()) && target[t.len()..].starts_with("::"))
            })
            .max_by_key(|(t, _)| t.len())
            .map(|(_, l)| *l)
            .unwrap_or(self.level)
    }

    /// The most verbose level any target may log at.
    fn max_level(&self) -> LevelFilter {
        self.targets
            .iter()
            .map(|(_, l)| *l)
            .fold(self.level, std::cmp::max)
    }

    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level_for(metadata.target())
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// Must only be called once, a second call returns [`LoggerInitError::AlreadySet`].
pub fn logger_init(config: LogConfig, session: &Session) -> Result<(), LoggerInitError> {
    let log_file =
        fern::log_file(&session.log_file_path).map_err(LoggerInitError::LogFileError)?;

    let max_level = config.max_level();
    let summary = config.clone();

    let stdout = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}",
                format_line(
                    session::get_elapsed_seconds(),
                    &coloured_tag(record.level()),
                    record.level(),
                    record.target(),
                    message
                )
            ))
        })
        .chain(std::io::stdout());

    let file = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}",
                format_line(
                    session::get_elapsed_seconds(),
                    &level_tag(record.level()),
                    record.level(),
                    record.target(),
                    message
                )
            ))
        })
        .chain(log_file);

    fern::Dispatch::new()
        .level(max_level)
        .filter(move |metadata| config.enabled(metadata))
        .chain(stdout)
        .chain(file)
        .apply()
        .map_err(LoggerInitError::AlreadySet)?;

    info!("Logging initialised");
    info!("    Session epoch: {}", session::get_epoch());
    info!("    Log level: {:?}", summary.level);
    for (target, level) in summary.targets.iter() {
        info!("    {}: {:?}", target, level);
    }
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Format one log line. Debug and trace lines carry their target.
fn format_line(
    elapsed_s: f64,
    tag: &dyn fmt::Display,
    level: Level,
    target: &str,
    message: &fmt::Arguments,
) -> String {
    if level > Level::Info {
        format!("[{:10.6} {}] {}: {}", elapsed_s, tag, target, message)
    } else {
        format!("[{:10.6} {}] {}", elapsed_s, tag, message)
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRC",
        Level::Debug => "DBG",
        Level::Info => "INF",
        Level::Warn => "WRN",
        Level::Error => "ERR",
    }
}

fn coloured_tag(level: Level) -> ColoredString {
    let tag = level_tag(level);
    match level {
        Level::Trace => tag.dimmed().italic(),
        Level::Debug => tag.dimmed(),
        Level::Info => tag.normal(),
        Level::Warn => tag.yellow(),
        Level::Error => tag.red().bold(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config() -> LogConfig {
        LogConfig::new(LevelFilter::Debug)
            .with_target("ctrl_lib::mpc", LevelFilter::Info)
            .with_target("ctrl_lib::mpc::nominal", LevelFilter::Trace)
            .with_target("ctrl_lib::runner", LevelFilter::Warn)
    }

    #[test]
    fn test_level_for() {
        let config = config();

        assert_eq!(config.level_for("ctrl_exec"), LevelFilter::Debug);
        assert_eq!(config.level_for("ctrl_lib::mpc"), LevelFilter::Info);
        assert_eq!(config.level_for("ctrl_lib::mpc::nominal"), LevelFilter::Trace);
        assert_eq!(config.level_for("ctrl_lib::runner::worker"), LevelFilter::Warn);

        // Prefixes only match whole path segments
        assert_eq!(config.level_for("ctrl_lib::mpc_extra"), LevelFilter::Debug);

        assert_eq!(config.max_level(), LevelFilter::Trace);
    }

    #[test]
    fn test_enabled() {
        fn meta(level: Level, target: &str) -> Metadata<'_> {
            Metadata::builder().level(level).target(target).build()
        }

        let config = config();

        assert!(config.enabled(&meta(Level::Debug, "ctrl_exec")));
        assert!(!config.enabled(&meta(Level::Trace, "ctrl_exec")));
        assert!(!config.enabled(&meta(Level::Debug, "ctrl_lib::mpc")));
        assert!(config.enabled(&meta(Level::Info, "ctrl_lib::mpc")));
        assert!(!config.enabled(&meta(Level::Info, "ctrl_lib::runner")));
        assert!(config.enabled(&meta(Level::Error, "ctrl_lib::runner")));
    }

    #[test]
    fn test_format_line() {
        assert_eq!(
            format_line(1.5, &"INF", Level::Info, "ctrl_exec", &format_args!("hello {}", 1)),
            "[  1.500000 INF] hello 1"
        );
        assert_eq!(
            format_line(0.25, &"DBG", Level::Debug, "ctrl_lib::mpc", &format_args!("x")),
            "[  0.250000 DBG] ctrl_lib::mpc: x"
        );

        colored::control::set_override(false);
        assert_eq!(coloured_tag(Level::Warn).to_string(), "WRN");
    }
}
