//! log4rs initialization.
//!
//! Nothing here runs implicitly: a host either initializes logging itself or
//! calls one of these functions once at startup.

use crate::config::ClientSettings;
use crate::utils::devlog::DEV_TARGET;
use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::Path;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;

/// Initializes logging from a log4rs YAML file.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed, or if a logger is
/// already installed.
pub fn init_path(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    Ok(())
}

fn rolling(dir: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", dir.join(format!("{stem}.{{}}.log")).display()), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(dir.join(format!("{stem}.log")), Box::new(policy))?)
}

/// Builds the rolling-file configuration: `querylite.log` for everything at
/// `level`, plus `dev6.log` for developer traces when `dev_trace` is set.
///
/// # Errors
/// Returns an error if `dir` cannot be created or an appender fails to open.
pub fn build_config(
    dir: &Path,
    level: LevelFilter,
    retention: usize,
    dev_trace: bool,
) -> Result<Config, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    let keep = u32::try_from(retention.max(1)).unwrap_or(u32::MAX);
    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(dir, "querylite", keep)?)));
    builder = if dev_trace {
        builder
            .appender(Appender::builder().build("dev6", Box::new(rolling(dir, "dev6", keep)?)))
            .logger(Logger::builder().appender("dev6").additive(false).build(DEV_TARGET, LevelFilter::Trace))
    } else {
        builder.logger(Logger::builder().additive(false).build(DEV_TARGET, LevelFilter::Off))
    };
    Ok(builder.build(Root::builder().appender("app").build(level))?)
}

/// Initializes rolling file logging under `dir`.
pub fn init_in_dir(
    dir: &Path,
    level: LevelFilter,
    retention: usize,
    dev_trace: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(dir, level, retention, dev_trace)?;
    log4rs::init_config(config)?;
    Ok(())
}

/// Initializes logging from client settings. Does nothing when no log
/// directory is configured.
pub fn init_from_settings(settings: &ClientSettings) -> Result<(), Box<dyn std::error::Error>> {
    let Some(dir) = settings.log_dir.as_deref() else {
        return Ok(());
    };
    init_in_dir(dir, settings.level_filter(), settings.log_retention, settings.dev_trace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_creates_log_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("logs");
        build_config(&dir, LevelFilter::Debug, 3, true).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn settings_without_dir_are_a_no_op() {
        assert!(init_from_settings(&ClientSettings::default()).is_ok());
    }

    #[test]
    fn missing_yaml_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(init_path(&tmp.path().join("absent.yaml")).is_err());
    }
}
