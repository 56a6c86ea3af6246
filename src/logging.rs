use chrono::Local;
use log::LevelFilter;
use simplelog::{self, CombinedLogger, WriteLogger};
use std::fs::OpenOptions;
use std::io::Write;

/// File name used when no explicit log path is given, one file per hour.
pub fn default_log_path() -> String {
    format!("gmail_assistant_{}.log", Local::now().format("%Y%m%d_%H"))
}

/// Sets up logging to a file.
///
/// # Arguments
///
/// * `log_level` - The level of log messages to capture
/// * `log_file` - Optional path to log file. If None, creates a timestamped file
///
/// # Returns
///
/// The path to the log file
pub fn setup_logging(log_level: LevelFilter, log_file: Option<&str>) -> std::io::Result<String> {
    let log_path = match log_file {
        Some(path) => path.to_string(),
        None => default_log_path(),
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    writeln!(
        file,
        "====== GMAIL ASSISTANT LOG - Started at {} ======",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;

    CombinedLogger::init(vec![WriteLogger::new(
        log_level,
        simplelog::Config::default(),
        file,
    )])
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    log::info!("Logging initialized to file: {}", log_path);
    Ok(log_path)
}

/// Stderr logging for environments where the working directory is read-only.
pub fn setup_stderr_logging(log_level: LevelFilter) {
    let _ = env_logger::builder()
        .filter_level(log_level)
        .target(env_logger::Target::Stderr)
        .try_init();
}
