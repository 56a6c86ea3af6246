/// Logging Module Tests
///
/// The global logger can only be installed once per process, so file logging
/// is exercised by a single test.
use gmail_assistant::logging::{default_log_path, setup_logging, setup_stderr_logging};
use log::LevelFilter;
use std::fs;
use tempfile::tempdir;

#[cfg(test)]
mod logging_tests {
    use super::*;

    #[test]
    fn test_file_logging_writes_header_and_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("assistant.log");
        let path_str = path.to_str().unwrap();

        let returned = setup_logging(LevelFilter::Info, Some(path_str)).unwrap();
        assert_eq!(returned, path_str);

        log::info!("resolver ready");
        log::logger().flush();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("====== GMAIL ASSISTANT LOG - Started at"));
        assert!(content.contains("resolver ready"));

        // A second logger cannot be installed; the stderr variant tolerates that.
        setup_stderr_logging(LevelFilter::Debug);
        assert!(setup_logging(LevelFilter::Info, Some(path_str)).is_err());
    }

    #[test]
    fn test_default_log_path_is_hourly() {
        let path = default_log_path();
        assert!(path.starts_with("gmail_assistant_"));
        assert!(path.ends_with(".log"));
        // gmail_assistant_YYYYMMDD_HH.log
        assert_eq!(path.len(), "gmail_assistant_".len() + 11 + ".log".len());
    }
}
