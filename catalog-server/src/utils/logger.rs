//! Logging Infrastructure
//!
//! Structured logging setup with support for both development and production environments
//! Features:
//! - Daily rotating application logs (deleted after 14 days)
//! - Catalog load logs (target `catalog_load`, kept)

use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, prelude::*};

/// Target used by the startup loader for its listing output
pub const CATALOG_LOAD_TARGET: &str = "catalog_load";

/// Days an application log file is kept
const APP_LOG_RETENTION_DAYS: i64 = 14;

/// Clean up old application log files (older than 14 days)
///
/// Call this periodically (e.g., daily) to maintain log size
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<usize> {
    use chrono::{Local, TimeZone};

    let cutoff = Local::now() - chrono::Duration::days(APP_LOG_RETENTION_DAYS);
    let mut removed = 0;

    let app_log_dir = log_dir.join("app");
    if !app_log_dir.exists() {
        return Ok(removed);
    }

    for entry in fs::read_dir(app_log_dir)? {
        let entry = entry?;
        let path = entry.path();

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // Match app.YYYY-MM-DD.log pattern
        let Some(date_part) = name
            .strip_prefix("app.")
            .and_then(|d| d.strip_suffix(".log"))
        else {
            continue;
        };
        let Ok(naive_date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
            continue;
        };

        // Local midnight of the file's day
        let expired = naive_date
            .and_hms_opt(0, 0, 0)
            .and_then(|dt| Local.from_local_datetime(&dt).single())
            .is_some_and(|day| day < cutoff);
        if expired {
            fs::remove_file(&path)?;
            removed += 1;
            tracing::info!(file = %name, "Deleted old log file");
        }
    }

    Ok(removed)
}

fn daily_appender(dir: &Path, prefix: &str) -> anyhow::Result<RollingFileAppender> {
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)?)
}

/// Initialize the logging system with daily rotating logs
///
/// # Arguments
/// * `level` - Log level (e.g., "info", "debug", "warn")
/// * `json_format` - Whether to use JSON format (true for production, false for development)
/// * `log_dir` - Optional directory for file logging (e.g., Some("./work_dir/logs"))
///
/// # Examples
/// ```no_run
/// use catalog_server::utils::logger::init_logger_with_file;
///
/// // Development setup (console only)
/// init_logger_with_file("debug", false, None)?;
///
/// // Production setup (console + file)
/// init_logger_with_file("info", true, Some("./work_dir/logs"))?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    let file_dirs = match log_dir {
        Some(dir) => {
            let log_dir = Path::new(dir);
            let app_log_dir = log_dir.join("app");
            let catalog_log_dir = log_dir.join("catalog");
            fs::create_dir_all(&app_log_dir)?;
            fs::create_dir_all(&catalog_log_dir)?;
            Some((log_dir.to_path_buf(), app_log_dir, catalog_log_dir))
        }
        None => None,
    };

    if json_format {
        // JSON format for production
        let console_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(EnvFilter::new(level));

        if let Some((root, app_dir, catalog_dir)) = file_dirs {
            // Everything except the load listing goes to app logs
            let app_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_thread_ids(true)
                .with_writer(std::sync::Mutex::new(daily_appender(&app_dir, "app")?))
                .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
                    meta.target() != CATALOG_LOAD_TARGET
                }));

            let catalog_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_writer(std::sync::Mutex::new(daily_appender(
                    &catalog_dir,
                    "catalog",
                )?))
                .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
                    meta.target() == CATALOG_LOAD_TARGET
                }));

            tokio::spawn(periodic_cleanup(root));

            subscriber
                .with(console_layer)
                .with(app_layer)
                .with(catalog_layer)
                .try_init()?;
        } else {
            subscriber.with(console_layer).try_init()?;
        }
    } else {
        // Pretty format for development
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .with_filter(EnvFilter::new(level));

        if let Some((root, app_dir, catalog_dir)) = file_dirs {
            let app_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(daily_appender(&app_dir, "app")?))
                .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
                    meta.target() != CATALOG_LOAD_TARGET
                }));

            let catalog_layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(daily_appender(
                    &catalog_dir,
                    "catalog",
                )?))
                .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
                    meta.target() == CATALOG_LOAD_TARGET
                }));

            tokio::spawn(periodic_cleanup(root));

            subscriber
                .with(console_layer)
                .with(app_layer)
                .with(catalog_layer)
                .try_init()?;
        } else {
            subscriber.with(console_layer).try_init()?;
        }
    }

    Ok(())
}

/// Periodic cleanup task - runs every hour to clean old logs
async fn periodic_cleanup(log_dir: PathBuf) {
    use tokio::time::{Duration, sleep};

    loop {
        sleep(Duration::from_secs(3600)).await;

        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_removes_only_expired_app_logs() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("app");
        fs::create_dir_all(&app_dir).unwrap();

        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let old = app_dir.join("app.2000-01-01.log");
        let fresh = app_dir.join(format!("app.{}.log", today));
        let unrelated = app_dir.join("notes.txt");
        for path in [&old, &fresh, &unrelated] {
            fs::write(path, b"x").unwrap();
        }

        let removed = cleanup_old_logs(dir.path()).unwrap();
        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn test_cleanup_without_app_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_old_logs(dir.path()).unwrap(), 0);
    }
}
