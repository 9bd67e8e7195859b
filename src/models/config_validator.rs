use crate::models::config::{BackupSettings, Config};
use crate::models::error::{BackupError, Result};
use chrono::format::{Item, StrftimeItems};
use log::{info, warn};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Largest page the Drive API hands out for a single files.list call
const MAX_PAGE_SIZE: u32 = 1000;

/// Validates the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    info!("Validating configuration...");

    validate_numeric_values(config)?;

    validate_destination_parent(&config.backup.destination_parent)?;

    validate_destination_format(&config.backup.destination_format)?;

    validate_database_path(&config.database_file)?;

    validate_schedule(&config.backup)?;

    check_conflicting_flags(config)?;

    info!("Configuration validation passed");
    Ok(())
}

/// Validate numeric configuration values
fn validate_numeric_values(config: &Config) -> Result<()> {
    if config.page_size == 0 || config.page_size > MAX_PAGE_SIZE {
        return Err(BackupError::InvalidConfig(format!(
            "page_size must be between 1 and {}, got {}",
            MAX_PAGE_SIZE, config.page_size
        )));
    }

    if config.chunk_size_bytes == 0 {
        return Err(BackupError::InvalidConfig(
            "chunk_size_bytes must be greater than 0".to_string(),
        ));
    }

    if config.chunk_retries > 10 {
        warn!(
            "chunk_retries ({}) is high; with exponential backoff a failing chunk may stall for a long time",
            config.chunk_retries
        );
    }

    Ok(())
}

/// Validate the directory that receives one timestamped folder per run
fn validate_destination_parent(destination: &str) -> Result<()> {
    let path = Path::new(destination);

    if !path.exists() {
        let parent = match path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
            Some(parent) => parent,
            None => {
                return Err(BackupError::InvalidConfig(format!(
                    "Backup destination has no parent directory: {}",
                    destination
                )));
            }
        };

        if !parent.exists() {
            #[cfg(windows)]
            let suggestion = format!("mkdir \"{}\"", parent.display());
            #[cfg(not(windows))]
            let suggestion = format!("mkdir -p \"{}\"", parent.display());

            return Err(BackupError::InvalidConfig(format!(
                "Backup destination parent directory does not exist: {}\nSuggestion: Create the parent directory with: {}",
                destination, suggestion
            )));
        }

        if let Err(e) = check_writable(parent) {
            return Err(BackupError::InvalidConfig(format!(
                "Backup destination parent directory is not writable: {}\nError: {}",
                destination, e
            )));
        }

        warn!(
            "Backup destination does not exist but will be created: {}",
            destination
        );
        return Ok(());
    }

    if !path.is_dir() {
        return Err(BackupError::InvalidConfig(format!(
            "Backup destination exists but is not a directory: {}",
            destination
        )));
    }

    if let Err(e) = check_writable(path) {
        return Err(BackupError::InvalidConfig(format!(
            "Backup destination is not writable: {}\nError: {}",
            destination, e
        )));
    }

    Ok(())
}

/// The run directory name is produced by chrono's strftime, which panics on
/// malformed specifiers when rendered.
fn validate_destination_format(format: &str) -> Result<()> {
    if format.trim().is_empty() {
        return Err(BackupError::InvalidConfig(
            "destination_format must not be empty".to_string(),
        ));
    }

    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(BackupError::InvalidConfig(format!(
            "destination_format is not a valid strftime pattern: {}",
            format
        )));
    }

    if !format.contains('%') {
        warn!(
            "destination_format '{}' has no time fields; every run will write to a suffixed copy of the same name",
            format
        );
    }

    Ok(())
}

/// Validate database file path
fn validate_database_path(db_file: &str) -> Result<()> {
    if db_file.is_empty() {
        return Err(BackupError::InvalidConfig(
            "database_file cannot be empty. Provide a valid path or use ':memory:'".to_string(),
        ));
    }

    if db_file == ":memory:" {
        info!("Using in-memory database for run history");
        return Ok(());
    }

    let path = Path::new(db_file);

    if path.exists() {
        if !path.is_file() {
            return Err(BackupError::InvalidConfig(format!(
                "Database path exists but is not a file: {}",
                db_file
            )));
        }

        if let Err(e) = fs::OpenOptions::new().read(true).write(true).open(path) {
            return Err(BackupError::InvalidConfig(format!(
                "Database file is not readable/writable: {}\nError: {}",
                db_file, e
            )));
        }
    } else if let Some(parent) = path.parent() {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };

        if !parent.exists() {
            return Err(BackupError::InvalidConfig(format!(
                "Database parent directory does not exist: {}",
                db_file
            )));
        }

        if let Err(e) = check_writable(parent) {
            return Err(BackupError::InvalidConfig(format!(
                "Database parent directory is not writable: {}\nError: {}",
                db_file, e
            )));
        }
    }

    Ok(())
}

/// Validate schedule configuration
fn validate_schedule(settings: &BackupSettings) -> Result<()> {
    if let Some(schedule_str) = &settings.schedule {
        match cron::Schedule::from_str(schedule_str) {
            Ok(_) => {
                info!("Schedule validated: {}", schedule_str);
            }
            Err(e) => {
                return Err(BackupError::InvalidConfig(format!(
                    "Invalid cron expression in schedule: {}\nError: {}\nExample: '0 0 2 * * *' for daily at 2am",
                    schedule_str, e
                )));
            }
        }

        if !settings.interval.is_zero() {
            warn!("Both schedule and interval are set; the cron schedule takes precedence");
        }
    }
    Ok(())
}

/// Check for conflicting configuration flags
fn check_conflicting_flags(config: &Config) -> Result<()> {
    if config.continue_on_error {
        info!("continue_on_error is enabled - failed downloads are recorded and the walk continues");
    }

    if config.follow_all_pages {
        info!("follow_all_pages is enabled - folders larger than page_size are fully listed");
    }

    if config.backup.schedule.is_none() && config.backup.interval.is_zero() {
        info!("No interval or schedule configured - backups run once");
    }

    Ok(())
}

/// Check if a directory is writable by attempting to create a temporary file
pub fn check_writable(path: &Path) -> std::io::Result<()> {
    let test_file = path.join(".rustydrivebackup_write_test");

    fs::write(&test_file, b"test")?;

    fs::remove_file(&test_file)?;

    Ok(())
}
