mod models;
mod repo;
mod service;
mod utils;

#[cfg(test)]
mod test_support;

use crate::models::config::{setup_config, Config, IntervalSettings};
use crate::models::config_validator::validate_config;
use crate::repo::sqlite::HistoryStore;
use crate::service::auth::Authenticator;
use crate::service::drive::{DriveApi, DriveClient};
use crate::service::operations;
use crate::service::scheduler::{start_backup, BackupDriver, DriverSettings, WalkerJob};
use crate::service::walker::{WalkOptions, Walker};
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::progress::{create_spinner, format_bytes};
use crate::utils::stop::StopSignal;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::MultiProgress;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Parser)]
#[command(name = "RustyDriveBackup")]
#[command(about = "Google Drive folder backup utility", long_about = None)]
struct Cli {
    #[arg(
        short = 'c',
        long = "config",
        default_value = DEFAULT_CONFIG_FILE,
        env = "RUSTYDRIVEBACKUP_CONFIG"
    )]
    config_file: String,

    #[arg(
        short = 'l',
        long = "log-level",
        default_value = "info",
        env = "LOG_LEVEL"
    )]
    log_level: String,

    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a folder and print its id
    Create {
        name: String,
        #[arg(long = "parent")]
        parent: Option<String>,
    },
    /// Search items by exact name
    Read { name: String },
    /// Move a file into a folder, removing its previous parents
    Update { file_id: String, folder_id: String },
    /// Delete a file or folder
    Delete { file_id: String },
    /// Mirror a folder into a local directory once
    Download {
        folder_id: String,
        destination: PathBuf,
    },
    /// Mirror a folder periodically into timestamped directories
    Backup {
        /// Falls back to `backup.root_folder_id` from the config
        folder_id: Option<String>,
        #[arg(long)]
        seconds: Option<u64>,
        #[arg(long)]
        minutes: Option<u64>,
        #[arg(long)]
        hours: Option<u64>,
        #[arg(long)]
        days: Option<u64>,
        #[arg(long = "cron", conflicts_with = "once")]
        cron: Option<String>,
        #[arg(short = 'd', long = "destination")]
        destination: Option<String>,
        #[arg(short = 'o', long = "once")]
        once: bool,
    },
    /// List recorded backup runs
    History {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long)]
        clear: bool,
    },
    /// Validate the configuration and exit
    Validate,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    cli_main(args)
}

fn cli_main(args: Cli) -> Result<()> {
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .init();

    info!("RustyDriveBackup starting...");

    // Strip any surrounding quotes from config file path
    let config_file = args
        .config_file
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();
    let mut config = load_config(&config_file)?;
    debug!("Loaded config: {:?}", &config);

    match args.command {
        Command::Validate => {
            info!("Configuration is valid. Exiting (validate mode).");
            Ok(())
        }
        Command::History { limit, clear } => show_history(&config, limit, clear),
        Command::Create { name, parent } => {
            let drive = connect(&config, args.quiet)?;
            let id = operations::create_folder(drive.as_ref(), &name, parent.as_deref())
                .context("Failed to create folder")?;
            println!("{}", id);
            Ok(())
        }
        Command::Read { name } => {
            let drive = connect(&config, args.quiet)?;
            let entries = operations::search(drive.as_ref(), &name).context("Search failed")?;
            print!("{}", operations::render_table(&entries));
            Ok(())
        }
        Command::Update { file_id, folder_id } => {
            let drive = connect(&config, args.quiet)?;
            let entry = operations::move_file(drive.as_ref(), &file_id, &folder_id)
                .context("Failed to move file")?;
            println!("{} -> {}", entry.id, entry.parent_id.unwrap_or_default());
            Ok(())
        }
        Command::Delete { file_id } => {
            let drive = connect(&config, args.quiet)?;
            operations::delete(drive.as_ref(), &file_id).context("Failed to delete item")?;
            Ok(())
        }
        Command::Download {
            folder_id,
            destination,
        } => {
            let drive = connect(&config, args.quiet)?;
            run_download(&config, drive.as_ref(), &folder_id, &destination, args.quiet)
        }
        Command::Backup {
            folder_id,
            seconds,
            minutes,
            hours,
            days,
            cron,
            destination,
            once,
        } => {
            let overrides = [seconds, minutes, hours, days];
            if overrides.iter().any(Option::is_some) {
                config.backup.interval = IntervalSettings {
                    seconds: seconds.unwrap_or(0),
                    minutes: minutes.unwrap_or(0),
                    hours: hours.unwrap_or(0),
                    days: days.unwrap_or(0),
                };
                config.backup.schedule = None;
            }
            if let Some(expression) = cron {
                config.backup.schedule = Some(expression);
            }
            if let Some(destination) = destination {
                config.backup.destination_parent = destination;
            }
            if once {
                config.backup.interval = IntervalSettings::default();
                config.backup.schedule = None;
            }
            validate_config(&config).context("Invalid backup options")?;

            let Some(root_folder_id) = folder_id.or_else(|| config.backup.root_folder_id.clone())
            else {
                bail!("No folder id given and backup.root_folder_id is not set in the config");
            };

            let drive = connect(&config, args.quiet)?;
            run_backup(&config, drive, &root_folder_id, args.quiet)
        }
    }
}

/// Load and validate the config. A missing default config file means built-in defaults.
fn load_config(config_file: &str) -> Result<Config> {
    if config_file == DEFAULT_CONFIG_FILE && !Path::new(config_file).exists() {
        info!(
            "No {} found, using default configuration",
            DEFAULT_CONFIG_FILE
        );
        let config = Config::default();
        validate_config(&config).context("Default configuration is invalid")?;
        return Ok(config);
    }

    let config = setup_config(config_file).context("Failed to load configuration")?;
    info!("Loaded configuration from: {}", config_file);
    Ok(config)
}

fn connect(config: &Config, quiet: bool) -> Result<Arc<DriveClient>> {
    let spinner = if !quiet {
        Some(create_spinner("Authenticating with Google Drive..."))
    } else {
        None
    };

    let http = DriveClient::build_http_client().context("Failed to build HTTP client")?;
    let auth = Authenticator::authorize(
        Path::new(&config.client_secret_file),
        Path::new(&config.token_file),
    );

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let auth = auth.context("Failed to authenticate")?;
    info!("Authenticated with Google Drive");
    Ok(Arc::new(DriveClient::new(http, auth)))
}

fn install_stop_handler(stop: &StopSignal) -> Result<()> {
    let signal = stop.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping...");
        signal.request_stop();
    })
    .context("Failed to set Ctrl+C handler")
}

fn run_download(
    config: &Config,
    drive: &dyn DriveApi,
    folder_id: &str,
    destination: &Path,
    quiet: bool,
) -> Result<()> {
    let stop = StopSignal::new();
    install_stop_handler(&stop)?;

    let multi_progress = if !quiet {
        Some(MultiProgress::new())
    } else {
        None
    };

    let clock = SystemClock;
    let mut walker = Walker::new(drive, &clock, WalkOptions::from_config(config))
        .with_stop_signal(stop);
    if let Some(mp) = multi_progress.as_ref() {
        walker = walker.with_progress(mp);
    }

    let report = walker
        .walk(folder_id, destination)
        .with_context(|| format!("Failed to download folder {}", folder_id))?;

    info!(
        "Download complete: {} files ({}), {} folders into {}",
        report.files_downloaded,
        format_bytes(report.bytes_downloaded),
        report.folders_mirrored,
        destination.display()
    );
    if !report.skipped.is_empty() {
        warn!("{} unsupported item(s) were skipped", report.skipped.len());
    }
    for folder in &report.partial_folders {
        warn!("Only the first page of {} was mirrored", folder.display());
    }
    if !report.failed.is_empty() {
        bail!("{} file(s) failed to download", report.failed.len());
    }
    Ok(())
}

fn run_backup(config: &Config, drive: Arc<DriveClient>, root_folder_id: &str, quiet: bool) -> Result<()> {
    let history = match HistoryStore::open(&config.database_file) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!("Backup history disabled: {}", e);
            None
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let job = WalkerJob::new(drive, clock.clone(), WalkOptions::from_config(config), quiet);
    let settings = DriverSettings::from_config(config, root_folder_id)
        .context("Invalid backup schedule")?;

    info!(
        "Backing up folder {} into {}",
        root_folder_id, config.backup.destination_parent
    );

    let driver = BackupDriver::new(Arc::new(job), settings, clock, history, StopSignal::new());
    let handle = start_backup(driver).context("Failed to start backup worker")?;
    install_stop_handler(&handle.stop_signal())?;
    info!("Press Ctrl+C to exit");

    let runs = handle.join().context("Backup worker failed")?;

    info!("Backup finished after {} run(s)", runs);
    Ok(())
}

fn show_history(config: &Config, limit: u32, clear: bool) -> Result<()> {
    let store = HistoryStore::open(&config.database_file)
        .context("Failed to open backup history database")?;

    if clear {
        let deleted = store.delete_all_runs().context("Failed to clear history")?;
        println!("Deleted {} run(s)", deleted);
        return Ok(());
    }

    let runs = store
        .select_recent_runs(limit)
        .context("Failed to read backup history")?;
    if runs.is_empty() {
        println!("No backup runs recorded");
        return Ok(());
    }

    for run in runs {
        println!(
            "{}  {:<9}  {}  files={} bytes={} skipped={}{}",
            run.started_at,
            run.status.as_str(),
            run.destination,
            run.files_downloaded,
            format_bytes(run.bytes_downloaded),
            run.skipped,
            run.error
                .map(|e| format!("  error: {}", e))
                .unwrap_or_default()
        );
        if let Some(digest) = run.tree_digest {
            debug!("  digest {}", digest);
        }
    }
    Ok(())
}
