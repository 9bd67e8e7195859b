use crate::models::backup_run::{BackupRun, WalkReport};
use crate::models::config::{BackupSettings, Config};
use crate::models::error::{BackupError, Result};
use crate::models::history::BackupStatus;
use crate::repo::sqlite::{HistoryStore, RunOutcome};
use crate::service::drive::DriveApi;
use crate::service::hash::digest_tree;
use crate::service::walker::{WalkOptions, Walker};
use crate::utils::clock::Clock;
use crate::utils::directory::{sanitize_component, unique_child};
use crate::utils::progress::format_bytes;
use crate::utils::stop::StopSignal;
use chrono::{DateTime, Local, Utc};
use indicatif::MultiProgress;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest single wait before the stop signal is checked again.
const STOP_POLL: Duration = Duration::from_secs(1);

/// When backups run.
#[derive(Debug, Clone)]
pub enum Schedule {
    Once,
    Interval(Duration),
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    /// A cron expression wins over the interval; a zero interval without one
    /// means a single run.
    pub fn from_settings(settings: &BackupSettings) -> Result<Self> {
        if let Some(expression) = &settings.schedule {
            let schedule = cron::Schedule::from_str(expression).map_err(|e| {
                BackupError::InvalidConfig(format!(
                    "Invalid cron expression '{}': {}",
                    expression, e
                ))
            })?;
            return Ok(Schedule::Cron(Box::new(schedule)));
        }

        let interval = settings.interval.total();
        if interval.is_zero() {
            Ok(Schedule::Once)
        } else {
            Ok(Schedule::Interval(interval))
        }
    }

    /// Next tick after `last_tick`. A tick that is already in the past is
    /// pulled forward to `now`, so missed ticks collapse into one run.
    pub fn next_after(&self, last_tick: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Once => None,
            Schedule::Interval(interval) => {
                let step = chrono::Duration::from_std(*interval).ok()?;
                let next = last_tick.checked_add_signed(step)?;
                Some(next.max(now))
            }
            Schedule::Cron(schedule) => schedule.after(&now.max(last_tick)).next(),
        }
    }

    pub fn interval_seconds(&self) -> u64 {
        match self {
            Schedule::Interval(interval) => interval.as_secs(),
            _ => 0,
        }
    }
}

/// One full backup of a subtree into `run.destination_root`.
pub trait BackupJob: Send + Sync {
    fn run(&self, run: &BackupRun, stop: &StopSignal) -> Result<WalkReport>;
}

/// Mirrors the run's root folder with a [`Walker`].
pub struct WalkerJob {
    api: Arc<dyn DriveApi>,
    clock: Arc<dyn Clock>,
    options: WalkOptions,
    quiet: bool,
}

impl WalkerJob {
    pub fn new(api: Arc<dyn DriveApi>, clock: Arc<dyn Clock>, options: WalkOptions, quiet: bool) -> Self {
        Self {
            api,
            clock,
            options,
            quiet,
        }
    }
}

impl BackupJob for WalkerJob {
    fn run(&self, run: &BackupRun, stop: &StopSignal) -> Result<WalkReport> {
        let multi_progress = if !self.quiet {
            Some(MultiProgress::new())
        } else {
            None
        };

        let mut walker = Walker::new(self.api.as_ref(), self.clock.as_ref(), self.options.clone())
            .with_stop_signal(stop.clone());
        if let Some(mp) = multi_progress.as_ref() {
            walker = walker.with_progress(mp);
        }

        walker.walk(&run.root_folder_id, &run.destination_root)
    }
}

#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub root_folder_id: String,
    pub destination_parent: PathBuf,
    pub destination_format: String,
    pub schedule: Schedule,
    pub run_on_startup: bool,
    pub compute_digest: bool,
}

impl DriverSettings {
    pub fn from_config(config: &Config, root_folder_id: &str) -> Result<Self> {
        Ok(Self {
            root_folder_id: root_folder_id.to_string(),
            destination_parent: PathBuf::from(&config.backup.destination_parent),
            destination_format: config.backup.destination_format.clone(),
            schedule: Schedule::from_settings(&config.backup)?,
            run_on_startup: config.backup.run_on_startup,
            compute_digest: config.compute_digest,
        })
    }
}

/// Re-runs a [`BackupJob`] on a schedule until stopped.
pub struct BackupDriver {
    job: Arc<dyn BackupJob>,
    settings: DriverSettings,
    clock: Arc<dyn Clock>,
    history: Option<HistoryStore>,
    stop: StopSignal,
}

impl BackupDriver {
    pub fn new(
        job: Arc<dyn BackupJob>,
        settings: DriverSettings,
        clock: Arc<dyn Clock>,
        history: Option<HistoryStore>,
        stop: StopSignal,
    ) -> Self {
        Self {
            job,
            settings,
            clock,
            history,
            stop,
        }
    }

    /// Run until the schedule is exhausted or the stop signal is raised.
    /// Returns how many runs were started.
    pub fn run(&self) -> usize {
        let schedule = &self.settings.schedule;
        let mut runs = 0;
        let mut last_tick = self.clock.now();

        if self.settings.run_on_startup || matches!(schedule, Schedule::Once) {
            info!("Running initial backup on startup...");
            self.execute_run(last_tick);
            runs += 1;
        }

        while !self.stop.is_stop_requested() {
            let now = self.clock.now();
            let Some(next) = schedule.next_after(last_tick, now) else {
                break;
            };

            info!(
                "Next backup scheduled for: {} (in {} seconds)",
                next.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S %Z"),
                (next - now).num_seconds().max(0)
            );

            if !self.wait_until(next) {
                break;
            }

            last_tick = next;
            self.execute_run(self.clock.now());
            runs += 1;
        }

        info!("Backup driver stopped after {} run(s)", runs);
        runs
    }

    /// Sleep until `target`. Returns false if stopped first.
    fn wait_until(&self, target: DateTime<Utc>) -> bool {
        loop {
            if self.stop.is_stop_requested() {
                return false;
            }

            let now = self.clock.now();
            if now >= target {
                return true;
            }

            let remaining = (target - now).to_std().unwrap_or(Duration::ZERO);
            self.clock.sleep(remaining.min(STOP_POLL));
        }
    }

    fn destination_for(&self, started_at: DateTime<Utc>) -> PathBuf {
        let name = started_at
            .with_timezone(&Local)
            .format(&self.settings.destination_format)
            .to_string();
        unique_child(&self.settings.destination_parent, &sanitize_component(&name))
    }

    fn execute_run(&self, started_at: DateTime<Utc>) {
        let destination = self.destination_for(started_at);
        let run = BackupRun::new(
            &self.settings.root_folder_id,
            destination,
            self.settings.schedule.interval_seconds(),
            started_at,
        );

        info!(
            "Starting backup run {} into {}",
            run.id,
            run.destination_root.display()
        );

        if let Some(history) = &self.history {
            if let Err(e) = history.insert_run_started(&run) {
                warn!("Failed to record start of run {}: {}", run.id, e);
            }
        }

        let result = self.job.run(&run, &self.stop);

        let (status, report, error) = match &result {
            Ok(report) if report.failed.is_empty() => (BackupStatus::Completed, Some(report), None),
            Ok(report) => (
                BackupStatus::Failed,
                Some(report),
                Some(format!("{} file(s) failed to download", report.failed.len())),
            ),
            Err(BackupError::Cancelled) => (BackupStatus::Stopped, None, None),
            Err(e) => (BackupStatus::Failed, None, Some(e.to_string())),
        };

        let tree_digest = match report {
            Some(_) if self.settings.compute_digest && run.destination_root.exists() => {
                match digest_tree(&run.destination_root) {
                    Ok(digest) => Some(digest),
                    Err(e) => {
                        warn!("Failed to digest {}: {}", run.destination_root.display(), e);
                        None
                    }
                }
            }
            _ => None,
        };

        match (&result, report) {
            (_, Some(report)) => {
                info!(
                    "Backup run {} {}: {} files ({}), {} folders, {} skipped",
                    run.id,
                    status.as_str(),
                    report.files_downloaded,
                    format_bytes(report.bytes_downloaded),
                    report.folders_mirrored,
                    report.skipped.len()
                );
                if let Some(digest) = &tree_digest {
                    debug!("Tree digest for {}: {}", run.id, digest);
                }
            }
            (Err(BackupError::Cancelled), None) => info!("Backup run {} stopped", run.id),
            (Err(e), None) => warn!("Backup run {} failed: {}", run.id, e),
            (Ok(_), None) => {}
        }

        if let Some(history) = &self.history {
            let outcome = RunOutcome {
                status,
                completed_at: self.clock.now(),
                report,
                tree_digest: tree_digest.as_deref(),
                error: error.as_deref(),
            };
            if let Err(e) = history.complete_run(&run.id, &outcome) {
                warn!("Failed to record outcome of run {}: {}", run.id, e);
            }
        }
    }
}

/// Handle to a driver running on its own thread.
pub struct BackupHandle {
    stop: StopSignal,
    worker: JoinHandle<usize>,
}

impl BackupHandle {
    pub fn stop(&self) {
        self.stop.request_stop();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker. Returns the number of runs it started.
    pub fn join(self) -> Result<usize> {
        self.worker.join().map_err(|_| BackupError::WorkerPanicked)
    }
}

/// Start `driver` on a dedicated thread and return immediately.
pub fn start_backup(driver: BackupDriver) -> Result<BackupHandle> {
    let stop = driver.stop.clone();
    let worker = thread::Builder::new()
        .name("backup-driver".to_string())
        .spawn(move || driver.run())?;

    Ok(BackupHandle { stop, worker })
}
