use crate::models::backup_run::{FailedDownload, SkippedEntry, WalkReport};
use crate::models::config::{CollisionPolicy, Config};
use crate::models::error::{BackupError, Result};
use crate::models::remote_entry::{EntryKind, RemoteEntry};
use crate::service::download::ChunkedDownload;
use crate::service::drive::DriveApi;
use crate::utils::clock::Clock;
use crate::utils::directory::{ensure_dir, sanitize_component, with_suffix};
use crate::utils::progress::create_download_bar;
use crate::utils::stop::StopSignal;
use indicatif::MultiProgress;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::Builder;

#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub page_size: u32,
    pub chunk_size_bytes: u64,
    pub chunk_retries: u32,
    pub follow_all_pages: bool,
    pub continue_on_error: bool,
    pub collision_policy: CollisionPolicy,
}

impl WalkOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.page_size,
            chunk_size_bytes: config.chunk_size_bytes,
            chunk_retries: config.chunk_retries,
            follow_all_pages: config.follow_all_pages,
            continue_on_error: config.continue_on_error,
            collision_policy: config.collision_policy,
        }
    }
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Mirrors a remote folder hierarchy into a local directory.
pub struct Walker<'a> {
    api: &'a dyn DriveApi,
    clock: &'a dyn Clock,
    options: WalkOptions,
    stop: Option<StopSignal>,
    progress: Option<&'a MultiProgress>,
}

impl<'a> Walker<'a> {
    pub fn new(api: &'a dyn DriveApi, clock: &'a dyn Clock, options: WalkOptions) -> Self {
        Self {
            api,
            clock,
            options,
            stop: None,
            progress: None,
        }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn with_progress(mut self, progress: &'a MultiProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Mirror `root_id` into `destination`, creating it if absent.
    ///
    /// A failed download aborts the walk unless `continue_on_error` is set,
    /// in which case it is recorded in the report instead.
    pub fn walk(&self, root_id: &str, destination: &Path) -> Result<WalkReport> {
        let mut report = WalkReport::default();
        let mut claimed: HashMap<PathBuf, bool> = HashMap::new();
        let mut stack = vec![(root_id.to_string(), destination.to_path_buf())];

        while let Some((folder_id, folder_path)) = stack.pop() {
            self.check_stop()?;
            ensure_dir(&folder_path)?;
            report.folders_mirrored += 1;

            let entries = self.list_folder(&folder_id, &folder_path, &mut report)?;
            let mut subfolders = Vec::new();

            for entry in entries {
                self.check_stop()?;
                match &entry.kind {
                    EntryKind::Folder => {
                        let path = self.claim_path(&folder_path, &entry, &mut claimed, &mut report)?;
                        info!("Stepping into folder: {}", path.display());
                        subfolders.push((entry.id.clone(), path));
                    }
                    EntryKind::File => {
                        let path = self.claim_path(&folder_path, &entry, &mut claimed, &mut report)?;
                        match self.download_file(&entry, &path) {
                            Ok(bytes) => {
                                report.files_downloaded += 1;
                                report.bytes_downloaded += bytes;
                            }
                            Err(BackupError::Cancelled) => return Err(BackupError::Cancelled),
                            Err(e) if self.options.continue_on_error => {
                                warn!("Failed to download {}: {}", path.display(), e);
                                report.failed.push(FailedDownload {
                                    id: entry.id.clone(),
                                    path,
                                    error: e.to_string(),
                                });
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    EntryKind::Unsupported(mime_type) => {
                        warn!("Unsupported file: {} ({})", entry.name, mime_type);
                        report.skipped.push(SkippedEntry {
                            id: entry.id.clone(),
                            name: entry.name.clone(),
                            mime_type: mime_type.clone(),
                        });
                    }
                }
            }

            // Reversed so folders are visited in listing order.
            stack.extend(subfolders.into_iter().rev());
        }

        Ok(report)
    }

    fn check_stop(&self) -> Result<()> {
        match &self.stop {
            Some(stop) if stop.is_stop_requested() => Err(BackupError::Cancelled),
            _ => Ok(()),
        }
    }

    fn list_folder(
        &self,
        folder_id: &str,
        folder_path: &Path,
        report: &mut WalkReport,
    ) -> Result<Vec<RemoteEntry>> {
        let page_size = self.options.page_size;
        let mut page = self.api.list_children(folder_id, page_size, None)?;
        let mut entries = std::mem::take(&mut page.entries);

        while let Some(token) = page.next_page_token.take() {
            if !self.options.follow_all_pages {
                warn!(
                    "Folder {} has more than {} entries; only the first page was mirrored",
                    folder_path.display(),
                    page_size
                );
                report.partial_folders.push(folder_path.to_path_buf());
                break;
            }
            page = self.api.list_children(folder_id, page_size, Some(&token))?;
            entries.append(&mut page.entries);
        }

        debug!("{} entries in {}", entries.len(), folder_path.display());
        Ok(entries)
    }

    /// Local path for a child, resolving siblings that map to the same name.
    /// `Overwrite` only applies between entries of the same kind.
    fn claim_path(
        &self,
        parent: &Path,
        entry: &RemoteEntry,
        claimed: &mut HashMap<PathBuf, bool>,
        report: &mut WalkReport,
    ) -> Result<PathBuf> {
        let is_folder = entry.kind == EntryKind::Folder;
        let sanitized = sanitize_component(&entry.name);
        let candidate = parent.join(&sanitized);
        let Some(&claimed_folder) = claimed.get(&candidate) else {
            claimed.insert(candidate.clone(), is_folder);
            return Ok(candidate);
        };

        match self.options.collision_policy {
            CollisionPolicy::Overwrite if claimed_folder == is_folder => {
                warn!("Overwriting earlier sibling at {}", candidate.display());
                Ok(candidate)
            }
            CollisionPolicy::Overwrite | CollisionPolicy::Error => {
                Err(BackupError::NameCollision { path: candidate })
            }
            CollisionPolicy::Rename => {
                let mut n = 2;
                loop {
                    let renamed = parent.join(with_suffix(&sanitized, n));
                    if !claimed.contains_key(&renamed) {
                        claimed.insert(renamed.clone(), is_folder);
                        warn!(
                            "Duplicate name {}; saving as {}",
                            candidate.display(),
                            renamed.display()
                        );
                        report.renamed.push(renamed.clone());
                        return Ok(renamed);
                    }
                    n += 1;
                }
            }
        }
    }

    /// Download into a freshly created staging file beside `path`, then
    /// persist it into place. A failed download drops the staging file.
    fn download_file(&self, entry: &RemoteEntry, path: &Path) -> Result<u64> {
        info!(
            "Downloading file with id: {} name: {}",
            entry.id,
            path.display()
        );

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let mut staging = Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(|cause| BackupError::FileWrite {
                path: parent.to_path_buf(),
                cause,
            })?;

        let bytes = {
            let mut writer = BufWriter::new(staging.as_file_mut());
            let bytes = self.copy_chunks(entry, path, &mut writer)?;
            writer.flush().map_err(|cause| BackupError::FileWrite {
                path: path.to_path_buf(),
                cause,
            })?;
            bytes
        };

        staging
            .persist(path)
            .map_err(|e| BackupError::FileWrite {
                path: path.to_path_buf(),
                cause: e.error,
            })?;
        info!("Download complete: {}", path.display());
        Ok(bytes)
    }

    fn copy_chunks<W: Write>(&self, entry: &RemoteEntry, path: &Path, writer: &mut W) -> Result<u64> {
        let mut download = ChunkedDownload::new(
            self.api,
            self.clock,
            &entry.id,
            path,
            self.options.chunk_size_bytes,
            self.options.chunk_retries,
        );
        let bar = self.progress.map(|mp| mp.add(create_download_bar(&entry.name)));

        loop {
            if let Err(e) = self.check_stop() {
                if let Some(bar) = &bar {
                    bar.abandon();
                }
                return Err(e);
            }

            let (status, done) = match download.next_chunk(writer) {
                Ok(progress) => progress,
                Err(e) => {
                    if let Some(bar) = &bar {
                        bar.abandon();
                    }
                    return Err(e);
                }
            };

            if let Some(bar) = &bar {
                bar.set_length(status.total_size);
                bar.set_position(status.bytes_received);
            }
            debug!("Download {}%.", status.percent());

            if done {
                break;
            }
        }

        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        Ok(download.bytes_received())
    }
}
