//! In-memory stand-ins for the Drive API and the clock.

use crate::models::error::{BackupError, Result};
use crate::models::remote_entry::{RemoteEntry, FOLDER_MIME_TYPE};
use crate::service::drive::{DriveApi, ListPage, MediaChunk};
use crate::utils::clock::Clock;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

struct Node {
    entry: RemoteEntry,
    content: Vec<u8>,
}

#[derive(Default)]
struct DriveState {
    nodes: Vec<Node>,
    next_id: u64,
    transient_failures: HashMap<String, u32>,
    permanent_failures: HashSet<String>,
    range_requests: HashMap<String, Vec<u64>>,
    list_calls: u64,
}

impl DriveState {
    fn find(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.entry.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.entry.id == id)
    }
}

/// Remote tree held in memory. Children list in insertion order.
#[derive(Default)]
pub struct FakeDrive {
    state: Mutex<DriveState>,
}

impl FakeDrive {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, entry: RemoteEntry, content: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.nodes.push(Node {
            entry,
            content: content.to_vec(),
        });
    }

    pub fn add_folder(&self, id: &str, name: &str, parent: &str) {
        self.insert(RemoteEntry::new(id, name, FOLDER_MIME_TYPE, Some(parent)), b"");
    }

    pub fn add_file(&self, id: &str, name: &str, parent: &str, content: &[u8]) {
        self.insert(
            RemoteEntry::new(id, name, "application/octet-stream", Some(parent)),
            content,
        );
    }

    pub fn add_item(&self, id: &str, name: &str, parent: &str, mime_type: &str) {
        self.insert(RemoteEntry::new(id, name, mime_type, Some(parent)), b"");
    }

    /// The next `count` range requests for `id` answer HTTP 503.
    pub fn fail_transiently(&self, id: &str, count: u32) {
        let mut state = self.state.lock().unwrap();
        state.transient_failures.insert(id.to_string(), count);
    }

    /// Every range request for `id` answers HTTP 400.
    pub fn fail_permanently(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.permanent_failures.insert(id.to_string());
    }

    pub fn range_requests(&self, id: &str) -> Vec<u64> {
        let state = self.state.lock().unwrap();
        state.range_requests.get(id).cloned().unwrap_or_default()
    }

    pub fn list_calls(&self) -> u64 {
        self.state.lock().unwrap().list_calls
    }

    pub fn parent_of(&self, id: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.find(id).and_then(|n| n.entry.parent_id.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().unwrap().find(id).is_some()
    }
}

impl DriveApi for FakeDrive {
    fn list_children(
        &self,
        parent_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ListPage> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;

        let known = parent_id == "root"
            || state
                .find(parent_id)
                .is_some_and(|n| n.entry.is_folder());
        if !known {
            return Err(BackupError::NotFound {
                id: parent_id.to_string(),
            });
        }

        let children: Vec<RemoteEntry> = state
            .nodes
            .iter()
            .filter(|n| n.entry.parent_id.as_deref() == Some(parent_id))
            .map(|n| n.entry.clone())
            .collect();

        let offset: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let end = (offset + page_size as usize).min(children.len());
        let next_page_token = (end < children.len()).then(|| end.to_string());

        Ok(ListPage {
            entries: children[offset.min(end)..end].to_vec(),
            next_page_token,
        })
    }

    fn download_range(&self, file_id: &str, offset: u64, length: u64) -> Result<MediaChunk> {
        let mut state = self.state.lock().unwrap();
        state
            .range_requests
            .entry(file_id.to_string())
            .or_default()
            .push(offset);

        if let Some(remaining) = state.transient_failures.get_mut(file_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BackupError::Api {
                    status: 503,
                    message: "backend unavailable".to_string(),
                });
            }
        }

        if state.permanent_failures.contains(file_id) {
            return Err(BackupError::Api {
                status: 400,
                message: "bad request".to_string(),
            });
        }

        let node = state.find(file_id).ok_or_else(|| BackupError::NotFound {
            id: file_id.to_string(),
        })?;

        let total = node.content.len() as u64;
        let start = offset.min(total) as usize;
        let stop = (offset + length).min(total) as usize;
        Ok(MediaChunk {
            bytes: node.content[start..stop].to_vec(),
            total_size: total,
        })
    }

    fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<RemoteEntry> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("folder-{}", state.next_id);
        let entry = RemoteEntry::new(&id, name, FOLDER_MIME_TYPE, Some(parent_id.unwrap_or("root")));
        state.nodes.push(Node {
            entry: entry.clone(),
            content: Vec::new(),
        });
        Ok(entry)
    }

    fn search_by_name(&self, name: &str) -> Result<Vec<RemoteEntry>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .nodes
            .iter()
            .filter(|n| n.entry.name == name)
            .map(|n| n.entry.clone())
            .collect())
    }

    fn get_parents(&self, file_id: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let node = state.find(file_id).ok_or_else(|| BackupError::NotFound {
            id: file_id.to_string(),
        })?;
        Ok(node.entry.parent_id.iter().cloned().collect())
    }

    fn move_file(
        &self,
        file_id: &str,
        add_parent: &str,
        remove_parents: &[String],
    ) -> Result<RemoteEntry> {
        let mut state = self.state.lock().unwrap();
        let node = state.find_mut(file_id).ok_or_else(|| BackupError::NotFound {
            id: file_id.to_string(),
        })?;
        if let Some(old) = &node.entry.parent_id {
            if !remove_parents.contains(old) && old != add_parent {
                return Err(BackupError::Api {
                    status: 400,
                    message: "fake drive keeps a single parent per item".to_string(),
                });
            }
        }
        node.entry.parent_id = Some(add_parent.to_string());
        Ok(node.entry.clone())
    }

    fn delete(&self, file_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.nodes.len();
        state.nodes.retain(|n| n.entry.id != file_id);
        if state.nodes.len() == before {
            return Err(BackupError::NotFound {
                id: file_id.to_string(),
            });
        }
        Ok(())
    }
}

/// Clock whose `sleep` advances virtual time instantly.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
    slept: Mutex<Duration>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::starting_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            slept: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap();
    }

    pub fn total_slept(&self) -> Duration {
        *self.slept.lock().unwrap()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        *self.slept.lock().unwrap() += duration;
    }
}
