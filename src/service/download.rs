use crate::models::error::{BackupError, Result};
use crate::service::drive::{DriveApi, MediaChunk};
use crate::utils::clock::Clock;
use log::{debug, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStatus {
    pub bytes_received: u64,
    pub total_size: u64,
}

impl ChunkStatus {
    pub fn percent(&self) -> u64 {
        if self.total_size == 0 {
            100
        } else {
            self.bytes_received * 100 / self.total_size
        }
    }
}

/// Wait before retry number `attempt` (1-based): 1s, 2s, 4s, ...
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.saturating_sub(1).min(16))
}

/// Streams one remote file into a writer, one ranged request at a time.
pub struct ChunkedDownload<'a> {
    api: &'a dyn DriveApi,
    clock: &'a dyn Clock,
    file_id: &'a str,
    path: PathBuf,
    chunk_size: u64,
    num_retries: u32,
    offset: u64,
}

impl<'a> ChunkedDownload<'a> {
    pub fn new(
        api: &'a dyn DriveApi,
        clock: &'a dyn Clock,
        file_id: &'a str,
        path: &Path,
        chunk_size: u64,
        num_retries: u32,
    ) -> Self {
        Self {
            api,
            clock,
            file_id,
            path: path.to_path_buf(),
            chunk_size,
            num_retries,
            offset: 0,
        }
    }

    pub fn bytes_received(&self) -> u64 {
        self.offset
    }

    /// Fetch and write the next chunk. Returns the progress so far and
    /// whether the file is complete.
    pub fn next_chunk<W: Write>(&mut self, sink: &mut W) -> Result<(ChunkStatus, bool)> {
        let chunk = self.fetch_with_retries()?;

        if chunk.bytes.is_empty() && self.offset < chunk.total_size {
            return Err(BackupError::Truncated {
                file_id: self.file_id.to_string(),
                received: self.offset,
                expected: chunk.total_size,
            });
        }

        sink.write_all(&chunk.bytes)
            .map_err(|cause| BackupError::FileWrite {
                path: self.path.clone(),
                cause,
            })?;

        self.offset += chunk.bytes.len() as u64;

        let status = ChunkStatus {
            bytes_received: self.offset,
            total_size: chunk.total_size,
        };
        let done = self.offset >= chunk.total_size;
        debug!(
            "Chunk for {}: {}/{} bytes",
            self.file_id, status.bytes_received, status.total_size
        );
        Ok((status, done))
    }

    fn fetch_with_retries(&self) -> Result<MediaChunk> {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                self.clock.sleep(backoff_delay(attempt));
            }

            match self
                .api
                .download_range(self.file_id, self.offset, self.chunk_size)
            {
                Ok(chunk) => return Ok(chunk),
                Err(e) if e.is_transient() && attempt < self.num_retries => {
                    attempt += 1;
                    warn!(
                        "Chunk at offset {} of {} failed ({}), retry {}/{}",
                        self.offset, self.file_id, e, attempt, self.num_retries
                    );
                }
                Err(e) if e.is_transient() => {
                    return Err(BackupError::ChunkRetriesExhausted {
                        file_id: self.file_id.to_string(),
                        path: self.path.clone(),
                        attempts: attempt + 1,
                        cause: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeClock, FakeDrive};

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn test_downloads_in_fixed_size_chunks() {
        let drive = FakeDrive::new();
        let content = payload(2_500);
        drive.add_file("f1", "data.bin", "root", &content);
        let clock = FakeClock::new();

        let mut download =
            ChunkedDownload::new(&drive, &clock, "f1", Path::new("data.bin"), 1_000, 2);
        let mut sink = Vec::new();
        let mut statuses = Vec::new();
        loop {
            let (status, done) = download.next_chunk(&mut sink).unwrap();
            statuses.push(status.bytes_received);
            if done {
                break;
            }
        }

        assert_eq!(sink, content);
        assert_eq!(statuses, vec![1_000, 2_000, 2_500]);
        assert_eq!(drive.range_requests("f1"), vec![0, 1_000, 2_000]);
    }

    #[test]
    fn test_empty_file_completes_immediately() {
        let drive = FakeDrive::new();
        drive.add_file("f1", "empty.txt", "root", b"");
        let clock = FakeClock::new();

        let mut download =
            ChunkedDownload::new(&drive, &clock, "f1", Path::new("empty.txt"), 1_000, 2);
        let mut sink = Vec::new();
        let (status, done) = download.next_chunk(&mut sink).unwrap();

        assert!(done);
        assert_eq!(status.percent(), 100);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_transient_failures_within_budget_are_retried() {
        let drive = FakeDrive::new();
        drive.add_file("f1", "data.bin", "root", b"hello");
        drive.fail_transiently("f1", 2);
        let clock = FakeClock::new();

        let mut download =
            ChunkedDownload::new(&drive, &clock, "f1", Path::new("data.bin"), 1_000, 2);
        let mut sink = Vec::new();
        let (_, done) = download.next_chunk(&mut sink).unwrap();

        assert!(done);
        assert_eq!(sink, b"hello");
        assert_eq!(clock.total_slept(), Duration::from_secs(3));
    }

    #[test]
    fn test_exhausted_retries_surface_as_error() {
        let drive = FakeDrive::new();
        drive.add_file("f1", "data.bin", "root", b"hello");
        drive.fail_transiently("f1", 3);
        let clock = FakeClock::new();

        let mut download =
            ChunkedDownload::new(&drive, &clock, "f1", Path::new("data.bin"), 1_000, 2);
        let mut sink = Vec::new();
        let result = download.next_chunk(&mut sink);

        match result {
            Err(BackupError::ChunkRetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("Expected ChunkRetriesExhausted, got {:?}", other),
        }
        assert!(sink.is_empty());
    }

    #[test]
    fn test_permanent_errors_are_not_retried() {
        let drive = FakeDrive::new();
        let clock = FakeClock::new();

        let mut download =
            ChunkedDownload::new(&drive, &clock, "missing", Path::new("x"), 1_000, 2);
        let mut sink = Vec::new();
        let result = download.next_chunk(&mut sink);

        assert!(matches!(result, Err(BackupError::NotFound { .. })));
        assert_eq!(clock.total_slept(), Duration::ZERO);
    }
}
