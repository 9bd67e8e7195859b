use crate::models::error::{BackupError, Result};
use blake2::{Blake2b512, Digest};
use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;
use walkdir::WalkDir;

/// BLAKE2b digest over every file below `root`: relative path, size and
/// contents, visited in name order. Two mirrors of the same remote tree
/// produce the same digest.
pub fn digest_tree(root: &Path) -> Result<String> {
    let mut hasher = Blake2b512::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| BackupError::DirectoryRead(e.to_string()))?;
        if entry.file_type().is_dir() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| BackupError::DirectoryRead(e.to_string()))?;
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        hasher.update(relative.join("/").as_bytes());
        hasher.update([0u8]);

        let file = fs::File::open(entry.path()).map_err(|cause| BackupError::HashError {
            path: entry.path().to_path_buf(),
            cause,
        })?;
        let size = hash_contents(BufReader::new(file), &mut hasher).map_err(|cause| {
            BackupError::HashError {
                path: entry.path().to_path_buf(),
                cause,
            }
        })?;
        hasher.update(size.to_le_bytes());
    }

    Ok(hex::encode(hasher.finalize()))
}

fn hash_contents<R: Read>(mut reader: BufReader<R>, hasher: &mut Blake2b512) -> std::io::Result<u64> {
    let mut buffer = [0; 8192];
    let mut bytes_read = 0u64;
    loop {
        let count = reader.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        bytes_read += count as u64;
        hasher.update(&buffer[..count]);
    }
    Ok(bytes_read)
}
