use crate::models::error::{BackupError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Turn a remote name into a single safe path component.
///
/// Separators and NUL become `_`; `.`, `..` and the empty name become `_`.
/// Everything else is kept verbatim.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// `report.pdf` with n = 2 becomes `report (2).pdf`.
pub fn with_suffix(name: &str, n: usize) -> String {
    match name.rfind('.') {
        Some(idx) if idx > 0 => format!("{} ({}){}", &name[..idx], n, &name[idx..]),
        _ => format!("{} ({})", name, n),
    }
}

/// First of `parent/name`, `parent/name (2)`, ... that does not exist yet.
pub fn unique_child(parent: &Path, name: &str) -> PathBuf {
    let candidate = parent.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let mut n = 2;
    loop {
        let candidate = parent.join(with_suffix(name, n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|cause| BackupError::CreateDir {
        path: path.to_path_buf(),
        cause,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_keeps_ordinary_names() {
        assert_eq!(sanitize_component("Holiday 2023.jpg"), "Holiday 2023.jpg");
        assert_eq!(sanitize_component("résumé (final)"), "résumé (final)");
    }

    #[test]
    fn test_sanitize_replaces_separators() {
        assert_eq!(sanitize_component("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_component("../etc"), ".._etc");
    }

    #[test]
    fn test_sanitize_rejects_relative_components() {
        assert_eq!(sanitize_component("."), "_");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component(""), "_");
    }

    #[test]
    fn test_with_suffix_goes_before_extension() {
        assert_eq!(with_suffix("report.pdf", 2), "report (2).pdf");
        assert_eq!(with_suffix("notes", 3), "notes (3)");
        assert_eq!(with_suffix(".bashrc", 2), ".bashrc (2)");
    }

    #[test]
    fn test_unique_child_skips_existing() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("run")).unwrap();
        fs::create_dir(temp_dir.path().join("run (2)")).unwrap();

        let path = unique_child(temp_dir.path(), "run");
        assert_eq!(path, temp_dir.path().join("run (3)"));
    }
}
