pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Google Workspace documents live under this prefix and have no binary
/// content to fetch.
const WORKSPACE_MIME_PREFIX: &str = "application/vnd.google-apps.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Folder,
    File,
    Unsupported(String),
}

impl EntryKind {
    /// Only Workspace types other than folders are unsupported. Every other
    /// `application/*` type (PDF, zip, octet-stream) has downloadable bytes
    /// and is mirrored as a file, unlike a blanket `application/` skip.
    pub fn from_mime_type(mime_type: &str) -> Self {
        if mime_type == FOLDER_MIME_TYPE {
            EntryKind::Folder
        } else if mime_type.starts_with(WORKSPACE_MIME_PREFIX) {
            EntryKind::Unsupported(mime_type.to_string())
        } else {
            EntryKind::File
        }
    }
}

/// One child returned by a listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub kind: EntryKind,
    pub parent_id: Option<String>,
}

impl RemoteEntry {
    pub fn new(id: &str, name: &str, mime_type: &str, parent_id: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            kind: EntryKind::from_mime_type(mime_type),
            parent_id: parent_id.map(str::to_string),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_mime_type_is_folder() {
        assert_eq!(EntryKind::from_mime_type(FOLDER_MIME_TYPE), EntryKind::Folder);
    }

    #[test]
    fn test_workspace_documents_are_unsupported() {
        let kind = EntryKind::from_mime_type("application/vnd.google-apps.spreadsheet");
        assert_eq!(
            kind,
            EntryKind::Unsupported("application/vnd.google-apps.spreadsheet".to_string())
        );
    }

    #[test]
    fn test_binary_mime_types_are_files() {
        assert_eq!(EntryKind::from_mime_type("image/jpeg"), EntryKind::File);
        assert_eq!(EntryKind::from_mime_type("application/pdf"), EntryKind::File);
        assert_eq!(EntryKind::from_mime_type("text/plain"), EntryKind::File);
    }

    #[test]
    fn test_non_workspace_application_types_are_files() {
        assert_eq!(EntryKind::from_mime_type("application/zip"), EntryKind::File);
        assert_eq!(
            EntryKind::from_mime_type("application/octet-stream"),
            EntryKind::File
        );
        assert_eq!(
            EntryKind::from_mime_type("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
            EntryKind::File
        );
    }

    #[test]
    fn test_new_entry_derives_kind() {
        let entry = RemoteEntry::new("id1", "Photos", FOLDER_MIME_TYPE, Some("root"));
        assert!(entry.is_folder());
        assert_eq!(entry.parent_id.as_deref(), Some("root"));
    }
}
