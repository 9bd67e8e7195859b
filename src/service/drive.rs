use crate::models::error::{BackupError, Result};
use crate::models::remote_entry::{RemoteEntry, FOLDER_MIME_TYPE};
use crate::service::auth::Authenticator;
use log::debug;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

const ENTRY_FIELDS: &str = "id, name, mimeType, parents";

/// One page of a folder listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<RemoteEntry>,
    pub next_page_token: Option<String>,
}

/// A slice of file content and the size of the whole file.
#[derive(Debug, Clone)]
pub struct MediaChunk {
    pub bytes: Vec<u8>,
    pub total_size: u64,
}

/// The storage operations the rest of the crate depends on.
pub trait DriveApi: Send + Sync {
    fn list_children(
        &self,
        parent_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ListPage>;

    fn download_range(&self, file_id: &str, offset: u64, length: u64) -> Result<MediaChunk>;

    fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<RemoteEntry>;

    fn search_by_name(&self, name: &str) -> Result<Vec<RemoteEntry>>;

    fn get_parents(&self, file_id: &str) -> Result<Vec<String>>;

    fn move_file(
        &self,
        file_id: &str,
        add_parent: &str,
        remove_parents: &[String],
    ) -> Result<RemoteEntry>;

    fn delete(&self, file_id: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    parents: Vec<String>,
}

impl From<DriveFile> for RemoteEntry {
    fn from(file: DriveFile) -> Self {
        RemoteEntry::new(
            &file.id,
            &file.name,
            &file.mime_type,
            file.parents.first().map(String::as_str),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParentsOnly {
    #[serde(default)]
    parents: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Quote a value for a Drive `q` expression.
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Total size from a `Content-Range: bytes 0-1023/4096` header.
pub fn parse_content_range_total(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.trim().parse().ok()
}

/// Blocking client for the Drive v3 REST API.
pub struct DriveClient {
    http: Client,
    base_url: String,
    auth: Authenticator,
}

impl DriveClient {
    pub fn new(http: Client, auth: Authenticator) -> Self {
        Self {
            http,
            base_url: DRIVE_API_BASE.to_string(),
            auth,
        }
    }

    pub fn build_http_client() -> Result<Client> {
        Ok(Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(300))
            .build()?)
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        Ok(builder.bearer_auth(self.auth.access_token()?))
    }

    fn files_url(&self) -> String {
        format!("{}/files", self.base_url)
    }

    fn file_url(&self, file_id: &str) -> String {
        format!("{}/files/{}", self.base_url, file_id)
    }

    fn list(&self, query: &str, page_size: u32, page_token: Option<&str>) -> Result<FileList> {
        let fields = format!("nextPageToken, files({})", ENTRY_FIELDS);
        let page_size = page_size.to_string();
        let mut params = vec![
            ("q", query),
            ("pageSize", page_size.as_str()),
            ("fields", fields.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let request = self.authorized(self.http.get(self.files_url()).query(&params))?;
        let response = check_status(request.send()?, query)?;
        Ok(response.json()?)
    }
}

impl DriveApi for DriveClient {
    fn list_children(
        &self,
        parent_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ListPage> {
        let query = format!(
            "'{}' in parents and trashed = false",
            escape_query_value(parent_id)
        );
        let list = self.list(&query, page_size, page_token)?;
        debug!(
            "Listed {} children of {} (more pages: {})",
            list.files.len(),
            parent_id,
            list.next_page_token.is_some()
        );

        Ok(ListPage {
            entries: list.files.into_iter().map(RemoteEntry::from).collect(),
            next_page_token: list.next_page_token,
        })
    }

    fn download_range(&self, file_id: &str, offset: u64, length: u64) -> Result<MediaChunk> {
        let end = offset + length.max(1) - 1;
        let request = self.authorized(
            self.http
                .get(self.file_url(file_id))
                .query(&[("alt", "media")])
                .header(RANGE, format!("bytes={}-{}", offset, end)),
        )?;
        let response = request.send()?;

        // Range starting at or past the end of the file (including empty files).
        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            let total_size = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range_total)
                .unwrap_or(offset);
            return Ok(MediaChunk {
                bytes: Vec::new(),
                total_size,
            });
        }

        let response = check_status(response, file_id)?;
        let partial = response.status() == StatusCode::PARTIAL_CONTENT;
        let range_total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);
        let body = response.bytes()?;

        if partial {
            let total_size = range_total.unwrap_or(offset + body.len() as u64);
            return Ok(MediaChunk {
                bytes: body.to_vec(),
                total_size,
            });
        }

        // Server ignored the range and sent the whole file.
        let total_size = body.len() as u64;
        let start = offset.min(total_size) as usize;
        let stop = (offset + length).min(total_size) as usize;
        Ok(MediaChunk {
            bytes: body[start..stop].to_vec(),
            total_size,
        })
    }

    fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<RemoteEntry> {
        let mut metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        if let Some(parent) = parent_id {
            metadata["parents"] = json!([parent]);
        }

        let request = self.authorized(
            self.http
                .post(self.files_url())
                .query(&[("fields", ENTRY_FIELDS)])
                .json(&metadata),
        )?;
        let response = check_status(request.send()?, name)?;
        let file: DriveFile = response.json()?;
        Ok(file.into())
    }

    fn search_by_name(&self, name: &str) -> Result<Vec<RemoteEntry>> {
        let query = format!("name = '{}' and trashed = false", escape_query_value(name));
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let list = self.list(&query, 1000, page_token.as_deref())?;
            entries.extend(list.files.into_iter().map(RemoteEntry::from));
            match list.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(entries)
    }

    fn get_parents(&self, file_id: &str) -> Result<Vec<String>> {
        let request = self.authorized(
            self.http
                .get(self.file_url(file_id))
                .query(&[("fields", "parents")]),
        )?;
        let response = check_status(request.send()?, file_id)?;
        let parents: ParentsOnly = response.json()?;
        Ok(parents.parents)
    }

    fn move_file(
        &self,
        file_id: &str,
        add_parent: &str,
        remove_parents: &[String],
    ) -> Result<RemoteEntry> {
        let remove = remove_parents.join(",");
        let mut params = vec![("addParents", add_parent), ("fields", ENTRY_FIELDS)];
        if !remove.is_empty() {
            params.push(("removeParents", remove.as_str()));
        }

        let request = self.authorized(
            self.http
                .patch(self.file_url(file_id))
                .query(&params)
                .json(&json!({})),
        )?;
        let response = check_status(request.send()?, file_id)?;
        let file: DriveFile = response.json()?;
        Ok(file.into())
    }

    fn delete(&self, file_id: &str) -> Result<()> {
        let request = self.authorized(self.http.delete(self.file_url(file_id)))?;
        check_status(request.send()?, file_id)?;
        Ok(())
    }
}

fn check_status(response: Response, subject: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body);

    Err(match status {
        StatusCode::NOT_FOUND => BackupError::NotFound {
            id: subject.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackupError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        _ => BackupError::Api {
            status: status.as_u16(),
            message,
        },
    })
}
