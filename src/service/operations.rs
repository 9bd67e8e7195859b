use crate::models::error::Result;
use crate::models::remote_entry::RemoteEntry;
use crate::service::drive::DriveApi;
use log::{debug, info};

/// Create a folder and return its id.
pub fn create_folder(api: &dyn DriveApi, name: &str, parent_id: Option<&str>) -> Result<String> {
    let entry = api.create_folder(name, parent_id)?;
    info!("Create Complete: {} ({})", entry.name, entry.id);
    Ok(entry.id)
}

/// Every non-trashed item whose name matches exactly.
pub fn search(api: &dyn DriveApi, name: &str) -> Result<Vec<RemoteEntry>> {
    let entries = api.search_by_name(name)?;
    debug!("Found {} item(s) named '{}'", entries.len(), name);
    Ok(entries)
}

/// Move a file into `folder_id`, detaching it from all other parents.
pub fn move_file(api: &dyn DriveApi, file_id: &str, folder_id: &str) -> Result<RemoteEntry> {
    let previous: Vec<String> = api
        .get_parents(file_id)?
        .into_iter()
        .filter(|p| p != folder_id)
        .collect();

    let entry = api.move_file(file_id, folder_id, &previous)?;
    info!(
        "Moved {} into {} (removed from {} parent(s))",
        file_id,
        folder_id,
        previous.len()
    );
    Ok(entry)
}

pub fn delete(api: &dyn DriveApi, file_id: &str) -> Result<()> {
    api.delete(file_id)?;
    info!("Deleted {}", file_id);
    Ok(())
}

/// Plain-text table of search results.
pub fn render_table(entries: &[RemoteEntry]) -> String {
    if entries.is_empty() {
        return "No matching items\n".to_string();
    }

    let headers = ["id", "name", "mimeType", "parents"];
    let rows: Vec<[String; 4]> = entries
        .iter()
        .map(|e| {
            [
                e.id.clone(),
                e.name.clone(),
                e.mime_type.clone(),
                e.parent_id.clone().unwrap_or_default(),
            ]
        })
        .collect();

    let mut widths = headers.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_row = |cells: &[String]| {
        let line = cells
            .iter()
            .zip(widths.iter())
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ");
        format!("{}\n", line.trim_end())
    };

    let mut table = format_row(headers.map(String::from).as_slice());
    for row in &rows {
        table.push_str(&format_row(row.as_slice()));
    }
    table
}
