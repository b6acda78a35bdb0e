//! Listing export formatting.
//!
//! Renders a per-owner file listing as CSV or JSON for download.  Pure
//! formatting over already-fetched entries; no storage access here.

use crate::service::FileEntry;

/// CSV header row for exported listings.
const CSV_HEADER: &str = "id,name,mime_type,size_bytes,uploader_name,created_at,modified_at,blob_present";

/// Render entries as CSV with a header row.
pub fn to_csv(entries: &[FileEntry]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for entry in entries {
        let r = &entry.record;
        out.push_str(&[
            csv_escape(&r.id),
            csv_escape(&r.name),
            csv_escape(&r.mime_type),
            r.size_bytes.to_string(),
            csv_escape(&r.uploader_name),
            csv_escape(&r.created_at),
            csv_escape(&r.modified_at),
            entry.blob_present.to_string(),
        ]
        .join(","));
        out.push('\n');
    }
    out
}

/// Render entries as a JSON array.
pub fn to_json(entries: &[FileEntry]) -> serde_json::Value {
    serde_json::json!({ "files": entries })
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
