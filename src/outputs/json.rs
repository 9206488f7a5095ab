//! JSON output for the panel.
//!
//! The payload is written to a sibling temporary file and renamed over the
//! target, so a reader polling `news.json` never sees a partial document.
//! A run that produced nothing still writes a file holding a single
//! placeholder record, keeping the panel's rotation alive.

use crate::models::{NewsPayload, OutputRecord, Scope};
use chrono::{DateTime, Utc};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Id of the synthetic record emitted when no news survived.
pub const PLACEHOLDER_ID: &str = "placeholder";

/// The single record shown when a run produced no items.
pub fn placeholder_record(title: &str, now: DateTime<Utc>) -> OutputRecord {
    OutputRecord {
        id: PLACEHOLDER_ID.to_string(),
        title: title.to_string(),
        summary: String::new(),
        source: "PontoView".to_string(),
        published_at: Some(now),
        url: String::new(),
        image_url: None,
        scope: Scope::Local,
        city: None,
    }
}

/// Replace an empty item list with the placeholder record.
pub fn with_placeholder(
    items: Vec<OutputRecord>,
    placeholder_title: &str,
    now: DateTime<Utc>,
) -> Vec<OutputRecord> {
    if items.is_empty() {
        vec![placeholder_record(placeholder_title, now)]
    } else {
        items
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "news.json".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Write `payload` to `path` as pretty-printed JSON, creating parent directories.
///
/// # Arguments
///
/// * `payload` - The finished run: items, generation time and stats
/// * `path` - Destination file, typically `data/news.json`
///
/// # Returns
///
/// `Ok(())` once the file is in place, or an error if directory creation,
/// serialization, the temp write or the rename fails.
///
/// # Output Path
///
/// The JSON is first written to `.{name}.tmp` beside `path` and then renamed
/// over it, so readers never see a half-written file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_payload(payload: &NewsPayload, path: &Path) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(payload)?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create output dir");
            return Err(e.into());
        }
    }

    let tmp = temp_path(path);
    fs::write(&tmp, json).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    info!(items = payload.items.len(), "Wrote news payload");
    Ok(())
}
