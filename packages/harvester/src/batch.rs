//! Batch planning: reading descriptor files and grouping them by month.
//!
//! A batch is the unit that owns one append log and one snapshot. By default
//! the whole input file is one batch named after the file; with month
//! splitting each `YYYY-MM` of the descriptors' date hints is its own batch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{HarvestError, Result, StoreError};
use crate::types::listing::ListingDescriptor;

/// Batch key for descriptors without a usable date.
pub const UNDATED_BATCH: &str = "undated";

const DEFAULT_BATCH: &str = "batch";

/// Read a JSON array of descriptors.
pub async fn load_descriptors(path: &Path) -> Result<Vec<ListingDescriptor>> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|e| HarvestError::Input {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let descriptors: Vec<ListingDescriptor> =
        serde_json::from_str(&raw).map_err(|e| HarvestError::Input {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    debug!(path = %path.display(), count = descriptors.len(), "Loaded descriptors");
    Ok(descriptors)
}

/// Batch key for a whole input file: its stem.
pub fn batch_key_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_BATCH)
        .to_string()
}

/// `YYYY-MM` of a date hint, if it starts with a real year and month.
pub fn month_key(date: &str) -> Option<String> {
    let prefix = date.trim().get(..7)?;
    NaiveDate::parse_from_str(&format!("{prefix}-01"), "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m").to_string())
}

/// Group descriptors by month of their date hint, keeping input order
/// within each month. Undated descriptors go to [`UNDATED_BATCH`].
pub fn split_by_month(
    descriptors: Vec<ListingDescriptor>,
) -> BTreeMap<String, Vec<ListingDescriptor>> {
    let mut batches: BTreeMap<String, Vec<ListingDescriptor>> = BTreeMap::new();
    for descriptor in descriptors {
        let key = descriptor
            .date
            .as_deref()
            .and_then(month_key)
            .unwrap_or_else(|| UNDATED_BATCH.to_string());
        batches.entry(key).or_default().push(descriptor);
    }
    batches
}

/// Write each month's descriptors to `links_<key>.json` in `output_dir`.
pub async fn write_month_files(
    output_dir: &Path,
    batches: &BTreeMap<String, Vec<ListingDescriptor>>,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .await
        .map_err(|e| StoreError::io(output_dir, e))?;

    let mut written = Vec::with_capacity(batches.len());
    for (key, descriptors) in batches {
        let path = output_dir.join(format!("links_{key}.json"));
        let bytes = serde_json::to_vec_pretty(descriptors).map_err(StoreError::from)?;
        fs::write(&path, bytes)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        info!(path = %path.display(), count = descriptors.len(), "Wrote month file");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dated(link: &str, date: &str) -> ListingDescriptor {
        ListingDescriptor::new(link).with_date(date)
    }

    #[test]
    fn test_month_key() {
        assert_eq!(month_key("2024-03-02"), Some("2024-03".to_string()));
        assert_eq!(month_key("2024-03"), Some("2024-03".to_string()));
        assert_eq!(month_key(" 2023-11-30T10:00:00 "), Some("2023-11".to_string()));
        assert_eq!(month_key("2024-13-01"), None);
        assert_eq!(month_key("yesterday"), None);
        assert_eq!(month_key(""), None);
        assert_eq!(month_key("2024-3-1"), None);
    }

    #[test]
    fn test_split_by_month() {
        let batches = split_by_month(vec![
            dated("https://x/1", "2024-03-02"),
            dated("https://x/2", "2024-02-28"),
            ListingDescriptor::new("https://x/3"),
            dated("https://x/4", "2024-03-31"),
            dated("https://x/5", "soon"),
        ]);

        let keys: Vec<&str> = batches.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["2024-02", "2024-03", "undated"]);

        let march: Vec<&str> = batches["2024-03"].iter().map(|d| d.link.as_str()).collect();
        assert_eq!(march, vec!["https://x/1", "https://x/4"]);
        assert_eq!(batches[UNDATED_BATCH].len(), 2);
    }

    #[test]
    fn test_batch_key_from_path() {
        assert_eq!(batch_key_from_path(Path::new("/in/links_2024.json")), "links_2024");
        assert_eq!(batch_key_from_path(Path::new("offers")), "offers");
        assert_eq!(batch_key_from_path(Path::new("/")), "batch");
    }

    #[tokio::test]
    async fn test_load_descriptors_accepts_null_hints() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        fs::write(
            &path,
            r#"[{"link": "https://x/1", "title": null, "date": "2024-03-02"},
                {"link": "https://x/2"}]"#,
        )
        .await
        .unwrap();

        let descriptors = load_descriptors(&path).await.unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].title, None);
        assert_eq!(descriptors[0].date.as_deref(), Some("2024-03-02"));
    }

    #[tokio::test]
    async fn test_load_descriptors_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        fs::write(&path, r#"{"link": "https://x/1"}"#).await.unwrap();

        assert!(matches!(
            load_descriptors(&path).await,
            Err(HarvestError::Input { .. })
        ));
        assert!(matches!(
            load_descriptors(&dir.path().join("missing.json")).await,
            Err(HarvestError::Input { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_month_files() {
        let dir = TempDir::new().unwrap();
        let batches = split_by_month(vec![
            dated("https://x/1", "2024-03-02"),
            ListingDescriptor::new("https://x/2"),
        ]);

        let written = write_month_files(dir.path(), &batches).await.unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("links_2024-03.json").exists());

        let reread = load_descriptors(&dir.path().join("links_undated.json"))
            .await
            .unwrap();
        assert_eq!(reread, vec![ListingDescriptor::new("https://x/2")]);
    }
}
