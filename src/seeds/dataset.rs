//! Dataset extraction from parsed source documents.
//!
//! File reading and JSON parsing are external collaborators: the engine
//! receives an already-parsed document and a dot-separated `data_path`
//! pointing at a named array within it. The dataset is exactly that
//! array.

use crate::seeds::{SeedError, SeedResult};

/// One source record: field name to scalar value.
///
/// Backed by `serde_json::Map`, whose iteration order is deterministic,
/// so generated column lists and insertion order are reproducible across
/// runs.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Extract the dataset at `data_path` from a parsed document.
///
/// `data_path` is a dot-separated pointer (e.g. `"summary_levels"` or
/// `"payload.levels"`). The value at the path must be an array of
/// objects; each element becomes one [`Record`].
///
/// # Examples
///
/// ```
/// use seed_runner::seeds::dataset::extract_dataset;
/// use serde_json::json;
///
/// let document = json!({ "summary_levels": [ { "code": "010" } ] });
/// let records = extract_dataset(&document, "summary_levels").unwrap();
/// assert_eq!(records.len(), 1);
/// ```
pub fn extract_dataset(document: &serde_json::Value, data_path: &str) -> SeedResult<Vec<Record>> {
    let mut current = document;
    for segment in data_path.split('.').filter(|s| !s.is_empty()) {
        current = current.get(segment).ok_or_else(|| SeedError::DataPath {
            path: data_path.to_string(),
            detail: format!("segment '{}' not found", segment),
        })?;
    }

    let items = current.as_array().ok_or_else(|| SeedError::DataPath {
        path: data_path.to_string(),
        detail: "value is not an array".to_string(),
    })?;

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let record = item.as_object().ok_or_else(|| SeedError::DataPath {
            path: data_path.to_string(),
            detail: format!("element {} is not an object", index),
        })?;
        records.push(record.clone());
    }

    Ok(records)
}
