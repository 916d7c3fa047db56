use crate::error::{CfnppError, Result};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Reads a file as UTF-8 text, distinguishing a missing file from other
/// I/O failures.
///
/// # Errors
///
/// - `CfnppError::FileNotFound` if the path does not exist.
/// - `CfnppError::Io` for any other read failure.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|error| {
        if error.kind() == io::ErrorKind::NotFound {
            CfnppError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            CfnppError::Io(error)
        }
    })
}

/// Enumerates include files beneath `root` as relative path segments.
///
/// Directories yield only their contained files; hidden entries (name
/// starting with `.`) are skipped along with everything beneath them. The
/// listing is sorted by file name for deterministic processing order. A
/// missing root yields an empty listing.
///
/// # Errors
///
/// Returns `CfnppError::WalkDir` if traversal fails partway.
pub fn list_include_files(root: &Path) -> Result<Vec<Vec<String>>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || entry
                    .file_name()
                    .to_str()
                    .map_or(true, |name| !name.starts_with('.'))
        });

    let mut paths = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let segments: Vec<String> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect();
        if !segments.is_empty() {
            paths.push(segments);
        }
    }
    Ok(paths)
}

/// Loads a template document, requiring a JSON object at the top level.
/// Key order is preserved across load and save.
///
/// # Errors
///
/// - `CfnppError::FileNotFound` / `CfnppError::Io` from the read.
/// - `CfnppError::Document` if the content is not a JSON object.
pub fn load_document(path: &Path) -> Result<Value> {
    let text = read_text(path)?;
    let document: Value =
        serde_json::from_str(&text).map_err(|error| CfnppError::Document {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
    if !document.is_object() {
        return Err(CfnppError::Document {
            path: path.to_path_buf(),
            message: "expected an object at the top level".to_string(),
        });
    }
    Ok(document)
}

/// Serializes a document the way it is persisted (2-space pretty by
/// default, single-line when `compact`), with a trailing newline.
///
/// # Errors
///
/// Returns `CfnppError::Json` if serialization fails.
pub fn serialize_document(document: &Value, compact: bool) -> Result<String> {
    let mut text = if compact {
        serde_json::to_string(document)?
    } else {
        serde_json::to_string_pretty(document)?
    };
    text.push('\n');
    Ok(text)
}

/// Writes a document to `path` in the persisted serialization.
///
/// # Errors
///
/// Returns `CfnppError::Json` or `CfnppError::Io` on failure.
pub fn save_document(path: &Path, document: &Value, compact: bool) -> Result<()> {
    let text = serialize_document(document, compact)?;
    fs::write(path, text)?;
    Ok(())
}
