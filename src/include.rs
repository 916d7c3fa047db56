use crate::classify::{classify, Classification, IncludeDescriptor, IncludeKind};
use crate::error::{CfnppError, Result};
use crate::event::EventSink;
use crate::expr::{self, Expr};
use crate::fs_utils;
use crate::locate::{locate, Missing};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// Per-file result of one inclusion pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeStatus {
    /// Excluded by convention (hidden, too short, non-include path).
    Ignored,
    /// Malformed include path or unparseable content; isolated to this file.
    Error(String),
    /// Include file could not be read; `missing` distinguishes a vanished
    /// file from other I/O failure.
    ReadError { missing: bool, message: String },
    /// The document has no location for this include.
    TargetNotFound(Missing),
    /// Target already holds the resolved value; document untouched.
    Unchanged,
    /// Target overwritten with the resolved value.
    Changed,
}

/// Outcome record for one enumerated include file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeOutcome {
    /// Slash-joined path relative to the includes root.
    pub path: String,
    pub resource: Option<String>,
    pub config: Option<String>,
    pub kind: Option<IncludeKind>,
    /// Normalized key; present for file/command includes.
    pub key: Option<String>,
    /// Count of structured (non-literal) placeholder parts found.
    pub placeholder_count: usize,
    pub status: IncludeStatus,
}

impl IncludeOutcome {
    /// Event line for this outcome, in the style of the tool's diagnostics.
    pub fn message(&self) -> &'static str {
        match self.status {
            IncludeStatus::Ignored => "Include ignored",
            IncludeStatus::Error(_) => "Include error",
            IncludeStatus::ReadError { missing: true, .. } => "Include file not found",
            IncludeStatus::ReadError { missing: false, .. } => "Unable to read include file",
            IncludeStatus::TargetNotFound(_) => "Template object not found",
            IncludeStatus::Unchanged => "Include unchanged",
            IncludeStatus::Changed => "Include updated",
        }
    }

    /// Structured payload for the event sink.
    pub fn data(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("relativePath".to_string(), json!(self.path));
        map.insert("variableCount".to_string(), json!(self.placeholder_count));
        if let Some(resource) = &self.resource {
            map.insert("resource".to_string(), json!(resource));
        }
        if let Some(config) = &self.config {
            map.insert("config".to_string(), json!(config));
        }
        if let Some(kind) = self.kind {
            map.insert("type".to_string(), json!(kind.as_str()));
        }
        if let Some(key) = &self.key {
            map.insert("key".to_string(), json!(key));
        }
        match &self.status {
            IncludeStatus::Error(message) | IncludeStatus::ReadError { message, .. } => {
                map.insert("error".to_string(), json!(message));
            }
            IncludeStatus::TargetNotFound(missing) => {
                map.insert("missing".to_string(), json!(missing.as_str()));
            }
            _ => {}
        }
        Value::Object(map)
    }

    pub fn is_changed(&self) -> bool {
        self.status == IncludeStatus::Changed
    }
}

fn outcome(
    path: String,
    descriptor: Option<&IncludeDescriptor>,
    placeholder_count: usize,
    status: IncludeStatus,
) -> IncludeOutcome {
    IncludeOutcome {
        path,
        resource: descriptor.map(|d| d.resource.clone()),
        config: descriptor.and_then(|d| d.config.clone()),
        kind: descriptor.map(|d| d.kind),
        key: descriptor.and_then(|d| match d.kind {
            IncludeKind::Userdata => None,
            IncludeKind::File | IncludeKind::Command => Some(d.key.clone()),
        }),
        placeholder_count,
        status,
    }
}

/// Processes one enumerated include file against the document.
fn process_one(
    document: &mut Value,
    includes_root: &Path,
    segments: &[String],
    sink: &dyn EventSink,
) -> IncludeOutcome {
    let relative = segments.join("/");

    let refs: Vec<&str> = segments.iter().map(String::as_str).collect();
    let descriptor = match classify(&refs) {
        Ok(Classification::Include(descriptor)) => descriptor,
        Ok(Classification::Ignored) => {
            return outcome(relative, None, 0, IncludeStatus::Ignored);
        }
        Err(error) => {
            return IncludeOutcome {
                path: relative,
                resource: segments.first().cloned(),
                config: None,
                kind: None,
                key: None,
                placeholder_count: 0,
                status: IncludeStatus::Error(error.to_string()),
            };
        }
    };

    let full_path: PathBuf = includes_root.join(segments.iter().collect::<PathBuf>());
    let content = match fs_utils::read_text(&full_path) {
        Ok(content) => content,
        Err(CfnppError::FileNotFound { .. }) => {
            return outcome(
                relative,
                Some(&descriptor),
                0,
                IncludeStatus::ReadError {
                    missing: true,
                    message: format!("{} not found", full_path.display()),
                },
            );
        }
        Err(error) => {
            return outcome(
                relative,
                Some(&descriptor),
                0,
                IncludeStatus::ReadError {
                    missing: false,
                    message: error.to_string(),
                },
            );
        }
    };

    let content = match descriptor.wrapper.tag() {
        Some(tag) if !content.is_empty() => format!("<{tag}>\n{content}\n</{tag}>"),
        _ => content,
    };

    let parsed = match expr::parse(&content, sink) {
        Ok(parsed) => parsed,
        Err(error) => {
            return outcome(
                relative,
                Some(&descriptor),
                0,
                IncludeStatus::Error(error.to_string()),
            );
        }
    };
    let placeholder_count = parsed.placeholder_count();

    let resolved = match descriptor.kind {
        IncludeKind::Userdata => Expr::Base64(Box::new(parsed)),
        IncludeKind::File | IncludeKind::Command => parsed,
    };
    let new_value = resolved.to_value();

    let target = match locate(document, &descriptor) {
        Ok(target) => target,
        Err(missing) => {
            return outcome(
                relative,
                Some(&descriptor),
                placeholder_count,
                IncludeStatus::TargetNotFound(missing),
            );
        }
    };

    let status = if target.container.get(target.property) == Some(&new_value) {
        IncludeStatus::Unchanged
    } else {
        target
            .container
            .insert(target.property.to_string(), new_value);
        IncludeStatus::Changed
    };
    outcome(relative, Some(&descriptor), placeholder_count, status)
}

/// Runs the inclusion pass: enumerates every file beneath `includes_root`,
/// classifies it, resolves its content and splices the result into
/// `document`. Failures are isolated per file; the run never aborts early,
/// and every enumerated file yields exactly one outcome.
///
/// # Errors
///
/// Returns an error only if the includes root itself cannot be enumerated.
pub fn run(
    document: &mut Value,
    includes_root: &Path,
    sink: &dyn EventSink,
) -> Result<Vec<IncludeOutcome>> {
    let files = fs_utils::list_include_files(includes_root)?;
    sink.emit("Includes found", &json!({ "count": files.len() }));

    let mut outcomes = Vec::with_capacity(files.len());
    for segments in &files {
        let outcome = process_one(document, includes_root, segments, sink);
        sink.emit(outcome.message(), &outcome.data());
        outcomes.push(outcome);
    }
    Ok(outcomes)
}
