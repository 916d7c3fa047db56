use crate::error::{CfnppError, Result};
use regex::Regex;

/// Include kind selected by the second path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    File,
    Command,
    Userdata,
}

impl IncludeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IncludeKind::File => "file",
            IncludeKind::Command => "command",
            IncludeKind::Userdata => "userdata",
        }
    }
}

/// Wrapper applied to userdata content before parsing, selected by the
/// marker suffix (`.ps1` / `.cmd`; `.sh` and bare `userdata` get none).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserdataWrapper {
    None,
    Powershell,
    Script,
}

impl UserdataWrapper {
    /// Tag name used in `<tag>\n…\n</tag>` wrapping, if any.
    pub fn tag(self) -> Option<&'static str> {
        match self {
            UserdataWrapper::None => None,
            UserdataWrapper::Powershell => Some("powershell"),
            UserdataWrapper::Script => Some("script"),
        }
    }
}

/// Semantic description of one include file, derived from its path beneath
/// the `resources/` includes root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDescriptor {
    pub resource: String,
    /// Present only for config-type includes.
    pub config: Option<String>,
    pub kind: IncludeKind,
    /// Normalized slash-joined key path; empty for userdata includes.
    pub key: String,
    pub wrapper: UserdataWrapper,
}

/// Outcome of classifying one relative include path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Include(IncludeDescriptor),
    /// Excluded from processing without being an error (hidden entries,
    /// directory-only paths, too-short paths).
    Ignored,
}

/// Rewrites raw file key parts for cross-platform file names: a first part
/// like `C$` becomes `C:`, and a leading `$` is stripped from parts matching
/// the `$.$…` escape convention.
fn normalize_file_key(parts: &[&str]) -> Result<String> {
    let drive = Regex::new(r"^([A-Za-z])\$$")?;
    let dollar_escape = Regex::new(r"^\$(\.\$.*)$")?;

    let mut normalized = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        let mut working = (*part).to_string();
        if i == 0 {
            if let Some(caps) = drive.captures(&working) {
                working = format!("{}:", &caps[1]);
            }
        }
        if let Some(caps) = dollar_escape.captures(&working) {
            working = caps[1].to_string();
        }
        normalized.push(working);
    }
    Ok(normalized.join("/"))
}

/// Classifies a relative include path (split into segments) into an include
/// descriptor, or reports it ignored.
///
/// Layout convention beneath the includes root:
/// `<resource>/configs/<config>/files/<key…>`,
/// `<resource>/configs/<config>/commands/<key…>`, or
/// `<resource>/userdata[.ps1|.cmd|.sh]`.
///
/// # Errors
///
/// - `CfnppError::UnrecognizedIncludeRoot` if segment 1 is neither `configs`
///   nor a userdata marker.
/// - `CfnppError::UnrecognizedConfigSection` if a config include's section
///   segment is neither `files` nor `commands`.
pub fn classify(segments: &[&str]) -> Result<Classification> {
    if segments.len() <= 1 || segments.iter().any(|s| *s == ".") {
        return Ok(Classification::Ignored);
    }

    let resource = segments[0].to_string();
    let root = segments[1];

    if root == "configs" {
        // resource / configs / <config> / files|commands / key…
        if segments.len() <= 4 {
            return Ok(Classification::Ignored);
        }
        let config = segments[2].to_string();
        let section = segments[3];
        let key_parts = &segments[4..];
        let (kind, key) = match section {
            "files" => (IncludeKind::File, normalize_file_key(key_parts)?),
            "commands" => (IncludeKind::Command, key_parts.join("/")),
            other => {
                return Err(CfnppError::UnrecognizedConfigSection {
                    segment: other.to_string(),
                })
            }
        };
        return Ok(Classification::Include(IncludeDescriptor {
            resource,
            config: Some(config),
            kind,
            key,
            wrapper: UserdataWrapper::None,
        }));
    }

    let userdata = Regex::new(r"^userdata(\.ps1|\.cmd|\.sh)?$")?;
    if let Some(caps) = userdata.captures(root) {
        // Userdata is a single file directly under the resource directory.
        if segments.len() > 2 {
            return Ok(Classification::Ignored);
        }
        let wrapper = match caps.get(1).map(|m| m.as_str()) {
            Some(".ps1") => UserdataWrapper::Powershell,
            Some(".cmd") => UserdataWrapper::Script,
            _ => UserdataWrapper::None,
        };
        return Ok(Classification::Include(IncludeDescriptor {
            resource,
            config: None,
            kind: IncludeKind::Userdata,
            key: String::new(),
            wrapper,
        }));
    }

    Err(CfnppError::UnrecognizedIncludeRoot {
        segment: root.to_string(),
    })
}
