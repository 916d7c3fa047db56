use crate::catalog::ImageCatalog;
use crate::error::Result;
use crate::event::EventSink;
use crate::fs_utils;
use crate::include::{self, IncludeOutcome};
use crate::mapping::{self, MappingOutcome};
use globset::{GlobBuilder, GlobSetBuilder};
use serde_json::json;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Default template path pattern when none is given.
pub const DEFAULT_PATTERN: &str = "*.cloudformation";

/// Driver knobs taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Write single-line JSON instead of 2-space pretty.
    pub compact: bool,
    /// Write the processed document to `<path>.<ext>` instead of
    /// overwriting the template.
    pub output_extension: Option<String>,
}

/// Aggregated result of processing one template.
#[derive(Debug)]
pub struct TemplateReport {
    pub path: PathBuf,
    pub includes: Vec<IncludeOutcome>,
    pub mappings: Vec<MappingOutcome>,
    /// True when the document differed from its loaded form and was written.
    pub saved: bool,
    /// Document-level failure that aborted this template.
    pub error: Option<String>,
}

impl TemplateReport {
    pub fn changed_count(&self) -> usize {
        self.includes.iter().filter(|o| o.is_changed()).count()
            + self.mappings.iter().filter(|o| o.is_changed()).count()
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Sibling support directory for a template: `<path>.d`.
fn support_dir(template_path: &Path) -> PathBuf {
    let mut os = template_path.as_os_str().to_os_string();
    os.push(".d");
    PathBuf::from(os)
}

/// Output path for the processed document.
fn output_path(template_path: &Path, options: &ProcessOptions) -> PathBuf {
    match &options.output_extension {
        Some(ext) => {
            let mut os = template_path.as_os_str().to_os_string();
            os.push(".");
            os.push(ext);
            PathBuf::from(os)
        }
        None => template_path.to_path_buf(),
    }
}

/// Processes one template: loads the document, runs the inclusion phase,
/// then the mapping phase, and persists the document exactly once — only if
/// its serialized form differs from the form captured at load time.
///
/// The two phases are sequential join points; each mutates the single
/// document at disjoint paths, so writes never interleave.
///
/// # Errors
///
/// Returns `CfnppError::Document` (or an I/O error) if the template cannot
/// be loaded or saved; such failures abort only this template.
pub fn process_template(
    template_path: &Path,
    regions: &[String],
    catalog: &dyn ImageCatalog,
    sink: &dyn EventSink,
    options: &ProcessOptions,
) -> Result<TemplateReport> {
    sink.emit(
        "Processing template",
        &json!({ "path": template_path.display().to_string() }),
    );

    let mut document = fs_utils::load_document(template_path)?;
    let loaded = fs_utils::serialize_document(&document, options.compact)?;

    let support = support_dir(template_path);
    let includes = include::run(&mut document, &support.join("resources"), sink)?;
    let mappings = mapping::run(
        &mut document,
        &support.join("mappings"),
        regions,
        catalog,
        sink,
    )?;

    let serialized = fs_utils::serialize_document(&document, options.compact)?;
    let saved = if serialized == loaded {
        sink.emit(
            "Template unchanged",
            &json!({ "path": template_path.display().to_string() }),
        );
        false
    } else {
        let destination = output_path(template_path, options);
        fs_utils::save_document(&destination, &document, options.compact)?;
        sink.emit(
            "Template processed",
            &json!({ "path": destination.display().to_string() }),
        );
        true
    };

    Ok(TemplateReport {
        path: template_path.to_path_buf(),
        includes,
        mappings,
        saved,
        error: None,
    })
}

/// Expands template path patterns against `base_dir`, returning matching
/// files sorted by path. An empty pattern list means [`DEFAULT_PATTERN`].
///
/// # Errors
///
/// Returns `CfnppError::Glob` for an invalid pattern or `CfnppError::WalkDir`
/// if the walk fails.
pub fn expand_patterns(patterns: &[String], base_dir: &Path) -> Result<Vec<PathBuf>> {
    let default = [DEFAULT_PATTERN.to_string()];
    let patterns: &[String] = if patterns.is_empty() {
        &default
    } else {
        patterns
    };

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        // `*` stays within one path component, like shell globbing.
        let normalized = pattern.strip_prefix("./").unwrap_or(pattern);
        builder.add(
            GlobBuilder::new(normalized)
                .literal_separator(true)
                .build()?,
        );
    }
    let set = builder.build()?;

    let walker = WalkDir::new(base_dir)
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
        let relative = entry.path().strip_prefix(base_dir).unwrap_or(entry.path());
        if set.is_match(relative) {
            paths.push(entry.path().to_path_buf());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Processes every template matching `patterns`. Templates are independent:
/// one template's failure is recorded in its report and the batch continues.
///
/// # Errors
///
/// Returns an error only if pattern expansion itself fails.
pub fn process_patterns(
    patterns: &[String],
    base_dir: &Path,
    regions: &[String],
    catalog: &dyn ImageCatalog,
    sink: &dyn EventSink,
    options: &ProcessOptions,
) -> Result<Vec<TemplateReport>> {
    let paths = expand_patterns(patterns, base_dir)?;
    sink.emit("Templates found", &json!({ "count": paths.len() }));

    let mut reports = Vec::with_capacity(paths.len());
    for path in paths {
        match process_template(&path, regions, catalog, sink, options) {
            Ok(report) => reports.push(report),
            Err(error) => {
                sink.emit(
                    "Unable to process template",
                    &json!({
                        "path": path.display().to_string(),
                        "error": error.to_string(),
                    }),
                );
                reports.push(TemplateReport {
                    path,
                    includes: Vec::new(),
                    mappings: Vec::new(),
                    saved: false,
                    error: Some(error.to_string()),
                });
            }
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ImageInfo;
    use crate::event::NullSink;
    use crate::include::IncludeStatus;
    use crate::mapping::MappingStatus;
    use std::fs;
    use tempfile::TempDir;

    struct FixedCatalog {
        image: Option<ImageInfo>,
    }

    impl ImageCatalog for FixedCatalog {
        fn list_regions(&self) -> Result<Vec<String>> {
            Ok(vec!["eu-west-1".to_string()])
        }

        fn find_images(&self, _: &str, _: &str, _: &str) -> Result<Vec<ImageInfo>> {
            Ok(self.image.clone().into_iter().collect())
        }
    }

    fn empty_catalog() -> FixedCatalog {
        FixedCatalog { image: None }
    }

    fn ami_catalog() -> FixedCatalog {
        FixedCatalog {
            image: Some(ImageInfo {
                name: "amzn2-2024.1".to_string(),
                id: "ami-aaa".to_string(),
                owner_alias: None,
                platform: None,
                architecture: None,
            }),
        }
    }

    const TEMPLATE: &str = r#"{
  "Resources": {
    "WebServer": {
      "Metadata": {
        "AWS::CloudFormation::Init": {
          "init": { "files": { "index.html": {} } }
        }
      },
      "Properties": {}
    }
  },
  "Mappings": { "AmiByRegion": {} }
}"#;

    fn write_fixture(dir: &Path) -> PathBuf {
        let template = dir.join("stack.cloudformation");
        fs::write(&template, TEMPLATE).unwrap();
        let files = dir.join("stack.cloudformation.d/resources/WebServer/configs/init/files");
        fs::create_dir_all(&files).unwrap();
        fs::write(files.join("index.html"), "hello {{ref WebServer}}").unwrap();
        let mappings = dir.join("stack.cloudformation.d/mappings");
        fs::create_dir_all(&mappings).unwrap();
        fs::write(
            mappings.join("AmiByRegion.json"),
            r#"{"type": "ami", "ami": {"owner": "amazon", "name": "amzn2-*"}}"#,
        )
        .unwrap();
        template
    }

    #[test]
    fn test_process_template_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let template = write_fixture(temp_dir.path());
        let regions = vec!["eu-west-1".to_string()];

        let report = process_template(
            &template,
            &regions,
            &ami_catalog(),
            &NullSink,
            &ProcessOptions::default(),
        )
        .unwrap();
        assert!(report.saved);
        assert_eq!(report.changed_count(), 2);
        assert_eq!(report.includes[0].status, IncludeStatus::Changed);
        assert_eq!(report.mappings[0].status, MappingStatus::Changed);

        let document = fs_utils::load_document(&template).unwrap();
        assert_eq!(
            document["Mappings"]["AmiByRegion"]["eu-west-1"]["ID"],
            "ami-aaa"
        );
        assert_eq!(
            document["Resources"]["WebServer"]["Metadata"]["AWS::CloudFormation::Init"]
                ["init"]["files"]["index.html"]["content"],
            serde_json::json!({ "Fn::Join": ["", ["hello ", { "Ref": "WebServer" }]] })
        );
    }

    #[test]
    fn test_process_template_persists_only_on_change() {
        let temp_dir = TempDir::new().unwrap();
        let template = write_fixture(temp_dir.path());
        let regions = vec!["eu-west-1".to_string()];
        let options = ProcessOptions::default();

        let first =
            process_template(&template, &regions, &ami_catalog(), &NullSink, &options).unwrap();
        assert!(first.saved);
        let written = fs::metadata(&template).unwrap().modified().unwrap();

        let second =
            process_template(&template, &regions, &ami_catalog(), &NullSink, &options).unwrap();
        assert!(!second.saved);
        assert!(second
            .includes
            .iter()
            .all(|o| o.status == IncludeStatus::Unchanged));
        assert_eq!(fs::metadata(&template).unwrap().modified().unwrap(), written);
    }

    #[test]
    fn test_process_template_output_extension() {
        let temp_dir = TempDir::new().unwrap();
        let template = write_fixture(temp_dir.path());
        let regions = vec!["eu-west-1".to_string()];
        let options = ProcessOptions {
            compact: true,
            output_extension: Some("processed".to_string()),
        };

        let report =
            process_template(&template, &regions, &ami_catalog(), &NullSink, &options).unwrap();
        assert!(report.saved);

        // Original stays untouched; processed copy lands next to it.
        assert_eq!(fs::read_to_string(&template).unwrap(), TEMPLATE);
        let processed = temp_dir.path().join("stack.cloudformation.processed");
        let text = fs::read_to_string(processed).unwrap();
        assert!(text.starts_with("{\"Resources\""));
        assert!(text.ends_with("\n"));
    }

    #[test]
    fn test_process_template_without_support_dir() {
        let temp_dir = TempDir::new().unwrap();
        let template = temp_dir.path().join("bare.cloudformation");
        fs::write(&template, "{\"Resources\": {}}").unwrap();

        let report = process_template(
            &template,
            &["eu-west-1".to_string()],
            &empty_catalog(),
            &NullSink,
            &ProcessOptions::default(),
        )
        .unwrap();
        assert!(!report.saved);
        assert!(report.includes.is_empty());
        assert!(report.mappings.is_empty());
    }

    #[test]
    fn test_expand_patterns_default_and_explicit() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.cloudformation"), "{}").unwrap();
        fs::write(temp_dir.path().join("b.cloudformation"), "{}").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "").unwrap();

        let paths = expand_patterns(&[], temp_dir.path()).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("a.cloudformation"));

        let paths =
            expand_patterns(&["./b.*".to_string()], temp_dir.path()).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("b.cloudformation"));
    }

    #[test]
    fn test_process_patterns_isolates_document_errors() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("bad.cloudformation"), "{ nope").unwrap();
        fs::write(temp_dir.path().join("good.cloudformation"), "{\"Resources\": {}}").unwrap();

        let reports = process_patterns(
            &[],
            temp_dir.path(),
            &["eu-west-1".to_string()],
            &empty_catalog(),
            &NullSink,
            &ProcessOptions::default(),
        )
        .unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports[0].is_failed());
        assert!(!reports[1].is_failed());
    }
}
