use crate::catalog::ImageCatalog;
use crate::error::Result;
use crate::event::EventSink;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

/// On-disk mapping declaration: `{"type": "ami", "ami": {"owner": …, "name": …}}`.
#[derive(Debug, Deserialize)]
struct MappingFile {
    #[serde(rename = "type")]
    kind: String,
    ami: Option<AmiSpec>,
}

#[derive(Debug, Deserialize)]
struct AmiSpec {
    owner: String,
    name: String,
}

/// Per-mapping or per-region result of the mapping pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingStatus {
    /// Declaration file present but the template has no such mapping table.
    NotRequired,
    /// Declaration type other than `ami`.
    Unsupported(String),
    /// Declaration file unreadable or malformed.
    DeclError(String),
    /// No image matched for this region; the prior entry is untouched.
    NotFound,
    /// Catalog lookup failed for this region; aborts only this lookup.
    ProviderError(String),
    /// Region entry already held the resolved image id.
    Unchanged,
    /// Region entry rewritten with the resolved image id.
    Changed,
}

/// Outcome record: one per declaration-level condition, or one per region
/// for resolved `ami` mappings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingOutcome {
    pub mapping: String,
    pub region: Option<String>,
    pub image_id: Option<String>,
    pub image_name: Option<String>,
    pub status: MappingStatus,
}

impl MappingOutcome {
    pub fn message(&self) -> &'static str {
        match self.status {
            MappingStatus::NotRequired => "Mapping not required",
            MappingStatus::Unsupported(_) => "Currently, only AMI mappings supported",
            MappingStatus::DeclError(_) => "Unable to read mapping declaration",
            MappingStatus::NotFound => "AMI not found",
            MappingStatus::ProviderError(_) => "AMI lookup failed",
            MappingStatus::Unchanged => "AMI unchanged",
            MappingStatus::Changed => "AMI updated",
        }
    }

    pub fn data(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("key".to_string(), json!(self.mapping));
        if let Some(region) = &self.region {
            map.insert("region".to_string(), json!(region));
        }
        if let Some(id) = &self.image_id {
            map.insert("amiId".to_string(), json!(id));
        }
        if let Some(name) = &self.image_name {
            map.insert("amiName".to_string(), json!(name));
        }
        match &self.status {
            MappingStatus::Unsupported(kind) => {
                map.insert("type".to_string(), json!(kind));
            }
            MappingStatus::DeclError(message) | MappingStatus::ProviderError(message) => {
                map.insert("error".to_string(), json!(message));
            }
            _ => {}
        }
        Value::Object(map)
    }

    pub fn is_changed(&self) -> bool {
        self.status == MappingStatus::Changed
    }
}

fn declaration_outcome(mapping: &str, status: MappingStatus) -> MappingOutcome {
    MappingOutcome {
        mapping: mapping.to_string(),
        region: None,
        image_id: None,
        image_name: None,
        status,
    }
}

/// Lists mapping declaration files directly under `mappings_dir`, sorted by
/// file name. Hidden entries and subdirectories are skipped; a missing
/// directory yields an empty listing.
fn list_declarations(mappings_dir: &Path) -> Result<Vec<(String, std::path::PathBuf)>> {
    if !mappings_dir.exists() {
        return Ok(Vec::new());
    }
    let mut declarations = Vec::new();
    for entry in fs::read_dir(mappings_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name)
            .to_string();
        declarations.push((stem, path));
    }
    declarations.sort();
    Ok(declarations)
}

/// Resolves one `ami` mapping across all regions, writing `{"ID": id}`
/// entries into `table` only when they differ from the current value.
fn resolve_ami(
    mapping: &str,
    spec: &AmiSpec,
    table: &mut serde_json::Map<String, Value>,
    regions: &[String],
    catalog: &dyn ImageCatalog,
    sink: &dyn EventSink,
) -> Vec<MappingOutcome> {
    let mut outcomes = Vec::with_capacity(regions.len());
    for region in regions {
        sink.emit(
            "Searching for AMI",
            &json!({
                "key": mapping,
                "region": region,
                "owner": spec.owner,
                "name": spec.name,
            }),
        );
        let mut outcome = MappingOutcome {
            mapping: mapping.to_string(),
            region: Some(region.clone()),
            image_id: None,
            image_name: None,
            status: MappingStatus::NotFound,
        };
        match catalog.find_images(region, &spec.owner, &spec.name) {
            Err(error) => {
                outcome.status = MappingStatus::ProviderError(error.to_string());
            }
            Ok(images) => {
                // Newest image by lexicographically greatest name.
                if let Some(image) = images.iter().max_by(|a, b| a.name.cmp(&b.name)) {
                    let entry = json!({ "ID": image.id });
                    outcome.image_id = Some(image.id.clone());
                    outcome.image_name = Some(image.name.clone());
                    outcome.status = if table.get(region.as_str()) == Some(&entry) {
                        MappingStatus::Unchanged
                    } else {
                        table.insert(region.clone(), entry);
                        MappingStatus::Changed
                    };
                }
            }
        }
        outcomes.push(outcome);
    }
    outcomes
}

/// Runs the mapping pass: for every declaration file under `mappings_dir`,
/// resolves the declared image per region and writes results into the
/// document's `Mappings` table. Failures are isolated per declaration and
/// per region; every declaration (and every region of a resolved one)
/// yields exactly one outcome.
///
/// # Errors
///
/// Returns an error only if the mappings directory itself cannot be read.
pub fn run(
    document: &mut Value,
    mappings_dir: &Path,
    regions: &[String],
    catalog: &dyn ImageCatalog,
    sink: &dyn EventSink,
) -> Result<Vec<MappingOutcome>> {
    let declarations = list_declarations(mappings_dir)?;
    let mut outcomes = Vec::new();

    for (mapping, path) in &declarations {
        let declaration: MappingFile = match fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
        {
            Ok(declaration) => declaration,
            Err(message) => {
                let outcome =
                    declaration_outcome(mapping, MappingStatus::DeclError(message));
                sink.emit(outcome.message(), &outcome.data());
                outcomes.push(outcome);
                continue;
            }
        };

        let table = document
            .get_mut("Mappings")
            .and_then(|mappings| mappings.get_mut(mapping.as_str()))
            .and_then(Value::as_object_mut);
        let Some(table) = table else {
            let outcome = declaration_outcome(mapping, MappingStatus::NotRequired);
            sink.emit(outcome.message(), &outcome.data());
            outcomes.push(outcome);
            continue;
        };

        if declaration.kind != "ami" {
            let outcome =
                declaration_outcome(mapping, MappingStatus::Unsupported(declaration.kind));
            sink.emit(outcome.message(), &outcome.data());
            outcomes.push(outcome);
            continue;
        }
        let Some(spec) = &declaration.ami else {
            let outcome = declaration_outcome(
                mapping,
                MappingStatus::DeclError("missing `ami` section".to_string()),
            );
            sink.emit(outcome.message(), &outcome.data());
            outcomes.push(outcome);
            continue;
        };

        for outcome in resolve_ami(mapping, spec, table, regions, catalog, sink) {
            sink.emit(outcome.message(), &outcome.data());
            outcomes.push(outcome);
        }
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ImageInfo;
    use crate::error::CfnppError;
    use crate::event::NullSink;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// In-memory catalog keyed by region.
    #[derive(Default)]
    struct FakeCatalog {
        images: HashMap<String, Vec<ImageInfo>>,
        failing_regions: Vec<String>,
    }

    impl FakeCatalog {
        fn with_image(mut self, region: &str, name: &str, id: &str) -> Self {
            self.images.entry(region.to_string()).or_default().push(ImageInfo {
                name: name.to_string(),
                id: id.to_string(),
                owner_alias: None,
                platform: None,
                architecture: None,
            });
            self
        }
    }

    impl ImageCatalog for FakeCatalog {
        fn list_regions(&self) -> Result<Vec<String>> {
            Ok(self.images.keys().cloned().collect())
        }

        fn find_images(
            &self,
            region: &str,
            _owner: &str,
            _name_pattern: &str,
        ) -> Result<Vec<ImageInfo>> {
            if self.failing_regions.iter().any(|r| r == region) {
                return Err(CfnppError::Provider {
                    message: "DescribeImages failed".to_string(),
                });
            }
            Ok(self.images.get(region).cloned().unwrap_or_default())
        }
    }

    fn regions(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    fn write_declaration(dir: &Path, name: &str, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    const AMI_DECL: &str = r#"{"type": "ami", "ami": {"owner": "amazon", "name": "amzn2-*"}}"#;

    #[test]
    fn test_run_resolves_each_region() {
        let temp_dir = TempDir::new().unwrap();
        let mappings_dir = temp_dir.path().join("mappings");
        write_declaration(&mappings_dir, "AmiByRegion.json", AMI_DECL);

        let catalog = FakeCatalog::default()
            .with_image("eu-west-1", "amzn2-2024.1", "ami-aaa")
            .with_image("us-east-1", "amzn2-2024.2", "ami-bbb");
        let mut document = json!({ "Mappings": { "AmiByRegion": {} } });

        let outcomes = run(
            &mut document,
            &mappings_dir,
            &regions(&["eu-west-1", "us-east-1"]),
            &catalog,
            &NullSink,
        )
        .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.status == MappingStatus::Changed));
        assert_eq!(
            document["Mappings"]["AmiByRegion"],
            json!({
                "eu-west-1": { "ID": "ami-aaa" },
                "us-east-1": { "ID": "ami-bbb" }
            })
        );
    }

    #[test]
    fn test_run_picks_greatest_image_name() {
        let temp_dir = TempDir::new().unwrap();
        let mappings_dir = temp_dir.path().join("mappings");
        write_declaration(&mappings_dir, "AmiByRegion.json", AMI_DECL);

        let catalog = FakeCatalog::default()
            .with_image("eu-west-1", "amzn2-2023.3", "ami-old")
            .with_image("eu-west-1", "amzn2-2024.2", "ami-new")
            .with_image("eu-west-1", "amzn2-2024.1", "ami-mid");
        let mut document = json!({ "Mappings": { "AmiByRegion": {} } });

        let outcomes = run(
            &mut document,
            &mappings_dir,
            &regions(&["eu-west-1"]),
            &catalog,
            &NullSink,
        )
        .unwrap();

        assert_eq!(outcomes[0].image_name.as_deref(), Some("amzn2-2024.2"));
        assert_eq!(
            document["Mappings"]["AmiByRegion"]["eu-west-1"],
            json!({ "ID": "ami-new" })
        );
    }

    #[test]
    fn test_run_no_match_leaves_prior_entry() {
        let temp_dir = TempDir::new().unwrap();
        let mappings_dir = temp_dir.path().join("mappings");
        write_declaration(&mappings_dir, "AmiByRegion.json", AMI_DECL);

        let catalog = FakeCatalog::default();
        let mut document = json!({
            "Mappings": { "AmiByRegion": { "eu-west-1": { "ID": "ami-prior" } } }
        });

        let outcomes = run(
            &mut document,
            &mappings_dir,
            &regions(&["eu-west-1", "us-east-1"]),
            &catalog,
            &NullSink,
        )
        .unwrap();

        assert!(outcomes.iter().all(|o| o.status == MappingStatus::NotFound));
        assert_eq!(
            document["Mappings"]["AmiByRegion"],
            json!({ "eu-west-1": { "ID": "ami-prior" } })
        );
    }

    #[test]
    fn test_run_unchanged_on_second_pass() {
        let temp_dir = TempDir::new().unwrap();
        let mappings_dir = temp_dir.path().join("mappings");
        write_declaration(&mappings_dir, "AmiByRegion.json", AMI_DECL);

        let catalog = FakeCatalog::default().with_image("eu-west-1", "amzn2-2024.1", "ami-aaa");
        let mut document = json!({ "Mappings": { "AmiByRegion": {} } });
        let region_list = regions(&["eu-west-1"]);

        let first = run(&mut document, &mappings_dir, &region_list, &catalog, &NullSink).unwrap();
        assert_eq!(first[0].status, MappingStatus::Changed);

        let second = run(&mut document, &mappings_dir, &region_list, &catalog, &NullSink).unwrap();
        assert_eq!(second[0].status, MappingStatus::Unchanged);
    }

    #[test]
    fn test_run_mapping_not_required() {
        let temp_dir = TempDir::new().unwrap();
        let mappings_dir = temp_dir.path().join("mappings");
        write_declaration(&mappings_dir, "Unused.json", AMI_DECL);

        let catalog = FakeCatalog::default();
        let mut document = json!({ "Mappings": {} });

        let outcomes = run(
            &mut document,
            &mappings_dir,
            &regions(&["eu-west-1"]),
            &catalog,
            &NullSink,
        )
        .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, MappingStatus::NotRequired);
    }

    #[test]
    fn test_run_unsupported_type_and_bad_declaration() {
        let temp_dir = TempDir::new().unwrap();
        let mappings_dir = temp_dir.path().join("mappings");
        write_declaration(&mappings_dir, "Certs.json", r#"{"type": "acm"}"#);
        write_declaration(&mappings_dir, "Broken.json", "{ not json");

        let catalog = FakeCatalog::default();
        let mut document = json!({ "Mappings": { "Certs": {}, "Broken": {} } });

        let outcomes = run(
            &mut document,
            &mappings_dir,
            &regions(&["eu-west-1"]),
            &catalog,
            &NullSink,
        )
        .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0].status, MappingStatus::DeclError(_)));
        assert!(matches!(
            outcomes[1].status,
            MappingStatus::Unsupported(ref kind) if kind == "acm"
        ));
    }

    #[test]
    fn test_run_provider_error_isolated_per_region() {
        let temp_dir = TempDir::new().unwrap();
        let mappings_dir = temp_dir.path().join("mappings");
        write_declaration(&mappings_dir, "AmiByRegion.json", AMI_DECL);

        let mut catalog =
            FakeCatalog::default().with_image("us-east-1", "amzn2-2024.1", "ami-bbb");
        catalog.failing_regions.push("eu-west-1".to_string());
        let mut document = json!({ "Mappings": { "AmiByRegion": {} } });

        let outcomes = run(
            &mut document,
            &mappings_dir,
            &regions(&["eu-west-1", "us-east-1"]),
            &catalog,
            &NullSink,
        )
        .unwrap();

        assert!(matches!(outcomes[0].status, MappingStatus::ProviderError(_)));
        assert_eq!(outcomes[1].status, MappingStatus::Changed);
        assert_eq!(
            document["Mappings"]["AmiByRegion"],
            json!({ "us-east-1": { "ID": "ami-bbb" } })
        );
    }

    #[test]
    fn test_run_missing_mappings_dir() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FakeCatalog::default();
        let mut document = json!({ "Mappings": {} });
        let outcomes = run(
            &mut document,
            &temp_dir.path().join("absent"),
            &regions(&["eu-west-1"]),
            &catalog,
            &NullSink,
        )
        .unwrap();
        assert!(outcomes.is_empty());
    }
}
