use crate::error::{CfnppError, Result};
use aws_sdk_ec2::error::DisplayErrorContext;

/// One machine image returned by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub name: String,
    pub id: String,
    pub owner_alias: Option<String>,
    pub platform: Option<String>,
    pub architecture: Option<String>,
}

/// Capability the mapping resolver needs from the cloud provider: region
/// enumeration and per-region image lookup. An empty lookup result means
/// "not found" and is not an error.
pub trait ImageCatalog {
    /// # Errors
    ///
    /// Returns `CfnppError::Provider` if the catalog cannot be reached.
    fn list_regions(&self) -> Result<Vec<String>>;

    /// # Errors
    ///
    /// Returns `CfnppError::Provider` if the lookup is rejected.
    fn find_images(&self, region: &str, owner: &str, name_pattern: &str)
        -> Result<Vec<ImageInfo>>;
}

/// EC2-backed catalog. The crate is synchronous, so SDK calls run on a
/// private current-thread runtime.
pub struct Ec2Catalog {
    runtime: tokio::runtime::Runtime,
    seed_region: String,
}

impl Ec2Catalog {
    /// Builds a catalog whose `list_regions` call is issued against
    /// `seed_region`.
    ///
    /// # Errors
    ///
    /// Returns `CfnppError::Io` if the runtime cannot be created.
    pub fn new(seed_region: impl Into<String>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            seed_region: seed_region.into(),
        })
    }

    fn client(&self, region: &str) -> aws_sdk_ec2::Client {
        let config = self.runtime.block_on(
            aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(aws_config::Region::new(region.to_string()))
                .load(),
        );
        aws_sdk_ec2::Client::new(&config)
    }
}

impl ImageCatalog for Ec2Catalog {
    fn list_regions(&self) -> Result<Vec<String>> {
        let client = self.client(&self.seed_region);
        let output = self
            .runtime
            .block_on(client.describe_regions().send())
            .map_err(|error| CfnppError::Provider {
                message: format!("{}", DisplayErrorContext(&error)),
            })?;
        Ok(output
            .regions()
            .iter()
            .filter_map(|region| region.region_name().map(str::to_string))
            .collect())
    }

    fn find_images(
        &self,
        region: &str,
        owner: &str,
        name_pattern: &str,
    ) -> Result<Vec<ImageInfo>> {
        let client = self.client(region);
        let filter = aws_sdk_ec2::types::Filter::builder()
            .name("name")
            .values(name_pattern)
            .build();
        let output = self
            .runtime
            .block_on(client.describe_images().owners(owner).filters(filter).send())
            .map_err(|error| CfnppError::Provider {
                message: format!("{}", DisplayErrorContext(&error)),
            })?;
        Ok(output
            .images()
            .iter()
            .filter_map(|image| match (image.name(), image.image_id()) {
                (Some(name), Some(id)) => Some(ImageInfo {
                    name: name.to_string(),
                    id: id.to_string(),
                    owner_alias: image.image_owner_alias().map(str::to_string),
                    platform: image.platform().map(|p| p.as_str().to_string()),
                    architecture: image.architecture().map(|a| a.as_str().to_string()),
                }),
                _ => None,
            })
            .collect())
    }
}
