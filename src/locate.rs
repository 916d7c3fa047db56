use crate::classify::{IncludeDescriptor, IncludeKind};
use serde_json::{Map, Value};

/// Metadata key under which cfn-init configuration lives.
pub const INIT_METADATA_KEY: &str = "AWS::CloudFormation::Init";

/// First document level found absent while locating an include target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Resource,
    Metadata,
    Config,
    Key,
    Properties,
}

impl Missing {
    pub fn as_str(self) -> &'static str {
        match self {
            Missing::Resource => "resource",
            Missing::Metadata => "metadata",
            Missing::Config => "config",
            Missing::Key => "key",
            Missing::Properties => "properties",
        }
    }
}

/// Exact location an include writes to: a container object and the property
/// name within it.
#[derive(Debug)]
pub struct Target<'a> {
    pub container: &'a mut Map<String, Value>,
    pub property: &'static str,
}

fn locate_config<'a>(
    resource: &'a mut Value,
    descriptor: &IncludeDescriptor,
    section: &str,
    property: &'static str,
) -> std::result::Result<Target<'a>, Missing> {
    let init = resource
        .get_mut("Metadata")
        .and_then(|metadata| metadata.get_mut(INIT_METADATA_KEY))
        .ok_or(Missing::Metadata)?;
    let config = descriptor.config.as_deref().ok_or(Missing::Config)?;
    let config_block = init.get_mut(config).ok_or(Missing::Config)?;
    let entry = config_block
        .get_mut(section)
        .and_then(|entries| entries.get_mut(descriptor.key.as_str()))
        .and_then(Value::as_object_mut)
        .ok_or(Missing::Key)?;
    Ok(Target {
        container: entry,
        property,
    })
}

/// Finds the nested document location an include descriptor addresses.
///
/// File and command includes target
/// `Resources[r].Metadata["AWS::CloudFormation::Init"][config][files|commands][key]`
/// (`content` / `command` property); userdata includes target
/// `Resources[r].Properties` (`UserData` property). The first absent level is
/// reported as a [`Missing`] value for diagnostics.
pub fn locate<'a>(
    document: &'a mut Value,
    descriptor: &IncludeDescriptor,
) -> std::result::Result<Target<'a>, Missing> {
    let resource = document
        .get_mut("Resources")
        .and_then(|resources| resources.get_mut(descriptor.resource.as_str()))
        .ok_or(Missing::Resource)?;

    match descriptor.kind {
        IncludeKind::File => locate_config(resource, descriptor, "files", "content"),
        IncludeKind::Command => locate_config(resource, descriptor, "commands", "command"),
        IncludeKind::Userdata => {
            let properties = resource
                .get_mut("Properties")
                .and_then(Value::as_object_mut)
                .ok_or(Missing::Properties)?;
            Ok(Target {
                container: properties,
                property: "UserData",
            })
        }
    }
}
