//! # cfnpp
//!
//! A pre-processing library and CLI tool for CloudFormation JSON templates.
//! Resolves a convention-based includes directory tree into the template's
//! `AWS::CloudFormation::Init` metadata and instance user-data, turning
//! `{{ref …}}` / `{{att …}}` / `{{b64ref …}}` placeholders into
//! CloudFormation intrinsics, and resolves AMI mapping declarations against
//! the EC2 image catalog per region.
//!
//! ## Layout convention
//!
//! For a template at `stack.cloudformation`, includes live in a sibling
//! `stack.cloudformation.d/` directory:
//!
//! ```text
//! stack.cloudformation.d/
//!   resources/<Resource>/configs/<config>/files/<key path…>
//!   resources/<Resource>/configs/<config>/commands/<key path…>
//!   resources/<Resource>/userdata[.ps1|.cmd|.sh]
//!   mappings/<MappingName>.json
//! ```
//!
//! ## Usage
//!
//! ### As a Library
//!
//! ```no_run
//! use cfnpp::{process_template, Ec2Catalog, ImageCatalog, ProcessOptions, StderrSink};
//! use std::path::Path;
//!
//! let catalog = Ec2Catalog::new("eu-west-1").unwrap();
//! let regions = catalog.list_regions().unwrap();
//! let report = process_template(
//!     Path::new("stack.cloudformation"),
//!     &regions,
//!     &catalog,
//!     &StderrSink,
//!     &ProcessOptions::default(),
//! );
//! ```
//!
//! ### As a CLI Tool
//!
//! ```bash
//! # Process every *.cloudformation template in the current directory
//! cfnpp
//!
//! # Explicit patterns and region
//! cfnpp -r us-east-1 'stacks/*.cloudformation'
//! ```

pub mod catalog;
pub mod classify;
pub mod driver;
pub mod error;
pub mod event;
pub mod expr;
pub mod fs_utils;
pub mod include;
pub mod locate;
pub mod mapping;

// Re-export main types and functions for convenience
pub use catalog::{Ec2Catalog, ImageCatalog, ImageInfo};
pub use classify::{classify, Classification, IncludeDescriptor, IncludeKind, UserdataWrapper};
pub use driver::{process_patterns, process_template, ProcessOptions, TemplateReport};
pub use error::{CfnppError, Result};
pub use event::{EventSink, NullSink, StderrSink};
pub use expr::{parse, Expr};
pub use include::{IncludeOutcome, IncludeStatus};
pub use locate::{locate, Missing, Target};
pub use mapping::{MappingOutcome, MappingStatus};
