use cfnpp::{
    driver, Ec2Catalog, EventSink, ImageCatalog, NullSink, ProcessOptions, Result, StderrSink,
    TemplateReport,
};
use clap::Parser;
use std::path::PathBuf;

const LONG_HELP: &str = r#"
Layout:
  For a template at stack.cloudformation, includes live in a sibling
  stack.cloudformation.d/ directory:

    resources/<Resource>/configs/<config>/files/<key path...>
    resources/<Resource>/configs/<config>/commands/<key path...>
    resources/<Resource>/userdata[.ps1|.cmd|.sh]
    mappings/<MappingName>.json

  File and command includes are spliced into the resource's
  AWS::CloudFormation::Init metadata; userdata includes become the
  resource's base64-encoded UserData property. Include text may embed
  {{ref Name}}, {{att Resource Attr}} and {{b64ref Name}} placeholders.
  Mapping declarations ({"type": "ami", "ami": {"owner": ..., "name": ...}})
  resolve the newest matching AMI per region into the template's Mappings.

Examples:
  # Process every *.cloudformation template in the current directory
  cfnpp
  # Explicit patterns and region
  cfnpp -r us-east-1 'stacks/*.cloudformation'
  # Keep the original template, write stack.cloudformation.processed
  cfnpp -e processed
  # Compact output
  cfnpp --compact
"#;

/// CloudFormation Pre-Processor.
#[derive(Parser, Debug)]
#[command(
    name = "cfnpp",
    version,
    about = "CloudFormation Pre-Processor: inline include trees and resolve AMI mappings.",
    after_long_help = LONG_HELP
)]
struct Cli {
    /// Template path patterns, relative to the base directory
    #[arg(value_name = "PATTERN")]
    patterns: Vec<String>,

    /// AWS region the region enumeration call is issued against
    #[arg(short, long, value_name = "REGION", default_value = "eu-west-1")]
    region: String,

    /// Base directory for pattern expansion
    #[arg(short = 'd', long, value_name = "DIR", env = "CFNPP_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Write single-line JSON instead of pretty-printed
    #[arg(short, long)]
    compact: bool,

    /// Write the processed template to <path>.<EXT> instead of overwriting
    #[arg(short = 'e', long, value_name = "EXT")]
    output_extension: Option<String>,

    /// Suppress progress events (errors still go to stderr)
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    if !cli.quiet {
        eprintln!("CloudFormation Pre-Processor {}", env!("CARGO_PKG_VERSION"));
    }

    let reports = match run(&cli) {
        Ok(reports) => reports,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let written = reports.iter().filter(|r| r.saved).count();
    let failed = reports.iter().filter(|r| r.is_failed()).count();
    let changes: usize = reports.iter().map(TemplateReport::changed_count).sum();
    println!(
        "Summary: {} templates, {changes} changes, {written} written, {failed} failed",
        reports.len()
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<Vec<TemplateReport>> {
    let sink: Box<dyn EventSink> = if cli.quiet {
        Box::new(NullSink)
    } else {
        Box::new(StderrSink)
    };

    let base_dir = match &cli.base_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    let catalog = Ec2Catalog::new(cli.region.clone())?;
    let regions = catalog.list_regions()?;

    let options = ProcessOptions {
        compact: cli.compact,
        output_extension: cli.output_extension.clone(),
    };
    driver::process_patterns(
        &cli.patterns,
        &base_dir,
        &regions,
        &catalog,
        sink.as_ref(),
        &options,
    )
}
