//! CLI argument definitions

use clap::{Args, Parser, ValueEnum};
use shelfscan_domain::OutputFormat;
use std::path::PathBuf;

/// Output format for the completion record
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputArg {
    /// Status, accuracy, cost and escalations
    Summary,
    /// Completion record as pretty-printed JSON
    Json,
}

impl From<OutputArg> for OutputFormat {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Summary => OutputFormat::Summary,
            OutputArg::Json => OutputFormat::Json,
        }
    }
}

/// Where the shelf photo comes from
#[derive(Args, Debug)]
#[group(multiple = false)]
pub struct ImageSource {
    /// Path to the shelf photo
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,

    /// Publicly reachable URL of the shelf photo
    #[arg(long, value_name = "URL")]
    pub image_url: Option<String>,
}

/// CLI arguments for shelfscan
#[derive(Parser, Debug)]
#[command(name = "shelfscan")]
#[command(author, version, about = "Extract structured retail-shelf data from a photo with a council of vision models")]
#[command(long_about = r#"
shelfscan runs a multi-stage extraction over one retail-shelf photo.

Stages run in order, each answered by several vision models in parallel:
1. structure          Shelf layout (shelf count, positions)
2. products           Products per shelf
3. details            Prices, facings and other per-product detail
4. visual_validation  Optional comparison of the extraction against the photo

Model outputs are reconciled field by field; low-confidence stages are retried
with feedback until the accuracy target, iteration limit or cost budget is hit.

Configuration files are loaded from (in priority order):
1. SHELFSCAN_* environment variables (e.g. SHELFSCAN_RUN__COST_BUDGET=0.5)
2. --config <path>            Explicit config file
3. ./shelfscan.toml           Project-level config
4. ~/.config/shelfscan/config.toml   Global config

Example:
  shelfscan --image aisle-7.jpg
  shelfscan --image-url https://example.com/shelf.jpg --output json
"#)]
pub struct Cli {
    #[command(flatten)]
    pub source: ImageSource,

    /// Output format (overrides [output] format)
    #[arg(short, long, value_enum)]
    pub output: Option<OutputArg>,

    /// Append audit records as JSONL to this file (overrides [output] audit_log)
    #[arg(long, value_name = "PATH")]
    pub audit_log: Option<PathBuf>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Suppress progress indicators
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}

impl Cli {
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_image_path() {
        let cli = Cli::try_parse_from(["shelfscan", "--image", "shelf.jpg", "-vv", "-o", "json"])
            .unwrap();
        assert_eq!(cli.source.image, Some(PathBuf::from("shelf.jpg")));
        assert_eq!(cli.output, Some(OutputArg::Json));
        assert_eq!(cli.log_level(), "debug");
    }

    #[test]
    fn test_image_sources_are_exclusive() {
        let result = Cli::try_parse_from([
            "shelfscan",
            "--image",
            "a.jpg",
            "--image-url",
            "https://x/a.jpg",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_show_config_without_image() {
        let cli = Cli::try_parse_from(["shelfscan", "--show-config"]).unwrap();
        assert!(cli.show_config);
        assert!(cli.source.image.is_none());
        assert!(cli.source.image_url.is_none());
    }
}
