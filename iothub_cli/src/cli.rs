use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use iothub::ApiMode;

/// Synthesize, audit and deploy the IoT hub stack
#[derive(Parser, Debug)]
#[command(name = "iothub")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to an iothub.toml config file
    #[arg(short, long, global = true, env = "IOTHUB_CONFIG")]
    pub config: Option<PathBuf>,

    /// `.env` file with IOTHUB_* overrides
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Api profile, overrides the config file and the environment
    #[arg(short, long, global = true)]
    pub profile: Option<ApiMode>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the CloudFormation template
    Synth(SynthArgs),

    /// Check the rendered template against the hub's security rules
    Audit(AuditArgs),

    /// Write the template plus deploy and destroy scripts
    Plan(PlanArgs),

    /// Probe a deployed endpoint
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Write the template here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Fingerprint the site and function artifact and pin them in the template
    #[arg(long)]
    pub with_assets: bool,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Directory the template and scripts are written to
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Write the plan even if the audit fails
    #[arg(long)]
    pub skip_audit: bool,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Url to request, usually the CloudFrontURL output
    #[arg(long)]
    pub url: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,
}
