//! iothub - synthesize, audit and deploy the IoT hub stack

mod cli;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use iothub::variables::env_overrides;
use iothub::{audit, AssetManifest, DeployPlan, IotHubStack, StackConfig};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{AuditArgs, Cli, Commands, PlanArgs, SynthArgs, VerifyArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let config = load_config(&cli)?;
    match cli.command {
        Commands::Synth(args) => synth(&config, args),
        Commands::Audit(args) => run_audit(&config, args),
        Commands::Plan(args) => plan(&config, args),
        Commands::Verify(args) => verify(args),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // stdout carries the template, logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// config file, then `.env` overrides, then the process environment, then
/// `--profile`.
fn load_config(cli: &Cli) -> Result<StackConfig> {
    let config = StackConfig::resolve(
        cli.config.as_deref(),
        cli.env_file.as_deref(),
        &env_overrides(),
        cli.profile,
    )
    .context("loading configuration")?;
    Ok(config)
}

fn synth(config: &StackConfig, args: SynthArgs) -> Result<()> {
    let assets = if args.with_assets {
        Some(AssetManifest::collect(config).context("fingerprinting assets")?)
    } else {
        None
    };
    let mut builder = IotHubStack::new(config);
    if let Some(assets) = &assets {
        builder = builder.with_assets(assets);
    }
    let template = builder.build()?.to_template()?;
    let json = template.to_json_pretty()?;
    match args.out {
        Some(path) => {
            std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "wrote template");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_audit(config: &StackConfig, args: AuditArgs) -> Result<()> {
    let stack = IotHubStack::new(config).build()?;
    let report = audit(&stack, config);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    report.into_result()?;
    Ok(())
}

fn plan(config: &StackConfig, args: PlanArgs) -> Result<()> {
    let assets = AssetManifest::collect(config).context("fingerprinting assets")?;
    let stack = IotHubStack::new(config).with_assets(&assets).build()?;
    let report = audit(&stack, config);
    if !report.is_ok() {
        if !args.skip_audit {
            eprint!("{report}");
            bail!("refusing to plan a stack that fails its audit, pass --skip-audit to override");
        }
        tracing::warn!("writing a plan for a stack that fails its audit");
    }
    let plan = DeployPlan::new(config, &assets)?;
    plan.write_to(&args.out_dir, &stack.to_template()?)?;
    println!("run {}/deploy.sh to apply", args.out_dir.display());
    Ok(())
}

fn verify(args: VerifyArgs) -> Result<()> {
    let status = iothub::verify::check_endpoint(&args.url, Duration::from_secs(args.timeout))?;
    println!("{} responded {status}", args.url);
    Ok(())
}
