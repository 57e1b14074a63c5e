//! osplan - main entry point
//!
//! Parses flags into an immutable [`RunConfig`], validates it, detects the
//! target system and dispatches to the requested subcommand.

use anyhow::{Context, Result};
use osplan::assets::BuiltinAssets;
use osplan::cli::{Cli, Commands};
use osplan::config::RunConfig;
use osplan::extensions::{DirectoryFragments, FragmentSource};
use osplan::logic::composer::compose_plan;
use osplan::logic::resolver::resolve_packages;
use osplan::matrices;
use osplan::output;
use osplan::probe::FsKernelProbe;
use osplan::runner::{run_pipeline, LoggingRunner};
use osplan::system::{detect_architecture, SystemDescriptor};
use std::path::Path;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Initialize tracing. `RUST_LOG` wins over `--log-level`.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse_args();
    init_logging(&cli.log_level);
    debug!("CLI arguments parsed");

    let config = cli.to_config();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        eprintln!("✗ {}", e);
        std::process::exit(1);
    }

    let system = match &cli.os_release {
        Some(path) => SystemDescriptor::from_os_release_file(path, detect_architecture()),
        None => SystemDescriptor::detect(),
    };
    info!("Detected {}", system);

    if let Err(e) = config.check_target(&system) {
        error!("Configuration does not fit this system: {}", e);
        eprintln!("✗ {}", e);
        std::process::exit(1);
    }

    let result = match cli.command() {
        Commands::Plan { root } => run_plan(&config, &system, &root, cli.dry_run),
        Commands::Detect { json } => print_descriptor(&system, json),
        Commands::Packages { json } => print_packages(&config, &system, json),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}

fn run_plan(config: &RunConfig, system: &SystemDescriptor, root: &Path, dry_run: bool) -> Result<()> {
    let assets = BuiltinAssets;
    let probe = FsKernelProbe::new(root);
    let fragments = DirectoryFragments::load(&config.extensions_dir);
    let stage_extensions = DirectoryFragments::load(&config.stage_extensions_dir);
    let sources: [&dyn FragmentSource; 2] = [&fragments, &stage_extensions];

    let plan = compose_plan(config, system, &assets, &probe, &sources)?;
    debug!("{}", plan.summary());

    if dry_run {
        print!("{}", output::to_yaml(&plan)?);
        let mut runner = LoggingRunner::new(system.family);
        run_pipeline(&mut runner, root, &plan)?;
        info!(
            "[dry-run] {} stage(s) would run, {} skipped by predicate",
            runner.ran().len(),
            runner.skipped().len()
        );
        return Ok(());
    }

    let path = output::write_plan(config, &plan)
        .with_context(|| format!("Failed to persist {} plan", plan.pipeline()))?;
    println!("✓ {} plan written to {}", plan.pipeline(), path.display());
    Ok(())
}

fn print_descriptor(system: &SystemDescriptor, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(system)?);
    } else {
        print!("{}", serde_yaml::to_string(system)?);
    }
    Ok(())
}

fn print_packages(config: &RunConfig, system: &SystemDescriptor, json: bool) -> Result<()> {
    let packages = resolve_packages(system, matrices::COMMON_PACKAGES, &matrices::select(config))
        .context("Package resolution failed")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&packages)?);
    } else {
        for package in packages {
            println!("{}", package);
        }
    }
    Ok(())
}
