//! ---
//! smk_section: "01-core-functionality"
//! smk_subsection: "binary"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Binary entrypoint for the R-SMK daemon."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use r_smk_common::config::AppConfig;
use r_smk_common::logging::init_tracing;
use r_smk_kernel::Simulator;
use r_smk_models::AssemblySpec;
use r_smk_persistence::SnapshotWriter;
use tokio::signal;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    version = concat!("R-SMK ", env!("CARGO_PKG_VERSION")),
    about = "R-SMK simulation daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print version information and exit"
    )]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the simulation")]
    Run {
        #[arg(
            long,
            value_name = "SECONDS",
            help = "Hold and exit after this many seconds, overriding simulation.run_for"
        )]
        run_for: Option<u64>,

        #[arg(
            long,
            value_name = "FILE",
            help = "Write the closing snapshot to FILE regardless of snapshot settings"
        )]
        snapshot: Option<PathBuf>,
    },
    #[command(about = "Check the configuration and assembly without running")]
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("r-smkd {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/r-smk.toml"));
    candidates.push(PathBuf::from("configs/example.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;
    init_tracing("r-smkd", &config.logging)?;
    info!(config_path = %loaded.source.display(), "configuration loaded");

    match cli.command.unwrap_or(Commands::Run {
        run_for: None,
        snapshot: None,
    }) {
        Commands::Run { run_for, snapshot } => {
            run_simulation(config, run_for.map(Duration::from_secs), snapshot).await?
        }
        Commands::Validate => validate(config)?,
    }

    Ok(())
}

/// Load the assembly, drive the simulator through its lifecycle, and run
/// until the configured duration elapses or a termination signal arrives.
async fn run_simulation(
    config: AppConfig,
    run_for_override: Option<Duration>,
    snapshot_override: Option<PathBuf>,
) -> Result<()> {
    let assembly = AssemblySpec::from_path(&config.simulation.assembly)?;
    let mut simulator = Simulator::new();
    assembly.build(&mut simulator)?;
    info!(
        run_id = %simulator.run_id(),
        models = simulator.model_names().len(),
        assembly = %config.simulation.assembly.display(),
        "assembly loaded"
    );

    simulator.publish()?;
    simulator.configure()?;
    simulator.connect()?;

    if let Some(epoch) = config.simulation.epoch_start {
        simulator.time_keeper().set_epoch_time(epoch);
    }
    if let Some(mission) = config.simulation.mission_start {
        simulator.time_keeper().set_mission_start(mission);
    }

    simulator.initialise()?;
    simulator.run()?;

    match run_for_override.or(config.simulation.run_for) {
        Some(duration) => {
            info!(seconds = duration.as_secs(), "executing for a fixed duration");
            tokio::select! {
                res = signal::ctrl_c() => {
                    res?;
                    info!("ctrl-c received; holding simulation");
                }
                _ = tokio::time::sleep(duration) => {
                    info!("run duration elapsed; holding simulation");
                }
            }
        }
        None => {
            info!("executing until interrupted");
            signal::ctrl_c().await?;
            info!("ctrl-c received; holding simulation");
        }
    }

    simulator.hold()?;
    info!(
        simulation_time_ms = simulator.time_keeper().simulation_time().num_milliseconds(),
        "simulation held"
    );

    let snapshot_path = snapshot_override.or_else(|| {
        config.snapshot.enabled.then(|| {
            config
                .snapshot
                .directory
                .join(format!("snapshot-{}.json", simulator.run_id()))
        })
    });
    if let Some(path) = snapshot_path {
        let mut writer = SnapshotWriter::new();
        simulator.store(&mut writer)?;
        writer
            .write_to(&path)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        info!(
            path = %path.display(),
            spans = writer.span_count(),
            "closing snapshot written"
        );
    }

    simulator.exit()?;
    info!("simulation exited cleanly");
    Ok(())
}

/// Parse the configuration and assembly, reporting what a run would load.
fn validate(config: AppConfig) -> Result<()> {
    let assembly_path = &config.simulation.assembly;
    let assembly = AssemblySpec::from_path(assembly_path)?;
    for model in &assembly.models {
        info!(model = model.name(), "assembly entry validated");
    }
    println!(
        "{}: {} models, configuration valid",
        assembly_path.display(),
        assembly.models.len()
    );
    Ok(())
}
