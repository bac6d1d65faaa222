//! ---
//! smk_section: "01-core-functionality"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Shared primitives and utilities for the R-SMK runtime."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_assembly_path() -> PathBuf {
    PathBuf::from("configs/assembly.yaml")
}

fn default_snapshot_directory() -> PathBuf {
    PathBuf::from("target/snapshots")
}

fn default_snapshot_enabled() -> bool {
    true
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the R-SMK daemon.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "R_SMK_CONFIG";

    /// Load configuration from disk, respecting the `R_SMK_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()?;
        self.snapshot.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Settings steering a simulation run.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Path to the assembly file listing the hosted models, in fan-out order.
    #[serde(default = "default_assembly_path")]
    pub assembly: PathBuf,
    /// Epoch time applied before `initialise()`. TOML requires a quoted
    /// RFC 3339 string, e.g. `"2026-01-01T00:00:00Z"`.
    #[serde(default)]
    pub epoch_start: Option<DateTime<Utc>>,
    /// Mission start applied before `initialise()`; same encoding as
    /// `epoch_start`.
    #[serde(default)]
    pub mission_start: Option<DateTime<Utc>>,
    /// Wall-clock run duration before the daemon holds and exits on its own.
    /// When unset the daemon runs until interrupted.
    #[serde(default)]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub run_for: Option<Duration>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            assembly: default_assembly_path(),
            epoch_start: None,
            mission_start: None,
            run_for: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.assembly.as_os_str().is_empty() {
            return Err(anyhow!("simulation.assembly must not be empty"));
        }
        if let Some(run_for) = self.run_for {
            if run_for.is_zero() {
                return Err(anyhow!("simulation.run_for must be positive when set"));
            }
        }
        Ok(())
    }
}

/// Snapshot policy applied when the daemon holds the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_enabled")]
    pub enabled: bool,
    #[serde(default = "default_snapshot_directory")]
    pub directory: PathBuf,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: default_snapshot_enabled(),
            directory: default_snapshot_directory(),
        }
    }
}

impl SnapshotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.directory.as_os_str().is_empty() {
            return Err(anyhow!(
                "snapshot.directory must not be empty while snapshots are enabled"
            ));
        }
        Ok(())
    }
}

/// Logging sink configuration shared by every binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}
