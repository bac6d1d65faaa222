//! ---
//! smk_section: "08-simulation-models"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "YAML assembly files describing which models to load."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::{fs, path::Path, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use indexmap::IndexSet;
use serde::Deserialize;

use r_smk_kernel::{validate_object_name, Model, Simulator};

use crate::{
    counter::CounterModel,
    network::{BusModel, NetworkFabric, NodeModel},
    waveform::{WaveformModel, WaveformParams},
};

fn default_counter_period_ms() -> i64 {
    100
}

fn default_sync_period_ms() -> i64 {
    100
}

/// One model entry in an assembly file, discriminated by its `kind` tag.
///
/// Waveform parameters are optional and fall back to
/// [`WaveformParams::default`] when omitted.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    /// A cyclic counter ([`CounterModel`]).
    Counter {
        /// Model instance name.
        name: String,
        /// Tick period in milliseconds.
        #[serde(default = "default_counter_period_ms")]
        period_ms: i64,
    },
    /// A seeded noisy sine sampler ([`WaveformModel`]).
    Waveform {
        /// Model instance name.
        name: String,
        #[serde(default)]
        sample_period_ms: Option<i64>,
        #[serde(default)]
        frequency_hz: Option<f64>,
        #[serde(default)]
        amplitude: Option<f64>,
        #[serde(default)]
        noise_sigma: Option<f64>,
        #[serde(default)]
        seed: Option<u64>,
    },
    /// A network endpoint ([`NodeModel`]).
    Node {
        /// Model instance name, also its mailbox name on the fabric.
        name: String,
        /// Whether this node drives the sync cycle.
        #[serde(default)]
        master: bool,
        /// Sync broadcast period in milliseconds; masters only.
        #[serde(default = "default_sync_period_ms")]
        sync_period_ms: i64,
    },
    /// A network bus ([`BusModel`]).
    Bus {
        /// Model instance name.
        name: String,
        /// Names of the nodes to attach. Nodes must be listed before the
        /// bus so their mailboxes exist when the bus connects.
        nodes: Vec<String>,
    },
}

impl ModelSpec {
    /// The model instance name declared in the entry.
    pub fn name(&self) -> &str {
        match self {
            Self::Counter { name, .. }
            | Self::Waveform { name, .. }
            | Self::Node { name, .. }
            | Self::Bus { name, .. } => name,
        }
    }
}

/// A parsed assembly file: the ordered list of models a simulator run
/// loads. Order matters, it becomes the lifecycle fan-out order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssemblySpec {
    /// Model entries in load order.
    #[serde(default)]
    pub models: Vec<ModelSpec>,
}

impl AssemblySpec {
    /// Read and validate an assembly file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read assembly file {}", path.display()))?;
        let spec: Self = serde_yaml::from_str(&data)
            .with_context(|| format!("failed to parse assembly file {}", path.display()))?;
        spec.validate()
            .with_context(|| format!("invalid assembly file {}", path.display()))?;
        tracing::debug!(path = %path.display(), models = spec.models.len(), "assembly loaded");
        Ok(spec)
    }

    /// Check the assembly for problems a build would only surface later.
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(anyhow!("assembly must declare at least one model"));
        }
        let mut seen = IndexSet::new();
        for model in &self.models {
            let name = model.name();
            validate_object_name(name)
                .with_context(|| format!("invalid model name '{name}'"))?;
            if !seen.insert(name) {
                return Err(anyhow!("duplicate model name '{name}'"));
            }
            match model {
                ModelSpec::Counter { period_ms, .. } if *period_ms <= 0 => {
                    return Err(anyhow!("counter '{name}' period_ms must be positive"));
                }
                ModelSpec::Waveform {
                    sample_period_ms,
                    noise_sigma,
                    ..
                } => {
                    if matches!(sample_period_ms, Some(ms) if *ms <= 0) {
                        return Err(anyhow!(
                            "waveform '{name}' sample_period_ms must be positive"
                        ));
                    }
                    if matches!(noise_sigma, Some(sigma) if *sigma < 0.0) {
                        return Err(anyhow!(
                            "waveform '{name}' noise_sigma must not be negative"
                        ));
                    }
                }
                ModelSpec::Node { sync_period_ms, .. } if *sync_period_ms <= 0 => {
                    return Err(anyhow!("node '{name}' sync_period_ms must be positive"));
                }
                ModelSpec::Bus { nodes, .. } if nodes.is_empty() => {
                    return Err(anyhow!("bus '{name}' must list at least one node"));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Instantiate every entry and add it to `simulator`, in file order.
    ///
    /// Node and bus entries share one [`NetworkFabric`] per build.
    pub fn build(&self, simulator: &mut Simulator) -> Result<()> {
        self.validate()?;
        let fabric = NetworkFabric::new();
        for model in &self.models {
            let boxed: Box<dyn Model> = match model {
                ModelSpec::Counter { name, period_ms } => Box::new(CounterModel::new(
                    name,
                    Duration::milliseconds(*period_ms),
                )),
                ModelSpec::Waveform {
                    name,
                    sample_period_ms,
                    frequency_hz,
                    amplitude,
                    noise_sigma,
                    seed,
                } => {
                    let mut params = WaveformParams::default();
                    if let Some(ms) = sample_period_ms {
                        params.sample_period = Duration::milliseconds(*ms);
                    }
                    if let Some(hz) = frequency_hz {
                        params.frequency_hz = *hz;
                    }
                    if let Some(amplitude) = amplitude {
                        params.amplitude = *amplitude;
                    }
                    if let Some(sigma) = noise_sigma {
                        params.noise_sigma = *sigma;
                    }
                    if let Some(seed) = seed {
                        params.seed = *seed;
                    }
                    Box::new(WaveformModel::new(name, params))
                }
                ModelSpec::Node {
                    name,
                    master,
                    sync_period_ms,
                } => {
                    if *master {
                        Box::new(NodeModel::master(
                            name,
                            Arc::clone(&fabric),
                            Duration::milliseconds(*sync_period_ms),
                        ))
                    } else {
                        Box::new(NodeModel::new(name, Arc::clone(&fabric)))
                    }
                }
                ModelSpec::Bus { name, nodes } => {
                    Box::new(BusModel::new(name, Arc::clone(&fabric), nodes.clone()))
                }
            };
            simulator
                .add_model(boxed)
                .with_context(|| format!("failed to add model '{}'", model.name()))?;
        }
        Ok(())
    }
}
