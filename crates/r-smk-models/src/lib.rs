//! ---
//! smk_section: "08-simulation-models"
//! smk_subsection: "01-bootstrap"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Reference simulation models and assembly loading."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
//! Reference models exercising the R-SMK kernel, plus the YAML assembly
//! loader that instantiates them for a simulator run.
//!
//! For release guidelines refer to `/docs/VERSIONING.md`. The subsystem
//! overview is documented in `/docs/MODELS.md`.

pub mod assembly;
pub mod counter;
pub mod network;
pub mod waveform;

pub use assembly::{AssemblySpec, ModelSpec};
pub use counter::CounterModel;
pub use network::{BusModel, NetworkFabric, NodeModel};
pub use waveform::{WaveformModel, WaveformParams};
