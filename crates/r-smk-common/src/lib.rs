//! ---
//! smk_section: "01-core-functionality"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Shared primitives and utilities for the R-SMK runtime."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
//! Shared configuration and logging bootstrap used by the R-SMK binaries.
//!
//! The simulation kernel itself (`r-smk-kernel`) stays independent of this
//! crate so it can be embedded without dragging in a configuration layer.

pub mod config;
pub mod logging;

pub use config::{AppConfig, LoadedAppConfig, LoggingConfig, SimulationConfig, SnapshotConfig};
pub use logging::{init_tracing, LogFormat};
