//! ---
//! smk_section: "02-simulation-kernel"
//! smk_subsection: "01-bootstrap"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Simulation kernel module exports and shared types."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! The R-SMK simulation kernel.
//!
//! Hosts independently-developed simulation models behind the [`Model`]
//! lifecycle contract, advances the four-clock [`TimeKeeper`], fires
//! entry points from the [`Scheduler`]'s dedicated thread, and drives it
//! all through the [`Simulator`] state machine. The subsystem overview is
//! documented in `/docs/KERNEL.md`.

pub mod entrypoint;
pub mod errors;
pub mod fields;
pub mod model;
pub mod naming;
pub mod notifications;
pub mod scheduler;
pub mod services;
pub mod simulator;
pub mod timekeeper;

pub use entrypoint::EntryPoint;
pub use errors::{KernelError, Result};
pub use fields::{
    Field, FieldAccess, FieldFlags, FieldKind, FieldRegistry, FieldValue, Publication, Scalar,
    ScalarField,
};
pub use model::{require_model_state, Model, ModelState};
pub use naming::{validate_object_name, MAX_OBJECT_NAME_LEN};
pub use notifications::{KernelEvent, NotificationHub, NotificationSink};
pub use scheduler::{EventId, EventInstant, EventSnapshot, Scheduler, TimeKind};
pub use services::{
    Logger, LogKind, SimulationContext, StorageReader, StorageWriter, TracingLogger,
};
pub use simulator::{Simulator, SimulatorState};
pub use timekeeper::TimeKeeper;
