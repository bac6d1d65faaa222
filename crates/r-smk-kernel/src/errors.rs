//! ---
//! smk_section: "02-simulation-kernel"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Error taxonomy for the simulation kernel."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use chrono::Duration;
use thiserror::Error;

use crate::fields::FieldKind;
use crate::model::ModelState;
use crate::scheduler::EventId;
use crate::simulator::SimulatorState;

/// Convenience alias used across the kernel.
pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors surfaced by kernel operations.
///
/// Every phase-transition and scheduler-mutation failure leaves the kernel
/// state exactly as it was before the call; no partial transition is ever
/// committed.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A simulator phase transition was requested from an illegal state.
    #[error("'{operation}' requires simulator state {expected}, but the simulator is {actual}")]
    InvalidSimulatorState {
        /// The operation that was rejected.
        operation: &'static str,
        /// The state the simulator was actually in.
        actual: SimulatorState,
        /// The latest state from which the operation is legal.
        expected: SimulatorState,
    },

    /// An operation was requested after the simulator reached a terminal state.
    #[error("simulator is in terminal state {actual}; '{operation}' is no longer available")]
    TerminalState {
        /// The operation that was rejected.
        operation: &'static str,
        /// The terminal state the simulator is in.
        actual: SimulatorState,
    },

    /// A model lifecycle method was invoked out of order.
    #[error("model '{model}' is {actual}, expected {expected}")]
    InvalidModelState {
        /// Name of the offending model.
        model: String,
        /// The state the model was actually in.
        actual: ModelState,
        /// The state required for the lifecycle method.
        expected: ModelState,
    },

    /// A scheduler call referenced an event that is not registered.
    #[error("no scheduled event with id {0}")]
    InvalidEventId(EventId),

    /// A cyclic event was requested with a non-positive cycle time.
    #[error("cyclic events require a strictly positive cycle time, got {cycle_time}")]
    InvalidCycleTime {
        /// The rejected cycle time.
        cycle_time: Duration,
    },

    /// An object name violated the naming rules.
    #[error("invalid object name '{name}': {reason}")]
    InvalidObjectName {
        /// The rejected name.
        name: String,
        /// Which rule the name violated.
        reason: &'static str,
    },

    /// A model with the same name is already registered.
    #[error("a model named '{name}' is already registered")]
    DuplicateName {
        /// The duplicated model name.
        name: String,
    },

    /// A field with the same qualified name was already published.
    #[error("field '{owner}.{name}' has already been published")]
    DuplicateField {
        /// Owning component of the duplicated field.
        owner: String,
        /// Field name within the owner.
        name: String,
    },

    /// A value of the wrong kind was written to a published field.
    #[error("field expects {expected} values, got {actual}")]
    FieldTypeMismatch {
        /// Kind declared at publication time.
        expected: FieldKind,
        /// Kind of the rejected value.
        actual: FieldKind,
    },

    /// A restored byte span did not match the field's encoded width.
    #[error("field '{field}' expected a {expected}-byte span, got {actual} bytes")]
    InvalidFieldSpan {
        /// Qualified name of the field being restored.
        field: String,
        /// Encoded width of the field's kind.
        expected: usize,
        /// Length of the span actually supplied.
        actual: usize,
    },

    /// `start()` was called while the execution thread is already running.
    #[error("scheduler execution thread is already running")]
    AlreadyRunning,

    /// The scheduler execution thread could not be spawned.
    #[error("failed to spawn scheduler execution thread")]
    Spawn(#[source] std::io::Error),

    /// The persistence collaborator failed during a store or restore pass.
    #[error("storage collaborator failure: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl KernelError {
    /// Wrap a collaborator failure as a [`KernelError::Storage`].
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        KernelError::Storage(Box::new(err))
    }
}
