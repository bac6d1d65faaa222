//! ---
//! smk_section: "02-simulation-kernel"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "The lifecycle contract every hosted model implements."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::sync::Arc;

use crate::errors::{KernelError, Result};
use crate::fields::Publication;
use crate::services::{Logger, SimulationContext};

/// Lifecycle states of a hosted model, strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ModelState {
    /// Constructed, nothing published yet.
    Created,
    /// Fields published, not yet configured.
    Publishing,
    /// Configured, services not yet connected.
    Configured,
    /// Fully connected; events may have been registered.
    Connected,
}

/// A hosted simulation unit.
///
/// The Simulator drives each model forward through
/// `publish` → `configure` → `connect`, exactly once each and in that order.
/// Implementations guard their own state with
/// [`require_model_state`] so an out-of-order call fails with
/// [`KernelError::InvalidModelState`] and changes nothing.
pub trait Model: Send {
    /// The model's name; validated against the kernel's object-name rules
    /// when the model is added to a Simulator.
    fn name(&self) -> &str;

    /// Free-form description.
    fn description(&self) -> &str {
        ""
    }

    /// Current lifecycle state.
    fn state(&self) -> ModelState;

    /// Register published fields. Legal only from
    /// [`ModelState::Created`]; moves to [`ModelState::Publishing`].
    fn publish(&mut self, publication: &mut dyn Publication) -> Result<()>;

    /// Take the logging service. Legal only from
    /// [`ModelState::Publishing`]; moves to [`ModelState::Configured`].
    fn configure(&mut self, logger: Arc<dyn Logger>) -> Result<()>;

    /// Take the full service context; the only phase in which the model may
    /// register scheduler events. Legal only from
    /// [`ModelState::Configured`]; moves to [`ModelState::Connected`].
    fn connect(&mut self, context: &SimulationContext) -> Result<()>;
}

/// Lifecycle guard for [`Model`] implementations.
pub fn require_model_state(name: &str, actual: ModelState, expected: ModelState) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(KernelError::InvalidModelState {
            model: name.to_owned(),
            actual,
            expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{Field, FieldFlags, ScalarField};
    use crate::notifications::NotificationHub;
    use crate::scheduler::Scheduler;
    use crate::services::TracingLogger;
    use crate::timekeeper::TimeKeeper;

    struct Probe {
        state: ModelState,
        value: Arc<ScalarField<u32>>,
    }

    impl Probe {
        fn new() -> Self {
            Self {
                state: ModelState::Created,
                value: ScalarField::new(0),
            }
        }
    }

    impl Model for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn state(&self) -> ModelState {
            self.state
        }

        fn publish(&mut self, publication: &mut dyn Publication) -> Result<()> {
            require_model_state(self.name(), self.state, ModelState::Created)?;
            publication.publish_field(Field::new(
                self.name(),
                "value",
                "probe value",
                FieldFlags::state_output(),
                self.value.clone(),
            ))?;
            self.state = ModelState::Publishing;
            Ok(())
        }

        fn configure(&mut self, _logger: Arc<dyn Logger>) -> Result<()> {
            require_model_state(self.name(), self.state, ModelState::Publishing)?;
            self.state = ModelState::Configured;
            Ok(())
        }

        fn connect(&mut self, _context: &SimulationContext) -> Result<()> {
            require_model_state(self.name(), self.state, ModelState::Configured)?;
            self.state = ModelState::Connected;
            Ok(())
        }
    }

    fn context() -> SimulationContext {
        let notifications = Arc::new(NotificationHub::new());
        let time_keeper = Arc::new(TimeKeeper::new(Arc::clone(&notifications)));
        let logger: Arc<dyn Logger> = Arc::new(TracingLogger);
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&time_keeper), Arc::clone(&logger)));
        SimulationContext::new(scheduler, time_keeper, logger, notifications)
    }

    #[test]
    fn lifecycle_is_strictly_forward() {
        let mut model = Probe::new();
        let mut registry = crate::fields::FieldRegistry::new();

        // Out-of-order calls fail and leave the state alone.
        let err = model.configure(Arc::new(TracingLogger)).expect_err("not published");
        assert!(matches!(
            err,
            KernelError::InvalidModelState {
                actual: ModelState::Created,
                expected: ModelState::Publishing,
                ..
            }
        ));
        assert_eq!(model.state(), ModelState::Created);

        let err = model.connect(&context()).expect_err("not configured");
        assert!(matches!(err, KernelError::InvalidModelState { .. }));
        assert_eq!(model.state(), ModelState::Created);

        model.publish(&mut registry).expect("from Created");
        assert_eq!(model.state(), ModelState::Publishing);
        let err = model.publish(&mut registry).expect_err("publish is once");
        assert!(matches!(err, KernelError::InvalidModelState { .. }));

        model.configure(Arc::new(TracingLogger)).expect("from Publishing");
        model.connect(&context()).expect("from Configured");
        assert_eq!(model.state(), ModelState::Connected);
    }
}
