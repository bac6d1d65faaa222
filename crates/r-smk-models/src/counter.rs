//! ---
//! smk_section: "08-simulation-models"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Cyclic counter reference model."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::Duration;
use r_smk_kernel::{
    require_model_state, EntryPoint, Field, FieldFlags, Logger, Model, ModelState, Publication,
    Result, ScalarField, SimulationContext,
};

/// The simplest useful model: a state-tagged counter incremented by a cyclic
/// simulation-time event.
pub struct CounterModel {
    name: String,
    state: ModelState,
    period: Duration,
    count: Arc<ScalarField<i64>>,
    reset: Arc<EntryPoint>,
    logger: Option<Arc<dyn Logger>>,
}

impl CounterModel {
    /// A counter named `name` ticking every `period` of simulation time.
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        let name = name.into();
        let count = ScalarField::new(0i64);
        let reset = {
            let count = count.clone();
            EntryPoint::new(&name, "reset", move || {
                count.set(0);
            })
        };
        Self {
            name,
            state: ModelState::Created,
            period,
            count,
            reset,
            logger: None,
        }
    }

    /// Current counter value.
    pub fn count(&self) -> i64 {
        self.count.get()
    }

    /// Entry point that zeroes the counter; schedule or subscribe it as
    /// needed.
    pub fn reset_entry_point(&self) -> Arc<EntryPoint> {
        Arc::clone(&self.reset)
    }
}

impl Model for CounterModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "cyclic counter"
    }

    fn state(&self) -> ModelState {
        self.state
    }

    fn publish(&mut self, publication: &mut dyn Publication) -> Result<()> {
        require_model_state(&self.name, self.state, ModelState::Created)?;
        publication.publish_field(Field::new(
            &self.name,
            "count",
            "completed cycles",
            FieldFlags::state_output(),
            self.count.clone(),
        ))?;
        self.state = ModelState::Publishing;
        Ok(())
    }

    fn configure(&mut self, logger: Arc<dyn Logger>) -> Result<()> {
        require_model_state(&self.name, self.state, ModelState::Publishing)?;
        self.logger = Some(logger);
        self.state = ModelState::Configured;
        Ok(())
    }

    fn connect(&mut self, context: &SimulationContext) -> Result<()> {
        require_model_state(&self.name, self.state, ModelState::Configured)?;
        let count = self.count.clone();
        let tick = EntryPoint::new(&self.name, "tick", move || {
            count.update(|v| v + 1);
        });
        let id = context
            .scheduler()
            .add_simulation_time_event(tick, self.period, self.period, -1)?;
        if let Some(logger) = &self.logger {
            logger.info(
                &self.name,
                &format!("cyclic tick registered as event {id}"),
            );
        }
        self.state = ModelState::Connected;
        Ok(())
    }
}
