//! ---
//! smk_section: "02-simulation-kernel"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Simulator orchestrator: models, phases, state machine."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::sync::Arc;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::entrypoint::{run_contained, EntryPoint};
use crate::errors::{KernelError, Result};
use crate::fields::FieldRegistry;
use crate::model::{Model, ModelState};
use crate::naming::validate_object_name;
use crate::notifications::{KernelEvent, NotificationHub};
use crate::scheduler::Scheduler;
use crate::services::{Logger, SimulationContext, StorageReader, StorageWriter, TracingLogger};
use crate::timekeeper::TimeKeeper;

/// Simulator lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SimulatorState {
    /// Assembling models; the initial state.
    Building,
    /// Connect fan-out in progress.
    Connecting,
    /// Connected, init entry points not yet run.
    Initialising,
    /// Idle, ready to run, store, restore or exit.
    Standby,
    /// Scheduler thread running, simulation time progressing.
    Executing,
    /// Store pass in progress.
    Storing,
    /// Restore pass in progress.
    Restoring,
    /// Terminal: orderly shutdown.
    Exiting,
    /// Terminal: emergency shutdown.
    Aborting,
}

impl SimulatorState {
    /// Whether no further transitions are accepted from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SimulatorState::Exiting | SimulatorState::Aborting)
    }
}

/// The simulation orchestrator.
///
/// Owns the hosted models, the [`Scheduler`], the [`TimeKeeper`], the field
/// registry and the notification hub, and drives everything through the
/// kernel state machine:
///
/// ```text
/// Building ──connect()──▶ Connecting ──▶ Initialising ──initialise()──▶ Standby
///                                                            run() │ ▲ hold()
///                                                                  ▼ │
///                                                               Executing
/// ```
///
/// plus the Storing/Restoring loops out of Standby and the terminal
/// Exiting/Aborting states. Every transition invoked outside its legal
/// source state fails with [`KernelError::InvalidSimulatorState`] (or
/// [`KernelError::TerminalState`]) and changes nothing.
pub struct Simulator {
    state: SimulatorState,
    models: IndexMap<String, Box<dyn Model>>,
    registry: FieldRegistry,
    init_entry_points: Vec<Arc<EntryPoint>>,
    scheduler: Arc<Scheduler>,
    time_keeper: Arc<TimeKeeper>,
    logger: Arc<dyn Logger>,
    notifications: Arc<NotificationHub>,
    run_id: Uuid,
}

impl Simulator {
    /// A simulator in Building state logging through [`TracingLogger`].
    pub fn new() -> Self {
        Self::with_logger(Arc::new(TracingLogger))
    }

    /// A simulator in Building state with a caller-supplied logger.
    pub fn with_logger(logger: Arc<dyn Logger>) -> Self {
        let notifications = Arc::new(NotificationHub::new());
        let time_keeper = Arc::new(TimeKeeper::new(Arc::clone(&notifications)));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&time_keeper),
            Arc::clone(&logger),
        ));
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, "simulator created");
        Self {
            state: SimulatorState::Building,
            models: IndexMap::new(),
            registry: FieldRegistry::new(),
            init_entry_points: Vec::new(),
            scheduler,
            time_keeper,
            logger,
            notifications,
            run_id,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SimulatorState {
        self.state
    }

    /// Identifier of this simulator instance, carried in logs.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The event scheduler.
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// The simulation clock.
    pub fn time_keeper(&self) -> &Arc<TimeKeeper> {
        &self.time_keeper
    }

    /// The logging service models are configured with.
    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    /// The kernel notification hub.
    pub fn notifications(&self) -> &Arc<NotificationHub> {
        &self.notifications
    }

    /// The published-field registry.
    pub fn fields(&self) -> &FieldRegistry {
        &self.registry
    }

    fn require_state(&self, operation: &'static str, expected: SimulatorState) -> Result<()> {
        if self.state.is_terminal() {
            return Err(KernelError::TerminalState {
                operation,
                actual: self.state,
            });
        }
        if self.state != expected {
            return Err(KernelError::InvalidSimulatorState {
                operation,
                actual: self.state,
                expected,
            });
        }
        Ok(())
    }

    fn enter_state(&mut self, to: SimulatorState) {
        tracing::info!(from = %self.state, to = %to, "simulator state change");
        self.state = to;
    }

    /// Host a model. Legal only while Building; the model keeps its current
    /// lifecycle state and joins the next matching fan-out.
    pub fn add_model(&mut self, model: Box<dyn Model>) -> Result<()> {
        self.require_state("add_model", SimulatorState::Building)?;
        let name = model.name().to_owned();
        validate_object_name(&name)?;
        if self.models.contains_key(&name) {
            return Err(KernelError::DuplicateName { name });
        }
        self.logger.info(&name, "model added");
        self.models.insert(name, model);
        Ok(())
    }

    /// Names of the hosted models, in insertion order.
    pub fn model_names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Run `f` against the named model, if hosted.
    pub fn with_model<R>(&self, name: &str, f: impl FnOnce(&dyn Model) -> R) -> Option<R> {
        self.models.get(name).map(|model| f(model.as_ref()))
    }

    /// Queue an entry point for [`initialise`](Simulator::initialise), run in
    /// registration order. Legal until `initialise()` has run.
    pub fn add_init_entry_point(&mut self, entry_point: Arc<EntryPoint>) -> Result<()> {
        match self.state {
            SimulatorState::Building
            | SimulatorState::Connecting
            | SimulatorState::Initialising => {
                self.init_entry_points.push(entry_point);
                Ok(())
            }
            _ if self.state.is_terminal() => Err(KernelError::TerminalState {
                operation: "add_init_entry_point",
                actual: self.state,
            }),
            _ => Err(KernelError::InvalidSimulatorState {
                operation: "add_init_entry_point",
                actual: self.state,
                expected: SimulatorState::Initialising,
            }),
        }
    }

    /// Publish fan-out: every model still Created registers its fields.
    ///
    /// The simulator stays in Building, so models added afterwards can be
    /// published by a later call. Fan-out stops at the first failing model;
    /// models already advanced stay advanced.
    pub fn publish(&mut self) -> Result<()> {
        self.require_state("publish", SimulatorState::Building)?;
        for model in self.models.values_mut() {
            if model.state() != ModelState::Created {
                continue;
            }
            tracing::debug!(model = model.name(), "publishing model");
            model.publish(&mut self.registry)?;
        }
        Ok(())
    }

    /// Configure fan-out: every model still Publishing takes the logger.
    pub fn configure(&mut self) -> Result<()> {
        self.require_state("configure", SimulatorState::Building)?;
        for model in self.models.values_mut() {
            if model.state() != ModelState::Publishing {
                continue;
            }
            tracing::debug!(model = model.name(), "configuring model");
            model.configure(Arc::clone(&self.logger))?;
        }
        Ok(())
    }

    /// Connect fan-out: every Configured model takes the service context,
    /// and the simulator advances to Initialising.
    ///
    /// Fan-out order is model insertion order, so a model may depend on
    /// earlier models being connected first. On any model failure the
    /// simulator returns to Building (already-connected models stay
    /// connected) and the error is surfaced.
    pub fn connect(&mut self) -> Result<()> {
        self.require_state("connect", SimulatorState::Building)?;
        self.enter_state(SimulatorState::Connecting);
        let context = SimulationContext::new(
            Arc::clone(&self.scheduler),
            Arc::clone(&self.time_keeper),
            Arc::clone(&self.logger),
            Arc::clone(&self.notifications),
        );
        for model in self.models.values_mut() {
            if model.state() != ModelState::Configured {
                continue;
            }
            tracing::debug!(model = model.name(), "connecting model");
            if let Err(err) = model.connect(&context) {
                self.enter_state(SimulatorState::Building);
                return Err(err);
            }
        }
        self.notifications.emit(KernelEvent::LeaveConnecting);
        self.enter_state(SimulatorState::Initialising);
        self.notifications.emit(KernelEvent::EnterInitialising);
        Ok(())
    }

    /// Run the queued init entry points in registration order and advance to
    /// Standby.
    ///
    /// Init entry points obey the usual containment contract: a panic is
    /// logged and does not stop the remaining ones.
    pub fn initialise(&mut self) -> Result<()> {
        self.require_state("initialise", SimulatorState::Initialising)?;
        for entry_point in &self.init_entry_points {
            tracing::debug!(entry_point = %entry_point.qualified_name(), "running init entry point");
            if let Err(panic) = run_contained(entry_point) {
                self.logger.error(
                    &entry_point.qualified_name(),
                    &format!("init entry point panicked: {panic}"),
                );
                tracing::error!(
                    entry_point = %entry_point.qualified_name(),
                    panic = %panic,
                    "init entry point panicked"
                );
            }
        }
        self.notifications.emit(KernelEvent::LeaveInitialising);
        self.enter_state(SimulatorState::Standby);
        self.notifications.emit(KernelEvent::EnterStandby);
        Ok(())
    }

    /// Start executing: simulation time progresses and the scheduler thread
    /// fires due events until [`hold`](Simulator::hold).
    pub fn run(&mut self) -> Result<()> {
        self.require_state("run", SimulatorState::Standby)?;
        self.time_keeper.start();
        if let Err(err) = self.scheduler.start() {
            self.time_keeper.hold();
            return Err(err);
        }
        self.notifications.emit(KernelEvent::LeaveStandby);
        self.enter_state(SimulatorState::Executing);
        self.notifications.emit(KernelEvent::EnterExecuting);
        Ok(())
    }

    /// Stop executing. When this returns the scheduler thread has quiesced
    /// and simulation time is frozen.
    pub fn hold(&mut self) -> Result<()> {
        self.require_state("hold", SimulatorState::Executing)?;
        self.scheduler.stop();
        self.time_keeper.hold();
        self.notifications.emit(KernelEvent::LeaveExecuting);
        self.enter_state(SimulatorState::Standby);
        self.notifications.emit(KernelEvent::EnterStandby);
        Ok(())
    }

    /// Store pass: write every state-tagged field, in publication order,
    /// through `writer`.
    ///
    /// On a storage failure the pass is abandoned, the simulator returns to
    /// Standby and the error is surfaced.
    pub fn store(&mut self, writer: &mut dyn StorageWriter) -> Result<()> {
        self.require_state("store", SimulatorState::Standby)?;
        self.notifications.emit(KernelEvent::LeaveStandby);
        self.enter_state(SimulatorState::Storing);
        self.notifications.emit(KernelEvent::EnterStoring);

        let result = self.registry.state_fields().try_for_each(|field| {
            tracing::trace!(field = %field.qualified_name(), "storing field");
            field.store(writer)
        });
        if let Err(err) = &result {
            tracing::error!(error = %err, "store pass failed");
        }

        self.notifications.emit(KernelEvent::LeaveStoring);
        self.enter_state(SimulatorState::Standby);
        self.notifications.emit(KernelEvent::EnterStandby);
        result
    }

    /// Restore pass: read every state-tagged field back, in publication
    /// order, from `reader`.
    ///
    /// Each field reads exactly the span it stores, so a restore replays the
    /// byte layout a prior store produced. Failure semantics mirror
    /// [`store`](Simulator::store).
    pub fn restore(&mut self, reader: &mut dyn StorageReader) -> Result<()> {
        self.require_state("restore", SimulatorState::Standby)?;
        self.notifications.emit(KernelEvent::LeaveStandby);
        self.enter_state(SimulatorState::Restoring);
        self.notifications.emit(KernelEvent::EnterRestoring);

        let result = self.registry.state_fields().try_for_each(|field| {
            tracing::trace!(field = %field.qualified_name(), "restoring field");
            field.restore(reader)
        });
        if let Err(err) = &result {
            tracing::error!(error = %err, "restore pass failed");
        }

        self.notifications.emit(KernelEvent::LeaveRestoring);
        self.enter_state(SimulatorState::Standby);
        self.notifications.emit(KernelEvent::EnterStandby);
        result
    }

    /// Orderly terminal shutdown. Legal only from Standby.
    pub fn exit(&mut self) -> Result<()> {
        self.require_state("exit", SimulatorState::Standby)?;
        self.enter_state(SimulatorState::Exiting);
        self.notifications.emit(KernelEvent::EnterExiting);
        self.logger.event("simulator", "exited");
        Ok(())
    }

    /// Emergency terminal shutdown, legal from any non-terminal state.
    /// Stops the scheduler and freezes time, bypassing the usual
    /// preconditions.
    pub fn abort(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(KernelError::TerminalState {
                operation: "abort",
                actual: self.state,
            });
        }
        tracing::warn!(state = %self.state, "simulator aborting");
        self.scheduler.stop();
        self.time_keeper.hold();
        self.enter_state(SimulatorState::Aborting);
        self.notifications.emit(KernelEvent::EnterAborting);
        self.logger.event("simulator", "aborted");
        Ok(())
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        if self.state == SimulatorState::Executing {
            tracing::warn!("simulator dropped while executing; stopping scheduler");
            self.scheduler.stop();
            self.time_keeper.hold();
        }
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("state", &self.state)
            .field("models", &self.models.len())
            .field("fields", &self.registry.len())
            .field("run_id", &self.run_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::fields::Publication;

    struct Inert {
        name: String,
        state: ModelState,
    }

    impl Inert {
        fn boxed(name: &str) -> Box<dyn Model> {
            Box::new(Self {
                name: name.to_owned(),
                state: ModelState::Created,
            })
        }
    }

    impl Model for Inert {
        fn name(&self) -> &str {
            &self.name
        }

        fn state(&self) -> ModelState {
            self.state
        }

        fn publish(&mut self, _publication: &mut dyn Publication) -> Result<()> {
            self.state = ModelState::Publishing;
            Ok(())
        }

        fn configure(&mut self, _logger: Arc<dyn Logger>) -> Result<()> {
            self.state = ModelState::Configured;
            Ok(())
        }

        fn connect(&mut self, _context: &SimulationContext) -> Result<()> {
            self.state = ModelState::Connected;
            Ok(())
        }
    }

    #[test]
    fn add_model_validates_name_and_uniqueness() {
        let mut simulator = Simulator::new();
        simulator.add_model(Inert::boxed("alpha")).expect("valid name");

        let err = simulator.add_model(Inert::boxed("alpha")).expect_err("duplicate");
        assert!(matches!(err, KernelError::DuplicateName { .. }));

        let err = simulator.add_model(Inert::boxed("9lives")).expect_err("leading digit");
        assert!(matches!(err, KernelError::InvalidObjectName { .. }));

        assert_eq!(simulator.model_names(), ["alpha"]);
    }

    #[test]
    fn models_are_only_addable_while_building() {
        let mut simulator = Simulator::new();
        simulator.add_model(Inert::boxed("alpha")).expect("while building");
        simulator.publish().expect("publish");
        simulator.configure().expect("configure");
        simulator.connect().expect("connect");

        let err = simulator.add_model(Inert::boxed("beta")).expect_err("too late");
        assert!(matches!(
            err,
            KernelError::InvalidSimulatorState {
                actual: SimulatorState::Initialising,
                expected: SimulatorState::Building,
                ..
            }
        ));
    }

    #[test]
    fn init_entry_points_run_in_registration_order() {
        let mut simulator = Simulator::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for tag in ["one", "two", "three"] {
            let order = Arc::clone(&order);
            simulator
                .add_init_entry_point(EntryPoint::new("init", tag, move || order.lock().push(tag)))
                .expect("while building");
        }
        simulator.connect().expect("connect");
        simulator.initialise().expect("initialise");

        assert_eq!(*order.lock(), ["one", "two", "three"]);
        assert_eq!(simulator.state(), SimulatorState::Standby);
    }

    #[test]
    fn init_entry_point_panic_is_contained() {
        let mut simulator = Simulator::new();
        let ran = Arc::new(AtomicU32::new(0));

        simulator
            .add_init_entry_point(EntryPoint::new("init", "bad", || panic!("boom")))
            .expect("while building");
        let counter = Arc::clone(&ran);
        simulator
            .add_init_entry_point(EntryPoint::new("init", "good", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .expect("while building");

        simulator.connect().expect("connect");
        simulator.initialise().expect("initialise despite panic");
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(simulator.state(), SimulatorState::Standby);
    }

    #[test]
    fn terminal_states_reject_everything() {
        let mut simulator = Simulator::new();
        simulator.connect().expect("connect");
        simulator.initialise().expect("initialise");
        simulator.exit().expect("exit from standby");

        assert!(matches!(
            simulator.run(),
            Err(KernelError::TerminalState { .. })
        ));
        assert!(matches!(
            simulator.abort(),
            Err(KernelError::TerminalState { .. })
        ));
    }
}
