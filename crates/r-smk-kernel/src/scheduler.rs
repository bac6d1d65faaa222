//! ---
//! smk_section: "02-simulation-kernel"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Time-based event scheduler with a dedicated execution thread."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::entrypoint::{run_contained, EntryPoint};
use crate::errors::{KernelError, Result};
use crate::services::Logger;
use crate::timekeeper::TimeKeeper;

/// Opaque identifier of a scheduled event. Monotonic, never reused.
pub type EventId = u64;

/// The clock an event's trigger is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TimeKind {
    /// Elapsed simulation time.
    Simulation,
    /// Mission time.
    Mission,
    /// Absolute epoch time.
    Epoch,
    /// Wall-clock time.
    Zulu,
}

/// A trigger instant together with the clock it is measured on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventInstant {
    /// Fire when simulation time reaches the duration.
    Simulation(Duration),
    /// Fire when mission time reaches the duration.
    Mission(Duration),
    /// Fire at the epoch instant.
    Epoch(DateTime<Utc>),
    /// Fire at the wall-clock instant.
    Zulu(DateTime<Utc>),
}

impl EventInstant {
    /// The clock this instant lives on.
    pub fn time_kind(&self) -> TimeKind {
        match self {
            EventInstant::Simulation(_) => TimeKind::Simulation,
            EventInstant::Mission(_) => TimeKind::Mission,
            EventInstant::Epoch(_) => TimeKind::Epoch,
            EventInstant::Zulu(_) => TimeKind::Zulu,
        }
    }

    /// Simulation-clock equivalent under the time keeper's current offsets.
    fn to_simulation(self, time_keeper: &TimeKeeper) -> Duration {
        match self {
            EventInstant::Simulation(d) => d,
            EventInstant::Mission(d) => time_keeper.mission_to_simulation(d),
            EventInstant::Epoch(t) => time_keeper.epoch_to_simulation(t),
            EventInstant::Zulu(t) => time_keeper.zulu_to_simulation(t),
        }
    }

    /// The same instant one cycle later, on the same clock.
    fn advanced_by(self, cycle: Duration) -> Self {
        match self {
            EventInstant::Simulation(d) => EventInstant::Simulation(d + cycle),
            EventInstant::Mission(d) => EventInstant::Mission(d + cycle),
            EventInstant::Epoch(t) => EventInstant::Epoch(t + cycle),
            EventInstant::Zulu(t) => EventInstant::Zulu(t + cycle),
        }
    }
}

/// Introspection view of a live event, as returned by [`Scheduler::event`].
#[derive(Debug, Clone)]
pub struct EventSnapshot {
    /// The event's identifier.
    pub id: EventId,
    /// Qualified name of the entry point the event fires.
    pub entry_point: String,
    /// Next trigger on the event's own clock.
    pub trigger: EventInstant,
    /// Interval between cyclic firings.
    pub cycle_time: Duration,
    /// Firings left after the next one; −1 means unbounded.
    pub remaining_count: i64,
}

struct ScheduledEvent {
    entry_point: Arc<EntryPoint>,
    trigger: EventInstant,
    /// Ordering key: the trigger expressed on the simulation clock.
    deadline: Duration,
    cycle_time: Duration,
    remaining_count: i64,
    /// Present in the due-ordering queue. Cleared while the event is being
    /// fired so concurrent mutation can supersede the automatic reschedule.
    queued: bool,
}

#[derive(Default)]
struct Inner {
    events: IndexMap<EventId, ScheduledEvent>,
    /// Due ordering: ascending (deadline, id).
    queue: BTreeSet<(Duration, EventId)>,
    stopping: bool,
}

struct Core {
    inner: Mutex<Inner>,
    wakeup: Condvar,
    time_keeper: Arc<TimeKeeper>,
    logger: Arc<dyn Logger>,
}

impl Core {
    /// Body of the scheduler thread: sleep until the nearest deadline, fire
    /// everything due, reschedule, repeat until told to stop.
    fn run_loop(&self) {
        loop {
            let mut inner = self.inner.lock();
            if inner.stopping {
                break;
            }
            let now = self.time_keeper.simulation_time();

            let mut due: Vec<(EventId, Arc<EntryPoint>)> = Vec::new();
            loop {
                let Some(&(deadline, id)) = inner.queue.first() else {
                    break;
                };
                if deadline > now {
                    break;
                }
                inner.queue.remove(&(deadline, id));
                if let Some(event) = inner.events.get_mut(&id) {
                    event.queued = false;
                    due.push((id, Arc::clone(&event.entry_point)));
                }
            }

            if due.is_empty() {
                match inner.queue.first().copied() {
                    Some((deadline, _)) => {
                        let wait = (deadline - now)
                            .to_std()
                            .unwrap_or(std::time::Duration::ZERO);
                        let _ = self.wakeup.wait_for(&mut inner, wait);
                    }
                    None => self.wakeup.wait(&mut inner),
                }
                continue;
            }

            // Fire outside the lock so entry points can register, mutate or
            // cancel events (their own included) without deadlocking.
            MutexGuard::unlocked(&mut inner, || {
                for (id, entry_point) in &due {
                    tracing::trace!(event_id = id, entry_point = %entry_point.qualified_name(), "firing");
                    if let Err(panic) = run_contained(entry_point) {
                        self.logger.error(
                            &entry_point.qualified_name(),
                            &format!("entry point panicked: {panic}"),
                        );
                        tracing::error!(
                            event_id = id,
                            entry_point = %entry_point.qualified_name(),
                            panic = %panic,
                            "entry point panicked during firing"
                        );
                    }
                }
            });

            for (id, _) in due {
                self.reschedule_fired(&mut inner, id);
            }
        }
    }

    /// Post-firing maintenance for one event, under the lock.
    fn reschedule_fired(&self, inner: &mut Inner, id: EventId) {
        let Some(event) = inner.events.get_mut(&id) else {
            // Removed from within a callback.
            return;
        };
        if event.queued {
            // Re-triggered from within a callback; that trigger supersedes
            // the automatic reschedule.
            return;
        }
        if event.remaining_count == 0 {
            inner.events.shift_remove(&id);
            tracing::trace!(event_id = id, "event exhausted");
            return;
        }
        if event.remaining_count > 0 {
            event.remaining_count -= 1;
        }
        event.trigger = event.trigger.advanced_by(event.cycle_time);
        event.deadline = event.deadline + event.cycle_time;
        event.queued = true;
        let key = (event.deadline, id);
        inner.queue.insert(key);
    }
}

/// The kernel's time-based event scheduler.
///
/// Events registered here are fired by a single dedicated thread between
/// [`start`](Scheduler::start) and [`stop`](Scheduler::stop). All registration
/// and mutation calls are safe from any thread, including from a firing entry
/// point; `stop()` is the one call that must not be made from an entry point,
/// since it joins the thread the entry point runs on.
pub struct Scheduler {
    core: Arc<Core>,
    worker: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl Scheduler {
    /// A stopped scheduler reading "now" from `time_keeper` and reporting
    /// contained entry-point failures through `logger`.
    pub fn new(time_keeper: Arc<TimeKeeper>, logger: Arc<dyn Logger>) -> Self {
        Self {
            core: Arc::new(Core {
                inner: Mutex::new(Inner::default()),
                wakeup: Condvar::new(),
                time_keeper,
                logger,
            }),
            worker: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register an event firing `entry_point` at `trigger`.
    ///
    /// `count` semantics: `0` is a one-shot, `N > 0` fires `N + 1` times in
    /// total, any negative value means unbounded. A cyclic event
    /// (`count != 0`) requires a strictly positive `cycle_time`. A trigger
    /// already in the past is accepted and fires on the next scheduler pass.
    pub fn add_event(
        &self,
        entry_point: Arc<EntryPoint>,
        trigger: EventInstant,
        cycle_time: Duration,
        count: i64,
    ) -> Result<EventId> {
        if count != 0 && cycle_time <= Duration::zero() {
            return Err(KernelError::InvalidCycleTime { cycle_time });
        }
        let remaining_count = count.max(-1);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut inner = self.core.inner.lock();
            let now = self.core.time_keeper.simulation_time();
            let deadline = trigger.to_simulation(&self.core.time_keeper).max(now);
            inner.queue.insert((deadline, id));
            inner.events.insert(
                id,
                ScheduledEvent {
                    entry_point: Arc::clone(&entry_point),
                    trigger,
                    deadline,
                    cycle_time,
                    remaining_count,
                    queued: true,
                },
            );
        }
        self.core.wakeup.notify_all();
        tracing::debug!(
            event_id = id,
            entry_point = %entry_point.qualified_name(),
            kind = %trigger.time_kind(),
            count,
            "event registered"
        );
        Ok(id)
    }

    /// Register a one-shot event due immediately.
    pub fn add_immediate_event(&self, entry_point: Arc<EntryPoint>) -> Result<EventId> {
        let now = self.core.time_keeper.simulation_time();
        self.add_event(
            entry_point,
            EventInstant::Simulation(now),
            Duration::zero(),
            0,
        )
    }

    /// Register an event on the simulation clock.
    pub fn add_simulation_time_event(
        &self,
        entry_point: Arc<EntryPoint>,
        trigger: Duration,
        cycle_time: Duration,
        count: i64,
    ) -> Result<EventId> {
        self.add_event(
            entry_point,
            EventInstant::Simulation(trigger),
            cycle_time,
            count,
        )
    }

    /// Register an event on the mission clock.
    pub fn add_mission_time_event(
        &self,
        entry_point: Arc<EntryPoint>,
        trigger: Duration,
        cycle_time: Duration,
        count: i64,
    ) -> Result<EventId> {
        self.add_event(
            entry_point,
            EventInstant::Mission(trigger),
            cycle_time,
            count,
        )
    }

    /// Register an event on the epoch clock.
    pub fn add_epoch_time_event(
        &self,
        entry_point: Arc<EntryPoint>,
        trigger: DateTime<Utc>,
        cycle_time: Duration,
        count: i64,
    ) -> Result<EventId> {
        self.add_event(entry_point, EventInstant::Epoch(trigger), cycle_time, count)
    }

    /// Register an event on the zulu (wall) clock.
    pub fn add_zulu_time_event(
        &self,
        entry_point: Arc<EntryPoint>,
        trigger: DateTime<Utc>,
        cycle_time: Duration,
        count: i64,
    ) -> Result<EventId> {
        self.add_event(entry_point, EventInstant::Zulu(trigger), cycle_time, count)
    }

    /// Introspect a live event.
    pub fn event(&self, id: EventId) -> Result<EventSnapshot> {
        let inner = self.core.inner.lock();
        let event = inner.events.get(&id).ok_or(KernelError::InvalidEventId(id))?;
        Ok(EventSnapshot {
            id,
            entry_point: event.entry_point.qualified_name(),
            trigger: event.trigger,
            cycle_time: event.cycle_time,
            remaining_count: event.remaining_count,
        })
    }

    /// Number of live events.
    pub fn event_count(&self) -> usize {
        self.core.inner.lock().events.len()
    }

    /// Move a live event's next trigger.
    ///
    /// Called from the event's own callback, the new trigger supersedes the
    /// automatic reschedule for that firing (the cycle count is not
    /// consumed).
    pub fn set_trigger(&self, id: EventId, trigger: EventInstant) -> Result<()> {
        {
            let mut inner = self.core.inner.lock();
            let now = self.core.time_keeper.simulation_time();
            let deadline = trigger.to_simulation(&self.core.time_keeper).max(now);
            let event = inner
                .events
                .get_mut(&id)
                .ok_or(KernelError::InvalidEventId(id))?;
            let old_key = (event.deadline, id);
            event.trigger = trigger;
            event.deadline = deadline;
            let was_queued = std::mem::replace(&mut event.queued, true);
            if was_queued {
                inner.queue.remove(&old_key);
            }
            inner.queue.insert((deadline, id));
        }
        self.core.wakeup.notify_all();
        Ok(())
    }

    /// Change a live event's cycle time.
    ///
    /// Rejected with [`KernelError::InvalidCycleTime`] when the event is
    /// cyclic and the new duration is not strictly positive. Takes effect
    /// from the next reschedule.
    pub fn set_cycle_time(&self, id: EventId, cycle_time: Duration) -> Result<()> {
        let mut inner = self.core.inner.lock();
        let event = inner
            .events
            .get_mut(&id)
            .ok_or(KernelError::InvalidEventId(id))?;
        if event.remaining_count != 0 && cycle_time <= Duration::zero() {
            return Err(KernelError::InvalidCycleTime { cycle_time });
        }
        event.cycle_time = cycle_time;
        Ok(())
    }

    /// Change a live event's remaining count (same semantics as
    /// [`add_event`](Scheduler::add_event)).
    pub fn set_count(&self, id: EventId, count: i64) -> Result<()> {
        let mut inner = self.core.inner.lock();
        let event = inner
            .events
            .get_mut(&id)
            .ok_or(KernelError::InvalidEventId(id))?;
        if count != 0 && event.cycle_time <= Duration::zero() {
            return Err(KernelError::InvalidCycleTime {
                cycle_time: event.cycle_time,
            });
        }
        event.remaining_count = count.max(-1);
        Ok(())
    }

    /// Cancel and forget a live event. Safe from the event's own callback.
    pub fn remove_event(&self, id: EventId) -> Result<()> {
        {
            let mut inner = self.core.inner.lock();
            let event = inner
                .events
                .shift_remove(&id)
                .ok_or(KernelError::InvalidEventId(id))?;
            if event.queued {
                inner.queue.remove(&(event.deadline, id));
            }
        }
        self.core.wakeup.notify_all();
        tracing::debug!(event_id = id, "event removed");
        Ok(())
    }

    /// Start the scheduler thread.
    ///
    /// All live events are re-keyed from their own-clock triggers against the
    /// time keeper's current offsets, so a zulu or epoch trigger registered
    /// while stopped still fires at the right instant.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(KernelError::AlreadyRunning);
        }
        {
            let mut inner = self.core.inner.lock();
            inner.stopping = false;
            let now = self.core.time_keeper.simulation_time();
            let mut queue = BTreeSet::new();
            for (&id, event) in inner.events.iter_mut() {
                event.deadline = event.trigger.to_simulation(&self.core.time_keeper).max(now);
                event.queued = true;
                queue.insert((event.deadline, id));
            }
            inner.queue = queue;
        }
        let core = Arc::clone(&self.core);
        let handle = std::thread::Builder::new()
            .name("r-smk-scheduler".into())
            .spawn(move || core.run_loop())
            .map_err(KernelError::Spawn)?;
        *worker = Some(handle);
        tracing::info!("scheduler started");
        Ok(())
    }

    /// Stop the scheduler thread, blocking until it has fully quiesced: on
    /// return no entry point is executing and none will start before the
    /// next [`start`](Scheduler::start). No-op when already stopped.
    pub fn stop(&self) {
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return;
        };
        {
            let mut inner = self.core.inner.lock();
            inner.stopping = true;
        }
        self.core.wakeup.notify_all();
        if handle.join().is_err() {
            tracing::error!("scheduler thread panicked");
        }
        self.core.inner.lock().stopping = false;
        tracing::info!("scheduler stopped");
    }

    /// Whether the scheduler thread is running.
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("events", &self.event_count())
            .field("running", &self.is_running())
            .finish()
    }
}
