//! ---
//! smk_section: "02-simulation-kernel"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "The four-clock simulation time keeper."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

use crate::notifications::{KernelEvent, NotificationHub};

fn from_wall(elapsed: std::time::Duration) -> Duration {
    Duration::from_std(elapsed).unwrap_or(Duration::MAX)
}

#[derive(Debug)]
struct Inner {
    /// Simulation time accumulated over completed run intervals.
    accumulated: Duration,
    /// Wall instant of the current run interval, while progressing.
    run_anchor: Option<Instant>,
    /// Epoch instant corresponding to simulation time zero.
    epoch_base: DateTime<Utc>,
    /// Epoch instant mission time is measured from.
    mission_start: DateTime<Utc>,
}

impl Inner {
    fn simulation_time(&self) -> Duration {
        match self.run_anchor {
            Some(anchor) => self.accumulated + from_wall(anchor.elapsed()),
            None => self.accumulated,
        }
    }

    fn epoch_time(&self) -> DateTime<Utc> {
        self.epoch_base + self.simulation_time()
    }
}

/// The kernel's clock: simulation, epoch, mission and zulu time.
///
/// Simulation time starts at zero and advances at wall-clock rate between
/// [`start`](TimeKeeper::start) and [`hold`](TimeKeeper::hold); the Simulator
/// drives those from `run()`/`hold()`. Epoch time is simulation time shifted
/// by a settable base, mission time is epoch time relative to a settable
/// mission start, and zulu time is the host's wall clock regardless of
/// simulator state.
///
/// Until set, epoch base and mission start both sit at the Unix epoch.
pub struct TimeKeeper {
    inner: Mutex<Inner>,
    notifications: Arc<NotificationHub>,
}

impl TimeKeeper {
    /// A time keeper at simulation time zero, emitting time-change
    /// notifications through `notifications`.
    pub fn new(notifications: Arc<NotificationHub>) -> Self {
        let origin = Utc.timestamp_opt(0, 0).single().unwrap_or_default();
        Self {
            inner: Mutex::new(Inner {
                accumulated: Duration::zero(),
                run_anchor: None,
                epoch_base: origin,
                mission_start: origin,
            }),
            notifications,
        }
    }

    /// Elapsed simulation time.
    pub fn simulation_time(&self) -> Duration {
        self.inner.lock().simulation_time()
    }

    /// Current epoch time.
    pub fn epoch_time(&self) -> DateTime<Utc> {
        self.inner.lock().epoch_time()
    }

    /// Current mission time.
    pub fn mission_time(&self) -> Duration {
        let inner = self.inner.lock();
        inner.epoch_time() - inner.mission_start
    }

    /// Current zulu (wall-clock) time.
    pub fn zulu_time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Whether simulation time is currently progressing.
    pub fn is_running(&self) -> bool {
        self.inner.lock().run_anchor.is_some()
    }

    /// Let simulation time progress. Idempotent.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        if inner.run_anchor.is_none() {
            inner.run_anchor = Some(Instant::now());
        }
    }

    /// Freeze simulation time. Idempotent.
    pub fn hold(&self) {
        let mut inner = self.inner.lock();
        if let Some(anchor) = inner.run_anchor.take() {
            let elapsed = from_wall(anchor.elapsed());
            inner.accumulated = inner.accumulated + elapsed;
        }
    }

    /// Rebase epoch time so that the current epoch time equals `epoch`.
    ///
    /// Mission time is defined relative to epoch time, so this shifts it as
    /// well; both change notifications are emitted.
    pub fn set_epoch_time(&self, epoch: DateTime<Utc>) {
        {
            let mut inner = self.inner.lock();
            let sim = inner.simulation_time();
            inner.epoch_base = epoch - sim;
            tracing::info!(epoch = %epoch, "epoch time rebased");
        }
        // Emit outside the lock: subscribers may read the clock.
        self.notifications.emit(KernelEvent::EpochTimeChanged);
        self.notifications.emit(KernelEvent::MissionTimeChanged);
    }

    /// Set the epoch instant mission time is measured from.
    pub fn set_mission_start(&self, start: DateTime<Utc>) {
        {
            let mut inner = self.inner.lock();
            inner.mission_start = start;
            tracing::info!(mission_start = %start, "mission start set");
        }
        self.notifications.emit(KernelEvent::MissionTimeChanged);
    }

    /// Rebase mission time so that the current mission time equals `mission`.
    pub fn set_mission_time(&self, mission: Duration) {
        {
            let mut inner = self.inner.lock();
            let epoch = inner.epoch_time();
            inner.mission_start = epoch - mission;
            tracing::info!(mission_seconds = mission.num_seconds(), "mission time rebased");
        }
        self.notifications.emit(KernelEvent::MissionTimeChanged);
    }

    /// Simulation-clock equivalent of an epoch instant, under the current
    /// epoch base.
    pub fn epoch_to_simulation(&self, epoch: DateTime<Utc>) -> Duration {
        epoch - self.inner.lock().epoch_base
    }

    /// Simulation-clock equivalent of a mission duration, under the current
    /// epoch base and mission start.
    pub fn mission_to_simulation(&self, mission: Duration) -> Duration {
        let inner = self.inner.lock();
        inner.mission_start + mission - inner.epoch_base
    }

    /// Simulation-clock equivalent of a zulu instant, mapped linearly from
    /// the wall clock at the moment of the call.
    pub fn zulu_to_simulation(&self, zulu: DateTime<Utc>) -> Duration {
        self.inner.lock().simulation_time() + (zulu - Utc::now())
    }
}

impl std::fmt::Debug for TimeKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TimeKeeper")
            .field("simulation_time", &inner.simulation_time())
            .field("running", &inner.run_anchor.is_some())
            .field("epoch_base", &inner.epoch_base)
            .field("mission_start", &inner.mission_start)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::entrypoint::EntryPoint;

    fn keeper() -> TimeKeeper {
        TimeKeeper::new(Arc::new(NotificationHub::new()))
    }

    #[test]
    fn simulation_time_only_advances_between_start_and_hold() {
        let tk = keeper();
        assert_eq!(tk.simulation_time(), Duration::zero());

        tk.start();
        std::thread::sleep(std::time::Duration::from_millis(20));
        tk.hold();

        let frozen = tk.simulation_time();
        assert!(frozen >= Duration::milliseconds(20));
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(tk.simulation_time(), frozen);
    }

    #[test]
    fn epoch_rebase_shifts_mission_time() {
        let tk = keeper();
        let epoch = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).single().expect("valid date");
        tk.set_epoch_time(epoch);
        tk.set_mission_start(epoch - Duration::hours(1));

        assert_eq!(tk.epoch_time(), epoch);
        assert_eq!(tk.mission_time(), Duration::hours(1));

        // Shifting epoch forward by a minute shifts mission by the same.
        tk.set_epoch_time(epoch + Duration::minutes(1));
        assert_eq!(tk.mission_time(), Duration::hours(1) + Duration::minutes(1));
    }

    #[test]
    fn set_mission_time_rebases_mission_start() {
        let tk = keeper();
        tk.set_mission_time(Duration::seconds(90));
        assert_eq!(tk.mission_time(), Duration::seconds(90));
    }

    #[test]
    fn time_changes_notify_subscribers() {
        let hub = Arc::new(NotificationHub::new());
        let epoch_seen = Arc::new(AtomicU32::new(0));
        let mission_seen = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&epoch_seen);
        hub.subscribe(
            KernelEvent::EpochTimeChanged,
            EntryPoint::new("observer", "epoch", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let counter = Arc::clone(&mission_seen);
        hub.subscribe(
            KernelEvent::MissionTimeChanged,
            EntryPoint::new("observer", "mission", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let tk = TimeKeeper::new(hub);
        tk.set_epoch_time(Utc::now());
        tk.set_mission_start(Utc::now());
        tk.set_mission_time(Duration::seconds(5));

        assert_eq!(epoch_seen.load(Ordering::SeqCst), 1);
        assert_eq!(mission_seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn clock_conversions_are_consistent() {
        let tk = keeper();
        let epoch = Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).single().expect("valid date");
        tk.set_epoch_time(epoch);
        tk.set_mission_start(epoch);

        // An epoch instant ten seconds ahead is ten simulation seconds ahead.
        assert_eq!(
            tk.epoch_to_simulation(epoch + Duration::seconds(10)),
            Duration::seconds(10)
        );
        // Mission time zero is "now" on the simulation clock.
        assert_eq!(tk.mission_to_simulation(Duration::zero()), Duration::zero());
        assert_eq!(
            tk.mission_to_simulation(Duration::seconds(3)),
            Duration::seconds(3)
        );
    }
}
