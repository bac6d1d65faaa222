//! ---
//! smk_section: "02-simulation-kernel"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Kernel lifecycle notifications and subscriber dispatch."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::sync::Arc;

use parking_lot::Mutex;

use crate::entrypoint::{run_contained, EntryPoint};

/// Lifecycle notifications broadcast by the kernel.
///
/// Numeric identifiers are stable and part of the external contract; new
/// notifications get fresh numbers, existing ones never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum KernelEvent {
    /// The simulator left Connecting.
    LeaveConnecting,
    /// The simulator entered Initialising.
    EnterInitialising,
    /// The simulator left Initialising.
    LeaveInitialising,
    /// The simulator entered Standby.
    EnterStandby,
    /// The simulator left Standby.
    LeaveStandby,
    /// The simulator entered Executing.
    EnterExecuting,
    /// The simulator left Executing.
    LeaveExecuting,
    /// The simulator entered Storing.
    EnterStoring,
    /// The simulator left Storing.
    LeaveStoring,
    /// The simulator entered Restoring.
    EnterRestoring,
    /// The simulator left Restoring.
    LeaveRestoring,
    /// The simulator entered Exiting.
    EnterExiting,
    /// The simulator entered Aborting.
    EnterAborting,
    /// Epoch time was rebased.
    EpochTimeChanged,
    /// Mission time was rebased.
    MissionTimeChanged,
}

impl KernelEvent {
    /// Stable numeric identifier of this notification.
    pub fn id(&self) -> u32 {
        match self {
            KernelEvent::LeaveConnecting => 1,
            KernelEvent::EnterInitialising => 2,
            KernelEvent::LeaveInitialising => 3,
            KernelEvent::EnterStandby => 4,
            KernelEvent::LeaveStandby => 5,
            KernelEvent::EnterExecuting => 6,
            KernelEvent::LeaveExecuting => 7,
            KernelEvent::EnterStoring => 8,
            KernelEvent::LeaveStoring => 9,
            KernelEvent::EnterRestoring => 10,
            KernelEvent::LeaveRestoring => 11,
            KernelEvent::EnterExiting => 12,
            KernelEvent::EnterAborting => 13,
            KernelEvent::EpochTimeChanged => 14,
            KernelEvent::MissionTimeChanged => 15,
        }
    }
}

/// External observer of kernel notifications.
///
/// Sinks see every emission regardless of kind and must not panic; use an
/// entry-point subscription for per-kind callbacks with containment.
pub trait NotificationSink: Send + Sync {
    /// Called once per emitted notification, on the emitting thread.
    fn notify(&self, event: KernelEvent);
}

struct Subscription {
    event: KernelEvent,
    entry_point: Arc<EntryPoint>,
}

/// Fan-out point for [`KernelEvent`] notifications.
///
/// Subscribers run synchronously on the emitting thread, in subscription
/// order. A panicking subscriber is contained and logged; the remaining
/// subscribers still run.
#[derive(Default)]
pub struct NotificationHub {
    subscriptions: Mutex<Vec<Subscription>>,
    sinks: Mutex<Vec<Arc<dyn NotificationSink>>>,
}

impl NotificationHub {
    /// An empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink that observes every notification.
    pub fn add_sink(&self, sink: Arc<dyn NotificationSink>) {
        self.sinks.lock().push(sink);
    }

    /// Subscribe `entry_point` to `event`.
    ///
    /// The same entry point may subscribe to several events, and several
    /// entry points to the same event.
    pub fn subscribe(&self, event: KernelEvent, entry_point: Arc<EntryPoint>) {
        tracing::debug!(
            event = %event,
            subscriber = %entry_point.qualified_name(),
            "notification subscription added"
        );
        self.subscriptions
            .lock()
            .push(Subscription { event, entry_point });
    }

    /// Broadcast `event` to all registered sinks, then to all matching
    /// subscribers.
    pub fn emit(&self, event: KernelEvent) {
        tracing::debug!(event = %event, id = event.id(), "kernel notification");
        // Snapshot under the lock so a subscriber may subscribe or emit
        // without deadlocking; late subscribers see the next emission.
        let sinks: Vec<Arc<dyn NotificationSink>> = self.sinks.lock().clone();
        for sink in sinks {
            sink.notify(event);
        }
        let targets: Vec<Arc<EntryPoint>> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|s| s.event == event)
            .map(|s| Arc::clone(&s.entry_point))
            .collect();
        for entry_point in targets {
            if let Err(panic) = run_contained(&entry_point) {
                tracing::error!(
                    event = %event,
                    subscriber = %entry_point.qualified_name(),
                    panic = %panic,
                    "notification subscriber panicked"
                );
            }
        }
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("subscriptions", &self.subscriptions.lock().len())
            .field("sinks", &self.sinks.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn identifiers_are_unique_and_dense() {
        let ids: HashSet<u32> = KernelEvent::iter().map(|e| e.id()).collect();
        assert_eq!(ids.len(), KernelEvent::iter().count());
        assert_eq!(ids.iter().min(), Some(&1));
        assert_eq!(ids.iter().max(), Some(&15));
    }

    #[test]
    fn emit_reaches_matching_subscribers_in_order() {
        let hub = NotificationHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            hub.subscribe(
                KernelEvent::EnterStandby,
                EntryPoint::new("watcher", tag, move || seen.lock().push(tag)),
            );
        }
        hub.subscribe(
            KernelEvent::EnterExecuting,
            EntryPoint::new("watcher", "other", || panic!("must not fire")),
        );

        hub.emit(KernelEvent::EnterStandby);
        assert_eq!(*seen.lock(), ["first", "second"]);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_the_broadcast() {
        let hub = NotificationHub::new();
        let fired = Arc::new(AtomicU32::new(0));

        hub.subscribe(
            KernelEvent::EpochTimeChanged,
            EntryPoint::new("clock", "bad", || panic!("subscriber failure")),
        );
        let fired_clone = Arc::clone(&fired);
        hub.subscribe(
            KernelEvent::EpochTimeChanged,
            EntryPoint::new("clock", "good", move || {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        hub.emit(KernelEvent::EpochTimeChanged);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sinks_observe_every_notification() {
        struct Recorder(Mutex<Vec<u32>>);
        impl NotificationSink for Recorder {
            fn notify(&self, event: KernelEvent) {
                self.0.lock().push(event.id());
            }
        }

        let hub = NotificationHub::new();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        hub.add_sink(recorder.clone());

        hub.emit(KernelEvent::LeaveStandby);
        hub.emit(KernelEvent::EnterExecuting);
        assert_eq!(*recorder.0.lock(), [5, 6]);
    }
}
