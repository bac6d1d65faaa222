//! ---
//! smk_section: "02-simulation-kernel"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Behavioural tests for the scheduler thread."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration as StdDuration;

use chrono::Duration;
use parking_lot::Mutex;
use r_smk_kernel::{
    EntryPoint, EventId, KernelError, NotificationHub, Scheduler, TimeKeeper, TracingLogger,
};

fn rig() -> (Arc<TimeKeeper>, Arc<Scheduler>) {
    let time_keeper = Arc::new(TimeKeeper::new(Arc::new(NotificationHub::new())));
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&time_keeper),
        Arc::new(TracingLogger),
    ));
    (time_keeper, scheduler)
}

fn counting_entry_point(name: &str, counter: &Arc<AtomicU64>) -> Arc<EntryPoint> {
    let counter = Arc::clone(counter);
    EntryPoint::new("test_model", name, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn one_shot_fires_once_and_is_forgotten() {
    let (time_keeper, scheduler) = rig();
    let fired = Arc::new(AtomicU64::new(0));

    let id = scheduler
        .add_simulation_time_event(
            counting_entry_point("once", &fired),
            Duration::milliseconds(10),
            Duration::zero(),
            0,
        )
        .unwrap();

    time_keeper.start();
    scheduler.start().unwrap();
    sleep(StdDuration::from_millis(100));
    scheduler.stop();
    time_keeper.hold();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(matches!(
        scheduler.event(id),
        Err(KernelError::InvalidEventId(_))
    ));
}

#[test]
fn bounded_cyclic_fires_count_plus_one_times() {
    let (time_keeper, scheduler) = rig();
    let times: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));

    let recorder = {
        let times = Arc::clone(&times);
        let clock = Arc::clone(&time_keeper);
        EntryPoint::new("test_model", "tick", move || {
            times.lock().push(clock.simulation_time());
        })
    };
    let id = scheduler
        .add_simulation_time_event(recorder, Duration::milliseconds(30), Duration::milliseconds(30), 2)
        .unwrap();

    time_keeper.start();
    scheduler.start().unwrap();
    sleep(StdDuration::from_millis(300));
    scheduler.stop();
    time_keeper.hold();

    let times = times.lock();
    assert_eq!(times.len(), 3, "count = 2 means three firings in total");
    // Successive firings are separated by roughly the cycle, with slack for
    // scheduling jitter.
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::milliseconds(15));
    }
    assert!(matches!(
        scheduler.event(id),
        Err(KernelError::InvalidEventId(_))
    ));
}

#[test]
fn unbounded_event_runs_until_removed_from_its_own_callback() {
    let (time_keeper, scheduler) = rig();
    let fired = Arc::new(AtomicU64::new(0));
    let own_id: Arc<Mutex<Option<EventId>>> = Arc::new(Mutex::new(None));

    let entry_point = {
        let fired = Arc::clone(&fired);
        let own_id = Arc::clone(&own_id);
        let handle = Arc::clone(&scheduler);
        EntryPoint::new("test_model", "self_removing", move || {
            let n = fired.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= 3 {
                if let Some(id) = *own_id.lock() {
                    handle.remove_event(id).unwrap();
                }
            }
        })
    };
    let id = scheduler
        .add_simulation_time_event(
            entry_point,
            Duration::milliseconds(10),
            Duration::milliseconds(10),
            -1,
        )
        .unwrap();
    *own_id.lock() = Some(id);

    time_keeper.start();
    scheduler.start().unwrap();
    sleep(StdDuration::from_millis(200));
    scheduler.stop();
    time_keeper.hold();

    assert_eq!(fired.load(Ordering::SeqCst), 3, "removal took effect mid-flight");
    assert!(matches!(
        scheduler.event(id),
        Err(KernelError::InvalidEventId(_))
    ));
}

#[test]
fn due_order_is_deadline_then_registration() {
    let (time_keeper, scheduler) = rig();
    let order: Arc<Mutex<Vec<char>>> = Arc::new(Mutex::new(Vec::new()));

    let tagged = |tag: char| {
        let order = Arc::clone(&order);
        EntryPoint::new("test_model", format!("tag_{tag}"), move || {
            order.lock().push(tag);
        })
    };
    // A and B share a deadline later than C's; registration order A, B, C.
    scheduler
        .add_simulation_time_event(tagged('A'), Duration::milliseconds(40), Duration::zero(), 0)
        .unwrap();
    scheduler
        .add_simulation_time_event(tagged('B'), Duration::milliseconds(40), Duration::zero(), 0)
        .unwrap();
    scheduler
        .add_simulation_time_event(tagged('C'), Duration::milliseconds(20), Duration::zero(), 0)
        .unwrap();

    time_keeper.start();
    scheduler.start().unwrap();
    sleep(StdDuration::from_millis(150));
    scheduler.stop();
    time_keeper.hold();

    assert_eq!(*order.lock(), ['C', 'A', 'B']);
}

#[test]
fn stop_quiesces_even_with_due_events() {
    let (time_keeper, scheduler) = rig();
    let fired = Arc::new(AtomicU64::new(0));

    scheduler
        .add_simulation_time_event(
            counting_entry_point("busy", &fired),
            Duration::milliseconds(5),
            Duration::milliseconds(5),
            -1,
        )
        .unwrap();

    time_keeper.start();
    scheduler.start().unwrap();
    sleep(StdDuration::from_millis(60));
    scheduler.stop();

    let at_stop = fired.load(Ordering::SeqCst);
    assert!(at_stop > 0, "event was live before the stop");
    sleep(StdDuration::from_millis(60));
    assert_eq!(
        fired.load(Ordering::SeqCst),
        at_stop,
        "no firings after stop() returned"
    );
    time_keeper.hold();
}

#[test]
fn events_survive_stop_and_restart() -> anyhow::Result<()> {
    let (time_keeper, scheduler) = rig();
    let fired = Arc::new(AtomicU64::new(0));

    let id = scheduler.add_simulation_time_event(
        counting_entry_point("persistent", &fired),
        Duration::milliseconds(10),
        Duration::milliseconds(10),
        -1,
    )?;

    time_keeper.start();
    scheduler.start()?;
    sleep(StdDuration::from_millis(60));
    scheduler.stop();
    time_keeper.hold();

    let first_leg = fired.load(Ordering::SeqCst);
    assert!(first_leg > 0);
    // The registration outlives the thread.
    assert!(scheduler.event(id).is_ok());

    time_keeper.start();
    scheduler.start()?;
    sleep(StdDuration::from_millis(60));
    scheduler.stop();
    time_keeper.hold();

    assert!(
        fired.load(Ordering::SeqCst) > first_leg,
        "firing resumed after restart"
    );
    Ok(())
}

#[test]
fn epoch_clock_events_fire_at_the_epoch_instant() {
    let (time_keeper, scheduler) = rig();
    let fired = Arc::new(AtomicU64::new(0));

    time_keeper.set_epoch_time(chrono::Utc::now());
    let trigger = time_keeper.epoch_time() + Duration::milliseconds(30);
    scheduler
        .add_epoch_time_event(
            counting_entry_point("epoch", &fired),
            trigger,
            Duration::zero(),
            0,
        )
        .unwrap();

    time_keeper.start();
    scheduler.start().unwrap();
    sleep(StdDuration::from_millis(120));
    scheduler.stop();
    time_keeper.hold();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn panicking_entry_point_does_not_take_down_siblings() {
    let (time_keeper, scheduler) = rig();
    let fired = Arc::new(AtomicU64::new(0));

    scheduler
        .add_simulation_time_event(
            EntryPoint::new("test_model", "faulty", || panic!("callback failure")),
            Duration::milliseconds(10),
            Duration::milliseconds(20),
            -1,
        )
        .unwrap();
    scheduler
        .add_simulation_time_event(
            counting_entry_point("sibling", &fired),
            Duration::milliseconds(10),
            Duration::milliseconds(20),
            -1,
        )
        .unwrap();

    time_keeper.start();
    scheduler.start().unwrap();
    sleep(StdDuration::from_millis(110));
    scheduler.stop();
    time_keeper.hold();

    assert!(
        fired.load(Ordering::SeqCst) >= 2,
        "sibling kept firing across the faulty event's panics"
    );
}
