//! ---
//! smk_section: "15-testing-qa-runbook"
//! smk_subsection: "integration-tests"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Full-stack integration tests for the R-SMK workspace."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::thread;
use std::time::Duration;

use anyhow::Result;
use r_smk_kernel::{FieldValue, KernelError, Simulator, SimulatorState};
use r_smk_models::AssemblySpec;
use r_smk_persistence::{verify_snapshot, SnapshotReader, SnapshotWriter};

const ASSEMBLY: &str = r#"
models:
  - kind: counter
    name: counter_a
    period_ms: 20
  - kind: waveform
    name: wave_a
    sample_period_ms: 30
    noise_sigma: 0.0
  - kind: node
    name: node_master
    master: true
    sync_period_ms: 25
  - kind: node
    name: node_b
  - kind: bus
    name: bus_a
    nodes: [node_master, node_b]
"#;

/// Build the shared assembly and drive it to Standby.
fn standby_simulator() -> Result<Simulator> {
    let spec: AssemblySpec = serde_yaml::from_str(ASSEMBLY)?;
    let mut simulator = Simulator::new();
    spec.build(&mut simulator)?;
    simulator.publish()?;
    simulator.configure()?;
    simulator.connect()?;
    simulator.initialise()?;
    Ok(simulator)
}

fn state_values(simulator: &Simulator) -> Vec<(String, FieldValue)> {
    simulator
        .fields()
        .state_fields()
        .map(|field| (field.qualified_name(), field.read()))
        .collect()
}

fn scalar_i64(simulator: &Simulator, owner: &str, name: &str) -> i64 {
    match simulator.fields().field(owner, name).unwrap().read() {
        FieldValue::I64(value) => value,
        other => panic!("{owner}.{name} is not an i64 field: {other:?}"),
    }
}

#[test]
fn assembled_run_advances_every_model_kind() -> Result<()> {
    let mut simulator = standby_simulator()?;
    simulator.run()?;
    thread::sleep(Duration::from_millis(200));
    simulator.hold()?;
    assert_eq!(simulator.state(), SimulatorState::Standby);

    assert!(scalar_i64(&simulator, "counter_a", "count") >= 2);
    for node in ["node_master", "node_b"] {
        let field = simulator.fields().field(node, "sync_count").unwrap();
        assert!(
            matches!(field.read(), FieldValue::U64(n) if n >= 2),
            "{node} received syncs while executing"
        );
    }

    // Holding quiesces the scheduler, so state stops moving.
    let frozen = state_values(&simulator);
    thread::sleep(Duration::from_millis(60));
    assert_eq!(state_values(&simulator), frozen);

    simulator.exit()?;
    Ok(())
}

#[test]
fn snapshot_round_trip_restores_a_cold_simulator() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("standby.json");

    let mut warm = standby_simulator()?;
    warm.run()?;
    thread::sleep(Duration::from_millis(150));
    warm.hold()?;

    let mut writer = SnapshotWriter::new();
    warm.store(&mut writer)?;
    writer.write_to(&path)?;
    assert!(verify_snapshot(&path));
    let warm_state = state_values(&warm);
    assert!(!warm_state.is_empty());
    warm.exit()?;

    // A freshly assembled simulator publishes the same fields in the same
    // order, which is what makes the spans land where they were taken.
    let mut cold = standby_simulator()?;
    assert_ne!(state_values(&cold), warm_state, "cold counters start at zero");

    let mut reader = SnapshotReader::from_path(&path)?;
    cold.restore(&mut reader)?;
    assert_eq!(reader.remaining(), 0, "every span was consumed");
    assert_eq!(state_values(&cold), warm_state);
    assert_eq!(cold.state(), SimulatorState::Standby);

    // The restored run resumes from the captured counters.
    let resumed_from = scalar_i64(&cold, "counter_a", "count");
    cold.run()?;
    thread::sleep(Duration::from_millis(80));
    cold.hold()?;
    assert!(scalar_i64(&cold, "counter_a", "count") > resumed_from);
    cold.exit()?;
    Ok(())
}

#[test]
fn exited_simulator_refuses_further_work() -> Result<()> {
    let mut simulator = standby_simulator()?;
    simulator.exit()?;
    assert_eq!(simulator.state(), SimulatorState::Exiting);

    let err = simulator.run().unwrap_err();
    assert!(matches!(err, KernelError::TerminalState { .. }));
    assert_eq!(simulator.state(), SimulatorState::Exiting);
    Ok(())
}
