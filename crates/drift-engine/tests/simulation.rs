//! Multi-segment runs across snapshot boundaries and output times.

use std::sync::Arc;

use drift_engine::{
    ConfigError, EngineConfig, EntitySet, ExecuteOutcome, ExecutionEngine, Simulation,
    SimulationConfig,
};
use drift_field::{Field, FieldSet};
use drift_test_utils::fixtures::{advect_euler, stop_when};
use drift_test_utils::{uniform_grid, MemoryStore, RecordingSink};

fn slow_flow(u: Arc<MemoryStore>) -> FieldSet {
    let grid = uniform_grid(10, 4, 1, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0], [1, 4, 10]);
    let mut fields = FieldSet::new();
    fields
        .add_field(Field::builder("U").grid(Arc::clone(&grid)).store(u).build().unwrap())
        .unwrap();
    fields
        .add_field(
            Field::builder("V")
                .grid(grid)
                .store(Arc::new(MemoryStore::constant(6, 0.0)))
                .build()
                .unwrap(),
        )
        .unwrap();
    fields
}

fn entities_at(time: f64) -> EntitySet {
    let mut set = EntitySet::new();
    set.release(time, 0.0, 1.0, 1.0);
    set.release(time, 0.0, 2.0, 2.0);
    set
}

fn sequential() -> EngineConfig {
    EngineConfig {
        parallel: false,
        ..EngineConfig::default()
    }
}

#[test]
fn forward_run_writes_outputs_and_slides_windows() {
    let u = Arc::new(MemoryStore::constant(6, 0.5));
    let fields = slow_flow(Arc::clone(&u));
    let engine = ExecutionEngine::new(advect_euler("U", "V"), sequential()).unwrap();
    let sink = RecordingSink::new();
    let mut sim = Simulation::new(
        engine,
        fields,
        entities_at(0.0),
        SimulationConfig::new(0.5).with_output_dt(1.0),
    )
    .unwrap()
    .with_sink(sink.clone());

    let summary = sim.run(4.0).unwrap();

    assert_eq!(summary.outcome, ExecuteOutcome::Completed);
    assert_eq!(summary.time, 4.0);
    assert_eq!(summary.segments, 4);
    assert_eq!(summary.outputs, 5);
    assert_eq!(sink.times(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    assert!(sink.batches().iter().all(|b| b.entities.len() == 2));

    let xs: Vec<f64> = sim.entities().iter().map(|e| e.x).collect();
    assert_eq!(xs, vec![3.0, 4.0]);

    // Windows [0,2], [1,3], [2,4], [3,5]: six opens, three closes.
    assert_eq!(u.opens(), 6);
    assert_eq!(u.closes(), 3);
    assert_eq!(u.open_indices(), vec![3, 4, 5]);
    assert_eq!(sim.time(), Some(4.0));
}

#[test]
fn later_runs_continue_from_previous_end() {
    let fields = slow_flow(Arc::new(MemoryStore::constant(6, 0.5)));
    let engine = ExecutionEngine::new(advect_euler("U", "V"), sequential()).unwrap();
    let mut sim =
        Simulation::new(engine, fields, entities_at(0.0), SimulationConfig::new(0.25)).unwrap();

    sim.run(1.5).unwrap();
    let summary = sim.run(3.0).unwrap();
    assert_eq!(summary.time, 3.0);
    assert!(sim.entities().iter().all(|e| e.time == 3.0));
    assert_eq!(sim.entities().as_slice()[0].x, 2.5);
}

#[test]
fn backward_run_starts_at_latest_entity() {
    let fields = slow_flow(Arc::new(MemoryStore::constant(6, 0.5)));
    let engine = ExecutionEngine::new(advect_euler("U", "V"), sequential()).unwrap();
    let mut set = EntitySet::new();
    set.release(4.0, 0.0, 1.0, 5.0);
    set.release(5.0, 0.0, 1.0, 6.0);
    let mut sim = Simulation::new(engine, fields, set, SimulationConfig::new(-0.5)).unwrap();

    let summary = sim.run(1.0).unwrap();
    assert_eq!(summary.time, 1.0);
    let xs: Vec<f64> = sim.entities().iter().map(|e| e.x).collect();
    assert_eq!(xs, vec![3.5, 4.0]);
    assert!(sim.entities().iter().all(|e| e.time == 1.0));
}

#[test]
fn stop_ends_the_run_early() {
    let fields = slow_flow(Arc::new(MemoryStore::constant(6, 0.5)));
    let engine =
        ExecutionEngine::new(stop_when(|e| e.time >= 2.0), sequential()).unwrap();
    let mut sim =
        Simulation::new(engine, fields, entities_at(0.0), SimulationConfig::new(0.5)).unwrap();

    let summary = sim.run(5.0).unwrap();
    assert_eq!(summary.outcome, ExecuteOutcome::Stopped);
    assert!(summary.time < 5.0);
}

#[test]
fn invalid_settings_are_rejected() {
    let engine = || ExecutionEngine::new(advect_euler("U", "V"), sequential()).unwrap();
    let zero = Simulation::new(engine(), FieldSet::new(), EntitySet::new(), SimulationConfig::new(0.0));
    assert_eq!(zero.err(), Some(ConfigError::InvalidStep { value: 0.0 }));

    let negative_output = SimulationConfig::new(1.0).with_output_dt(-1.0);
    assert_eq!(
        negative_output.validate(),
        Err(ConfigError::InvalidOutputInterval { value: -1.0 })
    );
}
