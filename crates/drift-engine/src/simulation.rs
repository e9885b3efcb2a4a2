//! A run driver on top of [`ExecutionEngine`].
//!
//! [`Simulation::run`] splits `[start, end_time]` into segments that end at
//! the next snapshot boundary, the next output time or `end_time`,
//! whichever comes first along the direction of travel. Before each
//! segment it pushes every field window forward with
//! [`FieldSet::advance_time`]; at each output time it writes the whole
//! entity set to the sink.

use std::error::Error;
use std::fmt;

use drift_field::{FieldError, FieldSet};

use crate::config::ConfigError;
use crate::engine::{ExecuteError, ExecuteOutcome, ExecutionEngine};
use crate::entity::EntitySet;
use crate::output::{EntitySink, OutputError};

/// Run settings.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Signed step; negative runs backward in time.
    pub dt: f64,
    /// Interval between full-set outputs. `None` writes only deletions.
    pub output_dt: Option<f64>,
}

impl SimulationConfig {
    /// Settings with step `dt` and no periodic output.
    pub fn new(dt: f64) -> Self {
        Self { dt, output_dt: None }
    }

    /// Write the full set every `interval`.
    pub fn with_output_dt(mut self, interval: f64) -> Self {
        self.output_dt = Some(interval);
        self
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.dt.is_finite() || self.dt == 0.0 {
            return Err(ConfigError::InvalidStep { value: self.dt });
        }
        if let Some(interval) = self.output_dt {
            if !interval.is_finite() || interval <= 0.0 {
                return Err(ConfigError::InvalidOutputInterval { value: interval });
            }
        }
        Ok(())
    }
}

/// Errors ending a run.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// A window advance failed.
    Field(FieldError),
    /// An `execute` call or an output write failed.
    Execute(ExecuteError),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(e) => write!(f, "simulation failed: {e}"),
            Self::Execute(e) => write!(f, "simulation failed: {e}"),
        }
    }
}

impl Error for SimulationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Field(e) => Some(e),
            Self::Execute(e) => Some(e),
        }
    }
}

impl From<FieldError> for SimulationError {
    fn from(e: FieldError) -> Self {
        Self::Field(e)
    }
}

impl From<ExecuteError> for SimulationError {
    fn from(e: ExecuteError) -> Self {
        Self::Execute(e)
    }
}

impl From<OutputError> for SimulationError {
    fn from(e: OutputError) -> Self {
        Self::Execute(ExecuteError::Output(e))
    }
}

/// What a [`Simulation::run`] call did.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    /// Simulation time reached.
    pub time: f64,
    /// `Stopped` if an entity stopped the run.
    pub outcome: ExecuteOutcome,
    /// `execute` calls made.
    pub segments: u32,
    /// Full-set outputs written.
    pub outputs: u32,
    /// Entities deleted.
    pub deleted: usize,
    /// Recovery functions invoked.
    pub recovered: usize,
    /// Chunks evicted.
    pub evicted: usize,
}

/// Same instant, allowing for accumulated rounding.
fn same_time(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * (1.0 + b.abs())
}

/// Owns the fields, entities and sink of one run.
pub struct Simulation {
    engine: ExecutionEngine,
    fields: FieldSet,
    entities: EntitySet,
    sink: Option<Box<dyn EntitySink>>,
    config: SimulationConfig,
    time: Option<f64>,
    next_output: Option<f64>,
}

impl Simulation {
    /// A simulation. Entities keep their own `dt` when it points along
    /// `config.dt`, and adopt `config.dt` otherwise.
    pub fn new(
        engine: ExecutionEngine,
        fields: FieldSet,
        entities: EntitySet,
        config: SimulationConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            engine,
            fields,
            entities,
            sink: None,
            config,
            time: None,
            next_output: None,
        })
    }

    /// Send deletions and outputs to `sink`.
    pub fn with_sink(mut self, sink: impl EntitySink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// The engine.
    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// The field set.
    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// The live entities.
    pub fn entities(&self) -> &EntitySet {
        &self.entities
    }

    /// The live entities, for releasing more.
    pub fn entities_mut(&mut self) -> &mut EntitySet {
        &mut self.entities
    }

    /// Simulation time, once a run has started.
    pub fn time(&self) -> Option<f64> {
        self.time
    }

    /// Run until `end_time` or until an entity stops the run.
    ///
    /// The first run starts at the earliest entity time (latest when
    /// running backward). Later runs continue from where the previous one
    /// ended.
    pub fn run(&mut self, end_time: f64) -> Result<RunSummary, SimulationError> {
        let dt = self.config.dt;
        let sign = dt.signum();
        let mut time = match self.time {
            Some(t) => t,
            None => self.start_time().unwrap_or(end_time),
        };
        if self.next_output.is_none() {
            self.next_output = self.config.output_dt.map(|_| time);
        }

        let mut summary = RunSummary {
            time,
            outcome: ExecuteOutcome::Completed,
            segments: 0,
            outputs: 0,
            deleted: 0,
            recovered: 0,
            evicted: 0,
        };
        tracing::info!(
            start = time,
            end = end_time,
            dt,
            entities = self.entities.len(),
            kernel = self.engine.kernel_name(),
            "simulation run"
        );

        let mut next_input = self.fields.advance_time(time, dt)?;
        loop {
            if self.output_due(time) {
                self.write_output(time)?;
                summary.outputs += 1;
            }
            if (end_time - time) * sign <= 0.0 || same_time(time, end_time) {
                break;
            }
            if self.entities.is_empty() {
                tracing::debug!(time, "no entities left");
                time = end_time;
                break;
            }

            let mut next = end_time;
            for candidate in [Some(next_input), self.next_output].into_iter().flatten() {
                if (candidate - time) * sign > 0.0 && (candidate - next) * sign < 0.0 {
                    next = candidate;
                }
            }

            let sink = self
                .sink
                .as_mut()
                .map(|s| &mut **s as &mut dyn EntitySink);
            let result = self
                .engine
                .execute(&mut self.entities, &self.fields, next, dt, sink)?;
            summary.segments += 1;
            summary.deleted += result.metrics.deleted;
            summary.recovered += result.metrics.recovered;
            summary.evicted += result.metrics.evicted;
            if result.outcome == ExecuteOutcome::Stopped {
                summary.outcome = ExecuteOutcome::Stopped;
                break;
            }
            time = next;

            if (next_input - time) * sign <= 0.0 || same_time(time, next_input) {
                next_input = self.fields.advance_time(time, dt)?;
            }
        }

        self.time = Some(time);
        summary.time = time;
        Ok(summary)
    }

    fn start_time(&self) -> Option<f64> {
        let times = self.entities.iter().map(|e| e.time);
        if self.config.dt > 0.0 {
            times.reduce(f64::min)
        } else {
            times.reduce(f64::max)
        }
    }

    fn output_due(&self, time: f64) -> bool {
        self.next_output.is_some_and(|t| same_time(t, time))
    }

    fn write_output(&mut self, time: f64) -> Result<(), OutputError> {
        if let (Some(next), Some(interval)) = (self.next_output, self.config.output_dt) {
            self.next_output = Some(next + interval * self.config.dt.signum());
        }
        tracing::debug!(time, entities = self.entities.len(), "writing output");
        match self.sink.as_mut() {
            Some(sink) => sink.flush(self.entities.as_slice(), time),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("engine", &self.engine)
            .field("entities", &self.entities.len())
            .field("config", &self.config)
            .field("time", &self.time)
            .finish()
    }
}
