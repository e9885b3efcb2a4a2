//! The write side: where entities go when they are deleted or at output
//! times.

use std::error::Error;
use std::fmt;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::entity::Entity;

/// Output failures. Always fatal to a run.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputError {
    /// The receiving side is gone.
    Disconnected,
    /// The receiver is not keeping up and the sink does not block.
    Full,
    /// The sink failed to write.
    Io {
        /// Description of the failure.
        reason: String,
    },
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "output receiver disconnected"),
            Self::Full => write!(f, "output channel full"),
            Self::Io { reason } => write!(f, "output failed: {reason}"),
        }
    }
}

impl Error for OutputError {}

/// Receives entity snapshots.
pub trait EntitySink: Send {
    /// Write `entities` as they are at `time`.
    fn flush(&mut self, entities: &[Entity], time: f64) -> Result<(), OutputError>;
}

/// One flushed batch.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputBatch {
    /// Output time.
    pub time: f64,
    /// Entity states at that time.
    pub entities: Vec<Entity>,
}

/// Forwards batches over a bounded channel to a writer thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<OutputBatch>,
    blocking: bool,
}

impl ChannelSink {
    /// A sink and its receiver. `flush` blocks while the channel is full.
    pub fn bounded(capacity: usize) -> (Self, Receiver<OutputBatch>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx, blocking: true }, rx)
    }

    /// Fail with [`OutputError::Full`] instead of blocking.
    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }
}

impl EntitySink for ChannelSink {
    fn flush(&mut self, entities: &[Entity], time: f64) -> Result<(), OutputError> {
        if entities.is_empty() {
            return Ok(());
        }
        let batch = OutputBatch {
            time,
            entities: entities.to_vec(),
        };
        if self.blocking {
            return self.tx.send(batch).map_err(|_| OutputError::Disconnected);
        }
        self.tx.try_send(batch).map_err(|e| match e {
            TrySendError::Full(_) => OutputError::Full,
            TrySendError::Disconnected(_) => OutputError::Disconnected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_core::EntityId;

    fn e(id: u64) -> Entity {
        Entity::new(EntityId(id), 0.0, 0.0, 0.0, 0.0)
    }

    #[test]
    fn channel_sink_forwards_batches() {
        let (mut sink, rx) = ChannelSink::bounded(4);
        sink.flush(&[e(1), e(2)], 5.0).unwrap();
        let batch = rx.recv().unwrap();
        assert_eq!(batch.time, 5.0);
        assert_eq!(batch.entities.len(), 2);
    }

    #[test]
    fn empty_flush_sends_nothing() {
        let (mut sink, rx) = ChannelSink::bounded(1);
        sink.flush(&[], 0.0).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn non_blocking_reports_full_and_disconnect() {
        let (sink, rx) = ChannelSink::bounded(1);
        let mut sink = sink.non_blocking();
        sink.flush(&[e(1)], 0.0).unwrap();
        assert_eq!(sink.flush(&[e(2)], 0.0), Err(OutputError::Full));
        drop(rx);
        assert_eq!(sink.flush(&[e(3)], 0.0), Err(OutputError::Disconnected));
    }
}
