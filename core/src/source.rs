//! External interface seams: the log-line source and the actor-state source.
//!
//! The engine never reads game files or memory itself. A host supplies
//! normalized `(timestamp, text, seq)` records through [`LogSource`] and
//! point-in-time combatant snapshots through [`ActorSource`]; both are
//! consumed in a pull fashion so the engine controls its own cadence.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::NaiveDateTime;

/// Sentinel coordinate meaning "this axis is unconstrained" in a
/// position-sync condition.
pub const INVALID_POSITION: f64 = -9999.0;

/// One normalized log line.
///
/// The supplier is responsible for stripping tooltip/world-name noise and
/// de-duplicating consecutive identical lines; the engine treats `text` as
/// ready for regex matching. `seq` is a monotonically increasing ordinal
/// used to order notifications emitted from the same batch.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: NaiveDateTime,
    pub text: String,
    pub seq: u64,
}

impl LogRecord {
    pub fn new(timestamp: NaiveDateTime, text: impl Into<String>, seq: u64) -> Self {
        Self {
            timestamp,
            text: text.into(),
            seq,
        }
    }
}

/// Pull-based supplier of log batches. Draining an empty source returns an
/// empty vec, never blocks.
pub trait LogSource: Send + Sync {
    fn drain_batch(&self, max: usize) -> Vec<LogRecord>;
}

/// A snapshot of one combatant, as reported by the actor-state source.
#[derive(Debug, Clone)]
pub struct ActorSnapshot {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub hp: u64,
    pub max_hp: u64,
    pub casting: bool,
    pub cast_name: Option<String>,
    pub cast_target: Option<String>,
}

impl ActorSnapshot {
    /// HP as a fraction of max, or zero when max is unknown.
    pub fn hp_fraction(&self) -> f64 {
        if self.max_hp == 0 {
            0.0
        } else {
            self.hp as f64 / self.max_hp as f64
        }
    }
}

/// Point-in-time query over the current combatant roster. Used only by the
/// position/HP sync subsystem, on its own cadence.
pub trait ActorSource: Send + Sync {
    fn snapshot(&self) -> Vec<ActorSnapshot>;
}

/// In-memory [`LogSource`] backed by a mutex-guarded queue.
///
/// The CLI's tail task and the test suites push records in; the detection
/// loop drains them in batches.
#[derive(Debug, Default)]
pub struct QueueLogSource {
    queue: Mutex<VecDeque<LogRecord>>,
}

impl QueueLogSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: LogRecord) {
        self.queue.lock().unwrap().push_back(record);
    }

    pub fn push_all(&self, records: impl IntoIterator<Item = LogRecord>) {
        let mut q = self.queue.lock().unwrap();
        q.extend(records);
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }
}

impl LogSource for QueueLogSource {
    fn drain_batch(&self, max: usize) -> Vec<LogRecord> {
        let mut q = self.queue.lock().unwrap();
        let take = max.min(q.len());
        q.drain(..take).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn rec(text: &str, seq: u64) -> LogRecord {
        LogRecord::new(Local::now().naive_local(), text, seq)
    }

    #[test]
    fn test_drain_respects_max_and_order() {
        let source = QueueLogSource::new();
        source.push_all([rec("a", 0), rec("b", 1), rec("c", 2)]);

        let batch = source.drain_batch(2);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].text, "a");
        assert_eq!(batch[1].text, "b");
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_drain_empty_returns_empty() {
        let source = QueueLogSource::new();
        assert!(source.drain_batch(64).is_empty());
    }

    #[test]
    fn test_hp_fraction_handles_zero_max() {
        let actor = ActorSnapshot {
            name: "Boss".into(),
            x: 0.0,
            y: 0.0,
            z: 0.0,
            hp: 50,
            max_hp: 0,
            casting: false,
            cast_name: None,
            cast_target: None,
        };
        assert_eq!(actor.hp_fraction(), 0.0);
    }
}
