//! Trigger matching: stateless regex evaluation over trigger definitions
//! plus the small per-activation runtime counters that gate firing.

mod matcher;

pub use matcher::{ExpandedMatch, expand_position_placeholders, gate_counters, match_trigger_line};

use std::time::Instant;

/// Per-activation mutable trigger state. Reset whenever the owning scope is
/// (re)activated: subroutine entry, timeline load, global reload.
#[derive(Debug, Default, Clone)]
pub struct TriggerRuntime {
    /// Total regex matches seen this activation.
    pub matched_counter: u32,
    /// Wall time of the last accepted match (sync_interval gating).
    pub matched_at: Option<Instant>,
    /// HP-sync triggers fire once per activation.
    pub hp_fired: bool,
    /// Position-sync triggers rate-limit on their own interval.
    pub last_position_fire: Option<Instant>,
}
