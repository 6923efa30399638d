//! The process-wide variable table.
//!
//! Pure storage plus the predicate/set/clear operations; which triggers
//! re-evaluate on change is the controller's business, subscribed through
//! the watch channel.

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};
use hashbrown::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

use super::{GLOBAL_ZONE, VarPredicate, VarSet, VarValue};

/// One stored variable.
#[derive(Debug, Clone)]
struct Variable {
    value: VarValue,
    /// `None` = never expires.
    expires_at: Option<NaiveDateTime>,
    /// `""` = ephemeral (purged on any zone change), a zone name, or
    /// [`GLOBAL_ZONE`].
    zone: String,
}

impl Variable {
    fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Read-only snapshot of one variable, for status displays and scripts.
#[derive(Debug, Clone)]
pub struct VariableView {
    pub name: String,
    pub value: VarValue,
    pub zone: String,
    pub expires_at: Option<NaiveDateTime>,
}

/// Guarded key/value map with expiration and zone scoping.
///
/// Every successful mutation bumps the generation counter published on the
/// watch channel so guard-bearing consumers can re-evaluate.
#[derive(Debug)]
pub struct VariableStore {
    inner: Mutex<HashMap<String, Variable>>,
    generation: watch::Sender<u64>,
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableStore {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            inner: Mutex::new(HashMap::new()),
            generation,
        }
    }

    /// Subscribe to mutation notifications. The payload is a generation
    /// counter; consumers only care that it changed.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    fn bump(&self) {
        self.generation.send_modify(|g| *g = g.wrapping_add(1));
    }

    /// Current value of a variable, or `None` when absent or expired.
    pub fn get(&self, name: &str) -> Option<VarValue> {
        self.get_at(name, Local::now().naive_local())
    }

    pub fn get_at(&self, name: &str, now: NaiveDateTime) -> Option<VarValue> {
        let inner = self.inner.lock().unwrap();
        inner
            .get(name)
            .filter(|v| !v.is_expired(now))
            .map(|v| v.value.clone())
    }

    /// Direct assignment, bypassing trigger matching (text command surface).
    pub fn set_direct(&self, name: &str, value: VarValue, zone: &str) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.insert(
                name.to_string(),
                Variable {
                    value,
                    expires_at: None,
                    zone: zone.to_string(),
                },
            );
        }
        self.bump();
    }

    /// Evaluate an AND-predicate over `(name, expected)` clauses.
    ///
    /// An absent or expired variable reads as the expected type's zero
    /// value; the comparison never fails on a missing entry.
    pub fn predicate(&self, clauses: &[VarPredicate]) -> bool {
        self.predicate_at(clauses, Local::now().naive_local())
    }

    pub fn predicate_at(&self, clauses: &[VarPredicate], now: NaiveDateTime) -> bool {
        let inner = self.inner.lock().unwrap();
        clauses.iter().all(|clause| {
            let current = inner
                .get(&clause.name)
                .filter(|v| !v.is_expired(now))
                .map(|v| v.value.clone());
            match clause.count {
                Some(expected) => current.map(|v| v.as_int()).unwrap_or(0) == expected,
                None => current
                    .unwrap_or_else(|| VarValue::zero_like(&clause.expect))
                    .matches(&clause.expect),
            }
        })
    }

    /// Apply a list of `set` mutations. `default_zone` tags values whose set
    /// block does not name a zone.
    pub fn apply_sets(&self, sets: &[VarSet], default_zone: &str) {
        self.apply_sets_at(sets, default_zone, Local::now().naive_local());
    }

    pub fn apply_sets_at(&self, sets: &[VarSet], default_zone: &str, now: NaiveDateTime) {
        if sets.is_empty() {
            return;
        }
        {
            let mut inner = self.inner.lock().unwrap();
            for set in sets {
                let zone = set.zone.clone().unwrap_or_else(|| default_zone.to_string());
                let expires_at = set
                    .ttl_secs
                    .map(|secs| now + ChronoDuration::milliseconds((secs * 1000.0) as i64));

                let value = if set.toggle {
                    // Read-current-then-invert; expired/missing reads false.
                    let current = inner
                        .get(&set.name)
                        .filter(|v| !v.is_expired(now))
                        .map(|v| v.value.as_bool())
                        .unwrap_or(false);
                    VarValue::Bool(!current)
                } else if let Some(count) = &set.count {
                    match count.resolve() {
                        Some((true, delta)) => {
                            let current = inner
                                .get(&set.name)
                                .filter(|v| !v.is_expired(now))
                                .map(|v| v.value.as_int())
                                .unwrap_or(0);
                            VarValue::Int(current + delta)
                        }
                        Some((false, absolute)) => VarValue::Int(absolute),
                        None => {
                            tracing::warn!(name = %set.name, "unparseable count operand, set skipped");
                            continue;
                        }
                    }
                } else {
                    set.value.clone().unwrap_or(VarValue::Bool(true))
                };

                inner.insert(
                    set.name.clone(),
                    Variable {
                        value,
                        expires_at,
                        zone,
                    },
                );
            }
        }
        self.bump();
    }

    /// Zone-change purge: keeps only global variables and those tagged with
    /// the zone being entered. Ephemeral (`""`) and foreign-zone variables
    /// are removed.
    pub fn clear_zone(&self, entering_zone: &str) {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            let before = inner.len();
            inner.retain(|_, v| v.zone == GLOBAL_ZONE || v.zone == entering_zone);
            before - inner.len()
        };
        if removed > 0 {
            tracing::debug!(removed, zone = %entering_zone, "purged zone-scoped variables");
            self.bump();
        }
    }

    /// Snapshot of all live (non-expired) variables, for display and script
    /// scopes.
    pub fn snapshot(&self) -> Vec<VariableView> {
        self.snapshot_at(Local::now().naive_local())
    }

    pub fn snapshot_at(&self, now: NaiveDateTime) -> Vec<VariableView> {
        let inner = self.inner.lock().unwrap();
        let mut views: Vec<_> = inner
            .iter()
            .filter(|(_, v)| !v.is_expired(now))
            .map(|(name, v)| VariableView {
                name: name.clone(),
                value: v.value.clone(),
                zone: v.zone.clone(),
                expires_at: v.expires_at,
            })
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }
}
