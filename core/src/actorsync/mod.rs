//! Position/HP secondary trigger subsystem.
//!
//! Evaluates triggers against polled actor state instead of log text, on
//! its own slower cadence. HP-sync fires once per activation when a
//! name-filtered actor drops to the threshold; position-sync fires at most
//! once per interval when every combatant condition binds a distinct actor
//! inside its tolerance box. Successful matches run the same
//! gating/guard/notify/jump pipeline as text triggers.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};

use crate::definition::{CombatantCondition, PositionSync};
use crate::source::{ActorSnapshot, ActorSource};
use crate::timeline::TimelineController;

#[derive(Debug, Clone)]
pub struct ActorSyncSettings {
    /// Poll period; independent from (and slower than) log batching.
    pub poll_interval: Duration,
}

impl Default for ActorSyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
        }
    }
}

/// In-memory [`ActorSource`] for hosts that push their own roster
/// snapshots (and for the test suites).
#[derive(Debug, Default)]
pub struct MemoryActorSource {
    actors: Mutex<Vec<ActorSnapshot>>,
}

impl MemoryActorSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, actors: Vec<ActorSnapshot>) {
        *self.actors.lock().unwrap() = actors;
    }
}

impl ActorSource for MemoryActorSource {
    fn snapshot(&self) -> Vec<ActorSnapshot> {
        self.actors.lock().unwrap().clone()
    }
}

/// The polling worker. One per engine.
pub struct ActorSyncWorker {
    controller: Arc<TimelineController>,
    source: Arc<dyn ActorSource>,
    settings: ActorSyncSettings,
}

impl ActorSyncWorker {
    pub fn new(
        controller: Arc<TimelineController>,
        source: Arc<dyn ActorSource>,
        settings: ActorSyncSettings,
    ) -> Self {
        Self {
            controller,
            source,
            settings,
        }
    }

    pub fn poll_once(&self) {
        self.poll_at(Instant::now(), Local::now().naive_local());
    }

    /// One evaluation pass over the current roster snapshot.
    pub fn poll_at(&self, wall_now: Instant, timestamp: NaiveDateTime) {
        let triggers = self.controller.actor_triggers();
        if triggers.is_empty() {
            return;
        }
        let actors = self.source.snapshot();
        if actors.is_empty() {
            return;
        }

        for def in &triggers {
            if let Some(hp) = &def.hp_sync {
                if let Some(bindings) = match_hp(hp, &actors) {
                    self.controller
                        .fire_hp_sync(def, &bindings, wall_now, timestamp);
                }
            } else if let Some(ps) = &def.position_sync {
                if let Some(bindings) = match_position(ps, &actors) {
                    self.controller
                        .fire_position_sync(def, &bindings, wall_now, timestamp);
                }
            }
        }
    }

    /// Run the poll loop until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => { self.poll_once(); }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() { break; }
                }
            }
        }
        tracing::debug!("actor-sync worker stopped");
    }
}

/// HP threshold check: any matching actor with `0 < hp/max*100 <= hpp`.
fn match_hp(
    hp: &crate::definition::HpSync,
    actors: &[ActorSnapshot],
) -> Option<Vec<(String, String)>> {
    let regex = hp.name_regex.as_ref()?;
    let actor = actors.iter().find(|a| {
        if !regex.is_match(&a.name) {
            return false;
        }
        let percent = a.hp_fraction() * 100.0;
        percent > 0.0 && percent <= hp.hpp
    })?;
    Some(vec![
        ("name".to_string(), actor.name.clone()),
        (
            "hpp".to_string(),
            format!("{:.1}", actor.hp_fraction() * 100.0),
        ),
    ])
}

/// Position check: every combatant condition must bind a distinct actor.
/// Bindings are numbered in condition order: `{name1}`, `{X1}`, ...
fn match_position(ps: &PositionSync, actors: &[ActorSnapshot]) -> Option<Vec<(String, String)>> {
    if ps.combatants.is_empty() {
        return None;
    }
    let mut used: Vec<usize> = Vec::with_capacity(ps.combatants.len());
    let mut bindings = Vec::new();

    for (cond_idx, cond) in ps.combatants.iter().enumerate() {
        let found = actors
            .iter()
            .enumerate()
            .find(|(actor_idx, actor)| {
                !used.contains(actor_idx) && condition_matches(cond, actor)
            })?;

        used.push(found.0);
        let actor = found.1;
        let n = cond_idx + 1;
        bindings.push((format!("name{n}"), actor.name.clone()));
        bindings.push((format!("X{n}"), format!("{:.1}", actor.x)));
        bindings.push((format!("Y{n}"), format!("{:.1}", actor.y)));
        bindings.push((format!("Z{n}"), format!("{:.1}", actor.z)));
    }
    Some(bindings)
}

fn condition_matches(cond: &CombatantCondition, actor: &ActorSnapshot) -> bool {
    let Some(name_regex) = &cond.name_regex else {
        return false;
    };
    if !name_regex.is_match(&actor.name) {
        return false;
    }
    if let Some(cast_regex) = &cond.cast_regex {
        let casting_matches = actor.casting
            && actor
                .cast_name
                .as_deref()
                .is_some_and(|name| cast_regex.is_match(name));
        if !casting_matches {
            return false;
        }
    }
    CombatantCondition::axis_ok(cond.x, actor.x, cond.tolerance)
        && CombatantCondition::axis_ok(cond.y, actor.y, cond.tolerance)
        && CombatantCondition::axis_ok(cond.z, actor.z, cond.tolerance)
}
