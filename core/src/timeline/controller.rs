//! The timeline controller: owns the Activity Line, the virtual clock, the
//! detection loop, and jump resolution.
//!
//! # Concurrency
//!
//! Two periodic drivers touch the controller: the detection loop (log
//! batches) and the tick task (clock advance). Both serialize through the
//! single state mutex. Within one batch the four detection passes run as
//! parallel rayon tasks over an immutable snapshot taken under the lock;
//! the barrier join is followed by one serialized application section, so
//! match evaluation is lock-free and mutation is serialized.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use hashbrown::HashMap;
use regex::Regex;

use super::clock::TimelineClock;
use super::jump::resolve_jump;
use super::line::{ActivityLine, CapturedMatch};
use super::tick;
use crate::context::EngineContext;
use crate::definition::{TimelineDefinition, TriggerDefinition};
use crate::exec::ExecRequest;
use crate::notify::{NotifyItem, NotifyKind};
use crate::source::{LogRecord, LogSource};
use crate::triggers::{
    ExpandedMatch, TriggerRuntime, expand_position_placeholders, gate_counters, match_trigger_line,
};
use raidline_types::ActivityEmphasis;

/// Lifecycle of one controller.
///
/// `Unloaded → Loading → Loaded (standby) → Running → Loaded → Unloaded`.
/// `Running` is entered only when the definition has runnable content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimelineStatus {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Running,
}

/// Controller cadence and windowing configuration.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Tick driver period.
    pub tick_interval: Duration,
    /// Seconds past nominal time before a non-synced activity collapses to
    /// done.
    pub hide_grace: f64,
    /// Lookahead window for visibility (seconds).
    pub lookahead_secs: f64,
    /// How many upcoming activities are visible at once.
    pub visible_count: usize,
    /// Max log records pulled per detection iteration.
    pub batch_size: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            hide_grace: 1.0,
            lookahead_secs: 90.0,
            visible_count: 5,
            batch_size: 256,
        }
    }
}

/// Mutable controller state, guarded by the one coarse lock.
pub(crate) struct ControllerState {
    pub status: TimelineStatus,
    pub definition: Option<Arc<TimelineDefinition>>,
    pub line: ActivityLine,
    pub clock: TimelineClock,
    /// Per-activation trigger counters, keyed by trigger id.
    pub runtimes: HashMap<u64, TriggerRuntime>,
    /// Triggers copied (not aliased) from the current subroutine and its
    /// imports.
    pub sub_triggers: Vec<TriggerDefinition>,
    pub current_subroutine: Option<String>,
    /// Instance id of the currently active activity.
    pub active_instance: Option<u64>,
    pub last_wall_tick: Option<Instant>,
    pub zone: String,
}

impl ControllerState {
    fn new() -> Self {
        Self {
            status: TimelineStatus::Unloaded,
            definition: None,
            line: ActivityLine::new(),
            clock: TimelineClock::new(),
            runtimes: HashMap::new(),
            sub_triggers: Vec::new(),
            current_subroutine: None,
            active_instance: None,
            last_wall_tick: None,
            zone: String::new(),
        }
    }
}

/// Read-only view of one line entry, for status displays and tests.
#[derive(Debug, Clone)]
pub struct ActivityView {
    pub seq: u64,
    pub text: String,
    pub time: f64,
    pub is_active: bool,
    pub is_done: bool,
    pub is_synced: bool,
    pub is_notified: bool,
    pub is_visible: bool,
    pub emphasis: Option<ActivityEmphasis>,
    pub subroutine: Option<String>,
}

pub struct TimelineController {
    pub(crate) ctx: EngineContext,
    pub(crate) settings: ControllerSettings,
    state: Mutex<ControllerState>,
    tick_busy: AtomicBool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Detection snapshot (taken under lock, evaluated lock-free)
// ─────────────────────────────────────────────────────────────────────────────

struct ActivityCandidate {
    instance_id: u64,
    /// Distance from the clock to nominal time; nearest candidate wins an
    /// ambiguous line.
    distance: f64,
    regex: Arc<Regex>,
}

struct DetectionSnapshot {
    start_regex: Option<Arc<Regex>>,
    end_regex: Option<Arc<Regex>>,
    activities: Vec<ActivityCandidate>,
    triggers: Vec<TriggerDefinition>,
    hides: Vec<(u64, Arc<Regex>)>,
}

impl DetectionSnapshot {
    fn has_work(&self) -> bool {
        self.start_regex.is_some()
            || self.end_regex.is_some()
            || !self.activities.is_empty()
            || !self.triggers.is_empty()
            || !self.hides.is_empty()
    }
}

enum StartEnd {
    Start,
    End,
}

struct ActivityHit {
    instance_id: u64,
    line_seq: u64,
    captures: Vec<(String, String)>,
}

struct TriggerHit {
    index: usize,
    line_seq: u64,
    timestamp: NaiveDateTime,
    expanded: ExpandedMatch,
}

fn pass_start_end(snapshot: &DetectionSnapshot, batch: &[LogRecord]) -> Option<StartEnd> {
    for record in batch {
        if let Some(re) = &snapshot.start_regex
            && re.is_match(&record.text)
        {
            return Some(StartEnd::Start);
        }
        if let Some(re) = &snapshot.end_regex
            && re.is_match(&record.text)
        {
            return Some(StartEnd::End);
        }
    }
    None
}

/// At most one activity sync per batch: first line wins, and within a line
/// the candidate nearest the clock wins.
fn pass_activities(snapshot: &DetectionSnapshot, batch: &[LogRecord]) -> Option<ActivityHit> {
    for record in batch {
        for candidate in &snapshot.activities {
            if let Some(caps) = candidate.regex.captures(&record.text) {
                let mut pairs = Vec::with_capacity(caps.len());
                for (i, m) in caps.iter().enumerate() {
                    if let Some(m) = m {
                        pairs.push((i.to_string(), m.as_str().to_string()));
                    }
                }
                for name in candidate.regex.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        pairs.push((name.to_string(), m.as_str().to_string()));
                    }
                }
                return Some(ActivityHit {
                    instance_id: candidate.instance_id,
                    line_seq: record.seq,
                    captures: pairs,
                });
            }
        }
    }
    None
}

fn pass_triggers(snapshot: &DetectionSnapshot, batch: &[LogRecord]) -> Vec<TriggerHit> {
    let mut hits = Vec::new();
    for record in batch {
        for (index, trigger) in snapshot.triggers.iter().enumerate() {
            if let Some(expanded) = match_trigger_line(trigger, &record.text) {
                hits.push(TriggerHit {
                    index,
                    line_seq: record.seq,
                    timestamp: record.timestamp,
                    expanded,
                });
            }
        }
    }
    hits
}

fn pass_hides(snapshot: &DetectionSnapshot, batch: &[LogRecord]) -> Vec<u64> {
    let mut ids = Vec::new();
    for record in batch {
        for (id, regex) in &snapshot.hides {
            if regex.is_match(&record.text) && !ids.contains(id) {
                ids.push(*id);
            }
        }
    }
    ids
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller
// ─────────────────────────────────────────────────────────────────────────────

impl TimelineController {
    pub fn new(ctx: EngineContext, settings: ControllerSettings) -> Self {
        Self {
            ctx,
            settings,
            state: Mutex::new(ControllerState::new()),
            tick_busy: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> TimelineStatus {
        self.state.lock().unwrap().status
    }

    pub fn clock_secs(&self) -> f64 {
        self.state.lock().unwrap().clock.secs()
    }

    pub fn current_subroutine(&self) -> Option<String> {
        self.state.lock().unwrap().current_subroutine.clone()
    }

    pub fn zone(&self) -> String {
        self.state.lock().unwrap().zone.clone()
    }

    pub fn line_view(&self) -> Vec<ActivityView> {
        let s = self.state.lock().unwrap();
        s.line
            .items()
            .iter()
            .map(|i| ActivityView {
                seq: i.seq,
                text: i.template.text.clone(),
                time: i.time,
                is_active: i.is_active,
                is_done: i.is_done,
                is_synced: i.is_synced,
                is_notified: i.is_notified,
                is_visible: i.is_visible,
                emphasis: i.emphasis,
                subroutine: i.subroutine.clone(),
            })
            .collect()
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Load a compiled definition into standby. Replaces any previous one.
    pub fn load(&self, def: Arc<TimelineDefinition>) {
        let mut s = self.state.lock().unwrap();
        s.status = TimelineStatus::Loading;
        s.zone = def.zone.clone();
        s.definition = Some(Arc::clone(&def));
        self.rebuild_line(&mut s, &def);
        s.status = TimelineStatus::Loaded;
        tracing::info!(zone = %def.zone, activities = s.line.len(), "timeline loaded");
    }

    /// Start the run (start keyword, or host command). Returns false when
    /// nothing is loaded or the definition has no runnable content.
    pub fn start(&self) -> bool {
        let mut s = self.state.lock().unwrap();
        self.start_locked(&mut s)
    }

    /// Stop the run and return to standby; the line and clock reset.
    pub fn stop(&self) {
        let mut s = self.state.lock().unwrap();
        self.stop_locked(&mut s);
    }

    /// Drop the definition entirely.
    pub fn unload(&self) {
        let mut s = self.state.lock().unwrap();
        *s = ControllerState::new();
        tracing::info!("timeline unloaded");
    }

    fn start_locked(&self, s: &mut ControllerState) -> bool {
        if s.status != TimelineStatus::Loaded {
            return false;
        }
        let Some(def) = s.definition.clone() else {
            return false;
        };
        if !def.has_runnable_content() {
            tracing::warn!(zone = %def.zone, "timeline has no runnable content, staying in standby");
            return false;
        }
        self.rebuild_line(s, &def);
        s.status = TimelineStatus::Running;
        tracing::info!(zone = %def.zone, "timeline running");
        true
    }

    fn stop_locked(&self, s: &mut ControllerState) {
        if s.status != TimelineStatus::Running {
            return;
        }
        let def = s.definition.clone();
        s.status = TimelineStatus::Loaded;
        if let Some(def) = def {
            self.rebuild_line(s, &def);
        }
        tracing::info!("timeline stopped");
    }

    /// Reset the line, clock, and trigger activations from the definition.
    fn rebuild_line(&self, s: &mut ControllerState, def: &TimelineDefinition) {
        s.line.clear();
        s.clock.reset();
        s.runtimes.clear();
        s.sub_triggers.clear();
        s.current_subroutine = None;
        s.active_instance = None;
        s.last_wall_tick = None;

        s.line.append(&def.activities, 0.0, None);
        if let Some(entry) = def.entry.clone()
            && let Some(sub) = def.subroutine(&entry)
        {
            let activities = sub.activities.clone();
            s.line.append(&activities, 0.0, Some(&entry));
            self.enter_subroutine(s, def, &entry);
        }
    }

    /// On-sub-entered hook: fires exactly once per transition. Copies the
    /// subroutine's triggers (plus imports) and resets their activation
    /// counters.
    pub(crate) fn enter_subroutine(&self, s: &mut ControllerState, def: &TimelineDefinition, name: &str) {
        if s.current_subroutine.as_deref() == Some(name) {
            return;
        }
        s.current_subroutine = Some(name.to_string());

        let mut triggers: Vec<TriggerDefinition> = Vec::new();
        if let Some(sub) = def.subroutine(name) {
            triggers.extend(sub.triggers.iter().filter(|t| t.enabled).cloned());
            for import in &sub.import {
                match def.subroutine(import) {
                    Some(other) => {
                        triggers.extend(other.triggers.iter().filter(|t| t.enabled).cloned())
                    }
                    None => {
                        tracing::warn!(subroutine = %name, import = %import, "imported subroutine not found")
                    }
                }
            }
        }
        // Copied triggers start a fresh activation.
        for trigger in &triggers {
            s.runtimes.remove(&trigger.id);
        }
        tracing::info!(subroutine = %name, triggers = triggers.len(), "entered subroutine");
        s.sub_triggers = triggers;
    }

    // ─── Detection loop ─────────────────────────────────────────────────────

    pub fn process_batch(&self, batch: &[LogRecord]) {
        self.process_batch_at(batch, Instant::now());
    }

    pub fn process_batch_at(&self, batch: &[LogRecord], wall_now: Instant) {
        if batch.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        if !snapshot.has_work() {
            return;
        }

        // Four passes, parallel, joined before anything mutates.
        let ((start_end, activity), (trigger_hits, hide_hits)) = rayon::join(
            || {
                rayon::join(
                    || pass_start_end(&snapshot, batch),
                    || pass_activities(&snapshot, batch),
                )
            },
            || {
                rayon::join(
                    || pass_triggers(&snapshot, batch),
                    || pass_hides(&snapshot, batch),
                )
            },
        );

        {
            let mut s = self.state.lock().unwrap();
            match start_end {
                Some(StartEnd::Start) if s.status == TimelineStatus::Loaded => {
                    self.start_locked(&mut s);
                }
                Some(StartEnd::End) if s.status == TimelineStatus::Running => {
                    self.stop_locked(&mut s);
                }
                _ => {}
            }

            if let Some(hit) = activity
                && s.status == TimelineStatus::Running
            {
                self.apply_activity_sync(&mut s, hit);
            }

            for hit in trigger_hits {
                let def = &snapshot.triggers[hit.index];
                self.apply_trigger_fire(
                    &mut s,
                    def,
                    hit.expanded,
                    wall_now,
                    hit.timestamp,
                    hit.line_seq,
                );
            }
        }

        for id in hide_hits {
            self.ctx.queue.force_hide(id);
        }
    }

    fn snapshot(&self) -> DetectionSnapshot {
        let s = self.state.lock().unwrap();
        let clock = s.clock.secs();
        let running = s.status == TimelineStatus::Running;

        let mut activities = Vec::new();
        if running {
            // Done instances stay matchable: a loop-back sync re-arms them.
            // Only a prior sync takes an instance out of the set.
            for inst in s.line.items() {
                if inst.is_synced {
                    continue;
                }
                let Some(re) = &inst.template.sync_regex else {
                    continue;
                };
                if inst.in_sync_window(clock) {
                    activities.push(ActivityCandidate {
                        instance_id: inst.id,
                        distance: (clock - inst.time).abs(),
                        regex: Arc::clone(re),
                    });
                }
            }
            // Nearest active window wins ambiguous lines.
            activities.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        }

        let armed =
            |t: &&TriggerDefinition| t.enabled && !t.is_actor_trigger() && t.sync_regex.is_some();
        let globals = self.ctx.global_triggers();
        let mut triggers: Vec<TriggerDefinition> = globals.iter().filter(armed).cloned().collect();
        if let Some(def) = &s.definition {
            triggers.extend(def.triggers.iter().filter(armed).cloned());
        }
        triggers.extend(s.sub_triggers.iter().filter(armed).cloned());

        DetectionSnapshot {
            start_regex: s.definition.as_ref().and_then(|d| d.start_regex.clone()),
            end_regex: s.definition.as_ref().and_then(|d| d.end_regex.clone()),
            activities,
            triggers,
            hides: self.ctx.queue.hide_patterns(),
        }
    }

    /// Activity sync: confirm the instance, snap the clock, re-arm later
    /// done entries (loop-back replay), collapse earlier pending ones, then
    /// notify and resolve any jump.
    fn apply_activity_sync(&self, s: &mut ControllerState, hit: ActivityHit) {
        let Some(def) = s.definition.clone() else {
            return;
        };
        let clock = s.clock.secs();

        let (target_seq, target_time, tpl) = {
            // Re-validate under the lock; the snapshot may be stale.
            let Some(inst) = s.line.by_id(hit.instance_id) else {
                return;
            };
            if inst.is_synced || !inst.in_sync_window(clock) {
                return;
            }
            (inst.seq, inst.time, inst.template.clone())
        };

        if !self.ctx.vars.predicate(&tpl.guards) {
            tracing::debug!(activity = %tpl.text, "sync match refused by guard");
            return;
        }

        if let Some(inst) = s.line.by_id_mut(hit.instance_id) {
            inst.is_synced = true;
            inst.is_notified = true;
            // The mechanic is occurring now; a previously-done instance
            // re-enters play and completes again at time + grace.
            inst.is_done = false;
            inst.matched = Some(CapturedMatch {
                pairs: hit.captures.clone(),
            });
        }

        s.clock.set_secs(target_time);
        for item in s.line.items_mut() {
            if item.seq > target_seq && item.is_done {
                // Retroactive replay: the fight looped back.
                item.is_done = false;
                item.is_notified = false;
                item.is_synced = false;
            } else if item.seq < target_seq && !item.is_done {
                // Monotonic forward collapse.
                item.is_done = true;
                item.is_notified = true;
            }
        }

        tracing::debug!(activity = %tpl.text, time = target_time, "activity synced");
        self.ctx.queue.push(NotifyItem {
            kind: NotifyKind::Activity,
            text: tpl.text.clone(),
            notice: tpl.notice.clone(),
            device: tpl.notice_device,
            delay: None,
            duration: None,
            log_seq: hit.line_seq,
            remaining: None,
            visuals: tpl.visual_notices.clone(),
        });

        let jump_pending = s
            .line
            .by_id(hit.instance_id)
            .is_some_and(|i| !i.jump_executed && i.has_jump());
        if jump_pending {
            if let Some(inst) = s.line.by_id_mut(hit.instance_id) {
                inst.jump_executed = true;
            }
            let outcome = resolve_jump(
                &mut s.line,
                &mut s.clock,
                &def,
                Some(target_seq),
                tpl.call.as_deref(),
                tpl.goto.as_deref(),
                None,
            );
            if let Some(name) = outcome.entered_subroutine {
                self.enter_subroutine(s, &def, &name);
            }
        }
    }

    /// Shared gating/notify/jump/exec pipeline for text and actor triggers.
    pub(crate) fn apply_trigger_fire(
        &self,
        s: &mut ControllerState,
        def: &TriggerDefinition,
        expanded: ExpandedMatch,
        wall_now: Instant,
        timestamp: NaiveDateTime,
        log_seq: u64,
    ) {
        {
            let rt = s.runtimes.entry(def.id).or_default();
            if !gate_counters(def, rt, wall_now) {
                return;
            }
        }

        if !self.ctx.vars.predicate_at(&def.guards, timestamp) {
            tracing::debug!(trigger = %def.label(), "match refused by guard");
            return;
        }
        // Guard passed: apply set side effects before scripts see the store.
        self.ctx.vars.apply_sets_at(&def.sets, &s.zone, timestamp);

        // Logical AND across enabled scripts; errors count as refusal.
        for script in def.scripts.iter().filter(|sc| sc.enabled) {
            let Some(ast) = &script.ast else { continue };
            match self
                .ctx
                .scripts
                .eval_gate(ast, &self.ctx.vars, &expanded.captures)
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(trigger = %def.label(), "script gate refused");
                    return;
                }
                Err(e) => {
                    tracing::warn!(trigger = %def.label(), error = %e, "script gate failed");
                    return;
                }
            }
        }

        self.ctx.queue.push(NotifyItem {
            kind: NotifyKind::Trigger,
            text: expanded.text.clone(),
            notice: expanded.notice.clone(),
            device: def.device,
            delay: (def.delay > 0.0).then(|| Duration::from_secs_f64(def.delay)),
            duration: def.duration.map(Duration::from_secs_f64),
            log_seq,
            remaining: None,
            visuals: def.visual_notices.clone(),
        });
        tracing::debug!(trigger = %def.label(), "trigger fired");

        if def.call.is_some() || def.goto.is_some() || def.load.is_some() {
            // Jump from the active instance; before anything has activated,
            // the jump point is the end of the completed run-up.
            let origin = s
                .active_instance
                .and_then(|id| s.line.by_id(id))
                .map(|i| i.seq)
                .or_else(|| {
                    s.line
                        .items()
                        .iter()
                        .filter(|i| i.is_done)
                        .map(|i| i.seq)
                        .max()
                });
            if let Some(timeline) = s.definition.clone() {
                let outcome = resolve_jump(
                    &mut s.line,
                    &mut s.clock,
                    &timeline,
                    origin,
                    def.call.as_deref(),
                    def.goto.as_deref(),
                    def.load.as_deref(),
                );
                if let Some(name) = outcome.entered_subroutine {
                    self.enter_subroutine(s, &timeline, &name);
                }
            }
        }

        if let Some(exec) = &def.exec
            && let Some(request) = ExecRequest::from_def(exec)
        {
            self.ctx.exec.dispatch(request);
        }
    }

    // ─── Actor-sync entry points ────────────────────────────────────────────

    /// Enabled triggers carrying a position/HP payload, from all three
    /// scopes.
    pub fn actor_triggers(&self) -> Vec<TriggerDefinition> {
        let s = self.state.lock().unwrap();
        let armed = |t: &&TriggerDefinition| t.enabled && t.is_actor_trigger();
        let globals = self.ctx.global_triggers();
        let mut out: Vec<TriggerDefinition> = globals.iter().filter(armed).cloned().collect();
        if let Some(def) = &s.definition {
            out.extend(def.triggers.iter().filter(armed).cloned());
        }
        out.extend(s.sub_triggers.iter().filter(armed).cloned());
        out
    }

    /// HP-sync fire: single-shot per activation.
    pub fn fire_hp_sync(
        &self,
        def: &TriggerDefinition,
        bindings: &[(String, String)],
        wall_now: Instant,
        timestamp: NaiveDateTime,
    ) -> bool {
        let mut s = self.state.lock().unwrap();
        {
            let rt = s.runtimes.entry(def.id).or_default();
            if rt.hp_fired {
                return false;
            }
            rt.hp_fired = true;
        }
        let expanded = actor_expanded(def, bindings);
        self.apply_trigger_fire(&mut s, def, expanded, wall_now, timestamp, 0);
        true
    }

    /// Position-sync fire: rate-limited by the payload's own interval.
    pub fn fire_position_sync(
        &self,
        def: &TriggerDefinition,
        bindings: &[(String, String)],
        wall_now: Instant,
        timestamp: NaiveDateTime,
    ) -> bool {
        let interval = def.position_sync.as_ref().map(|p| p.interval).unwrap_or(0.0);
        let mut s = self.state.lock().unwrap();
        {
            let rt = s.runtimes.entry(def.id).or_default();
            if interval > 0.0
                && let Some(last) = rt.last_position_fire
                && wall_now.duration_since(last).as_secs_f64() < interval
            {
                return false;
            }
            rt.last_position_fire = Some(wall_now);
        }
        let expanded = actor_expanded(def, bindings);
        self.apply_trigger_fire(&mut s, def, expanded, wall_now, timestamp, 0);
        true
    }

    // ─── Tick ───────────────────────────────────────────────────────────────

    pub fn tick(&self) -> bool {
        self.tick_at(Instant::now())
    }

    /// One tick: advance the clock by the measured wall delta and run the
    /// due/done/active/visibility sweep. Non-reentrant: an overlapping call
    /// is skipped, never queued.
    pub fn tick_at(&self, wall_now: Instant) -> bool {
        if self.tick_busy.swap(true, Ordering::Acquire) {
            tracing::trace!("tick overrun, skipped");
            return false;
        }
        {
            let mut s = self.state.lock().unwrap();
            let delta = match s.last_wall_tick {
                Some(prev) => wall_now.saturating_duration_since(prev),
                None => Duration::ZERO,
            };
            s.last_wall_tick = Some(wall_now);
            tick::run_tick(self, &mut s, delta);
        }
        self.tick_busy.store(false, Ordering::Release);
        true
    }

    /// Advance the virtual clock by an explicit delta (simulated-clock
    /// stepping; tests and the CLI replay path).
    pub fn advance(&self, delta: Duration) {
        let mut s = self.state.lock().unwrap();
        tick::run_tick(self, &mut s, delta);
    }

    // ─── Drivers ────────────────────────────────────────────────────────────

    /// Spawn the detection and tick tasks. Both stop when `shutdown` flips
    /// to true; in-flight work finishes.
    pub fn spawn_drivers(
        self: &Arc<Self>,
        source: Arc<dyn LogSource>,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let detection = {
            let controller = Arc::clone(self);
            let source = Arc::clone(&source);
            let mut shutdown = shutdown.clone();
            let idle = Duration::from_millis(10);
            tokio::spawn(async move {
                loop {
                    let batch = source.drain_batch(controller.settings.batch_size);
                    if batch.is_empty() {
                        tokio::select! {
                            _ = tokio::time::sleep(idle) => {}
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() { break; }
                            }
                        }
                    } else {
                        controller.process_batch(&batch);
                    }
                }
                tracing::debug!("detection driver stopped");
            })
        };

        let tick = {
            let controller = Arc::clone(self);
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(controller.settings.tick_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => { controller.tick(); }
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() { break; }
                        }
                    }
                }
                tracing::debug!("tick driver stopped");
            })
        };

        vec![detection, tick]
    }
}

/// Build an [`ExpandedMatch`] for an actor-state fire: no regex captures,
/// placeholders substituted from combatant bindings.
fn actor_expanded(def: &TriggerDefinition, bindings: &[(String, String)]) -> ExpandedMatch {
    let text = def
        .text
        .as_deref()
        .map(|t| expand_position_placeholders(t, bindings))
        .unwrap_or_else(|| def.label().to_string());
    let notice = def.notice.as_ref().map(|n| {
        if n == "auto" {
            n.clone()
        } else {
            expand_position_placeholders(n, bindings)
        }
    });
    ExpandedMatch {
        captures: bindings.to_vec(),
        text,
        notice,
    }
}
