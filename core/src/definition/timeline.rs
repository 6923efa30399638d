//! Template types for timeline definitions.
//!
//! Definitions describe one zone's scripted fight: timed activities, standing
//! triggers, and subroutines reachable through call/goto jumps. They are
//! loaded read-only; the controller clones activities into runtime instances
//! per run and never mutates the templates.

use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::source::INVALID_POSITION;
use crate::vars::{VarPredicate, VarSet};
use raidline_types::{Color, NoticeDevice};

/// One zone's fully-resolved timeline.
///
/// Immutable per load; a changed file is reloaded wholesale, never patched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineDefinition {
    /// Zone (game area) this timeline belongs to. The manager activates the
    /// timeline whose zone matches the area being entered.
    pub zone: String,

    /// Optional locale tag for zone-name matching across game clients.
    #[serde(default)]
    pub locale: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Line pattern that starts the run (combat begins).
    #[serde(default)]
    pub start_keyword: Option<String>,

    /// Line pattern that ends the run (victory/wipe).
    #[serde(default)]
    pub end_keyword: Option<String>,

    /// Subroutine activated alongside the top-level activities on load.
    #[serde(default)]
    pub entry: Option<String>,

    #[serde(default, rename = "activity")]
    pub activities: Vec<ActivityTemplate>,

    #[serde(default, rename = "subroutine")]
    pub subroutines: Vec<Subroutine>,

    /// Timeline-scoped triggers, armed whenever this timeline is loaded.
    #[serde(default, rename = "trigger")]
    pub triggers: Vec<TriggerDefinition>,

    #[serde(skip)]
    pub source_path: Option<PathBuf>,

    #[serde(skip)]
    pub start_regex: Option<Arc<Regex>>,

    #[serde(skip)]
    pub end_regex: Option<Arc<Regex>>,
}

impl TimelineDefinition {
    pub fn subroutine(&self, name: &str) -> Option<&Subroutine> {
        self.subroutines.iter().find(|s| s.name == name)
    }

    /// A timeline can run only if something would ever happen on it.
    pub fn has_runnable_content(&self) -> bool {
        self.activities.iter().any(|a| a.enabled)
            || self
                .subroutines
                .iter()
                .any(|s| s.activities.iter().any(|a| a.enabled))
    }
}

/// Named group of activities and triggers, spliced into the Activity Line by
/// call/goto/load jumps. `import` copies (never aliases) another
/// subroutine's triggers at activation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subroutine {
    pub name: String,

    #[serde(default, rename = "activity")]
    pub activities: Vec<ActivityTemplate>,

    #[serde(default, rename = "trigger")]
    pub triggers: Vec<TriggerDefinition>,

    #[serde(default)]
    pub import: Vec<String>,
}

/// A single timed event on the timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityTemplate {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Nominal offset in seconds from timeline start.
    pub time: f64,

    /// Display text shown in advance of the mechanic.
    pub text: String,

    // ─── Sync ───────────────────────────────────────────────────────────────
    /// Pattern that auto-confirms this activity when it appears in the log
    /// while the clock is inside the sync window.
    #[serde(default)]
    pub sync_keyword: Option<String>,

    /// Sync window start, relative to `time` (seconds).
    #[serde(default = "default_sync_start")]
    pub sync_start: f64,

    /// Sync window end, relative to `time` (seconds, exclusive).
    #[serde(default = "default_sync_end")]
    pub sync_end: f64,

    // ─── Notice ─────────────────────────────────────────────────────────────
    /// Notification text; `"auto"` resolves to `text` plus a time-remaining
    /// suffix when the notice fires early.
    #[serde(default)]
    pub notice: Option<String>,

    /// Seconds relative to `time` at which the notice fires (negative =
    /// advance warning).
    #[serde(default = "default_notice_offset")]
    pub notice_offset: f64,

    #[serde(default)]
    pub notice_device: NoticeDevice,

    // ─── Jumps ──────────────────────────────────────────────────────────────
    /// Subroutine spliced in after this activity (returns to the main line).
    #[serde(default)]
    pub call: Option<String>,

    /// Activity or subroutine the line continues from instead.
    #[serde(default)]
    pub goto: Option<String>,

    // ─── Attachments ────────────────────────────────────────────────────────
    #[serde(default, rename = "guard")]
    pub guards: Vec<VarPredicate>,

    #[serde(default, rename = "set")]
    pub sets: Vec<VarSet>,

    #[serde(default, rename = "script")]
    pub scripts: Vec<ScriptDef>,

    #[serde(default, rename = "vnotice")]
    pub visual_notices: Vec<VisualNotice>,

    #[serde(default)]
    pub exec: Option<ExecDef>,

    #[serde(skip)]
    pub sync_regex: Option<Arc<Regex>>,
}

/// A standing, always-evaluated reaction pattern.
///
/// Text triggers match log lines through `sync_keyword`; a trigger carrying
/// a position/HP payload is evaluated by the actor-sync subsystem instead
/// and never participates in text matching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerDefinition {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub sync_keyword: Option<String>,

    /// Display text template; `$1`/`${name}` expand from the match.
    #[serde(default)]
    pub text: Option<String>,

    /// Notice template; `"auto"` resolves to the expanded display text.
    #[serde(default)]
    pub notice: Option<String>,

    #[serde(default)]
    pub device: NoticeDevice,

    /// Dispatch delay in seconds applied to the emitted notification.
    #[serde(default)]
    pub delay: f64,

    /// Visible duration for the emitted notification (seconds).
    #[serde(default)]
    pub duration: Option<f64>,

    // ─── Gating ─────────────────────────────────────────────────────────────
    /// Fires only on exactly the Nth match of an activation; 0 = every match.
    #[serde(default)]
    pub sync_count: u32,

    /// Minimum seconds between accepted matches; 0 = no rate limit.
    #[serde(default)]
    pub sync_interval: f64,

    // ─── Jumps ──────────────────────────────────────────────────────────────
    #[serde(default)]
    pub call: Option<String>,

    #[serde(default)]
    pub goto: Option<String>,

    /// Subroutine appended (without truncation) when neither call nor goto
    /// resolves.
    #[serde(default)]
    pub load: Option<String>,

    // ─── Attachments ────────────────────────────────────────────────────────
    #[serde(default, rename = "guard")]
    pub guards: Vec<VarPredicate>,

    #[serde(default, rename = "set")]
    pub sets: Vec<VarSet>,

    #[serde(default, rename = "script")]
    pub scripts: Vec<ScriptDef>,

    #[serde(default, rename = "vnotice")]
    pub visual_notices: Vec<VisualNotice>,

    #[serde(default)]
    pub exec: Option<ExecDef>,

    // ─── Actor-state payloads (mutually exclusive with text matching) ───────
    #[serde(default)]
    pub position_sync: Option<PositionSync>,

    #[serde(default)]
    pub hp_sync: Option<HpSync>,

    /// Stable per-load id, assigned at compile time. Runtime counters are
    /// keyed by it.
    #[serde(skip)]
    pub id: u64,

    #[serde(skip)]
    pub sync_regex: Option<Arc<Regex>>,
}

impl TriggerDefinition {
    /// Triggers with an actor-state payload are owned by the actor-sync
    /// subsystem and skipped by the text detection loop.
    pub fn is_actor_trigger(&self) -> bool {
        self.position_sync.is_some() || self.hp_sync.is_some()
    }

    /// Human-readable label for logs and load reports.
    pub fn label(&self) -> &str {
        self.text
            .as_deref()
            .or(self.sync_keyword.as_deref())
            .unwrap_or("<unnamed trigger>")
    }
}

/// A rhai snippet attached to a trigger or activity.
///
/// On triggers, scripts gate the notification (logical AND across all
/// enabled scripts); on activities they run as side effects when the
/// activity completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptDef {
    #[serde(default = "default_true")]
    pub enabled: bool,

    pub code: String,

    #[serde(skip)]
    pub ast: Option<Arc<rhai::AST>>,
}

/// A transient visual notice (image/text panel) with independent show/hide
/// timing. `sync_to_hide` forces an early hide when a later log line matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualNotice {
    #[serde(default = "default_true")]
    pub enabled: bool,

    pub text: String,

    /// Seconds after the owning notification before the notice shows.
    #[serde(default)]
    pub delay: f64,

    /// Seconds the notice stays visible.
    #[serde(default = "default_vnotice_duration")]
    pub duration: f64,

    #[serde(default)]
    pub sync_to_hide: Option<String>,

    #[serde(default)]
    pub color: Option<Color>,

    #[serde(skip)]
    pub hide_regex: Option<Arc<Regex>>,
}

/// External process/HTTP side effect descriptor.
///
/// `command` may carry a `wait <seconds> ` prefix that delays dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecDef {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Launch without a visible window (host-dependent).
    #[serde(default)]
    pub hidden: bool,
}

/// Position-based secondary trigger payload: every combatant condition must
/// bind a distinct actor inside its tolerance box for the trigger to fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSync {
    /// Minimum seconds between fires.
    #[serde(default = "default_position_interval")]
    pub interval: f64,

    #[serde(default, rename = "combatant")]
    pub combatants: Vec<CombatantCondition>,
}

/// One named-combatant condition of a position sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatantCondition {
    /// Actor name pattern.
    pub name: String,

    /// When set, the actor must currently be casting an action matching
    /// this pattern.
    #[serde(default)]
    pub casting: Option<String>,

    /// Target coordinates; [`INVALID_POSITION`] leaves an axis unconstrained.
    #[serde(default = "default_invalid_position")]
    pub x: f64,

    #[serde(default = "default_invalid_position")]
    pub y: f64,

    #[serde(default = "default_invalid_position")]
    pub z: f64,

    /// Per-axis tolerance: `|actual - target| <= tolerance`.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    #[serde(skip)]
    pub name_regex: Option<Arc<Regex>>,

    #[serde(skip)]
    pub cast_regex: Option<Arc<Regex>>,
}

impl CombatantCondition {
    /// True when the given axis value satisfies the condition.
    pub fn axis_ok(target: f64, actual: f64, tolerance: f64) -> bool {
        target == INVALID_POSITION || (actual - target).abs() <= tolerance
    }
}

/// HP-threshold secondary trigger payload. Single-shot per activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HpSync {
    /// Actor name pattern.
    pub name: String,

    /// HP percentage threshold: fires when `0 < hp/max*100 <= hpp`.
    pub hpp: f64,

    #[serde(skip)]
    pub name_regex: Option<Arc<Regex>>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Serde Helpers
// ═══════════════════════════════════════════════════════════════════════════

fn default_true() -> bool {
    true
}

fn default_sync_start() -> f64 {
    -12.0
}

fn default_sync_end() -> f64 {
    12.0
}

fn default_notice_offset() -> f64 {
    -6.0
}

fn default_vnotice_duration() -> f64 {
    5.0
}

fn default_position_interval() -> f64 {
    30.0
}

fn default_invalid_position() -> f64 {
    INVALID_POSITION
}

fn default_tolerance() -> f64 {
    0.01
}
