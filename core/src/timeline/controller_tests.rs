//! Tests for the timeline controller.
//!
//! Drives the detection loop and tick sweep with synthetic batches and a
//! simulated clock; no tokio drivers are involved.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;

use super::controller::{ControllerSettings, TimelineController, TimelineStatus};
use crate::context::EngineContext;
use crate::definition::{TimelineDefinition, compile_timeline};
use crate::exec::RecordingRunner;
use crate::notify::{NotifyItem, NotifyKind};
use crate::source::LogRecord;
use crate::vars::VarValue;
use raidline_types::ActivityEmphasis;

fn compiled(ctx: &EngineContext, toml: &str) -> Arc<TimelineDefinition> {
    let mut def: TimelineDefinition = toml::from_str(toml).unwrap();
    let errors = compile_timeline(&mut def, &ctx.scripts);
    assert!(errors.is_empty(), "unexpected compile errors: {errors:?}");
    Arc::new(def)
}

fn controller_with(ctx: EngineContext, toml: &str) -> TimelineController {
    let def = compiled(&ctx, toml);
    let controller = TimelineController::new(ctx, ControllerSettings::default());
    controller.load(def);
    controller
}

fn rec(text: &str, seq: u64) -> LogRecord {
    LogRecord::new(Local::now().naive_local(), text, seq)
}

fn drain(controller: &TimelineController) -> Vec<NotifyItem> {
    let mut items = Vec::new();
    while let Some(item) = controller_queue_pop(controller) {
        items.push(item);
    }
    items
}

fn controller_queue_pop(controller: &TimelineController) -> Option<NotifyItem> {
    controller.ctx.queue.pop()
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle / start-end detection
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_start_and_end_keywords_drive_status() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
start_keyword = "combat begins"
end_keyword = "victory"

[[activity]]
time = 10.0
text = "Twister"
"#,
    );
    assert_eq!(c.status(), TimelineStatus::Loaded);

    c.process_batch(&[rec("the combat begins now", 1)]);
    assert_eq!(c.status(), TimelineStatus::Running);
    assert_eq!(c.clock_secs(), 0.0);

    c.process_batch(&[rec("victory fanfare", 2)]);
    assert_eq!(c.status(), TimelineStatus::Loaded);
    assert_eq!(c.clock_secs(), 0.0);
}

#[test]
fn test_empty_timeline_never_enters_running() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Empty"
start_keyword = "combat begins"
"#,
    );
    c.process_batch(&[rec("combat begins", 1)]);
    assert_eq!(c.status(), TimelineStatus::Loaded);
    assert!(!c.start());
}

#[test]
fn test_stop_resets_line_and_clock() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "a"
"#,
    );
    assert!(c.start());
    c.advance(Duration::from_secs(5));
    assert!(c.clock_secs() > 0.0);
    drain(&c);

    c.stop();
    assert_eq!(c.status(), TimelineStatus::Loaded);
    assert_eq!(c.clock_secs(), 0.0);
    let view = c.line_view();
    assert!(view.iter().all(|a| !a.is_done && !a.is_notified));
}

// ─────────────────────────────────────────────────────────────────────────────
// Activity sync matching
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_activity_sync_snaps_clock_and_notifies() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 10.0
text = "Twister"
sync_keyword = "casts Twister"
"#,
    );
    assert!(c.start());

    c.process_batch(&[rec("Boss casts Twister", 7)]);

    assert_eq!(c.clock_secs(), 10.0);
    let view = c.line_view();
    assert!(view[0].is_synced);
    assert!(view[0].is_notified);

    let items = drain(&c);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, NotifyKind::Activity);
    assert_eq!(items[0].text, "Twister");
    assert_eq!(items[0].log_seq, 7);
}

#[test]
fn test_sync_outside_window_is_ignored_but_tick_still_completes() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 30.0
text = "Late"
sync_keyword = "never in window"
sync_start = -1.0
sync_end = 1.0
"#,
    );
    assert!(c.start());

    // Clock 0, window is [29, 31): the line must not match.
    c.process_batch(&[rec("never in window", 1)]);
    assert!(!c.line_view()[0].is_synced);
    assert_eq!(c.clock_secs(), 0.0);

    // Tick-based transitions still happen at nominal time.
    c.advance(Duration::from_secs_f64(32.0));
    let view = c.line_view();
    assert!(view[0].is_done);
    assert!(!view[0].is_synced);
}

#[test]
fn test_sync_rearms_later_done_and_collapses_earlier_pending() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 10.0
text = "first"

[[activity]]
time = 20.0
text = "loop here"
sync_keyword = "phase repeats"
sync_start = -100.0
sync_end = 100.0

[[activity]]
time = 30.0
text = "later"
"#,
    );
    assert!(c.start());

    // Run past everything so all three are done.
    c.advance(Duration::from_secs_f64(40.0));
    assert!(c.line_view().iter().all(|a| a.is_done));
    drain(&c);

    // The fight loops back: the middle activity syncs again after a goto
    // style re-arm would have reset it. First re-arm via sync match.
    // Later done items must re-arm, earlier ones stay done.
    // (Re-arm only applies to *done* items after the target.)
    c.process_batch(&[rec("phase repeats", 9)]);

    let view = c.line_view();
    assert_eq!(c.clock_secs(), 20.0);
    assert!(view[0].is_done, "earlier item stays done");
    assert!(view[1].is_synced);
    assert!(!view[2].is_done, "later done item re-armed for replay");
    assert!(!view[2].is_notified);
}

#[test]
fn test_nearest_candidate_wins_ambiguous_line() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 5.0
text = "far"
sync_keyword = "shared keyword"
sync_start = -100.0
sync_end = 100.0

[[activity]]
time = 52.0
text = "near"
sync_keyword = "shared keyword"
sync_start = -100.0
sync_end = 100.0
"#,
    );
    assert!(c.start());
    c.advance(Duration::from_secs_f64(50.0));
    drain(&c);

    c.process_batch(&[rec("shared keyword", 1)]);

    let view = c.line_view();
    assert!(view[1].is_synced, "nearest-to-clock activity wins");
    assert!(!view[0].is_synced);
    assert_eq!(c.clock_secs(), 52.0);
}

#[test]
fn test_guard_refuses_activity_sync() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 10.0
text = "gated"
sync_keyword = "keyword"

[[activity.guard]]
name = "phase"
expect = 2
"#,
    );
    assert!(c.start());

    c.process_batch(&[rec("keyword", 1)]);
    assert!(!c.line_view()[0].is_synced);

    c.ctx.vars.set_direct("phase", VarValue::Int(2), "");
    c.process_batch(&[rec("keyword", 2)]);
    assert!(c.line_view()[0].is_synced);
}

// ─────────────────────────────────────────────────────────────────────────────
// Trigger matching and gating
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_trigger_scopes_global_vs_subroutine() {
    let ctx = EngineContext::for_testing();
    let global_def = compiled(
        &ctx,
        r#"
zone = "{GLOBAL}"
[[trigger]]
sync_keyword = "Wipe"
text = "Wipe called"
"#,
    );
    ctx.set_global_triggers(global_def.triggers.clone());

    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
entry = "PHASE-1"

[[subroutine]]
name = "PHASE-1"
[[subroutine.activity]]
time = 1.0
text = "opener"
[[subroutine.trigger]]
sync_keyword = "Twister"
text = "Twister incoming"

[[subroutine]]
name = "PHASE-2"
[[subroutine.trigger]]
sync_keyword = "Dive"
text = "Dive incoming"
"#,
    );
    assert!(c.start());

    // Scoped trigger fires only from the active subroutine.
    c.process_batch(&[rec("Boss begins casting Twister", 1)]);
    let items = drain(&c);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].text, "Twister incoming");

    // A trigger in a non-active subroutine never fires.
    c.process_batch(&[rec("Boss begins casting Dive", 2)]);
    assert!(drain(&c).is_empty());

    // The global trigger fires regardless of the active subroutine.
    c.process_batch(&[rec("Raid calls a Wipe now", 3)]);
    let items = drain(&c);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].text, "Wipe called");
}

#[test]
fn test_sync_count_fires_only_on_nth_match() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "a"

[[trigger]]
sync_keyword = "Cleave"
text = "Cleave!"
sync_count = 2
"#,
    );
    assert!(c.start());

    c.process_batch(&[rec("Cleave", 1)]);
    assert!(drain(&c).is_empty(), "first match must not fire");

    c.process_batch(&[rec("Cleave", 2)]);
    assert_eq!(drain(&c).len(), 1, "second match fires");

    c.process_batch(&[rec("Cleave", 3)]);
    c.process_batch(&[rec("Cleave", 4)]);
    assert!(drain(&c).is_empty(), "later matches never re-fire");
}

#[test]
fn test_sync_interval_emits_one_of_two_close_matches() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "a"

[[trigger]]
sync_keyword = "Slam"
text = "Slam!"
sync_interval = 10.0
"#,
    );
    assert!(c.start());

    let t0 = Instant::now();
    c.process_batch_at(&[rec("Slam", 1)], t0);
    c.process_batch_at(&[rec("Slam", 2)], t0 + Duration::from_secs(3));
    assert_eq!(drain(&c).len(), 1, "two matches under the interval emit once");

    c.process_batch_at(&[rec("Slam", 3)], t0 + Duration::from_secs(12));
    assert_eq!(drain(&c).len(), 1);
}

#[test]
fn test_trigger_expands_captures_into_text() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "a"

[[trigger]]
sync_keyword = "(?P<actor>\\w+) readies (?P<cast>\\w+)"
text = "${cast} from ${actor}"
notice = "dodge ${cast}"
"#,
    );
    assert!(c.start());

    c.process_batch(&[rec("Dragon readies Dive", 1)]);
    let items = drain(&c);
    assert_eq!(items[0].text, "Dive from Dragon");
    assert_eq!(items[0].notice.as_deref(), Some("dodge Dive"));
}

#[test]
fn test_trigger_guard_and_set_side_effects() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "a"

[[trigger]]
sync_keyword = "phase push"
text = "push"

[[trigger.set]]
name = "pushed"

[[trigger]]
sync_keyword = "gated"
text = "gated fired"

[[trigger.guard]]
name = "pushed"
"#,
    );
    assert!(c.start());

    // Guard unsatisfied: no fire, and set side effects of *other* triggers
    // don't leak.
    c.process_batch(&[rec("gated", 1)]);
    assert!(drain(&c).is_empty());

    c.process_batch(&[rec("phase push", 2)]);
    assert_eq!(drain(&c).len(), 1);
    assert_eq!(c.ctx.vars.get("pushed"), Some(VarValue::Bool(true)));

    c.process_batch(&[rec("gated", 3)]);
    assert_eq!(drain(&c).len(), 1);
}

#[test]
fn test_script_gate_suppresses_notify() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "a"

[[trigger]]
sync_keyword = "scripted"
text = "scripted fired"

[[trigger.script]]
code = '"ok" in vars && vars["ok"] == true'
"#,
    );
    assert!(c.start());

    c.process_batch(&[rec("scripted", 1)]);
    assert!(drain(&c).is_empty(), "script gate refuses while var unset");

    c.ctx.vars.set_direct("ok", VarValue::Bool(true), "");
    c.process_batch(&[rec("scripted", 2)]);
    assert_eq!(drain(&c).len(), 1);
}

#[test]
fn test_trigger_delay_carries_into_item() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "a"

[[trigger]]
sync_keyword = "delayed"
text = "later"
delay = 2.5
duration = 4.0
"#,
    );
    assert!(c.start());
    c.process_batch(&[rec("delayed", 1)]);
    let items = drain(&c);
    assert_eq!(items[0].delay, Some(Duration::from_secs_f64(2.5)));
    assert_eq!(items[0].duration, Some(Duration::from_secs_f64(4.0)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Jumps
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_call_splices_subroutine_when_activity_becomes_active() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 10.0
text = "A1"
call = "PHASE-2"

[[activity]]
time = 60.0
text = "A2"

[[subroutine]]
name = "PHASE-2"
[[subroutine.activity]]
time = 2.0
text = "P1"
"#,
    );
    assert!(c.start());

    c.advance(Duration::from_secs_f64(10.0));

    let view = c.line_view();
    let a1 = view.iter().find(|a| a.text == "A1").unwrap();
    let p1 = view.iter().find(|a| a.text == "P1").unwrap();
    assert!(a1.is_active);
    // Spliced with nominal time offset by the clock and seq right after A1.
    assert_eq!(p1.time, 12.0);
    assert_eq!(p1.seq, a1.seq + 1);
    assert_eq!(c.current_subroutine().as_deref(), Some("PHASE-2"));

    // seq strictly increasing across the whole line after the splice.
    let seqs: Vec<_> = view.iter().map(|a| a.seq).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));

    // The jump executes exactly once.
    c.advance(Duration::from_millis(50));
    assert_eq!(
        c.line_view().iter().filter(|a| a.text == "P1").count(),
        1,
        "call must not splice twice"
    );
}

#[test]
fn test_trigger_goto_subroutine_truncates_and_switches() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 5.0
text = "A1"

[[activity]]
time = 50.0
text = "tail"

[[trigger]]
sync_keyword = "phase two"
text = "push"
goto = "BURN"

[[subroutine]]
name = "BURN"
[[subroutine.activity]]
time = 3.0
text = "burn1"
"#,
    );
    assert!(c.start());
    c.advance(Duration::from_secs_f64(6.0));
    drain(&c);

    c.process_batch(&[rec("phase two", 1)]);

    let view = c.line_view();
    let texts: Vec<_> = view.iter().map(|a| a.text.as_str()).collect();
    assert!(texts.contains(&"burn1"));
    assert!(!texts.contains(&"tail"), "goto truncates the continuation");
    assert_eq!(c.current_subroutine().as_deref(), Some("BURN"));
}

#[test]
fn test_trigger_load_appends_without_truncation() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 5.0
text = "A1"

[[activity]]
time = 50.0
text = "tail"

[[trigger]]
sync_keyword = "adds spawn"
text = "adds"
load = "ADDS"

[[subroutine]]
name = "ADDS"
[[subroutine.activity]]
time = 1.0
text = "add wave"
"#,
    );
    assert!(c.start());
    c.process_batch(&[rec("adds spawn", 1)]);

    let texts: Vec<_> = c.line_view().iter().map(|a| a.text.clone()).collect();
    assert!(texts.contains(&"add wave".to_string()));
    assert!(texts.contains(&"tail".to_string()), "load never truncates");
}

#[test]
fn test_unresolvable_jump_is_noop() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "A1"

[[trigger]]
sync_keyword = "bad jump"
text = "fired anyway"
goto = "NOWHERE"
"#,
    );
    assert!(c.start());
    c.process_batch(&[rec("bad jump", 1)]);

    // The notify still goes out; the jump is a silent no-op.
    assert_eq!(drain(&c).len(), 1);
    assert_eq!(c.line_view().len(), 1);
    assert_eq!(c.status(), TimelineStatus::Running);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tick sweep: notices, done collapse, visibility
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_notice_fires_ahead_with_remaining() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 10.0
text = "Twister"
notice = "auto"
notice_offset = -6.0
"#,
    );
    assert!(c.start());

    c.advance(Duration::from_secs_f64(3.0));
    assert!(drain(&c).is_empty(), "notice not due yet");

    c.advance(Duration::from_secs_f64(1.5));
    let items = drain(&c);
    assert_eq!(items.len(), 1);
    let remaining = items[0].remaining.unwrap();
    assert!((remaining.as_secs_f64() - 5.5).abs() < 0.01);
    assert_eq!(items[0].resolved_notice(), "Twister in 6s");

    // Never re-notified on later ticks.
    c.advance(Duration::from_secs_f64(1.0));
    assert!(drain(&c).is_empty());
}

#[test]
fn test_done_collapse_runs_exec_exactly_once() {
    let runner = Arc::new(RecordingRunner::new());
    let ctx = EngineContext::new(runner.clone());
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "boom"

[activity.exec]
command = "/usr/bin/notify-send boom"
"#,
    );
    assert!(c.start());

    c.advance(Duration::from_secs_f64(2.5));
    assert!(c.line_view()[0].is_done);
    assert_eq!(runner.take().len(), 1);

    c.advance(Duration::from_secs_f64(1.0));
    assert!(runner.take().is_empty(), "completion effects run exactly once");
}

#[test]
fn test_done_collapse_applies_sets_in_seq_order() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "first"
[[activity.set]]
name = "counter"
count = "+1"

[[activity]]
time = 2.0
text = "second"
[[activity.set]]
name = "counter"
count = "+1"
"#,
    );
    assert!(c.start());
    c.advance(Duration::from_secs_f64(4.0));
    assert_eq!(c.ctx.vars.get("counter"), Some(VarValue::Int(2)));
}

#[test]
fn test_visibility_window_and_emphasis() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 5.0
text = "soon"

[[activity]]
time = 20.0
text = "next"

[[activity]]
time = 500.0
text = "far future"
"#,
    );
    assert!(c.start());
    c.advance(Duration::from_millis(100));

    let update = c.ctx.queue.take_visibility().expect("visibility published");
    let texts: Vec<_> = update.entries.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["soon", "next"]);
    assert_eq!(update.entries[0].emphasis, ActivityEmphasis::Primary);
    assert_eq!(update.entries[1].emphasis, ActivityEmphasis::Secondary);

    // Unchanged visibility publishes nothing new.
    c.advance(Duration::from_millis(100));
    assert!(c.ctx.queue.take_visibility().is_none());
}

#[test]
fn test_visible_count_caps_window() {
    let ctx = EngineContext::for_testing();
    let mut settings = ControllerSettings::default();
    settings.visible_count = 2;
    let def = compiled(
        &ctx,
        r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "a"
[[activity]]
time = 2.0
text = "b"
[[activity]]
time = 3.0
text = "c"
"#,
    );
    let c = TimelineController::new(ctx, settings);
    c.load(def);
    assert!(c.start());
    c.advance(Duration::from_millis(10));

    let update = c.ctx.queue.take_visibility().unwrap();
    assert_eq!(update.entries.len(), 2);
}

#[test]
fn test_tick_noop_when_not_running() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "a"
"#,
    );
    // Loaded standby: ticks advance nothing.
    c.advance(Duration::from_secs(10));
    assert_eq!(c.clock_secs(), 0.0);
    assert!(drain(&c).is_empty());
}

#[test]
fn test_first_tick_has_zero_delta() {
    let ctx = EngineContext::for_testing();
    let c = controller_with(
        ctx,
        r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "a"
"#,
    );
    assert!(c.start());
    let t0 = Instant::now();
    assert!(c.tick_at(t0));
    assert_eq!(c.clock_secs(), 0.0);
    assert!(c.tick_at(t0 + Duration::from_millis(500)));
    assert!((c.clock_secs() - 0.5).abs() < 0.01);
}
