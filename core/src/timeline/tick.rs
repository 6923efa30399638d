//! The per-tick sweep: notice dispatch, done collapse, active selection,
//! and visibility windowing.
//!
//! Runs under the controller lock with an explicit clock delta, so the
//! whole sweep is driven identically by the tokio tick task and by the
//! test suites' simulated clock.

use std::time::Duration;

use chrono::Local;

use super::controller::{ControllerState, TimelineController, TimelineStatus};
use super::jump::resolve_jump;
use crate::exec::ExecRequest;
use crate::notify::{NotifyItem, NotifyKind, VisibilityUpdate, VisibleActivity};
use raidline_types::ActivityEmphasis;

pub(crate) fn run_tick(controller: &TimelineController, s: &mut ControllerState, delta: Duration) {
    if s.status != TimelineStatus::Running {
        return;
    }
    s.clock.advance(delta);
    let clock = s.clock.secs();

    dispatch_due_notices(controller, s, clock);
    collapse_done(controller, s, clock);
    select_active(controller, s);
    recompute_visibility(controller, s);
}

/// (1) Activities whose advance notice is due: enqueue and mark notified.
fn dispatch_due_notices(controller: &TimelineController, s: &mut ControllerState, clock: f64) {
    let due: Vec<u64> = s
        .line
        .items()
        .iter()
        .filter(|i| !i.is_notified && !i.is_done && i.notice_due(clock))
        .filter(|i| controller.ctx.vars.predicate(&i.template.guards))
        .map(|i| i.id)
        .collect();

    for id in due {
        let Some(inst) = s.line.by_id_mut(id) else {
            continue;
        };
        inst.is_notified = true;
        let remaining = inst.time - clock;
        let item = NotifyItem {
            kind: NotifyKind::Activity,
            text: inst.template.text.clone(),
            notice: inst.template.notice.clone(),
            device: inst.template.notice_device,
            delay: None,
            duration: None,
            log_seq: 0,
            remaining: (remaining > 0.0).then(|| Duration::from_secs_f64(remaining)),
            visuals: inst.template.visual_notices.clone(),
        };
        controller.ctx.queue.push(item);
    }
}

/// (2) Collapse the run-up to the highest overdue activity to done, running
/// each one's scripts/sets/exec exactly once, in seq order.
fn collapse_done(controller: &TimelineController, s: &mut ControllerState, clock: f64) {
    let threshold = clock - controller.settings.hide_grace;
    let boundary = s
        .line
        .items()
        .iter()
        .filter(|i| !i.is_done && i.time <= threshold)
        .map(|i| i.seq)
        .max();
    let Some(boundary) = boundary else {
        return;
    };

    // Line order is seq order, so this collects in execution order.
    let newly_done: Vec<u64> = s
        .line
        .items()
        .iter()
        .filter(|i| !i.is_done && i.seq <= boundary)
        .map(|i| i.id)
        .collect();

    let zone = s.zone.clone();
    let now = Local::now().naive_local();
    for id in newly_done {
        let Some(inst) = s.line.by_id_mut(id) else {
            continue;
        };
        inst.is_done = true;
        inst.is_notified = true;
        let template = inst.template.clone();
        let captures = inst.matched.as_ref().map(|m| m.pairs.clone()).unwrap_or_default();

        controller
            .ctx
            .vars
            .apply_sets_at(&template.sets, &zone, now);

        for script in template.scripts.iter().filter(|sc| sc.enabled) {
            let Some(ast) = &script.ast else { continue };
            if let Err(e) = controller
                .ctx
                .scripts
                .eval_effect(ast, &controller.ctx.vars, &captures)
            {
                tracing::warn!(activity = %template.text, error = %e, "completion script failed");
            }
        }

        if let Some(exec) = &template.exec
            && let Some(request) = ExecRequest::from_def(exec)
        {
            controller.ctx.exec.dispatch(request);
        }
    }
}

/// (3) Select the new active instance: highest-seq, reached, not done,
/// guard-true, not yet active. On change, resolve its jump and track the
/// subroutine transition.
fn select_active(controller: &TimelineController, s: &mut ControllerState) {
    let clock = s.clock.secs();
    let candidate = s
        .line
        .items()
        .iter()
        .filter(|i| !i.is_done && !i.is_active && i.time <= clock)
        .filter(|i| controller.ctx.vars.predicate(&i.template.guards))
        .max_by_key(|i| i.seq)
        .map(|i| i.id);

    let Some(id) = candidate else {
        return;
    };
    if s.active_instance == Some(id) {
        return;
    }

    for item in s.line.items_mut() {
        item.is_active = false;
    }
    let (seq, sub, template, jump_pending) = {
        let inst = s.line.by_id_mut(id).unwrap();
        inst.is_active = true;
        let jump_pending = !inst.jump_executed && inst.has_jump();
        if jump_pending {
            inst.jump_executed = true;
        }
        (inst.seq, inst.subroutine.clone(), inst.template.clone(), jump_pending)
    };
    s.active_instance = Some(id);
    tracing::debug!(activity = %template.text, seq, "activity became active");

    let Some(def) = s.definition.clone() else {
        return;
    };

    if let Some(name) = sub {
        controller.enter_subroutine(s, &def, &name);
    }

    if jump_pending {
        let outcome = resolve_jump(
            &mut s.line,
            &mut s.clock,
            &def,
            Some(seq),
            template.call.as_deref(),
            template.goto.as_deref(),
            None,
        );
        if let Some(name) = outcome.entered_subroutine {
            controller.enter_subroutine(s, &def, &name);
        }
    }
}

/// (4) The next N not-done, guard-true activities inside the lookahead
/// window are visible; the nearest gets primary emphasis.
fn recompute_visibility(controller: &TimelineController, s: &mut ControllerState) {
    let clock = s.clock.secs();
    let horizon = clock + controller.settings.lookahead_secs;

    let chosen: Vec<u64> = s
        .line
        .items()
        .iter()
        .filter(|i| !i.is_done && i.time <= horizon)
        .filter(|i| controller.ctx.vars.predicate(&i.template.guards))
        .take(controller.settings.visible_count)
        .map(|i| i.id)
        .collect();

    let mut changed = false;
    let mut entries = Vec::with_capacity(chosen.len());
    for item in s.line.items_mut() {
        let position = chosen.iter().position(|id| *id == item.id);
        let visible = position.is_some();
        let emphasis = position.map(|p| {
            if p == 0 {
                ActivityEmphasis::Primary
            } else {
                ActivityEmphasis::Secondary
            }
        });
        if item.is_visible != visible || item.emphasis != emphasis {
            changed = true;
        }
        item.is_visible = visible;
        item.emphasis = emphasis;
        if let Some(emphasis) = emphasis {
            entries.push(VisibleActivity {
                seq: item.seq,
                text: item.template.text.clone(),
                time: item.time,
                remaining_secs: item.time - clock,
                emphasis,
            });
        }
    }

    if changed {
        entries.sort_by_key(|e| e.seq);
        controller
            .ctx
            .queue
            .publish_visibility(VisibilityUpdate { entries });
    }
}
