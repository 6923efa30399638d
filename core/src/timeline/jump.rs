//! Non-linear control flow: call / goto / load resolution.
//!
//! Shared by trigger matches, activity matches, and the tick loop's
//! auto-jumping activities. Exactly one strategy executes per resolution,
//! first success wins; an unresolvable target is a logged no-op, never
//! fatal.

use super::clock::TimelineClock;
use super::line::ActivityLine;
use crate::definition::TimelineDefinition;

/// What a jump resolution did.
#[derive(Debug, Default)]
pub struct JumpOutcome {
    pub jumped: bool,
    /// Subroutine the line continued into, when the jump entered one.
    pub entered_subroutine: Option<String>,
}

/// Attempt `call`, then `goto`, then `load`, from the instance at
/// `origin_seq` (or the end of the line when `None`).
pub fn resolve_jump(
    line: &mut ActivityLine,
    clock: &mut TimelineClock,
    def: &TimelineDefinition,
    origin_seq: Option<u64>,
    call: Option<&str>,
    goto: Option<&str>,
    load: Option<&str>,
) -> JumpOutcome {
    if let Some(target) = call
        && let Some(outcome) = try_call(line, clock, def, origin_seq, target)
    {
        return outcome;
    }
    if let Some(target) = goto
        && let Some(outcome) = try_goto(line, clock, def, origin_seq, target)
    {
        return outcome;
    }
    if let Some(target) = load
        && let Some(outcome) = try_load(line, clock, def, target)
    {
        return outcome;
    }

    if call.is_some() || goto.is_some() || load.is_some() {
        tracing::debug!(?call, ?goto, ?load, "jump target did not resolve");
    }
    JumpOutcome::default()
}

/// Call: splice the subroutine's activities after the current position,
/// nominal times offset by the current clock. The rest of the line stays,
/// so control conceptually returns to it.
fn try_call(
    line: &mut ActivityLine,
    clock: &TimelineClock,
    def: &TimelineDefinition,
    origin_seq: Option<u64>,
    target: &str,
) -> Option<JumpOutcome> {
    let sub = def.subroutine(target)?;
    line.splice_after(origin_seq, &sub.activities, clock.secs(), Some(target));
    tracing::info!(subroutine = %target, clock = clock.secs(), "call: spliced subroutine");
    Some(JumpOutcome {
        jumped: true,
        entered_subroutine: Some(target.to_string()),
    })
}

/// Goto: an existing line entry by display text (re-arm without
/// reinserting), else a subroutine (truncate and splice).
fn try_goto(
    line: &mut ActivityLine,
    clock: &mut TimelineClock,
    def: &TimelineDefinition,
    origin_seq: Option<u64>,
    target: &str,
) -> Option<JumpOutcome> {
    // Prefer the nearest following entry so loops jump backwards only when
    // nothing lies ahead.
    let origin = origin_seq.unwrap_or(0);
    let found = line
        .items()
        .iter()
        .find(|i| i.seq >= origin && i.template.text == target)
        .or_else(|| line.items().iter().find(|i| i.template.text == target))
        .map(|i| (i.seq, i.time, i.subroutine.clone()));

    if let Some((seq, time, sub)) = found {
        clock.set_secs(time);
        for item in line.items_mut() {
            if item.seq >= seq {
                item.is_done = false;
                item.is_notified = false;
                item.is_synced = false;
                item.is_active = false;
                item.jump_executed = false;
            }
        }
        tracing::info!(activity = %target, time, "goto: rewound to line entry");
        return Some(JumpOutcome {
            jumped: true,
            entered_subroutine: sub,
        });
    }

    let sub = def.subroutine(target)?;
    if let Some(origin) = origin_seq {
        line.truncate_after(origin);
    } else {
        line.clear();
    }
    line.splice_after(None, &sub.activities, clock.secs(), Some(target));
    tracing::info!(subroutine = %target, clock = clock.secs(), "goto: replaced continuation");
    Some(JumpOutcome {
        jumped: true,
        entered_subroutine: Some(target.to_string()),
    })
}

/// Load: append the subroutine's activities without truncating anything.
fn try_load(
    line: &mut ActivityLine,
    clock: &TimelineClock,
    def: &TimelineDefinition,
    target: &str,
) -> Option<JumpOutcome> {
    let sub = def.subroutine(target)?;
    line.append(&sub.activities, clock.secs(), Some(target));
    tracing::info!(subroutine = %target, clock = clock.secs(), "load: appended subroutine");
    Some(JumpOutcome {
        jumped: true,
        entered_subroutine: None,
    })
}
