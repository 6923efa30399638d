//! Regex evaluation and gating for text triggers.
//!
//! Matching is pure: it reads a trigger definition and a log line and
//! produces an [`ExpandedMatch`] with substituted text/notice templates.
//! Gating mutates the per-activation counters and decides whether an
//! accepted match may fire.

use std::time::Instant;

use regex::{Captures, Regex};

use super::TriggerRuntime;
use crate::definition::TriggerDefinition;

/// A successful regex match with templates already substituted.
#[derive(Debug, Clone)]
pub struct ExpandedMatch {
    /// Numbered and named capture groups as string pairs (`"0"` = whole
    /// match).
    pub captures: Vec<(String, String)>,
    /// Resolved display text.
    pub text: String,
    /// Resolved notice template (`"auto"` is left for the notify layer).
    pub notice: Option<String>,
}

/// Match one log line against a text trigger. Returns `None` for
/// non-matching lines and for triggers without a compiled pattern.
pub fn match_trigger_line(def: &TriggerDefinition, line_text: &str) -> Option<ExpandedMatch> {
    let regex = def.sync_regex.as_ref()?;
    let caps = regex.captures(line_text)?;

    let captures = capture_pairs(regex, &caps);

    let text = match &def.text {
        Some(template) => expand_template(&caps, template),
        None => caps.get(0).map(|m| m.as_str().to_string())?,
    };

    let notice = def.notice.as_ref().map(|template| {
        if template == "auto" {
            template.clone()
        } else {
            expand_template(&caps, template)
        }
    });

    Some(ExpandedMatch {
        captures,
        text,
        notice,
    })
}

/// Counter/interval gate. Increments the match counter, then:
/// - `sync_count = N` fires only on exactly the Nth match (0 = every match)
/// - `sync_interval = I` drops matches closer than `I` seconds to the last
///   accepted one
///
/// Returns true when the match may proceed to guard/script evaluation.
pub fn gate_counters(def: &TriggerDefinition, rt: &mut TriggerRuntime, now: Instant) -> bool {
    rt.matched_counter = rt.matched_counter.saturating_add(1);

    if def.sync_count > 0 && rt.matched_counter != def.sync_count {
        return false;
    }

    if def.sync_interval > 0.0
        && let Some(last) = rt.matched_at
        && now.duration_since(last).as_secs_f64() < def.sync_interval
    {
        return false;
    }

    rt.matched_at = Some(now);
    true
}

/// Expand `$1`/`${name}` references in a template from regex captures.
pub fn expand_template(caps: &Captures<'_>, template: &str) -> String {
    let mut out = String::new();
    caps.expand(template, &mut out);
    out
}

/// Substitute `{name1}`, `{X1}`, ... placeholders from position-sync
/// combatant bindings.
pub fn expand_position_placeholders(template: &str, bindings: &[(String, String)]) -> String {
    let mut out = template.to_string();
    for (key, value) in bindings {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

fn capture_pairs(regex: &Regex, caps: &Captures<'_>) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(caps.len());
    for (i, m) in caps.iter().enumerate() {
        if let Some(m) = m {
            pairs.push((i.to_string(), m.as_str().to_string()));
        }
    }
    for name in regex.capture_names().flatten() {
        if let Some(m) = caps.name(name) {
            pairs.push((name.to_string(), m.as_str().to_string()));
        }
    }
    pairs
}
