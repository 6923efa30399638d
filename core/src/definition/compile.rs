//! Definition compilation: regexes, scripts, trigger ids.
//!
//! Compilation runs once per load. A malformed pattern or script disables
//! only the node that carries it and is reported in the returned error list;
//! nothing here ever surfaces at match time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;
use thiserror::Error;

use super::timeline::{
    ActivityTemplate, ScriptDef, TimelineDefinition, TriggerDefinition, VisualNotice,
};
use crate::script::ScriptHost;

static NEXT_TRIGGER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("invalid regex in {node}: {source}")]
    BadRegex {
        node: String,
        #[source]
        source: regex::Error,
    },

    #[error("script error in {node}: {message}")]
    BadScript { node: String, message: String },

    #[error("invalid sync window in {node}: start {start} >= end {end}")]
    BadSyncWindow { node: String, start: f64, end: f64 },

    #[error("timeline `{zone}` names unknown entry subroutine `{entry}`")]
    UnknownEntry { zone: String, entry: String },
}

/// Compile every pattern and script in the definition, disabling nodes that
/// fail. Returns the collected errors for reporting; the definition stays
/// usable regardless.
pub fn compile_timeline(
    def: &mut TimelineDefinition,
    scripts: &ScriptHost,
) -> Vec<DefinitionError> {
    let mut errors = Vec::new();
    let zone = def.zone.clone();

    def.start_regex = compile_optional(
        &def.start_keyword,
        &format!("timeline `{zone}` start_keyword"),
        &mut errors,
    );
    def.end_regex = compile_optional(
        &def.end_keyword,
        &format!("timeline `{zone}` end_keyword"),
        &mut errors,
    );

    if let Some(entry) = &def.entry
        && def.subroutine(entry).is_none()
    {
        errors.push(DefinitionError::UnknownEntry {
            zone: zone.clone(),
            entry: entry.clone(),
        });
    }

    for activity in &mut def.activities {
        compile_activity(activity, scripts, &mut errors);
    }
    for trigger in &mut def.triggers {
        compile_trigger(trigger, scripts, &mut errors);
    }
    for sub in &mut def.subroutines {
        for activity in &mut sub.activities {
            compile_activity(activity, scripts, &mut errors);
        }
        for trigger in &mut sub.triggers {
            compile_trigger(trigger, scripts, &mut errors);
        }
    }

    for error in &errors {
        tracing::warn!(zone = %zone, error = %error, "definition node disabled");
    }
    errors
}

fn compile_activity(
    activity: &mut ActivityTemplate,
    scripts: &ScriptHost,
    errors: &mut Vec<DefinitionError>,
) {
    let node = format!("activity `{}`", activity.text);

    if activity.sync_start >= activity.sync_end {
        errors.push(DefinitionError::BadSyncWindow {
            node: node.clone(),
            start: activity.sync_start,
            end: activity.sync_end,
        });
        activity.enabled = false;
    }

    match compile_optional_fallible(&activity.sync_keyword, &node, errors) {
        Ok(regex) => activity.sync_regex = regex,
        Err(()) => activity.enabled = false,
    }

    compile_scripts(&mut activity.scripts, &node, scripts, errors);
    compile_visual_notices(&mut activity.visual_notices, &node, errors);
}

fn compile_trigger(
    trigger: &mut TriggerDefinition,
    scripts: &ScriptHost,
    errors: &mut Vec<DefinitionError>,
) {
    trigger.id = NEXT_TRIGGER_ID.fetch_add(1, Ordering::Relaxed);
    let node = format!("trigger `{}`", trigger.label());

    match compile_optional_fallible(&trigger.sync_keyword, &node, errors) {
        Ok(regex) => trigger.sync_regex = regex,
        Err(()) => trigger.enabled = false,
    }

    compile_scripts(&mut trigger.scripts, &node, scripts, errors);
    compile_visual_notices(&mut trigger.visual_notices, &node, errors);

    if let Some(ps) = &mut trigger.position_sync {
        for combatant in &mut ps.combatants {
            match Regex::new(&combatant.name) {
                Ok(re) => combatant.name_regex = Some(Arc::new(re)),
                Err(source) => {
                    errors.push(DefinitionError::BadRegex {
                        node: node.clone(),
                        source,
                    });
                    trigger.enabled = false;
                }
            }
            if let Some(cast) = &combatant.casting {
                match Regex::new(cast) {
                    Ok(re) => combatant.cast_regex = Some(Arc::new(re)),
                    Err(source) => {
                        errors.push(DefinitionError::BadRegex {
                            node: node.clone(),
                            source,
                        });
                        trigger.enabled = false;
                    }
                }
            }
        }
    }

    if let Some(hp) = &mut trigger.hp_sync {
        match Regex::new(&hp.name) {
            Ok(re) => hp.name_regex = Some(Arc::new(re)),
            Err(source) => {
                errors.push(DefinitionError::BadRegex {
                    node: node.clone(),
                    source,
                });
                trigger.enabled = false;
            }
        }
    }
}

fn compile_scripts(
    defs: &mut [ScriptDef],
    node: &str,
    scripts: &ScriptHost,
    errors: &mut Vec<DefinitionError>,
) {
    for script in defs.iter_mut().filter(|s| s.enabled) {
        match scripts.compile(&script.code) {
            Ok(ast) => script.ast = Some(Arc::new(ast)),
            Err(message) => {
                errors.push(DefinitionError::BadScript {
                    node: node.to_string(),
                    message,
                });
                script.enabled = false;
            }
        }
    }
}

fn compile_visual_notices(
    notices: &mut [VisualNotice],
    node: &str,
    errors: &mut Vec<DefinitionError>,
) {
    for notice in notices.iter_mut().filter(|n| n.enabled) {
        if let Some(pattern) = &notice.sync_to_hide {
            match Regex::new(pattern) {
                Ok(re) => notice.hide_regex = Some(Arc::new(re)),
                Err(source) => {
                    errors.push(DefinitionError::BadRegex {
                        node: node.to_string(),
                        source,
                    });
                    notice.enabled = false;
                }
            }
        }
    }
}

/// Compile an optional pattern; errors are recorded but do not disable the
/// owning node (used for timeline-level start/end keywords).
fn compile_optional(
    pattern: &Option<String>,
    node: &str,
    errors: &mut Vec<DefinitionError>,
) -> Option<Arc<Regex>> {
    compile_optional_fallible(pattern, node, errors).unwrap_or(None)
}

/// Compile an optional pattern, reporting whether the owner should be
/// disabled. Empty patterns are treated as absent.
fn compile_optional_fallible(
    pattern: &Option<String>,
    node: &str,
    errors: &mut Vec<DefinitionError>,
) -> Result<Option<Arc<Regex>>, ()> {
    match pattern.as_deref() {
        None | Some("") => Ok(None),
        Some(p) => match Regex::new(p) {
            Ok(re) => Ok(Some(Arc::new(re))),
            Err(source) => {
                errors.push(DefinitionError::BadRegex {
                    node: node.to_string(),
                    source,
                });
                Err(())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(toml: &str) -> (TimelineDefinition, Vec<DefinitionError>) {
        let mut def: TimelineDefinition = toml::from_str(toml).unwrap();
        let host = ScriptHost::new();
        let errors = compile_timeline(&mut def, &host);
        (def, errors)
    }

    #[test]
    fn test_bad_regex_disables_only_that_node() {
        let (def, errors) = compile(
            r#"
zone = "Test"

[[activity]]
time = 1.0
text = "good"
sync_keyword = "fine"

[[activity]]
time = 2.0
text = "bad"
sync_keyword = "broken ["

[[trigger]]
sync_keyword = "also fine"
"#,
        );
        assert_eq!(errors.len(), 1);
        assert!(def.activities[0].enabled);
        assert!(def.activities[0].sync_regex.is_some());
        assert!(!def.activities[1].enabled);
        assert!(def.triggers[0].enabled);
    }

    #[test]
    fn test_trigger_ids_are_unique() {
        let (a, _) = compile(
            r#"
zone = "A"
[[trigger]]
sync_keyword = "one"
[[trigger]]
sync_keyword = "two"
"#,
        );
        let (b, _) = compile(
            r#"
zone = "B"
[[trigger]]
sync_keyword = "three"
"#,
        );
        let ids = [a.triggers[0].id, a.triggers[1].id, b.triggers[0].id];
        assert!(ids[0] != ids[1] && ids[1] != ids[2] && ids[0] != ids[2]);
        assert!(ids.iter().all(|&id| id != 0));
    }

    #[test]
    fn test_bad_script_disables_script_not_trigger() {
        let (def, errors) = compile(
            r#"
zone = "Test"
[[trigger]]
sync_keyword = "fine"
[[trigger.script]]
code = "let = broken"
"#,
        );
        assert_eq!(errors.len(), 1);
        assert!(def.triggers[0].enabled);
        assert!(!def.triggers[0].scripts[0].enabled);
    }

    #[test]
    fn test_unknown_entry_reported() {
        let (_, errors) = compile(
            r#"
zone = "Test"
entry = "MISSING"
"#,
        );
        assert!(matches!(errors[0], DefinitionError::UnknownEntry { .. }));
    }

    #[test]
    fn test_inverted_sync_window_disables_activity() {
        let (def, errors) = compile(
            r#"
zone = "Test"
[[activity]]
time = 1.0
text = "backwards"
sync_start = 5.0
sync_end = -5.0
"#,
        );
        assert_eq!(errors.len(), 1);
        assert!(!def.activities[0].enabled);
    }
}
