//! The timeline manager: process-wide registry of loaded timelines,
//! global (cross-zone) triggers, and zone-change lifecycle.
//!
//! A timeline file whose zone is the global sentinel contributes its
//! top-level triggers to the global set instead of registering a zone
//! timeline. On zone change the variable store is purged and the matching
//! timeline (if any) is loaded into the controller.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use hashbrown::HashMap;
use notify::{EventKind, RecursiveMode, Watcher};

use crate::context::EngineContext;
use crate::definition::{LoadReport, StoreError, TimelineDefinition, load_directory, load_file};
use crate::timeline::TimelineController;
use crate::vars::{GLOBAL_ZONE, VarValue};

pub struct TimelineManager {
    ctx: EngineContext,
    controller: Arc<TimelineController>,
    timelines: Mutex<HashMap<String, Arc<TimelineDefinition>>>,
    current_zone: Mutex<String>,
}

impl TimelineManager {
    pub fn new(ctx: EngineContext, controller: Arc<TimelineController>) -> Self {
        Self {
            ctx,
            controller,
            timelines: Mutex::new(HashMap::new()),
            current_zone: Mutex::new(String::new()),
        }
    }

    pub fn controller(&self) -> &Arc<TimelineController> {
        &self.controller
    }

    pub fn current_zone(&self) -> String {
        self.current_zone.lock().unwrap().clone()
    }

    pub fn zones(&self) -> Vec<String> {
        let mut zones: Vec<String> = self.timelines.lock().unwrap().keys().cloned().collect();
        zones.sort();
        zones
    }

    /// Load (or reload) every timeline in the directory. Replaces the
    /// registry and the global trigger set, then re-activates the current
    /// zone against the new definitions.
    pub fn load_directory(&self, dir: &Path) -> Result<LoadReport, StoreError> {
        let (defs, report) = load_directory(dir, &self.ctx.scripts)?;

        let mut globals = Vec::new();
        let mut map = HashMap::new();
        for def in defs {
            if def.zone == GLOBAL_ZONE {
                globals.extend(def.triggers.clone());
            } else {
                map.insert(def.zone.clone(), Arc::new(def));
            }
        }
        tracing::info!(
            timelines = map.len(),
            global_triggers = globals.len(),
            "timeline registry replaced"
        );
        self.ctx.set_global_triggers(globals);
        *self.timelines.lock().unwrap() = map;

        let zone = self.current_zone();
        if !zone.is_empty() {
            self.activate_zone(&zone);
        }
        Ok(report)
    }

    /// Reload a single changed file (hot reload path).
    pub fn reload_file(&self, path: &Path) -> Result<(), StoreError> {
        let def = load_file(path, &self.ctx.scripts)?;
        if def.zone == GLOBAL_ZONE {
            tracing::info!(path = %path.display(), "global triggers reloaded");
            self.ctx.set_global_triggers(def.triggers.clone());
            return Ok(());
        }

        let zone = def.zone.clone();
        let def = Arc::new(def);
        self.timelines
            .lock()
            .unwrap()
            .insert(zone.clone(), Arc::clone(&def));
        tracing::info!(zone = %zone, path = %path.display(), "timeline reloaded");

        if self.current_zone() == zone {
            self.controller.load(def);
        }
        Ok(())
    }

    /// Zone transition: purge zone-scoped variables and activate the
    /// matching timeline (standby) or unload.
    pub fn on_zone_change(&self, zone: &str) {
        tracing::info!(zone = %zone, "zone changed");
        *self.current_zone.lock().unwrap() = zone.to_string();
        self.ctx.vars.clear_zone(zone);
        self.activate_zone(zone);
    }

    fn activate_zone(&self, zone: &str) {
        let def = self.timelines.lock().unwrap().get(zone).cloned();
        match def {
            Some(def) if def.enabled => self.controller.load(def),
            Some(_) => {
                tracing::info!(zone = %zone, "timeline disabled, unloading");
                self.controller.unload();
            }
            None => self.controller.unload(),
        }
    }

    /// Text command surface: set a variable directly, bypassing matching.
    pub fn set_variable(&self, name: &str, value: VarValue, zone: &str) {
        self.ctx.vars.set_direct(name, value, zone);
    }

    /// Watch the timeline directory and hot-reload changed files.
    pub fn spawn_watcher(
        self: &Arc<Self>,
        dir: PathBuf,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<tokio::task::JoinHandle<()>, notify::Error> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                let _ = tx.send(res);
            })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(dir = %dir.display(), "watching timeline directory");

        let manager = Arc::clone(self);
        Ok(tokio::spawn(async move {
            // Moved in so the watcher lives as long as the task.
            let _watcher = watcher;
            loop {
                tokio::select! {
                    event = rx.recv() => {
                        match event {
                            Some(Ok(event)) => {
                                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                                    for path in event
                                        .paths
                                        .iter()
                                        .filter(|p| p.extension().is_some_and(|e| e == "toml"))
                                    {
                                        if let Err(e) = manager.reload_file(path) {
                                            tracing::error!(path = %path.display(), error = %e, "hot reload failed");
                                        }
                                    }
                                }
                            }
                            Some(Err(e)) => tracing::error!(error = %e, "watcher error"),
                            None => break,
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() { break; }
                    }
                }
            }
            tracing::debug!("directory watcher stopped");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{ControllerSettings, TimelineStatus};
    use std::fs;
    use std::io::Write;

    fn manager() -> Arc<TimelineManager> {
        let ctx = EngineContext::for_testing();
        let controller = Arc::new(TimelineController::new(
            ctx.clone(),
            ControllerSettings::default(),
        ));
        Arc::new(TimelineManager::new(ctx, controller))
    }

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_zone_change_activates_matching_timeline() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "coil.toml",
            r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "a"
"#,
        );
        let m = manager();
        m.load_directory(dir.path()).unwrap();

        assert_eq!(m.controller().status(), TimelineStatus::Unloaded);

        m.on_zone_change("Coil");
        assert_eq!(m.controller().status(), TimelineStatus::Loaded);
        assert_eq!(m.controller().zone(), "Coil");

        m.on_zone_change("Somewhere Else");
        assert_eq!(m.controller().status(), TimelineStatus::Unloaded);
    }

    #[test]
    fn test_global_file_feeds_global_triggers() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "globals.toml",
            r#"
zone = "{GLOBAL}"
[[trigger]]
sync_keyword = "Wipe"
text = "wipe"
"#,
        );
        let m = manager();
        m.load_directory(dir.path()).unwrap();

        assert!(m.zones().is_empty(), "global file is not a zone timeline");
        assert_eq!(m.ctx.global_triggers().len(), 1);
    }

    #[test]
    fn test_zone_change_purges_foreign_variables() {
        let m = manager();
        m.set_variable("ephemeral", VarValue::Bool(true), "");
        m.set_variable("global", VarValue::Bool(true), GLOBAL_ZONE);
        m.set_variable("coil_flag", VarValue::Bool(true), "Coil");

        m.on_zone_change("Coil");
        assert_eq!(m.ctx.vars.get("ephemeral"), None);
        assert_eq!(m.ctx.vars.get("coil_flag"), Some(VarValue::Bool(true)));
        assert_eq!(m.ctx.vars.get("global"), Some(VarValue::Bool(true)));

        m.on_zone_change("Elsewhere");
        assert_eq!(m.ctx.vars.get("coil_flag"), None);
        assert_eq!(m.ctx.vars.get("global"), Some(VarValue::Bool(true)));
    }

    #[test]
    fn test_reload_file_updates_active_timeline() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "coil.toml",
            r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "old"
"#,
        );
        let m = manager();
        m.load_directory(dir.path()).unwrap();
        m.on_zone_change("Coil");

        write_file(
            dir.path(),
            "coil.toml",
            r#"
zone = "Coil"
[[activity]]
time = 1.0
text = "new"
"#,
        );
        m.reload_file(&dir.path().join("coil.toml")).unwrap();

        let view = m.controller().line_view();
        assert_eq!(view[0].text, "new");
        assert_eq!(m.controller().status(), TimelineStatus::Loaded);
    }

    #[test]
    fn test_disabled_timeline_is_not_activated() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "off.toml",
            r#"
zone = "Off"
enabled = false
[[activity]]
time = 1.0
text = "a"
"#,
        );
        let m = manager();
        m.load_directory(dir.path()).unwrap();
        m.on_zone_change("Off");
        assert_eq!(m.controller().status(), TimelineStatus::Unloaded);
    }
}
