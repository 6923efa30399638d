//! Explicitly owned shared engine state.
//!
//! Everything that would otherwise be a process-wide singleton (variable
//! store, notification queue, global trigger list, script host, side-effect
//! runner) lives here and is passed by handle to every component. Multiple
//! independent engines can coexist in one process, which is what the test
//! suites do.

use std::sync::{Arc, RwLock};

use crate::definition::TriggerDefinition;
use crate::exec::{ExecRunner, RecordingRunner};
use crate::notify::NotifyQueue;
use crate::script::ScriptHost;
use crate::vars::VariableStore;

#[derive(Clone)]
pub struct EngineContext {
    pub vars: Arc<VariableStore>,
    pub queue: NotifyQueue,
    pub scripts: Arc<ScriptHost>,
    pub exec: Arc<dyn ExecRunner>,
    /// Cross-zone triggers, armed regardless of the active timeline.
    /// Replaced wholesale by the manager on reload.
    globals: Arc<RwLock<Arc<Vec<TriggerDefinition>>>>,
}

impl EngineContext {
    pub fn new(exec: Arc<dyn ExecRunner>) -> Self {
        Self {
            vars: Arc::new(VariableStore::new()),
            queue: NotifyQueue::new(),
            scripts: Arc::new(ScriptHost::new()),
            exec,
            globals: Arc::new(RwLock::new(Arc::new(Vec::new()))),
        }
    }

    /// Context with a buffering side-effect runner; used by tests and
    /// dry-run hosts.
    pub fn for_testing() -> Self {
        Self::new(Arc::new(RecordingRunner::new()))
    }

    /// Snapshot of the global trigger list.
    pub fn global_triggers(&self) -> Arc<Vec<TriggerDefinition>> {
        Arc::clone(&self.globals.read().unwrap())
    }

    /// Replace the global trigger list (manager, on load/reload).
    pub fn set_global_triggers(&self, triggers: Vec<TriggerDefinition>) {
        *self.globals.write().unwrap() = Arc::new(triggers);
    }
}
