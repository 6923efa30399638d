//! Timeline definition model.
//!
//! This module provides:
//! - **Templates**: the immutable-after-load tree of timeline → subroutine →
//!   activity/trigger nodes, deserialized from declarative TOML files
//! - **Compilation**: regex/script compilation with per-node error recovery
//! - **Store**: the directory loader that merges files into a zone-keyed set
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  TimelineDefinition (TOML file)                  │
//! │  "zone 'Coil', activity 'Twister' at 10s, trigger on /Wipe/"    │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                     compile() — regexes, scripts, ids
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              ActivityInstance line (runtime state)               │
//! │  "seq 3, Twister, nominal 10s, synced, notified"                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod compile;
mod store;
mod timeline;

pub use compile::{DefinitionError, compile_timeline};
pub use store::{LoadReport, StoreError, load_directory, load_file};
pub use timeline::{
    ActivityTemplate, CombatantCondition, ExecDef, HpSync, PositionSync, ScriptDef, Subroutine,
    TimelineDefinition, TriggerDefinition, VisualNotice,
};
