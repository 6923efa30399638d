pub mod actorsync;
pub mod config;
pub mod context;
pub mod definition;
pub mod exec;
pub mod manager;
pub mod notify;
pub mod script;
pub mod source;
pub mod timeline;
pub mod triggers;
pub mod vars;

// Re-exports for convenience
pub use config::AppConfig;
pub use context::EngineContext;
pub use manager::TimelineManager;
pub use notify::{NotifyItem, NotifySink, VisibilityUpdate};
pub use source::{ActorSource, LogRecord, LogSource, QueueLogSource};
pub use timeline::{TimelineController, TimelineStatus};
