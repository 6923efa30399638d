//! Notification model and queue.
//!
//! Matched triggers and due activities are detached into [`NotifyItem`]
//! snapshots at the moment of match and enqueued; a dedicated worker
//! ([`scheduler`]) drains the queue and dispatches to the host's
//! [`NotifySink`]. Items are immutable once enqueued, so the queue's lock
//! never depends on the controller's.

pub mod scheduler;

pub use scheduler::{NotifyScheduler, NotifySettings};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::Regex;

use crate::definition::VisualNotice;
use raidline_types::formatting::format_remaining;
use raidline_types::{ActivityEmphasis, Color, NoticeDevice};

/// What kind of node produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Activity,
    Trigger,
}

/// A detached, fully-resolved notification snapshot.
#[derive(Debug, Clone)]
pub struct NotifyItem {
    pub kind: NotifyKind,
    /// Resolved display text (placeholders already substituted).
    pub text: String,
    /// Notice template; `None` or `"auto"` resolve from `text` at dispatch.
    pub notice: Option<String>,
    pub device: NoticeDevice,
    /// Dispatch delay.
    pub delay: Option<Duration>,
    /// Visible duration hint for the renderer.
    pub duration: Option<Duration>,
    /// Ordering key: sequence number of the log line (or tick) that produced
    /// this item.
    pub log_seq: u64,
    /// For activities notified ahead of their nominal time: how far ahead.
    pub remaining: Option<Duration>,
    /// Attached visual notices with independent show/hide windows.
    pub visuals: Vec<VisualNotice>,
}

impl NotifyItem {
    /// Resolve the `"auto"` notice convention: the item's display text, with
    /// a time-remaining suffix when an activity notice fires early.
    pub fn resolved_notice(&self) -> String {
        match self.notice.as_deref() {
            None | Some("") | Some("auto") => match self.remaining {
                Some(remaining) if remaining >= Duration::from_millis(500) => {
                    format!(
                        "{} {}",
                        self.text,
                        format_remaining(remaining.as_secs_f64())
                    )
                }
                _ => self.text.clone(),
            },
            Some(notice) => notice.to_string(),
        }
    }
}

/// A visual notice becoming visible.
#[derive(Debug, Clone)]
pub struct VisualEvent {
    pub id: u64,
    pub text: String,
    pub duration: Duration,
    pub color: Option<Color>,
}

/// One visible upcoming activity in the lookahead window.
#[derive(Debug, Clone)]
pub struct VisibleActivity {
    pub seq: u64,
    pub text: String,
    /// Nominal time on the timeline (seconds).
    pub time: f64,
    /// Seconds until the activity occurs (negative = just passed).
    pub remaining_secs: f64,
    pub emphasis: ActivityEmphasis,
}

/// Snapshot of the visible portion of the Activity Line.
#[derive(Debug, Clone, Default)]
pub struct VisibilityUpdate {
    pub entries: Vec<VisibleActivity>,
}

/// Consumer of notifications, visual notices, and visibility updates.
/// Implemented by the host presentation layer.
pub trait NotifySink: Send + Sync {
    fn notify(&self, item: &NotifyItem);
    fn show_visual(&self, _event: &VisualEvent) {}
    fn hide_visual(&self, _id: u64) {}
    fn visibility(&self, _update: &VisibilityUpdate) {}
}

/// Shared handle to the notification queue.
///
/// Producers (controller, actor sync) push items; the scheduler worker
/// drains. The hide-pattern registry lets the detection loop force an early
/// hide of a visible visual notice when a log line matches its
/// `sync_to_hide` pattern.
#[derive(Debug, Clone, Default)]
pub struct NotifyQueue {
    inner: Arc<QueueInner>,
}

#[derive(Debug, Default)]
struct QueueInner {
    items: Mutex<VecDeque<NotifyItem>>,
    hide_patterns: Mutex<Vec<(u64, Arc<Regex>)>>,
    forced_hides: Mutex<Vec<u64>>,
    visibility: Mutex<Option<VisibilityUpdate>>,
}

impl NotifyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: NotifyItem) {
        self.inner.items.lock().unwrap().push_back(item);
    }

    pub fn pop(&self) -> Option<NotifyItem> {
        self.inner.items.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.lock().unwrap().is_empty()
    }

    /// Snapshot of hide patterns for currently visible visual notices.
    pub fn hide_patterns(&self) -> Vec<(u64, Arc<Regex>)> {
        self.inner.hide_patterns.lock().unwrap().clone()
    }

    pub(crate) fn register_hide_pattern(&self, id: u64, regex: Arc<Regex>) {
        self.inner.hide_patterns.lock().unwrap().push((id, regex));
    }

    pub(crate) fn unregister_hide_pattern(&self, id: u64) {
        self.inner
            .hide_patterns
            .lock()
            .unwrap()
            .retain(|(vid, _)| *vid != id);
    }

    /// Request an early hide of a visible visual notice (detection loop's
    /// hide pass).
    pub fn force_hide(&self, id: u64) {
        self.inner.forced_hides.lock().unwrap().push(id);
    }

    pub(crate) fn take_forced_hides(&self) -> Vec<u64> {
        std::mem::take(&mut self.inner.forced_hides.lock().unwrap())
    }

    /// Publish the latest visibility snapshot (latest wins; the worker
    /// forwards at its own cadence).
    pub fn publish_visibility(&self, update: VisibilityUpdate) {
        *self.inner.visibility.lock().unwrap() = Some(update);
    }

    pub(crate) fn take_visibility(&self) -> Option<VisibilityUpdate> {
        self.inner.visibility.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(text: &str) -> NotifyItem {
        NotifyItem {
            kind: NotifyKind::Trigger,
            text: text.to_string(),
            notice: None,
            device: NoticeDevice::Both,
            delay: None,
            duration: None,
            log_seq: 0,
            remaining: None,
            visuals: vec![],
        }
    }

    #[test]
    fn test_auto_notice_resolves_to_text() {
        let mut i = item("Twister");
        assert_eq!(i.resolved_notice(), "Twister");
        i.notice = Some("auto".into());
        assert_eq!(i.resolved_notice(), "Twister");
        i.notice = Some("Spread out".into());
        assert_eq!(i.resolved_notice(), "Spread out");
    }

    #[test]
    fn test_auto_notice_appends_remaining() {
        let mut i = item("Twister");
        i.remaining = Some(Duration::from_secs(6));
        assert_eq!(i.resolved_notice(), "Twister in 6s");

        // Sub-half-second remainders are not worth announcing.
        i.remaining = Some(Duration::from_millis(100));
        assert_eq!(i.resolved_notice(), "Twister");
    }

    #[test]
    fn test_queue_fifo() {
        let q = NotifyQueue::new();
        q.push(item("a"));
        q.push(item("b"));
        assert_eq!(q.pop().unwrap().text, "a");
        assert_eq!(q.pop().unwrap().text, "b");
        assert!(q.pop().is_none());
    }
}
