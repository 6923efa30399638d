//! The notification worker.
//!
//! A single consumer drains the queue: a slow idle cadence while empty, a
//! near-zero cadence while draining. Delayed dispatch and visual-notice
//! show/hide windows are explicit entries in a time-ordered heap evaluated
//! on each pump, so the whole scheduler is poll-driven and runs against a
//! synthetic clock in tests.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use tokio::sync::watch;

use super::{NotifyItem, NotifyQueue, NotifySink, VisualEvent};

/// Worker cadence and debounce tuning.
#[derive(Debug, Clone)]
pub struct NotifySettings {
    /// Sleep while the queue and schedule are empty.
    pub idle: Duration,
    /// Sleep while work remains.
    pub fast: Duration,
    /// Window inside which an identical text is suppressed.
    pub debounce: Duration,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            idle: Duration::from_millis(250),
            fast: Duration::from_millis(5),
            debounce: Duration::from_millis(100),
        }
    }
}

#[derive(Debug)]
enum EventKind {
    Dispatch(Box<NotifyItem>),
    Show { id: u64, visual: ShowSpec },
    Hide { id: u64 },
}

#[derive(Debug)]
struct ShowSpec {
    text: String,
    duration: Duration,
    color: Option<raidline_types::Color>,
    hide_regex: Option<Arc<regex::Regex>>,
}

struct ScheduledEvent {
    due: Instant,
    /// Insertion tiebreak so same-instant events fire in schedule order.
    order: u64,
    kind: EventKind,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.order == other.order
    }
}
impl Eq for ScheduledEvent {}
impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.due, self.order).cmp(&(other.due, other.order))
    }
}

/// Queue consumer. Owns its own state; shares nothing with the controller
/// beyond the queue handle.
pub struct NotifyScheduler {
    queue: NotifyQueue,
    sink: Arc<dyn NotifySink>,
    settings: NotifySettings,
    schedule: BinaryHeap<Reverse<ScheduledEvent>>,
    live_visuals: HashSet<u64>,
    last_dispatch: HashMap<String, Instant>,
    next_order: u64,
    next_visual_id: u64,
}

impl NotifyScheduler {
    pub fn new(queue: NotifyQueue, sink: Arc<dyn NotifySink>, settings: NotifySettings) -> Self {
        Self {
            queue,
            sink,
            settings,
            schedule: BinaryHeap::new(),
            live_visuals: HashSet::new(),
            last_dispatch: HashMap::new(),
            next_order: 0,
            next_visual_id: 1,
        }
    }

    fn push_event(&mut self, due: Instant, kind: EventKind) {
        let order = self.next_order;
        self.next_order += 1;
        self.schedule.push(Reverse(ScheduledEvent { due, order, kind }));
    }

    /// One worker iteration: drain new items, fire due scheduled events,
    /// apply forced hides, forward visibility. Returns how long to sleep
    /// before the next pump.
    pub fn pump(&mut self, now: Instant) -> Duration {
        // New queue items: immediate ones dispatch here, delayed ones enter
        // the schedule.
        while let Some(item) = self.queue.pop() {
            match item.delay {
                Some(delay) if !delay.is_zero() => {
                    self.push_event(now + delay, EventKind::Dispatch(Box::new(item)));
                }
                _ => self.dispatch(item, now),
            }
        }

        // Due scheduled events, in time order.
        while self
            .schedule
            .peek()
            .is_some_and(|Reverse(ev)| ev.due <= now)
        {
            let Reverse(event) = self.schedule.pop().unwrap();
            match event.kind {
                EventKind::Dispatch(item) => self.dispatch(*item, now),
                EventKind::Show { id, visual } => {
                    self.live_visuals.insert(id);
                    if let Some(regex) = &visual.hide_regex {
                        self.queue.register_hide_pattern(id, Arc::clone(regex));
                    }
                    self.sink.show_visual(&VisualEvent {
                        id,
                        text: visual.text.clone(),
                        duration: visual.duration,
                        color: visual.color,
                    });
                    self.push_event(now + visual.duration, EventKind::Hide { id });
                }
                EventKind::Hide { id } => self.hide(id),
            }
        }

        // Early hides requested by the detection loop's hide pass.
        for id in self.queue.take_forced_hides() {
            self.hide(id);
        }

        if let Some(update) = self.queue.take_visibility() {
            self.sink.visibility(&update);
        }

        self.next_sleep(now)
    }

    fn hide(&mut self, id: u64) {
        // A forced hide may race the scheduled one; only the first counts.
        if self.live_visuals.remove(&id) {
            self.queue.unregister_hide_pattern(id);
            self.sink.hide_visual(id);
        }
    }

    fn dispatch(&mut self, item: NotifyItem, now: Instant) {
        let suppressed = self
            .last_dispatch
            .get(&item.text)
            .is_some_and(|last| now.duration_since(*last) < self.settings.debounce);
        if suppressed {
            tracing::debug!(text = %item.text, "duplicate notification suppressed");
            return;
        }
        self.last_dispatch.insert(item.text.clone(), now);
        if self.last_dispatch.len() > 256 {
            let horizon = self.settings.debounce * 10;
            self.last_dispatch
                .retain(|_, t| now.duration_since(*t) < horizon);
        }

        self.sink.notify(&item);

        for visual in item.visuals.iter().filter(|v| v.enabled) {
            let id = self.next_visual_id;
            self.next_visual_id += 1;
            let due = now + Duration::from_secs_f64(visual.delay.max(0.0));
            self.push_event(
                due,
                EventKind::Show {
                    id,
                    visual: ShowSpec {
                        text: visual.text.clone(),
                        duration: Duration::from_secs_f64(visual.duration.max(0.0)),
                        color: visual.color,
                        hide_regex: visual.hide_regex.clone(),
                    },
                },
            );
        }
    }

    fn next_sleep(&self, now: Instant) -> Duration {
        if !self.queue.is_empty() {
            return self.settings.fast;
        }
        match self.schedule.peek() {
            Some(Reverse(event)) => event
                .due
                .saturating_duration_since(now)
                .clamp(self.settings.fast, self.settings.idle),
            None => self.settings.idle,
        }
    }

    /// Run the worker until `shutdown` flips to true. In-flight work
    /// finishes; pending scheduled events are dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let sleep_for = self.pump(Instant::now());
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("notify worker stopping");
                        break;
                    }
                }
            }
        }
    }
}
