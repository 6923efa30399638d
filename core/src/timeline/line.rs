//! The Activity Line: the mutable, ordered runtime projection of the
//! activities currently in play for one timeline run.
//!
//! Instances are clones of immutable templates plus runtime flags, stored
//! in a flat table ordered by `seq`. Every structural change (splice,
//! truncate, append) renumbers so `seq` stays strictly increasing and equal
//! to the table index — the invariant the detection and tick loops rely on
//! for the done boundary and tie-breaks.

use crate::definition::ActivityTemplate;
use raidline_types::ActivityEmphasis;

/// Owned capture texts from the sync match that confirmed an activity.
#[derive(Debug, Clone, Default)]
pub struct CapturedMatch {
    pub pairs: Vec<(String, String)>,
}

/// One activity instance on the line.
#[derive(Debug, Clone)]
pub struct ActivityInstance {
    /// Stable per-instance id; survives renumbering.
    pub id: u64,

    /// Position in the line; reassigned on every structural change.
    pub seq: u64,

    /// Nominal time on the timeline (template time plus splice offset).
    pub time: f64,

    /// Subroutine this instance was instantiated from, if any.
    pub subroutine: Option<String>,

    pub template: ActivityTemplate,

    // ─── Runtime flags ──────────────────────────────────────────────────────
    pub is_active: bool,
    pub is_done: bool,
    pub is_notified: bool,
    pub is_synced: bool,
    pub is_visible: bool,
    pub emphasis: Option<ActivityEmphasis>,

    /// Call/goto from this instance has already run (sync and tick share the
    /// jump; whichever happens first wins).
    pub jump_executed: bool,

    pub matched: Option<CapturedMatch>,
}

impl ActivityInstance {
    fn from_template(template: &ActivityTemplate, offset: f64, sub: Option<&str>, id: u64) -> Self {
        Self {
            id,
            seq: 0,
            time: template.time + offset,
            subroutine: sub.map(str::to_string),
            template: template.clone(),
            is_active: false,
            is_done: false,
            is_notified: false,
            is_synced: false,
            is_visible: false,
            emphasis: None,
            jump_executed: false,
            matched: None,
        }
    }

    /// Sync window bounds `[time+start, time+end)` in timeline seconds.
    pub fn sync_window(&self) -> (f64, f64) {
        (
            self.time + self.template.sync_start,
            self.time + self.template.sync_end,
        )
    }

    pub fn in_sync_window(&self, clock: f64) -> bool {
        let (start, end) = self.sync_window();
        clock >= start && clock < end
    }

    /// Whether the advance notice is due at the given clock.
    pub fn notice_due(&self, clock: f64) -> bool {
        self.time + self.template.notice_offset <= clock
    }

    pub fn has_jump(&self) -> bool {
        self.template.call.is_some() || self.template.goto.is_some()
    }
}

/// Flat seq-ordered instance table.
#[derive(Debug, Default)]
pub struct ActivityLine {
    items: Vec<ActivityInstance>,
    next_id: u64,
}

impl ActivityLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ActivityInstance] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [ActivityInstance] {
        &mut self.items
    }

    pub fn by_id(&self, id: u64) -> Option<&ActivityInstance> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn by_id_mut(&mut self, id: u64) -> Option<&mut ActivityInstance> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    pub fn by_seq(&self, seq: u64) -> Option<&ActivityInstance> {
        self.items.iter().find(|i| i.seq == seq)
    }

    /// Instantiate enabled templates at the end of the line, nominal times
    /// offset by `offset` seconds.
    pub fn append(&mut self, templates: &[ActivityTemplate], offset: f64, sub: Option<&str>) {
        for template in templates.iter().filter(|t| t.enabled) {
            let id = self.alloc_id();
            self.items
                .push(ActivityInstance::from_template(template, offset, sub, id));
        }
        self.renumber();
    }

    /// Instantiate enabled templates immediately after the instance with the
    /// given seq (at the end when `after` is `None` or stale).
    pub fn splice_after(
        &mut self,
        after: Option<u64>,
        templates: &[ActivityTemplate],
        offset: f64,
        sub: Option<&str>,
    ) {
        let at = after
            .and_then(|seq| self.items.iter().position(|i| i.seq == seq))
            .map(|idx| idx + 1)
            .unwrap_or(self.items.len());

        let mut inserted = Vec::new();
        for template in templates.iter().filter(|t| t.enabled) {
            let id = self.alloc_id();
            inserted.push(ActivityInstance::from_template(template, offset, sub, id));
        }
        self.items.splice(at..at, inserted);
        self.renumber();
    }

    /// Remove every instance past the given seq.
    pub fn truncate_after(&mut self, seq: u64) {
        self.items.retain(|i| i.seq <= seq);
        self.renumber();
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn renumber(&mut self) {
        for (idx, item) in self.items.iter_mut().enumerate() {
            item.seq = idx as u64;
        }
    }

    /// Debug-time invariant check: `seq` strictly increasing in list order.
    #[cfg(test)]
    pub fn assert_ordered(&self) {
        for pair in self.items.windows(2) {
            assert!(pair[0].seq < pair[1].seq, "activity line out of order");
        }
    }
}
