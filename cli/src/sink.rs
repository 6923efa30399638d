//! Stdout notification sink.

use raidline_core::notify::{NotifyItem, NotifySink, VisibilityUpdate, VisualEvent};
use raidline_types::formatting::format_clock;

pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

impl NotifySink for StdoutSink {
    fn notify(&self, item: &NotifyItem) {
        let device = if item.device.wants_audio() && item.device.wants_text() {
            "both"
        } else if item.device.wants_audio() {
            "audio"
        } else {
            "text"
        };
        println!(">> [{device}] {}", item.resolved_notice());
    }

    fn show_visual(&self, event: &VisualEvent) {
        println!(
            "** visual #{} \"{}\" for {:.1}s",
            event.id,
            event.text,
            event.duration.as_secs_f64()
        );
    }

    fn hide_visual(&self, id: u64) {
        println!("** visual #{id} hidden");
    }

    fn visibility(&self, update: &VisibilityUpdate) {
        let entries: Vec<String> = update
            .entries
            .iter()
            .map(|e| format!("{} @ {}", e.text, format_clock(e.time)))
            .collect();
        println!("-- upcoming: {}", entries.join(" | "));
    }
}
