//! Command handlers for the interactive loop.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Local;

use raidline_core::config::AppConfig;
use raidline_core::context::EngineContext;
use raidline_core::source::{LogRecord, QueueLogSource};
use raidline_core::timeline::TimelineController;
use raidline_core::vars::VarValue;
use raidline_core::TimelineManager;
use raidline_types::formatting::format_clock;

pub struct App {
    pub config: AppConfig,
    pub ctx: EngineContext,
    pub manager: Arc<TimelineManager>,
    pub controller: Arc<TimelineController>,
    pub source: Arc<QueueLogSource>,
    seq: AtomicU64,
}

impl App {
    pub fn new(
        config: AppConfig,
        ctx: EngineContext,
        manager: Arc<TimelineManager>,
        controller: Arc<TimelineController>,
        source: Arc<QueueLogSource>,
    ) -> Self {
        Self {
            config,
            ctx,
            manager,
            controller,
            source,
            seq: AtomicU64::new(1),
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}

pub fn load_dir(app: &App, path: &str) {
    match app.manager.load_directory(Path::new(path)) {
        Ok(report) => {
            println!("Loaded {} timeline(s): {:?}", report.loaded.len(), report.loaded);
            if !report.duplicates.is_empty() {
                println!("Duplicate zones skipped: {:?}", report.duplicates);
            }
            for (file, error) in &report.failed_files {
                println!("Failed {}: {}", file.display(), error);
            }
            for error in &report.node_errors {
                println!("Disabled node: {error}");
            }
        }
        Err(e) => println!("{e}"),
    }
}

pub fn zones(app: &App) {
    let zones = app.manager.zones();
    if zones.is_empty() {
        println!("No timelines loaded");
        return;
    }
    for zone in zones {
        println!("  {zone}");
    }
}

pub fn zone(app: &App, name: &str) {
    app.manager.on_zone_change(name);
    println!("Zone: {} ({:?})", name, app.controller.status());
}

pub fn start(app: &App) {
    if app.controller.start() {
        println!("Timeline running");
    } else {
        println!("Nothing to start");
    }
}

pub fn stop(app: &App) {
    app.controller.stop();
    println!("Timeline stopped");
}

pub fn feed(app: &App, path: &str) {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            println!("Failed to read {path}: {e}");
            return;
        }
    };
    let now = Local::now().naive_local();
    let mut count = 0usize;
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        app.source
            .push(LogRecord::new(now, line.trim(), app.next_seq()));
        count += 1;
    }
    println!("Queued {count} line(s)");
}

pub fn line(app: &App, text: &str) {
    app.source.push(LogRecord::new(
        Local::now().naive_local(),
        text,
        app.next_seq(),
    ));
}

pub fn advance(app: &App, secs: f64) {
    if secs <= 0.0 {
        println!("advance expects a positive number of seconds");
        return;
    }
    app.controller.advance(Duration::from_secs_f64(secs));
    println!("Clock: {}", format_clock(app.controller.clock_secs()));
}

pub fn set_var(app: &App, name: &str, value: &str, zone: Option<&str>) {
    let value = parse_value(value);
    app.manager.set_variable(name, value, zone.unwrap_or(""));
}

fn parse_value(raw: &str) -> VarValue {
    if let Ok(b) = raw.parse::<bool>() {
        VarValue::Bool(b)
    } else if let Ok(i) = raw.parse::<i64>() {
        VarValue::Int(i)
    } else {
        VarValue::Text(raw.to_string())
    }
}

pub fn vars(app: &App) {
    let views = app.ctx.vars.snapshot();
    if views.is_empty() {
        println!("No live variables");
        return;
    }
    for v in views {
        let zone = if v.zone.is_empty() { "<ephemeral>" } else { &v.zone };
        println!("  {} = {:?}  [{}]", v.name, v.value, zone);
    }
}

pub fn status(app: &App) {
    println!(
        "Status: {:?}  zone: {}  clock: {}  subroutine: {}",
        app.controller.status(),
        app.controller.zone(),
        format_clock(app.controller.clock_secs()),
        app.controller
            .current_subroutine()
            .unwrap_or_else(|| "-".to_string()),
    );
    println!("Timeline directory: {}", app.config.timeline_directory);
    for entry in app.controller.line_view() {
        let flags = format!(
            "{}{}{}{}",
            if entry.is_active { "A" } else { "-" },
            if entry.is_done { "D" } else { "-" },
            if entry.is_synced { "S" } else { "-" },
            if entry.is_visible { "V" } else { "-" },
        );
        println!(
            "  [{:>3}] {:>7}  {}  {}",
            entry.seq,
            format_clock(entry.time),
            flags,
            entry.text
        );
    }
}
