mod commands;
mod sink;

use std::io::Write;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;

use commands::App;
use raidline_core::config::AppConfig;
use raidline_core::context::EngineContext;
use raidline_core::exec::ProcessRunner;
use raidline_core::notify::{NotifyScheduler, NotifySink};
use raidline_core::source::{LogSource, QueueLogSource};
use raidline_core::timeline::TimelineController;
use raidline_core::TimelineManager;
use sink::StdoutSink;

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "raidline=info".into()),
        )
        .init();

    let config = AppConfig::load();
    let ctx = EngineContext::new(Arc::new(ProcessRunner::new()));
    let controller = Arc::new(TimelineController::new(
        ctx.clone(),
        config.controller_settings(),
    ));
    let manager = Arc::new(TimelineManager::new(ctx.clone(), Arc::clone(&controller)));
    let source = Arc::new(QueueLogSource::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = NotifyScheduler::new(
        ctx.queue.clone(),
        Arc::new(StdoutSink::new()) as Arc<dyn NotifySink>,
        config.notify_settings(),
    );
    let mut tasks = vec![tokio::spawn(scheduler.run(shutdown_rx.clone()))];
    tasks.extend(
        controller.spawn_drivers(Arc::clone(&source) as Arc<dyn LogSource>, shutdown_rx.clone()),
    );

    let timeline_dir = std::path::PathBuf::from(&config.timeline_directory);
    if timeline_dir.is_dir() {
        match manager.load_directory(&timeline_dir) {
            Ok(report) => println!("Loaded {} timeline(s)", report.loaded.len()),
            Err(e) => println!("{e}"),
        }
        match manager.spawn_watcher(timeline_dir, shutdown_rx.clone()) {
            Ok(handle) => tasks.push(handle),
            Err(e) => println!("Failed to start directory watcher: {e}"),
        }
    }

    let app = Arc::new(App::new(config, ctx, manager, controller, source));

    loop {
        let Some(line) = read_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match respond(line, Arc::clone(&app)).await {
            Ok(quit) => {
                if quit {
                    break;
                }
            }
            Err(err) => {
                writeln!(std::io::stdout(), "{err}").map_err(|e| e.to_string())?;
                std::io::stdout().flush().map_err(|e| e.to_string())?;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

async fn read_line() -> Result<Option<String>, String> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(line)),
            Err(e) => Err(e.to_string()),
        }
    })
    .await
    .map_err(|e| e.to_string())?
}

#[derive(Parser)]
#[command(version, about = "raidline timeline engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every timeline in a directory
    LoadDir {
        #[arg(short, long)]
        path: String,
    },
    /// List loaded timeline zones
    Zones,
    /// Simulate entering a zone
    Zone { name: String },
    /// Start the loaded timeline
    Start,
    /// Stop the running timeline
    Stop,
    /// Replay a log file through the engine
    Feed {
        #[arg(short, long)]
        path: String,
    },
    /// Inject a single log line
    Line { text: Vec<String> },
    /// Advance the virtual clock by seconds (simulated ticking)
    Advance { secs: f64 },
    /// Set a variable directly
    SetVar {
        name: String,
        value: String,
        #[arg(short, long)]
        zone: Option<String>,
    },
    /// Show live variables
    Vars,
    /// Show engine status and the activity line
    Status,
    Exit,
}

async fn respond(line: &str, app: Arc<App>) -> Result<bool, String> {
    let mut args = shlex::split(line).ok_or("error: Invalid quoting")?;
    args.insert(0, "raidline".to_string());
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;

    match &cli.command {
        Some(Commands::LoadDir { path }) => commands::load_dir(&app, path),
        Some(Commands::Zones) => commands::zones(&app),
        Some(Commands::Zone { name }) => commands::zone(&app, name),
        Some(Commands::Start) => commands::start(&app),
        Some(Commands::Stop) => commands::stop(&app),
        Some(Commands::Feed { path }) => commands::feed(&app, path),
        Some(Commands::Line { text }) => commands::line(&app, &text.join(" ")),
        Some(Commands::Advance { secs }) => commands::advance(&app, *secs),
        Some(Commands::SetVar { name, value, zone }) => {
            commands::set_var(&app, name, value, zone.as_deref())
        }
        Some(Commands::Vars) => commands::vars(&app),
        Some(Commands::Status) => commands::status(&app),
        Some(Commands::Exit) => return Ok(true),
        None => {}
    }
    Ok(false)
}
