//! External side-effect dispatch: process launches and HTTP-style targets.
//!
//! The matching core never blocks on side effects. A matched `exec` is
//! turned into an [`ExecRequest`] and handed to the context's runner, which
//! dispatches on a background task, fire-and-forget; failures are logged and
//! never reach the detection or tick loops.

use std::sync::Mutex;
use std::time::Duration;

use crate::definition::ExecDef;

/// A resolved side-effect request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecRequest {
    /// Executable path or URL.
    pub target: String,
    pub args: Vec<String>,
    /// Launch without a visible window (host-dependent).
    pub hidden: bool,
    /// Dispatch delay from the `wait <seconds>` prefix.
    pub delay: Option<Duration>,
}

impl ExecRequest {
    /// Build a request from a definition, resolving the `wait <seconds>`
    /// prefix and inline arguments in the command string.
    pub fn from_def(def: &ExecDef) -> Option<Self> {
        let (delay, rest) = parse_wait_prefix(&def.command);
        let mut parts = rest.split_whitespace();
        let target = parts.next()?.to_string();
        let mut args: Vec<String> = parts.map(str::to_string).collect();
        args.extend(def.args.iter().cloned());
        Some(Self {
            target,
            args,
            hidden: def.hidden,
            delay,
        })
    }

    pub fn is_url(&self) -> bool {
        self.target.starts_with("http://") || self.target.starts_with("https://")
    }
}

/// Split a `wait <seconds> ` prefix off a command string.
pub fn parse_wait_prefix(command: &str) -> (Option<Duration>, &str) {
    let trimmed = command.trim_start();
    let Some(rest) = trimmed.strip_prefix("wait ") else {
        return (None, trimmed);
    };
    let rest = rest.trim_start();
    let Some((secs_str, command_part)) = rest.split_once(char::is_whitespace) else {
        return (None, trimmed);
    };
    match secs_str.parse::<f64>() {
        Ok(secs) if secs >= 0.0 => (
            Some(Duration::from_secs_f64(secs)),
            command_part.trim_start(),
        ),
        _ => (None, trimmed),
    }
}

/// Consumer of side-effect requests. Hosts provide their own (e.g. a REST
/// runner); the engine ships a process launcher and a buffering recorder.
pub trait ExecRunner: Send + Sync {
    fn dispatch(&self, request: ExecRequest);
}

/// Launches processes on the tokio runtime captured at construction.
/// URL targets are logged and left to an external HTTP runner.
#[derive(Debug)]
pub struct ProcessRunner {
    handle: tokio::runtime::Handle,
}

impl ProcessRunner {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl ExecRunner for ProcessRunner {
    fn dispatch(&self, request: ExecRequest) {
        self.handle.spawn(async move {
            if let Some(delay) = request.delay {
                tokio::time::sleep(delay).await;
            }

            if request.is_url() {
                tracing::info!(url = %request.target, "HTTP side effect delegated to external runner");
                return;
            }

            let result = tokio::process::Command::new(&request.target)
                .args(&request.args)
                .spawn();
            match result {
                Ok(mut child) => {
                    if let Err(e) = child.wait().await {
                        tracing::error!(target = %request.target, error = %e, "side-effect process failed");
                    }
                }
                Err(e) => {
                    tracing::error!(target = %request.target, error = %e, "failed to launch side-effect process");
                }
            }
        });
    }
}

/// Buffers requests instead of launching them. For tests and dry-run hosts.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    requests: Mutex<Vec<ExecRequest>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<ExecRequest> {
        std::mem::take(&mut self.requests.lock().unwrap())
    }
}

impl ExecRunner for RecordingRunner {
    fn dispatch(&self, request: ExecRequest) {
        self.requests.lock().unwrap().push(request);
    }
}
