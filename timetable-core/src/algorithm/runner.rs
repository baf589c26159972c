//! Single-run child-process supervision.
//!
//! One run: write input/config/progress files into the system temp dir,
//! spawn `<dir>/algorithm <input> <output> <config> <progress>` directly
//! (no shell), poll the progress file every 200 ms while waiting on the
//! child, and emit progress/completion events on a channel. Stop and
//! timeout both kill the child, so a terminal state always means the
//! process is gone. The temp files are an owned bundle removed on every
//! exit path.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Events emitted during one run. `Completed` arrives exactly once.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Progress {
        progress: f32,
        status: String,
        details: Value,
    },
    Completed {
        result: Value,
    },
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("an algorithm is already running")]
    AlreadyRunning,

    #[error("failed to prepare run files: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
struct RunState {
    progress: f32,
    status: String,
    result: Value,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            progress: 0.0,
            status: String::new(),
            result: Value::Null,
        }
    }
}

/// Supervises at most one algorithm child process.
pub struct AlgorithmRunner {
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    state: Arc<parking_lot::RwLock<RunState>>,
    stop_tx: parking_lot::Mutex<Option<watch::Sender<bool>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AlgorithmRunner {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            state: Arc::new(parking_lot::RwLock::new(RunState::default())),
            stop_tx: parking_lot::Mutex::new(None),
            worker: tokio::sync::Mutex::new(None),
        }
    }

    /// Begin a run. Rejects when a run is already active; the atomic swap
    /// makes concurrent starts observe exactly one success.
    pub async fn start(
        &self,
        algorithm_dir: &Path,
        input: &Value,
        config: &Value,
        events: mpsc::UnboundedSender<RunEvent>,
        timeout: Duration,
    ) -> Result<(), RunnerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RunnerError::AlreadyRunning);
        }

        self.stop_requested.store(false, Ordering::SeqCst);
        *self.state.write() = RunState {
            status: "initializing".to_string(),
            ..RunState::default()
        };

        let files = match RunFiles::create(input, config).await {
            Ok(files) => files,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        *self.stop_tx.lock() = Some(stop_tx);

        let worker = tokio::spawn(supervise(SuperviseArgs {
            executable: algorithm_dir.join("algorithm"),
            files,
            events,
            running: Arc::clone(&self.running),
            stop_requested: Arc::clone(&self.stop_requested),
            state: Arc::clone(&self.state),
            stop_rx,
            timeout,
        }));
        *self.worker.lock().await = Some(worker);

        Ok(())
    }

    /// Request the run to stop and wait for the supervisor to drain.
    /// Idempotent; a no-op when nothing is running.
    pub async fn stop(&self) {
        if self.running.load(Ordering::SeqCst) {
            self.stop_requested.store(true, Ordering::SeqCst);
            if let Some(stop_tx) = self.stop_tx.lock().take() {
                let _ = stop_tx.send(true);
            }
        }

        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> f32 {
        self.state.read().progress
    }

    pub fn status(&self) -> String {
        self.state.read().status.clone()
    }

    pub fn result(&self) -> Value {
        self.state.read().result.clone()
    }
}

impl Default for AlgorithmRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// The four per-run temp files. Removal is guaranteed: the supervisor
/// removes them on every terminal path, and `Drop` covers abandonment.
struct RunFiles {
    input: PathBuf,
    output: PathBuf,
    config: PathBuf,
    progress: PathBuf,
}

impl RunFiles {
    async fn create(input_data: &Value, config_data: &Value) -> std::io::Result<Self> {
        let temp_dir = std::env::temp_dir();
        let tag = Uuid::new_v4().simple().to_string();
        let path_for = |kind: &str| temp_dir.join(format!("algorithm_{kind}_{tag}.json"));

        let files = Self {
            input: path_for("input"),
            output: path_for("output"),
            config: path_for("config"),
            progress: path_for("progress"),
        };

        tokio::fs::write(&files.input, format_json(input_data)).await?;
        tokio::fs::write(&files.config, format_json(config_data)).await?;
        tokio::fs::write(&files.progress, "{}").await?;

        Ok(files)
    }

    fn paths(&self) -> [&Path; 4] {
        [&self.input, &self.output, &self.config, &self.progress]
    }

    async fn cleanup(&self) {
        for path in self.paths() {
            let _ = tokio::fs::remove_file(path).await;
        }
    }
}

impl Drop for RunFiles {
    fn drop(&mut self) {
        for path in self.paths() {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

struct SuperviseArgs {
    executable: PathBuf,
    files: RunFiles,
    events: mpsc::UnboundedSender<RunEvent>,
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    state: Arc<parking_lot::RwLock<RunState>>,
    stop_rx: watch::Receiver<bool>,
    timeout: Duration,
}

async fn supervise(args: SuperviseArgs) {
    let SuperviseArgs {
        executable,
        files,
        events,
        running,
        stop_requested,
        state,
        stop_rx,
        timeout,
    } = args;

    state.write().status = "starting".to_string();
    info!("running algorithm: {}", executable.display());

    let spawned = Command::new(&executable)
        .arg(&files.input)
        .arg(&files.output)
        .arg(&files.config)
        .arg(&files.progress)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            error!("failed to spawn {}: {e}", executable.display());
            let result = json!({
                "status": "error",
                "errorMessage": format!("Failed to start algorithm process: {e}"),
            });
            {
                let mut run_state = state.write();
                run_state.status = "error".to_string();
                run_state.result = result.clone();
            }
            running.store(false, Ordering::SeqCst);
            let _ = events.send(RunEvent::Completed { result });
            files.cleanup().await;
            return;
        }
    };

    let started = Instant::now();
    let mut stopped = false;
    let mut timed_out = false;

    // Bounded waits on the child; every wakeup doubles as a progress poll
    // and timeout check. `Child::wait` is safe to call repeatedly.
    let exit = loop {
        match tokio::time::timeout(PROGRESS_POLL_INTERVAL, child.wait()).await {
            Ok(status) => break status,
            Err(_) => {
                if !stopped && *stop_rx.borrow() {
                    stopped = true;
                    stop_requested.store(true, Ordering::SeqCst);
                    info!("stop requested, terminating algorithm process");
                    let _ = child.start_kill();
                }

                poll_progress(&files.progress, &state, &events).await;

                if !timed_out && !stopped && started.elapsed() > timeout {
                    timed_out = true;
                    stop_requested.store(true, Ordering::SeqCst);
                    state.write().status = "timeout".to_string();
                    warn!("algorithm timed out after {:?}, terminating", started.elapsed());
                    let _ = child.start_kill();
                }
            }
        }
    };

    let result = if timed_out {
        let mut run_state = state.write();
        run_state.status = "timeout".to_string();
        run_state.result = json!({
            "status": "error",
            "errorMessage": format!("Algorithm timed out after {} seconds", timeout.as_secs()),
        });
        run_state.result.clone()
    } else if stopped {
        let mut run_state = state.write();
        run_state.status = "stopped".to_string();
        run_state.progress = 0.0;
        run_state.result = json!({
            "status": "error",
            "errorMessage": "Algorithm run was stopped",
        });
        run_state.result.clone()
    } else {
        match exit {
            Ok(status) if status.success() => read_run_output(&files.output, &state).await,
            Ok(status) => {
                let code = status.code().unwrap_or(-1);
                let mut run_state = state.write();
                run_state.status = "failed".to_string();
                run_state.result = json!({
                    "status": "error",
                    "errorMessage": format!("Algorithm exited with code {code}"),
                });
                run_state.result.clone()
            }
            Err(e) => {
                let mut run_state = state.write();
                run_state.status = "failed".to_string();
                run_state.result = json!({
                    "status": "error",
                    "errorMessage": format!("Could not wait for algorithm process: {e}"),
                });
                run_state.result.clone()
            }
        }
    };

    let final_status = state.read().status.clone();
    info!("algorithm finished with status '{final_status}'");

    running.store(false, Ordering::SeqCst);
    let _ = events.send(RunEvent::Completed { result });
    files.cleanup().await;
}

/// Read the progress file and forward its content. Unreadable or partially
/// written JSON is skipped; the algorithm may not support progress at all.
async fn poll_progress(
    progress_file: &Path,
    state: &Arc<parking_lot::RwLock<RunState>>,
    events: &mpsc::UnboundedSender<RunEvent>,
) {
    let Ok(text) = tokio::fs::read_to_string(progress_file).await else {
        return;
    };
    let Ok(details) = serde_json::from_str::<Value>(&text) else {
        return;
    };

    let (progress, status) = {
        let mut run_state = state.write();
        if let Some(progress) = details.get("progress").and_then(|v| v.as_f64()) {
            run_state.progress = (progress as f32).clamp(0.0, 1.0);
        }
        if let Some(status) = details.get("status").and_then(|v| v.as_str()) {
            run_state.status = status.to_string();
        }
        (run_state.progress, run_state.status.clone())
    };

    let _ = events.send(RunEvent::Progress { progress, status, details });
}

/// Parse and validate the output file after a zero exit.
async fn read_run_output(output_file: &Path, state: &Arc<parking_lot::RwLock<RunState>>) -> Value {
    let outcome = match tokio::fs::read_to_string(output_file).await {
        Ok(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value) if validate_result(&value) => Ok(value),
            Ok(_) => Err("Invalid result format".to_string()),
            Err(e) => Err(format!("Error reading result: {e}")),
        },
        Err(e) => Err(format!("Could not read output file: {e}")),
    };

    let mut run_state = state.write();
    match outcome {
        Ok(value) => {
            run_state.status = "completed".to_string();
            run_state.progress = 1.0;
            run_state.result = value;
        }
        Err(message) => {
            run_state.status = "error".to_string();
            run_state.result = json!({"status": "error", "errorMessage": message});
        }
    }
    run_state.result.clone()
}

/// A result must be `{status: success|no_solution|error, ...}` and a
/// successful one must carry a schedule.
fn validate_result(result: &Value) -> bool {
    if !result.is_object() {
        return false;
    }
    let Some(status) = result.get("status").and_then(|v| v.as_str()) else {
        return false;
    };
    match status {
        "success" => result.get("schedule").is_some(),
        "no_solution" | "error" => true,
        _ => false,
    }
}
