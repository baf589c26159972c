//! Shared harness: an in-process server plus a client speaking the real
//! wire protocol, and scratch algorithm packages.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use timetable_core::algorithm::AlgorithmScanner;
use timetable_core::handlers::{AlgorithmHandler, CommandHandler, DataHandler, DebugHandler};
use timetable_core::{ServerConfig, System};
use timetable_protocol::{
    fragment, read_frame, write_frame, MessageAssembler, MessageFrame, MessageType,
};
use tokio::net::TcpStream;

pub struct TestServer {
    pub system: Arc<System>,
    accept_task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start(algorithms_dir: &Path) -> Self {
        Self::start_with_timeout(algorithms_dir, Duration::from_secs(30)).await
    }

    pub async fn start_with_timeout(algorithms_dir: &Path, algorithm_timeout: Duration) -> Self {
        let config = ServerConfig {
            port: 0,
            algorithms_dir: algorithms_dir.to_path_buf(),
            algorithm_timeout,
        };

        let system = Arc::new(System::new(&config).expect("bind test server"));
        system.register_handler(Arc::new(DataHandler));
        system.register_handler(Arc::new(DebugHandler));
        system.register_handler(Arc::new(CommandHandler));
        system.register_handler(Arc::new(AlgorithmHandler::new(AlgorithmScanner::scan(
            algorithms_dir,
        ))));
        system.start();

        let accept_system = Arc::clone(&system);
        let accept_task = tokio::spawn(async move {
            let mut shutdown = accept_system.shutdown_requested();
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = accept_system.accept_connection() => {}
                }
            }
        });

        Self { system, accept_task }
    }

    pub fn addr(&self) -> SocketAddr {
        self.system.local_addr()
    }

    pub async fn shutdown(self) {
        self.system.stop().await;
        let _ = self.accept_task.await;
    }
}

pub struct TestClient {
    stream: TcpStream,
    assembler: MessageAssembler,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to test server");
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            assembler: MessageAssembler::new(),
        }
    }

    /// Send a payload as one logical message; returns its message id.
    pub async fn send(&mut self, payload: &str, message_type: MessageType) -> String {
        let frames = fragment(payload, message_type);
        let message_id = frames[0].header.message_id.clone();
        self.send_frames(&frames).await;
        message_id
    }

    pub async fn send_frames(&mut self, frames: &[MessageFrame]) {
        for frame in frames {
            write_frame(&mut self.stream, frame).await.expect("write frame");
        }
    }

    /// Receive complete messages until one arrives for `message_id`.
    pub async fn recv_reply(&mut self, message_id: &str) -> Value {
        self.recv_matching(message_id, |_| true, Duration::from_secs(10)).await
    }

    /// Receive messages correlated to `message_id` until `accept` matches;
    /// non-matching and unrelated messages are discarded.
    pub async fn recv_matching(
        &mut self,
        message_id: &str,
        accept: impl Fn(&Value) -> bool,
        wait: Duration,
    ) -> Value {
        tokio::time::timeout(wait, async {
            loop {
                let frame = read_frame(&mut self.stream).await.expect("read frame");
                let Some(completed) = self.assembler.add_fragment(frame) else {
                    continue;
                };
                let payload = self
                    .assembler
                    .assembled_payload(&completed)
                    .expect("complete message has a payload");
                self.assembler.cleanup(&completed);

                if completed == message_id {
                    let value: Value = serde_json::from_str(&payload).expect("reply is JSON");
                    if accept(&value) {
                        return value;
                    }
                }
            }
        })
        .await
        .expect("timed out waiting for reply")
    }
}

#[cfg(unix)]
pub fn write_algorithm_package(root: &Path, name: &str, script: &str, info: Option<Value>) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();

    let executable = dir.join("algorithm");
    std::fs::write(&executable, script).unwrap();
    std::fs::set_permissions(&executable, std::fs::Permissions::from_mode(0o755)).unwrap();

    if let Some(info) = info {
        std::fs::write(dir.join("info.json"), serde_json::to_string_pretty(&info).unwrap()).unwrap();
    }
    dir
}

/// Script honoring the file contract: reports progress, sleeps, then writes
/// a successful schedule.
pub fn success_script(sleep_secs: u32) -> String {
    format!(
        "#!/bin/sh\n\
         # argv: input output config progress\n\
         if [ -n \"$4\" ]; then printf '{{\"progress\":0.25,\"status\":\"optimizing\"}}' > \"$4\"; fi\n\
         sleep {sleep_secs}\n\
         if [ -n \"$4\" ]; then printf '{{\"progress\":0.9,\"status\":\"finalizing\"}}' > \"$4\"; fi\n\
         printf '{{\"status\":\"success\",\"schedule\":{{\"events\":[]}},\"metadata\":{{\"executionTimeMs\":{ms}}}}}' > \"$2\"\n",
        ms = sleep_secs * 1000,
    )
}

pub fn failing_script(exit_code: i32) -> String {
    format!("#!/bin/sh\nexit {exit_code}\n")
}

pub fn hanging_script(sleep_secs: u32) -> String {
    format!("#!/bin/sh\nsleep {sleep_secs}\n")
}

/// Snapshot of algorithm temp files currently in the system temp dir.
pub fn algorithm_temp_files() -> HashSet<PathBuf> {
    let Ok(entries) = std::fs::read_dir(std::env::temp_dir()) else {
        return HashSet::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("algorithm_") && n.ends_with(".json"))
        })
        .collect()
}

/// Wait until every algorithm temp file created after `before` is gone.
pub async fn assert_temp_files_cleaned(before: &HashSet<PathBuf>) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let leftover: Vec<PathBuf> = algorithm_temp_files().difference(before).cloned().collect();
        if leftover.is_empty() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("algorithm temp files not cleaned up: {leftover:?}");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
