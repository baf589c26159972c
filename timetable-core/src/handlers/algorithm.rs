//! Algorithm commands: list, run, stop, status.
//!
//! `run` starts the single supervised child and forwards its progress and
//! completion events as further replies correlated to the requesting
//! message id, so the client sees `started`, zero or more `progress`
//! updates, and exactly one terminal `completed` message.

use crate::algorithm::{AlgorithmRunner, AlgorithmScanner, RunEvent, RunnerError};
use crate::dispatch::MessageHandler;
use crate::system::SystemHandle;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use timetable_protocol::MessageType;
use tracing::{info, warn};

pub struct AlgorithmHandler {
    scanner: AlgorithmScanner,
    runner: Arc<AlgorithmRunner>,
}

impl AlgorithmHandler {
    pub fn new(scanner: AlgorithmScanner) -> Self {
        Self {
            scanner,
            runner: Arc::new(AlgorithmRunner::new()),
        }
    }

    fn send(&self, system: &SystemHandle, message_id: &str, reply: &Value) {
        system.send_message(message_id, &reply.to_string(), MessageType::Algorithm);
    }

    fn handle_list(&self, message_id: &str, system: &SystemHandle) {
        let mut algorithms = Vec::new();
        for info in self.scanner.list_all() {
            let mut entry = json!({
                "name": info.name,
                "displayName": info.display_name,
                "version": info.version,
                "description": info.description,
                "author": info.author,
                "type": info.algorithm_type,
                "supportsProgress": info.supports_progress,
            });
            if !info.parameters.is_empty() {
                if let Ok(parameters) = serde_json::to_value(&info.parameters) {
                    entry["parameters"] = parameters;
                }
            }
            algorithms.push(entry);
        }

        info!("listing {} algorithms", algorithms.len());
        self.send(system, message_id, &json!({"status": "success", "algorithms": algorithms}));
    }

    async fn handle_run(&self, message_id: &str, request: &Value, system: &Arc<SystemHandle>) {
        let Some(name) = request.get("name").and_then(|v| v.as_str()) else {
            self.send(system, message_id, &json!({
                "status": "error",
                "message": "Missing 'name' field",
                "error_code": "MISSING_NAME",
            }));
            return;
        };

        let Some(input_data) = request.get("data") else {
            self.send(system, message_id, &json!({
                "status": "error",
                "message": "Missing 'data' field",
                "error_code": "MISSING_DATA",
            }));
            return;
        };

        if self.runner.is_running() {
            self.send(system, message_id, &json!({
                "status": "error",
                "message": "Algorithm is already running",
                "error_code": "ALREADY_RUNNING",
            }));
            return;
        }

        if !self.scanner.has(name) {
            self.send(system, message_id, &json!({
                "status": "error",
                "message": format!("Algorithm not found: {name}"),
                "error_code": "ALGORITHM_NOT_FOUND",
            }));
            return;
        }

        let config = request.get("config").cloned().unwrap_or_else(|| json!({}));
        let config_errors = self.scanner.validate_config(name, &config);
        if !config_errors.is_empty() {
            self.send(system, message_id, &json!({
                "status": "error",
                "message": "Configuration validation failed",
                "error_code": "INVALID_CONFIG",
                "errors": config_errors,
            }));
            return;
        }

        // has() above guarantees the path exists
        let Some(algorithm_dir) = self.scanner.path_of(name) else {
            return;
        };

        info!("starting algorithm: {name}");
        let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
        let started = self
            .runner
            .start(algorithm_dir, input_data, &config, events_tx, system.algorithm_timeout())
            .await;

        match started {
            Ok(()) => {
                // Forward run events as correlated replies until completion.
                let system_clone = Arc::clone(system);
                let request_id = message_id.to_string();
                tokio::spawn(async move {
                    while let Some(event) = events_rx.recv().await {
                        match event {
                            RunEvent::Progress { progress, status, details } => {
                                let reply = json!({
                                    "status": "progress",
                                    "progress": progress,
                                    "phase": status,
                                    "details": details,
                                });
                                system_clone.send_message(&request_id, &reply.to_string(), MessageType::Algorithm);
                            }
                            RunEvent::Completed { result } => {
                                let reply = json!({
                                    "status": "completed",
                                    "message": "Algorithm execution completed",
                                    "result": result,
                                });
                                system_clone.send_message(&request_id, &reply.to_string(), MessageType::Algorithm);
                                break;
                            }
                        }
                    }
                });

                self.send(system, message_id, &json!({
                    "status": "started",
                    "algorithm": name,
                    "message": "Algorithm execution started",
                }));
            }
            Err(RunnerError::AlreadyRunning) => {
                self.send(system, message_id, &json!({
                    "status": "error",
                    "message": "Algorithm is already running",
                    "error_code": "ALREADY_RUNNING",
                }));
            }
            Err(e) => {
                warn!("failed to start algorithm {name}: {e}");
                self.send(system, message_id, &json!({
                    "status": "error",
                    "message": format!("Failed to start algorithm: {e}"),
                    "error_code": "START_FAILED",
                }));
            }
        }
    }

    async fn handle_stop(&self, message_id: &str, system: &SystemHandle) {
        if !self.runner.is_running() {
            self.send(system, message_id, &json!({
                "status": "error",
                "message": "No algorithm running",
                "error_code": "NOT_RUNNING",
            }));
            return;
        }

        info!("stopping running algorithm");
        self.runner.stop().await;
        self.send(system, message_id, &json!({
            "status": "success",
            "message": "Algorithm stopped",
        }));
    }

    fn handle_status(&self, message_id: &str, system: &SystemHandle) {
        let running = self.runner.is_running();
        let mut algorithm_status = json!({
            "running": running,
            "progress": self.runner.progress(),
            "status": self.runner.status(),
        });
        if !running {
            algorithm_status["result"] = self.runner.result();
        }

        self.send(system, message_id, &json!({
            "status": "success",
            "algorithm_status": algorithm_status,
        }));
    }
}

#[async_trait]
impl MessageHandler for AlgorithmHandler {
    fn handled_type(&self) -> MessageType {
        MessageType::Algorithm
    }

    async fn handle(&self, message_id: &str, payload: &str, system: Arc<SystemHandle>) -> Result<(), String> {
        let data: Value = match serde_json::from_str(payload) {
            Ok(data) => data,
            Err(e) => {
                warn!("algorithm message {message_id} is not valid JSON: {e}");
                self.send(&system, message_id, &json!({
                    "status": "error",
                    "message": "Invalid JSON format",
                    "error_code": "INVALID_JSON",
                }));
                return Ok(());
            }
        };

        let Some(command) = data.get("command").and_then(|v| v.as_str()) else {
            self.send(&system, message_id, &json!({
                "status": "error",
                "message": "No 'command' field found in payload",
                "error_code": "MISSING_COMMAND_FIELD",
            }));
            return Ok(());
        };

        match command {
            "list" => self.handle_list(message_id, &system),
            "run" => self.handle_run(message_id, &data, &system).await,
            "stop" => self.handle_stop(message_id, &system).await,
            "status" => self.handle_status(message_id, &system),
            other => {
                warn!("unknown algorithm command: {other}");
                self.send(&system, message_id, &json!({
                    "status": "error",
                    "message": format!("Unknown algorithm command: {other}"),
                    "error_code": "UNKNOWN_ALGORITHM_COMMAND",
                    "available_commands": ["list", "run", "stop", "status"],
                }));
            }
        }

        Ok(())
    }
}
