//! Server control commands: ping, status, stop.

use crate::dispatch::MessageHandler;
use crate::system::SystemHandle;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use timetable_protocol::MessageType;
use tracing::{info, warn};

/// Delay before a `stop` command's shutdown request, so the success reply
/// reaches the wire first.
const STOP_FLUSH_DELAY: Duration = Duration::from_millis(200);

pub struct CommandHandler;

#[async_trait]
impl MessageHandler for CommandHandler {
    fn handled_type(&self) -> MessageType {
        MessageType::Command
    }

    async fn handle(&self, message_id: &str, payload: &str, system: Arc<SystemHandle>) -> Result<(), String> {
        let data: Value = match serde_json::from_str(payload) {
            Ok(data) => data,
            Err(e) => {
                warn!("command message {message_id} is not valid JSON: {e}");
                let reply = json!({
                    "status": "error",
                    "message": "Invalid JSON format",
                    "error_code": "INVALID_JSON",
                });
                system.send_message(message_id, &reply.to_string(), MessageType::Command);
                return Ok(());
            }
        };

        let Some(command) = data.get("command").and_then(|v| v.as_str()) else {
            let reply = json!({
                "status": "error",
                "message": "No 'command' field found in payload",
                "error_code": "MISSING_COMMAND_FIELD",
            });
            system.send_message(message_id, &reply.to_string(), MessageType::Command);
            return Ok(());
        };

        let reply = match command {
            "ping" => {
                info!("executing PING command");
                json!({
                    "status": "success",
                    "command": "ping",
                    "message": "pong",
                    "timestamp": chrono::Utc::now().timestamp(),
                })
            }
            "status" => {
                info!("executing STATUS command");
                json!({
                    "status": "success",
                    "command": "status",
                    "data": {
                        "server_running": system.is_running(),
                        "client_connected": system.is_client_connected(),
                        "uptime": system.uptime().as_secs(),
                    },
                })
            }
            "stop" => {
                info!("executing STOP command - shutdown requested");
                let reply = json!({
                    "status": "success",
                    "command": "stop",
                    "message": "Server shutdown initiated",
                });
                system.send_message(message_id, &reply.to_string(), MessageType::Command);

                // Request only - the top-level program performs the actual
                // teardown, never this task.
                let system = Arc::clone(&system);
                tokio::spawn(async move {
                    tokio::time::sleep(STOP_FLUSH_DELAY).await;
                    system.request_shutdown();
                });
                return Ok(());
            }
            other => {
                warn!("unknown command: {other}");
                json!({
                    "status": "error",
                    "message": format!("Unknown command: {other}"),
                    "error_code": "UNKNOWN_COMMAND",
                    "available_commands": ["stop", "status", "ping"],
                })
            }
        };

        system.send_message(message_id, &reply.to_string(), MessageType::Command);
        Ok(())
    }
}
