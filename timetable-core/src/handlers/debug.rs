//! Debug commands: print_payload, uptime, server_info.
//!
//! The sub-selector lives in the `command` field, the same envelope the
//! Command and Algorithm handlers use.

use crate::dispatch::MessageHandler;
use crate::system::SystemHandle;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use timetable_protocol::MessageType;
use tracing::{info, warn};

pub struct DebugHandler;

#[async_trait]
impl MessageHandler for DebugHandler {
    fn handled_type(&self) -> MessageType {
        MessageType::Debug
    }

    async fn handle(&self, message_id: &str, payload: &str, system: Arc<SystemHandle>) -> Result<(), String> {
        let data: Value = match serde_json::from_str(payload) {
            Ok(data) => data,
            Err(e) => {
                warn!("debug message {message_id} is not valid JSON: {e}");
                let reply = json!({
                    "status": "error",
                    "message": "Invalid JSON format",
                    "error_code": "INVALID_JSON",
                });
                system.send_message(message_id, &reply.to_string(), MessageType::Debug);
                return Ok(());
            }
        };

        let Some(command) = data.get("command").and_then(|v| v.as_str()) else {
            let reply = json!({
                "status": "error",
                "message": "No 'command' field found in payload",
                "error_code": "MISSING_COMMAND_FIELD",
            });
            system.send_message(message_id, &reply.to_string(), MessageType::Debug);
            return Ok(());
        };

        let now = chrono::Utc::now().timestamp();
        let reply = match command {
            "print_payload" => {
                info!("debug print_payload for message {message_id}:\n{data:#}");
                json!({
                    "status": "success",
                    "debug": "print_payload",
                    "message": "Payload printed to server log",
                    "timestamp": now,
                })
            }
            "uptime" => {
                let uptime_seconds = system.uptime().as_secs();
                info!("debug uptime: {uptime_seconds}s");
                json!({
                    "status": "success",
                    "debug": "uptime",
                    "message": "Uptime reported",
                    "current_timestamp": now,
                    "uptime_seconds": uptime_seconds,
                })
            }
            "server_info" => {
                info!(
                    "debug server_info: running={}, client_connected={}",
                    system.is_running(),
                    system.is_client_connected()
                );
                json!({
                    "status": "success",
                    "debug": "server_info",
                    "data": {
                        "server_running": system.is_running(),
                        "client_connected": system.is_client_connected(),
                        "timestamp": now,
                    },
                })
            }
            other => {
                warn!("unknown debug command: {other}");
                json!({
                    "status": "error",
                    "message": format!("Unknown debug command: {other}"),
                    "error_code": "UNKNOWN_DEBUG_COMMAND",
                    "available_commands": ["print_payload", "uptime", "server_info"],
                })
            }
        };

        system.send_message(message_id, &reply.to_string(), MessageType::Debug);
        Ok(())
    }
}
