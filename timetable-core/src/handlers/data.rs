//! Data ingestion acknowledgment.

use crate::dispatch::MessageHandler;
use crate::schedule::ScheduleInput;
use crate::system::SystemHandle;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use timetable_protocol::MessageType;
use tracing::info;

pub struct DataHandler;

#[async_trait]
impl MessageHandler for DataHandler {
    fn handled_type(&self) -> MessageType {
        MessageType::Data
    }

    async fn handle(&self, message_id: &str, payload: &str, system: Arc<SystemHandle>) -> Result<(), String> {
        info!("received data message {message_id} ({} bytes)", payload.len());

        if let Ok(input) = serde_json::from_str::<ScheduleInput>(payload) {
            info!("data payload is schedule input: {}", input.summary());
        }

        let reply = json!({
            "status": "success",
            "message": "Data received and processed",
            "message_id": message_id,
            "timestamp": chrono::Utc::now().timestamp(),
        });
        system.send_message(message_id, &reply.to_string(), MessageType::Data);
        Ok(())
    }
}
