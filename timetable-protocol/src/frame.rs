//! Universal frame format for client/server messaging.
//!
//! Every transmission unit is a `MessageFrame`: a header identifying the
//! logical message plus a slice of its payload. The wire surface uses
//! camelCase field names and string enum variants.

use serde::{Deserialize, Serialize};

/// Routing class of a logical message. One handler is bound per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Data,
    Command,
    Debug,
    Algorithm,
}

/// Frame header shared by every fragment of a logical message.
///
/// `sequence_number` values are dense within a message (0..=L) and exactly
/// one frame carries `is_last`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeader {
    pub message_id: String,
    pub sequence_number: u32,
    pub is_last: bool,
    pub payload_size: usize,
    #[serde(rename = "type")]
    pub message_type: MessageType,
}

/// One unit of wire transmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFrame {
    pub header: MessageHeader,
    pub payload: String,
}

impl MessageFrame {
    /// Build a frame for one payload slice.
    pub fn new(
        message_id: impl Into<String>,
        sequence_number: u32,
        is_last: bool,
        message_type: MessageType,
        payload: impl Into<String>,
    ) -> Self {
        let payload = payload.into();
        Self {
            header: MessageHeader {
                message_id: message_id.into(),
                sequence_number,
                is_last,
                payload_size: payload.len(),
                message_type,
            },
            payload,
        }
    }
}
