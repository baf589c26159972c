//! Split outgoing payloads into ordered frame sequences.
//!
//! Each call stamps a fresh message id; replies use [`fragment_with_id`] so
//! every produced frame carries the originating request's id.

use crate::frame::{MessageFrame, MessageType};
use uuid::Uuid;

/// Maximum payload bytes per frame. Leaves room for header overhead when a
/// frame rides inside a 4 KiB transfer unit.
pub const MAX_FRAGMENT_SIZE: usize = 4000;

/// Generate a fresh message id (canonical hyphenated UUID v4).
pub fn generate_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Fragment a payload under a newly generated message id.
pub fn fragment(payload: &str, message_type: MessageType) -> Vec<MessageFrame> {
    fragment_with_id(payload, message_type, &generate_message_id())
}

/// Fragment a payload under a caller-provided message id.
///
/// Sequence numbers are dense from 0 and only the final frame carries
/// `isLast`. Slices never split a UTF-8 character, so every frame payload
/// remains valid text; `payloadSize` is the byte length of the slice.
pub fn fragment_with_id(payload: &str, message_type: MessageType, message_id: &str) -> Vec<MessageFrame> {
    if payload.len() <= MAX_FRAGMENT_SIZE {
        return vec![MessageFrame::new(message_id, 0, true, message_type, payload)];
    }

    let mut frames = Vec::with_capacity(payload.len() / MAX_FRAGMENT_SIZE + 1);
    let mut offset = 0;
    let mut sequence_number = 0;

    while offset < payload.len() {
        let mut end = (offset + MAX_FRAGMENT_SIZE).min(payload.len());
        while !payload.is_char_boundary(end) {
            end -= 1;
        }
        let is_last = end == payload.len();
        frames.push(MessageFrame::new(
            message_id,
            sequence_number,
            is_last,
            message_type,
            &payload[offset..end],
        ));
        offset = end;
        sequence_number += 1;
    }

    frames
}
