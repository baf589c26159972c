//! Reassemble inbound frames into complete payloads.
//!
//! Frames accumulate per message id until the dense sequence 0..=L is
//! present, where L is the sequence number of the `isLast` frame. The
//! assembler is confined to the message-loop task, so it needs no locking.

use crate::frame::{MessageFrame, MessageType};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MessageAssembler {
    incomplete: HashMap<String, Vec<MessageFrame>>,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a frame. Returns the message id iff that message just became
    /// complete. Frames for an already-complete message are still inserted
    /// but reported as incomplete; the next `cleanup` discards them.
    pub fn add_fragment(&mut self, frame: MessageFrame) -> Option<String> {
        let message_id = frame.header.message_id.clone();
        let fragments = self.incomplete.entry(message_id.clone()).or_default();
        fragments.push(frame);
        is_complete(fragments).then_some(message_id)
    }

    /// Concatenated payload in ascending sequence order, iff complete.
    pub fn assembled_payload(&self, message_id: &str) -> Option<String> {
        let fragments = self.incomplete.get(message_id)?;
        if !is_complete(fragments) {
            return None;
        }

        let mut ordered: Vec<&MessageFrame> = fragments.iter().collect();
        ordered.sort_by_key(|f| f.header.sequence_number);

        Some(ordered.iter().map(|f| f.payload.as_str()).collect())
    }

    /// Message type of an accumulated message (all frames share it).
    pub fn message_type(&self, message_id: &str) -> Option<MessageType> {
        self.incomplete
            .get(message_id)
            .and_then(|fragments| fragments.first())
            .map(|f| f.header.message_type)
    }

    /// Erase all state for a message id.
    pub fn cleanup(&mut self, message_id: &str) {
        self.incomplete.remove(message_id);
    }

    /// Number of messages with accumulated frames that are not yet complete.
    pub fn incomplete_count(&self) -> usize {
        self.incomplete.values().filter(|fragments| !is_complete(fragments.as_slice())).count()
    }
}

/// Complete iff some frame carries `isLast` at sequence L, exactly L+1
/// frames accumulated, and every value of 0..=L is present.
fn is_complete(fragments: &[MessageFrame]) -> bool {
    if fragments.is_empty() {
        return false;
    }

    let Some(last_sequence) = fragments
        .iter()
        .rev()
        .find(|f| f.header.is_last)
        .map(|f| f.header.sequence_number)
    else {
        return false;
    };

    let expected = last_sequence as usize + 1;
    if fragments.len() != expected {
        return false;
    }

    let mut seen = vec![false; expected];
    for fragment in fragments {
        let seq = fragment.header.sequence_number;
        if seq <= last_sequence {
            seen[seq as usize] = true;
        }
    }
    seen.into_iter().all(|s| s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragmenter::{fragment, fragment_with_id};

    fn frame(id: &str, seq: u32, is_last: bool, payload: &str) -> MessageFrame {
        MessageFrame::new(id, seq, is_last, MessageType::Data, payload)
    }

    #[test]
    fn single_frame_message_completes_immediately() {
        let mut assembler = MessageAssembler::new();
        let completed = assembler.add_fragment(frame("m1", 0, true, "hello"));
        assert_eq!(completed.as_deref(), Some("m1"));
        assert_eq!(assembler.assembled_payload("m1").as_deref(), Some("hello"));
        assert_eq!(assembler.message_type("m1"), Some(MessageType::Data));
    }

    #[test]
    fn fragmented_message_completes_on_final_piece() {
        let mut assembler = MessageAssembler::new();
        assert_eq!(assembler.add_fragment(frame("m1", 0, false, "aa")), None);
        assert_eq!(assembler.add_fragment(frame("m1", 1, false, "bb")), None);
        assert_eq!(assembler.add_fragment(frame("m1", 2, true, "cc")).as_deref(), Some("m1"));
        assert_eq!(assembler.assembled_payload("m1").as_deref(), Some("aabbcc"));
    }

    #[test]
    fn out_of_order_arrival_assembles_in_sequence_order() {
        let mut assembler = MessageAssembler::new();
        assert_eq!(assembler.add_fragment(frame("m1", 2, true, "cc")), None);
        assert_eq!(assembler.add_fragment(frame("m1", 0, false, "aa")), None);
        assert_eq!(assembler.add_fragment(frame("m1", 1, false, "bb")).as_deref(), Some("m1"));
        assert_eq!(assembler.assembled_payload("m1").as_deref(), Some("aabbcc"));
    }

    #[test]
    fn roundtrip_with_fragmenter_preserves_payload_and_type() {
        let payload = "z".repeat(12_345);
        let frames = fragment(&payload, MessageType::Algorithm);
        let id = frames[0].header.message_id.clone();

        // Feed in reverse arrival order
        let mut assembler = MessageAssembler::new();
        let mut completed = None;
        for frame in frames.into_iter().rev() {
            completed = assembler.add_fragment(frame);
        }

        assert_eq!(completed.as_deref(), Some(id.as_str()));
        assert_eq!(assembler.assembled_payload(&id).as_deref(), Some(payload.as_str()));
        assert_eq!(assembler.message_type(&id), Some(MessageType::Algorithm));
    }

    #[test]
    fn missing_middle_fragment_stays_incomplete() {
        let mut assembler = MessageAssembler::new();
        assert_eq!(assembler.add_fragment(frame("m1", 0, false, "aa")), None);
        assert_eq!(assembler.add_fragment(frame("m1", 2, true, "cc")), None);
        assert_eq!(assembler.assembled_payload("m1"), None);
        assert_eq!(assembler.incomplete_count(), 1);
    }

    #[test]
    fn duplicate_sequence_numbers_stay_incomplete() {
        let mut assembler = MessageAssembler::new();
        assert_eq!(assembler.add_fragment(frame("m1", 0, false, "aa")), None);
        assert_eq!(assembler.add_fragment(frame("m1", 0, false, "aa")), None);
        assert_eq!(assembler.add_fragment(frame("m1", 1, true, "bb")), None);
        assert_eq!(assembler.assembled_payload("m1"), None);
    }

    #[test]
    fn out_of_range_sequence_number_stays_incomplete() {
        let mut assembler = MessageAssembler::new();
        assert_eq!(assembler.add_fragment(frame("m1", 0, false, "aa")), None);
        assert_eq!(assembler.add_fragment(frame("m1", 1, true, "bb")), None);
        // Late stray with a sequence beyond the declared end
        let mut stray = MessageAssembler::new();
        assert_eq!(stray.add_fragment(frame("m2", 5, false, "zz")), None);
        assert_eq!(stray.add_fragment(frame("m2", 0, true, "aa")), None);
        assert_eq!(stray.assembled_payload("m2"), None);
        // The well-formed message still assembled
        assert_eq!(assembler.assembled_payload("m1").as_deref(), Some("aabb"));
    }

    #[test]
    fn cleanup_erases_state_and_allows_reuse() {
        let mut assembler = MessageAssembler::new();
        assembler.add_fragment(frame("m1", 0, true, "first"));
        assembler.cleanup("m1");
        assert_eq!(assembler.assembled_payload("m1"), None);
        assert_eq!(assembler.incomplete_count(), 0);

        // Same id starts a fresh entry
        let completed = assembler.add_fragment(frame("m1", 0, true, "second"));
        assert_eq!(completed.as_deref(), Some("m1"));
        assert_eq!(assembler.assembled_payload("m1").as_deref(), Some("second"));
    }

    #[test]
    fn interleaved_messages_assemble_independently() {
        let a = fragment_with_id(&"a".repeat(8100), MessageType::Command, "msg-a");
        let b = fragment_with_id(&"b".repeat(8100), MessageType::Data, "msg-b");

        let mut assembler = MessageAssembler::new();
        for (fa, fb) in a.iter().zip(b.iter()) {
            assembler.add_fragment(fa.clone());
            assembler.add_fragment(fb.clone());
        }

        assert_eq!(assembler.assembled_payload("msg-a").unwrap(), "a".repeat(8100));
        assert_eq!(assembler.assembled_payload("msg-b").unwrap(), "b".repeat(8100));
        assert_eq!(assembler.message_type("msg-a"), Some(MessageType::Command));
        assert_eq!(assembler.message_type("msg-b"), Some(MessageType::Data));
    }
}
