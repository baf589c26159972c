//! Wire protocol for the timetable scheduling server.
//!
//! A logical message is one JSON document, transmitted as one or more
//! frames that share a `messageId`. Replies reuse the request's id so the
//! client can correlate them.
//!
//! Components:
//! - frame: the universal frame format (header + payload slice)
//! - fragmenter: split a payload into an ordered frame sequence
//! - assembler: reassemble frames into complete payloads
//! - codec: length-prefixed JSON framing over a byte stream

pub mod assembler;
pub mod codec;
pub mod fragmenter;
pub mod frame;

pub use assembler::MessageAssembler;
pub use codec::{read_frame, write_frame, CodecError, MAX_WIRE_FRAME_BYTES};
pub use fragmenter::{fragment, fragment_with_id, generate_message_id, MAX_FRAGMENT_SIZE};
pub use frame::{MessageFrame, MessageHeader, MessageType};
