//! Timetable scheduling server core.
//!
//! A single-client TCP server that exchanges length-prefixed JSON message
//! frames, reassembles fragmented messages, dispatches them to
//! per-type handlers, and supervises external scheduling algorithms as
//! child processes.
//!
//! Design principles:
//! - Message passing via Tokio channels (no shared queues behind CVs)
//! - Trait-based handler seam, registered once at startup
//! - Bounded waits everywhere; shutdown is requested, never self-joined

pub mod algorithm;
pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod schedule;
pub mod system;
pub mod transport;

pub use config::ServerConfig;
pub use dispatch::{HandlerRegistry, MessageHandler};
pub use system::{System, SystemHandle};
pub use transport::{ConnectionState, TcpTransport, TransportEvent};
