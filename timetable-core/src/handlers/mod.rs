//! Message handlers - one per `MessageType`.
//!
//! Every handler parses its payload, produces a structured JSON reply
//! correlated to the request id, and never lets a malformed payload
//! escalate past an `error_code` reply.

pub mod algorithm;
pub mod command;
pub mod data;
pub mod debug;

pub use algorithm::AlgorithmHandler;
pub use command::CommandHandler;
pub use data::DataHandler;
pub use debug::DebugHandler;
