//! Wire protocol shared by the engine and its transports.
//!
//! Snapshots and control payloads are JSON; every message is tagged with
//! an integer opcode from a fixed enumeration.

/// Serialization errors for inbound payloads.
pub mod errors;

/// Opcodes and payload types.
pub mod messages;
