//! Protocol definitions for PRisme communication.
//!
//! This module contains the low-level protocol types:
//! - Request opcodes and frame sizes
//! - Outbound commands and their encoding

pub mod command;
pub mod frame;

pub use command::{Command, Direction, MAX_SPEED, twos_complement};
pub use frame::{
    HANDSHAKE_REPLY_LEN, LINEAR_FRAME_LEN, Opcode, PROXIMITY_FRAME_LEN, decode_integration_time,
};
