//! Wire constants and fixed-size frame decoding for the PRisme protocol.
//!
//! The protocol is strictly request/response with a single request in flight:
//! ```text
//! host → device          device → host
//! ─────────────          ─────────────────────────────────────
//! 'c'                    integration time (u16, big-endian)
//! 'd'                    102 × intensity (u8) ‖ 5 × proximity (u8)
//! 't' hi lo              -
//! 's' left right         -
//! 'r'                    -
//! ```

use crate::error::FrameError;

/// Number of pixels on the linear camera.
pub const LINEAR_FRAME_LEN: usize = 102;

/// Number of infrared proximity sensors.
pub const PROXIMITY_FRAME_LEN: usize = 5;

/// Size of the handshake reply.
pub const HANDSHAKE_REPLY_LEN: usize = 2;

/// Host-to-device request bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Request one telemetry frame.
    Poll = b'd',
    /// Query the current integration time.
    Handshake = b'c',
    /// Set the linear camera integration time.
    SetIntegrationTime = b't',
    /// Set both wheel speeds.
    SetSpeed = b's',
    /// Reset the device, stopping the motors.
    Reset = b'r',
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op as Self
    }
}

/// Decodes the handshake reply into the integration time in microseconds.
///
/// # Errors
///
/// Returns [`FrameError::Incomplete`] unless `data` is exactly two bytes.
pub fn decode_integration_time(data: &[u8]) -> Result<u16, FrameError> {
    match *data {
        [hi, lo] => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err(FrameError::Incomplete {
            expected: HANDSHAKE_REPLY_LEN,
            got: data.len(),
        }),
    }
}
