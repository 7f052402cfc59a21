//! Outbound commands and their wire encoding.
//!
//! Each command is a single opcode byte, optionally followed by parameters.
//! Parameters are carried in wide integers so that out-of-range requests
//! can be represented and rejected before anything reaches the queue.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::frame::Opcode;

/// Largest accepted wheel speed magnitude, in percent.
pub const MAX_SPEED: i32 = 100;

/// Commands the host can inject between telemetry polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Set the linear camera integration time in microseconds (0-65535).
    SetIntegrationTime(u32),
    /// Set left and right wheel speeds in percent (-100 to 100).
    Move { left: i32, right: i32 },
    /// Stop both wheels.
    Stop,
    /// Reset the device.
    ResetDevice,
}

/// Drive directions offered by the control pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Both wheels forwards.
    Forwards,
    /// Both wheels backwards.
    Back,
    /// Spin left on the spot.
    Left,
    /// Spin right on the spot.
    Right,
    /// Both wheels stopped.
    Stop,
}

impl Command {
    /// Builds the motor command for a direction at the given speed.
    ///
    /// Turning is done on the spot: one wheel runs backwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCommandParameter`] unless `speed` is 1-100.
    pub fn drive(direction: Direction, speed: i32) -> Result<Self> {
        if !(1..=MAX_SPEED).contains(&speed) {
            return Err(Error::InvalidCommandParameter {
                reason: format!("speed {speed} out of range (1 to {MAX_SPEED})"),
            });
        }
        Ok(match direction {
            Direction::Forwards => Self::Move {
                left: speed,
                right: speed,
            },
            Direction::Back => Self::Move {
                left: -speed,
                right: -speed,
            },
            Direction::Left => Self::Move {
                left: -speed,
                right: speed,
            },
            Direction::Right => Self::Move {
                left: speed,
                right: -speed,
            },
            Direction::Stop => Self::Stop,
        })
    }

    /// Checks that every parameter fits the wire format.
    pub fn validate(&self) -> Result<()> {
        self.encode().map(|_| ())
    }

    /// Encodes the command into the bytes sent to the device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCommandParameter`] if a parameter is out of range.
    pub fn encode(&self) -> Result<Bytes> {
        match *self {
            Self::SetIntegrationTime(value) => {
                let value = u16::try_from(value).map_err(|_| Error::InvalidCommandParameter {
                    reason: format!("integration time {value} out of range (0 to 65535)"),
                })?;
                let mut buf = BytesMut::with_capacity(3);
                buf.put_u8(Opcode::SetIntegrationTime.into());
                buf.put_u16(value);
                Ok(buf.freeze())
            }
            Self::Move { left, right } => {
                let mut buf = BytesMut::with_capacity(3);
                buf.put_u8(Opcode::SetSpeed.into());
                buf.put_u8(twos_complement(wheel_speed(left)?));
                buf.put_u8(twos_complement(wheel_speed(right)?));
                Ok(buf.freeze())
            }
            Self::Stop => Self::Move { left: 0, right: 0 }.encode(),
            Self::ResetDevice => Ok(Bytes::from_static(&[Opcode::Reset as u8])),
        }
    }
}

fn wheel_speed(speed: i32) -> Result<i8> {
    let out_of_range = || Error::InvalidCommandParameter {
        reason: format!("speed {speed} out of range (-{MAX_SPEED} to {MAX_SPEED})"),
    };
    if !(-MAX_SPEED..=MAX_SPEED).contains(&speed) {
        return Err(out_of_range());
    }
    i8::try_from(speed).map_err(|_| out_of_range())
}

/// Encodes a signed speed as the unsigned byte the motor controller expects.
#[must_use]
pub const fn twos_complement(speed: i8) -> u8 {
    u8::from_ne_bytes(speed.to_ne_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twos_complement() {
        assert_eq!(twos_complement(-20), 236);
        assert_eq!(twos_complement(0), 0);
        assert_eq!(twos_complement(100), 100);
        assert_eq!(twos_complement(-100), 156);
        assert_eq!(twos_complement(-1), 255);
    }

    #[test]
    fn test_encode_integration_time() {
        let bytes = Command::SetIntegrationTime(0x1234).encode().unwrap();
        assert_eq!(&bytes[..], b"t\x12\x34");

        let bytes = Command::SetIntegrationTime(65535).encode().unwrap();
        assert_eq!(&bytes[..], b"t\xff\xff");
    }

    #[test]
    fn test_encode_move() {
        let bytes = Command::Move {
            left: -20,
            right: 20,
        }
        .encode()
        .unwrap();
        assert_eq!(&bytes[..], &[b's', 236, 20]);
    }

    #[test]
    fn test_encode_stop_and_reset() {
        assert_eq!(&Command::Stop.encode().unwrap()[..], &[b's', 0, 0]);
        assert_eq!(&Command::ResetDevice.encode().unwrap()[..], b"r");
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(matches!(
            Command::SetIntegrationTime(70_000).validate(),
            Err(Error::InvalidCommandParameter { .. })
        ));
        assert!(matches!(
            Command::Move {
                left: 150,
                right: 0
            }
            .validate(),
            Err(Error::InvalidCommandParameter { .. })
        ));
        assert!(matches!(
            Command::Move {
                left: 0,
                right: -101
            }
            .validate(),
            Err(Error::InvalidCommandParameter { .. })
        ));
        assert!(
            Command::Move {
                left: -100,
                right: 100
            }
            .validate()
            .is_ok()
        );
    }

    #[test]
    fn test_validate_rejects_extreme_speeds() {
        for speed in [i32::MIN, i32::MAX, -101] {
            assert!(matches!(
                Command::Move {
                    left: speed,
                    right: 0
                }
                .validate(),
                Err(Error::InvalidCommandParameter { .. })
            ));
            assert!(matches!(
                Command::Move {
                    left: 0,
                    right: speed
                }
                .encode(),
                Err(Error::InvalidCommandParameter { .. })
            ));
        }
    }

    #[test]
    fn test_drive_directions() {
        assert_eq!(
            Command::drive(Direction::Forwards, 20).unwrap(),
            Command::Move {
                left: 20,
                right: 20
            }
        );
        assert_eq!(
            Command::drive(Direction::Back, 20).unwrap(),
            Command::Move {
                left: -20,
                right: -20
            }
        );
        assert_eq!(
            Command::drive(Direction::Left, 35).unwrap(),
            Command::Move {
                left: -35,
                right: 35
            }
        );
        assert_eq!(
            Command::drive(Direction::Right, 35).unwrap(),
            Command::Move {
                left: 35,
                right: -35
            }
        );
        assert_eq!(Command::drive(Direction::Stop, 50).unwrap(), Command::Stop);
    }

    #[test]
    fn test_drive_rejects_bad_speed() {
        assert!(Command::drive(Direction::Forwards, 0).is_err());
        assert!(Command::drive(Direction::Forwards, 150).is_err());
        assert!(Command::drive(Direction::Back, -5).is_err());
    }
}
