//! Error types for the prisme library.

use thiserror::Error;

use crate::session::SessionState;

/// The main error type for prisme operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The serial port could not be acquired.
    #[error("could not open {port}: {source}")]
    LinkOpen {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// The initial integration time exchange failed.
    #[error("handshake failed: {0}")]
    Handshake(#[source] Box<Error>),

    /// Fewer bytes than requested arrived before the read timeout or EOF.
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    /// Writing to the link failed.
    #[error("link write failed: {0}")]
    LinkWrite(#[source] std::io::Error),

    /// I/O attempted on a link that is not open.
    #[error("link not open")]
    NotConnected,

    /// A command carried an out-of-range value.
    #[error("invalid command parameter: {reason}")]
    InvalidCommandParameter { reason: String },

    /// The operation is not allowed in the session's current state.
    #[error("operation not allowed while {state:?}")]
    InvalidState { state: SessionState },

    /// Serial port error outside of an open attempt.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Frame decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

impl Error {
    /// Returns true if this error means the link is gone.
    #[must_use]
    pub const fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Self::ShortRead { .. } | Self::LinkWrite(_) | Self::NotConnected
        )
    }
}

/// Frame-specific errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Frame does not have the length the protocol prescribes.
    #[error("incomplete frame: expected {expected} bytes, got {got}")]
    Incomplete { expected: usize, got: usize },
}

/// Result type alias for prisme operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_failure_classification() {
        assert!(Error::ShortRead { expected: 102, got: 3 }.is_link_failure());
        assert!(Error::LinkWrite(std::io::Error::other("gone")).is_link_failure());
        assert!(
            !Error::InvalidCommandParameter {
                reason: "x".into()
            }
            .is_link_failure()
        );
    }

    #[test]
    fn test_handshake_wraps_source() {
        let err = Error::Handshake(Box::new(Error::ShortRead {
            expected: 2,
            got: 0,
        }));
        assert_eq!(
            err.to_string(),
            "handshake failed: short read: expected 2 bytes, got 0"
        );
    }
}
