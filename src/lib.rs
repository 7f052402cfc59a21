//! # prisme
//!
//! Telemetry polling and motor control for PRisme robots over a serial link.
//!
//! A PRisme robot carries a 102-pixel linear camera, five infrared proximity
//! sensors and two drive motors. The host polls it continuously for
//! telemetry and slips motor and camera commands in between polls.
//!
//! ## Quick Start
//!
//! ```no_run
//! use prisme::{Command, Direction, Event, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), prisme::Error> {
//!     let mut session = Session::serial();
//!     let mut events = session.subscribe().expect("first subscription");
//!     let integration_time = session.start("/dev/ttyACM0").await?;
//!     println!("Integration time: {integration_time}us");
//!
//!     session.submit_command(Command::drive(Direction::Forwards, 20)?)?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             Event::Snapshot(delivery) => {
//!                 let metrics = delivery.snapshot().metrics;
//!                 println!("peak at {} ({})", metrics.peak_index, metrics.max);
//!                 delivery.acknowledge();
//!             }
//!             Event::Stopped => break,
//!             Event::Disconnected(e) => return Err(e),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`] - Request opcodes, frame sizes and command encoding
//! - [`types`] - Telemetry snapshots and derived statistics
//! - [`transport`] - Serial and in-memory links
//! - [`queue`] - Pending command mailbox
//! - [`event`] - Snapshot delivery and acknowledgement
//! - [`session`] - The polling [`Session`]

pub mod error;
pub mod event;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use error::{Error, FrameError, Result};
pub use event::{Event, SnapshotDelivery, Subscription};
pub use protocol::{Command, Direction, Opcode, twos_complement};
pub use queue::CommandQueue;
pub use session::{Session, SessionConfig, SessionHandle, SessionState};
pub use transport::{Link, MockDevice, MockLink, SerialConfig, SerialLink, serial::list_ports};
pub use types::{IntensityMetrics, TelemetrySnapshot};
