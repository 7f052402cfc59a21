//! Transport layer for PRisme communication.
//!
//! A [`Link`] is the byte pipe the session polls through. [`SerialLink`]
//! talks to real hardware; [`MockLink`] emulates a device in memory.

pub mod mock;
pub mod serial;

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::Result;

/// Trait for link implementations.
///
/// A link is created closed, opened once, and used by a single session.
pub trait Link: Send {
    /// Opens the named port.
    fn open<'a>(&'a mut self, port: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Releases the port. Closing a closed link does nothing.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Writes all of `data` and flushes it.
    fn write(&mut self, data: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Reads exactly `len` bytes.
    ///
    /// Fails with [`crate::Error::ShortRead`] if the read timeout or EOF
    /// comes first; the partial data is discarded.
    fn read_exact(&mut self, len: usize) -> BoxFuture<'_, Result<Bytes>>;

    /// Returns true if open.
    fn is_open(&self) -> bool;
}

pub use mock::{MockDevice, MockLink};
pub use serial::{SerialConfig, SerialLink};
