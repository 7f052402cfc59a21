//! Serial/USB link implementation.
//!
//! PRisme robots expose their controller as a USB serial device running
//! at 9600 baud, 8N1.

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

use crate::error::{Error, Result};
use crate::transport::Link;

/// Default baud rate for PRisme devices.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default time allowed for a complete response.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Default time allowed for a write to drain.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for serial links.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate.
    pub baud_rate: u32,
    /// Deadline for each exact-size read.
    pub read_timeout: Duration,
    /// Deadline for each write, flush included.
    pub write_timeout: Duration,
    /// Delay after opening before the first request.
    pub settle_delay: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialConfig {
    /// Creates a serial configuration with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            settle_delay: Duration::ZERO,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the write timeout.
    #[must_use]
    pub const fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the settle delay.
    #[must_use]
    pub const fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

/// Serial link to a PRisme controller.
pub struct SerialLink {
    config: SerialConfig,
    stream: Option<SerialStream>,
}

impl SerialLink {
    /// Creates a closed serial link with the given configuration.
    #[must_use]
    pub const fn new(config: SerialConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    /// Returns the link configuration.
    #[must_use]
    pub const fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl Default for SerialLink {
    fn default() -> Self {
        Self::new(SerialConfig::new())
    }
}

impl Link for SerialLink {
    fn open<'a>(&'a mut self, port: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.stream.is_some() {
                return Ok(());
            }

            tracing::info!(
                "opening serial port {} at {} baud",
                port,
                self.config.baud_rate
            );

            let stream = tokio_serial::new(port, self.config.baud_rate)
                .timeout(self.config.read_timeout)
                .open_native_async()
                .map_err(|source| Error::LinkOpen {
                    port: port.to_owned(),
                    source,
                })?;

            if !self.config.settle_delay.is_zero() {
                tokio::time::sleep(self.config.settle_delay).await;
            }

            // Replies to requests from a previous session may still be buffered
            if let Err(e) = stream.clear(ClearBuffer::All) {
                tracing::warn!("failed to clear serial buffers: {}", e);
            }

            self.stream = Some(stream);
            tracing::info!("serial port open");
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.stream.take().is_some() {
                tracing::info!("serial port closed");
            }
            Ok(())
        })
    }

    fn write(&mut self, data: Bytes) -> BoxFuture<'_, Result<()>> {
        let write_timeout = self.config.write_timeout;
        Box::pin(async move {
            let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
            tracing::trace!("writing {}", hex::encode(&data));

            let written = tokio::time::timeout(write_timeout, async {
                stream.write_all(&data).await?;
                stream.flush().await
            })
            .await;

            match written {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(Error::LinkWrite(e)),
                Err(_) => Err(Error::LinkWrite(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("write not drained after {write_timeout:?}"),
                ))),
            }
        })
    }

    fn read_exact(&mut self, len: usize) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move {
            let read_timeout = self.config.read_timeout;
            let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
            read_exact_within(stream, len, read_timeout).await
        })
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

/// Reads exactly `len` bytes, all of which must arrive within `timeout`.
///
/// The deadline starts when the read is first polled.
async fn read_exact_within<R>(reader: &mut R, len: usize, timeout: Duration) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let deadline = Instant::now() + timeout;
    let mut buf = BytesMut::zeroed(len);
    let mut got = 0;

    while got < len {
        match tokio::time::timeout_at(deadline, reader.read(&mut buf[got..])).await {
            Ok(Ok(0)) => {
                tracing::debug!("serial port reached EOF");
                break;
            }
            Ok(Ok(n)) => got += n,
            Ok(Err(e)) => {
                tracing::warn!("serial read error: {}", e);
                break;
            }
            Err(_) => {
                tracing::debug!("serial read timed out with {}/{} bytes", got, len);
                break;
            }
        }
    }

    if got < len {
        return Err(Error::ShortRead { expected: len, got });
    }
    tracing::trace!("read {} bytes", len);
    Ok(buf.freeze())
}

/// Lists available serial ports, sorted by name.
///
/// # Errors
///
/// Returns an error if the port list cannot be retrieved.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()?;
    let mut names: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
    names.sort();
    Ok(names)
}
