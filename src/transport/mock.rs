//! In-memory PRisme device for tests and demos.
//!
//! [`MockDevice`] answers requests the way the robot firmware does: `'c'`
//! returns the integration time, each `'d'` returns the next scripted
//! frame, `'t'` updates the integration time. The device handle stays with
//! the caller after its [`MockLink`] has been handed to a session, so
//! everything the session did can be inspected afterwards.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::{Error, Result};
use crate::protocol::{LINEAR_FRAME_LEN, Opcode, PROXIMITY_FRAME_LEN};
use crate::transport::Link;

#[derive(Debug, Default)]
struct DeviceState {
    integration_time: u16,
    frames: VecDeque<Vec<u8>>,
    output: VecDeque<u8>,
    written: Vec<u8>,
    reads: Vec<usize>,
    opened: Vec<String>,
    closes: usize,
    writes: usize,
    refuse_open: bool,
    mute: bool,
    fail_writes_after: Option<usize>,
}

impl DeviceState {
    fn handle_request(&mut self, data: &[u8]) {
        let mut bytes = data.iter().copied();
        while let Some(op) = bytes.next() {
            match op {
                op if op == u8::from(Opcode::Handshake) => {
                    if !self.mute {
                        self.output.extend(self.integration_time.to_be_bytes());
                    }
                }
                op if op == u8::from(Opcode::Poll) => {
                    if let Some(frame) = self.frames.pop_front() {
                        self.output.extend(frame);
                    }
                }
                op if op == u8::from(Opcode::SetIntegrationTime) => {
                    let hi = bytes.next().unwrap_or_default();
                    let lo = bytes.next().unwrap_or_default();
                    self.integration_time = u16::from_be_bytes([hi, lo]);
                }
                op if op == u8::from(Opcode::SetSpeed) => {
                    bytes.next();
                    bytes.next();
                }
                _ => {}
            }
        }
    }
}

/// Handle to an emulated device.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl MockDevice {
    /// Creates a device reporting the given integration time.
    #[must_use]
    pub fn new(integration_time: u16) -> Self {
        let device = Self::default();
        device.lock().integration_time = integration_time;
        device
    }

    /// Creates a link connected to this device.
    #[must_use]
    pub fn link(&self) -> MockLink {
        MockLink {
            device: self.clone(),
            open: false,
        }
    }

    /// Queues a complete telemetry frame answered to the next poll.
    pub fn push_frame(
        &self,
        intensities: &[u8; LINEAR_FRAME_LEN],
        proximity: &[u8; PROXIMITY_FRAME_LEN],
    ) {
        let mut frame = Vec::with_capacity(LINEAR_FRAME_LEN + PROXIMITY_FRAME_LEN);
        frame.extend_from_slice(intensities);
        frame.extend_from_slice(proximity);
        self.push_raw_frame(frame);
    }

    /// Queues arbitrary bytes answered to the next poll.
    pub fn push_raw_frame(&self, frame: Vec<u8>) {
        self.lock().frames.push_back(frame);
    }

    /// Makes every following open attempt fail.
    pub fn refuse_open(&self) {
        self.lock().refuse_open = true;
    }

    /// Stops answering the handshake query.
    pub fn mute(&self) {
        self.lock().mute = true;
    }

    /// Lets `count` writes succeed, then fails every write.
    pub fn fail_writes_after(&self, count: usize) {
        self.lock().fail_writes_after = Some(count);
    }

    /// Current integration time.
    #[must_use]
    pub fn integration_time(&self) -> u16 {
        self.lock().integration_time
    }

    /// Every byte successfully written, in order.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    /// Sizes of every read request, in order.
    #[must_use]
    pub fn read_requests(&self) -> Vec<usize> {
        self.lock().reads.clone()
    }

    /// Ports the link was opened on.
    #[must_use]
    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    /// Number of times an open link was closed.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    /// Number of scripted frames not yet requested.
    #[must_use]
    pub fn frames_left(&self) -> usize {
        self.lock().frames.len()
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Link to a [`MockDevice`].
#[derive(Debug)]
pub struct MockLink {
    device: MockDevice,
    open: bool,
}

impl Link for MockLink {
    fn open<'a>(&'a mut self, port: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.open {
                return Ok(());
            }
            let mut state = self.device.lock();
            if state.refuse_open {
                return Err(Error::LinkOpen {
                    port: port.to_owned(),
                    source: tokio_serial::Error::new(
                        tokio_serial::ErrorKind::NoDevice,
                        "mock device refused open",
                    ),
                });
            }
            state.opened.push(port.to_owned());
            self.open = true;
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.open {
                self.open = false;
                self.device.lock().closes += 1;
            }
            Ok(())
        })
    }

    fn write(&mut self, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.open {
                return Err(Error::NotConnected);
            }
            let mut state = self.device.lock();
            if state
                .fail_writes_after
                .is_some_and(|limit| state.writes >= limit)
            {
                return Err(Error::LinkWrite(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "mock device unplugged",
                )));
            }
            state.writes += 1;
            state.written.extend_from_slice(&data);
            state.handle_request(&data);
            Ok(())
        })
    }

    fn read_exact(&mut self, len: usize) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move {
            if !self.open {
                return Err(Error::NotConnected);
            }
            let mut state = self.device.lock();
            state.reads.push(len);
            let got = len.min(state.output.len());
            let data: Vec<u8> = state.output.drain(..got).collect();
            if got < len {
                return Err(Error::ShortRead { expected: len, got });
            }
            Ok(Bytes::from(data))
        })
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
