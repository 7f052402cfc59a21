//! The polling [`Session`].
//!
//! A session opens a link, reads the device's integration time, then runs a
//! background task that repeats one poll cycle after another:
//!
//! 1. stop if asked to, resetting the device on the way out
//! 2. send at most one queued command
//! 3. request and read a telemetry frame
//! 4. publish the decoded snapshot and wait for its acknowledgement
//!
//! Any I/O failure ends the session in [`SessionState::Faulted`] and is
//! reported once through [`Event::Disconnected`]. Nothing is retried.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::event::{Event, SnapshotDelivery, Subscription};
use crate::protocol::{
    Command, HANDSHAKE_REPLY_LEN, LINEAR_FRAME_LEN, Opcode, PROXIMITY_FRAME_LEN,
    decode_integration_time,
};
use crate::queue::CommandQueue;
use crate::transport::{Link, SerialConfig, SerialLink};
use crate::types::TelemetrySnapshot;

/// Default event channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 4;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, not started.
    Idle,
    /// Opening the link and reading the integration time.
    Connecting,
    /// Poll loop running.
    Polling,
    /// Resetting the device and closing the link.
    Stopping,
    /// Stopped on request.
    Stopped,
    /// Failed to start, or the link failed.
    Faulted,
}

impl SessionState {
    /// Returns true for states a session never leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Faulted)
    }

    /// Returns true while the session owns an open link.
    #[must_use]
    pub const fn has_link(self) -> bool {
        matches!(self, Self::Connecting | Self::Polling | Self::Stopping)
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the event channel. At least 2 are used.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Sets the event channel capacity.
    #[must_use]
    pub const fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// Cloneable control surface of a session.
///
/// Handles can submit commands and request a stop from any task, including
/// the one consuming events.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    queue: CommandQueue,
    stop: Arc<watch::Sender<bool>>,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionHandle {
    /// Validates a command and queues it for the next poll cycle.
    ///
    /// Commands are sent in submission order, one per cycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCommandParameter`] for out-of-range values;
    /// the queue is left untouched.
    pub fn submit_command(&self, command: Command) -> Result<()> {
        command.validate()?;
        tracing::debug!("queued {:?}", command);
        self.queue.enqueue(command);
        Ok(())
    }

    /// Asks the poll loop to stop at the start of its next cycle.
    ///
    /// Returns immediately. A pending acknowledgement wait is cut short.
    /// Stopping an idle session moves it straight to
    /// [`SessionState::Stopped`].
    pub fn stop(&self) {
        self.stop.send_replace(true);
        let stopped_idle = self.state.send_if_modified(|state| {
            if *state == SessionState::Idle {
                *state = SessionState::Stopped;
                true
            } else {
                false
            }
        });
        if stopped_idle {
            tracing::info!("session state Idle -> Stopped");
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Number of commands waiting to be sent.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }
}

/// A polling session with one PRisme device.
pub struct Session<L> {
    link: Option<L>,
    handle: SessionHandle,
    events: Option<mpsc::Sender<Event>>,
    subscription: Option<Subscription>,
    worker: Option<JoinHandle<SessionState>>,
}

impl Session<SerialLink> {
    /// Creates a session over a serial link with default settings.
    #[must_use]
    pub fn serial() -> Self {
        Self::with_serial_config(SerialConfig::new())
    }

    /// Creates a session over a serial link with custom settings.
    #[must_use]
    pub fn with_serial_config(config: SerialConfig) -> Self {
        Self::new(SerialLink::new(config))
    }
}

impl<L: Link + 'static> Session<L> {
    /// Creates an idle session over the given link.
    #[must_use]
    pub fn new(link: L) -> Self {
        Self::with_config(link, SessionConfig::default())
    }

    /// Creates an idle session with custom settings.
    #[must_use]
    pub fn with_config(link: L, config: SessionConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(2));
        let (stop, _) = watch::channel(false);
        let (state, _) = watch::channel(SessionState::Idle);

        Self {
            link: Some(link),
            handle: SessionHandle {
                queue: CommandQueue::new(),
                stop: Arc::new(stop),
                state: Arc::new(state),
            },
            events: Some(event_tx),
            subscription: Some(Subscription::new(event_rx)),
            worker: None,
        }
    }

    /// Takes the event subscription.
    ///
    /// There is only one; later calls return `None`. Subscribe before
    /// [`start`](Self::start): a session started without a subscriber
    /// treats every snapshot as acknowledged on publication.
    pub fn subscribe(&mut self) -> Option<Subscription> {
        self.subscription.take()
    }

    /// Opens `port`, reads the integration time and starts polling.
    ///
    /// Returns the integration time reported by the device.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the session is idle
    /// - [`Error::LinkOpen`] if the port cannot be opened
    /// - [`Error::Handshake`] if the device does not answer
    ///
    /// On the last two the session is left [`SessionState::Faulted`].
    pub async fn start(&mut self, port: &str) -> Result<u16> {
        let connecting = self.handle.state.send_if_modified(|state| {
            if *state == SessionState::Idle {
                *state = SessionState::Connecting;
                true
            } else {
                false
            }
        });
        if !connecting {
            return Err(Error::InvalidState {
                state: self.handle.state(),
            });
        }
        let (Some(mut link), Some(events)) = (self.link.take(), self.events.take()) else {
            transition(&self.handle.state, SessionState::Faulted);
            return Err(Error::InvalidState {
                state: SessionState::Faulted,
            });
        };
        tracing::info!("session state Idle -> Connecting");

        if let Err(e) = link.open(port).await {
            tracing::error!("failed to open {}: {}", port, e);
            transition(&self.handle.state, SessionState::Faulted);
            return Err(e);
        }

        let integration_time = match handshake(&mut link).await {
            Ok(time) => time,
            Err(e) => {
                tracing::error!("handshake with {} failed: {}", port, e);
                if let Err(close_err) = link.close().await {
                    tracing::warn!("failed to close link: {}", close_err);
                }
                transition(&self.handle.state, SessionState::Faulted);
                return Err(Error::Handshake(Box::new(e)));
            }
        };
        tracing::info!("device integration time is {}us", integration_time);

        // Nobody can receive anymore, so publishing acts as acknowledgement
        if self.subscription.take().is_some() {
            tracing::debug!("starting without a subscriber");
        }

        transition(&self.handle.state, SessionState::Polling);
        let poll_loop = PollLoop {
            link,
            queue: self.handle.queue.clone(),
            stop: self.handle.stop.subscribe(),
            state: Arc::clone(&self.handle.state),
            events,
            sequence: 0,
        };
        self.worker = Some(tokio::spawn(poll_loop.run()));

        Ok(integration_time)
    }

    /// Waits for the poll loop to finish and returns the final state.
    ///
    /// Returns the current state right away if the loop is not running.
    pub async fn join(&mut self) -> SessionState {
        if let Some(worker) = self.worker.take() {
            match worker.await {
                Ok(state) => return state,
                Err(e) => {
                    tracing::error!("poll loop task failed: {}", e);
                    transition(&self.handle.state, SessionState::Faulted);
                }
            }
        }
        self.handle.state()
    }
}

impl<L> Session<L> {
    /// Returns a cloneable control handle.
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// See [`SessionHandle::submit_command`].
    pub fn submit_command(&self, command: Command) -> Result<()> {
        self.handle.submit_command(command)
    }

    /// See [`SessionHandle::stop`].
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.handle.state_changes()
    }
}

impl<L> Drop for Session<L> {
    fn drop(&mut self) {
        // The poll loop resets the device and closes the link on its own
        if self.worker.is_some() {
            self.handle.stop.send_replace(true);
        }
    }
}

/// Writes the handshake query and decodes the reply.
async fn handshake<L: Link>(link: &mut L) -> Result<u16> {
    link.write(Bytes::from_static(&[Opcode::Handshake as u8]))
        .await?;
    let reply = link.read_exact(HANDSHAKE_REPLY_LEN).await?;
    Ok(decode_integration_time(&reply)?)
}

/// Resolves once a stop has been requested.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    // Err means the session itself is gone, which is a stop as well
    let _ = stop.wait_for(|stop| *stop).await;
}

fn transition(state: &watch::Sender<SessionState>, next: SessionState) {
    let previous = state.send_replace(next);
    tracing::info!("session state {:?} -> {:?}", previous, next);
}

/// State owned by the background poll task.
struct PollLoop<L> {
    link: L,
    queue: CommandQueue,
    stop: watch::Receiver<bool>,
    state: Arc<watch::Sender<SessionState>>,
    events: mpsc::Sender<Event>,
    sequence: u64,
}

impl<L: Link> PollLoop<L> {
    async fn run(mut self) -> SessionState {
        loop {
            let stop_requested = *self.stop.borrow();
            if stop_requested {
                self.shutdown().await;
                return SessionState::Stopped;
            }

            match self.cycle().await {
                Ok(snapshot) => self.publish(snapshot).await,
                Err(e) => {
                    self.fault(e).await;
                    return SessionState::Faulted;
                }
            }
        }
    }

    /// One command (if any), one poll request, one telemetry frame.
    async fn cycle(&mut self) -> Result<TelemetrySnapshot> {
        if let Some(command) = self.queue.try_dequeue() {
            match command.encode() {
                Ok(bytes) => {
                    tracing::debug!("sending {:?}", command);
                    self.link.write(bytes).await?;
                }
                Err(e) => tracing::warn!("dropping {:?}: {}", command, e),
            }
        }

        self.link
            .write(Bytes::from_static(&[Opcode::Poll as u8]))
            .await?;
        let linear = self.link.read_exact(LINEAR_FRAME_LEN).await?;
        let proximity = self.link.read_exact(PROXIMITY_FRAME_LEN).await?;

        self.sequence += 1;
        Ok(TelemetrySnapshot::decode(
            self.sequence,
            &linear,
            &proximity,
        )?)
    }

    /// Hands the snapshot over and waits until it is acknowledged or a
    /// stop is requested.
    async fn publish(&mut self, snapshot: TelemetrySnapshot) {
        let sequence = snapshot.sequence;
        let (delivery, ack) = SnapshotDelivery::new(Arc::new(snapshot));

        let published = tokio::select! {
            sent = self.events.send(Event::Snapshot(delivery)) => sent.is_ok(),
            () = stop_requested(&mut self.stop) => false,
        };
        if !published {
            tracing::trace!("snapshot {} not delivered", sequence);
            return;
        }

        tokio::select! {
            _ = ack => tracing::trace!("snapshot {} acknowledged", sequence),
            () = stop_requested(&mut self.stop) => {
                tracing::debug!("stop requested while snapshot {} was pending", sequence);
            }
        }
    }

    async fn shutdown(&mut self) {
        transition(&self.state, SessionState::Stopping);
        if let Err(e) = self
            .link
            .write(Bytes::from_static(&[Opcode::Reset as u8]))
            .await
        {
            tracing::warn!("failed to reset device: {}", e);
        }
        if let Err(e) = self.link.close().await {
            tracing::warn!("failed to close link: {}", e);
        }
        transition(&self.state, SessionState::Stopped);
        self.notify(Event::Stopped);
    }

    async fn fault(&mut self, error: Error) {
        tracing::error!("link failure, session faulted: {}", error);
        if let Err(e) = self.link.close().await {
            tracing::warn!("failed to close link: {}", e);
        }
        transition(&self.state, SessionState::Faulted);
        self.notify(Event::Disconnected(error));
    }

    fn notify(&self, event: Event) {
        if self.events.try_send(event).is_err() {
            tracing::debug!("no subscriber for final event");
        }
    }
}
