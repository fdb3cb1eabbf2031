//! Supervised T-Bus session
//!
//! One spawned task owns the transport for the lifetime of the session. It
//! connects, writes the handshake, keeps the heartbeat going and, when the
//! connection ends for any reason other than [`SessionManager::stop`],
//! waits the reconnect delay and starts over. Because that task is the only
//! writer, handshake, heartbeats and commands reach the wire in the order
//! they were issued, and the handshake always comes first.
//!
//! ```text
//! Disconnected ──start──▶ Connecting ──ok──▶ Connected
//!      ▲                      │ err             │ close / error
//!      │                      ▼                 ▼
//!      └──── reconnect delay ◀──────────── Closing
//! ```

use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tbus_core::{HANDSHAKE_FRAME, HEARTBEAT_FRAME};
use tbus_transport::{Transport, TransportEvent, TransportReceiver, TransportSender};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::SessionError;
use crate::status::{DeviceStatus, StatusSink};

/// Capacity of the state transition channel
const STATE_CHANNEL_CAPACITY: usize = 64;

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Closing => "closing",
        })
    }
}

/// Session parameters fixed for the lifetime of a [`SessionManager`]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Identifier used when reporting status
    pub device_id: String,
    /// Name shown in logs
    pub label: String,
    /// Address handed to [`Transport::connect`]
    pub target: String,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
}

/// Current state plus a feed of every transition
#[derive(Debug)]
struct StateCell {
    current: Mutex<SessionState>,
    transitions: broadcast::Sender<SessionState>,
}

impl StateCell {
    fn new() -> Self {
        let (transitions, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            current: Mutex::new(SessionState::Disconnected),
            transitions,
        }
    }

    fn get(&self) -> SessionState {
        *self.current.lock()
    }

    fn set(&self, state: SessionState) {
        let mut current = self.current.lock();
        if *current != state {
            *current = state;
            let _ = self.transitions.send(state);
        }
    }
}

struct Running {
    handle: JoinHandle<()>,
    shutdown_tx: mpsc::Sender<()>,
}

/// Queue of the live connection, present only while connected
type OutgoingSlot = Arc<Mutex<Option<mpsc::UnboundedSender<Bytes>>>>;

/// Owner of the router connection
pub struct SessionManager<T: Transport> {
    transport: Arc<T>,
    config: SessionConfig,
    sink: Arc<dyn StatusSink>,
    state: Arc<StateCell>,
    stopped: Arc<AtomicBool>,
    outgoing: OutgoingSlot,
    running: Mutex<Option<Running>>,
}

impl<T: Transport> SessionManager<T> {
    pub fn new(transport: T, config: SessionConfig, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            sink,
            state: Arc::new(StateCell::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            outgoing: Arc::new(Mutex::new(None)),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Whether [`stop`](Self::stop) has been called
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Feed of state transitions from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.state.transitions.subscribe()
    }

    /// Spawn the session task. Must be called within a tokio runtime.
    pub fn start(&self) -> Result<(), SessionError> {
        if self.is_stopped() {
            return Err(SessionError::Stopped);
        }

        let mut running = self.running.lock();
        if running.is_some() {
            return Err(SessionError::AlreadyStarted);
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = SessionTask {
            transport: self.transport.clone(),
            config: self.config.clone(),
            sink: self.sink.clone(),
            state: self.state.clone(),
            stopped: self.stopped.clone(),
            outgoing: self.outgoing.clone(),
            shutdown_rx,
        };

        let span = info_span!(
            "session",
            device = %self.config.device_id,
            label = %self.config.label
        );
        *running = Some(Running {
            handle: tokio::spawn(task.run().instrument(span)),
            shutdown_tx,
        });

        info!(
            device = %self.config.device_id,
            label = %self.config.label,
            target = %self.config.target,
            "Session started"
        );
        Ok(())
    }

    /// Queue a frame for the current connection.
    ///
    /// Only valid while connected; otherwise the frame is rejected with
    /// [`SessionError::NotConnected`]. Every connection has its own queue:
    /// a frame accepted just before the router drops the connection is
    /// discarded with that queue, never replayed on the next connection.
    pub fn send(&self, frame: Bytes) -> Result<(), SessionError> {
        self.outgoing
            .lock()
            .as_ref()
            .ok_or(SessionError::NotConnected)?
            .send(frame)
            .map_err(|_| SessionError::NotConnected)
    }

    /// Stop the session for good.
    ///
    /// Frames already accepted by [`send`](Self::send) are written before
    /// the socket is closed. Cancels any pending reconnect and the
    /// heartbeat, then reports `Closed`. Returns once the session task has
    /// finished. Calling it again is a no-op.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);

        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };

        info!(device = %self.config.device_id, label = %self.config.label, "Stopping session");
        let _ = running.shutdown_tx.try_send(());
        if let Err(e) = running.handle.await {
            error!(device = %self.config.device_id, "Session task failed: {}", e);
        }

        self.state.set(SessionState::Disconnected);
        self.sink.report(&self.config.device_id, DeviceStatus::Closed);
    }

    /// Stop, then start again with the same configuration
    pub async fn restart(&self) -> Result<(), SessionError> {
        self.stop().await;
        self.stopped.store(false, Ordering::SeqCst);
        self.start()
    }
}

impl<T: Transport> Drop for SessionManager<T> {
    fn drop(&mut self) {
        // Dropping the shutdown sender ends the task at its next await point
        if let Some(running) = self.running.get_mut().take() {
            self.stopped.store(true, Ordering::SeqCst);
            drop(running.shutdown_tx);
        }
    }
}

/// How a connection ended
enum ConnectionEnd {
    /// Transport closed or failed; reconnect unless stopped
    Closed,
    /// The manager asked the task to exit
    Shutdown,
}

struct SessionTask<T: Transport> {
    transport: Arc<T>,
    config: SessionConfig,
    sink: Arc<dyn StatusSink>,
    state: Arc<StateCell>,
    stopped: Arc<AtomicBool>,
    outgoing: OutgoingSlot,
    shutdown_rx: mpsc::Receiver<()>,
}

impl<T: Transport> SessionTask<T> {
    async fn run(mut self) {
        let device = self.config.device_id.clone();

        loop {
            self.state.set(SessionState::Connecting);
            debug!(device = %device, target = %self.config.target, "Connecting");

            let connected = tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => return,
                result = self.transport.connect(&self.config.target) => result,
            };

            match connected {
                Ok((sender, receiver)) => {
                    if let ConnectionEnd::Shutdown = self.run_connection(sender, receiver).await {
                        return;
                    }
                }
                Err(e) => {
                    error!(device = %device, "Connection failed: {}", e);
                    self.sink.report(&device, DeviceStatus::Error(e.to_string()));
                }
            }

            self.state.set(SessionState::Disconnected);
            if self.stopped.load(Ordering::SeqCst) {
                return;
            }

            info!(
                device = %device,
                "Reconnecting in {} ms",
                self.config.reconnect_delay.as_millis()
            );
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => return,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    async fn run_connection(&mut self, sender: T::Sender, mut receiver: T::Receiver) -> ConnectionEnd {
        let device = self.config.device_id.clone();

        // Handshake is the first write on every connection
        if let Err(e) = sender.send(Bytes::from_static(HANDSHAKE_FRAME)).await {
            error!(device = %device, "Handshake failed: {}", e);
            self.sink.report(&device, DeviceStatus::Error(e.to_string()));
            self.state.set(SessionState::Closing);
            let _ = sender.close().await;
            self.sink.report(&device, DeviceStatus::Closed);
            return ConnectionEnd::Closed;
        }

        let outgoing_rx = {
            let mut slot = self.outgoing.lock();
            if self.stopped.load(Ordering::SeqCst) {
                None
            } else {
                let (tx, rx) = mpsc::unbounded_channel();
                *slot = Some(tx);
                Some(rx)
            }
        };
        let Some(mut outgoing_rx) = outgoing_rx else {
            let _ = sender.close().await;
            return ConnectionEnd::Shutdown;
        };

        self.state.set(SessionState::Connected);
        info!(device = %device, target = %self.config.target, "Router connected");
        self.sink.report(&device, DeviceStatus::Connected);

        // Lives only as long as this connection
        let period = self.config.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => break ConnectionEnd::Shutdown,

                event = receiver.recv() => match event {
                    Some(TransportEvent::Data(data)) => {
                        debug!(device = %device, len = data.len(), "Ignoring router data");
                    }
                    Some(TransportEvent::Error(e)) => {
                        error!(device = %device, "Transport error: {}", e);
                        self.sink.report(&device, DeviceStatus::Error(e));
                        break ConnectionEnd::Closed;
                    }
                    Some(TransportEvent::Disconnected { reason }) => {
                        warn!(device = %device, reason = ?reason, "Router disconnected");
                        break ConnectionEnd::Closed;
                    }
                    None => {
                        warn!(device = %device, "Router connection lost");
                        break ConnectionEnd::Closed;
                    }
                },

                frame = outgoing_rx.recv() => {
                    let Some(frame) = frame else {
                        break ConnectionEnd::Shutdown;
                    };
                    if let Err(e) = sender.send(frame).await {
                        error!(device = %device, "Send failed: {}", e);
                        self.sink.report(&device, DeviceStatus::Error(e.to_string()));
                        break ConnectionEnd::Closed;
                    }
                }

                _ = heartbeat.tick() => {
                    if let Err(e) = sender.send(Bytes::from_static(HEARTBEAT_FRAME)).await {
                        error!(device = %device, "Heartbeat failed: {}", e);
                        self.sink.report(&device, DeviceStatus::Error(e.to_string()));
                        break ConnectionEnd::Closed;
                    }
                }
            }
        };

        // No new frames for this connection from here on
        self.outgoing.lock().take();
        self.state.set(SessionState::Closing);
        drop(heartbeat);

        match end {
            ConnectionEnd::Shutdown => {
                let mut flushed = 0usize;
                while let Ok(frame) = outgoing_rx.try_recv() {
                    if let Err(e) = sender.send(frame).await {
                        warn!(device = %device, "Flush on stop failed: {}", e);
                        break;
                    }
                    flushed += 1;
                }
                if flushed > 0 {
                    debug!(device = %device, "Flushed {} frame(s) before close", flushed);
                }
            }
            ConnectionEnd::Closed => {
                let mut dropped = 0usize;
                while outgoing_rx.try_recv().is_ok() {
                    dropped += 1;
                }
                if dropped > 0 {
                    warn!(device = %device, "Discarded {} unsent frame(s)", dropped);
                }
            }
        }
        drop(outgoing_rx);
        let _ = sender.close().await;

        if let ConnectionEnd::Closed = end {
            self.sink.report(&device, DeviceStatus::Closed);
        }
        end
    }
}
