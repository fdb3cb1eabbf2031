//! Channel transport
//!
//! A transport whose wire is owned by someone else: every `connect` hands a
//! [`ChannelConnection`] to the paired [`ChannelListener`]. The holder of the
//! listener reads the frames the session writes and drives the connection's
//! fate (inbound data, errors, close). Hosts that already manage the router
//! link through their own helper use this; so do the session tests, where it
//! runs under paused tokio time.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportEvent, TransportReceiver, TransportSender};

#[derive(Debug)]
struct Shared {
    accepting: AtomicBool,
    attempts: AtomicU32,
}

/// Connecting half of a channel transport
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    conn_tx: mpsc::UnboundedSender<ChannelConnection>,
    shared: Arc<Shared>,
}

/// Accepting half of a channel transport
#[derive(Debug)]
pub struct ChannelListener {
    conn_rx: mpsc::UnboundedReceiver<ChannelConnection>,
    shared: Arc<Shared>,
}

impl ChannelTransport {
    /// Create a connected transport/listener pair
    pub fn pair() -> (ChannelTransport, ChannelListener) {
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            accepting: AtomicBool::new(true),
            attempts: AtomicU32::new(0),
        });

        (
            ChannelTransport {
                conn_tx,
                shared: shared.clone(),
            },
            ChannelListener { conn_rx, shared },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    type Sender = ChannelSender;
    type Receiver = ChannelReceiver;

    async fn connect(&self, addr: &str) -> Result<(ChannelSender, ChannelReceiver)> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);

        if !self.shared.accepting.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(format!(
                "{} refused connection",
                addr
            )));
        }

        let connected = Arc::new(Mutex::new(true));
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let connection = ChannelConnection {
            addr: addr.to_string(),
            frames: frame_rx,
            events: Some(event_tx),
            connected: connected.clone(),
        };

        self.conn_tx
            .send(connection)
            .map_err(|_| TransportError::ConnectionFailed("listener dropped".to_string()))?;

        debug!("Channel connected to {}", addr);
        Ok((
            ChannelSender {
                tx: frame_tx,
                connected,
            },
            ChannelReceiver { rx: event_rx },
        ))
    }
}

impl ChannelListener {
    /// Wait for the next connection
    pub async fn accept(&mut self) -> Option<ChannelConnection> {
        self.conn_rx.recv().await
    }

    /// Take a pending connection without waiting
    pub fn try_accept(&mut self) -> Option<ChannelConnection> {
        self.conn_rx.try_recv().ok()
    }

    /// Refuse (`false`) or allow (`true`) subsequent connects
    pub fn set_accepting(&self, accepting: bool) {
        self.shared.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Number of connect attempts made so far, refused ones included
    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

/// Remote end of one channel connection
#[derive(Debug)]
pub struct ChannelConnection {
    addr: String,
    frames: mpsc::UnboundedReceiver<Bytes>,
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    connected: Arc<Mutex<bool>>,
}

impl ChannelConnection {
    /// Address the session asked to connect to
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Next frame written by the session; `None` once the session side is gone
    pub async fn recv_frame(&mut self) -> Option<Bytes> {
        self.frames.recv().await
    }

    /// Next frame if one is already queued
    pub fn try_recv_frame(&mut self) -> Option<Bytes> {
        self.frames.try_recv().ok()
    }

    /// Deliver inbound bytes to the session
    pub fn push(&self, data: Bytes) {
        if let Some(events) = &self.events {
            let _ = events.send(TransportEvent::Data(data));
        }
    }

    /// Report a transport error to the session
    pub fn fail(&self, error: &str) {
        if let Some(events) = &self.events {
            let _ = events.send(TransportEvent::Error(error.to_string()));
        }
    }

    /// Close the connection from the remote side
    pub fn close(&mut self, reason: Option<&str>) {
        *self.connected.lock() = false;
        if let Some(events) = self.events.take() {
            let _ = events.send(TransportEvent::Disconnected {
                reason: reason.map(str::to_string),
            });
        }
    }

    /// Whether neither side has closed the connection
    pub fn is_open(&self) -> bool {
        *self.connected.lock()
    }
}

/// Session-side sender of a channel connection
#[derive(Debug)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<Bytes>,
    connected: Arc<Mutex<bool>>,
}

#[async_trait]
impl TransportSender for ChannelSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !*self.connected.lock() {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .send(data)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        *self.connected.lock() = false;
        Ok(())
    }
}

/// Session-side receiver of a channel connection
#[derive(Debug)]
pub struct ChannelReceiver {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for ChannelReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_reach_listener() {
        let (transport, mut listener) = ChannelTransport::pair();
        let (sender, _receiver) = transport.connect("router:5000").await.unwrap();

        let mut conn = listener.accept().await.unwrap();
        assert_eq!(conn.addr(), "router:5000");

        sender.send(Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(conn.recv_frame().await.unwrap(), Bytes::from_static(b"abc"));
        assert_eq!(listener.attempts(), 1);
    }

    #[tokio::test]
    async fn test_remote_close() {
        let (transport, mut listener) = ChannelTransport::pair();
        let (sender, mut receiver) = transport.connect("router:5000").await.unwrap();
        let mut conn = listener.accept().await.unwrap();

        conn.close(Some("bye"));

        assert_eq!(
            receiver.recv().await,
            Some(TransportEvent::Disconnected {
                reason: Some("bye".to_string())
            })
        );
        assert_eq!(receiver.recv().await, None);
        assert!(!sender.is_connected());
        assert!(matches!(
            sender.send(Bytes::from_static(b"x")).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_refused_connect_counts_attempt() {
        let (transport, listener) = ChannelTransport::pair();
        listener.set_accepting(false);

        let result = transport.connect("router:5000").await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert_eq!(listener.attempts(), 1);
    }

    #[tokio::test]
    async fn test_local_close() {
        let (transport, mut listener) = ChannelTransport::pair();
        let (sender, _receiver) = transport.connect("router:5000").await.unwrap();
        let conn = listener.accept().await.unwrap();

        sender.close().await.unwrap();
        assert!(!conn.is_open());
    }
}
