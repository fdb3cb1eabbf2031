//! TCP transport implementation
//!
//! Raw TCP transport for T-Bus. Frames are written exactly as given: T-Bus
//! frames carry their own header and checksum, so no extra framing is added.
//! Inbound bytes are surfaced as [`TransportEvent::Data`] chunks without
//! interpretation.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info};

use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportEvent, TransportReceiver, TransportSender};

/// Default channel buffer size for TCP connections
const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 256;

/// TCP configuration
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Read buffer size
    pub read_buffer_size: usize,
    /// Enable SO_KEEPALIVE on the socket
    pub keepalive: bool,
    /// Disable Nagle so small command frames go out immediately
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 4096,
            keepalive: true,
            nodelay: true,
        }
    }
}

/// TCP transport
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    config: TcpConfig,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TcpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Sender = TcpSender;
    type Receiver = TcpReceiver;

    async fn connect(&self, addr: &str) -> Result<(TcpSender, TcpReceiver)> {
        info!("Connecting to TCP: {}", addr);

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        // Keep-alive only; the session never times out an idle socket
        if self.config.keepalive {
            let socket = socket2::SockRef::from(&stream);
            if let Err(e) = socket.set_keepalive(true) {
                debug!("Failed to enable TCP keepalive: {}", e);
            }
        }
        if self.config.nodelay {
            let _ = stream.set_nodelay(true);
        }

        let connected = Arc::new(Mutex::new(true));
        let shutdown = Arc::new(Notify::new());
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<Bytes>(DEFAULT_CHANNEL_BUFFER_SIZE);
        let (incoming_tx, incoming_rx) = mpsc::channel::<TransportEvent>(DEFAULT_CHANNEL_BUFFER_SIZE);

        let sender = TcpSender {
            tx: outgoing_tx,
            connected: connected.clone(),
            shutdown: shutdown.clone(),
        };
        let receiver = TcpReceiver { rx: incoming_rx };

        let read_buffer_size = self.config.read_buffer_size;
        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            run_tcp_io_loop(
                reader,
                writer,
                outgoing_rx,
                incoming_tx,
                shutdown,
                read_buffer_size,
                connected,
            )
            .await;
        });

        info!("TCP connected to {}", addr);
        Ok((sender, receiver))
    }
}

/// IO loop owning both halves of one TCP connection
async fn run_tcp_io_loop(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    mut outgoing_rx: mpsc::Receiver<Bytes>,
    incoming_tx: mpsc::Sender<TransportEvent>,
    shutdown: Arc<Notify>,
    read_buffer_size: usize,
    connected: Arc<Mutex<bool>>,
) {
    let mut read_buf = BytesMut::with_capacity(read_buffer_size);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.notified() => {
                debug!("TCP connection closed locally");
                // Frames accepted before the close still go out
                while let Ok(data) = outgoing_rx.try_recv() {
                    if writer.write_all(&data).await.is_err() {
                        break;
                    }
                }
                let _ = writer.shutdown().await;
                let _ = incoming_tx.send(TransportEvent::Disconnected {
                    reason: Some("closed locally".to_string()),
                }).await;
                break;
            }

            data = outgoing_rx.recv() => {
                let Some(data) = data else {
                    let _ = writer.shutdown().await;
                    break;
                };
                if let Err(e) = writer.write_all(&data).await {
                    error!("TCP write error: {}", e);
                    let _ = incoming_tx.send(TransportEvent::Error(e.to_string())).await;
                    break;
                }
            }

            result = reader.read_buf(&mut read_buf) => {
                match result {
                    Ok(0) => {
                        debug!("TCP connection closed by peer");
                        let _ = incoming_tx.send(TransportEvent::Disconnected { reason: None }).await;
                        break;
                    }
                    Ok(_) => {
                        let data = read_buf.split().freeze();
                        if incoming_tx.send(TransportEvent::Data(data)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("TCP read error: {}", e);
                        let _ = incoming_tx.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }
        }
    }

    *connected.lock() = false;
}

/// TCP sender for writing frames
pub struct TcpSender {
    tx: mpsc::Sender<Bytes>,
    connected: Arc<Mutex<bool>>,
    shutdown: Arc<Notify>,
}

#[async_trait]
impl TransportSender for TcpSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !*self.connected.lock() {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .send(data)
            .await
            .map_err(|_| TransportError::SendFailed("Channel closed".into()))
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        *self.connected.lock() = false;
        self.shutdown.notify_one();
        Ok(())
    }
}

/// TCP receiver for connection events
pub struct TcpReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for TcpReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_tcp_config_default() {
        let config = TcpConfig::default();
        assert_eq!(config.read_buffer_size, 4096);
        assert!(config.keepalive);
        assert!(config.nodelay);
    }

    #[tokio::test]
    async fn test_tcp_writes_raw_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let transport = TcpTransport::new();
        let (sender, _receiver) = transport.connect(&addr.to_string()).await.unwrap();
        sender.send(Bytes::from_static(b"hello")).await.unwrap();

        assert_eq!(&accept.await.unwrap(), b"hello");
        sender.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_reports_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let transport = TcpTransport::new();
        let (sender, mut receiver) = transport.connect(&addr.to_string()).await.unwrap();
        accept.await.unwrap();

        let event = receiver.recv().await;
        assert_eq!(event, Some(TransportEvent::Disconnected { reason: None }));
        // The IO loop drops its event sender on exit
        assert!(receiver.recv().await.is_none());
        assert!(!sender.is_connected());
    }

    #[tokio::test]
    async fn test_tcp_connect_refused() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = TcpTransport::new().connect(&addr.to_string()).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}
