//! Transport Layer Tests
//!
//! - TCP connect, write, inbound data, local and remote close
//! - The same exchange driven generically over both transports

use bytes::Bytes;
use std::time::Duration;
use tbus_transport::{
    ChannelTransport, TcpConfig, TcpTransport, Transport, TransportError, TransportEvent,
    TransportReceiver, TransportSender,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

/// Send two frames and close; works the same on any transport
async fn send_and_close<T: Transport>(transport: &T, addr: &str) -> Result<(), TransportError> {
    let (sender, _receiver) = transport.connect(addr).await?;
    assert!(sender.is_connected());

    sender.send(Bytes::from_static(b"phoenix-db z\n")).await?;
    sender.send(Bytes::from_static(b"hi\n")).await?;
    sender.close().await?;

    assert!(!sender.is_connected());
    Ok(())
}

// ============================================================================
// TCP
// ============================================================================

#[tokio::test]
async fn test_tcp_generic_exchange() {
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        socket.read_to_end(&mut buf).await.unwrap();
        buf
    });

    send_and_close(&TcpTransport::new(), &addr).await.unwrap();

    // Local close shuts the write half, so the peer sees EOF after the frames
    let received = timeout(TIMEOUT, server).await.unwrap().unwrap();
    assert_eq!(received, b"phoenix-db z\nhi\n");
}

#[tokio::test]
async fn test_tcp_inbound_data() {
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"\x06").await.unwrap();
        // Hold the socket open until the client goes away
        let mut buf = [0u8; 64];
        let _ = socket.read(&mut buf).await;
    });

    let (sender, mut receiver) = TcpTransport::new().connect(&addr).await.unwrap();
    let event = timeout(TIMEOUT, receiver.recv()).await.unwrap();
    assert_eq!(event, Some(TransportEvent::Data(Bytes::from_static(b"\x06"))));

    sender.close().await.unwrap();
    let event = timeout(TIMEOUT, receiver.recv()).await.unwrap();
    assert!(matches!(event, Some(TransportEvent::Disconnected { .. })));

    let _ = timeout(TIMEOUT, server).await;
}

#[tokio::test]
async fn test_tcp_send_after_peer_close() {
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);
    });

    let config = TcpConfig {
        keepalive: false,
        ..Default::default()
    };
    let (sender, mut receiver) = TcpTransport::with_config(config)
        .connect(&addr)
        .await
        .unwrap();
    server.await.unwrap();

    let event = timeout(TIMEOUT, receiver.recv()).await.unwrap();
    assert_eq!(event, Some(TransportEvent::Disconnected { reason: None }));
    assert_eq!(receiver.recv().await, None);

    assert!(!sender.is_connected());
    assert!(matches!(
        sender.send(Bytes::from_static(b"hi\n")).await,
        Err(TransportError::NotConnected)
    ));
}

// ============================================================================
// Channel
// ============================================================================

#[tokio::test]
async fn test_channel_generic_exchange() {
    let (transport, mut listener) = ChannelTransport::pair();
    let accept = tokio::spawn(async move {
        let mut conn = listener.accept().await.unwrap();
        let mut frames = Vec::new();
        while let Some(frame) = conn.recv_frame().await {
            frames.push(frame);
        }
        (frames, conn.is_open())
    });

    send_and_close(&transport, "router:5000").await.unwrap();

    let (frames, open) = timeout(TIMEOUT, accept).await.unwrap().unwrap();
    assert_eq!(
        frames,
        vec![
            Bytes::from_static(b"phoenix-db z\n"),
            Bytes::from_static(b"hi\n")
        ]
    );
    assert!(!open);
}

#[tokio::test]
async fn test_channel_listener_dropped() {
    let (transport, listener) = ChannelTransport::pair();
    drop(listener);

    let result = transport.connect("router:5000").await;
    assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
}
