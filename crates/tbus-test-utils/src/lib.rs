//! Common test helpers and utilities for T-Bus tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - A mock NK-IPS that accepts TCP connections and records every byte
//! - A parser that splits a recorded byte stream into T-Bus frames

use parking_lot::Mutex;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tbus_core::codec::FRAME_SIZE;
use tbus_core::{CrosspointFrame, HANDSHAKE_FRAME, HEARTBEAT_FRAME};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait for an atomic counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_for(
        move || async move { counter.load(Ordering::SeqCst) >= target },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

// ============================================================================
// Stream Parsing
// ============================================================================

/// One unit of what a T-Bus client writes to the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Handshake,
    Heartbeat,
    Crosspoint(CrosspointFrame),
    /// Bytes that match none of the above; parsing stops here
    Unknown(Vec<u8>),
}

/// Split a recorded client byte stream into frames
pub fn parse_stream(mut bytes: &[u8]) -> Vec<WireFrame> {
    let mut frames = Vec::new();

    while !bytes.is_empty() {
        if bytes.starts_with(HANDSHAKE_FRAME) {
            frames.push(WireFrame::Handshake);
            bytes = &bytes[HANDSHAKE_FRAME.len()..];
        } else if bytes.starts_with(HEARTBEAT_FRAME) {
            frames.push(WireFrame::Heartbeat);
            bytes = &bytes[HEARTBEAT_FRAME.len()..];
        } else if bytes.len() >= FRAME_SIZE {
            match CrosspointFrame::decode(&bytes[..FRAME_SIZE]) {
                Ok(frame) => {
                    frames.push(WireFrame::Crosspoint(frame));
                    bytes = &bytes[FRAME_SIZE..];
                }
                Err(_) => {
                    frames.push(WireFrame::Unknown(bytes.to_vec()));
                    break;
                }
            }
        } else {
            frames.push(WireFrame::Unknown(bytes.to_vec()));
            break;
        }
    }

    frames
}

// ============================================================================
// Mock Router - RAII wrapper with proper cleanup
// ============================================================================

#[derive(Default)]
struct MockState {
    /// Bytes received, one buffer per accepted connection
    connections: Vec<Vec<u8>>,
    /// Tasks serving the open connections
    tasks: Vec<JoinHandle<()>>,
}

/// A TCP listener standing in for an NK-IPS. Stops on drop.
pub struct MockRouter {
    addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
    accepted: Arc<AtomicU32>,
    handle: Option<JoinHandle<()>>,
}

impl MockRouter {
    /// Bind to an ephemeral localhost port and start accepting
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock router");
        let addr = listener.local_addr().expect("mock router address");
        let state = Arc::new(Mutex::new(MockState::default()));
        let accepted = Arc::new(AtomicU32::new(0));

        let accept_state = state.clone();
        let accept_count = accepted.clone();
        let handle = tokio::spawn(async move {
            while let Ok((mut stream, peer)) = listener.accept().await {
                debug!("Mock router accepted {}", peer);
                let state = accept_state.clone();
                let index = {
                    let mut guard = state.lock();
                    guard.connections.push(Vec::new());
                    guard.connections.len() - 1
                };
                accept_count.fetch_add(1, Ordering::SeqCst);

                let conn_state = state.clone();
                let task = tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => conn_state.lock().connections[index].extend_from_slice(&buf[..n]),
                        }
                    }
                });
                state.lock().tasks.push(task);
            }
        });

        Self {
            addr,
            state,
            accepted,
            handle: Some(handle),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Number of connections accepted so far
    pub fn connection_count(&self) -> u32 {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` connections were accepted
    pub async fn wait_for_connections(&self, n: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.accepted, n, max_wait).await
    }

    /// Raw bytes received on connection `index`
    pub fn received(&self, index: usize) -> Vec<u8> {
        self.state
            .lock()
            .connections
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Parsed frames received on connection `index`
    pub fn frames(&self, index: usize) -> Vec<WireFrame> {
        parse_stream(&self.received(index))
    }

    /// Wait until connection `index` has produced at least `n` frames
    pub async fn wait_for_frames(&self, index: usize, n: usize, max_wait: Duration) -> bool {
        let router = self;
        wait_for(
            move || async move { router.frames(index).len() >= n },
            DEFAULT_CHECK_INTERVAL,
            max_wait,
        )
        .await
    }

    /// Drop every open connection, as a router reboot would
    pub fn drop_connections(&self) {
        for task in self.state.lock().tasks.drain(..) {
            task.abort();
        }
    }

    /// Stop accepting and drop open connections (also happens on drop)
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.drop_connections();
    }
}

impl Drop for MockRouter {
    fn drop(&mut self) {
        self.stop();
    }
}
