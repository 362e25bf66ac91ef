//! An in-process `Transport` implementation: a channel pair standing in for
//! the Aeron IPC/UDP substrate the core treats as an external collaborator.
//! Used pervasively by the client/server engine test suites and by the
//! facade crate's doc examples.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use rrpc_core::{Transport, TransportError};
use tokio::sync::{mpsc, Mutex};

/// Number of in-flight frames a `MemTransport` direction will buffer before
/// `send_frame` starts reporting back-pressure.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
struct Inner {
    tx: mpsc::Sender<Bytes>,
    rx: Mutex<mpsc::Receiver<Bytes>>,
    closed: AtomicBool,
}

/// Cheap-to-clone handle to one side of an in-process transport pair.
#[derive(Debug, Clone)]
pub struct MemTransport {
    inner: Arc<Inner>,
}

impl MemTransport {
    /// Construct a connected pair: frames sent on `a` are received on `b`
    /// and vice versa.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx_b, rx_b) = mpsc::channel(CHANNEL_CAPACITY);

        let a = Self {
            inner: Arc::new(Inner {
                tx: tx_b,
                rx: Mutex::new(rx_a),
                closed: AtomicBool::new(false),
            }),
        };
        let b = Self {
            inner: Arc::new(Inner {
                tx: tx_a,
                rx: Mutex::new(rx_b),
                closed: AtomicBool::new(false),
            }),
        };
        (a, b)
    }
}

impl Transport for MemTransport {
    async fn send_frame(&self, frame: Bytes) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        match self.inner.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(TransportError::BackPressure),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }

    async fn recv_frame(&self) -> Result<Bytes, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut rx = self.inner.rx.lock().await;
        rx.recv().await.ok_or(TransportError::Closed)
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}
