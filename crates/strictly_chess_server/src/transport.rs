//! Client transport handles.

use derive_more::{Display, Error};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{instrument, trace};

/// Process-unique identifier of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("conn-{}", _0)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next unused ID.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Why a send did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum TransportError {
    /// The peer has gone away.
    #[display("connection closed")]
    Closed,
    /// The peer is not draining its queue fast enough.
    #[display("outbound queue full")]
    QueueFull,
}

/// One live client, as seen by the session layer.
///
/// `send` must not block: delivery fans out to many clients from one task and
/// a stalled peer may not hold up the rest.
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Stable identity of this connection.
    fn id(&self) -> ConnectionId;

    /// Returns false once the peer is gone.
    fn is_open(&self) -> bool;

    /// Queues `text` for the peer.
    fn send(&self, text: &str) -> Result<(), TransportError>;
}

/// Transport backed by a bounded queue drained by the socket writer task.
///
/// The transport counts as closed once the receiving half is dropped, which
/// happens when the writer task stops.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    id: ConnectionId,
    outbound: mpsc::Sender<String>,
}

impl ChannelTransport {
    /// Creates a transport whose queue holds at most `capacity` messages,
    /// returning the receiving half for the writer.
    #[instrument]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (outbound, inbound) = mpsc::channel(capacity.max(1));
        let transport = Self {
            id: ConnectionId::next(),
            outbound,
        };
        (transport, inbound)
    }
}

impl Transport for ChannelTransport {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    fn send(&self, text: &str) -> Result<(), TransportError> {
        trace!(connection = %self.id, bytes = text.len(), "Queueing message");
        self.outbound.try_send(text.to_string()).map_err(|err| match err {
            TrySendError::Full(_) => TransportError::QueueFull,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}
