//! Transport seam and per-connection record

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::Identity;

pub type ConnectionId = Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("send buffer full")]
    Full,
}

/// Write side of one client connection.
///
/// Writes never block: a transport either accepts the frame into its buffer or
/// refuses it.
pub trait Transport: Send + Sync {
    fn write(&self, frame: &str) -> Result<(), TransportError>;

    /// Frames accepted but not yet flushed to the socket
    fn buffered_amount(&self) -> usize;

    fn close(&self, code: u16);
}

/// Frame queued for a socket's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close(u16),
}

/// [`Transport`] backed by a bounded mpsc channel drained by the socket writer.
pub struct ChannelTransport {
    sender: mpsc::Sender<OutboundFrame>,
}

impl ChannelTransport {
    pub fn new(sender: mpsc::Sender<OutboundFrame>) -> Self {
        Self { sender }
    }

    /// Transport plus the receiving end for the writer task
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }
}

impl Transport for ChannelTransport {
    fn write(&self, frame: &str) -> Result<(), TransportError> {
        self.sender
            .try_send(OutboundFrame::Text(frame.to_string()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TransportError::Full,
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            })
    }

    fn buffered_amount(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    fn close(&self, code: u16) {
        let _ = self.sender.try_send(OutboundFrame::Close(code));
    }
}

/// Registry-owned state of one connection
pub(crate) struct ConnectionEntry {
    pub id: ConnectionId,
    pub transport: Arc<dyn Transport>,
    pub identity: Option<Identity>,
    pub connected_at: DateTime<Utc>,
    pub authenticated_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub rooms: HashSet<String>,
}

impl ConnectionEntry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            transport,
            identity: None,
            connected_at: now,
            authenticated_at: None,
            last_activity: now,
            rooms: HashSet::new(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.user_id.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_transport_reports_buffer_and_close() {
        let (transport, mut rx) = ChannelTransport::channel(4);

        transport.write("a").unwrap();
        transport.write("b").unwrap();
        assert_eq!(transport.buffered_amount(), 2);

        assert_eq!(rx.recv().await, Some(OutboundFrame::Text("a".into())));
        assert_eq!(transport.buffered_amount(), 1);

        drop(rx);
        assert_eq!(transport.write("c"), Err(TransportError::Closed));
    }

    #[test]
    fn test_full_buffer_refuses_write() {
        let (transport, _rx) = ChannelTransport::channel(1);
        transport.write("a").unwrap();
        assert_eq!(transport.write("b"), Err(TransportError::Full));
    }
}
