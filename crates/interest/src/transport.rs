//! The single outbound seam between the interest core and the network.

use std::sync::Arc;

use aoiworld_common::ConnectionId;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::message::Message;

/// Errors from delivering one message to one connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("connection {0} is not attached")]
    UnknownConnection(ConnectionId),
    #[error("connection {0} hung up")]
    Disconnected(ConnectionId),
}

/// Unicast, fire-and-forget delivery to a single connection.
///
/// Implementations may block on I/O. Callers never hold a registry or cell
/// lock while calling `send`.
pub trait Transport: Send + Sync {
    fn send(&self, connection: ConnectionId, message: &Message) -> Result<(), SendError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, connection: ConnectionId, message: &Message) -> Result<(), SendError> {
        (**self).send(connection, message)
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, connection: ConnectionId, message: &Message) -> Result<(), SendError> {
        (**self).send(connection, message)
    }
}

/// In-process transport with one unbounded channel per attached connection.
///
/// Stands in for the network in tests and in the CLI simulation.
#[derive(Default)]
pub struct ChannelTransport {
    peers: RwLock<FxHashMap<ConnectionId, Sender<Message>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection and return its id and inbox.
    pub fn attach(&self) -> (ConnectionId, Receiver<Message>) {
        let connection = ConnectionId::new();
        let inbox = self.attach_as(connection);
        (connection, inbox)
    }

    /// Open (or reopen) a connection with a caller-chosen id.
    pub fn attach_as(&self, connection: ConnectionId) -> Receiver<Message> {
        let (tx, rx) = channel::unbounded();
        self.peers.write().insert(connection, tx);
        rx
    }

    /// Forget a connection. Returns `false` if it was not attached.
    pub fn detach(&self, connection: ConnectionId) -> bool {
        self.peers.write().remove(&connection).is_some()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

impl Transport for ChannelTransport {
    fn send(&self, connection: ConnectionId, message: &Message) -> Result<(), SendError> {
        let tx = self
            .peers
            .read()
            .get(&connection)
            .cloned()
            .ok_or(SendError::UnknownConnection(connection))?;
        tx.send(message.clone())
            .map_err(|_| SendError::Disconnected(connection))
    }
}
