use aoiworld_common::{ConnectionId, EntityId};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::message::Message;
use crate::transport::{SendError, Transport};

/// Transport that records every delivery and can be told to fail for
/// specific connections.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<(ConnectionId, Message)>>,
    broken: Mutex<FxHashSet<ConnectionId>>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn break_connection(&self, connection: ConnectionId) {
        self.broken.lock().insert(connection);
    }

    pub(crate) fn take(&self) -> Vec<(ConnectionId, Message)> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Connections that received a message about `subject` matching `pred`.
    pub(crate) fn recipients(
        sent: &[(ConnectionId, Message)],
        pred: impl Fn(&Message) -> bool,
    ) -> FxHashSet<ConnectionId> {
        sent.iter()
            .filter(|(_, m)| pred(m))
            .map(|(c, _)| *c)
            .collect()
    }

    pub(crate) fn about(message: &Message, subject: EntityId) -> bool {
        message.subject() == Some(subject)
    }
}

impl Transport for RecordingTransport {
    fn send(&self, connection: ConnectionId, message: &Message) -> Result<(), SendError> {
        if self.broken.lock().contains(&connection) {
            return Err(SendError::Disconnected(connection));
        }
        self.sent.lock().push((connection, message.clone()));
        Ok(())
    }
}
