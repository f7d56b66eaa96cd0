//! Interest broadcasting on top of the world kernel.
//!
//! Turns connection lifecycle events (connect, move, chat, disconnect) into
//! registry mutations followed by notifications to exactly the connections
//! that should hear about them.
//!
//! # Invariants
//! - Arrival, movement and departure reach only the actor's 3x3 neighborhood.
//! - Chat reaches every live entity, the speaker included.
//! - Departure witnesses are taken from the last committed position.
//! - No registry or cell lock is held while the transport sends.

pub mod broadcast;
pub mod gateway;
pub mod message;
pub mod transport;

#[cfg(test)]
mod testing;

pub use broadcast::{FanOut, InterestBroadcaster};
pub use gateway::Gateway;
pub use message::{BroadcastKind, Message, MessageKind, Presence};
pub use transport::{ChannelTransport, SendError, Transport};
