//! Who hears about what.
//!
//! Presence and movement are neighborhood-scoped: only the 3x3 cells around
//! the actor are told. Chat is world-scoped: every live entity, the speaker
//! included, receives it. Recipient sets are snapshotted under the registry
//! lock and then sent to with no lock held; a failed send is logged and the
//! remaining recipients are still served.

use aoiworld_common::EntityId;
use aoiworld_kernel::{Entity, EntityRegistry, RegistryError};

use crate::message::{Message, Presence};
use crate::transport::Transport;

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub failed: usize,
}

impl FanOut {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }

    pub fn merge(self, other: FanOut) -> FanOut {
        FanOut {
            delivered: self.delivered + other.delivered,
            failed: self.failed + other.failed,
        }
    }
}

/// Stateless event policy over a registry and a transport.
pub struct InterestBroadcaster;

impl InterestBroadcaster {
    /// Announce a newly registered entity to its neighbors and send it the
    /// list of everyone it can already see.
    pub fn arrive(
        registry: &EntityRegistry,
        transport: &impl Transport,
        id: EntityId,
    ) -> Result<FanOut, RegistryError> {
        let _span = tracing::debug_span!("arrive", entity = %id).entered();
        let surroundings = registry.surroundings(id)?;
        let actor = surroundings.entity;

        let spawned = Message::Spawned {
            id,
            pose: actor.pose,
        };
        let mut report = deliver(transport, &surroundings.neighbors, &spawned);

        let visible = Message::Neighbors {
            entities: surroundings.neighbors.iter().map(Presence::from).collect(),
        };
        report = report.merge(deliver(transport, std::slice::from_ref(&actor), &visible));

        tracing::debug!(
            neighbors = surroundings.neighbors.len(),
            delivered = report.delivered,
            failed = report.failed,
            "arrival broadcast"
        );
        Ok(report)
    }

    /// Tell the neighbors of the actor's committed position where it now is.
    ///
    /// Call after `EntityRegistry::update_position`; the neighborhood is read
    /// from the new position.
    pub fn moved(
        registry: &EntityRegistry,
        transport: &impl Transport,
        id: EntityId,
    ) -> Result<FanOut, RegistryError> {
        let _span = tracing::trace_span!("moved", entity = %id).entered();
        let surroundings = registry.surroundings(id)?;
        let moved = Message::Moved {
            id,
            pose: surroundings.entity.pose,
        };
        Ok(deliver(transport, &surroundings.neighbors, &moved))
    }

    /// Send chat text to every registered entity, the speaker included.
    pub fn chat(
        registry: &EntityRegistry,
        transport: &impl Transport,
        id: EntityId,
        text: &str,
    ) -> Result<FanOut, RegistryError> {
        let _span = tracing::debug_span!("chat", entity = %id).entered();
        if !registry.contains(id) {
            return Err(RegistryError::NotFound(id));
        }
        let everyone = registry.all();
        let talk = Message::Talk {
            id,
            text: text.to_owned(),
        };
        let report = deliver(transport, &everyone, &talk);
        tracing::debug!(
            recipients = everyone.len(),
            failed = report.failed,
            "chat broadcast"
        );
        Ok(report)
    }

    /// Remove an entity and tell whoever could see it.
    ///
    /// The witnesses are captured from the last position before the entity
    /// leaves the grid. Returns `None` if the entity was already gone.
    pub fn leave(
        registry: &EntityRegistry,
        transport: &impl Transport,
        id: EntityId,
    ) -> Option<FanOut> {
        let _span = tracing::debug_span!("leave", entity = %id).entered();
        let departure = registry.depart(id)?;
        let departed = Message::Departed { id };
        let report = deliver(transport, &departure.neighbors, &departed);
        tracing::debug!(
            witnesses = departure.neighbors.len(),
            failed = report.failed,
            "departure broadcast"
        );
        Some(report)
    }
}

/// One `send` per recipient. Failures are counted and logged, never fatal.
pub(crate) fn deliver(
    transport: &impl Transport,
    recipients: &[Entity],
    message: &Message,
) -> FanOut {
    let mut report = FanOut::default();
    for recipient in recipients {
        match transport.send(recipient.connection, message) {
            Ok(()) => {
                report.delivered += 1;
                tracing::trace!(to = %recipient.id, kind = ?message.kind(), "sent");
            }
            Err(err) => {
                report.failed += 1;
                tracing::warn!(to = %recipient.id, kind = ?message.kind(), %err, "notification dropped");
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTransport;
    use aoiworld_common::{ConnectionId, Pose};
    use aoiworld_grid::GridConfig;
    use crate::transport::SendError;
    use rustc_hash::FxHashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn registry() -> EntityRegistry {
        EntityRegistry::with_config(GridConfig::default()).unwrap()
    }

    fn spawn_at(registry: &EntityRegistry, x: f32, z: f32) -> Entity {
        registry
            .spawn(ConnectionId::new(), Pose::new(x, 0.0, z, 0.0))
            .unwrap()
    }

    fn connections(entities: &[&Entity]) -> FxHashSet<ConnectionId> {
        entities.iter().map(|e| e.connection).collect()
    }

    #[test]
    fn arrive_notifies_neighbors_and_syncs_the_newcomer() {
        let r = registry();
        let near = spawn_at(&r, 60.0, 10.0);
        let far = spawn_at(&r, 200.0, 200.0);
        let actor = spawn_at(&r, 10.0, 10.0);
        let t = RecordingTransport::new();

        let report = InterestBroadcaster::arrive(&r, &t, actor.id).unwrap();
        assert_eq!(report, FanOut { delivered: 2, failed: 0 });

        let sent = t.take();
        let spawned_to = RecordingTransport::recipients(&sent, |m| {
            matches!(m, Message::Spawned { id, .. } if *id == actor.id)
        });
        assert_eq!(spawned_to, connections(&[&near]));
        assert!(!spawned_to.contains(&far.connection));

        let (to, sync) = sent
            .iter()
            .find(|(_, m)| matches!(m, Message::Neighbors { .. }))
            .unwrap();
        assert_eq!(*to, actor.connection);
        assert_eq!(
            *sync,
            Message::Neighbors {
                entities: vec![Presence::from(&near)]
            }
        );
    }

    #[test]
    fn arrive_alone_still_sends_an_empty_neighbor_list() {
        let r = registry();
        let actor = spawn_at(&r, 10.0, 10.0);
        let t = RecordingTransport::new();
        let report = InterestBroadcaster::arrive(&r, &t, actor.id).unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(
            t.take(),
            vec![(actor.connection, Message::Neighbors { entities: vec![] })]
        );
    }

    #[test]
    fn move_targets_the_new_neighborhood() {
        let r = registry();
        let actor = spawn_at(&r, 10.0, 10.0);
        let old_neighbor = spawn_at(&r, 15.0, 15.0);
        let new_neighbor = spawn_at(&r, 210.0, 210.0);
        let t = RecordingTransport::new();

        let target = Pose::new(200.0, 3.0, 200.0, 180.0);
        r.update_position(actor.id, target).unwrap();
        InterestBroadcaster::moved(&r, &t, actor.id).unwrap();

        let sent = t.take();
        let to = RecordingTransport::recipients(&sent, |m| RecordingTransport::about(m, actor.id));
        assert_eq!(to, connections(&[&new_neighbor]));
        assert!(!to.contains(&old_neighbor.connection));
        assert!(!to.contains(&actor.connection));
        assert_eq!(
            sent[0].1,
            Message::Moved {
                id: actor.id,
                pose: target
            }
        );
    }

    #[test]
    fn move_set_equals_neighborhood_minus_actor() {
        let r = registry();
        let mut everyone = Vec::new();
        for i in 0..25 {
            let x = 25.0 + (i % 5) as f32 * 50.0;
            let z = 25.0 + (i / 5) as f32 * 50.0;
            everyone.push(spawn_at(&r, x, z));
        }
        let actor = everyone[12];
        let t = RecordingTransport::new();
        InterestBroadcaster::moved(&r, &t, actor.id).unwrap();

        let (x, z) = actor.pose.ground();
        let expected: FxHashSet<ConnectionId> = r
            .members_near(x, z)
            .unwrap()
            .into_iter()
            .filter(|id| *id != actor.id)
            .map(|id| r.get(id).unwrap().connection)
            .collect();
        let sent = t.take();
        assert_eq!(sent.len(), 8);
        assert_eq!(RecordingTransport::recipients(&sent, |_| true), expected);
    }

    #[test]
    fn chat_reaches_everyone_including_the_speaker() {
        let r = registry();
        let speaker = spawn_at(&r, 10.0, 10.0);
        let far = spawn_at(&r, 240.0, 240.0);
        let mid = spawn_at(&r, 120.0, 120.0);
        let t = RecordingTransport::new();

        let report = InterestBroadcaster::chat(&r, &t, speaker.id, "hello world").unwrap();
        assert_eq!(report.delivered, 3);

        let sent = t.take();
        let to = RecordingTransport::recipients(&sent, |m| {
            matches!(m, Message::Talk { text, .. } if text == "hello world")
        });
        assert_eq!(to, connections(&[&speaker, &far, &mid]));
    }

    #[test]
    fn chat_from_unknown_entity_is_not_found() {
        let r = registry();
        let t = RecordingTransport::new();
        assert_eq!(
            InterestBroadcaster::chat(&r, &t, EntityId(77), "?"),
            Err(RegistryError::NotFound(EntityId(77)))
        );
        assert!(t.take().is_empty());
    }

    #[test]
    fn leave_uses_the_last_position_and_removes_the_entity() {
        let r = registry();
        let actor = spawn_at(&r, 10.0, 10.0);
        let witness = spawn_at(&r, 60.0, 60.0);
        let bystander = spawn_at(&r, 200.0, 10.0);
        let t = RecordingTransport::new();

        let report = InterestBroadcaster::leave(&r, &t, actor.id).unwrap();
        assert_eq!(report, FanOut { delivered: 1, failed: 0 });
        assert_eq!(
            t.take(),
            vec![(witness.connection, Message::Departed { id: actor.id })]
        );

        assert!(!r.contains(actor.id));
        assert!(!r.members_near(10.0, 10.0).unwrap().contains(&actor.id));
        assert_eq!(r.index().total_members(), 2);
        assert!(r.contains(bystander.id));

        // A duplicate disconnect is silent.
        assert!(InterestBroadcaster::leave(&r, &t, actor.id).is_none());
        assert!(t.take().is_empty());
    }

    #[test]
    fn one_failed_recipient_does_not_stop_the_fan_out() {
        let r = registry();
        let speaker = spawn_at(&r, 10.0, 10.0);
        let broken = spawn_at(&r, 12.0, 12.0);
        let healthy = spawn_at(&r, 14.0, 14.0);
        let t = RecordingTransport::new();
        t.break_connection(broken.connection);

        let report = InterestBroadcaster::chat(&r, &t, speaker.id, "still here").unwrap();
        assert_eq!(report, FanOut { delivered: 2, failed: 1 });
        assert_eq!(report.attempted(), 3);
        let to = RecordingTransport::recipients(&t.take(), |_| true);
        assert_eq!(to, connections(&[&speaker, &healthy]));
    }

    /// Moves a bystander back and forth from inside every `send`, which
    /// needs the registry write lock.
    struct ReentrantTransport {
        registry: Arc<EntityRegistry>,
        mover: EntityId,
        sends: AtomicUsize,
    }

    impl Transport for ReentrantTransport {
        fn send(&self, connection: ConnectionId, _: &Message) -> Result<(), SendError> {
            let n = self.sends.fetch_add(1, Ordering::SeqCst);
            let x = if n % 2 == 0 { 30.0 } else { 20.0 };
            self.registry
                .update_position(self.mover, Pose::new(x, 0.0, 20.0, 0.0))
                .map_err(|_| SendError::Disconnected(connection))?;
            self.registry.all();
            Ok(())
        }
    }

    #[test]
    fn sends_run_with_no_registry_lock_held() {
        let r = Arc::new(registry());
        let actor = spawn_at(&r, 10.0, 10.0);
        let witness = spawn_at(&r, 60.0, 60.0);
        let mover = spawn_at(&r, 20.0, 20.0);
        let transport = ReentrantTransport {
            registry: Arc::clone(&r),
            mover: mover.id,
            sends: AtomicUsize::new(0),
        };

        let (done_tx, done_rx) = crossbeam::channel::bounded(1);
        let worker_registry = Arc::clone(&r);
        std::thread::spawn(move || {
            let r = &worker_registry;
            let mut total = InterestBroadcaster::arrive(r, &transport, actor.id).unwrap();
            r.update_position(actor.id, Pose::new(12.0, 0.0, 12.0, 0.0))
                .unwrap();
            total = total.merge(InterestBroadcaster::moved(r, &transport, actor.id).unwrap());
            total = total.merge(InterestBroadcaster::chat(r, &transport, actor.id, "hi").unwrap());
            total = total.merge(InterestBroadcaster::leave(r, &transport, actor.id).unwrap());
            let _ = done_tx.send((total, transport.sends.load(Ordering::SeqCst)));
        });

        let (total, sends) = done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("a broadcast held a registry lock across send");
        // arrive: witness + mover + sync; moved: 2; chat: 3; leave: 2
        assert_eq!(total, FanOut { delivered: 10, failed: 0 });
        assert_eq!(sends, 10);
        assert!(!r.contains(actor.id));
        assert!(r.contains(witness.id));
        assert_eq!(r.index().total_members(), 2);
    }
}
