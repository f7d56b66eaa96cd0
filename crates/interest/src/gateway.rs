use std::sync::Arc;

use aoiworld_common::{ConnectionId, EntityId, Pose};
use aoiworld_grid::SpatialIndex;
use aoiworld_kernel::{
    ConfigError, EntityRegistry, IdAllocator, RegistryError, SpawnPicker, WorldConfig,
};

use crate::broadcast::{deliver, FanOut, InterestBroadcaster};
use crate::message::Message;
use crate::transport::Transport;

/// Entry point for the transport's connection lifecycle callbacks.
///
/// Owns one world: a registry, the transport used to reach its connections,
/// and the spawn picker for newcomers. Share it between connection workers
/// behind an `Arc`.
pub struct Gateway<T: Transport> {
    registry: Arc<EntityRegistry>,
    transport: T,
    spawns: SpawnPicker,
}

impl<T: Transport> Gateway<T> {
    pub fn new(registry: Arc<EntityRegistry>, transport: T, spawns: SpawnPicker) -> Self {
        Self {
            registry,
            transport,
            spawns,
        }
    }

    /// Validate `config` and build an empty world on top of `transport`.
    pub fn from_config(config: &WorldConfig, transport: T) -> Result<Self, ConfigError> {
        config.validate()?;
        let index = SpatialIndex::new(config.grid)?;
        Ok(Self::new(
            Arc::new(EntityRegistry::new(index, IdAllocator::new())),
            transport,
            SpawnPicker::new(config.spawn, config.seed),
        ))
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Create an entity for a freshly handshaken connection.
    ///
    /// The newcomer first learns its id and start position, then its
    /// neighbors are told about it and it receives the list of entities it
    /// can already see.
    pub fn on_connect(&self, connection: ConnectionId) -> Result<EntityId, RegistryError> {
        let pose = self.spawns.next_pose();
        let entity = self.registry.spawn(connection, pose)?;
        let id = entity.id;

        let own = std::slice::from_ref(&entity);
        deliver(&self.transport, own, &Message::AssignId { id });
        deliver(&self.transport, own, &Message::Spawned { id, pose });
        InterestBroadcaster::arrive(&self.registry, &self.transport, id)?;

        tracing::info!(entity = %id, %connection, x = pose.position.x, z = pose.position.z, "entity arrived");
        Ok(id)
    }

    /// Tear down an entity. Repeated or late calls are ignored.
    pub fn on_disconnect(&self, id: EntityId) -> FanOut {
        match InterestBroadcaster::leave(&self.registry, &self.transport, id) {
            Some(report) => {
                tracing::info!(entity = %id, witnesses = report.attempted(), "entity left");
                report
            }
            None => {
                tracing::debug!(entity = %id, "disconnect for an entity that is already gone");
                FanOut::default()
            }
        }
    }

    /// Relay chat text to the whole world.
    pub fn on_chat(&self, id: EntityId, text: &str) -> FanOut {
        InterestBroadcaster::chat(&self.registry, &self.transport, id, text).unwrap_or_else(|err| {
            tracing::warn!(entity = %id, %err, "chat dropped");
            FanOut::default()
        })
    }

    /// Commit a move and tell the new neighborhood. Moves for unknown
    /// entities or to positions outside the world are dropped.
    pub fn on_move(&self, id: EntityId, pose: Pose) -> FanOut {
        let result = self
            .registry
            .update_position(id, pose)
            .and_then(|_| InterestBroadcaster::moved(&self.registry, &self.transport, id));
        result.unwrap_or_else(|err| {
            tracing::warn!(entity = %id, %err, "move dropped");
            FanOut::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTransport;
    use crate::transport::ChannelTransport;
    use aoiworld_grid::GridConfig;
    use aoiworld_kernel::SpawnArea;

    fn gateway() -> Gateway<RecordingTransport> {
        Gateway::from_config(&WorldConfig::default(), RecordingTransport::new()).unwrap()
    }

    #[test]
    fn connect_sends_id_start_position_then_neighbors() {
        let gw = gateway();
        let conn = ConnectionId::new();
        let id = gw.on_connect(conn).unwrap();
        assert_eq!(id, EntityId(1));

        let sent = gw.transport().take();
        let kinds: Vec<&Message> = sent.iter().map(|(_, m)| m).collect();
        assert!(sent.iter().all(|(c, _)| *c == conn));
        assert_eq!(*kinds[0], Message::AssignId { id });
        assert!(matches!(kinds[1], Message::Spawned { id: s, .. } if *s == id));
        assert_eq!(*kinds[2], Message::Neighbors { entities: vec![] });
        assert_eq!(sent.len(), 3);
    }

    #[test]
    fn second_arrival_is_announced_to_the_first() {
        let gw = gateway();
        let first = ConnectionId::new();
        let second = ConnectionId::new();
        let a = gw.on_connect(first).unwrap();
        gw.transport().take();

        let b = gw.on_connect(second).unwrap();
        let sent = gw.transport().take();

        // Default spawn area fits inside a single neighborhood.
        assert!(sent.iter().any(|(c, m)| *c == first
            && matches!(m, Message::Spawned { id, .. } if *id == b)));
        let sync = sent
            .iter()
            .find_map(|(c, m)| match m {
                Message::Neighbors { entities } if *c == second => Some(entities.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(sync.len(), 1);
        assert_eq!(sync[0].id, a);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let gw = gateway();
        let a = gw.on_connect(ConnectionId::new()).unwrap();
        let b = gw.on_connect(ConnectionId::new()).unwrap();
        gw.transport().take();

        let report = gw.on_disconnect(a);
        assert_eq!(report.delivered, 1);
        assert_eq!(gw.on_disconnect(a), FanOut::default());
        assert!(gw.registry().contains(b));
        assert_eq!(gw.registry().len(), 1);
    }

    #[test]
    fn bad_moves_and_unknown_chatters_are_absorbed() {
        let gw = gateway();
        let a = gw.on_connect(ConnectionId::new()).unwrap();
        let before = gw.registry().get(a).unwrap().pose;
        gw.transport().take();

        assert_eq!(gw.on_move(a, Pose::new(-10.0, 0.0, 5.0, 0.0)), FanOut::default());
        assert_eq!(gw.registry().get(a).unwrap().pose, before);
        assert_eq!(gw.on_move(EntityId(99), Pose::default()), FanOut::default());
        assert_eq!(gw.on_chat(EntityId(99), "ghost"), FanOut::default());
        assert!(gw.transport().take().is_empty());
    }

    #[test]
    fn move_updates_registry_and_notifies() {
        let gw = gateway();
        let a = gw.on_connect(ConnectionId::new()).unwrap();
        let b = gw.on_connect(ConnectionId::new()).unwrap();
        gw.transport().take();

        let pose = Pose::new(170.0, 1.0, 150.0, 45.0);
        let report = gw.on_move(a, pose);
        assert_eq!(report.delivered, 1);
        assert_eq!(gw.registry().get(a).unwrap().pose, pose);

        let sent = gw.transport().take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, gw.registry().get(b).unwrap().connection);
        assert_eq!(sent[0].1, Message::Moved { id: a, pose });
    }

    #[test]
    fn from_config_rejects_degenerate_worlds() {
        let config = WorldConfig {
            grid: GridConfig {
                cols: 7,
                ..GridConfig::default()
            },
            ..WorldConfig::default()
        };
        assert!(matches!(
            Gateway::from_config(&config, RecordingTransport::new()),
            Err(ConfigError::Grid(_))
        ));
    }

    #[test]
    fn independent_worlds_share_nothing() {
        let one = gateway();
        let two = gateway();
        assert_eq!(one.on_connect(ConnectionId::new()).unwrap(), EntityId(1));
        assert_eq!(two.on_connect(ConnectionId::new()).unwrap(), EntityId(1));
        assert_eq!(one.registry().len(), 1);
        assert_eq!(two.registry().len(), 1);
    }

    #[test]
    fn concurrent_sessions_over_channels() {
        let config = WorldConfig {
            spawn: SpawnArea {
                min_x: 0,
                max_x: 250,
                min_z: 0,
                max_z: 250,
                elevation: 0.0,
            },
            seed: 11,
            ..WorldConfig::default()
        };
        let gw = Arc::new(Gateway::from_config(&config, Arc::new(ChannelTransport::new())).unwrap());

        std::thread::scope(|s| {
            for worker in 0..8u32 {
                let gw = Arc::clone(&gw);
                s.spawn(move || {
                    let (conn, inbox) = gw.transport().attach();
                    let id = gw.on_connect(conn).unwrap();
                    // Others may already have reached this inbox; the id is in there somewhere.
                    assert!(inbox.try_iter().any(|m| m == Message::AssignId { id }));

                    for step in 0..100u32 {
                        let x = ((worker * 31 + step * 7) % 250) as f32;
                        let z = ((worker * 17 + step * 13) % 250) as f32;
                        gw.on_move(id, Pose::new(x, 0.0, z, 0.0));
                        if step % 25 == 0 {
                            gw.on_chat(id, "tick");
                        }
                        while inbox.try_recv().is_ok() {}
                    }
                    gw.on_disconnect(id);
                    gw.transport().detach(conn);
                });
            }
        });

        assert!(gw.registry().is_empty());
        assert_eq!(gw.registry().index().total_members(), 0);
        assert!(gw.transport().is_empty());
    }
}
