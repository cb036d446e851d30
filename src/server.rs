//! Authoritative server: owns the world, answers clients, broadcasts edits.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use vox_blocks::builtin::{LIGHT_THING, STEEL};
use vox_blocks::{BlockId, BlockRegistry, ChunkKey, Orientation, PlayerId, Side};
use vox_chunk::{ChunkId, NeighborhoodId, NeighborhoodKey};
use vox_geom::{IVec3, Quat, Vec3};
use vox_net::{
    ChunkPlacement, JoinReason, LeaveReason, Message, Origin, Packet, PacketKind, PeerId,
    Priority, Reliability, SendMode, Target, Transport, TransportError, pack_block, unpack_block,
};

use crate::config::ServerConfig;
use crate::error::HandlerError;
use crate::player::PlayerManager;
use crate::world::World;

/// Position of the start neighborhood.
pub const START_ORIGIN: Vec3 = Vec3::new(0.0, -24.0, 0.0);

const PERIODIC_TRANSFORM: SendMode = SendMode::new(Reliability::Unreliable, Priority::Low);

pub struct Server<T: Transport> {
    config: ServerConfig,
    transport: T,
    world: World,
    players: PlayerManager,
    last_chunk_id: ChunkId,
    last_neighborhood_id: NeighborhoodId,
    ticks: u64,
}

impl<T: Transport> Server<T> {
    pub fn new(config: ServerConfig, registry: Arc<BlockRegistry>, transport: T) -> Self {
        Self {
            config,
            transport,
            world: World::new(registry, Side::Server),
            players: PlayerManager::new(),
            last_chunk_id: 0,
            last_neighborhood_id: 0,
            ticks: 0,
        }
    }

    /// Hosts on the configured port and builds the start world.
    pub fn start(&mut self) -> Result<(), TransportError> {
        self.transport
            .host(self.config.port, self.config.max_connections)?;
        self.build_start_world();
        log::info!(
            target: "server",
            "listening on port {} with {} chunks",
            self.config.port,
            self.world.chunks().chunk_count()
        );
        Ok(())
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn players(&self) -> &PlayerManager {
        &self.players
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// A plane of chunks in one neighborhood, each with a steel floor and a
    /// light column.
    pub fn build_start_world(&mut self) {
        let s = self.config.chunk_size.max(1);
        let r = self.config.start_plane_radius.max(0);
        let neigh = self.create_neighborhood(START_ORIGIN, Quat::IDENTITY);
        let reg = Arc::clone(self.world.registry());
        let ctx = self.world.hook_ctx(None);
        let edge = 12i32.min(s as i32 - 1);
        let column = IVec3::new(edge, edge, 0);
        for cx in -r..=r {
            for cz in -r..=r {
                let key = self.world.chunks_mut().create_chunk(s, s, s);
                self.assign_chunk_id(key);
                self.world
                    .chunks_mut()
                    .set_neighborhood(key, neigh, IVec3::new(cx, cz, 0));
                let Some(chunk) = self.world.chunks_mut().chunk_mut(key) else {
                    continue;
                };
                for x in 0..s as i32 {
                    for y in 0..s as i32 {
                        chunk.create_block(&reg, IVec3::new(x, y, 0), STEEL, 0, &ctx);
                    }
                }
                for z in 1..s as i32 {
                    chunk.create_block(&reg, IVec3::new(column.x, column.y, z), LIGHT_THING, 0, &ctx);
                }
            }
        }
    }

    fn assign_chunk_id(&mut self, key: ChunkKey) -> ChunkId {
        loop {
            self.last_chunk_id = self.last_chunk_id.wrapping_add(1);
            let id = self.last_chunk_id;
            if id != 0 && self.world.chunks_mut().assign_chunk_id(key, id) {
                return id;
            }
        }
    }

    fn assign_neighborhood_id(&mut self, key: NeighborhoodKey) -> NeighborhoodId {
        loop {
            self.last_neighborhood_id = self.last_neighborhood_id.wrapping_add(1);
            let id = self.last_neighborhood_id;
            if id != 0 && self.world.chunks_mut().assign_neighborhood_id(key, id) {
                return id;
            }
        }
    }

    /// New neighborhood with a fresh id. Clients learn of it with its first member.
    pub fn create_neighborhood(&mut self, position: Vec3, rotation: Quat) -> NeighborhoodKey {
        let key = self.world.chunks_mut().create_neighborhood(position, rotation);
        self.assign_neighborhood_id(key);
        key
    }

    /// Creates an empty chunk, standalone or in a lattice slot, and announces it.
    pub fn create_chunk(
        &mut self,
        dims: (u8, u8, u8),
        neighborhood: Option<(NeighborhoodKey, IVec3)>,
    ) -> Option<ChunkKey> {
        let key = self.world.chunks_mut().create_chunk(dims.0, dims.1, dims.2);
        self.assign_chunk_id(key);
        if let Some((neigh, pin)) = neighborhood {
            if !self.world.chunks_mut().set_neighborhood(key, neigh, pin) {
                self.world.destroy_chunk(key);
                return None;
            }
        }
        self.announce_chunk(key, Target::All);
        if let Some((neigh, _)) = neighborhood {
            self.send_neighborhood_transform(neigh, Target::All, None);
        }
        Some(key)
    }

    /// Authoritative block edit; resolves out-of-bounds positions into
    /// neighbor chunks and broadcasts the outcome to every client.
    pub fn set_block(
        &mut self,
        key: ChunkKey,
        pos: IVec3,
        id: BlockId,
        orientation: Orientation,
        player: Option<PlayerId>,
    ) -> Result<(), HandlerError> {
        let origin_id = self.chunk_id(key)?;
        if id != 0 && !self.world.registry().is_valid_id(id) {
            return Err(HandlerError::InvalidBlock(id));
        }
        let (res, local) = self
            .world
            .chunks_mut()
            .resolve_voxel(key, pos)
            .ok_or(HandlerError::OutOfBounds {
                chunk: origin_id,
                pos,
            })?;
        if res.created_neighborhood {
            self.announce_new_neighborhood(key);
        }
        if res.created_chunk {
            self.assign_chunk_id(res.chunk);
            self.announce_chunk(res.chunk, Target::All);
        }

        let reg = Arc::clone(self.world.registry());
        let ctx = self.world.hook_ctx(player);
        let chunk = self
            .world
            .chunks_mut()
            .chunk_mut(res.chunk)
            .ok_or(HandlerError::UnknownChunk(origin_id))?;
        if !chunk.in_bounds(local) {
            return Err(HandlerError::OutOfBounds {
                chunk: chunk.id,
                pos: local,
            });
        }
        if id == 0 {
            chunk.destroy_block(local, &ctx);
        } else if chunk
            .create_block(&reg, local, id, orientation, &ctx)
            .is_none()
        {
            return Err(HandlerError::InvalidBlock(id));
        }
        let msg = Message::SetBlock {
            chunk: chunk.id,
            pos: local,
            block: pack_block(id, orientation),
        };
        self.send(&msg, Target::All);
        Ok(())
    }

    /// Destroys a chunk and tells every client.
    pub fn remove_chunk(&mut self, id: ChunkId) -> bool {
        let Some(key) = self.world.chunks().chunk_by_id(id) else {
            return false;
        };
        self.world.destroy_chunk(key);
        self.send(&Message::RemoveChunk { chunk: id }, Target::All);
        log::info!(target: "server", "removed chunk {id}");
        true
    }

    /// Moves a neighborhood and all its members, then broadcasts reliably.
    pub fn set_neighborhood_transform(
        &mut self,
        id: NeighborhoodId,
        position: Vec3,
        rotation: Quat,
    ) -> bool {
        let Some(key) = self.world.chunks().neighborhood_by_id(id) else {
            return false;
        };
        self.world
            .chunks_mut()
            .set_neighborhood_transform(key, position, rotation);
        self.send_neighborhood_transform(key, Target::All, None);
        true
    }

    /// Drains the transport, runs the world, and does periodic broadcasts.
    pub fn tick(&mut self) {
        self.transport.update();
        while let Some(packet) = self.transport.get_packet() {
            self.handle_packet(packet);
        }
        self.world.tick();
        self.ticks += 1;
        let every = self.config.transform_broadcast_ticks;
        if every > 0 && self.ticks % every == 0 {
            for key in self.world.chunks().neighborhood_keys() {
                self.send_neighborhood_transform(key, Target::All, Some(PERIODIC_TRANSFORM));
            }
        }
    }

    /// Ticks at the configured rate; `max_ticks == 0` runs forever.
    pub fn run(&mut self, max_ticks: u64) {
        let period = Duration::from_millis(self.config.tick_ms);
        while max_ticks == 0 || self.ticks < max_ticks {
            self.tick();
            thread::sleep(period);
        }
    }

    pub fn shutdown(&mut self) {
        log::info!(target: "server", "shutting down with {} players", self.players.len());
        self.transport.shutdown();
        self.players.clear();
    }

    fn handle_packet(&mut self, packet: Packet) {
        let from = packet.from;
        match packet.kind {
            PacketKind::NewIncomingConnection => self.on_connect(from),
            PacketKind::DisconnectionNotification => self.on_disconnect(from, LeaveReason::Disconnected),
            PacketKind::ConnectionLost => self.on_disconnect(from, LeaveReason::Lost),
            PacketKind::Data(bytes) => {
                let result = Message::decode(&bytes, Origin::Client)
                    .map_err(HandlerError::from)
                    .and_then(|msg| self.handle_message(from, msg));
                if let Err(e) = result {
                    log::warn!(target: "server", "dropped packet from peer {from}: {e}");
                }
            }
            other => log::debug!(target: "server", "ignoring {other:?} from peer {from}"),
        }
    }

    fn on_connect(&mut self, peer: PeerId) {
        let Some(player) = self.players.create(peer) else {
            log::warn!(target: "server", "no free player id for peer {peer}");
            return;
        };
        log::info!(target: "server", "player {player} joined from peer {peer}");
        self.send(
            &Message::RemoteJoin {
                player,
                reason: JoinReason::Welcome,
            },
            Target::Peer(peer),
        );
        let others: Vec<PlayerId> = self
            .players
            .iter()
            .map(|p| p.id)
            .filter(|id| *id != player)
            .collect();
        for other in others {
            self.send(
                &Message::RemoteJoin {
                    player: other,
                    reason: JoinReason::Joined,
                },
                Target::Peer(peer),
            );
        }
        self.send(
            &Message::RemoteJoin {
                player,
                reason: JoinReason::Joined,
            },
            Target::AllExcept(peer),
        );
        self.send_snapshot(peer);
    }

    fn on_disconnect(&mut self, peer: PeerId, reason: LeaveReason) {
        let Some(player) = self.players.remove_by_peer(peer) else {
            return;
        };
        log::info!(target: "server", "player {} left ({reason:?})", player.id);
        self.send(
            &Message::RemoteLeave {
                player: player.id,
                reason,
            },
            Target::AllExcept(peer),
        );
    }

    /// Every chunk (creation then content) followed by every neighborhood transform.
    fn send_snapshot(&mut self, peer: PeerId) {
        for key in self.world.chunks().chunk_keys() {
            self.announce_chunk(key, Target::Peer(peer));
        }
        for key in self.world.chunks().neighborhood_keys() {
            self.send_neighborhood_transform(key, Target::Peer(peer), None);
        }
    }

    /// NewChunk plus its bulk content. Oversized chunks are announced
    /// without content.
    fn announce_chunk(&mut self, key: ChunkKey, target: Target) {
        let Some(new_chunk) = self.new_chunk_message(key) else {
            return;
        };
        self.send(&new_chunk, target);
        match self.world.chunk_download_messages(key) {
            Ok(downloads) => {
                for msg in &downloads {
                    self.send(msg, target);
                }
            }
            Err(e) => log::warn!(target: "server", "not sending contents of chunk {key:?}: {e}"),
        }
    }

    fn new_chunk_message(&self, key: ChunkKey) -> Option<Message> {
        let chunks = self.world.chunks();
        let chunk = chunks.chunk(key)?;
        let group = chunk.neighborhood().and_then(|n| chunks.neighborhood(n));
        let (neighborhood, placement) = match group {
            Some(n) => (n.id, ChunkPlacement::Lattice(chunk.position_in_neighborhood())),
            None => (
                0,
                ChunkPlacement::Explicit {
                    position: chunk.position,
                    rotation: chunk.rotation,
                },
            ),
        };
        Some(Message::NewChunk {
            chunk: chunk.id,
            neighborhood,
            dims: chunk.dims(),
            placement,
        })
    }

    /// A standalone chunk was just grouped by neighbor resolution.
    fn announce_new_neighborhood(&mut self, chunk: ChunkKey) {
        let Some(neigh) = self.world.chunks().chunk(chunk).and_then(|c| c.neighborhood()) else {
            return;
        };
        let id = self.assign_neighborhood_id(neigh);
        let Some(c) = self.world.chunks().chunk(chunk) else {
            return;
        };
        let msg = Message::SetChunkNeighborhood {
            chunk: c.id,
            neighborhood: id,
            pin: c.position_in_neighborhood(),
        };
        self.send(&msg, Target::All);
        self.send_neighborhood_transform(neigh, Target::All, None);
    }

    fn send_neighborhood_transform(
        &mut self,
        key: NeighborhoodKey,
        target: Target,
        mode: Option<SendMode>,
    ) {
        let Some(n) = self.world.chunks().neighborhood(key) else {
            return;
        };
        // Clients learn a neighborhood through its first member.
        if n.id == 0 || n.is_empty() {
            return;
        }
        let msg = Message::SetNeighborhoodTransform {
            neighborhood: n.id,
            position: n.position,
            rotation: n.rotation,
        };
        match mode {
            Some(mode) => self.send_with(&msg, mode, target),
            None => self.send(&msg, target),
        }
    }

    fn handle_message(&mut self, from: PeerId, msg: Message) -> Result<(), HandlerError> {
        let player = self
            .players
            .by_peer(from)
            .ok_or(HandlerError::UnknownPlayer(from))?;
        match msg {
            Message::UpdatePlayerState { state, .. } => {
                self.players.update_state(player, state.into());
                let fwd = Message::UpdatePlayerState {
                    player: Some(player),
                    state,
                };
                self.send(&fwd, Target::AllExcept(from));
                Ok(())
            }
            Message::SetBlock { chunk, pos, block } => {
                let key = self.chunk_key(chunk)?;
                let (id, orientation) = unpack_block(block);
                self.set_block(key, pos, id, orientation, Some(player))
            }
            Message::PlayerInteract { chunk, pos } => {
                let key = self.chunk_key(chunk)?;
                let ctx = self.world.hook_ctx(Some(player));
                let c = self
                    .world
                    .chunks_mut()
                    .chunk_mut(key)
                    .ok_or(HandlerError::UnknownChunk(chunk))?;
                if !c.in_bounds(pos) {
                    return Err(HandlerError::OutOfBounds { chunk, pos });
                }
                if !c.interact(pos, &ctx) {
                    log::debug!(target: "server", "player {player} interacted with a static block at {pos:?}");
                }
                Ok(())
            }
            Message::RefreshRequest { chunk: 0 } => {
                log::debug!(target: "server", "player {player} requested a full refresh");
                self.send_snapshot(from);
                Ok(())
            }
            Message::RefreshRequest { chunk } => {
                let key = self.chunk_key(chunk)?;
                for m in self.world.chunk_download_messages(key)? {
                    self.send(&m, Target::Peer(from));
                }
                Ok(())
            }
            other => Err(HandlerError::Unexpected(other.message_type())),
        }
    }

    fn chunk_key(&self, id: ChunkId) -> Result<ChunkKey, HandlerError> {
        self.world
            .chunks()
            .chunk_by_id(id)
            .ok_or(HandlerError::UnknownChunk(id))
    }

    fn chunk_id(&self, key: ChunkKey) -> Result<ChunkId, HandlerError> {
        self.world
            .chunks()
            .chunk(key)
            .map(|c| c.id)
            .ok_or(HandlerError::MissingChunk(key))
    }

    fn send(&mut self, msg: &Message, target: Target) {
        self.send_with(msg, msg.send_mode(), target);
    }

    fn send_with(&mut self, msg: &Message, mode: SendMode, target: Target) {
        if let Err(e) = self.transport.send(&msg.encode(), mode, target) {
            log::warn!(target: "server", "send {:?} to {target:?} failed: {e}", msg.message_type());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vox_net::LoopbackHub;

    fn server(radius: i32, size: u8) -> Server<vox_net::LoopbackTransport> {
        let config = ServerConfig {
            start_plane_radius: radius,
            chunk_size: size,
            ..ServerConfig::default()
        };
        let reg = Arc::new(BlockRegistry::with_builtin().unwrap());
        let mut s = Server::new(config, reg, LoopbackHub::new().endpoint());
        s.start().unwrap();
        s
    }

    #[test]
    fn start_world_layout() {
        let s = server(1, 24);
        let chunks = s.world().chunks();
        assert_eq!(chunks.chunk_count(), 9);
        assert_eq!(chunks.neighborhood_count(), 1);
        let n = chunks.neighborhood(chunks.neighborhood_by_id(1).unwrap()).unwrap();
        assert_eq!(n.position, START_ORIGIN);
        for key in chunks.chunk_keys() {
            let c = chunks.chunk(key).unwrap();
            assert_ne!(c.id, 0);
            assert_eq!(c.get_block(IVec3::new(3, 7, 0)).map(|b| b.id), Some(STEEL));
            assert_eq!(c.get_block(IVec3::new(12, 12, 5)).map(|b| b.id), Some(LIGHT_THING));
            assert!(c.get_block(IVec3::new(3, 7, 1)).is_none());
            let pin = c.position_in_neighborhood();
            assert!(pin.x.abs() <= 1 && pin.y.abs() <= 1 && pin.z == 0);
        }
    }

    #[test]
    fn small_chunks_clamp_the_light_column() {
        let s = server(0, 4);
        let chunks = s.world().chunks();
        let c = chunks.chunk(chunks.chunk_keys()[0]).unwrap();
        assert_eq!(c.get_block(IVec3::new(3, 3, 3)).map(|b| b.id), Some(LIGHT_THING));
    }

    #[test]
    fn set_block_outside_grows_the_plane() {
        let mut s = server(0, 4);
        let key = s.world().chunks().chunk_keys()[0];
        s.set_block(key, IVec3::new(4, 0, 1), STEEL, 0, None).unwrap();
        let chunks = s.world().chunks();
        assert_eq!(chunks.chunk_count(), 2);
        let grown = chunks.chunk(chunks.chunk_keys()[1]).unwrap();
        assert_eq!(grown.id, 2);
        assert_eq!(grown.position_in_neighborhood(), IVec3::new(1, 0, 0));
        assert_eq!(grown.get_block(IVec3::new(0, 0, 1)).map(|b| b.id), Some(STEEL));

        assert!(matches!(
            s.set_block(key, IVec3::ZERO, 999, 0, None),
            Err(HandlerError::InvalidBlock(999))
        ));
    }

    #[test]
    fn empty_neighborhoods_are_not_broadcast() {
        let hub = LoopbackHub::new();
        let config = ServerConfig {
            start_plane_radius: 0,
            chunk_size: 4,
            transform_broadcast_ticks: 1,
            ..ServerConfig::default()
        };
        let reg = Arc::new(BlockRegistry::with_builtin().unwrap());
        let mut s = Server::new(config, reg, hub.endpoint());
        s.start().unwrap();
        let mut peer = hub.endpoint();
        peer.connect("127.0.0.1", s.config.port).unwrap();
        s.create_neighborhood(Vec3::new(9.0, 0.0, 0.0), Quat::IDENTITY);
        s.tick();
        s.tick();
        let mut transforms = Vec::new();
        while let Some(p) = peer.get_packet() {
            if let PacketKind::Data(bytes) = p.kind {
                if let Ok(Message::SetNeighborhoodTransform { neighborhood, .. }) =
                    Message::decode(&bytes, Origin::Server)
                {
                    transforms.push(neighborhood);
                }
            }
        }
        assert!(!transforms.is_empty());
        assert!(transforms.iter().all(|id| *id == 1));
    }

    #[test]
    fn remove_and_move() {
        let mut s = server(0, 4);
        assert!(s.set_neighborhood_transform(1, Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY));
        assert!(!s.set_neighborhood_transform(9, Vec3::ZERO, Quat::IDENTITY));
        let key = s.world().chunks().chunk_keys()[0];
        let c = s.world().chunks().chunk(key).unwrap();
        assert!(c.position.approx_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
        assert!(s.remove_chunk(1));
        assert!(!s.remove_chunk(1));
        assert_eq!(s.world().chunks().chunk_count(), 0);
    }
}
