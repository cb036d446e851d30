//! Client replica: mirrors the server's chunk graph through the same chunk API.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use vox_blocks::{BlockId, BlockRegistry, ChunkKey, Orientation, PlayerId, Side};
use vox_chunk::{ChunkId, NeighborhoodId, NeighborhoodKey};
use vox_geom::{IVec3, Quat, Vec3};
use vox_net::{
    ChunkPlacement, JoinReason, LeaveReason, Message, Origin, Packet, PacketKind, PeerId, Target,
    Transport, TransportError, pack_block, unpack_block,
};

use crate::config::ClientConfig;
use crate::error::HandlerError;
use crate::player::{PlayerManager, PlayerState};
use crate::world::World;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Either side closed the connection.
    Explicit,
    /// The connection timed out.
    Lost,
    /// The server refused or never answered.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected(Option<DisconnectReason>),
    Connecting,
    Connected,
}

/// Notable things that happened during a tick, for the embedding program.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    Connected,
    Welcome(PlayerId),
    PlayerJoined(PlayerId),
    PlayerLeft(PlayerId, LeaveReason),
    Disconnected(DisconnectReason),
}

pub struct Client<T: Transport> {
    config: ClientConfig,
    transport: T,
    world: World,
    players: PlayerManager,
    state: ConnectionState,
    server: Option<PeerId>,
    player_id: Option<PlayerId>,
    events: Vec<ClientEvent>,
}

impl<T: Transport> Client<T> {
    pub fn new(config: ClientConfig, registry: Arc<BlockRegistry>, transport: T) -> Self {
        Self {
            config,
            transport,
            world: World::new(registry, Side::Client),
            players: PlayerManager::new(),
            state: ConnectionState::Disconnected(None),
            server: None,
            player_id: None,
            events: Vec::new(),
        }
    }

    pub fn connect(&mut self) -> Result<(), TransportError> {
        log::info!(target: "client", "connecting to {}:{}", self.config.address, self.config.port);
        self.transport.connect(&self.config.address, self.config.port)?;
        self.set_state(ConnectionState::Connecting);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.transport.shutdown();
        self.server = None;
        self.set_state(ConnectionState::Disconnected(Some(DisconnectReason::Explicit)));
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Our own player id, once the server has welcomed us.
    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
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

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn take_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn chunk_key(&self, id: ChunkId) -> Option<ChunkKey> {
        self.world.chunks().chunk_by_id(id)
    }

    pub fn tick(&mut self) {
        self.transport.update();
        while let Some(packet) = self.transport.get_packet() {
            self.handle_packet(packet);
        }
        self.world.tick();
    }

    /// Ticks until disconnected or `max_ticks` is reached (0 = no limit).
    pub fn run(&mut self, max_ticks: u64) {
        let period = Duration::from_millis(self.config.tick_ms);
        let mut n = 0;
        while max_ticks == 0 || n < max_ticks {
            self.tick();
            n += 1;
            if matches!(self.state, ConnectionState::Disconnected(_)) {
                break;
            }
            thread::sleep(period);
        }
    }

    /// Asks the server to place (or, with id 0, remove) a block.
    pub fn send_set_block(
        &mut self,
        chunk: ChunkId,
        pos: IVec3,
        id: BlockId,
        orientation: Orientation,
    ) -> Result<(), TransportError> {
        self.send(&Message::SetBlock {
            chunk,
            pos,
            block: pack_block(id, orientation),
        })
    }

    /// Runs the local cosmetic hook, then tells the server.
    pub fn send_interact(&mut self, chunk: ChunkId, pos: IVec3) -> Result<(), TransportError> {
        let ctx = self.world.hook_ctx(None);
        if let Some(c) = self
            .chunk_key(chunk)
            .and_then(|k| self.world.chunks_mut().chunk_mut(k))
        {
            c.interact(pos, &ctx);
        }
        self.send(&Message::PlayerInteract { chunk, pos })
    }

    pub fn send_player_state(&mut self, state: PlayerState) -> Result<(), TransportError> {
        self.send(&Message::UpdatePlayerState {
            player: None,
            state: state.into(),
        })
    }

    /// Re-download one chunk, or everything with id 0.
    pub fn request_refresh(&mut self, chunk: ChunkId) -> Result<(), TransportError> {
        self.send(&Message::RefreshRequest { chunk })
    }

    fn send(&mut self, msg: &Message) -> Result<(), TransportError> {
        let server = self.server.ok_or(TransportError::NotConnected)?;
        self.transport
            .send(&msg.encode(), msg.send_mode(), Target::Peer(server))
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            log::info!(target: "client", "connection {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn lose_connection(&mut self, reason: DisconnectReason) {
        self.server = None;
        self.players.clear();
        self.set_state(ConnectionState::Disconnected(Some(reason)));
        self.events.push(ClientEvent::Disconnected(reason));
    }

    fn handle_packet(&mut self, packet: Packet) {
        match packet.kind {
            PacketKind::ConnectionAccepted => {
                self.server = Some(packet.from);
                self.set_state(ConnectionState::Connected);
                self.events.push(ClientEvent::Connected);
            }
            PacketKind::ConnectionFailed => self.lose_connection(DisconnectReason::Failed),
            PacketKind::DisconnectionNotification => {
                self.lose_connection(DisconnectReason::Explicit)
            }
            PacketKind::ConnectionLost => self.lose_connection(DisconnectReason::Lost),
            PacketKind::NewIncomingConnection => {
                log::debug!(target: "client", "ignoring incoming connection from {}", packet.from);
            }
            PacketKind::Data(bytes) => {
                if Some(packet.from) != self.server {
                    log::debug!(target: "client", "data from unknown peer {}", packet.from);
                    return;
                }
                let result = Message::decode(&bytes, Origin::Server)
                    .map_err(HandlerError::from)
                    .and_then(|msg| self.handle_message(msg));
                if let Err(e) = result {
                    log::warn!(target: "client", "dropped packet: {e}");
                }
            }
        }
    }

    fn handle_message(&mut self, msg: Message) -> Result<(), HandlerError> {
        match msg {
            Message::RemoteJoin {
                player,
                reason: JoinReason::Welcome,
            } => {
                log::info!(target: "client", "joined as player {player}");
                self.player_id = Some(player);
                self.events.push(ClientEvent::Welcome(player));
            }
            Message::RemoteJoin { player, .. } => {
                log::info!(target: "client", "player {player} joined");
                self.players.insert_remote(player);
                self.events.push(ClientEvent::PlayerJoined(player));
            }
            Message::RemoteLeave { player, reason } => {
                log::info!(target: "client", "player {player} left ({reason:?})");
                self.players.remove(player);
                self.events.push(ClientEvent::PlayerLeft(player, reason));
            }
            Message::UpdatePlayerState {
                player: Some(player),
                state,
            } => {
                if Some(player) != self.player_id
                    && !self.players.update_state(player, state.into())
                {
                    return Err(HandlerError::UnknownPlayer(u32::from(player)));
                }
            }
            Message::SetBlock { chunk, pos, block } => self.apply_set_block(chunk, pos, block)?,
            Message::NewChunk {
                chunk,
                neighborhood,
                dims,
                placement,
            } => self.apply_new_chunk(chunk, neighborhood, dims, placement)?,
            Message::RemoveChunk { chunk } => {
                let key = self.known_chunk(chunk)?;
                self.world.destroy_chunk(key);
            }
            Message::SetChunkNeighborhood {
                chunk,
                neighborhood,
                pin,
            } => {
                let key = self.known_chunk(chunk)?;
                if neighborhood == 0 {
                    self.world.chunks_mut().leave_neighborhood(key);
                } else {
                    let at = self
                        .world
                        .chunks()
                        .chunk(key)
                        .map(|c| (c.position, c.rotation))
                        .unwrap_or((Vec3::ZERO, Quat::IDENTITY));
                    let neigh = self.neighborhood_or_create(neighborhood, at.0, at.1);
                    if !self.world.chunks_mut().set_neighborhood(key, neigh, pin) {
                        return Err(HandlerError::UnknownNeighborhood(neighborhood));
                    }
                }
            }
            Message::SetNeighborhoodTransform {
                neighborhood,
                position,
                rotation,
            } => {
                let key = self
                    .world
                    .chunks()
                    .neighborhood_by_id(neighborhood)
                    .ok_or(HandlerError::UnknownNeighborhood(neighborhood))?;
                self.world
                    .chunks_mut()
                    .set_neighborhood_transform(key, position, rotation);
            }
            Message::ChunkDownload {
                chunk,
                offset,
                entries,
            } => {
                let key = self.known_chunk(chunk)?;
                self.world.apply_chunk_download(key, offset, &entries)?;
            }
            other => return Err(HandlerError::Unexpected(other.message_type())),
        }
        Ok(())
    }

    fn known_chunk(&self, id: ChunkId) -> Result<ChunkKey, HandlerError> {
        self.chunk_key(id).ok_or(HandlerError::UnknownChunk(id))
    }

    fn neighborhood_or_create(
        &mut self,
        id: NeighborhoodId,
        position: Vec3,
        rotation: Quat,
    ) -> NeighborhoodKey {
        if let Some(key) = self.world.chunks().neighborhood_by_id(id) {
            return key;
        }
        let chunks = self.world.chunks_mut();
        let key = chunks.create_neighborhood(position, rotation);
        chunks.assign_neighborhood_id(key, id);
        log::debug!(target: "client", "created neighborhood {id}");
        key
    }

    fn apply_set_block(&mut self, chunk: ChunkId, pos: IVec3, block: u16) -> Result<(), HandlerError> {
        let key = self.known_chunk(chunk)?;
        let (id, orientation) = unpack_block(block);
        let reg = Arc::clone(self.world.registry());
        let ctx = self.world.hook_ctx(None);
        let c = self
            .world
            .chunks_mut()
            .chunk_mut(key)
            .ok_or(HandlerError::UnknownChunk(chunk))?;
        if !c.in_bounds(pos) {
            return Err(HandlerError::OutOfBounds { chunk, pos });
        }
        if id == 0 {
            c.destroy_block(pos, &ctx);
        } else if c.create_block(&reg, pos, id, orientation, &ctx).is_none() {
            return Err(HandlerError::InvalidBlock(id));
        }
        Ok(())
    }

    fn apply_new_chunk(
        &mut self,
        chunk: ChunkId,
        neighborhood: NeighborhoodId,
        dims: (u8, u8, u8),
        placement: ChunkPlacement,
    ) -> Result<(), HandlerError> {
        if let Some(old) = self.chunk_key(chunk) {
            log::debug!(target: "client", "chunk {chunk} announced again; replacing");
            self.world.destroy_chunk(old);
        }
        let key = self.world.chunks_mut().create_chunk(dims.0, dims.1, dims.2);
        self.world.chunks_mut().assign_chunk_id(key, chunk);
        match placement {
            ChunkPlacement::Explicit { position, rotation } => {
                if let Some(c) = self.world.chunks_mut().chunk_mut(key) {
                    c.position = position;
                    c.rotation = rotation;
                }
            }
            ChunkPlacement::Lattice(pin) => {
                let neigh = self.neighborhood_or_create(neighborhood, Vec3::ZERO, Quat::IDENTITY);
                if !self.world.chunks_mut().set_neighborhood(key, neigh, pin) {
                    self.world.destroy_chunk(key);
                    return Err(HandlerError::UnknownNeighborhood(neighborhood));
                }
            }
        }
        log::debug!(target: "client", "new chunk {chunk} {dims:?}");
        Ok(())
    }
}
