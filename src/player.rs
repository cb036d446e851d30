//! Players known to this process, keyed by player id.

use std::collections::BTreeMap;

use hashbrown::HashMap;
use vox_blocks::PlayerId;
use vox_geom::{Quat, Vec3};
use vox_net::{PeerId, PlayerStateWire};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub orientation: Quat,
    pub eye_orientation: Quat,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            eye_orientation: Quat::IDENTITY,
        }
    }
}

impl From<PlayerStateWire> for PlayerState {
    fn from(w: PlayerStateWire) -> Self {
        Self {
            position: w.position,
            velocity: w.velocity,
            orientation: w.orientation,
            eye_orientation: w.eye_orientation,
        }
    }
}

impl From<PlayerState> for PlayerStateWire {
    fn from(s: PlayerState) -> Self {
        Self {
            position: s.position,
            velocity: s.velocity,
            orientation: s.orientation,
            eye_orientation: s.eye_orientation,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    /// Connection carrying this player; server side only.
    pub peer: Option<PeerId>,
    pub state: PlayerState,
}

#[derive(Debug, Default)]
pub struct PlayerManager {
    players: BTreeMap<PlayerId, Player>,
    by_peer: HashMap<PeerId, PlayerId>,
    last_id: PlayerId,
}

impl PlayerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh id for a newly connected peer. None if all ids are taken.
    pub fn create(&mut self, peer: PeerId) -> Option<PlayerId> {
        let id = self.next_free_id()?;
        self.players.insert(
            id,
            Player {
                id,
                peer: Some(peer),
                state: PlayerState::default(),
            },
        );
        self.by_peer.insert(peer, id);
        Some(id)
    }

    fn next_free_id(&mut self) -> Option<PlayerId> {
        let mut candidate = self.last_id;
        for _ in 0..PlayerId::MAX {
            candidate = candidate.wrapping_add(1);
            if candidate != 0 && !self.players.contains_key(&candidate) {
                self.last_id = candidate;
                return Some(candidate);
            }
        }
        None
    }

    /// Records a player announced by the server. False if already present.
    pub fn insert_remote(&mut self, id: PlayerId) -> bool {
        if self.players.contains_key(&id) {
            return false;
        }
        self.players.insert(
            id,
            Player {
                id,
                peer: None,
                state: PlayerState::default(),
            },
        );
        true
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        let player = self.players.remove(&id)?;
        if let Some(peer) = player.peer {
            self.by_peer.remove(&peer);
        }
        Some(player)
    }

    pub fn remove_by_peer(&mut self, peer: PeerId) -> Option<Player> {
        let id = self.by_peer.remove(&peer)?;
        self.players.remove(&id)
    }

    pub fn by_peer(&self, peer: PeerId) -> Option<PlayerId> {
        self.by_peer.get(&peer).copied()
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn update_state(&mut self, id: PlayerId, state: PlayerState) -> bool {
        match self.players.get_mut(&id) {
            Some(p) => {
                p.state = state;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.players.clear();
        self.by_peer.clear();
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }
}
