//! Identity ↔ slot registry and per-peer inboxes.
//!
//! The two indices are updated together under the owner's lock, so
//! `by_peer[p] == s` holds exactly when `by_slot[s] == p`. Each open slot
//! also records the connection it holds, so a send resolved here can never
//! land on a later occupant of the same slot. Inboxes outlive connections:
//! a peer that reconnects keeps its queue and readers.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::config::RegistryConfig;
use crate::net::{ConnectionId, SlotId};
use crate::peer::handshake::HandshakeState;
use crate::peer::inbox::{InboxSender, PeerInbox};
use crate::peer::PeerId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Peer {peer} already mapped to {slot}")]
    AlreadyRegistered { peer: PeerId, slot: SlotId },

    #[error("{slot} already mapped to peer {peer}")]
    SlotOccupied { slot: SlotId, peer: PeerId },

    #[error("No identified peer on {slot}")]
    UnknownSlotPeer { slot: SlotId },

    #[error("Peer registry full ({max} identities)")]
    RegistryFull { max: usize },
}

/// Result of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// First time this identity has been seen; its inbox was just created.
    pub first_contact: bool,
}

pub struct PeerRegistry {
    by_peer: HashMap<PeerId, SlotId>,
    by_slot: HashMap<SlotId, PeerId>,
    connections: HashMap<SlotId, ConnectionId>,
    accepted: HashSet<SlotId>,
    probing: HashSet<SlotId>,
    inboxes: HashMap<PeerId, (InboxSender, PeerInbox)>,
    max_peers: usize,
    inbox_capacity: usize,
}

impl PeerRegistry {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            by_peer: HashMap::new(),
            by_slot: HashMap::new(),
            connections: HashMap::new(),
            accepted: HashSet::new(),
            probing: HashSet::new(),
            inboxes: HashMap::new(),
            max_peers: config.max_peers,
            inbox_capacity: config.inbox_capacity,
        }
    }

    /// Map `peer` to `slot`, creating its inbox on first contact.
    pub fn register(&mut self, peer: PeerId, slot: SlotId) -> Result<Registration, RegistryError> {
        if let Some(&existing) = self.by_peer.get(&peer) {
            return Err(RegistryError::AlreadyRegistered {
                peer,
                slot: existing,
            });
        }
        if let Some(&other) = self.by_slot.get(&slot) {
            return Err(RegistryError::SlotOccupied { slot, peer: other });
        }

        let first_contact = !self.inboxes.contains_key(&peer);
        if first_contact {
            if self.inboxes.len() >= self.max_peers {
                return Err(RegistryError::RegistryFull {
                    max: self.max_peers,
                });
            }
            self.inboxes
                .insert(peer, PeerInbox::channel(peer, self.inbox_capacity));
        }

        self.by_peer.insert(peer, slot);
        self.by_slot.insert(slot, peer);
        Ok(Registration { first_contact })
    }

    /// Drop the mapping for a closed slot.
    ///
    /// Handshake flags for the slot are cleared whether or not a peer was
    /// mapped, so a reused slot starts from `Unidentified`.
    pub fn unregister_slot(&mut self, slot: SlotId) -> Result<PeerId, RegistryError> {
        self.accepted.remove(&slot);
        self.probing.remove(&slot);
        self.connections.remove(&slot);

        let peer = self
            .by_slot
            .remove(&slot)
            .ok_or(RegistryError::UnknownSlotPeer { slot })?;
        self.by_peer.remove(&peer);
        Ok(peer)
    }

    /// `slot` now holds `conn` and our identity probe is running on it.
    pub fn open_slot(&mut self, slot: SlotId, conn: ConnectionId) {
        self.connections.insert(slot, conn);
        self.probing.insert(slot);
    }

    /// The remote on `slot` acknowledged our identity.
    pub fn set_accepted(&mut self, slot: SlotId) {
        self.probing.remove(&slot);
        self.accepted.insert(slot);
    }

    pub fn is_accepted(&self, slot: SlotId) -> bool {
        self.accepted.contains(&slot)
    }

    pub fn handshake_state(&self, slot: SlotId) -> HandshakeState {
        let identified = self.by_slot.contains_key(&slot);
        let accepted = self.accepted.contains(&slot);
        match (identified, accepted) {
            (true, true) => HandshakeState::Established,
            (false, false) if !self.probing.contains(&slot) => HandshakeState::Unidentified,
            _ => HandshakeState::Pending,
        }
    }

    pub fn peer_for_slot(&self, slot: SlotId) -> Result<PeerId, RegistryError> {
        self.by_slot
            .get(&slot)
            .copied()
            .ok_or(RegistryError::UnknownSlotPeer { slot })
    }

    pub fn slot_for_peer(&self, peer: &PeerId) -> Option<SlotId> {
        self.by_peer.get(peer).copied()
    }

    /// Slot and connection currently carrying `peer`.
    pub fn route(&self, peer: &PeerId) -> Option<(SlotId, ConnectionId)> {
        let slot = self.slot_for_peer(peer)?;
        let conn = self.connections.get(&slot).copied()?;
        Some((slot, conn))
    }

    /// Identities currently mapped to a live slot, in no particular order.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.by_peer.keys().copied().collect()
    }

    pub fn connected_len(&self) -> usize {
        self.by_peer.len()
    }

    /// Every identity ever registered, connected or not.
    pub fn known_len(&self) -> usize {
        self.inboxes.len()
    }

    pub fn inbox(&self, peer: &PeerId) -> Option<PeerInbox> {
        self.inboxes.get(peer).map(|(_, inbox)| inbox.clone())
    }

    /// Resolve the peer on `slot` and the sender feeding its inbox.
    pub fn inbox_sender(&self, slot: SlotId) -> Result<(PeerId, InboxSender), RegistryError> {
        let peer = self.peer_for_slot(slot)?;
        self.inboxes
            .get(&peer)
            .map(|(tx, _)| (peer, tx.clone()))
            .ok_or(RegistryError::UnknownSlotPeer { slot })
    }
}

impl std::fmt::Debug for PeerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerRegistry")
            .field("connected", &self.by_peer.len())
            .field("known", &self.inboxes.len())
            .field("max_peers", &self.max_peers)
            .finish()
    }
}
