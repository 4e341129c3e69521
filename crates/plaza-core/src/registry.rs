//! Authoritative roster of entities currently known to this process.

use std::collections::BTreeMap;

use contracts::{PlayerRecord, WorldSnapshot};

/// Entities keyed by id. A `BTreeMap` keeps iteration and snapshots in a
/// stable order, which in turn keeps broadcasts and tests deterministic.
#[derive(Debug, Clone, Default)]
pub struct PlayerRegistry {
    players: BTreeMap<String, PlayerRecord>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record, returning the previous one if any.
    pub fn upsert(&mut self, record: PlayerRecord) -> Option<PlayerRecord> {
        self.players.insert(record.player_id.clone(), record)
    }

    pub fn remove(&mut self, player_id: &str) -> Option<PlayerRecord> {
        self.players.remove(player_id)
    }

    pub fn get(&self, player_id: &str) -> Option<&PlayerRecord> {
        self.players.get(player_id)
    }

    pub fn get_mut(&mut self, player_id: &str) -> Option<&mut PlayerRecord> {
        self.players.get_mut(player_id)
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Records in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.players.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.players.keys().map(String::as_str)
    }

    /// Stamps an explicit departure without dropping the record, so peers
    /// can still render the entity as offline until eviction.
    pub fn mark_left(&mut self, player_id: &str, now_ms: u64) -> bool {
        match self.players.get_mut(player_id) {
            Some(record) => {
                record.last_left_at_ms = Some(now_ms);
                true
            }
            None => false,
        }
    }

    /// Clones the roster into a publishable snapshot.
    pub fn snapshot(&self, published_at_ms: u64) -> WorldSnapshot {
        WorldSnapshot::from_players(published_at_ms, self.players.values().cloned())
    }
}
