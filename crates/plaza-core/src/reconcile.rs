//! Convergent merge of published snapshots into the local roster.

use contracts::{PlayerRecord, Presence, WorldSnapshot};

use crate::presence::presence;
use crate::registry::PlayerRegistry;

/// One observable effect of applying a snapshot. Consumers use these to
/// drive join and leave notifications without diffing the roster themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    /// The snapshot carried our own record for the first time; the roster
    /// adopted it as the local entity.
    AdoptedLocal(PlayerRecord),
    Joined(PlayerRecord),
    Updated(PlayerRecord),
    Left(String),
}

/// Merges snapshots into a [`PlayerRegistry`] on behalf of one local entity.
///
/// Apart from the one-shot adoption flag this is a pure fold: applying the
/// same snapshot twice yields no changes the second time, and any order of
/// duplicate deliveries converges on the same roster.
#[derive(Debug, Clone)]
pub struct Reconciler {
    local_id: String,
    local_profile: Option<(String, String)>,
    adopted: bool,
}

impl Reconciler {
    pub fn new(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            local_profile: None,
            adopted: false,
        }
    }

    /// Like [`Reconciler::new`], but adoption rewrites the record's name and
    /// skin with locally configured values.
    pub fn with_profile(
        local_id: impl Into<String>,
        name: impl Into<String>,
        skin: impl Into<String>,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            local_profile: Some((name.into(), skin.into())),
            adopted: false,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn is_adopted(&self) -> bool {
        self.adopted
    }

    /// Marks the local record as already placed, so the next snapshot
    /// mentioning it cannot re-adopt position and direction.
    pub fn mark_adopted(&mut self) {
        self.adopted = true;
    }

    /// Applies one snapshot. Snapshot order decides everything: records are
    /// visited in ascending id order, then local-only leftovers are evicted
    /// in ascending id order.
    pub fn apply(
        &mut self,
        snapshot: &WorldSnapshot,
        registry: &mut PlayerRegistry,
        now_ms: u64,
    ) -> Vec<RegistryChange> {
        let mut changes = Vec::new();

        for record in snapshot.players.values() {
            if record.player_id == self.local_id {
                if !self.adopted {
                    let mut adopted = record.clone();
                    if let Some((name, skin)) = &self.local_profile {
                        adopted.name = name.clone();
                        adopted.skin = skin.clone();
                    }
                    registry.upsert(adopted.clone());
                    self.adopted = true;
                    changes.push(RegistryChange::AdoptedLocal(adopted));
                    continue;
                }

                // Position and direction for the local entity come from local
                // commits only; later sightings restyle name and skin and
                // nothing else.
                if let Some(local) = registry.get(&record.player_id) {
                    if local.name != record.name || local.skin != record.skin {
                        let mut restyled = local.clone();
                        restyled.name = record.name.clone();
                        restyled.skin = record.skin.clone();
                        registry.upsert(restyled.clone());
                        changes.push(RegistryChange::Updated(restyled));
                    }
                }
                continue;
            }

            if presence(record, now_ms) == Presence::Offline {
                if registry.remove(&record.player_id).is_some() {
                    changes.push(RegistryChange::Left(record.player_id.clone()));
                }
                continue;
            }

            match registry.get(&record.player_id) {
                Some(existing) if existing == record => {}
                Some(_) => {
                    registry.upsert(record.clone());
                    changes.push(RegistryChange::Updated(record.clone()));
                }
                None => {
                    registry.upsert(record.clone());
                    changes.push(RegistryChange::Joined(record.clone()));
                }
            }
        }

        let evicted: Vec<String> = registry
            .ids()
            .filter(|id| *id != self.local_id && !snapshot.players.contains_key(*id))
            .map(str::to_string)
            .collect();
        for id in evicted {
            registry.remove(&id);
            changes.push(RegistryChange::Left(id));
        }

        changes
    }
}
