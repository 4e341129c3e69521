//! Maps grid positions to named rooms and tracks per-entity transitions.

use std::collections::BTreeMap;

use contracts::Position;

use crate::level::Room;

/// A detected room change for one entity. Only produced when the room
/// actually changed; `None` on either side means "the open plaza".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomTransition {
    pub exited: Option<String>,
    pub entered: Option<String>,
}

/// Resolves positions to rooms and remembers each entity's current room so
/// movement produces transition events instead of raw membership flags.
#[derive(Debug, Clone, Default)]
pub struct RoomBoundaryTracker {
    rooms: Vec<Room>,
    current: BTreeMap<String, Option<String>>,
}

impl RoomBoundaryTracker {
    pub fn new(rooms: Vec<Room>) -> Self {
        Self {
            rooms,
            current: BTreeMap::new(),
        }
    }

    /// The room containing `position`, if any. Rooms may overlap; the last
    /// match in declaration order wins, so later entries act as refinements.
    pub fn room_at(&self, position: Position) -> Option<&str> {
        self.rooms
            .iter()
            .filter(|room| room.contains_cell(position))
            .next_back()
            .map(|room| room.name.as_str())
    }

    /// The room this entity was last observed in.
    pub fn current_room(&self, entity_id: &str) -> Option<&str> {
        self.current
            .get(entity_id)
            .and_then(|room| room.as_deref())
    }

    /// Records where the entity stands now and reports a transition when its
    /// room changed since the previous observation.
    pub fn observe(&mut self, entity_id: &str, position: Position) -> Option<RoomTransition> {
        let room = self.room_at(position).map(str::to_string);
        let previous = self
            .current
            .insert(entity_id.to_string(), room.clone())
            .unwrap_or(None);

        if previous == room {
            return None;
        }
        Some(RoomTransition {
            exited: previous,
            entered: room,
        })
    }

    /// Drops the entity's tracking state; the next observation starts fresh.
    pub fn forget(&mut self, entity_id: &str) {
        self.current.remove(entity_id);
    }
}
