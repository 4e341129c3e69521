//! One entity's live view of the shared space.
//!
//! `WorldView` wires the walker, the roster, the reconciler, the room
//! tracker, and the channel log together behind a single clock-free API.
//! The interactive client drives one of these per session; the headless bot
//! surface reuses the same pieces server-side, which is what keeps the two
//! paths in agreement.

use contracts::{
    ChatMessage, Direction, MoveRejection, PlayerRecord, Position, Presence, WorldSnapshot,
};

use crate::collision::CollisionMap;
use crate::level::{LevelData, LevelError};
use crate::movement::{MovementState, StepOutcome};
use crate::presence::presence;
use crate::proximity;
use crate::reconcile::{Reconciler, RegistryChange};
use crate::registry::PlayerRegistry;
use crate::rooms::RoomBoundaryTracker;
use crate::routing::{route, ChannelKey, ChannelLog, RouteError, RoutedMessage};
use crate::sequencer::{run_sequence, SequenceReport};
use crate::{BOT_STEP_DELAY_MS, PROXIMITY_RADIUS};

pub struct WorldView {
    local: PlayerRecord,
    movement: MovementState,
    registry: PlayerRegistry,
    reconciler: Reconciler,
    rooms: RoomBoundaryTracker,
    log: ChannelLog,
    map: CollisionMap,
    nearby: Vec<String>,
}

impl WorldView {
    /// Builds a view for `local` standing in `level`. Fails if the record's
    /// starting cell is blocked or outside the grid.
    pub fn new(level: &LevelData, mut local: PlayerRecord) -> Result<Self, LevelError> {
        let map = CollisionMap::from_level(level);
        if map.is_blocked(local.position.x, local.position.y) {
            return Err(LevelError::BlockedSpawn {
                spawn: local.position,
            });
        }

        let mut rooms = RoomBoundaryTracker::new(level.rooms.clone());
        rooms.observe(&local.player_id, local.position);
        local.room = rooms.current_room(&local.player_id).map(str::to_string);

        let movement = MovementState::new(local.position, local.direction);
        let mut reconciler = Reconciler::new(local.player_id.clone());
        reconciler.mark_adopted();

        let mut registry = PlayerRegistry::new();
        registry.upsert(local.clone());

        Ok(Self {
            local,
            movement,
            registry,
            reconciler,
            rooms,
            log: ChannelLog::new(),
            map,
            nearby: Vec::new(),
        })
    }

    /// Builds a view that resumes `local_id` from the shared space.
    ///
    /// The walker stands at the level spawn until the first snapshot that
    /// mentions the id, which adopts the published position and direction.
    /// A returning entity therefore continues where it last stood, while the
    /// given name and skin replace whatever the old record carried.
    pub fn join(
        level: &LevelData,
        local_id: impl Into<String>,
        name: impl Into<String>,
        skin: impl Into<String>,
        now_ms: u64,
    ) -> Result<Self, LevelError> {
        let (local_id, name, skin) = (local_id.into(), name.into(), skin.into());
        let local = PlayerRecord::new(
            local_id.clone(),
            name.clone(),
            level.spawn,
            Direction::Down,
            skin.clone(),
            now_ms,
        );

        let mut view = Self::new(level, local)?;
        view.reconciler = Reconciler::with_profile(local_id, name, skin);
        Ok(view)
    }

    pub fn local(&self) -> &PlayerRecord {
        &self.local
    }

    pub fn position(&self) -> Position {
        self.movement.position()
    }

    pub fn direction(&self) -> Direction {
        self.movement.direction()
    }

    pub fn current_room(&self) -> Option<&str> {
        self.rooms.current_room(&self.local.player_id)
    }

    pub fn map(&self) -> &CollisionMap {
        &self.map
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn log(&self) -> &ChannelLog {
        &self.log
    }

    /// Ids currently within [`PROXIMITY_RADIUS`], nearest first. Refreshed
    /// after every step and snapshot.
    pub fn nearby(&self) -> &[String] {
        &self.nearby
    }

    /// Attempts one step for the local entity. Commits and blocks count as
    /// activity; cooldown rejections change nothing at all.
    pub fn step(&mut self, direction: Direction, now_ms: u64) -> StepOutcome {
        let outcome = self.movement.try_step(direction, &self.map, now_ms);
        if outcome != StepOutcome::Cooldown {
            self.local.mark_seen(now_ms);
            self.sync_local(now_ms);
            self.refresh_nearby();
        }
        outcome
    }

    /// Runs a queued sequence at the standard bot pace, keeping the local
    /// record in sync with however far the walker got.
    pub fn run_moves(&mut self, moves: &[Direction], start_ms: u64) -> SequenceReport {
        let report = run_sequence(&mut self.movement, &self.map, moves, start_ms, BOT_STEP_DELAY_MS);
        let attempts = report.completed.len() + usize::from(report.failed.is_some());
        let end_ms = start_ms + attempts as u64 * BOT_STEP_DELAY_MS;

        // Commits and blocked turns count as activity; a cooldown rejection
        // leaves the record untouched.
        if !report.completed.is_empty() || report.failure == Some(MoveRejection::Blocked) {
            self.local.mark_seen(end_ms);
        }
        self.sync_local(end_ms);
        self.refresh_nearby();
        report
    }

    /// Merges a published snapshot and keeps room tracking and the nearby
    /// cache aligned with the resulting roster.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &WorldSnapshot,
        now_ms: u64,
    ) -> Vec<RegistryChange> {
        let changes = self.reconciler.apply(snapshot, &mut self.registry, now_ms);
        for change in &changes {
            match change {
                RegistryChange::Joined(record) | RegistryChange::Updated(record) => {
                    if record.player_id == self.local.player_id {
                        // A restyle of our own record; movement stays ours.
                        self.local.name = record.name.clone();
                        self.local.skin = record.skin.clone();
                    } else {
                        self.rooms.observe(&record.player_id, record.position);
                    }
                }
                RegistryChange::AdoptedLocal(record) => {
                    self.movement.teleport(record.position, record.direction);
                    self.local = record.clone();
                    self.local.mark_seen(now_ms);
                    self.sync_local(now_ms);
                }
                RegistryChange::Left(id) => {
                    self.rooms.forget(id);
                }
            }
        }
        self.refresh_nearby();
        changes
    }

    /// Routes and records one outgoing message.
    pub fn send(
        &mut self,
        text: impl Into<String>,
        target: Option<&str>,
        now_ms: u64,
    ) -> Result<RoutedMessage, RouteError> {
        let routed = route(&self.local, text, target, &self.registry, &self.rooms, now_ms)?;
        self.log.record(&routed);
        self.local.mark_seen(now_ms);
        self.sync_local(now_ms);
        Ok(routed)
    }

    /// Files a message delivered by the outside world into its channel log.
    pub fn record_incoming(&mut self, message: &ChatMessage) {
        self.log
            .append(ChannelKey::for_message(message), message.clone());
    }

    /// The record peers should see right now, with the transient moving
    /// flag evaluated against the given clock.
    pub fn publishable(&self, now_ms: u64) -> PlayerRecord {
        let mut record = self.local.clone();
        record.moving = self.movement.is_moving(now_ms);
        record
    }

    /// Stamps an explicit departure; peers classify us offline immediately.
    pub fn leave(&mut self, now_ms: u64) {
        self.local.last_left_at_ms = Some(now_ms);
        self.local.moving = false;
        self.registry.upsert(self.local.clone());
    }

    pub fn presence_of(&self, entity_id: &str, now_ms: u64) -> Option<Presence> {
        self.registry
            .get(entity_id)
            .map(|record| presence(record, now_ms))
    }

    fn sync_local(&mut self, now_ms: u64) {
        self.local.position = self.movement.position();
        self.local.direction = self.movement.direction();
        self.local.moving = self.movement.is_moving(now_ms);
        self.rooms.observe(&self.local.player_id, self.local.position);
        self.local.room = self
            .rooms
            .current_room(&self.local.player_id)
            .map(str::to_string);
        self.registry.upsert(self.local.clone());
    }

    fn refresh_nearby(&mut self) {
        let nearby: Vec<String> = proximity::within(
            self.local.position,
            &self.local.player_id,
            self.registry.iter(),
            PROXIMITY_RADIUS,
        )
        .into_iter()
        .map(|record| record.player_id.clone())
        .collect();
        self.nearby = nearby;
    }
}
