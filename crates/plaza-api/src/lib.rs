//! Authoritative plaza facade: validates bot actions against the collision
//! grid, owns the live roster, routes chat, and persists bots plus channel
//! history to SQLite.

mod bus;
mod persistence;
mod server;
mod webhook;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use contracts::{
    ChatMessage, Direction, EnterRequest, MessageKind, PlayerRecord, Position, Presence,
    SeeResponse, SeenPlayer, UpdateBotRequest, WebhookRegistration, WorldSnapshot,
};
use plaza_core::{
    presence, route, ChannelKey, ChannelLog, CollisionMap, LevelData, MovementState,
    PlayerRegistry, RoomBoundaryTracker, RouteError, RoutedMessage, StepOutcome,
};
use tracing::{debug, warn};

pub use bus::{BusEvent, BusSubscription, SpaceBus};
pub use persistence::{PersistenceError, SqliteSpaceStore};
pub use server::{serve, ServerError};
pub use webhook::WebhookNotifier;

/// Upper bound on one `/move` request. Long runs should be split by the
/// caller; a runaway sequence would otherwise hold a walker busy for minutes.
pub const MAX_MOVES_PER_REQUEST: usize = 64;

const DEFAULT_SKIN: &str = "default";

#[derive(Debug)]
pub enum SpaceError {
    Validation {
        message: String,
        details: Option<String>,
    },
    NotFound(String),
    NotABot(String),
}

impl SpaceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: Some(details.into()),
        }
    }
}

impl fmt::Display for SpaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { message, .. } => write!(f, "{message}"),
            Self::NotFound(id) => write!(f, "no entity with id '{id}'"),
            Self::NotABot(id) => write!(f, "'{id}' is not a registered bot"),
        }
    }
}

impl std::error::Error for SpaceError {}

/// Single-writer owner of the space. Every mutation flows through here;
/// movement, rooms, and chat routing run as plain synchronous code under
/// the caller's lock.
#[derive(Debug)]
pub struct SpaceApi {
    level: LevelData,
    map: CollisionMap,
    registry: PlayerRegistry,
    rooms: RoomBoundaryTracker,
    movement: BTreeMap<String, MovementState>,
    log: ChannelLog,
    bot_seq: u64,
    persistence: Option<SqliteSpaceStore>,
    last_persistence_error: Option<String>,
}

impl SpaceApi {
    pub fn new(level: LevelData) -> Self {
        let map = CollisionMap::from_level(&level);
        let rooms = RoomBoundaryTracker::new(level.rooms.clone());
        Self {
            level,
            map,
            registry: PlayerRegistry::new(),
            rooms,
            movement: BTreeMap::new(),
            log: ChannelLog::new(),
            bot_seq: 0,
            persistence: None,
            last_persistence_error: None,
        }
    }

    pub fn attach_sqlite_store(&mut self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let store = SqliteSpaceStore::open(path)?;
        self.persistence = Some(store);
        self.last_persistence_error = None;
        Ok(())
    }

    /// Reloads persisted bots into the roster. Their stored `last_seen_at_ms`
    /// is kept, so a bot that has been gone for hours correctly reads as
    /// offline until it acts again.
    pub fn restore_bots(&mut self) -> Result<usize, PersistenceError> {
        let Some(store) = self.persistence.as_ref() else {
            return Err(PersistenceError::NotAttached);
        };

        let bots = store.load_bots()?;
        let restored = bots.len();
        for mut record in bots {
            self.observe_room(&record.player_id, record.position);
            record.room = self.rooms.current_room(&record.player_id).map(str::to_string);
            record.moving = false;
            self.movement.insert(
                record.player_id.clone(),
                MovementState::new(record.position, record.direction),
            );
            self.registry.upsert(record);
        }

        Ok(restored)
    }

    /// Registers a new bot. Omitted spawn fields fall back per component to
    /// the level spawn; an explicitly requested blocked cell is refused
    /// rather than silently relocated.
    pub fn enter_bot(
        &mut self,
        request: EnterRequest,
        now_ms: u64,
    ) -> Result<(PlayerRecord, ChatMessage), SpaceError> {
        let webhook_url = request.webhook.trim();
        if webhook_url.is_empty() {
            return Err(SpaceError::validation("webhook url is required"));
        }
        if !webhook_url.starts_with("http://") && !webhook_url.starts_with("https://") {
            return Err(SpaceError::validation_with(
                "webhook url must be http or https",
                webhook_url,
            ));
        }
        let token = request.token.trim();
        if token.is_empty() {
            return Err(SpaceError::validation("webhook token is required"));
        }

        let position = Position::new(
            request.x.unwrap_or(self.level.spawn.x),
            request.y.unwrap_or(self.level.spawn.y),
        );
        if self.map.is_blocked(position.x, position.y) {
            return Err(SpaceError::validation_with(
                "spawn position is blocked or outside the level",
                position.to_string(),
            ));
        }

        self.bot_seq += 1;
        let player_id = format!("bot_{}_{:04}", now_ms, self.bot_seq);
        let name = match request.name {
            Some(name) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(SpaceError::validation("name must not be empty"));
                }
                name
            }
            None => format!("bot-{:04}", self.bot_seq),
        };
        let skin = request
            .skin
            .filter(|skin| !skin.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SKIN.to_string());
        let direction = request.direction.unwrap_or(Direction::Down);

        let mut record = PlayerRecord::bot(
            player_id.clone(),
            name.clone(),
            position,
            direction,
            skin,
            WebhookRegistration {
                url: webhook_url.to_string(),
                token: token.to_string(),
            },
            now_ms,
        );
        self.observe_room(&player_id, position);
        record.room = self.rooms.current_room(&player_id).map(str::to_string);

        self.movement
            .insert(player_id.clone(), MovementState::new(position, direction));
        self.registry.upsert(record.clone());
        self.persist_bot(&record);

        let joined = ChatMessage::new(
            MessageKind::System,
            player_id,
            name.clone(),
            format!("{name} joined the plaza"),
            None,
            now_ms,
        );
        self.log.append(ChannelKey::Global, joined.clone());
        self.persist_message(&ChannelKey::Global, &joined);

        Ok((record, joined))
    }

    /// Profile-only update: name and skin. Position and direction belong to
    /// the movement path.
    pub fn update_bot(
        &mut self,
        player_id: &str,
        request: UpdateBotRequest,
        now_ms: u64,
    ) -> Result<PlayerRecord, SpaceError> {
        let record = self
            .registry
            .get_mut(player_id)
            .ok_or_else(|| SpaceError::NotFound(player_id.to_string()))?;
        if !record.is_bot {
            return Err(SpaceError::NotABot(player_id.to_string()));
        }

        if matches!(&request.name, Some(name) if name.trim().is_empty()) {
            return Err(SpaceError::validation("name must not be empty"));
        }
        if matches!(&request.skin, Some(skin) if skin.trim().is_empty()) {
            return Err(SpaceError::validation("skin must not be empty"));
        }
        if let Some(name) = request.name {
            record.name = name.trim().to_string();
        }
        if let Some(skin) = request.skin {
            record.skin = skin.trim().to_string();
        }
        record.mark_seen(now_ms);

        let updated = record.clone();
        self.persist_bot(&updated);
        Ok(updated)
    }

    /// Removes a bot and everything private to it: movement state, room
    /// tracking, and every direct channel it took part in, both in memory
    /// and on disk.
    pub fn delete_bot(
        &mut self,
        player_id: &str,
        now_ms: u64,
    ) -> Result<ChatMessage, SpaceError> {
        let record = self
            .registry
            .get(player_id)
            .ok_or_else(|| SpaceError::NotFound(player_id.to_string()))?;
        if !record.is_bot {
            return Err(SpaceError::NotABot(player_id.to_string()));
        }
        let name = record.name.clone();

        self.registry.remove(player_id);
        self.movement.remove(player_id);
        self.rooms.forget(player_id);
        self.log.purge_dms_with(player_id);
        self.forget_persisted_bot(player_id);

        let left = ChatMessage::new(
            MessageKind::System,
            player_id.to_string(),
            name.clone(),
            format!("{name} left the plaza"),
            None,
            now_ms,
        );
        self.log.append(ChannelKey::Global, left.clone());
        self.persist_message(&ChannelKey::Global, &left);

        Ok(left)
    }

    /// What the bot perceives: its own pose, the collision grid, and every
    /// other entity that is not offline, each with derived presence.
    pub fn see(&mut self, player_id: &str, now_ms: u64) -> Result<SeeResponse, SpaceError> {
        let record = self
            .registry
            .get_mut(player_id)
            .ok_or_else(|| SpaceError::NotFound(player_id.to_string()))?;
        if !record.is_bot {
            return Err(SpaceError::NotABot(player_id.to_string()));
        }
        record.mark_seen(now_ms);
        let position = record.position;
        let direction = record.direction;
        let room = record.room.clone();

        let players: Vec<SeenPlayer> = self
            .registry
            .iter()
            .filter(|other| other.player_id != player_id)
            .filter_map(|other| {
                let liveness = presence(other, now_ms);
                if liveness == Presence::Offline {
                    return None;
                }
                Some(SeenPlayer {
                    player_id: other.player_id.clone(),
                    name: other.name.clone(),
                    position: other.position,
                    direction: other.direction,
                    moving: other.moving,
                    room: other.room.clone(),
                    skin: other.skin.clone(),
                    is_bot: other.is_bot,
                    presence: liveness,
                })
            })
            .collect();

        Ok(SeeResponse {
            schema_version: contracts::SCHEMA_VERSION_V1.to_string(),
            player_id: player_id.to_string(),
            position,
            direction,
            room,
            map: self.map.to_rows(),
            players,
        })
    }

    /// Validates a `/move` request and flips the walker into its moving
    /// state. The caller then drives [`Self::step_bot`] on its own clock.
    pub fn begin_move(
        &mut self,
        player_id: &str,
        moves: &[Direction],
        now_ms: u64,
    ) -> Result<PlayerRecord, SpaceError> {
        let record = self
            .registry
            .get_mut(player_id)
            .ok_or_else(|| SpaceError::NotFound(player_id.to_string()))?;
        if !record.is_bot {
            return Err(SpaceError::NotABot(player_id.to_string()));
        }
        if moves.is_empty() {
            return Err(SpaceError::validation("no moves provided"));
        }
        if moves.len() > MAX_MOVES_PER_REQUEST {
            return Err(SpaceError::validation_with(
                "too many moves in one request",
                format!("limit is {MAX_MOVES_PER_REQUEST}, got {}", moves.len()),
            ));
        }
        record.moving = true;
        record.mark_seen(now_ms);
        Ok(record.clone())
    }

    /// One step of an in-flight sequence. A committed step moves the record
    /// and re-derives its room; a blocked step only turns it in place.
    pub fn step_bot(
        &mut self,
        player_id: &str,
        direction: Direction,
        now_ms: u64,
    ) -> Result<(StepOutcome, PlayerRecord), SpaceError> {
        let (outcome, position, facing) = {
            let state = self
                .movement
                .get_mut(player_id)
                .ok_or_else(|| SpaceError::NotFound(player_id.to_string()))?;
            let outcome = state.try_step(direction, &self.map, now_ms);
            (outcome, state.position(), state.direction())
        };

        if outcome == StepOutcome::Committed {
            self.observe_room(player_id, position);
        }
        let room = self.rooms.current_room(player_id).map(str::to_string);

        let record = self
            .registry
            .get_mut(player_id)
            .ok_or_else(|| SpaceError::NotFound(player_id.to_string()))?;
        match outcome {
            StepOutcome::Committed => {
                record.position = position;
                record.direction = facing;
                record.room = room;
                record.mark_seen(now_ms);
            }
            StepOutcome::Blocked => {
                record.direction = facing;
                record.mark_seen(now_ms);
            }
            StepOutcome::Cooldown => {}
        }

        Ok((outcome, record.clone()))
    }

    /// Clears the moving flag once a sequence finishes or aborts. Returns
    /// `None` when the walker was deleted mid-run.
    pub fn end_move(&mut self, player_id: &str) -> Option<PlayerRecord> {
        let record = self.registry.get_mut(player_id)?;
        record.moving = false;
        let finished = record.clone();
        if finished.is_bot {
            self.persist_bot(&finished);
        }
        Some(finished)
    }

    /// Routes one message from any entity. Explicit targets win, then the
    /// sender's room, then the nearest neighbour, then global.
    pub fn route_message(
        &mut self,
        sender_id: &str,
        text: &str,
        target: Option<&str>,
        now_ms: u64,
    ) -> Result<RoutedMessage, SpaceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SpaceError::validation("message text is empty"));
        }

        let routed = {
            let sender = self
                .registry
                .get(sender_id)
                .ok_or_else(|| SpaceError::NotFound(sender_id.to_string()))?;
            route(sender, text, target, &self.registry, &self.rooms, now_ms).map_err(
                |err| match err {
                    RouteError::UnknownRecipient(id) => SpaceError::NotFound(id),
                },
            )?
        };

        let refreshed = self.registry.get_mut(sender_id).map(|sender| {
            sender.mark_seen(now_ms);
            sender.clone()
        });
        if let Some(sender) = refreshed {
            if sender.is_bot {
                self.persist_bot(&sender);
            }
        }
        self.log.record(&routed);
        self.persist_message(&routed.channel, &routed.message);

        Ok(routed)
    }

    /// `/send` entry point: same routing, restricted to registered bots.
    pub fn send_bot_message(
        &mut self,
        sender_id: &str,
        text: &str,
        target: Option<&str>,
        now_ms: u64,
    ) -> Result<RoutedMessage, SpaceError> {
        let record = self
            .registry
            .get(sender_id)
            .ok_or_else(|| SpaceError::NotFound(sender_id.to_string()))?;
        if !record.is_bot {
            return Err(SpaceError::NotABot(sender_id.to_string()));
        }
        self.route_message(sender_id, text, target, now_ms)
    }

    /// Accepts a record published over the stream. The server re-derives the
    /// room and liveness stamps; everything else is the writer's to author.
    pub fn publish_record(&mut self, mut record: PlayerRecord, now_ms: u64) -> PlayerRecord {
        if record.webhook.is_none() {
            if let Some(existing) = self.registry.get(&record.player_id) {
                record.webhook = existing.webhook.clone();
            }
        }

        self.observe_room(&record.player_id, record.position);
        record.room = self.rooms.current_room(&record.player_id).map(str::to_string);
        record.mark_seen(now_ms);

        self.movement
            .entry(record.player_id.clone())
            .and_modify(|state| state.teleport(record.position, record.direction))
            .or_insert_with(|| MovementState::new(record.position, record.direction));
        self.registry.upsert(record.clone());
        record
    }

    /// Stamps an explicit departure when a stream closes. The record stays
    /// in the roster so peers render the entity offline instead of vanished.
    pub fn mark_departed(&mut self, player_id: &str, now_ms: u64) -> Option<PlayerRecord> {
        self.registry.mark_left(player_id, now_ms);
        let record = self.registry.get_mut(player_id)?;
        record.moving = false;
        Some(record.clone())
    }

    /// Chat recorded from the stream side, already routed by the sender.
    pub fn record_incoming(&mut self, message: &ChatMessage) {
        let channel = ChannelKey::for_message(message);
        self.log.append(channel.clone(), message.clone());
        self.persist_message(&channel, message);
    }

    pub fn snapshot(&self, now_ms: u64) -> WorldSnapshot {
        self.registry.snapshot(now_ms)
    }

    pub fn get(&self, player_id: &str) -> Option<&PlayerRecord> {
        self.registry.get(player_id)
    }

    pub fn channel_history(&self, channel: &ChannelKey, limit: usize) -> Vec<ChatMessage> {
        self.log
            .recent(channel, limit)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn level(&self) -> &LevelData {
        &self.level
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    fn observe_room(&mut self, player_id: &str, position: Position) {
        if let Some(transition) = self.rooms.observe(player_id, position) {
            debug!(
                player_id,
                exited = transition.exited.as_deref(),
                entered = transition.entered.as_deref(),
                "room boundary crossed"
            );
        }
    }

    fn persist_bot(&mut self, record: &PlayerRecord) {
        let Some(store) = self.persistence.as_mut() else {
            return;
        };
        match store.upsert_bot(record) {
            Ok(()) => self.last_persistence_error = None,
            Err(err) => {
                warn!(
                    player_id = record.player_id.as_str(),
                    error = %err,
                    "failed to persist bot"
                );
                self.last_persistence_error = Some(err.to_string());
            }
        }
    }

    fn forget_persisted_bot(&mut self, player_id: &str) {
        let Some(store) = self.persistence.as_mut() else {
            return;
        };
        let purged = store
            .purge_dm_channels(player_id)
            .and_then(|_| store.delete_bot(player_id));
        match purged {
            Ok(_) => self.last_persistence_error = None,
            Err(err) => {
                warn!(
                    player_id,
                    error = %err,
                    "failed to remove persisted bot"
                );
                self.last_persistence_error = Some(err.to_string());
            }
        }
    }

    fn persist_message(&mut self, channel: &ChannelKey, message: &ChatMessage) {
        let Some(store) = self.persistence.as_mut() else {
            return;
        };
        match store.append_message(&channel.to_string(), message) {
            Ok(()) => self.last_persistence_error = None,
            Err(err) => {
                warn!(
                    channel = %channel,
                    error = %err,
                    "failed to persist message"
                );
                self.last_persistence_error = Some(err.to_string());
            }
        }
    }
}
