//! v1 cross-boundary contracts shared by the plaza engine, automation API, and persistence.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Integer cell coordinates on the level grid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell one step in `direction`.
    pub fn stepped(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Squared Euclidean distance in grid units. Exact, so callers can order
    /// candidates without comparing floats.
    pub fn distance_squared(self, other: Position) -> i64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Facing / step direction. `Up` decreases `y`, `Down` increases it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn delta(self) -> (i64, i64) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

/// Derived liveness of an entity; always recomputed from timestamps, never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Online,
    Away,
    Offline,
}

/// Out-of-band delivery endpoint for a bot. Held server-side only; the
/// `#[serde(skip)]` on `PlayerRecord::webhook` keeps the token off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRegistration {
    pub url: String,
    pub token: String,
}

/// The wire entity: one record per human or bot, published by its single writer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerRecord {
    pub player_id: String,
    pub name: String,
    pub position: Position,
    pub direction: Direction,
    pub moving: bool,
    /// Last room derived from `position` by the boundary tracker; never authored.
    pub room: Option<String>,
    pub last_seen_at_ms: u64,
    #[serde(default)]
    pub last_left_at_ms: Option<u64>,
    pub skin: String,
    pub is_bot: bool,
    #[serde(skip)]
    pub webhook: Option<WebhookRegistration>,
}

impl PlayerRecord {
    pub fn new(
        player_id: impl Into<String>,
        name: impl Into<String>,
        position: Position,
        direction: Direction,
        skin: impl Into<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            player_id: player_id.into(),
            name: name.into(),
            position,
            direction,
            moving: false,
            room: None,
            last_seen_at_ms: now_ms,
            last_left_at_ms: None,
            skin: skin.into(),
            is_bot: false,
            webhook: None,
        }
    }

    pub fn bot(
        player_id: impl Into<String>,
        name: impl Into<String>,
        position: Position,
        direction: Direction,
        skin: impl Into<String>,
        webhook: WebhookRegistration,
        now_ms: u64,
    ) -> Self {
        let mut record = Self::new(player_id, name, position, direction, skin, now_ms);
        record.is_bot = true;
        record.webhook = Some(webhook);
        record
    }

    /// Stamp liveness after an action; clears any pending leave marker.
    pub fn mark_seen(&mut self, now_ms: u64) {
        self.last_seen_at_ms = now_ms;
        self.last_left_at_ms = None;
    }
}

/// Full-replace view of the world: last write wins per id, no cross-writer order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldSnapshot {
    pub schema_version: String,
    pub published_at_ms: u64,
    pub players: BTreeMap<String, PlayerRecord>,
}

impl WorldSnapshot {
    pub fn new(published_at_ms: u64) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            published_at_ms,
            players: BTreeMap::new(),
        }
    }

    pub fn from_players(
        published_at_ms: u64,
        players: impl IntoIterator<Item = PlayerRecord>,
    ) -> Self {
        let mut snapshot = Self::new(published_at_ms);
        for player in players {
            snapshot.players.insert(player.player_id.clone(), player);
        }
        snapshot
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Global,
    Room,
    Dm,
    System,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Room => "room",
            Self::Dm => "dm",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub schema_version: String,
    pub kind: MessageKind,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    /// Room name for `Room`, recipient id for `Dm`, absent otherwise.
    pub target: Option<String>,
    pub sent_at_ms: u64,
}

impl ChatMessage {
    pub fn new(
        kind: MessageKind,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        text: impl Into<String>,
        target: Option<String>,
        sent_at_ms: u64,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            kind,
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            text: text.into(),
            target,
            sent_at_ms,
        }
    }
}

/// Why a single step was refused. Reported in-band inside move results, never
/// as an HTTP-level error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MoveRejection {
    Blocked,
    Cooldown,
}

impl MoveRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Cooldown => "cooldown",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    NotABot,
    ValidationError,
    NotFound,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}

// ---------------------------------------------------------------------------
// Automation API request/response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnterRequest {
    pub name: Option<String>,
    pub x: Option<i64>,
    pub y: Option<i64>,
    pub direction: Option<Direction>,
    pub skin: Option<String>,
    pub webhook: String,
    pub token: String,
}

/// Returned by `/enter` and `/update/{id}`: the current player record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerResponse {
    pub schema_version: String,
    pub player: PlayerRecord,
}

impl PlayerResponse {
    pub fn new(player: PlayerRecord) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            player,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateBotRequest {
    pub name: Option<String>,
    pub skin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteBotResponse {
    pub schema_version: String,
    pub player_id: String,
    pub success: bool,
}

/// One visible entity inside a `/see` response, with its derived presence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeenPlayer {
    pub player_id: String,
    pub name: String,
    pub position: Position,
    pub direction: Direction,
    pub moving: bool,
    pub room: Option<String>,
    pub skin: String,
    pub is_bot: bool,
    pub presence: Presence,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeeResponse {
    pub schema_version: String,
    pub player_id: String,
    pub position: Position,
    pub direction: Direction,
    pub room: Option<String>,
    /// Row-major collision grid: 0 = walkable, 1 = blocked.
    pub map: Vec<Vec<u8>>,
    pub players: Vec<SeenPlayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveRequest {
    pub moves: Vec<Direction>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveResponse {
    pub schema_version: String,
    pub player_id: String,
    pub success: bool,
    pub position: Position,
    pub completed_moves: Vec<Direction>,
    pub failed_move: Option<Direction>,
    pub failure: Option<MoveRejection>,
    pub remaining_moves: Vec<Direction>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendRequest {
    pub text: String,
    pub target_user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendResponse {
    pub schema_version: String,
    pub message: ChatMessage,
}

/// Body POSTed to a bot's registered webhook when a message reaches it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookDelivery {
    pub text: String,
    pub sender: String,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp_ms: u64,
}

impl WebhookDelivery {
    pub fn from_message(message: &ChatMessage) -> Self {
        Self {
            text: message.text.clone(),
            sender: message.sender_name.clone(),
            sender_id: message.sender_id.clone(),
            kind: message.kind,
            timestamp_ms: message.sent_at_ms,
        }
    }
}
