//! Deterministic core of the plaza: collision, movement, presence, entity
//! reconciliation, room boundaries, proximity, and message routing.
//!
//! Everything in this crate is synchronous and clock-free; operations that
//! depend on time take an explicit `now_ms`. The interactive client path and
//! the headless bot API both link this crate, which is what guarantees the
//! two surfaces agree on step legality and routing.

pub mod collision;
pub mod level;
pub mod movement;
pub mod presence;
pub mod proximity;
pub mod reconcile;
pub mod registry;
pub mod rooms;
pub mod routing;
pub mod sequencer;
pub mod view;

pub use collision::CollisionMap;
pub use level::{LevelData, LevelError, Room};
pub use movement::{MovementState, StepOutcome};
pub use presence::presence;
pub use proximity::nearest_within;
pub use reconcile::{Reconciler, RegistryChange};
pub use registry::PlayerRegistry;
pub use rooms::{RoomBoundaryTracker, RoomTransition};
pub use routing::{route, ChannelKey, ChannelLog, RouteError, RoutedMessage, WebhookTarget};
pub use sequencer::{run_sequence, SequenceReport};
pub use view::WorldView;

/// Minimum wall-clock gap between two committed steps of one entity.
pub const MOVE_COOLDOWN_MS: u64 = 300;

/// How long a committed step keeps the walker in the `moving` state. Always
/// strictly below [`MOVE_COOLDOWN_MS`].
pub const MOVE_TRANSIT_MS: u64 = 240;

/// Fixed pause the bot sequencer waits before each step. Longer than the
/// cooldown, so a well-formed sequence never rejects itself.
pub const BOT_STEP_DELAY_MS: u64 = 400;

/// Idle time after which an entity reads as away.
pub const AWAY_THRESHOLD_MS: u64 = 5 * 60 * 1000;

/// Idle time after which an entity reads as offline.
pub const OFFLINE_THRESHOLD_MS: u64 = 6 * 60 * 60 * 1000;

/// Nearest-neighbour radius in grid units: covers orthogonal and diagonal
/// adjacency, excludes the next ring out.
pub const PROXIMITY_RADIUS: f64 = 1.5;

/// Edge length of one grid cell in pixels; room rectangles are pixel-space.
pub const TILE_SIZE: i64 = 32;
