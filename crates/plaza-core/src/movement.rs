//! Per-entity walker state and the single legality gate for grid steps.

use contracts::{Direction, MoveRejection, Position};

use crate::collision::CollisionMap;
use crate::{MOVE_COOLDOWN_MS, MOVE_TRANSIT_MS};

/// Result of one attempted step. Exactly one of these happens per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The walker advanced one cell and now faces the step direction.
    Committed,
    /// The target cell is blocked or out of bounds; the walker stayed put
    /// but turned to face the attempted direction.
    Blocked,
    /// The attempt arrived inside the cooldown window; nothing changed.
    Cooldown,
}

impl StepOutcome {
    pub fn rejection(self) -> Option<MoveRejection> {
        match self {
            Self::Committed => None,
            Self::Blocked => Some(MoveRejection::Blocked),
            Self::Cooldown => Some(MoveRejection::Cooldown),
        }
    }
}

/// Mutable movement state of one entity. All timing comes in through
/// `now_ms`, so the same state drives live traffic and deterministic tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementState {
    position: Position,
    direction: Direction,
    last_move_at_ms: Option<u64>,
}

impl MovementState {
    pub fn new(position: Position, direction: Direction) -> Self {
        Self {
            position,
            direction,
            last_move_at_ms: None,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Attempts one step. The cooldown is checked before collision, so a
    /// too-early attempt never turns the walker. A blocked attempt turns the
    /// walker toward the obstacle without starting a new cooldown window.
    pub fn try_step(
        &mut self,
        direction: Direction,
        map: &CollisionMap,
        now_ms: u64,
    ) -> StepOutcome {
        if self.cooldown_remaining_ms(now_ms) > 0 {
            return StepOutcome::Cooldown;
        }

        let target = self.position.stepped(direction);
        if map.is_blocked(target.x, target.y) {
            self.direction = direction;
            return StepOutcome::Blocked;
        }

        self.position = target;
        self.direction = direction;
        self.last_move_at_ms = Some(now_ms);
        StepOutcome::Committed
    }

    /// Milliseconds until the next step is allowed; zero when ready.
    pub fn cooldown_remaining_ms(&self, now_ms: u64) -> u64 {
        match self.last_move_at_ms {
            Some(last) => (last + MOVE_COOLDOWN_MS).saturating_sub(now_ms),
            None => 0,
        }
    }

    /// Whether the walker is still animating its latest committed step.
    pub fn is_moving(&self, now_ms: u64) -> bool {
        match self.last_move_at_ms {
            Some(last) => now_ms.saturating_sub(last) < MOVE_TRANSIT_MS,
            None => false,
        }
    }

    /// Drops the walker at `position` facing `direction` without touching
    /// the cooldown clock. Used when adopting a reconciled remote record.
    pub fn teleport(&mut self, position: Position, direction: Direction) {
        self.position = position;
        self.direction = direction;
    }
}
