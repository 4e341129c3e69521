//! Executes a queued list of steps against one walker, aborting on the
//! first rejection.

use contracts::{Direction, MoveRejection, Position};

use crate::collision::CollisionMap;
use crate::movement::{MovementState, StepOutcome};

/// Outcome of one sequence run. `completed` holds the committed prefix;
/// a rejection fills `failed`/`failure` and pushes the untried suffix into
/// `remaining`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    pub success: bool,
    pub completed: Vec<Direction>,
    pub failed: Option<Direction>,
    pub failure: Option<MoveRejection>,
    pub remaining: Vec<Direction>,
    pub position: Position,
}

/// Runs `moves` in order, spacing the steps `step_interval_ms` apart
/// starting from `start_ms`. Step `i` executes at
/// `start_ms + (i + 1) * step_interval_ms`, matching a runner that waits
/// the interval before every step.
///
/// The first rejection aborts the whole run; the walker keeps whatever
/// progress was already committed. With an interval at or above the move
/// cooldown, a sequence can only fail on collision.
pub fn run_sequence(
    state: &mut MovementState,
    map: &CollisionMap,
    moves: &[Direction],
    start_ms: u64,
    step_interval_ms: u64,
) -> SequenceReport {
    let mut completed = Vec::new();

    for (index, direction) in moves.iter().copied().enumerate() {
        let now_ms = start_ms + (index as u64 + 1) * step_interval_ms;
        match state.try_step(direction, map, now_ms) {
            StepOutcome::Committed => completed.push(direction),
            outcome => {
                return SequenceReport {
                    success: false,
                    completed,
                    failed: Some(direction),
                    failure: outcome.rejection(),
                    remaining: moves[index + 1..].to_vec(),
                    position: state.position(),
                };
            }
        }
    }

    SequenceReport {
        success: true,
        completed,
        failed: None,
        failure: None,
        remaining: Vec::new(),
        position: state.position(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{BOT_STEP_DELAY_MS, MOVE_COOLDOWN_MS};

    fn corridor() -> CollisionMap {
        // Open 3-wide corridor with a wall segment jutting into row 2.
        CollisionMap::from_rows(&[
            vec![1, 1, 1, 1, 1, 1],
            vec![1, 0, 0, 0, 0, 1],
            vec![1, 0, 0, 1, 0, 1],
            vec![1, 0, 0, 0, 0, 1],
            vec![1, 1, 1, 1, 1, 1],
        ])
    }

    #[test]
    fn clean_sequence_commits_every_step() {
        let map = corridor();
        let mut state = MovementState::new(Position::new(1, 1), Direction::Down);
        let moves = [Direction::Right, Direction::Right, Direction::Right];

        let report = run_sequence(&mut state, &map, &moves, 0, BOT_STEP_DELAY_MS);
        assert!(report.success);
        assert_eq!(report.completed, moves.to_vec());
        assert!(report.failed.is_none());
        assert!(report.remaining.is_empty());
        assert_eq!(report.position, Position::new(4, 1));
    }

    #[test]
    fn first_rejection_aborts_and_splits_the_sequence() {
        let map = corridor();
        let mut state = MovementState::new(Position::new(1, 2), Direction::Down);
        // Second "right" runs into the wall at (3, 2).
        let moves = [Direction::Right, Direction::Right, Direction::Up];

        let report = run_sequence(&mut state, &map, &moves, 0, BOT_STEP_DELAY_MS);
        assert!(!report.success);
        assert_eq!(report.completed, vec![Direction::Right]);
        assert_eq!(report.failed, Some(Direction::Right));
        assert_eq!(report.failure, Some(MoveRejection::Blocked));
        assert_eq!(report.remaining, vec![Direction::Up]);
        assert_eq!(report.position, Position::new(2, 2));
        // Blocked step still turned the walker.
        assert_eq!(state.direction(), Direction::Right);
    }

    #[test]
    fn too_tight_an_interval_trips_the_cooldown() {
        let map = corridor();
        let mut state = MovementState::new(Position::new(1, 1), Direction::Down);
        let moves = [Direction::Right, Direction::Right];

        let report = run_sequence(&mut state, &map, &moves, 0, MOVE_COOLDOWN_MS / 2);
        assert!(!report.success);
        assert_eq!(report.completed, vec![Direction::Right]);
        assert_eq!(report.failure, Some(MoveRejection::Cooldown));
        assert_eq!(report.position, Position::new(2, 1));
    }

    #[test]
    fn empty_sequence_succeeds_without_moving() {
        let map = corridor();
        let mut state = MovementState::new(Position::new(1, 1), Direction::Down);

        let report = run_sequence(&mut state, &map, &[], 5_000, BOT_STEP_DELAY_MS);
        assert!(report.success);
        assert!(report.completed.is_empty());
        assert_eq!(report.position, Position::new(1, 1));
    }

    #[test]
    fn default_step_delay_clears_the_cooldown() {
        assert!(BOT_STEP_DELAY_MS >= MOVE_COOLDOWN_MS);

        let map = corridor();
        let mut state = MovementState::new(Position::new(1, 3), Direction::Down);
        let moves = [Direction::Right; 3];

        let report = run_sequence(&mut state, &map, &moves, 123, BOT_STEP_DELAY_MS);
        assert!(report.success, "paced sequence must never self-reject");
    }

    #[test]
    fn sequence_resumes_against_an_earlier_cooldown() {
        let map = corridor();
        let mut state = MovementState::new(Position::new(1, 1), Direction::Down);
        // A manual step right before the sequence starts.
        state.try_step(Direction::Right, &map, 1_000);

        // First sequence step lands at 1_000 + 400, outside the cooldown.
        let report = run_sequence(&mut state, &map, &[Direction::Down], 1_000, BOT_STEP_DELAY_MS);
        assert!(report.success);
        assert_eq!(report.position, Position::new(2, 2));
    }
}
