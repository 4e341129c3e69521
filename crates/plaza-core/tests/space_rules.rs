//! End-to-end rules of the space, exercised through the public crate API.

use contracts::{
    Direction, MessageKind, MoveRejection, PlayerRecord, Position, Presence, WorldSnapshot,
};
use plaza_core::{
    nearest_within, presence, route, run_sequence, CollisionMap, LevelData, MovementState,
    PlayerRegistry, Reconciler, RoomBoundaryTracker, StepOutcome, WorldView,
    AWAY_THRESHOLD_MS, BOT_STEP_DELAY_MS, MOVE_COOLDOWN_MS, MOVE_TRANSIT_MS,
    OFFLINE_THRESHOLD_MS, PROXIMITY_RADIUS, TILE_SIZE,
};

fn open_map() -> CollisionMap {
    CollisionMap::from_rows(&[
        vec![1, 1, 1, 1, 1, 1],
        vec![1, 0, 0, 0, 0, 1],
        vec![1, 0, 0, 0, 0, 1],
        vec![1, 0, 0, 0, 0, 1],
        vec![1, 1, 1, 1, 1, 1],
    ])
}

fn record(id: &str, x: i64, y: i64, now_ms: u64) -> PlayerRecord {
    PlayerRecord::new(
        id.to_string(),
        format!("name-{id}"),
        Position::new(x, y),
        Direction::Down,
        "default".to_string(),
        now_ms,
    )
}

#[test]
fn steps_rate_limit_at_the_cooldown() {
    let map = open_map();
    let mut walker = MovementState::new(Position::new(1, 1), Direction::Down);

    assert_eq!(walker.try_step(Direction::Right, &map, 0), StepOutcome::Committed);
    assert_eq!(
        walker.try_step(Direction::Right, &map, MOVE_COOLDOWN_MS - 1),
        StepOutcome::Cooldown
    );
    assert_eq!(
        walker.try_step(Direction::Right, &map, MOVE_COOLDOWN_MS),
        StepOutcome::Committed
    );
    assert_eq!(walker.position(), Position::new(3, 1));
}

#[test]
fn blocked_steps_turn_the_walker_in_place() {
    let map = open_map();
    let mut walker = MovementState::new(Position::new(1, 1), Direction::Down);

    assert_eq!(walker.try_step(Direction::Left, &map, 0), StepOutcome::Blocked);
    assert_eq!(walker.position(), Position::new(1, 1));
    assert_eq!(walker.direction(), Direction::Left);
}

#[test]
fn snapshot_application_is_idempotent() {
    let mut reconciler = Reconciler::new("me");
    let mut registry = PlayerRegistry::new();
    let snapshot = WorldSnapshot::from_players(
        1_000,
        vec![record("a", 1, 1, 1_000), record("b", 2, 2, 1_000)],
    );

    let first = reconciler.apply(&snapshot, &mut registry, 1_000);
    let roster_after_first: Vec<String> = registry.ids().map(str::to_string).collect();
    let second = reconciler.apply(&snapshot, &mut registry, 1_000);
    let roster_after_second: Vec<String> = registry.ids().map(str::to_string).collect();

    assert_eq!(first.len(), 2);
    assert!(second.is_empty());
    assert_eq!(roster_after_first, roster_after_second);
}

#[test]
fn presence_classification_is_pure_and_threshold_exact() {
    let seen_at = 1_000_000;
    let record = record("p", 1, 1, seen_at);

    // Ten minutes idle reads as away, seven hours as offline.
    assert_eq!(presence(&record, seen_at + 10 * 60 * 1000), Presence::Away);
    assert_eq!(presence(&record, seen_at + 7 * 60 * 60 * 1000), Presence::Offline);

    // Exact thresholds flip the classification.
    assert_eq!(presence(&record, seen_at + AWAY_THRESHOLD_MS - 1), Presence::Online);
    assert_eq!(presence(&record, seen_at + AWAY_THRESHOLD_MS), Presence::Away);
    assert_eq!(presence(&record, seen_at + OFFLINE_THRESHOLD_MS), Presence::Offline);

    // Same inputs, same answer, every time.
    for _ in 0..3 {
        assert_eq!(presence(&record, seen_at + AWAY_THRESHOLD_MS), Presence::Away);
    }
}

#[test]
fn explicit_departure_outranks_recent_activity() {
    let mut departed = record("p", 1, 1, 1_000);
    departed.last_left_at_ms = Some(1_000);
    assert_eq!(presence(&departed, 1_001), Presence::Offline);
}

#[test]
fn room_membership_outranks_a_diagonal_neighbour() {
    let mut tracker = RoomBoundaryTracker::new(vec![plaza_core::Room {
        name: "Lounge".to_string(),
        x: 2 * TILE_SIZE,
        y: 2 * TILE_SIZE,
        w: 4 * TILE_SIZE,
        h: 4 * TILE_SIZE,
    }]);
    let mut registry = PlayerRegistry::new();
    let sender = record_at_origin("me", 3, 3);
    tracker.observe("me", sender.position);
    // Diagonal neighbour at distance sqrt(2), well inside the radius.
    registry.upsert(record_at_origin("buddy", 4, 4));
    tracker.observe("buddy", Position::new(4, 4));

    let routed = route(&sender, "hello", None, &registry, &tracker, 0).expect("routes");
    assert_eq!(routed.message.kind, MessageKind::Room);
    assert_eq!(routed.message.target.as_deref(), Some("Lounge"));
}

#[test]
fn out_of_radius_neighbours_fall_back_to_global() {
    let mut tracker = RoomBoundaryTracker::new(Vec::new());
    let mut registry = PlayerRegistry::new();
    let sender = record_at_origin("me", 10, 10);
    tracker.observe("me", sender.position);
    // Two cells away: distance 2.0 exceeds the 1.5 radius.
    registry.upsert(record_at_origin("far", 12, 10));

    assert!(nearest_within(
        Position::new(10, 10),
        "me",
        registry.iter(),
        PROXIMITY_RADIUS
    )
    .is_none());

    let routed = route(&sender, "anyone?", None, &registry, &tracker, 0).expect("routes");
    assert_eq!(routed.message.kind, MessageKind::Global);
    assert!(routed.message.target.is_none());
}

#[test]
fn sequences_abort_on_first_failure_and_report_the_split() {
    // Wall directly right of (2, 1).
    let map = CollisionMap::from_rows(&[
        vec![1, 1, 1, 1, 1],
        vec![1, 0, 0, 1, 1],
        vec![1, 0, 0, 0, 1],
        vec![1, 1, 1, 1, 1],
    ]);
    let mut walker = MovementState::new(Position::new(1, 1), Direction::Down);
    let moves = [Direction::Right, Direction::Right, Direction::Up];

    let report = run_sequence(&mut walker, &map, &moves, 0, BOT_STEP_DELAY_MS);
    assert!(!report.success);
    assert_eq!(report.completed, vec![Direction::Right]);
    assert_eq!(report.failed, Some(Direction::Right));
    assert_eq!(report.failure, Some(MoveRejection::Blocked));
    assert_eq!(report.remaining, vec![Direction::Up]);
    assert_eq!(report.position, Position::new(2, 1));
}

#[test]
fn moving_flag_clears_once_transit_ends() {
    let level = LevelData::default_level();
    let local = PlayerRecord::new(
        "me".to_string(),
        "Mia".to_string(),
        level.spawn,
        Direction::Down,
        "default".to_string(),
        0,
    );
    let mut view = WorldView::new(&level, local).expect("spawn is walkable");

    assert_eq!(view.step(Direction::Right, 1_000), StepOutcome::Committed);
    assert!(view.publishable(1_000).moving);
    assert!(view.publishable(1_000 + MOVE_TRANSIT_MS - 1).moving);
    assert!(!view.publishable(1_000 + MOVE_TRANSIT_MS).moving);

    // An aborted sequence also ends settled, never stuck "moving".
    // Three lefts from (3, 2) reach the border wall on the last attempt.
    let report = view.run_moves(&[Direction::Left; 3], 10_000);
    assert!(!report.success);
    let end_ms = 10_000 + 3 * BOT_STEP_DELAY_MS + MOVE_TRANSIT_MS;
    assert!(!view.publishable(end_ms).moving);
}

fn record_at_origin(id: &str, x: i64, y: i64) -> PlayerRecord {
    record(id, x, y, 0)
}
