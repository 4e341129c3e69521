//! Nearest-neighbour queries over the roster, in grid units.

use contracts::{PlayerRecord, Position};

/// All candidates within `radius` of `origin`, nearest first. Distances are
/// compared as integer squared magnitudes against `radius * radius`, so no
/// float accumulates across cells; ties break on ascending id.
///
/// Callers pass the live roster; the query itself is presence-agnostic.
pub fn within<'a>(
    origin: Position,
    origin_id: &str,
    candidates: impl IntoIterator<Item = &'a PlayerRecord>,
    radius: f64,
) -> Vec<&'a PlayerRecord> {
    let limit = radius * radius;
    let mut hits: Vec<(&'a PlayerRecord, i64)> = candidates
        .into_iter()
        .filter(|candidate| candidate.player_id != origin_id)
        .filter_map(|candidate| {
            let d2 = origin.distance_squared(candidate.position);
            (d2 as f64 <= limit).then_some((candidate, d2))
        })
        .collect();

    hits.sort_by(|(a, d2a), (b, d2b)| d2a.cmp(d2b).then_with(|| a.player_id.cmp(&b.player_id)));
    hits.into_iter().map(|(candidate, _)| candidate).collect()
}

/// The single nearest candidate within `radius`, if any.
pub fn nearest_within<'a>(
    origin: Position,
    origin_id: &str,
    candidates: impl IntoIterator<Item = &'a PlayerRecord>,
    radius: f64,
) -> Option<&'a PlayerRecord> {
    within(origin, origin_id, candidates, radius).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Direction;

    use crate::PROXIMITY_RADIUS;

    fn record_at(id: &str, x: i64, y: i64) -> PlayerRecord {
        PlayerRecord::new(
            id.to_string(),
            format!("name-{id}"),
            Position::new(x, y),
            Direction::Down,
            "default".to_string(),
            0,
        )
    }

    #[test]
    fn radius_covers_diagonals_but_not_the_next_ring() {
        let origin = Position::new(5, 5);
        let candidates = vec![
            record_at("diag", 6, 6),      // d^2 = 2
            record_at("orth", 5, 4),      // d^2 = 1
            record_at("too_far", 7, 5),   // d^2 = 4
            record_at("knight", 7, 6),    // d^2 = 5
        ];

        let hits = within(origin, "me", candidates.iter(), PROXIMITY_RADIUS);
        let ids: Vec<&str> = hits.iter().map(|r| r.player_id.as_str()).collect();
        assert_eq!(ids, vec!["orth", "diag"]);
    }

    #[test]
    fn nearest_prefers_smaller_distance() {
        let origin = Position::new(5, 5);
        let candidates = vec![record_at("far", 6, 6), record_at("near", 5, 6)];

        let nearest = nearest_within(origin, "me", candidates.iter(), PROXIMITY_RADIUS);
        assert_eq!(nearest.map(|r| r.player_id.as_str()), Some("near"));
    }

    #[test]
    fn equidistant_candidates_break_ties_on_id() {
        let origin = Position::new(5, 5);
        let candidates = vec![record_at("zeta", 5, 6), record_at("alpha", 5, 4)];

        let nearest = nearest_within(origin, "me", candidates.iter(), PROXIMITY_RADIUS);
        assert_eq!(nearest.map(|r| r.player_id.as_str()), Some("alpha"));
    }

    #[test]
    fn origin_entity_is_never_its_own_neighbour() {
        let origin = Position::new(5, 5);
        let candidates = vec![record_at("me", 5, 5), record_at("other", 5, 6)];

        let hits = within(origin, "me", candidates.iter(), PROXIMITY_RADIUS);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].player_id, "other");
    }

    #[test]
    fn empty_when_everyone_is_out_of_range() {
        let origin = Position::new(0, 0);
        let candidates = vec![record_at("a", 2, 0), record_at("b", 0, 2)];
        assert!(nearest_within(origin, "me", candidates.iter(), PROXIMITY_RADIUS).is_none());
    }
}
