//! Presence classification from activity timestamps alone.

use contracts::{PlayerRecord, Presence};

use crate::{AWAY_THRESHOLD_MS, OFFLINE_THRESHOLD_MS};

/// Classifies an entity from its timestamps. The same record and clock always
/// produce the same answer, so every surface that renders presence agrees.
///
/// An explicit departure (`last_left_at_ms` at or after the last activity)
/// reads as offline immediately; otherwise the idle time decides.
pub fn presence(record: &PlayerRecord, now_ms: u64) -> Presence {
    if let Some(left_at) = record.last_left_at_ms {
        if left_at >= record.last_seen_at_ms {
            return Presence::Offline;
        }
    }

    let idle_ms = now_ms.saturating_sub(record.last_seen_at_ms);
    if idle_ms >= OFFLINE_THRESHOLD_MS {
        Presence::Offline
    } else if idle_ms >= AWAY_THRESHOLD_MS {
        Presence::Away
    } else {
        Presence::Online
    }
}
