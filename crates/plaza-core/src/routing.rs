//! Channel selection and fan-out for chat traffic.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use contracts::{ChatMessage, MessageKind, PlayerRecord};

use crate::proximity::nearest_within;
use crate::registry::PlayerRegistry;
use crate::rooms::RoomBoundaryTracker;
use crate::PROXIMITY_RADIUS;

/// Messages kept per channel before the oldest are dropped.
const CHANNEL_LOG_CAP: usize = 200;

/// Identity of a conversation. Direct channels are keyed by the sorted pair
/// of participants, so both sides address the same log.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChannelKey {
    Global,
    Room(String),
    Dm(String, String),
}

impl ChannelKey {
    pub fn room(name: impl Into<String>) -> Self {
        Self::Room(name.into())
    }

    /// Canonical direct-channel key: participant order never matters.
    pub fn dm(a: &str, b: &str) -> Self {
        if a <= b {
            Self::Dm(a.to_string(), b.to_string())
        } else {
            Self::Dm(b.to_string(), a.to_string())
        }
    }

    pub fn involves(&self, entity_id: &str) -> bool {
        match self {
            Self::Dm(a, b) => a == entity_id || b == entity_id,
            _ => false,
        }
    }

    /// The channel a delivered message belongs to. System notices share the
    /// global channel; a direct message with no target is treated as a note
    /// to self rather than rejected.
    pub fn for_message(message: &ChatMessage) -> Self {
        match message.kind {
            MessageKind::Global | MessageKind::System => Self::Global,
            MessageKind::Room => Self::room(message.target.clone().unwrap_or_default()),
            MessageKind::Dm => Self::dm(
                &message.sender_id,
                message.target.as_deref().unwrap_or(&message.sender_id),
            ),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Room(name) => write!(f, "room:{name}"),
            Self::Dm(a, b) => write!(f, "dm:{a}:{b}"),
        }
    }
}

/// One webhook delivery the caller still has to perform. Carrying the url
/// and token here lets the API layer deliver after releasing the roster lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookTarget {
    pub player_id: String,
    pub url: String,
    pub token: String,
}

/// A fully routed message: what to record, where it lives, and which bots
/// must hear about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedMessage {
    pub message: ChatMessage,
    pub channel: ChannelKey,
    pub webhook_targets: Vec<WebhookTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    UnknownRecipient(String),
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRecipient(id) => write!(f, "unknown recipient '{id}'"),
        }
    }
}

impl std::error::Error for RouteError {}

/// Routes one outgoing message.
///
/// Precedence: an explicit target always wins and becomes a direct message;
/// otherwise the sender's room makes it a room message; otherwise the
/// nearest entity within [`PROXIMITY_RADIUS`] receives a direct message;
/// otherwise it goes out globally.
///
/// Room membership is whatever the tracker last derived, not a fresh lookup
/// from the sender's position. The two only agree when every committed move
/// has been observed, which is the caller's job.
pub fn route(
    sender: &PlayerRecord,
    text: impl Into<String>,
    target: Option<&str>,
    registry: &PlayerRegistry,
    rooms: &RoomBoundaryTracker,
    now_ms: u64,
) -> Result<RoutedMessage, RouteError> {
    let (kind, channel, message_target, recipient) = if let Some(recipient_id) = target {
        if !registry.contains(recipient_id) {
            return Err(RouteError::UnknownRecipient(recipient_id.to_string()));
        }
        (
            MessageKind::Dm,
            ChannelKey::dm(&sender.player_id, recipient_id),
            Some(recipient_id.to_string()),
            Some(recipient_id.to_string()),
        )
    } else if let Some(room) = rooms.current_room(&sender.player_id) {
        (
            MessageKind::Room,
            ChannelKey::room(room),
            Some(room.to_string()),
            None,
        )
    } else if let Some(nearest) = nearest_within(
        sender.position,
        &sender.player_id,
        registry.iter(),
        PROXIMITY_RADIUS,
    ) {
        (
            MessageKind::Dm,
            ChannelKey::dm(&sender.player_id, &nearest.player_id),
            Some(nearest.player_id.clone()),
            Some(nearest.player_id.clone()),
        )
    } else {
        (MessageKind::Global, ChannelKey::Global, None, None)
    };

    let message = ChatMessage::new(
        kind,
        sender.player_id.clone(),
        sender.name.clone(),
        text,
        message_target,
        now_ms,
    );
    let webhook_targets = webhook_targets(sender, &channel, recipient.as_deref(), registry, rooms);

    Ok(RoutedMessage {
        message,
        channel,
        webhook_targets,
    })
}

/// Which registered webhooks must hear this message. The sender never
/// receives its own traffic back.
fn webhook_targets(
    sender: &PlayerRecord,
    channel: &ChannelKey,
    recipient: Option<&str>,
    registry: &PlayerRegistry,
    rooms: &RoomBoundaryTracker,
) -> Vec<WebhookTarget> {
    let audience: Vec<&PlayerRecord> = match channel {
        ChannelKey::Dm(..) => recipient
            .and_then(|id| registry.get(id))
            .into_iter()
            .collect(),
        ChannelKey::Room(room) => registry
            .iter()
            .filter(|record| rooms.current_room(&record.player_id) == Some(room.as_str()))
            .collect(),
        ChannelKey::Global => registry.iter().collect(),
    };

    audience
        .into_iter()
        .filter(|record| record.player_id != sender.player_id)
        .filter_map(|record| {
            record.webhook.as_ref().map(|webhook| WebhookTarget {
                player_id: record.player_id.clone(),
                url: webhook.url.clone(),
                token: webhook.token.clone(),
            })
        })
        .collect()
}

/// Bounded per-channel history. Old messages fall off the front once a
/// channel passes [`CHANNEL_LOG_CAP`].
#[derive(Debug, Clone, Default)]
pub struct ChannelLog {
    channels: BTreeMap<ChannelKey, VecDeque<ChatMessage>>,
}

impl ChannelLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, routed: &RoutedMessage) {
        self.append(routed.channel.clone(), routed.message.clone());
    }

    pub fn append(&mut self, channel: ChannelKey, message: ChatMessage) {
        let log = match self.channels.entry(channel) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(VecDeque::new()),
        };
        if log.len() == CHANNEL_LOG_CAP {
            log.pop_front();
        }
        log.push_back(message);
    }

    /// Up to `limit` most recent messages on the channel, oldest first.
    pub fn recent(&self, channel: &ChannelKey, limit: usize) -> Vec<&ChatMessage> {
        match self.channels.get(channel) {
            Some(log) => {
                let skip = log.len().saturating_sub(limit);
                log.iter().skip(skip).collect()
            }
            None => Vec::new(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Drops every direct channel the entity participates in. Room and
    /// global history stays.
    pub fn purge_dms_with(&mut self, entity_id: &str) -> usize {
        let doomed: Vec<ChannelKey> = self
            .channels
            .keys()
            .filter(|key| key.involves(entity_id))
            .cloned()
            .collect();
        for key in &doomed {
            self.channels.remove(key);
        }
        doomed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Direction, Position, WebhookRegistration};

    use crate::level::Room;
    use crate::TILE_SIZE;

    fn human(id: &str, x: i64, y: i64) -> PlayerRecord {
        PlayerRecord::new(
            id.to_string(),
            format!("name-{id}"),
            Position::new(x, y),
            Direction::Down,
            "default".to_string(),
            0,
        )
    }

    fn bot(id: &str, x: i64, y: i64) -> PlayerRecord {
        PlayerRecord::bot(
            id.to_string(),
            format!("name-{id}"),
            Position::new(x, y),
            Direction::Down,
            "robot".to_string(),
            WebhookRegistration {
                url: format!("http://bots.test/{id}"),
                token: format!("secret-{id}"),
            },
            0,
        )
    }

    fn office_tracker() -> RoomBoundaryTracker {
        RoomBoundaryTracker::new(vec![Room {
            name: "Office".to_string(),
            x: 2 * TILE_SIZE,
            y: 2 * TILE_SIZE,
            w: 6 * TILE_SIZE,
            h: 6 * TILE_SIZE,
        }])
    }

    fn observe_all<'a>(
        tracker: &mut RoomBoundaryTracker,
        records: impl IntoIterator<Item = &'a PlayerRecord>,
    ) {
        for record in records {
            tracker.observe(&record.player_id, record.position);
        }
    }

    #[test]
    fn explicit_target_becomes_a_dm() {
        let mut registry = PlayerRegistry::new();
        registry.upsert(human("alice", 20, 20));
        let sender = human("me", 3, 3);

        let routed = route(&sender, "hi", Some("alice"), &registry, &office_tracker(), 1_000)
            .expect("route");
        assert_eq!(routed.message.kind, MessageKind::Dm);
        assert_eq!(routed.message.target.as_deref(), Some("alice"));
        assert_eq!(routed.channel, ChannelKey::dm("me", "alice"));
    }

    #[test]
    fn unknown_recipient_is_an_error() {
        let registry = PlayerRegistry::new();
        let sender = human("me", 3, 3);

        let err = route(&sender, "hi", Some("ghost"), &registry, &office_tracker(), 0).unwrap_err();
        assert_eq!(err, RouteError::UnknownRecipient("ghost".to_string()));
    }

    #[test]
    fn room_outranks_a_nearby_neighbour() {
        let mut registry = PlayerRegistry::new();
        registry.upsert(human("near", 3, 4)); // one cell away
        let sender = human("me", 3, 3); // inside the office

        let mut tracker = office_tracker();
        observe_all(&mut tracker, registry.iter().chain([&sender]));

        let routed = route(&sender, "hi", None, &registry, &tracker, 0).expect("route");
        assert_eq!(routed.message.kind, MessageKind::Room);
        assert_eq!(routed.message.target.as_deref(), Some("Office"));
        assert_eq!(routed.channel, ChannelKey::room("Office"));
    }

    #[test]
    fn routing_uses_the_last_observed_room() {
        let registry = PlayerRegistry::new();
        let mut sender = human("me", 3, 3);
        let mut tracker = office_tracker();
        tracker.observe("me", sender.position);

        // The record drifted without a matching observation; the tracker's
        // view still decides the channel.
        sender.position = Position::new(20, 20);
        let routed = route(&sender, "hi", None, &registry, &tracker, 0).expect("route");
        assert_eq!(routed.channel, ChannelKey::room("Office"));
    }

    #[test]
    fn proximity_picks_the_nearest_outside_rooms() {
        let mut registry = PlayerRegistry::new();
        registry.upsert(human("close", 12, 13));
        registry.upsert(human("closer", 12, 12));
        let sender = human("me", 12, 11); // open plaza

        let mut tracker = office_tracker();
        observe_all(&mut tracker, registry.iter().chain([&sender]));

        let routed = route(&sender, "psst", None, &registry, &tracker, 0).expect("route");
        assert_eq!(routed.message.kind, MessageKind::Dm);
        assert_eq!(routed.message.target.as_deref(), Some("closer"));
    }

    #[test]
    fn isolation_falls_back_to_global() {
        let mut registry = PlayerRegistry::new();
        registry.upsert(human("far", 12, 13)); // distance 2 from sender
        let sender = human("me", 12, 11);

        let mut tracker = office_tracker();
        observe_all(&mut tracker, registry.iter().chain([&sender]));

        let routed = route(&sender, "hello?", None, &registry, &tracker, 0).expect("route");
        assert_eq!(routed.message.kind, MessageKind::Global);
        assert!(routed.message.target.is_none());
        assert_eq!(routed.channel, ChannelKey::Global);
    }

    #[test]
    fn dm_key_is_order_independent() {
        assert_eq!(ChannelKey::dm("alice", "bob"), ChannelKey::dm("bob", "alice"));
        assert!(ChannelKey::dm("alice", "bob").involves("alice"));
        assert!(!ChannelKey::dm("alice", "bob").involves("carol"));
    }

    #[test]
    fn delivered_messages_map_back_to_their_channel() {
        let dm = ChatMessage::new(
            MessageKind::Dm,
            "bob".to_string(),
            "Bob".to_string(),
            "hi".to_string(),
            Some("alice".to_string()),
            0,
        );
        assert_eq!(ChannelKey::for_message(&dm), ChannelKey::dm("alice", "bob"));

        let system = ChatMessage::new(
            MessageKind::System,
            "server".to_string(),
            "server".to_string(),
            "maintenance".to_string(),
            None,
            0,
        );
        assert_eq!(ChannelKey::for_message(&system), ChannelKey::Global);
    }

    #[test]
    fn dm_webhooks_reach_only_the_recipient_bot() {
        let mut registry = PlayerRegistry::new();
        registry.upsert(bot("bot_a", 20, 20));
        registry.upsert(bot("bot_b", 21, 20));
        let sender = human("me", 3, 3);

        let routed = route(&sender, "hi", Some("bot_a"), &registry, &office_tracker(), 0)
            .expect("route");
        let ids: Vec<&str> = routed
            .webhook_targets
            .iter()
            .map(|t| t.player_id.as_str())
            .collect();
        assert_eq!(ids, vec!["bot_a"]);
        assert_eq!(routed.webhook_targets[0].token, "secret-bot_a");
    }

    #[test]
    fn room_webhooks_fan_out_to_bots_in_the_room_only() {
        let mut registry = PlayerRegistry::new();
        registry.upsert(bot("bot_in", 4, 4)); // inside the office
        registry.upsert(bot("bot_out", 20, 20));
        registry.upsert(human("bystander", 5, 5));
        let sender = human("me", 3, 3);

        let mut tracker = office_tracker();
        observe_all(&mut tracker, registry.iter().chain([&sender]));

        let routed = route(&sender, "meeting", None, &registry, &tracker, 0).expect("route");
        assert_eq!(routed.channel, ChannelKey::room("Office"));
        let ids: Vec<&str> = routed
            .webhook_targets
            .iter()
            .map(|t| t.player_id.as_str())
            .collect();
        assert_eq!(ids, vec!["bot_in"]);
    }

    #[test]
    fn global_webhooks_skip_the_sending_bot() {
        let mut registry = PlayerRegistry::new();
        let sender = bot("bot_me", 12, 11);
        registry.upsert(sender.clone());
        registry.upsert(bot("bot_far", 20, 20));

        let routed = route(&sender, "ping", None, &registry, &office_tracker(), 0).expect("route");
        assert_eq!(routed.message.kind, MessageKind::Global);
        let ids: Vec<&str> = routed
            .webhook_targets
            .iter()
            .map(|t| t.player_id.as_str())
            .collect();
        assert_eq!(ids, vec!["bot_far"]);
    }

    #[test]
    fn channel_log_caps_and_orders_history() {
        let mut log = ChannelLog::new();
        for i in 0..(CHANNEL_LOG_CAP + 10) {
            log.append(
                ChannelKey::Global,
                ChatMessage::new(
                    MessageKind::Global,
                    "me".to_string(),
                    "Me".to_string(),
                    format!("msg {i}"),
                    None,
                    i as u64,
                ),
            );
        }

        let recent = log.recent(&ChannelKey::Global, 3);
        let texts: Vec<&str> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["msg 207", "msg 208", "msg 209"]);

        let all = log.recent(&ChannelKey::Global, usize::MAX);
        assert_eq!(all.len(), CHANNEL_LOG_CAP);
        assert_eq!(all[0].text, "msg 10");
    }

    #[test]
    fn purging_an_entity_drops_only_its_dms() {
        let mut log = ChannelLog::new();
        let note = |kind, target: Option<&str>| {
            ChatMessage::new(
                kind,
                "me".to_string(),
                "Me".to_string(),
                "x".to_string(),
                target.map(str::to_string),
                0,
            )
        };
        log.append(ChannelKey::dm("me", "bot_a"), note(MessageKind::Dm, Some("bot_a")));
        log.append(ChannelKey::dm("bot_a", "carol"), note(MessageKind::Dm, Some("carol")));
        log.append(ChannelKey::room("Office"), note(MessageKind::Room, Some("Office")));
        log.append(ChannelKey::Global, note(MessageKind::Global, None));

        assert_eq!(log.purge_dms_with("bot_a"), 2);
        assert_eq!(log.channel_count(), 2);
        assert!(log.recent(&ChannelKey::dm("me", "bot_a"), 10).is_empty());
        assert_eq!(log.recent(&ChannelKey::room("Office"), 10).len(), 1);
    }
}
