use std::fmt;
use std::path::Path;

use contracts::{ChatMessage, PlayerRecord, WebhookRegistration};
use rusqlite::{params, Connection};

#[derive(Debug)]
pub enum PersistenceError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    NotAttached,
    NotABot(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
            Self::NotAttached => write!(f, "sqlite store is not attached"),
            Self::NotABot(id) => write!(f, "'{id}' has no webhook registration to persist"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// SQLite store for the durable half of the space: chat history per channel
/// and bot registrations (including webhook credentials, which never ride
/// the record JSON).
#[derive(Debug)]
pub struct SqliteSpaceStore {
    conn: Connection,
}

impl SqliteSpaceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    /// Inserts or refreshes a bot row. The webhook url and token live in
    /// dedicated columns because `PlayerRecord` strips them from JSON.
    pub fn upsert_bot(&mut self, record: &PlayerRecord) -> Result<(), PersistenceError> {
        let Some(webhook) = record.webhook.as_ref() else {
            return Err(PersistenceError::NotABot(record.player_id.clone()));
        };
        let record_json = serde_json::to_string(record)?;

        self.conn.execute(
            "INSERT INTO bots (
                player_id,
                name,
                skin,
                webhook_url,
                webhook_token,
                record_json,
                created_at_ms,
                updated_at_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(player_id) DO UPDATE SET
                name = excluded.name,
                skin = excluded.skin,
                record_json = excluded.record_json,
                updated_at_ms = excluded.updated_at_ms",
            params![
                record.player_id.as_str(),
                record.name.as_str(),
                record.skin.as_str(),
                webhook.url.as_str(),
                webhook.token.as_str(),
                record_json,
                i64::try_from(record.last_seen_at_ms).unwrap_or(i64::MAX),
                i64::try_from(record.last_seen_at_ms).unwrap_or(i64::MAX),
            ],
        )?;

        Ok(())
    }

    pub fn delete_bot(&mut self, player_id: &str) -> Result<bool, PersistenceError> {
        let affected = self
            .conn
            .execute("DELETE FROM bots WHERE player_id = ?1", params![player_id])?;
        Ok(affected > 0)
    }

    /// Every persisted bot with its webhook registration re-attached, in
    /// ascending id order.
    pub fn load_bots(&self) -> Result<Vec<PlayerRecord>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT record_json, webhook_url, webhook_token
             FROM bots
             ORDER BY player_id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut bots = Vec::new();
        for row in rows {
            let (record_json, url, token) = row?;
            let mut record: PlayerRecord = serde_json::from_str(&record_json)?;
            record.webhook = Some(WebhookRegistration { url, token });
            bots.push(record);
        }

        Ok(bots)
    }

    pub fn append_message(
        &mut self,
        channel: &str,
        message: &ChatMessage,
    ) -> Result<(), PersistenceError> {
        let message_json = serde_json::to_string(message)?;
        self.conn.execute(
            "INSERT INTO messages (channel, kind, sender_id, sent_at_ms, message_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                channel,
                message.kind.as_str(),
                message.sender_id.as_str(),
                i64::try_from(message.sent_at_ms).unwrap_or(i64::MAX),
                message_json,
            ],
        )?;
        Ok(())
    }

    /// Up to `limit` most recent messages on one channel, oldest first.
    pub fn load_channel_messages(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT message_json FROM (
                 SELECT id, message_json
                 FROM messages
                 WHERE channel = ?1
                 ORDER BY id DESC
                 LIMIT ?2
             ) ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(
            params![channel, i64::try_from(limit).unwrap_or(i64::MAX)],
            |row| row.get::<_, String>(0),
        )?;

        let mut messages = Vec::new();
        for row in rows {
            let payload = row?;
            messages.push(serde_json::from_str::<ChatMessage>(&payload)?);
        }

        Ok(messages)
    }

    /// Deletes every direct channel the entity participates in. Channel keys
    /// are `dm:<a>:<b>` with the pair in sorted order, so the id sits either
    /// directly after the prefix or at the tail.
    pub fn purge_dm_channels(&mut self, player_id: &str) -> Result<usize, PersistenceError> {
        let affected = self.conn.execute(
            "DELETE FROM messages
             WHERE channel LIKE 'dm:%'
               AND (channel LIKE 'dm:' || ?1 || ':%' OR channel LIKE 'dm:%:' || ?1)",
            params![player_id],
        )?;
        Ok(affected)
    }

    pub fn message_count(&self) -> Result<usize, PersistenceError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    fn configure(&mut self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS bots (
                player_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                skin TEXT NOT NULL,
                webhook_url TEXT NOT NULL,
                webhook_token TEXT NOT NULL,
                record_json TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                updated_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel TEXT NOT NULL,
                kind TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                sent_at_ms INTEGER NOT NULL,
                message_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_channel_id ON messages(channel, id);
            CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_id, sent_at_ms);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at_ms)
             VALUES(1, 'initial_v1', 0)",
            [],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Direction, MessageKind, Position};

    fn temp_db_path(name: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();

        std::env::temp_dir().join(format!("plaza_store_{name}_{nanos}.sqlite"))
    }

    fn cleanup(path: &std::path::Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("sqlite-wal"));
        let _ = std::fs::remove_file(path.with_extension("sqlite-shm"));
    }

    fn bot(id: &str, now_ms: u64) -> PlayerRecord {
        PlayerRecord::bot(
            id.to_string(),
            format!("name-{id}"),
            Position::new(3, 4),
            Direction::Left,
            "robot".to_string(),
            WebhookRegistration {
                url: format!("http://bots.test/{id}"),
                token: format!("secret-{id}"),
            },
            now_ms,
        )
    }

    fn message(kind: MessageKind, target: Option<&str>, sent_at_ms: u64) -> ChatMessage {
        ChatMessage::new(
            kind,
            "sender".to_string(),
            "Sender".to_string(),
            "hello".to_string(),
            target.map(str::to_string),
            sent_at_ms,
        )
    }

    #[test]
    fn bots_round_trip_with_webhook_credentials() {
        let path = temp_db_path("bots");
        let mut store = SqliteSpaceStore::open(&path).expect("open store");

        store.upsert_bot(&bot("bot_b", 100)).expect("persist bot b");
        store.upsert_bot(&bot("bot_a", 100)).expect("persist bot a");

        let loaded = store.load_bots().expect("load bots");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].player_id, "bot_a");
        assert_eq!(
            loaded[1].webhook.as_ref().map(|w| w.token.as_str()),
            Some("secret-bot_b")
        );
        assert!(loaded[0].is_bot);

        cleanup(&path);
    }

    #[test]
    fn upsert_updates_profile_fields() {
        let path = temp_db_path("upsert");
        let mut store = SqliteSpaceStore::open(&path).expect("open store");

        let mut record = bot("bot_a", 100);
        store.upsert_bot(&record).expect("insert");
        record.name = "renamed".to_string();
        record.skin = "gold".to_string();
        store.upsert_bot(&record).expect("update");

        let loaded = store.load_bots().expect("load bots");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "renamed");
        assert_eq!(loaded[0].skin, "gold");

        cleanup(&path);
    }

    #[test]
    fn record_without_webhook_is_rejected() {
        let path = temp_db_path("nonbot");
        let mut store = SqliteSpaceStore::open(&path).expect("open store");

        let human = PlayerRecord::new(
            "human".to_string(),
            "Hue".to_string(),
            Position::new(1, 1),
            Direction::Down,
            "default".to_string(),
            0,
        );
        let err = store.upsert_bot(&human).unwrap_err();
        assert!(matches!(err, PersistenceError::NotABot(_)));

        cleanup(&path);
    }

    #[test]
    fn channel_history_keeps_insertion_order() {
        let path = temp_db_path("history");
        let mut store = SqliteSpaceStore::open(&path).expect("open store");

        for i in 0..5_u64 {
            let mut msg = message(MessageKind::Room, Some("Office"), i);
            msg.text = format!("msg {i}");
            store.append_message("room:Office", &msg).expect("append");
        }

        let recent = store
            .load_channel_messages("room:Office", 3)
            .expect("load messages");
        let texts: Vec<&str> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["msg 2", "msg 3", "msg 4"]);

        cleanup(&path);
    }

    #[test]
    fn dm_purge_spares_room_and_global_history() {
        let path = temp_db_path("purge");
        let mut store = SqliteSpaceStore::open(&path).expect("open store");

        store
            .append_message("dm:alice:bot_a", &message(MessageKind::Dm, Some("bot_a"), 1))
            .expect("append dm");
        store
            .append_message("dm:bot_a:carol", &message(MessageKind::Dm, Some("carol"), 2))
            .expect("append dm");
        store
            .append_message("dm:alice:carol", &message(MessageKind::Dm, Some("carol"), 3))
            .expect("append unrelated dm");
        store
            .append_message("room:Office", &message(MessageKind::Room, Some("Office"), 4))
            .expect("append room");
        store
            .append_message("global", &message(MessageKind::Global, None, 5))
            .expect("append global");

        let purged = store.purge_dm_channels("bot_a").expect("purge");
        assert_eq!(purged, 2);
        assert_eq!(store.message_count().expect("count"), 3);
        assert_eq!(
            store
                .load_channel_messages("dm:alice:carol", 10)
                .expect("load")
                .len(),
            1
        );

        cleanup(&path);
    }

    #[test]
    fn delete_bot_reports_whether_a_row_existed() {
        let path = temp_db_path("delete");
        let mut store = SqliteSpaceStore::open(&path).expect("open store");

        store.upsert_bot(&bot("bot_a", 100)).expect("persist");
        assert!(store.delete_bot("bot_a").expect("delete existing"));
        assert!(!store.delete_bot("bot_a").expect("delete missing"));
        assert!(store.load_bots().expect("load").is_empty());

        cleanup(&path);
    }
}
