use std::collections::BTreeMap;
use std::sync::Mutex;

use contracts::{ChatMessage, PlayerRecord, WorldSnapshot};
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 4096;

/// One frame on the shared space bus.
#[derive(Debug, Clone)]
pub enum BusEvent {
    Snapshot(WorldSnapshot),
    Chat(ChatMessage),
    Warning(String),
}

/// Fan-out hub between the authoritative facade and every connected stream.
///
/// Publishing merges the record into a retained map and broadcasts the full
/// world snapshot, so late subscribers never need a separate catch-up
/// protocol: the next publish carries everything.
#[derive(Debug)]
pub struct SpaceBus {
    records: Mutex<BTreeMap<String, PlayerRecord>>,
    tx: broadcast::Sender<BusEvent>,
}

impl Default for SpaceBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SpaceBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            records: Mutex::new(BTreeMap::new()),
            tx,
        }
    }

    /// Primes the retained map without broadcasting. Used once at startup
    /// to carry restored bots into the first published snapshot.
    pub fn seed(&self, records: impl IntoIterator<Item = PlayerRecord>) {
        let mut retained = self.records();
        for record in records {
            retained.insert(record.player_id.clone(), record);
        }
    }

    /// Merges one record and fans out the resulting snapshot.
    pub fn publish(&self, record: PlayerRecord, now_ms: u64) -> WorldSnapshot {
        let snapshot = {
            let mut retained = self.records();
            retained.insert(record.player_id.clone(), record);
            WorldSnapshot::from_players(now_ms, retained.values().cloned())
        };
        let _ = self.tx.send(BusEvent::Snapshot(snapshot.clone()));
        snapshot
    }

    /// Drops one record and fans out the resulting snapshot.
    pub fn remove(&self, player_id: &str, now_ms: u64) -> WorldSnapshot {
        let snapshot = {
            let mut retained = self.records();
            retained.remove(player_id);
            WorldSnapshot::from_players(now_ms, retained.values().cloned())
        };
        let _ = self.tx.send(BusEvent::Snapshot(snapshot.clone()));
        snapshot
    }

    pub fn chat(&self, message: ChatMessage) {
        let _ = self.tx.send(BusEvent::Chat(message));
    }

    pub fn warn(&self, text: impl Into<String>) {
        let _ = self.tx.send(BusEvent::Warning(text.into()));
    }

    pub fn snapshot(&self, now_ms: u64) -> WorldSnapshot {
        let retained = self.records();
        WorldSnapshot::from_players(now_ms, retained.values().cloned())
    }

    /// Subscribes to all future events. Dropping the subscription is the
    /// only unsubscribe.
    pub fn subscribe(&self) -> BusSubscription {
        BusSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, PlayerRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[derive(Debug)]
pub struct BusSubscription {
    rx: broadcast::Receiver<BusEvent>,
}

impl BusSubscription {
    pub async fn recv(&mut self) -> Result<BusEvent, broadcast::error::RecvError> {
        self.rx.recv().await
    }
}
