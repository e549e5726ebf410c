//! Hit/kill attribution and best-effort delivery
//!
//! The round owns a `StatsRecorder` and only ever increments counters on it.
//! Batches are drained between ticks and handed to a `StatsFlusher` task over
//! a bounded channel; the flusher merges them into a pending table and posts
//! one record per player on a fixed interval. A record that fails to post
//! stays pending for the next interval. Nothing here ever blocks a tick.

use std::future::Future;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use hashbrown::HashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::state::ModeKind;

/// Capacity of the round -> flusher channel
pub const STATS_CHANNEL_CAPACITY: usize = 256;

/// Stats delivery errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("Stats delivery failed: {0}")]
    Delivery(String),
    #[error("Stats endpoint returned status {0}")]
    Status(u16),
}

/// Counters for one round, keyed by identity token
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatsBatch {
    pub game: Uuid,
    pub arena: Option<ModeKind>,
    pub hits: HashMap<String, u32>,
    pub kills: HashMap<String, u32>,
    pub winners: Vec<String>,
}

impl StatsBatch {
    fn new(game: Uuid, arena: Option<ModeKind>) -> Self {
        Self {
            game,
            arena,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty() && self.kills.is_empty() && self.winners.is_empty()
    }
}

/// In-round counter table
#[derive(Debug, Default)]
pub struct StatsRecorder {
    current: StatsBatch,
    /// Batches from earlier rounds not drained yet
    sealed: Vec<StatsBatch>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start attributing to a new round; counts so far are kept under the old id
    pub fn begin(&mut self, game: Uuid, arena: Option<ModeKind>) {
        let previous = std::mem::replace(&mut self.current, StatsBatch::new(game, arena));
        if !previous.is_empty() {
            self.sealed.push(previous);
        }
    }

    pub fn game(&self) -> Uuid {
        self.current.game
    }

    pub fn record_hit(&mut self, player: &str) {
        if player.is_empty() {
            return;
        }
        *self.current.hits.entry_ref(player).or_insert(0) += 1;
    }

    pub fn record_kill(&mut self, player: &str) {
        if player.is_empty() {
            return;
        }
        *self.current.kills.entry_ref(player).or_insert(0) += 1;
    }

    pub fn record_winners(&mut self, players: Vec<String>) {
        self.current.winners.extend(players);
    }

    /// Take everything recorded since the last drain
    pub fn drain(&mut self) -> Vec<StatsBatch> {
        let mut out = std::mem::take(&mut self.sealed);
        let fresh = StatsBatch::new(self.current.game, self.current.arena);
        let current = std::mem::replace(&mut self.current, fresh);
        if !current.is_empty() {
            out.push(current);
        }
        out
    }
}

/// One delivered record (one player in one game)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRecord {
    pub player: String,
    pub hits: u32,
    pub kills: u32,
    pub game: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arena: Option<&'static str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub win: bool,
}

/// Destination for stats records
pub trait StatsSink: Send + Sync + 'static {
    fn post(&self, record: &StatsRecord) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Sink that only logs (used when no stats endpoint is configured)
#[derive(Debug, Clone, Default)]
pub struct LogSink;

impl StatsSink for LogSink {
    fn post(&self, record: &StatsRecord) -> impl Future<Output = Result<(), SinkError>> + Send {
        async move {
            info!(
                player = %record.player,
                hits = record.hits,
                kills = record.kills,
                game = %record.game,
                win = record.win,
                "stats"
            );
            Ok(())
        }
    }
}

/// JSON-over-HTTP sink, one POST per record
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

#[cfg(feature = "http")]
impl HttpSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[cfg(feature = "http")]
impl StatsSink for HttpSink {
    fn post(&self, record: &StatsRecord) -> impl Future<Output = Result<(), SinkError>> + Send {
        async move {
            let response = self
                .client
                .post(&self.url)
                .json(record)
                .send()
                .await
                .map_err(|e| SinkError::Delivery(e.to_string()))?;
            if !response.status().is_success() {
                return Err(SinkError::Status(response.status().as_u16()));
            }
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    hits: u32,
    kills: u32,
    win: bool,
}

/// Counts waiting for delivery, merged across batches
#[derive(Debug, Default)]
pub struct PendingStats {
    tallies: HashMap<(Uuid, Option<ModeKind>, String), Tally>,
}

impl PendingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, batch: StatsBatch) {
        let StatsBatch { game, arena, hits, kills, winners } = batch;
        for (player, n) in hits {
            self.tallies.entry((game, arena, player)).or_default().hits += n;
        }
        for (player, n) in kills {
            self.tallies.entry((game, arena, player)).or_default().kills += n;
        }
        for player in winners {
            self.tallies.entry((game, arena, player)).or_default().win = true;
        }
    }

    pub fn len(&self) -> usize {
        self.tallies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }

    /// Post every pending record; delivered records are removed, failed ones
    /// stay for the next flush. Returns the number delivered.
    pub async fn flush<S: StatsSink>(&mut self, sink: &S) -> usize {
        let keys: Vec<_> = self.tallies.keys().cloned().collect();
        let mut delivered = 0;
        for key in keys {
            let Some(tally) = self.tallies.get(&key).copied() else {
                continue;
            };
            let (game, arena, player) = &key;
            let record = StatsRecord {
                player: player.clone(),
                hits: tally.hits,
                kills: tally.kills,
                game: *game,
                arena: arena.map(|a| a.as_str()),
                win: tally.win,
            };
            match sink.post(&record).await {
                Ok(()) => {
                    self.tallies.remove(&key);
                    delivered += 1;
                }
                Err(e) => {
                    warn!(player = %record.player, "Failed to send stats, keeping for retry: {}", e);
                }
            }
        }
        delivered
    }
}

/// Round-side handle for queueing batches to the flusher
#[derive(Debug, Clone)]
pub struct StatsQueue {
    tx: Sender<StatsBatch>,
}

impl StatsQueue {
    /// Queue a batch without blocking. A full queue drops the batch.
    pub fn push(&self, batch: StatsBatch) -> bool {
        if batch.is_empty() {
            return true;
        }
        match self.tx.try_send(batch) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Stats queue full, dropping batch");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Background flusher task
pub struct StatsFlusher;

impl StatsFlusher {
    /// Create the queue and spawn the flush loop on the current tokio runtime.
    /// The task exits after a final flush once every `StatsQueue` is dropped.
    pub fn spawn<S: StatsSink>(sink: S, every: Duration) -> (StatsQueue, JoinHandle<()>) {
        let (tx, rx) = crossbeam_channel::bounded(STATS_CHANNEL_CAPACITY);
        let handle = tokio::spawn(run_flusher(sink, rx, every));
        (StatsQueue { tx }, handle)
    }
}

async fn run_flusher<S: StatsSink>(sink: S, rx: Receiver<StatsBatch>, every: Duration) {
    let mut pending = PendingStats::new();
    let mut interval = tokio::time::interval(every.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let mut disconnected = false;
        loop {
            match rx.try_recv() {
                Ok(batch) => pending.merge(batch),
                Err(crossbeam_channel::TryRecvError::Empty) => break,
                Err(crossbeam_channel::TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        if !pending.is_empty() {
            let sent = pending.flush(&sink).await;
            debug!(sent, remaining = pending.len(), "Stats flush");
        }

        if disconnected {
            if !pending.is_empty() {
                warn!(remaining = pending.len(), "Stats flusher stopping with undelivered records");
            }
            break;
        }
    }
}
