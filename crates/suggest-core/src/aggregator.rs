//! The Aggregator (§4.6): the write path that turns a logged completion
//! into updated trending/history signals immediately, and into a durable
//! count eventually.
//!
//! The Trending Tracker and History Tracker are updated synchronously on
//! ingest since they're in-memory and cheap. The Prefix Index is also
//! updated synchronously, so a lookup immediately after `log_completion`
//! reflects it. Durability is decoupled: deltas and query-log rows are
//! buffered and written to the [`LogStore`] by a periodic flush, or
//! immediately once the buffer crosses `N_flush` (§5).
//!
//! Flush retries with exponential backoff (base 200ms, cap 10s, 8 attempts)
//! mirroring the periodic-task retry shape in `vestige-mcp`'s consolidation
//! loop (see DESIGN.md). A flush that exhausts its retries leaves the
//! engine in a degraded-but-available state: suggestions keep serving from
//! the in-memory index, the batch stays buffered for the next cycle, and
//! `status()` reports the condition for an operator to notice.

use crate::error::EngineError;
use crate::filter::FilterGate;
use crate::history::HistoryTracker;
use crate::store::{LogStore, QueryLogRecord};
use crate::trending::TrendingTracker;
use crate::trie::PrefixIndex;
use crate::Phrase;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const FLUSH_BACKOFF_BASE: Duration = Duration::from_millis(200);
const FLUSH_BACKOFF_MAX: Duration = Duration::from_secs(10);
const FLUSH_MAX_ATTEMPTS: u32 = 8;

#[derive(Default)]
struct PendingBatch {
    deltas: HashMap<Phrase, i64>,
    log: Vec<QueryLogRecord>,
}

impl PendingBatch {
    fn len(&self) -> usize {
        self.log.len()
    }

    fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    fn take(&mut self) -> PendingBatch {
        std::mem::take(self)
    }

    fn merge_back(&mut self, other: PendingBatch) {
        for (phrase, delta) in other.deltas {
            *self.deltas.entry(phrase).or_insert(0) += delta;
        }
        self.log.extend(other.log);
    }
}

/// Diagnostic snapshot of the Aggregator's write-path state (admin `status`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorStatus {
    pub pending_batch_size: usize,
    pub degraded: bool,
    /// Milliseconds since the last successful flush, `None` if none has
    /// succeeded yet this process.
    pub flush_lag_ms: Option<u64>,
}

/// Turns logged completions into updated ranking signals and, eventually,
/// durable counts.
pub struct Aggregator {
    index: Arc<PrefixIndex>,
    trending: Arc<TrendingTracker>,
    history: Arc<HistoryTracker>,
    filter: Arc<FilterGate>,
    log_store: Arc<dyn LogStore>,
    pending: Mutex<PendingBatch>,
    flush_batch_size: usize,
    rebuild_cap: u64,
    degraded: AtomicBool,
    last_successful_flush: Mutex<Option<Instant>>,
}

impl Aggregator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: Arc<PrefixIndex>,
        trending: Arc<TrendingTracker>,
        history: Arc<HistoryTracker>,
        filter: Arc<FilterGate>,
        log_store: Arc<dyn LogStore>,
        flush_batch_size: usize,
        rebuild_cap: u64,
    ) -> Self {
        Aggregator {
            index,
            trending,
            history,
            filter,
            log_store,
            pending: Mutex::new(PendingBatch::default()),
            flush_batch_size,
            rebuild_cap,
            degraded: AtomicBool::new(false),
            last_successful_flush: Mutex::new(None),
        }
    }

    /// Record one completion of `phrase` (§4.6 ingest pipeline). `user_id`
    /// is the durable personalization identity the History Tracker keys on;
    /// `session_id` is only carried through to the query log. A phrase the
    /// Filter Gate blocks is appended only to the audit log: it never
    /// touches the batch counter, the Prefix Index, Trending, or History
    /// (§4.6 step 2). Otherwise updates the Prefix Index, Trending Tracker,
    /// and History Tracker immediately, and buffers the corresponding
    /// durable write, flushing early if the buffer has grown past
    /// `N_flush`.
    pub fn ingest(
        &self,
        user_id: Option<&str>,
        session_id: Option<&str>,
        phrase: Phrase,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let log_record = QueryLogRecord {
            user_id: user_id.map(str::to_owned),
            session_id: session_id.map(str::to_owned),
            phrase: phrase.clone(),
            occurred_at: now,
        };

        if self.filter.is_blocked(&phrase) {
            let should_flush = {
                let mut pending = self.pending.lock().expect("aggregator lock poisoned");
                pending.log.push(log_record);
                pending.len() >= self.flush_batch_size
            };
            if should_flush {
                self.flush();
            }
            return Ok(());
        }

        self.index.apply_delta(&phrase, 1)?;
        self.trending.bump(&phrase, now);
        if let Some(user_id) = user_id {
            self.history.record(user_id, phrase.clone(), now)?;
        }

        let should_flush = {
            let mut pending = self.pending.lock().expect("aggregator lock poisoned");
            *pending.deltas.entry(phrase).or_insert(0) += 1;
            pending.log.push(log_record);
            pending.len() >= self.flush_batch_size
        };
        if should_flush {
            self.flush();
        }
        Ok(())
    }

    /// Drain the pending batch and durably persist it, retrying with
    /// exponential backoff. On exhaustion the batch is merged back for the
    /// next flush attempt and the Aggregator is marked degraded; callers
    /// never see this as an error since suggestions keep serving from the
    /// in-memory index regardless.
    pub fn flush(&self) {
        let batch = {
            let mut pending = self.pending.lock().expect("aggregator lock poisoned");
            if pending.is_empty() {
                return;
            }
            pending.take()
        };

        let deltas: Vec<(Phrase, i64)> = batch.deltas.iter().map(|(p, d)| (p.clone(), *d)).collect();

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.log_store.apply_batch(&deltas, &batch.log) {
                Ok(()) => {
                    if self.degraded.swap(false, Ordering::SeqCst) {
                        tracing::info!("log store flush recovered after {attempt} attempt(s)");
                    }
                    *self.last_successful_flush.lock().expect("aggregator lock poisoned") = Some(Instant::now());
                    return;
                }
                Err(err) if attempt >= FLUSH_MAX_ATTEMPTS => {
                    tracing::error!(error = %err, attempts = attempt, "log store flush failed, entering degraded state");
                    self.degraded.store(true, Ordering::SeqCst);
                    let mut pending = self.pending.lock().expect("aggregator lock poisoned");
                    pending.merge_back(batch);
                    return;
                }
                Err(err) => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "log store flush failed, retrying");
                    std::thread::sleep(delay);
                }
            }
        }
    }

    /// Flush any pending writes, then rebuild the Prefix Index from the
    /// Log Store's durable counts (admin `rebuild`, §4.1). Flushing first
    /// ensures the rebuild reflects completions logged moments ago rather
    /// than racing the periodic flush.
    pub fn rebuild(&self) -> Result<(), EngineError> {
        self.flush();
        let counts = self.log_store.load_all_counts(self.rebuild_cap)?;
        self.index.rebuild(counts)?;
        Ok(())
    }

    /// `true` if the durable count has drifted enough from the index size
    /// to warrant a full rebuild rather than relying on incremental deltas
    /// (§5 `N_rebuild`).
    pub fn needs_rebuild(&self, threshold: u64) -> Result<bool, EngineError> {
        let durable = self.log_store.phrase_count()?;
        let indexed = self.index.size();
        Ok(durable.abs_diff(indexed) >= threshold)
    }

    pub fn status(&self) -> AggregatorStatus {
        let pending_batch_size = self.pending.lock().expect("aggregator lock poisoned").len();
        let flush_lag_ms = self
            .last_successful_flush
            .lock()
            .expect("aggregator lock poisoned")
            .map(|at| at.elapsed().as_millis() as u64);
        AggregatorStatus {
            pending_batch_size,
            degraded: self.degraded.load(Ordering::SeqCst),
            flush_lag_ms,
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp = FLUSH_BACKOFF_BASE.saturating_mul(1u32 << attempt.min(16).saturating_sub(1));
    exp.min(FLUSH_BACKOFF_MAX)
}
