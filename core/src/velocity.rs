//! Transaction velocity sources for the frequency factor.
//!
//! The scorer only asks one question: how many transactions did this
//! customer make in the window ending at `as_of`? Where the answer comes
//! from is pluggable.

use crate::{
    error::AmlResult,
    model::Transaction,
    types::EntityId,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

pub trait VelocitySource: Send + Sync {
    /// Transactions by `customer_id` with timestamp in `(as_of - window, as_of]`.
    fn count_recent(
        &self,
        customer_id: &str,
        as_of: DateTime<Utc>,
        window: Duration,
    ) -> AmlResult<usize>;
}

/// A source with no data. Every customer looks idle.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVelocityData;

impl VelocitySource for NoVelocityData {
    fn count_recent(&self, _: &str, _: DateTime<Utc>, _: Duration) -> AmlResult<usize> {
        Ok(0)
    }
}

/// Entries of `history` with timestamp in `(as_of - window, as_of]`,
/// not counting `exclude_id` (the transaction being scored).
pub fn count_in_window(
    history: &[Transaction],
    exclude_id: &str,
    as_of: DateTime<Utc>,
    window: Duration,
) -> usize {
    let start = as_of - window;
    history
        .iter()
        .filter(|h| h.id != exclude_id && h.timestamp > start && h.timestamp <= as_of)
        .count()
}

/// Writes between sweeps for customers whose whole queue has aged out.
const SWEEP_EVERY: u64 = 1_024;

#[derive(Default)]
struct LogState {
    queues: HashMap<EntityId, VecDeque<(DateTime<Utc>, EntityId)>>,
    latest: Option<DateTime<Utc>>,
    writes: u64,
}

/// In-memory sliding-window log of assessed transactions, per customer.
/// Entries older than `retention` behind the newest entry are pruned on write;
/// idle customers are dropped by a periodic sweep.
pub struct TransactionLog {
    retention: Duration,
    state:     Mutex<LogState>,
}

impl TransactionLog {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            state: Mutex::new(LogState::default()),
        }
    }

    /// Record a transaction for `customer_id`. Recording the same
    /// transaction id twice is a no-op.
    pub fn record(&self, customer_id: &str, transaction: &Transaction) {
        let mut state = self.state.lock();
        let queue = state.queues.entry(customer_id.to_string()).or_default();
        if queue.iter().any(|(_, id)| id == &transaction.id) {
            return;
        }

        // Keep the queue ordered by timestamp.
        let pos = queue
            .iter()
            .position(|(ts, _)| *ts > transaction.timestamp)
            .unwrap_or(queue.len());
        queue.insert(pos, (transaction.timestamp, transaction.id.clone()));

        if let Some(&(newest, _)) = queue.back() {
            let cutoff = newest - self.retention;
            while queue.front().is_some_and(|(ts, _)| *ts <= cutoff) {
                queue.pop_front();
            }
        }

        state.latest = state.latest.max(Some(transaction.timestamp));
        state.writes += 1;
        if state.writes % SWEEP_EVERY == 0 {
            self.sweep(&mut state);
        }
    }

    /// Drop every customer whose newest entry is outside the retention
    /// window behind the newest entry seen overall.
    pub fn evict_idle(&self) {
        let mut state = self.state.lock();
        self.sweep(&mut state);
    }

    fn sweep(&self, state: &mut LogState) {
        let Some(latest) = state.latest else { return };
        let cutoff = latest - self.retention;
        let before = state.queues.len();
        state
            .queues
            .retain(|_, q| q.back().is_some_and(|(ts, _)| *ts > cutoff));
        log::debug!("velocity log swept: {} of {before} customers kept", state.queues.len());
    }

    pub fn customer_count(&self) -> usize {
        self.state.lock().queues.len()
    }

    pub fn clear(&self) {
        *self.state.lock() = LogState::default();
    }
}

impl VelocitySource for TransactionLog {
    fn count_recent(
        &self,
        customer_id: &str,
        as_of: DateTime<Utc>,
        window: Duration,
    ) -> AmlResult<usize> {
        let start = as_of - window;
        let state = self.state.lock();
        Ok(state
            .queues
            .get(customer_id)
            .map(|q| q.iter().filter(|(ts, _)| *ts > start && *ts <= as_of).count())
            .unwrap_or(0))
    }
}
