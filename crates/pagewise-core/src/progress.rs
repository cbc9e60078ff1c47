//! Ingestion progress: stages, a shared progress store, and a forward-only
//! tracker.
//!
//! The store is written by the ingestion pipeline and polled by readers
//! (CLI, HTTP). Every write replaces the whole entry for a document; entries
//! are never mutated in place. Completed entries expire after a retention
//! window.
//!
//! ```text
//! uploading(0) → analyzing(0–40) → chunking(40–70) → storing(70–95) → complete(100)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{RwLock, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RETENTION_SECS: i64 = 300;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    Uploading,
    Analyzing,
    Chunking,
    Storing,
    Complete,
}

impl ProgressStage {
    /// Percentage band covered by the stage.
    pub fn range(self) -> (u8, u8) {
        match self {
            ProgressStage::Uploading => (0, 0),
            ProgressStage::Analyzing => (0, 40),
            ProgressStage::Chunking => (40, 70),
            ProgressStage::Storing => (70, 95),
            ProgressStage::Complete => (100, 100),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStage::Uploading => "uploading",
            ProgressStage::Analyzing => "analyzing",
            ProgressStage::Chunking => "chunking",
            ProgressStage::Storing => "storing",
            ProgressStage::Complete => "complete",
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One document's progress entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressState {
    pub stage: ProgressStage,
    pub progress: u8,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message: String,
}

impl ProgressState {
    pub fn snapshot(&self, now: DateTime<Utc>) -> ProgressSnapshot {
        let elapsed_ms = (now - self.started_at).num_milliseconds().max(0);
        let p = i64::from(self.progress);
        let remaining = match p {
            0 => None,
            p if p >= 100 => Some(0),
            _ => Some(elapsed_ms * (100 - p) / p / 1000),
        };
        ProgressSnapshot {
            stage: self.stage,
            progress: self.progress,
            elapsed_seconds: (elapsed_ms / 1000) as u64,
            estimated_remaining_seconds: remaining.map(|r| r as u64),
            message: self.message.clone(),
        }
    }
}

/// What a polling reader sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub stage: ProgressStage,
    pub progress: u8,
    pub elapsed_seconds: u64,
    pub estimated_remaining_seconds: Option<u64>,
    pub message: String,
}

/// Shared progress map keyed by document id.
pub trait ProgressStore: Send + Sync {
    fn get(&self, document_id: &str) -> Option<ProgressState>;
    /// Replace the whole entry.
    fn set(&self, document_id: &str, state: ProgressState);
    /// Store `state` unless the document already has an in-flight entry.
    /// Returns whether it was stored.
    fn claim(&self, document_id: &str, state: ProgressState) -> bool;
    fn evict(&self, document_id: &str);
    /// Drop completed entries whose retention has passed as of `now`.
    /// Returns how many were removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> usize;
}

/// In-process [`ProgressStore`]. Lost on restart.
///
/// Expired entries are dropped on read, on every write, and by
/// [`ProgressStore::purge_expired`].
pub struct InMemoryProgressStore {
    entries: RwLock<HashMap<String, ProgressState>>,
    retention: Duration,
}

impl InMemoryProgressStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retention,
        }
    }

    fn expired(&self, state: &ProgressState, now: DateTime<Utc>) -> bool {
        state.stage == ProgressStage::Complete && now - state.updated_at > self.retention
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ProgressState>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Read an entry as of `now`, dropping it if its retention has passed.
    pub fn get_at(&self, document_id: &str, now: DateTime<Utc>) -> Option<ProgressState> {
        let state = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.get(document_id).cloned()?
        };
        if !self.expired(&state, now) {
            return Some(state);
        }
        // The entry may have been replaced since the read.
        let mut entries = self.write();
        let current = entries.get(document_id)?.clone();
        if !self.expired(&current, now) {
            return Some(current);
        }
        entries.remove(document_id);
        None
    }

    fn set_at(&self, document_id: &str, state: ProgressState, now: DateTime<Utc>) {
        let mut entries = self.write();
        entries.retain(|_, s| !self.expired(s, now));
        entries.insert(document_id.to_string(), state);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryProgressStore {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_RETENTION_SECS))
    }
}

impl ProgressStore for InMemoryProgressStore {
    fn get(&self, document_id: &str) -> Option<ProgressState> {
        self.get_at(document_id, Utc::now())
    }

    fn set(&self, document_id: &str, state: ProgressState) {
        self.set_at(document_id, state, Utc::now());
    }

    fn claim(&self, document_id: &str, state: ProgressState) -> bool {
        let now = Utc::now();
        let mut entries = self.write();
        entries.retain(|_, s| !self.expired(s, now));
        if entries
            .get(document_id)
            .is_some_and(|s| s.stage != ProgressStage::Complete)
        {
            return false;
        }
        entries.insert(document_id.to_string(), state);
        true
    }

    fn evict(&self, document_id: &str) {
        self.write().remove(document_id);
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, s| !self.expired(s, now));
        before - entries.len()
    }
}

/// Receives every accepted progress update (e.g. a CLI renderer).
pub trait ProgressObserver: Send + Sync {
    fn observe(&self, document_id: &str, snapshot: &ProgressSnapshot);
}

/// Drives one document through the stages, forward only.
pub struct ProgressTracker<'a> {
    document_id: String,
    store: &'a dyn ProgressStore,
    observer: Option<&'a dyn ProgressObserver>,
    state: ProgressState,
}

impl<'a> ProgressTracker<'a> {
    fn uploading(
        document_id: &str,
        store: &'a dyn ProgressStore,
        observer: Option<&'a dyn ProgressObserver>,
    ) -> Self {
        let now = Utc::now();
        Self {
            document_id: document_id.to_string(),
            store,
            observer,
            state: ProgressState {
                stage: ProgressStage::Uploading,
                progress: 0,
                started_at: now,
                updated_at: now,
                message: "Upload received".to_string(),
            },
        }
    }

    /// Record `uploading(0)` for the document.
    pub fn start(
        document_id: &str,
        store: &'a dyn ProgressStore,
        observer: Option<&'a dyn ProgressObserver>,
    ) -> Self {
        let tracker = Self::uploading(document_id, store, observer);
        tracker.publish();
        tracker
    }

    /// Like [`ProgressTracker::start`], but returns `None` and leaves the
    /// store untouched while another ingestion of the document is in flight.
    pub fn try_start(
        document_id: &str,
        store: &'a dyn ProgressStore,
        observer: Option<&'a dyn ProgressObserver>,
    ) -> Option<Self> {
        let tracker = Self::uploading(document_id, store, observer);
        if !store.claim(document_id, tracker.state.clone()) {
            return None;
        }
        tracker.notify();
        Some(tracker)
    }

    /// Continue an in-flight entry (e.g. one recorded when an upload was
    /// accepted), or start fresh when there is none or it already completed.
    pub fn resume(
        document_id: &str,
        store: &'a dyn ProgressStore,
        observer: Option<&'a dyn ProgressObserver>,
    ) -> Self {
        match store.get(document_id) {
            Some(state) if state.stage != ProgressStage::Complete => Self {
                document_id: document_id.to_string(),
                store,
                observer,
                state,
            },
            _ => Self::start(document_id, store, observer),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    fn publish(&self) {
        self.store.set(&self.document_id, self.state.clone());
        self.notify();
    }

    fn notify(&self) {
        if let Some(observer) = self.observer {
            observer.observe(&self.document_id, &self.state.snapshot(Utc::now()));
        }
    }

    /// Move to `stage` at `progress` (clamped to the stage's band).
    ///
    /// Returns `false` and changes nothing if the update would move
    /// backwards or the tracker is already complete.
    pub fn advance(
        &mut self,
        stage: ProgressStage,
        progress: u8,
        message: impl Into<String>,
    ) -> bool {
        if self.state.stage == ProgressStage::Complete || stage < self.state.stage {
            return false;
        }
        let (lo, hi) = stage.range();
        let progress = progress.clamp(lo, hi);
        if progress < self.state.progress {
            return false;
        }
        self.state = ProgressState {
            stage,
            progress,
            started_at: self.state.started_at,
            updated_at: Utc::now(),
            message: message.into(),
        };
        self.publish();
        true
    }

    /// Advance to `done / total` of the way through `stage`'s band.
    pub fn step(
        &mut self,
        stage: ProgressStage,
        done: usize,
        total: usize,
        message: impl Into<String>,
    ) -> bool {
        let (lo, hi) = stage.range();
        let span = f64::from(hi - lo);
        let fraction = if total == 0 {
            1.0
        } else {
            (done as f64 / total as f64).min(1.0)
        };
        let progress = lo + (span * fraction).round() as u8;
        self.advance(stage, progress, message)
    }

    pub fn complete(&mut self, message: impl Into<String>) -> bool {
        self.advance(ProgressStage::Complete, 100, message)
    }

    /// Drop the entry after a failed ingestion.
    pub fn abort(self) {
        self.store.evict(&self.document_id);
    }
}
