//! Play-count store
//!
//! Per-clip play counters used as selection weights. `increment` is the only
//! mutator and persists the whole mapping before returning, so a subsequent
//! `load` always reflects it. Increments from concurrent sessions are
//! serialized by the store's mutex, which is held across update and persist.
//!
//! Persistence scope is a configuration choice: [`SqliteBackend`] survives
//! restarts, [`MemoryBackend`] resets with the process.

use crate::catalog::{Catalog, ClipId};
use crate::db;
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Clip id → number of starts
pub type PlayCounts = BTreeMap<ClipId, u64>;

/// Fixed storage identifier of the persisted mapping
pub const PLAY_COUNTS_KEY: &str = "dreams_play_counts";

/// Whole-mapping load/save collaborator
#[async_trait]
pub trait PlayCountBackend: Send + Sync {
    /// Read the stored mapping; `Ok(None)` when nothing was stored yet
    async fn load(&self) -> Result<Option<PlayCounts>>;

    /// Overwrite the stored mapping
    async fn persist(&self, counts: &PlayCounts) -> Result<()>;

    fn describe(&self) -> &'static str;
}

/// Play counts stored as a JSON document in the settings table
pub struct SqliteBackend {
    db: Pool<Sqlite>,
}

impl SqliteBackend {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PlayCountBackend for SqliteBackend {
    async fn load(&self) -> Result<Option<PlayCounts>> {
        let raw = db::get_setting::<String>(&self.db, PLAY_COUNTS_KEY)
            .await
            .map_err(|e| Error::Persistence(format!("Failed to read play counts: {}", e)))?;

        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| Error::Persistence(format!("Corrupt play counts document: {}", e))),
            None => Ok(None),
        }
    }

    async fn persist(&self, counts: &PlayCounts) -> Result<()> {
        let json = serde_json::to_string(counts)
            .map_err(|e| Error::Persistence(format!("Failed to encode play counts: {}", e)))?;

        db::set_setting(&self.db, PLAY_COUNTS_KEY, json)
            .await
            .map_err(|e| Error::Persistence(format!("Failed to write play counts: {}", e)))
    }

    fn describe(&self) -> &'static str {
        "sqlite"
    }
}

/// Process-local backend; counts reset when the process restarts
#[derive(Default)]
pub struct MemoryBackend {
    stored: std::sync::Mutex<Option<PlayCounts>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlayCountBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<PlayCounts>> {
        let stored = self
            .stored
            .lock()
            .map_err(|_| Error::Persistence("Memory backend poisoned".to_string()))?;
        Ok(stored.clone())
    }

    async fn persist(&self, counts: &PlayCounts) -> Result<()> {
        let mut stored = self
            .stored
            .lock()
            .map_err(|_| Error::Persistence("Memory backend poisoned".to_string()))?;
        *stored = Some(counts.clone());
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "memory"
    }
}

/// Shared play-count store
pub struct PlayCountStore {
    counts: Mutex<PlayCounts>,
    known: BTreeSet<ClipId>,
    backend: Arc<dyn PlayCountBackend>,
    /// False while the stored mapping could not be read; selection then
    /// weighs uniformly and writes wait for a successful re-read
    available: AtomicBool,
}

impl PlayCountStore {
    /// Open the store, loading persisted counts
    ///
    /// A load failure is logged and leaves the store zero-initialized and
    /// marked unavailable instead of failing startup.
    pub async fn open(catalog: &Catalog, backend: Arc<dyn PlayCountBackend>) -> Self {
        let known: BTreeSet<ClipId> = catalog.ids().collect();
        let store = Self {
            counts: Mutex::new(normalize(&known, None)),
            known,
            backend,
            available: AtomicBool::new(false),
        };

        match store.load().await {
            Ok(counts) => {
                let total: u64 = counts.values().sum();
                info!(
                    "Play counts loaded from {} backend ({} clips, {} total plays)",
                    store.backend.describe(),
                    counts.len(),
                    total
                );
            }
            Err(e) => {
                warn!("Play counts unavailable, using uniform weighting: {}", e);
            }
        }

        store
    }

    /// Store backed by a fresh [`MemoryBackend`]
    pub async fn in_memory(catalog: &Catalog) -> Self {
        Self::open(catalog, Arc::new(MemoryBackend::new())).await
    }

    /// Re-read the persisted mapping, normalized to the catalog ids
    pub async fn load(&self) -> Result<PlayCounts> {
        let mut counts = self.counts.lock().await;
        match self.backend.load().await {
            Ok(stored) => {
                *counts = normalize(&self.known, stored);
                self.available.store(true, Ordering::SeqCst);
                Ok(counts.clone())
            }
            Err(e) => {
                self.available.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Overwrite the whole mapping (normalized to the catalog ids)
    pub async fn persist(&self, mapping: &PlayCounts) -> Result<()> {
        let mut counts = self.counts.lock().await;
        let normalized = normalize(&self.known, Some(mapping.clone()));
        self.backend.persist(&normalized).await?;
        *counts = normalized;
        self.available.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Current count for a clip (0 for unknown ids)
    pub async fn get(&self, id: ClipId) -> u64 {
        self.counts.lock().await.get(&id).copied().unwrap_or(0)
    }

    /// Record one clip start and persist the mapping
    ///
    /// The in-memory count is incremented even when persisting fails; the
    /// persistence failure is returned to the caller. While the store is
    /// unavailable the stored mapping is re-read first and the starts
    /// counted since are added on top, so stored history is never replaced
    /// by counts that started from zero.
    pub async fn increment(&self, id: ClipId) -> Result<u64> {
        if !self.known.contains(&id) {
            return Err(Error::NotFound(format!("Clip {} is not in the catalog", id)));
        }

        let mut counts = self.counts.lock().await;
        *counts.entry(id).or_insert(0) += 1;

        if !self.is_available() {
            self.recover(&mut counts).await?;
        }

        let new_count = counts.get(&id).copied().unwrap_or(0);
        self.backend.persist(&counts).await?;
        debug!("Play count for clip {} is now {}", id, new_count);
        Ok(new_count)
    }

    /// Merge the stored mapping under the counts gathered while unavailable
    async fn recover(&self, counts: &mut PlayCounts) -> Result<()> {
        let stored = self.backend.load().await?;
        for (id, stored_count) in normalize(&self.known, stored) {
            *counts.entry(id).or_insert(0) += stored_count;
        }
        self.available.store(true, Ordering::SeqCst);
        info!(
            "Play counts readable again from {} backend ({} total plays)",
            self.backend.describe(),
            counts.values().sum::<u64>()
        );
        Ok(())
    }

    pub async fn snapshot(&self) -> PlayCounts {
        self.counts.lock().await.clone()
    }

    /// Counts to weigh selection with; `None` means weigh uniformly
    pub async fn selection_counts(&self) -> Option<PlayCounts> {
        if self.is_available() {
            Some(self.snapshot().await)
        } else {
            None
        }
    }

    pub async fn total(&self) -> u64 {
        self.counts.lock().await.values().sum()
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.describe()
    }
}

/// Keep exactly the catalog ids, zero-filling missing entries
fn normalize(known: &BTreeSet<ClipId>, stored: Option<PlayCounts>) -> PlayCounts {
    let stored = stored.unwrap_or_default();
    known
        .iter()
        .map(|id| (*id, stored.get(id).copied().unwrap_or(0)))
        .collect()
}
