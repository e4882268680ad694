mod availability;
mod conflict;
mod error;
mod gate;
mod mutations;
mod queries;
mod store;
mod txn;

pub use availability::{free_within, merge_touching};
pub use conflict::{check_against_store, check_internal};
pub use error::{AccessDenied, ConflictError, EngineError, ErrorKind};
pub use store::{SlotStore, StoreError};
pub use txn::Phase;

use std::io;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, Mutex, RwLock};

use crate::config::EngineConfig;
use crate::journal::Journal;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;

use conflict::now_ms;
use txn::Txn;

/// The reservation engine for one shared timeline.
///
/// Owns all committed state. Writers go through an atomic unit (`Txn`) that holds
/// the store's write guard across conflict checking, mutation and the journal
/// append; readers take the read guard and only ever see committed state.
pub struct Engine {
    store: Arc<RwLock<SlotStore>>,
    journal: Mutex<Journal>,
    pub notify: Arc<NotifyHub>,
    config: EngineConfig,
}

impl Engine {
    /// Open the journal at `config.journal_path` and rebuild state from it.
    pub fn new(config: EngineConfig, notify: Arc<NotifyHub>) -> io::Result<Self> {
        if let Some(dir) = config.journal_path.parent()
            && !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        let (journal, events) = Journal::open(&config.journal_path)?;

        let mut store = SlotStore::new();
        for (n, event) in events.iter().enumerate() {
            store.apply(event).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("journal record {n} does not apply: {e}"),
                )
            })?;
        }
        tracing::info!(
            journal = %config.journal_path.display(),
            events = events.len(),
            bookings = store.booking_count(),
            slots = store.len(),
            "slot store replayed"
        );
        metrics::gauge!(observability::SLOTS_COMMITTED).set(store.len() as f64);

        Ok(Self {
            store: Arc::new(RwLock::new(store)),
            journal: Mutex::new(journal),
            notify,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receive every event committed against bookings owned by `owner`.
    pub fn subscribe(&self, owner: PrincipalId) -> broadcast::Receiver<Event> {
        self.notify.subscribe(owner)
    }

    /// Cutoff for the future-start rule, when enabled.
    fn future_cutoff(&self) -> Option<Ms> {
        self.config.require_future_start.then(now_ms)
    }

    /// Start an atomic unit. Waits at most `lock_timeout` for the store.
    async fn begin(&self, op: &'static str) -> Result<Txn, EngineError> {
        let guard = tokio::time::timeout(self.config.lock_timeout, self.store.clone().write_owned())
            .await
            .map_err(|_| {
                tracing::warn!(op, "timed out waiting for the slot store");
                EngineError::Transient("timed out waiting for the slot store".into())
            })?;
        Ok(Txn::new(op, guard))
    }

    /// Journal the unit's event, then make its staged mutations permanent.
    ///
    /// There is no await between the append and `Txn::commit`, so a cancelled
    /// caller either leaves nothing behind or a fully committed unit.
    async fn commit(
        &self,
        mut txn: Txn,
        event: Event,
        owner: PrincipalId,
    ) -> Result<(), EngineError> {
        txn.advance(Phase::Persisting);
        let mut journal = self.journal.lock().await;
        let started = Instant::now();
        if let Err(e) = journal.append(&event) {
            tracing::warn!(op = txn.op(), "journal append failed: {e}");
            txn.abort();
            return Err(EngineError::Transient(format!("journal append failed: {e}")));
        }
        metrics::histogram!(observability::JOURNAL_APPEND_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        metrics::gauge!(observability::SLOTS_COMMITTED).set(txn.store().len() as f64);
        drop(journal);
        txn.commit();
        self.notify.send(owner, &event);
        Ok(())
    }

    /// Rewrite the journal as the minimal event list for the current state.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let store = self.store.read().await;
        let events = store.snapshot();
        let mut journal = self.journal.lock().await;
        journal
            .compact(&events)
            .map_err(|e| EngineError::Transient(format!("journal compaction failed: {e}")))?;
        tracing::info!(
            journal = %journal.path().display(),
            events = events.len(),
            "journal compacted"
        );
        Ok(())
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        self.journal.lock().await.appends_since_compact()
    }
}
