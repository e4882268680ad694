use tokio::sync::OwnedRwLockWriteGuard;
use ulid::Ulid;

use crate::model::*;

use super::store::{SlotStore, StoreError};
use super::{ConflictError, EngineError};

/// Lifecycle of one atomic unit. `Aborted` is reachable from every phase
/// before `Committed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validating,
    CheckingConflicts,
    Persisting,
    Committed,
    Aborted,
}

/// Inverse of a staged store mutation.
#[derive(Debug)]
enum Undo {
    SlotInserted(SlotId),
    SlotReplaced(Slot),
    BookingInserted(BookingId),
    BookingRemoved(BookingRecord, Vec<Slot>),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Exclusion { candidate, existing } => {
                EngineError::Conflict(ConflictError::AgainstExisting { candidate, existing })
            }
            StoreError::Malformed(_) => EngineError::Validation("slot end must be after its start"),
            StoreError::UnknownBooking(id) | StoreError::UnknownSlot(id) => EngineError::NotFound(id),
            StoreError::DuplicateId(id) => EngineError::Transient(format!("id collision on {id}")),
        }
    }
}

/// An atomic unit over the slot store.
///
/// Holds the store's write guard for its whole life, so no reader or writer can
/// observe staged mutations. Mutations are applied to the store immediately and
/// recorded in an undo log; `commit` forgets the log, anything else (an error
/// return, an explicit `abort`, a dropped future) replays it in reverse.
pub(super) struct Txn {
    op: &'static str,
    store: OwnedRwLockWriteGuard<SlotStore>,
    undo: Vec<Undo>,
    phase: Phase,
}

impl Txn {
    pub(super) fn new(op: &'static str, store: OwnedRwLockWriteGuard<SlotStore>) -> Self {
        Self {
            op,
            store,
            undo: Vec::new(),
            phase: Phase::Validating,
        }
    }

    pub(super) fn op(&self) -> &'static str {
        self.op
    }

    pub(super) fn store(&self) -> &SlotStore {
        &self.store
    }

    #[cfg(test)]
    pub(super) fn phase(&self) -> Phase {
        self.phase
    }

    pub(super) fn advance(&mut self, phase: Phase) {
        tracing::trace!(op = self.op, from = ?self.phase, to = ?phase, "txn phase");
        self.phase = phase;
    }

    pub(super) fn insert_booking(&mut self, record: BookingRecord) -> Result<(), EngineError> {
        let id = record.id;
        self.store.insert_booking(record)?;
        self.undo.push(Undo::BookingInserted(id));
        Ok(())
    }

    pub(super) fn insert(&mut self, booking: BookingId, span: Span, at: Ms) -> Result<Slot, EngineError> {
        let slot = self.store.insert(booking, Ulid::new(), span, at)?;
        self.undo.push(Undo::SlotInserted(slot.id));
        Ok(slot)
    }

    pub(super) fn replace_interval(&mut self, id: SlotId, span: Span, at: Ms) -> Result<Slot, EngineError> {
        let previous = self.store.slot(&id).cloned().ok_or(EngineError::NotFound(id))?;
        let slot = self.store.replace_interval(id, span, at)?;
        self.undo.push(Undo::SlotReplaced(previous));
        Ok(slot)
    }

    pub(super) fn remove_booking(&mut self, id: BookingId) -> Result<Vec<Slot>, EngineError> {
        let (record, slots) = self.store.remove_booking(&id).ok_or(EngineError::NotFound(id))?;
        self.undo.push(Undo::BookingRemoved(record, slots.clone()));
        Ok(slots)
    }

    /// Make staged mutations permanent and release the store.
    pub(super) fn commit(mut self) {
        self.undo.clear();
        self.advance(Phase::Committed);
    }

    /// Roll back every staged mutation. Idempotent.
    pub(super) fn abort(&mut self) {
        if self.phase == Phase::Committed || self.phase == Phase::Aborted {
            return;
        }
        let staged = self.undo.len();
        while let Some(undo) = self.undo.pop() {
            let restored = match undo {
                Undo::SlotInserted(id) => {
                    self.store.remove_slot(&id);
                    Ok(())
                }
                Undo::SlotReplaced(prev) => self
                    .store
                    .replace_interval(prev.id, prev.span, prev.updated_at)
                    .map(|_| ()),
                Undo::BookingInserted(id) => {
                    self.store.remove_booking(&id);
                    Ok(())
                }
                Undo::BookingRemoved(record, slots) => {
                    self.store.insert_booking(record).and_then(|()| {
                        slots
                            .into_iter()
                            .try_for_each(|slot| self.store.insert_slot(slot))
                    })
                }
            };
            if let Err(e) = restored {
                // The undo log mirrors mutations that succeeded under this same
                // guard, so restoring them cannot collide with anything.
                tracing::error!(op = self.op, "rollback step failed: {e}");
            }
        }
        tracing::debug!(op = self.op, phase = ?self.phase, staged, "txn aborted");
        self.phase = Phase::Aborted;
    }
}

impl Drop for Txn {
    fn drop(&mut self) {
        self.abort();
    }
}
