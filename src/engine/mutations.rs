use std::time::Instant;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_against_store, check_internal, now_ms, validate_batch, validate_span};
use super::gate::{authorize_owner, authorize_slot};
use super::txn::Txn;
use super::{Engine, EngineError, Phase};

impl Engine {
    /// Create a booking owned by `owner` holding one slot per candidate.
    /// All slots commit together or none do.
    pub async fn create_booking(
        &self,
        owner: PrincipalId,
        candidates: Vec<Span>,
    ) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self.create_booking_unit(owner, &candidates).await;
        observability::record_operation("create_booking", started, &result);
        result
    }

    async fn create_booking_unit(
        &self,
        owner: PrincipalId,
        candidates: &[Span],
    ) -> Result<Booking, EngineError> {
        validate_batch(candidates, self.future_cutoff())?;
        check_internal(candidates)?;

        let mut txn = self.begin("create_booking").await?;
        ensure_capacity(&txn, candidates.len())?;
        txn.advance(Phase::CheckingConflicts);
        check_against_store(txn.store(), candidates, None)?;

        let now = now_ms();
        let record = BookingRecord {
            id: Ulid::new(),
            owner,
            created_at: now,
        };
        txn.insert_booking(record.clone())?;
        let mut slots = Vec::with_capacity(candidates.len());
        for span in candidates {
            slots.push(txn.insert(record.id, *span, now)?);
        }

        let event = Event::BookingCreated {
            id: record.id,
            owner,
            created_at: now,
            slots: slots.iter().map(SlotRecord::from).collect(),
        };
        self.commit(txn, event, owner).await?;

        slots.sort_by_key(|s| s.span.start);
        tracing::info!(booking = %record.id, %owner, slots = slots.len(), "booking created");
        Ok(Booking {
            id: record.id,
            owner,
            created_at: now,
            slots,
        })
    }

    /// Add one slot to an existing booking owned by `owner`.
    pub async fn add_slot(
        &self,
        booking_id: BookingId,
        owner: PrincipalId,
        candidate: Span,
    ) -> Result<Slot, EngineError> {
        let started = Instant::now();
        let result = self.add_slot_unit(booking_id, owner, candidate).await;
        observability::record_operation("add_slot", started, &result);
        result
    }

    async fn add_slot_unit(
        &self,
        booking_id: BookingId,
        owner: PrincipalId,
        candidate: Span,
    ) -> Result<Slot, EngineError> {
        let mut txn = self.begin("add_slot").await?;
        let record = txn
            .store()
            .booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        authorize_owner(record, owner)?;
        validate_span(&candidate, self.future_cutoff())?;
        if txn.store().slot_count_of(&booking_id) >= MAX_SLOTS_PER_BOOKING {
            return Err(EngineError::Validation("too many slots in one booking"));
        }
        ensure_capacity(&txn, 1)?;

        txn.advance(Phase::CheckingConflicts);
        check_against_store(txn.store(), &[candidate], None)?;

        let slot = txn.insert(booking_id, candidate, now_ms())?;
        let event = Event::SlotAdded {
            id: slot.id,
            booking_id,
            span: slot.span,
            at: slot.created_at,
        };
        self.commit(txn, event, owner).await?;
        tracing::info!(booking = %booking_id, slot = %slot.id, "slot added");
        Ok(slot)
    }

    /// Move a slot to `new_span`, keeping its identity and booking.
    pub async fn update_slot(
        &self,
        booking_id: BookingId,
        owner: PrincipalId,
        slot_id: SlotId,
        new_span: Span,
    ) -> Result<Slot, EngineError> {
        let started = Instant::now();
        let result = self.update_slot_unit(booking_id, owner, slot_id, new_span).await;
        observability::record_operation("update_slot", started, &result);
        result
    }

    async fn update_slot_unit(
        &self,
        booking_id: BookingId,
        owner: PrincipalId,
        slot_id: SlotId,
        new_span: Span,
    ) -> Result<Slot, EngineError> {
        let mut txn = self.begin("update_slot").await?;
        let record = txn
            .store()
            .booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        authorize_owner(record, owner)?;
        let slot = txn
            .store()
            .slot(&slot_id)
            .ok_or(EngineError::NotFound(slot_id))?;
        authorize_slot(slot, booking_id)?;
        validate_span(&new_span, self.future_cutoff())?;

        txn.advance(Phase::CheckingConflicts);
        check_against_store(txn.store(), &[new_span], Some(slot_id))?;

        let updated = txn.replace_interval(slot_id, new_span, now_ms())?;
        let event = Event::SlotUpdated {
            id: slot_id,
            booking_id,
            span: new_span,
            at: updated.updated_at,
        };
        self.commit(txn, event, owner).await?;
        tracing::info!(booking = %booking_id, slot = %slot_id, "slot updated");
        Ok(updated)
    }

    /// Delete a booking and every slot it owns.
    pub async fn delete_booking(
        &self,
        booking_id: BookingId,
        owner: PrincipalId,
    ) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = self.delete_booking_unit(booking_id, owner).await;
        observability::record_operation("delete_booking", started, &result);
        result
    }

    async fn delete_booking_unit(
        &self,
        booking_id: BookingId,
        owner: PrincipalId,
    ) -> Result<(), EngineError> {
        let mut txn = self.begin("delete_booking").await?;
        let record = txn
            .store()
            .booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        authorize_owner(record, owner)?;

        let removed = txn.remove_booking(booking_id)?;
        self.commit(txn, Event::BookingDeleted { id: booking_id }, owner)
            .await?;
        tracing::info!(booking = %booking_id, slots = removed.len(), "booking deleted");
        Ok(())
    }
}

fn ensure_capacity(txn: &Txn, additional: usize) -> Result<(), EngineError> {
    if txn.store().len() + additional > MAX_SLOTS_TOTAL {
        return Err(EngineError::Validation("slot store is full"));
    }
    Ok(())
}
