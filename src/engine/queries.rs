use crate::limits::*;
use crate::model::*;

use super::availability::{clamp_to, free_within, merge_touching};
use super::gate::authorize_owner;
use super::{Engine, EngineError};

impl Engine {
    /// A booking with its slots. Only its owner may read it.
    pub async fn get_booking(
        &self,
        booking_id: BookingId,
        owner: PrincipalId,
    ) -> Result<Booking, EngineError> {
        let store = self.store.read().await;
        let record = store
            .booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        authorize_owner(record, owner)?;
        store
            .hydrate(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))
    }

    /// Every booking owned by `owner`, oldest first, each with its slots.
    pub async fn list_bookings_of(&self, owner: PrincipalId) -> Vec<Booking> {
        let store = self.store.read().await;
        store
            .bookings_of(&owner)
            .into_iter()
            .filter_map(|record| store.hydrate(&record.id))
            .collect()
    }

    /// Occupied time inside `window`, merged and clamped. Carries no identities,
    /// so it is safe to show to any caller.
    pub async fn busy(&self, window: Span) -> Result<Vec<Span>, EngineError> {
        validate_window(&window)?;
        let store = self.store.read().await;
        let spans = clamp_to(&window, store.overlapping(&window).map(|(span, _)| *span));
        Ok(merge_touching(&spans))
    }

    /// Unreserved time inside `window`.
    pub async fn free(&self, window: Span) -> Result<Vec<Span>, EngineError> {
        let busy = self.busy(window).await?;
        Ok(free_within(&window, &busy))
    }

    /// All committed slots across every booking, in timeline order.
    /// Administrative view; it is not filtered by owner.
    pub async fn all_slots(&self) -> Vec<Slot> {
        self.store.read().await.iter().cloned().collect()
    }

    pub async fn slot_count(&self) -> usize {
        self.store.read().await.len()
    }
}

fn validate_window(window: &Span) -> Result<(), EngineError> {
    if !window.is_well_formed() {
        return Err(EngineError::Validation("query window end must be after its start"));
    }
    if window.start < MIN_VALID_TIMESTAMP_MS || window.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::Validation("timestamp out of range"));
    }
    if window.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::Validation("query window too wide"));
    }
    Ok(())
}
