use std::collections::HashMap;

use ulid::Ulid;

use crate::model::*;

/// Storage-layer invariant violations. The engine maps these onto `EngineError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Malformed(Span),
    UnknownBooking(BookingId),
    UnknownSlot(SlotId),
    DuplicateId(Ulid),
    /// Exclusion constraint: the span would overlap another committed slot.
    Exclusion { candidate: Span, existing: SlotId },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Malformed(span) => {
                write!(f, "malformed span [{}, {})", span.start, span.end)
            }
            StoreError::UnknownBooking(id) => write!(f, "unknown booking {id}"),
            StoreError::UnknownSlot(id) => write!(f, "unknown slot {id}"),
            StoreError::DuplicateId(id) => write!(f, "duplicate id {id}"),
            StoreError::Exclusion { candidate, existing } => write!(
                f,
                "span [{}, {}) overlaps slot {existing}",
                candidate.start, candidate.end
            ),
        }
    }
}

impl std::error::Error for StoreError {}

/// Committed bookings and slots on the single shared timeline.
///
/// The store enforces its own invariants on every mutation: spans are well
/// formed, ids are unique and point at live records, and no two slots overlap.
/// The conflict checker runs before mutations to reject early with a precise
/// error; the exclusion check here is what makes the invariant hold regardless.
#[derive(Debug, Default)]
pub struct SlotStore {
    bookings: HashMap<BookingId, BookingRecord>,
    members: HashMap<BookingId, Vec<SlotId>>,
    slots: HashMap<SlotId, Slot>,
    /// `(span, id)` of every slot, sorted by `span.start`. Slots never overlap, so
    /// this is sorted by `span.end` as well.
    timeline: Vec<(Span, SlotId)>,
}

impl SlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn booking(&self, id: &BookingId) -> Option<&BookingRecord> {
        self.bookings.get(id)
    }

    pub fn slot(&self, id: &SlotId) -> Option<&Slot> {
        self.slots.get(id)
    }

    /// Bookings owned by `owner`, oldest first.
    pub fn bookings_of(&self, owner: &PrincipalId) -> Vec<&BookingRecord> {
        let mut out: Vec<&BookingRecord> = self
            .bookings
            .values()
            .filter(|b| b.owner == *owner)
            .collect();
        out.sort_by_key(|b| (b.created_at, b.id));
        out
    }

    /// Number of slots owned by a booking. Zero for unknown bookings.
    pub fn slot_count_of(&self, booking: &BookingId) -> usize {
        self.members.get(booking).map_or(0, Vec::len)
    }

    /// Slots owned by a booking, sorted by start. Empty for unknown bookings.
    pub fn list_slots(&self, booking: &BookingId) -> Vec<Slot> {
        let mut out: Vec<Slot> = self
            .members
            .get(booking)
            .into_iter()
            .flatten()
            .filter_map(|id| self.slots.get(id).cloned())
            .collect();
        out.sort_by_key(|s| s.span.start);
        out
    }

    pub fn hydrate(&self, booking: &BookingId) -> Option<Booking> {
        let record = self.bookings.get(booking)?;
        Some(Booking {
            id: record.id,
            owner: record.owner,
            created_at: record.created_at,
            slots: self.list_slots(booking),
        })
    }

    /// Committed slots overlapping `query`, in timeline order.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &(Span, SlotId)> {
        let (left, right) = if query.is_well_formed() {
            let right = self.timeline.partition_point(|(s, _)| s.start < query.end);
            let left = self.timeline[..right].partition_point(|(s, _)| s.end <= query.start);
            (left, right)
        } else {
            (0, 0)
        };
        self.timeline[left..right].iter()
    }

    /// First committed slot other than `excluding` that overlaps `candidate`.
    pub fn first_overlapping(&self, candidate: &Span, excluding: Option<SlotId>) -> Option<SlotId> {
        self.overlapping(candidate)
            .find(|(_, id)| Some(*id) != excluding)
            .map(|(_, id)| *id)
    }

    pub fn exists_overlapping(&self, candidate: &Span, excluding: Option<SlotId>) -> bool {
        self.first_overlapping(candidate, excluding).is_some()
    }

    // ── Mutations ────────────────────────────────────────────

    pub fn insert_booking(&mut self, record: BookingRecord) -> Result<(), StoreError> {
        if self.bookings.contains_key(&record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }
        self.members.insert(record.id, Vec::new());
        self.bookings.insert(record.id, record);
        Ok(())
    }

    pub fn insert(
        &mut self,
        booking: BookingId,
        id: SlotId,
        span: Span,
        at: Ms,
    ) -> Result<Slot, StoreError> {
        let slot = Slot {
            id,
            booking_id: booking,
            span,
            created_at: at,
            updated_at: at,
        };
        self.insert_slot(slot.clone())?;
        Ok(slot)
    }

    /// Insert a fully-formed slot, keeping its timestamps.
    pub fn insert_slot(&mut self, slot: Slot) -> Result<(), StoreError> {
        if !slot.span.is_well_formed() {
            return Err(StoreError::Malformed(slot.span));
        }
        if !self.bookings.contains_key(&slot.booking_id) {
            return Err(StoreError::UnknownBooking(slot.booking_id));
        }
        if self.slots.contains_key(&slot.id) {
            return Err(StoreError::DuplicateId(slot.id));
        }
        if let Some(existing) = self.first_overlapping(&slot.span, None) {
            return Err(StoreError::Exclusion { candidate: slot.span, existing });
        }
        self.timeline_insert(slot.span, slot.id);
        self.members.entry(slot.booking_id).or_default().push(slot.id);
        self.slots.insert(slot.id, slot);
        Ok(())
    }

    /// Move a slot to `span` in place. Identity and owning booking are unchanged.
    pub fn replace_interval(&mut self, id: SlotId, span: Span, at: Ms) -> Result<Slot, StoreError> {
        if !span.is_well_formed() {
            return Err(StoreError::Malformed(span));
        }
        let old_span = self.slots.get(&id).ok_or(StoreError::UnknownSlot(id))?.span;
        if let Some(existing) = self.first_overlapping(&span, Some(id)) {
            return Err(StoreError::Exclusion { candidate: span, existing });
        }
        self.timeline_remove(&old_span, id);
        self.timeline_insert(span, id);
        let slot = self.slots.get_mut(&id).ok_or(StoreError::UnknownSlot(id))?;
        slot.span = span;
        slot.updated_at = at;
        Ok(slot.clone())
    }

    pub fn remove_slot(&mut self, id: &SlotId) -> Option<Slot> {
        let slot = self.slots.remove(id)?;
        self.timeline_remove(&slot.span, slot.id);
        if let Some(ids) = self.members.get_mut(&slot.booking_id) {
            ids.retain(|s| s != id);
        }
        Some(slot)
    }

    /// Remove a booking and every slot it owns.
    pub fn remove_booking(&mut self, id: &BookingId) -> Option<(BookingRecord, Vec<Slot>)> {
        let record = self.bookings.remove(id)?;
        let ids = self.members.remove(id).unwrap_or_default();
        let mut removed = Vec::with_capacity(ids.len());
        for slot_id in ids {
            if let Some(slot) = self.slots.remove(&slot_id) {
                self.timeline_remove(&slot.span, slot.id);
                removed.push(slot);
            }
        }
        Some((record, removed))
    }

    fn timeline_insert(&mut self, span: Span, id: SlotId) {
        let pos = self.timeline.partition_point(|(s, _)| s.start < span.start);
        self.timeline.insert(pos, (span, id));
    }

    fn timeline_remove(&mut self, span: &Span, id: SlotId) {
        // Non-overlapping slots have distinct starts, so the position is exact.
        let pos = self.timeline.partition_point(|(s, _)| s.start < span.start);
        if self.timeline.get(pos).is_some_and(|(_, sid)| *sid == id) {
            self.timeline.remove(pos);
        }
    }

    // ── Journal replay and compaction ────────────────────────

    /// Apply a committed event. Used on replay; the event was admissible when it
    /// was written, so any refusal here means the journal is inconsistent.
    pub fn apply(&mut self, event: &Event) -> Result<(), StoreError> {
        match event {
            Event::BookingCreated { id, owner, created_at, slots } => {
                self.insert_booking(BookingRecord {
                    id: *id,
                    owner: *owner,
                    created_at: *created_at,
                })?;
                for s in slots {
                    self.insert_slot(Slot {
                        id: s.id,
                        booking_id: *id,
                        span: s.span,
                        created_at: s.created_at,
                        updated_at: s.updated_at,
                    })?;
                }
                Ok(())
            }
            Event::SlotAdded { id, booking_id, span, at } => {
                self.insert(*booking_id, *id, *span, *at).map(|_| ())
            }
            Event::SlotUpdated { id, span, at, .. } => {
                self.replace_interval(*id, *span, *at).map(|_| ())
            }
            Event::BookingDeleted { id } => self
                .remove_booking(id)
                .map(|_| ())
                .ok_or(StoreError::UnknownBooking(*id)),
        }
    }

    /// Minimal event list that recreates the current state.
    pub fn snapshot(&self) -> Vec<Event> {
        let mut records: Vec<&BookingRecord> = self.bookings.values().collect();
        records.sort_by_key(|b| (b.created_at, b.id));
        records
            .into_iter()
            .map(|b| Event::BookingCreated {
                id: b.id,
                owner: b.owner,
                created_at: b.created_at,
                slots: self.list_slots(&b.id).iter().map(SlotRecord::from).collect(),
            })
            .collect()
    }

    /// Every committed slot, in timeline order.
    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.timeline.iter().filter_map(|(_, id)| self.slots.get(id))
    }
}
