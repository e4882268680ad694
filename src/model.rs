use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, UTC. The only time type.
pub type Ms = i64;

pub type BookingId = Ulid;
pub type SlotId = Ulid;
/// Opaque identity of an authenticated caller, resolved outside the engine.
pub type PrincipalId = Ulid;

/// Half-open interval `[start, end)`.
///
/// Spans that merely touch (`a.end == b.start`) do not overlap, so back-to-back
/// reservations are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    /// Builds a span without checking it. Candidate spans coming from callers go
    /// through `is_well_formed` before they reach the store.
    pub fn new(start: Ms, end: Ms) -> Self {
        Self { start, end }
    }

    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }

    /// Saturates instead of overflowing on extreme bounds.
    pub fn duration_ms(&self) -> Ms {
        self.end.saturating_sub(self.start)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// A committed reservation. Owned by exactly one booking for its whole life.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub booking_id: BookingId,
    pub span: Span,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// Booking header as kept by the store. Slots live in the store's timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRecord {
    pub id: BookingId,
    pub owner: PrincipalId,
    pub created_at: Ms,
}

/// A booking hydrated with its slots, sorted by start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub owner: PrincipalId,
    pub created_at: Ms,
    pub slots: Vec<Slot>,
}

/// Slot as carried inside a `BookingCreated` journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub id: SlotId,
    pub span: Span,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl From<&Slot> for SlotRecord {
    fn from(slot: &Slot) -> Self {
        Self {
            id: slot.id,
            span: slot.span,
            created_at: slot.created_at,
            updated_at: slot.updated_at,
        }
    }
}

/// Journal record format. One event per committed atomic unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated {
        id: BookingId,
        owner: PrincipalId,
        created_at: Ms,
        slots: Vec<SlotRecord>,
    },
    SlotAdded {
        id: SlotId,
        booking_id: BookingId,
        span: Span,
        at: Ms,
    },
    SlotUpdated {
        id: SlotId,
        booking_id: BookingId,
        span: Span,
        at: Ms,
    },
    BookingDeleted {
        id: BookingId,
    },
}
