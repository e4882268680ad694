use ulid::Ulid;

use crate::model::{BookingId, SlotId, Span};

/// Why a candidate span is not admissible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    /// Two candidates submitted together overlap each other.
    WithinBatch { first: Span, second: Span },
    /// A candidate overlaps a committed slot, whoever owns it.
    AgainstExisting { candidate: Span, existing: SlotId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    NotOwner { booking: BookingId },
    SlotNotInBooking { slot: SlotId, booking: BookingId },
}

#[derive(Debug)]
pub enum EngineError {
    Validation(&'static str),
    Conflict(ConflictError),
    Forbidden(AccessDenied),
    NotFound(Ulid),
    /// The atomic unit could not be acquired or made durable. Safe to retry.
    Transient(String),
}

/// Coarse classification for boundary collaborators mapping errors to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    ConflictWithinBatch,
    ConflictAgainstExisting,
    Authorization,
    NotFound,
    TransientStore,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Conflict(ConflictError::WithinBatch { .. }) => ErrorKind::ConflictWithinBatch,
            EngineError::Conflict(ConflictError::AgainstExisting { .. }) => {
                ErrorKind::ConflictAgainstExisting
            }
            EngineError::Forbidden(_) => ErrorKind::Authorization,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Transient(_) => ErrorKind::TransientStore,
        }
    }

    /// Only transient failures may be retried with unchanged input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }

    pub(crate) fn metric_label(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "validation",
            ErrorKind::ConflictWithinBatch => "conflict_within_batch",
            ErrorKind::ConflictAgainstExisting => "conflict_against_existing",
            ErrorKind::Authorization => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::TransientStore => "transient",
        }
    }
}

impl From<ConflictError> for EngineError {
    fn from(e: ConflictError) -> Self {
        EngineError::Conflict(e)
    }
}

impl From<AccessDenied> for EngineError {
    fn from(e: AccessDenied) -> Self {
        EngineError::Forbidden(e)
    }
}

impl std::fmt::Display for ConflictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictError::WithinBatch { first, second } => write!(
                f,
                "slots within the same booking overlap: [{}, {}) and [{}, {})",
                first.start, first.end, second.start, second.end
            ),
            ConflictError::AgainstExisting { candidate, existing } => write!(
                f,
                "time slot [{}, {}) conflicts with existing slot {existing}",
                candidate.start, candidate.end
            ),
        }
    }
}

impl std::fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessDenied::NotOwner { booking } => {
                write!(f, "caller does not own booking {booking}")
            }
            AccessDenied::SlotNotInBooking { slot, booking } => {
                write!(f, "slot {slot} does not belong to booking {booking}")
            }
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid input: {msg}"),
            EngineError::Conflict(e) => write!(f, "conflict: {e}"),
            EngineError::Forbidden(e) => write!(f, "forbidden: {e}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Transient(msg) => write!(f, "transient store error: {msg}"),
        }
    }
}

impl std::error::Error for ConflictError {}
impl std::error::Error for AccessDenied {}
impl std::error::Error for EngineError {}
