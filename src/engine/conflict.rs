use crate::limits::*;
use crate::model::*;

use super::store::SlotStore;
use super::{ConflictError, EngineError};

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Shape checks on a caller-supplied span. `now` is set when slots must lie in
/// the future.
pub(crate) fn validate_span(span: &Span, now: Option<Ms>) -> Result<(), EngineError> {
    if !span.is_well_formed() {
        return Err(EngineError::Validation("slot end must be after its start"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::Validation("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::Validation("slot too long"));
    }
    if let Some(now) = now
        && span.start <= now {
            return Err(EngineError::Validation("slot must start in the future"));
        }
    Ok(())
}

pub(crate) fn validate_batch(candidates: &[Span], now: Option<Ms>) -> Result<(), EngineError> {
    if candidates.is_empty() {
        return Err(EngineError::Validation("a booking needs at least one slot"));
    }
    if candidates.len() > MAX_SLOTS_PER_BOOKING {
        return Err(EngineError::Validation("too many slots in one booking"));
    }
    candidates.iter().try_for_each(|span| validate_span(span, now))
}

/// Pairwise check of a batch submitted together. Reports the first pair found.
pub fn check_internal(candidates: &[Span]) -> Result<(), ConflictError> {
    for (i, first) in candidates.iter().enumerate() {
        for second in &candidates[i + 1..] {
            if first.overlaps(second) {
                return Err(ConflictError::WithinBatch {
                    first: *first,
                    second: *second,
                });
            }
        }
    }
    Ok(())
}

/// Check every candidate against committed slots of every booking and owner.
pub fn check_against_store(
    store: &SlotStore,
    candidates: &[Span],
    excluding: Option<SlotId>,
) -> Result<(), ConflictError> {
    for candidate in candidates {
        if let Some(existing) = store.first_overlapping(candidate, excluding) {
            return Err(ConflictError::AgainstExisting {
                candidate: *candidate,
                existing,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const T0: Ms = 4_102_444_800_000; // 2100-01-01T00:00:00Z
    const H: Ms = 3_600_000;

    #[test]
    fn internal_back_to_back_is_fine() {
        let batch = [Span::new(T0, T0 + H), Span::new(T0 + H, T0 + 2 * H)];
        assert!(check_internal(&batch).is_ok());
    }

    #[test]
    fn internal_overlap_reports_pair() {
        let a = Span::new(T0, T0 + H);
        let b = Span::new(T0 + 3 * H, T0 + 4 * H);
        let c = Span::new(T0 + H / 2, T0 + H + H / 2);
        assert_eq!(
            check_internal(&[a, b, c]),
            Err(ConflictError::WithinBatch { first: a, second: c })
        );
    }

    #[test]
    fn internal_single_candidate() {
        assert!(check_internal(&[Span::new(T0, T0 + H)]).is_ok());
        assert!(check_internal(&[]).is_ok());
    }

    #[test]
    fn against_store_is_owner_agnostic() {
        let mut store = SlotStore::new();
        let booking = Ulid::new();
        store
            .insert_booking(BookingRecord { id: booking, owner: Ulid::new(), created_at: 0 })
            .unwrap();
        let sid = Ulid::new();
        store.insert(booking, sid, Span::new(T0, T0 + H), 0).unwrap();

        let candidate = Span::new(T0 + H / 2, T0 + 2 * H);
        assert_eq!(
            check_against_store(&store, &[Span::new(T0 + 5 * H, T0 + 6 * H), candidate], None),
            Err(ConflictError::AgainstExisting { candidate, existing: sid })
        );
        assert!(check_against_store(&store, &[candidate], Some(sid)).is_ok());
    }

    #[test]
    fn validate_span_rejects_bad_shapes() {
        assert!(matches!(
            validate_span(&Span::new(T0, T0), None),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            validate_span(&Span::new(T0 + H, T0), None),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            validate_span(&Span::new(0, 10), None),
            Err(EngineError::Validation("timestamp out of range"))
        ));
        assert!(matches!(
            validate_span(&Span::new(T0, T0 + 2 * MAX_SPAN_DURATION_MS), None),
            Err(EngineError::Validation("slot too long"))
        ));
        assert!(validate_span(&Span::new(T0, T0 + H), None).is_ok());
    }

    #[test]
    fn validate_span_future_start() {
        let span = Span::new(T0, T0 + H);
        assert!(validate_span(&span, Some(T0 - 1)).is_ok());
        assert!(matches!(
            validate_span(&span, Some(T0)),
            Err(EngineError::Validation("slot must start in the future"))
        ));
    }

    #[test]
    fn validate_batch_rejects_empty_and_oversized() {
        assert!(matches!(validate_batch(&[], None), Err(EngineError::Validation(_))));
        let big: Vec<Span> = (0..=MAX_SLOTS_PER_BOOKING as Ms)
            .map(|i| Span::new(T0 + i * H, T0 + i * H + 1))
            .collect();
        assert!(matches!(
            validate_batch(&big, None),
            Err(EngineError::Validation("too many slots in one booking"))
        ));
    }
}
