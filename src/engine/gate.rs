//! Ownership checks for booking-level reads and mutations.
//!
//! Kept apart from conflict checking: conflicts are decided on the shared
//! timeline without regard to owners, while these rules only decide who may
//! touch a given booking.

use crate::model::*;

use super::AccessDenied;

pub(crate) fn authorize_owner(booking: &BookingRecord, principal: PrincipalId) -> Result<(), AccessDenied> {
    if booking.owner != principal {
        return Err(AccessDenied::NotOwner { booking: booking.id });
    }
    Ok(())
}

pub(crate) fn authorize_slot(slot: &Slot, booking: BookingId) -> Result<(), AccessDenied> {
    if slot.booking_id != booking {
        return Err(AccessDenied::SlotNotInBooking { slot: slot.id, booking });
    }
    Ok(())
}
