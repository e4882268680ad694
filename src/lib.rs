//! Exclusive reservations of time on one shared resource.
//!
//! Bookings group one or more slots; no two committed slots anywhere on the
//! timeline overlap, whoever owns them. See [`engine::Engine`] for the operations.

pub mod compactor;
pub mod config;
pub mod engine;
pub mod journal;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;

pub use config::EngineConfig;
pub use engine::{AccessDenied, ConflictError, Engine, EngineError, ErrorKind};
pub use model::{Booking, BookingId, Ms, PrincipalId, Slot, SlotId, Span};
