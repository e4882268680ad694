use crate::model::Ms;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;
/// One year.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * 24 * 3_600_000;

pub const MAX_SLOTS_PER_BOOKING: usize = 256;
pub const MAX_SLOTS_TOTAL: usize = 1_000_000;
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;
