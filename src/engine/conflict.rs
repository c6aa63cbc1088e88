use chrono::NaiveDate;

use crate::model::*;

use super::EngineError;

/// First booking on `date` whose interval overlaps `span`.
/// Canceled bookings are skipped when `exclude_canceled` is set.
pub fn find_overlap<'a>(
    rs: &'a RoomState,
    date: NaiveDate,
    span: &Span,
    exclude_canceled: bool,
) -> Option<&'a Booking> {
    rs.on_date(date)
        // sorted by start: nothing past `span.end` can overlap
        .take_while(|b| b.span.start < span.end)
        .filter(|b| !exclude_canceled || b.is_active())
        .find(|b| b.span.overlaps(span))
}

/// True if `span` on `date` overlaps an existing booking. Touching
/// endpoints (`end == start`) do not conflict.
pub fn has_conflict(rs: &RoomState, date: NaiveDate, span: &Span, exclude_canceled: bool) -> bool {
    find_overlap(rs, date, span, exclude_canceled).is_some()
}

/// Admission check for a new booking by `email`.
///
/// Active bookings on one date are pairwise disjoint, so the first overlap
/// decides: the same user holding the exact slot is a `Duplicate`, anything
/// else is a `Conflict`.
pub(crate) fn check_no_conflict(
    rs: &RoomState,
    date: NaiveDate,
    span: &Span,
    email: &str,
) -> Result<(), EngineError> {
    match find_overlap(rs, date, span, true) {
        None => Ok(()),
        Some(existing) if existing.is_same_slot_for(date, span, email) => {
            Err(EngineError::Duplicate(existing.id))
        }
        Some(existing) => Err(EngineError::Conflict(existing.id)),
    }
}
