use crate::domain::booking::{Booking, BookingWindow, SubjectId, SubjectType};

/// Pending requests hold the slot as firmly as accepted ones.
pub fn blocks_availability(booking: &Booking) -> bool {
    !booking.status().is_terminal()
}

/// Bookings of the same subject whose window overlaps `window` and that still
/// hold their slot.
pub fn conflicts<'a>(
    existing: &'a [Booking],
    subject_type: SubjectType,
    subject_id: &SubjectId,
    window: &BookingWindow,
) -> Vec<&'a Booking> {
    existing
        .iter()
        .filter(|booking| {
            booking.subject_type() == subject_type
                && booking.subject_id() == subject_id
                && blocks_availability(booking)
                && booking.window().overlaps(window)
        })
        .collect()
}

pub fn is_available(
    existing: &[Booking],
    subject_type: SubjectType,
    subject_id: &SubjectId,
    window: &BookingWindow,
) -> bool {
    conflicts(existing, subject_type, subject_id, window).is_empty()
}
