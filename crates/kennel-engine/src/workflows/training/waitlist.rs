use super::domain::{Booking, BookingStatus};
use super::repository::AppointmentBook;

/// Confirm the oldest waitlisted booking if a seat is free.
///
/// Callers must hold the appointment's atomic unit; this is the only place a
/// booking moves from waitlist to confirmed.
pub(crate) fn promote_next(book: &mut AppointmentBook) -> Option<Booking> {
    if !book.has_free_seat() {
        return None;
    }

    let next = book
        .bookings
        .iter_mut()
        .filter(|booking| booking.status == BookingStatus::Waitlist)
        .min_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)))?;

    next.status = BookingStatus::Confirmed;
    Some(next.clone())
}

/// Promote in FIFO order until the appointment is full or the waitlist is empty.
pub(crate) fn fill_vacancies(book: &mut AppointmentBook) -> Vec<Booking> {
    let mut promoted = Vec::new();
    while let Some(booking) = promote_next(book) {
        promoted.push(booking);
    }
    promoted
}
