use serde::Serialize;
use tracing::info;

use super::domain::{
    Appointment, AppointmentId, Audience, Booking, BookingId, BookingStatus, NewAppointment,
    Subject,
};
use super::error::EngineError;
use super::repository::{
    AppointmentBook, AppointmentRepository, BalanceLedger, ProgressionRepository,
};
use super::service::{next_appointment_id, next_booking_id, TrainingEngine};
use super::waitlist;

/// Authoritative state after a booking request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingOutcome {
    pub booking: Booking,
    pub confirmed_count: usize,
    pub capacity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waitlist_position: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancellationOutcome {
    pub cancelled: Booking,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted: Option<Booking>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityChange {
    pub appointment: Appointment,
    pub confirmed_count: usize,
    pub promoted: Vec<Booking>,
}

impl<A, P, B> TrainingEngine<A, P, B>
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    pub fn create_appointment(&self, request: NewAppointment) -> Result<Appointment, EngineError> {
        if request.capacity == 0 {
            return Err(EngineError::InvalidCapacity);
        }
        if let Some(price) = request.price_cents.filter(|price| *price < 0) {
            return Err(EngineError::InvalidAmount(price));
        }
        if let Audience::Levels { level_ids } = &request.audience {
            if let Some(unknown) = level_ids
                .iter()
                .find(|id| self.catalog.level(id).is_none())
            {
                return Err(EngineError::UnknownLevel(unknown.clone()));
            }
        }

        let appointment = Appointment {
            id: next_appointment_id(),
            capacity: request.capacity,
            trainer_id: request.trainer_id,
            audience: request.audience,
            source_id: request.source_id,
            price_cents: request.price_cents,
            start_time: request.start_time,
        };
        self.appointments
            .insert(AppointmentBook::new(appointment.clone()))?;

        info!(
            appointment = %appointment.id,
            capacity = appointment.capacity,
            "appointment created"
        );
        Ok(appointment)
    }

    pub fn appointments(&self) -> Result<Vec<Appointment>, EngineError> {
        Ok(self.appointments.list()?)
    }

    /// Appointment and every booking, oldest first.
    pub fn roster(&self, id: &AppointmentId) -> Result<AppointmentBook, EngineError> {
        let mut book = self
            .appointments
            .fetch(id)?
            .ok_or_else(|| EngineError::UnknownAppointment(id.clone()))?;
        book.bookings
            .sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(book)
    }

    /// Claim a seat, or a waitlist place when the appointment is full.
    pub fn book(
        &self,
        appointment_id: &AppointmentId,
        subject: Subject,
    ) -> Result<BookingOutcome, EngineError> {
        let level = self.current_level(&subject)?;

        let outcome = self.with_book(appointment_id, |book| {
            if !book.appointment.audience.admits(level.as_ref()) {
                return Err(EngineError::LevelNotPermitted {
                    appointment_id: appointment_id.clone(),
                    subject: subject.clone(),
                });
            }
            if book.active_booking_for(&subject).is_some() {
                return Err(EngineError::AlreadyBooked {
                    appointment_id: appointment_id.clone(),
                    subject: subject.clone(),
                });
            }

            let created_at = self.clock.now();
            let status = if book.has_free_seat() {
                BookingStatus::Confirmed
            } else {
                BookingStatus::Waitlist
            };
            let booking = Booking {
                id: next_booking_id(),
                appointment_id: appointment_id.clone(),
                customer_id: subject.customer_id.clone(),
                dog_id: subject.dog_id.clone(),
                status,
                attended: false,
                is_billed: false,
                created_at,
            };
            book.bookings.push(booking.clone());

            Ok(BookingOutcome {
                waitlist_position: book.waitlist_position(&booking.id),
                confirmed_count: book.confirmed_count(),
                capacity: book.appointment.capacity,
                booking,
            })
        })?;

        info!(
            appointment = %appointment_id,
            booking = %outcome.booking.id,
            subject = %subject,
            status = outcome.booking.status.label(),
            "booking recorded"
        );
        Ok(outcome)
    }

    /// Cancel a booking; a freed confirmed seat goes to the oldest waitlisted
    /// booking within the same atomic unit.
    pub fn cancel(&self, booking_id: &BookingId) -> Result<CancellationOutcome, EngineError> {
        let appointment_id = self.appointment_of(booking_id)?;

        let outcome = self.with_book(&appointment_id, |book| {
            let booking = book
                .booking_mut(booking_id)
                .ok_or_else(|| EngineError::UnknownBooking(booking_id.clone()))?;

            let previous = booking.status;
            if previous == BookingStatus::Cancelled {
                return Err(EngineError::AlreadyCancelled(booking_id.clone()));
            }
            booking.status = BookingStatus::Cancelled;
            let cancelled = booking.clone();

            let promoted = if previous == BookingStatus::Confirmed {
                waitlist::promote_next(book)
            } else {
                None
            };

            Ok(CancellationOutcome {
                cancelled,
                promoted,
            })
        })?;

        match &outcome.promoted {
            Some(promoted) => info!(
                appointment = %appointment_id,
                cancelled = %booking_id,
                promoted = %promoted.id,
                "booking cancelled, waitlist promoted"
            ),
            None => info!(
                appointment = %appointment_id,
                cancelled = %booking_id,
                "booking cancelled"
            ),
        }
        Ok(outcome)
    }

    pub fn promote_next(
        &self,
        appointment_id: &AppointmentId,
    ) -> Result<Option<BookingId>, EngineError> {
        let promoted = self.with_book(appointment_id, |book| Ok(waitlist::promote_next(book)))?;
        if let Some(booking) = &promoted {
            info!(appointment = %appointment_id, promoted = %booking.id, "waitlist promoted");
        }
        Ok(promoted.map(|booking| booking.id))
    }

    /// Raise or lower capacity. Raising fills the new seats from the waitlist;
    /// lowering below the confirmed count is refused.
    pub fn set_capacity(
        &self,
        appointment_id: &AppointmentId,
        capacity: u32,
    ) -> Result<CapacityChange, EngineError> {
        if capacity == 0 {
            return Err(EngineError::InvalidCapacity);
        }

        let change = self.with_book(appointment_id, |book| {
            let confirmed = book.confirmed_count();
            if (capacity as usize) < confirmed {
                return Err(EngineError::CapacityBelowConfirmed {
                    requested: capacity,
                    confirmed,
                });
            }
            book.appointment.capacity = capacity;
            let promoted = waitlist::fill_vacancies(book);
            Ok(CapacityChange {
                appointment: book.appointment.clone(),
                confirmed_count: book.confirmed_count(),
                promoted,
            })
        })?;

        info!(
            appointment = %appointment_id,
            capacity,
            promoted = change.promoted.len(),
            "capacity updated"
        );
        Ok(change)
    }

    /// Flip the attended flag. Billing is never triggered from here.
    pub fn toggle_attendance(&self, booking_id: &BookingId) -> Result<Booking, EngineError> {
        let appointment_id = self.appointment_of(booking_id)?;
        let booking = self.with_book(&appointment_id, |book| {
            let booking = book
                .booking_mut(booking_id)
                .ok_or_else(|| EngineError::UnknownBooking(booking_id.clone()))?;
            booking.attended = !booking.attended;
            Ok(booking.clone())
        })?;

        info!(booking = %booking_id, attended = booking.attended, "attendance toggled");
        Ok(booking)
    }
}
