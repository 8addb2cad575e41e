use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Achievement, Appointment, AppointmentId, Booking, BookingId, BookingStatus, CustomerId,
    LevelId, Subject,
};

/// An appointment together with every booking ever made against it.
///
/// This is the unit of mutual exclusion for capacity checks and promotions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentBook {
    pub appointment: Appointment,
    pub bookings: Vec<Booking>,
}

impl AppointmentBook {
    pub fn new(appointment: Appointment) -> Self {
        Self {
            appointment,
            bookings: Vec::new(),
        }
    }

    pub fn confirmed_count(&self) -> usize {
        self.count(BookingStatus::Confirmed)
    }

    pub fn waitlist_count(&self) -> usize {
        self.count(BookingStatus::Waitlist)
    }

    fn count(&self, status: BookingStatus) -> usize {
        self.bookings
            .iter()
            .filter(|booking| booking.status == status)
            .count()
    }

    pub fn has_free_seat(&self) -> bool {
        self.confirmed_count() < self.appointment.capacity as usize
    }

    pub fn booking(&self, id: &BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|booking| &booking.id == id)
    }

    pub fn booking_mut(&mut self, id: &BookingId) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|booking| &booking.id == id)
    }

    pub fn active_booking_for(&self, subject: &Subject) -> Option<&Booking> {
        self.bookings
            .iter()
            .find(|booking| booking.status.is_active() && booking.belongs_to(subject))
    }

    /// 1-based position of a waitlisted booking in promotion order.
    pub fn waitlist_position(&self, id: &BookingId) -> Option<usize> {
        let mut waiting: Vec<&Booking> = self
            .bookings
            .iter()
            .filter(|booking| booking.status == BookingStatus::Waitlist)
            .collect();
        waiting.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        waiting
            .iter()
            .position(|booking| &booking.id == id)
            .map(|index| index + 1)
    }
}

/// Storage for appointment books. `transact` runs `work` under the
/// appointment's lock and commits its changes only when it returns `Ok`.
pub trait AppointmentRepository: Send + Sync {
    fn insert(&self, book: AppointmentBook) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &AppointmentId) -> Result<Option<AppointmentBook>, RepositoryError>;
    fn locate(&self, booking: &BookingId) -> Result<Option<AppointmentId>, RepositoryError>;
    fn list(&self) -> Result<Vec<Appointment>, RepositoryError>;
    fn transact<T, E, F>(&self, id: &AppointmentId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut AppointmentBook) -> Result<T, E>,
        E: From<RepositoryError>;
}

/// Achievements and level standing for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectLedger {
    pub subject: Subject,
    /// `None` until the first level-up; the subject then sits at the entry level.
    pub current_level: Option<LevelId>,
    pub licensed_at: Option<DateTime<Utc>>,
    pub achievements: Vec<Achievement>,
}

impl SubjectLedger {
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            current_level: None,
            licensed_at: None,
            achievements: Vec::new(),
        }
    }

    pub fn unconsumed(&self) -> impl Iterator<Item = &Achievement> {
        self.achievements
            .iter()
            .filter(|achievement| !achievement.is_consumed)
    }
}

/// Storage for subject ledgers. Unknown subjects read as an empty ledger.
pub trait ProgressionRepository: Send + Sync {
    fn snapshot(&self, subject: &Subject) -> Result<SubjectLedger, RepositoryError>;
    fn transact<T, E, F>(&self, subject: &Subject, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut SubjectLedger) -> Result<T, E>,
        E: From<RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Customer balance collaborator. Amounts are in cents.
pub trait BalanceLedger: Send + Sync {
    fn balance(&self, customer: &CustomerId) -> Result<i64, BalanceError>;
    /// Returns the running total after the debit; never goes negative.
    fn debit(&self, customer: &CustomerId, amount_cents: i64, reference: &str)
        -> Result<i64, BalanceError>;
    fn credit(&self, customer: &CustomerId, amount_cents: i64, reference: &str)
        -> Result<i64, BalanceError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BalanceError {
    #[error("customer {customer} has {available_cents} cents, {required_cents} required")]
    Insufficient {
        customer: CustomerId,
        required_cents: i64,
        available_cents: i64,
    },
    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("balance ledger unavailable: {0}")]
    Unavailable(String),
}
