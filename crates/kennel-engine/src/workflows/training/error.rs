use axum::http::StatusCode;

use super::domain::{AppointmentId, BookingId, CustomerId, LevelId, Subject};
use super::progression::RequirementShortfall;
use super::repository::{BalanceError, RepositoryError};

/// Business outcomes and infrastructure failures raised by the engine.
///
/// A full appointment is not an error: the booking lands on the waitlist.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("{subject} already holds an active booking for appointment {appointment_id}")]
    AlreadyBooked {
        appointment_id: AppointmentId,
        subject: Subject,
    },
    #[error("booking {0} is already cancelled")]
    AlreadyCancelled(BookingId),
    #[error("booking {0} has already been billed")]
    AlreadyBilled(BookingId),
    #[error("booking {0} is not confirmed")]
    NotConfirmed(BookingId),
    #[error("customer {customer_id} has {available_cents} cents, {required_cents} required")]
    InsufficientBalance {
        customer_id: CustomerId,
        required_cents: i64,
        available_cents: i64,
    },
    #[error("requirements for level {level_id} are not met")]
    RequirementsNotMet {
        level_id: LevelId,
        shortfalls: Vec<RequirementShortfall>,
    },
    #[error("cannot move from level {from} to level {to}")]
    InvalidLevelTransition { from: LevelId, to: LevelId },
    #[error("{subject} is not at a level admitted to appointment {appointment_id}")]
    LevelNotPermitted {
        appointment_id: AppointmentId,
        subject: Subject,
    },
    #[error("{subject} is at level {level_id}, which does not grant a license")]
    LicenseUnavailable { subject: Subject, level_id: LevelId },
    #[error("{0} is already licensed")]
    AlreadyLicensed(Subject),
    #[error("capacity {requested} is below the {confirmed} confirmed bookings")]
    CapacityBelowConfirmed { requested: u32, confirmed: usize },
    #[error("capacity must be at least 1")]
    InvalidCapacity,
    #[error("unknown appointment {0}")]
    UnknownAppointment(AppointmentId),
    #[error("unknown booking {0}")]
    UnknownBooking(BookingId),
    #[error("unknown level {0}")]
    UnknownLevel(LevelId),
    #[error("the catalog defines no levels")]
    EmptyCatalog,
    #[error("invalid amount {0}")]
    InvalidAmount(i64),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("balance ledger unavailable: {0}")]
    LedgerUnavailable(String),
    #[error("booking {booking_id} kept a charge of {charged_cents} cents: {reason}")]
    RefundFailed {
        booking_id: BookingId,
        charged_cents: i64,
        reason: String,
    },
}

impl From<BalanceError> for EngineError {
    fn from(value: BalanceError) -> Self {
        match value {
            BalanceError::Insufficient {
                customer,
                required_cents,
                available_cents,
            } => Self::InsufficientBalance {
                customer_id: customer,
                required_cents,
                available_cents,
            },
            BalanceError::InvalidAmount(amount) => Self::InvalidAmount(amount),
            BalanceError::Unavailable(reason) => Self::LedgerUnavailable(reason),
        }
    }
}

impl EngineError {
    /// Stable machine-readable code for API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::AlreadyBooked { .. } => "already_booked",
            EngineError::AlreadyCancelled(_) => "already_cancelled",
            EngineError::AlreadyBilled(_) => "already_billed",
            EngineError::NotConfirmed(_) => "not_confirmed",
            EngineError::InsufficientBalance { .. } => "insufficient_balance",
            EngineError::RequirementsNotMet { .. } => "requirements_not_met",
            EngineError::InvalidLevelTransition { .. } => "invalid_level_transition",
            EngineError::LevelNotPermitted { .. } => "level_not_permitted",
            EngineError::LicenseUnavailable { .. } => "license_unavailable",
            EngineError::AlreadyLicensed(_) => "already_licensed",
            EngineError::CapacityBelowConfirmed { .. } => "capacity_below_confirmed",
            EngineError::InvalidCapacity => "invalid_capacity",
            EngineError::UnknownAppointment(_) => "unknown_appointment",
            EngineError::UnknownBooking(_) => "unknown_booking",
            EngineError::UnknownLevel(_) => "unknown_level",
            EngineError::EmptyCatalog => "empty_catalog",
            EngineError::InvalidAmount(_) => "invalid_amount",
            EngineError::Repository(_) | EngineError::LedgerUnavailable(_) => "unavailable",
            EngineError::RefundFailed { .. } => "refund_failed",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::UnknownAppointment(_)
            | EngineError::UnknownBooking(_)
            | EngineError::UnknownLevel(_) => StatusCode::NOT_FOUND,
            EngineError::AlreadyBooked { .. }
            | EngineError::AlreadyCancelled(_)
            | EngineError::AlreadyBilled(_)
            | EngineError::AlreadyLicensed(_)
            | EngineError::CapacityBelowConfirmed { .. } => StatusCode::CONFLICT,
            EngineError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            EngineError::NotConfirmed(_)
            | EngineError::RequirementsNotMet { .. }
            | EngineError::InvalidLevelTransition { .. }
            | EngineError::LevelNotPermitted { .. }
            | EngineError::LicenseUnavailable { .. }
            | EngineError::InvalidCapacity
            | EngineError::InvalidAmount(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            EngineError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            EngineError::EmptyCatalog
            | EngineError::Repository(_)
            | EngineError::LedgerUnavailable(_)
            | EngineError::RefundFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
