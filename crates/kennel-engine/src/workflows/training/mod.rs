//! Appointment capacity, waitlist promotion, billing, and level progression.

mod billing;
mod capacity;
pub mod catalog;
pub mod domain;
mod error;
pub mod memory;
pub mod progression;
pub mod repository;
pub mod router;
mod service;
mod settings;
mod waitlist;

#[cfg(test)]
mod tests;

pub use billing::{BillingEntry, BillingLine, Receipt};
pub use capacity::{BookingOutcome, CancellationOutcome, CapacityChange};
pub use catalog::{demo_catalog, CatalogError, RequirementCatalog};
pub use domain::{
    Achievement, AchievementId, Appointment, AppointmentId, Audience, Booking, BookingId,
    BookingStatus, Clock, CustomerId, DogId, Level, LevelId, NewAppointment, Requirement,
    RequirementId, RequirementKind, SourceId, Subject, SystemClock, TrainerId, TrainingType,
};
pub use error::EngineError;
pub use memory::{BalanceEntry, InMemoryAppointments, InMemoryBalances, InMemoryProgression};
pub use progression::{
    LevelUpOutcome, LicenseGrant, ProgressReport, ProgressionEvaluator, RequirementProgress,
    RequirementShortfall,
};
pub use repository::{
    AppointmentBook, AppointmentRepository, BalanceError, BalanceLedger, ProgressionRepository,
    RepositoryError, SubjectLedger,
};
pub use router::training_router;
pub use service::TrainingEngine;
pub use settings::TenantSettings;
