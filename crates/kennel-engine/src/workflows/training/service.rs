use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::catalog::RequirementCatalog;
use super::domain::{
    Achievement, AchievementId, AppointmentId, BookingId, Clock, CustomerId, Level, LevelId,
    SourceId, Subject, SystemClock,
};
use super::error::EngineError;
use super::progression::{ProgressReport, ProgressionEvaluator};
use super::repository::{
    AppointmentBook, AppointmentRepository, BalanceLedger, ProgressionRepository,
    RepositoryError, SubjectLedger,
};

/// Engine composing the catalog, appointment books, subject ledgers, and the
/// customer balance collaborator.
pub struct TrainingEngine<A, P, B> {
    pub(crate) catalog: Arc<RequirementCatalog>,
    pub(crate) appointments: Arc<A>,
    pub(crate) progression: Arc<P>,
    pub(crate) balances: Arc<B>,
    pub(crate) clock: Arc<dyn Clock>,
}

static APPOINTMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static BOOKING_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static ACHIEVEMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_appointment_id() -> AppointmentId {
    AppointmentId(sequence_id("appt", &APPOINTMENT_SEQUENCE))
}

pub(crate) fn next_booking_id() -> BookingId {
    BookingId(sequence_id("bk", &BOOKING_SEQUENCE))
}

pub(crate) fn next_achievement_id() -> AchievementId {
    AchievementId(sequence_id("ach", &ACHIEVEMENT_SEQUENCE))
}

fn sequence_id(prefix: &str, sequence: &AtomicU64) -> String {
    format_sequence_id(prefix, sequence.fetch_add(1, Ordering::Relaxed))
}

// Padded to the width of u64::MAX so lexical order matches creation order for
// waitlist and allocation tie-breaks.
pub(crate) fn format_sequence_id(prefix: &str, value: u64) -> String {
    format!("{prefix}-{value:020}")
}

impl<A, P, B> TrainingEngine<A, P, B>
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    pub fn new(
        catalog: Arc<RequirementCatalog>,
        appointments: Arc<A>,
        progression: Arc<P>,
        balances: Arc<B>,
    ) -> Self {
        Self {
            catalog,
            appointments,
            progression,
            balances,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn catalog(&self) -> &RequirementCatalog {
        &self.catalog
    }

    pub fn evaluator(&self) -> ProgressionEvaluator<'_> {
        ProgressionEvaluator::new(&self.catalog)
    }

    /// Run `work` as one atomic unit over the appointment's booking set.
    pub(crate) fn with_book<T, F>(&self, id: &AppointmentId, work: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut AppointmentBook) -> Result<T, EngineError>,
    {
        self.appointments
            .transact(id, work)
            .map_err(|err| match err {
                EngineError::Repository(RepositoryError::NotFound) => {
                    EngineError::UnknownAppointment(id.clone())
                }
                other => other,
            })
    }

    pub(crate) fn appointment_of(&self, booking: &BookingId) -> Result<AppointmentId, EngineError> {
        self.appointments
            .locate(booking)?
            .ok_or_else(|| EngineError::UnknownBooking(booking.clone()))
    }

    /// The level a ledger stands at: the recorded level, or the entry level.
    pub(crate) fn level_of(&self, ledger: &SubjectLedger) -> Option<&Level> {
        match &ledger.current_level {
            Some(id) => self.catalog.level(id),
            None => self.catalog.entry_level(),
        }
    }

    pub(crate) fn append_achievement(&self, achievement: Achievement) -> Result<(), EngineError> {
        self.progression
            .transact(&achievement.subject(), |ledger| {
                ledger.achievements.push(achievement);
                Ok(())
            })
    }

    /// Record an achievement outside of billing, e.g. an exam passed on paper.
    pub fn record_achievement(
        &self,
        subject: &Subject,
        source_id: SourceId,
    ) -> Result<Achievement, EngineError> {
        let achievement = Achievement {
            id: next_achievement_id(),
            customer_id: subject.customer_id.clone(),
            dog_id: subject.dog_id.clone(),
            source_id,
            date_achieved: self.clock.now(),
            is_consumed: false,
            booking_id: None,
        };
        self.append_achievement(achievement.clone())?;
        tracing::info!(
            subject = %subject,
            source = %achievement.source_id,
            achievement = %achievement.id,
            "achievement recorded"
        );
        Ok(achievement)
    }

    pub fn ledger(&self, subject: &Subject) -> Result<SubjectLedger, EngineError> {
        Ok(self.progression.snapshot(subject)?)
    }

    pub fn current_level(&self, subject: &Subject) -> Result<Option<LevelId>, EngineError> {
        let ledger = self.progression.snapshot(subject)?;
        Ok(self.level_of(&ledger).map(|level| level.id.clone()))
    }

    /// Capped requirement counts for `level_id`; empty for unknown levels.
    pub fn progress(
        &self,
        subject: &Subject,
        level_id: &LevelId,
    ) -> Result<BTreeMap<SourceId, u32>, EngineError> {
        let ledger = self.progression.snapshot(subject)?;
        Ok(self.evaluator().progress(&ledger.achievements, level_id))
    }

    pub fn is_level_up_eligible(
        &self,
        subject: &Subject,
        current_level_id: &LevelId,
    ) -> Result<bool, EngineError> {
        let ledger = self.progression.snapshot(subject)?;
        Ok(self
            .evaluator()
            .is_level_up_eligible(&ledger.achievements, current_level_id))
    }

    /// Progress toward leaving the subject's current level.
    pub fn progress_report(&self, subject: &Subject) -> Result<ProgressReport, EngineError> {
        let ledger = self.progression.snapshot(subject)?;
        let level = self.level_of(&ledger).ok_or(EngineError::EmptyCatalog)?;
        self.evaluator()
            .report(&ledger, &level.id)
            .ok_or_else(|| EngineError::UnknownLevel(level.id.clone()))
    }

    pub fn balance(&self, customer: &CustomerId) -> Result<i64, EngineError> {
        Ok(self.balances.balance(customer)?)
    }

    /// Top up a customer balance, returning the new running total.
    pub fn credit(
        &self,
        customer: &CustomerId,
        amount_cents: i64,
        reference: &str,
    ) -> Result<i64, EngineError> {
        let balance = self.balances.credit(customer, amount_cents, reference)?;
        tracing::info!(customer = %customer, amount_cents, balance, "balance credited");
        Ok(balance)
    }
}
