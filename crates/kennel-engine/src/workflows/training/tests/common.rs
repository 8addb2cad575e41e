use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::training::domain::{
    Appointment, AppointmentId, Audience, BookingId, Clock, CustomerId, Level, LevelId,
    NewAppointment,
    Requirement, RequirementId, RequirementKind, SourceId, Subject, TrainerId, TrainingType,
};
use crate::workflows::training::memory::{
    InMemoryAppointments, InMemoryBalances, InMemoryProgression,
};
use crate::workflows::training::repository::{
    AppointmentBook, AppointmentRepository, BalanceError, BalanceLedger, ProgressionRepository,
    RepositoryError, SubjectLedger,
};
use crate::workflows::training::{RequirementCatalog, TrainingEngine};

pub(super) type MemoryEngine =
    TrainingEngine<InMemoryAppointments, InMemoryProgression, InMemoryBalances>;

/// Hands out strictly increasing timestamps, one second apart.
pub(super) struct ManualClock {
    start: DateTime<Utc>,
    ticks: AtomicI64,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            start: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
            ticks: AtomicI64::new(0),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        self.start + Duration::seconds(tick)
    }
}

/// Like `ManualClock`, but one chosen call stalls after taking its timestamp
/// until the test releases it.
pub(super) struct GateClock {
    inner: ManualClock,
    calls: AtomicUsize,
    gated_call: usize,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

pub(super) struct Gate {
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

impl GateClock {
    /// `gated_call` is 1-based.
    pub(super) fn new(gated_call: usize) -> (Self, Gate) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let clock = Self {
            inner: ManualClock::default(),
            calls: AtomicUsize::new(0),
            gated_call,
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        let gate = Gate {
            entered: entered_rx,
            release: release_tx,
        };
        (clock, gate)
    }
}

impl Clock for GateClock {
    fn now(&self) -> DateTime<Utc> {
        let now = self.inner.now();
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.gated_call {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        now
    }
}

pub(super) fn requirement(
    id: &str,
    level: &str,
    kind: RequirementKind,
    required_count: u32,
    source: &str,
) -> Requirement {
    Requirement {
        id: RequirementId::new(id),
        level_id: LevelId::new(level),
        kind,
        required_count,
        source_id: SourceId::new(source),
    }
}

pub(super) fn level(id: &str, rank: u32, license: bool, requirements: Vec<Requirement>) -> Level {
    Level {
        id: LevelId::new(id),
        rank,
        name: format!("{id} level"),
        license,
        requirements,
    }
}

pub(super) fn training_type(source: &str, price: Option<i64>) -> TrainingType {
    TrainingType {
        source_id: SourceId::new(source),
        name: source.replace('_', " "),
        default_price_cents: price,
    }
}

pub(super) fn training_types() -> Vec<TrainingType> {
    vec![
        training_type("group_class", Some(2500)),
        training_type("exam", Some(4000)),
        training_type("workshop", Some(3500)),
        training_type("agility", Some(3000)),
        training_type("private_lesson", Some(6000)),
        training_type("lecture", Some(1500)),
        training_type("first_aid", Some(5000)),
        training_type("open_play", None),
    ]
}

/// basic (group_class 6, exam 1, workshop 2 additional) -> advanced (agility 3)
/// -> license (private_lesson 2) with lecture 3 and first_aid 1 prerequisites.
pub(super) fn catalog() -> RequirementCatalog {
    use RequirementKind::{Additional, Main};

    RequirementCatalog::new(
        vec![
            level(
                "basic",
                1,
                false,
                vec![
                    requirement("basic-group", "basic", Main, 6, "group_class"),
                    requirement("basic-exam", "basic", Main, 1, "exam"),
                    requirement("basic-workshop", "basic", Additional, 2, "workshop"),
                ],
            ),
            level(
                "advanced",
                2,
                false,
                vec![requirement("advanced-agility", "advanced", Main, 3, "agility")],
            ),
            level(
                "license",
                3,
                true,
                vec![requirement("license-private", "license", Main, 2, "private_lesson")],
            ),
        ],
        vec![
            requirement("prereq-lecture", "license", Main, 3, "lecture"),
            requirement("prereq-first-aid", "license", Main, 1, "first_aid"),
        ],
        training_types(),
    )
    .expect("test catalog is valid")
}

pub(super) struct Harness {
    pub engine: Arc<MemoryEngine>,
    pub progression: Arc<InMemoryProgression>,
    pub balances: Arc<InMemoryBalances>,
}

pub(super) fn harness() -> Harness {
    harness_with(catalog())
}

pub(super) fn harness_with(catalog: RequirementCatalog) -> Harness {
    let progression = Arc::new(InMemoryProgression::default());
    let balances = Arc::new(InMemoryBalances::default());
    let engine = TrainingEngine::new(
        Arc::new(catalog),
        Arc::new(InMemoryAppointments::default()),
        progression.clone(),
        balances.clone(),
    )
    .with_clock(Arc::new(ManualClock::default()));

    Harness {
        engine: Arc::new(engine),
        progression,
        balances,
    }
}

pub(super) fn new_appointment(capacity: u32, source: Option<&str>) -> NewAppointment {
    NewAppointment {
        capacity,
        trainer_id: TrainerId::new("trainer-anna"),
        audience: Audience::OpenForAll,
        source_id: source.map(SourceId::new),
        price_cents: None,
        start_time: Utc.with_ymd_and_hms(2025, 3, 8, 10, 0, 0).unwrap(),
    }
}

pub(super) fn open_appointment(engine: &MemoryEngine, capacity: u32) -> AppointmentId {
    engine
        .create_appointment(new_appointment(capacity, Some("group_class")))
        .expect("appointment created")
        .id
}

pub(super) fn customer(name: &str) -> Subject {
    Subject::customer(name)
}

pub(super) fn book(engine: &MemoryEngine, appointment: &AppointmentId, name: &str) -> BookingId {
    engine
        .book(appointment, customer(name))
        .expect("booking accepted")
        .booking
        .id
}

pub(super) fn record(engine: &MemoryEngine, subject: &Subject, source: &str, times: usize) {
    for _ in 0..times {
        engine
            .record_achievement(subject, SourceId::new(source))
            .expect("achievement recorded");
    }
}

/// Accept reads but refuse every write.
pub(super) struct UnavailableProgression;

impl ProgressionRepository for UnavailableProgression {
    fn snapshot(&self, subject: &Subject) -> Result<SubjectLedger, RepositoryError> {
        Ok(SubjectLedger::new(subject.clone()))
    }

    fn transact<T, E, F>(&self, _subject: &Subject, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut SubjectLedger) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(RepositoryError::Unavailable("ledger offline".to_string()).into())
    }
}

pub(super) struct UnavailableAppointments;

impl AppointmentRepository for UnavailableAppointments {
    fn insert(&self, _book: AppointmentBook) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &AppointmentId) -> Result<Option<AppointmentBook>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn locate(&self, _booking: &BookingId) -> Result<Option<AppointmentId>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<Appointment>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn transact<T, E, F>(&self, _id: &AppointmentId, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut AppointmentBook) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()).into())
    }
}

/// Runs each unit to completion, then fails the commit while `fail_commits` is set.
#[derive(Default)]
pub(super) struct CommitFailingAppointments {
    pub inner: InMemoryAppointments,
    pub fail_commits: AtomicBool,
}

impl AppointmentRepository for CommitFailingAppointments {
    fn insert(&self, book: AppointmentBook) -> Result<(), RepositoryError> {
        self.inner.insert(book)
    }

    fn fetch(&self, id: &AppointmentId) -> Result<Option<AppointmentBook>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn locate(&self, booking: &BookingId) -> Result<Option<AppointmentId>, RepositoryError> {
        self.inner.locate(booking)
    }

    fn list(&self) -> Result<Vec<Appointment>, RepositoryError> {
        self.inner.list()
    }

    fn transact<T, E, F>(&self, id: &AppointmentId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut AppointmentBook) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        if !self.fail_commits.load(Ordering::SeqCst) {
            return self.inner.transact(id, work);
        }
        let mut draft = self.inner.fetch(id)?.ok_or(RepositoryError::NotFound)?;
        work(&mut draft)?;
        Err(RepositoryError::Unavailable("commit failed".to_string()).into())
    }
}

/// Balance ledger whose credits start failing once `refuse_credits` is set.
#[derive(Default)]
pub(super) struct CreditRefusingBalances {
    pub inner: InMemoryBalances,
    pub refuse_credits: AtomicBool,
}

impl BalanceLedger for CreditRefusingBalances {
    fn balance(&self, customer: &CustomerId) -> Result<i64, BalanceError> {
        self.inner.balance(customer)
    }

    fn debit(
        &self,
        customer: &CustomerId,
        amount_cents: i64,
        reference: &str,
    ) -> Result<i64, BalanceError> {
        self.inner.debit(customer, amount_cents, reference)
    }

    fn credit(
        &self,
        customer: &CustomerId,
        amount_cents: i64,
        reference: &str,
    ) -> Result<i64, BalanceError> {
        if self.refuse_credits.load(Ordering::SeqCst) {
            return Err(BalanceError::Unavailable("payments offline".to_string()));
        }
        self.inner.credit(customer, amount_cents, reference)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
