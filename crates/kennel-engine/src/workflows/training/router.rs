use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{
    AppointmentId, BookingId, CustomerId, DogId, LevelId, NewAppointment, SourceId, Subject,
};
use super::billing::BillingLine;
use super::error::EngineError;
use super::repository::{AppointmentRepository, BalanceLedger, ProgressionRepository};
use super::service::TrainingEngine;
use super::settings::TenantSettings;

/// Router state: the engine plus the tenant switches handed to billing calls.
pub struct TrainingApi<A, P, B> {
    pub(crate) engine: Arc<TrainingEngine<A, P, B>>,
    pub(crate) settings: TenantSettings,
}

impl<A, P, B> Clone for TrainingApi<A, P, B> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            settings: self.settings,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubjectRequest {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub dog_id: Option<DogId>,
}

impl SubjectRequest {
    fn subject(self) -> Subject {
        Subject::new(self.customer_id, self.dog_id)
    }
}

#[derive(Debug, Deserialize)]
pub struct CapacityRequest {
    pub capacity: u32,
}

#[derive(Debug, Deserialize)]
pub struct LevelUpRequest {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub dog_id: Option<DogId>,
    pub target_level_id: LevelId,
}

#[derive(Debug, Deserialize)]
pub struct AchievementRequest {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub dog_id: Option<DogId>,
    pub source_id: SourceId,
}

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub dog_id: Option<DogId>,
    #[serde(default)]
    pub level_id: Option<LevelId>,
}

#[derive(Debug, Deserialize)]
pub struct CreditRequest {
    pub amount_cents: i64,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Router builder exposing booking, billing, and progression endpoints.
pub fn training_router<A, P, B>(
    engine: Arc<TrainingEngine<A, P, B>>,
    settings: TenantSettings,
) -> Router
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    Router::new()
        .route(
            "/api/v1/appointments",
            get(list_appointments_handler::<A, P, B>)
                .post(create_appointment_handler::<A, P, B>),
        )
        .route(
            "/api/v1/appointments/:appointment_id",
            get(roster_handler::<A, P, B>),
        )
        .route(
            "/api/v1/appointments/:appointment_id/capacity",
            put(capacity_handler::<A, P, B>),
        )
        .route(
            "/api/v1/appointments/:appointment_id/bookings",
            post(book_handler::<A, P, B>),
        )
        .route(
            "/api/v1/appointments/:appointment_id/bill",
            post(bill_all_handler::<A, P, B>),
        )
        .route(
            "/api/v1/bookings/:booking_id/cancel",
            post(cancel_handler::<A, P, B>),
        )
        .route(
            "/api/v1/bookings/:booking_id/attendance",
            post(attendance_handler::<A, P, B>),
        )
        .route(
            "/api/v1/bookings/:booking_id/bill",
            post(bill_one_handler::<A, P, B>),
        )
        .route(
            "/api/v1/progression/level-up",
            post(level_up_handler::<A, P, B>),
        )
        .route(
            "/api/v1/progression/license",
            post(license_handler::<A, P, B>),
        )
        .route(
            "/api/v1/progression/achievements",
            post(achievement_handler::<A, P, B>),
        )
        .route(
            "/api/v1/progression/progress",
            get(progress_handler::<A, P, B>),
        )
        .route(
            "/api/v1/customers/:customer_id/balance",
            get(balance_handler::<A, P, B>),
        )
        .route(
            "/api/v1/customers/:customer_id/balance/credit",
            post(credit_handler::<A, P, B>),
        )
        .with_state(TrainingApi { engine, settings })
}

pub(crate) fn error_response(err: EngineError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        error!(error = %err, "training engine failure");
    }

    let mut payload = json!({
        "error": err.to_string(),
        "code": err.code(),
    });
    if let EngineError::RequirementsNotMet { shortfalls, .. } = &err {
        payload["shortfalls"] = json!(shortfalls);
    }
    (status, Json(payload)).into_response()
}

pub(crate) async fn list_appointments_handler<A, P, B>(
    State(api): State<TrainingApi<A, P, B>>,
) -> Response
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    match api.engine.appointments() {
        Ok(appointments) => (StatusCode::OK, Json(appointments)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn create_appointment_handler<A, P, B>(
    State(api): State<TrainingApi<A, P, B>>,
    Json(request): Json<NewAppointment>,
) -> Response
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    match api.engine.create_appointment(request) {
        Ok(appointment) => (StatusCode::CREATED, Json(appointment)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn roster_handler<A, P, B>(
    State(api): State<TrainingApi<A, P, B>>,
    Path(appointment_id): Path<String>,
) -> Response
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    let id = AppointmentId(appointment_id);
    match api.engine.roster(&id) {
        Ok(book) => {
            let payload = json!({
                "appointment": book.appointment,
                "confirmed_count": book.confirmed_count(),
                "waitlist_count": book.waitlist_count(),
                "bookings": book.bookings,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn capacity_handler<A, P, B>(
    State(api): State<TrainingApi<A, P, B>>,
    Path(appointment_id): Path<String>,
    Json(request): Json<CapacityRequest>,
) -> Response
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    let id = AppointmentId(appointment_id);
    match api.engine.set_capacity(&id, request.capacity) {
        Ok(change) => (StatusCode::OK, Json(change)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn book_handler<A, P, B>(
    State(api): State<TrainingApi<A, P, B>>,
    Path(appointment_id): Path<String>,
    Json(request): Json<SubjectRequest>,
) -> Response
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    let id = AppointmentId(appointment_id);
    match api.engine.book(&id, request.subject()) {
        Ok(outcome) => {
            let payload = json!({
                "booking_id": outcome.booking.id,
                "status": outcome.booking.status.label(),
                "waitlist_position": outcome.waitlist_position,
                "confirmed_count": outcome.confirmed_count,
                "capacity": outcome.capacity,
                "booking": outcome.booking,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn cancel_handler<A, P, B>(
    State(api): State<TrainingApi<A, P, B>>,
    Path(booking_id): Path<String>,
) -> Response
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    let id = BookingId(booking_id);
    match api.engine.cancel(&id) {
        Ok(outcome) => {
            let payload = json!({
                "cancelled": outcome.cancelled,
                "promoted_booking_id": outcome.promoted.as_ref().map(|booking| &booking.id),
                "promoted_customer_id": outcome
                    .promoted
                    .as_ref()
                    .map(|booking| &booking.customer_id),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn attendance_handler<A, P, B>(
    State(api): State<TrainingApi<A, P, B>>,
    Path(booking_id): Path<String>,
) -> Response
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    let id = BookingId(booking_id);
    match api.engine.toggle_attendance(&id) {
        Ok(booking) => (StatusCode::OK, Json(booking)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn bill_one_handler<A, P, B>(
    State(api): State<TrainingApi<A, P, B>>,
    Path(booking_id): Path<String>,
) -> Response
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    let id = BookingId(booking_id);
    match api.engine.bill_one(&id, &api.settings) {
        Ok(receipt) => (StatusCode::OK, Json(vec![BillingLine::billed(&receipt)])).into_response(),
        Err(err) => {
            let status = err.status_code();
            if status.is_server_error() {
                error!(booking = %id, error = %err, "billing failed");
            }
            (status, Json(vec![BillingLine::failed(&id, None, &err)])).into_response()
        }
    }
}

pub(crate) async fn bill_all_handler<A, P, B>(
    State(api): State<TrainingApi<A, P, B>>,
    Path(appointment_id): Path<String>,
) -> Response
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    let id = AppointmentId(appointment_id);
    match api.engine.bill_all(&id, &api.settings) {
        Ok(entries) => {
            let lines: Vec<_> = entries.iter().map(|entry| entry.line()).collect();
            (StatusCode::OK, Json(lines)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn level_up_handler<A, P, B>(
    State(api): State<TrainingApi<A, P, B>>,
    Json(request): Json<LevelUpRequest>,
) -> Response
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    let subject = Subject::new(request.customer_id, request.dog_id);
    match api.engine.level_up(&subject, &request.target_level_id) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn license_handler<A, P, B>(
    State(api): State<TrainingApi<A, P, B>>,
    Json(request): Json<SubjectRequest>,
) -> Response
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    match api.engine.grant_license(&request.subject()) {
        Ok(grant) => (StatusCode::OK, Json(grant)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn achievement_handler<A, P, B>(
    State(api): State<TrainingApi<A, P, B>>,
    Json(request): Json<AchievementRequest>,
) -> Response
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    let subject = Subject::new(request.customer_id, request.dog_id);
    match api.engine.record_achievement(&subject, request.source_id) {
        Ok(achievement) => (StatusCode::CREATED, Json(achievement)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn progress_handler<A, P, B>(
    State(api): State<TrainingApi<A, P, B>>,
    Query(query): Query<ProgressQuery>,
) -> Response
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    let subject = Subject::new(query.customer_id, query.dog_id);

    let Some(level_id) = query.level_id else {
        return match api.engine.progress_report(&subject) {
            Ok(report) => (StatusCode::OK, Json(report)).into_response(),
            Err(err) => error_response(err),
        };
    };

    let progress = api.engine.progress(&subject, &level_id);
    let eligible = api.engine.is_level_up_eligible(&subject, &level_id);
    match (progress, eligible) {
        (Ok(progress), Ok(eligible)) => {
            let payload = json!({
                "subject": subject,
                "level_id": level_id,
                "progress": progress,
                "eligible": eligible,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        (Err(err), _) | (_, Err(err)) => error_response(err),
    }
}

pub(crate) async fn balance_handler<A, P, B>(
    State(api): State<TrainingApi<A, P, B>>,
    Path(customer_id): Path<String>,
) -> Response
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    let customer = CustomerId(customer_id);
    match api.engine.balance(&customer) {
        Ok(balance) => {
            let payload = json!({ "customer_id": customer, "balance_cents": balance });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn credit_handler<A, P, B>(
    State(api): State<TrainingApi<A, P, B>>,
    Path(customer_id): Path<String>,
    Json(request): Json<CreditRequest>,
) -> Response
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    let customer = CustomerId(customer_id);
    let reference = request.reference.unwrap_or_else(|| "top-up".to_string());
    match api.engine.credit(&customer, request.amount_cents, &reference) {
        Ok(balance) => {
            let payload = json!({ "customer_id": customer, "balance_cents": balance });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}
