use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::domain::{
    Achievement, AchievementId, Appointment, AppointmentId, Booking, BookingId, BookingStatus,
    CustomerId, DogId,
};
use super::error::EngineError;
use super::repository::{
    AppointmentBook, AppointmentRepository, BalanceLedger, ProgressionRepository,
};
use super::service::{next_achievement_id, TrainingEngine};
use super::settings::TenantSettings;

/// Record of one billed booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub booking_id: BookingId,
    pub appointment_id: AppointmentId,
    pub customer_id: CustomerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dog_id: Option<DogId>,
    pub charged_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_after_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub achievement_id: Option<AchievementId>,
    pub billed_at: DateTime<Utc>,
}

/// Per-booking result of a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingEntry {
    pub booking_id: BookingId,
    pub customer_id: CustomerId,
    pub outcome: Result<Receipt, EngineError>,
}

impl BillingEntry {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn line(&self) -> BillingLine {
        match &self.outcome {
            Ok(receipt) => BillingLine::billed(receipt),
            Err(err) => BillingLine::failed(&self.booking_id, Some(&self.customer_id), err),
        }
    }
}

/// Wire shape of a billing result, shared by single and batch billing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingLine {
    pub booking_id: BookingId,
    /// Absent when the booking could not be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl BillingLine {
    pub fn billed(receipt: &Receipt) -> Self {
        Self {
            booking_id: receipt.booking_id.clone(),
            customer_id: Some(receipt.customer_id.clone()),
            status: "success",
            receipt: Some(receipt.clone()),
            code: None,
            detail: None,
        }
    }

    pub fn failed(
        booking_id: &BookingId,
        customer_id: Option<&CustomerId>,
        err: &EngineError,
    ) -> Self {
        Self {
            booking_id: booking_id.clone(),
            customer_id: customer_id.cloned(),
            status: "error",
            receipt: None,
            code: Some(err.code()),
            detail: Some(err.to_string()),
        }
    }
}

impl<A, P, B> TrainingEngine<A, P, B>
where
    A: AppointmentRepository + 'static,
    P: ProgressionRepository + 'static,
    B: BalanceLedger + 'static,
{
    /// Appointment override first, then the training type default.
    pub fn price_for(&self, appointment: &Appointment) -> Option<i64> {
        appointment.price_cents.or_else(|| {
            appointment
                .source_id
                .as_ref()
                .and_then(|source| self.catalog.training_type(source))
                .and_then(|training| training.default_price_cents)
        })
    }

    /// Bill a single confirmed booking exactly once.
    pub fn bill_one(
        &self,
        booking_id: &BookingId,
        settings: &TenantSettings,
    ) -> Result<Receipt, EngineError> {
        let appointment_id = self.appointment_of(booking_id)?;
        let receipt = self.bill_booking(&appointment_id, booking_id, settings)?;

        info!(
            booking = %booking_id,
            customer = %receipt.customer_id,
            charged_cents = receipt.charged_cents,
            achievement = receipt.achievement_id.as_ref().map(|id| id.as_str()),
            "booking billed"
        );
        Ok(receipt)
    }

    /// Bill every confirmed, unbilled booking of an appointment. Each booking is
    /// billed on its own; failures are reported per entry and never stop the
    /// run.
    pub fn bill_all(
        &self,
        appointment_id: &AppointmentId,
        settings: &TenantSettings,
    ) -> Result<Vec<BillingEntry>, EngineError> {
        let roster = self.roster(appointment_id)?;
        let pending: Vec<(BookingId, CustomerId)> = roster
            .bookings
            .iter()
            .filter(|booking| booking.status == BookingStatus::Confirmed && !booking.is_billed)
            .map(|booking| (booking.id.clone(), booking.customer_id.clone()))
            .collect();

        let mut entries = Vec::with_capacity(pending.len());
        for (booking_id, customer_id) in pending {
            let outcome = self.bill_booking(appointment_id, &booking_id, settings);
            if let Err(err) = &outcome {
                warn!(
                    booking = %booking_id,
                    customer = %customer_id,
                    error = %err,
                    "booking not billed"
                );
            }
            entries.push(BillingEntry {
                booking_id,
                customer_id,
                outcome,
            });
        }

        info!(
            appointment = %appointment_id,
            billed = entries.iter().filter(|entry| entry.is_success()).count(),
            failed = entries.iter().filter(|entry| !entry.is_success()).count(),
            "batch billing finished"
        );
        Ok(entries)
    }

    /// Claim the booking inside the appointment unit, then charge and record
    /// progress. The claim is released when charging fails cleanly, so a
    /// booking is never charged without reading as billed.
    fn bill_booking(
        &self,
        appointment_id: &AppointmentId,
        booking_id: &BookingId,
        settings: &TenantSettings,
    ) -> Result<Receipt, EngineError> {
        let claim = self.with_book(appointment_id, |book| claim_booking(book, booking_id))?;

        match self.charge(&claim, settings) {
            Ok(receipt) => Ok(receipt),
            Err(err @ EngineError::RefundFailed { .. }) => Err(err),
            Err(err) => {
                self.release_claim(appointment_id, booking_id);
                Err(err)
            }
        }
    }

    fn charge(
        &self,
        claim: &BillingClaim,
        settings: &TenantSettings,
    ) -> Result<Receipt, EngineError> {
        let BillingClaim {
            appointment,
            booking,
        } = claim;
        let billed_at = self.clock.now();
        let price = self.price_for(appointment).filter(|price| *price > 0);

        let mut charged_cents = 0;
        let mut balance_after_cents = None;
        if let (true, Some(price)) = (settings.auto_billing_enabled, price) {
            balance_after_cents = Some(self.balances.debit(
                &booking.customer_id,
                price,
                booking.id.as_str(),
            )?);
            charged_cents = price;
        }

        let mut achievement_id = None;
        if let (true, Some(source_id)) = (settings.auto_progress_enabled, &appointment.source_id) {
            let achievement = Achievement {
                id: next_achievement_id(),
                customer_id: booking.customer_id.clone(),
                dog_id: booking.dog_id.clone(),
                source_id: source_id.clone(),
                date_achieved: billed_at,
                is_consumed: false,
                booking_id: Some(booking.id.clone()),
            };
            let id = achievement.id.clone();
            if let Err(err) = self.append_achievement(achievement) {
                if charged_cents > 0 {
                    self.refund(booking, charged_cents, &err)?;
                }
                return Err(err);
            }
            achievement_id = Some(id);
        }

        Ok(Receipt {
            booking_id: booking.id.clone(),
            appointment_id: appointment.id.clone(),
            customer_id: booking.customer_id.clone(),
            dog_id: booking.dog_id.clone(),
            charged_cents,
            balance_after_cents,
            achievement_id,
            billed_at,
        })
    }

    fn refund(
        &self,
        booking: &Booking,
        charged_cents: i64,
        cause: &EngineError,
    ) -> Result<(), EngineError> {
        let reference = format!("{}:refund", booking.id);
        match self
            .balances
            .credit(&booking.customer_id, charged_cents, &reference)
        {
            Ok(_) => Ok(()),
            Err(refund_err) => {
                error!(
                    booking = %booking.id,
                    charged_cents,
                    cause = %cause,
                    error = %refund_err,
                    "refund failed, booking stays billed"
                );
                Err(EngineError::RefundFailed {
                    booking_id: booking.id.clone(),
                    charged_cents,
                    reason: format!("{cause}; refund: {refund_err}"),
                })
            }
        }
    }

    fn release_claim(&self, appointment_id: &AppointmentId, booking_id: &BookingId) {
        let released = self.with_book(appointment_id, |book| {
            if let Some(booking) = book.booking_mut(booking_id) {
                booking.is_billed = false;
            }
            Ok(())
        });
        if let Err(err) = released {
            error!(booking = %booking_id, error = %err, "billing claim not released");
        }
    }
}

/// Snapshot taken when a booking is marked billed.
struct BillingClaim {
    appointment: Appointment,
    booking: Booking,
}

fn claim_booking(
    book: &mut AppointmentBook,
    booking_id: &BookingId,
) -> Result<BillingClaim, EngineError> {
    let appointment = book.appointment.clone();
    let booking = book
        .booking_mut(booking_id)
        .ok_or_else(|| EngineError::UnknownBooking(booking_id.clone()))?;

    if booking.is_billed {
        return Err(EngineError::AlreadyBilled(booking_id.clone()));
    }
    if booking.status != BookingStatus::Confirmed {
        return Err(EngineError::NotConfirmed(booking_id.clone()));
    }
    booking.is_billed = true;

    Ok(BillingClaim {
        appointment,
        booking: booking.clone(),
    })
}
