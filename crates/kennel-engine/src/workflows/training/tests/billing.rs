use super::common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::workflows::training::domain::{BookingStatus, CustomerId, SourceId};
use crate::workflows::training::memory::{
    InMemoryAppointments, InMemoryBalances, InMemoryProgression,
};
use crate::workflows::training::repository::{BalanceLedger, RepositoryError};
use crate::workflows::training::{EngineError, TenantSettings, TrainingEngine};

fn fund(harness: &Harness, name: &str, cents: i64) {
    harness
        .engine
        .credit(&CustomerId::new(name), cents, "top-up")
        .expect("credit applied");
}

fn balance(harness: &Harness, name: &str) -> i64 {
    harness
        .balances
        .balance(&CustomerId::new(name))
        .expect("balance readable")
}

#[test]
fn bill_one_charges_exactly_once() {
    let harness = harness();
    fund(&harness, "ada", 10_000);
    let appointment = open_appointment(&harness.engine, 2);
    let booking = book(&harness.engine, &appointment, "ada");
    let settings = TenantSettings::default();

    let receipt = harness
        .engine
        .bill_one(&booking, &settings)
        .expect("first bill succeeds");
    assert_eq!(receipt.charged_cents, 2500);
    assert_eq!(receipt.balance_after_cents, Some(7500));
    assert!(receipt.achievement_id.is_some());

    match harness.engine.bill_one(&booking, &settings) {
        Err(EngineError::AlreadyBilled(id)) => assert_eq!(id, booking),
        other => panic!("expected already billed, got {other:?}"),
    }

    assert_eq!(balance(&harness, "ada"), 7500);
    let debits: Vec<_> = harness
        .balances
        .entries(&CustomerId::new("ada"))
        .expect("entries")
        .into_iter()
        .filter(|entry| entry.delta_cents < 0)
        .collect();
    assert_eq!(debits.len(), 1);

    let ledger = harness.engine.ledger(&customer("ada")).expect("ledger");
    assert_eq!(ledger.achievements.len(), 1);
    assert_eq!(ledger.achievements[0].source_id, SourceId::new("group_class"));
    assert_eq!(ledger.achievements[0].booking_id, Some(booking));
    assert!(!ledger.achievements[0].is_consumed);
}

#[test]
fn only_confirmed_bookings_are_billed() {
    let harness = harness();
    fund(&harness, "ben", 10_000);
    let appointment = open_appointment(&harness.engine, 1);
    book(&harness.engine, &appointment, "ada");
    let waitlisted = book(&harness.engine, &appointment, "ben");
    let settings = TenantSettings::default();

    assert!(matches!(
        harness.engine.bill_one(&waitlisted, &settings),
        Err(EngineError::NotConfirmed(_))
    ));

    harness.engine.cancel(&waitlisted).expect("cancel");
    assert!(matches!(
        harness.engine.bill_one(&waitlisted, &settings),
        Err(EngineError::NotConfirmed(_))
    ));
    assert_eq!(balance(&harness, "ben"), 10_000);
}

#[test]
fn bill_all_isolates_insufficient_balance() {
    let harness = harness();
    let appointment = open_appointment(&harness.engine, 3);
    for name in ["ada", "ben", "cai"] {
        book(&harness.engine, &appointment, name);
    }
    fund(&harness, "ada", 5000);
    fund(&harness, "cai", 5000);
    fund(&harness, "ben", 1000);

    let entries = harness
        .engine
        .bill_all(&appointment, &TenantSettings::default())
        .expect("batch runs");

    assert_eq!(entries.len(), 3);
    assert_eq!(entries.iter().filter(|entry| entry.is_success()).count(), 2);
    let failed = entries
        .iter()
        .find(|entry| !entry.is_success())
        .expect("one failure");
    assert_eq!(failed.customer_id, CustomerId::new("ben"));
    match &failed.outcome {
        Err(EngineError::InsufficientBalance {
            required_cents,
            available_cents,
            ..
        }) => {
            assert_eq!(*required_cents, 2500);
            assert_eq!(*available_cents, 1000);
        }
        other => panic!("expected insufficient balance, got {other:?}"),
    }

    assert_eq!(balance(&harness, "ada"), 2500);
    assert_eq!(balance(&harness, "cai"), 2500);
    assert_eq!(balance(&harness, "ben"), 1000);

    let roster = harness.engine.roster(&appointment).expect("roster");
    let unbilled: Vec<_> = roster
        .bookings
        .iter()
        .filter(|booking| !booking.is_billed)
        .map(|booking| booking.customer_id.clone())
        .collect();
    assert_eq!(unbilled, vec![CustomerId::new("ben")]);
    assert!(harness
        .engine
        .ledger(&customer("ben"))
        .expect("ledger")
        .achievements
        .is_empty());

    let line = failed.line();
    assert_eq!(line.status, "error");
    assert_eq!(line.code, Some("insufficient_balance"));
}

#[test]
fn bill_all_skips_billed_and_waitlisted_bookings() {
    let harness = harness();
    fund(&harness, "ada", 5000);
    let appointment = open_appointment(&harness.engine, 1);
    let confirmed = book(&harness.engine, &appointment, "ada");
    book(&harness.engine, &appointment, "ben");
    let settings = TenantSettings::default();
    harness
        .engine
        .bill_one(&confirmed, &settings)
        .expect("billed");

    let entries = harness
        .engine
        .bill_all(&appointment, &settings)
        .expect("batch runs");
    assert!(entries.is_empty());
}

#[test]
fn appointment_price_overrides_training_type_default() {
    let harness = harness();
    fund(&harness, "ada", 10_000);
    let settings = TenantSettings::default();

    let mut discounted = new_appointment(2, Some("group_class"));
    discounted.price_cents = Some(1000);
    let discounted = harness
        .engine
        .create_appointment(discounted)
        .expect("created")
        .id;
    let standard = open_appointment(&harness.engine, 2);

    let first = book(&harness.engine, &discounted, "ada");
    let second = book(&harness.engine, &standard, "ada");

    let first = harness.engine.bill_one(&first, &settings).expect("billed");
    let second = harness.engine.bill_one(&second, &settings).expect("billed");
    assert_eq!(first.charged_cents, 1000);
    assert_eq!(second.charged_cents, 2500);
    assert_eq!(balance(&harness, "ada"), 6500);
}

#[test]
fn unpriced_sessions_still_record_progress() {
    let harness = harness();
    let settings = TenantSettings::default();
    let open_play = harness
        .engine
        .create_appointment(new_appointment(4, Some("open_play")))
        .expect("created")
        .id;
    let no_source = harness
        .engine
        .create_appointment(new_appointment(4, None))
        .expect("created")
        .id;

    let play = book(&harness.engine, &open_play, "ada");
    let plain = book(&harness.engine, &no_source, "ada");

    let play = harness.engine.bill_one(&play, &settings).expect("billed");
    assert_eq!(play.charged_cents, 0);
    assert_eq!(play.balance_after_cents, None);
    assert!(play.achievement_id.is_some());

    let plain = harness.engine.bill_one(&plain, &settings).expect("billed");
    assert_eq!(plain.charged_cents, 0);
    assert!(plain.achievement_id.is_none());
    assert!(harness
        .balances
        .entries(&CustomerId::new("ada"))
        .expect("entries")
        .is_empty());
}

#[test]
fn tenant_switches_are_independent() {
    let harness = harness();
    fund(&harness, "ada", 10_000);
    fund(&harness, "ben", 10_000);
    fund(&harness, "cai", 10_000);
    let appointment = open_appointment(&harness.engine, 3);
    let ada = book(&harness.engine, &appointment, "ada");
    let ben = book(&harness.engine, &appointment, "ben");
    let cai = book(&harness.engine, &appointment, "cai");

    let progress_only = TenantSettings {
        auto_billing_enabled: false,
        auto_progress_enabled: true,
    };
    let receipt = harness
        .engine
        .bill_one(&ada, &progress_only)
        .expect("billed");
    assert_eq!(receipt.charged_cents, 0);
    assert!(receipt.achievement_id.is_some());
    assert_eq!(balance(&harness, "ada"), 10_000);

    let billing_only = TenantSettings {
        auto_billing_enabled: true,
        auto_progress_enabled: false,
    };
    let receipt = harness
        .engine
        .bill_one(&ben, &billing_only)
        .expect("billed");
    assert_eq!(receipt.charged_cents, 2500);
    assert!(receipt.achievement_id.is_none());
    assert!(harness
        .engine
        .ledger(&customer("ben"))
        .expect("ledger")
        .achievements
        .is_empty());

    let neither = TenantSettings {
        auto_billing_enabled: false,
        auto_progress_enabled: false,
    };
    harness.engine.bill_one(&cai, &neither).expect("billed");
    assert_eq!(balance(&harness, "cai"), 10_000);
    let roster = harness.engine.roster(&appointment).expect("roster");
    assert!(roster.booking(&cai).expect("booking").is_billed);
}

#[test]
fn ledger_failure_refunds_the_charge() {
    let balances = Arc::new(InMemoryBalances::default());
    let engine = TrainingEngine::new(
        Arc::new(catalog()),
        Arc::new(InMemoryAppointments::default()),
        Arc::new(UnavailableProgression),
        balances.clone(),
    )
    .with_clock(Arc::new(ManualClock::default()));
    let ada = CustomerId::new("ada");
    engine.credit(&ada, 5000, "top-up").expect("credit");

    let appointment = engine
        .create_appointment(new_appointment(2, Some("group_class")))
        .expect("created")
        .id;
    let booking = engine
        .book(&appointment, customer("ada"))
        .expect("booked")
        .booking
        .id;

    match engine.bill_one(&booking, &TenantSettings::default()) {
        Err(EngineError::Repository(RepositoryError::Unavailable(_))) => {}
        other => panic!("expected ledger failure, got {other:?}"),
    }

    assert_eq!(balances.balance(&ada).expect("balance"), 5000);
    let deltas: Vec<i64> = balances
        .entries(&ada)
        .expect("entries")
        .iter()
        .map(|entry| entry.delta_cents)
        .collect();
    assert_eq!(deltas, vec![5000, -2500, 2500]);

    let roster = engine.roster(&appointment).expect("roster");
    let stored = roster.booking(&booking).expect("booking");
    assert!(!stored.is_billed);
    assert_eq!(stored.status, BookingStatus::Confirmed);
}

#[test]
fn failed_claim_commit_charges_nothing() {
    let appointments = Arc::new(CommitFailingAppointments::default());
    let balances = Arc::new(InMemoryBalances::default());
    let engine = TrainingEngine::new(
        Arc::new(catalog()),
        appointments.clone(),
        Arc::new(InMemoryProgression::default()),
        balances.clone(),
    )
    .with_clock(Arc::new(ManualClock::default()));
    let ada = CustomerId::new("ada");
    engine.credit(&ada, 5000, "top-up").expect("credit");
    let appointment = engine
        .create_appointment(new_appointment(2, Some("group_class")))
        .expect("created")
        .id;
    let booking = engine
        .book(&appointment, customer("ada"))
        .expect("booked")
        .booking
        .id;
    let settings = TenantSettings::default();

    appointments.fail_commits.store(true, Ordering::SeqCst);
    match engine.bill_one(&booking, &settings) {
        Err(EngineError::Repository(RepositoryError::Unavailable(_))) => {}
        other => panic!("expected commit failure, got {other:?}"),
    }
    assert_eq!(balances.balance(&ada).expect("balance"), 5000);
    assert!(engine
        .ledger(&customer("ada"))
        .expect("ledger")
        .achievements
        .is_empty());
    assert!(!engine
        .roster(&appointment)
        .expect("roster")
        .booking(&booking)
        .expect("booking")
        .is_billed);

    appointments.fail_commits.store(false, Ordering::SeqCst);
    let receipt = engine.bill_one(&booking, &settings).expect("retry bills");
    assert_eq!(receipt.balance_after_cents, Some(2500));
    assert!(matches!(
        engine.bill_one(&booking, &settings),
        Err(EngineError::AlreadyBilled(_))
    ));

    let debits = balances
        .entries(&ada)
        .expect("entries")
        .iter()
        .filter(|entry| entry.delta_cents < 0)
        .count();
    assert_eq!(debits, 1);
    assert_eq!(
        engine.ledger(&customer("ada")).expect("ledger").achievements.len(),
        1
    );
}

#[test]
fn failed_refund_is_reported_and_keeps_the_booking_billed() {
    let balances = Arc::new(CreditRefusingBalances::default());
    let engine = TrainingEngine::new(
        Arc::new(catalog()),
        Arc::new(InMemoryAppointments::default()),
        Arc::new(UnavailableProgression),
        balances.clone(),
    )
    .with_clock(Arc::new(ManualClock::default()));
    let ada = CustomerId::new("ada");
    engine.credit(&ada, 5000, "top-up").expect("credit");
    balances.refuse_credits.store(true, Ordering::SeqCst);

    let appointment = engine
        .create_appointment(new_appointment(2, Some("group_class")))
        .expect("created")
        .id;
    let booking = engine
        .book(&appointment, customer("ada"))
        .expect("booked")
        .booking
        .id;
    let settings = TenantSettings::default();

    match engine.bill_one(&booking, &settings) {
        Err(EngineError::RefundFailed {
            booking_id,
            charged_cents,
            ..
        }) => {
            assert_eq!(booking_id, booking);
            assert_eq!(charged_cents, 2500);
        }
        other => panic!("expected refund failure, got {other:?}"),
    }
    assert_eq!(balances.balance(&ada).expect("balance"), 2500);

    // The charge stuck, so the booking must not be billable again.
    assert!(engine
        .roster(&appointment)
        .expect("roster")
        .booking(&booking)
        .expect("booking")
        .is_billed);
    assert!(matches!(
        engine.bill_one(&booking, &settings),
        Err(EngineError::AlreadyBilled(_))
    ));
    assert_eq!(balances.balance(&ada).expect("balance"), 2500);
}

#[test]
fn unknown_booking_cannot_be_billed() {
    let harness = harness();
    assert!(matches!(
        harness.engine.bill_one(
            &crate::workflows::training::BookingId::new("bk-missing"),
            &TenantSettings::default()
        ),
        Err(EngineError::UnknownBooking(_))
    ));
}
