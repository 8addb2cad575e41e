//! In-process storage backing the HTTP service and the test suites.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use super::domain::{Appointment, AppointmentId, BookingId, CustomerId, Subject};
use super::repository::{
    AppointmentBook, AppointmentRepository, BalanceError, BalanceLedger, ProgressionRepository,
    RepositoryError, SubjectLedger,
};

fn poisoned<T>(_: PoisonError<T>) -> RepositoryError {
    RepositoryError::Unavailable("lock poisoned".to_string())
}

/// Appointment books, each behind its own lock so contention stays per appointment.
#[derive(Default)]
pub struct InMemoryAppointments {
    books: Mutex<HashMap<AppointmentId, Arc<Mutex<AppointmentBook>>>>,
    booking_index: Mutex<HashMap<BookingId, AppointmentId>>,
}

impl InMemoryAppointments {
    fn slot(&self, id: &AppointmentId) -> Result<Arc<Mutex<AppointmentBook>>, RepositoryError> {
        let books = self.books.lock().map_err(poisoned)?;
        books.get(id).cloned().ok_or(RepositoryError::NotFound)
    }

    fn index(&self, book: &AppointmentBook) -> Result<(), RepositoryError> {
        let mut index = self.booking_index.lock().map_err(poisoned)?;
        for booking in &book.bookings {
            index
                .entry(booking.id.clone())
                .or_insert_with(|| book.appointment.id.clone());
        }
        Ok(())
    }
}

impl AppointmentRepository for InMemoryAppointments {
    fn insert(&self, book: AppointmentBook) -> Result<(), RepositoryError> {
        let mut books = self.books.lock().map_err(poisoned)?;
        if books.contains_key(&book.appointment.id) {
            return Err(RepositoryError::Conflict);
        }
        self.index(&book)?;
        books.insert(book.appointment.id.clone(), Arc::new(Mutex::new(book)));
        Ok(())
    }

    fn fetch(&self, id: &AppointmentId) -> Result<Option<AppointmentBook>, RepositoryError> {
        let slot = match self.slot(id) {
            Ok(slot) => slot,
            Err(RepositoryError::NotFound) => return Ok(None),
            Err(other) => return Err(other),
        };
        let book = slot.lock().map_err(poisoned)?;
        Ok(Some(book.clone()))
    }

    fn locate(&self, booking: &BookingId) -> Result<Option<AppointmentId>, RepositoryError> {
        let index = self.booking_index.lock().map_err(poisoned)?;
        Ok(index.get(booking).cloned())
    }

    fn list(&self) -> Result<Vec<Appointment>, RepositoryError> {
        let slots: Vec<Arc<Mutex<AppointmentBook>>> = {
            let books = self.books.lock().map_err(poisoned)?;
            books.values().cloned().collect()
        };
        let mut appointments = Vec::with_capacity(slots.len());
        for slot in slots {
            let book = slot.lock().map_err(poisoned)?;
            appointments.push(book.appointment.clone());
        }
        appointments.sort_by(|a, b| (a.start_time, &a.id).cmp(&(b.start_time, &b.id)));
        Ok(appointments)
    }

    fn transact<T, E, F>(&self, id: &AppointmentId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut AppointmentBook) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let slot = self.slot(id)?;
        let mut guard = slot.lock().map_err(poisoned)?;
        let mut draft = guard.clone();
        let value = work(&mut draft)?;
        self.index(&draft)?;
        *guard = draft;
        Ok(value)
    }
}

#[derive(Default)]
pub struct InMemoryProgression {
    ledgers: Mutex<HashMap<Subject, Arc<Mutex<SubjectLedger>>>>,
}

impl InMemoryProgression {
    fn slot(&self, subject: &Subject) -> Result<Arc<Mutex<SubjectLedger>>, RepositoryError> {
        let mut ledgers = self.ledgers.lock().map_err(poisoned)?;
        Ok(ledgers
            .entry(subject.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SubjectLedger::new(subject.clone()))))
            .clone())
    }
}

impl ProgressionRepository for InMemoryProgression {
    fn snapshot(&self, subject: &Subject) -> Result<SubjectLedger, RepositoryError> {
        let existing = {
            let ledgers = self.ledgers.lock().map_err(poisoned)?;
            ledgers.get(subject).cloned()
        };
        let Some(slot) = existing else {
            return Ok(SubjectLedger::new(subject.clone()));
        };
        let ledger = slot.lock().map_err(poisoned)?;
        Ok(ledger.clone())
    }

    fn transact<T, E, F>(&self, subject: &Subject, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut SubjectLedger) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let slot = self.slot(subject)?;
        let mut guard = slot.lock().map_err(poisoned)?;
        let mut draft = guard.clone();
        let value = work(&mut draft)?;
        *guard = draft;
        Ok(value)
    }
}

/// One movement on a customer account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceEntry {
    pub customer_id: CustomerId,
    pub delta_cents: i64,
    pub balance_after_cents: i64,
    pub reference: String,
}

#[derive(Default)]
struct Account {
    balance_cents: i64,
    entries: Vec<BalanceEntry>,
}

#[derive(Default)]
pub struct InMemoryBalances {
    accounts: Mutex<HashMap<CustomerId, Account>>,
}

impl InMemoryBalances {
    pub fn entries(&self, customer: &CustomerId) -> Result<Vec<BalanceEntry>, BalanceError> {
        let accounts = self.lock()?;
        Ok(accounts
            .get(customer)
            .map(|account| account.entries.clone())
            .unwrap_or_default())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<CustomerId, Account>>, BalanceError> {
        self.accounts
            .lock()
            .map_err(|_| BalanceError::Unavailable("lock poisoned".to_string()))
    }

    fn apply(
        &self,
        customer: &CustomerId,
        delta_cents: i64,
        reference: &str,
    ) -> Result<i64, BalanceError> {
        let mut accounts = self.lock()?;
        let account = accounts.entry(customer.clone()).or_default();
        let balance_after_cents = account.balance_cents + delta_cents;
        if balance_after_cents < 0 {
            return Err(BalanceError::Insufficient {
                customer: customer.clone(),
                required_cents: -delta_cents,
                available_cents: account.balance_cents,
            });
        }
        account.balance_cents = balance_after_cents;
        account.entries.push(BalanceEntry {
            customer_id: customer.clone(),
            delta_cents,
            balance_after_cents,
            reference: reference.to_string(),
        });
        Ok(balance_after_cents)
    }
}

impl BalanceLedger for InMemoryBalances {
    fn balance(&self, customer: &CustomerId) -> Result<i64, BalanceError> {
        let accounts = self.lock()?;
        Ok(accounts
            .get(customer)
            .map(|account| account.balance_cents)
            .unwrap_or_default())
    }

    fn debit(
        &self,
        customer: &CustomerId,
        amount_cents: i64,
        reference: &str,
    ) -> Result<i64, BalanceError> {
        if amount_cents <= 0 {
            return Err(BalanceError::InvalidAmount(amount_cents));
        }
        self.apply(customer, -amount_cents, reference)
    }

    fn credit(
        &self,
        customer: &CustomerId,
        amount_cents: i64,
        reference: &str,
    ) -> Result<i64, BalanceError> {
        if amount_cents <= 0 {
            return Err(BalanceError::InvalidAmount(amount_cents));
        }
        self.apply(customer, amount_cents, reference)
    }
}
