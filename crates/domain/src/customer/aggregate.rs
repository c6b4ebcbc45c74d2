//! Customer aggregate.

use chrono::{DateTime, NaiveDate, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use super::events::{CustomerCreatedData, CustomerEmailChangedData, CustomerEvent};
use super::{Email, Gender};
use crate::aggregate::{AggregateRoot, EventBuffer};

/// Validated input for registering a customer.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    pub email: Email,
    pub date_of_birth: NaiveDate,
}

/// Persisted customer state, as stored in the write model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: AggregateId,
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    pub email: Email,
    pub date_of_birth: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A shop customer.
///
/// State lives in the relational write model; the events raised here are
/// drained by the unit of work when the customer is saved.
#[derive(Debug, Clone)]
pub struct Customer {
    id: AggregateId,
    first_name: String,
    last_name: String,
    gender: Gender,
    email: Email,
    date_of_birth: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: EventBuffer<CustomerEvent>,
}

impl Customer {
    /// Registers a new customer, raising `CustomerCreated`.
    pub fn create(id: AggregateId, details: NewCustomer, now: DateTime<Utc>) -> Self {
        let NewCustomer {
            first_name,
            last_name,
            gender,
            email,
            date_of_birth,
        } = details;

        let mut customer = Self {
            id,
            first_name,
            last_name,
            gender,
            email,
            date_of_birth,
            created_at: now,
            updated_at: now,
            events: EventBuffer::new(),
        };

        customer
            .events
            .raise(CustomerEvent::CustomerCreated(CustomerCreatedData {
                customer_id: id,
                first_name: customer.first_name.clone(),
                last_name: customer.last_name.clone(),
                gender,
                email: customer.email.to_string(),
                date_of_birth,
                created_at: now,
            }));

        customer
    }

    /// Rehydrates a stored customer. The event buffer starts empty.
    pub fn restore(record: CustomerRecord) -> Self {
        Self {
            id: record.id,
            first_name: record.first_name,
            last_name: record.last_name,
            gender: record.gender,
            email: record.email,
            date_of_birth: record.date_of_birth,
            created_at: record.created_at,
            updated_at: record.updated_at,
            events: EventBuffer::new(),
        }
    }

    /// Changes the email address, raising `CustomerEmailChanged`.
    ///
    /// Returns `false` and raises nothing when the address is unchanged.
    pub fn change_email(&mut self, email: Email, now: DateTime<Utc>) -> bool {
        if email == self.email {
            return false;
        }

        let old = std::mem::replace(&mut self.email, email);
        self.updated_at = now;
        self.events
            .raise(CustomerEvent::CustomerEmailChanged(CustomerEmailChangedData {
                customer_id: self.id,
                old_email: old.to_string(),
                new_email: self.email.to_string(),
                changed_at: now,
            }));
        true
    }

    pub fn to_record(&self) -> CustomerRecord {
        CustomerRecord {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            gender: self.gender,
            email: self.email.clone(),
            date_of_birth: self.date_of_birth,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn date_of_birth(&self) -> NaiveDate {
        self.date_of_birth
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl AggregateRoot for Customer {
    type Event = CustomerEvent;

    fn aggregate_type() -> &'static str {
        "Customer"
    }

    fn id(&self) -> AggregateId {
        self.id
    }

    fn pending_events(&self) -> &[CustomerEvent] {
        self.events.as_slice()
    }

    fn take_pending_events(&mut self) -> Vec<CustomerEvent> {
        self.events.take()
    }
}
