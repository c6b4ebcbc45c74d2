//! Customer domain events.

use std::any::Any;

use chrono::{DateTime, NaiveDate, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use super::Gender;
use crate::aggregate::DomainEvent;

/// Events raised by the customer aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CustomerEvent {
    /// A customer was registered.
    CustomerCreated(CustomerCreatedData),

    /// A customer's email address changed.
    CustomerEmailChanged(CustomerEmailChangedData),
}

impl CustomerEvent {
    /// Every tag this enum produces, for decoder registration.
    pub const EVENT_TYPES: &'static [&'static str] = &["CustomerCreated", "CustomerEmailChanged"];
}

impl DomainEvent for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerCreated(_) => "CustomerCreated",
            CustomerEvent::CustomerEmailChanged(_) => "CustomerEmailChanged",
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            CustomerEvent::CustomerCreated(data) => data.customer_id,
            CustomerEvent::CustomerEmailChanged(data) => data.customer_id,
        }
    }

    fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Data for CustomerCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerCreatedData {
    pub customer_id: AggregateId,
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    pub email: String,
    pub date_of_birth: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Data for CustomerEmailChanged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerEmailChangedData {
    pub customer_id: AggregateId,
    pub old_email: String,
    pub new_email: String,
    pub changed_at: DateTime<Utc>,
}
