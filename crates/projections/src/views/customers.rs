//! Customer read model — one denormalized row per customer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::AggregateId;
use domain::customer::{CustomerCreatedData, CustomerEmailChangedData, CustomerEvent};
use domain::{EventHandler, Gender, HandlerError, InProcessEventBus};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// A customer as served to queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerSummary {
    pub id: AggregateId,
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    pub email: String,
    pub date_of_birth: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerSummary {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Default)]
struct CustomerViewState {
    customers: HashMap<AggregateId, CustomerSummary>,
    /// Maps normalized email -> customer id.
    by_email: HashMap<String, AggregateId>,
    position: ProjectionPosition,
}

impl CustomerViewState {
    fn apply_created(&mut self, data: &CustomerCreatedData) {
        if let Some(previous) = self.customers.get(&data.customer_id) {
            self.by_email.remove(&previous.email);
        }
        self.by_email.insert(data.email.clone(), data.customer_id);
        self.customers.insert(
            data.customer_id,
            CustomerSummary {
                id: data.customer_id,
                first_name: data.first_name.clone(),
                last_name: data.last_name.clone(),
                gender: data.gender,
                email: data.email.clone(),
                date_of_birth: data.date_of_birth,
                created_at: data.created_at,
                updated_at: data.created_at,
            },
        );
    }

    /// Returns `false` when the customer is unknown, which happens when the
    /// log is missing its `CustomerCreated` envelope.
    fn apply_email_changed(&mut self, data: &CustomerEmailChangedData) -> bool {
        let Some(customer) = self.customers.get_mut(&data.customer_id) else {
            tracing::warn!(
                customer_id = %data.customer_id,
                "email change for unknown customer, skipping"
            );
            return false;
        };

        self.by_email.remove(&customer.email);
        customer.email = data.new_email.clone();
        customer.updated_at = data.changed_at;
        self.by_email.insert(data.new_email.clone(), data.customer_id);
        true
    }
}

/// In-memory customer read model.
///
/// Subscribe it to the bus with [`CustomerView::subscribe`]; clones share
/// state, so the subscribed copy and the queried copy stay in sync.
#[derive(Clone, Default)]
pub struct CustomerView {
    state: Arc<RwLock<CustomerViewState>>,
}

impl CustomerView {
    /// Creates a new empty customer view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers this view as a `CustomerEvent` handler on `bus`.
    pub fn subscribe(&self, bus: &InProcessEventBus) {
        bus.subscribe::<CustomerEvent, _>(Arc::new(self.clone()));
    }

    pub async fn get_by_id(&self, id: AggregateId) -> Option<CustomerSummary> {
        self.state.read().await.customers.get(&id).cloned()
    }

    /// Looks a customer up by email, ignoring case and surrounding whitespace.
    pub async fn get_by_email(&self, email: &str) -> Option<CustomerSummary> {
        let key = email.trim().to_lowercase();
        let state = self.state.read().await;
        state
            .by_email
            .get(&key)
            .and_then(|id| state.customers.get(id))
            .cloned()
    }

    /// Every customer, ordered by first name then date of birth.
    pub async fn get_all(&self) -> Vec<CustomerSummary> {
        let state = self.state.read().await;
        let mut customers: Vec<_> = state.customers.values().cloned().collect();
        customers.sort_by(|a, b| {
            a.first_name
                .cmp(&b.first_name)
                .then(a.date_of_birth.cmp(&b.date_of_birth))
        });
        customers
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.customers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.customers.is_empty()
    }
}

#[async_trait]
impl EventHandler<CustomerEvent> for CustomerView {
    fn name(&self) -> &str {
        "CustomerView"
    }

    async fn handle(&self, event: &CustomerEvent) -> std::result::Result<(), HandlerError> {
        let mut state = self.state.write().await;

        let applied = match event {
            CustomerEvent::CustomerCreated(data) => {
                state.apply_created(data);
                true
            }
            CustomerEvent::CustomerEmailChanged(data) => state.apply_email_changed(data),
        };

        if applied {
            state.position = state.position.advance();
        }
        Ok(())
    }
}

#[async_trait]
impl Projection for CustomerView {
    fn name(&self) -> &'static str {
        "CustomerView"
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.customers.clear();
        state.by_email.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for CustomerView {
    fn name(&self) -> &'static str {
        "CustomerView"
    }

    fn count(&self) -> usize {
        self.state
            .try_read()
            .map(|s| s.customers.len())
            .unwrap_or(0)
    }
}
