//! Customer command and query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::NaiveDate;
use common::AggregateId;
use domain::{
    ChangeCustomerEmail, CommandOutcome, CreateCustomer, CustomerCommandHandler,
    CustomerRepositoryProvider,
};
use event_store::EventLogStore;
use projections::{CustomerSummary, CustomerView, ProjectionProcessor};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state for customer routes.
pub struct AppState<S: CustomerRepositoryProvider> {
    pub handler: CustomerCommandHandler<S>,
    pub customers: CustomerView,
    pub event_log: Arc<dyn EventLogStore>,
    pub processor: Arc<ProjectionProcessor>,
}

/// Request body for creating a customer.
#[derive(Deserialize)]
pub struct CreateCustomerRequest {
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub email: String,
    pub date_of_birth: NaiveDate,
}

/// Request body for changing a customer's email.
#[derive(Deserialize)]
pub struct ChangeEmailRequest {
    pub email: String,
}

/// Response for an accepted command.
///
/// `warning` is present when the change is committed but its events did not
/// fully reach subscribers or the event log.
#[derive(Serialize)]
pub struct CommandResponse {
    pub customer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Serialize)]
pub struct CustomerResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub gender: String,
    pub email: String,
    pub date_of_birth: NaiveDate,
    pub created_at: String,
    pub updated_at: String,
}

impl From<CustomerSummary> for CustomerResponse {
    fn from(c: CustomerSummary) -> Self {
        Self {
            id: c.id.to_string(),
            full_name: c.full_name(),
            first_name: c.first_name,
            last_name: c.last_name,
            gender: c.gender.to_string(),
            email: c.email,
            date_of_birth: c.date_of_birth,
            created_at: c.created_at.to_rfc3339(),
            updated_at: c.updated_at.to_rfc3339(),
        }
    }
}

/// Response type for event envelope data.
#[derive(Serialize)]
pub struct EventEnvelopeResponse {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_id: String,
    pub occurred_at: String,
    pub payload: serde_json::Value,
}

fn command_response(success: StatusCode, outcome: CommandOutcome) -> (StatusCode, Json<CommandResponse>) {
    match outcome.degraded {
        None => (
            success,
            Json(CommandResponse {
                customer_id: outcome.aggregate_id.to_string(),
                warning: None,
            }),
        ),
        Some(error) => (
            StatusCode::ACCEPTED,
            Json(CommandResponse {
                customer_id: outcome.aggregate_id.to_string(),
                warning: Some(error.to_string()),
            }),
        ),
    }
}

/// POST /customers — register a new customer.
#[tracing::instrument(skip(state, request), fields(email = %request.email))]
pub async fn create<S: CustomerRepositoryProvider>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let command = CreateCustomer::new(
        request.first_name,
        request.last_name,
        request.gender,
        request.email,
        request.date_of_birth,
    );

    let outcome = state.handler.create_customer(command).await?;
    metrics::counter!("api_customers_created_total").increment(1);

    Ok(command_response(StatusCode::CREATED, outcome))
}

/// PUT /customers/:id/email — change a customer's email address.
#[tracing::instrument(skip(state, request))]
pub async fn change_email<S: CustomerRepositoryProvider>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(request): Json<ChangeEmailRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let customer_id = parse_aggregate_id(&id)?;

    let outcome = state
        .handler
        .change_email(ChangeCustomerEmail::new(customer_id, request.email))
        .await?;

    Ok(command_response(StatusCode::OK, outcome))
}

/// GET /customers — every customer, ordered by first name then date of birth.
#[tracing::instrument(skip(state))]
pub async fn list<S: CustomerRepositoryProvider>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<Vec<CustomerResponse>> {
    let customers = state.customers.get_all().await;
    Json(customers.into_iter().map(CustomerResponse::from).collect())
}

/// GET /customers/:id — one customer from the read model.
#[tracing::instrument(skip(state))]
pub async fn get<S: CustomerRepositoryProvider>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let customer_id = parse_aggregate_id(&id)?;

    state
        .customers
        .get_by_id(customer_id)
        .await
        .map(|c| Json(c.into()))
        .ok_or_else(|| ApiError::NotFound(format!("Customer {id} not found")))
}

/// GET /customers/by-email/:email — look a customer up by email address.
#[tracing::instrument(skip(state))]
pub async fn get_by_email<S: CustomerRepositoryProvider>(
    State(state): State<Arc<AppState<S>>>,
    Path(email): Path<String>,
) -> Result<Json<CustomerResponse>, ApiError> {
    state
        .customers
        .get_by_email(&email)
        .await
        .map(|c| Json(c.into()))
        .ok_or_else(|| ApiError::NotFound(format!("No customer with email {email}")))
}

/// GET /customers/:id/events — the customer's envelopes in the event log.
#[tracing::instrument(skip(state))]
pub async fn events<S: CustomerRepositoryProvider>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<EventEnvelopeResponse>>, ApiError> {
    let aggregate_id = parse_aggregate_id(&id)?;

    let envelopes = state.event_log.get_events_for_aggregate(aggregate_id).await?;

    let responses = envelopes
        .into_iter()
        .map(|e| EventEnvelopeResponse {
            event_id: e.id().to_string(),
            event_type: e.event_type().to_string(),
            aggregate_id: e.aggregate_id().to_string(),
            occurred_at: e.occurred_at().to_rfc3339(),
            payload: e
                .payload_json()
                .unwrap_or_else(|_| serde_json::Value::String(e.payload().to_string())),
        })
        .collect();

    Ok(Json(responses))
}

/// POST /customers/rebuild — reset the read model and replay the event log.
#[tracing::instrument(skip(state))]
pub async fn rebuild<S: CustomerRepositoryProvider>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let replayed = state
        .processor
        .rebuild_all()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(serde_json::json!({ "events_replayed": replayed })))
}

fn parse_aggregate_id(id: &str) -> Result<AggregateId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(AggregateId::from_uuid(uuid))
}
