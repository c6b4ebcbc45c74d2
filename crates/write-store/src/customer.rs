use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::AggregateId;
use domain::customer::{CUSTOMERS_TABLE, CustomerRepositoryProvider};
use domain::unit_of_work::{AggregateWriter, EntityState};
use domain::{
    AggregateRoot, ChangeTracker, Customer, CustomerRecord, Email, Gender, StoreError,
    WriteRepository,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::classify;
use crate::store::{PgTransaction, PostgresStore};

const SELECT_COLUMNS: &str = "SELECT id, first_name, last_name, gender, email, date_of_birth, created_at, updated_at FROM customers";

fn row_to_record(row: PgRow) -> Result<CustomerRecord, StoreError> {
    let gender: String = row.try_get("gender").map_err(classify)?;
    let email: String = row.try_get("email").map_err(classify)?;

    Ok(CustomerRecord {
        id: AggregateId::from_uuid(row.try_get::<Uuid, _>("id").map_err(classify)?),
        first_name: row.try_get("first_name").map_err(classify)?,
        last_name: row.try_get("last_name").map_err(classify)?,
        gender: gender.parse::<Gender>().map_err(StoreError::database)?,
        email: Email::parse(&email).map_err(StoreError::database)?,
        date_of_birth: row.try_get::<NaiveDate, _>("date_of_birth").map_err(classify)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(classify)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(classify)?,
    })
}

/// Writes customer rows inside a [`PgTransaction`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PgCustomerWriter;

#[async_trait]
impl AggregateWriter<Customer, PgTransaction> for PgCustomerWriter {
    async fn insert(&self, tx: &mut PgTransaction, customer: &Customer) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO customers
                (id, first_name, last_name, gender, email, date_of_birth, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(customer.id().as_uuid())
        .bind(customer.first_name())
        .bind(customer.last_name())
        .bind(customer.gender().as_str())
        .bind(customer.email().as_str())
        .bind(customer.date_of_birth())
        .bind(customer.created_at())
        .bind(customer.updated_at())
        .execute(tx.connection())
        .await
        .map_err(classify)?;

        Ok(result.rows_affected())
    }

    async fn update(&self, tx: &mut PgTransaction, customer: &Customer) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET first_name = $2, last_name = $3, gender = $4, email = $5,
                date_of_birth = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(customer.id().as_uuid())
        .bind(customer.first_name())
        .bind(customer.last_name())
        .bind(customer.gender().as_str())
        .bind(customer.email().as_str())
        .bind(customer.date_of_birth())
        .bind(customer.updated_at())
        .execute(tx.connection())
        .await
        .map_err(classify)?;

        Ok(result.rows_affected())
    }
}

/// Customer repository over PostgreSQL, bound to one unit of work.
///
/// Reads go through the pool and see committed rows only.
pub struct PgCustomerRepository {
    pool: PgPool,
    tracker: ChangeTracker<PgTransaction>,
    writer: Arc<PgCustomerWriter>,
}

impl PgCustomerRepository {
    pub fn new(pool: PgPool, tracker: ChangeTracker<PgTransaction>) -> Self {
        Self {
            pool,
            tracker,
            writer: Arc::new(PgCustomerWriter),
        }
    }
}

#[async_trait]
impl WriteRepository<Customer> for PgCustomerRepository {
    type Key = Email;

    async fn exists_by_unique_key(&self, email: &Email) -> Result<bool, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT EXISTS(SELECT 1 FROM {CUSTOMERS_TABLE} WHERE email = $1)"
        ))
        .bind(email.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;

        row.try_get::<bool, _>(0).map_err(classify)
    }

    async fn get_by_id(&self, id: AggregateId) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        row.map(|row| row_to_record(row).map(Customer::restore))
            .transpose()
    }

    fn add(&self, customer: Customer) {
        self.tracker
            .track(customer, Arc::clone(&self.writer), EntityState::Added);
    }

    fn update(&self, customer: Customer) {
        self.tracker
            .track(customer, Arc::clone(&self.writer), EntityState::Modified);
    }
}

impl CustomerRepositoryProvider for PostgresStore {
    type Repository = PgCustomerRepository;

    fn customer_repository(&self, tracker: ChangeTracker<PgTransaction>) -> Self::Repository {
        PgCustomerRepository::new(self.pool().clone(), tracker)
    }
}
