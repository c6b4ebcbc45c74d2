//! Customer repository over the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;

use super::repository::{CUSTOMERS_EMAIL_KEY, CUSTOMERS_TABLE, CustomerRepositoryProvider};
use super::{Customer, CustomerRecord, Email};
use crate::aggregate::AggregateRoot;
use crate::repository::WriteRepository;
use crate::unit_of_work::{
    AggregateWriter, ChangeTracker, EntityState, InMemoryStore, MemoryTransaction, StoreError,
    UniqueKey,
};

/// Writes customer rows into a [`MemoryTransaction`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomerRowWriter;

impl CustomerRowWriter {
    fn row(customer: &Customer) -> Result<(serde_json::Value, Vec<UniqueKey>), StoreError> {
        let data = serde_json::to_value(customer.to_record())?;
        let keys = vec![(CUSTOMERS_EMAIL_KEY, customer.email().to_string())];
        Ok((data, keys))
    }
}

#[async_trait]
impl AggregateWriter<Customer, MemoryTransaction> for CustomerRowWriter {
    async fn insert(&self, tx: &mut MemoryTransaction, customer: &Customer) -> Result<u64, StoreError> {
        let (data, keys) = Self::row(customer)?;
        tx.insert(CUSTOMERS_TABLE, customer.id(), data, keys).await
    }

    async fn update(&self, tx: &mut MemoryTransaction, customer: &Customer) -> Result<u64, StoreError> {
        let (data, keys) = Self::row(customer)?;
        tx.update(CUSTOMERS_TABLE, customer.id(), data, keys).await
    }
}

/// Customer repository bound to one unit of work.
pub struct InMemoryCustomerRepository {
    store: InMemoryStore,
    tracker: ChangeTracker<MemoryTransaction>,
    writer: Arc<CustomerRowWriter>,
}

impl InMemoryCustomerRepository {
    pub fn new(store: InMemoryStore, tracker: ChangeTracker<MemoryTransaction>) -> Self {
        Self {
            store,
            tracker,
            writer: Arc::new(CustomerRowWriter),
        }
    }
}

#[async_trait]
impl WriteRepository<Customer> for InMemoryCustomerRepository {
    type Key = Email;

    async fn exists_by_unique_key(&self, email: &Email) -> Result<bool, StoreError> {
        Ok(self
            .store
            .exists_unique(CUSTOMERS_TABLE, CUSTOMERS_EMAIL_KEY, email.as_str())
            .await)
    }

    async fn get_by_id(&self, id: AggregateId) -> Result<Option<Customer>, StoreError> {
        match self.store.get_row(CUSTOMERS_TABLE, id).await {
            Some(row) => {
                let record: CustomerRecord = serde_json::from_value(row)?;
                Ok(Some(Customer::restore(record)))
            }
            None => Ok(None),
        }
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

impl CustomerRepositoryProvider for InMemoryStore {
    type Repository = InMemoryCustomerRepository;

    fn customer_repository(&self, tracker: ChangeTracker<MemoryTransaction>) -> Self::Repository {
        InMemoryCustomerRepository::new(self.clone(), tracker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customer::{Gender, NewCustomer};
    use crate::unit_of_work::TransactionalStore;
    use chrono::{NaiveDate, Utc};

    fn customer(email: &str) -> Customer {
        Customer::create(
            AggregateId::new(),
            NewCustomer {
                first_name: "Ana".into(),
                last_name: "Silva".into(),
                gender: Gender::Female,
                email: Email::parse(email).unwrap(),
                date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 12).unwrap(),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn add_only_tracks_until_persisted() {
        let store = InMemoryStore::new();
        let tracker = ChangeTracker::new();
        let repo = store.customer_repository(tracker.clone());
        let email = Email::parse("ana@example.com").unwrap();

        repo.add(customer("ana@example.com"));
        assert_eq!(tracker.len(), 1);
        assert!(!repo.exists_by_unique_key(&email).await.unwrap());
    }

    #[tokio::test]
    async fn written_row_reads_back_without_events() {
        let store = InMemoryStore::new();
        let repo = store.customer_repository(ChangeTracker::new());
        let original = customer("ana@example.com");
        let id = original.id();

        let mut tx = store.begin().await.unwrap();
        CustomerRowWriter.insert(&mut tx, &original).await.unwrap();
        store.commit(tx).await.unwrap();

        let loaded = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(loaded.to_record(), original.to_record());
        assert!(loaded.pending_events().is_empty());
        assert!(
            repo.exists_by_unique_key(&Email::parse("ANA@example.com").unwrap())
                .await
                .unwrap()
        );
        assert!(repo.get_by_id(AggregateId::new()).await.unwrap().is_none());
    }
}
