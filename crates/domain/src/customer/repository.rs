use super::{Customer, Email};
use crate::repository::WriteRepository;
use crate::unit_of_work::{ChangeTracker, TransactionalStore};

/// Relational table holding customers.
pub const CUSTOMERS_TABLE: &str = "customers";

/// Unique index on the customer email.
pub const CUSTOMERS_EMAIL_KEY: &str = "customers_email_key";

/// A store that can hand out customer repositories bound to a unit of work.
pub trait CustomerRepositoryProvider: TransactionalStore + Clone {
    type Repository: WriteRepository<Customer, Key = Email>;

    fn customer_repository(&self, tracker: ChangeTracker<Self::Transaction>) -> Self::Repository;
}
