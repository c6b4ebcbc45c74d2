//! Customer command handler.

use common::AggregateId;

use super::{ChangeCustomerEmail, CreateCustomer, Customer, CustomerRepositoryProvider};
use crate::aggregate::AggregateRoot;
use crate::error::DomainError;
use crate::repository::WriteRepository;
use crate::unit_of_work::{SaveError, UnitOfWork, UnitOfWorkFactory};

/// Result of a command that committed.
///
/// `degraded` is set when the write is durable but propagating its events
/// to subscribers or the event log did not fully succeed.
#[derive(Debug)]
pub struct CommandOutcome {
    pub aggregate_id: AggregateId,
    pub degraded: Option<SaveError>,
}

impl CommandOutcome {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Executes customer commands, one unit of work per command.
pub struct CustomerCommandHandler<S: CustomerRepositoryProvider> {
    factory: UnitOfWorkFactory<S>,
}

impl<S: CustomerRepositoryProvider> Clone for CustomerCommandHandler<S> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
        }
    }
}

impl<S: CustomerRepositoryProvider> CustomerCommandHandler<S> {
    pub fn new(factory: UnitOfWorkFactory<S>) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &UnitOfWorkFactory<S> {
        &self.factory
    }

    /// Registers a customer.
    ///
    /// Rejects the command with [`DomainError::Conflict`] when the email is
    /// already taken, without opening a transaction. A concurrent registration
    /// that slips past the check is caught by the unique index at commit.
    #[tracing::instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn create_customer(&self, cmd: CreateCustomer) -> Result<CommandOutcome, DomainError> {
        let now = self.factory.clock().now();
        let details = cmd.validate(now.date_naive())?;

        let uow = self.factory.create();
        let repository = uow.store().customer_repository(uow.tracker());

        if repository.exists_by_unique_key(&details.email).await? {
            tracing::info!(email = %details.email, "email already in use");
            return Err(DomainError::Conflict("email already in use".to_string()));
        }

        let customer = Customer::create(cmd.customer_id, details, now);
        let id = customer.id();
        repository.add(customer);

        Self::finish(&uow, id).await
    }

    /// Changes a customer's email address.
    ///
    /// Setting the current address again succeeds without writing anything.
    #[tracing::instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn change_email(
        &self,
        cmd: ChangeCustomerEmail,
    ) -> Result<CommandOutcome, DomainError> {
        let email = cmd.validate()?;

        let uow = self.factory.create();
        let repository = uow.store().customer_repository(uow.tracker());

        let mut customer = repository
            .get_by_id(cmd.customer_id)
            .await?
            .ok_or(DomainError::NotFound {
                aggregate_type: Customer::aggregate_type(),
                aggregate_id: cmd.customer_id,
            })?;

        if customer.email() == &email {
            return Ok(CommandOutcome {
                aggregate_id: cmd.customer_id,
                degraded: None,
            });
        }

        if repository.exists_by_unique_key(&email).await? {
            return Err(DomainError::Conflict("email already in use".to_string()));
        }

        customer.change_email(email, self.factory.clock().now());
        repository.update(customer);

        Self::finish(&uow, cmd.customer_id).await
    }

    async fn finish(uow: &UnitOfWork<S>, id: AggregateId) -> Result<CommandOutcome, DomainError> {
        match uow.save_changes().await {
            Ok(()) => Ok(CommandOutcome {
                aggregate_id: id,
                degraded: None,
            }),
            Err(error) if error.is_committed() => {
                tracing::warn!(aggregate_id = %id, error = %error, "committed with degraded propagation");
                Ok(CommandOutcome {
                    aggregate_id: id,
                    degraded: Some(error),
                })
            }
            Err(error) if error.is_conflict() => {
                Err(DomainError::Conflict("email already in use".to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }
}
