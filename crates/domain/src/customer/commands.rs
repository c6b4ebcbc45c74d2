//! Customer commands.

use chrono::NaiveDate;
use common::AggregateId;

use super::{Email, Gender, NewCustomer};
use crate::error::DomainError;

const MAX_NAME_LEN: usize = 100;

/// Command to register a new customer.
#[derive(Debug, Clone)]
pub struct CreateCustomer {
    /// Identity the customer will get.
    pub customer_id: AggregateId,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub email: String,
    pub date_of_birth: NaiveDate,
}

impl CreateCustomer {
    /// Creates the command with a generated customer id.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        gender: impl Into<String>,
        email: impl Into<String>,
        date_of_birth: NaiveDate,
    ) -> Self {
        Self {
            customer_id: AggregateId::new(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            gender: gender.into(),
            email: email.into(),
            date_of_birth,
        }
    }

    pub fn with_id(mut self, customer_id: AggregateId) -> Self {
        self.customer_id = customer_id;
        self
    }

    /// Checks every field and collects all failures.
    ///
    /// `today` bounds the date of birth, which must lie strictly before it.
    pub fn validate(&self, today: NaiveDate) -> Result<NewCustomer, DomainError> {
        let mut errors = Vec::new();

        let first_name = check_name("first name", &self.first_name, &mut errors);
        let last_name = check_name("last name", &self.last_name, &mut errors);

        let gender = self
            .gender
            .parse::<Gender>()
            .map_err(|e| errors.push(e.to_string()))
            .ok();

        let email = Email::parse(&self.email)
            .map_err(|e| errors.push(e.to_string()))
            .ok();

        if self.date_of_birth >= today {
            errors.push("date of birth must be in the past".to_string());
        }

        match (gender, email) {
            (Some(gender), Some(email)) if errors.is_empty() => Ok(NewCustomer {
                first_name,
                last_name,
                gender,
                email,
                date_of_birth: self.date_of_birth,
            }),
            _ => Err(DomainError::Validation(errors)),
        }
    }
}

fn check_name(field: &str, value: &str, errors: &mut Vec<String>) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.push(format!("{field} is required"));
    } else if trimmed.chars().count() > MAX_NAME_LEN {
        errors.push(format!("{field} exceeds {MAX_NAME_LEN} characters"));
    }
    trimmed.to_string()
}

/// Command to change a customer's email address.
#[derive(Debug, Clone)]
pub struct ChangeCustomerEmail {
    pub customer_id: AggregateId,
    pub new_email: String,
}

impl ChangeCustomerEmail {
    pub fn new(customer_id: AggregateId, new_email: impl Into<String>) -> Self {
        Self {
            customer_id,
            new_email: new_email.into(),
        }
    }

    pub fn validate(&self) -> Result<Email, DomainError> {
        Email::parse(&self.new_email).map_err(|e| DomainError::Validation(vec![e.to_string()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn dob() -> NaiveDate {
        NaiveDate::from_ymd_opt(1990, 4, 12).unwrap()
    }

    #[test]
    fn valid_command_yields_normalized_details() {
        let cmd = CreateCustomer::new(" Ana ", "Silva", "female", "Ana@Example.com", dob());
        let details = cmd.validate(today()).unwrap();

        assert_eq!(details.first_name, "Ana");
        assert_eq!(details.gender, Gender::Female);
        assert_eq!(details.email.as_str(), "ana@example.com");
    }

    #[test]
    fn validation_collects_every_failure() {
        let cmd = CreateCustomer::new("", "x".repeat(101), "robot", "nope", today());

        match cmd.validate(today()) {
            Err(DomainError::Validation(errors)) => {
                assert_eq!(errors.len(), 5, "{errors:?}");
                assert!(errors.iter().any(|e| e.contains("first name is required")));
                assert!(errors.iter().any(|e| e.contains("last name exceeds")));
                assert!(errors.iter().any(|e| e.contains("gender")));
                assert!(errors.iter().any(|e| e.contains("not a valid address")));
                assert!(errors.iter().any(|e| e.contains("date of birth")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn change_email_validates_address() {
        let id = AggregateId::new();
        assert!(ChangeCustomerEmail::new(id, "b@x.io").validate().is_ok());
        assert!(matches!(
            ChangeCustomerEmail::new(id, "bad").validate(),
            Err(DomainError::Validation(_))
        ));
    }
}
