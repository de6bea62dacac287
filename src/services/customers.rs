use crate::{
    entities::{customer, Customer},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Normalizes an email for lookup and storage: trimmed, lower-cased.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Customer registry: race-safe get-or-create keyed by normalized email.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the customer for an email, creating one on first sight.
    ///
    /// Safe to call concurrently for the same new address: the unique index
    /// on `customers.email` turns the losing insert into a conflict, which is
    /// resolved by re-querying rather than surfaced. All callers converge on
    /// one row.
    #[instrument(skip(self))]
    pub async fn get_or_create(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<customer::Model, ServiceError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ServiceError::ValidationError(
                "Email must not be empty".to_string(),
            ));
        }

        if let Some(existing) = self.find_by_email(&email).await? {
            return Ok(existing);
        }

        let customer_id = Uuid::new_v4();
        let now = Utc::now();
        let model = customer::ActiveModel {
            id: Set(customer_id),
            email: Set(email.clone()),
            first_name: Set(first_name.trim().to_string()),
            last_name: Set(last_name.trim().to_string()),
            payment_provider_ref: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match model.insert(&*self.db).await {
            Ok(created) => {
                self.event_sender
                    .send_or_log(Event::CustomerCreated(customer_id))
                    .await;
                info!(customer_id = %customer_id, "Created customer");
                Ok(created)
            }
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                // Lost the race to a concurrent checkout; the winner's row is
                // the canonical one.
                warn!(email = %email, "Concurrent customer creation, re-querying");
                self.find_by_email(&email).await?.ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "Customer {} vanished after conflicting insert",
                        email
                    ))
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Links the external payment-provider customer id. One-way: once a
    /// non-empty reference is stored, later calls are no-ops.
    #[instrument(skip(self))]
    pub async fn link_payment_provider_ref(
        &self,
        customer_id: Uuid,
        external_id: &str,
    ) -> Result<customer::Model, ServiceError> {
        let customer = Customer::find_by_id(customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", customer_id))
            })?;

        if let Some(existing) = &customer.payment_provider_ref {
            if !existing.is_empty() {
                return Ok(customer);
            }
        }

        let mut active: customer::ActiveModel = customer.into();
        active.payment_provider_ref = Set(Some(external_id.to_string()));
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;
        info!(customer_id = %customer_id, "Linked payment provider customer");
        Ok(updated)
    }

    pub async fn find_by_email(
        &self,
        email: &str,
    ) -> Result<Option<customer::Model>, ServiceError> {
        Customer::find()
            .filter(customer::Column::Email.eq(normalize_email(email)))
            .one(&*self.db)
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization_trims_and_lowercases() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM  "), "jane.doe@example.com");
        assert_eq!(normalize_email("a@b.c"), "a@b.c");
        assert_eq!(normalize_email("   "), "");
    }

    #[test]
    fn case_variants_normalize_to_one_key() {
        let variants = ["USER@example.com", "user@EXAMPLE.com", " user@example.com "];
        let normalized: Vec<String> = variants.iter().map(|v| normalize_email(v)).collect();
        assert!(normalized.iter().all(|n| n == "user@example.com"));
    }
}
