//! CreateCustomerHandler - idempotent customer registration keyed by email.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::billing::{validate_email, BillingError, Customer};
use crate::domain::foundation::UserId;
use crate::ports::{CreateCustomerRequest, CustomerRepository, PaymentProcessor};

#[derive(Debug, Clone, Default)]
pub struct CreateCustomerCommand {
    pub name: String,
    pub email: String,
    pub contact: Option<String>,
    pub user_id: Option<UserId>,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CreateCustomerResult {
    pub customer: Customer,
    /// False when an existing record was returned.
    pub created: bool,
}

pub struct CreateCustomerHandler {
    processor: Arc<dyn PaymentProcessor>,
    customers: Arc<dyn CustomerRepository>,
}

impl CreateCustomerHandler {
    pub fn new(processor: Arc<dyn PaymentProcessor>, customers: Arc<dyn CustomerRepository>) -> Self {
        Self {
            processor,
            customers,
        }
    }

    pub async fn handle(&self, cmd: CreateCustomerCommand) -> Result<CreateCustomerResult, BillingError> {
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(BillingError::missing("name"));
        }
        let email = cmd.email.trim().to_ascii_lowercase();
        if email.is_empty() {
            return Err(BillingError::missing("email"));
        }
        validate_email(&email)?;

        if let Some(existing) = self.customers.find_by_email(&email).await? {
            tracing::debug!(customer_id = %existing.id, "Customer already registered for email");
            let customer = self.merge_notes(existing, &cmd.notes).await?;
            return Ok(CreateCustomerResult {
                customer,
                created: false,
            });
        }

        // fail_existing = 0: the processor hands back its record for a known email
        let entity = self
            .processor
            .create_customer(CreateCustomerRequest {
                name: name.to_string(),
                email: email.clone(),
                contact: cmd.contact.clone(),
                fail_existing: "0".to_string(),
                notes: cmd
                    .notes
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect(),
            })
            .await
            .map_err(BillingError::Processor)?;

        let mut customer = Customer::create(
            entity.id,
            entity.name.unwrap_or_else(|| name.to_string()),
            entity.email.or(Some(email)),
            entity.contact.or(cmd.contact),
            cmd.user_id,
        )?;
        for (key, value) in cmd.notes {
            customer.set_note(key, value);
        }

        match self.customers.insert(&customer).await {
            Ok(()) => {
                tracing::info!(
                    customer_id = %customer.id,
                    razorpay_customer_id = %customer.razorpay_customer_id,
                    "Customer created"
                );
                Ok(CreateCustomerResult {
                    customer,
                    created: true,
                })
            }
            Err(err) if err.is_duplicate() => {
                tracing::debug!(
                    razorpay_customer_id = %customer.razorpay_customer_id,
                    "Concurrent customer registration, re-reading"
                );
                let existing = match self
                    .customers
                    .find_by_razorpay_id(&customer.razorpay_customer_id)
                    .await?
                {
                    Some(found) => Some(found),
                    None => match customer.email.as_deref() {
                        Some(email) => self.customers.find_by_email(email).await?,
                        None => None,
                    },
                };
                let customer = existing.ok_or(BillingError::Persistence(err))?;
                Ok(CreateCustomerResult {
                    customer,
                    created: false,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn merge_notes(
        &self,
        mut customer: Customer,
        notes: &BTreeMap<String, String>,
    ) -> Result<Customer, BillingError> {
        let mut dirty = false;
        for (key, value) in notes {
            if customer.notes.get(key) != Some(value) {
                customer.set_note(key.clone(), value.clone());
                dirty = true;
            }
        }
        if dirty {
            self.customers.update_notes(&customer).await?;
        }
        Ok(customer)
    }
}
