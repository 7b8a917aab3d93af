use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::Customer;
use crate::domain::foundation::{CustomerId, DomainError, ErrorCode};
use crate::ports::CustomerRepository;

#[derive(Default)]
pub struct InMemoryCustomerRepository {
    customers: RwLock<Vec<Customer>>,
}

impl InMemoryCustomerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.customers.read().await.len()
    }
}

#[async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn insert(&self, customer: &Customer) -> Result<(), DomainError> {
        let mut customers = self.customers.write().await;
        if customers
            .iter()
            .any(|c| c.razorpay_customer_id == customer.razorpay_customer_id)
        {
            return Err(DomainError::duplicate(
                "razorpay_customer_id",
                &customer.razorpay_customer_id,
            ));
        }
        if let Some(email) = &customer.email {
            if customers.iter().any(|c| c.email.as_ref() == Some(email)) {
                return Err(DomainError::duplicate("email", email));
            }
        }
        customers.push(customer.clone());
        Ok(())
    }

    async fn update_notes(&self, customer: &Customer) -> Result<(), DomainError> {
        let mut customers = self.customers.write().await;
        let stored = customers
            .iter_mut()
            .find(|c| c.id == customer.id)
            .ok_or_else(|| DomainError::new(ErrorCode::CustomerNotFound, "Customer not found"))?;
        stored.notes = customer.notes.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, DomainError> {
        Ok(self
            .customers
            .read()
            .await
            .iter()
            .find(|c| &c.id == id)
            .cloned())
    }

    async fn find_by_razorpay_id(
        &self,
        razorpay_customer_id: &str,
    ) -> Result<Option<Customer>, DomainError> {
        Ok(self
            .customers
            .read()
            .await
            .iter()
            .find(|c| c.razorpay_customer_id == razorpay_customer_id)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, DomainError> {
        let email = email.trim().to_ascii_lowercase();
        Ok(self
            .customers
            .read()
            .await
            .iter()
            .find(|c| c.email.as_deref() == Some(email.as_str()))
            .cloned())
    }
}
