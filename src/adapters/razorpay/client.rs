//! Razorpay REST client.
//!
//! Implements the `PaymentProcessor` port over Razorpay's v1 API with HTTP
//! basic auth (key id / key secret) and JSON bodies.
//!
//! # Errors
//!
//! Razorpay answers failures with `{"error": {"code", "description", "field"}}`.
//! The envelope is carried into `ProcessorError` verbatim. Unknown ids come
//! back as `400 BAD_REQUEST_ERROR "... does not exist"` rather than 404, so
//! both are treated as not-found. Timeouts and connection failures are
//! `ProcessorErrorKind::Network` and never a presumed success.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ProcessorConfig;
use crate::domain::billing::{ProcessorError, ProcessorErrorKind};
use crate::ports::{
    AddonEntity, CreateAddonRequest, CreateCustomerRequest, CreateOrderRequest,
    CreateSubscriptionRequest, CustomerEntity, OrderEntity, PaymentEntity, PaymentProcessor,
    PlanEntity, SubscriptionEntity,
};

/// Connection settings for [`RazorpayClient`].
#[derive(Clone)]
pub struct RazorpayConfig {
    key_id: String,
    key_secret: SecretString,
    api_base_url: String,
    request_timeout: Duration,
}

impl RazorpayConfig {
    pub fn new(key_id: impl Into<String>, key_secret: SecretString) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret,
            api_base_url: "https://api.razorpay.com".to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl From<&ProcessorConfig> for RazorpayConfig {
    fn from(config: &ProcessorConfig) -> Self {
        RazorpayConfig::new(config.key_id.clone(), config.key_secret.clone())
            .with_base_url(config.api_base_url.clone())
            .with_timeout(config.request_timeout())
    }
}

impl std::fmt::Debug for RazorpayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayConfig")
            .field("key_id", &self.key_id)
            .field("key_secret", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

pub struct RazorpayClient {
    config: RazorpayConfig,
    http_client: reqwest::Client,
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Result<Self, ProcessorError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProcessorError::network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base_url, path)
    }

    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ProcessorError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .http_client
            .request(method.clone(), self.url(path))
            .basic_auth(&self.config.key_id, Some(self.config.key_secret.expose_secret()));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(%method, path, error = %e, "Razorpay request did not complete");
            transport_error(e)
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            let err = error_from_response(status, &bytes);
            tracing::warn!(
                %method,
                path,
                status = status.as_u16(),
                code = %err.code,
                description = %err.description,
                "Razorpay rejected request"
            );
            return Err(err);
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            ProcessorError::invalid_response(format!("unexpected {} body: {}", path, e))
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProcessorError> {
        self.send::<(), T>(Method::GET, path, None).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProcessorError> {
        self.send(Method::POST, path, Some(body)).await
    }

    /// GET that maps an unknown id to `Ok(None)`.
    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ProcessorError> {
        match self.get(path).await {
            Ok(entity) => Ok(Some(entity)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[derive(Serialize)]
struct CaptureBody<'a> {
    amount: i64,
    currency: &'a str,
}

#[async_trait]
impl PaymentProcessor for RazorpayClient {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<CustomerEntity, ProcessorError> {
        self.post("customers", &request).await
    }

    async fn fetch_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<CustomerEntity>, ProcessorError> {
        self.fetch(&format!("customers/{}", customer_id)).await
    }

    async fn fetch_plan(&self, plan_id: &str) -> Result<Option<PlanEntity>, ProcessorError> {
        self.fetch(&format!("plans/{}", plan_id)).await
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionEntity, ProcessorError> {
        self.post("subscriptions", &request).await
    }

    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionEntity>, ProcessorError> {
        self.fetch(&format!("subscriptions/{}", subscription_id)).await
    }

    async fn create_addon(
        &self,
        subscription_id: &str,
        request: CreateAddonRequest,
    ) -> Result<AddonEntity, ProcessorError> {
        self.post(&format!("subscriptions/{}/addons", subscription_id), &request)
            .await
    }

    async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderEntity, ProcessorError> {
        self.post("orders", &request).await
    }

    async fn capture_payment(
        &self,
        payment_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<PaymentEntity, ProcessorError> {
        self.post(
            &format!("payments/{}/capture", payment_id),
            &CaptureBody { amount, currency },
        )
        .await
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Error mapping
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    field: Option<String>,
}

fn transport_error(err: reqwest::Error) -> ProcessorError {
    if err.is_timeout() {
        ProcessorError::network("request timed out")
    } else {
        ProcessorError::network(err.to_string())
    }
}

fn error_from_response(status: StatusCode, body: &[u8]) -> ProcessorError {
    let envelope = serde_json::from_slice::<ErrorEnvelope>(body).ok();
    let (code, description, field) = match envelope {
        Some(ErrorEnvelope { error }) => (
            error.code.unwrap_or_else(|| status.as_str().to_string()),
            error.description.unwrap_or_default(),
            error.field,
        ),
        None => (
            status.as_str().to_string(),
            String::from_utf8_lossy(body).into_owned(),
            None,
        ),
    };

    let kind = match status {
        StatusCode::NOT_FOUND => ProcessorErrorKind::NotFound,
        StatusCode::BAD_REQUEST if describes_unknown_id(&description) => ProcessorErrorKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProcessorErrorKind::Authentication,
        StatusCode::TOO_MANY_REQUESTS => ProcessorErrorKind::RateLimited,
        s if s.is_server_error() => ProcessorErrorKind::Server,
        _ => ProcessorErrorKind::BadRequest,
    };

    let err = ProcessorError::new(kind, code, description);
    match field {
        Some(field) => err.with_field(field),
        None => err,
    }
}

fn describes_unknown_id(description: &str) -> bool {
    let description = description.to_ascii_lowercase();
    description.contains("does not exist") || description.contains("not found")
}
