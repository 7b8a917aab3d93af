//! Billing reconciler HTTP server.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use http::HeaderValue;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use billing_reconciler::adapters::http::{billing_router, BillingAppState, BillingDependencies};
use billing_reconciler::adapters::postgres::{
    run_migrations, PostgresCustomerRepository, PostgresPaymentRepository, PostgresPlanRepository,
    PostgresSubscriptionRepository,
};
use billing_reconciler::adapters::razorpay::{RazorpayClient, RazorpayConfig};
use billing_reconciler::config::{AppConfig, ServerConfig};
use billing_reconciler::domain::billing::WebhookVerifier;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    tracing::info!(
        environment = ?config.server.environment,
        live_mode = config.processor.is_live_mode(),
        "Starting billing reconciler v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = config.database.connect().await?;
    tracing::info!("Database connection established");
    if config.database.run_migrations {
        run_migrations(&pool).await?;
    }

    let processor = RazorpayClient::new(RazorpayConfig::from(&config.processor))?;
    let secret = config.processor.webhook_secret.clone();
    let verifier = if config.processor.skip_webhook_verification {
        tracing::warn!("Webhook signature verification is disabled");
        WebhookVerifier::insecure_bypass(secret)
    } else {
        WebhookVerifier::new(secret)
    };

    let state = BillingAppState::new(BillingDependencies {
        processor: Arc::new(processor),
        customers: Arc::new(PostgresCustomerRepository::new(pool.clone())),
        plans: Arc::new(PostgresPlanRepository::new(pool.clone())),
        subscriptions: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
        payments: Arc::new(PostgresPaymentRepository::new(pool)),
        verifier,
        reject_stale_events: config.reconciliation.reject_stale_events,
        authentication_window_days: config.reconciliation.authentication_window_days,
    });

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(billing_router().with_state(state))
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(cors_layer(&config.server))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter =
        EnvFilter::try_new(&server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if server.json_logs() {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    if origins.is_empty() {
        CorsLayer::new()
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    }
}
