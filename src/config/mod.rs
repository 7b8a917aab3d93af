//! Application configuration module
//!
//! Configuration is read from the process environment (and an optional `.env`
//! file) through the `config` crate. Every key is prefixed with `BILLING` and
//! nested sections are separated by a double underscore.
//!
//! # Example
//!
//! ```no_run
//! use billing_reconciler::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod processor;
mod reconciliation;
mod server;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use processor::ProcessorConfig;
pub use reconciliation::ReconciliationConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    /// Razorpay credentials and webhook secret
    pub processor: ProcessorConfig,

    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// - `BILLING__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `BILLING__PROCESSOR__KEY_ID=rzp_test_...` -> `processor.key_id`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or cannot be
    /// parsed into their typed fields.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("BILLING")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Semantic validation across all sections.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.processor.validate(&self.server.environment)?;
        self.reconciliation.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::env;
    use std::sync::Mutex;

    // env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[(&str, &str)] = &[
        ("BILLING__DATABASE__URL", "postgres://billing@localhost/billing"),
        ("BILLING__PROCESSOR__KEY_ID", "rzp_test_1234"),
        ("BILLING__PROCESSOR__KEY_SECRET", "secret_1234"),
        ("BILLING__PROCESSOR__WEBHOOK_SECRET", "hook_1234"),
    ];

    fn with_env<T>(extra: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        for (k, v) in VARS.iter().chain(extra) {
            env::set_var(k, v);
        }
        let out = f();
        for (k, _) in VARS.iter().chain(extra) {
            env::remove_var(k);
        }
        out
    }

    #[test]
    fn loads_minimal_environment() {
        let config = with_env(&[], AppConfig::load).unwrap();
        assert_eq!(config.database.url, "postgres://billing@localhost/billing");
        assert_eq!(config.processor.key_id, "rzp_test_1234");
        assert_eq!(config.processor.webhook_secret.expose_secret(), "hook_1234");
        assert_eq!(config.processor.api_base_url, "https://api.razorpay.com");
        assert!(!config.processor.skip_webhook_verification);
        assert!(!config.reconciliation.reject_stale_events);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn nested_overrides_apply() {
        let config = with_env(
            &[
                ("BILLING__SERVER__PORT", "7000"),
                ("BILLING__RECONCILIATION__REJECT_STALE_EVENTS", "true"),
            ],
            AppConfig::load,
        )
        .unwrap();
        assert_eq!(config.server.port, 7000);
        assert!(config.reconciliation.reject_stale_events);
    }

    #[test]
    fn production_refuses_verification_bypass() {
        let config = with_env(
            &[
                ("BILLING__SERVER__ENVIRONMENT", "production"),
                ("BILLING__PROCESSOR__SKIP_WEBHOOK_VERIFICATION", "true"),
            ],
            AppConfig::load,
        )
        .unwrap();
        assert!(config.is_production());
        assert!(matches!(
            config.validate(),
            Err(ValidationError::VerificationBypassInProduction)
        ));
    }

    #[test]
    fn missing_processor_section_fails_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("BILLING__DATABASE__URL", "postgres://localhost/billing");
        let result = AppConfig::load();
        env::remove_var("BILLING__DATABASE__URL");
        assert!(result.is_err());
    }
}
