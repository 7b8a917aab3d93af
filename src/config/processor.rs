//! Payment processor (Razorpay) credentials and client settings

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;

/// Razorpay API and webhook configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    /// Key id, `rzp_test_...` or `rzp_live_...`
    pub key_id: String,

    /// Key secret paired with `key_id` for HTTP basic auth
    pub key_secret: SecretString,

    /// Shared secret configured on the webhook endpoint in the dashboard
    pub webhook_secret: SecretString,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Local development only. Accepts unsigned webhook deliveries.
    #[serde(default)]
    pub skip_webhook_verification: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl ProcessorConfig {
    pub fn is_test_mode(&self) -> bool {
        self.key_id.starts_with("rzp_test_")
    }

    pub fn is_live_mode(&self) -> bool {
        self.key_id.starts_with("rzp_live_")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        use secrecy::ExposeSecret;

        if self.key_id.is_empty() {
            return Err(ValidationError::MissingRequired("PROCESSOR__KEY_ID"));
        }
        if self.key_secret.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("PROCESSOR__KEY_SECRET"));
        }
        if self.webhook_secret.expose_secret().is_empty() && !self.skip_webhook_verification {
            return Err(ValidationError::MissingRequired("PROCESSOR__WEBHOOK_SECRET"));
        }
        if !self.is_test_mode() && !self.is_live_mode() {
            return Err(ValidationError::InvalidProcessorKeyId);
        }
        if !self.api_base_url.starts_with("https://") && !self.api_base_url.starts_with("http://")
        {
            return Err(ValidationError::InvalidProcessorBaseUrl);
        }
        if self.request_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.skip_webhook_verification && *environment == Environment::Production {
            return Err(ValidationError::VerificationBypassInProduction);
        }
        Ok(())
    }
}

fn default_api_base_url() -> String {
    "https://api.razorpay.com".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(key_id: &str) -> ProcessorConfig {
        ProcessorConfig {
            key_id: key_id.to_string(),
            key_secret: SecretString::new("key_secret".to_string()),
            webhook_secret: SecretString::new("hook_secret".to_string()),
            api_base_url: default_api_base_url(),
            skip_webhook_verification: false,
            request_timeout_secs: default_request_timeout(),
        }
    }

    #[test]
    fn detects_key_mode_from_prefix() {
        assert!(config("rzp_test_abc").is_test_mode());
        assert!(config("rzp_live_abc").is_live_mode());
        assert!(!config("rzp_live_abc").is_test_mode());
    }

    #[test]
    fn valid_test_key_passes() {
        assert!(config("rzp_test_abc")
            .validate(&Environment::Development)
            .is_ok());
    }

    #[test]
    fn foreign_key_prefix_is_rejected() {
        let err = config("sk_test_abc")
            .validate(&Environment::Development)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidProcessorKeyId));
    }

    #[test]
    fn missing_webhook_secret_tolerated_only_with_bypass() {
        let mut cfg = config("rzp_test_abc");
        cfg.webhook_secret = SecretString::new(String::new());
        assert!(cfg.validate(&Environment::Development).is_err());

        cfg.skip_webhook_verification = true;
        assert!(cfg.validate(&Environment::Development).is_ok());
    }

    #[test]
    fn bypass_is_refused_in_production() {
        let mut cfg = config("rzp_live_abc");
        cfg.skip_webhook_verification = true;
        assert!(matches!(
            cfg.validate(&Environment::Production),
            Err(ValidationError::VerificationBypassInProduction)
        ));
    }

    #[test]
    fn base_url_must_be_http() {
        let mut cfg = config("rzp_test_abc");
        cfg.api_base_url = "ftp://api.razorpay.com".to_string();
        assert!(matches!(
            cfg.validate(&Environment::Development),
            Err(ValidationError::InvalidProcessorBaseUrl)
        ));
    }
}
