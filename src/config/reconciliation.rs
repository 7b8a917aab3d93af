//! Event reconciliation policy

use serde::Deserialize;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    /// Skip events whose `created_at` predates the last applied event.
    /// Off by default: events are applied last-writer-wins.
    #[serde(default)]
    pub reject_stale_events: bool,

    /// Days a pending subscription stays open for customer authentication
    #[serde(default = "default_authentication_window")]
    pub authentication_window_days: i64,
}

impl ReconciliationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=30).contains(&self.authentication_window_days) {
            return Err(ValidationError::InvalidAuthenticationWindow);
        }
        Ok(())
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            reject_stale_events: false,
            authentication_window_days: default_authentication_window(),
        }
    }
}

fn default_authentication_window() -> i64 {
    7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_last_writer_wins_and_one_week() {
        let config = ReconciliationConfig::default();
        assert!(!config.reject_stale_events);
        assert_eq!(config.authentication_window_days, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn window_outside_a_month_is_rejected() {
        for days in [0, 31, -2] {
            let config = ReconciliationConfig {
                authentication_window_days: days,
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }
    }
}
