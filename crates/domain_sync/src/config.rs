//! Orchestrator settings
//!
//! Plain values handed to the orchestrator at construction. Loading them
//! from the environment is the host's job (see `interface_worker::config`).

use std::time::Duration;

/// Default upper bound on a single CRM call
pub const DEFAULT_CRM_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Behavior switches for the sync orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Upper bound on one `CrmClient::upsert`; exceeding it fails that CRM only
    pub crm_call_timeout: Duration,
    /// Publish an updated event after an inbound change is applied
    pub republish_inbound_updates: bool,
    /// Report CRMs whose payload came out empty as skipped instead of sending
    pub skip_empty_payloads: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            crm_call_timeout: DEFAULT_CRM_CALL_TIMEOUT,
            republish_inbound_updates: true,
            skip_empty_payloads: false,
        }
    }
}

impl SyncConfig {
    pub fn with_crm_call_timeout(mut self, timeout: Duration) -> Self {
        self.crm_call_timeout = timeout;
        self
    }

    pub fn with_republish_inbound_updates(mut self, enabled: bool) -> Self {
        self.republish_inbound_updates = enabled;
        self
    }

    pub fn with_skip_empty_payloads(mut self, enabled: bool) -> Self {
        self.skip_empty_payloads = enabled;
        self
    }

    /// Timeout in whole milliseconds, for logs and error messages
    pub fn crm_call_timeout_ms(&self) -> u64 {
        u64::try_from(self.crm_call_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.crm_call_timeout, Duration::from_secs(30));
        assert!(config.republish_inbound_updates);
        assert!(!config.skip_empty_payloads);
        assert_eq!(config.crm_call_timeout_ms(), 30_000);
    }

    #[test]
    fn test_builders() {
        let config = SyncConfig::default()
            .with_crm_call_timeout(Duration::from_millis(250))
            .with_republish_inbound_updates(false)
            .with_skip_empty_payloads(true);
        assert_eq!(config.crm_call_timeout_ms(), 250);
        assert!(!config.republish_inbound_updates);
        assert!(config.skip_empty_payloads);
    }
}
