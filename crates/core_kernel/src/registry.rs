//! Adapter health aggregation
//!
//! The sync runtime owns several adapters at once (ledger, rule store, link
//! table, one client per CRM). This module folds their individual health
//! checks into one report so the worker can decide whether it is operational.

use std::collections::HashMap;

use crate::ports::{AdapterHealth, HealthCheckResult};

/// Result of health checks across all registered adapters
#[derive(Debug, Clone)]
pub struct RegistryHealthReport {
    /// Overall health status
    pub overall_status: AdapterHealth,

    /// Health results keyed by adapter id
    pub adapter_health: HashMap<String, HealthCheckResult>,

    /// Number of healthy adapters
    pub healthy_count: usize,

    /// Number of unhealthy adapters
    pub unhealthy_count: usize,

    /// Total number of checked adapters
    pub total_count: usize,
}

impl RegistryHealthReport {
    /// Builds a report from individual adapter results
    ///
    /// Every adapter healthy gives `Healthy`; every adapter unhealthy gives
    /// `Unhealthy`; anything in between is `Degraded`. An empty set is `Unknown`.
    pub fn from_results(results: impl IntoIterator<Item = HealthCheckResult>) -> Self {
        let adapter_health: HashMap<String, HealthCheckResult> = results
            .into_iter()
            .map(|r| (r.adapter_id.clone(), r))
            .collect();

        let total_count = adapter_health.len();
        let healthy_count = adapter_health
            .values()
            .filter(|r| r.status == AdapterHealth::Healthy)
            .count();
        let unhealthy_count = adapter_health
            .values()
            .filter(|r| r.status == AdapterHealth::Unhealthy)
            .count();

        let overall_status = if total_count == 0 {
            AdapterHealth::Unknown
        } else if healthy_count == total_count {
            AdapterHealth::Healthy
        } else if unhealthy_count == total_count {
            AdapterHealth::Unhealthy
        } else {
            AdapterHealth::Degraded
        };

        Self {
            overall_status,
            adapter_health,
            healthy_count,
            unhealthy_count,
            total_count,
        }
    }

    /// Returns true if all adapters are healthy
    pub fn is_fully_healthy(&self) -> bool {
        self.overall_status == AdapterHealth::Healthy
    }

    /// Returns true if the system is at least partially operational
    pub fn is_operational(&self) -> bool {
        matches!(
            self.overall_status,
            AdapterHealth::Healthy | AdapterHealth::Degraded
        )
    }

    /// Adapter ids that reported unhealthy, sorted
    pub fn unhealthy_adapters(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .adapter_health
            .values()
            .filter(|r| r.status == AdapterHealth::Unhealthy)
            .map(|r| r.adapter_id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }
}
