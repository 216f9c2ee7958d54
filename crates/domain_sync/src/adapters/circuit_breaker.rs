//! Circuit-breaking CRM client
//!
//! Wraps any `CrmClient` and stops calling it for a tenant after repeated
//! availability failures. Each tenant has its own breaker, since tenants
//! reach their own CRM account (and, for SAP B1, their own service layer).
//! While a tenant's circuit is open, its calls return a failed result with
//! error code `circuit_open` immediately instead of waiting on a CRM that is
//! known to be down. After `reset_timeout_secs` a single trial call is let
//! through (half-open) and concurrent calls keep short-circuiting until it
//! settles; `success_threshold` consecutive successes close the circuit. A
//! trial that never settles (cancelled by a timeout) is replaced by a new one
//! after another `reset_timeout_secs`.
//!
//! Only availability failures count against the circuit: client faults,
//! 5xx and 429 answers, and results with no status code. A 4xx rejection of
//! a specific payload says nothing about the CRM's health.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use core_kernel::{
    AdapterHealth, CircuitBreakerConfig, CrmSystem, DomainPort, EntityType, HealthCheckResult,
    HealthCheckable, OperationMetadata, PortError, TenantId,
};
use domain_mapping::CrmPayload;

use crate::client::{ConnectionInfo, CrmClient, CrmSyncResult};

/// Error code of results short-circuited by an open breaker
pub const CIRCUIT_OPEN: &str = "circuit_open";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { trial_started: Option<Instant>, successes: u32 },
}

/// What a settled call did to the circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    None,
    Opened,
    Closed,
}

/// One tenant's breaker
#[derive(Debug)]
struct CircuitBreaker {
    state: CircuitState,
}

impl CircuitBreaker {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed { failures: 0 },
        }
    }

    /// Admits or rejects a call, claiming the half-open trial when admitted
    fn try_acquire(&mut self, config: &CircuitBreakerConfig, now: Instant) -> bool {
        let reset_timeout = Duration::from_secs(config.reset_timeout_secs);
        match self.state {
            CircuitState::Closed { .. } => true,
            CircuitState::Open { since } => {
                if now.duration_since(since) < reset_timeout {
                    return false;
                }
                self.state = CircuitState::HalfOpen {
                    trial_started: Some(now),
                    successes: 0,
                };
                true
            }
            CircuitState::HalfOpen { trial_started, successes } => {
                let trial_pending = trial_started.is_some_and(|started| now.duration_since(started) < reset_timeout);
                if trial_pending {
                    return false;
                }
                self.state = CircuitState::HalfOpen {
                    trial_started: Some(now),
                    successes,
                };
                true
            }
        }
    }

    fn record_success(&mut self, config: &CircuitBreakerConfig) -> Transition {
        match self.state {
            CircuitState::HalfOpen { successes, .. } => {
                let successes = successes + 1;
                if successes >= config.success_threshold {
                    self.state = CircuitState::Closed { failures: 0 };
                    Transition::Closed
                } else {
                    self.state = CircuitState::HalfOpen {
                        trial_started: None,
                        successes,
                    };
                    Transition::None
                }
            }
            _ => {
                self.state = CircuitState::Closed { failures: 0 };
                Transition::None
            }
        }
    }

    fn record_failure(&mut self, config: &CircuitBreakerConfig, now: Instant) -> Transition {
        match self.state {
            CircuitState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= config.failure_threshold {
                    self.state = CircuitState::Open { since: now };
                    Transition::Opened
                } else {
                    self.state = CircuitState::Closed { failures };
                    Transition::None
                }
            }
            CircuitState::HalfOpen { .. } => {
                self.state = CircuitState::Open { since: now };
                Transition::Opened
            }
            CircuitState::Open { .. } => Transition::None,
        }
    }

    /// A call that neither proves nor disproves availability frees the trial
    fn record_neutral(&mut self) {
        if let CircuitState::HalfOpen { successes, .. } = self.state {
            self.state = CircuitState::HalfOpen {
                trial_started: None,
                successes,
            };
        }
    }

    fn is_open(&self) -> bool {
        !matches!(self.state, CircuitState::Closed { .. })
    }
}

/// Decorator adding per-tenant circuit breakers to a CRM client
#[derive(Debug)]
pub struct CircuitBreakingClient<C> {
    inner: C,
    config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<TenantId, CircuitBreaker>>,
}

impl<C: CrmClient> CircuitBreakingClient<C> {
    pub fn new(inner: C, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// True while the tenant's calls are being short-circuited
    pub fn is_open_for(&self, tenant_id: TenantId) -> bool {
        self.with_breakers(|breakers| breakers.get(&tenant_id).is_some_and(CircuitBreaker::is_open))
    }

    /// Tenants whose circuit is not closed
    pub fn open_circuits(&self) -> Vec<TenantId> {
        self.with_breakers(|breakers| {
            breakers
                .iter()
                .filter(|(_, breaker)| breaker.is_open())
                .map(|(tenant_id, _)| *tenant_id)
                .collect()
        })
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Runs `f` under the breaker map lock; never held across an await
    fn with_breakers<T>(&self, f: impl FnOnce(&mut HashMap<TenantId, CircuitBreaker>) -> T) -> T {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut breakers)
    }

    fn try_acquire(&self, tenant_id: TenantId) -> bool {
        self.with_breakers(|breakers| {
            breakers
                .entry(tenant_id)
                .or_insert_with(CircuitBreaker::new)
                .try_acquire(&self.config, Instant::now())
        })
    }

    fn settle(&self, tenant_id: TenantId, outcome: &Result<CrmSyncResult, PortError>) -> Transition {
        self.with_breakers(|breakers| {
            let breaker = breakers.entry(tenant_id).or_insert_with(CircuitBreaker::new);
            if counts_against_circuit(outcome) {
                breaker.record_failure(&self.config, Instant::now())
            } else if outcome.as_ref().is_ok_and(CrmSyncResult::is_success) {
                breaker.record_success(&self.config)
            } else {
                breaker.record_neutral();
                Transition::None
            }
        })
    }
}

fn counts_against_circuit(outcome: &Result<CrmSyncResult, PortError>) -> bool {
    match outcome {
        Ok(result) if result.is_success() => false,
        Ok(result) => match result.status_code() {
            Some(status) => status >= 500 || status == 429,
            None => true,
        },
        Err(_) => true,
    }
}

impl<C: CrmClient> DomainPort for CircuitBreakingClient<C> {}

#[async_trait]
impl<C: CrmClient> CrmClient for CircuitBreakingClient<C> {
    fn system(&self) -> CrmSystem {
        self.inner.system()
    }

    async fn upsert(
        &self,
        connection: &ConnectionInfo,
        entity_type: EntityType,
        payload: &CrmPayload,
        metadata: Option<OperationMetadata>,
    ) -> Result<CrmSyncResult, PortError> {
        let tenant_id = connection.tenant_id;
        if !self.try_acquire(tenant_id) {
            return Ok(CrmSyncResult::failed(
                self.system(),
                entity_type,
                CIRCUIT_OPEN,
                format!("{} circuit is open for tenant {}", self.system(), tenant_id),
            ));
        }

        let outcome = self
            .inner
            .upsert(connection, entity_type, payload, metadata)
            .await;

        match self.settle(tenant_id, &outcome) {
            Transition::Opened => warn!(
                crm_system = %self.system(),
                tenant_id = %tenant_id,
                failure_threshold = self.config.failure_threshold,
                "circuit opened"
            ),
            Transition::Closed => info!(crm_system = %self.system(), tenant_id = %tenant_id, "circuit closed"),
            Transition::None => {}
        }

        outcome
    }
}

#[async_trait]
impl<C: CrmClient> HealthCheckable for CircuitBreakingClient<C> {
    async fn health_check(&self) -> HealthCheckResult {
        let adapter_id = format!("crm-client-{}", self.system());
        let open = self.open_circuits().len();
        if open > 0 {
            HealthCheckResult::with_status(
                adapter_id,
                AdapterHealth::Degraded,
                0,
                format!("circuit open for {} tenant(s)", open),
            )
        } else {
            HealthCheckResult::healthy(adapter_id, 0)
        }
    }
}
