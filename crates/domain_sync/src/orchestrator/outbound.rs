//! Outbound path: one domain event fanned out to the tenant's CRMs

use futures::future::join_all;
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use core_kernel::{CrmSystem, EntityId, EntityType, OperationMetadata, TenantId};
use domain_events::{extract_panic_message, DomainEvent};
use domain_mapping::{CanonicalEntity, CrmPayload};

use super::report::{OutboundReport, OutboundSkipReason, OutboundState};
use super::SyncOrchestrator;
use crate::client::{ConnectionInfo, CrmSyncResult};
use crate::error::SyncError;
use crate::ports::EntityLink;

/// No client is registered for a connected CRM
pub const CLIENT_NOT_REGISTERED: &str = "client_not_registered";
/// The client returned `Err` or panicked
pub const CLIENT_FAULT: &str = "client_fault";
/// The call exceeded `SyncConfig::crm_call_timeout`
pub const TIMEOUT: &str = "timeout";
/// Rules for the CRM could not be loaded
pub const MAPPING_FAILED: &str = "mapping_failed";
/// The existing CRM id could not be looked up
pub const LINK_LOOKUP_FAILED: &str = "link_lookup_failed";

/// Per-CRM state between mapping and dispatch
enum Prepared {
    Ready {
        connection: ConnectionInfo,
        payload: CrmPayload,
    },
    Failed(CrmSyncResult),
    Empty(CrmSystem),
}

impl SyncOrchestrator {
    /// Pushes the entity named by `event` to every connected CRM except its origin
    ///
    /// Remote failures, client faults and timeouts for one CRM become failed
    /// results for that CRM; the others are unaffected. `Err` is returned
    /// only when the pipeline cannot run at all: a port outage before
    /// fan-out, or a collaborator breaking its contract.
    #[instrument(
        skip(self, event),
        fields(
            event_id = %event.event_id(),
            event_name = event.event_name(),
            tenant_id = %event.tenant_id(),
            entity_id = %event.entity_id(),
        )
    )]
    pub async fn sync_outbound(&self, event: &DomainEvent) -> Result<OutboundReport, SyncError> {
        let tenant_id = event.tenant_id();
        let entity_type = event.entity_type();
        let entity_id = event.entity_id();
        let mut report = OutboundReport::triggered(event.event_id(), tenant_id, entity_type, entity_id);

        let Some(entity) = self.entities.get(tenant_id, entity_type, entity_id).await? else {
            info!("entity not found, nothing to sync");
            report.state = OutboundState::Skipped(OutboundSkipReason::EntityNotFound);
            return Ok(report);
        };
        check_identity(&entity, tenant_id, entity_type, entity_id)?;
        report.state = OutboundState::Loaded;

        let targets = self.outbound_targets(event).await?;
        if targets.is_empty() {
            info!(origin = ?event.origin(), "no connected CRM to sync to");
            report.state = OutboundState::Skipped(OutboundSkipReason::NoConnectedCrm);
            return Ok(report);
        }

        let prepared = join_all(
            targets
                .into_iter()
                .map(|connection| self.prepare(&entity, connection)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .inspect_err(|e| {
            error!(kind = e.kind(), error = %e, "outbound mapping broke contract");
        })?;
        report.state = OutboundState::Mapped;

        let metadata = OperationMetadata::with_correlation_id(event.event_id().to_string())
            .with_context("tenant_id", tenant_id.to_string())
            .with_context("event_name", event.event_name());
        let metadata = &metadata;
        let entity = &entity;

        let runs = prepared.iter().map(|prepared| async move {
            match prepared {
                Prepared::Ready {
                    connection,
                    payload,
                } => {
                    let result = self.dispatch(connection, payload, metadata.clone()).await;
                    self.record_link(entity, payload, &result).await;
                    Some(result)
                }
                Prepared::Failed(result) => Some(result.clone()),
                Prepared::Empty(_) => None,
            }
        });
        let results = join_all(runs).await;
        report.state = OutboundState::Dispatched;

        for (prepared, result) in prepared.iter().zip(results) {
            match (result, prepared) {
                (Some(result), _) => report.results.push(result),
                (None, Prepared::Empty(crm_system)) => report.skipped_crms.push(*crm_system),
                (None, _) => {}
            }
        }

        report.state = if report.results.iter().all(CrmSyncResult::is_success) {
            OutboundState::Completed
        } else {
            OutboundState::PartiallyFailed
        };

        info!(
            state = %report.state,
            succeeded = report.succeeded_crms().len(),
            failed = report.failed_crms().len(),
            skipped = report.skipped_crms.len(),
            "outbound sync finished"
        );
        Ok(report)
    }

    /// Enabled connections for the event's tenant, without the origin CRM
    async fn outbound_targets(&self, event: &DomainEvent) -> Result<Vec<ConnectionInfo>, SyncError> {
        let tenant_id = event.tenant_id();
        let mut seen = HashSet::new();
        let mut targets = Vec::new();

        for connection in self.connections.list_connected(tenant_id).await? {
            if connection.tenant_id != tenant_id {
                error!(
                    kind = "contract_violation",
                    connection_tenant_id = %connection.tenant_id,
                    crm_system = %connection.crm_system,
                    "connection store returned another tenant's connection"
                );
                return Err(SyncError::contract_violation(format!(
                    "connection for {} listed under tenant {}",
                    connection.tenant_id, tenant_id
                )));
            }
            if !connection.enabled {
                debug!(crm_system = %connection.crm_system, "connection disabled");
                continue;
            }
            if event.origin() == Some(connection.crm_system) {
                debug!(crm_system = %connection.crm_system, "skipping origin CRM");
                continue;
            }
            if seen.insert(connection.crm_system) {
                targets.push(connection);
            }
        }

        Ok(targets)
    }

    /// Looks up the existing CRM id and builds the payload for one CRM
    async fn prepare(
        &self,
        entity: &CanonicalEntity,
        connection: ConnectionInfo,
    ) -> Result<Prepared, SyncError> {
        let crm_system = connection.crm_system;
        let entity_type = entity.entity_type();

        let existing_id = match self
            .links
            .find_external_id(entity.tenant_id(), crm_system, entity_type, entity.id())
            .await
        {
            Ok(existing_id) => existing_id,
            Err(e) => {
                warn!(crm_system = %crm_system, error = %e, "link lookup failed");
                return Ok(Prepared::Failed(CrmSyncResult::failed(
                    crm_system,
                    entity_type,
                    LINK_LOOKUP_FAILED,
                    e.to_string(),
                )));
            }
        };

        let payload = match self
            .mapping
            .build_payload(entity, entity.tenant_id(), crm_system, entity_type)
            .await
        {
            Ok(payload) => payload,
            Err(e) if e.is_contract_violation() => return Err(e.into()),
            Err(e) => {
                warn!(crm_system = %crm_system, error = %e, "payload mapping failed");
                return Ok(Prepared::Failed(CrmSyncResult::failed(
                    crm_system,
                    entity_type,
                    MAPPING_FAILED,
                    e.to_string(),
                )));
            }
        };

        if payload.is_empty() {
            debug!(crm_system = %crm_system, "no mapped fields for this CRM");
            if self.config.skip_empty_payloads {
                return Ok(Prepared::Empty(crm_system));
            }
        }

        let payload = match existing_id {
            Some(crm_id) => payload.with_crm_id(crm_id),
            None => payload,
        };
        Ok(Prepared::Ready {
            connection,
            payload,
        })
    }

    /// Calls one CRM under the configured timeout; never fails
    async fn dispatch(
        &self,
        connection: &ConnectionInfo,
        payload: &CrmPayload,
        metadata: OperationMetadata,
    ) -> CrmSyncResult {
        let crm_system = connection.crm_system;
        let entity_type = payload.entity_type();

        let Some(client) = self.clients.get(crm_system) else {
            warn!(crm_system = %crm_system, "no client registered for connected CRM");
            return CrmSyncResult::failed(
                crm_system,
                entity_type,
                CLIENT_NOT_REGISTERED,
                format!("no client registered for {}", crm_system),
            );
        };

        let started = Instant::now();
        let call = AssertUnwindSafe(client.upsert(connection, entity_type, payload, Some(metadata)))
            .catch_unwind();
        let outcome = tokio::time::timeout(self.config.crm_call_timeout, call).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(Ok(Ok(result))) => {
                if result.is_success() {
                    debug!(
                        crm_system = %crm_system,
                        crm_id = ?result.crm_id(),
                        status_code = ?result.status_code(),
                        "CRM accepted update"
                    );
                } else {
                    warn!(
                        crm_system = %crm_system,
                        error_code = ?result.error_code(),
                        status_code = ?result.status_code(),
                        error = ?result.error_message(),
                        "CRM rejected update"
                    );
                }
                if result.duration_ms() == 0 {
                    result.with_duration_ms(elapsed_ms)
                } else {
                    result
                }
            }
            Ok(Ok(Err(e))) => {
                error!(kind = CLIENT_FAULT, crm_system = %crm_system, error = %e, "CRM client fault");
                CrmSyncResult::failed(crm_system, entity_type, CLIENT_FAULT, e.to_string())
                    .with_duration_ms(elapsed_ms)
            }
            Ok(Err(panic_info)) => {
                let message = extract_panic_message(&panic_info);
                error!(kind = CLIENT_FAULT, crm_system = %crm_system, panic = %message, "CRM client panicked");
                CrmSyncResult::failed(crm_system, entity_type, CLIENT_FAULT, format!("client panicked: {}", message))
                    .with_duration_ms(elapsed_ms)
            }
            Err(_) => {
                let timeout_ms = self.config.crm_call_timeout_ms();
                warn!(crm_system = %crm_system, timeout_ms, "CRM call timed out");
                CrmSyncResult::failed(
                    crm_system,
                    entity_type,
                    TIMEOUT,
                    format!("no response within {}ms", timeout_ms),
                )
                .with_duration_ms(elapsed_ms)
            }
        }
    }

    /// Stores a newly learned CRM id; failures are logged, not propagated
    async fn record_link(&self, entity: &CanonicalEntity, payload: &CrmPayload, result: &CrmSyncResult) {
        let Some(crm_id) = result.crm_id().filter(|_| result.is_success()) else {
            return;
        };
        if payload.crm_id() == Some(crm_id) {
            return;
        }

        let link = EntityLink::new(
            entity.tenant_id(),
            result.crm_system(),
            entity.entity_type(),
            entity.id(),
            crm_id,
        );
        if let Err(e) = self.links.upsert_link(link).await {
            warn!(
                crm_system = %result.crm_system(),
                crm_id,
                error = %e,
                "failed to store entity link"
            );
        }
    }
}

pub(super) fn check_identity(
    entity: &CanonicalEntity,
    tenant_id: TenantId,
    entity_type: EntityType,
    entity_id: EntityId,
) -> Result<(), SyncError> {
    if entity.tenant_id() == tenant_id && entity.entity_type() == entity_type && entity.id() == entity_id {
        return Ok(());
    }
    error!(
        kind = "contract_violation",
        expected_tenant_id = %tenant_id,
        actual_tenant_id = %entity.tenant_id(),
        expected_type = %entity_type,
        actual_type = %entity.entity_type(),
        "entity repository returned a different entity"
    );
    Err(SyncError::contract_violation(format!(
        "asked for {} {} of tenant {}, got {} {} of tenant {}",
        entity_type,
        entity_id,
        tenant_id,
        entity.entity_type(),
        entity.id(),
        entity.tenant_id()
    )))
}
