//! Inbound path: CRM webhooks applied to canonical entities

use tracing::{debug, error, info, instrument, warn};

use domain_events::DomainEvent;

use super::outbound::check_identity;
use super::report::{InboundReport, InboundSkipReason, InboundState, RejectReason};
use super::SyncOrchestrator;
use crate::error::SyncError;
use crate::idempotency::IdempotencyOutcome;
use crate::webhook::InboundWebhookEvent;

impl SyncOrchestrator {
    /// Applies one webhook to its linked entity, at most once per delivery id
    ///
    /// Duplicates of an already-claimed delivery return `Duplicate` without
    /// doing any work. Every claimed delivery ends with an outcome on its
    /// ledger row: `Success` when applied, `Skipped` when rejected or
    /// skipped, `Failure` when this returns `Err`. A failed delivery keeps its
    /// claim and is not retried by redelivery.
    #[instrument(
        skip(self, webhook),
        fields(
            tenant_id = %webhook.tenant_id,
            crm_system = %webhook.crm_system,
            external_event_id = %webhook.external_event_id,
            external_object_id = %webhook.external_object_id,
        )
    )]
    pub async fn process_inbound(&self, webhook: &InboundWebhookEvent) -> Result<InboundReport, SyncError> {
        webhook.validate()?;
        let crm_system = webhook.crm_system;
        let mut report = InboundReport::received(crm_system, webhook.external_event_id.trim());
        report.tenant_id = Some(webhook.tenant_id);

        let claim = self
            .guard
            .try_claim_observed(crm_system, &webhook.external_event_id, webhook.occurred_at)
            .await?;
        if !claim.claimed {
            debug!("duplicate webhook delivery");
            report.state = InboundState::Duplicate;
            return Ok(report);
        }
        report.state = InboundState::Claimed;

        match self.apply_inbound(webhook, &mut report).await {
            Ok(state) => {
                report.state = state;
                if let Some(outcome) = state.ledger_outcome() {
                    self.record_outcome(webhook, outcome).await;
                }
                info!(state = %report.state, "inbound webhook processed");
                Ok(report)
            }
            Err(e) => {
                error!(kind = e.kind(), error = %e, "inbound webhook failed");
                self.record_outcome(webhook, IdempotencyOutcome::Failure).await;
                Err(e)
            }
        }
    }

    /// Processes the events of one webhook delivery in order
    ///
    /// Returns one entry per event. A failing event is logged and reported in
    /// its own slot; later events still run.
    pub async fn process_inbound_batch(
        &self,
        webhooks: &[InboundWebhookEvent],
    ) -> Vec<Result<InboundReport, SyncError>> {
        let mut results = Vec::with_capacity(webhooks.len());
        for webhook in webhooks {
            let result = self.process_inbound(webhook).await;
            if let Err(e) = &result {
                warn!(
                    tenant_id = %webhook.tenant_id,
                    crm_system = %webhook.crm_system,
                    external_event_id = %webhook.external_event_id,
                    error = %e,
                    "batch event failed, continuing"
                );
            }
            results.push(result);
        }
        results
    }

    async fn apply_inbound(
        &self,
        webhook: &InboundWebhookEvent,
        report: &mut InboundReport,
    ) -> Result<InboundState, SyncError> {
        let tenant_id = webhook.tenant_id;
        let crm_system = webhook.crm_system;
        let entity_type = webhook.entity_type_hint;

        let Some(link) = self
            .links
            .resolve_external_id(tenant_id, crm_system, entity_type, webhook.external_object_id.trim())
            .await?
        else {
            info!(entity_type = %entity_type, "no entity linked to CRM object");
            return Ok(InboundState::Rejected(RejectReason::NoLink));
        };
        if link.tenant_id != tenant_id || link.crm_system != crm_system || link.entity_type != entity_type {
            error!(kind = "contract_violation", link = ?link, "link store returned a mismatched link");
            return Err(SyncError::contract_violation(format!(
                "resolved {} {} of tenant {} for a {} {} webhook of tenant {}",
                link.crm_system, link.entity_type, link.tenant_id, crm_system, entity_type, tenant_id
            )));
        }
        report.entity_id = Some(link.entity_id);
        report.state = InboundState::Resolved;

        let Some(entity) = self
            .entities
            .get(link.tenant_id, entity_type, link.entity_id)
            .await?
        else {
            info!(entity_id = %link.entity_id, "linked entity no longer exists");
            return Ok(InboundState::Rejected(RejectReason::EntityNotFound));
        };
        check_identity(&entity, link.tenant_id, entity_type, link.entity_id)?;

        if let Some(occurred_at) = webhook.occurred_at {
            if occurred_at <= entity.updated_at() {
                info!(
                    occurred_at = %occurred_at,
                    entity_updated_at = %entity.updated_at(),
                    "webhook is older than the entity, skipping"
                );
                return Ok(InboundState::Skipped(InboundSkipReason::OutOfOrder));
            }
        }

        let update = self
            .mapping
            .parse_inbound(&webhook.raw_fields, link.tenant_id, crm_system, entity_type)
            .await?;
        if update.is_empty() {
            debug!(raw_fields = webhook.raw_fields.len(), "no mapped fields in webhook");
            return Ok(InboundState::Skipped(InboundSkipReason::NoMappedFields));
        }

        let updated = self
            .entities
            .apply_partial_update(link.tenant_id, entity_type, link.entity_id, &update)
            .await?;
        check_identity(&updated, link.tenant_id, entity_type, link.entity_id)?;
        report.applied_fields = update.paths().map(str::to_string).collect();

        if self.config.republish_inbound_updates {
            let event = DomainEvent::entity_updated(link.tenant_id, entity_type, link.entity_id)
                .with_origin(crm_system)
                .with_metadata("external_event_id", webhook.external_event_id.trim());
            report.republished_event = Some(event.event_id());
            debug!(event_id = %event.event_id(), "re-publishing inbound change");
            drop(self.bus.publish_detached(event));
        }

        Ok(InboundState::Applied)
    }

    /// Writes the ledger outcome; a failure here does not undo the work
    async fn record_outcome(&self, webhook: &InboundWebhookEvent, outcome: IdempotencyOutcome) {
        if let Err(e) = self
            .guard
            .complete(webhook.crm_system, &webhook.external_event_id, outcome)
            .await
        {
            warn!(outcome = %outcome, error = %e, "failed to record webhook outcome");
        }
    }
}
