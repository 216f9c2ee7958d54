//! Test Data Builders
//!
//! Builders for canonical entities and inbound webhooks. Tests set only the
//! fields they care about; everything else gets a fixture default.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use core_kernel::{CrmSystem, EntityId, EntityType, TenantId};
use domain_mapping::{CanonicalEntity, Company, Contact, Opportunity, PostalAddress};
use domain_sync::InboundWebhookEvent;

use crate::fixtures::{IdFixtures, TimeFixtures};

/// Builder for companies
#[derive(Debug, Clone)]
pub struct CompanyBuilder {
    company: Company,
}

impl Default for CompanyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CompanyBuilder {
    /// A company named "Acme Corp" for the default tenant
    pub fn new() -> Self {
        let mut company = Company::new(IdFixtures::tenant_acme(), EntityId::new());
        company.updated_at = TimeFixtures::entity_updated_at();
        company.name = Some("Acme Corp".to_string());
        company.domain = Some("acme.io".to_string());
        Self { company }
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.company.tenant_id = tenant_id;
        self
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.company.id = id;
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.company.updated_at = updated_at;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.company.name = Some(name.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.company.domain = Some(domain.into());
        self
    }

    pub fn with_employees(mut self, employees: u64) -> Self {
        self.company.employees = Some(employees);
        self
    }

    pub fn with_city(mut self, city: impl Into<String>, country: impl Into<String>) -> Self {
        self.company.address = Some(PostalAddress {
            city: Some(city.into()),
            country: Some(country.into()),
            ..PostalAddress::default()
        });
        self
    }

    /// Clears every optional field
    pub fn blank(mut self) -> Self {
        let mut company = Company::new(self.company.tenant_id, self.company.id);
        company.updated_at = self.company.updated_at;
        self.company = company;
        self
    }

    pub fn build(self) -> Company {
        self.company
    }

    pub fn build_entity(self) -> CanonicalEntity {
        CanonicalEntity::Company(self.company)
    }
}

/// Builder for contacts
#[derive(Debug, Clone)]
pub struct ContactBuilder {
    contact: Contact,
}

impl Default for ContactBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactBuilder {
    pub fn new() -> Self {
        let mut contact = Contact::new(IdFixtures::tenant_acme(), EntityId::new());
        contact.updated_at = TimeFixtures::entity_updated_at();
        contact.first_name = Some("Ada".to_string());
        contact.last_name = Some("Lovelace".to_string());
        contact.email = Some("ada@acme.io".to_string());
        Self { contact }
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.contact.tenant_id = tenant_id;
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.contact.updated_at = updated_at;
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.contact.email = Some(email.into());
        self
    }

    pub fn with_job_title(mut self, job_title: impl Into<String>) -> Self {
        self.contact.job_title = Some(job_title.into());
        self
    }

    pub fn without_email(mut self) -> Self {
        self.contact.email = None;
        self
    }

    pub fn build(self) -> Contact {
        self.contact
    }

    pub fn build_entity(self) -> CanonicalEntity {
        CanonicalEntity::Contact(self.contact)
    }
}

/// Builder for opportunities
#[derive(Debug, Clone)]
pub struct OpportunityBuilder {
    opportunity: Opportunity,
}

impl Default for OpportunityBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OpportunityBuilder {
    pub fn new() -> Self {
        let mut opportunity = Opportunity::new(IdFixtures::tenant_acme(), EntityId::new());
        opportunity.updated_at = TimeFixtures::entity_updated_at();
        opportunity.name = Some("Acme renewal".to_string());
        opportunity.amount = Some(12_500.0);
        opportunity.stage = Some("negotiation".to_string());
        Self { opportunity }
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.opportunity.tenant_id = tenant_id;
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.opportunity.amount = Some(amount);
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.opportunity.stage = Some(stage.into());
        self
    }

    pub fn with_close_date(mut self, close_date: NaiveDate) -> Self {
        self.opportunity.close_date = Some(close_date);
        self
    }

    pub fn build(self) -> Opportunity {
        self.opportunity
    }

    pub fn build_entity(self) -> CanonicalEntity {
        CanonicalEntity::Opportunity(self.opportunity)
    }
}

/// Builder for inbound webhooks
///
/// Webhooks come from the Acme tenant unless `with_tenant` says otherwise.
/// Each builder gets a fresh event id, so two built webhooks never collide
/// on the idempotency key unless a test asks for it.
#[derive(Debug, Clone)]
pub struct WebhookBuilder {
    event: InboundWebhookEvent,
}

impl WebhookBuilder {
    pub fn new(crm_system: CrmSystem, entity_type: EntityType, external_object_id: impl Into<String>) -> Self {
        Self {
            event: InboundWebhookEvent::new(
                IdFixtures::tenant_acme(),
                crm_system,
                IdFixtures::external_event_id(),
                external_object_id,
                entity_type,
            )
            .with_occurred_at(TimeFixtures::webhook_after_update()),
        }
    }

    /// A HubSpot company change
    pub fn hubspot_company(external_object_id: impl Into<String>) -> Self {
        Self::new(CrmSystem::HubSpot, EntityType::Company, external_object_id)
    }

    /// A Salesforce contact change
    pub fn salesforce_contact(external_object_id: impl Into<String>) -> Self {
        Self::new(CrmSystem::Salesforce, EntityType::Contact, external_object_id)
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.event.tenant_id = tenant_id;
        self
    }

    pub fn with_event_id(mut self, external_event_id: impl Into<String>) -> Self {
        self.event.external_event_id = external_event_id.into();
        self
    }

    pub fn with_field(mut self, crm_field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.event = self.event.with_field(crm_field, value);
        self
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.event.occurred_at = Some(occurred_at);
        self
    }

    pub fn without_timestamp(mut self) -> Self {
        self.event.occurred_at = None;
        self
    }

    pub fn build(self) -> InboundWebhookEvent {
        self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_builder_defaults() {
        let company = CompanyBuilder::new().build();

        assert_eq!(company.tenant_id, IdFixtures::tenant_acme());
        assert_eq!(company.name.as_deref(), Some("Acme Corp"));
        assert_eq!(company.updated_at, TimeFixtures::entity_updated_at());
    }

    #[test]
    fn test_blank_company_keeps_identity() {
        let id = EntityId::new();
        let company = CompanyBuilder::new().with_id(id).blank().build();

        assert_eq!(company.id, id);
        assert!(company.name.is_none());
        assert!(company.domain.is_none());
    }

    #[test]
    fn test_webhooks_get_distinct_event_ids() {
        let a = WebhookBuilder::hubspot_company("1").build();
        let b = WebhookBuilder::hubspot_company("1").build();

        assert_ne!(a.external_event_id, b.external_event_id);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_entity_types() {
        assert_eq!(ContactBuilder::new().build_entity().entity_type(), EntityType::Contact);
        assert_eq!(OpportunityBuilder::new().build_entity().entity_type(), EntityType::Opportunity);
    }
}
