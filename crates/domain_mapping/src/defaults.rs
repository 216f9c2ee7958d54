//! Built-in default mapping catalog
//!
//! The default layer for every CRM the engine ships knowledge of. Tenants
//! override these field by field. Pipedrive has no built-in defaults; its
//! custom-field keys are per-account hashes, so every Pipedrive mapping is
//! tenant-configured.

use core_kernel::{CrmSystem, EntityType};

use crate::rule::MappingRule;

type FieldPairs = &'static [(&'static str, &'static str)];

const HUBSPOT_COMPANY: FieldPairs = &[
    ("name", "name"),
    ("domain", "domain"),
    ("website", "website"),
    ("industry", "industry"),
    ("employees", "numberofemployees"),
    ("phone", "phone"),
    ("description", "description"),
    ("address.city", "city"),
    ("address.country", "country"),
];

const HUBSPOT_CONTACT: FieldPairs = &[
    ("first_name", "firstname"),
    ("last_name", "lastname"),
    ("email", "email"),
    ("phone", "phone"),
    ("mobile_phone", "mobilephone"),
    ("job_title", "jobtitle"),
    ("linkedin_url", "linkedinbio"),
];

const HUBSPOT_OPPORTUNITY: FieldPairs = &[
    ("name", "dealname"),
    ("amount", "amount"),
    ("stage", "dealstage"),
    ("pipeline", "pipeline"),
    ("close_date", "closedate"),
];

const SALESFORCE_COMPANY: FieldPairs = &[
    ("name", "Name"),
    ("website", "Website"),
    ("industry", "Industry"),
    ("employees", "NumberOfEmployees"),
    ("phone", "Phone"),
    ("description", "Description"),
    ("address.city", "BillingCity"),
    ("address.country", "BillingCountry"),
];

const SALESFORCE_CONTACT: FieldPairs = &[
    ("first_name", "FirstName"),
    ("last_name", "LastName"),
    ("email", "Email"),
    ("phone", "Phone"),
    ("mobile_phone", "MobilePhone"),
    ("job_title", "Title"),
];

const SALESFORCE_OPPORTUNITY: FieldPairs = &[
    ("name", "Name"),
    ("amount", "Amount"),
    ("stage", "StageName"),
    ("close_date", "CloseDate"),
    ("lead_source", "LeadSource"),
];

const SAP_B1_COMPANY: FieldPairs = &[
    ("name", "CardName"),
    ("website", "Website"),
    ("industry", "Industry"),
    ("phone", "Phone1"),
    ("address.city", "MailCity"),
    ("address.country", "MailCountry"),
];

const SAP_B1_CONTACT: FieldPairs = &[
    ("first_name", "FirstName"),
    ("last_name", "LastName"),
    ("email", "E_Mail"),
    ("phone", "Phone1"),
    ("mobile_phone", "MobilePhone"),
    ("job_title", "Position"),
];

const SAP_B1_OPPORTUNITY: FieldPairs = &[
    ("name", "Name"),
    ("amount", "MaxLocalTotal"),
    ("stage", "CurrentStageNumber"),
    ("close_date", "ClosingDate"),
];

fn pairs_for(crm_system: CrmSystem, entity_type: EntityType) -> FieldPairs {
    match (crm_system, entity_type) {
        (CrmSystem::HubSpot, EntityType::Company) => HUBSPOT_COMPANY,
        (CrmSystem::HubSpot, EntityType::Contact) => HUBSPOT_CONTACT,
        (CrmSystem::HubSpot, EntityType::Opportunity) => HUBSPOT_OPPORTUNITY,
        (CrmSystem::Salesforce, EntityType::Company) => SALESFORCE_COMPANY,
        (CrmSystem::Salesforce, EntityType::Contact) => SALESFORCE_CONTACT,
        (CrmSystem::Salesforce, EntityType::Opportunity) => SALESFORCE_OPPORTUNITY,
        (CrmSystem::SapB1, EntityType::Company) => SAP_B1_COMPANY,
        (CrmSystem::SapB1, EntityType::Contact) => SAP_B1_CONTACT,
        (CrmSystem::SapB1, EntityType::Opportunity) => SAP_B1_OPPORTUNITY,
        (CrmSystem::Pipedrive, _) => &[],
    }
}

/// Built-in default rules for a CRM and entity type
pub fn builtin_default_rules(crm_system: CrmSystem, entity_type: EntityType) -> Vec<MappingRule> {
    pairs_for(crm_system, entity_type)
        .iter()
        .map(|(canonical, crm)| MappingRule::default_rule(crm_system, entity_type, *canonical, *crm))
        .collect()
}
