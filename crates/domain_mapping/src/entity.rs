//! Canonical entities
//!
//! The CRM-independent representation of the business objects the engine
//! synchronizes. Mapping rules address fields of these structs by
//! dot-separated path over their JSON form (`address.city`), so the serde
//! field names here are part of the mapping contract.
//!
//! `id`, `tenant_id` and `updated_at` are owned by the engine and the entity
//! store; rules may not read from or write to them.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use core_kernel::{EntityId, EntityType, TenantId};

use crate::error::MappingError;

/// Top-level fields no rule may target
pub const PROTECTED_FIELDS: [&str; 3] = ["id", "tenant_id", "updated_at"];

/// Postal address embedded in a company
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostalAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// A company (account) record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: EntityId,
    pub tenant_id: TenantId,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub employees: Option<u64>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub address: Option<PostalAddress>,
}

impl Company {
    /// A company with only identity fields set
    pub fn new(tenant_id: TenantId, id: EntityId) -> Self {
        Self {
            id,
            tenant_id,
            updated_at: Utc::now(),
            name: None,
            domain: None,
            website: None,
            industry: None,
            employees: None,
            phone: None,
            description: None,
            address: None,
        }
    }
}

/// A person attached to a company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: EntityId,
    pub tenant_id: TenantId,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile_phone: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
}

impl Contact {
    pub fn new(tenant_id: TenantId, id: EntityId) -> Self {
        Self {
            id,
            tenant_id,
            updated_at: Utc::now(),
            first_name: None,
            last_name: None,
            email: None,
            phone: None,
            mobile_phone: None,
            job_title: None,
            linkedin_url: None,
        }
    }
}

/// A sales opportunity (deal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: EntityId,
    pub tenant_id: TenantId,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_date")]
    pub close_date: Option<NaiveDate>,
    #[serde(default)]
    pub lead_source: Option<String>,
}

impl Opportunity {
    pub fn new(tenant_id: TenantId, id: EntityId) -> Self {
        Self {
            id,
            tenant_id,
            updated_at: Utc::now(),
            name: None,
            amount: None,
            stage: None,
            pipeline: None,
            close_date: None,
            lead_source: None,
        }
    }
}

/// Any canonical entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum CanonicalEntity {
    Company(Company),
    Contact(Contact),
    Opportunity(Opportunity),
}

impl CanonicalEntity {
    pub fn entity_type(&self) -> EntityType {
        match self {
            CanonicalEntity::Company(_) => EntityType::Company,
            CanonicalEntity::Contact(_) => EntityType::Contact,
            CanonicalEntity::Opportunity(_) => EntityType::Opportunity,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            CanonicalEntity::Company(c) => c.id,
            CanonicalEntity::Contact(c) => c.id,
            CanonicalEntity::Opportunity(o) => o.id,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        match self {
            CanonicalEntity::Company(c) => c.tenant_id,
            CanonicalEntity::Contact(c) => c.tenant_id,
            CanonicalEntity::Opportunity(o) => o.tenant_id,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            CanonicalEntity::Company(c) => c.updated_at,
            CanonicalEntity::Contact(c) => c.updated_at,
            CanonicalEntity::Opportunity(o) => o.updated_at,
        }
    }

    /// The entity's fields as a JSON object, without the type tag
    pub fn to_field_map(&self) -> Result<Map<String, Value>, MappingError> {
        let value = match self {
            CanonicalEntity::Company(c) => serde_json::to_value(c),
            CanonicalEntity::Contact(c) => serde_json::to_value(c),
            CanonicalEntity::Opportunity(o) => serde_json::to_value(o),
        }
        .map_err(|e| MappingError::entity_shape(self.entity_type(), e.to_string()))?;

        match value {
            Value::Object(map) => Ok(map),
            other => Err(MappingError::entity_shape(
                self.entity_type(),
                format!("expected an object, got {}", other),
            )),
        }
    }

    /// Rebuilds an entity of the given type from a field map
    pub fn from_field_map(
        entity_type: EntityType,
        fields: Map<String, Value>,
    ) -> Result<Self, MappingError> {
        let value = Value::Object(fields);
        match entity_type {
            EntityType::Company => decode(entity_type, value).map(CanonicalEntity::Company),
            EntityType::Contact => decode(entity_type, value).map(CanonicalEntity::Contact),
            EntityType::Opportunity => decode(entity_type, value).map(CanonicalEntity::Opportunity),
        }
    }

    /// Reads a field by dotted path; `None` when absent or null
    pub fn field(&self, path: &str) -> Result<Option<Value>, MappingError> {
        let map = self.to_field_map()?;
        Ok(get_path(&map, path).cloned())
    }

    /// Applies a partial update, leaving fields it does not name untouched
    ///
    /// Identity fields are preserved; `updated_at` is stamped with `now`.
    pub fn apply(&self, update: &PartialUpdate, now: DateTime<Utc>) -> Result<Self, MappingError> {
        let mut map = self.to_field_map()?;
        for (path, value) in update.iter() {
            set_path(&mut map, path, value.clone())?;
        }
        map.insert("updated_at".to_string(), serde_json::to_value(now).map_err(|e| {
            MappingError::entity_shape(self.entity_type(), e.to_string())
        })?);
        Self::from_field_map(self.entity_type(), map)
    }
}

fn decode<T: DeserializeOwned>(entity_type: EntityType, value: Value) -> Result<T, MappingError> {
    serde_json::from_value(value).map_err(|e| MappingError::entity_shape(entity_type, e.to_string()))
}

/// Canonical field path → new value, produced by inbound parsing
///
/// A path that is not present is left untouched on apply. A `null` value
/// clears the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartialUpdate {
    fields: BTreeMap<String, Value>,
}

impl PartialUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: impl Into<String>, value: Value) {
        self.fields.insert(path.into(), value);
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.fields.get(path)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl FromIterator<(String, Value)> for PartialUpdate {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Checks that a path is well formed and does not touch identity fields
pub fn validate_path(path: &str) -> Result<(), MappingError> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(MappingError::InvalidPath(path.to_string()));
    }
    let head = path.split('.').next().unwrap_or(path);
    if PROTECTED_FIELDS.contains(&head) {
        return Err(MappingError::ProtectedField(path.to_string()));
    }
    Ok(())
}

/// Looks up a dotted path, treating `null` like a missing key
pub fn get_path<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = map.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Writes a dotted path, creating intermediate objects as needed
pub fn set_path(map: &mut Map<String, Value>, path: &str, value: Value) -> Result<(), MappingError> {
    validate_path(path)?;

    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Err(MappingError::InvalidPath(path.to_string())),
    };

    let mut current = map;
    for segment in parents {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(inner) => inner,
            _ => return Err(MappingError::InvalidPath(path.to_string())),
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Deserializers that accept the loose value shapes CRMs send
/// (numbers as strings, dates as epoch milliseconds).
mod lenient {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberLike {
        Int(u64),
        Float(f64),
        Text(String),
    }

    pub fn opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        let raw: Option<NumberLike> = Option::deserialize(d)?;
        match raw {
            None => Ok(None),
            Some(NumberLike::Int(n)) => Ok(Some(n)),
            Some(NumberLike::Float(f)) if f >= 0.0 && f.fract() == 0.0 => Ok(Some(f as u64)),
            Some(NumberLike::Float(f)) => {
                Err(serde::de::Error::custom(format!("expected a whole number, got {}", f)))
            }
            Some(NumberLike::Text(s)) if s.trim().is_empty() => Ok(None),
            Some(NumberLike::Text(s)) => s
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("expected a whole number, got '{}'", s))),
        }
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        let raw: Option<NumberLike> = Option::deserialize(d)?;
        match raw {
            None => Ok(None),
            Some(NumberLike::Int(n)) => Ok(Some(n as f64)),
            Some(NumberLike::Float(f)) => Ok(Some(f)),
            Some(NumberLike::Text(s)) if s.trim().is_empty() => Ok(None),
            Some(NumberLike::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("expected a number, got '{}'", s))),
        }
    }

    pub fn opt_date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<NumberLike> = Option::deserialize(d)?;
        let millis = match raw {
            None => return Ok(None),
            Some(NumberLike::Int(n)) => n as i64,
            Some(NumberLike::Float(f)) => f as i64,
            Some(NumberLike::Text(s)) => {
                let s = s.trim();
                if s.is_empty() {
                    return Ok(None);
                }
                if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    return Ok(Some(date));
                }
                if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                    return Ok(Some(ts.with_timezone(&Utc).date_naive()));
                }
                s.parse::<i64>()
                    .map_err(|_| serde::de::Error::custom(format!("unrecognized date '{}'", s)))?
            }
        };
        Utc.timestamp_millis_opt(millis)
            .single()
            .map(|ts| Some(ts.date_naive()))
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp {} out of range", millis)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn company() -> Company {
        let mut company = Company::new(TenantId::new(), EntityId::new());
        company.name = Some("Acme GmbH".to_string());
        company.address = Some(PostalAddress {
            city: Some("Berlin".to_string()),
            ..Default::default()
        });
        company
    }

    #[test]
    fn test_field_reads_dotted_path() {
        let entity = CanonicalEntity::Company(company());
        assert_eq!(entity.field("name").unwrap(), Some(json!("Acme GmbH")));
        assert_eq!(entity.field("address.city").unwrap(), Some(json!("Berlin")));
        assert_eq!(entity.field("address.country").unwrap(), None);
        assert_eq!(entity.field("employees").unwrap(), None);
        assert_eq!(entity.field("no.such.path").unwrap(), None);
    }

    #[test]
    fn test_apply_is_partial() {
        let original = company();
        let entity = CanonicalEntity::Company(original.clone());
        let update: PartialUpdate = [("domain".to_string(), json!("acme.de"))].into_iter().collect();

        let now = Utc::now();
        let updated = entity.apply(&update, now).unwrap();
        let CanonicalEntity::Company(updated) = updated else {
            panic!("type changed");
        };

        assert_eq!(updated.domain.as_deref(), Some("acme.de"));
        assert_eq!(updated.name, original.name);
        assert_eq!(updated.address, original.address);
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.updated_at, now);
    }

    #[test]
    fn test_apply_creates_nested_objects() {
        let mut bare = company();
        bare.address = None;
        let entity = CanonicalEntity::Company(bare);
        let update: PartialUpdate =
            [("address.country".to_string(), json!("DE"))].into_iter().collect();

        let CanonicalEntity::Company(updated) = entity.apply(&update, Utc::now()).unwrap() else {
            panic!("type changed");
        };
        assert_eq!(updated.address.and_then(|a| a.country).as_deref(), Some("DE"));
    }

    #[test]
    fn test_apply_rejects_identity_fields() {
        let entity = CanonicalEntity::Company(company());
        let update: PartialUpdate =
            [("tenant_id".to_string(), json!(TenantId::new()))].into_iter().collect();
        let err = entity.apply(&update, Utc::now()).unwrap_err();
        assert!(matches!(err, MappingError::ProtectedField(_)));
    }

    #[test]
    fn test_lenient_numbers_from_strings() {
        let entity = CanonicalEntity::Company(company());
        let update: PartialUpdate = [("employees".to_string(), json!("250"))].into_iter().collect();
        let CanonicalEntity::Company(updated) = entity.apply(&update, Utc::now()).unwrap() else {
            panic!("type changed");
        };
        assert_eq!(updated.employees, Some(250));
    }

    #[test]
    fn test_bad_value_is_entity_shape_error() {
        let entity = CanonicalEntity::Company(company());
        let update: PartialUpdate =
            [("employees".to_string(), json!("lots"))].into_iter().collect();
        let err = entity.apply(&update, Utc::now()).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_close_date_accepts_epoch_millis() {
        let entity = CanonicalEntity::Opportunity(Opportunity::new(TenantId::new(), EntityId::new()));
        // 2024-03-01T00:00:00Z
        let update: PartialUpdate =
            [("close_date".to_string(), json!("1709251200000"))].into_iter().collect();
        let CanonicalEntity::Opportunity(updated) = entity.apply(&update, Utc::now()).unwrap() else {
            panic!("type changed");
        };
        assert_eq!(updated.close_date, NaiveDate::from_ymd_opt(2024, 3, 1));
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("address.city").is_ok());
        assert!(matches!(validate_path(""), Err(MappingError::InvalidPath(_))));
        assert!(matches!(validate_path("address..city"), Err(MappingError::InvalidPath(_))));
        assert!(matches!(validate_path("id"), Err(MappingError::ProtectedField(_))));
    }
}
