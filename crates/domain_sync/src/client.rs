//! CRM Client Capability
//!
//! One trait covers every CRM backend. Concrete HTTP clients live outside
//! this crate; the orchestrator only sees `CrmClient` through the registry.
//!
//! # Error contract
//!
//! A remote failure (4xx, 5xx, rejected payload) is a normal outcome and is
//! returned as `Ok(CrmSyncResult::failed(..))`. `Err(PortError)` is reserved
//! for faults inside the client itself. The orchestrator folds both into a
//! failed result for that CRM, but only the latter is logged as an error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use core_kernel::{CrmSystem, DomainPort, EntityType, OperationMetadata, PortError, TenantId};
use domain_mapping::CrmPayload;

/// Credentials and state of one tenant's connection to one CRM
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub tenant_id: TenantId,
    pub crm_system: CrmSystem,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub enabled: bool,
}

impl ConnectionInfo {
    /// An enabled connection with no refresh token or expiry
    pub fn new(tenant_id: TenantId, crm_system: CrmSystem, access_token: impl Into<String>) -> Self {
        Self {
            tenant_id,
            crm_system,
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            enabled: true,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self.expires_at = Some(expires_at);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// True once the access token is past its expiry
    ///
    /// Refreshing is the client's concern; the orchestrator only passes the
    /// connection through.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("tenant_id", &self.tenant_id)
            .field("crm_system", &self.crm_system)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Outcome of one CRM call
///
/// `error_code` and `error_message` are set exactly when `success` is false;
/// the two constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrmSyncResult {
    crm_system: CrmSystem,
    entity_type: EntityType,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    crm_id: Option<String>,
    raw_response: Value,
    duration_ms: u64,
}

impl CrmSyncResult {
    pub fn succeeded(crm_system: CrmSystem, entity_type: EntityType) -> Self {
        Self {
            crm_system,
            entity_type,
            success: true,
            status_code: None,
            error_code: None,
            error_message: None,
            crm_id: None,
            raw_response: Value::Null,
            duration_ms: 0,
        }
    }

    pub fn failed(
        crm_system: CrmSystem,
        entity_type: EntityType,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            crm_system,
            entity_type,
            success: false,
            status_code: None,
            error_code: Some(error_code.into()),
            error_message: Some(error_message.into()),
            crm_id: None,
            raw_response: Value::Null,
            duration_ms: 0,
        }
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_crm_id(mut self, crm_id: impl Into<String>) -> Self {
        self.crm_id = Some(crm_id.into());
        self
    }

    pub fn with_raw_response(mut self, raw_response: Value) -> Self {
        self.raw_response = raw_response;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn crm_system(&self) -> CrmSystem {
        self.crm_system
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn crm_id(&self) -> Option<&str> {
        self.crm_id.as_deref()
    }

    pub fn raw_response(&self) -> &Value {
        &self.raw_response
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
}

/// A CRM backend
#[async_trait]
pub trait CrmClient: DomainPort {
    /// The CRM this client talks to
    fn system(&self) -> CrmSystem;

    /// Creates or updates one object in the CRM
    ///
    /// # Arguments
    ///
    /// * `connection` - The tenant's credentials for this CRM
    /// * `entity_type` - The kind of object being written
    /// * `payload` - Properties in the CRM's field names; `crm_id` is set when
    ///   the object is already linked
    /// * `metadata` - Optional operation metadata for tracing
    async fn upsert(
        &self,
        connection: &ConnectionInfo,
        entity_type: EntityType,
        payload: &CrmPayload,
        metadata: Option<OperationMetadata>,
    ) -> Result<CrmSyncResult, PortError>;
}

/// Scripted CRM client for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    /// How the scripted client answers
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// 200 on update, 201 on create, with a generated id on create
        Succeed,
        /// Remote rejection returned as a failed result
        Reject {
            status_code: u16,
            error_code: String,
            message: String,
        },
        /// Client-side fault returned as `Err`
        Fault(String),
        /// Sleeps before succeeding, for timeout tests
        Delay(Duration),
        /// Panics inside the call
        Panic,
    }

    /// One recorded `upsert` call
    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub tenant_id: TenantId,
        pub entity_type: EntityType,
        pub payload: CrmPayload,
        pub correlation_id: Option<String>,
    }

    /// Client that answers from a script and records every call
    #[derive(Debug)]
    pub struct ScriptedCrmClient {
        system: CrmSystem,
        behavior: Mutex<MockBehavior>,
        calls: Mutex<Vec<RecordedCall>>,
        next_id: AtomicU64,
    }

    impl ScriptedCrmClient {
        pub fn new(system: CrmSystem) -> Self {
            Self::with_behavior(system, MockBehavior::Succeed)
        }

        pub fn with_behavior(system: CrmSystem, behavior: MockBehavior) -> Self {
            Self {
                system,
                behavior: Mutex::new(behavior),
                calls: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }
        }

        /// A client whose calls come back as remote 5xx failures
        pub fn rejecting(system: CrmSystem, status_code: u16) -> Self {
            Self::with_behavior(
                system,
                MockBehavior::Reject {
                    status_code,
                    error_code: format!("http_{}", status_code),
                    message: format!("{} answered {}", system, status_code),
                },
            )
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = behavior;
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        pub fn last_call(&self) -> Option<RecordedCall> {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
        }
    }

    impl DomainPort for ScriptedCrmClient {}

    #[async_trait]
    impl CrmClient for ScriptedCrmClient {
        fn system(&self) -> CrmSystem {
            self.system
        }

        async fn upsert(
            &self,
            connection: &ConnectionInfo,
            entity_type: EntityType,
            payload: &CrmPayload,
            metadata: Option<OperationMetadata>,
        ) -> Result<CrmSyncResult, PortError> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(RecordedCall {
                    tenant_id: connection.tenant_id,
                    entity_type,
                    payload: payload.clone(),
                    correlation_id: metadata.and_then(|m| m.correlation_id),
                });

            let behavior = self
                .behavior
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();

            match behavior {
                MockBehavior::Succeed => {}
                MockBehavior::Delay(delay) => tokio::time::sleep(delay).await,
                MockBehavior::Reject {
                    status_code,
                    error_code,
                    message,
                } => {
                    return Ok(CrmSyncResult::failed(self.system, entity_type, error_code, message)
                        .with_status_code(status_code)
                        .with_raw_response(json!({ "status": "error" })));
                }
                MockBehavior::Fault(message) => return Err(PortError::internal(message)),
                MockBehavior::Panic => panic!("scripted client panic"),
            }

            let (status_code, crm_id) = match payload.crm_id() {
                Some(id) => (200, id.to_string()),
                None => {
                    let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                    (201, format!("{}-{}", self.system, n))
                }
            };

            Ok(CrmSyncResult::succeeded(self.system, entity_type)
                .with_status_code(status_code)
                .with_raw_response(json!({ "id": crm_id, "properties": payload.properties() }))
                .with_crm_id(crm_id))
        }
    }
}
