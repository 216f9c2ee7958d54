//! CRM client registry
//!
//! Built once at startup and shared read-only afterwards. Adding a CRM
//! backend means registering one more client here; nothing else changes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use core_kernel::CrmSystem;

use crate::client::CrmClient;

/// Clients keyed by the CRM they serve
#[derive(Clone, Default)]
pub struct CrmClientRegistry {
    clients: HashMap<CrmSystem, Arc<dyn CrmClient>>,
}

impl CrmClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client under its own `system()`, returning any client it replaced
    pub fn register(&mut self, client: Arc<dyn CrmClient>) -> Option<Arc<dyn CrmClient>> {
        self.clients.insert(client.system(), client)
    }

    /// Builder form of `register`
    pub fn with_client(mut self, client: Arc<dyn CrmClient>) -> Self {
        self.register(client);
        self
    }

    pub fn get(&self, crm_system: CrmSystem) -> Option<Arc<dyn CrmClient>> {
        self.clients.get(&crm_system).cloned()
    }

    pub fn contains(&self, crm_system: CrmSystem) -> bool {
        self.clients.contains_key(&crm_system)
    }

    /// Registered systems in declaration order
    pub fn systems(&self) -> Vec<CrmSystem> {
        CrmSystem::ALL
            .into_iter()
            .filter(|s| self.clients.contains_key(s))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl fmt::Debug for CrmClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrmClientRegistry")
            .field("systems", &self.systems())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::ScriptedCrmClient;

    #[test]
    fn test_register_and_lookup() {
        let registry = CrmClientRegistry::new()
            .with_client(Arc::new(ScriptedCrmClient::new(CrmSystem::Salesforce)))
            .with_client(Arc::new(ScriptedCrmClient::new(CrmSystem::HubSpot)));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(CrmSystem::HubSpot));
        assert!(registry.get(CrmSystem::Pipedrive).is_none());
        assert_eq!(registry.systems(), vec![CrmSystem::HubSpot, CrmSystem::Salesforce]);
    }

    #[test]
    fn test_register_replaces_same_system() {
        let mut registry = CrmClientRegistry::new();
        assert!(registry
            .register(Arc::new(ScriptedCrmClient::new(CrmSystem::HubSpot)))
            .is_none());
        assert!(registry
            .register(Arc::new(ScriptedCrmClient::new(CrmSystem::HubSpot)))
            .is_some());
        assert_eq!(registry.len(), 1);
    }
}
