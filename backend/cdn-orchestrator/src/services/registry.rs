/// Provider Registry
///
/// Holds provider definitions and their client handles. Providers are never
/// removed because placements refer to them by id; disabling is the only
/// removal path.
use crate::error::{CdnError, Result};
use crate::models::ProviderDefinition;
use crate::providers::{ProviderClient, ProviderClientFactory};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

struct ProviderEntry {
    definition: ProviderDefinition,
    client: Option<Arc<dyn ProviderClient>>,
}

pub struct ProviderRegistry {
    providers: DashMap<String, ProviderEntry>,
    factory: Arc<dyn ProviderClientFactory>,
}

impl ProviderRegistry {
    pub fn new(factory: Arc<dyn ProviderClientFactory>) -> Self {
        Self {
            providers: DashMap::new(),
            factory,
        }
    }

    fn validate(definition: &ProviderDefinition) -> Result<()> {
        if definition.id.trim().is_empty() {
            return Err(CdnError::Validation("Provider id must not be empty".into()));
        }
        let pricing = &definition.pricing;
        if pricing.cost_per_gb < 0.0 || pricing.cost_per_request < 0.0 || pricing.free_quota_gb < 0.0
        {
            return Err(CdnError::Validation(format!(
                "Provider {} has negative pricing",
                definition.id
            )));
        }
        Ok(())
    }

    /// Add a provider; ids are unique
    pub fn register_provider(&self, definition: ProviderDefinition) -> Result<()> {
        Self::validate(&definition)?;

        let client = if definition.enabled {
            Some(self.factory.build(&definition)?)
        } else {
            None
        };

        match self.providers.entry(definition.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(CdnError::ProviderAlreadyExists(definition.id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                info!(
                    provider_id = %definition.id,
                    kind = definition.kind().as_str(),
                    enabled = definition.enabled,
                    priority = definition.priority,
                    "Provider registered"
                );
                slot.insert(ProviderEntry { definition, client });
                Ok(())
            }
        }
    }

    /// Replace a provider's definition, rebuilding its client
    pub fn update_provider(&self, definition: ProviderDefinition) -> Result<()> {
        Self::validate(&definition)?;

        if !self.providers.contains_key(&definition.id) {
            return Err(CdnError::ProviderNotFound(definition.id));
        }

        let client = if definition.enabled {
            Some(self.factory.build(&definition)?)
        } else {
            None
        };

        let mut entry = self
            .providers
            .get_mut(&definition.id)
            .ok_or_else(|| CdnError::ProviderNotFound(definition.id.clone()))?;
        info!(provider_id = %definition.id, "Provider definition updated");
        entry.definition = definition;
        entry.client = client;
        Ok(())
    }

    pub fn set_enabled(&self, provider_id: &str, enabled: bool) -> Result<()> {
        let mut entry = self
            .providers
            .get_mut(provider_id)
            .ok_or_else(|| CdnError::ProviderNotFound(provider_id.to_string()))?;

        if enabled && entry.client.is_none() {
            entry.client = Some(self.factory.build(&entry.definition)?);
        }
        if entry.definition.enabled != enabled {
            info!(provider_id, enabled, "Provider enablement changed");
        }
        entry.definition.enabled = enabled;
        Ok(())
    }

    pub fn get(&self, provider_id: &str) -> Option<ProviderDefinition> {
        self.providers
            .get(provider_id)
            .map(|e| e.definition.clone())
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.providers.contains_key(provider_id)
    }

    /// Client handle of an enabled provider
    pub fn client(&self, provider_id: &str) -> Option<Arc<dyn ProviderClient>> {
        self.providers
            .get(provider_id)
            .filter(|e| e.definition.enabled)
            .and_then(|e| e.client.clone())
    }

    /// All providers ordered by priority, then id
    pub fn list_all(&self) -> Vec<ProviderDefinition> {
        let mut all: Vec<_> = self
            .providers
            .iter()
            .map(|e| e.definition.clone())
            .collect();
        all.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Enabled providers regardless of health
    pub fn list_enabled(&self) -> Vec<ProviderDefinition> {
        self.list_all().into_iter().filter(|p| p.enabled).collect()
    }

    pub fn enabled_with_clients(&self) -> Vec<(ProviderDefinition, Arc<dyn ProviderClient>)> {
        let mut enabled: Vec<_> = self
            .providers
            .iter()
            .filter(|e| e.definition.enabled)
            .filter_map(|e| e.client.clone().map(|c| (e.definition.clone(), c)))
            .collect();
        enabled.sort_by(|a, b| {
            a.0.priority
                .cmp(&b.0.priority)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        enabled
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
