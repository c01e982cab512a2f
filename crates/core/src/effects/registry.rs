use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use super::{
    register_builtins, BrushDescriptor, BrushEntity, BrushInstance, BrushSlot, EffectDescriptor,
    EffectSlot, LayerEffectEntity, LayerEffectInstance, ProviderKey,
};
use crate::{LightweaveError, Result};

/// Change in the set of registered effect or brush types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Registered(ProviderKey),
    Unregistered(ProviderKey),
}

/// Effect and brush types currently offered by providers.
///
/// Registration may happen from any thread. Elements never observe a change
/// directly: the render loop drains [`subscribe`](Self::subscribe) between
/// ticks and swaps placeholders in or out.
#[derive(Default)]
pub struct ProviderRegistry {
    effects: RwLock<HashMap<ProviderKey, EffectDescriptor>>,
    brushes: RwLock<HashMap<ProviderKey, BrushDescriptor>>,
    subscribers: Mutex<Vec<Sender<ProviderEvent>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in brushes and effects.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        register_builtins(&registry);
        registry
    }

    pub fn subscribe(&self) -> Receiver<ProviderEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn notify(&self, event: ProviderEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn register_effect(&self, descriptor: EffectDescriptor) {
        let key = descriptor.key.clone();
        tracing::debug!(effect = %key, "effect registered");
        self.effects.write().insert(key.clone(), descriptor);
        self.notify(ProviderEvent::Registered(key));
    }

    pub fn register_brush(&self, descriptor: BrushDescriptor) {
        let key = descriptor.key.clone();
        tracing::debug!(brush = %key, "brush registered");
        self.brushes.write().insert(key.clone(), descriptor);
        self.notify(ProviderEvent::Registered(key));
    }

    /// Removes every effect and brush type offered by `provider_id`.
    /// Returns how many types were removed.
    pub fn unregister_provider(&self, provider_id: &str) -> usize {
        let mut removed = Vec::new();
        self.effects.write().retain(|key, _| {
            let keep = key.provider_id != provider_id;
            if !keep {
                removed.push(key.clone());
            }
            keep
        });
        self.brushes.write().retain(|key, _| {
            let keep = key.provider_id != provider_id;
            if !keep {
                removed.push(key.clone());
            }
            keep
        });

        tracing::info!(provider = provider_id, types = removed.len(), "provider unregistered");
        let count = removed.len();
        for key in removed {
            self.notify(ProviderEvent::Unregistered(key));
        }
        count
    }

    pub fn has_effect(&self, key: &ProviderKey) -> bool {
        self.effects.read().contains_key(key)
    }

    pub fn has_brush(&self, key: &ProviderKey) -> bool {
        self.brushes.read().contains_key(key)
    }

    pub fn effect_keys(&self) -> Vec<ProviderKey> {
        let mut keys: Vec<_> = self.effects.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn brush_keys(&self) -> Vec<ProviderKey> {
        let mut keys: Vec<_> = self.brushes.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Rebuilds a live effect from its stored entity.
    pub fn create_effect(&self, entity: &LayerEffectEntity) -> Result<LayerEffectInstance> {
        let effects = self.effects.read();
        let descriptor = effects
            .get(&entity.key)
            .ok_or_else(|| LightweaveError::ProviderUnavailable(entity.key.to_string()))?;
        LayerEffectInstance::from_entity(descriptor, entity)
    }

    /// Creates a fresh effect of the given type with default properties.
    pub fn instantiate_effect(&self, key: &ProviderKey) -> Result<LayerEffectInstance> {
        let name = self
            .effects
            .read()
            .get(key)
            .map(|descriptor| descriptor.display_name.clone())
            .ok_or_else(|| LightweaveError::ProviderUnavailable(key.to_string()))?;
        self.create_effect(&LayerEffectEntity {
            id: Uuid::new_v4(),
            key: key.clone(),
            name,
            order: 0,
            enabled: true,
            suspended: false,
            has_been_renamed: false,
            properties: Vec::new(),
        })
    }

    /// Live effect when its provider is registered, otherwise a placeholder.
    /// Stored data that no longer fits the effect's schema is still an error.
    pub fn resolve_effect(&self, entity: LayerEffectEntity) -> Result<EffectSlot> {
        match self.create_effect(&entity) {
            Ok(effect) => Ok(EffectSlot::Live(effect)),
            Err(LightweaveError::ProviderUnavailable(_)) => Ok(EffectSlot::Placeholder(entity)),
            Err(err) => Err(err),
        }
    }

    pub fn create_brush(&self, entity: &BrushEntity) -> Result<BrushInstance> {
        let brushes = self.brushes.read();
        let descriptor = brushes
            .get(&entity.key)
            .ok_or_else(|| LightweaveError::ProviderUnavailable(entity.key.to_string()))?;
        BrushInstance::from_entity(descriptor, entity)
    }

    pub fn resolve_brush(&self, entity: BrushEntity) -> Result<BrushSlot> {
        match self.create_brush(&entity) {
            Ok(brush) => Ok(BrushSlot::Live(brush)),
            Err(LightweaveError::ProviderUnavailable(_)) => Ok(BrushSlot::Placeholder(entity)),
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("effects", &self.effect_keys())
            .field("brushes", &self.brush_keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::BUILTIN_PROVIDER;
    use crate::property::PropertyValue;

    #[test]
    fn unregistering_reports_each_type() {
        let registry = ProviderRegistry::with_builtins();
        let events = registry.subscribe();

        let removed = registry.unregister_provider(BUILTIN_PROVIDER);
        assert_eq!(removed, 6);
        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(received.len(), 6);
        assert!(received
            .iter()
            .all(|event| matches!(event, ProviderEvent::Unregistered(_))));
        assert!(registry.effect_keys().is_empty());
    }

    #[test]
    fn missing_provider_resolves_to_placeholder() {
        let registry = ProviderRegistry::new();
        let entity = LayerEffectEntity {
            id: Uuid::new_v4(),
            key: ProviderKey::new("plugin.gone", "Blur"),
            name: "Blur".into(),
            order: 1,
            enabled: true,
            suspended: false,
            has_been_renamed: false,
            properties: Vec::new(),
        };
        let slot = registry.resolve_effect(entity.clone()).unwrap();
        assert!(slot.is_placeholder());
        assert_eq!(slot.to_entity(), entity);
    }

    #[test]
    fn instantiated_effect_uses_prefixed_property_paths() {
        let registry = ProviderRegistry::with_builtins();
        let effect = registry
            .instantiate_effect(&ProviderKey::new(BUILTIN_PROVIDER, "Dim"))
            .unwrap();
        let property = effect.properties().property("Brightness").unwrap();
        assert_eq!(
            property.path(),
            format!("LayerEffect.{}.Dim.Brightness", effect.id())
        );
        assert_eq!(property.current_value(), PropertyValue::Float(50.0));
        assert_eq!(effect.name, "Dim");
    }
}
