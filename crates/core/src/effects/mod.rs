//! Layer effects and brushes, resolved from providers at runtime.
//!
//! Every effect or brush on an element is identified by a [`ProviderKey`].
//! When that provider is not registered the element keeps a placeholder
//! holding the stored entity verbatim, and swaps it back for a live instance
//! once the provider returns. Ordering and rendering treat both forms alike.

mod brush;
mod builtin;
mod registry;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::property::{GroupSchema, LayerPropertyGroup, PropertyEntity};
use crate::render::{ClipRegion, ElementShape, FrameContext, RenderTarget};
use crate::Result;

pub use brush::{BrushDescriptor, BrushEntity, BrushInstance, BrushSlot, LayerBrush};
pub use builtin::{
    register_builtins, DimEffect, GradientBrush, InvertEffect, MaskEffect, RainbowBrush,
    SolidBrush, BUILTIN_PROVIDER,
};
pub use registry::{ProviderEvent, ProviderRegistry};

/// Stable identity of an effect or brush type: the providing plugin plus the
/// type name within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderKey {
    pub provider_id: String,
    pub type_name: String,
}

impl ProviderKey {
    pub fn new(provider_id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            type_name: type_name.into(),
        }
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.type_name)
    }
}

/// A post-processing step applied to an element's rendered output and shape.
pub trait LayerEffect: Send {
    fn update(&mut self, _ctx: &FrameContext<'_>, _properties: &LayerPropertyGroup) {}

    /// Modifies the element's pixels after its content has been drawn.
    fn post_process(
        &mut self,
        _target: &mut RenderTarget,
        _properties: &LayerPropertyGroup,
    ) -> Result<()> {
        Ok(())
    }

    /// Adds the LEDs this effect removes from the element's shape to `excluded`.
    fn clip(&self, _shape: &ElementShape, _properties: &LayerPropertyGroup, _excluded: &mut ClipRegion) {}
}

pub type EffectFactory = dyn Fn() -> Box<dyn LayerEffect> + Send + Sync;

/// Registration record for an effect type.
#[derive(Clone)]
pub struct EffectDescriptor {
    pub key: ProviderKey,
    pub display_name: String,
    pub schema: GroupSchema,
    pub factory: std::sync::Arc<EffectFactory>,
}

impl EffectDescriptor {
    pub fn new<F>(key: ProviderKey, display_name: impl Into<String>, schema: GroupSchema, factory: F) -> Self
    where
        F: Fn() -> Box<dyn LayerEffect> + Send + Sync + 'static,
    {
        Self {
            key,
            display_name: display_name.into(),
            schema,
            factory: std::sync::Arc::new(factory),
        }
    }
}

impl fmt::Debug for EffectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectDescriptor")
            .field("key", &self.key)
            .field("display_name", &self.display_name)
            .finish()
    }
}

fn enabled_default() -> bool {
    true
}

/// Persisted form of a layer effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerEffectEntity {
    pub id: Uuid,
    pub key: ProviderKey,
    pub name: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub has_been_renamed: bool,
    #[serde(default)]
    pub properties: Vec<PropertyEntity>,
}

/// A live effect on an element together with its property group.
pub struct LayerEffectInstance {
    id: Uuid,
    key: ProviderKey,
    pub name: String,
    order: u32,
    pub enabled: bool,
    pub suspended: bool,
    pub has_been_renamed: bool,
    properties: LayerPropertyGroup,
    effect: Box<dyn LayerEffect>,
}

impl LayerEffectInstance {
    /// Property path prefix for an effect, `LayerEffect.{id}.{type}.`.
    pub fn property_path(id: Uuid, key: &ProviderKey) -> String {
        format!("LayerEffect.{id}.{}.", key.type_name)
    }

    pub(crate) fn from_entity(descriptor: &EffectDescriptor, entity: &LayerEffectEntity) -> Result<Self> {
        let path = Self::property_path(entity.id, &entity.key);
        let properties = LayerPropertyGroup::from_schema(&path, &descriptor.schema, &entity.properties)?;
        Ok(Self {
            id: entity.id,
            key: entity.key.clone(),
            name: entity.name.clone(),
            order: entity.order,
            enabled: entity.enabled,
            suspended: entity.suspended,
            has_been_renamed: entity.has_been_renamed,
            properties,
            effect: (descriptor.factory)(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &ProviderKey {
        &self.key
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn properties(&self) -> &LayerPropertyGroup {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut LayerPropertyGroup {
        &mut self.properties
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.suspended
    }

    pub fn to_entity(&self) -> LayerEffectEntity {
        LayerEffectEntity {
            id: self.id,
            key: self.key.clone(),
            name: self.name.clone(),
            order: self.order,
            enabled: self.enabled,
            suspended: self.suspended,
            has_been_renamed: self.has_been_renamed,
            properties: self.properties.to_entities(),
        }
    }

    pub(crate) fn update(&mut self, ctx: &FrameContext<'_>, position: std::time::Duration) {
        self.properties.update(position, ctx.data);
        self.effect.update(ctx, &self.properties);
    }

    pub(crate) fn post_process(&mut self, target: &mut RenderTarget) -> Result<()> {
        self.effect.post_process(target, &self.properties)
    }

    pub(crate) fn clip(&self, shape: &ElementShape, excluded: &mut ClipRegion) {
        self.effect.clip(shape, &self.properties, excluded);
    }
}

impl fmt::Debug for LayerEffectInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerEffectInstance")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("name", &self.name)
            .field("order", &self.order)
            .finish()
    }
}

/// An entry in an element's effect list.
#[derive(Debug)]
pub enum EffectSlot {
    Live(LayerEffectInstance),
    /// Stand-in for an effect whose provider is not registered.
    Placeholder(LayerEffectEntity),
}

impl EffectSlot {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Live(effect) => effect.id,
            Self::Placeholder(entity) => entity.id,
        }
    }

    pub fn key(&self) -> &ProviderKey {
        match self {
            Self::Live(effect) => &effect.key,
            Self::Placeholder(entity) => &entity.key,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Live(effect) => &effect.name,
            Self::Placeholder(entity) => &entity.name,
        }
    }

    pub fn order(&self) -> u32 {
        match self {
            Self::Live(effect) => effect.order,
            Self::Placeholder(entity) => entity.order,
        }
    }

    pub(crate) fn set_order(&mut self, order: u32) {
        match self {
            Self::Live(effect) => effect.order = order,
            Self::Placeholder(entity) => entity.order = order,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    pub fn live(&self) -> Option<&LayerEffectInstance> {
        match self {
            Self::Live(effect) => Some(effect),
            Self::Placeholder(_) => None,
        }
    }

    pub fn live_mut(&mut self) -> Option<&mut LayerEffectInstance> {
        match self {
            Self::Live(effect) => Some(effect),
            Self::Placeholder(_) => None,
        }
    }

    /// Live, enabled and not suspended.
    pub fn active(&self) -> Option<&LayerEffectInstance> {
        self.live().filter(|effect| effect.is_active())
    }

    pub fn to_entity(&self) -> LayerEffectEntity {
        match self {
            Self::Live(effect) => effect.to_entity(),
            Self::Placeholder(entity) => entity.clone(),
        }
    }
}
