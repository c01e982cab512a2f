use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ProviderKey;
use crate::property::{GroupSchema, LayerPropertyGroup, PropertyEntity};
use crate::render::{FrameContext, RenderTarget};
use crate::Result;

/// Draws a layer's content into its render target.
pub trait LayerBrush: Send {
    fn update(&mut self, _ctx: &FrameContext<'_>, _properties: &LayerPropertyGroup) {}

    fn render(&mut self, target: &mut RenderTarget, properties: &LayerPropertyGroup) -> Result<()>;
}

pub type BrushFactory = dyn Fn() -> Box<dyn LayerBrush> + Send + Sync;

/// Registration record for a brush type.
#[derive(Clone)]
pub struct BrushDescriptor {
    pub key: ProviderKey,
    pub display_name: String,
    pub schema: GroupSchema,
    pub factory: Arc<BrushFactory>,
}

impl BrushDescriptor {
    pub fn new<F>(key: ProviderKey, display_name: impl Into<String>, schema: GroupSchema, factory: F) -> Self
    where
        F: Fn() -> Box<dyn LayerBrush> + Send + Sync + 'static,
    {
        Self {
            key,
            display_name: display_name.into(),
            schema,
            factory: Arc::new(factory),
        }
    }
}

impl fmt::Debug for BrushDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrushDescriptor")
            .field("key", &self.key)
            .field("display_name", &self.display_name)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrushEntity {
    pub key: ProviderKey,
    #[serde(default)]
    pub properties: Vec<PropertyEntity>,
}

impl BrushEntity {
    pub fn new(key: ProviderKey) -> Self {
        Self {
            key,
            properties: Vec::new(),
        }
    }
}

pub struct BrushInstance {
    key: ProviderKey,
    properties: LayerPropertyGroup,
    brush: Box<dyn LayerBrush>,
}

impl BrushInstance {
    pub fn property_path(key: &ProviderKey) -> String {
        format!("LayerBrush.{}.", key.type_name)
    }

    pub(crate) fn from_entity(descriptor: &BrushDescriptor, entity: &BrushEntity) -> Result<Self> {
        let path = Self::property_path(&entity.key);
        Ok(Self {
            key: entity.key.clone(),
            properties: LayerPropertyGroup::from_schema(&path, &descriptor.schema, &entity.properties)?,
            brush: (descriptor.factory)(),
        })
    }

    pub fn key(&self) -> &ProviderKey {
        &self.key
    }

    pub fn properties(&self) -> &LayerPropertyGroup {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut LayerPropertyGroup {
        &mut self.properties
    }

    pub fn to_entity(&self) -> BrushEntity {
        BrushEntity {
            key: self.key.clone(),
            properties: self.properties.to_entities(),
        }
    }

    pub(crate) fn update(&mut self, ctx: &FrameContext<'_>, position: Duration) {
        self.properties.update(position, ctx.data);
        self.brush.update(ctx, &self.properties);
    }

    pub(crate) fn render(&mut self, target: &mut RenderTarget) -> Result<()> {
        self.brush.render(target, &self.properties)
    }
}

impl fmt::Debug for BrushInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrushInstance").field("key", &self.key).finish()
    }
}

/// A layer's brush, or the stored state of one whose provider is missing.
#[derive(Debug)]
pub enum BrushSlot {
    Live(BrushInstance),
    Placeholder(BrushEntity),
}

impl BrushSlot {
    pub fn key(&self) -> &ProviderKey {
        match self {
            Self::Live(brush) => &brush.key,
            Self::Placeholder(entity) => &entity.key,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    pub fn live(&self) -> Option<&BrushInstance> {
        match self {
            Self::Live(brush) => Some(brush),
            Self::Placeholder(_) => None,
        }
    }

    pub fn live_mut(&mut self) -> Option<&mut BrushInstance> {
        match self {
            Self::Live(brush) => Some(brush),
            Self::Placeholder(_) => None,
        }
    }

    pub fn to_entity(&self) -> BrushEntity {
        match self {
            Self::Live(brush) => brush.to_entity(),
            Self::Placeholder(entity) => entity.clone(),
        }
    }
}
