use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::condition::DisplayCondition;
use crate::adaption::AdaptionHint;
use crate::device::LedKey;
use crate::effects::{BrushEntity, LayerEffectEntity};
use crate::property::PropertyEntity;
use crate::timeline::TimelineEntity;

/// Stored form of a profile: a flat list of folders and layers linked by parent id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntity {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub folders: Vec<FolderEntity>,
    #[serde(default)]
    pub layers: Vec<LayerEntity>,
}

impl ProfileEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            folders: Vec::new(),
            layers: Vec::new(),
        }
    }

    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Fields shared by folders and layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementEntity {
    pub id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub order: u32,
    pub name: String,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub timeline: TimelineEntity,
    #[serde(default)]
    pub display_condition: DisplayCondition,
    #[serde(default)]
    pub properties: Vec<PropertyEntity>,
    #[serde(default)]
    pub effects: Vec<LayerEffectEntity>,
}

impl ElementEntity {
    pub fn new(name: impl Into<String>, parent_id: Option<Uuid>, order: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id,
            order,
            name: name.into(),
            suspended: false,
            timeline: TimelineEntity::default(),
            display_condition: DisplayCondition::default(),
            properties: Vec::new(),
            effects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderEntity {
    #[serde(flatten)]
    pub element: ElementEntity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerEntity {
    #[serde(flatten)]
    pub element: ElementEntity,
    #[serde(default)]
    pub leds: Vec<LedKey>,
    #[serde(default)]
    pub adaption_hints: Vec<AdaptionHint>,
    #[serde(default)]
    pub brush: Option<BrushEntity>,
}
