use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::keyframe::{sample, Keyframe};
use super::{DataBinding, DataModel, PropertyKind, PropertyValue};
use crate::{LightweaveError, Result};

/// Declaration of a single property inside a group schema.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub default: PropertyValue,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub keyframes_supported: bool,
    pub data_binding_supported: bool,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, default: PropertyValue) -> Self {
        Self {
            name: name.into(),
            description: None,
            default,
            min: None,
            max: None,
            keyframes_supported: true,
            data_binding_supported: default.kind() != PropertyKind::Color,
        }
    }

    pub fn kind(&self) -> PropertyKind {
        self.default.kind()
    }

    pub fn range(&mut self, min: f64, max: f64) -> &mut Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn description(&mut self, text: impl Into<String>) -> &mut Self {
        self.description = Some(text.into());
        self
    }

    pub fn without_keyframes(&mut self) -> &mut Self {
        self.keyframes_supported = false;
        self
    }

    pub fn without_data_binding(&mut self) -> &mut Self {
        self.data_binding_supported = false;
        self
    }
}

/// Persisted state of one property, addressed by its full path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyEntity {
    pub path: String,
    pub value: PropertyValue,
    #[serde(default)]
    pub keyframes_enabled: bool,
    #[serde(default)]
    pub keyframes: Vec<Keyframe>,
    #[serde(default)]
    pub data_binding: Option<DataBinding>,
}

/// A keyframed, optionally data-bound value owned by a property group.
#[derive(Debug, Clone)]
pub struct LayerProperty {
    descriptor: PropertyDescriptor,
    path: String,
    base_value: PropertyValue,
    current_value: PropertyValue,
    keyframes_enabled: bool,
    keyframes: Vec<Keyframe>,
    data_binding: Option<DataBinding>,
    is_hidden: bool,
    loaded_from_storage: bool,
}

impl LayerProperty {
    pub(crate) fn new(descriptor: PropertyDescriptor, path: String) -> Self {
        let default = descriptor.default;
        Self {
            descriptor,
            path,
            base_value: default,
            current_value: default,
            keyframes_enabled: false,
            keyframes: Vec::new(),
            data_binding: None,
            is_hidden: false,
            loaded_from_storage: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn descriptor(&self) -> &PropertyDescriptor {
        &self.descriptor
    }

    /// The value set by the user, before keyframes and bindings.
    pub fn base_value(&self) -> PropertyValue {
        self.base_value
    }

    /// The value resolved for the last timeline position passed to `update`.
    pub fn current_value(&self) -> PropertyValue {
        self.current_value
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn keyframes_enabled(&self) -> bool {
        self.keyframes_enabled
    }

    pub fn data_binding(&self) -> Option<&DataBinding> {
        self.data_binding.as_ref()
    }

    pub fn is_hidden(&self) -> bool {
        self.is_hidden
    }

    pub fn is_loaded_from_storage(&self) -> bool {
        self.loaded_from_storage
    }

    pub(crate) fn apply_default(&mut self) {
        self.base_value = self.descriptor.default;
        self.current_value = self.descriptor.default;
    }

    fn check_kind(&self, value: &PropertyValue) -> Result<()> {
        if value.kind() == self.descriptor.kind() {
            return Ok(());
        }
        Err(LightweaveError::PropertyTypeMismatch {
            path: self.path.clone(),
            expected: self.descriptor.kind(),
            found: value.kind(),
        })
    }

    pub(crate) fn load(&mut self, entity: &PropertyEntity) -> Result<()> {
        self.check_kind(&entity.value)?;
        for keyframe in &entity.keyframes {
            self.check_kind(&keyframe.value)?;
        }
        let (min, max) = (self.descriptor.min, self.descriptor.max);
        let value = entity.value.clamped(min, max);
        self.base_value = value;
        self.current_value = value;
        self.keyframes_enabled = entity.keyframes_enabled && self.descriptor.keyframes_supported;
        self.keyframes = entity.keyframes.clone();
        for keyframe in &mut self.keyframes {
            keyframe.value = keyframe.value.clamped(min, max);
        }
        self.keyframes.sort_by_key(|k| k.position);
        self.data_binding = entity
            .data_binding
            .clone()
            .filter(|_| self.descriptor.data_binding_supported);
        self.loaded_from_storage = true;
        Ok(())
    }

    pub fn to_entity(&self) -> PropertyEntity {
        PropertyEntity {
            path: self.path.clone(),
            value: self.base_value,
            keyframes_enabled: self.keyframes_enabled,
            keyframes: self.keyframes.clone(),
            data_binding: self.data_binding.clone(),
        }
    }

    /// Returns whether the stored value changed.
    pub(crate) fn set_base_value(&mut self, value: PropertyValue) -> Result<bool> {
        self.check_kind(&value)?;
        let value = value.clamped(self.descriptor.min, self.descriptor.max);
        if value == self.base_value {
            return Ok(false);
        }
        self.base_value = value;
        if !self.keyframes_enabled && self.data_binding.is_none() {
            self.current_value = value;
        }
        Ok(true)
    }

    /// Inserts a keyframe, replacing one at the same position.
    pub(crate) fn add_keyframe(&mut self, keyframe: Keyframe) -> Result<()> {
        self.check_kind(&keyframe.value)?;
        if !self.descriptor.keyframes_supported {
            return Err(LightweaveError::msg(format!(
                "property `{}` does not support keyframes",
                self.path
            )));
        }
        match self
            .keyframes
            .binary_search_by_key(&keyframe.position, |k| k.position)
        {
            Ok(index) => self.keyframes[index] = keyframe,
            Err(index) => self.keyframes.insert(index, keyframe),
        }
        Ok(())
    }

    pub(crate) fn remove_keyframe(&mut self, position: Duration) -> bool {
        let before = self.keyframes.len();
        self.keyframes.retain(|k| k.position != position);
        before != self.keyframes.len()
    }

    pub(crate) fn set_keyframes_enabled(&mut self, enabled: bool) -> bool {
        let enabled = enabled && self.descriptor.keyframes_supported;
        std::mem::replace(&mut self.keyframes_enabled, enabled) != enabled
    }

    pub(crate) fn set_data_binding(&mut self, binding: Option<DataBinding>) -> Result<()> {
        if binding.is_some() && !self.descriptor.data_binding_supported {
            return Err(LightweaveError::msg(format!(
                "property `{}` does not support data bindings",
                self.path
            )));
        }
        self.data_binding = binding;
        Ok(())
    }

    pub(crate) fn set_hidden(&mut self, hidden: bool) -> bool {
        std::mem::replace(&mut self.is_hidden, hidden) != hidden
    }

    /// Resolves the current value: a resolvable binding wins over keyframes,
    /// keyframes win over the base value.
    pub(crate) fn update(&mut self, position: Duration, data: &DataModel) {
        if let Some(bound) = self
            .data_binding
            .as_ref()
            .and_then(|binding| binding.resolve(data))
            .and_then(|number| self.base_value.with_number(number))
        {
            self.current_value = bound.clamped(self.descriptor.min, self.descriptor.max);
            return;
        }

        self.current_value = if self.keyframes_enabled {
            sample(&self.keyframes, position).unwrap_or(self.base_value)
        } else {
            self.base_value
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;

    fn opacity() -> LayerProperty {
        let mut descriptor = PropertyDescriptor::new("Opacity", PropertyValue::Float(100.0));
        descriptor.range(0.0, 100.0);
        LayerProperty::new(descriptor, "General.Opacity".into())
    }

    #[test]
    fn base_value_is_clamped_to_range() {
        let mut property = opacity();
        assert!(property.set_base_value(PropertyValue::Float(250.0)).unwrap());
        assert_eq!(property.base_value(), PropertyValue::Float(100.0));
        assert!(!property.set_base_value(PropertyValue::Float(100.0)).unwrap());
    }

    #[test]
    fn stored_values_are_clamped_on_load() {
        let mut property = opacity();
        let mut entity = property.to_entity();
        entity.value = PropertyValue::Float(-40.0);
        entity.keyframes = vec![Keyframe::new(Duration::ZERO, PropertyValue::Float(900.0))];
        property.load(&entity).unwrap();

        assert_eq!(property.base_value(), PropertyValue::Float(0.0));
        assert_eq!(property.current_value(), PropertyValue::Float(0.0));
        assert_eq!(property.to_entity().keyframes[0].value, PropertyValue::Float(100.0));
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let mut property = opacity();
        let err = property
            .set_base_value(PropertyValue::Color(Color::WHITE))
            .unwrap_err();
        assert!(matches!(err, LightweaveError::PropertyTypeMismatch { .. }));
    }

    #[test]
    fn binding_overrides_keyframes() {
        let mut property = opacity();
        property.set_keyframes_enabled(true);
        property
            .add_keyframe(Keyframe::new(Duration::ZERO, PropertyValue::Float(10.0)))
            .unwrap();
        property
            .set_data_binding(Some(DataBinding::new("level")))
            .unwrap();

        let mut data = DataModel::new();
        property.update(Duration::ZERO, &data);
        assert_eq!(property.current_value(), PropertyValue::Float(10.0));

        data.set_value("level", 42.0);
        property.update(Duration::ZERO, &data);
        assert_eq!(property.current_value(), PropertyValue::Float(42.0));
    }

    #[test]
    fn keyframes_at_same_position_are_replaced() {
        let mut property = opacity();
        let at = Duration::from_millis(5);
        property
            .add_keyframe(Keyframe::new(at, PropertyValue::Float(1.0)))
            .unwrap();
        property
            .add_keyframe(Keyframe::new(at, PropertyValue::Float(2.0)))
            .unwrap();
        assert_eq!(property.keyframes().len(), 1);
        assert_eq!(property.keyframes()[0].value, PropertyValue::Float(2.0));
        assert!(property.remove_keyframe(at));
    }
}
