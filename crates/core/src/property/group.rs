use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use super::{
    DataBinding, DataModel, Keyframe, LayerProperty, PropertyDescriptor, PropertyEntity,
    PropertyEvent, PropertyValue,
};
use crate::{Color, LightweaveError, Result};

/// Declared shape of a property group: its properties and nested groups.
///
/// Schemas replace attribute scanning. Every brush, effect and element type
/// declares its properties once through [`GroupSchema::build`] and the group
/// wires defaults and storage from that declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupSchema {
    pub name: String,
    pub description: Option<String>,
    pub properties: Vec<PropertyDescriptor>,
    pub groups: Vec<GroupSchema>,
}

impl GroupSchema {
    pub fn build(name: impl Into<String>, declare: impl FnOnce(&mut GroupBuilder)) -> Self {
        let mut builder = GroupBuilder {
            schema: GroupSchema {
                name: name.into(),
                ..GroupSchema::default()
            },
        };
        declare(&mut builder);
        builder.schema
    }
}

pub struct GroupBuilder {
    schema: GroupSchema,
}

impl GroupBuilder {
    pub fn description(&mut self, text: impl Into<String>) -> &mut Self {
        self.schema.description = Some(text.into());
        self
    }

    pub fn property(&mut self, descriptor: PropertyDescriptor) -> &mut PropertyDescriptor {
        self.schema.properties.push(descriptor);
        let last = self.schema.properties.len() - 1;
        &mut self.schema.properties[last]
    }

    pub fn float(&mut self, name: &str, default: f64) -> &mut PropertyDescriptor {
        self.property(PropertyDescriptor::new(name, PropertyValue::Float(default)))
    }

    pub fn int(&mut self, name: &str, default: i64) -> &mut PropertyDescriptor {
        self.property(PropertyDescriptor::new(name, PropertyValue::Int(default)))
    }

    pub fn bool(&mut self, name: &str, default: bool) -> &mut PropertyDescriptor {
        self.property(PropertyDescriptor::new(name, PropertyValue::Bool(default)))
    }

    pub fn color(&mut self, name: &str, default: Color) -> &mut PropertyDescriptor {
        self.property(PropertyDescriptor::new(name, PropertyValue::Color(default)))
    }

    pub fn choice(&mut self, name: &str, default: u32) -> &mut PropertyDescriptor {
        self.property(PropertyDescriptor::new(name, PropertyValue::Choice(default)))
    }

    pub fn group(&mut self, name: &str, declare: impl FnOnce(&mut GroupBuilder)) -> &mut Self {
        self.schema.groups.push(GroupSchema::build(name, declare));
        self
    }
}

/// Runtime tree of layer properties belonging to an element, brush or effect.
///
/// Lifecycle: [`initialize`](Self::initialize) creates the properties from a
/// schema, populates defaults, overlays stored values and enables the group.
/// Until then the group reads as empty and saving it is a no-op.
#[derive(Debug, Default)]
pub struct LayerPropertyGroup {
    name: String,
    path: String,
    properties: Vec<LayerProperty>,
    groups: Vec<LayerPropertyGroup>,
    initialized: bool,
    enabled: bool,
    listeners: Vec<Sender<PropertyEvent>>,
}

impl LayerPropertyGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and initializes a group in one step.
    pub fn from_schema(path: &str, schema: &GroupSchema, stored: &[PropertyEntity]) -> Result<Self> {
        let mut group = Self::new();
        group.initialize(path, schema, stored)?;
        Ok(group)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path prefix shared by every property in this group, such as `General.`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Builds the group's properties from `schema`.
    ///
    /// Defaults are populated before stored values are applied so a stored
    /// value always wins. A stored value whose type contradicts the schema is
    /// a configuration error. Calling this twice is an error.
    pub fn initialize(
        &mut self,
        path: &str,
        schema: &GroupSchema,
        stored: &[PropertyEntity],
    ) -> Result<()> {
        if self.initialized {
            return Err(LightweaveError::AlreadyInitialized(self.path.clone()));
        }

        self.name = schema.name.clone();
        self.path = path.to_string();
        self.properties = schema
            .properties
            .iter()
            .map(|descriptor| {
                LayerProperty::new(descriptor.clone(), format!("{path}{}", descriptor.name))
            })
            .collect();

        self.populate_defaults();

        for property in &mut self.properties {
            if let Some(entity) = stored.iter().find(|e| e.path == property.path()) {
                property.load(entity)?;
            }
        }

        let mut groups = Vec::with_capacity(schema.groups.len());
        for child in &schema.groups {
            let mut group = LayerPropertyGroup::new();
            group.initialize(&format!("{path}{}.", child.name), child, stored)?;
            groups.push(group);
        }
        self.groups = groups;

        self.enable_properties();
        self.initialized = true;
        Ok(())
    }

    /// Resets every property in this group to its declared default.
    pub fn populate_defaults(&mut self) {
        for property in &mut self.properties {
            property.apply_default();
        }
    }

    fn enable_properties(&mut self) {
        self.enabled = true;
    }

    /// Disables the group ahead of teardown. Values are kept for a final save.
    pub fn disable_properties(&mut self) {
        self.enabled = false;
        for group in &mut self.groups {
            group.disable_properties();
        }
    }

    pub fn properties(&self) -> &[LayerProperty] {
        &self.properties
    }

    pub fn groups(&self) -> &[LayerPropertyGroup] {
        &self.groups
    }

    /// Every property in this group and its descendants, depth first.
    pub fn all_properties(&self) -> Vec<&LayerProperty> {
        let mut out = Vec::new();
        self.collect_properties(&mut out);
        out
    }

    fn collect_properties<'a>(&'a self, out: &mut Vec<&'a LayerProperty>) {
        out.extend(self.properties.iter());
        for group in &self.groups {
            group.collect_properties(out);
        }
    }

    /// Looks up a property by its path relative to this group, e.g. `Opacity`
    /// or `Transform.Scale`.
    pub fn property(&self, relative: &str) -> Option<&LayerProperty> {
        if !self.initialized {
            return None;
        }
        if let Some(property) = self.properties.iter().find(|p| p.name() == relative) {
            return Some(property);
        }
        let (head, rest) = relative.split_once('.')?;
        self.groups
            .iter()
            .find(|g| g.name == head)
            .and_then(|g| g.property(rest))
    }

    pub fn value(&self, relative: &str) -> Option<PropertyValue> {
        self.property(relative).map(LayerProperty::current_value)
    }

    pub fn float(&self, relative: &str) -> Option<f64> {
        self.value(relative).and_then(|v| v.as_float())
    }

    pub fn color(&self, relative: &str) -> Option<Color> {
        self.value(relative).and_then(|v| v.as_color())
    }

    pub fn choice(&self, relative: &str) -> Option<u32> {
        self.value(relative).and_then(|v| v.as_choice())
    }

    pub fn bool(&self, relative: &str) -> Option<bool> {
        self.value(relative).and_then(|v| v.as_bool())
    }

    /// Resolves every property for the given timeline position.
    pub fn update(&mut self, position: Duration, data: &DataModel) {
        if !self.initialized || !self.enabled {
            return;
        }
        for property in &mut self.properties {
            property.update(position, data);
        }
        for group in &mut self.groups {
            group.update(position, data);
        }
    }

    /// Writes current values into `entities`, replacing entries with the same path.
    /// Does nothing for a group that was never initialized.
    pub fn apply_to_entity(&self, entities: &mut Vec<PropertyEntity>) {
        if !self.initialized {
            return;
        }
        for property in &self.properties {
            let entity = property.to_entity();
            match entities.iter_mut().find(|e| e.path == entity.path) {
                Some(existing) => *existing = entity,
                None => entities.push(entity),
            }
        }
        for group in &self.groups {
            group.apply_to_entity(entities);
        }
    }

    pub fn to_entities(&self) -> Vec<PropertyEntity> {
        let mut entities = Vec::new();
        self.apply_to_entity(&mut entities);
        entities
    }

    /// Re-applies stored values to an initialized group.
    pub fn load(&mut self, stored: &[PropertyEntity]) -> Result<()> {
        for property in &mut self.properties {
            if let Some(entity) = stored.iter().find(|e| e.path == property.path()) {
                property.load(entity)?;
            }
        }
        for group in &mut self.groups {
            group.load(stored)?;
        }
        Ok(())
    }

    // -- Observation --

    /// Receives value and visibility changes of this group and everything below it.
    pub fn subscribe(&mut self) -> Receiver<PropertyEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.listeners.push(tx);
        rx
    }

    fn notify(&mut self, event: &PropertyEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Runs `op` on the property at `relative` and hands the resulting event
    /// to each group on the way back up.
    fn mutate<F>(&mut self, relative: &str, op: &mut F) -> Result<Option<PropertyEvent>>
    where
        F: FnMut(&mut LayerProperty) -> Result<Option<PropertyEvent>>,
    {
        if !self.initialized {
            return Err(LightweaveError::UnknownProperty(format!("{}{relative}", self.path)));
        }

        let event = if let Some(property) = self.properties.iter_mut().find(|p| p.name() == relative)
        {
            op(property)?
        } else {
            let group = relative.split_once('.').and_then(|(head, rest)| {
                self.groups
                    .iter_mut()
                    .find(|g| g.name == head)
                    .map(|g| (g, rest))
            });
            match group {
                Some((group, rest)) => group.mutate(rest, op)?,
                None => {
                    return Err(LightweaveError::UnknownProperty(format!(
                        "{}{relative}",
                        self.path
                    )))
                }
            }
        };

        if let Some(event) = &event {
            self.notify(event);
        }
        Ok(event)
    }

    pub fn set_base_value(&mut self, relative: &str, value: PropertyValue) -> Result<()> {
        self.mutate(relative, &mut |property: &mut LayerProperty| {
            let changed = property.set_base_value(value)?;
            Ok(changed.then(|| PropertyEvent::BaseValueChanged {
                path: property.path().to_string(),
            }))
        })
        .map(drop)
    }

    pub fn set_hidden(&mut self, relative: &str, hidden: bool) -> Result<()> {
        self.mutate(relative, &mut |property: &mut LayerProperty| {
            Ok(property
                .set_hidden(hidden)
                .then(|| PropertyEvent::VisibilityChanged {
                    path: property.path().to_string(),
                    hidden,
                }))
        })
        .map(drop)
    }

    pub fn add_keyframe(&mut self, relative: &str, keyframe: Keyframe) -> Result<()> {
        self.mutate(relative, &mut |property: &mut LayerProperty| {
            property.add_keyframe(keyframe)?;
            Ok(Some(PropertyEvent::KeyframesChanged {
                path: property.path().to_string(),
            }))
        })
        .map(drop)
    }

    pub fn remove_keyframe(&mut self, relative: &str, position: Duration) -> Result<bool> {
        let mut removed = false;
        self.mutate(relative, &mut |property: &mut LayerProperty| {
            removed = property.remove_keyframe(position);
            Ok(removed.then(|| PropertyEvent::KeyframesChanged {
                path: property.path().to_string(),
            }))
        })?;
        Ok(removed)
    }

    pub fn set_keyframes_enabled(&mut self, relative: &str, enabled: bool) -> Result<()> {
        self.mutate(relative, &mut |property: &mut LayerProperty| {
            Ok(property
                .set_keyframes_enabled(enabled)
                .then(|| PropertyEvent::KeyframesChanged {
                    path: property.path().to_string(),
                }))
        })
        .map(drop)
    }

    pub fn set_data_binding(&mut self, relative: &str, binding: Option<DataBinding>) -> Result<()> {
        self.mutate(relative, &mut |property: &mut LayerProperty| {
            property.set_data_binding(binding.clone())?;
            Ok(Some(PropertyEvent::DataBindingChanged {
                path: property.path().to_string(),
            }))
        })
        .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyKind;

    fn schema() -> GroupSchema {
        GroupSchema::build("General", |b| {
            b.float("Opacity", 100.0).range(0.0, 100.0);
            b.color("Tint", Color::WHITE);
            b.group("Transform", |t| {
                t.float("Scale", 1.0);
            });
        })
    }

    #[test]
    fn defaults_apply_when_nothing_is_stored() {
        let group = LayerPropertyGroup::from_schema("General.", &schema(), &[]).unwrap();
        assert_eq!(group.float("Opacity"), Some(100.0));
        assert_eq!(group.float("Transform.Scale"), Some(1.0));
        assert_eq!(
            group.property("Transform.Scale").unwrap().path(),
            "General.Transform.Scale"
        );
        assert!(!group.property("Opacity").unwrap().is_loaded_from_storage());
    }

    #[test]
    fn stored_values_win_over_defaults() {
        let stored = vec![PropertyEntity {
            path: "General.Transform.Scale".into(),
            value: PropertyValue::Float(2.5),
            keyframes_enabled: false,
            keyframes: Vec::new(),
            data_binding: None,
        }];
        let group = LayerPropertyGroup::from_schema("General.", &schema(), &stored).unwrap();
        assert_eq!(group.float("Transform.Scale"), Some(2.5));
        assert!(group
            .property("Transform.Scale")
            .unwrap()
            .is_loaded_from_storage());
    }

    #[test]
    fn second_initialize_fails() {
        let mut group = LayerPropertyGroup::new();
        group.initialize("General.", &schema(), &[]).unwrap();
        let err = group.initialize("General.", &schema(), &[]).unwrap_err();
        assert!(matches!(err, LightweaveError::AlreadyInitialized(_)));
    }

    #[test]
    fn stored_type_mismatch_is_fatal() {
        let stored = vec![PropertyEntity {
            path: "General.Opacity".into(),
            value: PropertyValue::Bool(true),
            keyframes_enabled: false,
            keyframes: Vec::new(),
            data_binding: None,
        }];
        let err = LayerPropertyGroup::from_schema("General.", &schema(), &stored).unwrap_err();
        match err {
            LightweaveError::PropertyTypeMismatch {
                expected, found, ..
            } => {
                assert_eq!(expected, PropertyKind::Float);
                assert_eq!(found, PropertyKind::Bool);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn uninitialized_group_saves_nothing() {
        let group = LayerPropertyGroup::new();
        let mut entities = Vec::new();
        group.apply_to_entity(&mut entities);
        assert!(entities.is_empty());
        assert!(group.value("Opacity").is_none());
    }

    #[test]
    fn save_and_load_round_trip() {
        let mut group = LayerPropertyGroup::from_schema("General.", &schema(), &[]).unwrap();
        group
            .set_base_value("Transform.Scale", PropertyValue::Float(3.0))
            .unwrap();
        group.set_keyframes_enabled("Opacity", true).unwrap();
        group
            .add_keyframe(
                "Opacity",
                Keyframe::new(Duration::from_millis(10), PropertyValue::Float(20.0)),
            )
            .unwrap();

        let saved = group.to_entities();
        let restored = LayerPropertyGroup::from_schema("General.", &schema(), &saved).unwrap();
        assert_eq!(restored.to_entities(), saved);
    }

    #[test]
    fn changes_bubble_through_parent_groups() {
        let mut group = LayerPropertyGroup::from_schema("General.", &schema(), &[]).unwrap();
        let events = group.subscribe();

        group
            .set_base_value("Transform.Scale", PropertyValue::Float(2.0))
            .unwrap();
        group.set_hidden("Tint", true).unwrap();
        // Unchanged values do not notify.
        group
            .set_base_value("Transform.Scale", PropertyValue::Float(2.0))
            .unwrap();

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                PropertyEvent::BaseValueChanged {
                    path: "General.Transform.Scale".into()
                },
                PropertyEvent::VisibilityChanged {
                    path: "General.Tint".into(),
                    hidden: true
                },
            ]
        );
    }

    #[test]
    fn unknown_paths_are_reported() {
        let mut group = LayerPropertyGroup::from_schema("General.", &schema(), &[]).unwrap();
        let err = group
            .set_base_value("Transform.Rotation", PropertyValue::Float(1.0))
            .unwrap_err();
        assert!(matches!(err, LightweaveError::UnknownProperty(path) if path == "General.Transform.Rotation"));
    }

    #[test]
    fn update_resolves_keyframes_at_position() {
        let mut group = LayerPropertyGroup::from_schema("General.", &schema(), &[]).unwrap();
        group.set_keyframes_enabled("Opacity", true).unwrap();
        group
            .add_keyframe("Opacity", Keyframe::new(Duration::ZERO, PropertyValue::Float(0.0)))
            .unwrap();
        group
            .add_keyframe(
                "Opacity",
                Keyframe::new(Duration::from_millis(500), PropertyValue::Float(100.0)),
            )
            .unwrap();

        group.update(Duration::from_millis(250), &DataModel::new());
        assert_eq!(group.float("Opacity"), Some(50.0));
    }
}
