//! Profiles: the folder/layer tree, its per-element render state and storage.

mod condition;
mod element;
mod entity;
mod render_state;
mod tree;

use std::fmt;

use uuid::Uuid;

use crate::device::Device;
use crate::effects::{EffectSlot, ProviderRegistry};
use crate::render::{Canvas, FrameContext, Renderer};
use crate::timeline::Timeline;
use crate::{LightweaveError, Result};

pub use condition::{
    Comparison, ConditionOutcome, DisplayCondition, EventCondition, Predicate, StaticCondition,
};
pub use element::{Folder, Layer};
pub use entity::{ElementEntity, FolderEntity, LayerEntity, ProfileEntity};
pub use render_state::RenderState;
pub use tree::{ElementKey, ElementKind, ElementNode, ElementTree, TreeEvent};

pub const ROOT_FOLDER_NAME: &str = "Root folder";

/// Opacity change per second while fading in or out.
const FADE_PER_SECOND: f64 = 1.0;

/// An error raised by one element during a frame. The element is skipped for
/// that frame; the rest of the profile is unaffected.
#[derive(Debug)]
pub struct ElementError {
    pub element: Uuid,
    pub error: LightweaveError,
}

impl fmt::Display for ElementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element {}: {}", self.element, self.error)
    }
}

/// A lighting configuration: one root folder and everything below it.
///
/// [`update`](Self::update) and [`render`](Self::render) require the profile
/// to be activated. Both take `&mut self`, so whoever shares a profile across
/// threads holds one lock around activation and frames alike.
#[derive(Debug)]
pub struct Profile {
    id: Uuid,
    name: String,
    tree: ElementTree,
    root: ElementKey,
    activated: bool,
    opacity: f64,
    fading_out: bool,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let mut tree = ElementTree::new();
        let root = tree.create_folder(ROOT_FOLDER_NAME)?;
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tree,
            root,
            activated: false,
            opacity: 0.0,
            fading_out: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tree(&self) -> &ElementTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ElementTree {
        &mut self.tree
    }

    pub fn root_folder(&self) -> ElementKey {
        self.root
    }

    /// Every layer in the profile, depth first.
    pub fn get_all_layers(&self) -> Vec<ElementKey> {
        self.tree.all_layers(self.root)
    }

    /// Every folder including the root folder.
    pub fn get_all_folders(&self) -> Vec<ElementKey> {
        let mut folders = vec![self.root];
        folders.extend(self.tree.all_folders(self.root));
        folders
    }

    /// Every folder and layer including the root folder.
    pub fn get_all_render_elements(&self) -> Vec<ElementKey> {
        let mut elements = vec![self.root];
        elements.extend(self.tree.all_render_elements(self.root));
        elements
    }

    /// Creates a folder with a fresh name as the last child of `parent`.
    pub fn add_folder(&mut self, parent: ElementKey) -> Result<ElementKey> {
        let name = self.tree.new_folder_name(parent);
        let folder = self.tree.create_folder(name)?;
        self.attach_new(parent, folder)
    }

    /// Creates a layer with a fresh name as the last child of `parent`.
    pub fn add_layer(&mut self, parent: ElementKey) -> Result<ElementKey> {
        let name = self.tree.new_layer_name(parent);
        let layer = self.tree.create_layer(name)?;
        self.attach_new(parent, layer)
    }

    fn attach_new(&mut self, parent: ElementKey, key: ElementKey) -> Result<ElementKey> {
        if let Err(err) = self.tree.add_child(parent, key, None) {
            self.tree.remove_element(key)?;
            return Err(err);
        }
        Ok(key)
    }

    // -- Lifecycle --

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Resolves LEDs against `devices` and starts fading in.
    pub fn activate(&mut self, devices: &[Device]) {
        self.populate_leds(devices);
        self.activated = true;
        self.opacity = 0.0;
        self.fading_out = false;
        tracing::info!(profile = %self.name, "profile activated");
    }

    pub fn deactivate(&mut self) {
        self.activated = false;
        for key in self.get_all_render_elements() {
            if let Some(node) = self.tree.node_mut(key) {
                node.render_state_mut().release();
            }
        }
        tracing::info!(profile = %self.name, "profile deactivated");
    }

    pub fn populate_leds(&mut self, devices: &[Device]) {
        for key in self.get_all_layers() {
            if let Some(layer) = self.tree.node_mut(key).and_then(ElementNode::as_layer_mut) {
                layer.populate_leds(devices);
            }
        }
    }

    /// Profile-wide opacity in 0..=1, ramped by activation and fade out.
    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn fade_out(&mut self) {
        self.fading_out = true;
    }

    pub fn is_faded_out(&self) -> bool {
        self.fading_out && self.opacity <= 0.0
    }

    // -- Frame --

    pub fn update(&mut self, ctx: &FrameContext<'_>) -> Result<Vec<ElementError>> {
        if !self.activated {
            return Err(LightweaveError::ProfileNotActivated(self.name.clone()));
        }

        let step = ctx.delta.as_secs_f64() * FADE_PER_SECOND;
        self.opacity = if self.fading_out {
            (self.opacity - step).max(0.0)
        } else {
            (self.opacity + step).min(1.0)
        };

        let mut errors = Vec::new();
        update_element(&mut self.tree, self.root, ctx, false, &mut errors);
        Ok(errors)
    }

    pub fn render(&mut self, renderer: &mut Renderer, canvas: &mut dyn Canvas) -> Result<Vec<ElementError>> {
        if !self.activated {
            return Err(LightweaveError::ProfileNotActivated(self.name.clone()));
        }
        Ok(renderer.render_tree(&mut self.tree, self.root, self.opacity, canvas))
    }

    /// Swaps effects and brushes between live and placeholder form to match
    /// `registry`. Returns the number of swaps.
    pub fn refresh_providers(&mut self, registry: &ProviderRegistry) -> usize {
        self.tree.refresh_providers(registry)
    }

    // -- Storage --

    /// Builds a profile from its stored form.
    ///
    /// The first parentless folder becomes the root; without one a
    /// `"Root folder"` is created. Elements whose parent cannot be found are
    /// dropped. Effects and brushes whose provider is missing load as placeholders.
    pub fn from_entity(entity: &ProfileEntity, registry: &ProviderRegistry) -> Result<Self> {
        let mut tree = ElementTree::new();
        let mut pending = Vec::with_capacity(entity.folders.len() + entity.layers.len());
        let mut root = None;

        for stored in &entity.folders {
            let element = &stored.element;
            let mut folder = Folder::load(
                Timeline::from_entity(&element.timeline),
                element.display_condition.clone(),
                &element.properties,
            )?;
            folder.render.load_effects(resolve_effects(element, registry)?);
            let key = tree.insert(element.id, element.name.clone(), ElementKind::Folder(folder));
            tree.get_mut(key)?.suspended = element.suspended;

            if element.parent_id.is_none() && root.is_none() {
                root = Some(key);
            } else {
                pending.push((key, element.parent_id, element.order));
            }
        }

        for stored in &entity.layers {
            let element = &stored.element;
            let mut layer = Layer::load(
                Timeline::from_entity(&element.timeline),
                element.display_condition.clone(),
                &element.properties,
            )?;
            layer.render.load_effects(resolve_effects(element, registry)?);
            layer.set_stored_leds(stored.leds.clone(), stored.adaption_hints.clone());
            if let Some(brush) = &stored.brush {
                layer.set_brush(Some(registry.resolve_brush(brush.clone())?));
            }
            let key = tree.insert(element.id, element.name.clone(), ElementKind::Layer(Box::new(layer)));
            tree.get_mut(key)?.suspended = element.suspended;
            pending.push((key, element.parent_id, element.order));
        }

        let root = match root {
            Some(root) => root,
            None => tree.create_folder(ROOT_FOLDER_NAME)?,
        };

        pending.sort_by_key(|&(_, _, order)| order);
        for (key, parent_id, _) in pending {
            if !tree.contains(key) {
                continue;
            }
            let parent = match parent_id {
                Some(id) => tree.find(id),
                None => Some(root),
            };
            match parent {
                Some(parent) => tree.add_child(parent, key, None)?,
                None => {
                    tracing::warn!(
                        profile = %entity.name,
                        element = %tree.get(key)?.id(),
                        "dropping element with missing parent"
                    );
                    tree.remove_element(key)?;
                }
            }
        }

        // Anything still detached hangs off a dropped element.
        let reachable: std::collections::HashSet<ElementKey> =
            tree.descendants(root).into_iter().chain([root]).collect();
        let detached: Vec<ElementKey> = entity
            .folders
            .iter()
            .map(|f| f.element.id)
            .chain(entity.layers.iter().map(|l| l.element.id))
            .filter_map(|id| tree.find(id))
            .filter(|key| !reachable.contains(key))
            .collect();
        for key in detached {
            if tree.contains(key) {
                tree.remove_element(key)?;
            }
        }

        Ok(Self {
            id: entity.id,
            name: entity.name.clone(),
            tree,
            root,
            activated: false,
            opacity: 0.0,
            fading_out: false,
        })
    }

    pub fn to_entity(&self) -> ProfileEntity {
        let mut entity = ProfileEntity {
            id: self.id,
            name: self.name.clone(),
            folders: Vec::new(),
            layers: Vec::new(),
        };

        for key in self.get_all_render_elements() {
            let Some(node) = self.tree.node(key) else {
                continue;
            };
            let state = node.render_state();
            let element = ElementEntity {
                id: node.id(),
                parent_id: node
                    .parent()
                    .and_then(|parent| self.tree.node(parent))
                    .map(ElementNode::id),
                order: node.order(),
                name: node.name.clone(),
                suspended: node.suspended,
                timeline: state.timeline().to_entity(),
                display_condition: state.condition().clone(),
                properties: state.general().to_entities(),
                effects: state.effect_entities(),
            };
            match node.kind() {
                ElementKind::Folder(_) => entity.folders.push(FolderEntity { element }),
                ElementKind::Layer(layer) => entity.layers.push(LayerEntity {
                    element,
                    leds: layer.stored_leds().to_vec(),
                    adaption_hints: layer.adapter().hints.clone(),
                    brush: layer.brush().map(|brush| brush.to_entity()),
                }),
            }
        }
        entity
    }
}

fn resolve_effects(element: &ElementEntity, registry: &ProviderRegistry) -> Result<Vec<EffectSlot>> {
    element
        .effects
        .iter()
        .cloned()
        .map(|effect| registry.resolve_effect(effect))
        .collect()
}

fn update_element(
    tree: &mut ElementTree,
    key: ElementKey,
    ctx: &FrameContext<'_>,
    parent_suspended: bool,
    errors: &mut Vec<ElementError>,
) {
    let Some(node) = tree.node_mut(key) else {
        return;
    };
    let suspended = parent_suspended || node.suspended;
    let id = node.id();
    let result = match node.kind_mut() {
        ElementKind::Folder(folder) => folder.render.update(ctx, suspended),
        ElementKind::Layer(layer) => layer.update(ctx, suspended),
    };
    if let Err(error) = result {
        errors.push(ElementError { element: id, error });
    }
    let children = node.children().to_vec();
    for child in children {
        update_element(tree, child, ctx, suspended, errors);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::device::{demo_led_strip, demo_mouse, LedKey};
    use crate::effects::{register_builtins, BrushEntity, ProviderKey, BUILTIN_PROVIDER};
    use crate::property::{DataModel, PropertyValue};
    use crate::render::{GraphicsContext, Surface};
    use crate::Color;

    fn sample(registry: &ProviderRegistry) -> Profile {
        let mut profile = Profile::new("sample").unwrap();
        let root = profile.root_folder();
        let folder = profile.add_folder(root).unwrap();
        let layer = profile.add_layer(folder).unwrap();

        let tree = profile.tree_mut();
        for effect in ["Dim", "Invert", "Mask"] {
            let effect = registry
                .instantiate_effect(&ProviderKey::new(BUILTIN_PROVIDER, effect))
                .unwrap();
            tree.add_layer_effect(layer, EffectSlot::Live(effect)).unwrap();
        }
        let brush = registry
            .resolve_brush(BrushEntity::new(ProviderKey::new(BUILTIN_PROVIDER, "Solid")))
            .unwrap();
        let node = tree.get_mut(layer).unwrap();
        let layer = node.as_layer_mut().unwrap();
        layer.set_brush(Some(brush));
        layer.add_leds(demo_mouse("mouse").led_refs());
        profile
    }

    #[test]
    fn empty_entity_gets_root_folder() {
        let registry = ProviderRegistry::new();
        let profile = Profile::from_entity(&ProfileEntity::new("empty"), &registry).unwrap();
        let root = profile.tree().get(profile.root_folder()).unwrap();
        assert_eq!(root.name, ROOT_FOLDER_NAME);
        assert!(root.is_folder());
        assert_eq!(profile.get_all_render_elements().len(), 1);
    }

    #[test]
    fn entity_round_trip_is_lossless() {
        let registry = ProviderRegistry::with_builtins();
        let profile = sample(&registry);
        let saved = profile.to_entity();
        assert_eq!(saved.folders.len(), 2);
        assert_eq!(saved.layers.len(), 1);
        assert_eq!(saved.layers[0].leds.len(), 2);

        let json = saved.to_json().unwrap();
        let restored = Profile::from_entity(&ProfileEntity::from_json(&json).unwrap(), &registry).unwrap();
        assert_eq!(restored.to_entity(), saved);
    }

    #[test]
    fn orphans_are_dropped() {
        let registry = ProviderRegistry::new();
        let mut entity = ProfileEntity::new("orphans");
        let root = ElementEntity::new(ROOT_FOLDER_NAME, None, 0);
        let child = ElementEntity::new("child", Some(root.id), 1);
        let orphan = ElementEntity::new("orphan", Some(Uuid::new_v4()), 1);
        let orphan_child = ElementEntity::new("orphan child", Some(orphan.id), 1);
        for element in [root, child, orphan, orphan_child] {
            entity.folders.push(FolderEntity { element });
        }

        let profile = Profile::from_entity(&entity, &registry).unwrap();
        assert_eq!(profile.get_all_folders().len(), 2);
        assert_eq!(profile.tree().len(), 2);
    }

    #[test]
    fn frames_require_activation() {
        let registry = ProviderRegistry::with_builtins();
        let mut profile = sample(&registry);
        let data = DataModel::new();
        let ctx = FrameContext::new(Duration::from_millis(40), Duration::ZERO, &data);

        assert!(matches!(
            profile.update(&ctx),
            Err(LightweaveError::ProfileNotActivated(_))
        ));
        let mut renderer = Renderer::new(GraphicsContext::new("test"));
        let mut surface = Surface::new(vec![demo_mouse("mouse")]);
        assert!(profile.render(&mut renderer, &mut surface).is_err());

        profile.activate(&[demo_mouse("mouse")]);
        assert!(profile.update(&ctx).unwrap().is_empty());
        assert!(profile.render(&mut renderer, &mut surface).unwrap().is_empty());
    }

    #[test]
    fn placeholder_round_trip_keeps_position_and_state() {
        let registry = ProviderRegistry::with_builtins();
        let mut profile = sample(&registry);
        let layer = profile.get_all_layers()[0];
        let before = profile.to_entity();

        registry.unregister_provider(BUILTIN_PROVIDER);
        assert_eq!(profile.refresh_providers(&registry), 4);
        let effects = profile.tree().get(layer).unwrap().render_state().effects();
        assert!(effects.iter().all(EffectSlot::is_placeholder));
        assert_eq!(profile.to_entity(), before);

        register_builtins(&registry);
        assert_eq!(profile.refresh_providers(&registry), 4);
        let effects = profile.tree().get(layer).unwrap().render_state().effects();
        assert!(effects.iter().all(|effect| !effect.is_placeholder()));
        assert_eq!(effects[1].name(), "Invert");
        assert_eq!(profile.to_entity(), before);
    }

    #[test]
    fn folder_mask_hides_child_pixels() {
        let registry = ProviderRegistry::with_builtins();
        let mut profile = Profile::new("masked").unwrap();
        let root = profile.root_folder();
        let layer = profile.add_layer(root).unwrap();

        let tree = profile.tree_mut();
        let mask = registry
            .instantiate_effect(&ProviderKey::new(BUILTIN_PROVIDER, "Mask"))
            .unwrap();
        tree.add_layer_effect(root, EffectSlot::Live(mask)).unwrap();
        let brush = registry
            .resolve_brush(BrushEntity::new(ProviderKey::new(BUILTIN_PROVIDER, "Solid")))
            .unwrap();
        let node = tree.get_mut(layer).unwrap().as_layer_mut().unwrap();
        node.set_brush(Some(brush));
        node.add_leds(demo_led_strip("strip", 4).led_refs());

        let devices = vec![demo_led_strip("strip", 4)];
        profile.activate(&devices);
        let mut renderer = Renderer::new(GraphicsContext::new("test"));
        let mut surface = Surface::new(devices);
        let data = DataModel::new();
        for _ in 0..25 {
            let ctx = FrameContext::new(Duration::from_millis(40), Duration::ZERO, &data);
            profile.update(&ctx).unwrap();
        }
        surface.clear(Color::BLACK);
        profile.render(&mut renderer, &mut surface).unwrap();

        assert_eq!(surface.color(&LedKey::new("strip", "LedStripe1")), Some(Color::BLACK));
        assert_eq!(surface.color(&LedKey::new("strip", "LedStripe2")), Some(Color::BLACK));
        assert_eq!(surface.color(&LedKey::new("strip", "LedStripe4")), Some(Color::WHITE));
    }

    #[test]
    fn solid_layer_reaches_the_surface() {
        let registry = ProviderRegistry::with_builtins();
        let mut profile = sample(&registry);
        let layer = profile.get_all_layers()[0];
        let tree = profile.tree_mut();
        let dim = tree.get(layer).unwrap().render_state().effects()[0].id();
        let mask = tree.get(layer).unwrap().render_state().effects()[2].id();
        let invert = tree.get(layer).unwrap().render_state().effects()[1].id();
        tree.remove_layer_effect(layer, dim).unwrap();
        tree.remove_layer_effect(layer, mask).unwrap();
        tree.remove_layer_effect(layer, invert).unwrap();
        tree.get_mut(layer)
            .unwrap()
            .as_layer_mut()
            .unwrap()
            .brush_mut()
            .and_then(|brush| brush.live_mut())
            .unwrap()
            .properties_mut()
            .set_base_value("Color", PropertyValue::Color(Color::rgb(0, 200, 0)))
            .unwrap();

        let devices = vec![demo_mouse("mouse")];
        profile.activate(&devices);
        let mut renderer = Renderer::new(GraphicsContext::new("test"));
        let mut surface = Surface::new(devices);
        let data = DataModel::new();

        // One full second of fade-in.
        for _ in 0..25 {
            let ctx = FrameContext::new(Duration::from_millis(40), Duration::ZERO, &data);
            profile.update(&ctx).unwrap();
        }
        surface.clear(Color::BLACK);
        profile.render(&mut renderer, &mut surface).unwrap();

        assert_eq!(surface.color(&LedKey::new("mouse", "Mouse1")), Some(Color::rgb(0, 200, 0)));
        assert_eq!(renderer.stats().target_allocations, 3);

        profile.render(&mut renderer, &mut surface).unwrap();
        assert_eq!(renderer.stats().target_reuses, 3);
    }
}
