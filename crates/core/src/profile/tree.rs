//! Arena storage for the folder/layer hierarchy.

use std::collections::HashSet;
use std::fmt;

use crossbeam_channel::{Receiver, Sender};
use kurbo::Rect;
use uuid::Uuid;

use super::element::{Folder, Layer};
use super::render_state::RenderState;
use crate::effects::{EffectSlot, ProviderRegistry};
use crate::render::{compose_clip, ClipRegion, ElementShape};
use crate::{LightweaveError, Result};

/// Handle to an element in an [`ElementTree`].
///
/// Carries the slot's generation so a handle to a removed element is detected
/// instead of silently addressing whatever reuses the slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementKey {
    idx: u32,
    generation: u32,
}

impl ElementKey {
    pub const fn index(self) -> u32 {
        self.idx
    }
}

impl fmt::Debug for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementKey({}@gen{})", self.idx, self.generation)
    }
}

/// Structural changes observed by editors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    ChildAdded { parent: ElementKey, child: ElementKey },
    DescendantAdded { ancestor: ElementKey, descendant: ElementKey },
    ChildRemoved { parent: ElementKey, child: ElementKey },
    DescendantRemoved { ancestor: ElementKey, descendant: ElementKey },
    EffectsUpdated { element: ElementKey },
}

#[derive(Debug)]
pub enum ElementKind {
    Folder(Folder),
    Layer(Box<Layer>),
}

#[derive(Debug)]
pub struct ElementNode {
    id: Uuid,
    pub name: String,
    parent: Option<ElementKey>,
    children: Vec<ElementKey>,
    order: u32,
    pub suspended: bool,
    kind: ElementKind,
}

impl ElementNode {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn parent(&self) -> Option<ElementKey> {
        self.parent
    }

    pub fn children(&self) -> &[ElementKey] {
        &self.children
    }

    /// 1-based position among its siblings; 0 while detached.
    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ElementKind::Folder(_))
    }

    pub fn is_layer(&self) -> bool {
        matches!(self.kind, ElementKind::Layer(_))
    }

    pub fn as_folder(&self) -> Option<&Folder> {
        match &self.kind {
            ElementKind::Folder(folder) => Some(folder),
            ElementKind::Layer(_) => None,
        }
    }

    pub fn as_layer(&self) -> Option<&Layer> {
        match &self.kind {
            ElementKind::Layer(layer) => Some(layer),
            ElementKind::Folder(_) => None,
        }
    }

    pub fn as_layer_mut(&mut self) -> Option<&mut Layer> {
        match &mut self.kind {
            ElementKind::Layer(layer) => Some(layer),
            ElementKind::Folder(_) => None,
        }
    }

    pub fn render_state(&self) -> &RenderState {
        match &self.kind {
            ElementKind::Folder(folder) => &folder.render,
            ElementKind::Layer(layer) => &layer.render,
        }
    }

    pub fn render_state_mut(&mut self) -> &mut RenderState {
        match &mut self.kind {
            ElementKind::Folder(folder) => &mut folder.render,
            ElementKind::Layer(layer) => &mut layer.render,
        }
    }

    pub(crate) fn kind_mut(&mut self) -> &mut ElementKind {
        &mut self.kind
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<ElementNode>,
}

/// Flat storage for elements. Parents and children refer to each other by
/// [`ElementKey`], so the tree owns every node and a child never owns its parent.
#[derive(Debug, Default)]
pub struct ElementTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    listeners: Vec<Sender<TreeEvent>>,
}

impl ElementTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- Allocation --

    pub fn insert(&mut self, id: Uuid, name: impl Into<String>, kind: ElementKind) -> ElementKey {
        let node = ElementNode {
            id,
            name: name.into(),
            parent: None,
            children: Vec::new(),
            order: 0,
            suspended: false,
            kind,
        };
        match self.free.pop() {
            Some(idx) => {
                let slot = &mut self.slots[idx as usize];
                slot.node = Some(node);
                ElementKey {
                    idx,
                    generation: slot.generation,
                }
            }
            None => {
                let idx = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                ElementKey { idx, generation: 0 }
            }
        }
    }

    pub fn create_folder(&mut self, name: impl Into<String>) -> Result<ElementKey> {
        Ok(self.insert(Uuid::new_v4(), name, ElementKind::Folder(Folder::new()?)))
    }

    pub fn create_layer(&mut self, name: impl Into<String>) -> Result<ElementKey> {
        Ok(self.insert(
            Uuid::new_v4(),
            name,
            ElementKind::Layer(Box::new(Layer::new()?)),
        ))
    }

    /// Detaches an element and frees it together with its whole subtree.
    pub fn remove_element(&mut self, key: ElementKey) -> Result<()> {
        if let Some(parent) = self.get(key)?.parent {
            self.remove_child(parent, key)?;
        }
        let mut pending = vec![key];
        while let Some(current) = pending.pop() {
            let slot = &mut self.slots[current.idx as usize];
            if let Some(node) = slot.node.take() {
                pending.extend(node.children);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(current.idx);
            }
        }
        Ok(())
    }

    // -- Lookup --

    pub fn contains(&self, key: ElementKey) -> bool {
        self.node(key).is_some()
    }

    pub fn node(&self, key: ElementKey) -> Option<&ElementNode> {
        self.slots
            .get(key.idx as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn node_mut(&mut self, key: ElementKey) -> Option<&mut ElementNode> {
        self.slots
            .get_mut(key.idx as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn get(&self, key: ElementKey) -> Result<&ElementNode> {
        self.node(key).ok_or(LightweaveError::StaleElement)
    }

    pub fn get_mut(&mut self, key: ElementKey) -> Result<&mut ElementNode> {
        self.node_mut(key).ok_or(LightweaveError::StaleElement)
    }

    pub fn find(&self, id: Uuid) -> Option<ElementKey> {
        self.slots.iter().enumerate().find_map(|(idx, slot)| {
            slot.node
                .as_ref()
                .filter(|node| node.id == id)
                .map(|_| ElementKey {
                    idx: idx as u32,
                    generation: slot.generation,
                })
        })
    }

    /// Parent first, root last.
    pub fn ancestors(&self, key: ElementKey) -> Vec<ElementKey> {
        let mut out = Vec::new();
        let mut current = self.node(key).and_then(ElementNode::parent);
        while let Some(ancestor) = current {
            out.push(ancestor);
            current = self.node(ancestor).and_then(ElementNode::parent);
        }
        out
    }

    /// Whether `ancestor` is `key` or lies on the path from `key` to the root.
    pub fn is_ancestor(&self, ancestor: ElementKey, key: ElementKey) -> bool {
        key == ancestor || self.ancestors(key).contains(&ancestor)
    }

    // -- Topology --

    /// Attaches `child` under `parent` at the 0-based `index`, or last when
    /// `index` is `None`. An index past the end appends. Re-adding an existing
    /// child moves it without raising events.
    pub fn add_child(&mut self, parent: ElementKey, child: ElementKey, index: Option<usize>) -> Result<()> {
        if parent == child {
            return Err(LightweaveError::SelfParenting);
        }
        if !self.get(parent)?.is_folder() {
            return Err(LightweaveError::msg("only folders can contain other elements"));
        }
        let current = self.get(child)?.parent;
        if self.is_ancestor(child, parent) {
            return Err(LightweaveError::Cycle);
        }

        if current == Some(parent) {
            let children = &mut self.get_mut(parent)?.children;
            children.retain(|&existing| existing != child);
            let at = index.map_or(children.len(), |i| i.min(children.len()));
            children.insert(at, child);
            self.renumber(parent);
            return Ok(());
        }

        if let Some(previous) = current {
            self.remove_child(previous, child)?;
        }

        let children = &mut self.get_mut(parent)?.children;
        let at = index.map_or(children.len(), |i| i.min(children.len()));
        children.insert(at, child);
        self.get_mut(child)?.parent = Some(parent);
        self.renumber(parent);

        self.notify(TreeEvent::ChildAdded { parent, child });
        for ancestor in self.ancestors(parent) {
            self.notify(TreeEvent::DescendantAdded {
                ancestor,
                descendant: child,
            });
        }
        Ok(())
    }

    /// Detaches `child` from `parent`. The child stays in the arena.
    pub fn remove_child(&mut self, parent: ElementKey, child: ElementKey) -> Result<()> {
        if self.get(child)?.parent != Some(parent) {
            return Err(LightweaveError::NotAChild);
        }
        self.get_mut(parent)?
            .children
            .retain(|&existing| existing != child);
        let node = self.get_mut(child)?;
        node.parent = None;
        node.order = 0;
        self.renumber(parent);

        self.notify(TreeEvent::ChildRemoved { parent, child });
        for ancestor in self.ancestors(parent) {
            self.notify(TreeEvent::DescendantRemoved {
                ancestor,
                descendant: child,
            });
        }
        Ok(())
    }

    fn renumber(&mut self, parent: ElementKey) {
        let children = match self.node(parent) {
            Some(node) => node.children.clone(),
            None => return,
        };
        for (index, child) in children.into_iter().enumerate() {
            if let Some(node) = self.node_mut(child) {
                node.order = index as u32 + 1;
            }
        }
    }

    // -- Flattening --

    /// Every element below `root`, depth first, parents before children.
    pub fn descendants(&self, root: ElementKey) -> Vec<ElementKey> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementKey> = match self.node(root) {
            Some(node) => node.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(key) = stack.pop() {
            if let Some(node) = self.node(key) {
                out.push(key);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    pub fn all_layers(&self, root: ElementKey) -> Vec<ElementKey> {
        self.descendants(root)
            .into_iter()
            .filter(|&key| self.node(key).is_some_and(ElementNode::is_layer))
            .collect()
    }

    pub fn all_folders(&self, root: ElementKey) -> Vec<ElementKey> {
        self.descendants(root)
            .into_iter()
            .filter(|&key| self.node(key).is_some_and(ElementNode::is_folder))
            .collect()
    }

    pub fn all_render_elements(&self, root: ElementKey) -> Vec<ElementKey> {
        self.descendants(root)
    }

    // -- Naming --

    pub fn new_layer_name(&self, parent: ElementKey) -> String {
        self.unique_child_name(parent, "New layer")
    }

    pub fn new_folder_name(&self, parent: ElementKey) -> String {
        self.unique_child_name(parent, "New folder")
    }

    /// `base` if no direct child uses it, otherwise `base (N)` with the
    /// smallest free positive N.
    fn unique_child_name(&self, parent: ElementKey, base: &str) -> String {
        let names: Vec<&str> = self
            .node(parent)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|&child| self.node(child))
                    .map(|child| child.name.as_str())
                    .collect()
            })
            .unwrap_or_default();

        if !names.contains(&base) {
            return base.to_string();
        }

        let taken: HashSet<u32> = names
            .iter()
            .filter_map(|name| {
                name.strip_prefix(base)?
                    .strip_prefix(" (")?
                    .strip_suffix(')')?
                    .parse()
                    .ok()
            })
            .collect();
        let n = (1..).find(|n| !taken.contains(n)).unwrap_or(1);
        format!("{base} ({n})")
    }

    // -- Shape --

    /// A layer's own LEDs, or the union of every layer below a folder.
    pub fn shape(&self, key: ElementKey) -> Result<ElementShape> {
        let node = self.get(key)?;
        if let Some(layer) = node.as_layer() {
            return Ok(layer.shape());
        }

        let mut seen = HashSet::new();
        let mut leds = Vec::new();
        let mut bounds: Option<Rect> = None;
        for layer in self
            .all_layers(key)
            .into_iter()
            .filter_map(|k| self.node(k).and_then(ElementNode::as_layer))
        {
            for led in layer.leds() {
                if seen.insert(led.key.clone()) {
                    bounds = Some(bounds.map_or(led.rect, |b| b.union(led.rect)));
                    leds.push(led.clone());
                }
            }
        }
        Ok(ElementShape {
            bounds: bounds.unwrap_or(Rect::ZERO),
            leds,
        })
    }

    /// The LEDs `key` may draw to after its ancestors' and its own effects.
    pub fn effective_clip(&self, key: ElementKey) -> Result<ClipRegion> {
        let mut chain = self.ancestors(key);
        chain.reverse();
        chain.push(key);

        let mut clip: Option<ClipRegion> = None;
        for element in chain {
            let shape = self.shape(element)?;
            let effects = self.get(element)?.render_state().effects();
            clip = Some(compose_clip(&shape, clip.as_ref(), effects));
        }
        Ok(clip.unwrap_or_default())
    }

    // -- Effects --

    pub fn add_layer_effect(&mut self, key: ElementKey, effect: EffectSlot) -> Result<bool> {
        let added = self.get_mut(key)?.render_state_mut().add_effect(effect);
        if added {
            self.notify(TreeEvent::EffectsUpdated { element: key });
        }
        Ok(added)
    }

    pub fn remove_layer_effect(&mut self, key: ElementKey, id: Uuid) -> Result<Option<EffectSlot>> {
        let removed = self.get_mut(key)?.render_state_mut().remove_effect(id);
        if removed.is_some() {
            self.notify(TreeEvent::EffectsUpdated { element: key });
        }
        Ok(removed)
    }

    pub fn move_layer_effect(&mut self, key: ElementKey, id: Uuid, order: u32) -> Result<bool> {
        let moved = self.get_mut(key)?.render_state_mut().move_effect(id, order);
        if moved {
            self.notify(TreeEvent::EffectsUpdated { element: key });
        }
        Ok(moved)
    }

    /// Swaps effects and brushes between live and placeholder form on every
    /// element to match `registry`.
    pub fn refresh_providers(&mut self, registry: &ProviderRegistry) -> usize {
        let mut swapped = 0;
        let mut updated = Vec::new();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            let Some(node) = slot.node.as_mut() else {
                continue;
            };
            let count = match node.kind_mut() {
                ElementKind::Folder(folder) => folder.render.refresh_providers(registry),
                ElementKind::Layer(layer) => layer.refresh_provider(registry),
            };
            if count > 0 {
                swapped += count;
                updated.push(ElementKey {
                    idx: idx as u32,
                    generation: slot.generation,
                });
            }
        }
        for element in updated {
            self.notify(TreeEvent::EffectsUpdated { element });
        }
        swapped
    }

    // -- Observation --

    pub fn subscribe(&mut self) -> Receiver<TreeEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.listeners.push(tx);
        rx
    }

    fn notify(&mut self, event: TreeEvent) {
        self.listeners.retain(|tx| tx.send(event).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{demo_led_strip, LedKey};
    use crate::effects::{ProviderKey, BUILTIN_PROVIDER};

    fn orders(tree: &ElementTree, parent: ElementKey) -> Vec<u32> {
        tree.get(parent)
            .unwrap()
            .children()
            .iter()
            .map(|&child| tree.get(child).unwrap().order())
            .collect()
    }

    #[test]
    fn sibling_orders_stay_dense() {
        let mut tree = ElementTree::new();
        let root = tree.create_folder("Root folder").unwrap();
        let a = tree.create_layer("a").unwrap();
        let b = tree.create_layer("b").unwrap();
        let c = tree.create_layer("c").unwrap();

        tree.add_child(root, a, None).unwrap();
        tree.add_child(root, b, None).unwrap();
        tree.add_child(root, c, Some(0)).unwrap();
        assert_eq!(tree.get(root).unwrap().children(), &[c, a, b]);
        assert_eq!(orders(&tree, root), vec![1, 2, 3]);

        tree.remove_child(root, a).unwrap();
        assert_eq!(orders(&tree, root), vec![1, 2]);
        assert_eq!(tree.get(a).unwrap().order(), 0);

        tree.add_child(root, a, Some(99)).unwrap();
        tree.add_child(root, b, Some(0)).unwrap();
        assert_eq!(tree.get(root).unwrap().children(), &[b, c, a]);
        assert_eq!(orders(&tree, root), vec![1, 2, 3]);
    }

    #[test]
    fn cycles_are_rejected_without_mutation() {
        let mut tree = ElementTree::new();
        let root = tree.create_folder("root").unwrap();
        let inner = tree.create_folder("inner").unwrap();
        let deepest = tree.create_folder("deepest").unwrap();
        tree.add_child(root, inner, None).unwrap();
        tree.add_child(inner, deepest, None).unwrap();

        let err = tree.add_child(deepest, root, None).unwrap_err();
        assert!(matches!(err, LightweaveError::Cycle));
        assert!(matches!(
            tree.add_child(inner, inner, None).unwrap_err(),
            LightweaveError::SelfParenting
        ));

        assert_eq!(tree.get(root).unwrap().parent(), None);
        assert!(tree.get(deepest).unwrap().children().is_empty());
        assert_eq!(tree.descendants(root), vec![inner, deepest]);
    }

    #[test]
    fn new_names_fill_gaps() {
        let mut tree = ElementTree::new();
        let root = tree.create_folder("root").unwrap();
        assert_eq!(tree.new_layer_name(root), "New layer");

        for name in ["New layer", "New layer (1)", "New layer (3)"] {
            let layer = tree.create_layer(name).unwrap();
            tree.add_child(root, layer, None).unwrap();
        }
        assert_eq!(tree.new_layer_name(root), "New layer (2)");
        assert_eq!(tree.new_folder_name(root), "New folder");
    }

    #[test]
    fn events_bubble_to_ancestors() {
        let mut tree = ElementTree::new();
        let root = tree.create_folder("root").unwrap();
        let inner = tree.create_folder("inner").unwrap();
        tree.add_child(root, inner, None).unwrap();
        let events = tree.subscribe();

        let layer = tree.create_layer("layer").unwrap();
        tree.add_child(inner, layer, None).unwrap();
        tree.remove_child(inner, layer).unwrap();

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                TreeEvent::ChildAdded {
                    parent: inner,
                    child: layer
                },
                TreeEvent::DescendantAdded {
                    ancestor: root,
                    descendant: layer
                },
                TreeEvent::ChildRemoved {
                    parent: inner,
                    child: layer
                },
                TreeEvent::DescendantRemoved {
                    ancestor: root,
                    descendant: layer
                },
            ]
        );
    }

    #[test]
    fn removed_keys_go_stale() {
        let mut tree = ElementTree::new();
        let root = tree.create_folder("root").unwrap();
        let folder = tree.create_folder("folder").unwrap();
        let layer = tree.create_layer("layer").unwrap();
        tree.add_child(root, folder, None).unwrap();
        tree.add_child(folder, layer, None).unwrap();

        tree.remove_element(folder).unwrap();
        assert!(!tree.contains(folder));
        assert!(!tree.contains(layer));
        assert!(tree.get(root).unwrap().children().is_empty());
        assert_eq!(tree.len(), 1);

        let reused = tree.create_layer("reused").unwrap();
        assert!(tree.contains(reused));
        assert!(matches!(tree.get(layer), Err(LightweaveError::StaleElement)));
    }

    #[test]
    fn clip_unions_parent_and_subtracts_own_effects() {
        let registry = ProviderRegistry::with_builtins();
        let strip = demo_led_strip("strip", 4);
        let mut tree = ElementTree::new();
        let root = tree.create_folder("root").unwrap();
        let layer = tree.create_layer("layer").unwrap();
        tree.add_child(root, layer, None).unwrap();
        tree.get_mut(layer)
            .unwrap()
            .as_layer_mut()
            .unwrap()
            .add_leds(strip.led_refs());

        assert_eq!(tree.effective_clip(layer).unwrap().len(), 4);

        let mask = registry
            .instantiate_effect(&ProviderKey::new(BUILTIN_PROVIDER, "Mask"))
            .unwrap();
        assert!(tree.add_layer_effect(root, EffectSlot::Live(mask)).unwrap());
        assert_eq!(tree.effective_clip(root).unwrap().len(), 2);
        assert_eq!(tree.effective_clip(layer).unwrap().len(), 4);

        let mask = registry
            .instantiate_effect(&ProviderKey::new(BUILTIN_PROVIDER, "Mask"))
            .unwrap();
        assert!(tree.add_layer_effect(layer, EffectSlot::Live(mask)).unwrap());
        let clip = tree.effective_clip(layer).unwrap();
        assert_eq!(clip.len(), 2);
        assert!(!clip.contains(&LedKey::new("strip", "LedStripe1")));
        assert!(clip.contains(&LedKey::new("strip", "LedStripe4")));
    }
}
