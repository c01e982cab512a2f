use kurbo::Rect;

use super::{Canvas, ClipRegion, GraphicsContext, RenderTarget};
use crate::device::LedRef;
use crate::effects::EffectSlot;
use crate::profile::{ElementError, ElementKey, ElementKind, ElementTree};
use crate::BlendMode;

/// Geometry an element covers: the LEDs it may draw to and their bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementShape {
    pub bounds: Rect,
    pub leds: Vec<LedRef>,
}

impl ElementShape {
    pub fn region(&self) -> ClipRegion {
        self.leds.iter().map(|led| led.key.clone()).collect()
    }
}

/// Clip for an element: its own shape joined with its parent's clip, minus
/// each active effect's exclusion in effect order.
///
/// A parent's exclusions are not inherited here; the parent applies its own
/// clip to its target after the children are composited into it.
pub fn compose_clip(shape: &ElementShape, inherited: Option<&ClipRegion>, effects: &[EffectSlot]) -> ClipRegion {
    let mut clip = shape.region();
    if let Some(inherited) = inherited {
        clip.union_with(inherited);
    }
    for effect in effects.iter().filter_map(EffectSlot::active) {
        let mut excluded = ClipRegion::new();
        effect.clip(shape, &mut excluded);
        clip.subtract(&excluded);
    }
    clip
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub target_allocations: u64,
    pub target_reuses: u64,
    pub elements_rendered: u64,
}

/// Draws an element tree into a [`Canvas`], one offscreen target per element.
#[derive(Debug)]
pub struct Renderer {
    context: GraphicsContext,
    stats: RenderStats,
}

impl Renderer {
    pub fn new(context: GraphicsContext) -> Self {
        Self {
            context,
            stats: RenderStats::default(),
        }
    }

    pub fn context(&self) -> &GraphicsContext {
        &self.context
    }

    /// Switches backend. Every cached target is rebuilt on its next render.
    pub fn set_context(&mut self, context: GraphicsContext) {
        tracing::debug!(context = ?context, "graphics context changed");
        self.context = context;
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Renders `root` and everything below it. Elements that fail are skipped
    /// for this frame and reported; the rest of the tree still renders.
    pub fn render_tree(
        &mut self,
        tree: &mut ElementTree,
        root: ElementKey,
        opacity: f64,
        canvas: &mut dyn Canvas,
    ) -> Vec<ElementError> {
        let mut errors = Vec::new();
        self.render_element(tree, root, None, opacity, canvas, &mut errors);
        errors
    }

    fn render_element(
        &mut self,
        tree: &mut ElementTree,
        key: ElementKey,
        inherited: Option<&ClipRegion>,
        opacity: f64,
        canvas: &mut dyn Canvas,
        errors: &mut Vec<ElementError>,
    ) {
        let Some(node) = tree.node(key) else {
            return;
        };
        if !node.render_state().is_enabled() {
            return;
        }
        let id = node.id();
        let Ok(shape) = tree.shape(key) else {
            return;
        };
        let clip = compose_clip(&shape, inherited, node.render_state().effects());
        let children: Vec<ElementKey> = node.children().to_vec();

        let Some(node) = tree.node_mut(key) else {
            return;
        };
        let mut target = match node.render_state_mut().target.take() {
            Some(target) if target.is_valid_for(&self.context, shape.bounds, &shape.leds) => {
                self.stats.target_reuses += 1;
                target
            }
            _ => {
                self.stats.target_allocations += 1;
                RenderTarget::new(&self.context, shape.bounds, &shape.leds)
            }
        };
        target.clear();

        let drawn = match node.kind_mut() {
            ElementKind::Layer(layer) => layer.render_brush(&mut target),
            ElementKind::Folder(_) => Ok(()),
        };
        if let Err(error) = drawn {
            errors.push(ElementError { element: id, error });
            self.restore(tree, key, target);
            return;
        }

        // Lower orders draw on top, so children are composited last to first.
        for &child in children.iter().rev() {
            self.render_element(tree, child, Some(&clip), 1.0, &mut target, errors);
        }

        target.apply_clip(&clip);

        let Some(node) = tree.node_mut(key) else {
            return;
        };
        let state = node.render_state_mut();
        let mut result = Ok(());
        for effect in state.active_effects_mut() {
            result = effect.post_process(&mut target);
            if result.is_err() {
                break;
            }
        }
        if let Err(error) = result {
            errors.push(ElementError { element: id, error });
            self.restore(tree, key, target);
            return;
        }

        let alpha = opacity * state.opacity();
        let mode = match node.kind() {
            ElementKind::Layer(_) => node.render_state().blend_mode(),
            ElementKind::Folder(_) => BlendMode::Normal,
        };
        for (led, color) in target.iter() {
            canvas.blend(led, color.fade(alpha), mode);
        }
        self.stats.elements_rendered += 1;
        self.restore(tree, key, target);
    }

    fn restore(&self, tree: &mut ElementTree, key: ElementKey, target: RenderTarget) {
        if let Some(node) = tree.node_mut(key) {
            node.render_state_mut().target = Some(target);
        }
    }
}
