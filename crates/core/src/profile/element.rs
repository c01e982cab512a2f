use std::collections::HashSet;

use kurbo::Rect;

use super::condition::DisplayCondition;
use super::render_state::RenderState;
use crate::adaption::{AdaptionHint, LayerAdapter};
use crate::device::{Device, LedKey, LedRef};
use crate::effects::{BrushSlot, ProviderRegistry};
use crate::property::{GroupSchema, LayerPropertyGroup, PropertyEntity};
use crate::render::{ElementShape, FrameContext, RenderTarget};
use crate::timeline::Timeline;
use crate::{BlendMode, Result};

pub(crate) const GENERAL_PATH: &str = "General.";

/// Container element. Draws nothing itself; its children render into its target.
#[derive(Debug)]
pub struct Folder {
    pub(crate) render: RenderState,
}

impl Folder {
    pub fn general_schema() -> GroupSchema {
        GroupSchema::build("General", |b| {
            b.float("Opacity", 100.0).range(0.0, 100.0);
        })
    }

    pub fn new() -> Result<Self> {
        Self::load(Timeline::new(), DisplayCondition::default(), &[])
    }

    pub(crate) fn load(timeline: Timeline, condition: DisplayCondition, stored: &[PropertyEntity]) -> Result<Self> {
        let general = LayerPropertyGroup::from_schema(GENERAL_PATH, &Self::general_schema(), stored)?;
        Ok(Self {
            render: RenderState::new(general, timeline, condition),
        })
    }

    pub fn render_state(&self) -> &RenderState {
        &self.render
    }

    pub fn render_state_mut(&mut self) -> &mut RenderState {
        &mut self.render
    }
}

/// Leaf element drawing a brush onto a set of device LEDs.
#[derive(Debug)]
pub struct Layer {
    pub(crate) render: RenderState,
    leds: Vec<LedRef>,
    stored_leds: Vec<LedKey>,
    adapter: LayerAdapter,
    bounds: Rect,
    brush: Option<BrushSlot>,
}

impl Layer {
    pub fn general_schema() -> GroupSchema {
        GroupSchema::build("General", |b| {
            b.float("Opacity", 100.0).range(0.0, 100.0);
            b.choice("BlendMode", 0)
                .range(0.0, (BlendMode::ALL.len() - 1) as f64)
                .without_keyframes();
        })
    }

    pub fn new() -> Result<Self> {
        Self::load(Timeline::new(), DisplayCondition::default(), &[])
    }

    pub(crate) fn load(timeline: Timeline, condition: DisplayCondition, stored: &[PropertyEntity]) -> Result<Self> {
        let general = LayerPropertyGroup::from_schema(GENERAL_PATH, &Self::general_schema(), stored)?;
        Ok(Self {
            render: RenderState::new(general, timeline, condition),
            leds: Vec::new(),
            stored_leds: Vec::new(),
            adapter: LayerAdapter::default(),
            bounds: Rect::ZERO,
            brush: None,
        })
    }

    pub fn render_state(&self) -> &RenderState {
        &self.render
    }

    pub fn render_state_mut(&mut self) -> &mut RenderState {
        &mut self.render
    }

    // -- LEDs --

    /// LEDs resolved against the current devices.
    pub fn leds(&self) -> &[LedRef] {
        &self.leds
    }

    /// LED references as persisted, including ones not currently present.
    pub fn stored_leds(&self) -> &[LedKey] {
        &self.stored_leds
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn adapter(&self) -> &LayerAdapter {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut LayerAdapter {
        &mut self.adapter
    }

    pub(crate) fn set_stored_leds(&mut self, leds: Vec<LedKey>, hints: Vec<AdaptionHint>) {
        self.stored_leds = leds;
        self.adapter = LayerAdapter::new(hints);
    }

    pub fn add_led(&mut self, led: LedRef) {
        if self.leds.iter().any(|existing| existing.key == led.key) {
            return;
        }
        self.stored_leds.push(led.key.clone());
        self.leds.push(led);
        self.calculate_render_properties();
    }

    pub fn add_leds(&mut self, leds: impl IntoIterator<Item = LedRef>) {
        let mut known: HashSet<LedKey> = self.leds.iter().map(|led| led.key.clone()).collect();
        for led in leds {
            if known.insert(led.key.clone()) {
                self.stored_leds.push(led.key.clone());
                self.leds.push(led);
            }
        }
        self.calculate_render_properties();
    }

    pub fn remove_led(&mut self, key: &LedKey) -> bool {
        let before = self.leds.len();
        self.leds.retain(|led| &led.key != key);
        self.stored_leds.retain(|stored| stored != key);
        let removed = before != self.leds.len();
        if removed {
            self.calculate_render_properties();
        }
        removed
    }

    pub fn clear_leds(&mut self) {
        self.leds.clear();
        self.stored_leds.clear();
        self.calculate_render_properties();
    }

    /// Resolves the stored LEDs against `devices`, through the adaption
    /// hints when the layer has any.
    pub fn populate_leds(&mut self, devices: &[Device]) {
        self.leds = self.adapter.adapt(&self.stored_leds, devices);
        self.calculate_render_properties();
    }

    /// Derives and stores hints describing the currently assigned LEDs.
    pub fn determine_hints(&mut self, devices: &[Device]) -> Vec<AdaptionHint> {
        self.adapter.determine_hints(&self.leds, devices)
    }

    fn calculate_render_properties(&mut self) {
        self.bounds = self
            .leds
            .iter()
            .map(|led| led.rect)
            .reduce(|a, b| a.union(b))
            .unwrap_or(Rect::ZERO);
        self.render.release();
    }

    pub fn shape(&self) -> ElementShape {
        ElementShape {
            bounds: self.bounds,
            leds: self.leds.clone(),
        }
    }

    // -- Brush --

    pub fn brush(&self) -> Option<&BrushSlot> {
        self.brush.as_ref()
    }

    pub fn brush_mut(&mut self) -> Option<&mut BrushSlot> {
        self.brush.as_mut()
    }

    pub fn set_brush(&mut self, brush: Option<BrushSlot>) {
        self.brush = brush;
    }

    pub(crate) fn update(&mut self, ctx: &FrameContext<'_>, suspended: bool) -> Result<()> {
        self.render.update(ctx, suspended)?;
        if !self.render.is_enabled() {
            return Ok(());
        }
        let position = self.render.timeline().position();
        if let Some(brush) = self.brush.as_mut().and_then(BrushSlot::live_mut) {
            brush.update(ctx, position);
        }
        Ok(())
    }

    pub(crate) fn render_brush(&mut self, target: &mut RenderTarget) -> Result<()> {
        match self.brush.as_mut().and_then(BrushSlot::live_mut) {
            Some(brush) => brush.render(target),
            None => Ok(()),
        }
    }

    pub(crate) fn refresh_provider(&mut self, registry: &ProviderRegistry) -> usize {
        let mut swapped = self.render.refresh_providers(registry);
        let Some(slot) = self.brush.as_mut() else {
            return swapped;
        };
        let registered = registry.has_brush(slot.key());
        match slot {
            BrushSlot::Live(brush) if !registered => {
                tracing::info!(brush = %brush.key(), "brush provider gone, using placeholder");
                *slot = BrushSlot::Placeholder(brush.to_entity());
                swapped += 1;
            }
            BrushSlot::Placeholder(entity) if registered => {
                match registry.create_brush(entity) {
                    Ok(brush) => {
                        tracing::info!(brush = %entity.key, "brush provider returned, restoring brush");
                        *slot = BrushSlot::Live(brush);
                        swapped += 1;
                    }
                    Err(err) => {
                        tracing::warn!(brush = %entity.key, error = %err, "brush cannot be restored, keeping placeholder");
                    }
                }
            }
            _ => {}
        }
        swapped
    }
}
