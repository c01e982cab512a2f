use std::sync::Arc;

use uuid::Uuid;

use super::condition::{ConditionOutcome, ConditionRuntime, DisplayCondition};
use crate::effects::{EffectSlot, LayerEffectEntity, LayerEffectInstance, ProviderRegistry};
use crate::property::LayerPropertyGroup;
use crate::render::{FrameContext, RenderTarget};
use crate::timeline::Timeline;
use crate::{BlendMode, Result};

/// State shared by every element that renders: its clock, display condition,
/// general properties and effect list.
#[derive(Debug)]
pub struct RenderState {
    timeline: Arc<Timeline>,
    condition: DisplayCondition,
    runtime: ConditionRuntime,
    effects: Vec<EffectSlot>,
    general: LayerPropertyGroup,
    enabled: bool,
    should_be_enabled: bool,
    display_condition_met: bool,
    pub(crate) target: Option<RenderTarget>,
}

impl RenderState {
    pub(crate) fn new(general: LayerPropertyGroup, timeline: Timeline, condition: DisplayCondition) -> Self {
        Self {
            timeline: Arc::new(timeline),
            condition,
            runtime: ConditionRuntime::default(),
            effects: Vec::new(),
            general,
            enabled: false,
            should_be_enabled: false,
            display_condition_met: false,
            target: None,
        }
    }

    /// Shared handle so an editor can scrub the clock from another thread.
    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    pub fn condition(&self) -> &DisplayCondition {
        &self.condition
    }

    pub fn set_condition(&mut self, condition: DisplayCondition) {
        self.condition = condition;
        self.runtime = ConditionRuntime::default();
    }

    pub fn general(&self) -> &LayerPropertyGroup {
        &self.general
    }

    pub fn general_mut(&mut self) -> &mut LayerPropertyGroup {
        &mut self.general
    }

    /// Applied visibility, updated once per frame from the condition.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn should_be_enabled(&self) -> bool {
        self.should_be_enabled
    }

    pub fn display_condition_met(&self) -> bool {
        self.display_condition_met
    }

    /// Effective opacity from `General.Opacity`, in 0..=1.
    pub fn opacity(&self) -> f64 {
        self.general
            .float("Opacity")
            .map_or(1.0, |opacity| (opacity / 100.0).clamp(0.0, 1.0))
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.general
            .choice("BlendMode")
            .map(BlendMode::from_index)
            .unwrap_or_default()
    }

    pub(crate) fn update(&mut self, ctx: &FrameContext<'_>, suspended: bool) -> Result<()> {
        let outcome = if suspended {
            self.runtime.suspend();
            self.timeline.clear_delta();
            ConditionOutcome::UNMET
        } else if self.timeline.is_overridden() {
            ConditionOutcome {
                met: true,
                should_be_enabled: true,
            }
        } else {
            self.timeline.clear_delta();
            self.condition
                .update(&mut self.runtime, &self.timeline, ctx)?
        };

        self.display_condition_met = outcome.met;
        self.should_be_enabled = outcome.should_be_enabled;
        self.apply_enabled();

        let position = self.timeline.position();
        self.general.update(position, ctx.data);
        for effect in self.effects.iter_mut().filter_map(EffectSlot::live_mut) {
            effect.update(ctx, position);
        }
        Ok(())
    }

    fn apply_enabled(&mut self) {
        if self.enabled == self.should_be_enabled {
            return;
        }
        self.enabled = self.should_be_enabled;
        if !self.enabled {
            self.release();
        }
    }

    /// Drops the cached render target.
    pub(crate) fn release(&mut self) {
        self.target = None;
    }

    // -- Effects --

    pub fn effects(&self) -> &[EffectSlot] {
        &self.effects
    }

    pub fn effect(&self, id: Uuid) -> Option<&EffectSlot> {
        self.effects.iter().find(|effect| effect.id() == id)
    }

    pub fn effect_mut(&mut self, id: Uuid) -> Option<&mut EffectSlot> {
        self.effects.iter_mut().find(|effect| effect.id() == id)
    }

    pub(crate) fn active_effects_mut(&mut self) -> impl Iterator<Item = &mut LayerEffectInstance> + '_ {
        self.effects
            .iter_mut()
            .filter_map(EffectSlot::live_mut)
            .filter(|effect| effect.is_active())
    }

    /// Replaces the effect list with stored effects, keeping their stored order.
    pub(crate) fn load_effects(&mut self, effects: Vec<EffectSlot>) {
        self.effects = effects;
        self.order_effects();
    }

    /// Appends `effect`. Returns false if an effect with its id is already present.
    pub(crate) fn add_effect(&mut self, mut effect: EffectSlot) -> bool {
        if self.effect(effect.id()).is_some() {
            return false;
        }
        effect.set_order(self.effects.len() as u32 + 1);
        self.effects.push(effect);
        self.order_effects();
        true
    }

    pub(crate) fn remove_effect(&mut self, id: Uuid) -> Option<EffectSlot> {
        let index = self.effects.iter().position(|effect| effect.id() == id)?;
        let removed = self.effects.remove(index);
        self.order_effects();
        Some(removed)
    }

    /// Moves an effect to the 1-based `order`, clamped to the list.
    pub(crate) fn move_effect(&mut self, id: Uuid, order: u32) -> bool {
        let Some(index) = self.effects.iter().position(|effect| effect.id() == id) else {
            return false;
        };
        let effect = self.effects.remove(index);
        let target = (order.max(1) as usize - 1).min(self.effects.len());
        self.effects.insert(target, effect);
        self.renumber_effects();
        true
    }

    fn order_effects(&mut self) {
        self.effects.sort_by_key(EffectSlot::order);
        self.renumber_effects();
    }

    fn renumber_effects(&mut self) {
        for (index, effect) in self.effects.iter_mut().enumerate() {
            effect.set_order(index as u32 + 1);
        }
    }

    /// Swaps effects between live and placeholder form to match the registry.
    /// Each swap happens in place. Returns the number of swaps.
    ///
    /// A placeholder whose stored state no longer loads into the returned
    /// provider's schema stays a placeholder; the remaining slots still swap.
    pub(crate) fn refresh_providers(&mut self, registry: &ProviderRegistry) -> usize {
        let mut swapped = 0;
        for slot in &mut self.effects {
            let registered = registry.has_effect(slot.key());
            match slot {
                EffectSlot::Live(effect) if !registered => {
                    tracing::info!(effect = %effect.key(), id = %effect.id(), "effect provider gone, using placeholder");
                    *slot = EffectSlot::Placeholder(effect.to_entity());
                    swapped += 1;
                }
                EffectSlot::Placeholder(entity) if registered => {
                    match registry.create_effect(entity) {
                        Ok(effect) => {
                            tracing::info!(effect = %entity.key, id = %entity.id, "effect provider returned, restoring effect");
                            *slot = EffectSlot::Live(effect);
                            swapped += 1;
                        }
                        Err(err) => {
                            tracing::warn!(effect = %entity.key, id = %entity.id, error = %err, "effect cannot be restored, keeping placeholder");
                        }
                    }
                }
                _ => {}
            }
        }
        swapped
    }

    pub(crate) fn effect_entities(&self) -> Vec<LayerEffectEntity> {
        self.effects.iter().map(EffectSlot::to_entity).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::effects::{ProviderKey, BUILTIN_PROVIDER};
    use crate::property::{DataModel, GroupSchema, PropertyValue};
    use crate::Color;

    fn state() -> RenderState {
        let schema = GroupSchema::build("General", |b| {
            b.float("Opacity", 100.0).range(0.0, 100.0);
        });
        RenderState::new(
            LayerPropertyGroup::from_schema("General.", &schema, &[]).unwrap(),
            Timeline::new(),
            DisplayCondition::AlwaysOn,
        )
    }

    fn dim(registry: &ProviderRegistry) -> EffectSlot {
        EffectSlot::Live(
            registry
                .instantiate_effect(&ProviderKey::new(BUILTIN_PROVIDER, "Dim"))
                .unwrap(),
        )
    }

    fn orders(state: &RenderState) -> Vec<u32> {
        state.effects().iter().map(EffectSlot::order).collect()
    }

    #[test]
    fn effect_orders_stay_dense() {
        let registry = ProviderRegistry::with_builtins();
        let mut state = state();
        let a = dim(&registry);
        let a_id = a.id();
        assert!(state.add_effect(a));
        let b = dim(&registry);
        let b_id = b.id();
        state.add_effect(b);
        state.add_effect(dim(&registry));
        assert_eq!(orders(&state), vec![1, 2, 3]);

        assert!(state.move_effect(a_id, 3));
        assert_eq!(state.effects()[2].id(), a_id);
        assert_eq!(orders(&state), vec![1, 2, 3]);

        state.remove_effect(b_id).unwrap();
        assert_eq!(orders(&state), vec![1, 2]);
        assert!(state.remove_effect(b_id).is_none());
    }

    #[test]
    fn duplicate_effect_is_ignored() {
        let registry = ProviderRegistry::with_builtins();
        let mut state = state();
        let effect = dim(&registry);
        let entity = effect.to_entity();
        state.add_effect(effect);
        let duplicate = registry.resolve_effect(entity).unwrap();
        assert!(!state.add_effect(duplicate));
        assert_eq!(state.effects().len(), 1);
    }

    #[test]
    fn unloadable_placeholder_does_not_block_other_swaps() {
        let registry = ProviderRegistry::with_builtins();
        let mut state = state();

        let mut broken = dim(&registry).to_entity();
        let brightness = broken
            .properties
            .iter_mut()
            .find(|p| p.path.ends_with(".Brightness"))
            .unwrap();
        brightness.value = PropertyValue::Color(Color::WHITE);
        let broken_id = broken.id;
        let healthy = dim(&registry).to_entity();
        let healthy_id = healthy.id;

        state.add_effect(EffectSlot::Placeholder(broken));
        state.add_effect(EffectSlot::Placeholder(healthy));

        assert_eq!(state.refresh_providers(&registry), 1);
        assert!(state.effect(broken_id).unwrap().is_placeholder());
        assert!(!state.effect(healthy_id).unwrap().is_placeholder());
        assert_eq!(orders(&state), vec![1, 2]);
    }

    #[test]
    fn suspended_element_is_disabled() {
        let data = DataModel::new();
        let ctx = FrameContext::new(Duration::from_millis(40), Duration::ZERO, &data);
        let mut state = state();

        state.update(&ctx, false).unwrap();
        assert!(state.is_enabled());
        state.update(&ctx, true).unwrap();
        assert!(!state.is_enabled());
        assert!(!state.display_condition_met());
    }
}
