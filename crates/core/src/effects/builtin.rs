//! Brushes and effects that ship with the engine.

use kurbo::Rect;

use super::{
    BrushDescriptor, EffectDescriptor, LayerBrush, LayerEffect, ProviderKey, ProviderRegistry,
};
use crate::property::{GroupSchema, LayerPropertyGroup};
use crate::render::{ClipRegion, ElementShape, FrameContext, RenderTarget};
use crate::{Color, Result};

pub const BUILTIN_PROVIDER: &str = "lightweave.builtin";

/// Registers every built-in brush and effect with `registry`.
pub fn register_builtins(registry: &ProviderRegistry) {
    registry.register_brush(BrushDescriptor::new(
        ProviderKey::new(BUILTIN_PROVIDER, "Solid"),
        "Solid",
        SolidBrush::schema(),
        || Box::new(SolidBrush),
    ));
    registry.register_brush(BrushDescriptor::new(
        ProviderKey::new(BUILTIN_PROVIDER, "Gradient"),
        "Gradient",
        GradientBrush::schema(),
        || Box::new(GradientBrush),
    ));
    registry.register_brush(BrushDescriptor::new(
        ProviderKey::new(BUILTIN_PROVIDER, "Rainbow"),
        "Rainbow",
        RainbowBrush::schema(),
        || Box::new(RainbowBrush::default()),
    ));
    registry.register_effect(EffectDescriptor::new(
        ProviderKey::new(BUILTIN_PROVIDER, "Dim"),
        "Dim",
        DimEffect::schema(),
        || Box::new(DimEffect),
    ));
    registry.register_effect(EffectDescriptor::new(
        ProviderKey::new(BUILTIN_PROVIDER, "Invert"),
        "Invert",
        GroupSchema::build("Invert", |_| {}),
        || Box::new(InvertEffect),
    ));
    registry.register_effect(EffectDescriptor::new(
        ProviderKey::new(BUILTIN_PROVIDER, "Mask"),
        "Mask",
        MaskEffect::schema(),
        || Box::new(MaskEffect),
    ));
}

/// Horizontal position of `rect`'s centre within `bounds`, 0 at the left edge.
fn horizontal_fraction(rect: Rect, bounds: Rect) -> f64 {
    let width = bounds.width();
    if width <= f64::EPSILON {
        return 0.0;
    }
    ((rect.center().x - bounds.x0) / width).clamp(0.0, 1.0)
}

pub struct SolidBrush;

impl SolidBrush {
    pub fn schema() -> GroupSchema {
        GroupSchema::build("Solid", |b| {
            b.color("Color", Color::WHITE).description("Fill colour");
        })
    }
}

impl LayerBrush for SolidBrush {
    fn render(&mut self, target: &mut RenderTarget, properties: &LayerPropertyGroup) -> Result<()> {
        let color = properties.color("Color").unwrap_or(Color::WHITE);
        target.paint(|_, _| color);
        Ok(())
    }
}

/// Blends two colours left to right across the layer.
pub struct GradientBrush;

impl GradientBrush {
    pub fn schema() -> GroupSchema {
        GroupSchema::build("Gradient", |b| {
            b.color("StartColor", Color::rgb(255, 0, 0));
            b.color("EndColor", Color::rgb(0, 0, 255));
        })
    }
}

impl LayerBrush for GradientBrush {
    fn render(&mut self, target: &mut RenderTarget, properties: &LayerPropertyGroup) -> Result<()> {
        let start = properties.color("StartColor").unwrap_or(Color::BLACK);
        let end = properties.color("EndColor").unwrap_or(Color::WHITE);
        target.paint(|rect, bounds| start.lerp(end, horizontal_fraction(rect, bounds)));
        Ok(())
    }
}

/// Cycles through the hue wheel over time.
#[derive(Debug, Default)]
pub struct RainbowBrush {
    phase: f64,
}

impl RainbowBrush {
    pub fn schema() -> GroupSchema {
        GroupSchema::build("Rainbow", |b| {
            b.float("Speed", 60.0)
                .range(-720.0, 720.0)
                .description("Degrees of hue per second");
            b.float("Scale", 1.0)
                .range(0.0, 10.0)
                .description("Hue cycles across the layer width");
        })
    }
}

impl LayerBrush for RainbowBrush {
    fn update(&mut self, ctx: &FrameContext<'_>, properties: &LayerPropertyGroup) {
        let speed = properties.float("Speed").unwrap_or(60.0);
        self.phase = (self.phase + ctx.delta.as_secs_f64() * speed).rem_euclid(360.0);
    }

    fn render(&mut self, target: &mut RenderTarget, properties: &LayerPropertyGroup) -> Result<()> {
        let scale = properties.float("Scale").unwrap_or(1.0);
        let phase = self.phase;
        target.paint(|rect, bounds| {
            Color::from_hsv(phase + horizontal_fraction(rect, bounds) * 360.0 * scale, 1.0, 1.0)
        });
        Ok(())
    }
}

pub struct DimEffect;

impl DimEffect {
    pub fn schema() -> GroupSchema {
        GroupSchema::build("Dim", |b| {
            b.float("Brightness", 50.0).range(0.0, 100.0);
        })
    }
}

impl LayerEffect for DimEffect {
    fn post_process(&mut self, target: &mut RenderTarget, properties: &LayerPropertyGroup) -> Result<()> {
        let factor = properties.float("Brightness").unwrap_or(100.0) / 100.0;
        for pixel in target.pixels_mut() {
            *pixel = pixel.scale(factor);
        }
        Ok(())
    }
}

pub struct InvertEffect;

impl LayerEffect for InvertEffect {
    fn post_process(&mut self, target: &mut RenderTarget, _properties: &LayerPropertyGroup) -> Result<()> {
        for pixel in target.pixels_mut() {
            *pixel = pixel.invert();
        }
        Ok(())
    }
}

/// Cuts a vertical band out of the element's shape. `Start` and `End` are
/// percentages of the element's width.
pub struct MaskEffect;

impl MaskEffect {
    pub fn schema() -> GroupSchema {
        GroupSchema::build("Mask", |b| {
            b.float("Start", 0.0).range(0.0, 100.0);
            b.float("End", 50.0).range(0.0, 100.0);
        })
    }
}

impl LayerEffect for MaskEffect {
    fn clip(&self, shape: &ElementShape, properties: &LayerPropertyGroup, excluded: &mut ClipRegion) {
        let start = properties.float("Start").unwrap_or(0.0) / 100.0;
        let end = properties.float("End").unwrap_or(0.0) / 100.0;
        for led in &shape.leds {
            let at = horizontal_fraction(led.rect, shape.bounds);
            // A full-width range reaches the right edge.
            if at >= start && (at < end || (end >= 1.0 && at <= end)) {
                excluded.insert(led.key.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{demo_led_strip, LedKey, LedRef};
    use crate::property::PropertyValue;
    use crate::render::GraphicsContext;

    fn strip() -> (Vec<LedRef>, Rect) {
        let leds: Vec<LedRef> = demo_led_strip("strip", 4).led_refs().collect();
        let bounds = leds
            .iter()
            .map(|led| led.rect)
            .reduce(|a, b| a.union(b))
            .unwrap();
        (leds, bounds)
    }

    #[test]
    fn gradient_runs_from_start_to_end_colour() {
        let (leds, bounds) = strip();
        let mut target = RenderTarget::new(&GraphicsContext::new("test"), bounds, &leds);
        let properties =
            LayerPropertyGroup::from_schema("LayerBrush.Gradient.", &GradientBrush::schema(), &[]).unwrap();
        GradientBrush.render(&mut target, &properties).unwrap();

        let pixels = target.pixels();
        assert!(pixels[0].r > pixels[3].r);
        assert!(pixels[0].b < pixels[3].b);
    }

    #[test]
    fn dim_scales_brightness() {
        let (leds, bounds) = strip();
        let mut target = RenderTarget::new(&GraphicsContext::new("test"), bounds, &leds);
        target.paint(|_, _| Color::rgb(200, 100, 50));
        let properties =
            LayerPropertyGroup::from_schema("LayerEffect.x.Dim.", &DimEffect::schema(), &[]).unwrap();
        DimEffect.post_process(&mut target, &properties).unwrap();
        assert_eq!(target.pixels()[0], Color::rgb(100, 50, 25));
    }

    #[test]
    fn mask_excludes_left_half() {
        let (leds, bounds) = strip();
        let shape = ElementShape { bounds, leds };
        let properties =
            LayerPropertyGroup::from_schema("LayerEffect.x.Mask.", &MaskEffect::schema(), &[]).unwrap();
        let mut excluded = ClipRegion::new();
        MaskEffect.clip(&shape, &properties, &mut excluded);

        assert_eq!(excluded.len(), 2);
        assert!(excluded.contains(&LedKey::new("strip", "LedStripe1")));
        assert!(excluded.contains(&LedKey::new("strip", "LedStripe2")));
    }

    #[test]
    fn mask_to_full_width_covers_right_edge() {
        let (leds, bounds) = strip();
        let right = leds[3].rect.center().x;
        let shape = ElementShape {
            bounds: Rect::new(bounds.x0, bounds.y0, right, bounds.y1),
            leds,
        };
        let mut properties =
            LayerPropertyGroup::from_schema("LayerEffect.x.Mask.", &MaskEffect::schema(), &[]).unwrap();
        properties.set_base_value("Start", PropertyValue::Float(50.0)).unwrap();
        properties.set_base_value("End", PropertyValue::Float(100.0)).unwrap();
        let mut excluded = ClipRegion::new();
        MaskEffect.clip(&shape, &properties, &mut excluded);

        assert!(excluded.contains(&LedKey::new("strip", "LedStripe4")));
        assert!(!excluded.contains(&LedKey::new("strip", "LedStripe1")));
    }
}
