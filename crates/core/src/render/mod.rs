//! Offscreen targets, clip regions and the device surface.

mod compositor;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;

use kurbo::Rect;
use uuid::Uuid;

use crate::device::{Device, DeviceBuffer, DeviceId, LedKey, LedRef};
use crate::property::DataModel;
use crate::{BlendMode, Color};

pub use compositor::{compose_clip, ElementShape, RenderStats, Renderer};

/// Per-tick inputs shared by everything that updates during a frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    /// Time since the previous tick.
    pub delta: Duration,
    /// Time since the loop started.
    pub elapsed: Duration,
    pub data: &'a DataModel,
}

impl<'a> FrameContext<'a> {
    pub fn new(delta: Duration, elapsed: Duration, data: &'a DataModel) -> Self {
        Self {
            delta,
            elapsed,
            data,
        }
    }
}

/// Identity of the drawing backend. Render targets created under one context
/// are never reused under another.
#[derive(Clone, PartialEq, Eq)]
pub struct GraphicsContext {
    id: Uuid,
    label: String,
}

impl GraphicsContext {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for GraphicsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GraphicsContext({} {})", self.label, self.id)
    }
}

/// Anything a rendered element can be composited onto.
pub trait Canvas {
    fn blend(&mut self, key: &LedKey, color: Color, mode: BlendMode);
}

/// Set of LEDs an element may draw to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipRegion {
    leds: BTreeSet<LedKey>,
}

impl ClipRegion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &LedKey) -> bool {
        self.leds.contains(key)
    }

    pub fn insert(&mut self, key: LedKey) -> bool {
        self.leds.insert(key)
    }

    pub fn is_empty(&self) -> bool {
        self.leds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.leds.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedKey> {
        self.leds.iter()
    }

    pub fn union_with(&mut self, other: &ClipRegion) {
        self.leds.extend(other.leds.iter().cloned());
    }

    pub fn intersect_with(&mut self, other: &ClipRegion) {
        self.leds.retain(|key| other.contains(key));
    }

    pub fn subtract(&mut self, other: &ClipRegion) {
        self.leds.retain(|key| !other.contains(key));
    }
}

impl FromIterator<LedKey> for ClipRegion {
    fn from_iter<I: IntoIterator<Item = LedKey>>(iter: I) -> Self {
        Self {
            leds: iter.into_iter().collect(),
        }
    }
}

/// Offscreen pixel buffer for one element, one colour per LED it covers.
pub struct RenderTarget {
    context: Uuid,
    bounds: Rect,
    leds: Vec<LedKey>,
    rects: Vec<Rect>,
    index: HashMap<LedKey, usize>,
    pixels: Vec<Color>,
}

impl RenderTarget {
    pub fn new(context: &GraphicsContext, bounds: Rect, leds: &[LedRef]) -> Self {
        Self {
            context: context.id(),
            bounds,
            leds: leds.iter().map(|led| led.key.clone()).collect(),
            rects: leds.iter().map(|led| led.rect).collect(),
            index: leds
                .iter()
                .enumerate()
                .map(|(i, led)| (led.key.clone(), i))
                .collect(),
            pixels: vec![Color::TRANSPARENT; leds.len()],
        }
    }

    /// Whether this target can serve an element with the given shape.
    pub fn is_valid_for(&self, context: &GraphicsContext, bounds: Rect, leds: &[LedRef]) -> bool {
        self.context == context.id()
            && self.bounds == bounds
            && self.leds.len() == leds.len()
            && self.leds.iter().zip(leds).all(|(a, b)| a == &b.key)
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn clear(&mut self) {
        self.pixels.fill(Color::TRANSPARENT);
    }

    pub fn get(&self, key: &LedKey) -> Option<Color> {
        self.index.get(key).map(|&i| self.pixels[i])
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Color] {
        &mut self.pixels
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LedKey, Color)> + '_ {
        self.leds.iter().zip(self.pixels.iter().copied())
    }

    /// Sets every pixel from its LED's rectangle and the target bounds.
    pub fn paint(&mut self, mut shader: impl FnMut(Rect, Rect) -> Color) {
        let bounds = self.bounds;
        for (pixel, rect) in self.pixels.iter_mut().zip(&self.rects) {
            *pixel = shader(*rect, bounds);
        }
    }

    /// Clears every pixel outside `clip`.
    pub fn apply_clip(&mut self, clip: &ClipRegion) {
        for (pixel, key) in self.pixels.iter_mut().zip(&self.leds) {
            if !clip.contains(key) {
                *pixel = Color::TRANSPARENT;
            }
        }
    }
}

impl Canvas for RenderTarget {
    fn blend(&mut self, key: &LedKey, color: Color, mode: BlendMode) {
        if let Some(&i) = self.index.get(key) {
            self.pixels[i] = self.pixels[i].composite(color, mode);
        }
    }
}

impl fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTarget")
            .field("bounds", &self.bounds)
            .field("leds", &self.leds.len())
            .finish()
    }
}

/// Final composition surface: one buffer per device in the current layout.
#[derive(Debug, Default)]
pub struct Surface {
    devices: Vec<Device>,
    buffers: Vec<DeviceBuffer>,
    index: HashMap<LedKey, (usize, usize)>,
    layout_version: u64,
}

impl Surface {
    pub fn new(devices: Vec<Device>) -> Self {
        let mut surface = Self::default();
        surface.rebuild(devices, 0);
        surface
    }

    pub fn rebuild(&mut self, devices: Vec<Device>, layout_version: u64) {
        self.index.clear();
        for (d, device) in devices.iter().enumerate() {
            for (l, led) in device.leds.iter().enumerate() {
                self.index.insert(device.key(led), (d, l));
            }
        }
        self.buffers = devices.iter().map(DeviceBuffer::new).collect();
        self.devices = devices;
        self.layout_version = layout_version;
    }

    pub fn layout_version(&self) -> u64 {
        self.layout_version
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn clear(&mut self, color: Color) {
        for buffer in &mut self.buffers {
            buffer.colors.fill(color);
        }
    }

    pub fn color(&self, key: &LedKey) -> Option<Color> {
        self.index
            .get(key)
            .map(|&(d, l)| self.buffers[d].colors[l])
    }

    pub fn buffer(&self, device: &DeviceId) -> Option<&DeviceBuffer> {
        self.buffers.iter().find(|buffer| &buffer.device == device)
    }

    pub fn buffers(&self) -> &[DeviceBuffer] {
        &self.buffers
    }
}

impl Canvas for Surface {
    fn blend(&mut self, key: &LedKey, color: Color, mode: BlendMode) {
        if let Some(&(d, l)) = self.index.get(key) {
            let pixel = &mut self.buffers[d].colors[l];
            *pixel = pixel.composite(color, mode);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::demo_mouse;

    #[test]
    fn target_reuse_depends_on_context_and_bounds() {
        let device = demo_mouse("m");
        let leds: Vec<LedRef> = device.led_refs().collect();
        let bounds = Rect::new(0.0, 0.0, 10.0, 10.0);
        let context = GraphicsContext::new("test");
        let target = RenderTarget::new(&context, bounds, &leds);

        assert!(target.is_valid_for(&context, bounds, &leds));
        assert!(!target.is_valid_for(&GraphicsContext::new("other"), bounds, &leds));
        assert!(!target.is_valid_for(&context, Rect::new(0.0, 0.0, 5.0, 5.0), &leds));
        assert!(!target.is_valid_for(&context, bounds, &leds[..1]));
    }

    #[test]
    fn clip_clears_pixels_outside_region() {
        let device = demo_mouse("m");
        let leds: Vec<LedRef> = device.led_refs().collect();
        let mut target = RenderTarget::new(&GraphicsContext::new("test"), Rect::ZERO, &leds);
        target.paint(|_, _| Color::WHITE);

        let clip: ClipRegion = [LedKey::new("m", "Mouse2")].into_iter().collect();
        target.apply_clip(&clip);
        assert_eq!(target.get(&LedKey::new("m", "Mouse1")), Some(Color::TRANSPARENT));
        assert_eq!(target.get(&LedKey::new("m", "Mouse2")), Some(Color::WHITE));
    }

    #[test]
    fn surface_blends_into_device_buffers() {
        let mut surface = Surface::new(vec![demo_mouse("m")]);
        surface.clear(Color::BLACK);
        surface.blend(&LedKey::new("m", "Mouse2"), Color::rgb(10, 20, 30), BlendMode::Normal);
        surface.blend(&LedKey::new("elsewhere", "Mouse2"), Color::WHITE, BlendMode::Normal);

        let buffer = surface.buffer(&DeviceId::new("m")).unwrap();
        assert_eq!(buffer.colors, vec![Color::BLACK, Color::rgb(10, 20, 30)]);
    }

    #[test]
    fn region_algebra() {
        let a: ClipRegion = [LedKey::new("d", "1"), LedKey::new("d", "2")].into_iter().collect();
        let b: ClipRegion = [LedKey::new("d", "2"), LedKey::new("d", "3")].into_iter().collect();

        let mut union = a.clone();
        union.union_with(&b);
        assert_eq!(union.len(), 3);

        let mut meet = a.clone();
        meet.intersect_with(&b);
        assert_eq!(meet.iter().collect::<Vec<_>>(), vec![&LedKey::new("d", "2")]);

        let mut rest = a;
        rest.subtract(&b);
        assert_eq!(rest.iter().collect::<Vec<_>>(), vec![&LedKey::new("d", "1")]);
    }
}
