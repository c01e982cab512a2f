//! Devices and LEDs as seen by the engine.
//!
//! Concrete vendor integrations live outside this crate and plug in through
//! [`DeviceProvider`]. The engine only needs each device's LED layout and a
//! way to push a finished frame to it.

mod layouts;
mod manager;

use std::fmt;
use std::sync::Arc;

use kurbo::Rect;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{Color, LightweaveError, Result};

pub use layouts::{demo_keyboard, demo_led_strip, demo_mouse};
pub(crate) use manager::ChangingGuard;
pub use manager::DeviceManager;

/// Stable identifier of a physical device, unchanged across sessions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of an LED within its device, such as `Keyboard_W`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedId(pub String);

impl LedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Globally unique address of one LED. This is also its persisted form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LedKey {
    pub device: DeviceId,
    pub led: LedId,
}

impl LedKey {
    pub fn new(device: impl Into<String>, led: impl Into<String>) -> Self {
        Self {
            device: DeviceId::new(device),
            led: LedId::new(led),
        }
    }
}

/// An LED resolved against a concrete device, carrying its absolute rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct LedRef {
    pub key: LedKey,
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    Keyboard,
    Mouse,
    Headset,
    Mousepad,
    LedStrip,
    Speaker,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeviceCategory {
    Desktop,
    Monitor,
    Case,
    Room,
    Peripherals,
}

impl DeviceCategory {
    pub const ALL: [DeviceCategory; 5] = [
        Self::Desktop,
        Self::Monitor,
        Self::Case,
        Self::Room,
        Self::Peripherals,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub struct Led {
    pub id: LedId,
    /// Position in the shared surface coordinate space.
    pub rect: Rect,
}

/// Layout of a physical device: its identity and ordered LEDs.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
    pub categories: Vec<DeviceCategory>,
    pub leds: Vec<Led>,
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            id: DeviceId::new(id),
            name: name.into(),
            device_type,
            categories: Vec::new(),
            leds: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: DeviceCategory) -> Self {
        if !self.categories.contains(&category) {
            self.categories.push(category);
        }
        self
    }

    pub fn with_led(mut self, id: impl Into<String>, rect: Rect) -> Self {
        self.leds.push(Led {
            id: LedId::new(id),
            rect,
        });
        self
    }

    pub fn led(&self, id: &str) -> Option<&Led> {
        self.leds.iter().find(|led| led.id.as_str() == id)
    }

    pub fn key(&self, led: &Led) -> LedKey {
        LedKey {
            device: self.id.clone(),
            led: led.id.clone(),
        }
    }

    pub fn led_ref(&self, led: &Led) -> LedRef {
        LedRef {
            key: self.key(led),
            rect: led.rect,
        }
    }

    pub fn led_refs(&self) -> impl Iterator<Item = LedRef> + '_ {
        self.leds.iter().map(|led| self.led_ref(led))
    }

    pub fn has_category(&self, category: DeviceCategory) -> bool {
        self.categories.contains(&category)
    }
}

/// One frame of colours for a device, in the order of its LED list.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceBuffer {
    pub device: DeviceId,
    pub colors: Vec<Color>,
}

impl DeviceBuffer {
    pub fn new(device: &Device) -> Self {
        Self {
            device: device.id.clone(),
            colors: vec![Color::BLACK; device.leds.len()],
        }
    }
}

/// Adapter between the engine and a physical device.
///
/// Implementations wrap vendor SDKs. The loop pushes a finished buffer to
/// every usable provider once per tick; providers never pull.
pub trait DeviceProvider: Send {
    fn device(&self) -> &Device;

    /// Prepares the device for output. May fail transiently.
    fn enable(&mut self) -> Result<()>;

    /// Whether the device currently accepts frames. A device that was never
    /// enabled is not usable.
    fn is_usable(&self) -> bool;

    fn flush(&mut self, buffer: &DeviceBuffer) -> Result<()>;
}

/// Frames received by a [`SimulatedDevice`].
#[derive(Debug, Clone, Default)]
pub struct FrameLog {
    pub flushes: u64,
    pub last: Option<DeviceBuffer>,
}

/// In-memory device that records what it is sent.
pub struct SimulatedDevice {
    device: Device,
    usable: bool,
    enabled: bool,
    failing_enables: u32,
    frames: Arc<Mutex<FrameLog>>,
}

impl SimulatedDevice {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            usable: true,
            enabled: false,
            failing_enables: 0,
            frames: Arc::new(Mutex::new(FrameLog::default())),
        }
    }

    /// Makes the first `count` enable attempts fail.
    pub fn failing_enables(mut self, count: u32) -> Self {
        self.failing_enables = count;
        self
    }

    pub fn unusable(mut self) -> Self {
        self.usable = false;
        self
    }

    /// Shared view of the frames this device receives.
    pub fn frame_log(&self) -> Arc<Mutex<FrameLog>> {
        Arc::clone(&self.frames)
    }
}

impl DeviceProvider for SimulatedDevice {
    fn device(&self) -> &Device {
        &self.device
    }

    fn enable(&mut self) -> Result<()> {
        if self.failing_enables > 0 {
            self.failing_enables -= 1;
            return Err(LightweaveError::DeviceUnavailable(self.device.id.to_string()));
        }
        self.enabled = true;
        Ok(())
    }

    fn is_usable(&self) -> bool {
        self.usable && self.enabled
    }

    fn flush(&mut self, buffer: &DeviceBuffer) -> Result<()> {
        let mut frames = self.frames.lock();
        frames.flushes += 1;
        frames.last = Some(buffer.clone());
        Ok(())
    }
}

impl fmt::Debug for SimulatedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedDevice")
            .field("device", &self.device.id)
            .field("usable", &self.usable)
            .field("enabled", &self.enabled)
            .finish()
    }
}
