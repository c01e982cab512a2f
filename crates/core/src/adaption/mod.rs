//! Maps a layer's logical LED selection onto whatever devices are present.

mod keyboard;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::device::{Device, DeviceCategory, DeviceType, LedKey, LedRef};

pub use keyboard::KeyboardSection;

/// Declarative rule selecting LEDs on a device set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AdaptionHint {
    /// Every LED of devices of the given type, skipping the first `skip`
    /// matching devices and taking at most `limit`.
    DeviceType {
        device_type: DeviceType,
        #[serde(default)]
        skip: usize,
        #[serde(default)]
        limit: Option<usize>,
    },
    /// Every LED of devices in the given category.
    Category {
        category: DeviceCategory,
        #[serde(default)]
        skip: usize,
        #[serde(default)]
        limit: Option<usize>,
    },
    /// A logical section on every keyboard.
    KeyboardSection { section: KeyboardSection },
}

impl AdaptionHint {
    pub fn device_type(device_type: DeviceType) -> Self {
        Self::DeviceType {
            device_type,
            skip: 0,
            limit: None,
        }
    }

    pub fn category(category: DeviceCategory) -> Self {
        Self::Category {
            category,
            skip: 0,
            limit: None,
        }
    }

    /// Adds the LEDs this hint selects to `leds`, skipping any already in `assigned`.
    pub fn apply(&self, devices: &[Device], leds: &mut Vec<LedRef>, assigned: &mut HashSet<LedKey>) {
        let mut take = |led: LedRef| {
            if assigned.insert(led.key.clone()) {
                leds.push(led);
            }
        };

        match self {
            Self::DeviceType {
                device_type,
                skip,
                limit,
            } => {
                let selected = devices.iter().filter(|d| d.device_type == *device_type);
                for device in selected.skip(*skip).take(limit.unwrap_or(usize::MAX)) {
                    device.led_refs().for_each(&mut take);
                }
            }
            Self::Category {
                category,
                skip,
                limit,
            } => {
                let selected = devices.iter().filter(|d| d.has_category(*category));
                for device in selected.skip(*skip).take(limit.unwrap_or(usize::MAX)) {
                    device.led_refs().for_each(&mut take);
                }
            }
            Self::KeyboardSection { section } => {
                for device in devices {
                    for led in section.leds(device) {
                        take(device.led_ref(led));
                    }
                }
            }
        }
    }

    fn covers_same_target(&self, other: &AdaptionHint) -> bool {
        match (self, other) {
            (Self::DeviceType { device_type: a, .. }, Self::DeviceType { device_type: b, .. }) => a == b,
            (Self::Category { category: a, .. }, Self::Category { category: b, .. }) => a == b,
            (a, b) => a == b,
        }
    }
}

/// A layer's adaption hints plus the logic to resolve them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerAdapter {
    pub hints: Vec<AdaptionHint>,
}

impl LayerAdapter {
    pub fn new(hints: Vec<AdaptionHint>) -> Self {
        Self { hints }
    }

    /// Resolves the layer's LEDs against `devices`.
    ///
    /// With hints, each hint is applied in order. Without hints the stored
    /// references are matched directly, each physical LED at most once.
    pub fn adapt(&self, stored: &[LedKey], devices: &[Device]) -> Vec<LedRef> {
        let mut leds = Vec::new();
        let mut assigned = HashSet::new();

        if !self.hints.is_empty() {
            for hint in &self.hints {
                hint.apply(devices, &mut leds, &mut assigned);
            }
            return leds;
        }

        let mut pool: Vec<LedRef> = devices.iter().flat_map(Device::led_refs).collect();
        for key in stored {
            if let Some(index) = pool.iter().position(|candidate| &candidate.key == key) {
                leds.push(pool.swap_remove(index));
            }
        }
        leds
    }

    /// Synthesises hints for devices and categories the layer fully covers.
    ///
    /// Returns only hints that did not exist before; they are also appended
    /// to [`hints`](Self::hints).
    pub fn determine_hints(&mut self, assigned: &[LedRef], devices: &[Device]) -> Vec<AdaptionHint> {
        let keys: HashSet<&LedKey> = assigned.iter().map(|led| &led.key).collect();
        let covered = |device: &Device| {
            !device.leds.is_empty() && device.leds.iter().all(|led| keys.contains(&device.key(led)))
        };

        let mut candidates = Vec::new();
        for device in devices.iter().filter(|d| covered(d)) {
            candidates.push(AdaptionHint::device_type(device.device_type));
        }
        for category in DeviceCategory::ALL {
            let mut members = devices.iter().filter(|d| d.has_category(category)).peekable();
            if members.peek().is_some() && members.all(|d| covered(d)) {
                candidates.push(AdaptionHint::category(category));
            }
        }

        let mut created = Vec::new();
        for hint in candidates {
            if self.hints.iter().any(|existing| existing.covers_same_target(&hint)) {
                continue;
            }
            self.hints.push(hint.clone());
            created.push(hint);
        }
        created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{demo_keyboard, demo_led_strip, demo_mouse};

    fn devices() -> Vec<Device> {
        vec![
            demo_keyboard("kb", false),
            demo_mouse("mouse-1"),
            demo_mouse("mouse-2"),
            demo_led_strip("strip", 4),
        ]
    }

    fn keys(leds: &[LedRef]) -> Vec<LedKey> {
        leds.iter().map(|led| led.key.clone()).collect()
    }

    #[test]
    fn adapt_is_idempotent() {
        let adapter = LayerAdapter::new(vec![
            AdaptionHint::device_type(DeviceType::Mouse),
            AdaptionHint::device_type(DeviceType::Mouse),
            AdaptionHint::KeyboardSection {
                section: KeyboardSection::ArrowKeys,
            },
        ]);
        let devices = devices();

        let once = adapter.adapt(&[], &devices);
        let twice = adapter.adapt(&[], &devices);
        assert_eq!(keys(&once), keys(&twice));
        assert_eq!(once.len(), 4 + 4);
    }

    #[test]
    fn skip_and_limit_select_devices_in_order() {
        let adapter = LayerAdapter::new(vec![AdaptionHint::DeviceType {
            device_type: DeviceType::Mouse,
            skip: 1,
            limit: Some(1),
        }]);
        let leds = adapter.adapt(&[], &devices());
        assert!(leds.iter().all(|led| led.key.device.0 == "mouse-2"));
        assert_eq!(leds.len(), 2);
    }

    #[test]
    fn direct_matching_assigns_each_led_once() {
        let stored = vec![
            LedKey::new("mouse-1", "Mouse1"),
            LedKey::new("mouse-1", "Mouse1"),
            LedKey::new("gone", "Mouse1"),
            LedKey::new("kb", "Keyboard_W"),
        ];
        let leds = LayerAdapter::default().adapt(&stored, &devices());
        assert_eq!(
            keys(&leds),
            vec![LedKey::new("mouse-1", "Mouse1"), LedKey::new("kb", "Keyboard_W")]
        );
    }

    #[test]
    fn determine_hints_reports_only_new_hints() {
        let devices = devices();
        let assigned: Vec<LedRef> = devices[1]
            .led_refs()
            .chain(devices[2].led_refs())
            .chain(devices[3].led_refs())
            .collect();

        let mut adapter = LayerAdapter::default();
        let created = adapter.determine_hints(&assigned, &devices);
        assert_eq!(
            created,
            vec![
                AdaptionHint::device_type(DeviceType::Mouse),
                AdaptionHint::device_type(DeviceType::LedStrip),
                AdaptionHint::category(DeviceCategory::Case),
            ]
        );
        assert!(adapter.determine_hints(&assigned, &devices).is_empty());
        assert_eq!(adapter.hints.len(), 3);
    }
}
