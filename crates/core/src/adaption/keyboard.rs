use serde::{Deserialize, Serialize};

use crate::device::{Device, DeviceType, Led};

/// Logical region of a keyboard, independent of vendor layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyboardSection {
    MacroKeys,
    LedStrips,
    Extra,
    /// WASD, or ZQSD on an AZERTY keyboard.
    Movement,
    FunctionKeys,
    NumberKeys,
    NumPad,
    ArrowKeys,
    MediaKeys,
}

const QWERTY_MOVEMENT: [&str; 4] = ["Keyboard_W", "Keyboard_A", "Keyboard_S", "Keyboard_D"];
const AZERTY_MOVEMENT: [&str; 4] = ["Keyboard_Z", "Keyboard_Q", "Keyboard_S", "Keyboard_D"];
const ARROWS: [&str; 4] = [
    "Keyboard_ArrowUp",
    "Keyboard_ArrowLeft",
    "Keyboard_ArrowDown",
    "Keyboard_ArrowRight",
];

impl KeyboardSection {
    /// LEDs of `device` that belong to this section. Non-keyboards have none.
    pub fn leds<'a>(self, device: &'a Device) -> Vec<&'a Led> {
        if device.device_type != DeviceType::Keyboard {
            return Vec::new();
        }
        match self {
            Self::Movement => {
                let keys = if is_azerty(device) {
                    AZERTY_MOVEMENT
                } else {
                    QWERTY_MOVEMENT
                };
                keys.iter().filter_map(|name| device.led(name)).collect()
            }
            Self::ArrowKeys => ARROWS.iter().filter_map(|name| device.led(name)).collect(),
            _ => device
                .leds
                .iter()
                .filter(|led| self.matches_name(led.id.as_str()))
                .collect(),
        }
    }

    fn matches_name(self, name: &str) -> bool {
        let key = name.strip_prefix("Keyboard_");
        match self {
            Self::MacroKeys => key.is_some_and(|k| k.starts_with("Programmable") || k.starts_with("Macro")),
            Self::LedStrips => name.starts_with("LedStripe"),
            Self::Extra => key.is_some_and(|k| k.starts_with("Custom")),
            Self::FunctionKeys => key
                .and_then(|k| k.strip_prefix('F'))
                .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit())),
            Self::NumberKeys => key.is_some_and(|k| k.len() == 1 && k.chars().all(|c| c.is_ascii_digit())),
            Self::NumPad => key.is_some_and(|k| k.starts_with("Num")),
            Self::MediaKeys => key.is_some_and(|k| k.starts_with("Media")),
            Self::Movement | Self::ArrowKeys => false,
        }
    }
}

/// On AZERTY boards the key labelled A sits on the upper row, left of Q.
fn is_azerty(device: &Device) -> bool {
    match (device.led("Keyboard_A"), device.led("Keyboard_Q")) {
        (Some(a), Some(q)) => a.rect.center().x < q.rect.center().x,
        _ => false,
    }
}
