use kurbo::Rect;

use super::{Device, DeviceCategory, DeviceType};

/// Size of one key in surface units.
const KEY: f64 = 19.0;

fn key_rect(x: f64, y: f64) -> Rect {
    Rect::new(x * KEY, y * KEY, (x + 1.0) * KEY, (y + 1.0) * KEY)
}

/// A compact keyboard layout with one LED per key group the engine knows about.
///
/// With `azerty` the top letter row reads A Z E R and the home row Q S D F,
/// matching a French physical layout.
pub fn demo_keyboard(id: &str, azerty: bool) -> Device {
    let (top, home) = if azerty {
        (["A", "Z", "E", "R"], ["Q", "S", "D", "F"])
    } else {
        (["Q", "W", "E", "R"], ["A", "S", "D", "F"])
    };

    let mut keys: Vec<(String, f64, f64)> = vec![("Keyboard_Escape".into(), 0.0, 0.0)];
    keys.extend((1..=4).map(|n| (format!("Keyboard_F{n}"), 1.0 + n as f64, 0.0)));
    keys.push(("Keyboard_MediaPlay".into(), 10.0, 0.0));
    keys.push(("Keyboard_MediaStop".into(), 11.0, 0.0));
    keys.push(("Keyboard_Custom1".into(), 12.0, 0.0));
    keys.extend((1..=5).map(|n| (format!("Keyboard_{n}"), n as f64, 1.0)));
    keys.push(("Keyboard_Tab".into(), 0.0, 2.0));
    keys.extend(
        top.iter()
            .enumerate()
            .map(|(i, k)| (format!("Keyboard_{k}"), 1.5 + i as f64, 2.0)),
    );
    keys.push(("Keyboard_CapsLock".into(), 0.0, 3.0));
    keys.extend(
        home.iter()
            .enumerate()
            .map(|(i, k)| (format!("Keyboard_{k}"), 1.75 + i as f64, 3.0)),
    );
    keys.push(("Keyboard_ArrowUp".into(), 7.0, 3.0));
    keys.push(("Keyboard_ArrowLeft".into(), 6.0, 4.0));
    keys.push(("Keyboard_ArrowDown".into(), 7.0, 4.0));
    keys.push(("Keyboard_ArrowRight".into(), 8.0, 4.0));
    keys.push(("Keyboard_NumLock".into(), 10.0, 1.0));
    keys.push(("Keyboard_Num7".into(), 10.0, 2.0));
    keys.push(("Keyboard_Num8".into(), 11.0, 2.0));
    keys.push(("Keyboard_Programmable1".into(), 0.0, 5.0));
    keys.push(("Keyboard_Programmable2".into(), 1.0, 5.0));
    keys.extend((1..=3).map(|n| (format!("LedStripe{n}"), 3.0 + n as f64, 6.0)));

    keys.into_iter().fold(
        Device::new(id, "Demo keyboard", DeviceType::Keyboard)
            .with_category(DeviceCategory::Desktop)
            .with_category(DeviceCategory::Peripherals),
        |device, (name, x, y)| device.with_led(name, key_rect(x, y)),
    )
}

pub fn demo_mouse(id: &str) -> Device {
    Device::new(id, "Demo mouse", DeviceType::Mouse)
        .with_category(DeviceCategory::Peripherals)
        .with_led("Mouse1", key_rect(14.0, 3.0))
        .with_led("Mouse2", key_rect(14.0, 4.0))
}

/// A straight strip of `count` LEDs running left to right below the keyboard.
pub fn demo_led_strip(id: &str, count: usize) -> Device {
    (0..count).fold(
        Device::new(id, "Demo LED strip", DeviceType::LedStrip).with_category(DeviceCategory::Case),
        |device, n| device.with_led(format!("LedStripe{}", n + 1), key_rect(n as f64, 8.0)),
    )
}
