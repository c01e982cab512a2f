use std::ops;

use serde::{Deserialize, Serialize};

/// RGBA colour with 8-bit channels. Alpha is only meaningful while compositing;
/// devices receive the colour channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };
    pub const TRANSPARENT: Color = Color { r: 0, g: 0, b: 0, a: 0 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create from HSV (hue 0-360, saturation 0-1, value 0-1).
    pub fn from_hsv(h: f64, s: f64, v: f64) -> Self {
        let h = h.rem_euclid(360.0);
        let c = v * s;
        let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
        let m = v - c;

        let (r1, g1, b1) = match h as u16 {
            0..=59 => (c, x, 0.0),
            60..=119 => (x, c, 0.0),
            120..=179 => (0.0, c, x),
            180..=239 => (0.0, x, c),
            240..=299 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        Self::rgb(
            ((r1 + m) * 255.0).round() as u8,
            ((g1 + m) * 255.0).round() as u8,
            ((b1 + m) * 255.0).round() as u8,
        )
    }

    /// Linear interpolation between two colours. `t` is clamped to [0, 1].
    pub fn lerp(self, other: Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
        Self {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }

    /// Scale the alpha channel by a factor (0.0 - 1.0).
    pub fn fade(self, factor: f64) -> Self {
        Self {
            a: (f64::from(self.a) * factor.clamp(0.0, 1.0)).round() as u8,
            ..self
        }
    }

    /// Scale brightness by a factor (0.0 - 1.0).
    pub fn scale(self, factor: f64) -> Self {
        let f = factor.clamp(0.0, 1.0);
        Self {
            r: (f64::from(self.r) * f).round() as u8,
            g: (f64::from(self.g) * f).round() as u8,
            b: (f64::from(self.b) * f).round() as u8,
            a: self.a,
        }
    }

    pub fn invert(self) -> Self {
        Self {
            r: 255 - self.r,
            g: 255 - self.g,
            b: 255 - self.b,
            a: self.a,
        }
    }

    /// Multiplicative blend (0-255 scale).
    pub fn multiply(self, other: Self) -> Self {
        Self {
            r: ((u16::from(self.r) * u16::from(other.r)) / 255) as u8,
            g: ((u16::from(self.g) * u16::from(other.g)) / 255) as u8,
            b: ((u16::from(self.b) * u16::from(other.b)) / 255) as u8,
            a: 255,
        }
    }

    /// Screen blend: complement of multiply.
    pub fn screen(self, other: Self) -> Self {
        let channel = |a: u8, b: u8| 255 - (((255 - u16::from(a)) * (255 - u16::from(b))) / 255) as u8;
        Self {
            r: channel(self.r, other.r),
            g: channel(self.g, other.g),
            b: channel(self.b, other.b),
            a: 255,
        }
    }

    /// Composite `fg` onto `self` (the background) using the given blend mode,
    /// weighted by the foreground alpha.
    pub fn composite(self, fg: Self, mode: BlendMode) -> Self {
        if fg.a == 0 {
            return self;
        }
        let opaque = Self { a: 255, ..fg };
        let mixed = match mode {
            BlendMode::Normal => opaque,
            BlendMode::Add => self + opaque,
            BlendMode::Multiply => self.multiply(opaque),
            BlendMode::Screen => self.screen(opaque),
        };
        let mut out = self.lerp(mixed, f64::from(fg.a) / 255.0);
        out.a = self.a.max(fg.a);
        out
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Additive blend, clamped at 255 per channel.
impl ops::Add for Color {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            r: self.r.saturating_add(other.r),
            g: self.g.saturating_add(other.g),
            b: self.b.saturating_add(other.b),
            a: 255,
        }
    }
}

/// How a layer's pixels combine with what is already below it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Add,
    Multiply,
    Screen,
}

impl BlendMode {
    pub const ALL: [BlendMode; 4] = [Self::Normal, Self::Add, Self::Multiply, Self::Screen];

    /// Maps the index stored in a choice property back to a blend mode.
    pub fn from_index(index: u32) -> Self {
        Self::ALL
            .get(index as usize)
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_hits_midpoint() {
        let mid = Color::BLACK.lerp(Color::WHITE, 0.5);
        assert_eq!(mid, Color::rgb(128, 128, 128));
    }

    #[test]
    fn transparent_foreground_leaves_background() {
        let bg = Color::rgb(10, 20, 30);
        assert_eq!(bg.composite(Color::TRANSPARENT, BlendMode::Add), bg);
    }

    #[test]
    fn normal_blend_respects_alpha() {
        let fg = Color::rgb(200, 0, 0).fade(0.5);
        let out = Color::BLACK.composite(fg, BlendMode::Normal);
        assert_eq!(out.r, 100);
        assert_eq!(out.a, 255);
    }

    #[test]
    fn hsv_primaries() {
        assert_eq!(Color::from_hsv(0.0, 1.0, 1.0), Color::rgb(255, 0, 0));
        assert_eq!(Color::from_hsv(120.0, 1.0, 1.0), Color::rgb(0, 255, 0));
        assert_eq!(Color::from_hsv(240.0, 1.0, 1.0), Color::rgb(0, 0, 255));
    }

    #[test]
    fn unknown_blend_index_defaults_to_normal() {
        assert_eq!(BlendMode::from_index(2), BlendMode::Multiply);
        assert_eq!(BlendMode::from_index(99), BlendMode::Normal);
    }
}
