use serde::{Deserialize, Serialize};

use crate::Color;

/// Declared type of a layer property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    Float,
    Int,
    Bool,
    Color,
    /// Index into a fixed list of options, such as a blend mode.
    Choice,
}

/// Value held by a layer property or one of its keyframes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Color(Color),
    Choice(u32),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Float(_) => PropertyKind::Float,
            Self::Int(_) => PropertyKind::Int,
            Self::Bool(_) => PropertyKind::Bool,
            Self::Color(_) => PropertyKind::Color,
            Self::Choice(_) => PropertyKind::Choice,
        }
    }

    /// Blends towards `next` by `t` (already eased). Discrete kinds switch
    /// over at the halfway point.
    pub fn interpolate(self, next: Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        match (self, next) {
            (Self::Float(a), Self::Float(b)) => Self::Float(a + (b - a) * t),
            (Self::Int(a), Self::Int(b)) => {
                let delta = ((i128::from(b) - i128::from(a)) as f64 * t).round() as i128;
                let value = (i128::from(a) + delta).clamp(i128::from(i64::MIN), i128::from(i64::MAX));
                Self::Int(value as i64)
            }
            (Self::Color(a), Self::Color(b)) => Self::Color(a.lerp(b, t)),
            (a, b) if a.kind() == b.kind() => {
                if t >= 0.5 {
                    b
                } else {
                    a
                }
            }
            (a, _) => a,
        }
    }

    /// Re-types a bound numeric input as a value of the same kind as `self`.
    /// Colours cannot be driven by a number and yield `None`.
    pub fn with_number(self, number: f64) -> Option<Self> {
        match self {
            Self::Float(_) => Some(Self::Float(number)),
            Self::Int(_) => Some(Self::Int(number.round() as i64)),
            Self::Bool(_) => Some(Self::Bool(number != 0.0)),
            Self::Choice(_) => Some(Self::Choice(number.max(0.0).round() as u32)),
            Self::Color(_) => None,
        }
    }

    pub fn clamped(self, min: Option<f64>, max: Option<f64>) -> Self {
        let clamp = |v: f64| {
            let v = min.map_or(v, |m| v.max(m));
            max.map_or(v, |m| v.min(m))
        };
        match self {
            Self::Float(v) => Self::Float(clamp(v)),
            Self::Int(v) => Self::Int(clamp(v as f64).round() as i64),
            other => other,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Self::Float(v) => Some(v),
            Self::Int(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match *self {
            Self::Color(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_choice(&self) -> Option<u32> {
        match *self {
            Self::Choice(v) => Some(v),
            _ => None,
        }
    }
}
