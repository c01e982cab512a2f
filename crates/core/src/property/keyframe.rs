use std::time::Duration;

use keyframe::functions as ease;
use keyframe::EasingFunction;
use serde::{Deserialize, Serialize};

use super::PropertyValue;

/// Curve applied between a keyframe and the one that follows it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Easing {
    #[default]
    Linear,
    /// Keep this keyframe's value until the next keyframe is reached.
    Hold,
    EaseIn,
    EaseOut,
    EaseInOut,
    EaseInCubic,
    EaseOutCubic,
    EaseInOutCubic,
    EaseInQuart,
    EaseOutQuart,
    EaseInOutQuart,
    EaseInQuint,
    EaseOutQuint,
    EaseInOutQuint,
}

impl Easing {
    /// Maps linear progress in [0, 1] onto the curve.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::Hold => 0.0,
            Self::EaseIn => ease::EaseIn.y(t),
            Self::EaseOut => ease::EaseOut.y(t),
            Self::EaseInOut => ease::EaseInOut.y(t),
            Self::EaseInCubic => ease::EaseInCubic.y(t),
            Self::EaseOutCubic => ease::EaseOutCubic.y(t),
            Self::EaseInOutCubic => ease::EaseInOutCubic.y(t),
            Self::EaseInQuart => ease::EaseInQuart.y(t),
            Self::EaseOutQuart => ease::EaseOutQuart.y(t),
            Self::EaseInOutQuart => ease::EaseInOutQuart.y(t),
            Self::EaseInQuint => ease::EaseInQuint.y(t),
            Self::EaseOutQuint => ease::EaseOutQuint.y(t),
            Self::EaseInOutQuint => ease::EaseInOutQuint.y(t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub position: Duration,
    pub value: PropertyValue,
    #[serde(default)]
    pub easing: Easing,
}

impl Keyframe {
    pub fn new(position: Duration, value: PropertyValue) -> Self {
        Self {
            position,
            value,
            easing: Easing::Linear,
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }
}

/// Samples a position-sorted keyframe list. Before the first keyframe the
/// first value holds, after the last the last value holds.
pub fn sample(keyframes: &[Keyframe], position: Duration) -> Option<PropertyValue> {
    let next = keyframes.partition_point(|k| k.position <= position);
    match next {
        0 => keyframes.first().map(|k| k.value),
        n if n == keyframes.len() => keyframes.last().map(|k| k.value),
        n => {
            let from = &keyframes[n - 1];
            let to = &keyframes[n];
            let span = (to.position - from.position).as_secs_f64();
            let t = if span > 0.0 {
                (position - from.position).as_secs_f64() / span
            } else {
                1.0
            };
            Some(from.value.interpolate(to.value, from.easing.apply(t)))
        }
    }
}
