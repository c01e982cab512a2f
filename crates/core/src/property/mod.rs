//! Animatable property groups.
//!
//! A [`LayerPropertyGroup`] is built from a declared [`GroupSchema`] and holds
//! [`LayerProperty`] values that resolve per frame from keyframes, data
//! bindings or their base value.

mod binding;
mod group;
mod keyframe;
mod layer_property;
mod value;

pub use binding::{DataBinding, DataModel};
pub use group::{GroupBuilder, GroupSchema, LayerPropertyGroup};
pub use keyframe::{sample, Easing, Keyframe};
pub use layer_property::{LayerProperty, PropertyDescriptor, PropertyEntity};
pub use value::{PropertyKind, PropertyValue};

/// Notification raised when a property changes outside of animation.
///
/// Events bubble from the owning group to every parent group and are for
/// observers only; nothing in the update path reacts to them.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyEvent {
    BaseValueChanged { path: String },
    VisibilityChanged { path: String, hidden: bool },
    KeyframesChanged { path: String },
    DataBindingChanged { path: String },
}
