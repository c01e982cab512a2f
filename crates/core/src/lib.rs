//! Core library for the Lightweave LED lighting application.
//!
//! A [`Profile`] is a tree of folders and layers. Each frame the [`Engine`]
//! advances every element's [`Timeline`], resolves its animated properties,
//! composites the layers and their effects onto a per-device surface and
//! pushes the result to the active devices.

pub mod adaption;
pub mod color;
pub mod config;
pub mod device;
pub mod effects;
pub mod engine;
pub mod error;
pub mod profile;
pub mod property;
pub mod render;
pub mod timeline;

pub use adaption::{AdaptionHint, LayerAdapter};
pub use color::{BlendMode, Color};
pub use config::{AppConfig, DeviceConfig, RenderConfig};
pub use device::{Device, DeviceId, DeviceManager, DeviceProvider, LedKey, SimulatedDevice};
pub use effects::{ProviderKey, ProviderRegistry};
pub use engine::{Engine, LoopState, LoopStats, Overlay, RenderLoop, TickOutcome};
pub use error::{LightweaveError, Result};
pub use profile::{ElementKey, Profile, ProfileEntity};
pub use property::{DataModel, LayerPropertyGroup, PropertyValue};
pub use render::{Renderer, Surface};
pub use timeline::Timeline;
