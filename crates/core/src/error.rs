use crate::property::PropertyKind;

/// Result alias that carries the custom [`LightweaveError`] type.
pub type Result<T> = std::result::Result<T, LightweaveError>;

/// Common error type for the core crate.
///
/// Configuration errors (stored data that contradicts a declaration, invalid
/// tree topology, double initialisation) are fatal and surface immediately.
/// Device and provider problems are transient and usually absorbed into state
/// by the caller rather than propagated.
#[derive(Debug, thiserror::Error)]
pub enum LightweaveError {
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    #[error("property group `{0}` is already initialized")]
    AlreadyInitialized(String),
    #[error("property `{path}` is declared as {expected:?} but holds {found:?}")]
    PropertyTypeMismatch {
        path: String,
        expected: PropertyKind,
        found: PropertyKind,
    },
    #[error("unknown property `{0}`")]
    UnknownProperty(String),
    #[error("an element cannot be added as its own child")]
    SelfParenting,
    #[error("adding this element would make an ancestor its own descendant")]
    Cycle,
    #[error("element handle is stale or refers to a removed element")]
    StaleElement,
    #[error("element is not a child of the given parent")]
    NotAChild,
    #[error("profile `{0}` is not activated")]
    ProfileNotActivated(String),
    #[error("timeline is overridden; clear the override before updating it")]
    TimelineOverridden,
    #[error("no provider registered for `{0}`")]
    ProviderUnavailable(String),
    #[error("device `{0}` is unavailable")]
    DeviceUnavailable(String),
    #[error("no active device")]
    NoActiveDevice,
    #[error("no active profile")]
    NoActiveProfile,
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl LightweaveError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Whether the error belongs to the fatal configuration class.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::AlreadyInitialized(_)
                | Self::PropertyTypeMismatch { .. }
                | Self::UnknownProperty(_)
                | Self::SelfParenting
                | Self::Cycle
        )
    }
}

impl From<&str> for LightweaveError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for LightweaveError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
