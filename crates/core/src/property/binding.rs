use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Snapshot of externally supplied values that properties and conditions can
/// read during a frame, such as game state pushed in by an integration.
#[derive(Debug, Clone, Default)]
pub struct DataModel {
    values: HashMap<String, f64>,
    events: HashMap<String, u64>,
}

impl DataModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&mut self, path: impl Into<String>, value: f64) {
        self.values.insert(path.into(), value);
    }

    pub fn value(&self, path: &str) -> Option<f64> {
        self.values.get(path).copied()
    }

    /// Records one occurrence of the named event.
    pub fn fire_event(&mut self, path: impl Into<String>) {
        *self.events.entry(path.into()).or_insert(0) += 1;
    }

    /// Number of times the event has fired since the model was created.
    pub fn event_count(&self, path: &str) -> u64 {
        self.events.get(path).copied().unwrap_or(0)
    }
}

/// Drives a numeric property from a data model path: `value * scale + offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBinding {
    pub path: String,
    #[serde(default = "unit_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

fn unit_scale() -> f64 {
    1.0
}

impl DataBinding {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            scale: 1.0,
            offset: 0.0,
        }
    }

    pub fn resolve(&self, data: &DataModel) -> Option<f64> {
        data.value(&self.path).map(|v| v * self.scale + self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_applies_scale_and_offset() {
        let mut data = DataModel::new();
        data.set_value("player.health", 0.5);
        let binding = DataBinding {
            scale: 100.0,
            offset: 5.0,
            ..DataBinding::new("player.health")
        };
        assert_eq!(binding.resolve(&data), Some(55.0));
        assert_eq!(DataBinding::new("missing").resolve(&data), None);
    }

    #[test]
    fn events_are_counted() {
        let mut data = DataModel::new();
        data.fire_event("kill");
        data.fire_event("kill");
        assert_eq!(data.event_count("kill"), 2);
        assert_eq!(data.event_count("death"), 0);
    }
}
