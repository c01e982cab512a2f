use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use super::{Device, DeviceId, DeviceProvider};
use crate::config::DeviceConfig;
use crate::render::Surface;
use crate::{LightweaveError, Result};

/// Owns the device providers and tracks which one is active.
///
/// The `changing` flag is shared outside the manager's lock so the loop can
/// wait for an in-flight enable without contending on the manager itself.
pub struct DeviceManager {
    providers: Vec<Box<dyn DeviceProvider>>,
    active: Option<DeviceId>,
    last_active: Option<DeviceId>,
    changing: Arc<AtomicBool>,
    layout_version: u64,
    config: DeviceConfig,
}

/// Holds the `changing` flag raised until dropped.
pub(crate) struct ChangingGuard(Arc<AtomicBool>);

impl ChangingGuard {
    pub(crate) fn raise(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Release);
        Self(Arc::clone(flag))
    }
}

impl Drop for ChangingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DeviceManager {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            providers: Vec::new(),
            active: None,
            last_active: config.last_device.clone(),
            changing: Arc::new(AtomicBool::new(false)),
            layout_version: 0,
            config,
        }
    }

    pub fn add_provider(&mut self, provider: Box<dyn DeviceProvider>) {
        tracing::info!(device = %provider.device().id, "device provider added");
        self.providers.push(provider);
        self.layout_version += 1;
    }

    pub fn remove_provider(&mut self, id: &DeviceId) -> Option<Box<dyn DeviceProvider>> {
        let index = self.providers.iter().position(|p| &p.device().id == id)?;
        if self.active.as_ref() == Some(id) {
            tracing::warn!(device = %id, "active device removed");
            self.active = None;
        }
        self.layout_version += 1;
        Some(self.providers.remove(index))
    }

    /// Layouts of every known device, in registration order.
    pub fn devices(&self) -> Vec<Device> {
        self.providers.iter().map(|p| p.device().clone()).collect()
    }

    /// Bumped whenever the set of devices changes.
    pub fn layout_version(&self) -> u64 {
        self.layout_version
    }

    pub fn active_device(&self) -> Option<&Device> {
        let active = self.active.as_ref()?;
        self.providers
            .iter()
            .map(|p| p.device())
            .find(|device| &device.id == active)
    }

    pub fn last_active(&self) -> Option<&DeviceId> {
        self.last_active.as_ref()
    }

    pub fn changing_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.changing)
    }

    pub fn is_changing(&self) -> bool {
        self.changing.load(Ordering::Acquire)
    }

    pub fn has_device(&self, id: &DeviceId) -> bool {
        self.providers.iter().any(|p| &p.device().id == id)
    }

    /// Makes one attempt at enabling a device, making it active on success.
    pub fn try_enable(&mut self, id: &DeviceId, attempt: u32) -> Result<()> {
        let provider = self
            .providers
            .iter_mut()
            .find(|p| &p.device().id == id)
            .ok_or_else(|| LightweaveError::DeviceUnavailable(id.to_string()))?;

        match provider.enable() {
            Ok(()) => {
                tracing::info!(device = %id, attempt, "device enabled");
                self.active = Some(id.clone());
                self.last_active = Some(id.clone());
                Ok(())
            }
            Err(err) => {
                tracing::warn!(device = %id, attempt, error = %err, "device enable failed");
                Err(err)
            }
        }
    }

    /// Enables a device and makes it active, retrying with exponential backoff.
    /// After the last failed attempt no device is active.
    ///
    /// The backoff sleeps happen with `&mut self` borrowed; callers sharing
    /// the manager behind a lock should drive [`try_enable`](Self::try_enable)
    /// themselves and sleep unlocked.
    pub fn enable_device(&mut self, id: &DeviceId) -> Result<()> {
        if !self.has_device(id) {
            return Err(LightweaveError::DeviceUnavailable(id.to_string()));
        }

        let _changing = ChangingGuard::raise(&self.changing);
        let attempts = self.config.enable_retries.max(1);
        for attempt in 0..attempts {
            if self.try_enable(id, attempt).is_ok() {
                return Ok(());
            }
            if attempt + 1 < attempts {
                thread::sleep(self.config.backoff(attempt));
            }
        }

        self.active = None;
        Err(LightweaveError::DeviceUnavailable(id.to_string()))
    }

    /// Re-enables the device that was active last.
    pub fn enable_last_device(&mut self) -> Result<()> {
        let last = self
            .last_active
            .clone()
            .ok_or(LightweaveError::NoActiveDevice)?;
        self.enable_device(&last)
    }

    pub fn deactivate(&mut self) {
        self.active = None;
    }

    /// Pushes the surface's buffers to every usable device. Failures are
    /// returned per device; the remaining devices are still flushed.
    pub fn flush(&mut self, surface: &Surface) -> Vec<(DeviceId, LightweaveError)> {
        let mut failures = Vec::new();
        for provider in self.providers.iter_mut().filter(|p| p.is_usable()) {
            let Some(buffer) = surface.buffer(&provider.device().id) else {
                continue;
            };
            if let Err(err) = provider.flush(buffer) {
                failures.push((provider.device().id.clone(), err));
            }
        }
        failures
    }
}
