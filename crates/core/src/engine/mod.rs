//! The render loop.
//!
//! [`Engine`] owns everything a tick touches: the active profile, the device
//! manager, overlays, the data model and the composited surface. Each piece
//! sits behind its own lock so the UI thread can swap a profile or a device
//! while the render thread runs. Locks are always taken in the order
//! profile, devices, frame, overlays.
//!
//! [`RenderLoop`] runs [`Engine::tick`] on a dedicated thread at the
//! configured cadence.

mod throttle;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::config::AppConfig;
use crate::device::{ChangingGuard, DeviceBuffer, DeviceId, DeviceManager, DeviceProvider};
use crate::effects::{ProviderEvent, ProviderRegistry};
use crate::profile::{Profile, ProfileEntity};
use crate::property::DataModel;
use crate::render::{Canvas, FrameContext, GraphicsContext, Renderer, Surface};
use crate::{Color, LightweaveError, Result};

pub use throttle::ErrorThrottle;

/// Something drawn over the profile on every tick, such as a notification flash.
pub trait Overlay: Send {
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    fn update(&mut self, ctx: &FrameContext<'_>) -> Result<()>;

    fn render(&mut self, canvas: &mut dyn Canvas) -> Result<()>;
}

/// Published on the render-completed channel after every rendered tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub elapsed: Duration,
    pub element_errors: usize,
    pub device_failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    NoActiveProfile,
    NoActiveDevice,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Rendered(FrameReport),
    Idle(IdleReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

/// Frame timings collected by the render thread.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopStats {
    pub frames: u64,
    pub overruns: u64,
    pub last_frame: Duration,
    total: Duration,
}

impl LoopStats {
    pub fn average_frame(&self) -> Duration {
        match u32::try_from(self.frames) {
            Ok(0) => Duration::ZERO,
            Ok(frames) => self.total / frames,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.frames as f64),
        }
    }

    fn record(&mut self, spent: Duration, overrun: bool) {
        self.frames += 1;
        self.last_frame = spent;
        self.total += spent;
        if overrun {
            self.overruns += 1;
        }
    }
}

#[derive(Default)]
struct ActiveProfile {
    current: Option<Profile>,
    /// Stored form of the profile that was active last, restored on start.
    last: Option<ProfileEntity>,
}

struct FrameState {
    renderer: Renderer,
    surface: Surface,
    elapsed: Duration,
    frames: u64,
    throttle: ErrorThrottle,
}

pub struct Engine {
    config: AppConfig,
    profile: Mutex<ActiveProfile>,
    devices: Mutex<DeviceManager>,
    frame: Mutex<FrameState>,
    overlays: Mutex<Vec<Box<dyn Overlay>>>,
    data: Mutex<Arc<DataModel>>,
    registry: Arc<ProviderRegistry>,
    provider_events: Receiver<ProviderEvent>,
    completed: Mutex<Vec<Sender<FrameReport>>>,
    stats: Mutex<LoopStats>,
}

impl Engine {
    pub fn new(config: AppConfig, registry: Arc<ProviderRegistry>) -> Self {
        let provider_events = registry.subscribe();
        let frame = FrameState {
            renderer: Renderer::new(GraphicsContext::new("software")),
            surface: Surface::default(),
            elapsed: Duration::ZERO,
            frames: 0,
            throttle: ErrorThrottle::new(config.render.error_log_interval()),
        };
        Self {
            devices: Mutex::new(DeviceManager::new(config.devices.clone())),
            profile: Mutex::new(ActiveProfile::default()),
            frame: Mutex::new(frame),
            overlays: Mutex::new(Vec::new()),
            data: Mutex::new(Arc::new(DataModel::new())),
            registry,
            provider_events,
            completed: Mutex::new(Vec::new()),
            stats: Mutex::new(LoopStats::default()),
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    // -- Devices --

    pub fn add_device(&self, provider: Box<dyn DeviceProvider>) {
        self.devices.lock().add_provider(provider);
    }

    pub fn remove_device(&self, id: &DeviceId) -> bool {
        self.devices.lock().remove_provider(id).is_some()
    }

    /// Enables a device with retry and backoff. The device lock is only held
    /// for each attempt, so ticks keep running between retries.
    pub fn enable_device(&self, id: &DeviceId) -> Result<()> {
        let changing = {
            let devices = self.devices.lock();
            if !devices.has_device(id) {
                return Err(LightweaveError::DeviceUnavailable(id.to_string()));
            }
            devices.changing_flag()
        };

        let _changing = ChangingGuard::raise(&changing);
        let attempts = self.config.devices.enable_retries.max(1);
        for attempt in 0..attempts {
            if self.devices.lock().try_enable(id, attempt).is_ok() {
                return Ok(());
            }
            if attempt + 1 < attempts {
                thread::sleep(self.config.devices.backoff(attempt));
            }
        }

        self.devices.lock().deactivate();
        Err(LightweaveError::DeviceUnavailable(id.to_string()))
    }

    pub fn with_devices<R>(&self, f: impl FnOnce(&mut DeviceManager) -> R) -> R {
        f(&mut self.devices.lock())
    }

    // -- Profile --

    /// Activates `profile` against the current device layout and makes it the
    /// one the loop renders. The previous profile is deactivated.
    ///
    /// Effects and brushes are matched against the registry first, so
    /// providers that changed while the profile was not active are honoured.
    pub fn set_profile(&self, mut profile: Profile) {
        let mut slot = self.profile.lock();
        let swapped = profile.refresh_providers(&self.registry);
        if swapped > 0 {
            tracing::debug!(profile = %profile.name(), swapped, "profile providers refreshed");
        }
        let devices = self.devices.lock().devices();
        profile.activate(&devices);
        if let Some(mut previous) = slot.current.replace(profile) {
            previous.deactivate();
            slot.last = Some(previous.to_entity());
        }
    }

    pub fn load_profile(&self, entity: &ProfileEntity) -> Result<()> {
        let profile = Profile::from_entity(entity, &self.registry)?;
        self.set_profile(profile);
        Ok(())
    }

    /// Deactivates and removes the active profile. The loop goes idle on its
    /// next tick.
    pub fn clear_profile(&self) -> Option<ProfileEntity> {
        let mut slot = self.profile.lock();
        let mut profile = slot.current.take()?;
        profile.deactivate();
        let entity = profile.to_entity();
        slot.last = Some(entity.clone());
        Some(entity)
    }

    pub fn with_profile<R>(&self, f: impl FnOnce(Option<&mut Profile>) -> R) -> R {
        f(self.profile.lock().current.as_mut())
    }

    // -- Inputs and outputs --

    pub fn set_data(&self, data: DataModel) {
        *self.data.lock() = Arc::new(data);
    }

    pub fn update_data(&self, f: impl FnOnce(&mut DataModel)) {
        let mut data = self.data.lock();
        f(Arc::make_mut(&mut *data));
    }

    pub fn add_overlay(&self, overlay: Box<dyn Overlay>) {
        self.overlays.lock().push(overlay);
    }

    /// Receives a [`FrameReport`] after every rendered tick.
    pub fn subscribe(&self) -> Receiver<FrameReport> {
        let (tx, rx) = unbounded();
        self.completed.lock().push(tx);
        rx
    }

    pub fn stats(&self) -> LoopStats {
        *self.stats.lock()
    }

    /// Copy of the last composited frame, one buffer per device.
    pub fn surface_snapshot(&self) -> Vec<DeviceBuffer> {
        self.frame.lock().surface.buffers().to_vec()
    }

    // -- Loop --

    /// Makes sure there is something to render before the loop starts.
    ///
    /// Waits for an in-flight device change, then falls back to the last
    /// active device and the last active profile. Returns
    /// [`LoopState::Stopped`] when either cannot be resolved.
    pub fn prepare(&self) -> Result<LoopState> {
        let changing = self.devices.lock().changing_flag();
        let deadline = Instant::now() + self.config.devices.changing_wait();
        while changing.load(Ordering::Acquire) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        let missing_device = {
            let devices = self.devices.lock();
            devices
                .active_device()
                .is_none()
                .then(|| devices.last_active().cloned())
        };
        if let Some(last) = missing_device {
            let enabled = last
                .ok_or(LightweaveError::NoActiveDevice)
                .and_then(|id| self.enable_device(&id));
            if let Err(err) = enabled {
                tracing::info!(error = %err, "no device to render to");
                return Ok(LoopState::Stopped);
            }
        }

        let mut slot = self.profile.lock();
        let devices = self.devices.lock();
        if let Some(profile) = slot.current.as_mut() {
            profile.refresh_providers(&self.registry);
        } else {
            let Some(entity) = slot.last.take() else {
                tracing::info!("no profile to render");
                return Ok(LoopState::Stopped);
            };
            let mut profile = Profile::from_entity(&entity, &self.registry)?;
            profile.activate(&devices.devices());
            tracing::info!(profile = %profile.name(), "restored last profile");
            slot.current = Some(profile);
        }
        Ok(LoopState::Running)
    }

    /// Runs one update, render and flush pass.
    ///
    /// Element errors are logged and the frame continues; in strict mode the
    /// first one is returned after the frame has been flushed.
    pub fn tick(&self, delta: Duration) -> Result<TickOutcome> {
        let data = Arc::clone(&*self.data.lock());
        let mut slot = self.profile.lock();

        let Some(profile) = slot.current.as_mut() else {
            return Ok(TickOutcome::Idle(IdleReason::NoActiveProfile));
        };
        // Events that arrive with no profile stay queued; `set_profile`
        // refreshes against the registry anyway.
        let provider_changes = self.provider_events.try_iter().count();
        if provider_changes > 0 {
            let swapped = profile.refresh_providers(&self.registry);
            tracing::debug!(events = provider_changes, swapped, "providers changed");
        }

        let mut devices = self.devices.lock();
        if devices.active_device().is_none() {
            return Ok(TickOutcome::Idle(IdleReason::NoActiveDevice));
        }

        let mut frame = self.frame.lock();
        let frame = &mut *frame;
        if frame.surface.layout_version() != devices.layout_version() {
            let layout = devices.devices();
            profile.populate_leds(&layout);
            frame.surface.rebuild(layout, devices.layout_version());
            tracing::debug!(version = devices.layout_version(), "surface rebuilt");
        }

        frame.elapsed += delta;
        frame.frames += 1;
        let ctx = FrameContext::new(delta, frame.elapsed, &data);

        let mut errors = profile.update(&ctx)?;
        frame.surface.clear(Color::BLACK);
        errors.extend(profile.render(&mut frame.renderer, &mut frame.surface)?);

        for overlay in self.overlays.lock().iter_mut().filter(|o| o.is_enabled()) {
            let drawn = overlay
                .update(&ctx)
                .and_then(|()| overlay.render(&mut frame.surface));
            if let Err(err) = drawn {
                frame
                    .throttle
                    .warn(&format!("overlay {} failed: {err}", overlay.name()));
            }
        }

        let failures = devices.flush(&frame.surface);
        for (device, err) in &failures {
            frame.throttle.warn(&format!("flush to {device} failed: {err}"));
        }
        for error in &errors {
            frame.throttle.warn(&format!("frame error: {error}"));
        }

        let report = FrameReport {
            frame: frame.frames,
            elapsed: frame.elapsed,
            element_errors: errors.len(),
            device_failures: failures.len(),
        };
        self.completed
            .lock()
            .retain(|tx| tx.send(report.clone()).is_ok());

        if self.config.render.strict {
            if let Some(first) = errors.into_iter().next() {
                return Err(first.error);
            }
        }
        Ok(TickOutcome::Rendered(report))
    }

    fn record_frame(&self, spent: Duration, overrun: bool) {
        self.stats.lock().record(spent, overrun);
    }

    fn log_loop_error(&self, err: &LightweaveError) {
        self.frame.lock().throttle.warn(&format!("tick failed: {err}"));
    }
}

/// Dedicated thread calling [`Engine::tick`] at the configured frame rate.
///
/// The thread self-paces: it sleeps whatever is left of the frame budget and
/// never renders extra frames to catch up after an overrun.
pub struct RenderLoop {
    engine: Arc<Engine>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl RenderLoop {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn state(&self) -> LoopState {
        let alive = self.handle.as_ref().is_some_and(|h| !h.is_finished());
        if alive && self.running.load(Ordering::Acquire) {
            LoopState::Running
        } else {
            LoopState::Stopped
        }
    }

    pub fn start(&mut self) -> Result<LoopState> {
        if self.state() == LoopState::Running {
            return Ok(LoopState::Running);
        }
        // A thread that stopped itself still needs joining.
        self.stop()?;

        if self.engine.prepare()? == LoopState::Stopped {
            return Ok(LoopState::Stopped);
        }

        self.running.store(true, Ordering::Release);
        let engine = Arc::clone(&self.engine);
        let running = Arc::clone(&self.running);
        let handle = thread::Builder::new()
            .name("lightweave-render".into())
            .spawn(move || run(&engine, &running))?;
        self.handle = Some(handle);
        tracing::info!("render loop started");
        Ok(LoopState::Running)
    }

    /// Stops the thread at the next tick boundary and waits for it. Returns
    /// the error that ended the loop in strict mode.
    pub fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let result = handle
            .join()
            .map_err(|_| LightweaveError::msg("render thread panicked"))?;
        tracing::info!("render loop stopped");
        result
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::error!(error = %err, "render loop ended with an error");
        }
    }
}

fn run(engine: &Engine, running: &AtomicBool) -> Result<()> {
    let budget = engine.config.render.frame_budget();
    let mut last = Instant::now();

    while running.load(Ordering::Acquire) {
        let started = Instant::now();
        let delta = started.duration_since(last);
        last = started;

        match engine.tick(delta) {
            Ok(TickOutcome::Rendered(_)) => {}
            Ok(TickOutcome::Idle(reason)) => {
                tracing::info!(?reason, "render loop going idle");
                running.store(false, Ordering::Release);
                break;
            }
            Err(err) if engine.config.render.strict => {
                running.store(false, Ordering::Release);
                return Err(err);
            }
            Err(err) => engine.log_loop_error(&err),
        }

        let spent = started.elapsed();
        engine.record_frame(spent, spent > budget);
        thread::sleep(budget.saturating_sub(spent));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{demo_led_strip, SimulatedDevice};
    use crate::effects::{
        register_builtins, BrushEntity, EffectDescriptor, EffectSlot, LayerEffect, ProviderKey, BUILTIN_PROVIDER,
    };
    use crate::property::{GroupSchema, Keyframe, LayerPropertyGroup, PropertyValue};
    use crate::render::RenderTarget;
    use crate::timeline::TimeDelta;
    use crate::profile::ElementKey;

    const TICK: Duration = Duration::from_millis(50);

    fn engine(strict: bool) -> (Engine, Arc<parking_lot::Mutex<crate::device::FrameLog>>) {
        let mut config = AppConfig::default();
        config.render.strict = strict;
        config.devices.retry_backoff_ms = 0;
        let engine = Engine::new(config, Arc::new(ProviderRegistry::with_builtins()));

        let device = SimulatedDevice::new(demo_led_strip("strip", 4));
        let log = device.frame_log();
        engine.add_device(Box::new(device));
        engine.enable_device(&DeviceId::new("strip")).unwrap();
        (engine, log)
    }

    /// One solid layer over the whole strip, opacity keyframed 0 -> 100 over 500ms.
    fn fading_profile() -> (Profile, ElementKey) {
        let mut profile = Profile::new("fade").unwrap();
        let root = profile.root_folder();
        let layer = profile.add_layer(root).unwrap();

        let node = profile.tree_mut().get_mut(layer).unwrap();
        let layer_ref = node.as_layer_mut().unwrap();
        let brush = ProviderRegistry::with_builtins()
            .resolve_brush(BrushEntity::new(ProviderKey::new(BUILTIN_PROVIDER, "Solid")))
            .unwrap();
        layer_ref.set_brush(Some(brush));
        layer_ref.add_leds(demo_led_strip("strip", 4).led_refs());
        let state = layer_ref.render_state_mut();
        let timeline = state.timeline();
        timeline.set_start_segment_length(Duration::ZERO);
        timeline.set_main_segment_length(Duration::from_millis(500));
        timeline.set_end_segment_length(Duration::ZERO);

        let general = state.general_mut();
        general.set_keyframes_enabled("Opacity", true).unwrap();
        general
            .add_keyframe("Opacity", Keyframe::new(Duration::ZERO, PropertyValue::Float(0.0)))
            .unwrap();
        general
            .add_keyframe(
                "Opacity",
                Keyframe::new(Duration::from_millis(500), PropertyValue::Float(100.0)),
            )
            .unwrap();
        (profile, layer)
    }

    fn layer_opacity(engine: &Engine, layer: ElementKey) -> f64 {
        engine.with_profile(|profile| {
            let profile = profile.unwrap();
            let node = profile.tree().get(layer).unwrap();
            node.render_state().general().float("Opacity").unwrap()
        })
    }

    #[test]
    fn keyframed_opacity_follows_the_timeline_and_wraps() {
        let (engine, log) = engine(false);
        let (profile, layer) = fading_profile();
        engine.set_profile(profile);

        for tick in 1..=10 {
            let outcome = engine.tick(TICK).unwrap();
            assert!(matches!(outcome, TickOutcome::Rendered(_)));
            if tick == 5 {
                assert_eq!(layer_opacity(&engine, layer), 50.0);
            }
        }

        engine.with_profile(|profile| {
            let node = profile.unwrap().tree().get(layer).unwrap();
            let timeline = node.render_state().timeline();
            assert_eq!(timeline.position(), Duration::ZERO);
            assert_eq!(timeline.delta(), TimeDelta::from_duration(TICK));
        });
        assert_eq!(log.lock().flushes, 10);
        assert_eq!(log.lock().last.as_ref().unwrap().colors.len(), 4);
    }

    fn effect_states(engine: &Engine, layer: ElementKey) -> Vec<(uuid::Uuid, u32, bool)> {
        engine.with_profile(|profile| {
            let node = profile.unwrap().tree().get(layer).unwrap();
            node.render_state()
                .effects()
                .iter()
                .map(|effect| (effect.id(), effect.order(), effect.is_placeholder()))
                .collect()
        })
    }

    #[test]
    fn effects_follow_their_provider_while_running() {
        let (engine, log) = engine(false);
        let (mut profile, layer) = fading_profile();
        let mut ids = Vec::new();
        for name in ["Dim", "Invert"] {
            let effect = engine
                .registry()
                .instantiate_effect(&ProviderKey::new(BUILTIN_PROVIDER, name))
                .unwrap();
            ids.push(effect.id());
            profile
                .tree_mut()
                .add_layer_effect(layer, EffectSlot::Live(effect))
                .unwrap();
        }
        engine.set_profile(profile);
        engine.tick(TICK).unwrap();
        assert_eq!(
            effect_states(&engine, layer),
            vec![(ids[0], 1, false), (ids[1], 2, false)]
        );

        engine.registry().unregister_provider(BUILTIN_PROVIDER);
        engine.tick(TICK).unwrap();
        assert_eq!(
            effect_states(&engine, layer),
            vec![(ids[0], 1, true), (ids[1], 2, true)]
        );

        register_builtins(engine.registry());
        engine.tick(TICK).unwrap();
        assert_eq!(
            effect_states(&engine, layer),
            vec![(ids[0], 1, false), (ids[1], 2, false)]
        );
        assert_eq!(log.lock().flushes, 3);
    }

    #[test]
    fn providers_removed_while_idle_apply_to_the_next_profile() {
        let (engine, _) = engine(false);
        engine.registry().unregister_provider(BUILTIN_PROVIDER);
        assert_eq!(
            engine.tick(TICK).unwrap(),
            TickOutcome::Idle(IdleReason::NoActiveProfile)
        );

        let (profile, layer) = fading_profile();
        engine.set_profile(profile);
        engine.tick(TICK).unwrap();
        engine.tick(TICK).unwrap();

        engine.with_profile(|profile| {
            let node = profile.unwrap().tree().get(layer).unwrap();
            let brush = node.as_layer().unwrap().brush().unwrap();
            assert!(brush.is_placeholder());
        });
    }

    #[test]
    fn device_lock_is_free_between_enable_attempts() {
        let mut config = AppConfig::default();
        config.devices.retry_backoff_ms = 200;
        let engine = Engine::new(config, Arc::new(ProviderRegistry::with_builtins()));
        engine.add_device(Box::new(
            SimulatedDevice::new(demo_led_strip("strip", 4)).failing_enables(1),
        ));

        thread::scope(|scope| {
            let enabling = scope.spawn(|| engine.enable_device(&DeviceId::new("strip")));
            thread::sleep(Duration::from_millis(50));
            let devices = engine.devices.try_lock().expect("device lock held during backoff");
            assert!(devices.is_changing());
            drop(devices);
            enabling.join().unwrap().unwrap();
        });
        assert!(engine.with_devices(|devices| devices.active_device().is_some()));
        assert!(!engine.with_devices(|devices| devices.is_changing()));
    }

    #[test]
    fn missing_profile_or_device_idles() {
        let (engine, _) = engine(false);
        assert_eq!(
            engine.tick(TICK).unwrap(),
            TickOutcome::Idle(IdleReason::NoActiveProfile)
        );

        engine.set_profile(Profile::new("empty").unwrap());
        engine.with_devices(DeviceManager::deactivate);
        assert_eq!(
            engine.tick(TICK).unwrap(),
            TickOutcome::Idle(IdleReason::NoActiveDevice)
        );
    }

    #[test]
    fn prepare_restores_last_device_and_profile() {
        let (engine, _) = engine(false);
        engine.set_profile(Profile::new("kept").unwrap());
        assert!(engine.clear_profile().is_some());
        engine.with_devices(DeviceManager::deactivate);

        assert_eq!(engine.prepare().unwrap(), LoopState::Running);
        engine.with_profile(|profile| {
            let profile = profile.unwrap();
            assert_eq!(profile.name(), "kept");
            assert!(profile.is_activated());
        });
        assert!(matches!(engine.tick(TICK).unwrap(), TickOutcome::Rendered(_)));
    }

    #[test]
    fn prepare_without_anything_to_restore_stays_stopped() {
        let (engine, _) = engine(false);
        assert_eq!(engine.prepare().unwrap(), LoopState::Stopped);
    }

    #[test]
    fn render_completed_is_published_per_frame() {
        let (engine, _) = engine(false);
        let completed = engine.subscribe();
        engine.set_profile(Profile::new("p").unwrap());

        engine.tick(TICK).unwrap();
        engine.tick(TICK).unwrap();
        let frames: Vec<u64> = completed.try_iter().map(|r| r.frame).collect();
        assert_eq!(frames, vec![1, 2]);
    }

    struct Broken;

    impl LayerEffect for Broken {
        fn post_process(&mut self, _target: &mut RenderTarget, _properties: &LayerPropertyGroup) -> Result<()> {
            Err(LightweaveError::msg("broken effect"))
        }
    }

    fn broken_profile(engine: &Engine) -> Profile {
        let key = ProviderKey::new("test", "Broken");
        engine.registry().register_effect(EffectDescriptor::new(
            key.clone(),
            "Broken",
            GroupSchema::build("Broken", |_| {}),
            || Box::new(Broken),
        ));
        let (mut profile, layer) = fading_profile();
        let effect = engine.registry().instantiate_effect(&key).unwrap();
        profile
            .tree_mut()
            .add_layer_effect(layer, EffectSlot::Live(effect))
            .unwrap();
        profile
    }

    #[test]
    fn element_errors_are_absorbed_unless_strict() {
        let (lenient, _) = engine(false);
        lenient.set_profile(broken_profile(&lenient));
        match lenient.tick(TICK).unwrap() {
            TickOutcome::Rendered(report) => assert_eq!(report.element_errors, 1),
            other => panic!("unexpected outcome {other:?}"),
        }

        let (strict, log) = engine(true);
        strict.set_profile(broken_profile(&strict));
        assert!(strict.tick(TICK).is_err());
        assert_eq!(log.lock().flushes, 1);
    }

    struct Flash {
        color: Color,
    }

    impl Overlay for Flash {
        fn name(&self) -> &str {
            "flash"
        }

        fn update(&mut self, _ctx: &FrameContext<'_>) -> Result<()> {
            Ok(())
        }

        fn render(&mut self, canvas: &mut dyn Canvas) -> Result<()> {
            for led in demo_led_strip("strip", 4).led_refs() {
                canvas.blend(&led.key, self.color, crate::BlendMode::Normal);
            }
            Ok(())
        }
    }

    #[test]
    fn overlays_draw_over_the_profile() {
        let (engine, log) = engine(false);
        engine.set_profile(Profile::new("p").unwrap());
        engine.add_overlay(Box::new(Flash { color: Color::WHITE }));

        engine.tick(TICK).unwrap();
        let log = log.lock();
        let colors = &log.last.as_ref().unwrap().colors;
        assert!(colors.iter().all(|c| *c == Color::WHITE));
    }

    #[test]
    fn loop_thread_runs_until_stopped() {
        let (engine, log) = engine(false);
        engine.set_profile(Profile::new("p").unwrap());
        let mut render_loop = RenderLoop::new(Arc::new(engine));

        assert_eq!(render_loop.start().unwrap(), LoopState::Running);
        thread::sleep(Duration::from_millis(150));
        render_loop.stop().unwrap();

        assert_eq!(render_loop.state(), LoopState::Stopped);
        let stats = render_loop.engine().stats();
        assert!(stats.frames >= 1);
        assert_eq!(log.lock().flushes, stats.frames);
    }

    #[test]
    fn loop_stops_itself_when_the_profile_goes_away() {
        let (engine, _) = engine(false);
        engine.set_profile(Profile::new("p").unwrap());
        let mut render_loop = RenderLoop::new(Arc::new(engine));

        render_loop.start().unwrap();
        render_loop.engine().clear_profile();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(render_loop.state(), LoopState::Stopped);
        render_loop.stop().unwrap();
    }
}
