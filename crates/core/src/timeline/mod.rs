//! Per-element animation clock.
//!
//! A [`Timeline`] is split into three consecutive segments: start, main and
//! end. Display conditions decide how the clock moves through them; the
//! timeline itself only guarantees that its boundaries stay consistent and
//! that every mutation is serialised behind a single lock, so an editor thread
//! may scrub while the render thread advances.

use std::fmt;
use std::ops;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{LightweaveError, Result};

/// Signed span of time, used for timeline deltas which run backwards after a jump.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeDelta {
    nanos: i64,
}

impl TimeDelta {
    pub const ZERO: TimeDelta = TimeDelta { nanos: 0 };

    pub fn from_duration(duration: Duration) -> Self {
        Self {
            nanos: i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX),
        }
    }

    /// Signed distance travelled when moving from `from` to `to`.
    pub fn between(from: Duration, to: Duration) -> Self {
        if to >= from {
            Self::from_duration(to - from)
        } else {
            -Self::from_duration(from - to)
        }
    }

    pub fn is_negative(self) -> bool {
        self.nanos < 0
    }

    /// Magnitude of the delta.
    pub fn abs(self) -> Duration {
        Duration::from_nanos(self.nanos.unsigned_abs())
    }

    pub fn as_secs_f64(self) -> f64 {
        self.nanos as f64 / 1e9
    }
}

impl From<Duration> for TimeDelta {
    fn from(value: Duration) -> Self {
        Self::from_duration(value)
    }
}

impl ops::Neg for TimeDelta {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            nanos: self.nanos.saturating_neg(),
        }
    }
}

impl ops::Add for TimeDelta {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            nanos: self.nanos.saturating_add(other.nanos),
        }
    }
}

impl ops::AddAssign for TimeDelta {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// What a timeline does once the main segment has been reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayMode {
    /// Keep looping the main segment while the condition holds.
    #[default]
    Repeat,
    /// Play through once.
    Once,
}

/// What a timeline does when its condition stops holding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopMode {
    /// Play out the end segment.
    #[default]
    Finish,
    /// Jump straight past the end.
    SkipToEnd,
}

/// How an event trigger interacts with a timeline that is still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventOverlapMode {
    /// Restart from the beginning.
    #[default]
    Restart,
    /// Let the running timeline finish and drop the trigger.
    Ignore,
    /// Alternate between playing and finishing on every trigger.
    Toggle,
}

/// Persisted form of a [`Timeline`]: only the segment layout survives a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineEntity {
    pub start_segment_length: Duration,
    pub main_segment_length: Duration,
    pub end_segment_length: Duration,
}

impl Default for TimelineEntity {
    fn default() -> Self {
        Self {
            start_segment_length: Duration::ZERO,
            main_segment_length: DEFAULT_MAIN_LENGTH,
            end_segment_length: Duration::ZERO,
        }
    }
}

const DEFAULT_MAIN_LENGTH: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
struct TimelineState {
    position: Duration,
    delta: TimeDelta,
    start_length: Duration,
    main_length: Duration,
    end_length: Duration,
    overridden: bool,
    last_override: Option<Duration>,
}

impl TimelineState {
    fn main_start(&self) -> Duration {
        self.start_length
    }

    fn main_end(&self) -> Duration {
        self.start_length + self.main_length
    }

    fn length(&self) -> Duration {
        self.main_end() + self.end_length
    }

    fn jump_to(&mut self, target: Duration) {
        if self.position == target {
            return;
        }
        self.delta = TimeDelta::between(self.position, target);
        self.position = target;
    }

    /// Offset of `position` inside the main segment, folded by its length.
    fn fold_into_main(&self, past_start: Duration) -> Duration {
        let folded = past_start.as_nanos() % self.main_length.as_nanos();
        self.main_start() + Duration::from_nanos(folded as u64)
    }
}

/// Animation clock with start, main and end segments.
pub struct Timeline {
    state: Mutex<TimelineState>,
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Timeline {
    /// Creates a timeline with an empty start and end segment and a five second main segment.
    pub fn new() -> Self {
        Self::with_segments(Duration::ZERO, DEFAULT_MAIN_LENGTH, Duration::ZERO)
    }

    pub fn with_segments(start: Duration, main: Duration, end: Duration) -> Self {
        Self {
            state: Mutex::new(TimelineState {
                start_length: start,
                main_length: main,
                end_length: end,
                ..TimelineState::default()
            }),
        }
    }

    pub fn from_entity(entity: &TimelineEntity) -> Self {
        Self::with_segments(
            entity.start_segment_length,
            entity.main_segment_length,
            entity.end_segment_length,
        )
    }

    pub fn to_entity(&self) -> TimelineEntity {
        let state = self.state.lock();
        TimelineEntity {
            start_segment_length: state.start_length,
            main_segment_length: state.main_length,
            end_segment_length: state.end_length,
        }
    }

    // -- Queries --

    pub fn position(&self) -> Duration {
        self.state.lock().position
    }

    /// Distance travelled since the last [`clear_delta`](Self::clear_delta).
    pub fn delta(&self) -> TimeDelta {
        self.state.lock().delta
    }

    pub fn is_overridden(&self) -> bool {
        self.state.lock().overridden
    }

    pub fn length(&self) -> Duration {
        self.state.lock().length()
    }

    pub fn start_segment_length(&self) -> Duration {
        self.state.lock().start_length
    }

    pub fn main_segment_length(&self) -> Duration {
        self.state.lock().main_length
    }

    pub fn end_segment_length(&self) -> Duration {
        self.state.lock().end_length
    }

    pub fn main_segment_start_position(&self) -> Duration {
        self.state.lock().main_start()
    }

    pub fn main_segment_end_position(&self) -> Duration {
        self.state.lock().main_end()
    }

    pub fn end_segment_start_position(&self) -> Duration {
        self.state.lock().main_end()
    }

    pub fn end_segment_end_position(&self) -> Duration {
        self.state.lock().length()
    }

    pub fn is_finished(&self) -> bool {
        let state = self.state.lock();
        state.position > state.length()
    }

    pub fn is_in_start_segment(&self) -> bool {
        let state = self.state.lock();
        state.position < state.main_start()
    }

    pub fn is_in_main_segment(&self) -> bool {
        let state = self.state.lock();
        state.position >= state.main_start() && state.position < state.main_end()
    }

    pub fn is_in_end_segment(&self) -> bool {
        let state = self.state.lock();
        state.position >= state.main_end()
    }

    /// Position as a fraction of the total length, clamped to [0, 1].
    pub fn progress(&self) -> f64 {
        let state = self.state.lock();
        let length = state.length();
        if length.is_zero() {
            return 1.0;
        }
        (state.position.as_secs_f64() / length.as_secs_f64()).clamp(0.0, 1.0)
    }

    // -- Segment layout --

    pub fn set_start_segment_length(&self, length: Duration) {
        self.state.lock().start_length = length;
    }

    pub fn set_main_segment_length(&self, length: Duration) {
        self.state.lock().main_length = length;
    }

    pub fn set_end_segment_length(&self, length: Duration) {
        self.state.lock().end_length = length;
    }

    /// Moves the start/main boundary. The main segment absorbs the change so
    /// its end stays where it was, shrinking to zero if overtaken.
    pub fn set_start_segment_end_position(&self, position: Duration) {
        let mut state = self.state.lock();
        let main_end = state.main_end();
        state.start_length = position;
        state.main_length = main_end.saturating_sub(position);
    }

    /// Moves the main/end boundary. The end segment absorbs the change.
    pub fn set_main_segment_end_position(&self, position: Duration) {
        let mut state = self.state.lock();
        let end = state.length();
        state.main_length = position.saturating_sub(state.start_length);
        state.end_length = end.saturating_sub(state.main_end());
    }

    pub fn set_end_segment_end_position(&self, position: Duration) {
        let mut state = self.state.lock();
        state.end_length = position.saturating_sub(state.main_end());
    }

    // -- Playback --

    /// Advances the clock by `delta`.
    ///
    /// With `stick_to_main_segment` the position never leaves the main segment
    /// once it has entered it: running past the end folds the overshoot back
    /// to the main start. A zero-length main segment pins the position to its start.
    pub fn update(&self, delta: Duration, stick_to_main_segment: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.overridden {
            return Err(LightweaveError::TimelineOverridden);
        }

        state.delta += TimeDelta::from_duration(delta);
        state.position += delta;

        if stick_to_main_segment && state.position >= state.main_end() {
            state.position = if state.main_length.is_zero() {
                state.main_start()
            } else {
                let overshoot = state.position - state.main_end();
                state.fold_into_main(overshoot)
            };
        }
        Ok(())
    }

    pub fn jump_to_start(&self) {
        self.state.lock().jump_to(Duration::ZERO);
    }

    pub fn jump_to_end_segment(&self) {
        let mut state = self.state.lock();
        let target = state.main_end();
        state.jump_to(target);
    }

    pub fn jump_to_end(&self) {
        let mut state = self.state.lock();
        let target = state.length();
        state.jump_to(target);
    }

    /// Places the cursor at `position` on behalf of an editor, disabling
    /// [`update`](Self::update) until [`clear_override`](Self::clear_override).
    ///
    /// The delta is measured from the previous override call. The first call
    /// after a clear measures from the live position, so scrubbing picks up
    /// where playback left off.
    pub fn override_position(&self, position: Duration, stick_to_main_segment: bool) {
        let mut state = self.state.lock();
        let baseline = state.last_override.unwrap_or(state.position);
        state.delta += TimeDelta::between(baseline, position);
        state.position = position;
        state.overridden = true;
        state.last_override = Some(position);

        if stick_to_main_segment && position >= state.main_start() {
            if state.main_length.is_zero() {
                state.position = state.main_start();
                return;
            }
            let at_segment_start = position == state.main_start();
            let wrapped = state.fold_into_main(position - state.main_start());
            // Landing exactly on a multiple of the main length means the cursor
            // sits on the segment's end, not at a fresh start.
            state.position = if wrapped == state.main_start() && !at_segment_start {
                state.main_end()
            } else {
                wrapped
            };
        }
    }

    pub fn clear_override(&self) {
        let mut state = self.state.lock();
        state.overridden = false;
        state.last_override = None;
    }

    pub fn clear_delta(&self) {
        self.state.lock().delta = TimeDelta::ZERO;
    }
}

impl fmt::Debug for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Timeline")
            .field("position", &state.position)
            .field("start", &state.start_length)
            .field("main", &state.main_length)
            .field("end", &state.end_length)
            .field("overridden", &state.overridden)
            .finish()
    }
}
