use serde::{Deserialize, Serialize};

use crate::property::DataModel;
use crate::render::FrameContext;
use crate::timeline::{EventOverlapMode, PlayMode, StopMode, Timeline};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

/// Compares a data model value against a constant. An unresolvable path
/// never matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub path: String,
    pub comparison: Comparison,
    pub value: f64,
}

impl Predicate {
    pub fn new(path: impl Into<String>, comparison: Comparison, value: f64) -> Self {
        Self {
            path: path.into(),
            comparison,
            value,
        }
    }

    pub fn evaluate(&self, data: &DataModel) -> bool {
        let Some(actual) = data.value(&self.path) else {
            return false;
        };
        match self.comparison {
            Comparison::Equal => actual == self.value,
            Comparison::NotEqual => actual != self.value,
            Comparison::Greater => actual > self.value,
            Comparison::GreaterOrEqual => actual >= self.value,
            Comparison::Less => actual < self.value,
            Comparison::LessOrEqual => actual <= self.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticCondition {
    pub predicate: Predicate,
    #[serde(default)]
    pub play_mode: PlayMode,
    #[serde(default)]
    pub stop_mode: StopMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCondition {
    /// Name of the event counter in the data model.
    pub event: String,
    #[serde(default)]
    pub overlap: EventOverlapMode,
}

/// Decides each frame whether an element shows and how its timeline moves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DisplayCondition {
    /// Always shown, looping the main segment.
    #[default]
    AlwaysOn,
    /// Plays the whole timeline once after activation.
    PlayOnce,
    Static(StaticCondition),
    Event(EventCondition),
}

/// Per-element bookkeeping carried between frames by a condition.
#[derive(Debug, Clone, Default)]
pub struct ConditionRuntime {
    was_met: bool,
    finishing: bool,
    playing: bool,
    toggled: bool,
    last_event_count: Option<u64>,
}

impl ConditionRuntime {
    pub(crate) fn suspend(&mut self) {
        self.was_met = false;
        self.finishing = false;
        self.playing = false;
        self.toggled = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionOutcome {
    pub met: bool,
    pub should_be_enabled: bool,
}

impl ConditionOutcome {
    pub const UNMET: Self = Self {
        met: false,
        should_be_enabled: false,
    };
}

impl DisplayCondition {
    /// Evaluates the condition and advances `timeline` the way this variant plays it.
    pub(crate) fn update(
        &self,
        runtime: &mut ConditionRuntime,
        timeline: &Timeline,
        ctx: &FrameContext<'_>,
    ) -> Result<ConditionOutcome> {
        let outcome = match self {
            Self::AlwaysOn => {
                if !runtime.was_met {
                    timeline.jump_to_start();
                }
                timeline.update(ctx.delta, true)?;
                ConditionOutcome {
                    met: true,
                    should_be_enabled: true,
                }
            }
            Self::PlayOnce => {
                if !runtime.was_met {
                    timeline.jump_to_start();
                }
                if !timeline.is_finished() {
                    timeline.update(ctx.delta, false)?;
                }
                ConditionOutcome {
                    met: true,
                    should_be_enabled: !timeline.is_finished(),
                }
            }
            Self::Static(condition) => condition.update(runtime, timeline, ctx)?,
            Self::Event(condition) => condition.update(runtime, timeline, ctx)?,
        };
        runtime.was_met = outcome.met;
        Ok(outcome)
    }
}

impl StaticCondition {
    fn update(
        &self,
        runtime: &mut ConditionRuntime,
        timeline: &Timeline,
        ctx: &FrameContext<'_>,
    ) -> Result<ConditionOutcome> {
        let met = self.predicate.evaluate(ctx.data);

        if met && !runtime.was_met {
            runtime.finishing = false;
            timeline.jump_to_start();
        } else if !met && runtime.was_met {
            match self.stop_mode {
                StopMode::SkipToEnd => timeline.jump_to_end(),
                StopMode::Finish => runtime.finishing = true,
            }
        }

        if met {
            if !timeline.is_finished() {
                timeline.update(ctx.delta, self.play_mode == PlayMode::Repeat)?;
            }
        } else if runtime.finishing {
            if !timeline.is_finished() {
                timeline.update(ctx.delta, false)?;
            }
            runtime.finishing = !timeline.is_finished();
        }

        Ok(ConditionOutcome {
            met,
            should_be_enabled: (met || runtime.finishing) && !timeline.is_finished(),
        })
    }
}

impl EventCondition {
    fn update(
        &self,
        runtime: &mut ConditionRuntime,
        timeline: &Timeline,
        ctx: &FrameContext<'_>,
    ) -> Result<ConditionOutcome> {
        let count = ctx.data.event_count(&self.event);
        // The first frame only records a baseline so past events do not replay.
        let triggered = runtime
            .last_event_count
            .replace(count)
            .is_some_and(|last| count > last);

        if triggered {
            match self.overlap {
                EventOverlapMode::Restart => {
                    timeline.jump_to_start();
                    runtime.playing = true;
                }
                EventOverlapMode::Ignore => {
                    if !runtime.playing {
                        timeline.jump_to_start();
                        runtime.playing = true;
                    }
                }
                EventOverlapMode::Toggle => {
                    runtime.toggled = !runtime.toggled;
                    if runtime.toggled {
                        timeline.jump_to_start();
                        runtime.playing = true;
                    }
                }
            }
        }

        if runtime.playing {
            timeline.update(ctx.delta, runtime.toggled)?;
            if timeline.is_finished() {
                runtime.playing = false;
            }
        }

        Ok(ConditionOutcome {
            met: runtime.playing,
            should_be_enabled: runtime.playing,
        })
    }
}
