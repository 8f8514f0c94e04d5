//! The scalar animation primitive every moving part is built from.
//!
//! A `ScalarAnimation` holds one numeric value and a FIFO queue of targets.
//! Each call to [`advance`](ScalarAnimation::advance) moves the value along
//! the current leg; when a leg completes the value snaps to the target and
//! the next queued target becomes the new leg.
//!
//! An animation can also be *synced* to another one. A synced animation is
//! halted and rides the source's per-frame deltas until it is desynced.

use crate::activity::ActivityTracker;
use crate::bus::{Cause, Condition, EventBus, WeakEventBus};
use crate::common::{check_time_scale, SubscriptionId};
use crate::error::{MachineError, Result};
use crate::events::AnimationEvent;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

/// A pure blend `(a, b, k) -> value` with `k` in `[0, 1]`.
pub type Interpolation = fn(f64, f64, f64) -> f64;

/// Linear blend between `a` and `b`.
#[inline]
pub fn linear(a: f64, b: f64, k: f64) -> f64 {
    a + (b - a) * k
}

/// Cubic ease-in/out: `y = 3k² − 2k³`, applied through the linear blend.
#[inline]
pub fn cubic_in_out(a: f64, b: f64, k: f64) -> f64 {
    let y = k * k * (3.0 - 2.0 * k);
    linear(a, b, y)
}

/// The named curves a configuration file can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    CubicInOut,
}

impl Easing {
    pub fn interpolation(self) -> Interpolation {
        match self {
            Easing::Linear => linear,
            Easing::CubicInOut => cubic_in_out,
        }
    }
}

struct Follow {
    source: Weak<RefCell<AnimationState>>,
    source_events: EventBus<AnimationEvent, f64>,
    subscription: SubscriptionId,
}

struct AnimationState {
    zero_state: f64,
    current_state: f64,
    targets: VecDeque<f64>,
    advance_factor: f64,
    time_scale: f64,
    halted: bool,
    interpolation: Interpolation,
    follow: Option<Follow>,
}

/// A continuously interpolated value with a queue of future targets.
///
/// Cloning yields another handle to the same animation.
#[derive(Clone)]
pub struct ScalarAnimation {
    state: Rc<RefCell<AnimationState>>,
    events: EventBus<AnimationEvent, f64>,
    activity: ActivityTracker,
}

/// A non-owning handle to a [`ScalarAnimation`], for subscribers that live
/// on the animation's own bus.
#[derive(Clone)]
pub struct WeakAnimation {
    state: Weak<RefCell<AnimationState>>,
    events: WeakEventBus<AnimationEvent, f64>,
    activity: ActivityTracker,
}

impl WeakAnimation {
    pub fn upgrade(&self) -> Option<ScalarAnimation> {
        Some(ScalarAnimation {
            state: self.state.upgrade()?,
            events: self.events.upgrade()?,
            activity: self.activity.clone(),
        })
    }
}

impl fmt::Debug for ScalarAnimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.state.borrow();
        f.debug_struct("ScalarAnimation")
            .field("current_state", &s.current_state)
            .field("targets", &s.targets)
            .field("advance_factor", &s.advance_factor)
            .field("halted", &s.halted)
            .field("synced", &s.follow.is_some())
            .finish()
    }
}

impl ScalarAnimation {
    /// Creates a linear animation resting at `initial`.
    ///
    /// `time_scale` is the number of seconds one leg takes.
    pub fn new(initial: f64, time_scale: f64, activity: ActivityTracker) -> Result<Self> {
        check_time_scale(time_scale)?;
        Ok(Self {
            state: Rc::new(RefCell::new(AnimationState {
                zero_state: initial,
                current_state: initial,
                targets: VecDeque::new(),
                advance_factor: 0.0,
                time_scale,
                halted: false,
                interpolation: linear,
                follow: None,
            })),
            events: EventBus::new(),
            activity,
        })
    }

    /// Replaces the interpolation curve.
    pub fn with_interpolation(self, interpolation: Interpolation) -> Self {
        self.state.borrow_mut().interpolation = interpolation;
        self
    }

    pub fn with_easing(self, easing: Easing) -> Self {
        self.with_interpolation(easing.interpolation())
    }

    pub fn events(&self) -> &EventBus<AnimationEvent, f64> {
        &self.events
    }

    pub fn downgrade(&self) -> WeakAnimation {
        WeakAnimation {
            state: Rc::downgrade(&self.state),
            events: self.events.downgrade(),
            activity: self.activity.clone(),
        }
    }

    /// Shorthand for subscribing to this animation's bus.
    pub fn subscribe(
        &self,
        kind: AnimationEvent,
        handler: impl Fn(&f64) -> Result<()> + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(kind, handler)
    }

    /// Shorthand for a conditional subscription on this animation's bus.
    pub fn subscribe_when(
        &self,
        kind: AnimationEvent,
        condition: Condition,
        handler: impl Fn(&f64) -> Result<()> + 'static,
    ) -> SubscriptionId {
        self.events.subscribe_when(kind, condition, handler)
    }

    pub fn state(&self) -> f64 {
        self.state.borrow().current_state
    }

    /// The value the animation will rest at once every queued leg has run.
    pub fn final_target(&self) -> f64 {
        let s = self.state.borrow();
        s.targets.back().copied().unwrap_or(s.current_state)
    }

    pub fn pending_targets(&self) -> usize {
        self.state.borrow().targets.len()
    }

    /// `true` if no leg is queued.
    pub fn is_idle(&self) -> bool {
        self.state.borrow().targets.is_empty()
    }

    pub fn is_halted(&self) -> bool {
        self.state.borrow().halted
    }

    pub fn is_synced(&self) -> bool {
        self.state.borrow().follow.is_some()
    }

    pub fn is_synced_to(&self, other: &ScalarAnimation) -> bool {
        self.state
            .borrow()
            .follow
            .as_ref()
            .is_some_and(|f| f.source.ptr_eq(&Rc::downgrade(&other.state)))
    }

    /// Queues `target` as the next leg.
    ///
    /// Legal while halted: the leg waits until the animation resumes.
    pub fn set_target(&self, target: f64) {
        self.state.borrow_mut().targets.push_back(target);
        self.activity.leg_queued();
        trace!(target, "animation target queued");
    }

    pub fn halt(&self) {
        self.state.borrow_mut().halted = true;
    }

    /// Resumes a halted animation. Queued legs are kept.
    pub fn resume(&self) {
        self.state.borrow_mut().halted = false;
    }

    /// Moves the animation `delta_ms` milliseconds along its current leg.
    ///
    /// Does nothing while halted or idle. Otherwise publishes `StateChanged`
    /// and `StatePassed`, followed by `TargetReached` if the leg completed.
    pub fn advance(&self, delta_ms: f64) -> Result<()> {
        let (previous, current, reached) = {
            let mut s = self.state.borrow_mut();
            if s.halted {
                return Ok(());
            }
            let Some(&target) = s.targets.front() else {
                return Ok(());
            };
            let previous = s.current_state;
            s.advance_factor += delta_ms.max(0.0) * 1e-3 / s.time_scale;
            let reached = if s.advance_factor >= 1.0 {
                s.current_state = target;
                s.zero_state = target;
                s.targets.pop_front();
                s.advance_factor = 0.0;
                true
            } else {
                s.current_state = (s.interpolation)(s.zero_state, target, s.advance_factor);
                false
            };
            (previous, s.current_state, reached)
        };

        if reached {
            self.activity.legs_finished(1);
            trace!(state = current, "animation leg completed");
        }
        publish(&self.events, previous, current)?;
        if reached {
            self.events
                .emit(AnimationEvent::TargetReached, &current, None)?;
        }
        Ok(())
    }

    /// Halts this animation and makes it ride `other`'s per-frame deltas.
    ///
    /// Syncing again to the same source is a no-op. Syncing to a second
    /// source without desyncing first is a protocol error.
    pub fn sync(&self, other: &ScalarAnimation) -> Result<()> {
        if Rc::ptr_eq(&self.state, &other.state) {
            return Err(MachineError::SelfSync);
        }
        if let Some(follow) = &self.state.borrow().follow {
            return if follow.source.ptr_eq(&Rc::downgrade(&other.state)) {
                Ok(())
            } else {
                Err(MachineError::AlreadySynced)
            };
        }

        let follower = Rc::downgrade(&self.state);
        let events = self.events.clone();
        let subscription = other
            .events
            .subscribe(AnimationEvent::StateChanged, move |delta| {
                let Some(state) = follower.upgrade() else {
                    return Ok(());
                };
                let (previous, current) = {
                    let mut s = state.borrow_mut();
                    let previous = s.current_state;
                    s.current_state += *delta;
                    (previous, s.current_state)
                };
                publish(&events, previous, current)
            });

        let mut s = self.state.borrow_mut();
        s.halted = true;
        s.follow = Some(Follow {
            source: Rc::downgrade(&other.state),
            source_events: other.events.clone(),
            subscription,
        });
        debug!("animation synced to source");
        Ok(())
    }

    /// Detaches from `other`, discards every queued leg and resumes from the
    /// present state.
    ///
    /// Desyncing an animation that follows nothing still flushes and resumes
    /// it. Desyncing from a source other than the one being followed is a
    /// protocol error.
    pub fn desync(&self, other: &ScalarAnimation) -> Result<()> {
        let (follow, flushed) = {
            let mut s = self.state.borrow_mut();
            if let Some(follow) = &s.follow {
                if !follow.source.ptr_eq(&Rc::downgrade(&other.state)) {
                    return Err(MachineError::WrongSyncSource);
                }
            }
            let follow = s.follow.take();
            let flushed = s.targets.len();
            s.targets.clear();
            s.advance_factor = 0.0;
            s.zero_state = s.current_state;
            s.halted = false;
            (follow, flushed)
        };

        if let Some(follow) = follow {
            follow
                .source_events
                .unsubscribe(AnimationEvent::StateChanged, follow.subscription);
        }
        self.activity.legs_finished(flushed);
        debug!(flushed, "animation desynced");
        Ok(())
    }
}

fn publish(events: &EventBus<AnimationEvent, f64>, previous: f64, current: f64) -> Result<()> {
    events.emit(AnimationEvent::StateChanged, &(current - previous), None)?;
    events.emit(
        AnimationEvent::StatePassed,
        &current,
        Some(Cause::new(previous, current)),
    )
}
