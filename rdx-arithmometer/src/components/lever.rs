//! A two-position pull lever that returns to rest on its own.

use crate::activity::ActivityTracker;
use crate::bus::EventBus;
use crate::common::{near, SubscriptionId};
use crate::components::animation::ScalarAnimation;
use crate::config::LeverConfig;
use crate::error::Result;
use crate::events::{LeverEvent, MotionSignal};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Where a lever is in its pull/return cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeverState {
    Rest,
    Pulling,
    Pulled,
    Pushing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stroke {
    Pull,
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeverCommand {
    PushUp,
}

/// Commands a lever issues on itself after publishing an event.
const AUTO_TRANSITIONS: &[(LeverEvent, LeverCommand)] =
    &[(LeverEvent::PullDownDone, LeverCommand::PushUp)];

struct Control {
    stroke: Stroke,
    /// Set once the goal of the current stroke has been confirmed.
    limit_reached: bool,
}

struct LeverInner {
    label: String,
    min_angle: f64,
    max_angle: f64,
    animation: ScalarAnimation,
    control: RefCell<Control>,
    events: EventBus<LeverEvent, MotionSignal>,
}

/// A pull lever. Cloning yields another handle to the same lever.
#[derive(Clone)]
pub struct Lever {
    inner: Rc<LeverInner>,
}

impl fmt::Debug for Lever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lever")
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .field("angle", &self.angle())
            .finish()
    }
}

impl Lever {
    pub fn new(
        label: impl Into<String>,
        config: &LeverConfig,
        activity: ActivityTracker,
    ) -> Result<Self> {
        config.validate()?;
        let animation = ScalarAnimation::new(config.min_angle, config.time_scale, activity)?
            .with_easing(config.easing);
        Ok(Self {
            inner: Rc::new(LeverInner {
                label: label.into(),
                min_angle: config.min_angle,
                max_angle: config.max_angle,
                animation,
                control: RefCell::new(Control {
                    stroke: Stroke::Push,
                    limit_reached: true,
                }),
                events: EventBus::new(),
            }),
        })
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn min_angle(&self) -> f64 {
        self.inner.min_angle
    }

    pub fn max_angle(&self) -> f64 {
        self.inner.max_angle
    }

    pub fn angle(&self) -> f64 {
        self.inner.animation.state()
    }

    pub fn animation(&self) -> &ScalarAnimation {
        &self.inner.animation
    }

    pub fn events(&self) -> &EventBus<LeverEvent, MotionSignal> {
        &self.inner.events
    }

    pub fn subscribe(
        &self,
        kind: LeverEvent,
        handler: impl Fn(&MotionSignal) -> Result<()> + 'static,
    ) -> SubscriptionId {
        self.inner.events.subscribe(kind, handler)
    }

    pub fn state(&self) -> LeverState {
        let control = self.inner.control.borrow();
        match (control.stroke, control.limit_reached) {
            (Stroke::Pull, false) => LeverState::Pulling,
            (Stroke::Pull, true) => LeverState::Pulled,
            (Stroke::Push, false) => LeverState::Pushing,
            (Stroke::Push, true) => LeverState::Rest,
        }
    }

    /// `true` while the lever rides another animation.
    pub fn is_following(&self) -> bool {
        self.inner.animation.is_synced()
    }

    /// Starts pulling the lever.
    ///
    /// Returns `false`, and does nothing, if the lever is already on its way
    /// down or fully pulled.
    pub fn pull_down(&self) -> Result<bool> {
        if matches!(self.state(), LeverState::Pulling | LeverState::Pulled) {
            warn!(lever = %self.inner.label, "pull ignored, lever already pulled");
            return Ok(false);
        }
        self.start_stroke(Stroke::Pull, self.inner.max_angle);
        self.publish(LeverEvent::PullDown)?;
        Ok(true)
    }

    /// Starts returning the lever to rest.
    pub fn push_up(&self) -> Result<()> {
        self.start_stroke(Stroke::Push, self.inner.min_angle);
        self.publish(LeverEvent::PushUp)
    }

    pub fn advance(&self, delta_ms: f64) -> Result<()> {
        self.inner.animation.advance(delta_ms)?;

        let angle = self.angle();
        let confirmed = {
            let mut control = self.inner.control.borrow_mut();
            let goal = match control.stroke {
                Stroke::Pull => (self.inner.max_angle, LeverEvent::PullDownDone),
                Stroke::Push => (self.inner.min_angle, LeverEvent::PushUpDone),
            };
            if !control.limit_reached && near(angle, goal.0) {
                control.limit_reached = true;
                Some(goal.1)
            } else {
                None
            }
        };

        if let Some(event) = confirmed {
            info!(lever = %self.inner.label, ?event, "lever reached its limit");
            self.publish(event)?;
            for (trigger, command) in AUTO_TRANSITIONS {
                if *trigger == event {
                    self.run(*command)?;
                }
            }
        }
        Ok(())
    }

    fn run(&self, command: LeverCommand) -> Result<()> {
        match command {
            LeverCommand::PushUp => self.push_up(),
        }
    }

    fn start_stroke(&self, stroke: Stroke, target: f64) {
        {
            let mut control = self.inner.control.borrow_mut();
            control.stroke = stroke;
            control.limit_reached = false;
        }
        self.inner.animation.set_target(target);
        debug!(lever = %self.inner.label, ?stroke, target, "lever stroke started");
    }

    fn publish(&self, event: LeverEvent) -> Result<()> {
        self.inner.events.emit(
            event,
            &MotionSignal {
                state: self.angle(),
            },
            None,
        )
    }
}
