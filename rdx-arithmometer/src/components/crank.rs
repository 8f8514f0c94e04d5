//! The operation handle: a crank that is pushed out, turned once, and let back.
//!
//! A [`Crank`] only models the push-out/retract axis. The
//! [`OperationHandle`] composes it with an independent rotation animation and
//! drives the full cycle: extrude, one full turn, retract. Every completed
//! turn is published as a [`HandleEvent::Revolution`].

use crate::activity::ActivityTracker;
use crate::bus::EventBus;
use crate::common::{check_extrusion, near, SubscriptionId, FULL_TURN};
use crate::components::animation::{Easing, ScalarAnimation};
use crate::config::CrankConfig;
use crate::error::Result;
use crate::events::{CrankEvent, HandleEvent, MotionSignal};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Where a crank is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrankPhase {
    /// Retracted and ready to be turned.
    Idle,
    /// Moving out along its axis.
    Extrude,
    /// Fully out; the handle may turn.
    Rotating,
    /// Retracting back to rest.
    AtRest,
}

struct CrankControl {
    phase: CrankPhase,
    limit_reached: bool,
}

struct CrankInner {
    rest: f64,
    extruded: f64,
    animation: ScalarAnimation,
    control: RefCell<CrankControl>,
    events: EventBus<CrankEvent, MotionSignal>,
}

/// The push-out axis of the operation handle.
///
/// Cloning yields another handle to the same crank.
#[derive(Clone)]
pub struct Crank {
    inner: Rc<CrankInner>,
}

impl fmt::Debug for Crank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crank")
            .field("phase", &self.phase())
            .field("position", &self.position())
            .finish()
    }
}

impl Crank {
    /// Creates a crank resting at `0.0` that travels to `extrusion` when
    /// pushed out. Each leg takes `time_scale` seconds.
    pub fn new(extrusion: f64, time_scale: f64, activity: ActivityTracker) -> Result<Self> {
        check_extrusion(extrusion)?;
        let animation = ScalarAnimation::new(0.0, time_scale, activity)?;
        Ok(Self {
            inner: Rc::new(CrankInner {
                rest: 0.0,
                extruded: extrusion,
                animation,
                control: RefCell::new(CrankControl {
                    phase: CrankPhase::Idle,
                    limit_reached: true,
                }),
                events: EventBus::new(),
            }),
        })
    }

    pub fn phase(&self) -> CrankPhase {
        self.inner.control.borrow().phase
    }

    /// `true` from the moment it is pushed out until it is back at rest.
    pub fn is_busy(&self) -> bool {
        self.phase() != CrankPhase::Idle
    }

    pub fn position(&self) -> f64 {
        self.inner.animation.state()
    }

    pub fn animation(&self) -> &ScalarAnimation {
        &self.inner.animation
    }

    pub fn events(&self) -> &EventBus<CrankEvent, MotionSignal> {
        &self.inner.events
    }

    pub fn subscribe(
        &self,
        kind: CrankEvent,
        handler: impl Fn(&MotionSignal) -> Result<()> + 'static,
    ) -> SubscriptionId {
        self.inner.events.subscribe(kind, handler)
    }

    /// Pushes the crank out.
    ///
    /// Ignored, returning `false`, unless the crank is idle.
    pub fn extrude(&self) -> Result<bool> {
        if self.is_busy() {
            warn!(phase = ?self.phase(), "crank is mid-cycle, extrude ignored");
            return Ok(false);
        }
        self.start(CrankPhase::Extrude, self.inner.extruded);
        self.publish(CrankEvent::Extrude)?;
        Ok(true)
    }

    /// Retracts an extruded crank.
    ///
    /// Only meaningful while [`CrankPhase::Rotating`]; returns `false` otherwise.
    pub fn reset(&self) -> Result<bool> {
        if self.phase() != CrankPhase::Rotating {
            debug!(phase = ?self.phase(), "crank is not out, reset ignored");
            return Ok(false);
        }
        self.start(CrankPhase::AtRest, self.inner.rest);
        Ok(true)
    }

    pub fn advance(&self, delta_ms: f64) -> Result<()> {
        self.inner.animation.advance(delta_ms)?;

        let position = self.position();
        let event = {
            let mut control = self.inner.control.borrow_mut();
            let goal = match control.phase {
                CrankPhase::Extrude => Some((self.inner.extruded, CrankEvent::Extruded)),
                CrankPhase::AtRest => Some((self.inner.rest, CrankEvent::AtRest)),
                CrankPhase::Idle | CrankPhase::Rotating => None,
            };
            match goal {
                Some((target, event)) if !control.limit_reached && near(position, target) => {
                    control.limit_reached = true;
                    control.phase = match event {
                        CrankEvent::Extruded => CrankPhase::Rotating,
                        _ => CrankPhase::Idle,
                    };
                    Some(event)
                }
                _ => None,
            }
        };

        match event {
            Some(event) => {
                debug!(?event, position, "crank reached its limit");
                self.publish(event)
            }
            None => Ok(()),
        }
    }

    fn start(&self, phase: CrankPhase, target: f64) {
        {
            let mut control = self.inner.control.borrow_mut();
            control.phase = phase;
            control.limit_reached = false;
        }
        self.inner.animation.set_target(target);
    }

    fn publish(&self, event: CrankEvent) -> Result<()> {
        self.inner.events.emit(
            event,
            &MotionSignal {
                state: self.position(),
            },
            None,
        )
    }
}

/// The crank together with the shaft it turns.
pub struct OperationHandle {
    crank: Crank,
    rotation: ScalarAnimation,
    revolutions: Cell<u64>,
    events: EventBus<HandleEvent, u64>,
}

impl fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandle")
            .field("crank", &self.crank)
            .field("rotation", &self.rotation.state())
            .field("revolutions", &self.revolutions.get())
            .finish()
    }
}

impl OperationHandle {
    pub fn new(config: &CrankConfig, activity: ActivityTracker) -> Result<Self> {
        config.validate()?;
        let crank = Crank::new(config.extrusion, config.extrude_time_scale, activity.clone())?;
        let rotation = ScalarAnimation::new(0.0, config.rotation_time_scale, activity)?
            .with_easing(Easing::CubicInOut);

        let shaft = rotation.clone();
        crank.subscribe(CrankEvent::Extruded, move |_| {
            shaft.set_target(shaft.final_target() + FULL_TURN);
            Ok(())
        });

        Ok(Self {
            crank,
            rotation,
            revolutions: Cell::new(0),
            events: EventBus::new(),
        })
    }

    pub fn crank(&self) -> &Crank {
        &self.crank
    }

    /// The shaft angle, growing by one full turn per cycle.
    pub fn rotation(&self) -> &ScalarAnimation {
        &self.rotation
    }

    pub fn phase(&self) -> CrankPhase {
        self.crank.phase()
    }

    pub fn is_busy(&self) -> bool {
        self.crank.is_busy()
    }

    /// Completed turns since construction.
    pub fn revolutions(&self) -> u64 {
        self.revolutions.get()
    }

    pub fn events(&self) -> &EventBus<HandleEvent, u64> {
        &self.events
    }

    pub fn subscribe(
        &self,
        kind: HandleEvent,
        handler: impl Fn(&u64) -> Result<()> + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(kind, handler)
    }

    /// Starts one full cycle of the handle.
    ///
    /// A turn requested while a cycle is in progress is ignored and returns
    /// `false`.
    pub fn turn(&self) -> Result<bool> {
        self.crank.extrude()
    }

    pub fn advance(&self, delta_ms: f64) -> Result<()> {
        self.crank.advance(delta_ms)?;
        self.rotation.advance(delta_ms)?;

        if self.crank.phase() == CrankPhase::Rotating
            && self.crank.animation().is_idle()
            && self.rotation.is_idle()
        {
            let count = self.revolutions.get() + 1;
            self.revolutions.set(count);
            info!(revolutions = count, "operation handle completed a turn");
            self.events.emit(HandleEvent::Revolution, &count, None)?;
            self.crank.reset()?;
        }
        Ok(())
    }
}
