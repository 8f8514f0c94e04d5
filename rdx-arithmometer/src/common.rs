//! Contains common, primitive types and shared constants.
//!
//! This module defines the ID types used to identify subscriptions on an
//! [`EventBus`](crate::bus::EventBus), together with the numeric constants
//! every state machine agrees on.

use slotmap::new_key_type;

new_key_type! {
    /// Uniquely and safely identifies a subscription on an event bus.
    ///
    /// This key is returned when a handler is subscribed and is the token used
    /// to unsubscribe it again. Keys are never reused, so a stale token can not
    /// remove somebody else's handler.
    pub struct SubscriptionId;
}

/// Distance under which a state counts as having reached a limit.
pub const LIMIT_EPSILON: f64 = 1e-3;

/// One full revolution, in radians.
pub const FULL_TURN: f64 = std::f64::consts::TAU;

/// Returns `true` if `a` and `b` are within [`LIMIT_EPSILON`] of each other.
#[inline]
pub fn near(a: f64, b: f64) -> bool {
    (a - b).abs() < LIMIT_EPSILON
}

/// Validates a leg duration in seconds.
pub(crate) fn check_time_scale(time_scale: f64) -> crate::error::Result<()> {
    if time_scale.is_finite() && time_scale > 0.0 {
        Ok(())
    } else {
        Err(crate::error::MachineError::InvalidTimeScale(time_scale))
    }
}

/// Validates a `(min, max)` angle pair. The span must be wider than
/// [`LIMIT_EPSILON`] or the first frame would already count as arrived.
pub(crate) fn check_angle_limits(min: f64, max: f64) -> crate::error::Result<()> {
    if min.is_finite() && max.is_finite() && max - min > LIMIT_EPSILON {
        Ok(())
    } else {
        Err(crate::error::MachineError::InvalidAngleLimits { min, max })
    }
}

/// Validates how far a crank travels out of its rest position at `0.0`.
pub(crate) fn check_extrusion(extrusion: f64) -> crate::error::Result<()> {
    if extrusion.is_finite() && extrusion.abs() > LIMIT_EPSILON {
        Ok(())
    } else {
        Err(crate::error::MachineError::InvalidExtrusion {
            rest: 0.0,
            extruded: extrusion,
        })
    }
}
