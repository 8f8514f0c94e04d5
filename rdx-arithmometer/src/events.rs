//! Defines every event kind and payload the state machines publish.
//!
//! Each machine owns an [`EventBus`](crate::bus::EventBus) keyed by its own
//! kind enum. Subscribers pick the kinds they care about and receive the
//! machine's payload type.

/// Events published by a [`ScalarAnimation`](crate::components::animation::ScalarAnimation).
///
/// Payloads are plain `f64` values; see each variant for what they carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnimationEvent {
    /// Carries `current - previous` for the frame. Fires even when the delta is zero.
    StateChanged,
    /// Carries the new state; the emission's cause is `(previous, current)`,
    /// so crossing conditions can be attached to it.
    StatePassed,
    /// Carries the state a leg just snapped to.
    TargetReached,
}

/// Events published by a [`WheelBank`](crate::components::wheel::WheelBank).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WheelEvent {
    Increment,
    Decrement,
}

/// Payload of a [`WheelEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitChange {
    /// Index of the rotated digit, least significant first.
    pub digit: usize,
    /// Signed number of steps the wheel was turned.
    pub amount: i64,
    /// Digit value after the rotation.
    pub value: u32,
}

/// Events published by a [`Lever`](crate::components::lever::Lever).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeverEvent {
    PullDown,
    PullDownDone,
    PushUp,
    PushUpDone,
}

/// Events published by a [`Crank`](crate::components::crank::Crank).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrankEvent {
    Extrude,
    Extruded,
    AtRest,
}

/// Events published by an [`OperationHandle`](crate::components::crank::OperationHandle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleEvent {
    /// One full turn of the handle completed. Carries the running revolution count.
    Revolution,
}

/// Payload shared by lever and crank events: the machine's state when the
/// event fired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSignal {
    pub state: f64,
}
