//! The error type shared by every component of the machine.
//!
//! Errors fall into two groups. Configuration errors are raised when a
//! component is constructed with parameters that cannot describe a physical
//! part. Protocol errors are raised when a component is driven in a way its
//! contract forbids. Expected edge conditions (carry overflow past the last
//! digit, a repeated crank turn, pulling a lever that is already pulled) are
//! never errors; they are handled as defined no-ops.

use crate::common::SubscriptionId;

/// Result alias that carries [`MachineError`].
pub type Result<T> = std::result::Result<T, MachineError>;

/// Common error type for the arithmometer core.
#[derive(Debug, thiserror::Error)]
pub enum MachineError {
    #[error("invalid angle limits: min {min} must be clearly below max {max}")]
    InvalidAngleLimits { min: f64, max: f64 },

    #[error("invalid base {0}: a register needs a radix of at least 2")]
    InvalidBase(u32),

    #[error("invalid digit count {0}: a register needs at least one digit")]
    InvalidDigitCount(usize),

    #[error("invalid time scale {0}: a leg must take a positive, finite number of seconds")]
    InvalidTimeScale(f64),

    #[error("invalid extrusion {extruded}: must clearly differ from the rest position {rest}")]
    InvalidExtrusion { rest: f64, extruded: f64 },

    #[error("invalid coupling threshold {0}: must lie strictly between 0 and 1")]
    InvalidThreshold(f64),

    /// A crossing condition was evaluated against an emission that carried no
    /// `(last, next)` interval.
    #[error("subscriber {0:?} has a crossing condition but the emission carried no cause interval")]
    MissingCause(SubscriptionId),

    #[error("animation is already synced to a different source")]
    AlreadySynced,

    #[error("an animation cannot be synced to itself")]
    SelfSync,

    #[error("animation is following a different source than the one being detached")]
    WrongSyncSource,

    #[error("digit index {index} is out of range for a register of {digits} digits")]
    DigitOutOfRange { index: usize, digits: usize },

    #[error("digit value {value} is out of range for base {base}")]
    DigitValueOutOfRange { value: u32, base: u32 },

    #[error("offset {offset} is out of range for a register of {digits} digits")]
    OffsetOutOfRange { offset: usize, digits: usize },

    #[error("incompatible registers: {0}")]
    IncompatibleRegisters(&'static str),

    #[error("line {line}: {reason}")]
    Instruction { line: usize, reason: String },

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl MachineError {
    pub(crate) fn instruction<T: Into<String>>(line: usize, reason: T) -> Self {
        Self::Instruction {
            line,
            reason: reason.into(),
        }
    }
}
