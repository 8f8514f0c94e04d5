//! # Arithmometer
//!
//! A frame-driven animation and event core for simulating a mechanical
//! calculating machine.
//!
//! The crate models the machine's moving parts as small state machines that
//! interpolate toward queued targets and coordinate through typed,
//! synchronous event buses. Presentation is left to the caller: every part
//! exposes the angles it sits at, and nothing here renders.
//!
//! ## Core Concepts
//!
//! - **ScalarAnimation**: one value moving through a FIFO queue of targets,
//!   one leg at a time. It can also *sync* to another animation and ride its
//!   per-frame deltas.
//! - **EventBus**: synchronous, re-entrant publish/subscribe keyed by an event
//!   kind enum. Subscribers may attach a *crossing condition* that only fires
//!   when a threshold lies strictly between an emission's before and after
//!   values.
//! - **WheelBank**: a register of digit wheels doing ripple carry/borrow
//!   arithmetic as queued rotations.
//! - **Lever / OperationHandle**: the reset levers and the crank, built from
//!   the two primitives above.
//! - **ArithmometerEngine**: owns the whole machine and is the single place
//!   frames enter.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use arithmometer::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     // 1. Build a machine from the default configuration.
//!     let engine = ArithmometerEngine::new(MachineConfig::default())?;
//!
//!     // 2. Dial 25 into the setting register and turn the handle once.
//!     for instruction in parse_program("set 0 5\nset 1 2\nturn")? {
//!         engine.execute(&instruction)?;
//!         while engine.is_busy() {
//!             engine.advance(16.0)?;
//!         }
//!     }
//!
//!     // 3. Read the registers.
//!     println!("result {} counter {}", engine.result(), engine.counter());
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Arithmometer";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod activity;
pub mod bus;
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod instruction;
pub mod time;

/// A prelude module for easy importing of the most common Arithmometer types.
pub mod prelude {
    pub use crate::activity::ActivityTracker;
    pub use crate::bus::{Cause, Condition, EventBus};
    pub use crate::common::SubscriptionId;
    pub use crate::components::animation::{Easing, ScalarAnimation};
    pub use crate::components::coupling::LeverCoupling;
    pub use crate::components::crank::{Crank, CrankPhase, OperationHandle};
    pub use crate::components::lever::{Lever, LeverState};
    pub use crate::components::wheel::WheelBank;
    pub use crate::config::{FrameResolution, MachineConfig, SyncPolicy};
    pub use crate::engine::{ArithmometerEngine, Mode};
    pub use crate::error::MachineError;
    pub use crate::events::{
        AnimationEvent, CrankEvent, DigitChange, HandleEvent, LeverEvent, MotionSignal,
        WheelEvent,
    };
    pub use crate::instruction::{parse_program, Instruction, Register};
    pub use crate::time::FrameClock;
}
