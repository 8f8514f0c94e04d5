//! The core `ArithmometerEngine` and its public API.
//!
//! The engine owns every moving part of the machine and is the single place
//! frames enter. It wires the parts together through their event buses:
//! each revolution of the operation handle adds (or subtracts) the setting
//! register into the result register and counts the turn, and each reset
//! lever clears its register once it has been fully pulled.

use crate::activity::ActivityTracker;
use crate::components::coupling::LeverCoupling;
use crate::components::crank::OperationHandle;
use crate::components::lever::Lever;
use crate::components::wheel::WheelBank;
use crate::config::MachineConfig;
use crate::error::Result;
use crate::events::{HandleEvent, LeverEvent};
use crate::instruction::{Instruction, Register};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// What a revolution of the handle does to the result register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Add,
    Subtract,
}

/// The top-level coordinator of the simulated machine.
///
/// The engine is single-threaded: the caller feeds it frame deltas through
/// [`advance`](Self::advance) and issues commands between frames.
pub struct ArithmometerEngine {
    config: MachineConfig,
    activity: ActivityTracker,
    setting: WheelBank,
    result: WheelBank,
    counter: WheelBank,
    handle: OperationHandle,
    result_lever: Lever,
    counter_lever: Lever,
    coupling: Option<LeverCoupling>,
    mode: Rc<Cell<Mode>>,
}

impl fmt::Debug for ArithmometerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArithmometerEngine")
            .field("setting", &self.setting.to_string())
            .field("result", &self.result.to_string())
            .field("counter", &self.counter.to_string())
            .field("offset", &self.offset())
            .field("mode", &self.mode())
            .field("busy", &self.is_busy())
            .finish()
    }
}

impl ArithmometerEngine {
    /// Builds and wires a machine from a validated configuration.
    pub fn new(config: MachineConfig) -> Result<Self> {
        config.validate()?;
        let activity = ActivityTracker::new();

        let setting = WheelBank::new(&config.setting, activity.clone())?;
        let result = WheelBank::new(&config.result, activity.clone())?;
        let counter = WheelBank::new(&config.counter, activity.clone())?;
        let handle = OperationHandle::new(&config.crank, activity.clone())?;
        let result_lever = Lever::new("result", &config.result_lever, activity.clone())?;
        let counter_lever = Lever::new("counter", &config.counter_lever, activity.clone())?;
        let mode = Rc::new(Cell::new(Mode::default()));

        {
            let (setting, result, counter, mode) =
                (setting.clone(), result.clone(), counter.clone(), mode.clone());
            handle.subscribe(HandleEvent::Revolution, move |revolutions| {
                let operand = setting.digits();
                match mode.get() {
                    Mode::Add => {
                        result.add(&operand)?;
                        counter.add(&[1])?;
                    }
                    Mode::Subtract => {
                        result.subtract(&operand)?;
                        counter.subtract(&[1])?;
                    }
                }
                debug!(revolutions, mode = ?mode.get(), "revolution applied to the carriage");
                Ok(())
            });
        }
        clear_on_pull(&result_lever, &result);
        clear_on_pull(&counter_lever, &counter);

        let coupling = if config.coupling.enabled {
            Some(LeverCoupling::couple(
                &result_lever,
                &counter_lever,
                config.coupling.threshold,
                config.coupling.policy,
            )?)
        } else {
            None
        };

        info!(
            setting = setting.digit_count(),
            result = result.digit_count(),
            counter = counter.digit_count(),
            coupled = coupling.is_some(),
            "arithmometer assembled"
        );

        Ok(Self {
            config,
            activity,
            setting,
            result,
            counter,
            handle,
            result_lever,
            counter_lever,
            coupling,
            mode,
        })
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn activity(&self) -> &ActivityTracker {
        &self.activity
    }

    pub fn setting(&self) -> &WheelBank {
        &self.setting
    }

    pub fn result(&self) -> &WheelBank {
        &self.result
    }

    pub fn counter(&self) -> &WheelBank {
        &self.counter
    }

    pub fn handle(&self) -> &OperationHandle {
        &self.handle
    }

    pub fn result_lever(&self) -> &Lever {
        &self.result_lever
    }

    pub fn counter_lever(&self) -> &Lever {
        &self.counter_lever
    }

    pub fn coupling(&self) -> Option<&LeverCoupling> {
        self.coupling.as_ref()
    }

    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    pub fn set_mode(&self, mode: Mode) {
        if self.mode.replace(mode) != mode {
            debug!(?mode, "operating mode changed");
        }
    }

    /// Current carriage position.
    pub fn offset(&self) -> usize {
        self.result.offset()
    }

    /// The furthest the carriage can travel while keeping the whole setting
    /// register over the result register and one counter wheel under the
    /// handle.
    pub fn max_offset(&self) -> usize {
        let over_result = self.result.digit_count() - self.setting.digit_count();
        over_result.min(self.counter.digit_count() - 1)
    }

    /// Moves the carriage by `delta` places.
    ///
    /// A shift that would leave `[0, max_offset]` is ignored and returns
    /// `false`.
    pub fn shift(&self, delta: i64) -> Result<bool> {
        let target = (self.offset() as i64)
            .checked_add(delta)
            .and_then(|target| usize::try_from(target).ok())
            .filter(|target| *target <= self.max_offset());
        let Some(target) = target else {
            warn!(
                offset = self.offset(),
                delta,
                max = self.max_offset(),
                "carriage shift out of range, ignored"
            );
            return Ok(false);
        };
        self.result.set_offset(target)?;
        self.counter.set_offset(target)?;
        debug!(offset = target, "carriage shifted");
        Ok(true)
    }

    /// `true` while any animation is in flight or the handle is mid-cycle.
    pub fn is_busy(&self) -> bool {
        self.activity.is_busy() || self.handle.is_busy()
    }

    /// Advances the whole machine by one frame.
    ///
    /// The handle runs first so the arithmetic it triggers is queued on the
    /// registers before they move in the same frame.
    pub fn advance(&self, delta_ms: f64) -> Result<()> {
        self.handle.advance(delta_ms)?;
        self.result_lever.advance(delta_ms)?;
        self.counter_lever.advance(delta_ms)?;
        self.setting.advance(delta_ms)?;
        self.result.advance(delta_ms)?;
        self.counter.advance(delta_ms)
    }

    /// Runs one decoded instruction.
    pub fn execute(&self, instruction: &Instruction) -> Result<()> {
        debug!(%instruction, "executing instruction");
        match *instruction {
            Instruction::Set { index, value } => self.setting.set_digit(index, value),
            Instruction::Rotate { index, delta } => self.setting.rotate_digit(index, delta),
            Instruction::Turn => self.handle.turn().map(drop),
            Instruction::Shift(places) => self.shift(places).map(drop),
            Instruction::Mode(mode) => {
                self.set_mode(mode);
                Ok(())
            }
            Instruction::Clear(Register::Setting) => self.setting.reset(),
            Instruction::Clear(Register::Result) => self.result_lever.pull_down().map(drop),
            Instruction::Clear(Register::Counter) => self.counter_lever.pull_down().map(drop),
        }
    }
}

fn clear_on_pull(lever: &Lever, register: &WheelBank) {
    let register = register.clone();
    let label = lever.label().to_string();
    lever.subscribe(LeverEvent::PullDownDone, move |_| {
        info!(register = %label, "register cleared");
        register.reset()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegisterConfig;

    fn engine() -> ArithmometerEngine {
        ArithmometerEngine::new(MachineConfig::default()).unwrap()
    }

    fn settle(engine: &ArithmometerEngine) {
        let mut frames = 0;
        while engine.is_busy() {
            engine.advance(20.0).unwrap();
            frames += 1;
            assert!(frames < 10_000, "machine never settled");
        }
    }

    #[test]
    fn carriage_travel_is_bounded_by_both_registers() {
        let engine = engine();
        assert_eq!(engine.max_offset(), 6);

        let config = MachineConfig {
            counter: RegisterConfig::with_digits(3),
            ..MachineConfig::default()
        };
        let narrow = ArithmometerEngine::new(config).unwrap();
        assert_eq!(narrow.max_offset(), 2);
    }

    #[test]
    fn out_of_range_shifts_are_ignored() {
        let engine = engine();
        assert!(!engine.shift(-1).unwrap());
        assert!(engine.shift(6).unwrap());
        assert_eq!(engine.offset(), 6);
        assert_eq!(engine.counter().offset(), 6);
        assert!(!engine.shift(1).unwrap());
        assert!(engine.shift(-6).unwrap());
        assert_eq!(engine.offset(), 0);
    }

    #[test]
    fn huge_shifts_are_ignored_rather_than_overflowing() {
        let engine = engine();
        assert!(engine.shift(1).unwrap());
        engine
            .execute(&"shift 9223372036854775807".parse().unwrap())
            .unwrap();
        assert!(!engine.shift(i64::MAX).unwrap());
        assert!(!engine.shift(i64::MIN).unwrap());
        assert_eq!(engine.offset(), 1);
        assert_eq!(engine.counter().offset(), 1);
    }

    #[test]
    fn huge_rotations_of_a_setting_digit_wrap() {
        let engine = engine();
        engine.execute(&"set 0 5".parse().unwrap()).unwrap();
        engine
            .execute(&"rotate 0 9223372036854775807".parse().unwrap())
            .unwrap();
        assert_eq!(engine.setting().digit(0), Some(2));
        settle(&engine);
        assert!(engine.setting().wheel(0).unwrap().state().is_finite());
    }

    #[test]
    fn a_turn_adds_the_setting_into_the_result() {
        let engine = engine();
        engine.execute(&"set 0 5".parse().unwrap()).unwrap();
        engine.execute(&"set 1 2".parse().unwrap()).unwrap();
        settle(&engine);
        engine.execute(&Instruction::Turn).unwrap();
        settle(&engine);

        assert_eq!(engine.result().value(), Some(25));
        assert_eq!(engine.counter().value(), Some(1));
        assert_eq!(engine.handle().revolutions(), 1);
    }

    #[test]
    fn subtract_mode_reverses_the_turn() {
        let engine = engine();
        engine.setting().set_digit(0, 7).unwrap();
        engine.handle().turn().unwrap();
        settle(&engine);
        engine.set_mode(Mode::Subtract);
        engine.handle().turn().unwrap();
        settle(&engine);

        assert_eq!(engine.result().value(), Some(0));
        assert_eq!(engine.counter().value(), Some(0));
    }

    #[test]
    fn uncoupled_levers_clear_only_their_own_register() {
        let mut config = MachineConfig::default();
        config.coupling.enabled = false;
        let engine = ArithmometerEngine::new(config).unwrap();
        assert!(engine.coupling().is_none());

        engine.setting().set_digit(0, 3).unwrap();
        engine.handle().turn().unwrap();
        settle(&engine);
        engine.execute(&"clear result".parse().unwrap()).unwrap();
        settle(&engine);

        assert_eq!(engine.result().value(), Some(0));
        assert_eq!(engine.counter().value(), Some(1));
    }
}
