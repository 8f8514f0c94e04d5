//! Digit registers rendered as banks of rotating wheels.
//!
//! A `WheelBank` is a fixed-width register. Each digit owns a
//! [`ScalarAnimation`] holding the wheel's angle. Changing a digit updates
//! its logical value immediately and queues the matching rotation on the
//! wheel, so the visible motion catches up over the following frames.
//!
//! Digit `0` is the least significant. A wheel covers one full digit cycle
//! in `max_angle - min_angle` radians; the remainder of the circle is a dead
//! zone the wheel jumps across, in the direction of travel, whenever it wraps
//! between `base - 1` and `0`.

use crate::activity::ActivityTracker;
use crate::bus::EventBus;
use crate::common::{SubscriptionId, FULL_TURN};
use crate::components::animation::ScalarAnimation;
use crate::config::RegisterConfig;
use crate::error::{MachineError, Result};
use crate::events::{DigitChange, WheelEvent};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

struct BankState {
    digits: Vec<u32>,
    offset: usize,
}

struct BankInner {
    base: u32,
    step: f64,
    dead_zone: f64,
    wheels: Vec<ScalarAnimation>,
    state: RefCell<BankState>,
    events: EventBus<WheelEvent, DigitChange>,
}

/// A fixed-width register of digit wheels.
///
/// Cloning yields another handle to the same register.
#[derive(Clone)]
pub struct WheelBank {
    inner: Rc<BankInner>,
}

impl fmt::Debug for WheelBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("WheelBank")
            .field("base", &self.inner.base)
            .field("digits", &state.digits)
            .field("offset", &state.offset)
            .finish()
    }
}

/// Prints the digits most significant first.
///
/// Digits up to 35 print as `0-9a-z`. Larger ones, which only occur above
/// base 36, print in decimal inside brackets, e.g. `[39]`.
impl fmt::Display for WheelBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        for &digit in state.digits.iter().rev() {
            match char::from_digit(digit, 36) {
                Some(c) => write!(f, "{c}")?,
                None => write!(f, "[{digit}]")?,
            }
        }
        Ok(())
    }
}

impl WheelBank {
    pub fn new(config: &RegisterConfig, activity: ActivityTracker) -> Result<Self> {
        config.validate()?;
        let span = config.max_angle - config.min_angle;
        let wheels = (0..config.digits)
            .map(|_| {
                ScalarAnimation::new(config.min_angle, config.time_scale, activity.clone())
                    .map(|wheel| wheel.with_easing(config.easing))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            inner: Rc::new(BankInner {
                base: config.base,
                step: span / config.base as f64,
                dead_zone: FULL_TURN - span,
                wheels,
                state: RefCell::new(BankState {
                    digits: vec![0; config.digits],
                    offset: 0,
                }),
                events: EventBus::new(),
            }),
        })
    }

    pub fn events(&self) -> &EventBus<WheelEvent, DigitChange> {
        &self.inner.events
    }

    pub fn subscribe(
        &self,
        kind: WheelEvent,
        handler: impl Fn(&DigitChange) -> Result<()> + 'static,
    ) -> SubscriptionId {
        self.inner.events.subscribe(kind, handler)
    }

    pub fn base(&self) -> u32 {
        self.inner.base
    }

    pub fn digit_count(&self) -> usize {
        self.inner.wheels.len()
    }

    /// Digit values, least significant first.
    pub fn digits(&self) -> Vec<u32> {
        self.inner.state.borrow().digits.clone()
    }

    pub fn digit(&self, index: usize) -> Option<u32> {
        self.inner.state.borrow().digits.get(index).copied()
    }

    /// The animation driving wheel `index`.
    pub fn wheel(&self, index: usize) -> Option<&ScalarAnimation> {
        self.inner.wheels.get(index)
    }

    /// Angle one digit step turns a wheel by.
    pub fn step_angle(&self) -> f64 {
        self.inner.step
    }

    /// Extra angle a wheel travels when it wraps.
    pub fn dead_zone(&self) -> f64 {
        self.inner.dead_zone
    }

    /// The register read as a number, or `None` if it does not fit a `u128`.
    pub fn value(&self) -> Option<u128> {
        let base = u128::from(self.inner.base);
        self.inner
            .state
            .borrow()
            .digits
            .iter()
            .rev()
            .try_fold(0u128, |acc, d| acc.checked_mul(base)?.checked_add(u128::from(*d)))
    }

    pub fn offset(&self) -> usize {
        self.inner.state.borrow().offset
    }

    /// Moves the position the least significant operand digit lands on.
    /// Current digit values are untouched.
    pub fn set_offset(&self, offset: usize) -> Result<()> {
        let digits = self.digit_count();
        if offset >= digits {
            return Err(MachineError::OffsetOutOfRange { offset, digits });
        }
        self.inner.state.borrow_mut().offset = offset;
        debug!(offset, "register offset moved");
        Ok(())
    }

    /// `true` once every wheel has finished its queued rotations.
    pub fn is_idle(&self) -> bool {
        self.inner.wheels.iter().all(ScalarAnimation::is_idle)
    }

    pub fn advance(&self, delta_ms: f64) -> Result<()> {
        for wheel in &self.inner.wheels {
            wheel.advance(delta_ms)?;
        }
        Ok(())
    }

    /// Turns digit `index` by `increment` steps.
    pub fn rotate_digit(&self, index: usize, increment: i64) -> Result<()> {
        self.check_index(index)?;
        self.rotate(index, increment)
    }

    /// Turns digit `index` straight to `value`, without wrapping.
    pub fn set_digit(&self, index: usize, value: u32) -> Result<()> {
        self.check_index(index)?;
        if value >= self.inner.base {
            return Err(MachineError::DigitValueOutOfRange {
                value,
                base: self.inner.base,
            });
        }
        let current = self.inner.state.borrow().digits[index];
        self.rotate(index, i64::from(value) - i64::from(current))
    }

    /// Ripple-adds `values` (least significant first) starting at the offset.
    ///
    /// A carry out of the most significant digit is dropped.
    pub fn add(&self, values: &[u32]) -> Result<()> {
        let base = i64::from(self.inner.base);
        self.ripple(values, |before, increment| {
            (increment, (before + increment).div_euclid(base))
        })
    }

    /// Ripple-subtracts `values` (least significant first) starting at the
    /// offset.
    ///
    /// A borrow out of the most significant digit is dropped.
    pub fn subtract(&self, values: &[u32]) -> Result<()> {
        let base = i64::from(self.inner.base);
        self.ripple(values, |before, increment| {
            (-increment, -(before - increment).div_euclid(base))
        })
    }

    /// Turns every wheel back to zero along its own animated path.
    pub fn reset(&self) -> Result<()> {
        let digits = self.digits();
        for (index, digit) in digits.into_iter().enumerate() {
            self.rotate(index, -i64::from(digit))?;
        }
        debug!("register reset");
        Ok(())
    }

    /// Walks the digits from the offset upwards. `step(before, increment)`
    /// returns the signed rotation to apply and the carry into the next digit.
    fn ripple(&self, values: &[u32], step: impl Fn(i64, i64) -> (i64, i64)) -> Result<()> {
        let offset = self.offset();
        let mut carry = 0i64;
        for (i, index) in (offset..self.digit_count()).enumerate() {
            let increment = carry + values.get(i).copied().map_or(0, i64::from);
            let before = i64::from(self.inner.state.borrow().digits[index]);
            let (rotation, next_carry) = step(before, increment);
            self.rotate(index, rotation)?;
            carry = next_carry;
        }
        if carry != 0 {
            trace!(carry, "carry dropped past the most significant digit");
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let digits = self.digit_count();
        if index < digits {
            Ok(())
        } else {
            Err(MachineError::DigitOutOfRange { index, digits })
        }
    }

    fn rotate(&self, index: usize, increment: i64) -> Result<()> {
        if increment == 0 {
            return Ok(());
        }
        let base = i64::from(self.inner.base);
        let (value, wraps) = {
            let mut state = self.inner.state.borrow_mut();
            // Split the increment first so huge rotations cannot overflow.
            let moved = i64::from(state.digits[index]) + increment.rem_euclid(base);
            let value = (moved % base) as u32;
            state.digits[index] = value;
            (value, increment.div_euclid(base) + moved / base)
        };
        let angle = increment as f64 * self.inner.step + wraps as f64 * self.inner.dead_zone;

        let wheel = &self.inner.wheels[index];
        wheel.set_target(wheel.final_target() + angle);
        trace!(index, increment, value, "digit rotated");

        let kind = if increment > 0 {
            WheelEvent::Increment
        } else {
            WheelEvent::Decrement
        };
        self.inner.events.emit(
            kind,
            &DigitChange {
                digit: index,
                amount: increment,
                value,
            },
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::animation::Easing;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn register(digits: usize, base: u32) -> (WheelBank, ActivityTracker) {
        let activity = ActivityTracker::new();
        let config = RegisterConfig {
            digits,
            base,
            easing: Easing::Linear,
            ..RegisterConfig::default()
        };
        (WheelBank::new(&config, activity.clone()).unwrap(), activity)
    }

    fn settle(bank: &WheelBank) {
        for _ in 0..200 {
            bank.advance(100.0).unwrap();
        }
    }

    fn record(bank: &WheelBank) -> Rc<RefCell<Vec<(WheelEvent, usize)>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        for kind in [WheelEvent::Increment, WheelEvent::Decrement] {
            let log = log.clone();
            bank.subscribe(kind, move |change| {
                log.borrow_mut().push((kind, change.digit));
                Ok(())
            });
        }
        log
    }

    #[test]
    fn carry_propagates_one_place() {
        let (bank, _) = register(3, 10);
        bank.add(&[9]).unwrap();
        let log = record(&bank);
        bank.add(&[1]).unwrap();

        assert_eq!(bank.digits(), vec![0, 1, 0]);
        assert_eq!(
            *log.borrow(),
            vec![(WheelEvent::Increment, 0), (WheelEvent::Increment, 1)]
        );
    }

    #[test]
    fn rotation_round_trips_across_the_dead_zone() {
        let (bank, _) = register(1, 10);
        bank.set_digit(0, 8).unwrap();
        let wheel = bank.wheel(0).unwrap();
        let start = wheel.final_target();

        bank.rotate_digit(0, 3).unwrap();
        assert_eq!(bank.digit(0), Some(1));
        assert!(approx(
            wheel.final_target(),
            start + 3.0 * bank.step_angle() + bank.dead_zone()
        ));

        bank.rotate_digit(0, -3).unwrap();
        assert_eq!(bank.digit(0), Some(8));
        assert!(approx(wheel.final_target(), start));
    }

    #[test]
    fn wrapping_jumps_the_dead_zone_in_the_direction_of_travel() {
        let (bank, _) = register(2, 10);
        bank.set_digit(0, 9).unwrap();
        bank.rotate_digit(0, 1).unwrap();
        assert_eq!(bank.digit(0), Some(0));
        assert!(approx(bank.wheel(0).unwrap().final_target(), FULL_TURN));

        bank.rotate_digit(1, -1).unwrap();
        assert_eq!(bank.digit(1), Some(9));
        assert!(approx(
            bank.wheel(1).unwrap().final_target(),
            9.0 * bank.step_angle() - FULL_TURN
        ));
    }

    #[test]
    fn add_then_subtract_restores_every_digit() {
        let (bank, _) = register(6, 10);
        bank.add(&[7, 1, 5, 4, 0, 2]).unwrap();
        assert_eq!(bank.value(), Some(204_517));
        let before = bank.digits();

        bank.add(&[9, 9, 3]).unwrap();
        assert_eq!(bank.value(), Some(204_916));
        bank.subtract(&[9, 9, 3]).unwrap();
        assert_eq!(bank.digits(), before);
    }

    #[test]
    fn overflow_and_underflow_are_truncated() {
        let (bank, _) = register(2, 10);
        bank.add(&[9, 9]).unwrap();
        bank.add(&[1]).unwrap();
        assert_eq!(bank.digits(), vec![0, 0]);

        bank.subtract(&[1]).unwrap();
        assert_eq!(bank.digits(), vec![9, 9]);
    }

    #[test]
    fn offset_shifts_where_the_operand_lands() {
        let (bank, _) = register(4, 10);
        bank.set_offset(1).unwrap();
        bank.add(&[5, 2]).unwrap();
        assert_eq!(bank.digits(), vec![0, 5, 2, 0]);
        assert_eq!(bank.value(), Some(250));
        assert!(matches!(
            bank.set_offset(4),
            Err(MachineError::OffsetOutOfRange { .. })
        ));
        assert_eq!(bank.offset(), 1);
    }

    #[test]
    fn other_bases_carry_at_their_radix() {
        let (bank, _) = register(4, 2);
        for _ in 0..3 {
            bank.add(&[1]).unwrap();
        }
        assert_eq!(bank.digits(), vec![1, 1, 0, 0]);
        assert_eq!(bank.to_string(), "0011");
    }

    #[test]
    fn reset_animates_every_wheel_home() {
        let (bank, activity) = register(3, 10);
        bank.add(&[3, 0, 7]).unwrap();
        settle(&bank);
        bank.reset().unwrap();
        assert_eq!(bank.digits(), vec![0, 0, 0]);
        assert!(!bank.is_idle());
        assert!(activity.is_busy());

        settle(&bank);
        assert!(bank.is_idle());
        assert!(!activity.is_busy());
        for index in 0..3 {
            assert!(approx(bank.wheel(index).unwrap().state(), 0.0));
        }
    }

    #[test]
    fn zero_rotation_is_silent() {
        let (bank, activity) = register(2, 10);
        let log = record(&bank);
        bank.rotate_digit(1, 0).unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(activity.in_flight(), 0);
    }

    #[test]
    fn out_of_range_arguments_are_rejected() {
        let (bank, _) = register(3, 10);
        assert!(matches!(
            bank.rotate_digit(3, 1),
            Err(MachineError::DigitOutOfRange { index: 3, digits: 3 })
        ));
        assert!(matches!(
            bank.set_digit(0, 10),
            Err(MachineError::DigitValueOutOfRange { value: 10, base: 10 })
        ));
    }

    #[test]
    fn extreme_rotations_wrap_without_overflowing() {
        let (bank, _) = register(2, 10);
        bank.set_digit(0, 5).unwrap();
        bank.rotate_digit(0, i64::MAX).unwrap();
        assert_eq!(bank.digit(0), Some(2));
        bank.rotate_digit(0, i64::MIN).unwrap();
        assert_eq!(bank.digit(0), Some(4));
        assert!(bank.wheel(0).unwrap().final_target().is_finite());
        assert_eq!(bank.digit(1), Some(0));
    }

    #[test]
    fn digits_beyond_base_36_print_in_brackets() {
        let (bank, _) = register(3, 40);
        bank.set_digit(0, 39).unwrap();
        bank.set_digit(1, 35).unwrap();
        assert_eq!(bank.to_string(), "0z[39]");
        assert_eq!(bank.value(), Some(35 * 40 + 39));
    }

    #[test]
    fn display_reads_most_significant_first() {
        let (bank, _) = register(3, 10);
        bank.add(&[1, 2]).unwrap();
        assert_eq!(bank.to_string(), "021");
    }
}
