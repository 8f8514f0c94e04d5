//! Defines all configuration structures for the arithmometer engine.
//!
//! These structs are designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde`, layered under `ARITHMO__*` environment
//! variables. This allows the machine's geometry, register widths and
//! animation speeds to be defined externally from the application code.

use crate::common::{check_angle_limits, check_extrusion, check_time_scale, FULL_TURN};
use crate::components::animation::Easing;
use crate::error::{MachineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The top-level configuration for the `ArithmometerEngine`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// The frame rate the driver advances the machine at.
    pub resolution: FrameResolution,

    /// The input register the operator dials the operand into.
    pub setting: RegisterConfig,

    /// The product register on the sliding carriage.
    pub result: RegisterConfig,

    /// The revolution counter on the sliding carriage.
    pub counter: RegisterConfig,

    /// The lever that clears the result register.
    pub result_lever: LeverConfig,

    /// The lever that clears the counter register.
    pub counter_lever: LeverConfig,

    pub crank: CrankConfig,

    /// Lets the counter lever ride the result lever's motion.
    pub coupling: CouplingConfig,
}

/// Defines how often the driver advances the machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameResolution {
    /// 60 frames per second.
    #[default]
    High,
    /// 30 frames per second.
    Medium,
    /// 10 frames per second. Coarse, but handy when tracing.
    Low,
    /// A user-defined rate.
    Custom { frames_per_second: u64 },
}

impl FrameResolution {
    pub fn frames_per_second(&self) -> u64 {
        match self {
            FrameResolution::High => 60,
            FrameResolution::Medium => 30,
            FrameResolution::Low => 10,
            FrameResolution::Custom { frames_per_second } => (*frames_per_second).max(1),
        }
    }

    /// Wall-clock duration of a single frame.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frames_per_second() as f64)
    }
}

/// Geometry and timing of one digit register.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterConfig {
    pub digits: usize,
    pub base: u32,
    /// Angle at which a wheel shows zero.
    pub min_angle: f64,
    /// End of the span covered by one full digit cycle. The rest of the
    /// circle is the dead zone a wheel jumps across when it wraps.
    pub max_angle: f64,
    /// Seconds per queued rotation.
    pub time_scale: f64,
    pub easing: Easing,
}

impl RegisterConfig {
    pub fn with_digits(digits: usize) -> Self {
        Self {
            digits,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.digits == 0 {
            return Err(MachineError::InvalidDigitCount(self.digits));
        }
        if self.base < 2 {
            return Err(MachineError::InvalidBase(self.base));
        }
        check_angle_limits(self.min_angle, self.max_angle)?;
        if self.max_angle - self.min_angle > FULL_TURN {
            return Err(MachineError::InvalidAngleLimits {
                min: self.min_angle,
                max: self.max_angle,
            });
        }
        check_time_scale(self.time_scale)
    }
}

/// Geometry and timing of a pull lever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeverConfig {
    /// Rest angle.
    pub min_angle: f64,
    /// Fully pulled angle.
    pub max_angle: f64,
    pub time_scale: f64,
    pub easing: Easing,
}

impl LeverConfig {
    pub fn validate(&self) -> Result<()> {
        check_angle_limits(self.min_angle, self.max_angle)?;
        check_time_scale(self.time_scale)
    }
}

/// Geometry and timing of the operation handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrankConfig {
    /// How far the handle is pushed out along its axis before turning.
    pub extrusion: f64,
    pub extrude_time_scale: f64,
    /// Seconds for one full turn.
    pub rotation_time_scale: f64,
}

impl CrankConfig {
    pub fn validate(&self) -> Result<()> {
        check_extrusion(self.extrusion)?;
        check_time_scale(self.extrude_time_scale)?;
        check_time_scale(self.rotation_time_scale)
    }
}

/// How a dependent lever detaches from its master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Attach when the master is pulled, detach at the first crossing while
    /// following, ignore crossings otherwise.
    #[default]
    FollowUntilThreshold,
    /// Ignore the pull and decide on every crossing by looking at whether
    /// the dependent is halted: halted detaches, anything else attaches.
    ToggleOnHalt,
}

/// Couples the counter lever to the result lever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CouplingConfig {
    pub enabled: bool,
    /// Fraction of the master's travel at which the dependent detaches.
    pub threshold: f64,
    pub policy: SyncPolicy,
}

impl CouplingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.threshold > 0.0 && self.threshold < 1.0 {
            Ok(())
        } else {
            Err(MachineError::InvalidThreshold(self.threshold))
        }
    }
}

impl MachineConfig {
    /// Loads a configuration from an optional TOML file, then applies
    /// `ARITHMO__SECTION__KEY` environment overrides on top.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let loaded: MachineConfig = builder
            .add_source(
                config::Environment::with_prefix("ARITHMO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml(source: &str) -> Result<Self> {
        let loaded: MachineConfig = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        self.setting.validate()?;
        self.result.validate()?;
        self.counter.validate()?;
        self.result_lever.validate()?;
        self.counter_lever.validate()?;
        self.crank.validate()?;
        if self.coupling.enabled {
            self.coupling.validate()?;
        }
        if self.setting.base != self.result.base {
            return Err(MachineError::IncompatibleRegisters(
                "setting and result registers must share a base",
            ));
        }
        if self.setting.digits > self.result.digits {
            return Err(MachineError::IncompatibleRegisters(
                "setting register is wider than the result register",
            ));
        }
        Ok(())
    }
}

// --- Default values ---

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            resolution: FrameResolution::High,
            setting: RegisterConfig::with_digits(6),
            result: RegisterConfig::with_digits(12),
            counter: RegisterConfig::with_digits(7),
            result_lever: LeverConfig::default(),
            counter_lever: LeverConfig::default(),
            crank: CrankConfig::default(),
            coupling: CouplingConfig::default(),
        }
    }
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            digits: 8,
            base: 10,
            min_angle: 0.0,
            max_angle: FULL_TURN * 5.0 / 6.0,
            time_scale: 0.25,
            easing: Easing::CubicInOut,
        }
    }
}

impl Default for LeverConfig {
    fn default() -> Self {
        Self {
            min_angle: 0.0,
            max_angle: 1.75,
            time_scale: 0.5,
            easing: Easing::Linear,
        }
    }
}

impl Default for CrankConfig {
    fn default() -> Self {
        Self {
            extrusion: 0.3,
            extrude_time_scale: 0.2,
            rotation_time_scale: 0.6,
        }
    }
}

impl Default for CouplingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.7,
            policy: SyncPolicy::default(),
        }
    }
}
