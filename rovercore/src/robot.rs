//! Interfaces to the physical robot and to the random decision source.

use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uom::si::f32::{Angle, Time};

use crate::{
    error::RobotError,
    estimate::Displacement,
    odometry::EncoderSample,
};

/// Directions accepted by a manual drive command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DriveDirection {
    Forward,
    Backward,
    StraightLeft,
    StraightRight,
    TurnLeft,
    TurnRight,
    ForwardLeft,
    ForwardRight,
    BackwardLeft,
    BackwardRight,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RotateDirection {
    Left,
    Right,
}

/// Sensing and actuation the exploration loop needs from the robot.
///
/// Movement commands only start the motion; callers block on
/// [`Robot::wait_until_complete`] before issuing the next one.
pub trait Robot {
    fn is_connected(&self) -> bool;

    /// Switches the IR proximity sensor, returning whether the robot accepted it.
    fn set_ir_power(&mut self, on: bool) -> Result<bool, RobotError>;

    fn set_headlight(&mut self, on: bool) -> Result<(), RobotError>;

    fn is_obstacle_detected(&mut self) -> Result<bool, RobotError>;

    /// Raw battery level. Lower is more depleted.
    fn battery_level(&mut self) -> Result<u16, RobotError>;

    fn wheel_encoders(&mut self) -> Result<EncoderSample, RobotError>;

    /// Displacement of the last movement in the robot frame.
    fn forward_kinematics(&mut self) -> Result<Displacement, RobotError>;

    fn drive(&mut self, direction: DriveDirection, speed: u8) -> Result<(), RobotError>;

    fn rotate(
        &mut self,
        direction: RotateDirection,
        angle: Angle,
        speed: u8,
    ) -> Result<(), RobotError>;

    /// Heads toward the last known base station position.
    fn return_toward_base(&mut self) -> Result<(), RobotError>;

    fn dock(&mut self) -> Result<(), RobotError>;

    /// Blocks until the pending command finishes, failing with
    /// [`RobotError::Timeout`] once `timeout` elapses.
    fn wait_until_complete(&mut self, timeout: Time) -> Result<(), RobotError>;

    fn is_charging(&mut self) -> Result<bool, RobotError>;

    fn wifi_signal_strength(&mut self) -> Result<u8, RobotError>;
}

/// Source of uniformly distributed integers.
pub trait UniformSampler {
    /// Returns a value in `low..=high`.
    fn sample(&mut self, low: i32, high: i32) -> i32;

    fn choose<T: Copy>(&mut self, first: T, second: T) -> T {
        if self.sample(0, 1) == 0 {
            first
        } else {
            second
        }
    }
}

/// [`UniformSampler`] backed by a small PRNG, seeded once per session.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    rng: SmallRng,
}

impl RandomSampler {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }
}

impl UniformSampler for RandomSampler {
    fn sample(&mut self, low: i32, high: i32) -> i32 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }
}
