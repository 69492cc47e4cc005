//! Reactive exploration controller and dead-reckoning pose tracking for a
//! three-wheel robot with an IR obstacle flag and a charging dock.

pub mod config;
pub mod error;
pub mod estimate;
pub mod explore;
pub mod odometry;
pub mod robot;
mod utils;

pub use config::RoverConfig;
pub use error::{ExploreError, RobotError};
pub use estimate::{Displacement, Pose, PoseTracker};
pub use explore::{ExplorationState, Explorer};
pub use odometry::{EncoderSample, Odometer, WheelReading};
pub use robot::{DriveDirection, RandomSampler, Robot, RotateDirection, UniformSampler};
