//! Reactive exploration state machine.
//!
//! The robot advances in short forward steps, sidesteps obstacles with a
//! randomized turn-and-rotate maneuver, periodically retreats diagonally to
//! break out of patterns that make no progress, and returns to its charging
//! dock once the battery runs low. Every movement is followed by an odometry
//! update so the pose estimate stays current.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use typed_builder::TypedBuilder;

use crate::{
    config::{ExplorationConfig, RoverConfig, TrackingConfig},
    error::{ExploreError, Result},
    estimate::Pose,
    odometry::{Odometer, Position},
    robot::{DriveDirection, RandomSampler, Robot, RotateDirection, UniformSampler},
};

/// State of the exploration process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplorationState {
    /// Advancing step by step
    #[default]
    Exploring,
    /// Obstacle ahead, maneuver pending
    AvoidingObstacle,
    /// Battery low, heading for the dock
    ReturningToDock,
    /// Docked and charging
    Charging,
    /// Finished, either aborted or docked
    Stopped,
}

/// Exploration controller driven one [`Explorer::tick`] at a time.
#[derive(TypedBuilder)]
pub struct Explorer<R, S> {
    robot: R,
    sampler: S,
    #[builder(default)]
    config: ExplorationConfig,
    #[builder(default = TrackingConfig::default().odometer())]
    odometer: Odometer,
    #[builder(default = Arc::new(AtomicBool::new(false)))]
    abort: Arc<AtomicBool>,
    #[builder(default, setter(skip))]
    state: ExplorationState,
    #[builder(default, setter(skip))]
    backoff: u32,
    #[builder(default, setter(skip))]
    dock_requested: bool,
}

impl<R: Robot> Explorer<R, RandomSampler> {
    /// Builds an explorer whose random source is seeded from `config`.
    pub fn from_config(robot: R, config: &RoverConfig) -> Self {
        let sampler = match config.exploration.seed {
            Some(seed) => RandomSampler::seeded(seed),
            None => RandomSampler::from_entropy(),
        };
        Explorer::builder()
            .robot(robot)
            .sampler(sampler)
            .config(config.exploration.clone())
            .odometer(config.tracking.odometer())
            .build()
    }
}

impl<R: Robot, S: UniformSampler> Explorer<R, S> {
    /// Checks the link and powers the IR sensor. Both failures are fatal.
    pub fn prepare(&mut self) -> Result<()> {
        if !self.robot.is_connected() {
            return Err(ExploreError::NotConnected);
        }
        self.robot.set_headlight(false)?;
        if !self.robot.set_ir_power(true)? {
            return Err(ExploreError::IrActivation);
        }
        info!("robot ready, starting exploration");
        Ok(())
    }

    /// Ticks until [`ExplorationState::Stopped`], pausing between ticks.
    pub fn run(&mut self) -> Result<()> {
        self.prepare()?;
        let interval = self.config.poll_interval();
        while self.tick()? != ExplorationState::Stopped {
            thread::sleep(interval);
        }
        Ok(())
    }

    /// Runs one decision cycle and returns the state it leads to.
    pub fn tick(&mut self) -> Result<ExplorationState> {
        use ExplorationState::*;

        let next = match self.state {
            Exploring => self.explore_step()?,
            AvoidingObstacle => {
                self.avoid_obstacle()?;
                Exploring
            }
            ReturningToDock => self.dock_step()?,
            Charging => {
                info!("charging at dock, exploration finished");
                Stopped
            }
            Stopped => Stopped,
        };

        if next != self.state {
            info!(from = ?self.state, to = ?next, "state transition");
        }
        self.state = next;
        Ok(next)
    }

    fn explore_step(&mut self) -> Result<ExplorationState> {
        if self.robot.is_obstacle_detected()? {
            return Ok(ExplorationState::AvoidingObstacle);
        }

        let battery = self.robot.battery_level()?;
        if battery < self.config.low_battery_threshold {
            warn!(battery, "battery low, returning to dock");
            return Ok(ExplorationState::ReturningToDock);
        }

        self.drive_and_track(DriveDirection::Forward, self.config.advance_speed)?;
        self.backoff += 1;
        if self.backoff >= self.config.backoff_threshold {
            self.back_off()?;
        }

        if let Ok(strength) = self.robot.wifi_signal_strength() {
            trace!(strength, "wifi signal");
        }

        if self.abort.load(Ordering::SeqCst) {
            info!("abort requested");
            return Ok(ExplorationState::Stopped);
        }
        Ok(ExplorationState::Exploring)
    }

    // Retreat along one randomly chosen backward diagonal.
    fn back_off(&mut self) -> Result<()> {
        let direction = self
            .sampler
            .choose(DriveDirection::BackwardLeft, DriveDirection::BackwardRight);
        debug!(?direction, advances = self.backoff, "anti-stall retreat");
        let speed = self.config.backoff_speed;
        for _ in 0..self.config.backoff_repeat {
            self.drive_and_track(direction, speed)?;
        }
        self.backoff = 0;
        Ok(())
    }

    /// Maneuvers around the obstacle ahead until the IR sensor reports clear.
    ///
    /// Every episode draws a fresh direction, angle and repeat count. Retries
    /// widen the angle range; once the configured number of episodes is spent
    /// the obstacle is reported as [`ExploreError::ObstacleNotCleared`].
    /// Returns the number of episodes executed.
    pub fn avoid_obstacle(&mut self) -> Result<u32> {
        let attempts = self.config.max_avoidance_attempts;
        for attempt in 0..attempts {
            self.avoidance_episode(attempt)?;
            if !self.robot.is_obstacle_detected()? {
                return Ok(attempt + 1);
            }
            debug!(attempt = attempt + 1, "still blocked after avoidance");
        }
        warn!(attempts, "obstacle could not be cleared");
        Err(ExploreError::ObstacleNotCleared { attempts })
    }

    fn avoidance_episode(&mut self, attempt: u32) -> Result<()> {
        let direction = self
            .sampler
            .choose(DriveDirection::TurnLeft, DriveDirection::TurnRight);
        let degrees = self.sampler.sample(
            self.config.min_turn_angle_deg,
            self.config.max_turn_angle(attempt),
        );
        let repeat = self
            .sampler
            .sample(self.config.min_avoid_repeat, self.config.max_avoid_repeat);
        debug!(?direction, degrees, repeat, attempt, "avoidance episode");

        let (avoid_speed, rotate_speed) = (self.config.avoid_speed, self.config.rotate_speed);
        for _ in 0..repeat {
            self.drive_and_track(direction, avoid_speed)?;
        }
        self.robot.rotate(
            RotateDirection::Right,
            ExplorationConfig::turn_angle(degrees),
            rotate_speed,
        )?;
        self.wait()?;
        self.update_pose()
    }

    fn dock_step(&mut self) -> Result<ExplorationState> {
        if !self.dock_requested {
            info!("heading for base station");
            self.robot.return_toward_base()?;
            self.wait()?;
            self.robot.dock()?;
            self.dock_requested = true;
        }
        if self.robot.is_charging()? {
            Ok(ExplorationState::Charging)
        } else {
            Ok(ExplorationState::ReturningToDock)
        }
    }

    fn drive_and_track(&mut self, direction: DriveDirection, speed: u8) -> Result<()> {
        trace!(?direction, speed, "drive");
        self.robot.drive(direction, speed)?;
        self.wait()?;
        self.update_pose()
    }

    fn wait(&mut self) -> Result<()> {
        self.robot
            .wait_until_complete(self.config.drive_timeout())
            .map_err(ExploreError::from)
    }

    fn update_pose(&mut self) -> Result<()> {
        let sample = self.robot.wheel_encoders()?;
        let robot = &mut self.robot;
        if let Some(pose) = self.odometer.update(sample, || robot.forward_kinematics())? {
            trace!(x = pose.x.value, y = pose.y.value, heading = pose.heading.value, "pose");
        }
        Ok(())
    }

    pub fn state(&self) -> ExplorationState {
        self.state
    }

    pub fn pose(&self) -> Pose {
        self.odometer.pose()
    }

    pub fn trail(&self) -> impl Iterator<Item = &Position> + '_ {
        self.odometer.trail()
    }

    /// Forward advances since the last anti-stall retreat.
    pub fn backoff_count(&self) -> u32 {
        self.backoff
    }

    /// Flag that stops exploration after the current forward advance.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn robot(&self) -> &R {
        &self.robot
    }

    pub fn robot_mut(&mut self) -> &mut R {
        &mut self.robot
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }
}
