use std::collections::VecDeque;
use std::f32::consts::FRAC_1_SQRT_2;
use std::path::Path;

use rovercore::{
    error::{self, ExploreError},
    estimate::{Displacement, Pose},
    odometry::{EncoderSample, WheelReading},
    robot::{DriveDirection, Robot, RotateDirection, UniformSampler},
    RobotError,
};
use serde::Deserialize;
use typed_builder::TypedBuilder;
use uom::si::{
    angle::{degree, radian},
    f32::{Angle, Length, Time},
    length::meter,
    time::second,
};

/// Command received by the simulated robot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Drive(DriveDirection, u8),
    Rotate(RotateDirection, Angle, u8),
    ReturnTowardBase,
    Dock,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    Move(Displacement),
    ReturnTowardBase,
}

// mounting angles of the omni wheels: right, left, rear
const WHEEL_ANGLES_DEG: [f32; 3] = [60.0, -60.0, 180.0];

/// Three-wheel omni-drive robot in a square arena.
///
/// Commands take effect when [`Robot::wait_until_complete`] is called. The
/// true pose follows the same rotate-then-translate convention as the
/// tracker, so the estimate matches it until the tracker re-origins.
#[derive(TypedBuilder)]
pub struct SimRobot {
    #[builder(default = true)]
    connected: bool,
    #[builder(default = true)]
    ir_available: bool,
    /// Arena half width. Without one only scripted obstacles are reported.
    #[builder(default, setter(strip_option))]
    arena: Option<Length>,
    #[builder(default = Length::new::<meter>(0.15))]
    lookahead: Length,
    #[builder(default = Length::new::<meter>(0.02))]
    step_per_speed: Length,
    #[builder(default = Angle::new::<degree>(6.0))]
    turn_per_speed: Angle,
    #[builder(default = 500.0)]
    ticks_per_meter: f32,
    #[builder(default = Length::new::<meter>(0.1))]
    wheel_radius_offset: Length,
    #[builder(default = 200)]
    battery: u16,
    #[builder(default = 1)]
    battery_drain: u16,
    #[builder(default = 3)]
    polls_until_charging: u32,
    #[builder(default = 80)]
    wifi: u8,
    /// Waits fail with a timeout while set.
    #[builder(default)]
    stalled: bool,
    #[builder(default, setter(transform = |script: Vec<bool>| script.into_iter().collect()))]
    obstacle_script: VecDeque<bool>,
    #[builder(default, setter(skip))]
    truth: Pose,
    #[builder(default, setter(skip))]
    encoders: EncoderSample,
    #[builder(default, setter(skip))]
    unread: Displacement,
    #[builder(default, setter(skip))]
    pending: Option<Pending>,
    #[builder(default, setter(skip))]
    commands: Vec<Command>,
    #[builder(default, setter(skip))]
    obstacle_queries: u32,
    #[builder(default, setter(skip))]
    docked: bool,
    #[builder(default, setter(skip))]
    charging_polls: u32,
    #[builder(default, setter(skip))]
    ir_on: bool,
    #[builder(default, setter(skip))]
    headlight: bool,
}

impl SimRobot {
    pub fn from_config(config: &SimulationConfig) -> Self {
        SimRobot::builder()
            .arena(Length::new::<meter>(config.arena_half_width_m))
            .battery(config.initial_battery)
            .battery_drain(config.battery_drain)
            .polls_until_charging(config.polls_until_charging)
            .ticks_per_meter(config.ticks_per_meter)
            .build()
    }

    /// Ground truth pose.
    pub fn truth(&self) -> Pose {
        self.truth
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn drives(&self) -> impl Iterator<Item = (DriveDirection, u8)> + '_ {
        self.commands.iter().filter_map(|command| match *command {
            Command::Drive(direction, speed) => Some((direction, speed)),
            _ => None,
        })
    }

    pub fn rotations(&self) -> impl Iterator<Item = (RotateDirection, Angle, u8)> + '_ {
        self.commands.iter().filter_map(|command| match *command {
            Command::Rotate(direction, angle, speed) => Some((direction, angle, speed)),
            _ => None,
        })
    }

    pub fn obstacle_queries(&self) -> u32 {
        self.obstacle_queries
    }

    pub fn is_docked(&self) -> bool {
        self.docked
    }

    pub fn ir_on(&self) -> bool {
        self.ir_on
    }

    pub fn headlight(&self) -> bool {
        self.headlight
    }

    pub fn set_battery(&mut self, level: u16) {
        self.battery = level;
    }

    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    pub fn push_obstacles(&mut self, script: &[bool]) {
        self.obstacle_script.extend(script.iter().copied());
    }

    fn drive_motion(&self, direction: DriveDirection, speed: u8) -> Displacement {
        use DriveDirection::*;

        let d = self.step_per_speed * speed as f32;
        let a = self.turn_per_speed * speed as f32;
        let diag = d * FRAC_1_SQRT_2;
        let zero = Length::default();
        let (dx, dy, dtheta) = match direction {
            Forward => (d, zero, Angle::default()),
            Backward => (-d, zero, Angle::default()),
            StraightLeft => (zero, d, Angle::default()),
            StraightRight => (zero, -d, Angle::default()),
            TurnLeft => (zero, zero, a),
            TurnRight => (zero, zero, -a),
            ForwardLeft => (diag, diag, Angle::default()),
            ForwardRight => (diag, -diag, Angle::default()),
            BackwardLeft => (-diag, diag, Angle::default()),
            BackwardRight => (-diag, -diag, Angle::default()),
        };
        Displacement { dx, dy, dtheta }
    }

    fn apply(&mut self, motion: Displacement) {
        self.truth.heading += motion.dtheta;
        let sin_h = self.truth.heading.value.sin();
        let cos_h = self.truth.heading.value.cos();
        self.truth.x += motion.dx * cos_h - motion.dy * sin_h;
        self.truth.y += motion.dx * sin_h + motion.dy * cos_h;

        self.unread.dx += motion.dx;
        self.unread.dy += motion.dy;
        self.unread.dtheta += motion.dtheta;

        let wheels = [
            &mut self.encoders.right,
            &mut self.encoders.left,
            &mut self.encoders.rear,
        ];
        for (wheel, mount) in wheels.into_iter().zip(WHEEL_ANGLES_DEG) {
            let mount = mount.to_radians();
            let travel = -mount.sin() * motion.dx.get::<meter>()
                + mount.cos() * motion.dy.get::<meter>()
                + self.wheel_radius_offset.get::<meter>() * motion.dtheta.get::<radian>();
            let ticks = (travel.abs() * self.ticks_per_meter).round() as u16;
            if ticks > 0 {
                *wheel = WheelReading {
                    forward: travel >= 0.0,
                    ticks: wheel.ticks.wrapping_add(ticks),
                };
            }
        }
    }

    fn blocked_ahead(&self) -> bool {
        let Some(arena) = self.arena else {
            return false;
        };
        let ahead_x = self.truth.x + self.lookahead * self.truth.heading.value.cos();
        let ahead_y = self.truth.y + self.lookahead * self.truth.heading.value.sin();
        ahead_x.abs() > arena || ahead_y.abs() > arena
    }
}

impl Robot for SimRobot {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_ir_power(&mut self, on: bool) -> Result<bool, RobotError> {
        if !self.ir_available {
            return Ok(false);
        }
        self.ir_on = on;
        Ok(true)
    }

    fn set_headlight(&mut self, on: bool) -> Result<(), RobotError> {
        self.headlight = on;
        Ok(())
    }

    fn is_obstacle_detected(&mut self) -> Result<bool, RobotError> {
        self.obstacle_queries += 1;
        Ok(match self.obstacle_script.pop_front() {
            Some(blocked) => blocked,
            None => self.blocked_ahead(),
        })
    }

    fn battery_level(&mut self) -> Result<u16, RobotError> {
        Ok(self.battery)
    }

    fn wheel_encoders(&mut self) -> Result<EncoderSample, RobotError> {
        Ok(self.encoders)
    }

    fn forward_kinematics(&mut self) -> Result<Displacement, RobotError> {
        Ok(core::mem::take(&mut self.unread))
    }

    fn drive(&mut self, direction: DriveDirection, speed: u8) -> Result<(), RobotError> {
        self.commands.push(Command::Drive(direction, speed));
        self.pending = Some(Pending::Move(self.drive_motion(direction, speed)));
        Ok(())
    }

    fn rotate(
        &mut self,
        direction: RotateDirection,
        angle: Angle,
        speed: u8,
    ) -> Result<(), RobotError> {
        self.commands.push(Command::Rotate(direction, angle, speed));
        let dtheta = match direction {
            RotateDirection::Left => angle,
            RotateDirection::Right => -angle,
        };
        self.pending = Some(Pending::Move(Displacement {
            dtheta,
            ..Default::default()
        }));
        Ok(())
    }

    fn return_toward_base(&mut self) -> Result<(), RobotError> {
        self.commands.push(Command::ReturnTowardBase);
        self.pending = Some(Pending::ReturnTowardBase);
        Ok(())
    }

    fn dock(&mut self) -> Result<(), RobotError> {
        self.commands.push(Command::Dock);
        self.docked = true;
        Ok(())
    }

    fn wait_until_complete(&mut self, timeout: Time) -> Result<(), RobotError> {
        if self.stalled {
            return Err(RobotError::Timeout {
                waited_secs: timeout.get::<second>(),
            });
        }
        match self.pending.take() {
            Some(Pending::Move(motion)) => self.apply(motion),
            Some(Pending::ReturnTowardBase) => {
                self.truth.x = Length::default();
                self.truth.y = Length::default();
            }
            None => return Ok(()),
        }
        self.battery = self.battery.saturating_sub(self.battery_drain);
        Ok(())
    }

    fn is_charging(&mut self) -> Result<bool, RobotError> {
        if !self.docked {
            return Ok(false);
        }
        if self.charging_polls < self.polls_until_charging {
            self.charging_polls += 1;
            return Ok(false);
        }
        Ok(true)
    }

    fn wifi_signal_strength(&mut self) -> Result<u8, RobotError> {
        Ok(self.wifi)
    }
}

/// Sampler replaying a fixed sequence of draws.
///
/// Values are clamped into the requested range; once the script runs out
/// the lower bound is returned.
#[derive(Debug, Default)]
pub struct ScriptedSampler {
    script: VecDeque<i32>,
    requests: Vec<(i32, i32)>,
}

impl ScriptedSampler {
    pub fn new(script: &[i32]) -> Self {
        Self {
            script: script.iter().copied().collect(),
            requests: Vec::new(),
        }
    }

    /// Ranges requested so far, in order.
    pub fn requests(&self) -> &[(i32, i32)] {
        &self.requests
    }
}

impl UniformSampler for ScriptedSampler {
    fn sample(&mut self, low: i32, high: i32) -> i32 {
        self.requests.push((low, high));
        self.script
            .pop_front()
            .map_or(low, |value| value.clamp(low, high.max(low)))
    }
}

/// `[simulation]` section of the runner configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_arena_half_width_m")]
    pub arena_half_width_m: f32,
    #[serde(default = "default_initial_battery")]
    pub initial_battery: u16,
    #[serde(default = "default_battery_drain")]
    pub battery_drain: u16,
    #[serde(default = "default_polls_until_charging")]
    pub polls_until_charging: u32,
    #[serde(default = "default_ticks_per_meter")]
    pub ticks_per_meter: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            arena_half_width_m: default_arena_half_width_m(),
            initial_battery: default_initial_battery(),
            battery_drain: default_battery_drain(),
            polls_until_charging: default_polls_until_charging(),
            ticks_per_meter: default_ticks_per_meter(),
        }
    }
}

fn default_arena_half_width_m() -> f32 {
    1.0
}
fn default_initial_battery() -> u16 {
    200
}
fn default_battery_drain() -> u16 {
    1
}
fn default_polls_until_charging() -> u32 {
    3
}
fn default_ticks_per_meter() -> f32 {
    500.0
}

#[derive(Deserialize)]
struct SimulationFile {
    #[serde(default)]
    simulation: SimulationConfig,
}

impl SimulationConfig {
    /// Reads the `[simulation]` section of a TOML file.
    pub fn load(path: &Path) -> error::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ExploreError::Config(format!("failed to read config file: {}", e)))?;
        let file: SimulationFile = toml::from_str(&content)?;
        Ok(file.simulation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_moves_truth_and_encoders() {
        let mut robot = SimRobot::builder().build();
        robot.drive(DriveDirection::Forward, 5).unwrap();
        assert_eq!(robot.truth(), Pose::default());

        robot.wait_until_complete(Time::new::<second>(1.0)).unwrap();
        assert!((robot.truth().x.get::<meter>() - 0.1).abs() < 1e-6);
        let sample = robot.wheel_encoders().unwrap();
        assert!(sample.has_moved_since(&EncoderSample::default()));
        assert_eq!(sample.rear.ticks, 0);
        assert_eq!(robot.battery_level().unwrap(), 199);
    }

    #[test]
    fn test_kinematics_are_consumed_on_read() {
        let mut robot = SimRobot::builder().build();
        robot.drive(DriveDirection::TurnLeft, 3).unwrap();
        robot.wait_until_complete(Time::new::<second>(1.0)).unwrap();

        let first = robot.forward_kinematics().unwrap();
        assert!((first.dtheta.get::<degree>() - 18.0).abs() < 1e-4);
        assert_eq!(robot.forward_kinematics().unwrap(), Displacement::default());
    }

    #[test]
    fn test_stalled_wait_times_out() {
        let mut robot = SimRobot::builder().stalled(true).build();
        robot.drive(DriveDirection::Forward, 5).unwrap();
        let result = robot.wait_until_complete(Time::new::<second>(2.0));
        assert!(matches!(result, Err(RobotError::Timeout { .. })));
    }

    #[test]
    fn test_arena_wall_is_detected() {
        let mut robot = SimRobot::builder()
            .arena(Length::new::<meter>(0.3))
            .build();
        assert!(!robot.is_obstacle_detected().unwrap());
        robot.drive(DriveDirection::Forward, 5).unwrap();
        robot.wait_until_complete(Time::new::<second>(1.0)).unwrap();
        robot.drive(DriveDirection::Forward, 5).unwrap();
        robot.wait_until_complete(Time::new::<second>(1.0)).unwrap();
        assert!(robot.is_obstacle_detected().unwrap());
    }

    #[test]
    fn test_charging_after_dock() {
        let mut robot = SimRobot::builder().polls_until_charging(1).build();
        assert!(!robot.is_charging().unwrap());
        robot.dock().unwrap();
        assert!(!robot.is_charging().unwrap());
        assert!(robot.is_charging().unwrap());
    }

    #[test]
    fn test_scripted_sampler() {
        let mut sampler = ScriptedSampler::new(&[1, 100, 2]);
        assert_eq!(sampler.sample(0, 1), 1);
        assert_eq!(sampler.sample(5, 60), 60);
        assert_eq!(sampler.sample(1, 3), 2);
        assert_eq!(sampler.sample(1, 3), 1);
        assert_eq!(sampler.requests(), &[(0, 1), (5, 60), (1, 3), (1, 3)]);
    }
}
