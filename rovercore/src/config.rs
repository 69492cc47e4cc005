//! Configuration loading.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use uom::si::{
    angle::degree,
    f32::{Angle, Length, Time},
    length::meter,
    time::second,
};

use crate::{
    error::{ExploreError, Result},
    odometry::{Odometer, Position},
};

/// Top-level configuration file.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RoverConfig {
    #[serde(default)]
    pub exploration: ExplorationConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

/// Decision thresholds and command magnitudes of the exploration loop.
#[derive(Clone, Debug, Deserialize)]
pub struct ExplorationConfig {
    /// Battery level below which the robot heads back to the dock
    #[serde(default = "default_low_battery_threshold")]
    pub low_battery_threshold: u16,

    /// Speed of each forward advance
    #[serde(default = "default_advance_speed")]
    pub advance_speed: u8,

    /// Forward advances between two anti-stall retreats
    #[serde(default = "default_backoff_threshold")]
    pub backoff_threshold: u32,

    /// Backward-diagonal drives per retreat
    #[serde(default = "default_backoff_repeat")]
    pub backoff_repeat: u32,

    #[serde(default = "default_backoff_speed")]
    pub backoff_speed: u8,

    /// Speed of the turning drives while avoiding an obstacle
    #[serde(default = "default_avoid_speed")]
    pub avoid_speed: u8,

    /// Speed of the closing rotation of an avoidance episode
    #[serde(default = "default_rotate_speed")]
    pub rotate_speed: u8,

    #[serde(default = "default_min_turn_angle_deg")]
    pub min_turn_angle_deg: i32,

    #[serde(default = "default_max_turn_angle_deg")]
    pub max_turn_angle_deg: i32,

    #[serde(default = "default_min_avoid_repeat")]
    pub min_avoid_repeat: i32,

    #[serde(default = "default_max_avoid_repeat")]
    pub max_avoid_repeat: i32,

    /// Avoidance episodes tried before giving up on an obstacle
    #[serde(default = "default_max_avoidance_attempts")]
    pub max_avoidance_attempts: u32,

    /// Added to the maximum turn angle on every retry (capped at 180)
    #[serde(default = "default_angle_widening_deg")]
    pub angle_widening_deg: i32,

    /// Longest wait for a single command to complete
    #[serde(default = "default_drive_timeout_secs")]
    pub drive_timeout_secs: f32,

    /// Pause between two ticks of the outer loop
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Seed of the random decision source. Drawn from entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Dead-reckoning tracking region.
#[derive(Clone, Debug, Deserialize)]
pub struct TrackingConfig {
    #[serde(default)]
    pub origin_x_m: f32,

    #[serde(default)]
    pub origin_y_m: f32,

    /// Half the side of the square region around the origin
    #[serde(default = "default_half_width_m")]
    pub half_width_m: f32,

    /// Wrap the cumulative heading into (-pi, pi] after every step
    #[serde(default)]
    pub normalize_heading: bool,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            low_battery_threshold: default_low_battery_threshold(),
            advance_speed: default_advance_speed(),
            backoff_threshold: default_backoff_threshold(),
            backoff_repeat: default_backoff_repeat(),
            backoff_speed: default_backoff_speed(),
            avoid_speed: default_avoid_speed(),
            rotate_speed: default_rotate_speed(),
            min_turn_angle_deg: default_min_turn_angle_deg(),
            max_turn_angle_deg: default_max_turn_angle_deg(),
            min_avoid_repeat: default_min_avoid_repeat(),
            max_avoid_repeat: default_max_avoid_repeat(),
            max_avoidance_attempts: default_max_avoidance_attempts(),
            angle_widening_deg: default_angle_widening_deg(),
            drive_timeout_secs: default_drive_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            seed: None,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            origin_x_m: 0.0,
            origin_y_m: 0.0,
            half_width_m: default_half_width_m(),
            normalize_heading: false,
        }
    }
}

fn default_low_battery_threshold() -> u16 {
    106
}
fn default_advance_speed() -> u8 {
    5
}
fn default_backoff_threshold() -> u32 {
    25
}
fn default_backoff_repeat() -> u32 {
    5
}
fn default_backoff_speed() -> u8 {
    2
}
fn default_avoid_speed() -> u8 {
    3
}
fn default_rotate_speed() -> u8 {
    3
}
fn default_min_turn_angle_deg() -> i32 {
    5
}
fn default_max_turn_angle_deg() -> i32 {
    60
}
fn default_min_avoid_repeat() -> i32 {
    1
}
fn default_max_avoid_repeat() -> i32 {
    3
}
fn default_max_avoidance_attempts() -> u32 {
    8
}
fn default_angle_widening_deg() -> i32 {
    15
}
fn default_drive_timeout_secs() -> f32 {
    10.0
}
fn default_poll_interval_ms() -> u64 {
    10
}
fn default_half_width_m() -> f32 {
    1.25
}

impl RoverConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ExploreError::Config(format!("failed to read config file: {}", e)))?;
        let config: RoverConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let e = &self.exploration;
        if e.min_turn_angle_deg > e.max_turn_angle_deg {
            return Err(ExploreError::Config(format!(
                "turn angle range {}..={} is empty",
                e.min_turn_angle_deg, e.max_turn_angle_deg
            )));
        }
        if e.min_avoid_repeat < 1 || e.min_avoid_repeat > e.max_avoid_repeat {
            return Err(ExploreError::Config(format!(
                "avoidance repeat range {}..={} is invalid",
                e.min_avoid_repeat, e.max_avoid_repeat
            )));
        }
        if e.backoff_threshold == 0 {
            return Err(ExploreError::Config("backoff threshold must be positive".into()));
        }
        if e.max_avoidance_attempts == 0 {
            return Err(ExploreError::Config(
                "at least one avoidance attempt is required".into(),
            ));
        }
        if !(e.drive_timeout_secs > 0.0) {
            return Err(ExploreError::Config("drive timeout must be positive".into()));
        }
        if !(self.tracking.half_width_m > 0.0) {
            return Err(ExploreError::Config(
                "tracking half width must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl ExplorationConfig {
    pub fn drive_timeout(&self) -> Time {
        Time::new::<second>(self.drive_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Largest turn angle for the given 0-based avoidance attempt.
    pub fn max_turn_angle(&self, attempt: u32) -> i32 {
        let widened = self
            .max_turn_angle_deg
            .saturating_add(self.angle_widening_deg.saturating_mul(attempt as i32));
        widened.min(180).max(self.min_turn_angle_deg)
    }

    pub fn turn_angle(degrees: i32) -> Angle {
        Angle::new::<degree>(degrees as f32)
    }
}

impl TrackingConfig {
    pub fn origin(&self) -> Position {
        Position {
            x: Length::new::<meter>(self.origin_x_m),
            y: Length::new::<meter>(self.origin_y_m),
        }
    }

    pub fn odometer(&self) -> Odometer {
        Odometer::new(
            self.origin(),
            Length::new::<meter>(self.half_width_m),
            self.normalize_heading,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: RoverConfig = toml::from_str("").unwrap();
        assert_eq!(config.exploration.low_battery_threshold, 106);
        assert_eq!(config.exploration.backoff_threshold, 25);
        assert_eq!(config.exploration.backoff_repeat, 5);
        assert_eq!(config.exploration.seed, None);
        assert!(!config.tracking.normalize_heading);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_override() {
        let config: RoverConfig = toml::from_str(
            r#"
            [exploration]
            low_battery_threshold = 90
            seed = 1234

            [tracking]
            half_width_m = 3.0
            normalize_heading = true
            "#,
        )
        .unwrap();
        assert_eq!(config.exploration.low_battery_threshold, 90);
        assert_eq!(config.exploration.seed, Some(1234));
        assert_eq!(config.exploration.advance_speed, 5);
        assert_eq!(config.tracking.half_width_m, 3.0);
        assert!(config.tracking.normalize_heading);
    }

    #[test]
    fn test_invalid_ranges_are_rejected() {
        let mut config = RoverConfig::default();
        config.exploration.min_turn_angle_deg = 70;
        assert!(matches!(config.validate(), Err(ExploreError::Config(_))));

        let mut config = RoverConfig::default();
        config.exploration.min_avoid_repeat = 0;
        assert!(config.validate().is_err());

        let mut config = RoverConfig::default();
        config.exploration.drive_timeout_secs = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let result: std::result::Result<RoverConfig, _> = toml::from_str("[exploration\n");
        let error: ExploreError = result.unwrap_err().into();
        assert!(matches!(error, ExploreError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let result = RoverConfig::load(Path::new("/nonexistent/rover.toml"));
        assert!(matches!(result, Err(ExploreError::Config(_))));
    }

    #[test]
    fn test_turn_angle_widening() {
        let config = ExplorationConfig::default();
        assert_eq!(config.max_turn_angle(0), 60);
        assert_eq!(config.max_turn_angle(1), 75);
        assert_eq!(config.max_turn_angle(2), 90);
        assert_eq!(config.max_turn_angle(100), 180);
    }
}
