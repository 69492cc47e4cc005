//! Error types for the exploration core.

use thiserror::Error;

/// Failure reported by the robot link.
#[derive(Error, Debug)]
pub enum RobotError {
    #[error("robot link is disconnected")]
    Disconnected,

    #[error("command did not complete within {waited_secs:.1}s")]
    Timeout { waited_secs: f32 },

    #[error("command rejected: {0}")]
    Command(String),
}

/// Errors that end an exploration session.
#[derive(Error, Debug)]
pub enum ExploreError {
    #[error("not connected to robot")]
    NotConnected,

    #[error("IR sensor failed to activate")]
    IrActivation,

    #[error("robot error: {0}")]
    Robot(#[from] RobotError),

    #[error("obstacle still present after {attempts} avoidance attempts")]
    ObstacleNotCleared { attempts: u32 },

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for ExploreError {
    fn from(e: toml::de::Error) -> Self {
        ExploreError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExploreError>;
