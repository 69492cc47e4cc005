use heapless::Deque;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uom::si::f32::Length;

use crate::{
    error::RobotError,
    estimate::{Displacement, Pose, PoseTracker},
};

/// Number of positions kept in the trail.
pub const TRAIL_LEN: usize = 256;

/// Reading of one wheel encoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelReading {
    pub forward: bool,
    pub ticks: u16,
}

/// Snapshot of the right, left and rear wheel encoders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSample {
    pub right: WheelReading,
    pub left: WheelReading,
    pub rear: WheelReading,
}

impl EncoderSample {
    /// Whether any tick count differs from `previous`. Directions are ignored.
    pub fn has_moved_since(&self, previous: &EncoderSample) -> bool {
        self.right.ticks != previous.right.ticks
            || self.left.ticks != previous.left.ticks
            || self.rear.ticks != previous.rear.ticks
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Position {
    pub x: Length,
    pub y: Length,
}

/// Keeps the pose estimate in step with the wheel encoders.
///
/// The pose only moves when the encoders did. A position that has left the
/// square tracking region is moved back to the origin, together with the
/// trail, before the next motion is applied.
#[derive(Debug)]
pub struct Odometer {
    tracker: PoseTracker,
    origin: Position,
    half_width: Length,
    last_sample: EncoderSample,
    trail: Deque<Position, TRAIL_LEN>,
}

impl Odometer {
    pub fn new(origin: Position, half_width: Length, normalize_heading: bool) -> Self {
        let tracker = PoseTracker::builder()
            .pose(Pose {
                x: origin.x,
                y: origin.y,
                ..Default::default()
            })
            .normalize_heading(normalize_heading)
            .build();
        Self {
            tracker,
            origin,
            half_width,
            last_sample: EncoderSample::default(),
            trail: Deque::new(),
        }
    }

    /// Integrates the motion behind `sample`, if there was any.
    ///
    /// `read_displacement` is only called when at least one tick count
    /// changed. Returns the new pose, or `None` when the robot stood still.
    pub fn update(
        &mut self,
        sample: EncoderSample,
        read_displacement: impl FnOnce() -> Result<Displacement, RobotError>,
    ) -> Result<Option<Pose>, RobotError> {
        if !sample.has_moved_since(&self.last_sample) {
            self.last_sample = sample;
            return Ok(None);
        }

        if self.is_out_of_bounds() {
            debug!(
                x = self.tracker.pose().x.value,
                y = self.tracker.pose().y.value,
                "pose left the tracking region, re-origin"
            );
            self.tracker.reset_to(self.origin.x, self.origin.y);
            self.trail.clear();
        }

        let displacement = read_displacement()?;
        let pose = self.tracker.integrate(&displacement);
        self.record(Position {
            x: pose.x,
            y: pose.y,
        });
        self.last_sample = sample;
        Ok(Some(pose))
    }

    fn record(&mut self, position: Position) {
        if self.trail.is_full() {
            self.trail.pop_front();
        }
        // cannot fail, a slot was freed above
        let _ = self.trail.push_back(position);
    }

    pub fn is_out_of_bounds(&self) -> bool {
        let pose = self.tracker.pose();
        (pose.x - self.origin.x).abs() > self.half_width
            || (pose.y - self.origin.y).abs() > self.half_width
    }

    pub fn pose(&self) -> Pose {
        self.tracker.pose()
    }

    /// Most recent tracked positions, oldest first.
    pub fn trail(&self) -> impl Iterator<Item = &Position> + '_ {
        self.trail.iter()
    }

    pub fn last_sample(&self) -> &EncoderSample {
        &self.last_sample
    }
}
