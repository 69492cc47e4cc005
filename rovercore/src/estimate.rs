use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uom::si::f32::{Angle, Length};

use crate::utils::normalize_angle;

/// Estimated position and cumulative heading of the robot in a fixed plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Pose {
    pub x: Length,
    pub y: Length,
    /// Running sum of every rotation delta integrated so far.
    pub heading: Angle,
}

/// Motion of the last movement, expressed in the robot's own frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Displacement {
    pub dx: Length,
    pub dy: Length,
    pub dtheta: Angle,
}

/// Dead-reckoning integrator turning local displacements into a global pose.
///
/// Each step first accumulates the rotation and then rotates the local
/// translation by the *updated* heading before adding it to the position.
/// Swapping that order changes how drift builds up, so it is not an
/// equivalent formulation.
#[derive(Debug, TypedBuilder)]
pub struct PoseTracker {
    #[builder(default)]
    pose: Pose,
    #[builder(default)]
    normalize_heading: bool,
}

impl PoseTracker {
    pub fn integrate(
        &mut self,
        &Displacement { dx, dy, dtheta }: &Displacement,
    ) -> Pose {
        self.pose.heading += dtheta;
        if self.normalize_heading {
            self.pose.heading = normalize_angle(self.pose.heading);
        }

        let sin_h = self.pose.heading.value.sin();
        let cos_h = self.pose.heading.value.cos();
        self.pose.x += dx * cos_h - dy * sin_h;
        self.pose.y += dx * sin_h + dy * cos_h;

        self.pose
    }

    /// Moves the position back to `(x, y)`. The heading is left untouched.
    pub fn reset_to(&mut self, x: Length, y: Length) {
        self.pose.x = x;
        self.pose.y = y;
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use uom::si::{angle::radian, length::meter};

    use super::*;

    fn step(dx: f32, dy: f32, dtheta: f32) -> Displacement {
        Displacement {
            dx: Length::new::<meter>(dx),
            dy: Length::new::<meter>(dy),
            dtheta: Angle::new::<radian>(dtheta),
        }
    }

    #[test]
    fn test_three_quarter_turns() {
        use core::f32::consts::FRAC_PI_2;

        let mut tracker = PoseTracker::builder().build();
        let expected = [(0.0, 1.0), (-1.0, 1.0), (-1.0, 0.0)];

        for (x, y) in expected {
            let pose = tracker.integrate(&step(1.0, 0.0, FRAC_PI_2));
            assert_relative_eq!(pose.x.get::<meter>(), x, epsilon = 1e-5);
            assert_relative_eq!(pose.y.get::<meter>(), y, epsilon = 1e-5);
        }
        assert_relative_eq!(
            tracker.pose().heading.get::<radian>(),
            3.0 * FRAC_PI_2,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_rotation_applied_before_translation() {
        use core::f32::consts::FRAC_PI_4;

        let mut tracker = PoseTracker::builder().build();
        let pose = tracker.integrate(&step(2.0, 0.0, FRAC_PI_4));

        // with the pre-update heading the result would be (2, 0)
        assert_relative_eq!(pose.x.get::<meter>(), 2.0f32.sqrt(), epsilon = 1e-5);
        assert_relative_eq!(pose.y.get::<meter>(), 2.0f32.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_lateral_displacement() {
        use core::f32::consts::FRAC_PI_2;

        let mut tracker = PoseTracker::builder()
            .pose(Pose {
                heading: Angle::new::<radian>(FRAC_PI_2),
                ..Default::default()
            })
            .build();
        let pose = tracker.integrate(&step(0.0, 1.0, 0.0));

        assert_relative_eq!(pose.x.get::<meter>(), -1.0, epsilon = 1e-5);
        assert_relative_eq!(pose.y.get::<meter>(), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_heading_is_unbounded_by_default() {
        use core::f32::consts::PI;

        let mut tracker = PoseTracker::builder().build();
        for _ in 0..6 {
            tracker.integrate(&step(0.0, 0.0, PI / 2.0));
        }
        assert_relative_eq!(
            tracker.pose().heading.get::<radian>(),
            3.0 * PI,
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_normalized_heading() {
        use core::f32::consts::PI;

        let mut tracker = PoseTracker::builder().normalize_heading(true).build();
        for _ in 0..6 {
            tracker.integrate(&step(1.0, 0.0, PI / 2.0));
        }
        let heading = tracker.pose().heading.get::<radian>();
        assert_relative_eq!(heading.abs(), PI, epsilon = 1e-4);
    }

    #[test]
    fn test_reset_keeps_heading() {
        let mut tracker = PoseTracker::builder().build();
        tracker.integrate(&step(3.0, -1.0, 0.7));
        tracker.reset_to(Length::new::<meter>(0.5), Length::new::<meter>(-0.5));

        let pose = tracker.pose();
        assert_relative_eq!(pose.x.get::<meter>(), 0.5);
        assert_relative_eq!(pose.y.get::<meter>(), -0.5);
        assert_relative_eq!(pose.heading.get::<radian>(), 0.7);
    }

    proptest! {
        #[test]
        fn test_matches_closed_form(
            steps in prop::collection::vec((-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0), 1..20)
        ) {
            let mut tracker = PoseTracker::builder().build();
            let (mut x, mut y, mut h) = (0.0f64, 0.0f64, 0.0f64);
            for &(dx, dy, dtheta) in &steps {
                tracker.integrate(&step(dx, dy, dtheta));
                h += dtheta as f64;
                x += dx as f64 * h.cos() - dy as f64 * h.sin();
                y += dx as f64 * h.sin() + dy as f64 * h.cos();
            }
            let pose = tracker.pose();
            prop_assert!((pose.x.get::<meter>() as f64 - x).abs() < 1e-3);
            prop_assert!((pose.y.get::<meter>() as f64 - y).abs() < 1e-3);
            prop_assert!((pose.heading.get::<radian>() as f64 - h).abs() < 1e-3);
        }
    }
}
