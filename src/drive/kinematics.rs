// Swerve inverse kinematics for a four-module chassis
// Converts a chassis demand (forward, rotation, strafe) into per-module wheel vectors.
//
// Frame: +x forward, +y left, positive rotation = counter-clockwise.

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Number of modules on the chassis (front-left, front-right, rear-left, rear-right)
pub const MODULE_COUNT: usize = 4;

/// Below this every module is considered stopped and keeps its last heading
const STOPPED_SPEED_EPSILON: f64 = 1e-6;

/// Minimum distance (meters) between a module and the robot centre or another module
const MIN_OFFSET: f64 = 1e-3;

/// Wrap an angle into [0, 2π)
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round tiny negatives up to exactly TAU
    if wrapped >= TAU { 0.0 } else { wrapped }
}

/// Signed shortest rotation from `from` to `to`, in (-π, π]
pub fn shortest_angle_delta(from: f64, to: f64) -> f64 {
    let delta = wrap_angle(to - from);
    if delta > PI { delta - TAU } else { delta }
}

/// Commanded or measured state of one module
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleState {
    /// Signed wheel speed (m/s)
    pub speed: f64,
    /// Steer heading (rad), wrapped to [0, 2π)
    pub angle: f64,
}

impl ModuleState {
    pub fn new(speed: f64, angle: f64) -> Self {
        Self {
            speed,
            angle: wrap_angle(angle),
        }
    }

    /// Never steer more than 90°: if the target heading is further than a quarter
    /// turn from `current_angle`, point the opposite way and reverse the wheel.
    pub fn optimize(self, current_angle: f64) -> Self {
        let delta = shortest_angle_delta(current_angle, self.angle);
        if delta.abs() > FRAC_PI_2 {
            Self::new(-self.speed, self.angle + PI)
        } else {
            self
        }
    }
}

/// Distance driven and heading of one module
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModulePosition {
    pub distance: f64,
    pub angle: f64,
}

/// Momentary sideways translation selected from the discrete directional input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrafeDirection {
    #[default]
    None,
    Left,
    Right,
}

/// Whole-robot motion demand for one control cycle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChassisDemand {
    /// Forward velocity (m/s)
    pub forward: f64,
    /// Rotation rate (rad/s, counter-clockwise positive)
    pub rotation: f64,
    pub strafe: StrafeDirection,
    /// Strafe speed (m/s), always applied as a magnitude
    pub strafe_magnitude: f64,
}

impl ChassisDemand {
    pub fn stop() -> Self {
        Self::default()
    }

    pub fn arcade(forward: f64, rotation: f64) -> Self {
        Self {
            forward,
            rotation,
            ..Self::default()
        }
    }

    pub fn strafe(direction: StrafeDirection, magnitude: f64) -> Self {
        Self {
            strafe: direction,
            strafe_magnitude: magnitude.abs(),
            ..Self::default()
        }
    }

    /// Body-frame linear velocity (vx, vy)
    pub fn linear_velocity(&self) -> (f64, f64) {
        let lateral = match self.strafe {
            StrafeDirection::None => 0.0,
            StrafeDirection::Left => self.strafe_magnitude,
            StrafeDirection::Right => -self.strafe_magnitude,
        };
        (self.forward, lateral)
    }

    pub fn is_finite(&self) -> bool {
        self.forward.is_finite() && self.rotation.is_finite() && self.strafe_magnitude.is_finite()
    }
}

/// Mounting offset of one module relative to the robot centre (meters)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleGeometry {
    pub x: f64,
    pub y: f64,
}

impl ModuleGeometry {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_from_centre(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Invalid module geometry, rejected at construction
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KinematicsError {
    #[error("Expected {expected} modules, got {actual}")]
    ModuleCount { expected: usize, actual: usize },

    #[error("Module {index} offset ({x}, {y}) is not finite")]
    NonFiniteOffset { index: usize, x: f64, y: f64 },

    #[error("Module {index} sits on the robot centre")]
    ModuleAtCentre { index: usize },

    #[error("Modules {first} and {second} share the same offset")]
    CoincidentModules { first: usize, second: usize },

    #[error("Max module speed must be positive and finite, got {0}")]
    InvalidMaxSpeed(f64),
}

/// Fixed four-module geometry plus the speed ceiling used for desaturation
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    modules: [ModuleGeometry; MODULE_COUNT],
    max_speed: f64,
}

impl SwerveKinematics {
    /// Validate geometry and build the transform
    ///
    /// # Arguments
    /// * `modules` - Offsets in order front-left, front-right, rear-left, rear-right
    /// * `max_speed` - Highest achievable module speed (m/s)
    pub fn new(modules: &[ModuleGeometry], max_speed: f64) -> Result<Self, KinematicsError> {
        let modules: [ModuleGeometry; MODULE_COUNT] =
            modules.try_into().map_err(|_| KinematicsError::ModuleCount {
                expected: MODULE_COUNT,
                actual: modules.len(),
            })?;

        if !(max_speed.is_finite() && max_speed > 0.0) {
            return Err(KinematicsError::InvalidMaxSpeed(max_speed));
        }

        for (index, module) in modules.iter().enumerate() {
            if !(module.x.is_finite() && module.y.is_finite()) {
                return Err(KinematicsError::NonFiniteOffset {
                    index,
                    x: module.x,
                    y: module.y,
                });
            }
            if module.distance_from_centre() < MIN_OFFSET {
                return Err(KinematicsError::ModuleAtCentre { index });
            }
            for (other, earlier) in modules[..index].iter().enumerate() {
                if (module.x - earlier.x).hypot(module.y - earlier.y) < MIN_OFFSET {
                    return Err(KinematicsError::CoincidentModules {
                        first: other,
                        second: index,
                    });
                }
            }
        }

        Ok(Self { modules, max_speed })
    }

    pub fn geometry(&self) -> &[ModuleGeometry; MODULE_COUNT] {
        &self.modules
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    /// Per-module velocity vectors (vx, vy): chassis velocity plus ω × r
    fn module_vectors(&self, demand: &ChassisDemand) -> [(f64, f64); MODULE_COUNT] {
        let (vx, vy) = demand.linear_velocity();
        let omega = demand.rotation;
        self.modules
            .map(|module| (vx - omega * module.y, vy + omega * module.x))
    }

    /// Convert a chassis demand into desaturated module states
    ///
    /// When every module would be stopped, each keeps its heading from `previous`
    /// instead of snapping back to zero.
    pub fn to_module_states(
        &self,
        demand: &ChassisDemand,
        previous: &[ModuleState; MODULE_COUNT],
    ) -> [ModuleState; MODULE_COUNT] {
        let vectors = self.module_vectors(demand);
        let all_stopped = vectors
            .iter()
            .all(|(x, y)| x.hypot(*y) < STOPPED_SPEED_EPSILON);

        if all_stopped {
            return (*previous).map(|state| ModuleState::new(0.0, state.angle));
        }

        let mut states = vectors.map(|(x, y)| ModuleState::new(x.hypot(y), y.atan2(x)));
        desaturate(&mut states, self.max_speed);
        states
    }

    /// Project each module vector onto a fixed steer heading.
    ///
    /// This is the tank-arcade case: modules do not steer with rotation, so the
    /// rotational part of the demand shows up only as a left/right speed split.
    pub fn to_fixed_heading_states(
        &self,
        demand: &ChassisDemand,
        heading: f64,
    ) -> [ModuleState; MODULE_COUNT] {
        let (sin_h, cos_h) = heading.sin_cos();
        let mut states = self
            .module_vectors(demand)
            .map(|(x, y)| ModuleState::new(x * cos_h + y * sin_h, heading));
        desaturate(&mut states, self.max_speed);
        states
    }
}

/// Scale all speeds down together so the fastest module sits at `max_speed`
pub fn desaturate(states: &mut [ModuleState], max_speed: f64) {
    let fastest = states
        .iter()
        .map(|state| state.speed.abs())
        .fold(0.0f64, f64::max);

    if fastest > max_speed {
        let scale = max_speed / fastest;
        for state in states.iter_mut() {
            state.speed *= scale;
        }
    }
}

/// How module states are produced from a chassis demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveStrategy {
    /// Full swerve: every module steers to its own vector
    #[default]
    Swerve,
    /// Arcade drive with all modules held at one heading (0, or ±90° while strafing)
    TankArcade,
}

impl DriveStrategy {
    pub fn module_states(
        &self,
        kinematics: &SwerveKinematics,
        demand: &ChassisDemand,
        previous: &[ModuleState; MODULE_COUNT],
    ) -> [ModuleState; MODULE_COUNT] {
        match self {
            DriveStrategy::Swerve => kinematics.to_module_states(demand, previous),
            DriveStrategy::TankArcade => {
                let heading = match demand.strafe {
                    StrafeDirection::None => 0.0,
                    StrafeDirection::Left => FRAC_PI_2,
                    StrafeDirection::Right => -FRAC_PI_2,
                };
                kinematics.to_fixed_heading_states(demand, heading)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const NO_HISTORY: [ModuleState; MODULE_COUNT] = [ModuleState {
        speed: 0.0,
        angle: 0.0,
    }; MODULE_COUNT];

    fn square_kinematics(max_speed: f64) -> SwerveKinematics {
        SwerveKinematics::new(
            &[
                ModuleGeometry::new(0.3, 0.3),
                ModuleGeometry::new(0.3, -0.3),
                ModuleGeometry::new(-0.3, 0.3),
                ModuleGeometry::new(-0.3, -0.3),
            ],
            max_speed,
        )
        .unwrap()
    }

    #[test]
    fn test_wrap_angle() {
        assert_relative_eq!(wrap_angle(-FRAC_PI_2), 3.0 * FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(TAU + 0.5), 0.5, epsilon = 1e-12);
        assert_eq!(wrap_angle(-1e-18), 0.0);
        assert!(wrap_angle(-1e-18) < TAU);
    }

    #[test]
    fn test_shortest_angle_delta_wraps() {
        let delta = shortest_angle_delta(350f64.to_radians(), 10f64.to_radians());
        assert_relative_eq!(delta, 20f64.to_radians(), epsilon = 1e-9);

        let delta = shortest_angle_delta(10f64.to_radians(), 350f64.to_radians());
        assert_relative_eq!(delta, -20f64.to_radians(), epsilon = 1e-9);
    }

    #[test]
    fn test_pure_forward_all_modules_equal() {
        let kinematics = square_kinematics(1.0);
        let states = kinematics.to_module_states(&ChassisDemand::arcade(1.0, 0.0), &NO_HISTORY);
        for state in states {
            assert_relative_eq!(state.speed, 1.0, epsilon = 1e-9);
            assert_relative_eq!(state.angle, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_reverse_points_modules_backward() {
        let kinematics = square_kinematics(1.0);
        let states = kinematics.to_module_states(&ChassisDemand::arcade(-0.5, 0.0), &NO_HISTORY);
        for state in states {
            assert_relative_eq!(state.speed, 0.5, epsilon = 1e-9);
            assert_relative_eq!(state.angle, PI, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_pure_rotation_perpendicular_to_offsets() {
        let kinematics = SwerveKinematics::new(
            &[
                ModuleGeometry::new(0.4, 0.2),
                ModuleGeometry::new(0.4, -0.2),
                ModuleGeometry::new(-0.2, 0.2),
                ModuleGeometry::new(-0.2, -0.2),
            ],
            10.0,
        )
        .unwrap();
        let omega = 1.5;
        let states = kinematics.to_module_states(&ChassisDemand::arcade(0.0, omega), &NO_HISTORY);

        for (state, module) in states.iter().zip(kinematics.geometry()) {
            println!("module {:?} -> {:?}", module, state);
            // Speed proportional to distance from centre
            assert_relative_eq!(
                state.speed,
                omega * module.distance_from_centre(),
                epsilon = 1e-9
            );
            // Heading perpendicular to the offset vector
            let dot = state.angle.cos() * module.x + state.angle.sin() * module.y;
            assert!(dot.abs() < 1e-9, "Module heading not perpendicular: dot={}", dot);
        }
    }

    #[test]
    fn test_desaturation_preserves_ratios() {
        let kinematics = square_kinematics(1.0);
        let demand = ChassisDemand::arcade(1.0, 3.0);
        let states = kinematics.to_module_states(&demand, &NO_HISTORY);

        let unscaled = square_kinematics(100.0).to_module_states(&demand, &NO_HISTORY);
        let fastest = states.iter().map(|s| s.speed.abs()).fold(0.0, f64::max);
        assert_relative_eq!(fastest, 1.0, epsilon = 1e-12);

        for (scaled, raw) in states.iter().zip(unscaled.iter()) {
            assert_relative_eq!(scaled.angle, raw.angle, epsilon = 1e-12);
        }
        let ratio = unscaled[0].speed / states[0].speed;
        for (scaled, raw) in states.iter().zip(unscaled.iter()) {
            assert_relative_eq!(raw.speed / scaled.speed, ratio, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_desaturate_leaves_slow_states_alone() {
        let mut states = [ModuleState::new(0.5, 0.0), ModuleState::new(-0.25, 1.0)];
        desaturate(&mut states, 1.0);
        assert_eq!(states[0].speed, 0.5);
        assert_eq!(states[1].speed, -0.25);
    }

    #[test]
    fn test_stop_holds_last_angles() {
        let kinematics = square_kinematics(1.0);
        let previous = [
            ModuleState::new(0.3, 0.7),
            ModuleState::new(0.3, 1.2),
            ModuleState::new(0.3, 2.0),
            ModuleState::new(0.3, 5.5),
        ];
        let states = kinematics.to_module_states(&ChassisDemand::stop(), &previous);
        for (state, prev) in states.iter().zip(previous.iter()) {
            assert_eq!(state.speed, 0.0);
            assert_eq!(state.angle, prev.angle);
        }
    }

    #[test]
    fn test_strafe_left_points_modules_sideways() {
        let kinematics = square_kinematics(1.0);
        let demand = ChassisDemand::strafe(StrafeDirection::Left, 0.4);
        let states = kinematics.to_module_states(&demand, &NO_HISTORY);
        for state in states {
            assert_relative_eq!(state.speed, 0.4, epsilon = 1e-9);
            assert_relative_eq!(state.angle, FRAC_PI_2, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_tank_arcade_splits_rotation_left_right() {
        let kinematics = square_kinematics(10.0);
        let states = DriveStrategy::TankArcade.module_states(
            &kinematics,
            &ChassisDemand::arcade(1.0, 1.0),
            &NO_HISTORY,
        );
        // Left modules (0, 2) slow down, right modules (1, 3) speed up for CCW rotation
        assert_relative_eq!(states[0].speed, 0.7, epsilon = 1e-9);
        assert_relative_eq!(states[2].speed, 0.7, epsilon = 1e-9);
        assert_relative_eq!(states[1].speed, 1.3, epsilon = 1e-9);
        assert_relative_eq!(states[3].speed, 1.3, epsilon = 1e-9);
        for state in states {
            assert_eq!(state.angle, 0.0);
        }
    }

    #[test]
    fn test_tank_arcade_strafe_right() {
        let kinematics = square_kinematics(1.0);
        let states = DriveStrategy::TankArcade.module_states(
            &kinematics,
            &ChassisDemand::strafe(StrafeDirection::Right, 0.3),
            &NO_HISTORY,
        );
        for state in states {
            assert_relative_eq!(state.speed, 0.3, epsilon = 1e-9);
            assert_relative_eq!(state.angle, 3.0 * FRAC_PI_2, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_optimize_flips_past_quarter_turn() {
        let state = ModuleState::new(1.0, PI).optimize(0.1);
        assert_relative_eq!(state.speed, -1.0, epsilon = 1e-12);
        assert_relative_eq!(state.angle, 0.0, epsilon = 1e-12);

        let state = ModuleState::new(1.0, 0.5).optimize(0.0);
        assert_eq!(state, ModuleState::new(1.0, 0.5));
    }

    #[test]
    fn test_optimize_is_idempotent() {
        let currents = [0.0, 1.0, 2.5, 4.0, 6.0];
        let targets = [0.0, 1.6, 3.0, 4.7, 6.2];
        for &current in &currents {
            for &target in &targets {
                let once = ModuleState::new(0.8, target).optimize(current);
                let twice = once.optimize(current);
                assert_eq!(once, twice, "current={} target={}", current, target);
            }
        }
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let short = [ModuleGeometry::new(0.3, 0.3); 3];
        assert_eq!(
            SwerveKinematics::new(&short, 1.0).unwrap_err(),
            KinematicsError::ModuleCount {
                expected: 4,
                actual: 3
            }
        );

        let centred = [
            ModuleGeometry::new(0.0, 0.0),
            ModuleGeometry::new(0.3, -0.3),
            ModuleGeometry::new(-0.3, 0.3),
            ModuleGeometry::new(-0.3, -0.3),
        ];
        assert_eq!(
            SwerveKinematics::new(&centred, 1.0).unwrap_err(),
            KinematicsError::ModuleAtCentre { index: 0 }
        );

        let coincident = [
            ModuleGeometry::new(0.3, 0.3),
            ModuleGeometry::new(0.3, -0.3),
            ModuleGeometry::new(0.3, 0.3),
            ModuleGeometry::new(-0.3, -0.3),
        ];
        assert_eq!(
            SwerveKinematics::new(&coincident, 1.0).unwrap_err(),
            KinematicsError::CoincidentModules {
                first: 0,
                second: 2
            }
        );

        let fine = [
            ModuleGeometry::new(0.3, 0.3),
            ModuleGeometry::new(0.3, -0.3),
            ModuleGeometry::new(-0.3, 0.3),
            ModuleGeometry::new(-0.3, -0.3),
        ];
        assert!(matches!(
            SwerveKinematics::new(&fine, 0.0),
            Err(KinematicsError::InvalidMaxSpeed(_))
        ));
    }
}
