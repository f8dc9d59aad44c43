// Per-cycle selection of the drive mode and the chassis demand it produces
//
// Modes, re-evaluated every cycle:
// - AlignmentSuspended: steer loops idle for encoder zeroing, chassis held still
// - VisionAlign: rotation from the vision loop, translation from policy or operator
// - StrafeLeft / StrafeRight: momentary, only while the POV is held
// - TeleopArcade: default

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::kinematics::{ChassisDemand, StrafeDirection};
use super::shaping::{SlewRateLimiter, apply_deadband, clamp_axis};
use super::vision::{AlignPolicy, VisionAlignLoop};
use crate::messages::{OperatorCommand, VisionSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    #[default]
    TeleopArcade,
    StrafeLeft,
    StrafeRight,
    VisionAlign,
    AlignmentSuspended,
}

/// POV hat position, decoded from its angle in degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscreteDirection {
    #[default]
    None,
    Up,
    Right,
    Left,
    Other(i32),
}

impl DiscreteDirection {
    pub fn from_pov(pov: i32) -> Self {
        match pov {
            -1 => DiscreteDirection::None,
            0 => DiscreteDirection::Up,
            90 => DiscreteDirection::Right,
            270 => DiscreteDirection::Left,
            other => DiscreteDirection::Other(other),
        }
    }

    /// Only the pure left/right positions strafe; everything else drives normally
    pub fn strafe(&self) -> StrafeDirection {
        match self {
            DiscreteDirection::Left => StrafeDirection::Left,
            DiscreteDirection::Right => StrafeDirection::Right,
            _ => StrafeDirection::None,
        }
    }
}

/// Operator intent for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OperatorInput {
    pub forward: f64,
    pub rotation: f64,
    pub strafe_throttle: f64,
    pub direction: DiscreteDirection,
    pub rate_limited: bool,
}

impl From<&OperatorCommand> for OperatorInput {
    fn from(cmd: &OperatorCommand) -> Self {
        Self {
            forward: cmd.forward,
            rotation: cmd.rotation,
            strafe_throttle: cmd.strafe_throttle,
            direction: cmd.direction(),
            rate_limited: cmd.rate_limited,
        }
    }
}

/// Scaling and shaping applied to operator input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchSettings {
    pub deadband: f64,
    pub power_percent: f64,
    pub angular_power_percent: f64,
    pub strafe_power_percent: f64,
    pub min_strafe_speed: f64,
    pub magnitude_slew_rate: f64,
    pub rotational_slew_rate: f64,
    /// m/s at full forward authority
    pub max_speed: f64,
    /// rad/s at full rotation authority
    pub max_angular_speed: f64,
}

pub struct DriveModeDispatcher {
    settings: DispatchSettings,
    magnitude_limiter: SlewRateLimiter,
    rotation_limiter: SlewRateLimiter,
    vision: VisionAlignLoop,
    vision_align: bool,
    alignment_enabled: bool,
    mode: DriveMode,
}

impl DriveModeDispatcher {
    pub fn new(settings: DispatchSettings, policy: AlignPolicy) -> Self {
        Self {
            settings,
            magnitude_limiter: SlewRateLimiter::new(settings.magnitude_slew_rate),
            rotation_limiter: SlewRateLimiter::new(settings.rotational_slew_rate),
            vision: VisionAlignLoop::new(policy),
            vision_align: false,
            alignment_enabled: true,
            mode: DriveMode::TeleopArcade,
        }
    }

    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    pub fn alignment_enabled(&self) -> bool {
        self.alignment_enabled
    }

    pub fn set_alignment_enabled(&mut self, enabled: bool) {
        if self.alignment_enabled != enabled {
            info!("Module alignment {}", if enabled { "resumed" } else { "suspended" });
        }
        self.alignment_enabled = enabled;
    }

    pub fn vision_align(&self) -> bool {
        self.vision_align
    }

    pub fn set_vision_align(&mut self, enabled: bool) {
        if self.vision_align != enabled {
            info!("Vision align {}", if enabled { "engaged" } else { "released" });
            self.vision.reset();
        }
        self.vision_align = enabled;
    }

    /// Drop any rate-limited history so the next command starts from rest
    pub fn reset_limiters(&mut self) {
        self.sync_limiters(0.0, 0.0);
    }

    /// Point both limiters at what the chassis is actually being asked to do.
    /// Modes that bypass the limiters call this so teleop resumes from the real demand.
    fn sync_limiters(&mut self, forward: f64, rotation: f64) {
        self.magnitude_limiter.reset(forward);
        self.rotation_limiter.reset(rotation);
    }

    fn select_mode(&self, direction: DiscreteDirection) -> DriveMode {
        if !self.alignment_enabled {
            return DriveMode::AlignmentSuspended;
        }
        if self.vision_align {
            return DriveMode::VisionAlign;
        }
        match direction.strafe() {
            StrafeDirection::Left => DriveMode::StrafeLeft,
            StrafeDirection::Right => DriveMode::StrafeRight,
            StrafeDirection::None => DriveMode::TeleopArcade,
        }
    }

    /// Deadband, scale and clamp one axis, then rate limit it if asked to.
    /// When not limiting, the limiter still follows so switching back is seamless.
    fn shape_axis(
        limiter: &mut SlewRateLimiter,
        raw: f64,
        power: f64,
        deadband: f64,
        rate_limited: bool,
        dt: f64,
    ) -> f64 {
        let value = clamp_axis(apply_deadband(raw * power, deadband));
        if rate_limited {
            limiter.calculate(value, dt)
        } else {
            limiter.reset(value);
            value
        }
    }

    /// Pick this cycle's mode and produce its chassis demand
    pub fn dispatch(
        &mut self,
        input: &OperatorInput,
        vision: Option<&VisionSample>,
        dt: f64,
    ) -> ChassisDemand {
        let mode = self.select_mode(input.direction);
        if mode != self.mode {
            debug!(from = ?self.mode, to = ?mode, "Drive mode change");
            self.mode = mode;
        }

        let s = self.settings;
        match mode {
            DriveMode::AlignmentSuspended => {
                self.sync_limiters(0.0, 0.0);
                ChassisDemand::stop()
            }
            DriveMode::StrafeLeft | DriveMode::StrafeRight => {
                // Strafe carries no forward or rotation component
                self.sync_limiters(0.0, 0.0);
                let speed = clamp_axis(input.strafe_throttle.max(s.min_strafe_speed))
                    * s.strafe_power_percent;
                ChassisDemand::strafe(input.direction.strafe(), speed * s.max_speed)
            }
            DriveMode::TeleopArcade => {
                let forward = Self::shape_axis(
                    &mut self.magnitude_limiter,
                    input.forward,
                    s.power_percent,
                    s.deadband,
                    input.rate_limited,
                    dt,
                );
                let rotation = Self::shape_axis(
                    &mut self.rotation_limiter,
                    input.rotation,
                    s.angular_power_percent,
                    s.deadband,
                    input.rate_limited,
                    dt,
                );
                ChassisDemand::arcade(forward * s.max_speed, rotation * s.max_angular_speed)
            }
            DriveMode::VisionAlign => {
                let sample = vision.copied().unwrap_or_default();
                let align = self.vision.command(&sample, dt);
                let forward = match align.forward {
                    Some(forward) => clamp_axis(forward),
                    None => Self::shape_axis(
                        &mut self.magnitude_limiter,
                        input.forward,
                        s.power_percent,
                        s.deadband,
                        input.rate_limited,
                        dt,
                    ),
                };
                let rotation = clamp_axis(align.rotation);
                self.sync_limiters(forward, rotation);
                ChassisDemand::arcade(forward * s.max_speed, rotation * s.max_angular_speed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn settings() -> DispatchSettings {
        DispatchSettings {
            deadband: 0.2,
            power_percent: 0.8,
            angular_power_percent: 0.8,
            strafe_power_percent: 0.6,
            min_strafe_speed: 0.2,
            magnitude_slew_rate: 1.8,
            rotational_slew_rate: 2.0,
            max_speed: 1.0,
            max_angular_speed: 1.0,
        }
    }

    fn dispatcher() -> DriveModeDispatcher {
        DriveModeDispatcher::new(settings(), AlignPolicy::default())
    }

    fn input(forward: f64, rotation: f64, pov: i32) -> OperatorInput {
        OperatorInput {
            forward,
            rotation,
            strafe_throttle: 0.0,
            direction: DiscreteDirection::from_pov(pov),
            rate_limited: false,
        }
    }

    #[test]
    fn test_pov_decoding() {
        assert_eq!(DiscreteDirection::from_pov(-1), DiscreteDirection::None);
        assert_eq!(DiscreteDirection::from_pov(270).strafe(), StrafeDirection::Left);
        assert_eq!(DiscreteDirection::from_pov(90).strafe(), StrafeDirection::Right);
        assert_eq!(DiscreteDirection::from_pov(0).strafe(), StrafeDirection::None);
        assert_eq!(DiscreteDirection::from_pov(45).strafe(), StrafeDirection::None);
    }

    #[test]
    fn test_teleop_scales_by_power_percent() {
        let mut d = dispatcher();
        let demand = d.dispatch(&input(0.5, 0.0, -1), None, 0.02);
        assert_eq!(d.mode(), DriveMode::TeleopArcade);
        assert_relative_eq!(demand.forward, 0.4, epsilon = 1e-12);
        assert_eq!(demand.rotation, 0.0);
        assert_eq!(demand.strafe, StrafeDirection::None);
    }

    #[test]
    fn test_teleop_deadband_after_scaling() {
        let mut d = dispatcher();
        // 0.24 * 0.8 = 0.192 falls inside the 0.2 deadband
        let demand = d.dispatch(&input(0.24, 0.1, -1), None, 0.02);
        assert_eq!(demand.forward, 0.0);
        assert_eq!(demand.rotation, 0.0);
    }

    #[test]
    fn test_out_of_range_input_clamped() {
        let mut d = dispatcher();
        let demand = d.dispatch(&input(3.0, -3.0, -1), None, 0.02);
        assert_eq!(demand.forward, 1.0);
        assert_eq!(demand.rotation, -1.0);
    }

    #[test]
    fn test_rate_limited_ramps() {
        let mut d = dispatcher();
        let mut limited = input(1.0, 0.0, -1);
        limited.rate_limited = true;
        let demand = d.dispatch(&limited, None, 0.02);
        // 1.8/s over 20ms
        assert_relative_eq!(demand.forward, 0.036, epsilon = 1e-12);
        let demand = d.dispatch(&limited, None, 0.02);
        assert_relative_eq!(demand.forward, 0.072, epsilon = 1e-12);
    }

    #[test]
    fn test_strafe_is_momentary() {
        let mut d = dispatcher();
        let mut strafe = input(0.5, 0.0, 270);
        strafe.strafe_throttle = 0.5;
        let demand = d.dispatch(&strafe, None, 0.02);
        assert_eq!(d.mode(), DriveMode::StrafeLeft);
        assert_eq!(demand.strafe, StrafeDirection::Left);
        assert_relative_eq!(demand.strafe_magnitude, 0.3, epsilon = 1e-12);
        assert_eq!(demand.forward, 0.0);

        d.dispatch(&input(0.5, 0.0, -1), None, 0.02);
        assert_eq!(d.mode(), DriveMode::TeleopArcade);
    }

    #[test]
    fn test_strafe_speed_floor() {
        let mut d = dispatcher();
        let demand = d.dispatch(&input(0.0, 0.0, 90), None, 0.02);
        assert_eq!(d.mode(), DriveMode::StrafeRight);
        // Throttle 0 is floored at 0.2, times 0.6
        assert_relative_eq!(demand.strafe_magnitude, 0.12, epsilon = 1e-12);
    }

    #[test]
    fn test_vision_align_overrides_rotation() {
        let mut d = dispatcher();
        d.set_vision_align(true);
        let sample = VisionSample {
            offset: 15.0,
            valid: true,
        };
        let demand = d.dispatch(&input(0.0, 1.0, 270), Some(&sample), 0.02);
        assert_eq!(d.mode(), DriveMode::VisionAlign);
        assert_relative_eq!(demand.rotation, -0.8, epsilon = 1e-12);
        assert_relative_eq!(demand.forward, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_vision_without_target_holds_rotation() {
        let mut d = dispatcher();
        d.set_vision_align(true);
        let demand = d.dispatch(&input(0.5, 1.0, -1), None, 0.02);
        assert_eq!(demand.rotation, 0.0);
        // No target: translation falls back to the operator
        assert_relative_eq!(demand.forward, 0.4, epsilon = 1e-12);
    }

    fn ramp_forward(d: &mut DriveModeDispatcher, cycles: usize) -> f64 {
        let mut limited = input(1.0, 0.0, -1);
        limited.rate_limited = true;
        let mut forward = 0.0;
        for _ in 0..cycles {
            forward = d.dispatch(&limited, None, 0.02).forward;
        }
        forward
    }

    #[test]
    fn test_strafe_then_centred_stick_stays_still() {
        let mut d = dispatcher();
        assert!(ramp_forward(&mut d, 50) > 0.7);

        // Five seconds of strafing with the stick released
        for _ in 0..250 {
            d.dispatch(&input(0.0, 0.0, 270), None, 0.02);
        }

        let mut centred = input(0.0, 0.0, -1);
        centred.rate_limited = true;
        let demand = d.dispatch(&centred, None, 0.02);
        assert_eq!(d.mode(), DriveMode::TeleopArcade);
        assert_eq!(demand.forward, 0.0);
        assert_eq!(demand.rotation, 0.0);
    }

    #[test]
    fn test_resume_after_suspend_starts_from_rest() {
        let mut d = dispatcher();
        assert!(ramp_forward(&mut d, 50) > 0.7);

        d.set_alignment_enabled(false);
        for _ in 0..250 {
            d.dispatch(&input(1.0, 0.0, -1), None, 0.02);
        }
        d.set_alignment_enabled(true);

        let mut centred = input(0.0, 0.0, -1);
        centred.rate_limited = true;
        assert_eq!(d.dispatch(&centred, None, 0.02).forward, 0.0);

        // Pushing the stick again ramps from zero
        assert_relative_eq!(ramp_forward(&mut d, 1), 0.036, epsilon = 1e-12);
    }

    #[test]
    fn test_teleop_ramps_from_vision_approach() {
        let mut d = dispatcher();
        d.set_vision_align(true);
        let sample = VisionSample {
            offset: 15.0,
            valid: true,
        };
        let demand = d.dispatch(&input(0.0, 0.0, -1), Some(&sample), 0.02);
        assert_relative_eq!(demand.forward, 0.4, epsilon = 1e-12);

        d.set_vision_align(false);
        let mut centred = input(0.0, 0.0, -1);
        centred.rate_limited = true;
        let demand = d.dispatch(&centred, None, 0.02);
        // Slews down from the approach speed instead of a stale teleop value
        assert_relative_eq!(demand.forward, 0.4 - 0.036, epsilon = 1e-12);
        assert_relative_eq!(demand.rotation, -0.8 + 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_suspended_alignment_stops_chassis() {
        let mut d = dispatcher();
        d.set_alignment_enabled(false);
        let demand = d.dispatch(&input(1.0, 1.0, 270), None, 0.02);
        assert_eq!(d.mode(), DriveMode::AlignmentSuspended);
        assert_eq!(demand, ChassisDemand::stop());

        d.set_alignment_enabled(true);
        d.dispatch(&input(1.0, 0.0, -1), None, 0.02);
        assert_eq!(d.mode(), DriveMode::TeleopArcade);
    }
}
