// Closed-loop control of one swerve module
//
// Two loops per module:
// - drive: wheel velocity, PID + feedforward of 1 / free speed
// - turn: steer position in the raw encoder frame, wrapping over [0, 2π)

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use tracing::debug;

use super::io::ModuleIo;
use super::kinematics::{ModulePosition, ModuleState, wrap_angle};
use super::pid::{PidController, PidGains};

/// Loop tuning shared by all modules
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleTuning {
    pub drive_gains: PidGains,
    pub turn_gains: PidGains,
    /// Theoretical free-spin wheel speed (m/s)
    pub drive_free_speed: f64,
}

impl Default for ModuleTuning {
    fn default() -> Self {
        Self {
            drive_gains: PidGains::new(0.04, 0.0, 0.0),
            turn_gains: PidGains::new(1.0, 0.0, 0.0),
            drive_free_speed: 4.8,
        }
    }
}

pub struct SwerveModule<I> {
    name: String,
    io: I,
    /// Raw encoder angle that corresponds to the module pointing forward
    angular_offset: f64,
    drive_pid: PidController,
    turn_pid: PidController,
    /// Last state requested in the robot frame
    desired_state: ModuleState,
    /// Optimized state in the raw encoder frame, what the loops are tracking
    applied_state: ModuleState,
}

impl<I: ModuleIo> SwerveModule<I> {
    pub fn new(name: impl Into<String>, io: I, angular_offset: f64, tuning: &ModuleTuning) -> Self {
        let drive_gains = tuning
            .drive_gains
            .with_feedforward(1.0 / tuning.drive_free_speed);
        let drive_pid = PidController::new(drive_gains).with_output_range(-1.0, 1.0);
        let turn_pid = PidController::new(tuning.turn_gains)
            .with_output_range(-1.0, 1.0)
            .with_continuous_input(0.0, TAU);

        let raw_angle = io.turn_position();
        Self {
            name: name.into(),
            io,
            angular_offset,
            drive_pid,
            turn_pid,
            desired_state: ModuleState::new(0.0, raw_angle - angular_offset),
            applied_state: ModuleState::new(0.0, raw_angle),
        }
    }

    /// Set new targets for both loops in one step
    ///
    /// The robot-frame angle is shifted into the encoder frame, then optimized
    /// against the current steer angle so the module never turns more than 90°.
    pub fn set_desired_state(&mut self, desired: ModuleState) {
        let corrected = ModuleState::new(desired.speed, desired.angle + self.angular_offset);
        let optimized = corrected.optimize(self.io.turn_position());

        if optimized.speed != corrected.speed {
            debug!(module = %self.name, "Reversing drive to avoid a >90° steer");
        }

        self.applied_state = optimized;
        self.desired_state = desired;
    }

    /// Run both loops once and write the outputs
    ///
    /// With alignment disabled the steer motor is left idle so its encoder can be zeroed.
    pub fn update(&mut self, dt: f64, alignment_enabled: bool) {
        let drive_output =
            self.drive_pid
                .calculate(self.io.drive_velocity(), self.applied_state.speed, dt);
        self.io.set_drive_output(drive_output);

        if alignment_enabled {
            let turn_output =
                self.turn_pid
                    .calculate(self.io.turn_position(), self.applied_state.angle, dt);
            self.io.set_turn_output(turn_output);
        } else {
            self.turn_pid.reset();
            self.io.set_turn_output(0.0);
        }
    }

    /// Cut both outputs and hold the current heading as the target
    pub fn stop(&mut self) {
        self.applied_state.speed = 0.0;
        self.desired_state.speed = 0.0;
        self.drive_pid.reset();
        self.turn_pid.reset();
        self.io.set_drive_output(0.0);
        self.io.set_turn_output(0.0);
    }

    /// Zero both encoders and forget loop history
    pub fn reset_encoders(&mut self) {
        self.io.reset_drive_position();
        self.io.reset_turn_position();
        self.drive_pid.reset();
        self.turn_pid.reset();
    }

    /// Measured velocity and heading, in the robot frame
    pub fn state(&self) -> ModuleState {
        ModuleState::new(self.io.drive_velocity(), self.robot_angle())
    }

    /// Measured distance and heading, in the robot frame
    pub fn position(&self) -> ModulePosition {
        ModulePosition {
            distance: self.io.drive_position(),
            angle: self.robot_angle(),
        }
    }

    fn robot_angle(&self) -> f64 {
        wrap_angle(self.io.turn_position() - self.angular_offset)
    }

    pub fn desired_state(&self) -> ModuleState {
        self.desired_state
    }

    pub fn applied_state(&self) -> ModuleState {
        self.applied_state
    }

    /// Steer error (rad) seen by the turn loop on its last run
    pub fn turn_error(&self) -> f64 {
        self.turn_pid.last_error()
    }

    pub fn angular_offset(&self) -> f64 {
        self.angular_offset
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn io(&self) -> &I {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut I {
        &mut self.io
    }
}
