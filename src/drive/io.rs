// Hardware seam for one swerve module
//
// The control core only ever talks to a module through `ModuleIo`. Two
// implementations live here:
// - `SimulatedModuleIo`: a first-order plant for tests, demos and --simulate
// - `BridgeModuleIo`: caches feedback from the hardware bridge and records outputs

use std::f64::consts::TAU;

use super::kinematics::{shortest_angle_delta, wrap_angle};
use crate::messages::{ModuleFeedback, ModuleOutput};

/// Raw encoder reads and actuator writes for one module
pub trait ModuleIo {
    /// Distance driven by the wheel (m)
    fn drive_position(&self) -> f64;
    /// Wheel speed (m/s)
    fn drive_velocity(&self) -> f64;
    /// Steer angle in the raw encoder frame (rad, [0, 2π))
    fn turn_position(&self) -> f64;

    /// Drive motor output in [-1, 1]
    fn set_drive_output(&mut self, output: f64);
    /// Steer motor output in [-1, 1]
    fn set_turn_output(&mut self, output: f64);

    fn reset_drive_position(&mut self);
    fn reset_turn_position(&mut self);
}

/// Simple plant: wheel speed follows output instantly, steer rate is proportional to output
#[derive(Debug, Clone)]
pub struct SimulatedModuleIo {
    free_speed: f64,
    max_turn_rate: f64,
    drive_position: f64,
    drive_velocity: f64,
    turn_position: f64,
    drive_output: f64,
    turn_output: f64,
}

impl SimulatedModuleIo {
    /// # Arguments
    /// * `free_speed` - Wheel speed at full output (m/s)
    /// * `max_turn_rate` - Steer rate at full output (rad/s)
    pub fn new(free_speed: f64, max_turn_rate: f64) -> Self {
        Self {
            free_speed,
            max_turn_rate,
            drive_position: 0.0,
            drive_velocity: 0.0,
            turn_position: 0.0,
            drive_output: 0.0,
            turn_output: 0.0,
        }
    }

    pub fn with_turn_position(mut self, raw_angle: f64) -> Self {
        self.turn_position = wrap_angle(raw_angle);
        self
    }

    pub fn with_drive_position(mut self, distance: f64) -> Self {
        self.drive_position = distance;
        self
    }

    /// Advance the plant by `dt` seconds using the last commanded outputs
    pub fn step(&mut self, dt: f64) {
        self.drive_velocity = self.drive_output * self.free_speed;
        self.drive_position += self.drive_velocity * dt;
        self.turn_position = wrap_angle(self.turn_position + self.turn_output * self.max_turn_rate * dt);
    }

    pub fn drive_output(&self) -> f64 {
        self.drive_output
    }

    pub fn turn_output(&self) -> f64 {
        self.turn_output
    }
}

impl Default for SimulatedModuleIo {
    fn default() -> Self {
        Self::new(4.8, TAU)
    }
}

impl ModuleIo for SimulatedModuleIo {
    fn drive_position(&self) -> f64 {
        self.drive_position
    }

    fn drive_velocity(&self) -> f64 {
        self.drive_velocity
    }

    fn turn_position(&self) -> f64 {
        self.turn_position
    }

    fn set_drive_output(&mut self, output: f64) {
        self.drive_output = output;
    }

    fn set_turn_output(&mut self, output: f64) {
        self.turn_output = output;
    }

    fn reset_drive_position(&mut self) {
        self.drive_position = 0.0;
    }

    fn reset_turn_position(&mut self) {
        self.turn_position = 0.0;
    }
}

/// Steer feedback within this of zero (rad) counts as a confirmed encoder zero
pub const ZERO_CONFIRM_TOLERANCE: f64 = 0.02;

/// Progress of a steer encoder zero through the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnZero {
    #[default]
    Settled,
    /// Requested, not yet published
    Requested,
    /// Published, waiting for feedback that reads zero
    Published,
}

/// Module I/O backed by the external hardware bridge
///
/// Feedback is whatever the bridge last reported; if it stops reporting the
/// cached values are reused. Encoder zero requests are latched until the next
/// output is taken for publishing. A steer zero only counts as done once
/// feedback received after publishing reads zero.
#[derive(Debug, Clone, Default)]
pub struct BridgeModuleIo {
    feedback: ModuleFeedback,
    drive_output: f64,
    turn_output: f64,
    zero_drive: bool,
    zero_turn: bool,
    turn_zero: TurnZero,
}

impl BridgeModuleIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest feedback from the bridge
    pub fn apply_feedback(&mut self, feedback: ModuleFeedback) {
        let turn_position = wrap_angle(feedback.turn_position);
        if self.turn_zero == TurnZero::Published
            && shortest_angle_delta(0.0, turn_position).abs() <= ZERO_CONFIRM_TOLERANCE
        {
            self.turn_zero = TurnZero::Settled;
        }
        self.feedback = ModuleFeedback {
            turn_position,
            ..feedback
        };
    }

    /// Outputs to publish this cycle; clears latched zero requests
    pub fn take_output(&mut self) -> ModuleOutput {
        let output = ModuleOutput {
            drive_output: self.drive_output,
            turn_output: self.turn_output,
            zero_drive_encoder: self.zero_drive,
            zero_turn_encoder: self.zero_turn,
        };
        if self.zero_turn {
            self.turn_zero = TurnZero::Published;
        }
        self.zero_drive = false;
        self.zero_turn = false;
        output
    }

    pub fn turn_zero(&self) -> TurnZero {
        self.turn_zero
    }

    /// True once the bridge has reported the last requested steer zero
    pub fn zero_settled(&self) -> bool {
        self.turn_zero == TurnZero::Settled
    }
}

impl ModuleIo for BridgeModuleIo {
    fn drive_position(&self) -> f64 {
        self.feedback.drive_position
    }

    fn drive_velocity(&self) -> f64 {
        self.feedback.drive_velocity
    }

    fn turn_position(&self) -> f64 {
        self.feedback.turn_position
    }

    fn set_drive_output(&mut self, output: f64) {
        self.drive_output = output;
    }

    fn set_turn_output(&mut self, output: f64) {
        self.turn_output = output;
    }

    fn reset_drive_position(&mut self) {
        // Report zero locally until the bridge confirms
        self.feedback.drive_position = 0.0;
        self.zero_drive = true;
    }

    fn reset_turn_position(&mut self) {
        self.feedback.turn_position = 0.0;
        self.zero_turn = true;
        self.turn_zero = TurnZero::Requested;
    }
}
