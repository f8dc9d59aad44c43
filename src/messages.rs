// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::drive::{DiscreteDirection, DriveMode, ModulePosition, ModuleState};

// Operator input from teleop -> runtime, raw joystick values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorCommand {
    /// Forward axis in [-1, 1]
    pub forward: f64,
    /// Rotation axis in [-1, 1], counter-clockwise positive
    pub rotation: f64,
    /// Throttle axis used as strafe speed
    pub strafe_throttle: f64,
    /// POV hat angle in degrees, -1 when released
    pub pov: i32,
    pub rate_limited: bool,
}

impl Default for OperatorCommand {
    fn default() -> Self {
        Self {
            forward: 0.0,
            rotation: 0.0,
            strafe_throttle: 0.0,
            pov: -1, // hat released
            rate_limited: false,
        }
    }
}

impl OperatorCommand {
    pub fn direction(&self) -> DiscreteDirection {
        DiscreteDirection::from_pov(self.pov)
    }
}

/// Maintenance and mode requests, applied at the start of the next cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Idle the steer motors so their encoders can be zeroed safely
    SuspendAlignment,
    /// Zero all encoders, then resume steering
    ResetEncodersAndResume,
    /// Enter or leave vision auto-align
    SetVisionAlign { enabled: bool },
}

/// Horizontal target offset from the vision camera
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VisionSample {
    /// Signed horizontal offset, positive = target right of centre
    pub offset: f64,
    /// Whether a target is actually in view
    pub valid: bool,
}

// Encoder feedback from the hardware bridge for one module
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleFeedback {
    pub drive_position: f64,
    pub drive_velocity: f64,
    /// Raw steer encoder angle (rad)
    pub turn_position: f64,
}

// Actuation for one module, runtime -> hardware bridge
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleOutput {
    pub drive_output: f64,
    pub turn_output: f64,
    pub zero_drive_encoder: bool,
    pub zero_turn_encoder: bool,
}

/// Actuation for the whole drivetrain, in module order FL, FR, RL, RR
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriveActuation {
    pub modules: Vec<ModuleOutput>,
}

/// Feedback for the whole drivetrain, in module order FL, FR, RL, RR
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriveFeedback {
    pub modules: Vec<ModuleFeedback>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleTelemetry {
    pub name: String,
    pub desired: ModuleState,
    pub measured: ModuleState,
    pub position: ModulePosition,
}

/// Published every cycle for dashboards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrivetrainTelemetry {
    pub mode: DriveMode,
    pub alignment_enabled: bool,
    pub modules: Vec<ModuleTelemetry>,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_command_defaults() {
        let cmd: OperatorCommand = serde_json::from_str(r#"{"forward": 0.5}"#).unwrap();
        assert_eq!(cmd.forward, 0.5);
        assert_eq!(cmd.pov, -1);
        assert_eq!(cmd.direction(), DiscreteDirection::None);
        assert!(!cmd.rate_limited);
    }

    #[test]
    fn test_control_request_tagging() {
        let request: ControlRequest =
            serde_json::from_str(r#"{"type": "set_vision_align", "enabled": true}"#).unwrap();
        assert_eq!(request, ControlRequest::SetVisionAlign { enabled: true });

        let json = serde_json::to_string(&ControlRequest::SuspendAlignment).unwrap();
        assert_eq!(json, r#"{"type":"suspend_alignment"}"#);
    }

    #[test]
    fn test_health_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RuntimeHealth::CmdStale).unwrap(),
            r#""cmd_stale""#
        );
    }
}
