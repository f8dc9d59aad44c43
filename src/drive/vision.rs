// Vision auto-align: turn a horizontal target offset into a rotation command

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::pid::{PidController, PidGains};
use crate::messages::VisionSample;

/// How the target offset is turned into rotation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum AlignPolicy {
    /// Fixed rotation per symmetric offset zone
    Zoned {
        /// |offset| at or above this is the far zone
        far_threshold: f64,
        /// |offset| at or below this counts as centred
        near_threshold: f64,
        far_rotation: f64,
        near_rotation: f64,
        /// Forward authority while turning in the far zone (None = operator drives)
        far_approach: Option<f64>,
        /// Forward authority in the near and centred zones (None = operator drives)
        near_approach: Option<f64>,
    },
    /// Offset used as the error of a PID loop with setpoint zero
    Pid {
        gains: PidGains,
        /// Clamp on the output; None leaves it unbounded
        max_output: Option<f64>,
    },
}

impl Default for AlignPolicy {
    fn default() -> Self {
        AlignPolicy::Zoned {
            far_threshold: 10.0,
            near_threshold: 1.0,
            far_rotation: 0.8,
            near_rotation: 0.4,
            far_approach: Some(0.4),
            near_approach: Some(0.5),
        }
    }
}

/// One cycle of alignment output, in actuator authority [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AlignCommand {
    pub rotation: f64,
    /// Forward authority if the policy supplies one
    pub forward: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct VisionAlignLoop {
    policy: AlignPolicy,
    pid: Option<PidController>,
}

impl VisionAlignLoop {
    pub fn new(policy: AlignPolicy) -> Self {
        let pid = match policy {
            AlignPolicy::Pid { gains, max_output } => {
                let pid = PidController::new(gains);
                Some(match max_output {
                    Some(limit) => pid.with_output_range(-limit.abs(), limit.abs()),
                    None => pid,
                })
            }
            AlignPolicy::Zoned { .. } => None,
        };
        Self { policy, pid }
    }

    pub fn policy(&self) -> &AlignPolicy {
        &self.policy
    }

    /// Rotation command only
    pub fn rotation_command(&mut self, sample: &VisionSample, dt: f64) -> f64 {
        self.command(sample, dt).rotation
    }

    /// Full alignment output for one cycle
    ///
    /// No visible target (or a non-finite offset) gives zero rotation and leaves
    /// translation to the operator.
    pub fn command(&mut self, sample: &VisionSample, dt: f64) -> AlignCommand {
        if !sample.valid || !sample.offset.is_finite() {
            if let Some(pid) = self.pid.as_mut() {
                pid.reset();
            }
            return AlignCommand::default();
        }

        let offset = sample.offset;
        let command = match (&self.policy, self.pid.as_mut()) {
            (AlignPolicy::Pid { .. }, Some(pid)) => AlignCommand {
                rotation: pid.calculate(offset, 0.0, dt),
                forward: None,
            },
            (
                AlignPolicy::Zoned {
                    far_threshold,
                    near_threshold,
                    far_rotation,
                    near_rotation,
                    far_approach,
                    near_approach,
                },
                _,
            ) => {
                let magnitude = offset.abs();
                // Rotate against the offset to bring the target back to centre
                let direction = -offset.signum();
                if magnitude >= *far_threshold {
                    AlignCommand {
                        rotation: direction * far_rotation,
                        forward: *far_approach,
                    }
                } else if magnitude > *near_threshold {
                    AlignCommand {
                        rotation: direction * near_rotation,
                        forward: *near_approach,
                    }
                } else {
                    AlignCommand {
                        rotation: 0.0,
                        forward: *near_approach,
                    }
                }
            }
            (AlignPolicy::Pid { .. }, None) => AlignCommand::default(),
        };

        trace!(offset, rotation = command.rotation, "Vision align");
        command
    }

    pub fn reset(&mut self) {
        if let Some(pid) = self.pid.as_mut() {
            pid.reset();
        }
    }
}
