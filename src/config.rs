// Timeouts, topics, drivetrain configuration
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::path::Path;
use std::time::Duration;

use crate::drive::{
    AlignPolicy, DispatchSettings, DriveStrategy, KinematicsError, ModuleGeometry, ModuleTuning,
    SwerveKinematics,
};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Fastest loop the runtime will schedule (1 ms period)
pub const MAX_LOOP_HZ: u64 = 1000;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "chassis/cmd/drive"; // operator input
pub const TOPIC_CMD_CONTROL: &str = "chassis/cmd/control"; // maintenance / mode requests
pub const TOPIC_VISION: &str = "chassis/vision/target"; // target offset
pub const TOPIC_HW_FEEDBACK: &str = "chassis/hw/feedback"; // encoder feedback
pub const TOPIC_RT_MODULES: &str = "chassis/rt/modules"; // actuation
pub const TOPIC_STATE_DRIVE: &str = "chassis/state/drivetrain"; // telemetry
pub const TOPIC_HEALTH: &str = "chassis/state/health"; // health status

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Geometry(#[from] KinematicsError),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Mounting and calibration of one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    /// Offset forward of the robot centre (m)
    pub x: f64,
    /// Offset left of the robot centre (m)
    pub y: f64,
    /// Raw steer encoder angle when the module points forward (rad)
    pub angular_offset: f64,
}

/// Everything the drivetrain needs at construction. Missing fields take defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub strategy: DriveStrategy,
    pub loop_hz: u64,
    pub cmd_timeout_ms: u64,

    /// Module speed at full authority (m/s)
    pub max_speed: f64,
    /// Chassis rotation at full authority (rad/s)
    pub max_angular_speed: f64,

    pub power_percent: f64,
    pub angular_power_percent: f64,
    pub strafe_power_percent: f64,
    pub min_strafe_speed: f64,
    pub deadband: f64,
    pub magnitude_slew_rate: f64,
    pub rotational_slew_rate: f64,

    /// Front-left, front-right, rear-left, rear-right
    pub modules: Vec<ModuleConfig>,
    pub tuning: ModuleTuning,
    pub vision: AlignPolicy,
}

impl Default for DriveConfig {
    fn default() -> Self {
        let module = |name: &str, x: f64, y: f64, angular_offset: f64| ModuleConfig {
            name: name.to_string(),
            x,
            y,
            angular_offset,
        };
        Self {
            strategy: DriveStrategy::Swerve,
            loop_hz: LOOP_HZ,
            cmd_timeout_ms: CMD_TIMEOUT.as_millis() as u64,
            max_speed: 4.8,
            max_angular_speed: TAU,
            power_percent: 0.8,
            angular_power_percent: 0.8,
            strafe_power_percent: 0.6,
            min_strafe_speed: 0.2,
            deadband: 0.2,
            magnitude_slew_rate: 1.8,
            rotational_slew_rate: 2.0,
            modules: vec![
                module("front_left", 0.3, 0.3, -FRAC_PI_2),
                module("front_right", 0.3, -0.3, 0.0),
                module("rear_left", -0.3, 0.3, PI),
                module("rear_right", -0.3, -0.3, FRAC_PI_2),
            ],
            tuning: ModuleTuning::default(),
            vision: AlignPolicy::default(),
        }
    }
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{} is outside [0, 1]", value)))
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{} must be positive", value)))
    }
}

fn validate_align_policy(policy: &AlignPolicy) -> Result<(), ConfigError> {
    match policy {
        AlignPolicy::Zoned {
            far_threshold,
            near_threshold,
            far_rotation,
            near_rotation,
            far_approach,
            near_approach,
        } => {
            if !(near_threshold.is_finite() && *near_threshold >= 0.0) {
                return Err(ConfigError::invalid(
                    "vision.near_threshold",
                    format!("{} must be a non-negative number", near_threshold),
                ));
            }
            // Both zones must exist
            if !(far_threshold.is_finite() && far_threshold > near_threshold) {
                return Err(ConfigError::invalid(
                    "vision.far_threshold",
                    format!("{} must be above near_threshold {}", far_threshold, near_threshold),
                ));
            }
            check_fraction("vision.far_rotation", *far_rotation)?;
            check_fraction("vision.near_rotation", *near_rotation)?;
            for (field, approach) in [
                ("vision.far_approach", far_approach),
                ("vision.near_approach", near_approach),
            ] {
                if let Some(speed) = approach {
                    if !(-1.0..=1.0).contains(speed) {
                        return Err(ConfigError::invalid(
                            field,
                            format!("{} is outside [-1, 1]", speed),
                        ));
                    }
                }
            }
        }
        AlignPolicy::Pid { max_output, .. } => {
            if let Some(limit) = max_output {
                check_positive("vision.max_output", *limit)?;
            }
        }
    }
    Ok(())
}

impl DriveConfig {
    /// Read a JSON config file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: DriveConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on anything the control loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_LOOP_HZ).contains(&self.loop_hz) {
            return Err(ConfigError::invalid(
                "loop_hz",
                format!("{} is outside [1, {}]", self.loop_hz, MAX_LOOP_HZ),
            ));
        }
        if self.cmd_timeout_ms == 0 {
            return Err(ConfigError::invalid("cmd_timeout_ms", "must be at least 1"));
        }

        check_fraction("power_percent", self.power_percent)?;
        check_fraction("angular_power_percent", self.angular_power_percent)?;
        check_fraction("strafe_power_percent", self.strafe_power_percent)?;
        check_fraction("min_strafe_speed", self.min_strafe_speed)?;
        check_fraction("deadband", self.deadband)?;
        if self.deadband >= 1.0 {
            return Err(ConfigError::invalid("deadband", "must be below 1"));
        }

        check_positive("max_angular_speed", self.max_angular_speed)?;
        check_positive("magnitude_slew_rate", self.magnitude_slew_rate)?;
        check_positive("rotational_slew_rate", self.rotational_slew_rate)?;
        check_positive("tuning.drive_free_speed", self.tuning.drive_free_speed)?;

        for module in &self.modules {
            if !module.angular_offset.is_finite() {
                return Err(ConfigError::invalid(
                    "modules.angular_offset",
                    format!("{} has a non-finite offset", module.name),
                ));
            }
        }

        validate_align_policy(&self.vision)?;

        // Geometry and max speed are checked by the kinematics itself
        SwerveKinematics::new(&self.geometry(), self.max_speed)?;
        Ok(())
    }

    pub fn geometry(&self) -> Vec<ModuleGeometry> {
        self.modules
            .iter()
            .map(|module| ModuleGeometry::new(module.x, module.y))
            .collect()
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            deadband: self.deadband,
            power_percent: self.power_percent,
            angular_power_percent: self.angular_power_percent,
            strafe_power_percent: self.strafe_power_percent,
            min_strafe_speed: self.min_strafe_speed,
            magnitude_slew_rate: self.magnitude_slew_rate,
            rotational_slew_rate: self.rotational_slew_rate,
            max_speed: self.max_speed,
            max_angular_speed: self.max_angular_speed,
        }
    }

    /// Control period in seconds
    pub fn dt(&self) -> f64 {
        1.0 / self.loop_hz as f64
    }

    /// Control period; never zero for a validated config
    pub fn loop_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.loop_hz.max(1))
    }

    pub fn cmd_timeout(&self) -> Duration {
        Duration::from_millis(self.cmd_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DriveConfig::default();
        config.validate().unwrap();
        assert_eq!(config.modules.len(), 4);
        assert_eq!(config.loop_period(), Duration::from_millis(20));
        assert_eq!(config.cmd_timeout(), CMD_TIMEOUT);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config =
            DriveConfig::from_json(r#"{"strategy": "tank_arcade", "deadband": 0.1}"#).unwrap();
        assert_eq!(config.strategy, DriveStrategy::TankArcade);
        assert_eq!(config.deadband, 0.1);
        assert_eq!(config.power_percent, 0.8);
    }

    #[test]
    fn test_vision_policy_from_json() {
        let config = DriveConfig::from_json(
            r#"{"vision": {"policy": "pid", "gains": {"kp": 0.03}, "max_output": 0.5}}"#,
        )
        .unwrap();
        match config.vision {
            AlignPolicy::Pid { gains, max_output } => {
                assert_eq!(gains.kp, 0.03);
                assert_eq!(gains.ki, 0.0);
                assert_eq!(max_output, Some(0.5));
            }
            other => panic!("Expected PID policy, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            DriveConfig::from_json(r#"{"power_percent": 1.5}"#),
            Err(ConfigError::Invalid { field: "power_percent", .. })
        ));
        assert!(matches!(
            DriveConfig::from_json(r#"{"loop_hz": 0}"#),
            Err(ConfigError::Invalid { field: "loop_hz", .. })
        ));
        assert!(matches!(
            DriveConfig::from_json(r#"{"modules": []}"#),
            Err(ConfigError::Geometry(KinematicsError::ModuleCount { .. }))
        ));
        assert!(matches!(
            DriveConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_loop_rate_bounds() {
        assert!(matches!(
            DriveConfig::from_json(r#"{"loop_hz": 2000}"#),
            Err(ConfigError::Invalid { field: "loop_hz", .. })
        ));

        let fastest = DriveConfig::from_json(r#"{"loop_hz": 1000}"#).unwrap();
        assert_eq!(fastest.loop_period(), Duration::from_millis(1));

        // Periods that do not divide evenly into milliseconds keep their precision
        let odd = DriveConfig::from_json(r#"{"loop_hz": 300}"#).unwrap();
        assert_eq!(odd.loop_period(), Duration::from_micros(3333));
        assert!(odd.loop_period() > Duration::ZERO);
    }

    #[test]
    fn test_rejects_overlapping_vision_zones() {
        assert!(matches!(
            DriveConfig::from_json(
                r#"{"vision": {"policy": "zoned", "far_threshold": 1.0, "near_threshold": 5.0,
                    "far_rotation": 0.8, "near_rotation": 0.4}}"#
            ),
            Err(ConfigError::Invalid { field: "vision.far_threshold", .. })
        ));
        assert!(matches!(
            DriveConfig::from_json(
                r#"{"vision": {"policy": "zoned", "far_threshold": 10.0, "near_threshold": -1.0,
                    "far_rotation": 0.8, "near_rotation": 0.4}}"#
            ),
            Err(ConfigError::Invalid { field: "vision.near_threshold", .. })
        ));
        assert!(matches!(
            DriveConfig::from_json(
                r#"{"vision": {"policy": "zoned", "far_threshold": 10.0, "near_threshold": 1.0,
                    "far_rotation": 1.5, "near_rotation": 0.4}}"#
            ),
            Err(ConfigError::Invalid { field: "vision.far_rotation", .. })
        ));
        assert!(matches!(
            DriveConfig::from_json(
                r#"{"vision": {"policy": "pid", "gains": {"kp": 0.03}, "max_output": 0.0}}"#
            ),
            Err(ConfigError::Invalid { field: "vision.max_output", .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            DriveConfig::load("/nonexistent/drive.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
