// Four-module drivetrain: dispatcher -> kinematics -> module loops
//
// One `drive*` call plus one `periodic` call per control cycle. Nothing here
// blocks and nothing returns an error mid-cycle; bad numbers stop the chassis
// for that cycle instead.

use tracing::{info, warn};

use super::dispatcher::{DiscreteDirection, DriveMode, DriveModeDispatcher, OperatorInput};
use super::io::ModuleIo;
use super::kinematics::{
    ChassisDemand, DriveStrategy, MODULE_COUNT, ModulePosition, ModuleState, SwerveKinematics,
};
use super::module::SwerveModule;
use crate::config::{ConfigError, DriveConfig};
use crate::messages::{DrivetrainTelemetry, ModuleTelemetry, VisionSample};

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Invalid drive configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Encoder reset refused: module alignment is still active")]
    AlignmentActive,
}

pub struct Drivetrain<I> {
    kinematics: SwerveKinematics,
    strategy: DriveStrategy,
    modules: [SwerveModule<I>; MODULE_COUNT],
    dispatcher: DriveModeDispatcher,
    /// Last commanded robot-frame states, used to hold headings at rest
    last_states: [ModuleState; MODULE_COUNT],
    dt: f64,
}

impl<I: ModuleIo> Drivetrain<I> {
    /// Build the drivetrain from a validated config and one I/O handle per module
    ///
    /// Module order is front-left, front-right, rear-left, rear-right, matching
    /// `config.modules`.
    pub fn new(config: &DriveConfig, ios: [I; MODULE_COUNT]) -> Result<Self, DriveError> {
        config.validate()?;
        let kinematics = SwerveKinematics::new(&config.geometry(), config.max_speed)
            .map_err(ConfigError::from)?;

        let mut built = Vec::with_capacity(MODULE_COUNT);
        for (module_config, io) in config.modules.iter().zip(ios) {
            built.push(SwerveModule::new(
                module_config.name.clone(),
                io,
                module_config.angular_offset,
                &config.tuning,
            ));
        }
        let mut modules: [SwerveModule<I>; MODULE_COUNT] =
            built.try_into().map_err(|built: Vec<SwerveModule<I>>| {
                ConfigError::invalid(
                    "modules",
                    format!("expected {} modules, got {}", MODULE_COUNT, built.len()),
                )
            })?;

        // Start every module pointing forward at rest
        for module in modules.iter_mut() {
            module.set_desired_state(ModuleState::default());
        }

        info!(
            "Drivetrain ready: {:?} strategy, {} modules, {:.1} m/s max",
            config.strategy,
            MODULE_COUNT,
            kinematics.max_speed()
        );

        Ok(Self {
            kinematics,
            strategy: config.strategy,
            modules,
            dispatcher: DriveModeDispatcher::new(config.dispatch_settings(), config.vision),
            last_states: [ModuleState::default(); MODULE_COUNT],
            dt: config.dt(),
        })
    }

    /// Primary per-cycle entry point for operator driving
    ///
    /// # Arguments
    /// * `forward` - Forward axis in [-1, 1]
    /// * `rotation` - Rotation axis in [-1, 1]
    /// * `direction` - POV position; left/right strafe for this cycle only
    /// * `rate_limited` - Slew-limit the forward and rotation axes
    pub fn drive(
        &mut self,
        forward: f64,
        rotation: f64,
        direction: DiscreteDirection,
        rate_limited: bool,
    ) -> DriveMode {
        let input = OperatorInput {
            forward,
            rotation,
            strafe_throttle: 0.0,
            direction,
            rate_limited,
        };
        self.drive_with(&input, None)
    }

    /// Run the dispatcher with full operator input and the latest vision sample
    pub fn drive_with(&mut self, input: &OperatorInput, vision: Option<&VisionSample>) -> DriveMode {
        let demand = self.dispatcher.dispatch(input, vision, self.dt);
        self.apply_demand(&demand);
        self.dispatcher.mode()
    }

    /// Convert a chassis demand into module setpoints
    pub fn apply_demand(&mut self, demand: &ChassisDemand) {
        if !demand.is_finite() {
            warn!("Non-finite chassis demand {:?}, stopping for this cycle", demand);
            self.stop();
            return;
        }

        let states = self
            .strategy
            .module_states(&self.kinematics, demand, &self.last_states);

        if states
            .iter()
            .any(|state| !(state.speed.is_finite() && state.angle.is_finite()))
        {
            warn!("Non-finite module states {:?}, stopping for this cycle", states);
            self.stop();
            return;
        }

        // Both loops of every module get their setpoints in the same cycle
        for (module, state) in self.modules.iter_mut().zip(states) {
            module.set_desired_state(state);
        }
        self.last_states = states;
    }

    /// Run every module's loops once
    pub fn periodic(&mut self) {
        let alignment_enabled = self.dispatcher.alignment_enabled();
        for module in self.modules.iter_mut() {
            module.update(self.dt, alignment_enabled);
        }
    }

    /// Zero motion; headings are kept as the targets
    pub fn stop(&mut self) {
        for module in self.modules.iter_mut() {
            module.stop();
        }
        for state in self.last_states.iter_mut() {
            state.speed = 0.0;
        }
    }

    /// Stop and clear slew-limiter history, e.g. after a lost operator link
    pub fn halt(&mut self) {
        self.stop();
        self.dispatcher.reset_limiters();
    }

    pub fn set_alignment_enabled(&mut self, enabled: bool) {
        self.dispatcher.set_alignment_enabled(enabled);
    }

    pub fn alignment_enabled(&self) -> bool {
        self.dispatcher.alignment_enabled()
    }

    /// Zero all drive and steer encoders. Alignment must be suspended first.
    pub fn reset_encoders(&mut self) -> Result<(), DriveError> {
        if self.dispatcher.alignment_enabled() {
            return Err(DriveError::AlignmentActive);
        }
        for module in self.modules.iter_mut() {
            module.reset_encoders();
        }
        info!("Drive encoders zeroed");
        Ok(())
    }

    /// Second half of the maintenance sequence: zero encoders, then resume steering
    ///
    /// Only for I/O whose resets take effect immediately. Hardware that confirms
    /// zeros asynchronously should resume once the zero is reported.
    pub fn reset_encoders_and_resume(&mut self) -> Result<(), DriveError> {
        self.reset_encoders()?;
        self.set_alignment_enabled(true);
        Ok(())
    }

    pub fn set_vision_align(&mut self, enabled: bool) {
        self.dispatcher.set_vision_align(enabled);
    }

    pub fn mode(&self) -> DriveMode {
        self.dispatcher.mode()
    }

    pub fn strategy(&self) -> DriveStrategy {
        self.strategy
    }

    pub fn kinematics(&self) -> &SwerveKinematics {
        &self.kinematics
    }

    /// Measured state of every module
    pub fn module_states(&self) -> [ModuleState; MODULE_COUNT] {
        std::array::from_fn(|i| self.modules[i].state())
    }

    pub fn module_positions(&self) -> [ModulePosition; MODULE_COUNT] {
        std::array::from_fn(|i| self.modules[i].position())
    }

    /// Last commanded robot-frame state of every module
    pub fn desired_states(&self) -> [ModuleState; MODULE_COUNT] {
        self.last_states
    }

    pub fn modules(&self) -> &[SwerveModule<I>; MODULE_COUNT] {
        &self.modules
    }

    pub fn modules_mut(&mut self) -> &mut [SwerveModule<I>; MODULE_COUNT] {
        &mut self.modules
    }

    pub fn telemetry(&self) -> DrivetrainTelemetry {
        DrivetrainTelemetry {
            mode: self.mode(),
            alignment_enabled: self.alignment_enabled(),
            modules: self
                .modules
                .iter()
                .map(|module| ModuleTelemetry {
                    name: module.name().to_string(),
                    desired: module.desired_state(),
                    measured: module.state(),
                    position: module.position(),
                })
                .collect(),
        }
    }
}
