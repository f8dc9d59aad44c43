// Fixed-rate drivetrain loop with watchdog
// Note: a watchdog is a safety mechanism that triggers a safe action if something goes wrong
// Eg. if the driver station stops sending commands, the chassis must not keep driving on the last one

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, warn};

// local imports
use crate::config::{
    DriveConfig, TOPIC_CMD_CONTROL, TOPIC_CMD_DRIVE, TOPIC_HEALTH, TOPIC_HW_FEEDBACK,
    TOPIC_RT_MODULES, TOPIC_STATE_DRIVE, TOPIC_VISION,
};
use crate::drive::{
    BridgeModuleIo, DriveError, Drivetrain, MODULE_COUNT, ModuleIo, OperatorInput,
    SimulatedModuleIo,
};
use crate::messages::{
    ControlRequest, DriveActuation, DriveFeedback, ModuleFeedback, ModuleOutput, OperatorCommand,
    RuntimeHealth, VisionSample,
};

/// Module I/O the runtime can feed and publish
pub trait RuntimeIo: ModuleIo {
    fn apply_feedback(&mut self, feedback: ModuleFeedback);
    fn take_output(&mut self) -> ModuleOutput;
    /// Called once per cycle after outputs are taken
    fn advance(&mut self, _dt: f64) {}
    /// Whether every requested encoder zero has taken effect on the hardware
    fn zero_settled(&self) -> bool {
        true
    }
}

impl RuntimeIo for BridgeModuleIo {
    fn apply_feedback(&mut self, feedback: ModuleFeedback) {
        BridgeModuleIo::apply_feedback(self, feedback);
    }

    fn take_output(&mut self) -> ModuleOutput {
        BridgeModuleIo::take_output(self)
    }

    fn zero_settled(&self) -> bool {
        BridgeModuleIo::zero_settled(self)
    }
}

impl RuntimeIo for SimulatedModuleIo {
    fn apply_feedback(&mut self, _feedback: ModuleFeedback) {}

    fn take_output(&mut self) -> ModuleOutput {
        ModuleOutput {
            drive_output: self.drive_output(),
            turn_output: self.turn_output(),
            ..ModuleOutput::default()
        }
    }

    fn advance(&mut self, dt: f64) {
        self.step(dt);
    }
}

pub struct Runtime<I> {
    drivetrain: Drivetrain<I>,
    latest_cmd: Option<OperatorCommand>,
    cmd_received_at: Instant,
    latest_vision: Option<(VisionSample, Instant)>,
    cmd_timeout: Duration,
    dt: f64,
    health: RuntimeHealth,
    /// Encoders zeroed, alignment resumes once the hardware confirms
    resume_pending: bool,
}

impl<I: RuntimeIo> Runtime<I> {
    pub fn new(drivetrain: Drivetrain<I>, config: &DriveConfig) -> Self {
        Self {
            drivetrain,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            latest_vision: None,
            cmd_timeout: config.cmd_timeout(),
            dt: config.dt(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
            resume_pending: false,
        }
    }

    /// Process incoming operator command
    fn on_command(&mut self, cmd: OperatorCommand) {
        debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    fn on_vision(&mut self, sample: VisionSample) {
        self.latest_vision = Some((sample, Instant::now()));
    }

    fn on_feedback(&mut self, feedback: DriveFeedback) {
        if feedback.modules.len() != MODULE_COUNT {
            warn!(
                "Ignoring feedback for {} modules, expected {}",
                feedback.modules.len(),
                MODULE_COUNT
            );
            return;
        }
        for (module, fb) in self.drivetrain.modules_mut().iter_mut().zip(feedback.modules) {
            module.io_mut().apply_feedback(fb);
        }
    }

    /// Apply a maintenance or mode request; takes effect from the next cycle
    ///
    /// Resume after an encoder reset is deferred until every module reports
    /// the zero, so the steer loops never restart against a pre-reset angle.
    fn on_control(&mut self, request: ControlRequest) -> Result<(), DriveError> {
        info!("Control request: {:?}", request);
        match request {
            ControlRequest::SuspendAlignment => {
                self.resume_pending = false;
                self.drivetrain.set_alignment_enabled(false);
            }
            ControlRequest::ResetEncodersAndResume => {
                self.drivetrain.reset_encoders()?;
                self.resume_pending = true;
            }
            ControlRequest::SetVisionAlign { enabled } => self.drivetrain.set_vision_align(enabled),
        }
        Ok(())
    }

    fn resume_if_zeroed(&mut self) {
        if !self.resume_pending {
            return;
        }
        let settled = self
            .drivetrain
            .modules()
            .iter()
            .all(|module| module.io().zero_settled());
        if settled {
            self.resume_pending = false;
            self.drivetrain.set_alignment_enabled(true);
        } else {
            debug!("Waiting for encoder zero confirmation before resuming alignment");
        }
    }

    /// Vision sample, if one arrived recently enough to trust
    fn fresh_vision(&self) -> Option<VisionSample> {
        self.latest_vision
            .filter(|(_, received_at)| received_at.elapsed() <= self.cmd_timeout)
            .map(|(sample, _)| sample)
    }

    /// Run one control cycle and collect the module outputs
    fn step(&mut self) -> DriveActuation {
        self.resume_if_zeroed();
        let cmd_age = self.cmd_received_at.elapsed();

        match self.latest_cmd.as_ref() {
            Some(cmd) if cmd_age <= self.cmd_timeout => {
                self.health = RuntimeHealth::Ok;
                let input = OperatorInput::from(cmd);
                let vision = self.fresh_vision();
                self.drivetrain.drive_with(&input, vision.as_ref());
                self.drivetrain.periodic();
            }
            _ => {
                // Watchdog triggered (or no command ever received) - stop the robot
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Command stale ({:?} old), stopping robot", cmd_age);
                }
                self.health = RuntimeHealth::CmdStale;
                self.drivetrain.halt();
            }
        }

        let dt = self.dt;
        let modules = self
            .drivetrain
            .modules_mut()
            .iter_mut()
            .map(|module| {
                let output = module.io_mut().take_output();
                module.io_mut().advance(dt);
                output
            })
            .collect();

        DriveActuation { modules }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn drivetrain(&self) -> &Drivetrain<I> {
        &self.drivetrain
    }
}

/// Build the drivetrain and run the loop until an I/O error
///
/// # Arguments
/// * `config` - Validated drivetrain configuration
/// * `simulate` - Drive simulated modules instead of the hardware bridge
pub async fn run(
    config: DriveConfig,
    simulate: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if simulate {
        info!("Using simulated module I/O");
        let ios = std::array::from_fn(|_| {
            SimulatedModuleIo::new(config.tuning.drive_free_speed, std::f64::consts::TAU)
        });
        run_with(Drivetrain::new(&config, ios)?, &config).await
    } else {
        let ios = std::array::from_fn(|_| BridgeModuleIo::new());
        run_with(Drivetrain::new(&config, ios)?, &config).await
    }
}

async fn run_with<I: RuntimeIo>(
    drivetrain: Drivetrain<I>,
    config: &DriveConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_cmd = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let sub_control = session.declare_subscriber(TOPIC_CMD_CONTROL).await?;
    let sub_vision = session.declare_subscriber(TOPIC_VISION).await?;
    let sub_feedback = session.declare_subscriber(TOPIC_HW_FEEDBACK).await?;
    let pub_actuation = session.declare_publisher(TOPIC_RT_MODULES).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE_DRIVE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(drivetrain, config);
    let mut tick = interval(config.loop_period());

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        config.loop_hz,
        config.cmd_timeout().as_millis()
    );
    info!(
        "Subscribed to: {}, {}, {}, {}",
        TOPIC_CMD_DRIVE, TOPIC_CMD_CONTROL, TOPIC_VISION, TOPIC_HW_FEEDBACK
    );
    info!(
        "Publishing to: {}, {}, {}",
        TOPIC_RT_MODULES, TOPIC_STATE_DRIVE, TOPIC_HEALTH
    );

    loop {
        tick.tick().await;

        // 1. Drain all pending inputs (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_feedback.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveFeedback>(&payload) {
                Ok(feedback) => runtime.on_feedback(feedback),
                Err(e) => warn!("Failed to parse feedback: {}", e),
            }
        }

        while let Ok(Some(sample)) = sub_control.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ControlRequest>(&payload) {
                Ok(request) => {
                    if let Err(e) = runtime.on_control(request) {
                        warn!("Control request rejected: {}", e);
                    }
                }
                Err(e) => warn!("Failed to parse control request: {}", e),
            }
        }

        while let Ok(Some(sample)) = sub_vision.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<VisionSample>(&payload) {
                Ok(vision) => runtime.on_vision(vision),
                Err(e) => warn!("Failed to parse vision sample: {}", e),
            }
        }

        while let Ok(Some(sample)) = sub_cmd.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<OperatorCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Run the drivetrain (includes watchdog logic)
        let actuation = runtime.step();

        // 3. Publish actuation
        let actuation_json = serde_json::to_string(&actuation)?;
        pub_actuation.put(actuation_json).await?;

        // 4. Publish telemetry and health
        let state_json = serde_json::to_string(&runtime.drivetrain().telemetry())?;
        pub_state.put(state_json).await?;

        let health_json = serde_json::to_string(&runtime.health)?;
        pub_health.put(health_json).await?;
    }
}
