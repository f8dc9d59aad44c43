// Drivetrain control core for a four-module swerve chassis
//
// Provides:
// - Operator input shaping (deadband, slew-rate limiting)
// - Swerve inverse kinematics with desaturation and heading hold
// - Per-module drive/turn loops with 90° state optimization
// - Drive-mode dispatch (teleop, strafe, vision align, alignment suspend)
// - The `ModuleIo` hardware seam

mod dispatcher;
mod drivetrain;
pub mod io;
pub mod kinematics;
mod module;
pub mod pid;
pub mod shaping;
pub mod vision;

pub use dispatcher::{
    DiscreteDirection, DispatchSettings, DriveMode, DriveModeDispatcher, OperatorInput,
};
pub use drivetrain::{DriveError, Drivetrain};
pub use io::{BridgeModuleIo, ModuleIo, SimulatedModuleIo};
pub use kinematics::{
    ChassisDemand, DriveStrategy, KinematicsError, MODULE_COUNT, ModuleGeometry, ModulePosition,
    ModuleState, StrafeDirection, SwerveKinematics,
};
pub use module::{ModuleTuning, SwerveModule};
pub use pid::{PidController, PidGains};
pub use vision::{AlignCommand, AlignPolicy, VisionAlignLoop};
