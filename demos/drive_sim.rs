// Offline drivetrain simulation: no zenoh, no hardware
//
// Runs a short scripted sequence through the full control core against
// simulated modules and prints module states as it goes.
//
// Usage: cargo run --example drive_sim -- [config.json]

use swerve_zenoh_runtime::config::DriveConfig;
use swerve_zenoh_runtime::drive::{
    DiscreteDirection, Drivetrain, MODULE_COUNT, OperatorInput, SimulatedModuleIo,
};
use swerve_zenoh_runtime::messages::VisionSample;

/// (label, cycles, forward, rotation, pov)
const SCRIPT: [(&str, usize, f64, f64, i32); 5] = [
    ("forward", 50, 0.8, 0.0, -1),
    ("arc left", 50, 0.6, 0.5, -1),
    ("spin", 50, 0.0, 1.0, -1),
    ("strafe right", 25, 0.0, 0.0, 90),
    ("stop", 25, 0.0, 0.0, -1),
];

fn print_states(label: &str, drivetrain: &Drivetrain<SimulatedModuleIo>) {
    println!("{:<14} mode={:?}", label, drivetrain.mode());
    for (module, state) in drivetrain.modules().iter().zip(drivetrain.module_states()) {
        println!(
            "    {:<12} speed={:+.3} m/s  angle={:6.1}°",
            module.name(),
            state.speed,
            state.angle.to_degrees()
        );
    }
}

fn step(drivetrain: &mut Drivetrain<SimulatedModuleIo>, dt: f64) {
    drivetrain.periodic();
    for module in drivetrain.modules_mut() {
        module.io_mut().step(dt);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => DriveConfig::load(path)?,
        None => DriveConfig::default(),
    };
    let dt = config.dt();

    let ios: [SimulatedModuleIo; MODULE_COUNT] = std::array::from_fn(|_| {
        SimulatedModuleIo::new(config.tuning.drive_free_speed, std::f64::consts::TAU)
    });
    let mut drivetrain = Drivetrain::new(&config, ios)?;

    for (label, cycles, forward, rotation, pov) in SCRIPT {
        for _ in 0..cycles {
            drivetrain.drive(forward, rotation, DiscreteDirection::from_pov(pov), true);
            step(&mut drivetrain, dt);
        }
        print_states(label, &drivetrain);
    }

    // Vision align with a target drifting back to centre
    drivetrain.set_vision_align(true);
    for offset in [15.0, 8.0, 3.0, 0.5] {
        let sample = VisionSample {
            offset,
            valid: true,
        };
        for _ in 0..10 {
            drivetrain.drive_with(&OperatorInput::default(), Some(&sample));
            step(&mut drivetrain, dt);
        }
        print_states(&format!("vision {:+.1}", offset), &drivetrain);
    }
    drivetrain.set_vision_align(false);

    // Maintenance: suspend -> zero -> resume
    drivetrain.set_alignment_enabled(false);
    drivetrain.drive(0.0, 0.0, DiscreteDirection::None, false);
    step(&mut drivetrain, dt);
    drivetrain.reset_encoders_and_resume()?;
    for (module, position) in drivetrain.modules().iter().zip(drivetrain.module_positions()) {
        println!(
            "{:<12} distance={:.3} m  angle={:.1}° after reset",
            module.name(),
            position.distance,
            position.angle.to_degrees()
        );
    }

    Ok(())
}
