// Keyboard teleop: W/S drive, Z/X rotate, A/D strafe, R/F speed, V vision align,
// E suspend alignment, C zero encoders and resume, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use swerve_zenoh_runtime::config::{TOPIC_CMD_CONTROL, TOPIC_CMD_DRIVE};
use swerve_zenoh_runtime::messages::{ControlRequest, OperatorCommand};
use tracing::info;

const SPEEDS: [f64; 3] = [0.3, 0.6, 1.0]; // joystick authority
const INPUT_TIMEOUT_MS: u64 = 100; // Reset axes after this much time with no input

// POV angles the runtime understands
const POV_NONE: i32 = -1;
const POV_RIGHT: i32 = 90;
const POV_LEFT: i32 = 270;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_cmd = session.declare_publisher(TOPIC_CMD_DRIVE).await?;
    let pub_control = session.declare_publisher(TOPIC_CMD_CONTROL).await?;

    info!("Controls: W/S=drive, Z/X=rotate, A/D=strafe, R/F=speed, V=vision, E/C=encoder reset, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_cmd, &pub_control).await;
    disable_raw_mode()?;

    result
}

async fn send_control(
    publisher: &zenoh::pubsub::Publisher<'_>,
    request: ControlRequest,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Sending {:?}", request);
    publisher.put(serde_json::to_string(&request)?).await?;
    Ok(())
}

async fn run_teleop(
    pub_cmd: &zenoh::pubsub::Publisher<'_>,
    pub_control: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut vision_align = false;

    // Persistent axis state
    let mut cmd = OperatorCommand {
        pov: POV_NONE,
        strafe_throttle: SPEEDS[0],
        rate_limited: true,
        ..OperatorCommand::default()
    };
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    // Movement - update axes and refresh timestamp
                    KeyCode::Char('w') if pressed => {
                        cmd.forward = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        cmd.forward = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        cmd.pov = POV_LEFT;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        cmd.pov = POV_RIGHT;
                        last_movement_input = Instant::now();
                    }

                    // Rotation
                    KeyCode::Char('z') if pressed => {
                        cmd.rotation = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        cmd.rotation = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        cmd.strafe_throttle = SPEEDS[speed_idx];
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        cmd.strafe_throttle = SPEEDS[speed_idx];
                        print_speed(speed_idx);
                    }

                    // Modes and maintenance
                    KeyCode::Char('v') if pressed => {
                        vision_align = !vision_align;
                        send_control(
                            pub_control,
                            ControlRequest::SetVisionAlign {
                                enabled: vision_align,
                            },
                        )
                        .await?;
                    }
                    KeyCode::Char('e') if pressed => {
                        send_control(pub_control, ControlRequest::SuspendAlignment).await?;
                    }
                    KeyCode::Char('c') if pressed => {
                        send_control(pub_control, ControlRequest::ResetEncodersAndResume).await?;
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset axes if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            cmd.forward = 0.0;
            cmd.rotation = 0.0;
            cmd.pov = POV_NONE;
        }

        // Always publish at ~50Hz
        pub_cmd.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
