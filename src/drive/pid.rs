// PID loop with optional velocity feedforward and continuous (wrapping) input

use serde::{Deserialize, Serialize};

/// Loop gains. `kf` multiplies the setpoint directly (velocity feedforward).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub kf: f64,
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd, kf: 0.0 }
    }

    pub fn with_feedforward(mut self, kf: f64) -> Self {
        self.kf = kf;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PidController {
    gains: PidGains,
    output_min: f64,
    output_max: f64,
    /// Input domain treated as circular, e.g. (0, 2π) for a steer encoder
    continuous: Option<(f64, f64)>,
    integral_limit: f64,
    integral: f64,
    prev_error: Option<f64>,
    last_error: f64,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            output_min: f64::NEG_INFINITY,
            output_max: f64::INFINITY,
            continuous: None,
            integral_limit: 0.0,
            integral: 0.0,
            prev_error: None,
            last_error: 0.0,
        }
    }

    pub fn with_output_range(mut self, min: f64, max: f64) -> Self {
        self.output_min = min;
        self.output_max = max;
        self
    }

    /// Treat `[min, max)` as a circle so the error always takes the short way round
    pub fn with_continuous_input(mut self, min: f64, max: f64) -> Self {
        self.continuous = Some((min, max));
        self
    }

    /// Clamp the accumulated integral to ±limit (0 disables the clamp)
    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = limit.abs();
        self
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Setpoint minus measurement, wrapped when the input is continuous
    pub fn error(&self, measurement: f64, setpoint: f64) -> f64 {
        let error = setpoint - measurement;
        match self.continuous {
            Some((min, max)) => {
                let span = max - min;
                let half = span / 2.0;
                let wrapped = (error + half).rem_euclid(span) - half;
                // Keep the result in (-half, half]
                if wrapped <= -half { wrapped + span } else { wrapped }
            }
            None => error,
        }
    }

    /// Run one step of the loop and return the bounded output
    pub fn calculate(&mut self, measurement: f64, setpoint: f64, dt: f64) -> f64 {
        let error = self.error(measurement, setpoint);
        self.last_error = error;

        if dt > 0.0 && self.gains.ki != 0.0 {
            self.integral += error * dt;
            if self.integral_limit > 0.0 {
                self.integral = self
                    .integral
                    .clamp(-self.integral_limit, self.integral_limit);
            }
        }

        let derivative = match self.prev_error {
            Some(prev) if dt > 0.0 => (error - prev) / dt,
            _ => 0.0,
        };
        self.prev_error = Some(error);

        let output = (self.gains.kp * error)
            + (self.gains.ki * self.integral)
            + (self.gains.kd * derivative)
            + (self.gains.kf * setpoint);

        if output.is_finite() {
            output.clamp(self.output_min, self.output_max)
        } else {
            0.0
        }
    }

    /// Error from the most recent `calculate` call
    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    pub fn reset(&mut self) {
        self.prev_error = None;
        self.integral = 0.0;
        self.last_error = 0.0;
    }
}
