// Operator input shaping: deadband and slew-rate limiting

/// Zero out values inside the deadband, pass everything else through untouched
///
/// Values outside [-1, 1] are not clamped here; see [`clamp_axis`].
pub fn apply_deadband(value: f64, deadband: f64) -> f64 {
    if !value.is_finite() || value.abs() < deadband {
        0.0
    } else {
        value
    }
}

/// Clamp an axis value to actuator authority. Non-finite input maps to zero.
pub fn clamp_axis(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Bounds how fast a commanded value may change
#[derive(Debug, Clone, Copy)]
pub struct SlewRateLimiter {
    max_rate_per_sec: f64,
    last_output: f64,
}

impl SlewRateLimiter {
    pub fn new(max_rate_per_sec: f64) -> Self {
        Self {
            max_rate_per_sec: max_rate_per_sec.abs(),
            last_output: 0.0,
        }
    }

    /// Step toward `target` by at most `max_rate_per_sec * dt`
    pub fn calculate(&mut self, target: f64, dt: f64) -> f64 {
        let max_step = self.max_rate_per_sec * dt.max(0.0);
        let delta = (target - self.last_output).clamp(-max_step, max_step);
        self.last_output += delta;
        self.last_output
    }

    /// Jump straight to `value` without limiting
    pub fn reset(&mut self, value: f64) {
        self.last_output = value;
    }

    pub fn last_output(&self) -> f64 {
        self.last_output
    }
}
