//! PID regulator for smooth load balancing
//!
//! The controller targets the fuse setpoint with the highest phase current as
//! the measured value. Output is a signed current adjustment in amperes.

use std::time::Instant;

/// Integral accumulator clamp band
const INTEGRAL_LIMIT: f64 = 50.0;

/// Errors smaller than this do not accumulate into the integral term
const ERROR_DEADBAND: f64 = 0.01;

/// Proportional-integral-derivative regulator
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    setpoint: f64,
    integral: f64,
    last_error: f64,
    last_update: Option<Instant>,
}

impl PidController {
    /// Create a new regulator with the given gains and setpoint
    pub fn new(kp: f64, ki: f64, kd: f64, setpoint: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            setpoint,
            integral: 0.0,
            last_error: 0.0,
            last_update: None,
        }
    }

    /// Feed a measurement and get the current adjustment
    ///
    /// The first call only records the sampling reference and returns 0.
    pub fn update(&mut self, measurement: f64) -> f64 {
        self.update_at(measurement, Instant::now())
    }

    /// Same as [`update`](Self::update) with an explicit sampling instant
    pub fn update_at(&mut self, measurement: f64, now: Instant) -> f64 {
        let Some(last) = self.last_update else {
            self.last_update = Some(now);
            return 0.0;
        };

        // Instant::duration_since saturates to zero on clock anomalies
        let dt = now.duration_since(last).as_secs_f64();
        if dt <= 0.0 {
            return 0.0;
        }

        let error = self.setpoint - measurement;

        let p = self.kp * error;

        // Anti-windup: only accumulate significant errors
        if error.abs() > ERROR_DEADBAND {
            self.integral += error * dt;
        }
        self.integral = self.integral.clamp(-INTEGRAL_LIMIT, INTEGRAL_LIMIT);
        let i = self.ki * self.integral;

        let d = self.kd * (error - self.last_error) / dt;

        self.last_error = error;
        self.last_update = Some(now);

        p + i + d
    }

    /// Discard accumulated windup, e.g. when the safety regime changes
    pub fn reset_integral(&mut self) {
        self.integral = 0.0;
    }

    /// Current integral accumulator value
    pub fn integral(&self) -> f64 {
        self.integral
    }

    #[cfg(test)]
    fn force_integral(&mut self, value: f64) {
        self.integral = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_update_returns_zero() {
        let mut pid = PidController::new(1.0, 1.0, 1.0, 20.0);
        assert_eq!(pid.update_at(3.0, Instant::now()), 0.0);
    }

    #[test]
    fn proportional_only() {
        let mut pid = PidController::new(1.0, 0.0, 0.0, 20.0);
        let t0 = Instant::now();

        // First update sets the sampling reference
        pid.update_at(15.0, t0);

        // Error = 20 - 15 = 5. Output = 1.0 * 5 = 5
        let output = pid.update_at(15.0, t0 + Duration::from_secs(1));
        assert_eq!(output, 5.0);
    }

    #[test]
    fn integral_accumulates_over_time() {
        let mut pid = PidController::new(0.0, 1.0, 0.0, 20.0);
        let t0 = Instant::now();

        pid.update_at(18.0, t0);
        // Error = 2 over dt = 0.1s -> I = 1.0 * 0.2
        let output = pid.update_at(18.0, t0 + Duration::from_millis(100));
        assert!((output - 0.2).abs() < 1e-9);
    }

    #[test]
    fn integral_clamps() {
        let mut pid = PidController::new(0.0, 100.0, 0.0, 20.0);
        let t0 = Instant::now();

        pid.update_at(10.0, t0);
        pid.force_integral(1000.0);

        pid.update_at(10.0, t0 + Duration::from_secs(1));
        assert_eq!(pid.integral(), 50.0);
    }

    #[test]
    fn deadband_skips_integral() {
        let mut pid = PidController::new(0.0, 1.0, 0.0, 20.0);
        let t0 = Instant::now();

        pid.update_at(20.005, t0);
        pid.update_at(20.005, t0 + Duration::from_secs(10));
        assert_eq!(pid.integral(), 0.0);
    }

    #[test]
    fn non_positive_interval_is_ignored() {
        let mut pid = PidController::new(1.0, 1.0, 1.0, 20.0);
        let t0 = Instant::now();

        pid.update_at(10.0, t0 + Duration::from_secs(1));
        // Same instant again: dt = 0, no output, no state change
        assert_eq!(pid.update_at(10.0, t0 + Duration::from_secs(1)), 0.0);
        assert_eq!(pid.integral(), 0.0);
    }

    #[test]
    fn derivative_tracks_error_change() {
        let mut pid = PidController::new(0.0, 0.0, 1.0, 20.0);
        let t0 = Instant::now();

        pid.update_at(15.0, t0);
        // Priming records no error, so last_error is still 0 here and
        // D = 1.0 * (2 - 0) / 1s = 2
        let output = pid.update_at(18.0, t0 + Duration::from_secs(1));
        assert_eq!(output, 2.0);
    }

    #[test]
    fn regime_reset_clears_integral() {
        let mut pid = PidController::new(0.0, 1.0, 0.0, 20.0);
        let t0 = Instant::now();
        pid.update_at(10.0, t0);
        pid.update_at(10.0, t0 + Duration::from_secs(2));
        assert!(pid.integral() > 0.0);

        pid.reset_integral();
        assert_eq!(pid.integral(), 0.0);
    }
}
