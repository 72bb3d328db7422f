//! Adaptive charging current controller
//!
//! This module contains the safety/decision state machine that arbitrates
//! between charging as fast as possible, never tripping the main fuse, and
//! not oscillating. Every phase reading or connector status change runs the
//! decision ladder:
//!
//! 1. no-signal guard
//! 2. restart hysteresis while charging is disabled
//! 3. hard safety override (debounced reduction or emergency stop)
//! 4. throttle and post-safety lockout gates
//! 5. charging-activity check
//! 6. PID optimization toward the fuse setpoint
//!
//! Commands leave through an unbounded channel and are fire-and-forget; the
//! controller never waits on the gateway and never retries. Every command is
//! idempotent, so a missed delivery heals on the next qualifying cycle.

use crate::config::Config;
use crate::logging::get_logger;
use crate::phases::PhaseCurrents;
use crate::pid::PidController;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Normalized connector/vehicle state as reported by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectorStatus {
    /// Vehicle is actively drawing current
    Charging,

    /// Vehicle is connected and could start drawing
    ConnectedIdle,

    /// No vehicle on the connector
    Disconnected,

    /// Anything the hub reports that we do not recognize
    #[default]
    Unknown,
}

impl ConnectorStatus {
    /// Normalize a raw hub status string or code
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "charging" | "3" | "busy" => Self::Charging,
            "connected" | "2" | "awaiting start" => Self::ConnectedIdle,
            "disconnected" | "1" | "standby" => Self::Disconnected,
            _ => Self::Unknown,
        }
    }

    /// Whether a setpoint change can have any effect in this state
    pub fn is_chargeable(self) -> bool {
        matches!(self, Self::Charging | Self::ConnectedIdle)
    }
}

/// Outbound command toward the charging-device control point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargerCommand {
    /// Set the requested charging current in whole amperes
    SetCurrent(u32),

    /// Enable or disable the charging circuit switch
    SetSwitch(bool),

    /// Human-readable notification for the configured device
    Notify(String),
}

/// Immutable deployment parameters for one managed charger
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Minimum settable charging current
    pub minimum_amps: f64,

    /// Maximum settable charging current
    pub maximum_amps: f64,

    /// Sustained per-phase current the main fuse tolerates
    pub fuse_setpoint_amps: f64,

    /// Spare capacity required below the setpoint before restarting
    pub restart_headroom_amps: f64,

    /// Margin above the setpoint reserved for the hard safety override
    pub hard_safety_margin_amps: f64,

    /// Minimum interval between hard safety reactions
    pub hard_safety_debounce: Duration,

    /// Sustained overcurrent at minimum current tolerated before stopping
    pub emergency_grace: Duration,

    /// Interval between regular decision cycles
    pub decision_interval: Duration,

    /// Cooldown after a hard safety event before the PID may act again
    pub lockout_window: Duration,

    /// Whether charging starts out enabled
    pub start_enabled: bool,

    /// PID proportional gain
    pub kp: f64,

    /// PID integral gain
    pub ki: f64,

    /// PID derivative gain
    pub kd: f64,
}

impl ControllerSettings {
    /// Build settings from the loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            minimum_amps: config.charger.minimum_amps,
            maximum_amps: config.charger.maximum_amps,
            fuse_setpoint_amps: config.safety.fuse_setpoint_amps,
            restart_headroom_amps: config.safety.restart_headroom_amps,
            hard_safety_margin_amps: config.safety.hard_safety_margin_amps,
            hard_safety_debounce: Duration::from_secs(config.safety.hard_safety_debounce_seconds),
            emergency_grace: Duration::from_secs(config.safety.emergency_grace_seconds),
            decision_interval: Duration::from_secs(config.safety.decision_interval_seconds),
            lockout_window: Duration::from_secs(config.safety.lockout_seconds),
            start_enabled: config.charger.start_enabled,
            kp: config.pid.kp,
            ki: config.pid.ki,
            kd: config.pid.kd,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// The safety/decision state machine for one managed charger
pub struct ChargeController {
    settings: ControllerSettings,
    phases: PhaseCurrents,
    pid: PidController,
    commands: mpsc::UnboundedSender<ChargerCommand>,
    logger: crate::logging::StructuredLogger,

    requested_amps: f64,
    actual_draw_amps: Option<f64>,
    charging_enabled: bool,
    connector_status: ConnectorStatus,

    overcurrent_since: Option<Instant>,
    last_decision: Instant,
    last_hard_safety: Option<Instant>,
}

impl ChargeController {
    /// Create a controller with the given deployment parameters
    ///
    /// The requested current starts at the configured minimum.
    pub fn new(
        settings: ControllerSettings,
        commands: mpsc::UnboundedSender<ChargerCommand>,
    ) -> Self {
        let pid = PidController::new(
            settings.kp,
            settings.ki,
            settings.kd,
            settings.fuse_setpoint_amps,
        );
        let logger = get_logger("controller");
        let requested_amps = settings.minimum_amps;
        let charging_enabled = settings.start_enabled;

        Self {
            settings,
            phases: PhaseCurrents::new(),
            pid,
            commands,
            logger,
            requested_amps,
            actual_draw_amps: None,
            charging_enabled,
            connector_status: ConnectorStatus::Unknown,
            overcurrent_since: None,
            last_decision: Instant::now(),
            last_hard_safety: None,
        }
    }

    /// Ingest a per-phase current reading and run the decision ladder
    pub fn on_phase_reading(&mut self, phase: &str, amps: f64) {
        self.on_phase_reading_at(phase, amps, Instant::now());
    }

    /// Same as [`on_phase_reading`](Self::on_phase_reading) with an explicit
    /// decision instant
    pub fn on_phase_reading_at(&mut self, phase: &str, amps: f64, now: Instant) {
        self.phases.record(phase, amps);
        self.decide(now);
    }

    /// Ingest a connector status update and run the decision ladder
    pub fn on_connector_status(&mut self, raw: &str) {
        self.on_connector_status_at(raw, Instant::now());
    }

    /// Same as [`on_connector_status`](Self::on_connector_status) with an
    /// explicit decision instant
    pub fn on_connector_status_at(&mut self, raw: &str, now: Instant) {
        let status = ConnectorStatus::from_raw(raw);
        if status != self.connector_status {
            self.logger
                .info(&format!("Connector status: {} -> {:?}", raw, status));
        }
        self.connector_status = status;
        self.decide(now);
    }

    /// Record the vehicle's actually-measured per-phase draw
    ///
    /// Updates the safety baseline only; the ladder runs on the next reading.
    pub fn on_actual_draw(&mut self, amps: f64) {
        self.actual_draw_amps = Some(amps);
    }

    /// Last commanded current in amperes
    pub fn requested_amps(&self) -> f64 {
        self.requested_amps
    }

    /// Whether the controller currently permits charging
    pub fn is_charging_enabled(&self) -> bool {
        self.charging_enabled
    }

    /// Last normalized connector status
    pub fn connector_status(&self) -> ConnectorStatus {
        self.connector_status
    }

    /// Whether the vehicle is actually in a state where current flows
    fn is_actually_charging(&self) -> bool {
        self.charging_enabled && self.connector_status.is_chargeable()
    }

    fn send(&self, command: ChargerCommand) {
        // Fire-and-forget: a closed channel only means the process is
        // shutting down and the next live reading re-derives the target.
        if self.commands.send(command).is_err() {
            self.logger.debug("Command channel closed, dropping command");
        }
    }

    /// Run the full decision ladder at the given instant
    fn decide(&mut self, now: Instant) {
        let max_phase = self.phases.max_current();

        // 1. No signal yet
        if max_phase == 0.0 {
            return;
        }

        // 2. Restart check: while disabled, wait for enough headroom
        if !self.charging_enabled {
            if max_phase <= self.settings.fuse_setpoint_amps - self.settings.restart_headroom_amps {
                let msg = format!(
                    "Sufficient headroom ({:.2} A). Restarting EV charging.",
                    self.settings.fuse_setpoint_amps - max_phase
                );
                self.logger.info(&msg);

                self.charging_enabled = true;
                self.requested_amps = self.settings.minimum_amps;
                self.send(ChargerCommand::SetSwitch(true));
                self.send(ChargerCommand::SetCurrent(self.settings.minimum_amps as u32));
                self.send(ChargerCommand::Notify(msg));
                self.pid.reset_integral();
                self.overcurrent_since = None;
            }
            return;
        }

        // 3. Hard safety override for genuinely dangerous excursions
        let hard_threshold =
            self.settings.fuse_setpoint_amps + self.settings.hard_safety_margin_amps;
        let debounce_elapsed = self
            .last_hard_safety
            .is_none_or(|t| now.duration_since(t) > self.settings.hard_safety_debounce);
        if max_phase > hard_threshold && debounce_elapsed {
            self.hard_safety_reaction(max_phase, now);
            return;
        }

        // 4. Throttle and lockout gates
        self.overcurrent_since = None;

        if now.duration_since(self.last_decision) < self.settings.decision_interval {
            return;
        }

        if let Some(t) = self.last_hard_safety {
            if now.duration_since(t) < self.settings.lockout_window {
                return;
            }
        }

        // 5. Nothing to adjust if nobody is consuming the setpoint
        if !self.is_actually_charging() {
            return;
        }

        // 6. Optimization layer: minor overcurrent and all under-current
        let adjustment = self.pid.update_at(max_phase, now);
        let target = (self.requested_amps + adjustment)
            .clamp(self.settings.minimum_amps, self.settings.maximum_amps);

        if target as u32 != self.requested_amps as u32 {
            self.logger.info(&format!(
                "PID adjustment {} A -> {} A (max phase: {:.2} A, target: {:.1} A)",
                self.requested_amps as u32, target as u32, max_phase, self.settings.fuse_setpoint_amps
            ));
            self.send(ChargerCommand::SetCurrent(target as u32));
        }
        self.requested_amps = target;
        self.last_decision = now;
    }

    /// Debounced reduction, or an emergency stop when already at minimum
    fn hard_safety_reaction(&mut self, max_phase: f64, now: Instant) {
        // A spuriously low or zero actual reading is unreliable as a baseline
        let baseline = match self.actual_draw_amps {
            Some(draw) if draw >= self.settings.minimum_amps => draw.min(self.requested_amps),
            _ => self.requested_amps,
        };

        if baseline <= self.settings.minimum_amps {
            match self.overcurrent_since {
                None => {
                    self.overcurrent_since = Some(now);
                    self.logger.warn(
                        "Overcurrent detected at minimum charging current. Starting shutdown timer.",
                    );
                }
                Some(since) if now.duration_since(since) > self.settings.emergency_grace => {
                    let msg = format!(
                        "CRITICAL OVERCURRENT ({:.2} A). Emergency stop of EV charger.",
                        max_phase
                    );
                    self.logger.error(&msg);

                    self.charging_enabled = false;
                    self.send(ChargerCommand::SetSwitch(false));
                    self.send(ChargerCommand::Notify(msg));
                    self.overcurrent_since = None;
                }
                Some(_) => {}
            }
            return;
        }

        let reduction = (max_phase - self.settings.fuse_setpoint_amps).ceil();
        let new_amps = (baseline - reduction).max(self.settings.minimum_amps);

        if new_amps as u32 != self.requested_amps as u32 {
            self.logger.warn(&format!(
                "Hard safety reduction. Phase current {:.2} A exceeds limit significantly. {} A -> {} A",
                max_phase, self.requested_amps as u32, new_amps as u32
            ));
            self.requested_amps = new_amps;
            self.send(ChargerCommand::SetCurrent(new_amps as u32));
            self.pid.reset_integral();
            self.last_hard_safety = Some(now);
            // Make the next PID cycle wait a full window after this correction
            self.last_decision = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_normalization_covers_known_codes() {
        assert_eq!(ConnectorStatus::from_raw("charging"), ConnectorStatus::Charging);
        assert_eq!(ConnectorStatus::from_raw("3"), ConnectorStatus::Charging);
        assert_eq!(ConnectorStatus::from_raw("Busy"), ConnectorStatus::Charging);
        assert_eq!(
            ConnectorStatus::from_raw("connected"),
            ConnectorStatus::ConnectedIdle
        );
        assert_eq!(ConnectorStatus::from_raw("2"), ConnectorStatus::ConnectedIdle);
        assert_eq!(
            ConnectorStatus::from_raw("Awaiting Start"),
            ConnectorStatus::ConnectedIdle
        );
        assert_eq!(
            ConnectorStatus::from_raw("disconnected"),
            ConnectorStatus::Disconnected
        );
        assert_eq!(ConnectorStatus::from_raw("1"), ConnectorStatus::Disconnected);
        assert_eq!(
            ConnectorStatus::from_raw("standby"),
            ConnectorStatus::Disconnected
        );
        assert_eq!(
            ConnectorStatus::from_raw("some new status"),
            ConnectorStatus::Unknown
        );
    }

    #[test]
    fn chargeable_states() {
        assert!(ConnectorStatus::Charging.is_chargeable());
        assert!(ConnectorStatus::ConnectedIdle.is_chargeable());
        assert!(!ConnectorStatus::Disconnected.is_chargeable());
        assert!(!ConnectorStatus::Unknown.is_chargeable());
    }

    #[test]
    fn controller_starts_at_minimum() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let controller = ChargeController::new(ControllerSettings::default(), tx);
        assert_eq!(controller.requested_amps(), 6.0);
        assert!(controller.is_charging_enabled());
        assert_eq!(controller.connector_status(), ConnectorStatus::Unknown);
    }
}
