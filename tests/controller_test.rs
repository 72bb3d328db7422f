use eos::controller::{ChargeController, ChargerCommand, ControllerSettings};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

fn settings() -> ControllerSettings {
    ControllerSettings {
        minimum_amps: 6.0,
        maximum_amps: 16.0,
        fuse_setpoint_amps: 20.0,
        restart_headroom_amps: 8.0,
        hard_safety_margin_amps: 2.0,
        hard_safety_debounce: Duration::from_secs(5),
        emergency_grace: Duration::from_secs(10),
        decision_interval: Duration::from_secs(20),
        lockout_window: Duration::from_secs(60),
        start_enabled: true,
        kp: 0.4,
        ki: 0.01,
        kd: 0.05,
    }
}

fn controller(
    settings: ControllerSettings,
) -> (ChargeController, mpsc::UnboundedReceiver<ChargerCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChargeController::new(settings, tx), rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ChargerCommand>) -> Vec<ChargerCommand> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

fn set_currents(commands: &[ChargerCommand]) -> Vec<u32> {
    commands
        .iter()
        .filter_map(|c| match c {
            ChargerCommand::SetCurrent(a) => Some(*a),
            _ => None,
        })
        .collect()
}

#[test]
fn restart_hysteresis_boundaries() {
    let mut cfg = settings();
    cfg.start_enabled = false;

    // 12.01 A leaves less than the 8 A headroom under a 20 A fuse
    let (mut ctrl, mut rx) = controller(cfg.clone());
    let t0 = Instant::now();
    ctrl.on_phase_reading_at("p1", 12.01, t0);
    assert!(!ctrl.is_charging_enabled());
    assert!(drain(&mut rx).is_empty());

    // Exactly at the boundary the restart fires
    ctrl.on_phase_reading_at("p1", 12.0, t0 + Duration::from_secs(1));
    assert!(ctrl.is_charging_enabled());
    let commands = drain(&mut rx);
    assert!(commands.contains(&ChargerCommand::SetSwitch(true)));
    assert!(commands.contains(&ChargerCommand::SetCurrent(6)));
    assert!(
        commands
            .iter()
            .any(|c| matches!(c, ChargerCommand::Notify(_)))
    );

    // And comfortably below it as well
    let (mut ctrl, mut rx) = controller(cfg);
    ctrl.on_phase_reading_at("p1", 11.99, Instant::now());
    assert!(ctrl.is_charging_enabled());
    assert!(drain(&mut rx).contains(&ChargerCommand::SetSwitch(true)));
}

#[test]
fn emergency_stop_fires_once_after_grace() {
    let (mut ctrl, mut rx) = controller(settings());
    let t0 = Instant::now();

    // Overcurrent with the request already at minimum starts the countdown
    ctrl.on_phase_reading_at("p1", 23.0, t0);
    assert!(drain(&mut rx).is_empty());
    assert!(ctrl.is_charging_enabled());

    // Still inside the 10 s grace window
    ctrl.on_phase_reading_at("p1", 23.0, t0 + Duration::from_secs(6));
    assert!(drain(&mut rx).is_empty());

    // Past the window: exactly one stop
    ctrl.on_phase_reading_at("p1", 23.0, t0 + Duration::from_secs(11));
    let commands = drain(&mut rx);
    assert!(commands.contains(&ChargerCommand::SetSwitch(false)));
    assert!(!ctrl.is_charging_enabled());

    // Condition persists, but the controller is now disabled and the
    // restart headroom is nowhere near available
    ctrl.on_phase_reading_at("p1", 23.0, t0 + Duration::from_secs(12));
    ctrl.on_phase_reading_at("p1", 23.0, t0 + Duration::from_secs(30));
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn overcurrent_countdown_clears_when_condition_passes() {
    let (mut ctrl, mut rx) = controller(settings());
    let t0 = Instant::now();

    ctrl.on_phase_reading_at("p1", 23.0, t0);
    // Condition clears before the grace window elapses
    ctrl.on_phase_reading_at("p1", 15.0, t0 + Duration::from_secs(6));
    // A new excursion must start a fresh countdown
    ctrl.on_phase_reading_at("p1", 23.0, t0 + Duration::from_secs(8));
    ctrl.on_phase_reading_at("p1", 23.0, t0 + Duration::from_secs(12));
    assert!(ctrl.is_charging_enabled());
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn throttle_gate_limits_decision_rate() {
    let (mut ctrl, mut rx) = controller(settings());
    let t0 = Instant::now();
    ctrl.on_connector_status_at("charging", t0);

    // Inside the 20 s window nothing happens
    ctrl.on_phase_reading_at("p1", 15.0, t0);
    // First qualifying cycle only primes the PID
    ctrl.on_phase_reading_at("p1", 15.0, t0 + Duration::from_secs(21));
    // Still throttled relative to the previous cycle
    ctrl.on_phase_reading_at("p1", 15.0, t0 + Duration::from_secs(25));
    assert!(set_currents(&drain(&mut rx)).is_empty());

    // A full window later the PID may adjust
    ctrl.on_phase_reading_at("p1", 15.0, t0 + Duration::from_secs(42));
    assert_eq!(set_currents(&drain(&mut rx)), vec![8]);
}

#[test]
fn lockout_after_hard_safety_event() {
    let (mut ctrl, mut rx) = controller(settings());
    let t0 = Instant::now();
    ctrl.on_connector_status_at("charging", t0);

    // Walk the request up: prime, then one PID increase
    ctrl.on_phase_reading_at("p1", 10.0, t0 + Duration::from_secs(21));
    ctrl.on_phase_reading_at("p1", 10.0, t0 + Duration::from_secs(42));
    assert_eq!(set_currents(&drain(&mut rx)), vec![10]);

    // Hard event at T = t0+43: reduction by ceil(23-20) = 3
    ctrl.on_phase_reading_at("p1", 23.0, t0 + Duration::from_secs(43));
    assert_eq!(set_currents(&drain(&mut rx)), vec![7]);

    // T+30: throttle satisfied but lockout still active
    ctrl.on_phase_reading_at("p1", 15.0, t0 + Duration::from_secs(73));
    assert!(drain(&mut rx).is_empty());

    // T+61: lockout expired, PID may climb again
    ctrl.on_phase_reading_at("p1", 15.0, t0 + Duration::from_secs(104));
    assert_eq!(set_currents(&drain(&mut rx)).len(), 1);
}

#[test]
fn hard_reduction_uses_actual_draw_baseline() {
    let (mut ctrl, mut rx) = controller(settings());
    let t0 = Instant::now();
    ctrl.on_connector_status_at("charging", t0);

    ctrl.on_phase_reading_at("p1", 10.0, t0 + Duration::from_secs(21));
    ctrl.on_phase_reading_at("p1", 10.0, t0 + Duration::from_secs(42));
    assert_eq!(set_currents(&drain(&mut rx)), vec![10]);

    // The vehicle only draws 8 A despite the 10 A request; reduce from there
    ctrl.on_actual_draw(8.0);
    ctrl.on_phase_reading_at("p1", 23.0, t0 + Duration::from_secs(43));
    assert_eq!(set_currents(&drain(&mut rx)), vec![6]);
}

#[test]
fn spurious_low_actual_draw_falls_back_to_request() {
    let (mut ctrl, mut rx) = controller(settings());
    let t0 = Instant::now();
    ctrl.on_connector_status_at("charging", t0);

    ctrl.on_phase_reading_at("p1", 10.0, t0 + Duration::from_secs(21));
    ctrl.on_phase_reading_at("p1", 10.0, t0 + Duration::from_secs(42));
    assert_eq!(set_currents(&drain(&mut rx)), vec![10]);

    // A 2 A reading is below the minimum and therefore unreliable
    ctrl.on_actual_draw(2.0);
    ctrl.on_phase_reading_at("p1", 23.0, t0 + Duration::from_secs(43));
    assert_eq!(set_currents(&drain(&mut rx)), vec![7]);
}

#[test]
fn no_adjustment_while_not_actually_charging() {
    let (mut ctrl, mut rx) = controller(settings());
    let t0 = Instant::now();
    ctrl.on_connector_status_at("disconnected", t0);

    ctrl.on_phase_reading_at("p1", 10.0, t0 + Duration::from_secs(21));
    ctrl.on_phase_reading_at("p1", 10.0, t0 + Duration::from_secs(42));
    assert!(drain(&mut rx).is_empty());

    // Awaiting start counts as chargeable
    ctrl.on_connector_status_at("awaiting start", t0 + Duration::from_secs(43));
    ctrl.on_phase_reading_at("p1", 15.0, t0 + Duration::from_secs(64));
    assert_eq!(set_currents(&drain(&mut rx)), vec![8]);
}

#[test]
fn end_to_end_ramp_and_hard_reduction() {
    let (mut ctrl, mut rx) = controller(settings());
    let t0 = Instant::now();
    ctrl.on_connector_status_at("charging", t0);

    // Three phases report well under the setpoint; max is 11 A
    ctrl.on_phase_reading_at("p1", 10.0, t0);
    ctrl.on_phase_reading_at("p2", 11.0, t0);
    ctrl.on_phase_reading_at("p3", 9.0, t0);
    assert!(drain(&mut rx).is_empty());

    // Successive decision cycles climb toward the maximum without
    // ever exceeding it
    for cycle in 1..=5 {
        let at = t0 + Duration::from_secs(21 * cycle);
        ctrl.on_phase_reading_at("p1", 10.0, at);
    }
    let ramp = set_currents(&drain(&mut rx));
    assert_eq!(ramp, vec![10, 14, 16]);
    assert!(ramp.iter().all(|amps| *amps <= 16));
    assert_eq!(ctrl.requested_amps(), 16.0);

    // A 23 A excursion bypasses the throttle and cuts by ceil(23-20) = 3
    ctrl.on_phase_reading_at("p2", 23.0, t0 + Duration::from_secs(106));
    assert_eq!(set_currents(&drain(&mut rx)), vec![13]);
}

#[test]
fn hard_safety_reaction_is_debounced() {
    let (mut ctrl, mut rx) = controller(settings());
    let t0 = Instant::now();
    ctrl.on_connector_status_at("charging", t0);

    ctrl.on_phase_reading_at("p1", 10.0, t0 + Duration::from_secs(21));
    ctrl.on_phase_reading_at("p1", 10.0, t0 + Duration::from_secs(42));
    assert_eq!(set_currents(&drain(&mut rx)), vec![10]);

    ctrl.on_phase_reading_at("p1", 23.0, t0 + Duration::from_secs(43));
    assert_eq!(set_currents(&drain(&mut rx)), vec![7]);

    // Two seconds later the excursion is still visible, but inside the
    // 5 s debounce no second reduction fires
    ctrl.on_phase_reading_at("p1", 23.0, t0 + Duration::from_secs(45));
    assert!(drain(&mut rx).is_empty());

    // After the debounce the ladder reacts again
    ctrl.on_phase_reading_at("p1", 23.0, t0 + Duration::from_secs(49));
    assert_eq!(set_currents(&drain(&mut rx)), vec![6]);
}
