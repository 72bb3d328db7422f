//! Core orchestration for Eos
//!
//! The driver wires the gateway to the charge controller: it owns the single
//! event loop that mutates controller state, spawns the command pump and the
//! state watcher, schedules price polling, and handles process shutdown.
//! All controller mutation happens on this loop, one event at a time.

use crate::config::Config;
use crate::controller::{ChargeController, ChargerCommand, ControllerSettings};
use crate::error::{EosError, Result};
use crate::gateway::{
    CommandRoutes, EntityRole, GatewayApi, HaClient, StateChange, StateWatcher, SubscriptionMap,
    parse_state, run_command_pump,
};
use crate::logging::get_logger;
use crate::prices::PriceService;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, interval};

/// Main driver for Eos
pub struct EosDriver {
    /// Configuration
    config: Config,

    /// Logger with context
    logger: crate::logging::StructuredLogger,

    /// The decision state machine
    controller: ChargeController,

    /// Gateway client shared with the spawned tasks
    api: Arc<dyn GatewayApi>,

    /// Entity id to role bookkeeping
    subscriptions: SubscriptionMap,

    /// Inbound state change events
    events_rx: mpsc::UnboundedReceiver<StateChange>,

    /// Event sender handed to the state watcher
    events_tx: mpsc::UnboundedSender<StateChange>,

    /// Outbound command sender (also held by the controller)
    commands_tx: mpsc::UnboundedSender<ChargerCommand>,

    /// Command receiver, consumed by the pump when the driver starts
    commands_rx: Option<mpsc::UnboundedReceiver<ChargerCommand>>,

    /// Day-ahead price service, when enabled
    prices: Option<PriceService>,
}

impl EosDriver {
    /// Create a new driver instance from the default configuration
    pub fn new() -> Result<Self> {
        let config = Config::load().map_err(|e| {
            eprintln!("Failed to load configuration: {}", e);
            e
        })?;

        // Initialize logging
        crate::logging::init_logging(&config.logging)?;
        config.validate()?;

        let logger = get_logger("driver");
        logger.info("Initializing EV charging load balancer");

        let api: Arc<dyn GatewayApi> = Arc::new(HaClient::new(&config.gateway)?);
        let subscriptions = SubscriptionMap::from_config(&config);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let controller =
            ChargeController::new(ControllerSettings::from_config(&config), commands_tx.clone());

        let prices = if config.prices.enabled {
            Some(PriceService::new(&config.prices)?)
        } else {
            None
        };

        Ok(Self {
            config,
            logger,
            controller,
            api,
            subscriptions,
            events_rx,
            events_tx,
            commands_tx,
            commands_rx: Some(commands_rx),
            prices,
        })
    }

    /// Run the driver main loop until a shutdown signal arrives
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting main event loop");

        let commands_rx = self
            .commands_rx
            .take()
            .ok_or_else(|| EosError::generic("Driver already running"))?;

        // Outbound side: drain controller commands toward the hub
        let routes = CommandRoutes::from_config(&self.config);
        let pump = tokio::spawn(run_command_pump(self.api.clone(), routes, commands_rx));

        // Inbound side: watch the subscribed entities
        let watcher = StateWatcher::new(
            self.api.clone(),
            self.subscriptions.clone(),
            Duration::from_millis(self.config.gateway.poll_interval_ms),
            self.events_tx.clone(),
        );
        let watcher_task = tokio::spawn(watcher.run());

        // Price polling runs on its own task so a slow fetch never stalls
        // event processing
        let price_task = self.spawn_price_poller();

        // Announce startup and seed the control point with the initial target
        let _ = self
            .commands_tx
            .send(ChargerCommand::Notify("Electricity starting...".to_string()));
        let _ = self
            .commands_tx
            .send(ChargerCommand::SetCurrent(self.controller.requested_amps() as u32));

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| EosError::generic(format!("Failed to install signal handler: {}", e)))?;

        loop {
            tokio::select! {
                Some(change) = self.events_rx.recv() => {
                    self.dispatch(change);
                }
                _ = tokio::signal::ctrl_c() => {
                    self.logger.info("Interrupt received, shutting down");
                    break;
                }
                _ = sigterm.recv() => {
                    self.logger.info("Termination signal received, shutting down");
                    break;
                }
            }
        }

        // In-flight commands may be dropped; the next live reading after a
        // restart re-derives the correct target
        watcher_task.abort();
        pump.abort();
        if let Some(task) = price_task {
            task.abort();
        }

        self.logger.info("Driver shutdown complete");
        Ok(())
    }

    /// Route one state change into the controller
    fn dispatch(&mut self, change: StateChange) {
        match self.subscriptions.role_of(&change.entity_id) {
            Some(EntityRole::PhaseCurrent) => {
                let amps = parse_state(&change.state);
                self.logger.debug(&format!(
                    "Phase current {}: {:.2} A",
                    change.entity_id, amps
                ));
                self.controller.on_phase_reading(&change.entity_id, amps);
            }
            Some(EntityRole::ConnectorStatus) => {
                self.controller.on_connector_status(&change.state);
            }
            Some(EntityRole::ActualDraw) => {
                // The hub sensor sums across phases; the controller wants a
                // per-phase estimate
                let per_phase =
                    parse_state(&change.state) / f64::from(self.config.charger.phase_count);
                self.controller.on_actual_draw(per_phase);
            }
            None => {
                self.logger
                    .trace(&format!("Ignoring unsubscribed entity {}", change.entity_id));
            }
        }
    }

    /// Spawn the periodic price refresh, when enabled
    fn spawn_price_poller(&mut self) -> Option<tokio::task::JoinHandle<()>> {
        let mut prices = self.prices.take()?;
        let commands_tx = self.commands_tx.clone();
        let poll_minutes = self.config.prices.poll_interval_minutes.max(1);

        Some(tokio::spawn(async move {
            let logger = get_logger("prices");
            let mut ticker = interval(Duration::from_secs(poll_minutes * 60));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match prices.update_prices().await {
                    Ok(true) => {
                        logger.info("Prices updated!");
                        let message = match prices.current_price() {
                            Some(total) => format!(
                                "Prices updated! Current hour: {:.2} {}/MWh",
                                total,
                                prices.currency()
                            ),
                            None => "Prices updated!".to_string(),
                        };
                        let _ = commands_tx.send(ChargerCommand::Notify(message));
                    }
                    Ok(false) => {}
                    Err(e) => logger.warn(&format!("Price update failed: {}", e)),
                }
            }
        }))
    }

    /// Get configuration reference
    pub fn config(&self) -> &Config {
        &self.config
    }
}
