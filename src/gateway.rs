//! Home Assistant gateway integration
//!
//! The controller's external contract is a stream of entity state changes in
//! and a small set of imperative commands out. This module provides both
//! sides over the hub's REST API: [`HaClient`] issues service calls, the
//! [`StateWatcher`] observes the subscribed entities and emits
//! [`StateChange`] events, and [`run_command_pump`] drains the controller's
//! outbound channel so a slow hub never stalls event processing.
//!
//! Delivery is deliberately best-effort. Commands are idempotent setpoints
//! and switch states; a failed call is logged and the next qualifying
//! decision cycle re-issues whatever is still relevant.

use crate::config::{Config, GatewayConfig};
use crate::controller::ChargerCommand;
use crate::error::{EosError, Result};
use crate::logging::get_logger;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Role of a subscribed hub entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRole {
    /// Per-phase current sensor
    PhaseCurrent,

    /// Connector/vehicle status sensor
    ConnectorStatus,

    /// Vehicle's actually-measured total draw, summed across phases
    ActualDraw,
}

/// A state transition of one subscribed entity
#[derive(Debug, Clone)]
pub struct StateChange {
    pub entity_id: String,
    pub state: String,
}

/// Mapping from entity id to its role in the control loop
#[derive(Debug, Clone, Default)]
pub struct SubscriptionMap {
    roles: HashMap<String, EntityRole>,
}

impl SubscriptionMap {
    /// Build the subscription bookkeeping from configuration
    pub fn from_config(config: &Config) -> Self {
        let mut roles = HashMap::new();
        for entity in &config.charger.phase_entities {
            roles.insert(entity.clone(), EntityRole::PhaseCurrent);
        }
        roles.insert(
            config.charger.status_entity.clone(),
            EntityRole::ConnectorStatus,
        );
        if let Some(entity) = &config.charger.actual_draw_entity {
            roles.insert(entity.clone(), EntityRole::ActualDraw);
        }
        Self { roles }
    }

    /// Role of an entity, if it is subscribed
    pub fn role_of(&self, entity_id: &str) -> Option<EntityRole> {
        self.roles.get(entity_id).copied()
    }

    /// All subscribed entity ids
    pub fn entity_ids(&self) -> impl Iterator<Item = &String> {
        self.roles.keys()
    }

    /// Number of subscriptions
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Whether nothing is subscribed
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Parse a hub state into a number, treating anything unparseable as 0
///
/// A stray 0 is absorbed by the decision ladder's no-signal guard.
pub fn parse_state(raw: &str) -> f64 {
    raw.trim().parse().unwrap_or(0.0)
}

/// Abstract hub surface the driver talks to
#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Read the current state of an entity
    async fn get_state(&self, entity_id: &str) -> Result<String>;

    /// Set the requested charging current on a numeric control point
    async fn set_current(&self, entity_id: &str, amps: u32) -> Result<()>;

    /// Turn the charging circuit switch on or off
    async fn set_switch(&self, entity_id: &str, on: bool) -> Result<()>;

    /// Send a notification to a target device
    async fn notify(&self, device: &str, message: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct EntityState {
    state: String,
}

/// Home Assistant REST API client
pub struct HaClient {
    base_url: String,
    access_token: String,
    http: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

impl HaClient {
    /// Create a client for the configured hub
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| EosError::gateway(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            http,
            logger: get_logger("gateway"),
        })
    }

    /// Call a Home Assistant service with a JSON payload
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let url = format!("{}/api/services/{}/{}", self.base_url, domain, service);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EosError::gateway(format!(
                "Service call {}/{} failed with status {}",
                domain,
                service,
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl GatewayApi for HaClient {
    async fn get_state(&self, entity_id: &str) -> Result<String> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EosError::gateway(format!(
                "State read for {} failed with status {}",
                entity_id,
                response.status()
            )));
        }

        let entity: EntityState = response.json().await?;
        Ok(entity.state)
    }

    async fn set_current(&self, entity_id: &str, amps: u32) -> Result<()> {
        self.logger
            .info(&format!("Updating charging amps, new value {}", amps));
        self.call_service(
            "number",
            "set_value",
            serde_json::json!({ "entity_id": entity_id, "value": amps }),
        )
        .await
    }

    async fn set_switch(&self, entity_id: &str, on: bool) -> Result<()> {
        let service = if on { "turn_on" } else { "turn_off" };
        self.logger
            .info(&format!("Setting charger switch {}", service));
        self.call_service(
            "switch",
            service,
            serde_json::json!({ "entity_id": entity_id }),
        )
        .await
    }

    async fn notify(&self, device: &str, message: &str) -> Result<()> {
        self.call_service(
            "notify",
            device,
            serde_json::json!({ "title": "Electricity", "message": message }),
        )
        .await
    }
}

/// Entity ids the command pump routes commands to
#[derive(Debug, Clone)]
pub struct CommandRoutes {
    /// Numeric control point for the requested current
    pub current_entity: String,

    /// Charging circuit switch
    pub switch_entity: String,

    /// Notification target, when notifications are enabled
    pub notify_device: Option<String>,
}

impl CommandRoutes {
    /// Build routes from configuration
    pub fn from_config(config: &Config) -> Self {
        let notify_device = if config.notifications.enabled && !config.notifications.device.is_empty()
        {
            Some(config.notifications.device.clone())
        } else {
            None
        };
        Self {
            current_entity: config.charger.current_entity.clone(),
            switch_entity: config.charger.switch_entity.clone(),
            notify_device,
        }
    }
}

/// Forward controller commands to the hub until the channel closes
///
/// Failures are logged and dropped; the controller re-issues idempotent
/// commands on its next qualifying decision cycle.
pub async fn run_command_pump(
    api: Arc<dyn GatewayApi>,
    routes: CommandRoutes,
    mut commands: mpsc::UnboundedReceiver<ChargerCommand>,
) {
    let logger = get_logger("gateway");

    while let Some(command) = commands.recv().await {
        let result = match &command {
            ChargerCommand::SetCurrent(amps) => {
                api.set_current(&routes.current_entity, *amps).await
            }
            ChargerCommand::SetSwitch(on) => api.set_switch(&routes.switch_entity, *on).await,
            ChargerCommand::Notify(message) => match &routes.notify_device {
                Some(device) => api.notify(device, message).await,
                None => {
                    logger.debug("Notifications disabled, dropping message");
                    Ok(())
                }
            },
        };

        if let Err(e) = result {
            logger.warn(&format!(
                "Command {:?} failed: {}. Next decision cycle will re-issue.",
                command, e
            ));
        }
    }
}

/// Polls subscribed entities and emits a [`StateChange`] on every transition
pub struct StateWatcher {
    api: Arc<dyn GatewayApi>,
    subscriptions: SubscriptionMap,
    poll_interval: Duration,
    events: mpsc::UnboundedSender<StateChange>,
    last_seen: HashMap<String, String>,
    logger: crate::logging::StructuredLogger,
}

impl StateWatcher {
    /// Create a watcher over the configured subscriptions
    pub fn new(
        api: Arc<dyn GatewayApi>,
        subscriptions: SubscriptionMap,
        poll_interval: Duration,
        events: mpsc::UnboundedSender<StateChange>,
    ) -> Self {
        Self {
            api,
            subscriptions,
            poll_interval,
            events,
            last_seen: HashMap::new(),
            logger: get_logger("gateway"),
        }
    }

    /// Run the polling loop until the event channel closes
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        self.logger.info(&format!(
            "Watching {} hub entities",
            self.subscriptions.len()
        ));

        loop {
            ticker.tick().await;
            if self.poll_once().await {
                return;
            }
        }
    }

    /// Poll every subscription once; returns true when the receiver is gone
    async fn poll_once(&mut self) -> bool {
        let entities: Vec<String> = self.subscriptions.entity_ids().cloned().collect();
        for entity_id in entities {
            match self.api.get_state(&entity_id).await {
                Ok(state) => {
                    let changed = self
                        .last_seen
                        .get(&entity_id)
                        .is_none_or(|prev| prev != &state);
                    if !changed {
                        continue;
                    }
                    self.last_seen.insert(entity_id.clone(), state.clone());
                    let event = StateChange { entity_id, state };
                    if self.events.send(event).is_err() {
                        return true;
                    }
                }
                Err(e) => {
                    self.logger
                        .debug(&format!("State read for {} failed: {}", entity_id, e));
                }
            }
        }
        false
    }
}
