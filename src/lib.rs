//! # Eos - Adaptive EV Charging Load Balancer
//!
//! A Rust implementation of an adaptive charging current controller for
//! three-phase home installations, keeping the total load under the main
//! fuse rating while charging as fast as safely possible through a
//! Home Assistant hub.
//!
//! ## Features
//!
//! - **Adaptive Control**: PID regulator targeting the fuse setpoint
//! - **Tiered Safety**: Debounced hard overcurrent reduction and emergency stop
//! - **Hysteresis**: Restart headroom and post-safety lockout against chatter
//! - **Home Assistant**: Entity subscriptions and imperative service calls
//! - **Dynamic Pricing**: Nordpool day-ahead price polling
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! The application follows a modular architecture with clear separation of concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `pid`: PID regulator for smooth load balancing
//! - `phases`: Latest per-phase current readings
//! - `controller`: The safety/decision state machine
//! - `gateway`: Home Assistant REST integration
//! - `prices`: Nordpool day-ahead price polling
//! - `driver`: Event loop orchestration and process lifecycle

pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod phases;
pub mod pid;
pub mod prices;

// Re-export commonly used types
pub use config::Config;
pub use controller::{ChargeController, ChargerCommand, ConnectorStatus, ControllerSettings};
pub use driver::EosDriver;
pub use error::{EosError, Result};
pub use phases::PhaseCurrents;
pub use pid::PidController;
