//! Error types and handling for Eos
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Eos operations
pub type Result<T> = std::result::Result<T, EosError>;

/// Main error type for Eos
#[derive(Debug, Error)]
pub enum EosError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Home Assistant gateway errors
    #[error("Gateway error: {message}")]
    Gateway { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// API integration errors (Nordpool data portal)
    #[error("API error: {message}")]
    Api { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl EosError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        EosError::Config {
            message: message.into(),
        }
    }

    /// Create a new gateway error
    pub fn gateway<S: Into<String>>(message: S) -> Self {
        EosError::Gateway {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        EosError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        EosError::Network {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        EosError::Api {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        EosError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        EosError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for EosError {
    fn from(err: std::io::Error) -> Self {
        EosError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for EosError {
    fn from(err: serde_yaml::Error) -> Self {
        EosError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EosError {
    fn from(err: serde_json::Error) -> Self {
        EosError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for EosError {
    fn from(err: reqwest::Error) -> Self {
        EosError::network(err.to_string())
    }
}

impl From<chrono::ParseError> for EosError {
    fn from(err: chrono::ParseError) -> Self {
        EosError::validation("datetime", &err.to_string())
    }
}
