//! Unified error handling for the sendplan crate
//!
//! This module provides a unified error type that consolidates the
//! domain-specific errors into a single `Error` enum, and classifies every
//! failure by [`Severity`] so the pipeline can decide whether to abort the
//! run, reject the schedule, or continue with a warning.
//!
//! # Architecture
//!
//! - [`SendplanErrorTrait`] - Common interface implemented by all error types
//! - [`Severity`] - Classification of failures for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors

use std::fmt;
use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::allocation::AllocationError;
pub use crate::pricing::PricingError;

/// Common trait for all sendplan error types
pub trait SendplanErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the severity class for handling strategies
    fn severity(&self) -> Severity;
}

/// Classification of failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Soft threshold crossed; schedule proceeds
    Advisory,
    /// Optional signal missing; defaults used and confidence lowered
    Degraded,
    /// Constraint unsatisfiable after repair; schedule is rejected
    Structural,
    /// Mandatory input missing; the whole run aborts
    Blocking,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advisory => write!(f, "ADVISORY"),
            Self::Degraded => write!(f, "DEGRADED"),
            Self::Structural => write!(f, "STRUCTURAL"),
            Self::Blocking => write!(f, "BLOCKING"),
        }
    }
}

/// A located constraint failure or warning surfaced in the verdict
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Issue {
    pub severity: Severity,
    /// Short name of the violated constraint, e.g. `global_gap`
    pub constraint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<chrono::Weekday>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<u32>,
    pub message: String,
}

impl Issue {
    pub fn new(severity: Severity, constraint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            constraint: constraint.into(),
            day: None,
            item_id: None,
            message: message.into(),
        }
    }

    pub fn on_day(mut self, day: chrono::Weekday) -> Self {
        self.day = Some(day);
        self
    }

    pub fn for_item(mut self, item_id: u32) -> Self {
        self.item_id = Some(item_id);
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.constraint)?;
        if let Some(day) = self.day {
            write!(f, " {day}")?;
        }
        if let Some(id) = self.item_id {
            write!(f, " item {id}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Unified error type for the sendplan crate
#[derive(Error, Debug)]
pub enum Error {
    /// Mandatory upstream data is absent
    #[error("Missing mandatory input: {field}")]
    MissingInput { field: &'static str },

    /// Creator tier outside 1-5
    #[error("Invalid creator tier {0}, expected 1-5")]
    InvalidTier(u8),

    /// External lookup failed after all retries
    #[error("Lookup '{lookup}' failed after {attempts} attempt(s): {reason}")]
    ContextUnavailable {
        lookup: &'static str,
        attempts: u32,
        reason: String,
    },

    /// External lookup exceeded its time budget
    #[error("Lookup '{lookup}' timed out after {timeout_ms} ms")]
    StageTimeout { lookup: &'static str, timeout_ms: u64 },

    /// Allocation errors
    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),

    /// Pricing errors
    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    /// A scorer task panicked or was cancelled
    #[error("Scorer task failed: {0}")]
    ScorerTask(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl SendplanErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::ContextUnavailable { .. } => true,
            Self::Io(_) => true,
            Self::Allocation(e) => e.is_recoverable(),
            Self::Pricing(e) => e.is_recoverable(),
            Self::MissingInput { .. }
            | Self::InvalidTier(_)
            | Self::StageTimeout { .. }
            | Self::ScorerTask(_)
            | Self::Json(_)
            | Self::Config(_) => false,
        }
    }

    fn severity(&self) -> Severity {
        match self {
            Self::Allocation(e) => e.severity(),
            Self::Pricing(e) => e.severity(),
            _ => Severity::Blocking,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a missing input error
    pub fn missing(field: &'static str) -> Self {
        Self::MissingInput { field }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Config(format!("{err:#}"))
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
