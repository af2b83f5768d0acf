use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Condition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warn,
}

impl Severity {
    /// Event type understood by the cluster API.
    pub fn as_event_type(&self) -> &'static str {
        match self {
            Severity::Info => "Normal",
            Severity::Warn => "Warning",
        }
    }
}

/// A transient problem signal. Not stored locally and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub severity: Severity,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub message: String,
}

impl Event {
    pub fn new(severity: Severity, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            timestamp: Utc::now(),
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// One batch of observations emitted by a monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    pub source: String,
    pub events: Vec<Event>,
    pub conditions: Vec<Condition>,
}

impl Status {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            events: Vec::new(),
            conditions: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}
