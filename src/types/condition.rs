use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ConditionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "True" => Ok(ConditionStatus::True),
            "False" => Ok(ConditionStatus::False),
            "Unknown" => Ok(ConditionStatus::Unknown),
            other => Err(other.to_string()),
        }
    }
}

/// A named health fact about the node.
///
/// `last_transition_time` moves only when `status` changes; two observations of
/// the same status keep the original transition time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    #[serde(default = "Utc::now")]
    pub last_transition_time: DateTime<Utc>,
    pub reason: String,
    pub message: String,
}

impl Condition {
    pub fn new(
        condition_type: impl Into<ConditionType>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            last_transition_time: Utc::now(),
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn with_transition_time(mut self, at: DateTime<Utc>) -> Self {
        self.last_transition_time = at;
        self
    }

    pub fn is_problem(&self) -> bool {
        self.status != ConditionStatus::False
    }
}
