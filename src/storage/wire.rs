//! Shapes exchanged with the cluster API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::error::StoreError;
use crate::types::{Condition, ConditionStatus, Event};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    pub last_heartbeat_time: DateTime<Utc>,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

impl NodeCondition {
    pub fn from_condition(condition: &Condition, heartbeat: DateTime<Utc>) -> Self {
        Self {
            condition_type: condition.condition_type.clone(),
            status: condition.status.as_str().to_string(),
            last_heartbeat_time: heartbeat,
            last_transition_time: condition.last_transition_time,
            reason: condition.reason.clone(),
            message: condition.message.clone(),
        }
    }

    pub fn to_condition(&self) -> Result<Condition, StoreError> {
        let status = self
            .status
            .parse::<ConditionStatus>()
            .map_err(StoreError::InvalidStatus)?;
        Ok(Condition {
            condition_type: self.condition_type.clone(),
            status,
            last_transition_time: self.last_transition_time,
            reason: self.reason.clone(),
            message: self.message.clone(),
        })
    }

    fn clears(&self) -> bool {
        self.status == ConditionStatus::False.as_str()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub resource_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
}

/// The per-node record. `metadata.resource_version` is the concurrency token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatusRecord {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: NodeStatus,
}

impl NodeStatusRecord {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta {
                name: node.into(),
                resource_version: String::new(),
            },
            status: NodeStatus::default(),
        }
    }

    pub fn condition(&self, condition_type: &str) -> Option<&NodeCondition> {
        self.status
            .conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    /// Merges `incoming` by type: `False` drops the type, anything else replaces
    /// the existing entry in place or is appended.
    pub fn apply_conditions(&mut self, incoming: &[NodeCondition]) {
        let conditions = &mut self.status.conditions;
        for update in incoming {
            let existing = conditions
                .iter()
                .position(|c| c.condition_type == update.condition_type);

            match (existing, update.clears()) {
                (Some(index), true) => {
                    conditions.remove(index);
                }
                (None, true) => {}
                (Some(index), false) => conditions[index] = update.clone(),
                (None, false) => conditions.push(update.clone()),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvolvedObject {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSource {
    pub component: String,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEvent {
    pub metadata: ObjectMeta,
    pub involved_object: InvolvedObject,
    #[serde(rename = "type")]
    pub event_type: String,
    pub reason: String,
    pub message: String,
    pub source: EventSource,
    pub first_timestamp: DateTime<Utc>,
}

impl NodeEvent {
    pub fn new(node: &str, source: &str, event: &Event) -> Self {
        Self {
            metadata: ObjectMeta {
                name: format!("{}.{}", node, uuid::Uuid::new_v4().simple()),
                resource_version: String::new(),
            },
            involved_object: InvolvedObject {
                kind: "Node".to_string(),
                name: node.to_string(),
            },
            event_type: event.severity.as_event_type().to_string(),
            reason: event.reason.clone(),
            message: event.message.clone(),
            source: EventSource {
                component: source.to_string(),
                host: node.to_string(),
            },
            first_timestamp: event.timestamp,
        }
    }
}
