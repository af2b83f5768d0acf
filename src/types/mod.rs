pub mod condition;
pub mod event;

pub use condition::{Condition, ConditionStatus};
pub use event::{Event, Severity, Status};

/// Identity of a condition within a node's condition set, e.g. `KernelDeadlock`.
pub type ConditionType = String;
