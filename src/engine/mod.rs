pub mod condition_manager;
pub mod problem_detector;

pub use condition_manager::{ConditionManager, ConditionManagerConfig, SyncOutcome};
pub use problem_detector::ProblemDetector;
