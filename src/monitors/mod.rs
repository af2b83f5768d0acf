pub mod channel;
pub mod json_lines;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::Status;

pub use channel::{ChannelMonitor, StatusSender};
pub use json_lines::JsonLinesMonitor;

/// A source of problem reports. Each monitor owns its detection loop; the
/// problem detector only consumes the channel returned by `start`.
#[async_trait]
pub trait Monitor: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<mpsc::Receiver<Status>>;
}
