use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::monitors::Monitor;
use crate::types::Status;

type Input = Box<dyn AsyncBufRead + Send + Unpin>;

/// Reads one JSON-encoded [`Status`] per line from an external detector, e.g.
/// a FIFO or the agent's stdin. Malformed lines are logged and skipped; the
/// monitor's channel closes at end of input.
pub struct JsonLinesMonitor {
    name: String,
    input: Mutex<Option<Input>>,
    capacity: usize,
}

impl JsonLinesMonitor {
    pub fn new(name: impl Into<String>, input: Input) -> Self {
        Self {
            name: name.into(),
            input: Mutex::new(Some(input)),
            capacity: 64,
        }
    }
}

#[async_trait]
impl Monitor for JsonLinesMonitor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<mpsc::Receiver<Status>> {
        let input = self
            .input
            .lock()
            .take()
            .ok_or_else(|| anyhow!("monitor {} already started", self.name))?;
        let (tx, rx) = mpsc::channel(self.capacity);
        let name = self.name.clone();

        tokio::spawn(async move {
            let mut lines = input.lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        log::error!("Monitor {} stopped reading input: {}", name, e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let mut status: Status = match serde_json::from_str(&line) {
                    Ok(status) => status,
                    Err(e) => {
                        log::warn!("Monitor {} skipped malformed status: {}", name, e);
                        continue;
                    }
                };
                if status.source.is_empty() {
                    status.source = name.clone();
                }
                if tx.send(status).await.is_err() {
                    break;
                }
            }
            log::info!("Monitor {} reached end of input", name);
        });

        Ok(rx)
    }
}
