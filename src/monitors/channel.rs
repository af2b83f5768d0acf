use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::monitors::Monitor;
use crate::types::{Condition, Event, Status};

/// Monitor fed from inside the process through a [`StatusSender`].
pub struct ChannelMonitor {
    name: String,
    receiver: Mutex<Option<mpsc::Receiver<Status>>>,
    initial: Option<Status>,
    // Held only until start so that the channel closes with the last StatusSender.
    defaults_sender: Mutex<Option<mpsc::Sender<Status>>>,
}

#[derive(Clone)]
pub struct StatusSender {
    source: String,
    sender: mpsc::Sender<Status>,
}

impl ChannelMonitor {
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, StatusSender) {
        let name = name.into();
        let (sender, receiver) = mpsc::channel(capacity);
        let monitor = Self {
            name: name.clone(),
            receiver: Mutex::new(Some(receiver)),
            initial: None,
            defaults_sender: Mutex::new(Some(sender.clone())),
        };
        (
            monitor,
            StatusSender {
                source: name,
                sender,
            },
        )
    }

    /// Conditions reported as soon as the monitor starts, typically the
    /// healthy default of every condition type it owns.
    pub fn with_default_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.initial = Some(Status {
            source: self.name.clone(),
            events: Vec::new(),
            conditions,
        });
        self
    }
}

#[async_trait]
impl Monitor for ChannelMonitor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<mpsc::Receiver<Status>> {
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| anyhow!("monitor {} already started", self.name))?;

        let defaults_sender = self.defaults_sender.lock().take();
        if let (Some(initial), Some(sender)) = (&self.initial, defaults_sender) {
            sender
                .try_send(initial.clone())
                .map_err(|e| anyhow!("monitor {} could not queue defaults: {}", self.name, e))?;
        }

        log::info!("Monitor {} started", self.name);
        Ok(receiver)
    }
}

impl StatusSender {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub async fn report(&self, status: Status) -> Result<()> {
        self.sender
            .send(status)
            .await
            .map_err(|_| anyhow!("monitor {} is no longer consumed", self.source))
    }

    pub async fn report_condition(&self, condition: Condition) -> Result<()> {
        self.report(Status::new(self.source.clone()).with_condition(condition))
            .await
    }

    pub async fn report_event(&self, event: Event) -> Result<()> {
        self.report(Status::new(self.source.clone()).with_event(event))
            .await
    }
}
