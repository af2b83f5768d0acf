use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use crate::storage::error::StoreError;
use crate::storage::traits::NodeStatusBackend;
use crate::storage::wire::{NodeEvent, NodeStatusRecord};

const EVENT_NAMESPACE: &str = "default";

#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        bearer_token: Option<String>,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token,
            client,
        })
    }

    fn node_status_url(&self, node: &str) -> String {
        format!("{}/api/v1/nodes/{}/status", self.base_url, node)
    }

    fn events_url(&self) -> String {
        format!(
            "{}/api/v1/namespaces/{}/events",
            self.base_url, EVENT_NAMESPACE
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

async fn check(response: reqwest::Response, node: &str) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::CONFLICT => Err(StoreError::Conflict),
        StatusCode::NOT_FOUND => Err(StoreError::NotFound(node.to_string())),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::Remote {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl NodeStatusBackend for HttpBackend {
    async fn get_node_status(&self, node: &str) -> Result<NodeStatusRecord, StoreError> {
        let response = self
            .authorize(self.client.get(self.node_status_url(node)))
            .send()
            .await?;
        let response = check(response, node).await?;
        Ok(response.json::<NodeStatusRecord>().await?)
    }

    async fn update_node_status(
        &self,
        node: &str,
        record: &NodeStatusRecord,
    ) -> Result<(), StoreError> {
        let response = self
            .authorize(self.client.put(self.node_status_url(node)))
            .json(record)
            .send()
            .await?;
        check(response, node).await?;
        Ok(())
    }

    async fn create_event(&self, event: &NodeEvent) -> Result<(), StoreError> {
        let response = self
            .authorize(self.client.post(self.events_url()))
            .json(event)
            .send()
            .await?;
        check(response, &event.involved_object.name).await?;
        Ok(())
    }
}
