//! Relay proxy client: asks the relay to reload flags after an apply.
use async_trait::async_trait;
use reqwest::Client;
use rollgate_workflow::{RefreshError, RefreshSignal, RefreshTarget};
use std::time::Duration;
use tracing::debug;

pub const REFRESH_PATH: &str = "/admin/v1/retriever/refresh";
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RelayProxyRefresh {
    client: Client,
    endpoint: String,
    admin_key: Option<String>,
}

impl RelayProxyRefresh {
    pub fn new(base_url: &str, admin_key: Option<String>) -> Result<Self, RefreshError> {
        let client = Client::builder()
            .timeout(REFRESH_TIMEOUT)
            .build()
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), REFRESH_PATH),
            admin_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RefreshSignal for RelayProxyRefresh {
    async fn refresh(&self, target: RefreshTarget) -> Result<(), RefreshError> {
        debug!(endpoint = %self.endpoint, project = %target.project, flag_key = %target.flag_key, "refreshing relay");

        let mut request = self.client.post(&self.endpoint);
        if let Some(key) = &self.admin_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(RefreshError::Status(status.as_u16()));
        }
        Ok(())
    }
}
