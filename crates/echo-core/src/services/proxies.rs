use tracing::info;

use crate::api::{ApiError, ApiResult, EchoApiClient, NewProxy, Proxy, RecordId, StatusReply};

#[derive(Debug, Clone)]
pub struct ProxyService {
    client: EchoApiClient,
}

impl ProxyService {
    pub fn new(client: EchoApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> ApiResult<Vec<Proxy>> {
        self.client.list_proxies().await
    }

    pub async fn add(&self, proxy: NewProxy) -> ApiResult<StatusReply> {
        if proxy.host.trim().is_empty() || proxy.port == 0 {
            return Err(ApiError::InvalidInput("host and port are required".into()));
        }
        let reply = self.client.add_proxy(&proxy).await?;
        info!(host = %proxy.host, port = proxy.port, "proxy added");
        Ok(reply)
    }

    pub async fn delete(&self, id: &str) -> ApiResult<StatusReply> {
        self.client.delete_proxy(&RecordId::from(id)).await
    }

    /// Probe the proxy with the given id. The backend wants the whole object.
    pub async fn check(&self, id: &str) -> ApiResult<(Proxy, String)> {
        let proxy = self
            .list()
            .await?
            .into_iter()
            .find(|proxy| proxy.id.matches(id))
            .ok_or_else(|| ApiError::UnknownProxy(id.to_owned()))?;
        let verdict = self.client.check_proxy(&proxy).await?;
        Ok((proxy, verdict))
    }
}
