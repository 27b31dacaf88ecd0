use crate::api::{ApiError, ApiResult, EchoApiClient, StatusReply};

#[derive(Debug, Clone)]
pub struct TagService {
    client: EchoApiClient,
}

impl TagService {
    pub fn new(client: EchoApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> ApiResult<Vec<String>> {
        self.client.list_tags().await
    }

    pub async fn add(&self, name: &str) -> ApiResult<StatusReply> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::InvalidInput("tag name must not be empty".into()));
        }
        self.client.add_tag(name).await
    }

    /// Deleting a tag also strips it from every account server-side.
    pub async fn delete(&self, name: &str) -> ApiResult<StatusReply> {
        self.client.delete_tag(name).await
    }
}
