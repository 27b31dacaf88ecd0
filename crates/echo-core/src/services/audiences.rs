use tracing::info;

use crate::api::{ApiError, ApiResult, AudienceMember, EchoApiClient, StatusReply};

const AUDIENCE_SUFFIX: &str = ".json";

/// Saved audience file name as shown to operators.
pub fn display_name(filename: &str) -> &str {
    filename.strip_suffix(AUDIENCE_SUFFIX).unwrap_or(filename)
}

/// Accept either `leads` or `leads.json`.
pub fn file_name(name: &str) -> String {
    let name = name.trim();
    if name.ends_with(AUDIENCE_SUFFIX) {
        name.to_owned()
    } else {
        format!("{name}{AUDIENCE_SUFFIX}")
    }
}

#[derive(Debug, Clone)]
pub struct AudienceService {
    client: EchoApiClient,
}

impl AudienceService {
    pub fn new(client: EchoApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> ApiResult<Vec<String>> {
        self.client.list_audiences().await
    }

    pub async fn scrape(&self, phone: &str, chat_link: &str) -> ApiResult<Vec<AudienceMember>> {
        if phone.trim().is_empty() || chat_link.trim().is_empty() {
            return Err(ApiError::InvalidInput(
                "an account and a chat link are required".into(),
            ));
        }
        let users = self
            .client
            .scrape_audience(phone.trim(), chat_link.trim())
            .await?;
        info!(phone, chat_link, users = users.len(), "audience scraped");
        Ok(users)
    }

    pub async fn save(&self, name: &str, users: &[AudienceMember]) -> ApiResult<StatusReply> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::InvalidInput("audience name is required".into()));
        }
        if users.is_empty() {
            return Err(ApiError::InvalidInput("no users to save".into()));
        }
        self.client.save_audience(name, users).await
    }

    pub async fn delete(&self, name: &str) -> ApiResult<StatusReply> {
        self.client.delete_audience(&file_name(name)).await
    }
}
