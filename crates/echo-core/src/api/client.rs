use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::types::{
    Account, AudienceMember, Campaign, FinalizeRequest, NewCampaign, NewProxy, Profile, Proxy,
    RecordId, SettingsPayload, StatusReply,
};

const USER_AGENT: &str = "echoctl/0.1.0";

/// Errors returned by the backend client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status}: {message}")]
    HttpStatus { status: StatusCode, message: String },
    #[error("server rejected the request: {message}")]
    Rejected { message: String },
    #[error("invalid API endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("failed to deserialize response: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    InvalidInput(String),
    #[error("proxy '{0}' no longer exists on the server")]
    UnknownProxy(String),
}

impl ApiError {
    /// Text shown to the operator: the server's own message where there is one.
    pub fn operator_message(&self) -> String {
        match self {
            ApiError::HttpStatus { message, .. } | ApiError::Rejected { message } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Thin JSON client for the automation backend's `/api` routes.
#[derive(Debug, Clone)]
pub struct EchoApiClient {
    http: Client,
    base: Url,
}

impl EchoApiClient {
    /// Routes resolve below `base`, so a path prefix such as `/echo` is kept.
    pub fn new(base: &Url) -> ApiResult<Self> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { http, base })
    }

    /// Build a client from a textual base URL (useful for testing).
    pub fn with_base_url(base: &str) -> ApiResult<Self> {
        Self::new(&Url::parse(base)?)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub async fn list_accounts(&self) -> ApiResult<Vec<Account>> {
        self.get_json("/api/accounts").await
    }

    /// Start linking an account. Error replies are returned untouched so the
    /// caller can read protocol signals out of them.
    pub async fn add_account(&self, phone: &str) -> ApiResult<StatusReply> {
        #[derive(Serialize)]
        struct Body<'a> {
            phone: &'a str,
        }

        self.post_status("/api/accounts/add", &Body { phone }).await
    }

    pub async fn finalize_account(&self, request: &FinalizeRequest) -> ApiResult<StatusReply> {
        self.post_status("/api/accounts/finalize", request).await
    }

    pub async fn delete_account(&self, phone: &str) -> ApiResult<StatusReply> {
        #[derive(Serialize)]
        struct Body<'a> {
            phone: &'a str,
        }

        self.post_status("/api/accounts/delete", &Body { phone })
            .await
    }

    pub async fn save_settings(
        &self,
        phone: &str,
        settings: &SettingsPayload,
    ) -> ApiResult<StatusReply> {
        #[derive(Serialize)]
        struct Body<'a> {
            phone: &'a str,
            settings: &'a SettingsPayload,
        }

        self.post_status("/api/accounts/settings", &Body { phone, settings })
            .await
    }

    pub async fn apply_profile(&self, phone: &str, profile: &Profile) -> ApiResult<StatusReply> {
        #[derive(Serialize)]
        struct Body<'a> {
            phone: &'a str,
            profile: &'a Profile,
        }

        self.post_status("/api/accounts/profile", &Body { phone, profile })
            .await
    }

    /// Upload an avatar image and return the path the server stored it under.
    pub async fn upload_avatar(&self, file: &Path) -> ApiResult<String> {
        #[derive(Deserialize)]
        struct UploadReply {
            #[serde(default)]
            status: Option<String>,
            #[serde(default)]
            path: Option<String>,
            #[serde(default)]
            message: Option<String>,
        }

        let bytes = tokio::fs::read(file).await?;
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "avatar".to_owned());
        let form = Form::new().part("avatar", Part::bytes(bytes).file_name(file_name));

        let url = self.endpoint("/api/accounts/upload_avatar")?;
        debug!(%url, "POST multipart");
        let response = self.http.post(url).multipart(form).send().await?;
        let reply: UploadReply = Self::decode(response).await?;

        match (reply.status.as_deref(), reply.path) {
            (Some("ok"), Some(path)) => Ok(path),
            _ => Err(ApiError::Rejected {
                message: reply
                    .message
                    .unwrap_or_else(|| "avatar upload failed".to_owned()),
            }),
        }
    }

    pub async fn list_proxies(&self) -> ApiResult<Vec<Proxy>> {
        self.get_json("/api/proxies").await
    }

    pub async fn add_proxy(&self, proxy: &NewProxy) -> ApiResult<StatusReply> {
        self.post_status("/api/proxies/add", proxy).await
    }

    pub async fn delete_proxy(&self, id: &RecordId) -> ApiResult<StatusReply> {
        #[derive(Serialize)]
        struct Body<'a> {
            id: &'a RecordId,
        }

        self.post_status("/api/proxies/delete", &Body { id }).await
    }

    /// Ask the backend to probe a proxy; returns its `proxy_status` verdict.
    pub async fn check_proxy(&self, proxy: &Proxy) -> ApiResult<String> {
        #[derive(Deserialize)]
        struct CheckReply {
            #[serde(default)]
            proxy_status: Option<String>,
            #[serde(flatten)]
            reply: StatusReply,
        }

        let reply: CheckReply = self.post_json("/api/proxies/check", proxy).await?;
        if reply.reply.is_error() {
            return Err(ApiError::Rejected {
                message: reply.reply.text().to_owned(),
            });
        }
        Ok(reply.proxy_status.unwrap_or_else(|| "unknown".to_owned()))
    }

    pub async fn list_tags(&self) -> ApiResult<Vec<String>> {
        self.get_json("/api/tags").await
    }

    pub async fn add_tag(&self, name: &str) -> ApiResult<StatusReply> {
        self.post_status("/api/tags/add", &NameBody { name }).await
    }

    pub async fn delete_tag(&self, name: &str) -> ApiResult<StatusReply> {
        self.post_status("/api/tags/delete", &NameBody { name })
            .await
    }

    /// Saved audience file names (`*.json`).
    pub async fn list_audiences(&self) -> ApiResult<Vec<String>> {
        self.get_json("/api/audiences").await
    }

    pub async fn scrape_audience(
        &self,
        phone: &str,
        chat_link: &str,
    ) -> ApiResult<Vec<AudienceMember>> {
        #[derive(Serialize)]
        struct Body<'a> {
            phone: &'a str,
            chat_link: &'a str,
        }

        #[derive(Deserialize)]
        struct ScrapeReply {
            #[serde(default)]
            users: Vec<AudienceMember>,
            #[serde(flatten)]
            reply: StatusReply,
        }

        let reply: ScrapeReply = self
            .post_json("/api/audiences/scrape", &Body { phone, chat_link })
            .await?;
        if reply.reply.is_error() {
            return Err(ApiError::Rejected {
                message: reply.reply.text().to_owned(),
            });
        }
        Ok(reply.users)
    }

    pub async fn save_audience(
        &self,
        name: &str,
        users: &[AudienceMember],
    ) -> ApiResult<StatusReply> {
        #[derive(Serialize)]
        struct Body<'a> {
            name: &'a str,
            users: &'a [AudienceMember],
        }

        self.post_status("/api/audiences/save", &Body { name, users })
            .await
    }

    pub async fn delete_audience(&self, filename: &str) -> ApiResult<StatusReply> {
        #[derive(Serialize)]
        struct Body<'a> {
            filename: &'a str,
        }

        self.post_status("/api/audiences/delete", &Body { filename })
            .await
    }

    pub async fn list_campaigns(&self) -> ApiResult<Vec<Campaign>> {
        let campaigns: Option<Vec<Campaign>> = self.get_json("/api/campaigns").await?;
        Ok(campaigns.unwrap_or_default())
    }

    pub async fn start_campaign(&self, campaign: &NewCampaign) -> ApiResult<StatusReply> {
        self.post_status("/api/campaigns/start", campaign).await
    }

    pub async fn delete_campaign(&self, id: &RecordId) -> ApiResult<StatusReply> {
        #[derive(Serialize)]
        struct Body<'a> {
            id: &'a RecordId,
        }

        self.post_status("/api/campaigns/delete", &Body { id })
            .await
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    async fn get_json<R>(&self, path: &str) -> ApiResult<R>
    where
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(%url, "GET");
        let response = self.http.get(url).send().await?;
        Self::decode(response).await
    }

    async fn post_json<T, R>(&self, path: &str, body: &T) -> ApiResult<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let response = self.http.post(url).json(body).send().await?;
        Self::decode(response).await
    }

    /// POST and require a `{status, message}` reply that is not an error.
    async fn post_status<T>(&self, path: &str, body: &T) -> ApiResult<StatusReply>
    where
        T: Serialize + ?Sized,
    {
        let reply: StatusReply = self.post_json(path, body).await?;
        if reply.is_error() {
            return Err(ApiError::Rejected {
                message: reply.text().to_owned(),
            });
        }
        Ok(reply)
    }

    async fn decode<R>(response: Response) -> ApiResult<R>
    where
        R: DeserializeOwned,
    {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                status,
                message: server_message(&text),
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Serialize)]
struct NameBody<'a> {
    name: &'a str,
}

/// Pull `message` out of a JSON error body, or fall back to the raw text.
fn server_message(body: &str) -> String {
    serde_json::from_str::<StatusReply>(body)
        .ok()
        .map(|reply| reply.text().to_owned())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| body.trim().to_owned())
}
