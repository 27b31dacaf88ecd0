use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::api::{
    Account, ApiError, ApiResult, EchoApiClient, Profile, Proxy, SettingsPayload, StatusReply,
    UserAgent,
};

/// One entry of the global tag catalog, marked if the account carries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagChoice {
    pub name: String,
    pub applied: bool,
}

/// Editable copy of an account's settings.
#[derive(Debug, Clone)]
pub struct SettingsForm {
    pub phone: String,
    pub profile: Profile,
    pub user_agent: UserAgent,
    /// Id picked in the proxy selector; resolved to a full proxy only on save.
    pub proxy_id: Option<String>,
    /// Proxies known when the form was opened. Display only.
    pub proxy_options: Vec<Proxy>,
    pub tags: Vec<TagChoice>,
    /// Server-side settings keys the form does not edit; sent back as read.
    pub extra: Map<String, Value>,
}

impl SettingsForm {
    /// Blank or `None` clears the proxy.
    pub fn select_proxy(&mut self, id: Option<&str>) {
        self.proxy_id = id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned);
    }

    pub fn selected_proxy(&self) -> Option<&Proxy> {
        let id = self.proxy_id.as_deref()?;
        self.proxy_options.iter().find(|proxy| proxy.id.matches(id))
    }

    /// Returns `false` when the tag is not in the catalog.
    pub fn set_tag(&mut self, name: &str, applied: bool) -> bool {
        match self.tags.iter_mut().find(|tag| tag.name == name) {
            Some(tag) => {
                tag.applied = applied;
                true
            }
            None => false,
        }
    }

    pub fn clear_tags(&mut self) {
        for tag in &mut self.tags {
            tag.applied = false;
        }
    }

    pub fn selected_tags(&self) -> Vec<String> {
        self.tags
            .iter()
            .filter(|tag| tag.applied)
            .map(|tag| tag.name.clone())
            .collect()
    }

    pub fn regenerate_user_agent(&mut self) {
        self.user_agent = UserAgent::generate(&self.user_agent.os, &self.user_agent.chrome);
    }
}

/// Moves account settings between the backend and an editable form.
#[derive(Debug, Clone)]
pub struct SettingsSync {
    client: EchoApiClient,
}

impl SettingsSync {
    pub fn new(client: EchoApiClient) -> Self {
        Self { client }
    }

    /// Snapshot `account` into a form, resolving its proxy and tags against
    /// the server's current proxy list and tag catalog.
    pub async fn load_for_editing(&self, account: &Account) -> ApiResult<SettingsForm> {
        let proxies = self.client.list_proxies().await?;
        let catalog = self.client.list_tags().await?;
        let settings = &account.settings;

        let proxy_id = match settings.proxy_id.as_deref() {
            Some(id) if proxies.iter().any(|proxy| proxy.id.matches(id)) => Some(id.to_owned()),
            Some(id) => {
                warn!(phone = %account.phone, proxy = id, "account references a proxy that no longer exists");
                None
            }
            None => None,
        };

        for tag in &settings.tags {
            if !catalog.contains(tag) {
                debug!(phone = %account.phone, tag = %tag, "dropping tag missing from catalog");
            }
        }
        let tags = catalog
            .into_iter()
            .map(|name| TagChoice {
                applied: settings.tags.contains(&name),
                name,
            })
            .collect();

        Ok(SettingsForm {
            phone: account.phone.clone(),
            profile: settings.profile.clone(),
            user_agent: settings.user_agent.clone(),
            proxy_id,
            proxy_options: proxies,
            tags,
            extra: settings.extra.clone(),
        })
    }

    /// Persist the form in one request and return the body that was sent.
    ///
    /// The selected proxy is looked up in a freshly fetched list; the form's
    /// own options may be stale.
    pub async fn save(&self, form: &SettingsForm) -> ApiResult<SettingsPayload> {
        let proxy = match form.proxy_id.as_deref() {
            Some(id) => Some(self.resolve_proxy(id).await?),
            None => None,
        };

        let payload = SettingsPayload {
            profile: form.profile.clone(),
            user_agent: form.user_agent.clone(),
            proxy,
            tags: form.selected_tags(),
            extra: form.extra.clone(),
        };
        self.client.save_settings(&form.phone, &payload).await?;
        info!(phone = %form.phone, "account settings saved");
        Ok(payload)
    }

    /// Push the profile to the live messaging account. Independent of `save`.
    pub async fn apply_profile(&self, phone: &str, profile: &Profile) -> ApiResult<StatusReply> {
        let reply = self.client.apply_profile(phone, profile).await?;
        info!(phone, "profile pushed to account");
        Ok(reply)
    }

    /// Upload an avatar and point the form's profile at it. Nothing is
    /// persisted until the form is saved.
    pub async fn attach_avatar(&self, form: &mut SettingsForm, file: &Path) -> ApiResult<String> {
        let path = self.client.upload_avatar(file).await?;
        form.profile.avatar_path = path.clone();
        Ok(path)
    }

    async fn resolve_proxy(&self, id: &str) -> ApiResult<Proxy> {
        self.client
            .list_proxies()
            .await?
            .into_iter()
            .find(|proxy| proxy.id.matches(id))
            .ok_or_else(|| ApiError::UnknownProxy(id.to_owned()))
    }
}
