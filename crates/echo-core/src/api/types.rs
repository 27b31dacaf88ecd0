use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

pub const DEFAULT_UA_OS: &str = "Windows";
pub const DEFAULT_UA_CHROME: &str = "108.0.5359.215";

/// Server-assigned identifier. The backend hands out both integers and strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Compare against the textual form an operator typed or a form field holds.
    pub fn matches(&self, raw: &str) -> bool {
        match self {
            RecordId::Int(value) => raw.trim().parse::<i64>().ok() == Some(*value),
            RecordId::Text(value) => value == raw.trim(),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(value) => write!(f, "{value}"),
            RecordId::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for RecordId {
    fn from(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(value) => RecordId::Int(value),
            Err(_) => RecordId::Text(raw.trim().to_owned()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub phone: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub settings: AccountSettings,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, deserialize_with = "null_as_default")]
    pub first_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bio: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub avatar_path: String,
}

/// Canonical user-agent shape. Plain strings found in older records become `full_string`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgent {
    pub os: String,
    pub chrome: String,
    pub full_string: String,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            os: DEFAULT_UA_OS.to_owned(),
            chrome: DEFAULT_UA_CHROME.to_owned(),
            full_string: String::new(),
        }
    }
}

impl UserAgent {
    pub fn generate(os: &str, chrome: &str) -> Self {
        let platform = if os.eq_ignore_ascii_case("macos") {
            "Macintosh; Intel Mac OS X 10_15_7"
        } else {
            "Windows NT 10.0; Win64; x64"
        };
        Self {
            os: os.to_owned(),
            chrome: chrome.to_owned(),
            full_string: format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{chrome} Safari/537.36"
            ),
        }
    }
}

/// Per-account settings as the backend stores them.
///
/// Several drafts of the console wrote different shapes into this bag, so
/// deserialization folds all of them into one representation. The proxy is
/// reduced to its id: whatever snapshot the account carries may be stale.
/// Keys this console does not manage are kept in `extra` and written back
/// untouched on save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSettings")]
pub struct AccountSettings {
    pub profile: Profile,
    pub user_agent: UserAgent,
    pub proxy_id: Option<String>,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawUserAgent {
    Structured {
        #[serde(default)]
        os: Option<String>,
        #[serde(default)]
        chrome: Option<String>,
        #[serde(default)]
        full_string: Option<String>,
    },
    Plain(String),
}

#[derive(Deserialize)]
struct RawSettings {
    #[serde(default)]
    profile: Option<Profile>,
    #[serde(default)]
    user_agent: Option<RawUserAgent>,
    #[serde(default)]
    system_version: Option<String>,
    #[serde(default)]
    avatar_path: Option<String>,
    #[serde(default)]
    proxy: Option<Value>,
    #[serde(default)]
    proxy_id: Option<Value>,
    #[serde(default)]
    tags: Option<Vec<Option<String>>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        Value::Object(map) => map.get("id").and_then(id_text),
        _ => None,
    }
}

impl From<RawSettings> for AccountSettings {
    fn from(raw: RawSettings) -> Self {
        let mut profile = raw.profile.unwrap_or_default();
        if profile.avatar_path.is_empty() {
            if let Some(path) = raw.avatar_path {
                profile.avatar_path = path;
            }
        }

        let user_agent = match raw.user_agent {
            Some(RawUserAgent::Structured {
                os,
                chrome,
                full_string,
            }) => UserAgent {
                os: os.unwrap_or_else(|| DEFAULT_UA_OS.to_owned()),
                chrome: chrome.unwrap_or_else(|| DEFAULT_UA_CHROME.to_owned()),
                full_string: full_string.unwrap_or_default(),
            },
            Some(RawUserAgent::Plain(full_string)) => UserAgent {
                full_string,
                ..UserAgent::default()
            },
            None => UserAgent {
                full_string: raw.system_version.unwrap_or_default(),
                ..UserAgent::default()
            },
        };

        let proxy_id = raw
            .proxy
            .as_ref()
            .and_then(id_text)
            .or_else(|| raw.proxy_id.as_ref().and_then(id_text));

        Self {
            profile,
            user_agent,
            proxy_id,
            tags: raw.tags.into_iter().flatten().flatten().collect(),
            extra: raw.extra,
        }
    }
}

/// Body of `/api/accounts/settings`.
///
/// `proxy` is a complete snapshot or `null`; `tags` is always present.
/// `extra` carries the server-side keys read at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsPayload {
    pub profile: Profile,
    pub user_agent: UserAgent,
    pub proxy: Option<Proxy>,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Proxy protocol. Stored records with a type this console does not know are
/// kept as `Other` and written back verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyKind {
    Http,
    Socks4,
    Socks5,
    Other(String),
}

impl Serialize for ProxyKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProxyKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw
            .parse()
            .unwrap_or_else(|_| ProxyKind::Other(raw.trim().to_owned())))
    }
}

impl FromStr for ProxyKind {
    type Err = InvalidProxyKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "https" => Ok(ProxyKind::Http),
            "socks4" => Ok(ProxyKind::Socks4),
            "socks5" | "socks" => Ok(ProxyKind::Socks5),
            other => Err(InvalidProxyKind(other.to_owned())),
        }
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            ProxyKind::Http => "http",
            ProxyKind::Socks4 => "socks4",
            ProxyKind::Socks5 => "socks5",
            ProxyKind::Other(raw) => raw,
        };
        write!(f, "{value}")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid proxy type '{0}'")]
pub struct InvalidProxyKind(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    pub id: RecordId,
    #[serde(rename = "type")]
    pub kind: ProxyKind,
    pub host: String,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
}

impl Proxy {
    pub fn label(&self) -> String {
        format!(
            "{}:{} ({})",
            self.host,
            self.port,
            self.kind.to_string().to_uppercase()
        )
    }
}

/// Add-form shape; the server assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProxy {
    #[serde(rename = "type")]
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid port '{text}'"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceMember {
    pub id: RecordId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: RecordId,
    pub name: String,
    pub audience_file: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default)]
    pub total_users: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Campaign {
    /// The backend writes naive UTC timestamps.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn progress_label(&self) -> String {
        match &self.progress {
            Some(progress) => progress.clone(),
            None => format!("0/{}", self.total_users.unwrap_or(0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCampaign {
    pub name: String,
    pub audience_file: String,
    pub account_phones: Vec<String>,
    pub message: String,
}

/// Tagged outcome some backend revisions attach to linking replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOutcome {
    CodeRequired,
    PasswordRequired,
    Linked,
    Error,
}

/// Generic `{status, message}` envelope returned by mutating endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub outcome: Option<ReplyOutcome>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl StatusReply {
    pub fn is_error(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("error"))
            || self.outcome == Some(ReplyOutcome::Error)
    }

    /// Human-readable text, preferring the tagged `detail`.
    pub fn text(&self) -> &str {
        self.detail
            .as_deref()
            .or(self.message.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeRequest {
    pub phone: String,
    pub code: Option<String>,
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_accept_structured_user_agent_and_full_proxy() {
        let settings: AccountSettings = serde_json::from_value(json!({
            "profile": { "first_name": "Ada", "bio": "hi" },
            "user_agent": { "os": "macOS", "chrome": "120.0", "full_string": "UA" },
            "proxy": { "id": 3, "type": "socks5", "host": "h", "port": 1080 },
            "tags": ["warm"]
        }))
        .unwrap();
        assert_eq!(settings.profile.first_name, "Ada");
        assert_eq!(settings.user_agent.os, "macOS");
        assert_eq!(settings.proxy_id.as_deref(), Some("3"));
        assert_eq!(settings.tags, vec!["warm".to_string()]);
    }

    #[test]
    fn settings_migrate_legacy_fields() {
        let settings: AccountSettings = serde_json::from_value(json!({
            "system_version": "Windows 10",
            "avatar_path": "uploads/a.png",
            "proxy_id": "abc"
        }))
        .unwrap();
        assert_eq!(settings.user_agent.full_string, "Windows 10");
        assert_eq!(settings.user_agent.os, DEFAULT_UA_OS);
        assert_eq!(settings.profile.avatar_path, "uploads/a.png");
        assert_eq!(settings.proxy_id.as_deref(), Some("abc"));
        assert!(settings.tags.is_empty());
    }

    #[test]
    fn plain_string_user_agent_is_kept_as_full_string() {
        let settings: AccountSettings =
            serde_json::from_value(json!({ "user_agent": "Mozilla/5.0 custom" })).unwrap();
        assert_eq!(settings.user_agent.full_string, "Mozilla/5.0 custom");
        assert_eq!(settings.user_agent.chrome, DEFAULT_UA_CHROME);
    }

    #[test]
    fn empty_proxy_id_means_no_proxy() {
        let settings: AccountSettings =
            serde_json::from_value(json!({ "proxy_id": "", "proxy": null })).unwrap();
        assert!(settings.proxy_id.is_none());
    }

    #[test]
    fn account_without_settings_uses_defaults() {
        let account: Account = serde_json::from_value(json!({ "phone": "+1555" })).unwrap();
        assert_eq!(account.settings, AccountSettings::default());
        assert!(account.username.is_none());

        let account: Account =
            serde_json::from_value(json!({ "phone": "+1555", "settings": null })).unwrap();
        assert_eq!(account.settings, AccountSettings::default());
    }

    #[test]
    fn null_profile_fields_and_tags_read_as_empty() {
        let accounts: Vec<Account> = serde_json::from_value(json!([
            {
                "phone": "+1",
                "settings": {
                    "profile": { "first_name": "Ada", "bio": null, "avatar_path": null },
                    "tags": ["vip", null]
                }
            },
            { "phone": "+2" }
        ]))
        .unwrap();
        assert_eq!(accounts.len(), 2);
        let profile = &accounts[0].settings.profile;
        assert_eq!(profile.first_name, "Ada");
        assert_eq!(profile.bio, "");
        assert_eq!(profile.avatar_path, "");
        assert_eq!(accounts[0].settings.tags, vec!["vip".to_string()]);
    }

    #[test]
    fn unmanaged_setting_keys_are_kept() {
        let settings: AccountSettings = serde_json::from_value(json!({
            "profile": { "first_name": "Ada" },
            "system_version": "Windows 10",
            "proxy_id": 4,
            "device_model": "Pixel 7",
            "lang_code": "de"
        }))
        .unwrap();
        assert_eq!(settings.extra.len(), 2);
        assert_eq!(settings.extra["device_model"], json!("Pixel 7"));
        assert_eq!(settings.extra["lang_code"], json!("de"));
        assert!(!settings.extra.contains_key("system_version"));
        assert!(!settings.extra.contains_key("proxy_id"));
    }

    #[test]
    fn proxy_type_is_read_leniently() {
        let proxies: Vec<Proxy> = serde_json::from_value(json!([
            { "id": 1, "type": "HTTPS", "host": "a", "port": 80 },
            { "id": 2, "type": "Socks5", "host": "b", "port": 1080 },
            { "id": 3, "type": "mtproto", "host": "c", "port": 443 }
        ]))
        .unwrap();
        assert_eq!(proxies[0].kind, ProxyKind::Http);
        assert_eq!(proxies[1].kind, ProxyKind::Socks5);
        assert_eq!(proxies[2].kind, ProxyKind::Other("mtproto".into()));
        assert_eq!(serde_json::to_value(&proxies[2]).unwrap()["type"], json!("mtproto"));
        assert!("mtproto".parse::<ProxyKind>().is_err());
    }

    #[test]
    fn proxy_port_accepts_string() {
        let proxy: Proxy = serde_json::from_value(json!({
            "id": "p1", "type": "http", "host": "10.0.0.1", "port": "8080", "user": "u"
        }))
        .unwrap();
        assert_eq!(proxy.port, 8080);
        assert_eq!(proxy.id, RecordId::Text("p1".into()));
        assert_eq!(proxy.label(), "10.0.0.1:8080 (HTTP)");
    }

    #[test]
    fn record_id_matches_textual_forms() {
        assert!(RecordId::Int(7).matches("7"));
        assert!(RecordId::Int(7).matches(" 7 "));
        assert!(!RecordId::Int(7).matches("07x"));
        assert!(RecordId::Text("abc".into()).matches("abc"));
        assert_eq!(RecordId::from("42"), RecordId::Int(42));
    }

    #[test]
    fn generated_user_agent_uses_platform_token() {
        let mac = UserAgent::generate("macOS", "120.0.1");
        assert!(mac.full_string.contains("Macintosh; Intel Mac OS X 10_15_7"));
        assert!(mac.full_string.contains("Chrome/120.0.1"));
        let win = UserAgent::generate("Windows", "120.0.1");
        assert!(win.full_string.contains("Windows NT 10.0; Win64; x64"));
    }

    #[test]
    fn campaign_timestamp_is_read_as_utc() {
        let campaign: Campaign = serde_json::from_value(json!({
            "id": "c1",
            "name": "Spring",
            "audience_file": "leads.json",
            "total_users": 40,
            "created_at": "2024-05-01T10:30:00.123456"
        }))
        .unwrap();
        let ts = campaign.created_at_utc().unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T10:30:00.123456+00:00");
        assert_eq!(campaign.progress_label(), "0/40");
    }

    #[test]
    fn finalize_request_serializes_nulls() {
        let body = serde_json::to_value(FinalizeRequest {
            phone: "+1".into(),
            code: None,
            password: Some("pw".into()),
        })
        .unwrap();
        assert_eq!(body, json!({ "phone": "+1", "code": null, "password": "pw" }));
    }

    #[test]
    fn reply_error_detection() {
        let reply: StatusReply =
            serde_json::from_value(json!({ "status": "error", "message": "nope" })).unwrap();
        assert!(reply.is_error());
        assert_eq!(reply.text(), "nope");
        let tagged: StatusReply =
            serde_json::from_value(json!({ "outcome": "linked", "detail": "done" })).unwrap();
        assert!(!tagged.is_error());
        assert_eq!(tagged.text(), "done");
    }
}
