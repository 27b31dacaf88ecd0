mod client;
mod types;

pub use client::{ApiError, ApiResult, EchoApiClient};
pub use types::{
    Account, AccountSettings, AudienceMember, Campaign, FinalizeRequest, InvalidProxyKind,
    NewCampaign, NewProxy, Profile, Proxy, ProxyKind, RecordId, ReplyOutcome, SettingsPayload,
    StatusReply, UserAgent, DEFAULT_UA_CHROME, DEFAULT_UA_OS,
};
