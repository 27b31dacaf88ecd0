pub mod audiences;
pub mod campaigns;
pub mod proxies;
pub mod settings;
pub mod tags;

pub use audiences::AudienceService;
pub use campaigns::CampaignService;
pub use proxies::ProxyService;
pub use settings::{SettingsForm, SettingsSync, TagChoice};
pub use tags::TagService;
