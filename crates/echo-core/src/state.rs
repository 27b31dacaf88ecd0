use crate::api::AudienceMember;
use crate::services::SettingsForm;

/// Working state of one console session: the account being edited and the
/// last scraped audience waiting to be saved.
#[derive(Debug, Default)]
pub struct ConsoleState {
    editing: Option<SettingsForm>,
    scraped: Vec<AudienceMember>,
}

impl ConsoleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start editing `form`, handing back whatever was open before.
    pub fn open_account(&mut self, form: SettingsForm) -> Option<SettingsForm> {
        self.editing.replace(form)
    }

    pub fn editing(&self) -> Option<&SettingsForm> {
        self.editing.as_ref()
    }

    pub fn editing_mut(&mut self) -> Option<&mut SettingsForm> {
        self.editing.as_mut()
    }

    pub fn close_account(&mut self) -> Option<SettingsForm> {
        self.editing.take()
    }

    /// Replace the pending audience with a fresh scrape.
    pub fn stash_audience(&mut self, users: Vec<AudienceMember>) {
        self.scraped = users;
    }

    pub fn scraped(&self) -> &[AudienceMember] {
        &self.scraped
    }

    pub fn take_audience(&mut self) -> Vec<AudienceMember> {
        std::mem::take(&mut self.scraped)
    }
}
