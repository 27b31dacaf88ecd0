use std::future::Future;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::api::{
    ApiError, ApiResult, Campaign, EchoApiClient, NewCampaign, RecordId, StatusReply,
};

#[derive(Debug, Clone)]
pub struct CampaignService {
    client: EchoApiClient,
}

impl CampaignService {
    pub fn new(client: EchoApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> ApiResult<Vec<Campaign>> {
        self.client.list_campaigns().await
    }

    pub async fn start(&self, campaign: NewCampaign) -> ApiResult<StatusReply> {
        let missing_field = [&campaign.name, &campaign.audience_file, &campaign.message]
            .iter()
            .any(|value| value.trim().is_empty());
        if missing_field || campaign.account_phones.is_empty() {
            return Err(ApiError::InvalidInput(
                "name, audience, message and at least one account are required".into(),
            ));
        }
        let reply = self.client.start_campaign(&campaign).await?;
        info!(
            name = %campaign.name,
            accounts = campaign.account_phones.len(),
            "campaign queued"
        );
        Ok(reply)
    }

    pub async fn delete(&self, id: &str) -> ApiResult<StatusReply> {
        self.client.delete_campaign(&RecordId::from(id)).await
    }

    /// Re-fetch the campaign list every `every` until `cancel` resolves.
    ///
    /// Each poll is awaited before the next tick is considered, so a slow
    /// backend stretches the interval; ticks missed meanwhile are dropped.
    /// Failed polls are handed to `on_update` and polling carries on.
    pub async fn watch<F, C>(&self, every: Duration, mut on_update: F, cancel: C)
    where
        F: FnMut(ApiResult<Vec<Campaign>>),
        C: Future<Output = ()>,
    {
        let mut ticker = time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(cancel);

        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => {
                    debug!("campaign polling stopped");
                    return;
                }
                _ = ticker.tick() => {
                    on_update(self.list().await);
                }
            }
        }
    }
}
