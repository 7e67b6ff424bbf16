use crate::config::Settings;
use std::sync::Arc;
use uuid::Uuid;

pub mod http;

/// Points accrual lives in a separate service; the engine only reports approved shifts.
#[async_trait::async_trait]
pub trait RewardsClient: Send + Sync {
    async fn award_shift_points(&self, user_id: Uuid, savings: f64) -> anyhow::Result<()>;
}

/// Used when no rewards service is configured.
#[derive(Debug, Clone, Default)]
pub struct NoopRewards;

#[async_trait::async_trait]
impl RewardsClient for NoopRewards {
    async fn award_shift_points(&self, user_id: Uuid, savings: f64) -> anyhow::Result<()> {
        tracing::debug!(%user_id, savings, "rewards service not configured; skipping award");
        Ok(())
    }
}

pub fn from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn RewardsClient>> {
    if settings.rewards_base_url.is_none() {
        return Ok(Arc::new(NoopRewards));
    }
    Ok(Arc::new(http::HttpRewardsClient::from_settings(settings)?))
}
