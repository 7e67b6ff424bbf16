use crate::config::Settings;
use crate::rewards::RewardsClient;
use anyhow::Context;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const ACTION_TYPE_DEMAND_SHIFT: &str = "demand_shift";

#[derive(Debug, Clone)]
pub struct HttpRewardsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct AwardShiftPointsRequest {
    user_id: Uuid,
    action_type: &'static str,
    savings: f64,
}

impl HttpRewardsClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings.require_rewards_base_url()?.to_string();
        let timeout_secs = std::env::var("REWARDS_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            base_url,
            api_key: settings.rewards_api_key.clone(),
        })
    }

    fn award_url(&self) -> String {
        format!("{}/v1/points/demand-shift", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl RewardsClient for HttpRewardsClient {
    async fn award_shift_points(&self, user_id: Uuid, savings: f64) -> anyhow::Result<()> {
        let mut req = self.http.post(self.award_url()).json(&AwardShiftPointsRequest {
            user_id,
            action_type: ACTION_TYPE_DEMAND_SHIFT,
            savings,
        });
        if let Some(key) = self.api_key.as_deref() {
            req = req.bearer_auth(key);
        }

        let res = req.send().await.context("rewards request failed")?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("rewards service returned status={status}: {body}");
        }

        tracing::debug!(%user_id, savings, "awarded demand shift points");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base_url: &str) -> Settings {
        Settings {
            database_url: None,
            sentry_dsn: None,
            rewards_base_url: Some(base_url.to_string()),
            rewards_api_key: None,
        }
    }

    #[test]
    fn award_url_trims_trailing_slash() {
        let client = HttpRewardsClient::from_settings(&settings("https://rewards.local/")).unwrap();
        assert_eq!(client.award_url(), "https://rewards.local/v1/points/demand-shift");
    }

    #[test]
    fn request_body_names_the_action() {
        let body = serde_json::to_value(AwardShiftPointsRequest {
            user_id: Uuid::nil(),
            action_type: ACTION_TYPE_DEMAND_SHIFT,
            savings: 12.5,
        })
        .unwrap();
        assert_eq!(body["action_type"], "demand_shift");
        assert_eq!(body["savings"], 12.5);
    }
}
