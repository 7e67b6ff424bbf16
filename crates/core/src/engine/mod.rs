use crate::domain::recommendation::{CandidateRecommendation, Recommendation};
use crate::domain::workflow::ApprovalWorkflowEntry;
use crate::rewards::RewardsClient;
use crate::storage::{DemandSource, PriceSource, RecommendationStore};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub mod approval;
pub mod error;
pub mod generator;
pub mod persister;
pub mod slot;
pub mod stats;

pub use approval::Decision;
pub use error::EngineError;
pub use stats::RecommendationStats;

const DEFAULT_CO2_KG_PER_KWH: f64 = 0.5;
const DEFAULT_MIN_SAVINGS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Flat grid emissions factor; not hour dependent.
    pub co2_kg_per_kwh: f64,

    /// Candidates must save strictly more than this (currency units).
    pub min_savings: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            co2_kg_per_kwh: DEFAULT_CO2_KG_PER_KWH,
            min_savings: DEFAULT_MIN_SAVINGS,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("SHIFT_CO2_KG_PER_KWH") {
            if let Ok(v) = s.parse::<f64>() {
                out.co2_kg_per_kwh = v;
            }
        }

        if let Ok(s) = std::env::var("SHIFT_MIN_SAVINGS") {
            if let Ok(v) = s.parse::<f64>() {
                out.min_savings = v;
            }
        }

        out
    }
}

/// Wires the pure pipeline to its collaborators.
#[derive(Clone)]
pub struct ShiftEngine {
    store: Arc<dyn RecommendationStore>,
    demands: Arc<dyn DemandSource>,
    prices: Arc<dyn PriceSource>,
    rewards: Arc<dyn RewardsClient>,
    config: EngineConfig,
}

impl fmt::Debug for ShiftEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShiftEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ShiftEngine {
    pub fn new(
        store: Arc<dyn RecommendationStore>,
        demands: Arc<dyn DemandSource>,
        prices: Arc<dyn PriceSource>,
        rewards: Arc<dyn RewardsClient>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            demands,
            prices,
            rewards,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Generates candidates for `user_id` against today's (UTC) price table without writing.
    pub async fn preview_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<CandidateRecommendation>, EngineError> {
        let day = now.date_naive();
        let prices = self
            .prices
            .current_prices(day)
            .await
            .map_err(EngineError::Storage)?;
        if prices.is_empty() {
            return Err(EngineError::NoPriceData);
        }

        let demands = self
            .demands
            .list_demands(user_id)
            .await
            .map_err(EngineError::Storage)?;

        let candidates = generator::generate(&demands, &prices, &self.config);
        tracing::info!(
            %user_id,
            %day,
            prices = prices.len(),
            demands = demands.len(),
            candidates = candidates.len(),
            "demand shift candidates generated"
        );
        Ok(candidates)
    }

    /// Generates and persists; returns only rows written by this call.
    pub async fn run_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Recommendation>, EngineError> {
        let candidates = self.preview_for_user(user_id, now).await?;
        persister::persist(self.store.as_ref(), candidates, now).await
    }

    pub async fn decide(
        &self,
        recommendation_id: Uuid,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<Recommendation, EngineError> {
        approval::decide(
            self.store.as_ref(),
            self.rewards.as_ref(),
            recommendation_id,
            decision,
            now,
        )
        .await
    }

    pub async fn mark_implemented(
        &self,
        recommendation_id: Uuid,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Recommendation, EngineError> {
        approval::mark_implemented(self.store.as_ref(), recommendation_id, notes, now).await
    }

    pub async fn workflow_history(
        &self,
        recommendation_id: Uuid,
    ) -> Result<Vec<ApprovalWorkflowEntry>, EngineError> {
        approval::workflow_history(self.store.as_ref(), recommendation_id).await
    }

    pub async fn stats(&self, company_id: Uuid) -> Result<RecommendationStats, EngineError> {
        let rows = self.store.recommendations_for_company(company_id).await?;
        Ok(stats::summarize(&rows))
    }

    pub async fn company_recommendations(
        &self,
        company_id: Uuid,
    ) -> Result<Vec<Recommendation>, EngineError> {
        Ok(self.store.recommendations_for_company(company_id).await?)
    }

    /// All of the user's recommendations, or only those generated on `today`'s UTC date.
    pub async fn user_recommendations(
        &self,
        user_id: Uuid,
        today: Option<DateTime<Utc>>,
    ) -> Result<Vec<Recommendation>, EngineError> {
        let rows = self.store.recommendations_for_user(user_id).await?;
        Ok(match today {
            Some(now) => {
                let day = now.date_naive();
                rows.into_iter()
                    .filter(|r| r.recommendation_date == day)
                    .collect()
            }
            None => rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::demand::{DemandRecord, DemandStatus};
    use crate::domain::price::{PeriodType, PriceEntry};
    use crate::domain::recommendation::RecommendationStatus;
    use crate::rewards::NoopRewards;
    use crate::storage::memory::MemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 7, 45, 0).unwrap()
    }

    fn price(range: &str, unit_price: f64, period_type: PeriodType) -> PriceEntry {
        PriceEntry {
            hour_range: range.to_string(),
            unit_price,
            period_type,
            effective_date: now().date_naive(),
        }
    }

    fn engine(store: Arc<MemoryStore>) -> ShiftEngine {
        ShiftEngine::new(
            store.clone(),
            store.clone(),
            store,
            Arc::new(NoopRewards),
            EngineConfig::default(),
        )
    }

    fn seed(store: &MemoryStore, company_id: Uuid, user_id: Uuid) {
        store.set_prices(vec![
            price("08:00-09:00", 2.10, PeriodType::Peak),
            price("02:00-03:00", 1.25, PeriodType::OffPeak),
        ]);
        store.add_demands(
            user_id,
            vec![DemandRecord {
                id: Uuid::new_v4(),
                company_id,
                user_id,
                hour_slot: "08:00-09:00".to_string(),
                quantity_kwh: 100.0,
                date: now().date_naive(),
                status: DemandStatus::Approved,
            }],
        );
    }

    #[tokio::test]
    async fn identical_runs_on_one_day_persist_one_row() {
        let store = Arc::new(MemoryStore::new());
        let (company_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());
        seed(&store, company_id, user_id);
        let engine = engine(store.clone());

        let first = engine.run_for_user(user_id, now()).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, RecommendationStatus::Pending);
        assert_eq!(first[0].recommended_hour, "02:00-03:00");

        let second = engine.run_for_user(user_id, now()).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.recommendation_count(), 1);

        let todays = engine.user_recommendations(user_id, Some(now())).await.unwrap();
        assert_eq!(todays.len(), 1);
    }

    #[tokio::test]
    async fn stats_match_company_rows() {
        let store = Arc::new(MemoryStore::new());
        let (company_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());
        seed(&store, company_id, user_id);
        let engine = engine(store.clone());

        let rows = engine.run_for_user(user_id, now()).await.unwrap();
        engine
            .decide(
                rows[0].id,
                Decision {
                    approved: true,
                    notes: None,
                    decided_by: None,
                },
                now(),
            )
            .await
            .unwrap();

        let direct = engine.company_recommendations(company_id).await.unwrap();
        let stats = engine.stats(company_id).await.unwrap();
        let direct_savings: f64 = direct.iter().map(|r| r.potential_savings).sum();
        assert_eq!(stats.total, direct.len());
        assert_eq!(stats.approved, 1);
        assert!((stats.total_savings - direct_savings).abs() < 1e-9);

        let empty = engine.stats(Uuid::new_v4()).await.unwrap();
        assert_eq!(empty, RecommendationStats::default());
    }

    #[tokio::test]
    async fn missing_price_table_is_surfaced() {
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();
        let engine = engine(store);
        let err = engine.run_for_user(user_id, now()).await.unwrap_err();
        assert!(matches!(err, EngineError::NoPriceData));
    }

    #[tokio::test]
    async fn user_without_demands_gets_nothing() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, Uuid::new_v4(), Uuid::new_v4());
        let engine = engine(store);
        let out = engine.run_for_user(Uuid::new_v4(), now()).await.unwrap();
        assert!(out.is_empty());
    }
}
