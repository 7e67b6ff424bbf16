use crate::domain::demand::DemandRecord;
use crate::domain::price::PriceEntry;
use crate::domain::recommendation::{Recommendation, RecommendationStatus};
use crate::domain::workflow::ApprovalWorkflowEntry;
use crate::storage::{
    load_key, DemandSource, PriceSource, RecommendationStore, StoreError, StoreResult, Transition,
};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

type UniqueKey = (Uuid, Uuid, String, String, i64, NaiveDate);

/// Process-local store with the same uniqueness rules as the Postgres schema.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    recommendations: Vec<Recommendation>,
    workflow: Vec<ApprovalWorkflowEntry>,
    demands: HashMap<Uuid, Vec<DemandRecord>>,
    prices: Vec<PriceEntry>,
    fail_day_reads: bool,
    blind_day_reads: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_demands(&self, user_id: Uuid, demands: Vec<DemandRecord>) {
        self.lock().demands.entry(user_id).or_default().extend(demands);
    }

    pub fn set_prices(&self, prices: Vec<PriceEntry>) {
        self.lock().prices = prices;
    }

    /// Makes the per-day duplicate lookup fail, as a flaky remote read would.
    pub fn fail_day_reads(&self, fail: bool) {
        self.lock().fail_day_reads = fail;
    }

    /// Makes the per-day duplicate lookup return nothing, as a reader racing a concurrent
    /// writer would see.
    pub fn blind_day_reads(&self, blind: bool) {
        self.lock().blind_day_reads = blind;
    }

    pub fn recommendation_count(&self) -> usize {
        self.lock().recommendations.len()
    }

    pub fn workflow_count(&self) -> usize {
        self.lock().workflow.len()
    }
}

fn unique_key(r: &Recommendation) -> UniqueKey {
    (
        r.company_id,
        r.user_id,
        r.original_hour.clone(),
        r.recommended_hour.clone(),
        load_key(r.original_load_kwh),
        r.recommendation_date,
    )
}

fn newest_first(mut rows: Vec<Recommendation>) -> Vec<Recommendation> {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows
}

#[async_trait::async_trait]
impl RecommendationStore for MemoryStore {
    async fn insert_recommendations(
        &self,
        batch: &[Recommendation],
    ) -> StoreResult<Vec<Recommendation>> {
        let mut inner = self.lock();
        let mut seen: HashSet<UniqueKey> = inner.recommendations.iter().map(unique_key).collect();
        for r in batch {
            if !seen.insert(unique_key(r)) {
                return Err(StoreError::UniqueViolation(format!(
                    "user_id={} original_hour={} recommended_hour={}",
                    r.user_id, r.original_hour, r.recommended_hour
                )));
            }
        }
        inner.recommendations.extend(batch.iter().cloned());
        Ok(batch.to_vec())
    }

    async fn recommendations_for_users_on(
        &self,
        user_ids: &[Uuid],
        day: NaiveDate,
    ) -> StoreResult<Vec<Recommendation>> {
        let inner = self.lock();
        if inner.fail_day_reads {
            return Err(StoreError::Other(anyhow::anyhow!(
                "simulated read failure for demand_shift_recommendations"
            )));
        }
        if inner.blind_day_reads {
            return Ok(Vec::new());
        }
        Ok(inner
            .recommendations
            .iter()
            .filter(|r| r.recommendation_date == day && user_ids.contains(&r.user_id))
            .cloned()
            .collect())
    }

    async fn recommendations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Recommendation>> {
        let rows = self
            .lock()
            .recommendations
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows))
    }

    async fn recommendations_for_company(
        &self,
        company_id: Uuid,
    ) -> StoreResult<Vec<Recommendation>> {
        let rows = self
            .lock()
            .recommendations
            .iter()
            .filter(|r| r.company_id == company_id)
            .cloned()
            .collect();
        Ok(newest_first(rows))
    }

    async fn recommendation(&self, id: Uuid) -> StoreResult<Option<Recommendation>> {
        Ok(self
            .lock()
            .recommendations
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn apply_transition(
        &self,
        transition: &Transition,
    ) -> StoreResult<Option<Recommendation>> {
        let mut inner = self.lock();
        let Some(row) = inner
            .recommendations
            .iter_mut()
            .find(|r| r.id == transition.recommendation_id && r.status == transition.from)
        else {
            return Ok(None);
        };

        row.status = transition.to;
        match transition.to {
            RecommendationStatus::Implemented => row.implemented_at = Some(transition.at),
            _ => row.approved_at = Some(transition.at),
        }
        let updated = row.clone();
        inner.workflow.push(transition.entry.clone());
        Ok(Some(updated))
    }

    async fn workflow_history(
        &self,
        recommendation_id: Uuid,
    ) -> StoreResult<Vec<ApprovalWorkflowEntry>> {
        let mut rows: Vec<_> = self
            .lock()
            .workflow
            .iter()
            .filter(|e| e.recommendation_id == recommendation_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl DemandSource for MemoryStore {
    async fn list_demands(&self, user_id: Uuid) -> anyhow::Result<Vec<DemandRecord>> {
        Ok(self.lock().demands.get(&user_id).cloned().unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl PriceSource for MemoryStore {
    async fn current_prices(&self, day: NaiveDate) -> anyhow::Result<Vec<PriceEntry>> {
        Ok(self
            .lock()
            .prices
            .iter()
            .filter(|p| p.effective_date == day)
            .cloned()
            .collect())
    }
}
