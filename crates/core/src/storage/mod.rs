use crate::domain::demand::DemandRecord;
use crate::domain::price::PriceEntry;
use crate::domain::recommendation::{Recommendation, RecommendationStatus};
use crate::domain::workflow::ApprovalWorkflowEntry;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

#[derive(Debug)]
pub enum StoreError {
    /// The write collided with the recommendation uniqueness index.
    UniqueViolation(String),
    Other(anyhow::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UniqueViolation(detail) => write!(f, "unique constraint violation: {detail}"),
            Self::Other(err) => write!(f, "{err:#}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A guarded status change plus the audit row that records it.
#[derive(Debug, Clone)]
pub struct Transition {
    pub recommendation_id: Uuid,
    pub from: RecommendationStatus,
    pub to: RecommendationStatus,
    pub at: DateTime<Utc>,
    pub entry: ApprovalWorkflowEntry,
}

#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Inserts the whole batch or nothing.
    async fn insert_recommendations(
        &self,
        batch: &[Recommendation],
    ) -> StoreResult<Vec<Recommendation>>;

    async fn recommendations_for_users_on(
        &self,
        user_ids: &[Uuid],
        day: NaiveDate,
    ) -> StoreResult<Vec<Recommendation>>;

    /// Newest first.
    async fn recommendations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Recommendation>>;

    /// Newest first.
    async fn recommendations_for_company(
        &self,
        company_id: Uuid,
    ) -> StoreResult<Vec<Recommendation>>;

    async fn recommendation(&self, id: Uuid) -> StoreResult<Option<Recommendation>>;

    /// Applies the status change only if the row is still in `transition.from`, appending the
    /// workflow entry in the same unit of work. Returns `None` when no row matched.
    async fn apply_transition(&self, transition: &Transition)
        -> StoreResult<Option<Recommendation>>;

    /// Newest first.
    async fn workflow_history(
        &self,
        recommendation_id: Uuid,
    ) -> StoreResult<Vec<ApprovalWorkflowEntry>>;
}

#[async_trait::async_trait]
pub trait DemandSource: Send + Sync {
    async fn list_demands(&self, user_id: Uuid) -> anyhow::Result<Vec<DemandRecord>>;
}

#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    async fn current_prices(&self, day: NaiveDate) -> anyhow::Result<Vec<PriceEntry>>;
}

/// Key shared by the duplicate pre-check and the uniqueness index: load is compared in
/// hundredths of a kWh.
pub(crate) fn load_key(load_kwh: f64) -> i64 {
    (load_kwh * 100.0).round() as i64
}
