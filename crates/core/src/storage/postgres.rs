use crate::domain::demand::{normalize_demands, ConfirmedDemand, DemandRecord, DemandRequest};
use crate::domain::price::PriceEntry;
use crate::domain::recommendation::{Recommendation, RecommendationStatus};
use crate::domain::workflow::ApprovalWorkflowEntry;
use crate::storage::{
    DemandSource, PriceSource, RecommendationStore, StoreError, StoreResult, Transition,
};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

const RECOMMENDATION_COLUMNS: &str = "id, company_id, user_id, original_hour, recommended_hour, \
     original_load_kwh, potential_savings_tl, co2_reduction_kg, reason, status, \
     recommendation_date, created_at, approved_at, implemented_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

fn classify(err: sqlx::Error, what: &'static str) -> StoreError {
    if let Some(db) = err.as_database_error() {
        if db.is_unique_violation() || db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::UniqueViolation(format!("{what}: {}", db.message()));
        }
    }
    StoreError::Other(anyhow::Error::new(err).context(what))
}

#[derive(Debug, FromRow)]
struct RecommendationRow {
    id: Uuid,
    company_id: Uuid,
    user_id: Uuid,
    original_hour: String,
    recommended_hour: String,
    original_load_kwh: f64,
    potential_savings_tl: f64,
    co2_reduction_kg: f64,
    reason: String,
    status: String,
    recommendation_date: NaiveDate,
    created_at: DateTime<Utc>,
    approved_at: Option<DateTime<Utc>>,
    implemented_at: Option<DateTime<Utc>>,
}

impl TryFrom<RecommendationRow> for Recommendation {
    type Error = anyhow::Error;

    fn try_from(row: RecommendationRow) -> anyhow::Result<Self> {
        let status = row
            .status
            .parse::<RecommendationStatus>()
            .with_context(|| format!("invalid status in DB for recommendation id={}", row.id))?;
        Ok(Self {
            id: row.id,
            company_id: row.company_id,
            user_id: row.user_id,
            original_hour: row.original_hour,
            recommended_hour: row.recommended_hour,
            original_load_kwh: row.original_load_kwh,
            potential_savings: row.potential_savings_tl,
            co2_reduction_kg: row.co2_reduction_kg,
            reason: row.reason,
            status,
            recommendation_date: row.recommendation_date,
            created_at: row.created_at,
            approved_at: row.approved_at,
            implemented_at: row.implemented_at,
        })
    }
}

fn into_recommendations(rows: Vec<RecommendationRow>) -> StoreResult<Vec<Recommendation>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(Recommendation::try_from(row)?);
    }
    Ok(out)
}

#[derive(Debug, FromRow)]
struct WorkflowRow {
    id: Uuid,
    recommendation_id: Uuid,
    requested_by: Uuid,
    approved_by: Option<Uuid>,
    approval_status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

#[async_trait::async_trait]
impl RecommendationStore for PgStore {
    async fn insert_recommendations(
        &self,
        batch: &[Recommendation],
    ) -> StoreResult<Vec<Recommendation>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let t0 = std::time::Instant::now();
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO demand_shift_recommendations (id, company_id, user_id, original_hour, \
             recommended_hour, original_load_kwh, potential_savings_tl, co2_reduction_kg, reason, \
             status, recommendation_date, created_at, updated_at) ",
        );
        qb.push_values(batch, |mut b, r| {
            b.push_bind(r.id)
                .push_bind(r.company_id)
                .push_bind(r.user_id)
                .push_bind(&r.original_hour)
                .push_bind(&r.recommended_hour)
                .push_bind(r.original_load_kwh)
                .push_bind(r.potential_savings)
                .push_bind(r.co2_reduction_kg)
                .push_bind(&r.reason)
                .push_bind(r.status.as_str())
                .push_bind(r.recommendation_date)
                .push_bind(r.created_at)
                .push_bind(r.created_at);
        });
        qb.push(" RETURNING ");
        qb.push(RECOMMENDATION_COLUMNS);

        // Single statement, so the batch lands or fails as a whole.
        let rows = qb
            .build_query_as::<RecommendationRow>()
            .persistent(false)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(e, "batch insert demand_shift_recommendations failed"))?;

        tracing::debug!(
            batch_size = batch.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "demand_shift_recommendations batch insert"
        );
        into_recommendations(rows)
    }

    async fn recommendations_for_users_on(
        &self,
        user_ids: &[Uuid],
        day: NaiveDate,
    ) -> StoreResult<Vec<Recommendation>> {
        let rows = sqlx::query_as::<_, RecommendationRow>(&format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM demand_shift_recommendations \
             WHERE user_id = ANY($1) AND recommendation_date = $2"
        ))
        .bind(user_ids)
        .bind(day)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify(e, "select daily demand_shift_recommendations failed"))?;
        into_recommendations(rows)
    }

    async fn recommendations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Recommendation>> {
        let rows = sqlx::query_as::<_, RecommendationRow>(&format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM demand_shift_recommendations \
             WHERE user_id = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify(e, "select user demand_shift_recommendations failed"))?;
        into_recommendations(rows)
    }

    async fn recommendations_for_company(
        &self,
        company_id: Uuid,
    ) -> StoreResult<Vec<Recommendation>> {
        let rows = sqlx::query_as::<_, RecommendationRow>(&format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM demand_shift_recommendations \
             WHERE company_id = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify(e, "select company demand_shift_recommendations failed"))?;
        into_recommendations(rows)
    }

    async fn recommendation(&self, id: Uuid) -> StoreResult<Option<Recommendation>> {
        let row = sqlx::query_as::<_, RecommendationRow>(&format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM demand_shift_recommendations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify(e, "select demand_shift_recommendation failed"))?;

        match row {
            Some(row) => Ok(Some(Recommendation::try_from(row)?)),
            None => Ok(None),
        }
    }

    async fn apply_transition(
        &self,
        transition: &Transition,
    ) -> StoreResult<Option<Recommendation>> {
        let (approved_at, implemented_at) = match transition.to {
            RecommendationStatus::Implemented => (None, Some(transition.at)),
            _ => (Some(transition.at), None),
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify(e, "begin transaction failed"))?;

        let row = sqlx::query_as::<_, RecommendationRow>(&format!(
            "UPDATE demand_shift_recommendations \
             SET status = $1, \
                 approved_at = COALESCE($2, approved_at), \
                 implemented_at = COALESCE($3, implemented_at), \
                 updated_at = $4 \
             WHERE id = $5 AND status = $6 \
             RETURNING {RECOMMENDATION_COLUMNS}"
        ))
        .bind(transition.to.as_str())
        .bind(approved_at)
        .bind(implemented_at)
        .bind(transition.at)
        .bind(transition.recommendation_id)
        .bind(transition.from.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| classify(e, "update demand_shift_recommendations status failed"))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| classify(e, "rollback transaction failed"))?;
            return Ok(None);
        };

        let entry = &transition.entry;
        sqlx::query(
            "INSERT INTO approval_workflow (id, recommendation_id, requested_by, approved_by, \
             approval_status, notes, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.id)
        .bind(entry.recommendation_id)
        .bind(entry.requested_by)
        .bind(entry.approved_by)
        .bind(entry.approval_status.as_str())
        .bind(&entry.notes)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify(e, "insert approval_workflow failed"))?;

        tx.commit()
            .await
            .map_err(|e| classify(e, "commit transaction failed"))?;

        Ok(Some(Recommendation::try_from(row)?))
    }

    async fn workflow_history(
        &self,
        recommendation_id: Uuid,
    ) -> StoreResult<Vec<ApprovalWorkflowEntry>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(
            "SELECT id, recommendation_id, requested_by, approved_by, approval_status, notes, created_at \
             FROM approval_workflow \
             WHERE recommendation_id = $1 \
             ORDER BY created_at DESC",
        )
        .bind(recommendation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify(e, "select approval_workflow failed"))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let approval_status = row
                .approval_status
                .parse::<RecommendationStatus>()
                .with_context(|| format!("invalid approval_status in DB for workflow id={}", row.id))?;
            out.push(ApprovalWorkflowEntry {
                id: row.id,
                recommendation_id: row.recommendation_id,
                requested_by: row.requested_by,
                approved_by: row.approved_by,
                approval_status,
                notes: row.notes,
                created_at: row.created_at,
            });
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl DemandSource for PgStore {
    async fn list_demands(&self, user_id: Uuid) -> anyhow::Result<Vec<DemandRecord>> {
        let confirmed = sqlx::query_as::<
            _,
            (Uuid, Uuid, Uuid, String, f64, f64, NaiveDate, String, Option<String>),
        >(
            "SELECT id, company_id, user_id, hour_slot, demand_kwh, cost_tl, demand_date, status, notes \
             FROM electricity_demands \
             WHERE user_id = $1 \
             ORDER BY hour_slot",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("select electricity_demands failed")?;

        let mut confirmed_out = Vec::with_capacity(confirmed.len());
        for (id, company_id, user_id, hour_slot, demand_kwh, cost, demand_date, status, notes) in
            confirmed
        {
            confirmed_out.push(ConfirmedDemand {
                id,
                company_id,
                user_id,
                hour_slot,
                demand_kwh,
                cost,
                demand_date,
                status: status.parse()?,
                notes,
            });
        }

        if !confirmed_out.is_empty() {
            return Ok(normalize_demands(confirmed_out, Vec::new()));
        }

        let requested = sqlx::query_as::<
            _,
            (
                Uuid,
                Uuid,
                Uuid,
                String,
                String,
                String,
                f64,
                NaiveDate,
                String,
                Option<String>,
            ),
        >(
            "SELECT id, company_id, user_id, company_name, company_code, hour_slot, demand_kwh, \
             request_date, status, notes \
             FROM demand_requests \
             WHERE user_id = $1 \
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("select demand_requests failed")?;

        let mut requested_out = Vec::with_capacity(requested.len());
        for (
            id,
            company_id,
            user_id,
            company_name,
            company_code,
            hour_slot,
            demand_kwh,
            request_date,
            status,
            notes,
        ) in requested
        {
            requested_out.push(DemandRequest {
                id,
                company_id,
                user_id,
                company_name,
                company_code,
                hour_slot,
                demand_kwh,
                request_date,
                status: status.parse()?,
                notes,
            });
        }

        tracing::debug!(%user_id, requested = requested_out.len(), "no confirmed demands; using demand requests");
        Ok(normalize_demands(Vec::new(), requested_out))
    }
}

#[async_trait::async_trait]
impl PriceSource for PgStore {
    async fn current_prices(&self, day: NaiveDate) -> anyhow::Result<Vec<PriceEntry>> {
        let rows = sqlx::query_as::<_, (String, f64, String, NaiveDate)>(
            "SELECT hour_range, unit_price_tl, period_type, effective_date \
             FROM electricity_prices \
             WHERE effective_date = $1 \
             ORDER BY hour_range",
        )
        .bind(day)
        .fetch_all(&self.pool)
        .await
        .context("select electricity_prices failed")?;

        let mut out = Vec::with_capacity(rows.len());
        for (hour_range, unit_price, period_type, effective_date) in rows {
            out.push(PriceEntry {
                hour_range,
                unit_price,
                period_type: period_type.parse()?,
                effective_date,
            });
        }
        Ok(out)
    }
}
