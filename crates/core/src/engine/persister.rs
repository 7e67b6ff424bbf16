use crate::domain::recommendation::{CandidateRecommendation, Recommendation};
use crate::engine::error::EngineError;
use crate::storage::{RecommendationStore, StoreError};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Loads closer than this (kWh) count as the same recommendation.
pub const LOAD_TOLERANCE_KWH: f64 = 0.01;

struct ShiftKey<'a> {
    company_id: Uuid,
    user_id: Uuid,
    original_hour: &'a str,
    recommended_hour: &'a str,
    load_kwh: f64,
}

impl ShiftKey<'_> {
    fn matches(&self, other: &ShiftKey<'_>) -> bool {
        self.company_id == other.company_id
            && self.user_id == other.user_id
            && self.original_hour == other.original_hour
            && self.recommended_hour == other.recommended_hour
            && (self.load_kwh - other.load_kwh).abs() < LOAD_TOLERANCE_KWH
    }
}

impl<'a> From<&'a Recommendation> for ShiftKey<'a> {
    fn from(r: &'a Recommendation) -> Self {
        Self {
            company_id: r.company_id,
            user_id: r.user_id,
            original_hour: &r.original_hour,
            recommended_hour: &r.recommended_hour,
            load_kwh: r.original_load_kwh,
        }
    }
}

impl<'a> From<&'a CandidateRecommendation> for ShiftKey<'a> {
    fn from(c: &'a CandidateRecommendation) -> Self {
        Self {
            company_id: c.company_id,
            user_id: c.user_id,
            original_hour: &c.original_hour,
            recommended_hour: &c.recommended_hour,
            load_kwh: c.original_load_kwh,
        }
    }
}

/// Writes candidates that have no equivalent persisted recommendation for the same UTC day.
///
/// A uniqueness violation from the store means a concurrent run already wrote these rows;
/// that is reported as zero new recommendations rather than an error.
pub async fn persist(
    store: &dyn RecommendationStore,
    candidates: Vec<CandidateRecommendation>,
    now: DateTime<Utc>,
) -> Result<Vec<Recommendation>, EngineError> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let day = now.date_naive();
    let user_ids: Vec<_> = candidates
        .iter()
        .map(|c| c.user_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let fresh = match store.recommendations_for_users_on(&user_ids, day).await {
        Ok(existing) => drop_duplicates(&existing, candidates),
        Err(e) => {
            tracing::warn!(
                %day,
                users = user_ids.len(),
                error = %e,
                "duplicate pre-check failed; attempting unchecked insert"
            );
            drop_duplicates(&[], candidates)
        }
    };

    if fresh.is_empty() {
        tracing::debug!(%day, "all shift candidates already persisted today");
        return Ok(Vec::new());
    }

    let batch: Vec<Recommendation> = fresh
        .into_iter()
        .map(|c| Recommendation::pending_from_candidate(c, now))
        .collect();

    match store.insert_recommendations(&batch).await {
        Ok(inserted) => {
            tracing::info!(%day, inserted = inserted.len(), "persisted shift recommendations");
            Ok(inserted)
        }
        Err(StoreError::UniqueViolation(detail)) => {
            tracing::info!(%day, %detail, "concurrent run already persisted these recommendations");
            Ok(Vec::new())
        }
        Err(StoreError::Other(e)) => Err(EngineError::Storage(e)),
    }
}

/// Keeps candidates that match neither an already persisted row nor an
/// earlier candidate of the same batch.
fn drop_duplicates(
    existing: &[Recommendation],
    candidates: Vec<CandidateRecommendation>,
) -> Vec<CandidateRecommendation> {
    let mut kept: Vec<CandidateRecommendation> = Vec::with_capacity(candidates.len());
    for c in candidates {
        let key = ShiftKey::from(&c);
        let persisted = existing.iter().any(|e| ShiftKey::from(e).matches(&key));
        let repeated = kept.iter().any(|k| ShiftKey::from(k).matches(&key));
        if !persisted && !repeated {
            kept.push(c);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap()
    }

    fn candidate(company_id: Uuid, user_id: Uuid, original: &str, load: f64) -> CandidateRecommendation {
        CandidateRecommendation {
            company_id,
            user_id,
            original_hour: original.to_string(),
            recommended_hour: "02:00-03:00".to_string(),
            original_load_kwh: load,
            potential_savings: 85.0,
            co2_reduction_kg: load * 0.5,
            reason: "test".to_string(),
        }
    }

    fn batch() -> Vec<CandidateRecommendation> {
        let company = Uuid::new_v4();
        let user = Uuid::new_v4();
        vec![
            candidate(company, user, "08:00-09:00", 100.0),
            candidate(company, user, "18:00-19:00", 40.0),
        ]
    }

    #[tokio::test]
    async fn second_identical_run_persists_nothing() {
        let store = MemoryStore::new();
        let candidates = batch();

        let first = persist(&store, candidates.clone(), now()).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|r| r.recommendation_date == now().date_naive()));

        let second = persist(&store, candidates, now() + Duration::hours(2)).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.recommendation_count(), 2);
    }

    #[tokio::test]
    async fn load_within_tolerance_is_a_duplicate() {
        let store = MemoryStore::new();
        let mut candidates = batch();
        persist(&store, candidates.clone(), now()).await.unwrap();

        candidates[0].original_load_kwh += 0.005;
        candidates[1].original_load_kwh += 0.5;
        let out = persist(&store, candidates, now()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].original_hour, "18:00-19:00");
    }

    #[tokio::test]
    async fn next_day_is_a_new_window() {
        let store = MemoryStore::new();
        let candidates = batch();
        persist(&store, candidates.clone(), now()).await.unwrap();

        let tomorrow = persist(&store, candidates, now() + Duration::days(1)).await.unwrap();
        assert_eq!(tomorrow.len(), 2);
    }

    #[tokio::test]
    async fn repeated_candidates_in_one_batch_are_written_once() {
        let store = MemoryStore::new();
        let mut candidates = batch();
        candidates.push(candidates[0].clone());

        let out = persist(&store, candidates, now()).await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn unique_violation_race_yields_empty_result() {
        let store = MemoryStore::new();
        let candidates = batch();
        persist(&store, candidates.clone(), now()).await.unwrap();

        // The loser's pre-check did not see the winner's rows.
        store.blind_day_reads(true);
        let out = persist(&store, candidates, now()).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(store.recommendation_count(), 2);
    }

    #[tokio::test]
    async fn failed_pre_check_falls_back_to_unchecked_insert() {
        let store = MemoryStore::new();
        store.fail_day_reads(true);

        let candidates = batch();
        let first = persist(&store, candidates.clone(), now()).await.unwrap();
        assert_eq!(first.len(), 2);

        let second = persist(&store, candidates, now()).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.recommendation_count(), 2);
    }

    #[tokio::test]
    async fn failed_pre_check_still_collapses_repeats_in_batch() {
        let store = MemoryStore::new();
        store.fail_day_reads(true);

        let (company, user) = (Uuid::new_v4(), Uuid::new_v4());
        let repeated = candidate(company, user, "08:00-09:00", 100.0);
        let other = candidate(company, user, "18:00-19:00", 40.0);
        let stored = persist(&store, vec![repeated.clone(), repeated, other], now())
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(store.recommendation_count(), 2);
    }

    #[tokio::test]
    async fn back_to_back_runs_write_each_row_once() {
        let store = MemoryStore::new();
        let candidates = batch();

        let first = persist(&store, candidates.clone(), now()).await.unwrap();
        let second = persist(&store, candidates, now()).await.unwrap();
        assert_eq!(first.len() + second.len(), 2);
        assert_eq!(store.recommendation_count(), 2);
    }

    #[tokio::test]
    async fn empty_batch_does_not_touch_storage() {
        let store = MemoryStore::new();
        store.fail_day_reads(true);
        assert!(persist(&store, Vec::new(), now()).await.unwrap().is_empty());
    }
}
