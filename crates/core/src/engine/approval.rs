use crate::domain::recommendation::{Recommendation, RecommendationStatus};
use crate::domain::workflow::ApprovalWorkflowEntry;
use crate::engine::error::EngineError;
use crate::rewards::RewardsClient;
use crate::storage::{RecommendationStore, Transition};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct Decision {
    pub approved: bool,
    #[serde(default)]
    pub notes: Option<String>,
    /// Who made the call; recorded as `approved_by` on the workflow entry.
    #[serde(default)]
    pub decided_by: Option<Uuid>,
}

/// Approves or rejects a pending recommendation.
///
/// Deciding on a recommendation that already left `pending` changes nothing and returns it
/// as stored. Approval triggers a best-effort points award; its failure is only logged.
pub async fn decide(
    store: &dyn RecommendationStore,
    rewards: &dyn RewardsClient,
    recommendation_id: Uuid,
    decision: Decision,
    now: DateTime<Utc>,
) -> Result<Recommendation, EngineError> {
    let current = load(store, recommendation_id).await?;
    if current.status != RecommendationStatus::Pending {
        tracing::warn!(
            %recommendation_id,
            status = %current.status,
            approved = decision.approved,
            "decision on non-pending recommendation ignored"
        );
        return Ok(current);
    }

    let to = if decision.approved {
        RecommendationStatus::Approved
    } else {
        RecommendationStatus::Rejected
    };

    let transition = Transition {
        recommendation_id,
        from: RecommendationStatus::Pending,
        to,
        at: now,
        entry: ApprovalWorkflowEntry::new(
            recommendation_id,
            current.user_id,
            decision.decided_by,
            to,
            decision.notes,
            now,
        ),
    };

    let Some(updated) = store.apply_transition(&transition).await? else {
        // Someone else decided between our read and write; report what they left behind.
        tracing::info!(%recommendation_id, "recommendation decided concurrently");
        return load(store, recommendation_id).await;
    };

    tracing::info!(%recommendation_id, status = %updated.status, "recommendation decided");

    if updated.status == RecommendationStatus::Approved {
        if let Err(e) = rewards
            .award_shift_points(updated.user_id, updated.potential_savings)
            .await
        {
            tracing::warn!(
                %recommendation_id,
                user_id = %updated.user_id,
                error = %e,
                "awarding shift points failed; approval kept"
            );
        }
    }

    Ok(updated)
}

/// Records that an approved shift was carried out.
pub async fn mark_implemented(
    store: &dyn RecommendationStore,
    recommendation_id: Uuid,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<Recommendation, EngineError> {
    let current = load(store, recommendation_id).await?;
    let to = RecommendationStatus::Implemented;
    if current.status != RecommendationStatus::Approved {
        return Err(EngineError::InvalidTransition {
            recommendation_id,
            from: current.status,
            to,
        });
    }

    let transition = Transition {
        recommendation_id,
        from: RecommendationStatus::Approved,
        to,
        at: now,
        entry: ApprovalWorkflowEntry::new(recommendation_id, current.user_id, None, to, notes, now),
    };

    match store.apply_transition(&transition).await? {
        Some(updated) => {
            tracing::info!(%recommendation_id, "recommendation implemented");
            Ok(updated)
        }
        None => {
            let latest = load(store, recommendation_id).await?;
            if latest.status == to {
                Ok(latest)
            } else {
                Err(EngineError::InvalidTransition {
                    recommendation_id,
                    from: latest.status,
                    to,
                })
            }
        }
    }
}

pub async fn workflow_history(
    store: &dyn RecommendationStore,
    recommendation_id: Uuid,
) -> Result<Vec<ApprovalWorkflowEntry>, EngineError> {
    load(store, recommendation_id).await?;
    Ok(store.workflow_history(recommendation_id).await?)
}

async fn load(
    store: &dyn RecommendationStore,
    recommendation_id: Uuid,
) -> Result<Recommendation, EngineError> {
    store
        .recommendation(recommendation_id)
        .await?
        .ok_or(EngineError::NotFound { recommendation_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recommendation::CandidateRecommendation;
    use crate::storage::memory::MemoryStore;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRewards {
        calls: Mutex<Vec<(Uuid, f64)>>,
        fail: bool,
    }

    impl RecordingRewards {
        fn calls(&self) -> Vec<(Uuid, f64)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl RewardsClient for RecordingRewards {
        async fn award_shift_points(&self, user_id: Uuid, savings: f64) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push((user_id, savings));
            if self.fail {
                anyhow::bail!("rewards service unavailable");
            }
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap()
    }

    async fn seeded() -> (MemoryStore, Recommendation) {
        let store = MemoryStore::new();
        let rec = Recommendation::pending_from_candidate(
            CandidateRecommendation {
                company_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                original_hour: "08:00-09:00".to_string(),
                recommended_hour: "02:00-03:00".to_string(),
                original_load_kwh: 100.0,
                potential_savings: 85.0,
                co2_reduction_kg: 50.0,
                reason: "test".to_string(),
            },
            now(),
        );
        store.insert_recommendations(&[rec.clone()]).await.unwrap();
        (store, rec)
    }

    fn approve() -> Decision {
        Decision {
            approved: true,
            notes: Some("ok for tonight".to_string()),
            decided_by: None,
        }
    }

    #[tokio::test]
    async fn approval_updates_status_logs_and_awards_points() {
        let (store, rec) = seeded().await;
        let rewards = RecordingRewards::default();
        let at = now() + Duration::minutes(5);

        let updated = decide(&store, &rewards, rec.id, approve(), at).await.unwrap();
        assert_eq!(updated.status, RecommendationStatus::Approved);
        assert_eq!(updated.approved_at, Some(at));

        let history = store.workflow_history(rec.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].approval_status, RecommendationStatus::Approved);
        assert_eq!(history[0].requested_by, rec.user_id);
        assert_eq!(history[0].notes.as_deref(), Some("ok for tonight"));

        assert_eq!(rewards.calls(), vec![(rec.user_id, 85.0)]);
    }

    #[tokio::test]
    async fn rejection_does_not_award_points() {
        let (store, rec) = seeded().await;
        let rewards = RecordingRewards::default();
        let decider = Uuid::new_v4();

        let updated = decide(
            &store,
            &rewards,
            rec.id,
            Decision {
                approved: false,
                notes: None,
                decided_by: Some(decider),
            },
            now(),
        )
        .await
        .unwrap();

        assert_eq!(updated.status, RecommendationStatus::Rejected);
        let history = store.workflow_history(rec.id).await.unwrap();
        assert_eq!(history[0].approval_status, RecommendationStatus::Rejected);
        assert_eq!(history[0].approved_by, Some(decider));
        assert!(rewards.calls().is_empty());
    }

    #[tokio::test]
    async fn rewards_failure_keeps_approval() {
        let (store, rec) = seeded().await;
        let rewards = RecordingRewards {
            fail: true,
            ..Default::default()
        };

        let updated = decide(&store, &rewards, rec.id, approve(), now()).await.unwrap();
        assert_eq!(updated.status, RecommendationStatus::Approved);
        assert_eq!(rewards.calls().len(), 1);
        let stored = store.recommendation(rec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RecommendationStatus::Approved);
    }

    #[tokio::test]
    async fn deciding_twice_is_a_no_op() {
        let (store, rec) = seeded().await;
        let rewards = RecordingRewards::default();

        let first = decide(&store, &rewards, rec.id, approve(), now()).await.unwrap();
        let later = now() + Duration::hours(1);
        let reject = Decision {
            approved: false,
            notes: None,
            decided_by: None,
        };
        let second = decide(&store, &rewards, rec.id, reject, later).await.unwrap();

        assert_eq!(second.status, RecommendationStatus::Approved);
        assert_eq!(second.approved_at, first.approved_at);
        assert_eq!(store.workflow_count(), 1);
        assert_eq!(rewards.calls().len(), 1);
    }

    #[tokio::test]
    async fn unknown_recommendation_is_not_found() {
        let store = MemoryStore::new();
        let rewards = RecordingRewards::default();
        let err = decide(&store, &rewards, Uuid::new_v4(), approve(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn implemented_requires_prior_approval() {
        let (store, rec) = seeded().await;
        let err = mark_implemented(&store, rec.id, None, now()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                from: RecommendationStatus::Pending,
                ..
            }
        ));

        let rewards = RecordingRewards::default();
        decide(&store, &rewards, rec.id, approve(), now()).await.unwrap();
        let done_at = now() + Duration::days(1);
        let done = mark_implemented(&store, rec.id, Some("moved".to_string()), done_at)
            .await
            .unwrap();
        assert_eq!(done.status, RecommendationStatus::Implemented);
        assert_eq!(done.implemented_at, Some(done_at));

        let history = workflow_history(&store, rec.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].approval_status, RecommendationStatus::Implemented);
    }
}
