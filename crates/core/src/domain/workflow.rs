use crate::domain::recommendation::RecommendationStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only audit row; one per recommendation status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalWorkflowEntry {
    pub id: Uuid,
    pub recommendation_id: Uuid,
    pub requested_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub approval_status: RecommendationStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalWorkflowEntry {
    pub fn new(
        recommendation_id: Uuid,
        requested_by: Uuid,
        approved_by: Option<Uuid>,
        approval_status: RecommendationStatus,
        notes: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let notes = notes.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            id: Uuid::new_v4(),
            recommendation_id,
            requested_by,
            approved_by,
            approval_status,
            notes,
            created_at,
        }
    }
}
