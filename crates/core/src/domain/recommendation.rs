use anyhow::bail;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Pending,
    Approved,
    Rejected,
    Implemented,
}

impl RecommendationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Implemented => "implemented",
        }
    }
}

impl fmt::Display for RecommendationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecommendationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "implemented" => Ok(Self::Implemented),
            other => bail!("unknown recommendation status: {other}"),
        }
    }
}

/// In-memory output of the generator; not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecommendation {
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub original_hour: String,
    pub recommended_hour: String,
    pub original_load_kwh: f64,
    pub potential_savings: f64,
    pub co2_reduction_kg: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub original_hour: String,
    pub recommended_hour: String,
    pub original_load_kwh: f64,
    pub potential_savings: f64,
    pub co2_reduction_kg: f64,
    pub reason: String,
    pub status: RecommendationStatus,
    /// Calendar day (UTC) the row was generated on; part of the uniqueness key.
    pub recommendation_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub implemented_at: Option<DateTime<Utc>>,
}

impl Recommendation {
    pub fn pending_from_candidate(candidate: CandidateRecommendation, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id: candidate.company_id,
            user_id: candidate.user_id,
            original_hour: candidate.original_hour,
            recommended_hour: candidate.recommended_hour,
            original_load_kwh: candidate.original_load_kwh,
            potential_savings: candidate.potential_savings,
            co2_reduction_kg: candidate.co2_reduction_kg,
            reason: candidate.reason,
            status: RecommendationStatus::Pending,
            recommendation_date: now.date_naive(),
            created_at: now,
            approved_at: None,
            implemented_at: None,
        }
    }
}
