use crate::domain::recommendation::{Recommendation, RecommendationStatus};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecommendationStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub implemented: usize,
    /// Summed across every row regardless of status.
    pub total_savings: f64,
    pub total_co2_reduction: f64,
}

pub fn summarize(rows: &[Recommendation]) -> RecommendationStats {
    rows.iter().fold(RecommendationStats::default(), |mut acc, r| {
        acc.total += 1;
        match r.status {
            RecommendationStatus::Pending => acc.pending += 1,
            RecommendationStatus::Approved => acc.approved += 1,
            RecommendationStatus::Rejected => acc.rejected += 1,
            RecommendationStatus::Implemented => acc.implemented += 1,
        }
        acc.total_savings += r.potential_savings;
        acc.total_co2_reduction += r.co2_reduction_kg;
        acc
    })
}
