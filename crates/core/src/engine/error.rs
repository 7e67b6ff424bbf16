use crate::domain::recommendation::RecommendationStatus;
use crate::storage::StoreError;
use std::fmt;
use uuid::Uuid;

#[derive(Debug)]
pub enum EngineError {
    /// Price table was empty when a slot had to be priced.
    NoPriceData,
    InvalidHourSlot(String),
    NotFound { recommendation_id: Uuid },
    InvalidTransition {
        recommendation_id: Uuid,
        from: RecommendationStatus,
        to: RecommendationStatus,
    },
    Storage(anyhow::Error),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPriceData => write!(f, "no electricity price data available"),
            Self::InvalidHourSlot(slot) => write!(f, "invalid hour slot: {slot:?}"),
            Self::NotFound { recommendation_id } => {
                write!(f, "recommendation not found (id={recommendation_id})")
            }
            Self::InvalidTransition {
                recommendation_id,
                from,
                to,
            } => write!(
                f,
                "invalid status transition for recommendation {recommendation_id}: {from} -> {to}"
            ),
            Self::Storage(err) => write!(f, "storage error: {err:#}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(&**err),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(detail) => {
                Self::Storage(anyhow::anyhow!("unique constraint violation: {detail}"))
            }
            StoreError::Other(err) => Self::Storage(err),
        }
    }
}
