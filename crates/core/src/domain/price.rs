use anyhow::bail;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Informational only; pricing decisions use `unit_price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodType {
    #[serde(rename = "peak")]
    Peak,
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "off-peak")]
    OffPeak,
}

impl PeriodType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Peak => "peak",
            Self::Normal => "normal",
            Self::OffPeak => "off-peak",
        }
    }
}

impl FromStr for PeriodType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "peak" => Ok(Self::Peak),
            "normal" => Ok(Self::Normal),
            "off-peak" => Ok(Self::OffPeak),
            other => bail!("unknown period type: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    /// "HH:MM-HH:MM"; may wrap past midnight (e.g. "22:00-06:00").
    pub hour_range: String,
    pub unit_price: f64,
    pub period_type: PeriodType,
    pub effective_date: NaiveDate,
}
