use anyhow::bail;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemandStatus {
    Pending,
    Approved,
    Rejected,
}

impl DemandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for DemandStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => bail!("unknown demand status: {other}"),
        }
    }
}

/// Canonical demand shape consumed by the recommendation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Uuid,
    /// "HH:MM-HH:MM"
    pub hour_slot: String,
    pub quantity_kwh: f64,
    pub date: NaiveDate,
    pub status: DemandStatus,
}

/// Row of the confirmed demand table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedDemand {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub hour_slot: String,
    pub demand_kwh: f64,
    pub cost: f64,
    pub demand_date: NaiveDate,
    pub status: DemandStatus,
    pub notes: Option<String>,
}

/// Row of the requested demand table. Carries denormalized company info the engine ignores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandRequest {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub company_name: String,
    pub company_code: String,
    pub hour_slot: String,
    pub demand_kwh: f64,
    pub request_date: NaiveDate,
    pub status: DemandStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DemandOrigin {
    Confirmed(ConfirmedDemand),
    Requested(DemandRequest),
}

impl From<DemandOrigin> for DemandRecord {
    fn from(origin: DemandOrigin) -> Self {
        match origin {
            DemandOrigin::Confirmed(d) => DemandRecord {
                id: d.id,
                company_id: d.company_id,
                user_id: d.user_id,
                hour_slot: d.hour_slot.trim().to_string(),
                quantity_kwh: d.demand_kwh,
                date: d.demand_date,
                status: d.status,
            },
            DemandOrigin::Requested(r) => DemandRecord {
                id: r.id,
                company_id: r.company_id,
                user_id: r.user_id,
                hour_slot: r.hour_slot.trim().to_string(),
                quantity_kwh: r.demand_kwh,
                date: r.request_date,
                status: r.status,
            },
        }
    }
}

/// Confirmed demands win; requested demands are only used when there are no confirmed ones.
pub fn normalize_demands(
    confirmed: Vec<ConfirmedDemand>,
    requested: Vec<DemandRequest>,
) -> Vec<DemandRecord> {
    if !confirmed.is_empty() {
        return confirmed
            .into_iter()
            .map(|d| DemandOrigin::Confirmed(d).into())
            .collect();
    }
    requested
        .into_iter()
        .map(|r| DemandOrigin::Requested(r).into())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn confirmed(slot: &str, kwh: f64) -> ConfirmedDemand {
        ConfirmedDemand {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            hour_slot: slot.to_string(),
            demand_kwh: kwh,
            cost: 0.0,
            demand_date: date(),
            status: DemandStatus::Approved,
            notes: None,
        }
    }

    fn requested(slot: &str, kwh: f64) -> DemandRequest {
        DemandRequest {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            company_name: "Acme".to_string(),
            company_code: "ACME".to_string(),
            hour_slot: slot.to_string(),
            demand_kwh: kwh,
            request_date: date(),
            status: DemandStatus::Pending,
            notes: Some("night shift".to_string()),
        }
    }

    #[test]
    fn requested_demand_maps_to_canonical_record() {
        let req = requested(" 08:00-09:00 ", 42.0);
        let record: DemandRecord = DemandOrigin::Requested(req.clone()).into();
        assert_eq!(record.id, req.id);
        assert_eq!(record.hour_slot, "08:00-09:00");
        assert_eq!(record.quantity_kwh, 42.0);
        assert_eq!(record.date, req.request_date);
        assert_eq!(record.status, DemandStatus::Pending);
    }

    #[test]
    fn confirmed_demands_take_precedence() {
        let out = normalize_demands(
            vec![confirmed("10:00-11:00", 5.0)],
            vec![requested("08:00-09:00", 1.0)],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].hour_slot, "10:00-11:00");
    }

    #[test]
    fn falls_back_to_requested_demands() {
        let out = normalize_demands(vec![], vec![requested("08:00-09:00", 1.0)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].status, DemandStatus::Pending);
    }

    #[test]
    fn parses_status_strings() {
        assert_eq!("approved".parse::<DemandStatus>().unwrap(), DemandStatus::Approved);
        assert!("done".parse::<DemandStatus>().is_err());
    }
}
