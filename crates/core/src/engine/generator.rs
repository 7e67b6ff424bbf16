use crate::domain::demand::DemandRecord;
use crate::domain::price::PriceEntry;
use crate::domain::recommendation::CandidateRecommendation;
use crate::engine::error::EngineError;
use crate::engine::slot::resolve_slot_price;
use crate::engine::EngineConfig;

/// Builds shift candidates for every demand whose move to the cheapest slot saves more than
/// `config.min_savings`. Pure; returns an empty list when either input is empty.
pub fn generate(
    demands: &[DemandRecord],
    prices: &[PriceEntry],
    config: &EngineConfig,
) -> Vec<CandidateRecommendation> {
    let Some(cheapest) = cheapest_entry(prices) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for demand in demands {
        let current = match resolve_slot_price(&demand.hour_slot, prices) {
            Ok(entry) => entry,
            Err(EngineError::InvalidHourSlot(slot)) => {
                tracing::warn!(demand_id = %demand.id, hour_slot = %slot, "skipping demand with unparseable hour slot");
                continue;
            }
            Err(e) => {
                tracing::warn!(demand_id = %demand.id, error = %e, "skipping demand; slot price unresolved");
                continue;
            }
        };

        let current_cost = demand.quantity_kwh * current.unit_price;
        let recommended_cost = demand.quantity_kwh * cheapest.unit_price;
        let savings = current_cost - recommended_cost;
        let co2_reduction = demand.quantity_kwh * config.co2_kg_per_kwh;

        if savings <= config.min_savings || cheapest.hour_range == demand.hour_slot {
            continue;
        }

        let savings = round_cents(savings);
        out.push(CandidateRecommendation {
            company_id: demand.company_id,
            user_id: demand.user_id,
            original_hour: demand.hour_slot.clone(),
            recommended_hour: cheapest.hour_range.clone(),
            original_load_kwh: demand.quantity_kwh,
            potential_savings: savings,
            co2_reduction_kg: round_cents(co2_reduction),
            reason: format!(
                "Shift {} kWh from {} to {} and save {savings:.2}.",
                demand.quantity_kwh, demand.hour_slot, cheapest.hour_range
            ),
        });
    }

    tracing::debug!(
        demands = demands.len(),
        candidates = out.len(),
        cheapest = %cheapest.hour_range,
        "generated shift candidates"
    );
    out
}

/// Lowest unit price; ties keep the earliest entry.
pub fn cheapest_entry(prices: &[PriceEntry]) -> Option<&PriceEntry> {
    let mut iter = prices.iter();
    let mut best = iter.next()?;
    for p in iter {
        if p.unit_price < best.unit_price {
            best = p;
        }
    }
    Some(best)
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
