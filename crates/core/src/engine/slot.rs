use crate::domain::price::PriceEntry;
use crate::engine::error::EngineError;
use anyhow::{bail, ensure, Context};

/// Parses "HH:MM-HH:MM" into (start_hour, end_hour). Minutes are validated but ignored.
pub fn parse_hour_range(range: &str) -> anyhow::Result<(u32, u32)> {
    let Some((start, end)) = range.split_once('-') else {
        bail!("hour range must look like HH:MM-HH:MM (got {range:?})");
    };
    let start = parse_hour(start).with_context(|| format!("bad range start in {range:?}"))?;
    let end = parse_hour(end).with_context(|| format!("bad range end in {range:?}"))?;
    ensure!(start <= 23, "range start hour out of range in {range:?}");
    ensure!(end <= 24, "range end hour out of range in {range:?}");
    Ok((start, end))
}

/// Start hour (0-23) of a demand slot such as "08:00-09:00".
pub fn slot_start_hour(slot: &str) -> anyhow::Result<u32> {
    let start = slot.split('-').next().unwrap_or_default();
    let hour = parse_hour(start).with_context(|| format!("bad hour slot {slot:?}"))?;
    ensure!(hour <= 23, "slot hour out of range in {slot:?}");
    Ok(hour)
}

fn parse_hour(part: &str) -> anyhow::Result<u32> {
    let part = part.trim();
    let (hour, minute) = part.split_once(':').unwrap_or((part, "00"));
    let hour: u32 = hour.trim().parse().with_context(|| format!("hour is not a number: {part:?}"))?;
    let minute: u32 = minute
        .trim()
        .parse()
        .with_context(|| format!("minute is not a number: {part:?}"))?;
    ensure!(minute < 60, "minute out of range: {part:?}");
    Ok(hour)
}

/// Half-open `[start, end)` membership; `start > end` wraps past midnight.
pub fn range_contains(start: u32, end: u32, hour: u32) -> bool {
    if start <= end {
        start <= hour && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// Returns the first price entry whose range contains the slot's start hour.
///
/// When no range matches, the first entry is returned. Entries with unparseable ranges never
/// match but can still be that fallback.
pub fn resolve_slot_price<'a>(
    hour_slot: &str,
    prices: &'a [PriceEntry],
) -> Result<&'a PriceEntry, EngineError> {
    let Some(first) = prices.first() else {
        return Err(EngineError::NoPriceData);
    };

    let slot_hour =
        slot_start_hour(hour_slot).map_err(|_| EngineError::InvalidHourSlot(hour_slot.to_string()))?;

    let matched = prices.iter().find(|p| match parse_hour_range(&p.hour_range) {
        Ok((start, end)) => range_contains(start, end, slot_hour),
        Err(e) => {
            tracing::debug!(hour_range = %p.hour_range, error = %e, "skipping unparseable price range");
            false
        }
    });

    Ok(match matched {
        Some(entry) => entry,
        None => {
            tracing::debug!(hour_slot, fallback = %first.hour_range, "no price range covers slot; using first entry");
            first
        }
    })
}
