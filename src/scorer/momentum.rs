use std::cmp::Ordering;

use crate::config::score_gates;
use crate::types::{ScoredCandidate, SnapshotRow};

/// Long-side momentum score (higher = stronger candidate). Every gate must
/// hold and every input must be present, otherwise the row gets no score at
/// all and stays out of the ranking entirely.
pub fn score_up(row: &SnapshotRow) -> Option<f64> {
    let change = row.change_pct?;
    let rvol = row.rvol_5m?;
    let volume = row.volume?;
    let price = row.price?;

    if rvol < score_gates::UP_MIN_RVOL_5M
        || change < score_gates::UP_MIN_CHANGE_PCT
        || volume < score_gates::UP_MIN_VOLUME
        || price < score_gates::UP_MIN_PRICE
    {
        return None;
    }

    // Change and crowd interest multiply; volume enters log-scaled so
    // megacap turnover doesn't drown everything else.
    Some(change * rvol * volume.log10())
}

/// Short-side score for heavy fallers. Mutually exclusive with the long side
/// through the change gates, so no row can rank on both lists.
pub fn score_down(row: &SnapshotRow) -> Option<f64> {
    let change = row.change_pct?;
    let volume = row.volume?;

    if change > score_gates::DOWN_MAX_CHANGE_PCT || volume < score_gates::DOWN_MIN_VOLUME {
        return None;
    }

    Some(change.abs() * volume.log10().powi(2))
}

/// Rank rows by `scorer` descending and keep the top `n`. The sort is stable,
/// so equal scores keep their snapshot order.
pub fn rank(
    rows: &[SnapshotRow],
    scorer: fn(&SnapshotRow) -> Option<f64>,
    n: usize,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = rows
        .iter()
        .filter_map(|row| {
            scorer(row).map(|score| ScoredCandidate {
                symbol: row.symbol.clone(),
                score,
                row: row.clone(),
            })
        })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(n);
    scored
}
