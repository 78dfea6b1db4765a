//! Cycle prediction over a user's logged observations.
//!
//! Everything here is pure: callers load the history and pass `today` in.

use chrono::{Duration, NaiveDate};

use crate::models::{
    CycleObservation, CyclePrediction, CycleStats, CycleSummary, FertileWindow,
};

pub const DEFAULT_CYCLE_LENGTH: i64 = 28;

/// With no period start on record, pretend one happened this many days ago.
const DEFAULT_LOOKBACK_DAYS: i64 = 15;

/// Gaps at or above this are treated as missed logging, not a real cycle.
const MAX_CYCLE_GAP_DAYS: i64 = 45;

const FERTILE_START_OFFSET: i64 = 11;
const FERTILE_END_OFFSET: i64 = 16;

/// Predict the next period and fertile window.
///
/// `typical_cycle_length` is the user's stored default, used only when a
/// single period start is known.
pub fn predict(
    observations: &[CycleObservation],
    typical_cycle_length: Option<i64>,
    today: NaiveDate,
) -> CyclePrediction {
    let starts = period_starts(observations);

    let (last_period_start, average_cycle_length) = match starts.as_slice() {
        [] => (
            today - Duration::days(DEFAULT_LOOKBACK_DAYS),
            DEFAULT_CYCLE_LENGTH,
        ),
        [only] => (
            *only,
            typical_cycle_length
                .filter(|len| *len > 0)
                .unwrap_or(DEFAULT_CYCLE_LENGTH),
        ),
        [latest, ..] => (
            *latest,
            average(&cycle_lengths(&starts)).unwrap_or(DEFAULT_CYCLE_LENGTH),
        ),
    };

    let fertile_window = FertileWindow {
        start: last_period_start + Duration::days(FERTILE_START_OFFSET),
        end: last_period_start + Duration::days(FERTILE_END_OFFSET),
    };
    let fertile_days = fertile_window
        .start
        .iter_days()
        .take_while(|day| *day <= fertile_window.end)
        .collect();

    CyclePrediction {
        average_cycle_length,
        last_period_start,
        next_period_prediction: last_period_start + Duration::days(average_cycle_length),
        fertile_window,
        period_days: period_days(observations),
        fertile_days,
    }
}

/// Whole days from `today` to the predicted start, never negative.
pub fn days_until_next_period(prediction: &CyclePrediction, today: NaiveDate) -> i64 {
    (prediction.next_period_prediction - today).num_days().max(0)
}

pub fn summarize(prediction: &CyclePrediction, today: NaiveDate) -> CycleSummary {
    let days_until = days_until_next_period(prediction, today);
    let window = &prediction.fertile_window;

    CycleSummary {
        cycle_day: (today - prediction.last_period_start).num_days(),
        days_until_next_period: days_until,
        in_fertile_window: (window.start..=window.end).contains(&today),
        cycle_progress: ((DEFAULT_CYCLE_LENGTH - days_until) as f64
            / DEFAULT_CYCLE_LENGTH as f64
            * 100.0)
            .clamp(0.0, 100.0),
    }
}

pub fn cycle_stats(observations: &[CycleObservation]) -> CycleStats {
    let starts = period_starts(observations);
    let lengths = cycle_lengths(&starts);

    CycleStats {
        period_starts: starts.len(),
        shortest_cycle: lengths.iter().copied().min(),
        longest_cycle: lengths.iter().copied().max(),
        cycle_lengths: lengths,
    }
}

/// Period-start days, most recent first. Same-day duplicates are kept so the
/// zero gap between them gets dropped as an outlier rather than hidden.
fn period_starts(observations: &[CycleObservation]) -> Vec<NaiveDate> {
    let mut starts: Vec<NaiveDate> = observations
        .iter()
        .filter(|o| o.period_start)
        .map(|o| o.date)
        .collect();
    starts.sort_unstable_by(|a, b| b.cmp(a));
    starts
}

/// Gaps between adjacent starts (newest first) with outliers removed.
fn cycle_lengths(starts: &[NaiveDate]) -> Vec<i64> {
    starts
        .windows(2)
        .map(|w| (w[0] - w[1]).num_days())
        .filter(|gap| *gap > 0 && *gap < MAX_CYCLE_GAP_DAYS)
        .collect()
}

fn average(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<i64>() as f64 / values.len() as f64;
    Some(mean.round() as i64)
}

fn period_days(observations: &[CycleObservation]) -> Vec<NaiveDate> {
    let mut days: Vec<NaiveDate> = observations
        .iter()
        .filter(|o| o.flow.is_some())
        .map(|o| o.date)
        .collect();
    days.sort_unstable_by(|a, b| b.cmp(a));
    days.dedup();
    days
}
