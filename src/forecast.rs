use crate::aggregate::MonthlyTotal;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
    Unknown,
}

/// Month-over-month trend plus a next-period estimate. Recomputed on every
/// query; never persisted by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForecastResult {
    pub direction: TrendDirection,
    pub trend_percent: f64,
    pub forecast_amount: f64,
    pub confidence_label: String,
}

/// Weights over the most recent six months, newest first.
const EWMA_WEIGHTS: [f64; 6] = [0.35, 0.25, 0.15, 0.10, 0.08, 0.07];

const ACCELERATION_DAMPING: f64 = 0.25;
const ENSEMBLE_TREND_SHARE: f64 = 0.6;

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Approximate confidence band from the coefficient of variation, clamped to
/// a sane range for display.
fn cv_band(values: &[f64]) -> u32 {
    let m = mean(values);
    if m == 0.0 {
        return 40;
    }
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    let cv = variance.sqrt() / m.abs();
    ((cv * 100.0).round() as i64).clamp(8, 40) as u32
}

/// OLS fit over indices 0..len, evaluated one step past the last point.
fn linear_projection(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = mean(values);

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }

    let slope = if den == 0.0 { 0.0 } else { num / den };
    let intercept = mean_y - slope * mean_x;
    intercept + slope * n
}

/// Two points of history: project the growth ratio forward with heavy
/// damping, harder when the ratio is extreme, and keep the result within
/// ±30% of the latest month.
fn damped_growth(totals: &[f64]) -> (f64, String) {
    let prev = totals[0];
    let last = totals[1];
    let label = "Damped growth over 2 months (±40%)".to_string();

    if prev == 0.0 {
        return (last, label);
    }

    let ratio = last / prev.abs();
    let damping = if (0.75..=1.5).contains(&ratio) { 0.7 } else { 0.5 };
    let raw = last * (1.0 + (ratio - 1.0) * damping);

    let span = 0.3 * last.abs();
    (raw.clamp(last - span, last + span), label)
}

/// 3-5 points: OLS projection plus a damped second-difference term, clamped
/// to [0.5x, 2x] of the last value when that value is positive.
fn regression_forecast(totals: &[f64]) -> (f64, String) {
    let len = totals.len();
    let projected = linear_projection(totals);
    let accel = (totals[len - 1] - totals[len - 2]) - (totals[len - 2] - totals[len - 3]);
    let mut forecast = projected + ACCELERATION_DAMPING * accel;

    let last = totals[len - 1];
    if last > 0.0 {
        forecast = forecast.clamp(0.5 * last, 2.0 * last);
    }

    let label = format!(
        "Linear regression over {} months (±{}%)",
        len,
        cv_band(totals)
    );
    (forecast, label)
}

/// 6-11 points: exponentially-weighted average of the latest six months,
/// scaled by a tightly capped half-over-half growth factor.
fn weighted_moving_average(totals: &[f64]) -> (f64, String) {
    let recent: Vec<f64> = totals.iter().rev().take(6).copied().collect();
    let ewma: f64 = EWMA_WEIGHTS.iter().zip(&recent).map(|(w, v)| w * v).sum();

    let half = totals.len() / 2;
    let first = mean(&totals[..half]);
    let second = mean(&totals[half..]);
    let ratio = if first == 0.0 { 1.0 } else { second / first.abs() };
    let per_month = if ratio > 0.0 {
        ratio.powf(2.0 / totals.len() as f64)
    } else {
        1.0
    };
    let factor = per_month.clamp(0.9, 1.1);

    let label = format!(
        "Weighted moving average over {} months (±{}%)",
        totals.len(),
        cv_band(totals)
    );
    (ewma * factor, label)
}

/// 12+ points: blend of a trend-growth projection and a seasonally-adjusted
/// moving average.
fn seasonal_ensemble(totals: &[f64]) -> (f64, String) {
    let len = totals.len();
    let last = totals[len - 1];

    let mut ratios = Vec::new();
    for i in len.saturating_sub(6)..len {
        if i == 0 {
            continue;
        }
        let prev = totals[i - 1];
        if prev != 0.0 {
            ratios.push(totals[i] / prev.abs());
        }
    }
    let avg_ratio = if ratios.is_empty() { 1.0 } else { mean(&ratios) };
    // Ratios carry the sign (denominators are magnitudes), so the
    // projection scales the last magnitude rather than the signed value.
    let trend_model = avg_ratio * last.abs();

    let base = mean(&totals[len - 3..]);
    let seasonal = if len == 12 {
        // No full prior year to compare against: fall back to the sixth
        // root of second-half over first-half growth.
        let first = mean(&totals[..6]);
        let second = mean(&totals[6..]);
        let growth = if first == 0.0 { 1.0 } else { second / first.abs() };
        if growth > 0.0 {
            growth.powf(1.0 / 6.0)
        } else {
            1.0
        }
    } else {
        // The forecast month, one year prior, against the overall level.
        let prior = totals[len - 12];
        let overall = mean(totals);
        if overall == 0.0 {
            1.0
        } else {
            prior / overall.abs()
        }
    };
    let factor = seasonal.clamp(0.8, 1.2);
    let ma_model = base * factor;

    let forecast = ENSEMBLE_TREND_SHARE * trend_model + (1.0 - ENSEMBLE_TREND_SHARE) * ma_model;
    let label = format!(
        "Seasonal ensemble over {} months (±{}%)",
        len,
        cv_band(totals)
    );
    (forecast, label)
}

/// Blends the forecast toward recent history when the latest month is an
/// outlier against both the series median and the three months before it.
fn dampen_anomaly(totals: &[f64], forecast: f64, label: String) -> (f64, String) {
    let len = totals.len();
    let last = totals[len - 1];
    let med = median(totals);
    let trailing = mean(&totals[len - 4..len - 1]);

    let off_median = (last - med).abs() > 0.30 * med.abs();
    let off_trailing = (last - trailing).abs() > 0.25 * trailing.abs();

    if off_median && off_trailing {
        let anchor = 0.5 * trailing + 0.5 * med;
        let blended = 0.4 * forecast + 0.6 * anchor;
        (blended, format!("{}, anomaly-adjusted", label))
    } else {
        (forecast, label)
    }
}

/// Computes the month-over-month trend and the next-period forecast for a
/// chronologically sorted monthly series.
///
/// The forecast method is selected by how much history exists; every method
/// tolerates net-negative months by dividing through absolute magnitudes.
pub fn compute_trend_and_forecast(series: &[MonthlyTotal]) -> ForecastResult {
    let totals: Vec<f64> = series.iter().map(|m| m.total).collect();
    let len = totals.len();

    let (direction, trend_percent) = if len < 2 {
        (TrendDirection::Unknown, 0.0)
    } else {
        let last = totals[len - 1];
        let prev = totals[len - 2];
        if prev == 0.0 {
            (TrendDirection::Unknown, 0.0)
        } else {
            let delta = last - prev;
            let direction = if delta > 0.0 {
                TrendDirection::Up
            } else if delta < 0.0 {
                TrendDirection::Down
            } else {
                TrendDirection::Flat
            };
            (direction, delta / prev.abs() * 100.0)
        }
    };

    let (forecast_amount, confidence_label) = match len {
        0 => (0.0, "No billing history; forecast unavailable".to_string()),
        1 => (
            totals[0],
            "Flat carry-forward of a single month (±50%)".to_string(),
        ),
        2 => damped_growth(&totals),
        3..=5 => regression_forecast(&totals),
        6..=11 => weighted_moving_average(&totals),
        _ => seasonal_ensemble(&totals),
    };

    let (forecast_amount, confidence_label) = if len >= 4 {
        dampen_anomaly(&totals, forecast_amount, confidence_label)
    } else {
        (forecast_amount, confidence_label)
    };

    debug!(
        "forecast over {} months: {:.2} ({})",
        len, forecast_amount, confidence_label
    );

    ForecastResult {
        direction,
        trend_percent,
        forecast_amount,
        confidence_label,
    }
}
