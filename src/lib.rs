//! # Cloud Spend Aggregator
//!
//! A library for normalizing per-invoice billing line items from a cloud
//! provider's export into signed monetary facts, and producing time-windowed
//! aggregates (by category, project, product, month) plus a spend trend and
//! a multi-method forward forecast.
//!
//! ## Core Concepts
//!
//! - **Raw records**: ordered field mappings exactly as delivered; the field
//!   set varies row to row and values arrive as strings or numbers
//! - **Signed amounts**: discounts and credits are negative facts that net
//!   against the buckets they touch, never dropped
//! - **Windows**: named relative ranges (`lastMonth` .. `allTime`) applied
//!   before aggregation, fail-open for undated line items
//! - **Regime-based forecasting**: the forecast method is selected by how
//!   many months of history exist, with anomaly damping on outlier months
//!
//! Every stage is a pure function over plain data; nothing here performs IO
//! unless the optional `fetch` feature is enabled.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cloud_spend_aggregator::*;
//!
//! let invoices = invoices_from_json(&invoice_payload)?;
//! let mut ctx = IngestContext::new();
//! let mut items = Vec::new();
//! for invoice in &invoices {
//!     items.extend(line_items_from_json(invoice, &payload_for(invoice), &mut ctx)?);
//! }
//!
//! let report = analyze_spend(&items, TimeWindow::Last6Months);
//! println!("net spend: {:.2}", report.net_total);
//! println!("forecast: {:.2} ({})",
//!     report.forecast.forecast_amount,
//!     report.forecast.confidence_label);
//! ```

pub mod aggregate;
pub mod error;
pub mod ingestion;
pub mod normalize;
pub mod schema;
pub mod utils;
pub mod window;

pub mod forecast;

#[cfg(feature = "fetch")]
pub mod fetch;

pub use aggregate::{
    aggregate, monthly_series, sorted_buckets, BucketMap, Dimension, MonthlyTotal,
    UNASSIGNED_LABEL, UNKNOWN_LABEL,
};
pub use error::{Result, SpendError};
#[cfg(feature = "fetch")]
pub use fetch::BillingClient;
pub use forecast::{compute_trend_and_forecast, ForecastResult, TrendDirection};
pub use ingestion::{
    invoices_from_json, line_items_for_invoice, line_items_from_json, records_from_json,
    IngestContext,
};
pub use normalize::{discount_category, extract_amount, is_discount, parse_money};
pub use schema::{CachedRecordSet, FieldValue, Invoice, LineItem, RawRecord};
pub use window::{
    filter_invoices, filter_invoices_at, filter_line_items, filter_line_items_at, TimeWindow,
};

use chrono::{NaiveDate, Utc};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Everything one pipeline pass produces for a window: per-dimension
/// buckets, the monthly series, and the trend/forecast. Serializable so call
/// sites can hand it to their cache.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SpendReport {
    pub window: TimeWindow,
    pub by_category: BucketMap,
    pub by_project: BucketMap,
    pub by_product: BucketMap,
    pub monthly: Vec<MonthlyTotal>,
    pub net_total: f64,
    pub charge_count: usize,
    pub discount_count: usize,
    pub forecast: ForecastResult,
}

pub struct SpendAnalyzer;

impl SpendAnalyzer {
    /// Runs the full pipeline anchored at the current date.
    pub fn analyze(items: &[LineItem], window: TimeWindow) -> SpendReport {
        Self::analyze_at(items, window, Utc::now().date_naive())
    }

    /// Runs the full pipeline anchored at `today`: window filter, one
    /// aggregation per dimension, monthly series, trend and forecast.
    pub fn analyze_at(items: &[LineItem], window: TimeWindow, today: NaiveDate) -> SpendReport {
        let selected = filter_line_items_at(items, window, today);
        debug!(
            "analyzing {} of {} line items in {:?}",
            selected.len(),
            items.len(),
            window
        );

        let monthly = monthly_series(&selected);
        let forecast = compute_trend_and_forecast(&monthly);

        let net_total = selected
            .iter()
            .map(|item| extract_amount(&item.record))
            .sum();
        let discount_count = selected
            .iter()
            .filter(|item| is_discount(&item.record))
            .count();

        SpendReport {
            window,
            by_category: aggregate(&selected, Dimension::Category),
            by_project: aggregate(&selected, Dimension::Project),
            by_product: aggregate(&selected, Dimension::Product),
            monthly,
            net_total,
            charge_count: selected.len() - discount_count,
            discount_count,
            forecast,
        }
    }
}

/// One-call pipeline over an already-materialized line-item list.
pub fn analyze_spend(items: &[LineItem], window: TimeWindow) -> SpendReport {
    SpendAnalyzer::analyze(items, window)
}
