use crate::normalize::{discount_category, extract_amount, is_discount};
use crate::schema::LineItem;
use crate::utils::{month_key, parse_month_label};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const UNKNOWN_LABEL: &str = "Unknown";
pub const UNASSIGNED_LABEL: &str = "Unassigned";

/// The grouping axes a bucket mapping can be built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    Category,
    Project,
    Product,
    Month,
}

/// A label -> signed running total mapping. Insertion order is irrelevant;
/// presentation order comes from [`sorted_buckets`].
pub type BucketMap = BTreeMap<String, f64>;

/// One point of a monthly spend series, keyed by a canonical `YYYY-MM`
/// label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthlyTotal {
    pub period: String,
    pub total: f64,
}

fn category_label(item: &LineItem) -> String {
    // An explicit category wins even for discounts: a "Compute" credit nets
    // against the Compute bucket instead of being relabeled.
    if let Some(category) = item.category() {
        return category.to_string();
    }
    if is_discount(&item.record) {
        return discount_category(&item.record).to_string();
    }
    item.record
        .text_of(&["name", "product", "groupDescription", "description"])
        .unwrap_or(UNKNOWN_LABEL)
        .to_string()
}

fn project_label(item: &LineItem) -> String {
    item.project_label()
        .or_else(|| item.resource_id())
        .unwrap_or(UNASSIGNED_LABEL)
        .to_string()
}

fn product_label(item: &LineItem) -> String {
    item.record
        .text_of(&["product", "name", "groupDescription"])
        .unwrap_or(UNKNOWN_LABEL)
        .to_string()
}

/// The calendar month an item belongs to: an explicit period tag or field if
/// one parses, otherwise the item's effective date.
fn item_month(item: &LineItem) -> Option<NaiveDate> {
    if let Some(period) = &item.invoice_period {
        if let Some(date) = parse_month_label(period) {
            return Some(date);
        }
    }
    if let Some(period) = item.record.text_of(&["invoicePeriod", "period"]) {
        if let Some(date) = parse_month_label(period) {
            return Some(date);
        }
    }
    item.effective_date()
}

/// Aggregates signed amounts into labeled buckets along `dimension`.
///
/// Accumulation is a commutative running sum, so input order never changes
/// the totals and discounts subtract instead of disappearing. Items with no
/// derivable month are excluded from the month dimension only; every other
/// dimension falls back to a sentinel label.
pub fn aggregate(items: &[LineItem], dimension: Dimension) -> BucketMap {
    let mut buckets = BucketMap::new();

    for item in items {
        let label = match dimension {
            Dimension::Category => category_label(item),
            Dimension::Project => project_label(item),
            Dimension::Product => product_label(item),
            Dimension::Month => match item_month(item) {
                Some(date) => month_key(date),
                None => continue,
            },
        };

        *buckets.entry(label).or_default() += extract_amount(&item.record);
    }

    buckets
}

/// Monthly totals in strict calendar order. Labels are normalized to
/// `YYYY-MM`, so `"2024-2"` and `"February 2024"` land in the same bucket
/// and sort before `"2024-10"`.
pub fn monthly_series(items: &[LineItem]) -> Vec<MonthlyTotal> {
    let mut by_month: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for item in items {
        if let Some(month) = item_month(item) {
            *by_month.entry(month).or_default() += extract_amount(&item.record);
        }
    }

    by_month
        .into_iter()
        .map(|(month, total)| MonthlyTotal {
            period: month_key(month),
            total,
        })
        .collect()
}

/// Presentation order for a bucket mapping: descending total, then label,
/// so equal totals render deterministically.
pub fn sorted_buckets(buckets: &BucketMap) -> Vec<(String, f64)> {
    let mut entries: Vec<(String, f64)> = buckets
        .iter()
        .map(|(label, total)| (label.clone(), *total))
        .collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries
}
