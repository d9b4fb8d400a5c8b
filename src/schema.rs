use crate::utils::{parse_flexible_date, parse_month_label};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One raw field value as delivered by the provider.
///
/// The upstream tokenizer coerces numeric-looking strings, so the same field
/// can arrive as either representation across rows of one export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// The value as a plain number, accepting numeric strings.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            FieldValue::Number(_) => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// Collapses provider field-name variants onto one comparable key.
/// `invoicePeriod`, `invoice_period` and `Invoice Period` all normalize to
/// `invoiceperiod`.
pub fn canonical_key(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// An ordered field mapping, exactly as delivered by the provider.
///
/// The field set is not fixed across records and delivery order is
/// significant: amount extraction scans fields in the order they arrived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RawRecord {
    fields: Vec<(String, FieldValue)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Case- and separator-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        let wanted = canonical_key(name);
        self.fields
            .iter()
            .find(|(k, _)| canonical_key(k) == wanted)
            .map(|(_, v)| v)
    }

    /// First non-empty text value among `names`, tried in order.
    pub fn text_of(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.get(name))
            .filter_map(|value| value.as_text())
            .map(str::trim)
            .find(|text| !text.is_empty())
    }

    /// First date parseable from any of `names`, tried in order.
    pub fn date_of(&self, names: &[&str]) -> Option<NaiveDate> {
        names.iter().filter_map(|name| self.date_field(name)).next()
    }

    fn date_field(&self, name: &str) -> Option<NaiveDate> {
        match self.get(name)? {
            FieldValue::Text(s) => parse_flexible_date(s),
            FieldValue::Number(_) => None,
        }
    }
}

/// One billed unit of work, joined to its owning invoice after the fact.
///
/// The invoice total rides along for diagnostics only; it is never an
/// amount-extraction candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LineItem {
    pub record: RawRecord,
    pub invoice_id: Option<String>,
    pub invoice_period: Option<String>,
    pub invoice_total: Option<f64>,
}

impl LineItem {
    pub fn from_record(record: RawRecord) -> Self {
        Self {
            record,
            invoice_id: None,
            invoice_period: None,
            invoice_total: None,
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.record.text_of(&["description"])
    }

    pub fn category(&self) -> Option<&str> {
        self.record.text_of(&["category"])
    }

    pub fn product(&self) -> Option<&str> {
        self.record.text_of(&["product"])
    }

    pub fn project_label(&self) -> Option<&str> {
        self.record.text_of(&["project", "projectLabel", "projectId"])
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.record.text_of(&["resourceId", "resource"])
    }

    /// The date this item is attributed to, in priority order: invoice
    /// period, `start`, `createdAt`, `date`. `None` means no field parsed;
    /// window filtering treats that as fail-open.
    pub fn effective_date(&self) -> Option<NaiveDate> {
        if let Some(period) = &self.invoice_period {
            if let Some(date) = parse_month_label(period) {
                return Some(date);
            }
        }
        if let Some(period) = self.record.text_of(&["invoicePeriod", "period"]) {
            if let Some(date) = parse_month_label(period) {
                return Some(date);
            }
        }
        self.record
            .date_of(&["start", "startDate", "createdAt", "date"])
    }
}

/// One billing-period statement. Line items arrive from a separate fetch and
/// reference it by `invoice_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Invoice {
    pub invoice_id: String,
    pub period: String,
    pub amount: f64,
    pub created_at: Option<NaiveDate>,
}

impl Invoice {
    pub fn effective_date(&self) -> Option<NaiveDate> {
        parse_month_label(&self.period).or(self.created_at)
    }
}

/// The normalized shape call sites hand to the persistence collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachedRecordSet {
    pub invoices: Vec<Invoice>,
    pub line_items: Vec<LineItem>,
}

impl CachedRecordSet {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(CachedRecordSet)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
