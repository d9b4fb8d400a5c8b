use crate::error::{Result, SpendError};
use crate::normalize::parse_money;
use crate::schema::{FieldValue, Invoice, LineItem, RawRecord};
use crate::utils::parse_flexible_date;
use log::{debug, warn};
use serde_json::Value;

/// Keys an invoice list may hide under when the payload is an object rather
/// than a bare array.
const LIST_WRAPPER_KEYS: &[&str] = &["invoices", "items", "data", "results"];

const INVOICE_ID_KEYS: &[&str] = &["invoiceId", "invoice_id", "id", "number"];
const INVOICE_PERIOD_KEYS: &[&str] = &["period", "invoicePeriod", "month"];
const INVOICE_AMOUNT_KEYS: &[&str] = &["amount", "total", "amountDue"];
const INVOICE_CREATED_KEYS: &[&str] = &["createdAt", "created", "date"];

/// Per-ingest state. Replaces a module-global "already described" flag: the
/// first record batch gets its field names logged once, and the flag travels
/// with the call context instead of the process.
#[derive(Debug, Default)]
pub struct IngestContext {
    pub schema_described: bool,
}

impl IngestContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn describe_schema(&mut self, record: &RawRecord) {
        if self.schema_described {
            return;
        }
        self.schema_described = true;
        debug!("billing export schema: {:?}", record.field_names());
    }
}

fn unwrap_list(payload: &Value) -> Option<&Vec<Value>> {
    if let Some(rows) = payload.as_array() {
        return Some(rows);
    }
    let object = payload.as_object()?;
    LIST_WRAPPER_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(|v| v.as_array())
}

fn string_field(object: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|key| object.get(*key)).find_map(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn money_field(object: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().filter_map(|key| object.get(*key)).find_map(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_money(s),
        _ => None,
    })
}

/// Maps a provider invoice-list payload into typed invoices.
///
/// The list may be a bare array or wrapped in a single-key object; anything
/// else is the one malformed-shape error the adapter raises. Rows that are
/// not objects or carry no usable id are logged and skipped, never fatal.
pub fn invoices_from_json(payload: &Value) -> Result<Vec<Invoice>> {
    let rows = unwrap_list(payload).ok_or_else(|| {
        SpendError::PayloadShape("expected an invoice array or a wrapping object".to_string())
    })?;

    let mut invoices = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(object) = row.as_object() else {
            warn!("skipping non-object invoice row: {}", row);
            continue;
        };

        let Some(invoice_id) = string_field(object, INVOICE_ID_KEYS) else {
            warn!("skipping invoice row without an id");
            continue;
        };

        invoices.push(Invoice {
            invoice_id,
            period: string_field(object, INVOICE_PERIOD_KEYS).unwrap_or_default(),
            amount: money_field(object, INVOICE_AMOUNT_KEYS).unwrap_or(0.0),
            created_at: string_field(object, INVOICE_CREATED_KEYS)
                .and_then(|s| parse_flexible_date(&s)),
        });
    }

    Ok(invoices)
}

/// Converts flat JSON rows into ordered records, preserving delivery order
/// of both rows and fields.
pub fn records_from_json(payload: &Value) -> Result<Vec<RawRecord>> {
    let rows = unwrap_list(payload).ok_or_else(|| {
        SpendError::PayloadShape("expected a record array or a wrapping object".to_string())
    })?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(object) = row.as_object() else {
            warn!("skipping non-object billing row: {}", row);
            continue;
        };

        let mut record = RawRecord::new();
        for (name, value) in object {
            let field = match value {
                Value::Number(n) => match n.as_f64() {
                    Some(f) => FieldValue::Number(f),
                    None => continue,
                },
                Value::String(s) => FieldValue::Text(s.clone()),
                Value::Bool(b) => FieldValue::Text(b.to_string()),
                Value::Null => continue,
                other => FieldValue::Text(other.to_string()),
            };
            record.push(name.clone(), field);
        }
        records.push(record);
    }

    Ok(records)
}

/// Tags each record with its owning invoice. The invoice total rides along
/// for diagnostics; amount extraction deny-lists it.
pub fn line_items_for_invoice(
    invoice: &Invoice,
    records: Vec<RawRecord>,
    ctx: &mut IngestContext,
) -> Vec<LineItem> {
    if let Some(first) = records.first() {
        ctx.describe_schema(first);
    }

    records
        .into_iter()
        .map(|record| LineItem {
            record,
            invoice_id: Some(invoice.invoice_id.clone()),
            invoice_period: Some(invoice.period.clone()),
            invoice_total: Some(invoice.amount),
        })
        .collect()
}

/// Convenience for a raw per-invoice payload: tokenized rows in, tagged line
/// items out.
pub fn line_items_from_json(
    invoice: &Invoice,
    payload: &Value,
    ctx: &mut IngestContext,
) -> Result<Vec<LineItem>> {
    let records = records_from_json(payload)?;
    Ok(line_items_for_invoice(invoice, records, ctx))
}
