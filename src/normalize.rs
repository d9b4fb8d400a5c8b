use crate::schema::{canonical_key, FieldValue, RawRecord};

/// Field literally named for the primary currency; checked before anything
/// else during amount extraction.
const PRIMARY_CURRENCY_FIELD: &str = "usd";

/// Conventional amount field names, tried in fixed order after the currency
/// field.
const AMOUNT_FIELDS: &[&str] = &["amount", "cost", "price", "charge"];

/// Canonical keys that must never be mistaken for a line-item amount.
/// The invoice's own total is an order of magnitude larger than any line and
/// would corrupt every aggregate it touched; `hours` is a quantity; date and
/// period fields contain dashes that would money-parse into huge values.
const AMOUNT_DENY_LIST: &[&str] = &[
    "hours",
    "invoiceamount",
    "invoicetotal",
    "totalamount",
    "invoiceperiod",
    "period",
    "date",
    "start",
    "startdate",
    "enddate",
    "createdat",
];

const DISCOUNT_KEYWORDS: &[&str] = &["discount", "credit", "refund", "rebate", "adjustment"];

/// Ordered discount taxonomy: first substring hit wins, falling through to
/// the generic label.
const DISCOUNT_RULES: &[(&str, &str)] = &[
    ("iaas", "IaaS Discount"),
    ("paas", "PaaS Discount"),
    ("contract", "Contract Discount"),
];

pub const DEFAULT_DISCOUNT_LABEL: &str = "Discounts";

/// Parses a currency-formatted string, e.g. `"-$1,779.55"` -> `-1779.55`.
///
/// Every character that is not a digit or decimal point is stripped; a minus
/// sign appearing before the first digit negates the result.
pub fn parse_money(raw: &str) -> Option<f64> {
    let mut cleaned = String::with_capacity(raw.len());
    let mut negative = false;

    for c in raw.chars() {
        if c.is_ascii_digit() || c == '.' {
            cleaned.push(c);
        } else if c == '-' && cleaned.is_empty() {
            negative = true;
        }
    }

    if cleaned.is_empty() {
        return None;
    }

    cleaned.parse::<f64>().ok().map(|v| if negative { -v } else { v })
}

fn looks_like_currency(text: &str) -> bool {
    text.contains('$') || text.contains('-')
}

fn field_amount(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Number(n) => Some(*n),
        FieldValue::Text(s) => parse_money(s),
    }
}

/// Extracts the signed monetary value of a record. Total function: any
/// record yields a number, falling back to 0.0.
///
/// Priority order, first match wins:
/// 1. the primary currency field (`USD`), parsed leniently;
/// 2. `amount`/`cost`/`price`/`charge`, first one present and numeric;
/// 3. a scan of the remaining fields in delivery order, skipping the deny
///    list, taking the first currency-like string or plain numeric value.
///
/// Negative values are accepted at every step; a filter that kept only
/// positives would silently drop every discount.
pub fn extract_amount(record: &RawRecord) -> f64 {
    if let Some(value) = record.get(PRIMARY_CURRENCY_FIELD) {
        if let Some(amount) = field_amount(value) {
            return amount;
        }
    }

    for name in AMOUNT_FIELDS {
        if let Some(value) = record.get(name) {
            if let Some(amount) = value.as_number() {
                return amount;
            }
        }
    }

    for (name, value) in record.iter() {
        let key = canonical_key(name);
        if key == PRIMARY_CURRENCY_FIELD
            || AMOUNT_FIELDS.contains(&key.as_str())
            || AMOUNT_DENY_LIST.contains(&key.as_str())
        {
            continue;
        }
        match value {
            FieldValue::Number(n) => return *n,
            FieldValue::Text(s) => {
                if looks_like_currency(s) {
                    if let Some(amount) = parse_money(s) {
                        return amount;
                    }
                } else if let Ok(amount) = s.trim().parse::<f64>() {
                    return amount;
                }
            }
        }
    }

    0.0
}

/// Fields whose text participates in discount keyword matching.
const DISCOUNT_TEXT_FIELDS: &[&str] = &["description", "category", "product", "name"];

/// A record is a discount if its amount is negative OR any descriptive field
/// carries a discount keyword. The OR matters: a $0.00 line labeled
/// "Contract Discount" still classifies as a discount.
pub fn is_discount(record: &RawRecord) -> bool {
    if extract_amount(record) < 0.0 {
        return true;
    }

    DISCOUNT_TEXT_FIELDS.iter().any(|&field| {
        record
            .text_of(&[field])
            .map(|text| {
                let lowered = text.to_lowercase();
                DISCOUNT_KEYWORDS.iter().any(|kw| lowered.contains(kw))
            })
            .unwrap_or(false)
    })
}

/// Maps a discount record onto the fixed discount taxonomy.
pub fn discount_category(record: &RawRecord) -> &'static str {
    let haystack: String = ["description", "category", "product"]
        .iter()
        .filter_map(|&field| record.text_of(&[field]))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    for &(needle, label) in DISCOUNT_RULES {
        if haystack.contains(needle) {
            return label;
        }
    }

    DEFAULT_DISCOUNT_LABEL
}
