use anyhow::Result;
use chrono::NaiveDate;
use cloud_spend_aggregator::*;
use serde_json::json;

fn item(pairs: &[(&str, &str)]) -> LineItem {
    LineItem::from_record(RawRecord::from_pairs(
        pairs.iter().map(|&(k, v)| (k, FieldValue::from(v))),
    ))
}

/// Stand-in for the record-tokenizer collaborator: delimited text in, one
/// flat record per row, numeric-looking values coerced to numbers.
fn tokenize_csv(data: &str) -> Result<Vec<RawRecord>> {
    let mut reader = csv::Reader::from_reader(data.as_bytes());
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = RawRecord::new();
        for (name, value) in headers.iter().zip(row.iter()) {
            match value.trim().parse::<f64>() {
                Ok(n) => record.push(name, n),
                Err(_) => record.push(name, value),
            }
        }
        records.push(record);
    }
    Ok(records)
}

#[test]
fn test_sign_preservation_in_every_dimension() {
    let items = vec![
        item(&[
            ("category", "Compute"),
            ("project", "data-platform"),
            ("product", "VM"),
            ("invoicePeriod", "2024-03"),
            ("USD", "100.00"),
        ]),
        item(&[
            ("category", "Compute"),
            ("project", "data-platform"),
            ("product", "VM"),
            ("invoicePeriod", "2024-03"),
            ("description", "Sustained use credit"),
            ("USD", "-25.00"),
        ]),
    ];

    for dimension in [
        Dimension::Category,
        Dimension::Project,
        Dimension::Product,
        Dimension::Month,
    ] {
        let buckets = aggregate(&items, dimension);
        let total: f64 = buckets.values().sum();
        assert!(
            (total - 75.0).abs() < 1e-9,
            "{:?} must net the credit, got {}",
            dimension,
            total
        );
    }
}

#[test]
fn test_aggregation_idempotent_and_order_independent() {
    let mut items: Vec<LineItem> = (0..40)
        .map(|i| {
            let sign = if i % 5 == 0 { "-" } else { "" };
            item(&[
                ("category", ["Compute", "Storage", "Network"][i % 3]),
                ("USD", &format!("{}{}.25", sign, i + 1)),
            ])
        })
        .collect();

    let first = aggregate(&items, Dimension::Category);
    let second = aggregate(&items, Dimension::Category);
    assert_eq!(first, second, "same input twice must match exactly");

    items.reverse();
    let reversed = aggregate(&items, Dimension::Category);
    items.rotate_left(17);
    let rotated = aggregate(&items, Dimension::Category);

    for (label, total) in &first {
        assert!((total - reversed[label]).abs() < 1e-9);
        assert!((total - rotated[label]).abs() < 1e-9);
    }
}

#[test]
fn test_deny_list_never_extracts_invoice_total() {
    let record = RawRecord::from_pairs([
        ("USD", FieldValue::from("25.00")),
        ("invoice_amount", FieldValue::from("4000.00")),
    ]);
    assert!((extract_amount(&record) - 25.0).abs() < 1e-9);
}

#[test]
fn test_discount_netting_scenario() {
    let items = vec![
        item(&[("category", "Compute"), ("USD", "100.00")]),
        item(&[
            ("category", "Compute"),
            ("description", "Contract Discount"),
            ("USD", "-20.00"),
        ]),
    ];

    let buckets = aggregate(&items, Dimension::Category);
    assert_eq!(buckets.len(), 1);
    assert!((buckets["Compute"] - 80.0).abs() < 1e-9);

    // The same discount with no category of its own lands in the taxonomy.
    let orphan = vec![item(&[
        ("description", "Contract Discount"),
        ("USD", "-20.00"),
    ])];
    let buckets = aggregate(&orphan, Dimension::Category);
    assert!(buckets.contains_key("Contract Discount"));
}

#[test]
fn test_month_sort_scenario() {
    let items = vec![
        item(&[("invoicePeriod", "2024-11"), ("USD", "1.00")]),
        item(&[("invoicePeriod", "2024-2"), ("USD", "1.00")]),
        item(&[("invoicePeriod", "2024-10"), ("USD", "1.00")]),
    ];

    let series = monthly_series(&items);
    let periods: Vec<&str> = series.iter().map(|m| m.period.as_str()).collect();
    assert_eq!(periods, vec!["2024-02", "2024-10", "2024-11"]);
}

#[test]
fn test_last_month_anchor_scenario() {
    let invoices: Vec<Invoice> = ["2024-01", "2024-02", "2024-03"]
        .iter()
        .enumerate()
        .map(|(i, period)| Invoice {
            invoice_id: format!("inv-{}", i),
            period: period.to_string(),
            amount: 100.0,
            created_at: None,
        })
        .collect();

    for today in [
        NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(),
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
    ] {
        let selected = filter_invoices_at(&invoices, TimeWindow::LastMonth, today);
        assert_eq!(selected.len(), 1, "anchor must ignore the clock");
        assert_eq!(selected[0].period, "2024-03");
    }
}

#[test]
fn test_window_monotonicity_end_to_end() {
    let today = NaiveDate::from_ymd_opt(2024, 12, 10).unwrap();
    let items: Vec<LineItem> = (0..30)
        .map(|i| {
            let month = i % 12 + 1;
            item(&[
                ("start", &format!("2024-{:02}-05", month)),
                ("USD", "1.00"),
            ])
        })
        .chain(std::iter::once(item(&[("description", "undated row")])))
        .collect();

    let windows = [
        TimeWindow::Last3Months,
        TimeWindow::Last6Months,
        TimeWindow::Last12Months,
        TimeWindow::AllTime,
    ];
    let counts: Vec<usize> = windows
        .iter()
        .map(|&w| filter_line_items_at(&items, w, today).len())
        .collect();

    assert!(counts[0] <= counts[1] && counts[1] <= counts[2] && counts[2] <= counts[3]);
    // The undated row fails open into every window.
    for &w in &windows {
        assert!(filter_line_items_at(&items, w, today)
            .iter()
            .any(|i| i.effective_date().is_none()));
    }
}

#[test]
fn test_forecast_regime_boundaries() {
    let make = |n: usize| -> Vec<MonthlyTotal> {
        (0..n)
            .map(|i| MonthlyTotal {
                period: format!("{:04}-{:02}", 2023 + i / 12, i % 12 + 1),
                total: 100.0 + i as f64,
            })
            .collect()
    };

    let two = compute_trend_and_forecast(&make(2));
    assert!(two.confidence_label.contains("Damped growth"));

    let three = compute_trend_and_forecast(&make(3));
    assert!(three.confidence_label.contains("Linear regression"));

    let six = compute_trend_and_forecast(&make(6));
    assert!(six.confidence_label.contains("Weighted moving average"));

    let twelve = compute_trend_and_forecast(&make(12));
    assert!(twelve.confidence_label.contains("Seasonal ensemble"));
}

#[test]
fn test_csv_export_ingestion_end_to_end() -> Result<()> {
    let export = "\
description,category,project,hours,USD
Standard VM usage,Compute,data-platform,160,$250.00
Object storage,Storage,data-platform,0,$40.00
Contract Discount,,data-platform,0,-$20.00
Support plan,Support,,8,30
";

    let records = tokenize_csv(export)?;
    assert_eq!(records.len(), 4);

    let invoice = Invoice {
        invoice_id: "inv-2024-03".to_string(),
        period: "2024-03".to_string(),
        amount: 300.0,
        created_at: None,
    };
    let mut ctx = IngestContext::new();
    let items = line_items_for_invoice(&invoice, records, &mut ctx);

    let report = SpendAnalyzer::analyze_at(
        &items,
        TimeWindow::AllTime,
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
    );

    assert!((report.net_total - 300.0).abs() < 1e-9);
    assert!((report.by_category["Compute"] - 250.0).abs() < 1e-9);
    // The uncategorized discount routes through the taxonomy.
    assert!((report.by_category["Contract Discount"] + 20.0).abs() < 1e-9);
    // `hours` is deny-listed: the support row extracts its plain 30, not 8.
    assert!((report.by_category["Support"] - 30.0).abs() < 1e-9);
    assert_eq!(report.discount_count, 1);

    // Every item inherited the invoice month.
    assert_eq!(report.monthly.len(), 1);
    assert_eq!(report.monthly[0].period, "2024-03");
    Ok(())
}

#[test]
fn test_json_payload_to_report_end_to_end() -> Result<()> {
    let invoice_payload = json!({
        "invoices": [
            {"invoiceId": "inv-1", "period": "2024-01", "amount": 130.0, "createdAt": "2024-02-01"},
            {"invoiceId": "inv-2", "period": "2024-02", "amount": 145.0, "createdAt": "2024-03-01"}
        ],
        "next": null
    });
    let invoices = invoices_from_json(&invoice_payload)?;
    assert_eq!(invoices.len(), 2);

    let item_payloads = [
        json!([
            {"description": "VM usage", "category": "Compute", "USD": "100.00"},
            {"description": "Egress", "category": "Network", "USD": "30.00"}
        ]),
        json!([
            {"description": "VM usage", "category": "Compute", "USD": "120.00"},
            {"description": "Promotional credit", "USD": "-5.00"},
            {"description": "Egress", "category": "Network", "USD": "30.00"}
        ]),
    ];

    let mut ctx = IngestContext::new();
    let mut items = Vec::new();
    for (invoice, payload) in invoices.iter().zip(&item_payloads) {
        items.extend(line_items_from_json(invoice, payload, &mut ctx)?);
    }
    assert_eq!(items.len(), 5);

    let report = SpendAnalyzer::analyze_at(
        &items,
        TimeWindow::Last6Months,
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
    );

    assert!((report.net_total - 275.0).abs() < 1e-9);
    assert!((report.by_category["Compute"] - 220.0).abs() < 1e-9);
    assert!((report.by_category["Network"] - 60.0).abs() < 1e-9);
    assert!((report.by_category["Discounts"] + 5.0).abs() < 1e-9);

    assert_eq!(report.monthly.len(), 2);
    assert_eq!(report.forecast.direction, TrendDirection::Up);
    assert!(report
        .forecast
        .confidence_label
        .contains("Damped growth"));

    // The cacheable shapes round-trip for the persistence collaborator.
    let cached = CachedRecordSet {
        invoices,
        line_items: items,
    };
    let json = serde_json::to_string(&cached)?;
    let back: CachedRecordSet = serde_json::from_str(&json)?;
    assert_eq!(back.invoices.len(), 2);
    assert_eq!(back.line_items.len(), 5);
    Ok(())
}

#[test]
fn test_presentation_order_is_deterministic() {
    let items = vec![
        item(&[("category", "Compute"), ("USD", "50.00")]),
        item(&[("category", "Storage"), ("USD", "50.00")]),
        item(&[("category", "Network"), ("USD", "80.00")]),
        item(&[
            ("description", "Platform credit"),
            ("USD", "-10.00"),
        ]),
    ];

    let buckets = aggregate(&items, Dimension::Category);
    let sorted = sorted_buckets(&buckets);
    let labels: Vec<&str> = sorted.iter().map(|(l, _)| l.as_str()).collect();
    assert_eq!(labels, vec!["Network", "Compute", "Storage", "Discounts"]);
}
