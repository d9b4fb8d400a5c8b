use crate::schema::{Invoice, LineItem};
use crate::utils::months_back;
use chrono::{Datelike, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Named relative ranges used to scope invoices and line items before
/// aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum TimeWindow {
    LastMonth,
    Last3Months,
    Last6Months,
    Last12Months,
    AllTime,
}

impl TimeWindow {
    /// Nominal look-back in months; `None` for the unbounded windows.
    pub fn nominal_months(self) -> Option<u32> {
        match self {
            TimeWindow::LastMonth => Some(1),
            TimeWindow::Last3Months => Some(3),
            TimeWindow::Last6Months => Some(6),
            TimeWindow::Last12Months => Some(12),
            TimeWindow::AllTime => None,
        }
    }

    /// Look-back cutoff including the one-month arrival buffer. Records for
    /// the edge month keep trickling in after the month closes, so "3
    /// months" subtracts 4.
    fn buffered_cutoff(self, today: NaiveDate) -> Option<NaiveDate> {
        self.nominal_months().map(|n| months_back(today, n + 1))
    }
}

/// Dates before this are treated as corrupt when invoices are scoped to
/// `AllTime`.
fn invoice_epoch_floor() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
}

/// Selects the invoices inside `window`, anchored at `today`.
///
/// `LastMonth` is anchored to the latest invoice's calendar month rather
/// than the clock: it selects exactly that month, and yields nothing if no
/// invoice falls in it. The remaining windows are buffered look-backs from
/// `today`; `AllTime` keeps the epoch floor so corrupt dates don't surface.
pub fn filter_invoices_at(
    invoices: &[Invoice],
    window: TimeWindow,
    today: NaiveDate,
) -> Vec<Invoice> {
    match window {
        TimeWindow::LastMonth => {
            let anchor = invoices
                .iter()
                .filter_map(|inv| inv.effective_date())
                .max();
            let Some(anchor) = anchor else {
                return Vec::new();
            };
            invoices
                .iter()
                .filter(|inv| {
                    inv.effective_date().is_some_and(|d| {
                        d.year() == anchor.year() && d.month() == anchor.month()
                    })
                })
                .cloned()
                .collect()
        }
        TimeWindow::AllTime => {
            let floor = invoice_epoch_floor();
            invoices
                .iter()
                .filter(|inv| inv.effective_date().is_some_and(|d| d >= floor))
                .cloned()
                .collect()
        }
        _ => {
            let cutoff = window
                .buffered_cutoff(today)
                .expect("bounded window has a cutoff");
            invoices
                .iter()
                .filter(|inv| inv.effective_date().is_some_and(|d| d >= cutoff))
                .cloned()
                .collect()
        }
    }
}

pub fn filter_invoices(invoices: &[Invoice], window: TimeWindow) -> Vec<Invoice> {
    filter_invoices_at(invoices, window, Utc::now().date_naive())
}

/// Selects the line items inside `window`, anchored at `today`.
///
/// Line items are queried interactively against the clock, so every bounded
/// window is a plain look-back with no latest-record anchoring, and
/// `AllTime` imposes no floor at all. Items with no derivable date are
/// included: under-filtering beats silently hiding data.
pub fn filter_line_items_at(
    items: &[LineItem],
    window: TimeWindow,
    today: NaiveDate,
) -> Vec<LineItem> {
    let Some(cutoff) = window.buffered_cutoff(today) else {
        return items.to_vec();
    };

    items
        .iter()
        .filter(|item| item.effective_date().map_or(true, |d| d >= cutoff))
        .cloned()
        .collect()
}

pub fn filter_line_items(items: &[LineItem], window: TimeWindow) -> Vec<LineItem> {
    filter_line_items_at(items, window, Utc::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RawRecord;

    fn invoice(id: &str, period: &str) -> Invoice {
        Invoice {
            invoice_id: id.to_string(),
            period: period.to_string(),
            amount: 100.0,
            created_at: None,
        }
    }

    fn dated_item(start: &str) -> LineItem {
        LineItem::from_record(RawRecord::from_pairs([("start", start)]))
    }

    #[test]
    fn test_last_month_anchors_to_latest_invoice() {
        let invoices = vec![
            invoice("a", "2024-01"),
            invoice("b", "2024-02"),
            invoice("c", "2024-03"),
        ];
        // Far in the future: the anchor must stay the March invoice.
        let today = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        let selected = filter_invoices_at(&invoices, TimeWindow::LastMonth, today);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].invoice_id, "c");
    }

    #[test]
    fn test_last_month_empty_without_invoices() {
        let selected = filter_invoices_at(
            &[],
            TimeWindow::LastMonth,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        );
        assert!(selected.is_empty());
    }

    #[test]
    fn test_bounded_window_includes_arrival_buffer() {
        let invoices = vec![
            invoice("old", "2023-12"),
            invoice("edge", "2024-02"),
            invoice("new", "2024-05"),
        ];
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        // Nominal 3 months subtracts 4: cutoff 2024-02-15, so the edge
        // invoice (parsed to 2024-02-01) falls out but 2024-05 stays.
        let selected = filter_invoices_at(&invoices, TimeWindow::Last3Months, today);
        let ids: Vec<&str> = selected.iter().map(|i| i.invoice_id.as_str()).collect();
        assert_eq!(ids, vec!["new"]);
    }

    #[test]
    fn test_all_time_invoices_reject_corrupt_dates() {
        let invoices = vec![invoice("corrupt", "1970-01"), invoice("ok", "2024-01")];
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let selected = filter_invoices_at(&invoices, TimeWindow::AllTime, today);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].invoice_id, "ok");
    }

    #[test]
    fn test_all_time_line_items_unfiltered() {
        let items = vec![dated_item("1970-01-05"), dated_item("2024-03-05")];
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let selected = filter_line_items_at(&items, TimeWindow::AllTime, today);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_undated_items_fail_open() {
        let items = vec![
            LineItem::from_record(RawRecord::from_pairs([("description", "no date at all")])),
            dated_item("2020-01-01"),
        ];
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let selected = filter_line_items_at(&items, TimeWindow::Last3Months, today);
        assert_eq!(selected.len(), 1);
        assert!(selected[0].effective_date().is_none());
    }

    #[test]
    fn test_window_monotonicity() {
        let today = NaiveDate::from_ymd_opt(2024, 12, 15).unwrap();
        let items: Vec<LineItem> = (1..=12)
            .map(|m| dated_item(&format!("2024-{:02}-10", m)))
            .chain(std::iter::once(dated_item("2022-05-01")))
            .collect();

        let all = filter_line_items_at(&items, TimeWindow::AllTime, today);
        let m12 = filter_line_items_at(&items, TimeWindow::Last12Months, today);
        let m6 = filter_line_items_at(&items, TimeWindow::Last6Months, today);
        let m3 = filter_line_items_at(&items, TimeWindow::Last3Months, today);

        assert!(all.len() >= m12.len());
        assert!(m12.len() >= m6.len());
        assert!(m6.len() >= m3.len());

        let contains = |set: &[LineItem], item: &LineItem| set.iter().any(|i| i == item);
        for item in &m3 {
            assert!(contains(&m6, item));
        }
        for item in &m6 {
            assert!(contains(&m12, item));
        }
        for item in &m12 {
            assert!(contains(&all, item));
        }
    }
}
