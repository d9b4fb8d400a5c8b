use crate::error::{Result, SpendError};
use crate::ingestion::{invoices_from_json, line_items_from_json, IngestContext};
use crate::schema::{Invoice, LineItem};
use futures::future::join_all;
use log::{debug, warn};
use reqwest::Client;
use serde_json::Value;

/// HTTP client for the billing export API: bearer-authenticated invoice
/// listing with `next`-link pagination, plus per-invoice line-item fetches.
#[derive(Clone)]
pub struct BillingClient {
    client: Client,
    base_url: String,
    token: String,
}

impl BillingClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpendError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    /// Lists every invoice, following `next` links until the provider stops
    /// returning one.
    pub async fn list_invoices(&self) -> Result<Vec<Invoice>> {
        let mut url = format!("{}/invoices", self.base_url);
        let mut invoices = Vec::new();

        loop {
            let page = self.get_json(&url).await?;
            invoices.extend(invoices_from_json(&page)?);

            match page.get("next").and_then(Value::as_str) {
                Some(next) if !next.is_empty() => url = next.to_string(),
                _ => break,
            }
        }

        debug!("listed {} invoices", invoices.len());
        Ok(invoices)
    }

    pub async fn fetch_line_items(
        &self,
        invoice: &Invoice,
        ctx: &mut IngestContext,
    ) -> Result<Vec<LineItem>> {
        let url = format!("{}/invoices/{}/items", self.base_url, invoice.invoice_id);
        let payload = self.get_json(&url).await?;
        line_items_from_json(invoice, &payload, ctx)
    }

    /// Fans out one request per invoice and joins them all. A failed fetch
    /// drops that invoice's items from the batch with a warning; it never
    /// aborts the others.
    pub async fn fetch_all_line_items(&self, invoices: &[Invoice]) -> Vec<LineItem> {
        let fetches = invoices.iter().map(|invoice| async move {
            let url = format!("{}/invoices/{}/items", self.base_url, invoice.invoice_id);
            (invoice, self.get_json(&url).await)
        });

        let mut ctx = IngestContext::new();
        let mut items = Vec::new();
        for (invoice, payload) in join_all(fetches).await {
            match payload.and_then(|p| line_items_from_json(invoice, &p, &mut ctx)) {
                Ok(batch) => items.extend(batch),
                Err(err) => warn!(
                    "skipping line items for invoice {}: {}",
                    invoice.invoice_id, err
                ),
            }
        }

        debug!(
            "fetched {} line items across {} invoices",
            items.len(),
            invoices.len()
        );
        items
    }
}
