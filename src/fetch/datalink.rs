use std::path::Path;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

use crate::conf::ApiConfig;
use crate::core::SyncError;

use super::response::{ExportReply, TablePage, api_error_message, rows_to_batch};
use super::{DataFetcher, RowFilter};

/// Nasdaq Data Link datatables client.
pub struct DataLinkClient {
    http: Client,
    config: ApiConfig,
}

fn fetch_err(err: reqwest::Error) -> SyncError {
    // Request URLs carry the API key.
    SyncError::FetchError(err.without_url().to_string())
}

impl DataLinkClient {
    pub fn new(config: &ApiConfig) -> Result<Self, SyncError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("linksync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::ConfigError(format!("building HTTP client: {}", e)))?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/datatables/{}.json",
            self.config.base_url.trim_end_matches('/'),
            table
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<T, SyncError> {
        let response = self
            .http
            .get(url)
            .query(&[("api_key", self.config.api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(fetch_err)?;

        let status = response.status();
        let body = response.bytes().await.map_err(fetch_err)?;
        if !status.is_success() {
            return Err(SyncError::FetchError(format!(
                "{} returned {}: {}",
                url,
                status,
                api_error_message(&body)
            )));
        }

        serde_json::from_slice(&body)
            .map_err(|e| SyncError::FetchError(format!("decoding response of {}: {}", url, e)))
    }

    async fn download(&self, link: &str, destination: &Path) -> Result<u64, SyncError> {
        let mut response = self
            .http
            .get(link)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_err)?;

        let mut file = tokio::fs::File::create(destination).await.map_err(|e| {
            SyncError::FetchError(format!("creating {}: {}", destination.display(), e))
        })?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(fetch_err)? {
            file.write_all(&chunk).await.map_err(|e| {
                SyncError::FetchError(format!("writing {}: {}", destination.display(), e))
            })?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| {
            SyncError::FetchError(format!("writing {}: {}", destination.display(), e))
        })?;
        Ok(written)
    }
}

#[async_trait]
impl DataFetcher for DataLinkClient {
    async fn get_table(&self, table: &str, filter: &RowFilter) -> Result<RecordBatch, SyncError> {
        let url = self.table_url(table);
        let base_query = vec![
            (filter.column.clone(), filter.value.clone()),
            ("qopts.per_page".to_string(), self.config.per_page.to_string()),
        ];

        let mut columns = Vec::new();
        let mut rows = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            if pages == self.config.page_limit {
                return Err(SyncError::FetchError(format!(
                    "{}: more than {} pages for {}={}; raise api.page_limit",
                    table, self.config.page_limit, filter.column, filter.value
                )));
            }
            pages += 1;

            let mut query = base_query.clone();
            if let Some(cursor_id) = &cursor {
                query.push(("qopts.cursor_id".to_string(), cursor_id.clone()));
            }

            let page: TablePage = self.get_json(&url, &query).await?;
            if columns.is_empty() {
                columns = page.datatable.columns;
            }
            debug!("{}: page {} has {} rows", table, pages, page.datatable.data.len());
            rows.extend(page.datatable.data);

            match page.meta.next_cursor_id {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        rows_to_batch(&columns, &rows)
    }

    async fn export_table(&self, table: &str, destination: &Path) -> Result<(), SyncError> {
        let url = self.table_url(table);
        let query = vec![("qopts.export".to_string(), "true".to_string())];
        let attempts = self.config.export_poll_attempts.max(1);

        for attempt in 1..=attempts {
            let reply: ExportReply = self.get_json(&url, &query).await?;
            let file = reply.datatable_bulk_download.file;
            let status = file.status.to_ascii_lowercase();

            // A regenerating export still serves the previous snapshot.
            match file.link {
                Some(link) if status == "fresh" || status == "regenerating" => {
                    let bytes = self.download(&link, destination).await?;
                    info!("Downloaded {} export ({} bytes)", table, bytes);
                    return Ok(());
                }
                _ => {
                    info!(
                        "Export of {} is {} (attempt {}/{}), waiting",
                        table, status, attempt, attempts
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.config.export_poll_interval).await;
                    }
                }
            }
        }

        Err(SyncError::FetchError(format!(
            "{}: export not ready after {} attempts",
            table, attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_table_url() {
        let config = ApiConfig {
            base_url: "http://localhost:9000/api/v3/".to_string(),
            ..ApiConfig::default()
        };
        let client = DataLinkClient::new(&config).unwrap();
        assert_eq!(
            client.table_url("SHARADAR/SEP"),
            "http://localhost:9000/api/v3/datatables/SHARADAR/SEP.json"
        );
    }

    #[test]
    fn test_client_builds_with_short_timeout() {
        let config = ApiConfig {
            timeout: Duration::from_millis(10),
            ..ApiConfig::default()
        };
        assert!(DataLinkClient::new(&config).is_ok());
    }
}
