use anyhow::{Result, anyhow, bail};
use std::time::{Duration, Instant};

use crate::dsort::protocol::{
    ENDPOINT_SORT, StartSortResponse, metrics_path, remove_path, sort_path,
};
use crate::dsort::types::{SortJobInfo, SortSpec, SortUuid};
use crate::error::ErrorResponse;
use crate::metrics::types::SortMetrics;
use crate::storage::protocol::{ListObjectsResponse, bucket_path, object_path};

pub struct SortClient {
    base_url: String,
    http_client: reqwest::Client,
    timeout: Duration,
    attempts: usize,
}

impl SortClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
            attempts: 3,
        }
    }

    pub fn with_retry(mut self, timeout: Duration, attempts: usize) -> Self {
        self.timeout = timeout;
        self.attempts = attempts.max(1);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // --- Sort API ---

    pub async fn start_sort(&self, spec: &SortSpec) -> Result<SortUuid> {
        // A retried POST could start the same sort twice
        let request = self.http_client.post(self.url(ENDPOINT_SORT)).json(spec);
        let response = checked(self.send_once(request).await?).await?;
        let body: StartSortResponse = response.json().await?;
        Ok(body.uuid)
    }

    pub async fn abort_sort(&self, uuid: &SortUuid) -> Result<()> {
        let request = self.http_client.delete(self.url(&sort_path(uuid)));
        checked(self.send_with_retry(request).await?).await?;
        Ok(())
    }

    pub async fn get_sort_metrics(&self, uuid: &SortUuid) -> Result<SortMetrics> {
        let request = self.http_client.get(self.url(&metrics_path(uuid)));
        let response = checked(self.send_with_retry(request).await?).await?;
        Ok(response.json().await?)
    }

    pub async fn get_sort(&self, uuid: &SortUuid) -> Result<SortJobInfo> {
        let request = self.http_client.get(self.url(&sort_path(uuid)));
        let response = checked(self.send_with_retry(request).await?).await?;
        Ok(response.json().await?)
    }

    pub async fn list_sorts(&self) -> Result<Vec<SortJobInfo>> {
        let request = self.http_client.get(self.url(ENDPOINT_SORT));
        let response = checked(self.send_with_retry(request).await?).await?;
        Ok(response.json().await?)
    }

    pub async fn remove_sort(&self, uuid: &SortUuid) -> Result<()> {
        let request = self.http_client.post(self.url(&remove_path(uuid)));
        checked(self.send_once(request).await?).await?;
        Ok(())
    }

    /// Polls metrics until every node finished all phases or any node reports an abort.
    pub async fn wait_for_sort(
        &self,
        uuid: &SortUuid,
        poll: Duration,
        timeout: Duration,
    ) -> Result<SortMetrics> {
        let started = Instant::now();
        loop {
            let metrics = self.get_sort_metrics(uuid).await?;
            if metrics.settled() {
                return Ok(metrics);
            }
            if started.elapsed() >= timeout {
                bail!("sort {} did not settle within {:?}", uuid, timeout);
            }
            tokio::time::sleep(poll).await;
        }
    }

    // --- Blob API ---

    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let request = self.http_client.put(self.url(&bucket_path(bucket)));
        checked(self.send_with_retry(request).await?).await?;
        Ok(())
    }

    pub async fn destroy_bucket(&self, bucket: &str) -> Result<()> {
        let request = self.http_client.delete(self.url(&bucket_path(bucket)));
        checked(self.send_with_retry(request).await?).await?;
        Ok(())
    }

    pub async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        let request = self.http_client.get(self.url(&bucket_path(bucket)));
        let response = checked(self.send_with_retry(request).await?).await?;
        let body: ListObjectsResponse = response.json().await?;
        Ok(body.objects)
    }

    pub async fn put_object(&self, bucket: &str, name: &str, data: Vec<u8>) -> Result<()> {
        let request = self
            .http_client
            .put(self.url(&object_path(bucket, name)))
            .body(data);
        checked(self.send_with_retry(request).await?).await?;
        Ok(())
    }

    pub async fn get_object(&self, bucket: &str, name: &str) -> Result<Vec<u8>> {
        let request = self.http_client.get(self.url(&object_path(bucket, name)));
        let response = checked(self.send_with_retry(request).await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // --- HTTP Helpers with Backoff ---

    /// Single attempt, for requests that must not be replayed.
    async fn send_once(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        Ok(request.timeout(self.timeout).send().await?)
    }

    async fn send_with_retry(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let Some(attempt_request) = request.try_clone() else {
                // Streaming bodies cannot be replayed
                return self.send_once(request).await;
            };

            match attempt_request.timeout(self.timeout).send().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempt + 1 == self.attempts {
                        return Err(anyhow!(e));
                    }
                    tracing::debug!("Request failed ({}), retrying", e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow!("Retry attempts exhausted"))
    }
}

/// Turns a non-2xx response into an error carrying the server's message.
async fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    bail!("{} {}: {}", status, url, message)
}
