use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::retry::RetryPolicy;
use super::ProviderError;
use crate::model::ResolvedProviderConfig;

/// Shared JSON-over-HTTP plumbing for the vendor adapters: one client with
/// the configured timeout, and the adapter's retry policy around each call.
#[derive(Debug, Clone)]
pub(crate) struct HttpTransport {
    client: reqwest::Client,
    /// Only connecting is bounded; long-running streamed replies may take
    /// as long as they need.
    streaming: reqwest::Client,
    vendor: &'static str,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub(crate) fn new(
        vendor: &'static str,
        config: &ResolvedProviderConfig,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ProviderError::config(vendor, format!("HTTP client: {}", err)))?;
        let streaming = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|err| ProviderError::config(vendor, format!("HTTP client: {}", err)))?;

        Ok(Self {
            client,
            streaming,
            vendor,
            retry: RetryPolicy::new(config.max_retries, config.retry_base_delay),
        })
    }

    pub(crate) fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub(crate) async fn post_json<B, R>(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        query: &[(&'static str, String)],
        body: &B,
    ) -> Result<R, ProviderError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        self.retry
            .run(self.vendor, || self.post_once(url, headers, query, body))
            .await
    }

    async fn post_once<B, R>(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        query: &[(&'static str, String)],
        body: &B,
    ) -> Result<R, ProviderError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        debug!(vendor = self.vendor, url, "sending generation request");

        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ProviderError::transport(self.vendor, err))?;
        self.decode(response).await
    }

    /// Single GET without retries, for auxiliary endpoints.
    pub(crate) async fn get_json<R: DeserializeOwned>(&self, url: &str) -> Result<R, ProviderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ProviderError::transport(self.vendor, err))?;
        self.decode(response).await
    }

    /// POST answered with newline-delimited JSON. Each decoded line goes to
    /// `on_line` as it arrives; an `Err` from it stops reading. Not retried.
    pub(crate) async fn post_ndjson<B, R, F>(
        &self,
        url: &str,
        body: &B,
        mut on_line: F,
    ) -> Result<(), ProviderError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
        F: FnMut(R) -> Result<(), ProviderError>,
    {
        debug!(vendor = self.vendor, url, "sending streamed request");
        let mut response = self
            .streaming
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| ProviderError::transport(self.vendor, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::status(self.vendor, status.as_u16(), &body));
        }

        let mut pending: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| ProviderError::transport(self.vendor, err))?
        {
            pending.extend_from_slice(&chunk);
            while let Some(end) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=end).collect();
                self.decode_line(&line, &mut on_line)?;
            }
        }
        self.decode_line(&pending, &mut on_line)
    }

    fn decode_line<R, F>(&self, line: &[u8], on_line: &mut F) -> Result<(), ProviderError>
    where
        R: DeserializeOwned,
        F: FnMut(R) -> Result<(), ProviderError>,
    {
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        let value = serde_json::from_slice(line).map_err(|err| {
            ProviderError::parse(self.vendor, format!("malformed stream line: {}", err))
        })?;
        on_line(value)
    }

    async fn decode<R: DeserializeOwned>(&self, response: reqwest::Response) -> Result<R, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::status(self.vendor, status.as_u16(), &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| ProviderError::transport(self.vendor, err))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| ProviderError::parse(self.vendor, format!("malformed JSON body: {}", err)))
    }
}
