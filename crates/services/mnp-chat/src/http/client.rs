use backon::{ExponentialBuilder, Retryable};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, de::DeserializeOwned};

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::retry;

/// REST client for the MNP assistant backend.
///
/// Requests failing with a retryable status or a connect/timeout error are
/// retried with the configured backoff.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: Option<SecretString>,
    backoff: ExponentialBuilder,
}

impl ApiClient {
    /// Builds a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Reqwest`] if the HTTP client cannot be built.
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_url.clone(),
            api_key: config.api_key.clone(),
            backoff: retry::default_backoff_builder(),
        })
    }

    /// Replaces the HTTP client with a custom one
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Replaces the backoff configuration for retry logic
    #[must_use]
    pub fn with_backoff(mut self, backoff: ExponentialBuilder) -> Self {
        self.backoff = backoff;
        self
    }

    /// Configured REST base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub(crate) fn url(&self, path: &str) -> String {
        let base = self.api_base.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut h = HeaderMap::new();
        if let Some(secret) = &self.api_key {
            let key = secret.expose_secret().trim();
            if !key.is_empty() {
                h.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {key}"))
                        .map_err(|_| ChatError::Config("Invalid API key value".into()))?,
                );
            }
        }
        Ok(h)
    }

    pub(crate) async fn post<I, O>(&self, path: &str, body: &I) -> Result<O>
    where
        I: Serialize + Send + Sync + ?Sized,
        O: DeserializeOwned,
    {
        let url = self.url(path);
        let mk = || async {
            Ok(self
                .http
                .post(&url)
                .headers(self.headers()?)
                .json(body)
                .build()?)
        };
        self.execute(mk).await
    }

    pub(crate) async fn get<O>(&self, path: &str, query: &[(&str, String)]) -> Result<O>
    where
        O: DeserializeOwned,
    {
        let url = self.url(path);
        let mk = || async {
            Ok(self
                .http
                .get(&url)
                .headers(self.headers()?)
                .query(query)
                .build()?)
        };
        self.execute(mk).await
    }

    async fn execute<O, M, Fut>(&self, mk: M) -> Result<O>
    where
        O: DeserializeOwned,
        M: Fn() -> Fut + Send + Sync,
        Fut: core::future::Future<Output = Result<reqwest::Request>> + Send,
    {
        let bytes = self.execute_raw(mk).await?;
        serde_json::from_slice(&bytes).map_err(|e| crate::error::map_deser(&e, &bytes))
    }

    async fn execute_raw<M, Fut>(&self, mk: M) -> Result<bytes::Bytes>
    where
        M: Fn() -> Fut + Send + Sync,
        Fut: core::future::Future<Output = Result<reqwest::Request>> + Send,
    {
        let http_client = self.http.clone();

        (|| async {
            let request = mk().await?;
            let method = request.method().clone();
            let path = request.url().path().to_string();

            let response = http_client
                .execute(request)
                .await
                .map_err(ChatError::Reqwest)?;

            let status = response.status();
            let bytes = response.bytes().await.map_err(ChatError::Reqwest)?;

            if status.is_success() {
                tracing::debug!(%method, %path, status = status.as_u16(), "request ok");
                return Ok(bytes);
            }

            Err(crate::error::deserialize_api_error(status, &bytes))
        })
        .retry(self.backoff)
        .when(ChatError::is_retryable)
        .notify(|err, dur| {
            tracing::debug!(error = %err, delay = ?dur, "retrying request");
        })
        .await
    }
}
