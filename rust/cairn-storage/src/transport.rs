//! The HTTP client used for direct object-store transfers.

use std::sync::Arc;

use async_trait::async_trait;
use cairn_s3_credentials::PresignedRequest;
use reqwest::Client;
use tracing::trace;

use crate::StorageError;

/// Performs presigned requests against the object store.
///
/// Any non-success response is an error; the caller decides whether to try
/// another path.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Fetch the body at `request`
    async fn get(&self, request: &PresignedRequest) -> Result<Vec<u8>, StorageError>;

    /// Upload `body` to `request`
    async fn put(&self, request: &PresignedRequest, body: Vec<u8>) -> Result<(), StorageError>;
}

#[async_trait]
impl<T> HttpTransport for Arc<T>
where
    T: HttpTransport + ?Sized,
{
    async fn get(&self, request: &PresignedRequest) -> Result<Vec<u8>, StorageError> {
        (**self).get(request).await
    }

    async fn put(&self, request: &PresignedRequest, body: Vec<u8>) -> Result<(), StorageError> {
        (**self).put(request, body).await
    }
}

/// Configuration for [ReqwestTransport]
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Optional timeout for requests in seconds (default: 30)
    pub timeout_seconds: Option<u64>,

    /// Headers sent with every request in addition to the presigned ones
    pub headers: Vec<(String, String)>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: Some(30),
            headers: Vec::new(),
        }
    }
}

impl TransportConfig {
    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Disable the request timeout
    pub fn without_timeout(mut self) -> Self {
        self.timeout_seconds = None;
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// [HttpTransport] backed by `reqwest`
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    config: TransportConfig,
    client: Client,
}

impl ReqwestTransport {
    /// Build a client from `config`
    pub fn new(config: TransportConfig) -> Result<Self, StorageError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout_seconds {
            builder = builder.timeout(std::time::Duration::from_secs(timeout));
        }
        let client = builder
            .build()
            .map_err(|error| StorageError::Configuration(error.to_string()))?;
        Ok(Self { config, client })
    }

    fn build_request(
        &self,
        builder: reqwest::RequestBuilder,
        request: &PresignedRequest,
    ) -> reqwest::RequestBuilder {
        let mut builder = builder;
        // The client derives Host from the URL
        for (key, value) in request
            .headers
            .iter()
            .filter(|(key, _)| !key.eq_ignore_ascii_case("host"))
            .chain(self.config.headers.iter())
        {
            builder = builder.header(key, value);
        }
        builder
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        request: &PresignedRequest,
    ) -> Result<reqwest::Response, StorageError> {
        let response = builder.send().await?;
        let status = response.status();
        trace!(url = %without_query(&request.url), status = status.as_u16(), "Object store responded");
        if !status.is_success() {
            return Err(StorageError::Backend {
                url: without_query(&request.url).to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: &PresignedRequest) -> Result<Vec<u8>, StorageError> {
        let builder = self.build_request(self.client.get(&request.url), request);
        let response = self.send(builder, request).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn put(&self, request: &PresignedRequest, body: Vec<u8>) -> Result<(), StorageError> {
        let builder = self.build_request(self.client.put(&request.url), request);
        self.send(builder.body(body), request).await?;
        Ok(())
    }
}

/// Presigned query strings carry credentials; keep them out of errors and
/// logs
fn without_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
