use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::HttpMethod;
use crate::error::{CensusError, FetchFailure};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Blocking request primitive shared by all workers of a batch.
///
/// Only transport problems are errors here; any status code comes back as a
/// response and is judged by the caller.
pub trait MetadataClient: Send + Sync {
    fn send(&self, method: HttpMethod, url: &str) -> Result<HttpResponse, FetchFailure>;
}

#[derive(Clone)]
pub struct MetadataHttpClient {
    client: Client,
}

impl MetadataHttpClient {
    pub fn new() -> Result<Self, CensusError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, CensusError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("trait-census/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CensusError::ClientBuild(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| CensusError::ClientBuild(err.to_string()))?;
        Ok(Self { client })
    }
}

impl MetadataClient for MetadataHttpClient {
    fn send(&self, method: HttpMethod, url: &str) -> Result<HttpResponse, FetchFailure> {
        let request = match method {
            HttpMethod::Get => self.client.get(url),
        };
        let response = request
            .send()
            .map_err(|err| FetchFailure::transport(describe_error(&err)))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| FetchFailure::transport(describe_error(&err)))?;
        Ok(HttpResponse { status, body })
    }
}

fn describe_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
