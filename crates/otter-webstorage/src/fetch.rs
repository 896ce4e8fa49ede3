//! Network fetch used by `Cache::add` / `Cache::add_all`
//!
//! The cache talks to the network through [`Fetcher`] directly instead of any
//! script-level `fetch`, so a patched global `fetch` can never recurse back
//! into the cache.

use crate::error::StorageResult;
use crate::request::{Request, Response};
use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::debug;

/// Performs one HTTP request and buffers the whole response.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> StorageResult<Response>;
}

/// [`Fetcher`] backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Client with reqwest's defaults, which set no request timeout.
    pub fn new() -> StorageResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    /// Use an existing client (shares its connection pool)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// Parse method string to reqwest Method
fn parse_method(method: &str) -> Method {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes()).unwrap_or(Method::GET)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> StorageResult<Response> {
        debug!(url = %request.url, method = %request.method, "cache fetch");

        let mut builder = self
            .client
            .request(parse_method(&request.method), &request.url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v.to_string())))
            .collect();
        let body = response.bytes().await?;

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
        })
    }
}
