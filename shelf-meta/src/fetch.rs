//! Outbound JSON-over-HTTP layer
//!
//! Adapters and harvest clients talk to the network only through
//! [`JsonFetcher`], so a lookup can be exercised end to end against canned
//! responses. [`ReqwestFetcher`] is the production implementation.

use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::{header, Client};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One GET request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    /// `Accept` header override (SPARQL endpoints want `application/sparql-results+json`)
    pub accept: Option<String>,
    /// `User-Agent` override for this request
    pub user_agent: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            accept: None,
            user_agent: None,
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn user_agent(mut self, user_agent: Option<&str>) -> Self {
        self.user_agent = user_agent.map(str::to_string);
        self
    }

    /// Value of a query parameter (first occurrence)
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// GET a URL and decode the body as JSON
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn get_json(
        &self,
        request: &FetchRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<serde_json::Value, FetchError>;
}

/// reqwest-backed fetcher with a default User-Agent and request timeout
pub struct ReqwestFetcher {
    http_client: Client,
}

impl ReqwestFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self { http_client })
    }

    async fn send(&self, request: &FetchRequest) -> Result<serde_json::Value, FetchError> {
        let mut builder = self.http_client.get(&request.url).query(&request.query);
        if let Some(accept) = &request.accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        if let Some(user_agent) = &request.user_agent {
            builder = builder.header(header::USER_AGENT, user_agent);
        }

        tracing::debug!(url = %request.url, params = request.query.len(), "HTTP GET");

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message: String = body.chars().take(200).collect();
            return Err(FetchError::Http {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))
    }
}

#[async_trait]
impl JsonFetcher for ReqwestFetcher {
    async fn get_json(
        &self,
        request: &FetchRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<serde_json::Value, FetchError> {
        match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(FetchError::Cancelled),
                    result = self.send(request) => result,
                }
            }
            None => self.send(request).await,
        }
    }
}
