//! HTTP request transport over reqwest

use crate::transport::traits::{HttpRequest, HttpResponse, RequestTransport};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;

/// Request transport backed by a shared `reqwest::Client`
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Use a preconfigured client (timeouts, proxies, root certificates)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RequestTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = Method::from_bytes(request.method.as_bytes())?;
        debug!(
            "{} {} (credentialed={})",
            method, request.url, request.credentialed
        );

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }

    fn name(&self) -> &'static str {
        "HTTP"
    }
}
