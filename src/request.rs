//! Request enrichment and response decoding for the HTTP API
//!
//! Every call goes through [`build_request`], which normalizes the path,
//! fills default headers, adds the `Authorization` header when a credential
//! is held, and moves auxiliary endpoints (login, access requests, security)
//! out of the `/api` prefix where the server actually serves them.

use crate::connection::ConnectionOptions;
use crate::error::ClientError;
use crate::transport::{HttpRequest, HttpResponse, RequestTransport};
use crate::uri::{self, Endpoint};
use serde_json::Value;
use signalk_shared::protocol::{AUXILIARY_ENDPOINTS, LOGIN_PATH, NAMESPACE};
use signalk_shared::Credential;
use tracing::debug;

const JSON: &str = "application/json";

/// Per-call request options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// HTTP method (GET when unset)
    pub method: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl FetchOptions {
    pub fn get() -> Self {
        Self::default()
    }

    /// POST a JSON body
    pub fn post_json(body: &Value) -> Self {
        Self::with_json("POST", body)
    }

    /// PUT a JSON body
    pub fn put_json(body: &Value) -> Self {
        Self::with_json("PUT", body)
    }

    fn with_json(method: &str, body: &Value) -> Self {
        Self {
            method: Some(method.to_string()),
            headers: Vec::new(),
            body: Some(body.to_string()),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum FetchBody {
    Json(Value),
    Text(String),
}

impl FetchBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            FetchBody::Json(value) => Some(value),
            FetchBody::Text(_) => None,
        }
    }
}

/// Compose the outgoing request for `path`
pub fn build_request(
    options: &ConnectionOptions,
    credential: Option<&Credential>,
    path: &str,
    opts: FetchOptions,
) -> HttpRequest {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    let is_login = path == LOGIN_PATH;
    let url = rewrite_auxiliary(
        format!("{}{}", uri::build(options, Endpoint::Request), path),
        &options.version,
    );

    let mut headers = opts.headers;
    for name in ["Accept", "Content-Type"] {
        if !headers.iter().any(|(key, _)| key.eq_ignore_ascii_case(name)) {
            headers.push((name.to_string(), JSON.to_string()));
        }
    }

    let mut credentialed = false;
    // The login call itself never carries the credential
    if let Some(credential) = credential.filter(|_| !is_login) {
        headers.retain(|(key, _)| !key.eq_ignore_ascii_case("Authorization"));
        headers.push(("Authorization".to_string(), credential.authorization()));
        credentialed = true;
    }

    HttpRequest {
        method: opts.method.unwrap_or_else(|| "GET".to_string()),
        url,
        headers,
        body: opts.body,
        credentialed,
    }
}

/// Move auxiliary endpoints from `/signalk/<v>/api/...` to `/signalk/<v>/...`
fn rewrite_auxiliary(url: String, version: &str) -> String {
    let api_root = format!("/{}/{}/api/", NAMESPACE, version);
    let root = format!("/{}/{}/", NAMESPACE, version);

    for endpoint in AUXILIARY_ENDPOINTS {
        let from = format!("{}{}", api_root, endpoint);
        if url.contains(&from) {
            return url.replacen(&from, &format!("{}{}", root, endpoint), 1);
        }
    }
    url
}

/// Turn a response into a body or an error
pub fn decode_response(response: HttpResponse) -> Result<FetchBody, ClientError> {
    if !response.is_success() {
        return Err(ClientError::Http {
            status: response.status,
            status_text: response.status_text,
        });
    }

    let is_json = response
        .header("Content-Type")
        .map(|value| value.contains(JSON))
        .unwrap_or(false);

    if is_json {
        Ok(FetchBody::Json(serde_json::from_str(&response.body)?))
    } else {
        Ok(FetchBody::Text(response.body))
    }
}

/// Issue one API call
pub async fn fetch(
    transport: &dyn RequestTransport,
    options: &ConnectionOptions,
    credential: Option<&Credential>,
    path: &str,
    opts: FetchOptions,
) -> Result<FetchBody, ClientError> {
    let request = build_request(options, credential, path, opts);
    debug!("{} {}", request.method, request.url);

    let response = transport
        .execute(request)
        .await
        .map_err(ClientError::transport)?;
    decode_response(response)
}
