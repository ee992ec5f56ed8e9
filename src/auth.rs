//! Login exchange over the request transport

use crate::connection::ConnectionOptions;
use crate::error::ClientError;
use crate::request::{self, FetchBody, FetchOptions};
use crate::transport::RequestTransport;
use serde_json::{json, Value};
use signalk_shared::protocol::LOGIN_PATH;
use signalk_shared::Credential;
use tracing::{info, warn};

/// Log in with the configured credentials
pub async fn login(
    transport: &dyn RequestTransport,
    options: &ConnectionOptions,
) -> Result<Credential, ClientError> {
    let (username, password) = options
        .credentials
        .as_ref()
        .map(|c| (c.username.as_str(), c.password.as_str()))
        .unwrap_or(("", ""));
    let body = json!({ "username": username, "password": password });

    let response = request::fetch(
        transport,
        options,
        None,
        LOGIN_PATH,
        FetchOptions::post_json(&body),
    )
    .await?;

    let credential = credential_from_response(response, &options.bearer_token_type)?;
    info!("[AUTH] Logged in as '{}' ({} token)", username, credential.kind);
    Ok(credential)
}

/// Extract the credential from a login response
pub fn credential_from_response(
    body: FetchBody,
    default_kind: &str,
) -> Result<Credential, ClientError> {
    let map = match body {
        FetchBody::Json(Value::Object(map)) => map,
        other => {
            warn!("[AUTH] Unexpected login response: {:?}", other);
            return Err(ClientError::Auth("unexpected response shape".into()));
        }
    };

    let token = match map.get("token") {
        Some(Value::String(token)) => token.clone(),
        _ => return Err(ClientError::Auth("unexpected response shape".into())),
    };

    let kind = map
        .get("type")
        .and_then(Value::as_str)
        .filter(|kind| !kind.is_empty())
        .unwrap_or(default_kind);

    Ok(Credential::new(kind, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Credentials;
    use crate::transport::mock::{json_response, text_response, MockRequestTransport};

    fn options() -> ConnectionOptions {
        ConnectionOptions {
            use_authentication: true,
            credentials: Some(Credentials::new("skipper", "secret")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_login_uses_default_kind() {
        let transport = MockRequestTransport::new(vec![json_response(200, json!({"token": "abc"}))]);
        let credential = login(&transport, &options()).await.unwrap();
        assert_eq!(credential, Credential::new("Bearer", "abc"));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].url, "http://localhost:3000/signalk/v1/auth/login");
        let body: Value = serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"username": "skipper", "password": "secret"}));
    }

    #[tokio::test]
    async fn test_login_uses_response_type() {
        let transport = MockRequestTransport::new(vec![json_response(
            200,
            json!({"token": "abc", "type": "JWT"}),
        )]);
        let credential = login(&transport, &options()).await.unwrap();
        assert_eq!(credential.kind, "JWT");
    }

    #[tokio::test]
    async fn test_login_without_credentials_sends_empty_strings() {
        let transport = MockRequestTransport::new(vec![json_response(200, json!({"token": "t"}))]);
        let options = ConnectionOptions {
            use_authentication: true,
            ..Default::default()
        };
        login(&transport, &options).await.unwrap();

        let body: Value =
            serde_json::from_str(transport.requests()[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"username": "", "password": ""}));
    }

    #[tokio::test]
    async fn test_login_missing_token() {
        let transport = MockRequestTransport::new(vec![json_response(200, json!({"ok": true}))]);
        let err = login(&transport, &options()).await.unwrap_err();
        assert_eq!(err, ClientError::Auth("unexpected response shape".into()));
    }

    #[tokio::test]
    async fn test_login_text_response() {
        let transport = MockRequestTransport::new(vec![text_response(200, "welcome")]);
        let err = login(&transport, &options()).await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(_)));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let transport = MockRequestTransport::new(vec![text_response(401, "bad password")]);
        let err = login(&transport, &options()).await.unwrap_err();
        assert_eq!(
            err,
            ClientError::Http {
                status: 401,
                status_text: "Unauthorized".into()
            }
        );
    }

    #[test]
    fn test_empty_type_falls_back() {
        let body = FetchBody::Json(json!({"token": "abc", "type": ""}));
        let credential = credential_from_response(body, "JWT").unwrap();
        assert_eq!(credential.kind, "JWT");
    }
}
