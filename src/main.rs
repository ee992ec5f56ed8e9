use serde_json::json;
use signalk_client::{
    ConnectionEvent, ConnectionManager, ConnectionOptions, Credentials, FetchOptions,
    SubscribeMode,
};
use std::env;

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let options = options_from_env();
    info!("Signal K client starting: {}:{}", options.host, options.port);
    info!("  TLS: {}  auth: {}", options.use_tls, options.use_authentication);

    let mut conn = ConnectionManager::connect(options);

    // Main event loop
    loop {
        match conn.recv().await {
            Some(ConnectionEvent::Connect) => {
                info!("Connected");
                let subscription = json!({
                    "context": "vessels.self",
                    "subscribe": [{ "path": "navigation.*", "period": 1000 }]
                });
                if let Err(e) = conn.send(subscription).await {
                    error!("Failed to subscribe: {}", e);
                }
                match conn.fetch("/vessels/self", FetchOptions::get()).await {
                    Ok(body) => info!("Own vessel: {:?}", body),
                    Err(e) => warn!("Failed to fetch own vessel: {}", e),
                }
            }
            Some(ConnectionEvent::Disconnect) => {
                warn!("Disconnected");
            }
            Some(ConnectionEvent::Error(e)) => {
                error!("Connection error: {}", e);
            }
            Some(ConnectionEvent::ConnectionInfo(info)) => {
                info!("Server {} {} roles={:?}", info.name, info.version, info.roles);
            }
            Some(ConnectionEvent::SelfId(self_id)) => {
                info!("Self: {}", self_id);
            }
            Some(ConnectionEvent::FetchReady) => {
                info!("API calls authorized");
            }
            Some(ConnectionEvent::HitMaxRetries) => {
                error!("Giving up after too many reconnects");
            }
            Some(ConnectionEvent::Message(message)) => {
                debug!("Delta: {}", message);
            }
            None => {
                info!("Connection manager closed");
                break;
            }
        }
    }
}

/// Connection options from `SIGNALK_*` environment variables
fn options_from_env() -> ConnectionOptions {
    let mut options = ConnectionOptions {
        subscribe: SubscribeMode::SelfOnly,
        ..Default::default()
    };

    if let Ok(host) = env::var("SIGNALK_HOST") {
        options.host = host;
    }
    if let Some(port) = env::var("SIGNALK_PORT").ok().and_then(|p| p.parse().ok()) {
        options.port = port;
    }
    options.use_tls = matches!(env::var("SIGNALK_TLS").as_deref(), Ok("1") | Ok("true"));
    if let Some(max) = env::var("SIGNALK_MAX_RETRIES").ok().and_then(|m| m.parse().ok()) {
        options.max_retries = Some(max);
    }

    if let (Ok(username), Ok(password)) = (env::var("SIGNALK_USER"), env::var("SIGNALK_PASSWORD")) {
        options.credentials = Some(Credentials::new(username, password));
        options.use_authentication = true;
    }

    options
}
