//! Endpoint addresses derived from connection options

use crate::connection::ConnectionOptions;
use signalk_shared::protocol::{DEFAULT_PORT, NAMESPACE};

/// Which transport an address is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// WebSocket delta stream
    Stream,
    /// HTTP API root
    Request,
}

/// Compose the address of an endpoint
///
/// Options are not validated; a bad host yields a bad address.
pub fn build(options: &ConnectionOptions, endpoint: Endpoint) -> String {
    let scheme = match (endpoint, options.use_tls) {
        (Endpoint::Stream, false) => "ws",
        (Endpoint::Stream, true) => "wss",
        (Endpoint::Request, false) => "http",
        (Endpoint::Request, true) => "https",
    };

    let mut uri = format!("{}://{}", scheme, options.host);
    if options.port != DEFAULT_PORT {
        uri.push_str(&format!(":{}", options.port));
    }
    uri.push_str(&format!("/{}/{}", NAMESPACE, options.version));

    match endpoint {
        Endpoint::Stream => {
            uri.push_str("/stream?subscribe=");
            uri.push_str(options.subscribe.as_str());
        }
        Endpoint::Request => uri.push_str("/api"),
    }

    uri
}
