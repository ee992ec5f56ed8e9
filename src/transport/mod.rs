pub mod http;
#[cfg(test)]
pub mod mock;
pub mod traits;
pub mod websocket;

pub use http::ReqwestTransport;
pub use traits::{
    HttpRequest, HttpResponse, RequestTransport, StreamConnector, StreamEvent, StreamEventSender,
    StreamLink,
};
pub use websocket::{WebSocketConnector, WebSocketLink};
