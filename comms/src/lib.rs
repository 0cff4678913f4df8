mod error;
pub mod http;
pub mod msg;
mod payload;
pub mod socket;

pub use error::{CommsErr, Result};
pub use http::CoordinatorClient;
pub use msg::Msg;
pub use payload::{RoundUpload, UPLOAD_FIELD, UPLOAD_FILENAME};
pub use socket::{SignalSource, SocketEvent, WsSource};

/// Opens the coordinator's signal socket.
///
/// The bearer token travels as the `token` query parameter of the `/ws` endpoint,
/// the coordinator has no other way of authenticating the upgrade request.
///
/// # Arguments
/// * `ws_base` - The coordinator's websocket host, with or without a `ws://` scheme.
/// * `token` - The user's bearer token.
///
/// # Returns
/// A connected `WsSource` or a `CommsErr` if the handshake failed.
pub async fn connect(ws_base: &str, token: &str) -> Result<WsSource> {
    let url = socket::signal_url(ws_base, token)?;
    WsSource::connect(url).await
}
