//! The receiving end of the coordinator's signal socket.

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, warn};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};
use url::Url;

use crate::Result;

/// What the signal socket produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame.
    Text(String),
    /// The socket is gone, with the close reason or error if there was one.
    Closed(Option<String>),
}

/// A source of coordinator signals.
///
/// Once `SocketEvent::Closed` has been returned every further call returns it again.
#[async_trait]
pub trait SignalSource: Send {
    /// Waits for the next event on the socket.
    async fn next_event(&mut self) -> SocketEvent;
}

/// A websocket backed `SignalSource`.
pub struct WsSource {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl WsSource {
    /// Performs the websocket handshake against `url`.
    ///
    /// # Arguments
    /// * `url` - The full signal url, token included.
    pub async fn connect(url: Url) -> Result<Self> {
        let (stream, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        debug!(status = response.status().as_u16(); "signal socket upgraded");

        Ok(Self {
            stream,
            closed: false,
        })
    }
}

#[async_trait]
impl SignalSource for WsSource {
    async fn next_event(&mut self) -> SocketEvent {
        if self.closed {
            return SocketEvent::Closed(None);
        }

        loop {
            let event = match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return SocketEvent::Text(text),
                Some(Ok(Message::Close(frame))) => {
                    SocketEvent::Closed(frame.map(|f| f.reason.into_owned()))
                }
                Some(Ok(other)) => {
                    debug!("ignoring non text frame of {} bytes", other.len());
                    continue;
                }
                Some(Err(e)) => {
                    warn!("signal socket failed: {e}");
                    SocketEvent::Closed(Some(e.to_string()))
                }
                None => SocketEvent::Closed(None),
            };

            self.closed = true;
            return event;
        }
    }
}

/// Builds the signal url `ws://<ws_base>/ws?token=<token>`.
///
/// # Arguments
/// * `ws_base` - The coordinator's websocket host, a `ws://` or `wss://` scheme is kept if present.
/// * `token` - The user's bearer token.
///
/// # Returns
/// The signal url or a parse error.
pub fn signal_url(ws_base: &str, token: &str) -> Result<Url> {
    let base = ws_base.trim_end_matches('/');
    let raw = if base.contains("://") {
        format!("{base}/ws")
    } else {
        format!("ws://{base}/ws")
    };

    let mut url = Url::parse(&raw)?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}
