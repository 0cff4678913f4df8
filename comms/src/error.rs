use std::{error::Error, fmt};

use tokio_tungstenite::tungstenite;

/// The result type used in the entire comms module.
pub type Result<T> = std::result::Result<T, CommsErr>;

/// Failures talking to the coordinator.
#[derive(Debug)]
pub enum CommsErr {
    Http(reqwest::Error),
    Socket(tungstenite::Error),
    InvalidUrl(url::ParseError),
    Encode(serde_json::Error),
}

impl fmt::Display for CommsErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommsErr::Http(e) => write!(f, "http error: {e}"),
            CommsErr::Socket(e) => write!(f, "socket error: {e}"),
            CommsErr::InvalidUrl(e) => write!(f, "invalid url: {e}"),
            CommsErr::Encode(e) => write!(f, "failed to encode payload: {e}"),
        }
    }
}

impl Error for CommsErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CommsErr::Http(e) => Some(e),
            CommsErr::Socket(e) => Some(e),
            CommsErr::InvalidUrl(e) => Some(e),
            CommsErr::Encode(e) => Some(e),
        }
    }
}

impl From<reqwest::Error> for CommsErr {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

impl From<tungstenite::Error> for CommsErr {
    fn from(value: tungstenite::Error) -> Self {
        Self::Socket(value)
    }
}

impl From<url::ParseError> for CommsErr {
    fn from(value: url::ParseError) -> Self {
        Self::InvalidUrl(value)
    }
}

impl From<serde_json::Error> for CommsErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}
