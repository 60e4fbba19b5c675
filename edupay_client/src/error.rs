use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid URL. {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Request failed. {0}")]
    Transport(#[from] reqwest::Error),
    /// The server answered 401 with the token-expired marker header. Refresh and try again.
    #[error("Access token has expired.")]
    TokenExpired,
    #[error("The server rejected the request ({status}). {message}")]
    Api { status: u16, message: String },
    #[error("Websocket error. {0}")]
    Socket(String),
}
