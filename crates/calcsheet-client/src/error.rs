use calcsheet_lock::LockError;
use calcsheet_versions::SourceError;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("response body too large (limit {limit} bytes)")]
    BodyTooLarge { limit: usize },
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<ClientError> for LockError {
    fn from(err: ClientError) -> Self {
        LockError::Network(err.to_string())
    }
}

impl From<ClientError> for SourceError {
    fn from(err: ClientError) -> Self {
        SourceError::Network(err.to_string())
    }
}
