use thiserror::Error;

/// Rule file or process configuration is unusable. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("rule {index}: invalid pattern {pattern:?}: {source}")]
    Pattern {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("rule {index}: invalid remind_after {value:?}: {reason}")]
    Delay {
        index: usize,
        value: String,
        reason: String,
    },
    #[error("invalid setting {key}: {reason}")]
    Setting { key: &'static str, reason: String },
}

/// Credential or session failure. Fatal at startup.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("SLACK_TOKEN is not set")]
    MissingToken,
    #[error("authentication rejected: {0}")]
    Rejected(String),
    #[error("slack unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("malformed auth.test response: {0}")]
    Malformed(String),
}

/// The event stream could not be opened or was lost.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("rtm.connect failed: {0}")]
    Connect(String),
    #[error("websocket error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("stream closed by server: {0}")]
    Goodbye(String),
    #[error("event stream ended")]
    Closed,
    #[error("stream task failed: {0}")]
    Task(String),
}

/// A single outbound Slack call failed. Never fatal.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{method}: transport error: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method}: slack error: {error}")]
    Api { method: &'static str, error: String },
    #[error("{method}: malformed response: {detail}")]
    Malformed { method: &'static str, detail: String },
}

impl RemoteError {
    pub fn method(&self) -> &'static str {
        match self {
            RemoteError::Transport { method, .. }
            | RemoteError::Api { method, .. }
            | RemoteError::Malformed { method, .. } => method,
        }
    }
}
