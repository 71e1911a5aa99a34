use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AuthError, RemoteError};

pub mod client;

pub use client::SlackClient;

/// Outbound calls made once per match. Implemented by [`SlackClient`];
/// tests substitute an in-memory recorder.
#[async_trait]
pub trait ActionApi: Send + Sync {
    /// `chat.getPermalink`
    async fn permalink(&self, channel: &str, ts: &str) -> Result<String, RemoteError>;
    /// `reminders.add`, `time` in unix seconds
    async fn add_reminder(&self, text: &str, time: i64) -> Result<(), RemoteError>;
    /// `chat.postEphemeral`
    async fn post_ephemeral(&self, channel: &str, text: &str, user: &str) -> Result<(), RemoteError>;
}

/// The account whose own messages are inspected. Fixed for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredIdentity {
    pub user_id: String,
    pub name: String,
}

/// Authenticated session: the identity plus the client every remote call
/// goes through.
#[derive(Clone)]
pub struct Session {
    pub identity: MonitoredIdentity,
    pub client: Arc<SlackClient>,
}

impl Session {
    pub async fn authenticate(client: Arc<SlackClient>) -> Result<Self, AuthError> {
        let identity = client.auth_test().await?;
        Ok(Self { identity, client })
    }
}
