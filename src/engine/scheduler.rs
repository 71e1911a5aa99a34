use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::matcher::Match;
use crate::error::RemoteError;
use crate::logging::{log_remote_failure, log_reminder_set};
use crate::slack::ActionApi;

/// What gets registered with `reminders.add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredActionRequest {
    pub display_text: String,
    /// Unix seconds.
    pub trigger_at: i64,
}

/// Channel-level link: the permalink with its last `/` segment removed.
pub fn channel_link(permalink: &str) -> Option<&str> {
    permalink.rfind('/').map(|i| &permalink[..i])
}

pub fn display_text(permalink: &str, channel_link: &str, text: &str, channel: &str) -> String {
    format!("<{}|{}> in <{}|{}>", permalink, text, channel_link, channel)
}

/// `now + delay` in unix seconds, saturating on overflow.
pub fn trigger_at(now: DateTime<Utc>, delay: Duration) -> i64 {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .map(|t| t.timestamp())
        .unwrap_or(i64::MAX)
}

/// Resolves permalinks and registers reminders. Remote failures are logged
/// here and never escape past a single match.
pub struct Scheduler {
    api: Arc<dyn ActionApi>,
}

impl Scheduler {
    pub fn new(api: Arc<dyn ActionApi>) -> Self {
        Self { api }
    }

    /// Schedule a reminder for one match using the current time.
    pub async fn schedule(&self, m: &Match<'_>) -> Option<DeferredActionRequest> {
        self.schedule_at(m, Utc::now()).await
    }

    pub async fn schedule_at(&self, m: &Match<'_>, now: DateTime<Utc>) -> Option<DeferredActionRequest> {
        match self.try_schedule(m, now).await {
            Ok(req) => {
                log_reminder_set(&m.event.channel, &m.event.ts, m.rule.delay, req.trigger_at, &m.event.text);
                Some(req)
            }
            Err((stage, err)) => {
                log_remote_failure(
                    stage,
                    &m.event.channel,
                    &m.event.ts,
                    m.rule.delay,
                    &m.event.text,
                    &err.to_string(),
                );
                None
            }
        }
    }

    async fn try_schedule(
        &self,
        m: &Match<'_>,
        now: DateTime<Utc>,
    ) -> Result<DeferredActionRequest, (&'static str, RemoteError)> {
        let event = m.event;

        let permalink = self
            .api
            .permalink(&event.channel, &event.ts)
            .await
            .map_err(|e| ("get permalink", e))?;

        let channel = channel_link(&permalink).ok_or_else(|| {
            (
                "get permalink",
                RemoteError::Malformed {
                    method: "chat.getPermalink",
                    detail: format!("no path separator in {:?}", permalink),
                },
            )
        })?;

        let req = DeferredActionRequest {
            display_text: display_text(&permalink, channel, &event.text, &event.channel),
            trigger_at: trigger_at(now, m.rule.delay),
        };

        // Failing here leaves a resolved permalink behind; nothing to undo.
        self.api
            .add_reminder(&req.display_text, req.trigger_at)
            .await
            .map_err(|e| ("set reminder", e))?;

        Ok(req)
    }
}
