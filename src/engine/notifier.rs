use std::sync::Arc;
use std::time::Duration;

use crate::config::format_delay;
use crate::feed::Event;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::slack::ActionApi;

pub fn acknowledgment_text(delay: Duration) -> String {
    format!("set reminder after {}", format_delay(delay))
}

/// Posts the author-only confirmation after a reminder is registered.
pub struct Notifier {
    api: Arc<dyn ActionApi>,
}

impl Notifier {
    pub fn new(api: Arc<dyn ActionApi>) -> Self {
        Self { api }
    }

    /// Fire-and-forget: the reminder already exists, the result is ignored.
    pub async fn acknowledge(&self, event: &Event, delay: Duration) {
        let Some(user) = event.user.as_deref() else {
            return;
        };
        log(
            Level::Debug,
            Domain::Notify,
            "ephemeral",
            obj(&[("channel", v_str(&event.channel)), ("user", v_str(user))]),
        );
        let _ = self
            .api
            .post_ephemeral(&event.channel, &acknowledgment_text(delay), user)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknowledgment_text() {
        assert_eq!(acknowledgment_text(Duration::from_secs(3600)), "set reminder after 1h0m0s");
        assert_eq!(acknowledgment_text(Duration::from_secs(930)), "set reminder after 15m30s");
    }
}
