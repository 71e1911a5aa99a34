use crate::feed::Event;
use crate::slack::MonitoredIdentity;

/// True only for events written by the monitored identity.
pub fn authored_by(event: &Event, identity: &MonitoredIdentity) -> bool {
    event.user.as_deref() == Some(identity.user_id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(user: Option<&str>) -> Event {
        Event {
            kind: "message".into(),
            user: user.map(str::to_string),
            text: "hello".into(),
            channel: "C1".into(),
            ts: "1.0".into(),
        }
    }

    #[test]
    fn test_only_self_passes() {
        let me = MonitoredIdentity { user_id: "U1".into(), name: "me".into() };
        assert!(authored_by(&event(Some("U1")), &me));
        assert!(!authored_by(&event(Some("U2")), &me));
        assert!(!authored_by(&event(None), &me));
    }

    #[test]
    fn test_name_is_not_the_key() {
        let me = MonitoredIdentity { user_id: "U1".into(), name: "U2".into() };
        assert!(!authored_by(&event(Some("U2")), &me));
    }
}
