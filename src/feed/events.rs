use serde::Deserialize;

/// An inbound message event. Read-only once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: String,
    /// Absent for edits, bot posts and other subtypes without a human author.
    pub user: Option<String>,
    pub text: String,
    pub channel: String,
    pub ts: String,
}

/// One decoded RTM frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Message(Event),
    Hello,
    Goodbye,
    Pong,
    Error(String),
    Other(String),
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    user: Option<String>,
    text: Option<String>,
    channel: Option<String>,
    ts: Option<String>,
    error: Option<RawError>,
}

#[derive(Debug, Deserialize)]
struct RawError {
    code: Option<i64>,
    msg: Option<String>,
}

pub fn parse_frame(text: &str) -> Frame {
    let raw: RawFrame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => return Frame::Invalid(e.to_string()),
    };

    match raw.kind.as_deref() {
        Some("message") => match (raw.channel, raw.ts) {
            (Some(channel), Some(ts)) => Frame::Message(Event {
                kind: "message".to_string(),
                user: raw.user,
                text: raw.text.unwrap_or_default(),
                channel,
                ts,
            }),
            _ => Frame::Invalid("message without channel or ts".to_string()),
        },
        Some("hello") => Frame::Hello,
        Some("goodbye") => Frame::Goodbye,
        Some("pong") => Frame::Pong,
        Some("error") => {
            let (code, msg) = raw
                .error
                .map(|e| (e.code.unwrap_or(0), e.msg.unwrap_or_default()))
                .unwrap_or((0, String::new()));
            Frame::Error(format!("{}: {}", code, msg))
        }
        Some(other) => Frame::Other(other.to_string()),
        // Replies to our own sends carry `reply_to` and no type.
        None => Frame::Other("reply".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_frame() {
        let f = parse_frame(
            r#"{"type":"message","user":"U1","text":"printed SECRET=xyz","channel":"C1","ts":"123.456"}"#,
        );
        assert_eq!(
            f,
            Frame::Message(Event {
                kind: "message".into(),
                user: Some("U1".into()),
                text: "printed SECRET=xyz".into(),
                channel: "C1".into(),
                ts: "123.456".into(),
            })
        );
    }

    #[test]
    fn test_edit_has_no_author() {
        let f = parse_frame(
            r#"{"type":"message","subtype":"message_changed","channel":"C1","ts":"1.2","message":{"user":"U1","text":"x"}}"#,
        );
        match f {
            Frame::Message(ev) => {
                assert_eq!(ev.user, None);
                assert_eq!(ev.text, "");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_non_message_kinds() {
        assert_eq!(parse_frame(r#"{"type":"hello"}"#), Frame::Hello);
        assert_eq!(parse_frame(r#"{"type":"goodbye"}"#), Frame::Goodbye);
        assert_eq!(parse_frame(r#"{"type":"user_typing","channel":"C1","user":"U1"}"#), Frame::Other("user_typing".into()));
        assert_eq!(parse_frame(r#"{"ok":true,"reply_to":1,"ts":"1.0"}"#), Frame::Other("reply".into()));
        assert_eq!(
            parse_frame(r#"{"type":"error","error":{"code":1,"msg":"Socket URL has expired"}}"#),
            Frame::Error("1: Socket URL has expired".into())
        );
        assert!(matches!(parse_frame("not json"), Frame::Invalid(_)));
    }
}
