//! RTM stream task against a local websocket server: only message events
//! reach the channel, and the task reports why the stream ended.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

use sec_autorem::config::Config;
use sec_autorem::error::StreamError;
use sec_autorem::feed::rtm;
use sec_autorem::slack::SlackClient;

fn config(api_base: &str) -> Config {
    config_with_keepalive(api_base, 60)
}

fn config_with_keepalive(api_base: &str, keepalive_secs: u64) -> Config {
    Config {
        slack_token: Some("xoxp-test".to_string()),
        config_file: "config.yaml".to_string(),
        slack_api_base: api_base.to_string(),
        event_channel_capacity: 8,
        keepalive_secs,
        http_timeout_secs: 5,
    }
}

/// Serve one websocket connection: send `frames`, then optionally a
/// goodbye, then drain until the client goes away.
async fn ws_server(frames: Vec<String>, goodbye: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        for f in frames {
            ws.send(Message::Text(f)).await.unwrap();
        }
        if goodbye {
            ws.send(Message::Text(r#"{"type":"goodbye"}"#.to_string())).await.unwrap();
        }
        while let Some(Ok(_)) = ws.next().await {}
    });
    format!("ws://{}/", addr)
}

async fn slack_api(ws_url: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(path("/rtm.connect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true, "url": ws_url, "self": { "id": "U1", "name": "me" }
        })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn only_message_events_are_forwarded() {
    let ws_url = ws_server(
        vec![
            r#"{"type":"hello"}"#.to_string(),
            r#"{"type":"message","user":"U1","text":"SECRET=1","channel":"C1","ts":"1.0"}"#.to_string(),
            r#"{"type":"user_typing","user":"U1","channel":"C1"}"#.to_string(),
            r#"{"type":"message","user":"U2","text":"hi","channel":"C2","ts":"2.0"}"#.to_string(),
        ],
        true,
    )
    .await;
    let api = slack_api(&ws_url).await;
    let cfg = config(&api.uri());
    let client = SlackClient::new(&cfg).unwrap();

    let mut stream = rtm::connect(&client, &cfg, CancellationToken::new()).await.unwrap();

    let mut received = Vec::new();
    while let Some(ev) = tokio::time::timeout(Duration::from_secs(5), stream.events.recv())
        .await
        .expect("stream stalled")
    {
        received.push(ev);
    }
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].text, "SECRET=1");
    assert_eq!(received[1].user.as_deref(), Some("U2"));

    let outcome = stream.task.await.unwrap();
    assert!(matches!(outcome, Err(StreamError::Goodbye(_))));
}

#[tokio::test]
async fn cancellation_ends_task_cleanly() {
    let ws_url = ws_server(vec![r#"{"type":"hello"}"#.to_string()], false).await;
    let api = slack_api(&ws_url).await;
    let cfg = config(&api.uri());
    let client = SlackClient::new(&cfg).unwrap();
    let cancel = CancellationToken::new();

    let stream = rtm::connect(&client, &cfg, cancel.clone()).await.unwrap();
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), stream.task)
        .await
        .expect("task did not stop")
        .unwrap();
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn rtm_connect_rejection_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(path("/rtm.connect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false, "error": "not_allowed_token_type"
        })))
        .mount(&server)
        .await;
    let cfg = config(&server.uri());
    let client = SlackClient::new(&cfg).unwrap();

    match rtm::connect(&client, &cfg, CancellationToken::new()).await {
        Err(StreamError::Connect(e)) => assert!(e.contains("not_allowed_token_type")),
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("connect should fail"),
    }
}

/// Serve one connection: send a websocket ping, then report once both a
/// pong and an RTM keepalive ping have come back from the client.
async fn liveness_server(done: oneshot::Sender<(bool, bool)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        ws.send(Message::Ping(vec![7, 7, 7])).await.unwrap();

        let (mut got_pong, mut got_keepalive) = (false, false);
        while !(got_pong && got_keepalive) {
            match ws.next().await {
                Some(Ok(Message::Pong(data))) => got_pong |= data == vec![7, 7, 7],
                Some(Ok(Message::Text(text))) => {
                    let v: serde_json::Value = serde_json::from_str(&text).unwrap();
                    got_keepalive |= v["type"] == "ping" && v["id"].as_u64().is_some();
                }
                Some(Ok(_)) => {}
                _ => break,
            }
        }
        let _ = done.send((got_pong, got_keepalive));
        while let Some(Ok(_)) = ws.next().await {}
    });
    format!("ws://{}/", addr)
}

#[tokio::test]
async fn answers_pings_and_sends_keepalive() {
    let (done_tx, done_rx) = oneshot::channel();
    let ws_url = liveness_server(done_tx).await;
    let api = slack_api(&ws_url).await;
    let cfg = config_with_keepalive(&api.uri(), 1);
    let client = SlackClient::new(&cfg).unwrap();
    let cancel = CancellationToken::new();

    let stream = rtm::connect(&client, &cfg, cancel.clone()).await.unwrap();

    let (got_pong, got_keepalive) = tokio::time::timeout(Duration::from_secs(10), done_rx)
        .await
        .expect("server saw no pong or keepalive")
        .unwrap();
    assert!(got_pong);
    assert!(got_keepalive);

    cancel.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(5), stream.task)
        .await
        .expect("task did not stop")
        .unwrap();
    assert!(outcome.is_ok());
}
