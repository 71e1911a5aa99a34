use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::events::{parse_frame, Frame};
use super::EventStream;
use crate::config::Config;
use crate::error::StreamError;
use crate::logging::{agg_increment, log_stream, Level};
use crate::slack::SlackClient;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the real-time stream. Connection failures are returned here rather
/// than from the spawned task, so startup can fail fast.
pub async fn connect(
    client: &SlackClient,
    cfg: &Config,
    cancel: CancellationToken,
) -> Result<EventStream, StreamError> {
    let url = client.rtm_connect().await?;
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    log_stream(Level::Info, "connected", "rtm websocket connected");

    let (tx, rx) = mpsc::channel(cfg.event_channel_capacity.max(1));
    let keepalive = Duration::from_secs(cfg.keepalive_secs.max(1));
    let task = tokio::spawn(pump(ws, tx, keepalive, cancel));
    Ok(EventStream { events: rx, task })
}

/// Read frames until cancelled, closed or failed. Message events are
/// forwarded; every other frame kind stops here.
async fn pump(
    ws: WsStream,
    tx: mpsc::Sender<super::Event>,
    keepalive: Duration,
    cancel: CancellationToken,
) -> Result<(), StreamError> {
    let (mut write, mut read) = ws.split();

    let mut ticker = interval(keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;
    let mut ping_id: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                log_stream(Level::Info, "cancelled", "stream cancelled");
                return Ok(());
            }
            _ = ticker.tick() => {
                ping_id += 1;
                let ping = json!({ "id": ping_id, "type": "ping" });
                write.send(Message::Text(ping.to_string())).await?;
            }
            msg = read.next() => {
                let msg = match msg {
                    Some(m) => m?,
                    None => return Err(StreamError::Closed),
                };
                match msg {
                    Message::Text(text) => match parse_frame(&text) {
                        Frame::Message(event) => {
                            agg_increment("event");
                            if tx.send(event).await.is_err() {
                                // Consumer is gone; nothing left to feed.
                                return Ok(());
                            }
                        }
                        Frame::Hello => log_stream(Level::Info, "hello", "rtm session ready"),
                        Frame::Goodbye => return Err(StreamError::Goodbye("server sent goodbye".to_string())),
                        Frame::Pong => {}
                        Frame::Error(e) => log_stream(Level::Warn, "rtm_error", &e),
                        Frame::Other(kind) => log_stream(Level::Trace, "skip", &kind),
                        Frame::Invalid(e) => log_stream(Level::Warn, "invalid_frame", &e),
                    },
                    Message::Ping(data) => write.send(Message::Pong(data)).await?,
                    Message::Close(frame) => {
                        let reason = frame
                            .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                            .unwrap_or_else(|| "no close frame".to_string());
                        return Err(StreamError::Goodbye(reason));
                    }
                    _ => {}
                }
            }
        }
    }
}
