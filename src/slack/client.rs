use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::{AuthError, RemoteError, StreamError};
use crate::slack::{ActionApi, MonitoredIdentity};

/// Slack Web API client authenticated with a user token.
pub struct SlackClient {
    http: Client,
    base: String,
    token: String,
}

#[derive(Deserialize, Debug)]
struct AuthTestResp {
    user: Option<String>,
    user_id: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PermalinkResp {
    permalink: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RtmConnectResp {
    url: Option<String>,
}

impl SlackClient {
    pub fn new(cfg: &Config) -> Result<Self, AuthError> {
        let token = cfg.slack_token.clone().ok_or(AuthError::MissingToken)?;
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()
            .map_err(AuthError::Unreachable)?;
        Ok(Self::with_http(http, &cfg.slack_api_base, token))
    }

    pub fn with_http(http: Client, base: &str, token: String) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base, method)
    }

    /// Send a request and unwrap Slack's `{"ok": ..., "error": ...}` envelope.
    async fn call(&self, method: &'static str, req: RequestBuilder) -> Result<Value, RemoteError> {
        let resp = req
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| RemoteError::Transport { method, source })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|source| RemoteError::Transport { method, source })?;

        let parsed: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(_) if !status.is_success() => {
                return Err(RemoteError::Api { method, error: format!("http {}", status.as_u16()) })
            }
            Err(e) => return Err(RemoteError::Malformed { method, detail: e.to_string() }),
        };

        if parsed.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let error = parsed
                .get("error")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("http {}", status.as_u16()));
            return Err(RemoteError::Api { method, error });
        }
        Ok(parsed)
    }

    /// `auth.test`: resolve the identity the token belongs to.
    pub async fn auth_test(&self) -> Result<MonitoredIdentity, AuthError> {
        let body = self
            .call("auth.test", self.http.post(self.url("auth.test")))
            .await
            .map_err(|e| match e {
                RemoteError::Transport { source, .. } => AuthError::Unreachable(source),
                RemoteError::Api { error, .. } => AuthError::Rejected(error),
                RemoteError::Malformed { detail, .. } => AuthError::Malformed(detail),
            })?;

        let parsed: AuthTestResp =
            serde_json::from_value(body).map_err(|e| AuthError::Malformed(e.to_string()))?;
        let user_id = parsed
            .user_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::Malformed("missing user_id".to_string()))?;
        Ok(MonitoredIdentity {
            name: parsed.user.unwrap_or_else(|| user_id.clone()),
            user_id,
        })
    }

    /// `rtm.connect`: obtain a websocket URL for the real-time stream.
    pub async fn rtm_connect(&self) -> Result<String, StreamError> {
        let body = self
            .call("rtm.connect", self.http.get(self.url("rtm.connect")))
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        let parsed: RtmConnectResp =
            serde_json::from_value(body).map_err(|e| StreamError::Connect(e.to_string()))?;
        let url = parsed
            .url
            .ok_or_else(|| StreamError::Connect("no url in rtm.connect response".to_string()))?;
        url::Url::parse(&url).map_err(|e| StreamError::Connect(format!("bad websocket url: {}", e)))?;
        Ok(url)
    }
}

#[async_trait]
impl ActionApi for SlackClient {
    async fn permalink(&self, channel: &str, ts: &str) -> Result<String, RemoteError> {
        const METHOD: &str = "chat.getPermalink";
        let req = self
            .http
            .get(self.url(METHOD))
            .query(&[("channel", channel), ("message_ts", ts)]);
        let body = self.call(METHOD, req).await?;
        let parsed: PermalinkResp = serde_json::from_value(body)
            .map_err(|e| RemoteError::Malformed { method: METHOD, detail: e.to_string() })?;
        parsed.permalink.ok_or_else(|| RemoteError::Malformed {
            method: METHOD,
            detail: "missing permalink".to_string(),
        })
    }

    async fn add_reminder(&self, text: &str, time: i64) -> Result<(), RemoteError> {
        const METHOD: &str = "reminders.add";
        let time = time.to_string();
        let req = self
            .http
            .post(self.url(METHOD))
            .form(&[("text", text), ("time", time.as_str())]);
        self.call(METHOD, req).await?;
        Ok(())
    }

    async fn post_ephemeral(&self, channel: &str, text: &str, user: &str) -> Result<(), RemoteError> {
        const METHOD: &str = "chat.postEphemeral";
        let req = self
            .http
            .post(self.url(METHOD))
            .json(&json!({ "channel": channel, "text": text, "user": user }));
        self.call(METHOD, req).await?;
        Ok(())
    }
}
