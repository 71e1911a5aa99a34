use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use sec_autorem::config::{Config, RuleSet};
use sec_autorem::engine::Monitor;
use sec_autorem::feed;
use sec_autorem::logging::{
    log, log_authenticated, log_rules_loaded, log_startup, obj, v_str, Domain, Level,
};
use sec_autorem::slack::{ActionApi, Session, SlackClient};

#[tokio::main]
async fn main() -> Result<()> {
    let result = run().await;
    if let Err(err) = &result {
        log(
            Level::Fatal,
            Domain::System,
            "fatal",
            obj(&[("msg", v_str(&format!("{:#}", err)))]),
        );
    }
    result
}

async fn run() -> Result<()> {
    let cfg = Config::from_env();
    cfg.validate()?;
    log_startup(&cfg.config_file, &cfg.slack_api_base);

    let rules = RuleSet::load(&cfg.config_file)?;
    log_rules_loaded(&cfg.config_file, rules.len(), rules.fingerprint());

    let client = Arc::new(SlackClient::new(&cfg)?);
    let session = Session::authenticate(client)
        .await
        .context("cannot test authentication")?;
    log_authenticated(&session.identity.name, &session.identity.user_id);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log(
                Level::Info,
                Domain::System,
                "shutdown",
                obj(&[("msg", v_str("interrupt received"))]),
            );
            on_signal.cancel();
        }
    });

    let stream = feed::rtm::connect(&session.client, &cfg, cancel.clone())
        .await
        .context("cannot open event stream")?;

    let api: Arc<dyn ActionApi> = session.client.clone();
    let monitor = Monitor::new(session.identity.clone(), Arc::new(rules), api);
    monitor.run(stream, cancel).await?;

    log(
        Level::Info,
        Domain::System,
        "stopped",
        obj(&[("msg", v_str("clean shutdown"))]),
    );
    Ok(())
}
