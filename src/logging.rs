//! Structured JSON-lines logging.
//!
//! Every record is one JSON object on stdout carrying a run id, a
//! monotonically increasing sequence number, level, domain and a free-form
//! `data` object. When `LOG_DIR` is set the same lines are also appended to
//! `LOG_DIR/<run_id>/events.jsonl` (info and above) and `trace.jsonl`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::config::format_delay;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    System, // Startup, auth, shutdown
    Stream, // Websocket lifecycle, inbound events
    Rules,  // Rule loading and matching
    Remind, // Permalink + reminder registration
    Notify, // Ephemeral acknowledgments
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::System => "system",
            Domain::Stream => "stream",
            Domain::Rules => "rules",
            Domain::Remind => "remind",
            Domain::Notify => "notify",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    sinks: Option<FileSinks>,
}

#[derive(Debug)]
struct FileSinks {
    events: Mutex<BufWriter<File>>,
    trace: Mutex<BufWriter<File>>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let sinks = std::env::var("LOG_DIR")
            .ok()
            .and_then(|base| open_sinks(PathBuf::from(base).join(&run_id), &run_id));
        RunContext { run_id, sinks }
    })
}

fn open_sinks(run_dir: PathBuf, run_id: &str) -> Option<FileSinks> {
    if let Err(err) = create_dir_all(&run_dir) {
        eprintln!("[log] failed to create run dir {}: {}", run_dir.display(), err);
        return None;
    }

    let _ = std::fs::write(
        run_dir.join("manifest.json"),
        json!({
            "run_id": run_id,
            "ts": ts_now(),
            "pid": process::id(),
            "log_dir": run_dir.to_string_lossy(),
        })
        .to_string(),
    );

    let open = |name: &str| match File::create(run_dir.join(name)) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", name, err);
            None
        }
    };

    Some(FileSinks {
        events: open("events.jsonl")?,
        trace: open("trace.jsonl")?,
    })
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in ["token", "authorization", "Authorization", "slack_token"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["channel", "message_ts", "user", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }

    let line = render_record(level, domain.as_str(), event, fields);
    let ctx = ensure_run_context();
    if let Some(sinks) = &ctx.sinks {
        match level {
            Level::Trace | Level::Debug => write_line(&sinks.trace, &line),
            _ => write_line(&sinks.events, &line),
        }
    }
    println!("{}", line);
}

fn render_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) -> String {
    let ctx = ensure_run_context();
    let fields = sanitize_fields(fields);
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    Value::Object(entry).to_string()
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Domain helpers
// =============================================================================

pub fn log_startup(config_file: &str, api_base: &str) {
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("msg", v_str("starting")),
            ("config_file", v_str(config_file)),
            ("api_base", v_str(api_base)),
            ("version", v_str(env!("CARGO_PKG_VERSION"))),
        ]),
    );
}

pub fn log_authenticated(user: &str, user_id: &str) {
    log(
        Level::Info,
        Domain::System,
        "authenticated",
        obj(&[
            ("msg", v_str(&format!("authenticated as: {}", user))),
            ("user", v_str(user_id)),
            ("name", v_str(user)),
        ]),
    );
}

pub fn log_rules_loaded(path: &str, count: usize, sha256: Option<&str>) {
    let level = if count == 0 { Level::Warn } else { Level::Info };
    let msg = if count == 0 {
        "rule set is empty; no message will ever match"
    } else {
        "rule set loaded"
    };
    log(
        level,
        Domain::Rules,
        "rules_loaded",
        obj(&[
            ("msg", v_str(msg)),
            ("path", v_str(path)),
            ("count", json!(count)),
            ("sha256", json!(sha256)),
        ]),
    );
}

pub fn log_match(channel: &str, ts: &str, rule_index: usize, delay: Duration) {
    log(
        Level::Debug,
        Domain::Rules,
        "match",
        obj(&[
            ("channel", v_str(channel)),
            ("message_ts", v_str(ts)),
            ("rule", json!(rule_index)),
            ("delay", v_str(&format_delay(delay))),
        ]),
    );
    agg_increment("match");
}

pub fn log_reminder_set(channel: &str, ts: &str, delay: Duration, trigger_at: i64, text: &str) {
    log(
        Level::Info,
        Domain::Remind,
        "reminder_set",
        obj(&[
            ("msg", v_str(&format!("set reminder after {}: {:?}", format_delay(delay), text))),
            ("channel", v_str(channel)),
            ("message_ts", v_str(ts)),
            ("delay", v_str(&format_delay(delay))),
            ("trigger_at", json!(trigger_at)),
        ]),
    );
    agg_increment("reminder");
}

/// Per-match remote failure. Carries the delay and text so a missed
/// reminder can be reconstructed by hand.
pub fn log_remote_failure(stage: &str, channel: &str, ts: &str, delay: Duration, text: &str, err: &str) {
    log(
        Level::Error,
        Domain::Remind,
        "remote_failure",
        obj(&[
            ("msg", v_str(&format!("failed to {}: {}", stage, err))),
            ("stage", v_str(stage)),
            ("channel", v_str(channel)),
            ("message_ts", v_str(ts)),
            ("delay", v_str(&format_delay(delay))),
            ("text", v_str(text)),
        ]),
    );
    agg_increment("failure");
}

pub fn log_stream(level: Level, event: &str, msg: &str) {
    log(level, Domain::Stream, event, obj(&[("msg", v_str(msg))]));
}

// =============================================================================
// Log Aggregator for Periodic Summaries
// =============================================================================

static AGGREGATOR: OnceLock<Mutex<LogAggregator>> = OnceLock::new();

fn get_aggregator() -> &'static Mutex<LogAggregator> {
    AGGREGATOR.get_or_init(|| Mutex::new(LogAggregator::new()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatedStats {
    pub events: u64,
    pub matches: u64,
    pub reminders: u64,
    pub failures: u64,
}

struct LogAggregator {
    stats: AggregatedStats,
    last_flush: Instant,
    flush_interval_secs: u64,
}

impl LogAggregator {
    fn new() -> Self {
        Self {
            stats: AggregatedStats::default(),
            last_flush: Instant::now(),
            flush_interval_secs: std::env::var("LOG_FLUSH_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }

    fn increment(&mut self, event: &str) {
        match event {
            "event" => self.stats.events += 1,
            "match" => self.stats.matches += 1,
            "reminder" => self.stats.reminders += 1,
            "failure" => self.stats.failures += 1,
            _ => {}
        }
    }

    fn maybe_flush(&mut self) -> Option<AggregatedStats> {
        if self.last_flush.elapsed().as_secs() >= self.flush_interval_secs {
            let result = std::mem::take(&mut self.stats);
            self.last_flush = Instant::now();
            Some(result)
        } else {
            None
        }
    }
}

/// Call periodically to emit aggregated stats
pub fn tick_aggregator() {
    if let Ok(mut agg) = get_aggregator().lock() {
        if let Some(stats) = agg.maybe_flush() {
            log(
                Level::Info,
                Domain::System,
                "aggregated_stats",
                obj(&[
                    ("events", json!(stats.events)),
                    ("matches", json!(stats.matches)),
                    ("reminders", json!(stats.reminders)),
                    ("failures", json!(stats.failures)),
                ]),
            );
        }
    }
}

/// Increment a counter in the aggregator
pub fn agg_increment(event: &str) {
    if let Ok(mut agg) = get_aggregator().lock() {
        agg.increment(event);
    }
}

// =============================================================================
// Tests
// =============================================================================
