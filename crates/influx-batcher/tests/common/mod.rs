// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fake InfluxDB `/write` endpoint and a Line Protocol decoder.

#![allow(dead_code)]

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Router,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Any line containing this marker is answered with 400.
pub const POISON: &str = "poison";

#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub db: Option<String>,
    pub precision: Option<String>,
    pub authorization: Option<String>,
    pub user_agent: Option<String>,
    pub lines: Vec<String>,
    pub status: u16,
}

#[derive(Clone, Default)]
pub struct Receiver {
    requests: Arc<Mutex<Vec<WriteRequest>>>,
    fail_next: Arc<AtomicUsize>,
}

impl Receiver {
    /// Start the receiver on an ephemeral port. Returns the write URL.
    pub async fn start() -> (String, Receiver) {
        let receiver = Receiver::default();
        let app = Router::new()
            .route("/write", post(write))
            .with_state(receiver.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        (format!("http://{}/write", addr), receiver)
    }

    /// Answer the next `n` requests with 503.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<WriteRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Lines from requests answered with 2xx, in arrival order.
    pub fn accepted(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| (200..300).contains(&r.status))
            .flat_map(|r| r.lines)
            .collect()
    }

    pub async fn wait_for_accepted(&self, n: usize) {
        for _ in 0..500 {
            if self.accepted().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} accepted lines, got {}", n, self.accepted().len());
    }
}

async fn write(
    State(receiver): State<Receiver>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let lines: Vec<String> = body.lines().map(str::to_string).collect();

    let status = if receiver
        .fail_next
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        StatusCode::SERVICE_UNAVAILABLE
    } else if lines.iter().any(|l| l.contains(POISON)) || lines.iter().any(|l| decode(l).is_none()) {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::NO_CONTENT
    };

    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    receiver.requests.lock().unwrap().push(WriteRequest {
        db: params.get("db").cloned(),
        precision: params.get("precision").cloned(),
        authorization: header_value(header::AUTHORIZATION),
        user_agent: header_value(header::USER_AGENT),
        lines,
        status: status.as_u16(),
    });
    status
}

/// Decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

/// One decoded Line Protocol record.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, Value>,
    pub timestamp: i64,
}

/// Decode a record, undoing the backslash escapes.
pub fn decode(line: &str) -> Option<Point> {
    let sections = split_unescaped(line, ' ');
    if sections.len() != 3 {
        return None;
    }

    let series = split_unescaped(&sections[0], ',');
    let (name, tag_pairs) = series.split_first()?;
    let mut tags = BTreeMap::new();
    for pair in tag_pairs {
        let (k, v) = split_pair(pair)?;
        tags.insert(unescape(&k), unescape(&v));
    }

    let mut fields = BTreeMap::new();
    for pair in split_unescaped(&sections[1], ',') {
        let (k, v) = split_pair(&pair)?;
        fields.insert(unescape(&k), decode_value(&v)?);
    }
    if fields.is_empty() {
        return None;
    }

    Some(Point {
        name: unescape(name),
        tags,
        fields,
        timestamp: sections[2].parse().ok()?,
    })
}

fn decode_value(raw: &str) -> Option<Value> {
    if let Some(quoted) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Some(Value::String(unescape(quoted)));
    }
    match raw {
        "true" => return Some(Value::Boolean(true)),
        "false" => return Some(Value::Boolean(false)),
        _ => {}
    }
    if let Some(int) = raw.strip_suffix('i') {
        return int.parse().ok().map(Value::Integer);
    }
    raw.parse().ok().map(Value::Float)
}

/// Split on `sep` where it is neither escaped nor inside a quoted string.
fn split_unescaped(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    let mut quoted = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c == sep && !quoted => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn split_pair(s: &str) -> Option<(String, String)> {
    let mut parts = split_unescaped(s, '=').into_iter();
    let key = parts.next()?;
    let value: Vec<String> = parts.collect();
    if value.is_empty() {
        return None;
    }
    Some((key, value.join("=")))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, ' ' | ',' | '"') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}
