//! RouterOS REST metrics client
//!
//! Pulls interface, system, wireless and queue counters from the device's
//! `/rest` endpoints. RouterOS renders most numbers as strings and durations
//! as `1w2d3h4m5s`, so every value goes through [`numeric`] before it becomes
//! a data point.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, instrument, trace};

use super::{CollectError, CollectResult, DeviceTarget, MetricsSource};
use crate::storage::GraphDataPoint;

pub const GRAPHING_ENDPOINT: &str = "/rest/tool/graphing";
pub const INTERFACE_ENDPOINT: &str = "/rest/interface";
pub const SYSTEM_RESOURCE_ENDPOINT: &str = "/rest/system/resource";
pub const WIRELESS_ENDPOINT: &str = "/rest/interface/wireless";
pub const QUEUE_ENDPOINT: &str = "/rest/queue/simple";

type Extractor = fn(&Stamp<'_>, &Value) -> Vec<GraphDataPoint>;

#[derive(Debug, Clone)]
pub struct RestMetricsClient {
    client: reqwest::Client,
    scheme: String,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
}

impl RestMetricsClient {
    pub fn new(timeout: Duration) -> CollectResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            scheme: "http".to_string(),
            port: None,
            username: None,
            password: None,
        })
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Talk to a non-default port on every device
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    fn url(&self, target: &DeviceTarget, path: &str) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}{}", self.scheme, target.ip_address, port, path),
            None => format!("{}://{}{}", self.scheme, target.ip_address, path),
        }
    }

    async fn send(&self, target: &DeviceTarget, path: &str) -> CollectResult<reqwest::Response> {
        let url = self.url(target, path);
        trace!("GET {url}");

        let mut request = self.client.get(&url);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(CollectError::InvalidResponse {
                endpoint: path.to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }
        Ok(response)
    }

    async fn get_json(&self, target: &DeviceTarget, path: &str) -> CollectResult<Value> {
        let response = self.send(target, path).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| CollectError::InvalidResponse {
                endpoint: path.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl MetricsSource for RestMetricsClient {
    fn name(&self) -> &'static str {
        "rest"
    }

    #[instrument(skip(self, target), fields(device_id = %target.device_id, ip = %target.ip_address))]
    async fn probe(&self, target: &DeviceTarget) -> bool {
        for path in [GRAPHING_ENDPOINT, SYSTEM_RESOURCE_ENDPOINT] {
            match self.send(target, path).await {
                Ok(_) => {
                    debug!("metrics API available via {path}");
                    return true;
                }
                Err(e) => trace!("probe {path} failed: {e}"),
            }
        }
        false
    }

    #[instrument(skip(self, target), fields(device_id = %target.device_id, ip = %target.ip_address))]
    async fn collect(&self, target: &DeviceTarget) -> CollectResult<Vec<GraphDataPoint>> {
        let (interfaces, system, wireless, queues) = tokio::join!(
            self.get_json(target, INTERFACE_ENDPOINT),
            self.get_json(target, SYSTEM_RESOURCE_ENDPOINT),
            self.get_json(target, WIRELESS_ENDPOINT),
            self.get_json(target, QUEUE_ENDPOINT),
        );

        let stamp = Stamp {
            device_id: &target.device_id,
            at: Utc::now(),
        };
        let results: [(&str, CollectResult<Value>, Extractor); 4] = [
            (INTERFACE_ENDPOINT, interfaces, interface_points),
            (SYSTEM_RESOURCE_ENDPOINT, system, system_points),
            (WIRELESS_ENDPOINT, wireless, wireless_points),
            (QUEUE_ENDPOINT, queues, queue_points),
        ];

        let mut points = Vec::new();
        let mut first_error = None;
        for (endpoint, result, extract) in results {
            match result {
                Ok(body) => points.extend(extract(&stamp, &body)),
                Err(e) => {
                    debug!("{endpoint} unavailable: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if points.is_empty() => Err(e),
            _ => {
                debug!("collected {} points", points.len());
                Ok(points)
            }
        }
    }
}

/// Device identity and timestamp shared by every point from one response
struct Stamp<'a> {
    device_id: &'a str,
    at: DateTime<Utc>,
}

impl Stamp<'_> {
    fn point(&self, metric_type: &str, metric_name: &str, value: f64, unit: &str, interface: Option<&str>) -> GraphDataPoint {
        GraphDataPoint {
            device_id: self.device_id.to_string(),
            timestamp: self.at,
            metric_type: metric_type.to_string(),
            metric_name: metric_name.to_string(),
            value,
            unit: unit.to_string(),
            interface_name: interface.map(str::to_string),
        }
    }
}

/// Responses are lists of flat objects; a bare object counts as a list of one
fn rows(body: &Value) -> Vec<&Map<String, Value>> {
    match body {
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        Value::Object(map) => vec![map],
        _ => Vec::new(),
    }
}

fn row_name(row: &Map<String, Value>) -> &str {
    row.get("name").and_then(Value::as_str).unwrap_or("unknown")
}

/// JSON numbers, numeric strings, and RouterOS `up/down` pairs (summed)
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(v) = s.parse::<f64>() {
                return Some(v);
            }
            let (a, b) = s.split_once('/')?;
            Some(a.trim().parse::<f64>().ok()? + b.trim().parse::<f64>().ok()?)
        }
        _ => None,
    }
}

/// Parse `1w2d3h4m5s` (any subset, in order) into seconds
pub fn parse_duration_secs(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(secs) = text.parse::<u64>() {
        return Some(secs);
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'w' => 7 * 24 * 3600,
            'd' => 24 * 3600,
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        let n: u64 = digits.parse().ok()?;
        total = total.checked_add(n.checked_mul(unit)?)?;
        digits.clear();
    }

    digits.is_empty().then_some(total)
}

fn interface_points(stamp: &Stamp<'_>, body: &Value) -> Vec<GraphDataPoint> {
    const FIELDS: [(&str, &str, &str); 4] = [
        ("tx-byte", "tx_bytes", "bytes"),
        ("rx-byte", "rx_bytes", "bytes"),
        ("tx-packet", "tx_packets", "packets"),
        ("rx-packet", "rx_packets", "packets"),
    ];

    let mut points = Vec::new();
    for row in rows(body) {
        let name = row_name(row);
        for (field, metric, unit) in FIELDS {
            if let Some(value) = row.get(field).and_then(numeric) {
                points.push(stamp.point("interface", metric, value, unit, Some(name)));
            }
        }
    }
    points
}

fn system_points(stamp: &Stamp<'_>, body: &Value) -> Vec<GraphDataPoint> {
    let Some(resource) = rows(body).into_iter().next() else {
        return Vec::new();
    };

    let mut points = Vec::new();
    if let Some(cpu) = resource.get("cpu-load").and_then(numeric) {
        points.push(stamp.point("system", "cpu_load", cpu, "percent", None));
    }

    let free = resource.get("free-memory").and_then(numeric);
    let total = resource.get("total-memory").and_then(numeric);
    if let (Some(free), Some(total)) = (free, total)
        && total > 0.0
    {
        let usage = (total - free) / total * 100.0;
        points.push(stamp.point("system", "memory_usage", usage, "percent", None));
    }

    let uptime = resource.get("uptime").and_then(|v| match v {
        Value::String(s) => parse_duration_secs(s).map(|s| s as f64),
        other => numeric(other),
    });
    if let Some(uptime) = uptime {
        points.push(stamp.point("system", "uptime", uptime, "seconds", None));
    }

    points
}

fn wireless_points(stamp: &Stamp<'_>, body: &Value) -> Vec<GraphDataPoint> {
    let mut points = Vec::new();
    for row in rows(body) {
        let name = row_name(row);
        if let Some(signal) = row.get("signal-strength").and_then(numeric) {
            points.push(stamp.point("wireless", "signal_strength", signal, "dBm", Some(name)));
        }
        if let Some(noise) = row.get("noise-floor").and_then(numeric) {
            points.push(stamp.point("wireless", "noise_floor", noise, "dBm", Some(name)));
        }
    }
    points
}

fn queue_points(stamp: &Stamp<'_>, body: &Value) -> Vec<GraphDataPoint> {
    let mut points = Vec::new();
    for row in rows(body) {
        let name = row_name(row);
        if let Some(length) = row.get("queue").and_then(numeric) {
            points.push(stamp.point("queue", "queue_length", length, "packets", Some(name)));
        }
        if let Some(drops) = row.get("dropped").and_then(numeric) {
            points.push(stamp.point("queue", "queue_drops", drops, "packets", Some(name)));
        }
    }
    points
}
