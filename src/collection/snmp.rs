//! SNMPv2c fallback for system counters
//!
//! Queries HOST-RESOURCES CPU load and storage used/size OIDs. Community
//! strings are tried in order; the first one that yields any value wins.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use snmp2::{AsyncSession, Oid, Value};
use tokio::time::timeout;
use tracing::{debug, instrument, trace};

use super::{CollectError, CollectResult, DeviceTarget, MetricsSource};
use crate::storage::GraphDataPoint;

/// hrProcessorLoad.1
const OID_CPU_LOAD: &[u64] = &[1, 3, 6, 1, 2, 1, 25, 3, 3, 1, 2, 1];
/// hrStorageUsed.1
const OID_MEMORY_USED: &[u64] = &[1, 3, 6, 1, 2, 1, 25, 2, 3, 1, 6, 1];
/// hrStorageSize.1
const OID_MEMORY_TOTAL: &[u64] = &[1, 3, 6, 1, 2, 1, 25, 2, 3, 1, 5, 1];

pub const DEFAULT_COMMUNITIES: [&str; 2] = ["public", "private"];

#[derive(Debug, Clone)]
pub struct SnmpCollector {
    communities: Vec<String>,
    port: u16,
    timeout: Duration,
}

impl Default for SnmpCollector {
    fn default() -> Self {
        Self::new(
            DEFAULT_COMMUNITIES.iter().map(|c| c.to_string()).collect(),
            161,
            Duration::from_secs(5),
        )
    }
}

impl SnmpCollector {
    pub fn new(communities: Vec<String>, port: u16, timeout: Duration) -> Self {
        Self {
            communities,
            port,
            timeout,
        }
    }

    pub fn communities(&self) -> &[String] {
        &self.communities
    }

    async fn query(&self, target: &DeviceTarget, community: &str) -> Option<SnmpReading> {
        let addr = format!("{}:{}", target.ip_address, self.port);

        let mut session = match timeout(
            self.timeout,
            AsyncSession::new_v2c(&addr, community.as_bytes(), 0),
        )
        .await
        {
            Ok(Ok(session)) => session,
            _ => return None,
        };

        let reading = SnmpReading {
            cpu_load: get_value(&mut session, OID_CPU_LOAD, self.timeout).await,
            memory_used: get_value(&mut session, OID_MEMORY_USED, self.timeout).await,
            memory_total: get_value(&mut session, OID_MEMORY_TOTAL, self.timeout).await,
        };

        (reading.cpu_load.is_some() || reading.memory_usage().is_some()).then_some(reading)
    }
}

#[async_trait]
impl MetricsSource for SnmpCollector {
    fn name(&self) -> &'static str {
        "snmp"
    }

    async fn probe(&self, target: &DeviceTarget) -> bool {
        for community in &self.communities {
            if self.query(target, community).await.is_some() {
                return true;
            }
        }
        false
    }

    #[instrument(skip(self, target), fields(device_id = %target.device_id, ip = %target.ip_address))]
    async fn collect(&self, target: &DeviceTarget) -> CollectResult<Vec<GraphDataPoint>> {
        for community in &self.communities {
            trace!("trying community `{community}`");
            if let Some(reading) = self.query(target, community).await {
                debug!("community `{community}` answered");
                return Ok(reading.into_points(&target.device_id));
            }
        }

        Err(CollectError::Snmp(format!(
            "no community answered on {}:{}",
            target.ip_address, self.port
        )))
    }
}

/// Raw values from one successful community
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SnmpReading {
    pub cpu_load: Option<f64>,
    pub memory_used: Option<f64>,
    pub memory_total: Option<f64>,
}

impl SnmpReading {
    pub fn memory_usage(&self) -> Option<f64> {
        match (self.memory_used, self.memory_total) {
            (Some(used), Some(total)) if total > 0.0 => Some(used / total * 100.0),
            _ => None,
        }
    }

    pub fn into_points(self, device_id: &str) -> Vec<GraphDataPoint> {
        let at = Utc::now();
        let point = |name: &str, value: f64| GraphDataPoint {
            device_id: device_id.to_string(),
            timestamp: at,
            metric_type: "system".to_string(),
            metric_name: name.to_string(),
            value,
            unit: "percent".to_string(),
            interface_name: None,
        };

        let mut points = Vec::new();
        if let Some(cpu) = self.cpu_load {
            points.push(point("cpu_load", cpu));
        }
        if let Some(memory) = self.memory_usage() {
            points.push(point("memory_usage", memory));
        }
        points
    }
}

async fn get_value(session: &mut AsyncSession, oid: &[u64], limit: Duration) -> Option<f64> {
    let oid = Oid::from(oid).ok()?;
    let mut response = timeout(limit, session.get(&oid)).await.ok()?.ok()?;
    let (_, value) = response.varbinds.next()?;
    value_as_f64(&value)
}

fn value_as_f64(value: &Value<'_>) -> Option<f64> {
    match value {
        Value::Integer(v) => Some(*v as f64),
        Value::Counter32(v) | Value::Unsigned32(v) | Value::Timeticks(v) => Some(f64::from(*v)),
        Value::Counter64(v) => Some(*v as f64),
        Value::OctetString(bytes) => String::from_utf8_lossy(bytes).trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_usage_needs_both_values() {
        let reading = SnmpReading {
            cpu_load: Some(5.0),
            memory_used: Some(256.0),
            memory_total: Some(1024.0),
        };
        assert_eq!(reading.memory_usage(), Some(25.0));

        let partial = SnmpReading {
            memory_used: Some(256.0),
            ..Default::default()
        };
        assert_eq!(partial.memory_usage(), None);

        let zero = SnmpReading {
            memory_used: Some(0.0),
            memory_total: Some(0.0),
            ..Default::default()
        };
        assert_eq!(zero.memory_usage(), None);
    }

    #[test]
    fn test_reading_into_points() {
        let reading = SnmpReading {
            cpu_load: Some(12.0),
            memory_used: Some(1.0),
            memory_total: Some(4.0),
        };

        let points = reading.into_points("mikrotik_10.0.0.1");

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].metric_name, "cpu_load");
        assert_eq!(points[1].metric_name, "memory_usage");
        assert_eq!(points[1].value, 25.0);
        assert!(points.iter().all(|p| p.metric_type == "system" && p.unit == "percent"));
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(value_as_f64(&Value::Integer(-3)), Some(-3.0));
        assert_eq!(value_as_f64(&Value::Counter32(7)), Some(7.0));
        assert_eq!(value_as_f64(&Value::Counter64(9)), Some(9.0));
        assert_eq!(value_as_f64(&Value::OctetString(b"42")), Some(42.0));
        assert_eq!(value_as_f64(&Value::Null), None);
    }

    #[tokio::test]
    async fn test_collect_against_silent_host_fails() {
        let collector = SnmpCollector::new(
            vec!["public".to_string()],
            1,
            Duration::from_millis(200),
        );

        let result = collector
            .collect(&DeviceTarget::new("mikrotik_127.0.0.1", "127.0.0.1"))
            .await;

        assert!(matches!(result, Err(CollectError::Snmp(_))));
    }
}
