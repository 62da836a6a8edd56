//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers never block the collection writers
//! - **Foreign keys**: Enforced on every connection; violations surface as
//!   [`StorageError::IntegrityViolation`]
//! - **Migrations**: Embedded and applied on startup with sqlx
//!
//! ## Transactions
//!
//! Per-device collection results, configuration passes, connection upserts
//! and topology snapshots each run in a single transaction.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, QueryBuilder, Row, Sqlite, Transaction};
use tracing::{debug, info, instrument, warn};

use super::backend::{ConfigCollection, HealthStatus, RetentionReport, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    ConfigSnapshot, ConnectionCounts, ConnectionRecord, ConnectionUpsert, DeviceCounts,
    DeviceFilter, DeviceRecord, DeviceStatus, DeviceUpsert, GraphDataPoint, InterfaceCounts,
    InterfaceRecord, InterfaceUpsert, MonitoringRecord, MonitoringSample, NetworkStatistics,
    RecentActivity, ScanOutcome, ScanSession, ScanStatus, TopologySnapshot,
};

const DEVICE_COLUMNS: &str = "id, device_id, ip_address, mac_address, hostname, device_type, \
     vendor, model, firmware_version, status, location, description, snmp_community, \
     snmp_version, discovery_method, first_seen, last_seen, created_at, updated_at";

const INTERFACE_SELECT: &str = "SELECT i.id, i.device_id, i.interface_name, i.interface_index, \
     i.description, i.mac_address, i.ip_address, i.subnet_mask, i.speed, i.status, \
     i.admin_status, i.interface_type, i.mtu, i.bandwidth, i.duplex, i.created_at, \
     i.updated_at, d.hostname AS hostname, d.ip_address AS device_ip \
     FROM interfaces i JOIN devices d ON d.id = i.device_id";

const CONNECTION_SELECT: &str = "SELECT c.id, c.source_device_id, c.source_interface_id, \
     c.target_device_id, c.target_interface_id, c.connection_type, c.bandwidth, c.status, \
     c.discovery_method, c.created_at, c.updated_at, \
     sd.hostname AS source_hostname, sd.ip_address AS source_ip, \
     td.hostname AS target_hostname, td.ip_address AS target_ip, \
     si.interface_name AS source_interface_name, ti.interface_name AS target_interface_name \
     FROM connections c \
     JOIN devices sd ON c.source_device_id = sd.id \
     JOIN devices td ON c.target_device_id = td.id \
     LEFT JOIN interfaces si ON c.source_interface_id = si.id \
     LEFT JOIN interfaces ti ON c.target_interface_id = ti.id";

const SCAN_COLUMNS: &str = "id, session_name, scan_type, network_range, status, \
     devices_discovered, connections_discovered, error_message, started_at, completed_at";

const MONITORING_COLUMNS: &str = "m.id, m.device_id, m.cpu_usage, m.memory_usage, \
     m.temperature, m.uptime, m.interface_count, m.active_connections, m.packet_loss, \
     m.latency, m.bandwidth_in, m.bandwidth_out, m.source, m.monitored_at";

const GRAPHING_COLUMNS: &str =
    "device_id, timestamp, metric_type, metric_name, value, unit, interface_name";

/// Helper to convert timestamp to Unix milliseconds for SQLite
fn to_millis(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Helper to convert Unix milliseconds from SQLite to DateTime
fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn device_from_row(row: &SqliteRow) -> StorageResult<DeviceRecord> {
    let status: String = row.try_get("status")?;
    Ok(DeviceRecord {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        ip_address: row.try_get("ip_address")?,
        mac_address: row.try_get("mac_address")?,
        hostname: row.try_get("hostname")?,
        device_type: row.try_get("device_type")?,
        vendor: row.try_get("vendor")?,
        model: row.try_get("model")?,
        firmware_version: row.try_get("firmware_version")?,
        status: status.parse().unwrap_or(DeviceStatus::Unknown),
        location: row.try_get("location")?,
        description: row.try_get("description")?,
        snmp_community: row.try_get("snmp_community")?,
        snmp_version: row.try_get("snmp_version")?,
        discovery_method: row.try_get("discovery_method")?,
        first_seen: from_millis(row.try_get("first_seen")?),
        last_seen: from_millis(row.try_get("last_seen")?),
        created_at: from_millis(row.try_get("created_at")?),
        updated_at: from_millis(row.try_get("updated_at")?),
    })
}

fn interface_from_row(row: &SqliteRow) -> StorageResult<InterfaceRecord> {
    Ok(InterfaceRecord {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        interface_name: row.try_get("interface_name")?,
        interface_index: row.try_get("interface_index")?,
        description: row.try_get("description")?,
        mac_address: row.try_get("mac_address")?,
        ip_address: row.try_get("ip_address")?,
        subnet_mask: row.try_get("subnet_mask")?,
        speed: row.try_get("speed")?,
        status: row.try_get("status")?,
        admin_status: row.try_get("admin_status")?,
        interface_type: row.try_get("interface_type")?,
        mtu: row.try_get("mtu")?,
        bandwidth: row.try_get("bandwidth")?,
        duplex: row.try_get("duplex")?,
        created_at: from_millis(row.try_get("created_at")?),
        updated_at: from_millis(row.try_get("updated_at")?),
        hostname: row.try_get("hostname")?,
        device_ip: row.try_get("device_ip")?,
    })
}

fn connection_from_row(row: &SqliteRow) -> StorageResult<ConnectionRecord> {
    Ok(ConnectionRecord {
        id: row.try_get("id")?,
        source_device_id: row.try_get("source_device_id")?,
        source_interface_id: row.try_get("source_interface_id")?,
        target_device_id: row.try_get("target_device_id")?,
        target_interface_id: row.try_get("target_interface_id")?,
        connection_type: row.try_get("connection_type")?,
        bandwidth: row.try_get("bandwidth")?,
        status: row.try_get("status")?,
        discovery_method: row.try_get("discovery_method")?,
        created_at: from_millis(row.try_get("created_at")?),
        updated_at: from_millis(row.try_get("updated_at")?),
        source_hostname: row.try_get("source_hostname")?,
        source_ip: row.try_get("source_ip")?,
        target_hostname: row.try_get("target_hostname")?,
        target_ip: row.try_get("target_ip")?,
        source_interface_name: row.try_get("source_interface_name")?,
        target_interface_name: row.try_get("target_interface_name")?,
    })
}

fn scan_from_row(row: &SqliteRow) -> StorageResult<ScanSession> {
    let status: String = row.try_get("status")?;
    Ok(ScanSession {
        id: row.try_get("id")?,
        session_name: row.try_get("session_name")?,
        scan_type: row.try_get("scan_type")?,
        network_range: row.try_get("network_range")?,
        status: status.parse().map_err(StorageError::QueryFailed)?,
        devices_discovered: row.try_get("devices_discovered")?,
        connections_discovered: row.try_get("connections_discovered")?,
        error_message: row.try_get("error_message")?,
        started_at: from_millis(row.try_get("started_at")?),
        completed_at: row
            .try_get::<Option<i64>, _>("completed_at")?
            .map(from_millis),
    })
}

/// `joined` selects whether hostname/ip/type columns are present
fn monitoring_from_row(row: &SqliteRow, joined: bool) -> StorageResult<MonitoringRecord> {
    let sample = MonitoringSample {
        cpu_usage: row.try_get("cpu_usage")?,
        memory_usage: row.try_get("memory_usage")?,
        temperature: row.try_get("temperature")?,
        uptime: row.try_get("uptime")?,
        interface_count: row.try_get("interface_count")?,
        active_connections: row.try_get("active_connections")?,
        packet_loss: row.try_get("packet_loss")?,
        latency: row.try_get("latency")?,
        bandwidth_in: row.try_get("bandwidth_in")?,
        bandwidth_out: row.try_get("bandwidth_out")?,
        source: row.try_get("source")?,
        monitored_at: from_millis(row.try_get("monitored_at")?),
    };

    let (hostname, ip_address, device_type) = if joined {
        (
            row.try_get("hostname")?,
            row.try_get("ip_address")?,
            row.try_get("device_type")?,
        )
    } else {
        (None, None, None)
    };

    Ok(MonitoringRecord {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        sample,
        hostname,
        ip_address,
        device_type,
    })
}

fn graphing_from_row(row: &SqliteRow) -> StorageResult<GraphDataPoint> {
    Ok(GraphDataPoint {
        device_id: row.try_get("device_id")?,
        timestamp: from_millis(row.try_get("timestamp")?),
        metric_type: row.try_get("metric_type")?,
        metric_name: row.try_get("metric_name")?,
        value: row.try_get("value")?,
        unit: row.try_get("unit")?,
        interface_name: row.try_get("interface_name")?,
    })
}

fn config_from_row(row: &SqliteRow) -> StorageResult<ConfigSnapshot> {
    let json: String = row.try_get("data_json")?;
    Ok(ConfigSnapshot {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        data_type: row.try_get("data_type")?,
        data: serde_json::from_str(&json)?,
        timestamp: from_millis(row.try_get("timestamp")?),
    })
}

fn collect_rows<T>(
    rows: Vec<SqliteRow>,
    map: impl Fn(&SqliteRow) -> StorageResult<T>,
) -> StorageResult<Vec<T>> {
    rows.iter().map(map).collect()
}

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (creating if missing) the database and apply migrations
    ///
    /// ```no_run
    /// # use routeros_monitoring::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./network_devices.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("database ready");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    async fn device_pk(tx: &mut Transaction<'_, Sqlite>, device_id: &str) -> StorageResult<i64> {
        let pk: Option<i64> = sqlx::query_scalar("SELECT id FROM devices WHERE device_id = ?")
            .bind(device_id)
            .fetch_optional(&mut **tx)
            .await?;
        pk.ok_or_else(|| StorageError::IntegrityViolation(format!("unknown device `{device_id}`")))
    }

    async fn upsert_interface_in(
        tx: &mut Transaction<'_, Sqlite>,
        device_pk: i64,
        interface: &InterfaceUpsert,
        now: i64,
    ) -> StorageResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO interfaces (
                device_id, interface_name, interface_index, description, mac_address,
                ip_address, subnet_mask, speed, status, admin_status, interface_type,
                mtu, bandwidth, duplex, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (device_id, interface_name) DO UPDATE SET
                interface_index = COALESCE(excluded.interface_index, interfaces.interface_index),
                description = COALESCE(excluded.description, interfaces.description),
                mac_address = COALESCE(excluded.mac_address, interfaces.mac_address),
                ip_address = COALESCE(excluded.ip_address, interfaces.ip_address),
                subnet_mask = COALESCE(excluded.subnet_mask, interfaces.subnet_mask),
                speed = COALESCE(excluded.speed, interfaces.speed),
                status = excluded.status,
                admin_status = COALESCE(excluded.admin_status, interfaces.admin_status),
                interface_type = COALESCE(excluded.interface_type, interfaces.interface_type),
                mtu = COALESCE(excluded.mtu, interfaces.mtu),
                bandwidth = COALESCE(excluded.bandwidth, interfaces.bandwidth),
                duplex = COALESCE(excluded.duplex, interfaces.duplex),
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(device_pk)
        .bind(&interface.interface_name)
        .bind(interface.interface_index)
        .bind(&interface.description)
        .bind(&interface.mac_address)
        .bind(&interface.ip_address)
        .bind(&interface.subnet_mask)
        .bind(interface.speed)
        .bind(&interface.status)
        .bind(&interface.admin_status)
        .bind(&interface.interface_type)
        .bind(interface.mtu)
        .bind(interface.bandwidth)
        .bind(&interface.duplex)
        .bind(now)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        Ok(id)
    }

    async fn insert_sample_in(
        tx: &mut Transaction<'_, Sqlite>,
        device_pk: i64,
        sample: &MonitoringSample,
    ) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO device_monitoring (
                device_id, cpu_usage, memory_usage, temperature, uptime, interface_count,
                active_connections, packet_loss, latency, bandwidth_in, bandwidth_out,
                source, monitored_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(device_pk)
        .bind(sample.cpu_usage)
        .bind(sample.memory_usage)
        .bind(sample.temperature)
        .bind(sample.uptime)
        .bind(sample.interface_count)
        .bind(sample.active_connections)
        .bind(sample.packet_loss)
        .bind(sample.latency)
        .bind(sample.bandwidth_in)
        .bind(sample.bandwidth_out)
        .bind(&sample.source)
        .bind(to_millis(&sample.monitored_at))
        .execute(&mut **tx)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn insert_snapshot_in(
        tx: &mut Transaction<'_, Sqlite>,
        device_id: &str,
        data_type: &str,
        data: &serde_json::Value,
        at: i64,
    ) -> StorageResult<i64> {
        let json = serde_json::to_string(data)?;
        let result = sqlx::query(
            "INSERT INTO routeros_config_data (device_id, data_type, data_json, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(device_id)
        .bind(data_type)
        .bind(json)
        .bind(at)
        .execute(&mut **tx)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, device), fields(device_id = %device.device_id))]
    async fn upsert_device(&self, device: &DeviceUpsert) -> StorageResult<DeviceRecord> {
        let now = to_millis(&Utc::now());
        let seen = to_millis(&device.seen_at);

        let sql = format!(
            r#"
            INSERT INTO devices (
                device_id, ip_address, mac_address, hostname, device_type, vendor, model,
                firmware_version, status, location, description, snmp_community, snmp_version,
                discovery_method, first_seen, last_seen, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (device_id) DO UPDATE SET
                ip_address = excluded.ip_address,
                mac_address = COALESCE(excluded.mac_address, devices.mac_address),
                hostname = COALESCE(excluded.hostname, devices.hostname),
                device_type = CASE WHEN excluded.device_type = 'unknown'
                    THEN devices.device_type ELSE excluded.device_type END,
                vendor = COALESCE(excluded.vendor, devices.vendor),
                model = COALESCE(excluded.model, devices.model),
                firmware_version = COALESCE(excluded.firmware_version, devices.firmware_version),
                status = CASE WHEN excluded.status = 'unknown'
                    THEN devices.status ELSE excluded.status END,
                location = COALESCE(excluded.location, devices.location),
                description = COALESCE(excluded.description, devices.description),
                snmp_community = COALESCE(excluded.snmp_community, devices.snmp_community),
                snmp_version = COALESCE(excluded.snmp_version, devices.snmp_version),
                discovery_method = COALESCE(excluded.discovery_method, devices.discovery_method),
                last_seen = MAX(devices.last_seen, excluded.last_seen),
                updated_at = excluded.updated_at
            RETURNING {DEVICE_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(&device.device_id)
            .bind(&device.ip_address)
            .bind(&device.mac_address)
            .bind(&device.hostname)
            .bind(&device.device_type)
            .bind(&device.vendor)
            .bind(&device.model)
            .bind(&device.firmware_version)
            .bind(device.status.to_string())
            .bind(&device.location)
            .bind(&device.description)
            .bind(&device.snmp_community)
            .bind(&device.snmp_version)
            .bind(&device.discovery_method)
            .bind(seen)
            .bind(seen)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        device_from_row(&row)
    }

    async fn get_device(&self, id: i64) -> StorageResult<Option<DeviceRecord>> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn get_device_by_device_id(&self, device_id: &str) -> StorageResult<Option<DeviceRecord>> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE device_id = ?");
        let row = sqlx::query(&sql)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list_devices(&self, filter: &DeviceFilter) -> StorageResult<Vec<DeviceRecord>> {
        let mut query =
            QueryBuilder::<Sqlite>::new(format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE 1 = 1"));

        if let Some(device_type) = &filter.device_type {
            query.push(" AND device_type = ").push_bind(device_type.clone());
        }
        if let Some(vendor) = &filter.vendor {
            query
                .push(" AND vendor = ")
                .push_bind(vendor.clone())
                .push(" COLLATE NOCASE");
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.to_string());
        }

        query
            .push(" ORDER BY last_seen DESC, id ASC LIMIT ")
            .push_bind(i64::from(filter.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(filter.offset));

        let rows = query.build().fetch_all(&self.pool).await?;
        collect_rows(rows, device_from_row)
    }

    async fn recent_devices(&self, since: DateTime<Utc>) -> StorageResult<Vec<DeviceRecord>> {
        let sql = format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE last_seen >= ? ORDER BY last_seen DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(to_millis(&since))
            .fetch_all(&self.pool)
            .await?;
        collect_rows(rows, device_from_row)
    }

    #[instrument(skip(self))]
    async fn set_device_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let at = to_millis(&at);
        let result = sqlx::query(
            r#"
            UPDATE devices SET
                status = ?,
                last_seen = CASE WHEN ? = 'online' THEN MAX(last_seen, ?) ELSE last_seen END,
                updated_at = ?
            WHERE device_id = ?
            "#,
        )
        .bind(status.to_string())
        .bind(status.to_string())
        .bind(at)
        .bind(at)
        .bind(device_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("device `{device_id}`")));
        }
        Ok(())
    }

    async fn upsert_interface(&self, device_pk: i64, interface: &InterfaceUpsert) -> StorageResult<i64> {
        let mut tx = self.pool.begin().await?;
        let id = Self::upsert_interface_in(&mut tx, device_pk, interface, to_millis(&Utc::now())).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn device_interfaces(&self, device_pk: i64) -> StorageResult<Vec<InterfaceRecord>> {
        let sql = format!("{INTERFACE_SELECT} WHERE i.device_id = ? ORDER BY i.interface_name");
        let rows = sqlx::query(&sql)
            .bind(device_pk)
            .fetch_all(&self.pool)
            .await?;
        collect_rows(rows, interface_from_row)
    }

    async fn list_interfaces(&self, limit: u32) -> StorageResult<Vec<InterfaceRecord>> {
        let sql = format!("{INTERFACE_SELECT} ORDER BY i.device_id, i.interface_name LIMIT ?");
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        collect_rows(rows, interface_from_row)
    }

    #[instrument(skip(self, connection), fields(
        source = connection.source_device_id,
        target = connection.target_device_id
    ))]
    async fn upsert_connection(&self, connection: &ConnectionUpsert) -> StorageResult<ConnectionRecord> {
        let now = to_millis(&Utc::now());
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO connections (
                source_device_id, source_interface_id, target_device_id, target_interface_id,
                connection_type, bandwidth, status, discovery_method, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (
                source_device_id,
                target_device_id,
                IFNULL(source_interface_id, 0),
                IFNULL(target_interface_id, 0)
            ) DO UPDATE SET
                connection_type = excluded.connection_type,
                bandwidth = COALESCE(excluded.bandwidth, connections.bandwidth),
                status = excluded.status,
                discovery_method = COALESCE(excluded.discovery_method, connections.discovery_method),
                updated_at = MAX(excluded.updated_at, connections.updated_at + 1)
            RETURNING id
            "#,
        )
        .bind(connection.source_device_id)
        .bind(connection.source_interface_id)
        .bind(connection.target_device_id)
        .bind(connection.target_interface_id)
        .bind(&connection.connection_type)
        .bind(connection.bandwidth)
        .bind(&connection.status)
        .bind(&connection.discovery_method)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let sql = format!("{CONNECTION_SELECT} WHERE c.id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_one(&mut *tx).await?;
        let record = connection_from_row(&row)?;

        tx.commit().await?;
        debug!("connection {} upserted", record.id);
        Ok(record)
    }

    async fn device_connections(&self, device_pk: i64) -> StorageResult<Vec<ConnectionRecord>> {
        let sql = format!(
            "{CONNECTION_SELECT} WHERE c.source_device_id = ? OR c.target_device_id = ? ORDER BY c.created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(device_pk)
            .bind(device_pk)
            .fetch_all(&self.pool)
            .await?;
        collect_rows(rows, connection_from_row)
    }

    async fn list_connections(&self, limit: u32) -> StorageResult<Vec<ConnectionRecord>> {
        let sql = format!("{CONNECTION_SELECT} ORDER BY c.created_at DESC, c.id DESC LIMIT ?");
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        collect_rows(rows, connection_from_row)
    }

    #[instrument(skip(self))]
    async fn topology_snapshot(&self) -> StorageResult<TopologySnapshot> {
        let mut tx = self.pool.begin().await?;

        let devices_sql = format!("SELECT {DEVICE_COLUMNS} FROM devices ORDER BY hostname, id");
        let devices = sqlx::query(&devices_sql).fetch_all(&mut *tx).await?;

        let interfaces_sql = format!("{INTERFACE_SELECT} ORDER BY i.device_id, i.interface_name");
        let interfaces = sqlx::query(&interfaces_sql).fetch_all(&mut *tx).await?;

        let connections_sql = format!("{CONNECTION_SELECT} ORDER BY c.created_at DESC, c.id DESC");
        let connections = sqlx::query(&connections_sql).fetch_all(&mut *tx).await?;

        tx.commit().await?;

        let snapshot = TopologySnapshot {
            devices: collect_rows(devices, device_from_row)?,
            interfaces: collect_rows(interfaces, interface_from_row)?,
            connections: collect_rows(connections, connection_from_row)?,
        };
        debug!(
            devices = snapshot.devices.len(),
            interfaces = snapshot.interfaces.len(),
            connections = snapshot.connections.len(),
            "topology snapshot"
        );
        Ok(snapshot)
    }

    async fn statistics(&self) -> StorageResult<NetworkStatistics> {
        let now = Utc::now();
        let day_ago = to_millis(&(now - chrono::Duration::hours(24)));
        let mut tx = self.pool.begin().await?;

        let d = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_devices,
                COUNT(CASE WHEN status = 'online' THEN 1 END) AS online_devices,
                COUNT(CASE WHEN status = 'offline' THEN 1 END) AS offline_devices,
                COUNT(CASE WHEN device_type = 'router' THEN 1 END) AS routers,
                COUNT(CASE WHEN device_type = 'switch' THEN 1 END) AS switches,
                COUNT(CASE WHEN device_type = 'server' THEN 1 END) AS servers,
                COUNT(CASE WHEN vendor = 'MikroTik' COLLATE NOCASE THEN 1 END) AS mikrotik_devices,
                COUNT(CASE WHEN vendor = 'Cisco' COLLATE NOCASE THEN 1 END) AS cisco_devices,
                COUNT(CASE WHEN last_seen >= ? THEN 1 END) AS devices_last_24h
            FROM devices
            "#,
        )
        .bind(day_ago)
        .fetch_one(&mut *tx)
        .await?;

        let i = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_interfaces,
                COUNT(CASE WHEN status = 'up' THEN 1 END) AS active_interfaces,
                COUNT(CASE WHEN status = 'down' THEN 1 END) AS inactive_interfaces
            FROM interfaces
            "#,
        )
        .fetch_one(&mut *tx)
        .await?;

        let c = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_connections,
                COUNT(CASE WHEN status = 'active' THEN 1 END) AS active_connections
            FROM connections
            "#,
        )
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(NetworkStatistics {
            devices: DeviceCounts {
                total_devices: d.try_get("total_devices")?,
                online_devices: d.try_get("online_devices")?,
                offline_devices: d.try_get("offline_devices")?,
                routers: d.try_get("routers")?,
                switches: d.try_get("switches")?,
                servers: d.try_get("servers")?,
                mikrotik_devices: d.try_get("mikrotik_devices")?,
                cisco_devices: d.try_get("cisco_devices")?,
            },
            interfaces: InterfaceCounts {
                total_interfaces: i.try_get("total_interfaces")?,
                active_interfaces: i.try_get("active_interfaces")?,
                inactive_interfaces: i.try_get("inactive_interfaces")?,
            },
            connections: ConnectionCounts {
                total_connections: c.try_get("total_connections")?,
                active_connections: c.try_get("active_connections")?,
            },
            recent_activity: RecentActivity {
                devices_last_24h: d.try_get("devices_last_24h")?,
            },
            last_updated: now,
        })
    }

    #[instrument(skip(self))]
    async fn create_scan_session(
        &self,
        scan_type: &str,
        network_range: &str,
        session_name: Option<&str>,
    ) -> StorageResult<ScanSession> {
        let sql = format!(
            "INSERT INTO scan_sessions (session_name, scan_type, network_range, status, started_at) \
             VALUES (?, ?, ?, 'running', ?) RETURNING {SCAN_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(session_name)
            .bind(scan_type)
            .bind(network_range)
            .bind(to_millis(&Utc::now()))
            .fetch_one(&self.pool)
            .await?;
        scan_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn complete_scan_session(&self, id: i64, outcome: &ScanOutcome) -> StorageResult<ScanSession> {
        let (status, devices, connections, error) = match outcome {
            ScanOutcome::Completed {
                devices_discovered,
                connections_discovered,
            } => (
                ScanStatus::Completed,
                *devices_discovered,
                *connections_discovered,
                None,
            ),
            ScanOutcome::Failed { error } => (ScanStatus::Failed, 0, 0, Some(error.as_str())),
        };

        let sql = format!(
            "UPDATE scan_sessions SET status = ?, devices_discovered = ?, connections_discovered = ?, \
             error_message = ?, completed_at = ? WHERE id = ? AND status = 'running' \
             RETURNING {SCAN_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(status.to_string())
            .bind(devices)
            .bind(connections)
            .bind(error)
            .bind(to_millis(&Utc::now()))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => scan_from_row(&row),
            None => match self.get_scan_session(id).await? {
                Some(existing) => Err(StorageError::IntegrityViolation(format!(
                    "scan session {id} is already {}",
                    existing.status
                ))),
                None => Err(StorageError::NotFound(format!("scan session {id}"))),
            },
        }
    }

    async fn get_scan_session(&self, id: i64) -> StorageResult<Option<ScanSession>> {
        let sql = format!("SELECT {SCAN_COLUMNS} FROM scan_sessions WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(scan_from_row).transpose()
    }

    async fn list_scan_sessions(&self, limit: u32) -> StorageResult<Vec<ScanSession>> {
        let sql = format!(
            "SELECT {SCAN_COLUMNS} FROM scan_sessions ORDER BY started_at DESC, id DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        collect_rows(rows, scan_from_row)
    }

    async fn record_monitoring_sample(&self, device_pk: i64, sample: &MonitoringSample) -> StorageResult<i64> {
        let mut tx = self.pool.begin().await?;
        let id = Self::insert_sample_in(&mut tx, device_pk, sample).await?;
        tx.commit().await?;
        Ok(id)
    }

    #[instrument(skip(self, points, summary), fields(points = points.len()))]
    async fn record_collection(
        &self,
        device_id: &str,
        points: &[GraphDataPoint],
        summary: &MonitoringSample,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        let device_pk = Self::device_pk(&mut tx, device_id).await?;

        for point in points {
            sqlx::query(
                "INSERT INTO routeros_graphing_data \
                 (device_id, timestamp, metric_type, metric_name, value, unit, interface_name) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(device_id)
            .bind(to_millis(&point.timestamp))
            .bind(&point.metric_type)
            .bind(&point.metric_name)
            .bind(point.value)
            .bind(&point.unit)
            .bind(&point.interface_name)
            .execute(&mut *tx)
            .await?;
        }

        Self::insert_sample_in(&mut tx, device_pk, summary).await?;

        let at = to_millis(&summary.monitored_at);
        sqlx::query(
            "UPDATE devices SET status = 'online', last_seen = MAX(last_seen, ?), updated_at = ? WHERE id = ?",
        )
        .bind(at)
        .bind(at)
        .bind(device_pk)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("collection persisted");
        Ok(())
    }

    async fn device_monitoring(&self, device_pk: i64, since: DateTime<Utc>) -> StorageResult<Vec<MonitoringRecord>> {
        let sql = format!(
            "SELECT {MONITORING_COLUMNS} FROM device_monitoring m \
             WHERE m.device_id = ? AND m.monitored_at >= ? ORDER BY m.monitored_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(device_pk)
            .bind(to_millis(&since))
            .fetch_all(&self.pool)
            .await?;
        collect_rows(rows, |row| monitoring_from_row(row, false))
    }

    async fn latest_monitoring(&self, limit: u32) -> StorageResult<Vec<MonitoringRecord>> {
        let sql = format!(
            r#"
            SELECT {MONITORING_COLUMNS}, d.hostname, d.ip_address, d.device_type
            FROM device_monitoring m
            JOIN devices d ON m.device_id = d.id
            WHERE m.id = (
                SELECT m2.id FROM device_monitoring m2
                WHERE m2.device_id = m.device_id
                ORDER BY m2.monitored_at DESC, m2.id DESC
                LIMIT 1
            )
            ORDER BY m.monitored_at DESC
            LIMIT ?
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        collect_rows(rows, |row| monitoring_from_row(row, true))
    }

    async fn graphing_data(
        &self,
        device_id: &str,
        metric_type: Option<&str>,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<GraphDataPoint>> {
        let sql = format!(
            "SELECT {GRAPHING_COLUMNS} FROM routeros_graphing_data \
             WHERE device_id = ? AND timestamp >= ? AND (? IS NULL OR metric_type = ?) \
             ORDER BY timestamp ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(device_id)
            .bind(to_millis(&since))
            .bind(metric_type)
            .bind(metric_type)
            .fetch_all(&self.pool)
            .await?;
        collect_rows(rows, graphing_from_row)
    }

    async fn latest_graphing_data(&self, device_id: &str) -> StorageResult<Vec<GraphDataPoint>> {
        let sql = format!(
            r#"
            SELECT {GRAPHING_COLUMNS} FROM routeros_graphing_data g
            WHERE g.device_id = ? AND g.timestamp = (
                SELECT MAX(g2.timestamp) FROM routeros_graphing_data g2
                WHERE g2.device_id = g.device_id
                  AND g2.metric_name = g.metric_name
                  AND IFNULL(g2.interface_name, '') = IFNULL(g.interface_name, '')
            )
            ORDER BY g.metric_type, g.metric_name, g.interface_name
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(device_id)
            .fetch_all(&self.pool)
            .await?;
        collect_rows(rows, graphing_from_row)
    }

    async fn save_config_snapshot(
        &self,
        device_id: &str,
        data_type: &str,
        data: &serde_json::Value,
    ) -> StorageResult<i64> {
        let mut tx = self.pool.begin().await?;
        let id = Self::insert_snapshot_in(&mut tx, device_id, data_type, data, to_millis(&Utc::now())).await?;
        tx.commit().await?;
        Ok(id)
    }

    #[instrument(skip(self, collection), fields(
        snapshots = collection.snapshots.len(),
        interfaces = collection.interfaces.len()
    ))]
    async fn record_config_collection(&self, device_id: &str, collection: &ConfigCollection) -> StorageResult<()> {
        let now = to_millis(&Utc::now());
        let mut tx = self.pool.begin().await?;
        let device_pk = Self::device_pk(&mut tx, device_id).await?;

        for (data_type, data) in &collection.snapshots {
            Self::insert_snapshot_in(&mut tx, device_id, data_type, data, now).await?;
        }
        for interface in &collection.interfaces {
            Self::upsert_interface_in(&mut tx, device_pk, interface, now).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn config_snapshots(
        &self,
        device_id: &str,
        data_type: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<ConfigSnapshot>> {
        let rows = sqlx::query(
            "SELECT id, device_id, data_type, data_json, timestamp FROM routeros_config_data \
             WHERE device_id = ? AND data_type = ? AND timestamp >= ? \
             ORDER BY timestamp DESC, id DESC",
        )
        .bind(device_id)
        .bind(data_type)
        .bind(to_millis(&since))
        .fetch_all(&self.pool)
        .await?;

        collect_rows(rows, config_from_row)
    }

    async fn latest_config_snapshot(
        &self,
        device_id: &str,
        data_type: &str,
    ) -> StorageResult<Option<ConfigSnapshot>> {
        let row = sqlx::query(
            "SELECT id, device_id, data_type, data_json, timestamp FROM routeros_config_data \
             WHERE device_id = ? AND data_type = ? \
             ORDER BY timestamp DESC, id DESC LIMIT 1",
        )
        .bind(device_id)
        .bind(data_type)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(config_from_row).transpose()
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_old_monitoring(&self, before: DateTime<Utc>) -> StorageResult<RetentionReport> {
        let before_millis = to_millis(&before);
        let mut tx = self.pool.begin().await?;

        let monitoring = sqlx::query("DELETE FROM device_monitoring WHERE monitored_at < ?")
            .bind(before_millis)
            .execute(&mut *tx)
            .await?;
        let graphing = sqlx::query("DELETE FROM routeros_graphing_data WHERE timestamp < ?")
            .bind(before_millis)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let report = RetentionReport {
            monitoring_rows: monitoring.rows_affected(),
            graphing_rows: graphing.rows_affected(),
        };
        info!(
            "retention removed {} monitoring and {} graphing rows",
            report.monitoring_rows, report.graphing_rows
        );
        Ok(report)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
