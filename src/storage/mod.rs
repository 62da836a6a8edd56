//! Persistence for the network inventory and monitoring history
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` keeps the collection pipeline, scan
//!   coordinator and API independent of the database
//! - **Async**: All operations are async and safe to share behind an `Arc`
//! - **Transactional**: Multi-row writes for one device commit or roll back
//!   together
//!
//! ## Usage
//!
//! ```no_run
//! use routeros_monitoring::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./network_devices.db").await?;
//!     let stats = backend.statistics().await?;
//!     println!("{} devices", stats.devices.total_devices);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod schema;
pub mod sqlite;

pub use backend::{ConfigCollection, HealthStatus, RetentionReport, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use schema::{
    ConfigSnapshot, ConnectionRecord, ConnectionUpsert, DeviceFilter, DeviceRecord, DeviceStatus,
    DeviceUpsert, GraphDataPoint, InterfaceRecord, InterfaceUpsert, MonitoringRecord,
    MonitoringSample, NetworkStatistics, ScanOutcome, ScanSession, ScanStatus, TopologySnapshot,
};
