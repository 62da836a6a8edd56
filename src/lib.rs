//! RouterOS device automation and network monitoring
//!
//! - [`session`]: interactive console sessions over SSH, modelled as a state machine
//! - [`parser`] and [`device`]: typed extraction from `print detail` output
//! - [`collection`]: bounded, fault-isolated metrics collection (REST with SNMP fallback)
//! - [`storage`]: SQLite persistence for inventory and monitoring history
//! - [`topology`] and [`scan`]: topology reads, discovery scans and real-time fan-out
//! - `api`: REST and WebSocket surface (feature `api`)

pub mod actors;
#[cfg(feature = "api")]
pub mod api;
pub mod collection;
pub mod config;
pub mod device;
pub mod parser;
pub mod scan;
pub mod session;
pub mod storage;
pub mod topology;
pub mod util;
