//! REST route handlers, grouped by resource

pub mod devices;
pub mod health;
pub mod monitoring;
pub mod network;
pub mod scans;
