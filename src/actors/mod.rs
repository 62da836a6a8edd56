//! Actor wrappers around long-running services
//!
//! Each actor runs as an independent tokio task and is driven through a
//! cloneable handle that sends commands over an mpsc channel; replies come
//! back on oneshot channels.
//!
//! - **CollectionActor**: runs collection cycles on an interval

pub mod collector;
pub mod messages;

pub use collector::CollectorHandle;
