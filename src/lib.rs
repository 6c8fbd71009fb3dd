//! deltaview: an incremental view maintenance engine built on Z-set
//! algebra (DBSP-style). A [`zset::ZSet`] is a finite mapping from keys
//! to weights; operators consume and produce deltas, and the
//! [`circuit`] runtime wires them into a dataflow graph driven one step
//! at a time.
//!
//! Module dependency order, leaves first: [`algebra`] -> [`zset`] ->
//! [`indexed`] -> [`operator`] -> [`circuit`] -> [`storage`] /
//! [`checkpoint`].

pub mod algebra;
pub mod checkpoint;
pub mod circuit;
pub mod config;
pub mod error;
pub mod indexed;
pub mod operator;
pub mod storage;
pub mod zset;

pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use indexed::IndexedZSet;
pub use zset::ZSet;
