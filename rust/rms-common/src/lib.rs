//! # Common dependencies
//!
//! This internal crate re-exports the third-party dependencies that are used
//! across the other `rms-*` crates. It exists so that there is only one
//! place where version numbers for commonly used dependencies need updating,
//! and so that internal crates don't each have to repeat long feature lists.

pub use anyhow;
pub use async_trait;
pub use bincode;
pub use blake3;
pub use chrono;
pub use dashmap;
pub use dirs;
pub use eyre;
pub use futures;
pub use itertools;
pub use md5;
pub use once_cell;
pub use parking_lot;
pub use rusqlite;
pub use serde;
pub use serde_json;
pub use tempfile;
pub use thiserror;
pub use tokio;
pub use tracing;
pub use uuid;
