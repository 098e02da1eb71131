//! mezgeb: an offline-first client for the Mezgeb expense tracker.
//!
//! Reads and writes go through a `SyncClient`. While the server is reachable every answer is
//! mirrored into a local cache. While it is not, reads are served from that cache and creates are
//! recorded as pending entries that are replayed once connectivity returns.

pub mod api;
pub mod args;
pub mod cache;
pub mod commands;
mod config;
pub mod connectivity;
mod db;
mod error;
pub mod model;
pub mod sync;
mod utils;


pub use api::Mode;
pub use cache::MemoryCache;
pub use config::Config;
pub use db::Db;
pub use error::{Error, ErrorType, Result};
pub use sync::SyncClient;
