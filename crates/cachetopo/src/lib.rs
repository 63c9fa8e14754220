//! cachetopo: CPU cache topology discovery.
//! Shells out to `lscpu` (Linux) or `sysctl` (macOS), normalizes L1/L2 to a
//! per-core share, and can emit a `#pragma once` header with the results.

pub mod config;
pub mod detect;
pub mod errors;
pub mod header;
pub mod types;

pub use config::ResolverConfig;
pub use detect::{
    processor_name, resolve, resolve_all, select_backend, Backend, CommandRunner, DarwinBackend,
    LinuxBackend, Resolver, SystemRunner, UnsupportedBackend,
};
pub use errors::{Result, TopologyError};
pub use header::{render_header, write_header};
pub use types::{CacheLevel, CacheRecord, CacheReport, CacheSize, CacheSizes, Platform};
