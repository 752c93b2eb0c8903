//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_export_adapter;
pub mod file_config_adapter;
#[cfg(feature = "bridge")]
pub mod http_bar_source;
pub mod memory_cache;
#[cfg(feature = "web")]
pub mod scheduler;
#[cfg(feature = "web")]
pub mod web;
