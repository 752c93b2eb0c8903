//! Port traits the domain depends on.

pub mod bar_source;
pub mod cache_port;
pub mod config_port;
pub mod export_port;
