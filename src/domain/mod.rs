//! Core domain types and logic.

pub mod bar;
pub mod instrument;
pub mod session;
pub mod scanner;
pub mod merger;
pub mod request;
pub mod report;
pub mod settings;
pub mod pipeline;
pub mod config_validation;
pub mod error;
