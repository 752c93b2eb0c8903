//! Domain error types.

/// Top-level error type for rangescan.
#[derive(Debug, thiserror::Error)]
pub enum RangeError {
    #[error("no data available for {symbol}: {reason}")]
    SourceUnavailable { symbol: String, reason: String },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("export error: {reason}")]
    Export { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RangeError {
    pub fn source_unavailable(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Process exit status used by the CLI for this error.
    pub fn exit_status(&self) -> u8 {
        match self {
            RangeError::Io(_) | RangeError::Export { .. } => 1,
            RangeError::ConfigParse { .. }
            | RangeError::ConfigMissing { .. }
            | RangeError::ConfigInvalid { .. } => 2,
            RangeError::InvalidParameter { .. } => 4,
            RangeError::SourceUnavailable { .. } | RangeError::NotFound { .. } => 5,
        }
    }
}

impl From<&RangeError> for std::process::ExitCode {
    fn from(err: &RangeError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
