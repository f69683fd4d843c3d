// src/error.rs

//! Error types for atom matching and plan construction

use thiserror::Error;

/// Errors produced by the resolver and its store adapters
#[derive(Error, Debug)]
pub enum Error {
    /// A version string does not follow the versioning grammar
    #[error("malformed version '{version}': {reason}")]
    Malformed { version: String, reason: String },

    /// Two versions carrying different tags were compared without opting in
    #[error("cannot compare '{left}' with '{right}': tags differ")]
    TagMismatch { left: String, right: String },

    /// A dependency specifier could not be parsed
    #[error("invalid specifier '{spec}': {reason}")]
    InvalidSpecifier { spec: String, reason: String },

    /// No candidate survived matching for a specifier
    #[error("no package matches '{0}'")]
    Unmatched(String),

    /// One or more mandatory dependencies could not be matched
    #[error("unresolved dependencies: {}", .0.join(", "))]
    UnresolvedDependencies(Vec<String>),

    /// A store was asked for a package id it does not hold
    #[error("package {id} not found in repository '{repository}'")]
    UnknownPackage { id: i64, repository: String },

    /// A match refers to a repository the resolver was not given
    #[error("unknown repository '{0}'")]
    UnknownRepository(String),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error while reading configuration or catalogs
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration or catalog could not be parsed
    #[error("failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn malformed(version: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            version: version.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_spec(spec: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSpecifier {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
