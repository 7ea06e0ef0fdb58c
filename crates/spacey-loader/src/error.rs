// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the loader pipeline

use thiserror::Error;

/// Result type for loader pipeline operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while resolving, loading or bundling modules
#[derive(Debug, Error)]
pub enum EngineError {
    /// No loader anywhere in the fallback chain handles the import kind
    #[error("Import attribute \"type\" with value \"{0}\" is not supported")]
    UnsupportedKind(String),

    /// A loader reported one or more errors
    #[error("{name} Loader Error: {message}")]
    Loader {
        /// Name of the loader that failed
        name: String,
        /// Newline-joined error messages
        message: String,
    },

    /// A registered loader module could not be activated
    #[error("Failed to activate loader '{module}': {reason}")]
    Activation {
        /// Module path the entry was registered with
        module: String,
        /// Reason for failure
        reason: String,
    },

    /// Invalid arguments passed to the registry
    #[error("Invalid loader registration: {0}")]
    InvalidRegistration(String),

    /// Module not found
    #[error("Cannot find module '{0}'")]
    ModuleNotFound(String),

    /// Malformed or non-file URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// File system error
    #[error("File system error: {0}")]
    Fs(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Cross-process channel error
    #[error("Channel error: {0}")]
    Channel(String),

    /// Bundler failure outside of a single module load
    #[error("Bundle error: {0}")]
    Bundle(String),
}

impl EngineError {
    /// Create a loader error from the messages a loader reported
    pub fn loader(name: impl Into<String>, errors: &[String]) -> Self {
        Self::Loader {
            name: name.into(),
            message: errors.join("\n"),
        }
    }

    /// Create an activation error
    pub fn activation(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Activation {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Create a channel error
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_error_joins_messages() {
        let err = EngineError::loader("json", &["first".to_string(), "second".to_string()]);
        assert_eq!(err.to_string(), "json Loader Error: first\nsecond");
    }

    #[test]
    fn test_unsupported_kind_names_kind() {
        let err = EngineError::UnsupportedKind("custom".to_string());
        assert!(err.to_string().contains("\"custom\""));
    }
}
