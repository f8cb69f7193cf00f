// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Defines the error type shared by every graphics operation.

use crate::renderer::api::common::GraphicsBackendType;
use std::fmt;

/// An error produced by a graphics factory, device or command context.
///
/// The variants follow how a caller is expected to react:
///
/// - [`BackendUnsupported`](GraphicsError::BackendUnsupported) is recoverable, the
///   caller should try the next backend in its preference list.
/// - [`ResourceCreationFailed`](GraphicsError::ResourceCreationFailed) is fatal to the
///   call that produced it and is never retried automatically.
/// - [`InvalidState`](GraphicsError::InvalidState) is a programming error (API misuse)
///   and is surfaced at the offending call, never silently corrected.
/// - [`DeviceLost`](GraphicsError::DeviceLost) is fatal to the device instance. The
///   device and every resource created from it must be recreated by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// The factory probe for a backend failed (no adapter, feature level too low...).
    BackendUnsupported {
        /// The backend that was probed.
        backend: GraphicsBackendType,
        /// Why the probe failed.
        reason: String,
    },
    /// A backend call creating a resource failed, or the descriptor was rejected.
    ResourceCreationFailed {
        /// What was being created (e.g. `"texture 'GBuffer'"`).
        what: String,
        /// Backend diagnostic text.
        details: String,
    },
    /// The API was used in a way that is not valid in the current state.
    InvalidState(String),
    /// The device was removed or reset; detected on present or submission.
    DeviceLost(String),
}

impl GraphicsError {
    /// Shorthand for building an [`GraphicsError::InvalidState`] error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        GraphicsError::InvalidState(message.into())
    }

    /// Shorthand for building a [`GraphicsError::ResourceCreationFailed`] error.
    pub fn creation_failed(what: impl Into<String>, details: impl fmt::Display) -> Self {
        GraphicsError::ResourceCreationFailed {
            what: what.into(),
            details: details.to_string(),
        }
    }

    /// Returns `true` if the error invalidates the whole device.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GraphicsError::DeviceLost(_))
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsError::BackendUnsupported { backend, reason } => {
                write!(f, "Backend {backend:?} is not supported: {reason}")
            }
            GraphicsError::ResourceCreationFailed { what, details } => {
                write!(f, "Failed to create {what}: {details}")
            }
            GraphicsError::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
            GraphicsError::DeviceLost(msg) => {
                write!(f, "The graphics device was lost and must be recreated: {msg}")
            }
        }
    }
}

impl std::error::Error for GraphicsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_unsupported_display() {
        let err = GraphicsError::BackendUnsupported {
            backend: GraphicsBackendType::Explicit,
            reason: "no adapter reaches feature level 11_0".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Backend Explicit is not supported: no adapter reaches feature level 11_0"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn creation_failed_carries_backend_text() {
        let err = GraphicsError::creation_failed("texture 'Shadow'", "E_OUTOFMEMORY");
        assert_eq!(
            format!("{err}"),
            "Failed to create texture 'Shadow': E_OUTOFMEMORY"
        );
    }

    #[test]
    fn device_lost_is_fatal() {
        let err = GraphicsError::DeviceLost("DXGI_ERROR_DEVICE_REMOVED".into());
        assert!(err.is_fatal());
        assert!(format!("{err}").contains("DXGI_ERROR_DEVICE_REMOVED"));
        assert!(!GraphicsError::invalid_state("nested pass").is_fatal());
    }
}
