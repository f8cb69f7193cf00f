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


//! Provides the public, backend-agnostic graphics contracts for Tessera.
//!
//! This module defines the "common language" for all rendering operations. It contains
//! the abstract `traits` (like [`GraphicsDevice`] and [`CommandContext`]), value
//! descriptors (like [`BufferDescriptor`]), and the error type that form the stable,
//! public-facing API.
//!
//! The 'how' is handled by concrete backends in the `tessera-infra` crate, which
//! implement these traits on top of a native driver interface. The `lifetime` and
//! `context` modules hold the machinery every backend shares: descriptor allocation,
//! resource state tracking, deferred destruction and redundant-state elimination.

pub mod api;
pub mod context;
pub mod error;
pub mod lifetime;
pub mod traits;
pub mod validation;

// Re-export the most important traits and types for easier use.
pub use self::api::*;
pub use self::error::GraphicsError;
pub use self::traits::{CommandContext, GraphicsDevice, GraphicsFactory};
