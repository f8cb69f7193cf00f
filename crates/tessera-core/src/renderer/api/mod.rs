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


//! Backend-agnostic graphics API value types.
//!
//! Organized into several logical sub-modules:
//!
//! - **[`common`]**: Backend identification, adapter info and small shared value types.
//! - **[`format`]**: Texel formats.
//! - **[`buffer`]**, **[`texture`]**, **[`sampler`]**, **[`pipeline`]**, **[`swapchain`]**:
//!   resource descriptors and their opaque ids.
//! - **[`binding`]**: What can be bound to shader slots.
//! - **[`pass`]**: Render-pass attachments and load/store actions.
//! - **[`settings`]**: Device and backend-selection configuration.
//! - **[`stats`]**: Per-device bookkeeping counters.

pub mod binding;
pub mod buffer;
pub mod common;
pub mod format;
pub mod pass;
pub mod pipeline;
pub mod sampler;
pub mod settings;
pub mod stats;
pub mod swapchain;
pub mod texture;

pub use self::binding::*;
pub use self::buffer::*;
pub use self::common::*;
pub use self::format::*;
pub use self::pass::*;
pub use self::pipeline::*;
pub use self::sampler::*;
pub use self::settings::*;
pub use self::stats::*;
pub use self::swapchain::*;
pub use self::texture::*;
