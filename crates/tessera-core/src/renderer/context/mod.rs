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


//! Backend-independent pieces of the command context state machine.
//!
//! Backends compose these into their `CommandContext` implementations:
//! [`binding`] holds the shadow copies used for redundant-state elimination,
//! [`pass`] tracks render-pass nesting and attachment rules, and [`dispatch`]
//! turns thread counts into thread-group counts.

pub mod binding;
pub mod dispatch;
pub mod pass;

pub use self::binding::{
    SlotShadow, StateShadow, MAX_COLOR_ATTACHMENTS, MAX_CONSTANT_BUFFERS, MAX_SAMPLERS,
    MAX_SHADER_RESOURCES, MAX_UNORDERED_ACCESS, MAX_VERTEX_BUFFERS,
};
pub use self::dispatch::group_count;
pub use self::pass::{render_area, AttachmentHazards, DepthStencilOps, PassTracker};
