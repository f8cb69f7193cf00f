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


//! The immediate backend.
//!
//! Built on an [`ImmediateDriver`](crate::graphics::native::ImmediateDriver):
//! the driver tracks hazards and resource residency itself, so this backend
//! only owns resource tables, view caches, redundant-state elimination and
//! the frame queries that pace deferred destruction.

mod context;
mod device;
mod resources;

pub use self::context::ImmediateContext;
pub use self::device::ImmediateDevice;
