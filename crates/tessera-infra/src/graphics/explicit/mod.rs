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


//! The explicit backend.
//!
//! Built on an [`ExplicitDriver`](crate::graphics::native::ExplicitDriver):
//! work is recorded into command lists and executed on a queue, every
//! resource state change is an explicit barrier, views live in CPU descriptor
//! heaps and are copied into per-frame shader-visible rings at draw time, and
//! a fence paces the reuse of per-frame memory.

mod context;
mod device;
mod frame;
mod resources;
mod root;

pub use self::context::ExplicitContext;
pub use self::device::ExplicitDevice;
