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


//! Resource-lifetime machinery shared by the backends.
//!
//! - [`descriptor_allocator`]: block-grown pools of CPU descriptor handles.
//! - [`resource_state`]: per-resource GPU usage state and barrier batching.
//! - [`deferred_destruction`]: frame-stamped release queue.
//! - [`view_cache`]: lazily created texture views keyed by `(mip, slice)`.

pub mod deferred_destruction;
pub mod descriptor_allocator;
pub mod resource_state;
pub mod view_cache;

pub use self::deferred_destruction::DeferredDestructionQueue;
pub use self::descriptor_allocator::{
    DescriptorAllocator, DescriptorBlock, DescriptorBlockSource, DescriptorHandle, DescriptorKind,
};
pub use self::resource_state::{
    BarrierSink, QueueKind, ResourceBarrier, ResourceState, ResourceStateCell,
    ResourceStateTracker, SplitFlag,
};
pub use self::view_cache::{CachedView, ViewCache};
