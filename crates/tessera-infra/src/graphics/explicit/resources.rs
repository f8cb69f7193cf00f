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


//! Resource table entries of the explicit backend.

use crate::graphics::native::explicit::GpuAddress;
use crate::graphics::native::{NativeHandle, RawObject, ResourceDesc, SwapChainDesc};
use std::sync::Arc;
use tessera_core::renderer::lifetime::{
    CachedView, DescriptorHandle, DescriptorKind, ResourceState, ResourceStateCell, ViewCache,
};
use tessera_core::renderer::{PrimitiveTopology, SwapChainId, TextureId, ViewHandle};

/// A CPU descriptor owned by a view cache, returned to its allocator when the
/// owning resource is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DescriptorView {
    pub(crate) kind: DescriptorKind,
    pub(crate) descriptor: DescriptorHandle,
}

impl CachedView for DescriptorView {
    fn handle(&self) -> ViewHandle {
        ViewHandle(self.descriptor.0)
    }
}

/// Recovers the descriptor a [`ViewHandle`] was minted from.
pub(crate) fn view_descriptor(handle: ViewHandle) -> DescriptorHandle {
    DescriptorHandle(handle.0)
}

/// What the device hands to the deferred destruction queue.
#[derive(Debug)]
pub(crate) enum PendingRelease {
    Object(NativeHandle),
    Descriptor(DescriptorView),
}

/// A committed resource and its tracked state.
///
/// Only default-heap resources are tracked. Upload and readback resources stay
/// in the state their heap requires for their whole life.
#[derive(Debug)]
pub(crate) struct ExplicitResource {
    pub(crate) handle: NativeHandle,
    pub(crate) desc: ResourceDesc,
    pub(crate) state: Arc<ResourceStateCell>,
    pub(crate) tracked: bool,
}

impl ExplicitResource {
    pub(crate) fn new(handle: NativeHandle, desc: ResourceDesc, initial: ResourceState, tracked: bool) -> Self {
        Self {
            handle,
            desc,
            state: Arc::new(ResourceStateCell::new(initial)),
            tracked,
        }
    }

    pub(crate) fn reference(&self) -> ResourceRef {
        ResourceRef {
            raw: self.handle.raw(),
            state: self.state.clone(),
            tracked: self.tracked,
        }
    }
}

/// A resource as the command context sees it: enough to emit barriers
/// without going back to the device tables.
#[derive(Debug, Clone)]
pub(crate) struct ResourceRef {
    pub(crate) raw: RawObject,
    pub(crate) state: Arc<ResourceStateCell>,
    pub(crate) tracked: bool,
}

impl PartialEq for ResourceRef {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

#[derive(Debug)]
pub(crate) struct ExplicitBufferEntry {
    pub(crate) views: ViewCache<DescriptorView>,
    pub(crate) resource: ExplicitResource,
    pub(crate) address: GpuAddress,
    pub(crate) label: Option<String>,
}

#[derive(Debug)]
pub(crate) struct ExplicitTextureEntry {
    pub(crate) views: ViewCache<DescriptorView>,
    pub(crate) resource: ExplicitResource,
    pub(crate) label: Option<String>,
    pub(crate) swapchain: Option<SwapChainId>,
}

impl ExplicitTextureEntry {
    /// Views first, then the texture itself.
    pub(crate) fn release_into(self, out: &mut Vec<PendingRelease>) {
        out.extend(self.views.drain().into_iter().map(PendingRelease::Descriptor));
        out.push(PendingRelease::Object(self.resource.handle));
    }
}

#[derive(Debug)]
pub(crate) struct ExplicitSamplerEntry {
    pub(crate) descriptor: DescriptorHandle,
    pub(crate) label: Option<String>,
}

#[derive(Debug)]
pub(crate) struct ExplicitPipelineEntry {
    pub(crate) state: NativeHandle,
    pub(crate) compute: bool,
    pub(crate) topology: PrimitiveTopology,
    pub(crate) label: Option<String>,
}

impl ExplicitPipelineEntry {
    pub(crate) fn binding(&self) -> PipelineBinding {
        PipelineBinding {
            state: self.state.raw(),
            compute: self.compute,
            topology: self.topology,
        }
    }
}

/// A pipeline state object as bound on a command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PipelineBinding {
    pub(crate) state: RawObject,
    pub(crate) compute: bool,
    pub(crate) topology: PrimitiveTopology,
}

#[derive(Debug)]
pub(crate) struct ExplicitSwapChainEntry {
    pub(crate) handle: NativeHandle,
    pub(crate) desc: SwapChainDesc,
    pub(crate) back_buffers: Vec<TextureId>,
    pub(crate) label: Option<String>,
}
