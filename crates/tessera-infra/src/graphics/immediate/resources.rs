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


//! Resource table entries of the immediate backend.

use crate::graphics::native::{NativeHandle, RawObject, ResourceDesc, SwapChainDesc};
use tessera_core::renderer::lifetime::{CachedView, ViewCache};
use tessera_core::renderer::{PrimitiveTopology, SwapChainId, TextureId, ViewHandle};

/// A native view object kept alive by a view cache.
#[derive(Debug)]
pub(crate) struct CachedNativeView {
    pub(crate) handle: NativeHandle,
}

impl CachedView for CachedNativeView {
    fn handle(&self) -> ViewHandle {
        ViewHandle(self.handle.raw().0)
    }
}

/// Recovers the native view a [`ViewHandle`] was minted from.
pub(crate) fn view_object(handle: ViewHandle) -> RawObject {
    RawObject(handle.0)
}

#[derive(Debug)]
pub(crate) struct ImmediateBufferEntry {
    // Views go first so they are released before the buffer they reference.
    pub(crate) views: ViewCache<CachedNativeView>,
    pub(crate) handle: NativeHandle,
    pub(crate) desc: ResourceDesc,
    pub(crate) label: Option<String>,
}

#[derive(Debug)]
pub(crate) struct ImmediateTextureEntry {
    pub(crate) views: ViewCache<CachedNativeView>,
    pub(crate) handle: NativeHandle,
    pub(crate) desc: ResourceDesc,
    pub(crate) label: Option<String>,
    /// Set for swapchain back buffers, which only their swapchain may destroy.
    pub(crate) swapchain: Option<SwapChainId>,
}

impl ImmediateTextureEntry {
    /// Moves every native object of this texture, views first, into `out`.
    pub(crate) fn release_into(self, out: &mut Vec<NativeHandle>) {
        out.extend(self.views.drain().into_iter().map(|view| view.handle));
        out.push(self.handle);
    }
}

#[derive(Debug)]
pub(crate) struct ImmediateSamplerEntry {
    pub(crate) handle: NativeHandle,
    pub(crate) label: Option<String>,
}

/// Everything a pipeline binds, split into the driver's separate state objects.
#[derive(Debug)]
pub(crate) struct ImmediatePipelineEntry {
    pub(crate) vertex_shader: Option<NativeHandle>,
    pub(crate) fragment_shader: Option<NativeHandle>,
    pub(crate) compute_shader: Option<NativeHandle>,
    pub(crate) input_layout: Option<NativeHandle>,
    pub(crate) rasterizer: Option<NativeHandle>,
    pub(crate) blend: Option<NativeHandle>,
    pub(crate) depth_stencil: Option<NativeHandle>,
    pub(crate) topology: PrimitiveTopology,
    pub(crate) label: Option<String>,
}

impl ImmediatePipelineEntry {
    /// The raw objects the context shadows when this pipeline is bound.
    pub(crate) fn binding(&self) -> PipelineBinding {
        let raw = |handle: &Option<NativeHandle>| handle.as_ref().map(NativeHandle::raw);
        PipelineBinding {
            vertex_shader: raw(&self.vertex_shader),
            fragment_shader: raw(&self.fragment_shader),
            compute_shader: raw(&self.compute_shader),
            input_layout: raw(&self.input_layout),
            rasterizer: raw(&self.rasterizer),
            blend: raw(&self.blend),
            depth_stencil: raw(&self.depth_stencil),
            topology: self.topology,
        }
    }

    pub(crate) fn into_handles(self) -> impl Iterator<Item = NativeHandle> {
        [
            self.vertex_shader,
            self.fragment_shader,
            self.compute_shader,
            self.input_layout,
            self.rasterizer,
            self.blend,
            self.depth_stencil,
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PipelineBinding {
    pub(crate) vertex_shader: Option<RawObject>,
    pub(crate) fragment_shader: Option<RawObject>,
    pub(crate) compute_shader: Option<RawObject>,
    pub(crate) input_layout: Option<RawObject>,
    pub(crate) rasterizer: Option<RawObject>,
    pub(crate) blend: Option<RawObject>,
    pub(crate) depth_stencil: Option<RawObject>,
    pub(crate) topology: PrimitiveTopology,
}

impl PipelineBinding {
    pub(crate) fn is_compute(&self) -> bool {
        self.compute_shader.is_some()
    }
}

#[derive(Debug)]
pub(crate) struct ImmediateSwapChainEntry {
    pub(crate) handle: NativeHandle,
    pub(crate) desc: SwapChainDesc,
    /// One texture id per back buffer, indexed like the driver's buffers.
    pub(crate) back_buffers: Vec<TextureId>,
    pub(crate) label: Option<String>,
}
