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


//! The explicit driver interface: command lists, descriptor heaps, barriers and fences.

use super::{DriverResult, ObjectLifetime, RawObject, ResourceDesc, SwapChainDesc, ViewDesc};
use std::sync::Arc;
use tessera_core::renderer::lifetime::{DescriptorHandle, DescriptorKind, QueueKind, ResourceBarrier, ResourceState};
use tessera_core::renderer::{
    Color, FeatureLevel, IndexFormat, PipelineDescriptor, PrimitiveTopology, SamplerDescriptor,
    ScissorRect, Viewport,
};

/// A GPU virtual address.
pub type GpuAddress = u64;

/// A shader-visible descriptor address.
pub type GpuDescriptorHandle = u64;

/// A freshly created descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapInfo {
    /// The heap object.
    pub heap: RawObject,
    /// CPU address of the first descriptor.
    pub cpu_start: DescriptorHandle,
    /// GPU address of the first descriptor, 0 unless shader-visible.
    pub gpu_start: GpuDescriptorHandle,
}

/// The descriptor type of a root descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorRangeKind {
    /// Shader resource views.
    ShaderResource,
    /// Unordered access views.
    UnorderedAccess,
    /// Samplers.
    Sampler,
}

/// One root signature parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootParameter {
    /// A root constant buffer view bound by GPU address.
    ConstantBuffer {
        /// Shader register.
        register: u32,
    },
    /// A table of consecutive descriptors.
    Table {
        /// Descriptor type in the table.
        kind: DescriptorRangeKind,
        /// Number of descriptors.
        count: u32,
    },
}

/// Creation parameters of a root signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSignatureDesc {
    /// Parameters in root index order.
    pub parameters: Vec<RootParameter>,
    /// Whether the input assembler may read vertex buffers.
    pub allow_input_layout: bool,
}

/// A vertex buffer as seen by an explicit command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexBufferView {
    /// GPU address of the first element (0 unbinds).
    pub location: GpuAddress,
    /// Bytes visible from `location`.
    pub size: u32,
    /// Element stride.
    pub stride: u32,
}

/// An index buffer as seen by an explicit command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBufferView {
    /// GPU address of the first index.
    pub location: GpuAddress,
    /// Bytes visible from `location`.
    pub size: u32,
    /// Index width.
    pub format: IndexFormat,
}

/// An explicit device.
///
/// Rules the driver relies on, checked by the validation layer when enabled:
/// command lists are created open, must be closed before execution, and may
/// only be reset with an allocator whose previous work has completed; views are
/// only written into allocated heap slots; barriers name the state the resource
/// is actually in; mapped resources are unmapped before the GPU uses them.
pub trait ExplicitDriver: Send + Sync {
    /// The reference-counting interface of this driver's objects.
    fn lifetime(&self) -> Arc<dyn ObjectLifetime>;

    /// The feature level the device was created with.
    fn feature_level(&self) -> FeatureLevel;

    /// Distance between consecutive descriptors of `kind`.
    fn descriptor_increment(&self, kind: DescriptorKind) -> u32;

    // --- Queues and fences ---

    /// Creates a command queue.
    fn create_command_queue(&self, kind: QueueKind) -> DriverResult<RawObject>;

    /// Creates a fence starting at `initial_value`.
    fn create_fence(&self, initial_value: u64) -> DriverResult<RawObject>;

    /// Submits closed command lists for execution.
    fn execute_command_lists(&self, queue: RawObject, lists: &[RawObject]) -> DriverResult<()>;

    /// Sets `fence` to `value` once the queue's previous work has completed.
    fn queue_signal(&self, queue: RawObject, fence: RawObject, value: u64) -> DriverResult<()>;

    /// The last value the GPU has signaled on `fence`.
    fn fence_completed_value(&self, fence: RawObject) -> u64;

    /// Blocks until `fence` reaches `value`.
    fn wait_for_fence(&self, fence: RawObject, value: u64) -> DriverResult<()>;

    // --- Command recording objects ---

    /// Creates a command allocator.
    fn create_command_allocator(&self, kind: QueueKind) -> DriverResult<RawObject>;

    /// Recycles an allocator's memory. Every list recorded from it must be closed.
    fn reset_command_allocator(&self, allocator: RawObject) -> DriverResult<()>;

    /// Creates a command list in the open (recording) state.
    fn create_command_list(&self, kind: QueueKind, allocator: RawObject) -> DriverResult<RawObject>;

    /// Ends recording.
    fn close_command_list(&self, list: RawObject) -> DriverResult<()>;

    /// Reopens a closed list, recording into `allocator`.
    fn reset_command_list(&self, list: RawObject, allocator: RawObject) -> DriverResult<()>;

    // --- Descriptors ---

    /// Creates a descriptor heap.
    fn create_descriptor_heap(
        &self,
        kind: DescriptorKind,
        capacity: u32,
        shader_visible: bool,
    ) -> DriverResult<DescriptorHeapInfo>;

    /// Writes a view of `resource` into `destination`; `None` writes a null descriptor.
    fn create_view(
        &self,
        resource: Option<RawObject>,
        desc: &ViewDesc,
        destination: DescriptorHandle,
    ) -> DriverResult<()>;

    /// Writes a constant buffer view; `None` writes a null descriptor.
    fn create_constant_buffer_view(
        &self,
        buffer: Option<(GpuAddress, u32)>,
        destination: DescriptorHandle,
    ) -> DriverResult<()>;

    /// Writes a sampler into `destination`.
    fn create_sampler(&self, desc: &SamplerDescriptor, destination: DescriptorHandle)
        -> DriverResult<()>;

    /// Copies `count` consecutive descriptors.
    fn copy_descriptors_simple(
        &self,
        count: u32,
        destination: DescriptorHandle,
        source: DescriptorHandle,
        kind: DescriptorKind,
    ) -> DriverResult<()>;

    // --- Resources and pipelines ---

    /// Creates a resource with its own heap, in `initial_state`.
    fn create_committed_resource(
        &self,
        desc: &ResourceDesc,
        initial_state: ResourceState,
    ) -> DriverResult<RawObject>;

    /// The GPU address of a buffer.
    fn gpu_virtual_address(&self, resource: RawObject) -> GpuAddress;

    /// Maps a CPU-visible resource.
    fn map(&self, resource: RawObject) -> DriverResult<()>;

    /// Writes through an active mapping.
    fn write_mapped(&self, resource: RawObject, offset: usize, data: &[u8]) -> DriverResult<()>;

    /// Reads through an active mapping.
    fn read_mapped(&self, resource: RawObject, offset: usize, out: &mut [u8]) -> DriverResult<()>;

    /// Ends a mapping.
    fn unmap(&self, resource: RawObject);

    /// Creates a root signature.
    fn create_root_signature(&self, desc: &RootSignatureDesc) -> DriverResult<RawObject>;

    /// Creates a pipeline state object against `root_signature`.
    fn create_pipeline_state(
        &self,
        root_signature: RawObject,
        desc: &PipelineDescriptor,
    ) -> DriverResult<RawObject>;

    // --- Swapchains ---

    /// Creates a swapchain presenting from `queue`. Back buffers start in `PRESENT`.
    fn create_swapchain(&self, queue: RawObject, desc: &SwapChainDesc) -> DriverResult<RawObject>;

    /// Returns a new reference to back buffer `index`.
    fn swapchain_buffer(&self, swapchain: RawObject, index: u32) -> DriverResult<RawObject>;

    /// The back buffer the next frame renders into.
    fn current_back_buffer_index(&self, swapchain: RawObject) -> DriverResult<u32>;

    /// Resizes every back buffer. Fails while any back buffer is referenced
    /// outside the swapchain.
    fn resize_swapchain(&self, swapchain: RawObject, width: u32, height: u32) -> DriverResult<()>;

    /// Presents the current back buffer, which must be in `PRESENT`.
    fn present(&self, swapchain: RawObject, sync_interval: u32) -> DriverResult<()>;

    // --- Recording ---

    /// Records resource barriers.
    fn resource_barrier(&self, list: RawObject, barriers: &[ResourceBarrier]) -> DriverResult<()>;

    /// Records a render target clear.
    fn clear_render_target_view(
        &self,
        list: RawObject,
        view: DescriptorHandle,
        color: Color,
    ) -> DriverResult<()>;

    /// Records a depth and/or stencil clear.
    fn clear_depth_stencil_view(
        &self,
        list: RawObject,
        view: DescriptorHandle,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) -> DriverResult<()>;

    /// Records a discard hint for a whole resource.
    fn discard_resource(&self, list: RawObject, resource: RawObject) -> DriverResult<()>;

    /// Binds color and depth targets.
    fn om_set_render_targets(
        &self,
        list: RawObject,
        render_targets: &[DescriptorHandle],
        depth_stencil: Option<DescriptorHandle>,
    ) -> DriverResult<()>;

    /// Sets the viewports.
    fn rs_set_viewports(&self, list: RawObject, viewports: &[Viewport]) -> DriverResult<()>;

    /// Sets the scissor rectangles.
    fn rs_set_scissor_rects(&self, list: RawObject, rects: &[ScissorRect]) -> DriverResult<()>;

    /// Binds a pipeline state object.
    fn set_pipeline_state(&self, list: RawObject, pipeline: RawObject) -> DriverResult<()>;

    /// Binds the graphics or compute root signature.
    fn set_root_signature(
        &self,
        list: RawObject,
        compute: bool,
        root_signature: RawObject,
    ) -> DriverResult<()>;

    /// Sets the primitive topology.
    fn ia_set_primitive_topology(&self, list: RawObject, topology: PrimitiveTopology)
        -> DriverResult<()>;

    /// Binds consecutive vertex buffer slots.
    fn ia_set_vertex_buffers(
        &self,
        list: RawObject,
        start_slot: u32,
        views: &[VertexBufferView],
    ) -> DriverResult<()>;

    /// Binds the index buffer.
    fn ia_set_index_buffer(&self, list: RawObject, view: Option<IndexBufferView>) -> DriverResult<()>;

    /// Binds the shader-visible heaps descriptor tables point into.
    fn set_descriptor_heaps(&self, list: RawObject, heaps: &[RawObject]) -> DriverResult<()>;

    /// Points a root table parameter at shader-visible descriptors.
    fn set_root_descriptor_table(
        &self,
        list: RawObject,
        compute: bool,
        parameter: u32,
        base: GpuDescriptorHandle,
    ) -> DriverResult<()>;

    /// Points a root constant buffer parameter at a GPU address.
    fn set_root_constant_buffer_view(
        &self,
        list: RawObject,
        compute: bool,
        parameter: u32,
        address: GpuAddress,
    ) -> DriverResult<()>;

    /// Sets the stencil reference.
    fn om_set_stencil_ref(&self, list: RawObject, reference: u32) -> DriverResult<()>;

    /// Sets the blend factor.
    fn om_set_blend_factor(&self, list: RawObject, factor: Color) -> DriverResult<()>;

    /// Records a non-indexed draw.
    fn draw_instanced(
        &self,
        list: RawObject,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) -> DriverResult<()>;

    /// Records an indexed draw.
    fn draw_indexed_instanced(
        &self,
        list: RawObject,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) -> DriverResult<()>;

    /// Records a compute dispatch.
    fn dispatch(&self, list: RawObject, x: u32, y: u32, z: u32) -> DriverResult<()>;

    /// Records a byte copy between buffers.
    fn copy_buffer_region(
        &self,
        list: RawObject,
        destination: RawObject,
        destination_offset: u64,
        source: RawObject,
        source_offset: u64,
        size: u64,
    ) -> DriverResult<()>;

    /// Records a copy of every subresource.
    fn copy_resource(&self, list: RawObject, destination: RawObject, source: RawObject)
        -> DriverResult<()>;

    /// Records a copy of one subresource. Either side may be a buffer, which is
    /// then read or written as a tightly packed footprint starting at offset 0.
    fn copy_texture_region(
        &self,
        list: RawObject,
        destination: RawObject,
        destination_subresource: u32,
        source: RawObject,
        source_subresource: u32,
    ) -> DriverResult<()>;

    /// Records a multisample resolve.
    fn resolve_subresource(
        &self,
        list: RawObject,
        destination: RawObject,
        destination_subresource: u32,
        source: RawObject,
        source_subresource: u32,
    ) -> DriverResult<()>;
}
