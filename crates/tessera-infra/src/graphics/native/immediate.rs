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


//! The stateful, immediate-context driver interface.

use super::{
    DriverResult, IndexBufferBinding, MapMode, MappedSubresource, ObjectLifetime, RawObject,
    ResourceDesc, SwapChainDesc, VertexBufferBinding, ViewDesc,
};
use std::sync::Arc;
use tessera_core::renderer::{
    BlendState, Color, DepthStencilState, FeatureLevel, PrimitiveTopology, RasterizerState,
    SamplerDescriptor, ScissorRect, ShaderStage, TextureFormat, VertexAttribute, Viewport,
};

/// A device plus its immediate context.
///
/// Every `create_*` call returns an object holding one reference, which the
/// caller owns. Context calls execute in call order; the driver resolves
/// hazards between them. Identical state objects may be returned as the same
/// object with an extra reference.
pub trait ImmediateDriver: Send + Sync {
    /// The reference-counting interface of this driver's objects.
    fn lifetime(&self) -> Arc<dyn ObjectLifetime>;

    /// The feature level the device was created with.
    fn feature_level(&self) -> FeatureLevel;

    // --- Object creation ---

    /// Creates a buffer, optionally initialized with `initial_data`.
    fn create_buffer(&self, desc: &ResourceDesc, initial_data: Option<&[u8]>)
        -> DriverResult<RawObject>;

    /// Creates a texture, optionally initializing its first subresource.
    fn create_texture(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&[u8]>,
    ) -> DriverResult<RawObject>;

    /// Creates a view of `resource`. The view holds a reference to the resource.
    fn create_view(&self, resource: RawObject, desc: &ViewDesc) -> DriverResult<RawObject>;

    /// Creates a sampler state.
    fn create_sampler(&self, desc: &SamplerDescriptor) -> DriverResult<RawObject>;

    /// Creates a shader from bytecode.
    fn create_shader(&self, stage: ShaderStage, bytecode: &[u8]) -> DriverResult<RawObject>;

    /// Creates an input layout validated against the vertex shader's bytecode.
    fn create_input_layout(
        &self,
        attributes: &[VertexAttribute],
        vertex_shader: &[u8],
    ) -> DriverResult<RawObject>;

    /// Creates a rasterizer state object.
    fn create_rasterizer_state(&self, desc: &RasterizerState) -> DriverResult<RawObject>;

    /// Creates a blend state object.
    fn create_blend_state(&self, desc: &BlendState) -> DriverResult<RawObject>;

    /// Creates a depth-stencil state object.
    fn create_depth_stencil_state(&self, desc: &DepthStencilState) -> DriverResult<RawObject>;

    /// Creates an event query, signaled once the GPU reaches its `end_query`.
    fn create_event_query(&self) -> DriverResult<RawObject>;

    // --- Swapchains ---

    /// Creates a swapchain.
    fn create_swapchain(&self, desc: &SwapChainDesc) -> DriverResult<RawObject>;

    /// Returns a new reference to back buffer `index`.
    fn swapchain_buffer(&self, swapchain: RawObject, index: u32) -> DriverResult<RawObject>;

    /// The back buffer the next frame renders into.
    fn current_back_buffer_index(&self, swapchain: RawObject) -> DriverResult<u32>;

    /// Resizes every back buffer. Fails while any back buffer is referenced
    /// outside the swapchain.
    fn resize_swapchain(&self, swapchain: RawObject, width: u32, height: u32) -> DriverResult<()>;

    /// Presents the current back buffer and advances to the next one.
    fn present(&self, swapchain: RawObject, sync_interval: u32) -> DriverResult<()>;

    // --- Output merger and rasterizer ---

    /// Binds color and depth targets.
    fn om_set_render_targets(&self, render_targets: &[RawObject], depth_stencil: Option<RawObject>);

    /// Fills a render target view with `color`.
    fn clear_render_target_view(&self, view: RawObject, color: Color) -> DriverResult<()>;

    /// Clears the depth aspect, the stencil aspect, or both.
    fn clear_depth_stencil_view(
        &self,
        view: RawObject,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) -> DriverResult<()>;

    /// Hints that the contents of a view are no longer needed.
    fn discard_view(&self, view: RawObject);

    /// Sets the viewports.
    fn rs_set_viewports(&self, viewports: &[Viewport]);

    /// Sets the scissor rectangles.
    fn rs_set_scissor_rects(&self, rects: &[ScissorRect]);

    /// Binds a rasterizer state.
    fn rs_set_state(&self, state: Option<RawObject>);

    /// Binds a blend state and blend factor.
    fn om_set_blend_state(&self, state: Option<RawObject>, blend_factor: Color);

    /// Binds a depth-stencil state and stencil reference.
    fn om_set_depth_stencil_state(&self, state: Option<RawObject>, stencil_ref: u32);

    // --- Input assembler and shaders ---

    /// Binds the input layout.
    fn ia_set_input_layout(&self, layout: Option<RawObject>);

    /// Sets the primitive topology.
    fn ia_set_primitive_topology(&self, topology: PrimitiveTopology);

    /// Binds consecutive vertex buffer slots starting at `start_slot`.
    fn ia_set_vertex_buffers(&self, start_slot: u32, buffers: &[VertexBufferBinding]);

    /// Binds the index buffer.
    fn ia_set_index_buffer(&self, binding: Option<IndexBufferBinding>);

    /// Binds a shader to its stage.
    fn set_shader(&self, stage: ShaderStage, shader: Option<RawObject>);

    /// Binds consecutive constant buffer slots of a stage.
    fn set_constant_buffers(&self, stage: ShaderStage, start_slot: u32, buffers: &[Option<RawObject>]);

    /// Binds consecutive sampler slots of a stage.
    fn set_samplers(&self, stage: ShaderStage, start_slot: u32, samplers: &[Option<RawObject>]);

    /// Binds consecutive shader resource slots of a stage.
    fn set_shader_resources(&self, stage: ShaderStage, start_slot: u32, views: &[Option<RawObject>]);

    /// Binds consecutive unordered access slots of the compute stage.
    fn cs_set_unordered_access_views(&self, start_slot: u32, views: &[Option<RawObject>]);

    // --- Work ---

    /// Non-indexed, non-instanced draw.
    fn draw(&self, vertex_count: u32, start_vertex: u32) -> DriverResult<()>;

    /// Non-indexed instanced draw.
    fn draw_instanced(
        &self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) -> DriverResult<()>;

    /// Indexed, non-instanced draw.
    fn draw_indexed(&self, index_count: u32, start_index: u32, base_vertex: i32) -> DriverResult<()>;

    /// Indexed instanced draw.
    fn draw_indexed_instanced(
        &self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) -> DriverResult<()>;

    /// Dispatches compute thread groups.
    fn dispatch(&self, x: u32, y: u32, z: u32) -> DriverResult<()>;

    // --- Memory ---

    /// Maps a subresource of a CPU-visible resource.
    fn map(&self, resource: RawObject, subresource: u32, mode: MapMode)
        -> DriverResult<MappedSubresource>;

    /// Writes through an active mapping.
    fn write_mapped(
        &self,
        resource: RawObject,
        subresource: u32,
        offset: usize,
        data: &[u8],
    ) -> DriverResult<()>;

    /// Reads through an active mapping.
    fn read_mapped(
        &self,
        resource: RawObject,
        subresource: u32,
        offset: usize,
        out: &mut [u8],
    ) -> DriverResult<()>;

    /// Ends a mapping.
    fn unmap(&self, resource: RawObject, subresource: u32);

    /// Replaces a whole subresource of a default-usage resource.
    fn update_subresource(&self, resource: RawObject, subresource: u32, data: &[u8])
        -> DriverResult<()>;

    /// Copies every subresource of `source` into `destination`.
    fn copy_resource(&self, destination: RawObject, source: RawObject) -> DriverResult<()>;

    /// Copies one subresource.
    fn copy_subresource_region(
        &self,
        destination: RawObject,
        destination_subresource: u32,
        source: RawObject,
        source_subresource: u32,
    ) -> DriverResult<()>;

    /// Resolves a multisampled subresource into a single-sampled one.
    fn resolve_subresource(
        &self,
        destination: RawObject,
        destination_subresource: u32,
        source: RawObject,
        source_subresource: u32,
        format: TextureFormat,
    ) -> DriverResult<()>;

    // --- Synchronization ---

    /// Signals `query` once every previous command has completed.
    fn end_query(&self, query: RawObject);

    /// Returns `true` once `query` is signaled.
    fn query_data(&self, query: RawObject) -> DriverResult<bool>;

    /// Submits buffered commands to the GPU.
    fn flush(&self);

    /// Resets every context binding to its default.
    fn clear_state(&self);
}
