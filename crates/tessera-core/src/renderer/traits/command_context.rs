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


use crate::renderer::api::*;
use crate::renderer::context::group_count;
use crate::renderer::error::GraphicsError;

/// Records GPU work for one device.
///
/// A context is either idle or inside a render pass. Binding calls only update
/// shadow state; the backend receives the changed slots at the next draw or
/// dispatch. Bindings survive across draws and passes until [`flush`](Self::flush).
pub trait CommandContext: Send + Sync {
    /// Opens a render pass, applying every attachment's load action.
    ///
    /// The viewport and scissor are reset to the render area, the smallest
    /// attachment extent at the attachment's mip.
    ///
    /// # Errors
    ///
    /// `InvalidState` if a pass is already open, the descriptor has no attachment,
    /// or an attachment lacks the matching usage.
    fn begin_render_pass(&mut self, descriptor: &RenderPassDescriptor) -> Result<(), GraphicsError>;

    /// Closes the open pass, applying store actions and resolves.
    ///
    /// # Errors
    ///
    /// `InvalidState` if no pass is open.
    fn end_render_pass(&mut self) -> Result<(), GraphicsError>;

    /// Returns `true` while a render pass is open.
    fn is_in_render_pass(&self) -> bool;

    /// Overrides the viewport for subsequent draws.
    fn set_viewport(&mut self, viewport: Viewport);

    /// Overrides the scissor rectangle for subsequent draws.
    fn set_scissor_rect(&mut self, rect: ScissorRect);

    /// Binds a render or compute pipeline, or unbinds with `None`.
    fn set_pipeline(&mut self, pipeline: Option<PipelineId>) -> Result<(), GraphicsError>;

    /// Binds a vertex buffer to `slot`.
    fn set_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: Option<BufferId>,
        offset: u64,
        stride: u32,
    ) -> Result<(), GraphicsError>;

    /// Binds the index buffer used by [`draw_indexed`](Self::draw_indexed).
    fn set_index_buffer(
        &mut self,
        buffer: Option<BufferId>,
        format: IndexFormat,
        offset: u64,
    ) -> Result<(), GraphicsError>;

    /// Binds a constant buffer to a stage's slot.
    fn set_constant_buffer(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        buffer: Option<BufferId>,
    ) -> Result<(), GraphicsError>;

    /// Binds a sampler to a stage's slot.
    fn set_sampler(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        sampler: Option<SamplerId>,
    ) -> Result<(), GraphicsError>;

    /// Binds a texture or buffer for shader reads.
    fn set_shader_resource(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        resource: Option<ShaderResourceBinding>,
    ) -> Result<(), GraphicsError>;

    /// Binds a texture mip or buffer for compute-shader writes.
    fn set_unordered_access(
        &mut self,
        slot: u32,
        resource: Option<UnorderedAccessBinding>,
    ) -> Result<(), GraphicsError>;

    /// Sets the stencil reference value.
    fn set_stencil_reference(&mut self, reference: u32);

    /// Sets the constant used by [`BlendFactor::Constant`].
    fn set_blend_factor(&mut self, factor: Color);

    /// Draws non-indexed primitives.
    ///
    /// # Errors
    ///
    /// `InvalidState` without an open pass or a bound render pipeline.
    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<(), GraphicsError>;

    /// Draws indexed primitives.
    ///
    /// # Errors
    ///
    /// `InvalidState` without an open pass, a bound render pipeline or an index buffer.
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<(), GraphicsError>;

    /// Dispatches thread groups.
    ///
    /// # Errors
    ///
    /// `InvalidState` inside a render pass or without a bound compute pipeline.
    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) -> Result<(), GraphicsError>;

    /// Dispatches enough groups of `group_size_x` threads to cover `threads_x`.
    fn dispatch_1d(&mut self, threads_x: u32, group_size_x: u32) -> Result<(), GraphicsError> {
        self.dispatch(group_count(threads_x, group_size_x), 1, 1)
    }

    /// Two-dimensional variant of [`dispatch_1d`](Self::dispatch_1d).
    fn dispatch_2d(
        &mut self,
        threads_x: u32,
        threads_y: u32,
        group_size_x: u32,
        group_size_y: u32,
    ) -> Result<(), GraphicsError> {
        self.dispatch(
            group_count(threads_x, group_size_x),
            group_count(threads_y, group_size_y),
            1,
        )
    }

    /// Three-dimensional variant of [`dispatch_1d`](Self::dispatch_1d).
    fn dispatch_3d(
        &mut self,
        threads: [u32; 3],
        group_size: [u32; 3],
    ) -> Result<(), GraphicsError> {
        self.dispatch(
            group_count(threads[0], group_size[0]),
            group_count(threads[1], group_size[1]),
            group_count(threads[2], group_size[2]),
        )
    }

    /// Replaces the start of a constant buffer with `data`.
    ///
    /// CPU-writable buffers are mapped and written directly; others go through
    /// a backend upload command. A failed map is logged and the update skipped.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the buffer is unknown, not a constant buffer, or smaller than `data`.
    fn update_constant_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), GraphicsError>;

    /// Copies the whole of `source` into `destination`. Sizes must match.
    fn copy_buffer(&mut self, destination: BufferId, source: BufferId) -> Result<(), GraphicsError>;

    /// Copies every subresource of `source` into `destination`. Descriptors must match.
    fn copy_texture(&mut self, destination: TextureId, source: TextureId)
        -> Result<(), GraphicsError>;

    /// Submits recorded work, optionally blocking until it completes, and
    /// discards every binding.
    ///
    /// # Errors
    ///
    /// `InvalidState` inside a render pass.
    fn flush(&mut self, wait: bool) -> Result<(), GraphicsError>;
}
