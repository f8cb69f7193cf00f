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
use crate::renderer::error::GraphicsError;
use crate::renderer::traits::CommandContext;
use std::fmt::Debug;

/// The main interface for creating and managing GPU resources on one backend.
///
/// A device hands out opaque ids and keeps the backend objects in its own tables.
/// Destroying a resource removes the id immediately, but the backend object is only
/// released once the GPU can no longer be using it (see [`MAX_FRAMES_IN_FLIGHT`]).
/// Dropping the device waits for the GPU to go idle first.
pub trait GraphicsDevice: Send + Sync + Debug {
    /// The backend this device runs on.
    fn backend_type(&self) -> GraphicsBackendType;

    /// Information about the adapter this device was opened on.
    fn adapter_info(&self) -> &GraphicsAdapterInfo;

    /// Creates a new GPU buffer.
    /// ## Arguments
    /// * `descriptor` - The buffer's size, usage and CPU access.
    /// ## Returns
    /// The id of the new buffer.
    /// ## Errors
    /// * `ResourceCreationFailed` - If the descriptor is invalid or the driver call fails.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, GraphicsError>;

    /// Creates a new GPU buffer initialized with `data`.
    /// ## Arguments
    /// * `descriptor` - The buffer's size, usage and CPU access.
    /// * `data` - Initial content; must not be longer than the buffer.
    /// ## Returns
    /// The id of the new buffer. The upload is visible to every command recorded afterwards.
    /// ## Errors
    /// * `ResourceCreationFailed` - If the descriptor or data is invalid or a driver call fails.
    fn create_buffer_with_data(
        &mut self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, GraphicsError>;

    /// Destroys a buffer.
    /// ## Errors
    /// * `InvalidState` - If the id is unknown.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), GraphicsError>;

    /// Creates a new GPU texture.
    /// ## Arguments
    /// * `descriptor` - The texture's dimensions, format, usage and sample count.
    /// ## Returns
    /// The id of the new texture.
    /// ## Errors
    /// * `ResourceCreationFailed` - If the descriptor is invalid or the driver call fails.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, GraphicsError>;

    /// Creates a new GPU texture with every subresource initialized from `data`.
    /// ## Arguments
    /// * `descriptor` - The texture's dimensions, format, usage and sample count.
    /// * `data` - Tightly packed texels, slice by slice, each slice holding its
    ///   mips from largest to smallest.
    /// ## Errors
    /// * `ResourceCreationFailed` - If the descriptor or data size is invalid or a driver call fails.
    fn create_texture_with_data(
        &mut self,
        descriptor: &TextureDescriptor,
        data: &[u8],
    ) -> Result<TextureId, GraphicsError>;

    /// Destroys a texture and every view cached for it.
    /// ## Errors
    /// * `InvalidState` - If the id is unknown or names a swapchain back buffer.
    fn destroy_texture(&self, id: TextureId) -> Result<(), GraphicsError>;

    /// Creates a sampler.
    /// ## Errors
    /// * `ResourceCreationFailed` - If the descriptor is invalid or the driver call fails.
    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, GraphicsError>;

    /// Destroys a sampler.
    fn destroy_sampler(&self, id: SamplerId) -> Result<(), GraphicsError>;

    /// Creates a render or compute pipeline.
    /// ## Errors
    /// * `ResourceCreationFailed` - If the shader bytecode is missing for the pipeline's
    ///   kind or the driver rejects the state.
    fn create_pipeline(&self, descriptor: &PipelineDescriptor) -> Result<PipelineId, GraphicsError>;

    /// Destroys a pipeline.
    fn destroy_pipeline(&self, id: PipelineId) -> Result<(), GraphicsError>;

    /// Creates a swapchain. Its back buffers are exposed as textures.
    /// ## Errors
    /// * `ResourceCreationFailed` - If the descriptor is invalid or the driver call fails.
    fn create_swapchain(
        &self,
        descriptor: &SwapChainDescriptor,
    ) -> Result<SwapChainId, GraphicsError>;

    /// Destroys a swapchain and its back buffers.
    fn destroy_swapchain(&self, id: SwapChainId) -> Result<(), GraphicsError>;

    /// The texture that the next frame renders into for this swapchain.
    fn swapchain_back_buffer(&self, id: SwapChainId) -> Result<TextureId, GraphicsError>;

    /// Resizes a swapchain's back buffers.
    ///
    /// Waits for the GPU to go idle, drops every back-buffer view, resizes, and
    /// re-creates the back-buffer textures (their ids change).
    fn resize_swapchain(
        &mut self,
        id: SwapChainId,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError>;

    /// Renames a resource through the backend's debug-name API.
    fn set_label(&self, resource: ResourceId, label: &str) -> Result<(), GraphicsError>;

    /// The render target view of one mip and slice, created on first use and cached.
    fn render_target_view(
        &self,
        texture: TextureId,
        mip: u32,
        slice: u32,
    ) -> Result<ViewHandle, GraphicsError>;

    /// The depth-stencil view of one mip and slice, created on first use and cached.
    fn depth_stencil_view(
        &self,
        texture: TextureId,
        mip: u32,
        slice: u32,
    ) -> Result<ViewHandle, GraphicsError>;

    /// The shader resource view of one mip, or every mip when `mip` is `None`.
    fn shader_resource_view(
        &self,
        texture: TextureId,
        mip: Option<u32>,
    ) -> Result<ViewHandle, GraphicsError>;

    /// The unordered access view of one mip.
    fn unordered_access_view(&self, texture: TextureId, mip: u32)
        -> Result<ViewHandle, GraphicsError>;

    /// The default command context.
    fn context(&mut self) -> &mut dyn CommandContext;

    /// Marks the start of a frame.
    fn begin_frame(&mut self) -> Result<(), GraphicsError>;

    /// Submits outstanding work, presents every swapchain, advances the frame
    /// counter, waits for the reused frame slot if needed and retires deferred
    /// destructions.
    /// ## Errors
    /// * `InvalidState` - If a render pass is still open.
    /// * `DeviceLost` - If present reports that the device was removed.
    fn end_frame(&mut self) -> Result<(), GraphicsError>;

    /// Blocks until the GPU has finished every submitted command.
    fn wait_for_gpu(&mut self) -> Result<(), GraphicsError>;

    /// Frames completed through [`end_frame`](Self::end_frame).
    fn frame_count(&self) -> u64;

    /// Reads back a whole buffer. Submits and waits for outstanding work.
    fn read_buffer(&mut self, id: BufferId) -> Result<Vec<u8>, GraphicsError>;

    /// Reads back one subresource of a single-sampled texture as tightly packed
    /// rows. Submits and waits for outstanding work.
    fn read_texture(
        &mut self,
        id: TextureId,
        mip: u32,
        slice: u32,
    ) -> Result<Vec<u8>, GraphicsError>;

    /// A snapshot of the device's bookkeeping.
    fn stats(&self) -> DeviceStats;
}
