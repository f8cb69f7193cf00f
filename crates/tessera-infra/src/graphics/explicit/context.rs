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

use super::device::ExplicitShared;
use super::frame::FrameSlot;
use super::resources::{view_descriptor, PendingRelease, PipelineBinding, ResourceRef};
use super::root::{stage_parameters, UNORDERED_ACCESS_PARAMETER};
use crate::graphics::native::explicit::{GpuAddress, IndexBufferView, VertexBufferView};
use crate::graphics::native::{
    BindFlags, ExplicitDriver, MemoryUsage, NativeHandle, RawObject, ResourceDesc,
};
use std::sync::Arc;
use tessera_core::renderer::context::*;
use tessera_core::renderer::lifetime::{
    BarrierSink, DescriptorHandle, DescriptorKind, QueueKind, ResourceBarrier, ResourceState,
    ResourceStateTracker,
};
use tessera_core::renderer::validation;
use tessera_core::renderer::*;

#[derive(Debug, Clone, PartialEq)]
struct VertexBinding {
    resource: ResourceRef,
    view: VertexBufferView,
}

#[derive(Debug, Clone, PartialEq)]
struct IndexBinding {
    resource: ResourceRef,
    view: IndexBufferView,
}

#[derive(Debug, Clone, PartialEq)]
struct ConstantBinding {
    resource: ResourceRef,
    address: GpuAddress,
}

/// A CPU descriptor bound to a table slot, with the resource it views.
#[derive(Debug, Clone, PartialEq)]
struct DescriptorBinding {
    resource: ResourceRef,
    descriptor: DescriptorHandle,
}

/// Records barriers straight into the open command list.
struct ListSink<'a> {
    driver: &'a dyn ExplicitDriver,
    list: RawObject,
}

impl BarrierSink for ListSink<'_> {
    fn submit_barriers(&mut self, barriers: &[ResourceBarrier]) -> Result<(), GraphicsError> {
        Ok(self.driver.resource_barrier(self.list, barriers)?)
    }
}

/// A color attachment resolved for the lifetime of a pass.
#[derive(Debug)]
struct ColorTarget {
    resource: ResourceRef,
    desc: ResourceDesc,
    descriptor: DescriptorHandle,
    back_buffer: bool,
    attachment: RenderPassColorAttachment,
}

#[derive(Debug)]
struct ActivePass {
    colors: Vec<ColorTarget>,
    depth: Option<(ResourceRef, DescriptorHandle, DepthStencilOps)>,
}

/// The command context of an [`ExplicitDevice`](super::ExplicitDevice).
///
/// Commands are recorded into one command list and executed when the frame
/// ends, on [`flush`](CommandContext::flush), or when a readback needs the
/// results. Every resource the recorded work touches is moved into the state
/// that work needs, with barriers batched until the next command that depends
/// on them.
///
/// Shader-stage bindings are pushed at table granularity: when any slot of a
/// stage's shader resource or sampler table changes, the whole table is copied
/// into the frame slot's shader-visible ring, with null descriptors in unset
/// slots.
pub struct ExplicitContext {
    shared: Arc<ExplicitShared>,
    list: NativeHandle,
    recording: bool,
    frames: Vec<FrameSlot>,
    slot: usize,
    fence_value: u64,
    tracker: ResourceStateTracker,
    pass: PassTracker,
    active: Option<ActivePass>,
    hazards: AttachmentHazards,

    pipeline: Option<PipelineBinding>,
    graphics_root: StateShadow<RawObject>,
    compute_root: StateShadow<RawObject>,
    pipeline_state: StateShadow<RawObject>,
    topology: StateShadow<PrimitiveTopology>,
    blend_factor: StateShadow<Color>,
    stencil_reference: StateShadow<u32>,
    viewport: StateShadow<Viewport>,
    scissor: StateShadow<ScissorRect>,

    vertex_buffers: SlotShadow<VertexBinding, MAX_VERTEX_BUFFERS>,
    index_buffer: StateShadow<Option<IndexBinding>>,
    constant_buffers: [SlotShadow<ConstantBinding, MAX_CONSTANT_BUFFERS>; 3],
    samplers: [SlotShadow<DescriptorHandle, MAX_SAMPLERS>; 3],
    shader_resources: [SlotShadow<DescriptorBinding, MAX_SHADER_RESOURCES>; 3],
    unordered_access: SlotShadow<DescriptorBinding, MAX_UNORDERED_ACCESS>,
}

impl ExplicitContext {
    pub(crate) fn new(shared: Arc<ExplicitShared>, descriptor: &DeviceDescriptor) -> Result<Self, GraphicsError> {
        let driver = shared.driver.clone();
        let frames = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSlot::new(driver.as_ref(), &shared.lifetime, descriptor))
            .collect::<Result<Vec<_>, _>>()?;
        let list = driver
            .create_command_list(QueueKind::Graphics, frames[0].allocator.raw())
            .map_err(|e| e.into_creation_error("command list"))?;
        let list = shared.wrap(list);
        driver.set_descriptor_heaps(list.raw(), &frames[0].heaps())?;

        let mut context = Self {
            list,
            recording: true,
            frames,
            slot: 0,
            fence_value: 0,
            tracker: ResourceStateTracker::new(QueueKind::Graphics, descriptor.barrier_batch_size),
            pass: PassTracker::Idle,
            active: None,
            hazards: AttachmentHazards::default(),
            pipeline: None,
            graphics_root: StateShadow::new(),
            compute_root: StateShadow::new(),
            pipeline_state: StateShadow::new(),
            topology: StateShadow::new(),
            blend_factor: StateShadow::new(),
            stencil_reference: StateShadow::new(),
            viewport: StateShadow::new(),
            scissor: StateShadow::new(),
            vertex_buffers: SlotShadow::new(),
            index_buffer: StateShadow::new(),
            constant_buffers: Default::default(),
            samplers: Default::default(),
            shader_resources: Default::default(),
            unordered_access: SlotShadow::new(),
            shared,
        };
        context.graphics_root.set(Some(context.shared.graphics_root.raw()));
        context.compute_root.set(Some(context.shared.compute_root.raw()));
        context.reset_bindings();
        Ok(context)
    }

    pub(crate) fn require_idle(&self, operation: &str) -> Result<(), GraphicsError> {
        self.pass.require_idle(operation)
    }

    /// Forgets every binding and restores the default blend factor and
    /// stencil reference.
    pub(crate) fn reset_bindings(&mut self) {
        self.pipeline = None;
        self.pipeline_state.reset();
        self.topology.reset();
        self.viewport.reset();
        self.scissor.reset();
        self.blend_factor.set(Some(Color::WHITE));
        self.stencil_reference.set(Some(0));
        self.vertex_buffers.reset();
        self.index_buffer.reset();
        self.constant_buffers.iter_mut().for_each(SlotShadow::reset);
        self.samplers.iter_mut().for_each(SlotShadow::reset);
        self.shader_resources.iter_mut().for_each(SlotShadow::reset);
        self.unordered_access.reset();
        self.hazards.clear_sampled();
        self.invalidate_bindings();
    }

    /// Marks everything as unknown to the command list, which is the case
    /// right after it was reset.
    fn invalidate_bindings(&mut self) {
        self.graphics_root.invalidate();
        self.compute_root.invalidate();
        self.pipeline_state.invalidate();
        self.topology.invalidate();
        self.blend_factor.invalidate();
        self.stencil_reference.invalidate();
        self.viewport.invalidate();
        self.scissor.invalidate();
        self.vertex_buffers.invalidate();
        self.index_buffer.invalidate();
        self.constant_buffers.iter_mut().for_each(SlotShadow::invalidate);
        self.samplers.iter_mut().for_each(SlotShadow::invalidate);
        self.shader_resources.iter_mut().for_each(SlotShadow::invalidate);
        self.unordered_access.invalidate();
    }

    // --- Submission ---

    /// Closes and executes the command list, then signals the fence.
    /// Returns the signaled value.
    pub(crate) fn submit(&mut self) -> Result<u64, GraphicsError> {
        let driver = self.shared.driver.clone();
        let queue = self.shared.queue.raw();
        if self.recording {
            self.flush_barriers()?;
            self.recording = false;
            driver.close_command_list(self.list.raw())?;
            driver.execute_command_lists(queue, &[self.list.raw()])?;
        }
        self.fence_value += 1;
        driver.queue_signal(queue, self.shared.fence.raw(), self.fence_value)?;
        self.frames[self.slot].fence_value = self.fence_value;
        Ok(self.fence_value)
    }

    /// Reopens the command list on the current slot's allocator.
    fn reopen(&mut self) -> Result<(), GraphicsError> {
        let driver = self.shared.driver.clone();
        let list = self.list.raw();
        let frame = &self.frames[self.slot];
        driver.reset_command_list(list, frame.allocator.raw())?;
        self.recording = true;
        driver.set_descriptor_heaps(list, &frame.heaps())?;
        self.invalidate_bindings();
        if let Some(active) = &self.active {
            let colors: Vec<DescriptorHandle> = active.colors.iter().map(|color| color.descriptor).collect();
            driver.om_set_render_targets(list, &colors, active.depth.as_ref().map(|(_, view, _)| *view))?;
        }
        Ok(())
    }

    fn wait_for(&self, value: u64) -> Result<(), GraphicsError> {
        let fence = self.shared.fence.raw();
        if value == 0 || self.shared.driver.fence_completed_value(fence) >= value {
            return Ok(());
        }
        Ok(self.shared.driver.wait_for_fence(fence, value)?)
    }

    /// Submits, blocks until the GPU is idle and starts the current slot over.
    pub(crate) fn wait_idle(&mut self) -> Result<(), GraphicsError> {
        let value = self.submit()?;
        self.wait_for(value)?;
        self.frames[self.slot].reset(self.shared.driver.as_ref())?;
        self.reopen()
    }

    /// Moves to the slot of frame `frame_count`, waiting for the frame that
    /// used it last. The command list must have been submitted.
    pub(crate) fn advance_frame(&mut self, frame_count: u64) -> Result<(), GraphicsError> {
        self.slot = (frame_count % self.frames.len() as u64) as usize;
        self.wait_for(self.frames[self.slot].fence_value)?;
        self.frames[self.slot].reset(self.shared.driver.as_ref())?;
        self.reopen()
    }

    /// Starts the current slot over when one of its rings runs out.
    fn restart(&mut self) -> Result<(), GraphicsError> {
        log::debug!("ExplicitContext: Frame slot {} exhausted, draining the GPU", self.slot);
        self.wait_idle()
    }

    /// Moves every swapchain back buffer into `PRESENT`.
    pub(crate) fn prepare_present(&mut self, back_buffers: &[ResourceRef]) -> Result<(), GraphicsError> {
        for back_buffer in back_buffers {
            self.transition(back_buffer, ResourceState::PRESENT)?;
        }
        self.flush_barriers()
    }

    // --- Barriers ---

    fn transition(&mut self, resource: &ResourceRef, state: ResourceState) -> Result<(), GraphicsError> {
        if !resource.tracked {
            return Ok(());
        }
        let mut sink = ListSink {
            driver: self.shared.driver.as_ref(),
            list: self.list.raw(),
        };
        self.tracker
            .transition(resource.raw.0, &resource.state, state, false, &mut sink)
    }

    fn flush_barriers(&mut self) -> Result<(), GraphicsError> {
        let mut sink = ListSink {
            driver: self.shared.driver.as_ref(),
            list: self.list.raw(),
        };
        self.tracker.flush(&mut sink)
    }

    /// Moves every resource the next draw or dispatch reads or writes into the
    /// state it is used in. A resource bound in several places gets the union.
    fn transition_bindings(&mut self, compute: bool) -> Result<(), GraphicsError> {
        let mut required: Vec<(ResourceRef, ResourceState)> = Vec::new();
        let mut require = |resource: &ResourceRef, state: ResourceState| {
            if !resource.tracked {
                return;
            }
            match required.iter_mut().find(|(bound, _)| *bound == *resource) {
                Some((_, existing)) => *existing |= state,
                None => required.push((resource.clone(), state)),
            }
        };

        if compute {
            let stage = ShaderStage::Compute.index();
            for (_, binding) in self.constant_buffers[stage].iter_set() {
                require(&binding.resource, ResourceState::VERTEX_AND_CONSTANT_BUFFER);
            }
            for (_, binding) in self.shader_resources[stage].iter_set() {
                require(&binding.resource, ResourceState::NON_PIXEL_SHADER_RESOURCE);
            }
            for (_, binding) in self.unordered_access.iter_set() {
                require(&binding.resource, ResourceState::UNORDERED_ACCESS);
            }
        } else {
            for (_, binding) in self.vertex_buffers.iter_set() {
                require(&binding.resource, ResourceState::VERTEX_AND_CONSTANT_BUFFER);
            }
            if let Some(Some(binding)) = self.index_buffer.get() {
                require(&binding.resource, ResourceState::INDEX_BUFFER);
            }
            for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
                for (_, binding) in self.constant_buffers[stage.index()].iter_set() {
                    require(&binding.resource, ResourceState::VERTEX_AND_CONSTANT_BUFFER);
                }
                for (_, binding) in self.shader_resources[stage.index()].iter_set() {
                    require(&binding.resource, ResourceState::ALL_SHADER_RESOURCE);
                }
            }
        }

        for (resource, state) in required {
            self.transition(&resource, state)?;
        }
        self.flush_barriers()
    }

    // --- Binding ---

    fn render_pipeline(&self, operation: &str) -> Result<PipelineBinding, GraphicsError> {
        match self.pipeline {
            Some(pipeline) if !pipeline.compute => Ok(pipeline),
            Some(_) => Err(GraphicsError::InvalidState(format!(
                "{operation} requires a render pipeline, but a compute pipeline is bound"
            ))),
            None => Err(GraphicsError::InvalidState(format!(
                "{operation} requires a bound pipeline"
            ))),
        }
    }

    fn bound_buffer(
        &self,
        id: BufferId,
        required: BindFlags,
        what: &str,
    ) -> Result<(ResourceRef, ResourceDesc, GpuAddress), GraphicsError> {
        let (resource, desc, address) = self.shared.buffer(id)?;
        if !desc.bind.contains(required) {
            return Err(GraphicsError::InvalidState(format!(
                "buffer {id:?} was not created for use as a {what}"
            )));
        }
        Ok((resource, desc, address))
    }

    fn check_slot(stage: ShaderStage, slot: u32, capacity: usize) -> Result<(), GraphicsError> {
        if slot as usize >= capacity {
            return Err(GraphicsError::InvalidState(format!(
                "{stage:?} slot {slot} is out of range (0..{capacity})"
            )));
        }
        Ok(())
    }

    /// Returns `true` if the tables the next draw or dispatch pushes fit in
    /// what is left of the slot's descriptor rings.
    fn tables_fit(&self, stages: &[ShaderStage], compute: bool) -> bool {
        let mut resources = 0;
        let mut samplers = 0;
        for stage in stages {
            if self.shader_resources[stage.index()].is_dirty() {
                resources += MAX_SHADER_RESOURCES as u32;
            }
            if self.samplers[stage.index()].is_dirty() {
                samplers += MAX_SAMPLERS as u32;
            }
        }
        if compute && self.unordered_access.is_dirty() {
            resources += MAX_UNORDERED_ACCESS as u32;
        }
        let frame = &self.frames[self.slot];
        resources <= frame.shader_resources.remaining() && samplers <= frame.samplers.remaining()
    }

    fn reserve_tables(&mut self, stages: &[ShaderStage], compute: bool) -> Result<(), GraphicsError> {
        if self.tables_fit(stages, compute) {
            return Ok(());
        }
        self.restart()?;
        if !self.tables_fit(stages, compute) {
            return Err(GraphicsError::invalid_state(
                "descriptor rings are too small for the tables of a single command",
            ));
        }
        Ok(())
    }

    /// Copies `sources` into consecutive ring descriptors and points a root
    /// table at them.
    fn push_table(
        &mut self,
        kind: DescriptorKind,
        sources: &[DescriptorHandle],
        compute: bool,
        parameter: u32,
    ) -> Result<(), GraphicsError> {
        let driver = self.shared.driver.clone();
        let list = self.list.raw();
        let frame = &mut self.frames[self.slot];
        let ring = match kind {
            DescriptorKind::Sampler => &mut frame.samplers,
            _ => &mut frame.shader_resources,
        };
        let (cpu_start, gpu_start) = ring
            .allocate(sources.len() as u32)
            .ok_or_else(|| GraphicsError::invalid_state("descriptor ring exhausted mid-command"))?;
        for (index, source) in sources.iter().enumerate() {
            driver.copy_descriptors_simple(1, cpu_start.offset(index as u32, ring.increment()), *source, ring.kind())?;
        }
        driver.set_root_descriptor_table(list, compute, parameter, gpu_start)?;
        Ok(())
    }

    /// Pushes one stage's root constant buffers and tables that changed.
    fn flush_stage(&mut self, stage: ShaderStage, compute: bool) -> Result<(), GraphicsError> {
        let driver = self.shared.driver.clone();
        let list = self.list.raw();
        let parameters = stage_parameters(stage);
        let index = stage.index();

        if let Some(range) = self.constant_buffers[index].dirty_range() {
            for slot in range {
                let address = self.constant_buffers[index].get(slot).map_or(0, |binding| binding.address);
                driver.set_root_constant_buffer_view(
                    list,
                    compute,
                    parameters.first_constant_buffer + slot as u32,
                    address,
                )?;
            }
            self.constant_buffers[index].mark_applied();
        }
        if self.shader_resources[index].is_dirty() {
            let null = self.shared.null_shader_resource;
            let sources: Vec<DescriptorHandle> = self.shader_resources[index]
                .bound()
                .iter()
                .map(|binding| binding.as_ref().map_or(null, |binding| binding.descriptor))
                .collect();
            self.push_table(DescriptorKind::ShaderResource, &sources, compute, parameters.shader_resources)?;
            self.shader_resources[index].mark_applied();
        }
        if self.samplers[index].is_dirty() {
            let null = self.shared.null_sampler;
            let sources: Vec<DescriptorHandle> = self.samplers[index]
                .bound()
                .iter()
                .map(|sampler| sampler.unwrap_or(null))
                .collect();
            self.push_table(DescriptorKind::Sampler, &sources, compute, parameters.samplers)?;
            self.samplers[index].mark_applied();
        }
        Ok(())
    }

    fn flush_graphics_state(&mut self) -> Result<(), GraphicsError> {
        let driver = self.shared.driver.clone();
        let list = self.list.raw();
        if let Some(root) = self.graphics_root.take_change() {
            driver.set_root_signature(list, false, root)?;
        }
        if let Some(state) = self.pipeline_state.take_change() {
            driver.set_pipeline_state(list, state)?;
        }
        if let Some(topology) = self.topology.take_change() {
            driver.ia_set_primitive_topology(list, topology)?;
        }
        if let Some(factor) = self.blend_factor.take_change() {
            driver.om_set_blend_factor(list, factor)?;
        }
        if let Some(reference) = self.stencil_reference.take_change() {
            driver.om_set_stencil_ref(list, reference)?;
        }
        if let Some(viewport) = self.viewport.take_change() {
            driver.rs_set_viewports(list, &[viewport])?;
        }
        if let Some(scissor) = self.scissor.take_change() {
            driver.rs_set_scissor_rects(list, &[scissor])?;
        }
        if let Some(range) = self.vertex_buffers.dirty_range() {
            let views: Vec<VertexBufferView> = self.vertex_buffers.bound()[range.clone()]
                .iter()
                .map(|binding| binding.as_ref().map(|binding| binding.view).unwrap_or_default())
                .collect();
            driver.ia_set_vertex_buffers(list, range.start as u32, &views)?;
            self.vertex_buffers.mark_applied();
        }
        if let Some(binding) = self.index_buffer.take_change() {
            driver.ia_set_index_buffer(list, binding.map(|binding| binding.view))?;
        }
        self.flush_stage(ShaderStage::Vertex, false)?;
        self.flush_stage(ShaderStage::Fragment, false)
    }

    fn flush_compute_state(&mut self) -> Result<(), GraphicsError> {
        let driver = self.shared.driver.clone();
        let list = self.list.raw();
        if let Some(root) = self.compute_root.take_change() {
            driver.set_root_signature(list, true, root)?;
        }
        if let Some(state) = self.pipeline_state.take_change() {
            driver.set_pipeline_state(list, state)?;
        }
        self.flush_stage(ShaderStage::Compute, true)?;
        if self.unordered_access.is_dirty() {
            let null = self.shared.null_unordered_access;
            let sources: Vec<DescriptorHandle> = self
                .unordered_access
                .bound()
                .iter()
                .map(|binding| binding.as_ref().map_or(null, |binding| binding.descriptor))
                .collect();
            self.push_table(DescriptorKind::ShaderResource, &sources, true, UNORDERED_ACCESS_PARAMETER)?;
            self.unordered_access.mark_applied();
        }
        Ok(())
    }

    /// Makes everything a draw reads resident on the list.
    fn prepare_draw(&mut self) -> Result<(), GraphicsError> {
        // Reserve first: a restart halfway through a push would lose the
        // tables already written.
        self.reserve_tables(&[ShaderStage::Vertex, ShaderStage::Fragment], false)?;
        self.transition_bindings(false)?;
        self.flush_graphics_state()
    }

    // --- Uploads and readback ---

    /// Creates an upload heap buffer holding `data`.
    fn staging_buffer(&self, data: &[u8]) -> Result<NativeHandle, GraphicsError> {
        let desc = ResourceDesc::buffer(data.len() as u64, BindFlags::EMPTY, MemoryUsage::Upload, 0);
        let raw = self
            .shared
            .driver
            .create_committed_resource(&desc, ResourceState::GENERIC_READ)
            .map_err(|e| e.into_creation_error("upload staging buffer"))?;
        let staging = self.shared.wrap(raw);
        self.shared.write_mapped(raw, data)?;
        Ok(staging)
    }

    /// Records a copy of `data` into the start of a default heap buffer.
    pub(crate) fn upload_buffer(&mut self, destination: &ResourceRef, data: &[u8]) -> Result<(), GraphicsError> {
        let staging = self.staging_buffer(data)?;
        self.transition(destination, ResourceState::COPY_DEST)?;
        self.flush_barriers()?;
        let copied = self.shared.driver.copy_buffer_region(
            self.list.raw(),
            destination.raw,
            0,
            staging.raw(),
            0,
            data.len() as u64,
        );
        self.shared.defer([PendingRelease::Object(staging)]);
        Ok(copied?)
    }

    /// Records copies of every subresource of a texture. `data` holds each
    /// slice in turn, with its mips tightly packed.
    pub(crate) fn upload_texture(
        &mut self,
        destination: &ResourceRef,
        desc: &ResourceDesc,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        self.transition(destination, ResourceState::COPY_DEST)?;
        self.flush_barriers()?;
        let mut offset = 0;
        for slice in 0..desc.array_size() {
            for mip in 0..desc.mip_levels.max(1) {
                let size = desc.subresource_size(mip);
                let chunk = data.get(offset..offset + size).ok_or_else(|| {
                    GraphicsError::InvalidState(format!("texture data ends before mip {mip} of slice {slice}"))
                })?;
                offset += size;
                let staging = self.staging_buffer(chunk)?;
                let copied = self.shared.driver.copy_texture_region(
                    self.list.raw(),
                    destination.raw,
                    desc.subresource(mip, slice),
                    staging.raw(),
                    0,
                );
                self.shared.defer([PendingRelease::Object(staging)]);
                copied?;
            }
        }
        Ok(())
    }

    /// Copies `data` into the slot's upload ring, starting the slot over if
    /// the ring is full. Returns the ring buffer and the offset of the copy.
    fn stage_upload(&mut self, data: &[u8]) -> Result<(RawObject, u64), GraphicsError> {
        let driver = self.shared.driver.clone();
        if data.len() as u64 > self.frames[self.slot].upload.size() {
            return Err(GraphicsError::InvalidState(format!(
                "{} bytes exceed the {}-byte upload ring",
                data.len(),
                self.frames[self.slot].upload.size()
            )));
        }
        if let Some(offset) = self.frames[self.slot].upload.write(driver.as_ref(), data)? {
            return Ok((self.frames[self.slot].upload.buffer(), offset));
        }
        self.restart()?;
        let upload = &mut self.frames[self.slot].upload;
        match upload.write(driver.as_ref(), data)? {
            Some(offset) => Ok((upload.buffer(), offset)),
            None => Err(GraphicsError::invalid_state("upload ring exhausted after a restart")),
        }
    }

    /// Copies one subresource into a readback buffer, waits for the GPU and
    /// returns the bytes.
    pub(crate) fn read_back(
        &mut self,
        source: &ResourceRef,
        desc: &ResourceDesc,
        mip: u32,
        slice: u32,
    ) -> Result<Vec<u8>, GraphicsError> {
        self.pass.require_idle("read back")?;
        let size = if desc.is_buffer() {
            desc.width as usize
        } else {
            desc.subresource_size(mip)
        };
        let readback_desc = ResourceDesc::buffer(size as u64, BindFlags::EMPTY, MemoryUsage::Readback, 0);
        let raw = self
            .shared
            .driver
            .create_committed_resource(&readback_desc, ResourceState::COPY_DEST)
            .map_err(|e| e.into_creation_error("readback buffer"))?;
        let readback = self.shared.wrap(raw);

        self.transition(source, ResourceState::COPY_SOURCE)?;
        self.flush_barriers()?;
        let list = self.list.raw();
        if desc.is_buffer() {
            self.shared
                .driver
                .copy_buffer_region(list, raw, 0, source.raw, 0, size as u64)?;
        } else {
            self.shared
                .driver
                .copy_texture_region(list, raw, 0, source.raw, desc.subresource(mip, slice))?;
        }
        self.wait_idle()?;
        self.shared.read_mapped(readback.raw(), size)
    }

    fn resolve_color(&mut self, color: &ColorTarget, target: &ResolveTarget) -> Result<(), GraphicsError> {
        let (destination, destination_desc, back_buffer) = self.shared.texture(target.texture)?;
        let source_sub = color.desc.subresource(color.attachment.mip, color.attachment.slice);
        let destination_sub = destination_desc.subresource(target.mip, target.slice);
        let driver = self.shared.driver.clone();
        if color.desc.sample_count > 1 {
            self.transition(&color.resource, ResourceState::RESOLVE_SOURCE)?;
            self.transition(&destination, ResourceState::RESOLVE_DEST)?;
            self.flush_barriers()?;
            driver.resolve_subresource(self.list.raw(), destination.raw, destination_sub, color.resource.raw, source_sub)?;
        } else {
            self.transition(&color.resource, ResourceState::COPY_SOURCE)?;
            self.transition(&destination, ResourceState::COPY_DEST)?;
            self.flush_barriers()?;
            driver.copy_texture_region(self.list.raw(), destination.raw, destination_sub, color.resource.raw, source_sub)?;
        }
        if back_buffer {
            self.transition(&destination, ResourceState::PRESENT)?;
        }
        Ok(())
    }
}

impl CommandContext for ExplicitContext {
    fn begin_render_pass(&mut self, descriptor: &RenderPassDescriptor) -> Result<(), GraphicsError> {
        self.pass.check_can_begin()?;
        if descriptor.color_attachments.len() > MAX_COLOR_ATTACHMENTS {
            return Err(GraphicsError::InvalidState(format!(
                "{} color attachments exceed the limit of {MAX_COLOR_ATTACHMENTS}",
                descriptor.color_attachments.len()
            )));
        }

        // 1. Resolve every attachment to a cached view.
        let mut colors = Vec::with_capacity(descriptor.color_attachments.len());
        let mut extents = Vec::with_capacity(descriptor.color_attachments.len() + 1);
        for attachment in descriptor.color_attachments {
            let (resource, desc, back_buffer) = self.shared.texture(attachment.texture)?;
            let view = self.shared.texture_view(
                attachment.texture,
                TextureViewKind::RenderTarget,
                ViewKey::new(attachment.mip, attachment.slice),
            )?;
            let (width, height, _) = desc.mip_extent(attachment.mip);
            extents.push(Extent2D::new(width, height));
            colors.push(ColorTarget {
                resource,
                desc,
                descriptor: view_descriptor(view),
                back_buffer,
                attachment: *attachment,
            });
        }
        let depth = match &descriptor.depth_stencil_attachment {
            Some(attachment) => {
                let (resource, desc, _) = self.shared.texture(attachment.texture)?;
                let view = self.shared.texture_view(
                    attachment.texture,
                    TextureViewKind::DepthStencil,
                    ViewKey::new(attachment.mip, attachment.slice),
                )?;
                let (width, height, _) = desc.mip_extent(attachment.mip);
                extents.push(Extent2D::new(width, height));
                let ops = DepthStencilOps::resolve(attachment, desc.format.has_stencil());
                Some((resource, view_descriptor(view), ops))
            }
            None => None,
        };
        let area = render_area(extents).ok_or_else(|| {
            GraphicsError::invalid_state("begin_render_pass needs at least one attachment")
        })?;

        // 2. Attachments become writable, then get bound.
        for color in &colors {
            self.transition(&color.resource, ResourceState::RENDER_TARGET)?;
        }
        if let Some((resource, ..)) = &depth {
            self.transition(resource, ResourceState::DEPTH_WRITE)?;
        }
        self.flush_barriers()?;
        let driver = self.shared.driver.clone();
        let list = self.list.raw();
        let views: Vec<DescriptorHandle> = colors.iter().map(|color| color.descriptor).collect();
        driver.om_set_render_targets(list, &views, depth.as_ref().map(|(_, view, _)| *view))?;

        // 3. Load actions.
        for color in &colors {
            match color.attachment.load {
                LoadAction::Load => {}
                LoadAction::Clear => {
                    driver.clear_render_target_view(list, color.descriptor, color.attachment.clear_color)?
                }
                LoadAction::Discard => driver.discard_resource(list, color.resource.raw)?,
            }
        }
        if let Some((resource, view, ops)) = &depth {
            if ops.needs_clear() {
                driver.clear_depth_stencil_view(list, *view, ops.clear_depth, ops.clear_stencil)?;
            }
            if ops.discard_on_load {
                driver.discard_resource(list, resource.raw)?;
            }
        }

        // 4. Viewport and scissor cover the render area.
        self.viewport.set(Some(Viewport::from_extent(area)));
        self.scissor.set(Some(ScissorRect::from_extent(area)));
        self.pass.enter(area);
        self.hazards.attach(descriptor);
        self.active = Some(ActivePass { colors, depth });
        log::trace!(
            "ExplicitContext: Began render pass {:?} ({}x{})",
            descriptor.label,
            area.width,
            area.height
        );
        Ok(())
    }

    fn end_render_pass(&mut self) -> Result<(), GraphicsError> {
        self.pass.leave()?;
        self.hazards.detach();
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        let driver = self.shared.driver.clone();
        for color in &active.colors {
            match (color.attachment.store, color.attachment.resolve_target) {
                (StoreAction::Store, None) => {}
                (StoreAction::Store, Some(target)) => self.resolve_color(color, &target)?,
                (StoreAction::Discard, _) => driver.discard_resource(self.list.raw(), color.resource.raw)?,
            }
        }
        if let Some((resource, _, ops)) = &active.depth {
            if ops.discard_on_store {
                driver.discard_resource(self.list.raw(), resource.raw)?;
            }
        }
        for color in active.colors.iter().filter(|color| color.back_buffer) {
            self.transition(&color.resource, ResourceState::PRESENT)?;
        }
        self.flush_barriers()
    }

    fn is_in_render_pass(&self) -> bool {
        self.pass.is_in_pass()
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport.set(Some(viewport));
    }

    fn set_scissor_rect(&mut self, rect: ScissorRect) {
        self.scissor.set(Some(rect));
    }

    fn set_pipeline(&mut self, pipeline: Option<PipelineId>) -> Result<(), GraphicsError> {
        let Some(id) = pipeline else {
            self.pipeline = None;
            return Ok(());
        };
        let binding = self.shared.pipeline_binding(id)?;
        self.pipeline_state.set(Some(binding.state));
        if !binding.compute {
            self.topology.set(Some(binding.topology));
        }
        self.pipeline = Some(binding);
        Ok(())
    }

    fn set_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: Option<BufferId>,
        offset: u64,
        stride: u32,
    ) -> Result<(), GraphicsError> {
        let binding = match buffer {
            Some(id) => {
                let (resource, desc, address) = self.bound_buffer(id, BindFlags::VERTEX_BUFFER, "vertex buffer")?;
                validation::validate_bind_offset(id, offset, desc.width)?;
                Some(VertexBinding {
                    resource,
                    view: VertexBufferView {
                        location: address + offset,
                        size: (desc.width - offset) as u32,
                        stride,
                    },
                })
            }
            None => None,
        };
        self.vertex_buffers.set(slot, binding)
    }

    fn set_index_buffer(
        &mut self,
        buffer: Option<BufferId>,
        format: IndexFormat,
        offset: u64,
    ) -> Result<(), GraphicsError> {
        let binding = match buffer {
            Some(id) => {
                let (resource, desc, address) = self.bound_buffer(id, BindFlags::INDEX_BUFFER, "index buffer")?;
                validation::validate_bind_offset(id, offset, desc.width)?;
                Some(IndexBinding {
                    resource,
                    view: IndexBufferView {
                        location: address + offset,
                        size: (desc.width - offset) as u32,
                        format,
                    },
                })
            }
            None => None,
        };
        self.index_buffer.set(Some(binding));
        Ok(())
    }

    fn set_constant_buffer(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        buffer: Option<BufferId>,
    ) -> Result<(), GraphicsError> {
        Self::check_slot(stage, slot, MAX_CONSTANT_BUFFERS)?;
        let binding = match buffer {
            Some(id) => {
                let (resource, _, address) = self.bound_buffer(id, BindFlags::CONSTANT_BUFFER, "constant buffer")?;
                Some(ConstantBinding { resource, address })
            }
            None => None,
        };
        self.constant_buffers[stage.index()].set(slot, binding)
    }

    fn set_sampler(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        sampler: Option<SamplerId>,
    ) -> Result<(), GraphicsError> {
        Self::check_slot(stage, slot, MAX_SAMPLERS)?;
        let descriptor = sampler.map(|id| self.shared.sampler_descriptor(id)).transpose()?;
        self.samplers[stage.index()].set(slot, descriptor)
    }

    fn set_shader_resource(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        resource: Option<ShaderResourceBinding>,
    ) -> Result<(), GraphicsError> {
        Self::check_slot(stage, slot, MAX_SHADER_RESOURCES)?;
        let sampled = match resource {
            Some(ShaderResourceBinding::Texture(id) | ShaderResourceBinding::TextureMip(id, _)) => Some(id),
            _ => None,
        };
        let texture_binding = |id: TextureId, key: ViewKey| -> Result<DescriptorBinding, GraphicsError> {
            let (resource, ..) = self.shared.texture(id)?;
            let view = self.shared.texture_view(id, TextureViewKind::ShaderResource, key)?;
            Ok(DescriptorBinding {
                resource,
                descriptor: view_descriptor(view),
            })
        };
        let binding = match resource {
            None => None,
            Some(ShaderResourceBinding::Texture(id)) => Some(texture_binding(id, ViewKey::whole())?),
            Some(ShaderResourceBinding::TextureMip(id, mip)) => Some(texture_binding(id, ViewKey::mip(mip))?),
            Some(ShaderResourceBinding::Buffer(id)) => {
                let (resource, ..) = self.shared.buffer(id)?;
                let view = self.shared.buffer_view(id, TextureViewKind::ShaderResource)?;
                Some(DescriptorBinding {
                    resource,
                    descriptor: view_descriptor(view),
                })
            }
        };
        self.shader_resources[stage.index()].set(slot, binding)?;
        self.hazards.sample(stage, slot, sampled);
        Ok(())
    }

    fn set_unordered_access(
        &mut self,
        slot: u32,
        resource: Option<UnorderedAccessBinding>,
    ) -> Result<(), GraphicsError> {
        Self::check_slot(ShaderStage::Compute, slot, MAX_UNORDERED_ACCESS)?;
        let binding = match resource {
            None => None,
            Some(UnorderedAccessBinding::Texture(id, mip)) => {
                let (resource, ..) = self.shared.texture(id)?;
                let view = self
                    .shared
                    .texture_view(id, TextureViewKind::UnorderedAccess, ViewKey::mip(mip))?;
                Some(DescriptorBinding {
                    resource,
                    descriptor: view_descriptor(view),
                })
            }
            Some(UnorderedAccessBinding::Buffer(id)) => {
                let (resource, ..) = self.shared.buffer(id)?;
                let view = self.shared.buffer_view(id, TextureViewKind::UnorderedAccess)?;
                Some(DescriptorBinding {
                    resource,
                    descriptor: view_descriptor(view),
                })
            }
        };
        self.unordered_access.set(slot, binding)
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.stencil_reference.set(Some(reference));
    }

    fn set_blend_factor(&mut self, factor: Color) {
        self.blend_factor.set(Some(factor));
    }

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<(), GraphicsError> {
        self.pass.require_pass("draw")?;
        self.render_pipeline("draw")?;
        self.hazards.check_draw("draw")?;
        if vertex_count == 0 || instance_count == 0 {
            return Ok(());
        }
        self.prepare_draw()?;
        // The list has no non-instanced draw.
        self.shared.driver.draw_instanced(
            self.list.raw(),
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        )?;
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<(), GraphicsError> {
        self.pass.require_pass("draw_indexed")?;
        self.render_pipeline("draw_indexed")?;
        if !matches!(self.index_buffer.get(), Some(Some(_))) {
            return Err(GraphicsError::invalid_state("draw_indexed requires a bound index buffer"));
        }
        self.hazards.check_draw("draw_indexed")?;
        if index_count == 0 || instance_count == 0 {
            return Ok(());
        }
        self.prepare_draw()?;
        self.shared.driver.draw_indexed_instanced(
            self.list.raw(),
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        )?;
        Ok(())
    }

    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) -> Result<(), GraphicsError> {
        self.pass.require_idle("dispatch")?;
        if !self.pipeline.is_some_and(|pipeline| pipeline.compute) {
            return Err(GraphicsError::invalid_state("dispatch requires a bound compute pipeline"));
        }
        if groups_x == 0 || groups_y == 0 || groups_z == 0 {
            return Ok(());
        }
        self.reserve_tables(&[ShaderStage::Compute], true)?;
        self.transition_bindings(true)?;
        self.flush_compute_state()?;
        self.shared
            .driver
            .dispatch(self.list.raw(), groups_x, groups_y, groups_z)?;
        Ok(())
    }

    fn update_constant_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), GraphicsError> {
        let (resource, desc, _) = self.bound_buffer(buffer, BindFlags::CONSTANT_BUFFER, "constant buffer")?;
        if data.len() as u64 > desc.width {
            return Err(GraphicsError::InvalidState(format!(
                "{} bytes do not fit in the {}-byte buffer {buffer:?}",
                data.len(),
                desc.width
            )));
        }
        if data.is_empty() {
            return Ok(());
        }
        if desc.usage != MemoryUsage::Default {
            return Err(GraphicsError::InvalidState(format!(
                "buffer {buffer:?} lives in {:?} memory and cannot be updated",
                desc.usage
            )));
        }
        let (upload, offset) = self.stage_upload(data)?;
        self.transition(&resource, ResourceState::COPY_DEST)?;
        self.flush_barriers()?;
        self.shared
            .driver
            .copy_buffer_region(self.list.raw(), resource.raw, 0, upload, offset, data.len() as u64)?;
        Ok(())
    }

    fn copy_buffer(&mut self, destination: BufferId, source: BufferId) -> Result<(), GraphicsError> {
        self.pass.require_idle("copy_buffer")?;
        validation::validate_copy_pair("copy_buffer", destination, source)?;
        let (dst, dst_desc, _) = self.shared.buffer(destination)?;
        let (src, src_desc, _) = self.shared.buffer(source)?;
        if dst_desc.width != src_desc.width {
            return Err(GraphicsError::InvalidState(format!(
                "copy_buffer between {} and {} bytes",
                src_desc.width, dst_desc.width
            )));
        }
        if !dst.tracked && dst_desc.usage != MemoryUsage::Readback {
            return Err(GraphicsError::InvalidState(format!(
                "buffer {destination:?} lives in {:?} memory and cannot be copied into",
                dst_desc.usage
            )));
        }
        if !src.tracked && src_desc.usage != MemoryUsage::Upload {
            return Err(GraphicsError::InvalidState(format!(
                "buffer {source:?} lives in {:?} memory and cannot be copied from",
                src_desc.usage
            )));
        }
        self.transition(&dst, ResourceState::COPY_DEST)?;
        self.transition(&src, ResourceState::COPY_SOURCE)?;
        self.flush_barriers()?;
        self.shared.driver.copy_resource(self.list.raw(), dst.raw, src.raw)?;
        Ok(())
    }

    fn copy_texture(&mut self, destination: TextureId, source: TextureId) -> Result<(), GraphicsError> {
        self.pass.require_idle("copy_texture")?;
        validation::validate_copy_pair("copy_texture", destination, source)?;
        let (dst, dst_desc, _) = self.shared.texture(destination)?;
        let (src, src_desc, _) = self.shared.texture(source)?;
        if !dst_desc.same_layout(&src_desc) {
            return Err(GraphicsError::InvalidState(format!(
                "copy_texture between {source:?} and {destination:?} with different layouts"
            )));
        }
        self.transition(&dst, ResourceState::COPY_DEST)?;
        self.transition(&src, ResourceState::COPY_SOURCE)?;
        self.flush_barriers()?;
        self.shared.driver.copy_resource(self.list.raw(), dst.raw, src.raw)?;
        Ok(())
    }

    fn flush(&mut self, wait: bool) -> Result<(), GraphicsError> {
        self.pass.require_idle("flush")?;
        if wait {
            self.wait_idle()?;
        } else {
            self.submit()?;
            self.reopen()?;
        }
        self.reset_bindings();
        Ok(())
    }
}

impl Drop for ExplicitContext {
    fn drop(&mut self) {
        for frame in &self.frames {
            frame.release_mappings(self.shared.driver.as_ref());
        }
    }
}
