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


use super::device::ImmediateShared;
use super::resources::{view_object, PipelineBinding};
use crate::graphics::native::{
    BindFlags, IndexBufferBinding, MapMode, MemoryUsage, RawObject, ResourceDesc,
    VertexBufferBinding,
};
use std::sync::Arc;
use tessera_core::renderer::context::*;
use tessera_core::renderer::validation;
use tessera_core::renderer::*;

const NO_VERTEX_BUFFER: VertexBufferBinding = VertexBufferBinding {
    buffer: None,
    stride: 0,
    offset: 0,
};

/// A color attachment resolved for the lifetime of a pass.
#[derive(Debug)]
struct ColorTarget {
    view: RawObject,
    texture: RawObject,
    desc: ResourceDesc,
    attachment: RenderPassColorAttachment,
}

#[derive(Debug)]
struct ActivePass {
    colors: Vec<ColorTarget>,
    depth: Option<(RawObject, DepthStencilOps)>,
}

/// The command context of an [`ImmediateDevice`](super::ImmediateDevice).
///
/// Commands execute on the driver's immediate context as they are issued,
/// except bindings: those only update shadow state, and the changes are
/// pushed right before the next draw or dispatch.
pub struct ImmediateContext {
    shared: Arc<ImmediateShared>,
    pass: PassTracker,
    active: Option<ActivePass>,
    hazards: AttachmentHazards,

    pipeline: Option<PipelineBinding>,
    blend_state: Option<RawObject>,
    depth_stencil_state: Option<RawObject>,
    blend_factor: Color,
    stencil_reference: u32,

    shaders: [StateShadow<Option<RawObject>>; 3],
    input_layout: StateShadow<Option<RawObject>>,
    topology: StateShadow<PrimitiveTopology>,
    rasterizer: StateShadow<Option<RawObject>>,
    blend: StateShadow<(Option<RawObject>, Color)>,
    depth_stencil: StateShadow<(Option<RawObject>, u32)>,
    viewport: StateShadow<Viewport>,
    scissor: StateShadow<ScissorRect>,

    vertex_buffers: SlotShadow<VertexBufferBinding, MAX_VERTEX_BUFFERS>,
    index_buffer: StateShadow<Option<IndexBufferBinding>>,
    constant_buffers: [SlotShadow<RawObject, MAX_CONSTANT_BUFFERS>; 3],
    samplers: [SlotShadow<RawObject, MAX_SAMPLERS>; 3],
    shader_resources: [SlotShadow<RawObject, MAX_SHADER_RESOURCES>; 3],
    unordered_access: SlotShadow<RawObject, MAX_UNORDERED_ACCESS>,
}

impl ImmediateContext {
    pub(crate) fn new(shared: Arc<ImmediateShared>) -> Self {
        Self {
            shared,
            pass: PassTracker::Idle,
            active: None,
            hazards: AttachmentHazards::default(),
            pipeline: None,
            blend_state: None,
            depth_stencil_state: None,
            blend_factor: Color::WHITE,
            stencil_reference: 0,
            shaders: Default::default(),
            input_layout: StateShadow::new(),
            topology: StateShadow::new(),
            rasterizer: StateShadow::new(),
            blend: StateShadow::new(),
            depth_stencil: StateShadow::new(),
            viewport: StateShadow::new(),
            scissor: StateShadow::new(),
            vertex_buffers: SlotShadow::new(),
            index_buffer: StateShadow::new(),
            constant_buffers: Default::default(),
            samplers: Default::default(),
            shader_resources: Default::default(),
            unordered_access: SlotShadow::new(),
        }
    }

    pub(crate) fn require_idle(&self, operation: &str) -> Result<(), GraphicsError> {
        self.pass.require_idle(operation)
    }

    /// Unbinds everything from the driver and forgets all shadowed state.
    pub(crate) fn unbind_all(&mut self) {
        self.shared.driver.om_set_render_targets(&[], None);
        self.shared.driver.clear_state();
        self.reset_bindings();
    }

    fn reset_bindings(&mut self) {
        self.pipeline = None;
        self.blend_state = None;
        self.depth_stencil_state = None;
        self.blend_factor = Color::WHITE;
        self.stencil_reference = 0;
        self.shaders.iter_mut().for_each(StateShadow::reset);
        self.input_layout.reset();
        self.topology.reset();
        self.rasterizer.reset();
        self.blend.reset();
        self.depth_stencil.reset();
        self.viewport.reset();
        self.scissor.reset();
        self.vertex_buffers.reset();
        self.index_buffer.reset();
        self.constant_buffers.iter_mut().for_each(SlotShadow::reset);
        self.samplers.iter_mut().for_each(SlotShadow::reset);
        self.shader_resources.iter_mut().for_each(SlotShadow::reset);
        self.unordered_access.reset();
        self.hazards.clear_sampled();
    }

    fn render_pipeline(&self, operation: &str) -> Result<PipelineBinding, GraphicsError> {
        match self.pipeline {
            Some(pipeline) if !pipeline.is_compute() => Ok(pipeline),
            Some(_) => Err(GraphicsError::InvalidState(format!(
                "{operation} requires a render pipeline, but a compute pipeline is bound"
            ))),
            None => Err(GraphicsError::InvalidState(format!(
                "{operation} requires a bound pipeline"
            ))),
        }
    }

    fn bound_buffer(&self, id: BufferId, required: BindFlags, what: &str) -> Result<(RawObject, ResourceDesc), GraphicsError> {
        let (raw, desc) = self.shared.buffer_object(id)?;
        if !desc.bind.contains(required) {
            return Err(GraphicsError::InvalidState(format!(
                "buffer {id:?} was not created for use as a {what}"
            )));
        }
        Ok((raw, desc))
    }

    /// Pushes the shader-stage slots that changed since the last push.
    fn flush_stage(&mut self, stage: ShaderStage) {
        let driver = &self.shared.driver;
        let index = stage.index();
        if let Some(range) = self.constant_buffers[index].dirty_range() {
            let buffers = &self.constant_buffers[index].bound()[range.clone()];
            driver.set_constant_buffers(stage, range.start as u32, buffers);
            self.constant_buffers[index].mark_applied();
        }
        if let Some(range) = self.samplers[index].dirty_range() {
            let samplers = &self.samplers[index].bound()[range.clone()];
            driver.set_samplers(stage, range.start as u32, samplers);
            self.samplers[index].mark_applied();
        }
        if let Some(range) = self.shader_resources[index].dirty_range() {
            let views = &self.shader_resources[index].bound()[range.clone()];
            driver.set_shader_resources(stage, range.start as u32, views);
            self.shader_resources[index].mark_applied();
        }
    }

    fn flush_graphics_state(&mut self) {
        let driver = self.shared.driver.clone();
        for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
            if let Some(shader) = self.shaders[stage.index()].take_change() {
                driver.set_shader(stage, shader);
            }
        }
        if let Some(layout) = self.input_layout.take_change() {
            driver.ia_set_input_layout(layout);
        }
        if let Some(topology) = self.topology.take_change() {
            driver.ia_set_primitive_topology(topology);
        }
        if let Some(state) = self.rasterizer.take_change() {
            driver.rs_set_state(state);
        }
        if let Some((state, factor)) = self.blend.take_change() {
            driver.om_set_blend_state(state, factor);
        }
        if let Some((state, reference)) = self.depth_stencil.take_change() {
            driver.om_set_depth_stencil_state(state, reference);
        }
        if let Some(viewport) = self.viewport.take_change() {
            driver.rs_set_viewports(&[viewport]);
        }
        if let Some(scissor) = self.scissor.take_change() {
            driver.rs_set_scissor_rects(&[scissor]);
        }
        if let Some(range) = self.vertex_buffers.dirty_range() {
            let bindings: Vec<_> = self.vertex_buffers.bound()[range.clone()]
                .iter()
                .map(|binding| binding.unwrap_or(NO_VERTEX_BUFFER))
                .collect();
            driver.ia_set_vertex_buffers(range.start as u32, &bindings);
            self.vertex_buffers.mark_applied();
        }
        if let Some(binding) = self.index_buffer.take_change() {
            driver.ia_set_index_buffer(binding);
        }
        self.flush_stage(ShaderStage::Vertex);
        self.flush_stage(ShaderStage::Fragment);
    }

    fn flush_compute_state(&mut self) {
        if let Some(shader) = self.shaders[ShaderStage::Compute.index()].take_change() {
            self.shared.driver.set_shader(ShaderStage::Compute, shader);
        }
        self.flush_stage(ShaderStage::Compute);
        if let Some(range) = self.unordered_access.dirty_range() {
            let views = &self.unordered_access.bound()[range.clone()];
            self.shared
                .driver
                .cs_set_unordered_access_views(range.start as u32, views);
            self.unordered_access.mark_applied();
        }
    }

    fn check_slot(stage: ShaderStage, slot: u32, capacity: usize) -> Result<(), GraphicsError> {
        if slot as usize >= capacity {
            return Err(GraphicsError::InvalidState(format!(
                "{stage:?} slot {slot} is out of range (0..{capacity})"
            )));
        }
        Ok(())
    }
}

impl CommandContext for ImmediateContext {
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
            let (texture, desc) = self.shared.texture_object(attachment.texture)?;
            let view = self.shared.texture_view(
                attachment.texture,
                TextureViewKind::RenderTarget,
                ViewKey::new(attachment.mip, attachment.slice),
            )?;
            let (width, height, _) = desc.mip_extent(attachment.mip);
            extents.push(Extent2D::new(width, height));
            colors.push(ColorTarget {
                view: view_object(view),
                texture,
                desc,
                attachment: *attachment,
            });
        }
        let depth = match &descriptor.depth_stencil_attachment {
            Some(attachment) => {
                let (_, desc) = self.shared.texture_object(attachment.texture)?;
                let view = self.shared.texture_view(
                    attachment.texture,
                    TextureViewKind::DepthStencil,
                    ViewKey::new(attachment.mip, attachment.slice),
                )?;
                let (width, height, _) = desc.mip_extent(attachment.mip);
                extents.push(Extent2D::new(width, height));
                let ops = DepthStencilOps::resolve(attachment, desc.format.has_stencil());
                Some((view_object(view), ops))
            }
            None => None,
        };
        let area = render_area(extents).ok_or_else(|| {
            GraphicsError::invalid_state("begin_render_pass needs at least one attachment")
        })?;

        // 2. Bind and apply the load actions.
        let driver = self.shared.driver.clone();
        let views: Vec<RawObject> = colors.iter().map(|color| color.view).collect();
        driver.om_set_render_targets(&views, depth.map(|(view, _)| view));
        for color in &colors {
            match color.attachment.load {
                LoadAction::Load => {}
                LoadAction::Clear => {
                    driver.clear_render_target_view(color.view, color.attachment.clear_color)?
                }
                LoadAction::Discard => driver.discard_view(color.view),
            }
        }
        if let Some((view, ops)) = depth {
            if ops.needs_clear() {
                driver.clear_depth_stencil_view(view, ops.clear_depth, ops.clear_stencil)?;
            }
            if ops.discard_on_load {
                driver.discard_view(view);
            }
        }

        // 3. Viewport and scissor cover the render area.
        self.viewport
            .set(Some(Viewport::from_extent(area)));
        self.scissor.set(Some(ScissorRect::from_extent(area)));
        self.pass.enter(area);
        self.hazards.attach(descriptor);
        self.active = Some(ActivePass { colors, depth });
        log::trace!(
            "ImmediateContext: Began render pass {:?} ({}x{})",
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
                (StoreAction::Store, Some(target)) => {
                    let (destination, destination_desc) = self.shared.texture_object(target.texture)?;
                    let source_sub = color.desc.subresource(color.attachment.mip, color.attachment.slice);
                    let destination_sub = destination_desc.subresource(target.mip, target.slice);
                    if color.desc.sample_count > 1 {
                        driver.resolve_subresource(
                            destination,
                            destination_sub,
                            color.texture,
                            source_sub,
                            color.desc.format,
                        )?;
                    } else {
                        driver.copy_subresource_region(
                            destination,
                            destination_sub,
                            color.texture,
                            source_sub,
                        )?;
                    }
                }
                (StoreAction::Discard, _) => driver.discard_view(color.view),
            }
        }
        if let Some((view, ops)) = active.depth {
            if ops.discard_on_store {
                driver.discard_view(view);
            }
        }
        Ok(())
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
        if binding.is_compute() {
            self.shaders[ShaderStage::Compute.index()].set(Some(binding.compute_shader));
        } else {
            self.shaders[ShaderStage::Vertex.index()].set(Some(binding.vertex_shader));
            self.shaders[ShaderStage::Fragment.index()].set(Some(binding.fragment_shader));
            self.input_layout.set(Some(binding.input_layout));
            self.topology.set(Some(binding.topology));
            self.rasterizer.set(Some(binding.rasterizer));
            self.blend_state = binding.blend;
            self.depth_stencil_state = binding.depth_stencil;
            self.blend.set(Some((self.blend_state, self.blend_factor)));
            self.depth_stencil
                .set(Some((self.depth_stencil_state, self.stencil_reference)));
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
                let (raw, desc) = self.bound_buffer(id, BindFlags::VERTEX_BUFFER, "vertex buffer")?;
                validation::validate_bind_offset(id, offset, desc.width)?;
                Some(VertexBufferBinding {
                    buffer: Some(raw),
                    stride,
                    offset,
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
                let (raw, desc) = self.bound_buffer(id, BindFlags::INDEX_BUFFER, "index buffer")?;
                validation::validate_bind_offset(id, offset, desc.width)?;
                Some(IndexBufferBinding {
                    buffer: raw,
                    format,
                    offset,
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
        let raw = match buffer {
            Some(id) => Some(self.bound_buffer(id, BindFlags::CONSTANT_BUFFER, "constant buffer")?.0),
            None => None,
        };
        self.constant_buffers[stage.index()].set(slot, raw)
    }

    fn set_sampler(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        sampler: Option<SamplerId>,
    ) -> Result<(), GraphicsError> {
        Self::check_slot(stage, slot, MAX_SAMPLERS)?;
        let raw = sampler.map(|id| self.shared.sampler_object(id)).transpose()?;
        self.samplers[stage.index()].set(slot, raw)
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
        let view = match resource {
            None => None,
            Some(ShaderResourceBinding::Texture(id)) => Some(self.shared.texture_view(
                id,
                TextureViewKind::ShaderResource,
                ViewKey::whole(),
            )?),
            Some(ShaderResourceBinding::TextureMip(id, mip)) => Some(self.shared.texture_view(
                id,
                TextureViewKind::ShaderResource,
                ViewKey::mip(mip),
            )?),
            Some(ShaderResourceBinding::Buffer(id)) => {
                Some(self.shared.buffer_view(id, TextureViewKind::ShaderResource)?)
            }
        };
        self.shader_resources[stage.index()].set(slot, view.map(view_object))?;
        self.hazards.sample(stage, slot, sampled);
        Ok(())
    }

    fn set_unordered_access(
        &mut self,
        slot: u32,
        resource: Option<UnorderedAccessBinding>,
    ) -> Result<(), GraphicsError> {
        Self::check_slot(ShaderStage::Compute, slot, MAX_UNORDERED_ACCESS)?;
        let view = match resource {
            None => None,
            Some(UnorderedAccessBinding::Texture(id, mip)) => Some(self.shared.texture_view(
                id,
                TextureViewKind::UnorderedAccess,
                ViewKey::mip(mip),
            )?),
            Some(UnorderedAccessBinding::Buffer(id)) => {
                Some(self.shared.buffer_view(id, TextureViewKind::UnorderedAccess)?)
            }
        };
        self.unordered_access.set(slot, view.map(view_object))
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.stencil_reference = reference;
        self.depth_stencil
            .set(Some((self.depth_stencil_state, reference)));
    }

    fn set_blend_factor(&mut self, factor: Color) {
        self.blend_factor = factor;
        self.blend.set(Some((self.blend_state, factor)));
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
        self.flush_graphics_state();
        let driver = &self.shared.driver;
        if instance_count > 1 {
            driver.draw_instanced(vertex_count, instance_count, first_vertex, first_instance)?;
        } else {
            driver.draw(vertex_count, first_vertex)?;
        }
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
        self.flush_graphics_state();
        let driver = &self.shared.driver;
        if instance_count > 1 {
            driver.draw_indexed_instanced(
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            )?;
        } else {
            driver.draw_indexed(index_count, first_index, base_vertex)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) -> Result<(), GraphicsError> {
        self.pass.require_idle("dispatch")?;
        if !self.pipeline.is_some_and(|pipeline| pipeline.is_compute()) {
            return Err(GraphicsError::invalid_state("dispatch requires a bound compute pipeline"));
        }
        if groups_x == 0 || groups_y == 0 || groups_z == 0 {
            return Ok(());
        }
        self.flush_compute_state();
        self.shared.driver.dispatch(groups_x, groups_y, groups_z)?;
        Ok(())
    }

    fn update_constant_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), GraphicsError> {
        let (raw, desc) = self.shared.buffer_object(buffer)?;
        if !desc.bind.contains(BindFlags::CONSTANT_BUFFER) {
            return Err(GraphicsError::InvalidState(format!(
                "buffer {buffer:?} was not created for use as a constant buffer"
            )));
        }
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
        let driver = &self.shared.driver;
        match desc.usage {
            MemoryUsage::Dynamic => {
                if let Err(err) = driver.map(raw, 0, MapMode::WriteDiscard) {
                    log::warn!("ImmediateContext: Skipping update of {buffer:?}, map failed: {err}");
                    return Ok(());
                }
                let written = driver.write_mapped(raw, 0, 0, data);
                driver.unmap(raw, 0);
                written?;
            }
            MemoryUsage::Default => driver.update_subresource(raw, 0, data)?,
            other => {
                return Err(GraphicsError::InvalidState(format!(
                    "buffer {buffer:?} lives in {other:?} memory and cannot be updated"
                )))
            }
        }
        Ok(())
    }

    fn copy_buffer(&mut self, destination: BufferId, source: BufferId) -> Result<(), GraphicsError> {
        self.pass.require_idle("copy_buffer")?;
        validation::validate_copy_pair("copy_buffer", destination, source)?;
        let (dst, dst_desc) = self.shared.buffer_object(destination)?;
        let (src, src_desc) = self.shared.buffer_object(source)?;
        if dst_desc.width != src_desc.width {
            return Err(GraphicsError::InvalidState(format!(
                "copy_buffer between {} and {} bytes",
                src_desc.width, dst_desc.width
            )));
        }
        self.shared.driver.copy_resource(dst, src)?;
        Ok(())
    }

    fn copy_texture(&mut self, destination: TextureId, source: TextureId) -> Result<(), GraphicsError> {
        self.pass.require_idle("copy_texture")?;
        validation::validate_copy_pair("copy_texture", destination, source)?;
        let (dst, dst_desc) = self.shared.texture_object(destination)?;
        let (src, src_desc) = self.shared.texture_object(source)?;
        if !dst_desc.same_layout(&src_desc) {
            return Err(GraphicsError::InvalidState(format!(
                "copy_texture between {source:?} and {destination:?} with different layouts"
            )));
        }
        self.shared.driver.copy_resource(dst, src)?;
        Ok(())
    }

    fn flush(&mut self, wait: bool) -> Result<(), GraphicsError> {
        self.pass.require_idle("flush")?;
        self.shared.driver.flush();
        if wait {
            self.shared.wait_idle()?;
        }
        self.shared.driver.clear_state();
        self.reset_bindings();
        Ok(())
    }
}
