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


//! The immediate-context software driver.

use super::gpu::{GpuState, Payload, SoftwareGpu};
use crate::graphics::native::{
    DriverError, DriverResult, ImmediateDriver, IndexBufferBinding, MapMode, MappedSubresource,
    MemoryUsage, NativeViewKind, ObjectLifetime, RawObject, ResourceDesc, SwapChainDesc,
    VertexBufferBinding, ViewDesc,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tessera_core::renderer::lifetime::ResourceState;
use tessera_core::renderer::{
    BlendState, Color, DepthStencilState, FeatureLevel, PrimitiveTopology, RasterizerState,
    SamplerDescriptor, ScissorRect, ShaderStage, TextureFormat, VertexAttribute, Viewport,
};

/// What the immediate context currently has bound.
#[derive(Debug, Default)]
struct ContextBindings {
    render_targets: Vec<RawObject>,
    depth_stencil: Option<RawObject>,
    shaders: [Option<RawObject>; 3],
    index_buffer: Option<IndexBufferBinding>,
}

/// State objects handed out so far, for deduplication.
#[derive(Default)]
struct StateObjectCache {
    rasterizer: Vec<(RasterizerState, RawObject)>,
    blend: Vec<(BlendState, RawObject)>,
    depth_stencil: Vec<(DepthStencilState, RawObject)>,
}

/// A software device with an immediate context. Every command executes when
/// it is issued.
pub struct SoftwareImmediateDriver {
    gpu: Arc<SoftwareGpu>,
    bindings: Mutex<ContextBindings>,
    state_objects: Mutex<StateObjectCache>,
}

impl SoftwareImmediateDriver {
    pub(crate) fn new(gpu: Arc<SoftwareGpu>) -> Self {
        Self {
            gpu,
            bindings: Mutex::new(ContextBindings::default()),
            state_objects: Mutex::new(StateObjectCache::default()),
        }
    }

    fn bindings(&self) -> MutexGuard<'_, ContextBindings> {
        self.bindings.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Returns the cached object for `key` with an extra reference, or creates one.
    fn dedupe<K: PartialEq + Copy>(
        &self,
        cache: &mut Vec<(K, RawObject)>,
        key: &K,
        payload: Payload,
    ) -> DriverResult<RawObject> {
        let mut state = self.gpu.lock();
        cache.retain(|(_, raw)| state.objects.contains_key(&raw.0));
        if let Some((_, raw)) = cache.iter().find(|(cached, _)| cached == key) {
            self.gpu.add_ref_locked(&mut state, *raw)?;
            return Ok(*raw);
        }
        let raw = self.gpu.insert_locked(&mut state, payload, Vec::new())?;
        cache.push((*key, raw));
        Ok(raw)
    }

    fn mapped_resource<'a>(
        &self,
        state: &'a mut GpuState,
        resource: RawObject,
        subresource: u32,
        offset: usize,
        len: usize,
    ) -> DriverResult<(&'a mut Vec<u8>, std::ops::Range<usize>)> {
        let object = state.resource_mut(resource)?;
        if object.map_count == 0 {
            return Err(self.gpu.invalid(format!("resource {} is not mapped", resource.0)));
        }
        let range = object.subresource_range(subresource)?;
        if offset + len > range.len() {
            return Err(self.gpu.invalid(format!(
                "access of {len} bytes at {offset} overruns a {}-byte mapping",
                range.len()
            )));
        }
        let start = range.start + offset;
        Ok((&mut object.memory, start..start + len))
    }

    fn shader_bound(&self, stage: ShaderStage) -> bool {
        self.bindings().shaders[stage.index()].is_some()
    }
}

impl ImmediateDriver for SoftwareImmediateDriver {
    fn lifetime(&self) -> Arc<dyn ObjectLifetime> {
        self.gpu.clone()
    }

    fn feature_level(&self) -> FeatureLevel {
        self.gpu.feature_level()
    }

    fn create_buffer(&self, desc: &ResourceDesc, initial_data: Option<&[u8]>) -> DriverResult<RawObject> {
        if !desc.is_buffer() {
            return Err(self.gpu.invalid("create_buffer with a texture description".into()));
        }
        if matches!(desc.usage, MemoryUsage::Upload | MemoryUsage::Readback) {
            return Err(DriverError::Unsupported(format!("{:?} memory", desc.usage)));
        }
        self.gpu.create_resource(desc, ResourceState::COMMON, initial_data)
    }

    fn create_texture(&self, desc: &ResourceDesc, initial_data: Option<&[u8]>) -> DriverResult<RawObject> {
        if desc.is_buffer() {
            return Err(self.gpu.invalid("create_texture with a buffer description".into()));
        }
        if matches!(desc.usage, MemoryUsage::Upload | MemoryUsage::Readback) {
            return Err(DriverError::Unsupported(format!("{:?} memory", desc.usage)));
        }
        self.gpu.create_resource(desc, ResourceState::COMMON, initial_data)
    }

    fn create_view(&self, resource: RawObject, desc: &ViewDesc) -> DriverResult<RawObject> {
        let mut state = self.gpu.lock();
        self.gpu.check_view(state.resource(resource)?, desc)?;
        self.gpu.add_ref_locked(&mut state, resource)?;
        let view = self
            .gpu
            .insert_locked(&mut state, Payload::View(*desc), vec![resource])?;
        self.gpu.count(|stats| stats.views_created += 1);
        Ok(view)
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> DriverResult<RawObject> {
        if desc.max_anisotropy > 16 {
            return Err(self.gpu.invalid(format!(
                "max anisotropy {} exceeds 16",
                desc.max_anisotropy
            )));
        }
        let sampler = self.gpu.insert(Payload::Sampler)?;
        self.gpu.count(|stats| stats.samplers_created += 1);
        Ok(sampler)
    }

    fn create_shader(&self, stage: ShaderStage, bytecode: &[u8]) -> DriverResult<RawObject> {
        if bytecode.is_empty() {
            return Err(self.gpu.invalid(format!("empty {stage:?} shader bytecode")));
        }
        self.gpu.insert(Payload::Shader(stage))
    }

    fn create_input_layout(
        &self,
        attributes: &[VertexAttribute],
        vertex_shader: &[u8],
    ) -> DriverResult<RawObject> {
        if vertex_shader.is_empty() {
            return Err(self.gpu.invalid("input layout without vertex shader bytecode".into()));
        }
        if let Some(attribute) = attributes.iter().find(|a| a.semantic.is_empty()) {
            return Err(self.gpu.invalid(format!(
                "vertex attribute at offset {} has no semantic",
                attribute.offset
            )));
        }
        self.gpu.insert(Payload::InputLayout)
    }

    fn create_rasterizer_state(&self, desc: &RasterizerState) -> DriverResult<RawObject> {
        let mut cache = self.state_objects.lock().unwrap_or_else(|p| p.into_inner());
        self.dedupe(&mut cache.rasterizer, desc, Payload::RasterizerState)
    }

    fn create_blend_state(&self, desc: &BlendState) -> DriverResult<RawObject> {
        let mut cache = self.state_objects.lock().unwrap_or_else(|p| p.into_inner());
        self.dedupe(&mut cache.blend, desc, Payload::BlendState)
    }

    fn create_depth_stencil_state(&self, desc: &DepthStencilState) -> DriverResult<RawObject> {
        let mut cache = self.state_objects.lock().unwrap_or_else(|p| p.into_inner());
        self.dedupe(&mut cache.depth_stencil, desc, Payload::DepthStencilState)
    }

    fn create_event_query(&self) -> DriverResult<RawObject> {
        self.gpu.insert(Payload::Query { signaled: false })
    }

    fn create_swapchain(&self, desc: &SwapChainDesc) -> DriverResult<RawObject> {
        self.gpu.create_swapchain(desc, ResourceState::COMMON)
    }

    fn swapchain_buffer(&self, swapchain: RawObject, index: u32) -> DriverResult<RawObject> {
        self.gpu.swapchain_buffer(swapchain, index)
    }

    fn current_back_buffer_index(&self, swapchain: RawObject) -> DriverResult<u32> {
        self.gpu.current_back_buffer_index(swapchain)
    }

    fn resize_swapchain(&self, swapchain: RawObject, width: u32, height: u32) -> DriverResult<()> {
        self.gpu.resize_swapchain(swapchain, width, height)
    }

    fn present(&self, swapchain: RawObject, _sync_interval: u32) -> DriverResult<()> {
        self.gpu.present(swapchain, false)
    }

    fn om_set_render_targets(&self, render_targets: &[RawObject], depth_stencil: Option<RawObject>) {
        let mut bindings = self.bindings();
        bindings.render_targets = render_targets.to_vec();
        bindings.depth_stencil = depth_stencil;
        self.gpu.count(|stats| stats.render_target_binds += 1);
    }

    fn clear_render_target_view(&self, view: RawObject, color: Color) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let (resource, desc) = state.view(view)?;
        if desc.kind != NativeViewKind::RenderTarget {
            return Err(self.gpu.invalid(format!("view {} is not a render target view", view.0)));
        }
        state.clear_color(resource, &desc, color)?;
        self.gpu.count(|stats| stats.clears += 1);
        Ok(())
    }

    fn clear_depth_stencil_view(
        &self,
        view: RawObject,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let (resource, desc) = state.view(view)?;
        if desc.kind != NativeViewKind::DepthStencil {
            return Err(self.gpu.invalid(format!("view {} is not a depth-stencil view", view.0)));
        }
        state.clear_depth_stencil(resource, &desc, depth, stencil)?;
        self.gpu.count(|stats| stats.clears += 1);
        Ok(())
    }

    fn discard_view(&self, _view: RawObject) {
        self.gpu.count(|stats| stats.discards += 1);
    }

    fn rs_set_viewports(&self, _viewports: &[Viewport]) {
        self.gpu.count(|stats| stats.viewport_sets += 1);
    }

    fn rs_set_scissor_rects(&self, _rects: &[ScissorRect]) {
        self.gpu.count(|stats| stats.scissor_sets += 1);
    }

    fn rs_set_state(&self, _state: Option<RawObject>) {
        self.gpu.count(|stats| stats.rasterizer_binds += 1);
    }

    fn om_set_blend_state(&self, _state: Option<RawObject>, blend_factor: Color) {
        self.gpu.count(|stats| {
            stats.blend_binds += 1;
            stats.last_blend_factor = blend_factor;
        });
    }

    fn om_set_depth_stencil_state(&self, _state: Option<RawObject>, stencil_ref: u32) {
        self.gpu.count(|stats| {
            stats.depth_stencil_binds += 1;
            stats.last_stencil_reference = stencil_ref;
        });
    }

    fn ia_set_input_layout(&self, _layout: Option<RawObject>) {
        self.gpu.count(|stats| stats.input_layout_binds += 1);
    }

    fn ia_set_primitive_topology(&self, _topology: PrimitiveTopology) {
        self.gpu.count(|stats| stats.topology_binds += 1);
    }

    fn ia_set_vertex_buffers(&self, _start_slot: u32, _buffers: &[VertexBufferBinding]) {
        self.gpu.count(|stats| stats.vertex_buffer_binds += 1);
    }

    fn ia_set_index_buffer(&self, binding: Option<IndexBufferBinding>) {
        self.bindings().index_buffer = binding;
        self.gpu.count(|stats| stats.index_buffer_binds += 1);
    }

    fn set_shader(&self, stage: ShaderStage, shader: Option<RawObject>) {
        if let Some(raw) = shader {
            let matches = matches!(
                self.gpu.lock().object(raw).map(|object| &object.payload),
                Ok(Payload::Shader(shader_stage)) if *shader_stage == stage
            );
            if !matches {
                // The debug layer reports this; the stage is left unbound.
                let _ = self.gpu.validate(false, || {
                    format!("object {} is not a {stage:?} shader", raw.0)
                });
                self.bindings().shaders[stage.index()] = None;
                return;
            }
        }
        self.bindings().shaders[stage.index()] = shader;
        self.gpu.count(|stats| stats.pipeline_binds += 1);
    }

    fn set_constant_buffers(&self, _stage: ShaderStage, _start_slot: u32, _buffers: &[Option<RawObject>]) {
        self.gpu.count(|stats| stats.constant_buffer_binds += 1);
    }

    fn set_samplers(&self, _stage: ShaderStage, _start_slot: u32, _samplers: &[Option<RawObject>]) {
        self.gpu.count(|stats| stats.sampler_binds += 1);
    }

    fn set_shader_resources(&self, _stage: ShaderStage, _start_slot: u32, _views: &[Option<RawObject>]) {
        self.gpu.count(|stats| stats.shader_resource_binds += 1);
    }

    fn cs_set_unordered_access_views(&self, _start_slot: u32, _views: &[Option<RawObject>]) {
        self.gpu.count(|stats| stats.unordered_access_binds += 1);
    }

    fn draw(&self, _vertex_count: u32, _start_vertex: u32) -> DriverResult<()> {
        self.gpu.validate(self.shader_bound(ShaderStage::Vertex), || {
            "draw without a vertex shader".to_string()
        })?;
        self.gpu.count(|stats| stats.draws += 1);
        Ok(())
    }

    fn draw_instanced(
        &self,
        _vertex_count: u32,
        _instance_count: u32,
        _start_vertex: u32,
        _start_instance: u32,
    ) -> DriverResult<()> {
        self.gpu.validate(self.shader_bound(ShaderStage::Vertex), || {
            "draw without a vertex shader".to_string()
        })?;
        self.gpu.count(|stats| stats.draws_instanced += 1);
        Ok(())
    }

    fn draw_indexed(&self, _index_count: u32, _start_index: u32, _base_vertex: i32) -> DriverResult<()> {
        self.gpu.validate(self.bindings().index_buffer.is_some(), || {
            "indexed draw without an index buffer".to_string()
        })?;
        self.gpu.count(|stats| stats.draws_indexed += 1);
        Ok(())
    }

    fn draw_indexed_instanced(
        &self,
        _index_count: u32,
        _instance_count: u32,
        _start_index: u32,
        _base_vertex: i32,
        _start_instance: u32,
    ) -> DriverResult<()> {
        self.gpu.validate(self.bindings().index_buffer.is_some(), || {
            "indexed draw without an index buffer".to_string()
        })?;
        self.gpu.count(|stats| stats.draws_indexed_instanced += 1);
        Ok(())
    }

    fn dispatch(&self, _x: u32, _y: u32, _z: u32) -> DriverResult<()> {
        self.gpu.validate(self.shader_bound(ShaderStage::Compute), || {
            "dispatch without a compute shader".to_string()
        })?;
        self.gpu.count(|stats| stats.dispatches += 1);
        Ok(())
    }

    fn map(&self, resource: RawObject, subresource: u32, mode: MapMode) -> DriverResult<MappedSubresource> {
        let mut state = self.gpu.lock();
        let object = state.resource_mut(resource)?;
        let legal = match mode {
            MapMode::WriteDiscard => object.desc.usage == MemoryUsage::Dynamic,
            MapMode::Read | MapMode::Write => object.desc.usage == MemoryUsage::Staging,
        };
        if !legal {
            return Err(self.gpu.invalid(format!(
                "{mode:?} map of a {:?} resource",
                object.desc.usage
            )));
        }
        if object.map_count > 0 {
            return Err(self.gpu.invalid(format!("resource {} is already mapped", resource.0)));
        }
        let range = object.subresource_range(subresource)?;
        if mode == MapMode::WriteDiscard {
            object.memory[range.clone()].fill(0);
        }
        object.map_count = 1;
        let mip = subresource % object.desc.mip_levels.max(1);
        let row_pitch = object.desc.row_pitch(mip);
        let (_, height, _) = object.desc.mip_extent(mip);
        self.gpu.count(|stats| stats.maps += 1);
        Ok(MappedSubresource {
            row_pitch,
            depth_pitch: row_pitch * height,
            len: range.len(),
        })
    }

    fn write_mapped(&self, resource: RawObject, subresource: u32, offset: usize, data: &[u8]) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let (memory, range) =
            self.mapped_resource(&mut state, resource, subresource, offset, data.len())?;
        memory[range].copy_from_slice(data);
        Ok(())
    }

    fn read_mapped(&self, resource: RawObject, subresource: u32, offset: usize, out: &mut [u8]) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let (memory, range) =
            self.mapped_resource(&mut state, resource, subresource, offset, out.len())?;
        out.copy_from_slice(&memory[range]);
        Ok(())
    }

    fn unmap(&self, resource: RawObject, _subresource: u32) {
        let mut state = self.gpu.lock();
        match state.resource_mut(resource) {
            Ok(object) if object.map_count > 0 => object.map_count -= 1,
            _ => log::warn!("unmap of resource {} that is not mapped", resource.0),
        }
    }

    fn update_subresource(&self, resource: RawObject, subresource: u32, data: &[u8]) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let usage = state.resource(resource)?.desc.usage;
        if usage != MemoryUsage::Default {
            return Err(self.gpu.invalid(format!("update_subresource on {usage:?} memory")));
        }
        state.write_subresource(resource, subresource, data)?;
        self.gpu.count(|stats| stats.subresource_updates += 1);
        Ok(())
    }

    fn copy_resource(&self, destination: RawObject, source: RawObject) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        self.gpu.validate(state.resource(destination)?.map_count == 0, || {
            format!("copy into mapped resource {}", destination.0)
        })?;
        state.copy_resource(destination, source)?;
        self.gpu.count(|stats| stats.copies += 1);
        Ok(())
    }

    fn copy_subresource_region(
        &self,
        destination: RawObject,
        destination_subresource: u32,
        source: RawObject,
        source_subresource: u32,
    ) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        self.gpu.validate(state.resource(destination)?.map_count == 0, || {
            format!("copy into mapped resource {}", destination.0)
        })?;
        state.copy_subresource(destination, destination_subresource, source, source_subresource)?;
        self.gpu.count(|stats| stats.copies += 1);
        Ok(())
    }

    fn resolve_subresource(
        &self,
        destination: RawObject,
        destination_subresource: u32,
        source: RawObject,
        source_subresource: u32,
        format: TextureFormat,
    ) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let (src, dst) = (state.resource(source)?.desc, state.resource(destination)?.desc);
        self.gpu.validate(src.sample_count > 1 && dst.sample_count == 1, || {
            format!(
                "resolve from {} samples into {} samples",
                src.sample_count, dst.sample_count
            )
        })?;
        self.gpu.validate(src.format == format && dst.format == format, || {
            format!("resolve format {format:?} does not match the resources")
        })?;
        state.copy_subresource(destination, destination_subresource, source, source_subresource)?;
        self.gpu.count(|stats| stats.resolves += 1);
        Ok(())
    }

    fn end_query(&self, query: RawObject) {
        let mut state = self.gpu.lock();
        if let Ok(object) = state.object_mut(query) {
            if let Payload::Query { signaled } = &mut object.payload {
                *signaled = true;
            }
        }
    }

    fn query_data(&self, query: RawObject) -> DriverResult<bool> {
        let state = self.gpu.lock();
        match &state.object(query)?.payload {
            Payload::Query { signaled } => Ok(*signaled),
            other => Err(self.gpu.invalid(format!(
                "object {} is a {}, not a query",
                query.0,
                other.type_name()
            ))),
        }
    }

    fn flush(&self) {}

    fn clear_state(&self) {
        *self.bindings() = ContextBindings::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::native::BindFlags;
    use crate::graphics::software::SoftwareAdapter;

    #[test]
    fn identical_state_objects_are_shared() {
        let adapter = SoftwareAdapter::new("test");
        let driver = adapter.open_immediate(true);
        let first = driver.create_blend_state(&BlendState::default()).unwrap();
        let second = driver.create_blend_state(&BlendState::default()).unwrap();
        let third = driver.create_blend_state(&BlendState::alpha_blending()).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, third);

        let lifetime = driver.lifetime();
        lifetime.release(first);
        lifetime.release(second);
        let recreated = driver.create_blend_state(&BlendState::default()).unwrap();
        assert_ne!(recreated, first);
    }

    #[test]
    fn dynamic_buffers_only_map_with_discard() {
        let adapter = SoftwareAdapter::new("test");
        let driver = adapter.open_immediate(true);
        let desc = ResourceDesc::buffer(64, BindFlags::CONSTANT_BUFFER, MemoryUsage::Dynamic, 0);
        let buffer = driver.create_buffer(&desc, None).unwrap();
        assert!(driver.map(buffer, 0, MapMode::Read).is_err());
        let mapped = driver.map(buffer, 0, MapMode::WriteDiscard).unwrap();
        assert_eq!(mapped.len, 64);
        driver.write_mapped(buffer, 0, 0, &[1, 2, 3, 4]).unwrap();
        driver.unmap(buffer, 0);
        assert!(driver.write_mapped(buffer, 0, 0, &[1]).is_err());
        assert_eq!(adapter.validation_messages().len(), 2);
    }

    #[test]
    fn draws_need_a_vertex_shader_under_validation() {
        let adapter = SoftwareAdapter::new("test");
        let driver = adapter.open_immediate(true);
        assert!(driver.draw(3, 0).is_err());
        let shader = driver.create_shader(ShaderStage::Vertex, &[0x44, 0x58]).unwrap();
        driver.set_shader(ShaderStage::Vertex, Some(shader));
        driver.draw(3, 0).unwrap();
        assert_eq!(adapter.stats().draws, 1);

        let unchecked = adapter.open_immediate(false);
        unchecked.draw(3, 0).unwrap();
    }
}
