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


use super::context::ImmediateContext;
use super::resources::*;
use crate::graphics::conversions::{buffer_resource_desc, immediate_memory_usage, texture_view_desc};
use crate::graphics::lock;
use crate::graphics::native::{
    DriverError, ImmediateDriver, MapMode, MemoryUsage, NativeHandle, NativeViewKind,
    ObjectLifetime, RawObject, ResourceDesc, SwapChainDesc, ViewDesc,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tessera_core::renderer::lifetime::DeferredDestructionQueue;
use tessera_core::renderer::validation::{self, describe};
use tessera_core::renderer::*;

/// The state shared between an [`ImmediateDevice`] and its command context.
pub(crate) struct ImmediateShared {
    pub(crate) driver: Arc<dyn ImmediateDriver>,
    lifetime: Arc<dyn ObjectLifetime>,
    buffers: Mutex<HashMap<BufferId, ImmediateBufferEntry>>,
    textures: Mutex<HashMap<TextureId, ImmediateTextureEntry>>,
    samplers: Mutex<HashMap<SamplerId, ImmediateSamplerEntry>>,
    pipelines: Mutex<HashMap<PipelineId, ImmediatePipelineEntry>>,
    swapchains: Mutex<HashMap<SwapChainId, ImmediateSwapChainEntry>>,

    next_buffer_id: AtomicUsize,
    next_texture_id: AtomicUsize,
    next_sampler_id: AtomicUsize,
    next_pipeline_id: AtomicUsize,
    next_swapchain_id: AtomicUsize,

    /// Native objects released by `destroy_*`, held until the GPU is past them.
    deferred: DeferredDestructionQueue<NativeHandle>,
    idle_query: NativeHandle,
}

impl ImmediateShared {
    fn new(driver: Arc<dyn ImmediateDriver>) -> Result<Self, GraphicsError> {
        let lifetime = driver.lifetime();
        let idle_query = driver
            .create_event_query()
            .map_err(|e| e.into_creation_error("idle query"))?;
        Ok(Self {
            idle_query: NativeHandle::from_raw(idle_query, lifetime.clone()),
            driver,
            lifetime,
            buffers: Mutex::new(HashMap::new()),
            textures: Mutex::new(HashMap::new()),
            samplers: Mutex::new(HashMap::new()),
            pipelines: Mutex::new(HashMap::new()),
            swapchains: Mutex::new(HashMap::new()),
            next_buffer_id: AtomicUsize::new(0),
            next_texture_id: AtomicUsize::new(0),
            next_sampler_id: AtomicUsize::new(0),
            next_pipeline_id: AtomicUsize::new(0),
            next_swapchain_id: AtomicUsize::new(0),
            deferred: DeferredDestructionQueue::new(MAX_FRAMES_IN_FLIGHT),
        })
    }

    pub(crate) fn wrap(&self, raw: RawObject) -> NativeHandle {
        NativeHandle::from_raw(raw, self.lifetime.clone())
    }

    fn generate_buffer_id(&self) -> BufferId {
        BufferId(self.next_buffer_id.fetch_add(1, Ordering::Relaxed))
    }

    fn generate_texture_id(&self) -> TextureId {
        TextureId(self.next_texture_id.fetch_add(1, Ordering::Relaxed))
    }

    fn generate_sampler_id(&self) -> SamplerId {
        SamplerId(self.next_sampler_id.fetch_add(1, Ordering::Relaxed))
    }

    fn generate_pipeline_id(&self) -> PipelineId {
        PipelineId(self.next_pipeline_id.fetch_add(1, Ordering::Relaxed))
    }

    fn generate_swapchain_id(&self) -> SwapChainId {
        SwapChainId(self.next_swapchain_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn buffer_object(&self, id: BufferId) -> Result<(RawObject, ResourceDesc), GraphicsError> {
        lock(&self.buffers)
            .get(&id)
            .map(|entry| (entry.handle.raw(), entry.desc))
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown buffer {id:?}")))
    }

    pub(crate) fn texture_object(&self, id: TextureId) -> Result<(RawObject, ResourceDesc), GraphicsError> {
        lock(&self.textures)
            .get(&id)
            .map(|entry| (entry.handle.raw(), entry.desc))
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown texture {id:?}")))
    }

    pub(crate) fn sampler_object(&self, id: SamplerId) -> Result<RawObject, GraphicsError> {
        lock(&self.samplers)
            .get(&id)
            .map(|entry| entry.handle.raw())
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown sampler {id:?}")))
    }

    pub(crate) fn pipeline_binding(&self, id: PipelineId) -> Result<PipelineBinding, GraphicsError> {
        lock(&self.pipelines)
            .get(&id)
            .map(ImmediatePipelineEntry::binding)
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown pipeline {id:?}")))
    }

    /// Returns the cached view of `texture`, creating it on first use.
    pub(crate) fn texture_view(
        &self,
        texture: TextureId,
        kind: TextureViewKind,
        key: ViewKey,
    ) -> Result<ViewHandle, GraphicsError> {
        let textures = lock(&self.textures);
        let entry = textures
            .get(&texture)
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown texture {texture:?}")))?;
        entry.views.get_or_create(kind, key, || {
            let view_desc = texture_view_desc(&entry.desc, kind, key)?;
            let raw = self
                .driver
                .create_view(entry.handle.raw(), &view_desc)
                .map_err(|e| e.into_creation_error(format!("{kind:?} view of {texture:?}")))?;
            log::debug!("ImmediateDevice: Created {kind:?} view {key:?} of {texture:?}");
            Ok(CachedNativeView { handle: self.wrap(raw) })
        })
    }

    /// Returns the cached whole-buffer view of `buffer`.
    pub(crate) fn buffer_view(
        &self,
        buffer: BufferId,
        kind: TextureViewKind,
    ) -> Result<ViewHandle, GraphicsError> {
        let buffers = lock(&self.buffers);
        let entry = buffers
            .get(&buffer)
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown buffer {buffer:?}")))?;
        let native_kind = match kind {
            TextureViewKind::UnorderedAccess => NativeViewKind::UnorderedAccess,
            _ => NativeViewKind::ShaderResource,
        };
        entry.views.get_or_create(kind, ViewKey::whole(), || {
            let view_desc = ViewDesc::whole_buffer(native_kind, &entry.desc);
            let raw = self
                .driver
                .create_view(entry.handle.raw(), &view_desc)
                .map_err(|e| e.into_creation_error(format!("{kind:?} view of {buffer:?}")))?;
            Ok(CachedNativeView { handle: self.wrap(raw) })
        })
    }

    fn defer(&self, handles: impl IntoIterator<Item = NativeHandle>) {
        for handle in handles {
            // During teardown the queue hands the handle straight back.
            drop(self.deferred.defer(handle));
        }
    }

    pub(crate) fn retire(&self, frame: u64) {
        let retired = self.deferred.process(frame);
        if !retired.is_empty() {
            log::debug!("ImmediateDevice: Released {} deferred objects", retired.len());
        }
    }

    /// Blocks until every command issued so far has executed.
    pub(crate) fn wait_idle(&self) -> Result<(), GraphicsError> {
        self.driver.flush();
        self.driver.end_query(self.idle_query.raw());
        while !self.driver.query_data(self.idle_query.raw())? {
            std::thread::yield_now();
        }
        Ok(())
    }

    /// Registers the current back buffers of a swapchain as textures.
    fn register_back_buffers(
        &self,
        swapchain: SwapChainId,
        raw: RawObject,
        desc: &SwapChainDesc,
    ) -> Result<Vec<TextureId>, GraphicsError> {
        let mut ids = Vec::with_capacity(desc.buffer_count as usize);
        let mut textures = lock(&self.textures);
        for index in 0..desc.buffer_count {
            let buffer = match self.driver.swapchain_buffer(raw, index) {
                Ok(buffer) => buffer,
                Err(err) => {
                    for id in ids {
                        textures.remove(&id);
                    }
                    return Err(err.into_creation_error(format!("back buffer {index}")));
                }
            };
            let id = self.generate_texture_id();
            textures.insert(
                id,
                ImmediateTextureEntry {
                    views: Default::default(),
                    handle: self.wrap(buffer),
                    desc: ResourceDesc::back_buffer(desc),
                    label: None,
                    swapchain: Some(swapchain),
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    fn remove_textures(&self, ids: &[TextureId]) -> Vec<NativeHandle> {
        let mut handles = Vec::new();
        let mut textures = lock(&self.textures);
        for id in ids {
            if let Some(entry) = textures.remove(id) {
                entry.release_into(&mut handles);
            }
        }
        handles
    }

    /// Reads one subresource back through a staging copy. The caller has
    /// already checked that `source` is not multisampled.
    fn read_subresource(
        &self,
        source: RawObject,
        desc: &ResourceDesc,
        mip: u32,
        slice: u32,
    ) -> Result<Vec<u8>, GraphicsError> {
        let staging_desc = desc.staging_copy(MemoryUsage::Staging);
        let created = if desc.is_buffer() {
            self.driver.create_buffer(&staging_desc, None)
        } else {
            self.driver.create_texture(&staging_desc, None)
        };
        let staging = created.map_err(|e| e.into_creation_error("readback staging resource"))?;
        let staging = self.wrap(staging);

        let subresource = desc.subresource(mip, slice);
        if desc.is_buffer() {
            self.driver.copy_resource(staging.raw(), source)?;
        } else {
            self.driver
                .copy_subresource_region(staging.raw(), subresource, source, subresource)?;
        }

        let mapped = self.driver.map(staging.raw(), subresource, MapMode::Read)?;
        let mut data = vec![0u8; desc.subresource_size(mip).min(mapped.len)];
        let read = self.driver.read_mapped(staging.raw(), subresource, 0, &mut data);
        self.driver.unmap(staging.raw(), subresource);
        read?;
        Ok(data)
    }

    fn clear_tables(&self) {
        lock(&self.pipelines).clear();
        lock(&self.samplers).clear();
        lock(&self.swapchains).clear();
        lock(&self.textures).clear();
        lock(&self.buffers).clear();
    }
}

/// A [`GraphicsDevice`] on top of an [`ImmediateDriver`].
///
/// Every resource lives in a table keyed by its opaque id. Destroyed resources
/// are pushed onto a deferred destruction queue and released once
/// [`MAX_FRAMES_IN_FLIGHT`] frames have completed.
pub struct ImmediateDevice {
    shared: Arc<ImmediateShared>,
    context: ImmediateContext,
    adapter_info: GraphicsAdapterInfo,
    label: Option<String>,
    /// One event query per frame slot, signaled when the slot's frame completes.
    frame_queries: Vec<NativeHandle>,
    frame_issued: Vec<bool>,
    frame_count: u64,
}

impl ImmediateDevice {
    /// Opens a device on `driver`. Every object acquired before a failure is
    /// released again.
    pub fn new(
        driver: Arc<dyn ImmediateDriver>,
        adapter_info: GraphicsAdapterInfo,
        descriptor: &DeviceDescriptor,
    ) -> Result<Self, GraphicsError> {
        let shared = Arc::new(ImmediateShared::new(driver)?);
        let frame_queries = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|slot| {
                shared
                    .driver
                    .create_event_query()
                    .map(|raw| shared.wrap(raw))
                    .map_err(|e| e.into_creation_error(format!("frame query {slot}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        log::info!(
            "ImmediateDevice: Opened '{}' on adapter '{}' ({:?})",
            descriptor.label.as_deref().unwrap_or("device"),
            adapter_info.name,
            adapter_info.feature_level
        );
        Ok(Self {
            context: ImmediateContext::new(shared.clone()),
            shared,
            adapter_info,
            label: descriptor.label.as_deref().map(str::to_string),
            frame_queries,
            frame_issued: vec![false; MAX_FRAMES_IN_FLIGHT],
            frame_count: 0,
        })
    }

    fn frame_slot(&self) -> usize {
        (self.frame_count % MAX_FRAMES_IN_FLIGHT as u64) as usize
    }

    fn present_all(&self) -> Result<(), GraphicsError> {
        let swapchains: Vec<_> = lock(&self.shared.swapchains)
            .values()
            .map(|entry| (entry.handle.raw(), entry.desc.present_mode.sync_interval()))
            .collect();
        for (raw, sync_interval) in swapchains {
            if let Err(err) = self.shared.driver.present(raw, sync_interval) {
                if let DriverError::DeviceRemoved(reason) = &err {
                    log::error!("ImmediateDevice: Device removed during present: {reason}");
                }
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDescriptor,
    ) -> Result<ImmediatePipelineEntry, GraphicsError> {
        let what = describe("render pipeline", desc.label.as_deref());
        let driver = &self.shared.driver;
        let fail = |err: DriverError| err.into_creation_error(what.clone());

        // 1. Shaders.
        let vertex_shader = self
            .shared
            .wrap(driver.create_shader(ShaderStage::Vertex, &desc.vertex_shader.code).map_err(fail)?);
        let fragment_shader = match &desc.fragment_shader {
            Some(shader) => Some(
                self.shared
                    .wrap(driver.create_shader(ShaderStage::Fragment, &shader.code).map_err(fail)?),
            ),
            None => None,
        };

        // 2. Input layout, validated against the vertex shader signature.
        let input_layout = if desc.vertex_attributes.is_empty() {
            None
        } else {
            let raw = driver
                .create_input_layout(&desc.vertex_attributes, &desc.vertex_shader.code)
                .map_err(fail)?;
            Some(self.shared.wrap(raw))
        };

        // 3. Fixed-function state objects. The driver hands back the same
        //    object for identical descriptions.
        let rasterizer = self
            .shared
            .wrap(driver.create_rasterizer_state(&desc.rasterizer).map_err(fail)?);
        let blend = self.shared.wrap(driver.create_blend_state(&desc.blend).map_err(fail)?);
        let depth_stencil = self
            .shared
            .wrap(driver.create_depth_stencil_state(&desc.depth_stencil).map_err(fail)?);

        Ok(ImmediatePipelineEntry {
            vertex_shader: Some(vertex_shader),
            fragment_shader,
            compute_shader: None,
            input_layout,
            rasterizer: Some(rasterizer),
            blend: Some(blend),
            depth_stencil: Some(depth_stencil),
            topology: desc.topology,
            label: desc.label.as_deref().map(str::to_string),
        })
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<ImmediatePipelineEntry, GraphicsError> {
        let raw = self
            .shared
            .driver
            .create_shader(ShaderStage::Compute, &desc.compute_shader.code)
            .map_err(|e| e.into_creation_error(describe("compute pipeline", desc.label.as_deref())))?;
        Ok(ImmediatePipelineEntry {
            vertex_shader: None,
            fragment_shader: None,
            compute_shader: Some(self.shared.wrap(raw)),
            input_layout: None,
            rasterizer: None,
            blend: None,
            depth_stencil: None,
            topology: PrimitiveTopology::default(),
            label: desc.label.as_deref().map(str::to_string),
        })
    }

    fn insert_buffer(
        &self,
        descriptor: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> Result<BufferId, GraphicsError> {
        validation::validate_buffer(descriptor)?;
        let what = describe("buffer", descriptor.label.as_deref());
        if let Some(data) = data {
            if data.len() as u64 > descriptor.size {
                return Err(GraphicsError::creation_failed(
                    what,
                    format!("{} bytes of initial data exceed the size of {}", data.len(), descriptor.size),
                ));
            }
        }
        let desc = buffer_resource_desc(descriptor, immediate_memory_usage(descriptor.cpu_access));
        let raw = self
            .shared
            .driver
            .create_buffer(&desc, data)
            .map_err(|e| e.into_creation_error(what))?;
        let handle = self.shared.wrap(raw);
        if let Some(label) = descriptor.label.as_deref() {
            handle.set_name(label);
        }

        let id = self.shared.generate_buffer_id();
        lock(&self.shared.buffers).insert(
            id,
            ImmediateBufferEntry {
                views: Default::default(),
                handle,
                desc,
                label: descriptor.label.as_deref().map(str::to_string),
            },
        );
        log::debug!(
            "ImmediateDevice: Created buffer {id:?} ({} bytes, {:?})",
            descriptor.size,
            desc.usage
        );
        Ok(id)
    }

    fn insert_texture(
        &self,
        descriptor: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> Result<TextureId, GraphicsError> {
        validation::validate_texture(descriptor, SampleCount::X8)?;
        if let Some(data) = data {
            validation::validate_texture_data(descriptor, data, true)?;
        }
        let desc = ResourceDesc::texture(descriptor, immediate_memory_usage(descriptor.cpu_access));
        let raw = self
            .shared
            .driver
            .create_texture(&desc, data)
            .map_err(|e| e.into_creation_error(describe("texture", descriptor.label.as_deref())))?;
        let handle = self.shared.wrap(raw);
        if let Some(label) = descriptor.label.as_deref() {
            handle.set_name(label);
        }

        let id = self.shared.generate_texture_id();
        lock(&self.shared.textures).insert(
            id,
            ImmediateTextureEntry {
                views: Default::default(),
                handle,
                desc,
                label: descriptor.label.as_deref().map(str::to_string),
                swapchain: None,
            },
        );
        log::debug!(
            "ImmediateDevice: Created texture {id:?} ({}x{} {:?})",
            descriptor.width,
            descriptor.height,
            descriptor.format
        );
        Ok(id)
    }
}

impl GraphicsDevice for ImmediateDevice {
    fn backend_type(&self) -> GraphicsBackendType {
        GraphicsBackendType::Immediate
    }

    fn adapter_info(&self) -> &GraphicsAdapterInfo {
        &self.adapter_info
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, GraphicsError> {
        self.insert_buffer(descriptor, None)
    }

    fn create_buffer_with_data(
        &mut self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, GraphicsError> {
        self.insert_buffer(descriptor, Some(data))
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), GraphicsError> {
        let entry = lock(&self.shared.buffers)
            .remove(&id)
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown buffer {id:?}")))?;
        log::debug!(
            "ImmediateDevice: Destroyed buffer with ID: {id:?} ({})",
            entry.label.as_deref().unwrap_or("unlabeled")
        );
        let views = entry.views.drain().into_iter().map(|view| view.handle);
        self.shared.defer(views.chain(std::iter::once(entry.handle)));
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, GraphicsError> {
        self.insert_texture(descriptor, None)
    }

    fn create_texture_with_data(
        &mut self,
        descriptor: &TextureDescriptor,
        data: &[u8],
    ) -> Result<TextureId, GraphicsError> {
        self.insert_texture(descriptor, Some(data))
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), GraphicsError> {
        let entry = {
            let mut textures = lock(&self.shared.textures);
            let owner = textures
                .get(&id)
                .ok_or_else(|| GraphicsError::InvalidState(format!("unknown texture {id:?}")))?
                .swapchain;
            if let Some(swapchain) = owner {
                return Err(GraphicsError::InvalidState(format!(
                    "texture {id:?} is a back buffer of {swapchain:?}"
                )));
            }
            textures.remove(&id)
        };
        let mut handles = Vec::new();
        if let Some(entry) = entry {
            log::debug!(
                "ImmediateDevice: Destroyed texture with ID: {id:?} ({})",
                entry.label.as_deref().unwrap_or("unlabeled")
            );
            entry.release_into(&mut handles);
        }
        self.shared.defer(handles);
        Ok(())
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, GraphicsError> {
        validation::validate_sampler(descriptor)?;
        let raw = self
            .shared
            .driver
            .create_sampler(descriptor)
            .map_err(|e| e.into_creation_error(describe("sampler", descriptor.label.as_deref())))?;
        let handle = self.shared.wrap(raw);
        if let Some(label) = descriptor.label.as_deref() {
            handle.set_name(label);
        }
        let id = self.shared.generate_sampler_id();
        lock(&self.shared.samplers).insert(
            id,
            ImmediateSamplerEntry {
                handle,
                label: descriptor.label.as_deref().map(str::to_string),
            },
        );
        log::debug!("ImmediateDevice: Created sampler {id:?}");
        Ok(id)
    }

    fn destroy_sampler(&self, id: SamplerId) -> Result<(), GraphicsError> {
        let entry = lock(&self.shared.samplers)
            .remove(&id)
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown sampler {id:?}")))?;
        log::debug!(
            "ImmediateDevice: Destroyed sampler with ID: {id:?} ({})",
            entry.label.as_deref().unwrap_or("unlabeled")
        );
        self.shared.defer([entry.handle]);
        Ok(())
    }

    fn create_pipeline(&self, descriptor: &PipelineDescriptor) -> Result<PipelineId, GraphicsError> {
        log::debug!(
            "ImmediateDevice: Creating {} pipeline {:?}",
            if descriptor.is_compute() { "compute" } else { "render" },
            descriptor.label()
        );
        validation::validate_pipeline(descriptor)?;
        let entry = match descriptor {
            PipelineDescriptor::Render(desc) => self.create_render_pipeline(desc)?,
            PipelineDescriptor::Compute(desc) => self.create_compute_pipeline(desc)?,
        };
        if let Some(label) = descriptor.label() {
            entry.vertex_shader.iter().chain(&entry.compute_shader).for_each(|h| h.set_name(label));
        }
        let id = self.shared.generate_pipeline_id();
        lock(&self.shared.pipelines).insert(id, entry);
        Ok(id)
    }

    fn destroy_pipeline(&self, id: PipelineId) -> Result<(), GraphicsError> {
        let entry = lock(&self.shared.pipelines)
            .remove(&id)
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown pipeline {id:?}")))?;
        log::debug!(
            "ImmediateDevice: Destroyed pipeline with ID: {id:?} ({})",
            entry.label.as_deref().unwrap_or("unlabeled")
        );
        self.shared.defer(entry.into_handles());
        Ok(())
    }

    fn create_swapchain(&self, descriptor: &SwapChainDescriptor) -> Result<SwapChainId, GraphicsError> {
        validation::validate_swapchain(descriptor)?;
        let desc = SwapChainDesc {
            surface: descriptor.surface,
            width: descriptor.width,
            height: descriptor.height,
            format: descriptor.format,
            buffer_count: descriptor.buffer_count,
            present_mode: descriptor.present_mode,
        };
        let raw = self
            .shared
            .driver
            .create_swapchain(&desc)
            .map_err(|e| e.into_creation_error(describe("swapchain", descriptor.label.as_deref())))?;
        let handle = self.shared.wrap(raw);

        let id = self.shared.generate_swapchain_id();
        let back_buffers = self.shared.register_back_buffers(id, raw, &desc)?;
        lock(&self.shared.swapchains).insert(
            id,
            ImmediateSwapChainEntry {
                handle,
                desc,
                back_buffers,
                label: descriptor.label.as_deref().map(str::to_string),
            },
        );
        log::info!(
            "ImmediateDevice: Created swapchain {id:?} ({}x{} {:?}, {} buffers)",
            desc.width,
            desc.height,
            desc.format,
            desc.buffer_count
        );
        Ok(id)
    }

    fn destroy_swapchain(&self, id: SwapChainId) -> Result<(), GraphicsError> {
        let entry = lock(&self.shared.swapchains)
            .remove(&id)
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown swapchain {id:?}")))?;
        log::debug!(
            "ImmediateDevice: Destroyed swapchain with ID: {id:?} ({})",
            entry.label.as_deref().unwrap_or("unlabeled")
        );
        let mut handles = self.shared.remove_textures(&entry.back_buffers);
        handles.push(entry.handle);
        self.shared.defer(handles);
        Ok(())
    }

    fn swapchain_back_buffer(&self, id: SwapChainId) -> Result<TextureId, GraphicsError> {
        let swapchains = lock(&self.shared.swapchains);
        let entry = swapchains
            .get(&id)
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown swapchain {id:?}")))?;
        let index = self.shared.driver.current_back_buffer_index(entry.handle.raw())?;
        entry
            .back_buffers
            .get(index as usize)
            .copied()
            .ok_or_else(|| GraphicsError::InvalidState(format!("back buffer {index} of {id:?} is missing")))
    }

    fn resize_swapchain(&mut self, id: SwapChainId, width: u32, height: u32) -> Result<(), GraphicsError> {
        self.context.require_idle("resize_swapchain")?;
        let (raw, old_buffers, mut desc) = {
            let swapchains = lock(&self.shared.swapchains);
            let entry = swapchains
                .get(&id)
                .ok_or_else(|| GraphicsError::InvalidState(format!("unknown swapchain {id:?}")))?;
            (entry.handle.raw(), entry.back_buffers.clone(), entry.desc)
        };
        if (desc.width, desc.height) == (width, height) {
            return Ok(());
        }

        // 1. Nothing may still reference the old back buffers.
        self.shared.wait_idle()?;
        self.context.unbind_all();
        drop(self.shared.remove_textures(&old_buffers));

        // 2. Resize and register the new buffers under fresh ids.
        self.shared.driver.resize_swapchain(raw, width, height)?;
        desc.width = width;
        desc.height = height;
        let back_buffers = self.shared.register_back_buffers(id, raw, &desc)?;
        if let Some(entry) = lock(&self.shared.swapchains).get_mut(&id) {
            entry.desc = desc;
            entry.back_buffers = back_buffers;
        }
        log::info!("ImmediateDevice: Resized swapchain {id:?} to {width}x{height}");
        Ok(())
    }

    fn set_label(&self, resource: ResourceId, label: &str) -> Result<(), GraphicsError> {
        let unknown = || GraphicsError::InvalidState(format!("unknown resource {resource:?}"));
        match resource {
            ResourceId::Buffer(id) => {
                let mut buffers = lock(&self.shared.buffers);
                let entry = buffers.get_mut(&id).ok_or_else(unknown)?;
                entry.handle.set_name(label);
                entry.label = Some(label.to_string());
            }
            ResourceId::Texture(id) => {
                let mut textures = lock(&self.shared.textures);
                let entry = textures.get_mut(&id).ok_or_else(unknown)?;
                entry.handle.set_name(label);
                entry.label = Some(label.to_string());
            }
            ResourceId::Sampler(id) => {
                let mut samplers = lock(&self.shared.samplers);
                let entry = samplers.get_mut(&id).ok_or_else(unknown)?;
                entry.handle.set_name(label);
                entry.label = Some(label.to_string());
            }
            ResourceId::Pipeline(id) => {
                let mut pipelines = lock(&self.shared.pipelines);
                let entry = pipelines.get_mut(&id).ok_or_else(unknown)?;
                entry.label = Some(label.to_string());
            }
            ResourceId::SwapChain(id) => {
                let mut swapchains = lock(&self.shared.swapchains);
                let entry = swapchains.get_mut(&id).ok_or_else(unknown)?;
                entry.handle.set_name(label);
                entry.label = Some(label.to_string());
            }
        }
        Ok(())
    }

    fn render_target_view(&self, texture: TextureId, mip: u32, slice: u32) -> Result<ViewHandle, GraphicsError> {
        self.shared
            .texture_view(texture, TextureViewKind::RenderTarget, ViewKey::new(mip, slice))
    }

    fn depth_stencil_view(&self, texture: TextureId, mip: u32, slice: u32) -> Result<ViewHandle, GraphicsError> {
        self.shared
            .texture_view(texture, TextureViewKind::DepthStencil, ViewKey::new(mip, slice))
    }

    fn shader_resource_view(&self, texture: TextureId, mip: Option<u32>) -> Result<ViewHandle, GraphicsError> {
        let key = mip.map_or(ViewKey::whole(), ViewKey::mip);
        self.shared
            .texture_view(texture, TextureViewKind::ShaderResource, key)
    }

    fn unordered_access_view(&self, texture: TextureId, mip: u32) -> Result<ViewHandle, GraphicsError> {
        self.shared
            .texture_view(texture, TextureViewKind::UnorderedAccess, ViewKey::mip(mip))
    }

    fn context(&mut self) -> &mut dyn CommandContext {
        &mut self.context
    }

    fn begin_frame(&mut self) -> Result<(), GraphicsError> {
        self.context.require_idle("begin_frame")
    }

    fn end_frame(&mut self) -> Result<(), GraphicsError> {
        self.context.require_idle("end_frame")?;

        // 1. Present, then mark the end of this frame's work.
        self.shared.driver.flush();
        self.present_all()?;
        let slot = self.frame_slot();
        self.shared.driver.end_query(self.frame_queries[slot].raw());
        self.frame_issued[slot] = true;
        self.frame_count += 1;

        // 2. Block until the slot the next frame reuses is free.
        let next = self.frame_slot();
        if self.frame_issued[next] {
            let query = self.frame_queries[next].raw();
            while !self.shared.driver.query_data(query)? {
                std::thread::yield_now();
            }
            self.frame_issued[next] = false;
        }

        // 3. Retire what the GPU can no longer be using.
        self.shared.retire(self.frame_count);
        Ok(())
    }

    fn wait_for_gpu(&mut self) -> Result<(), GraphicsError> {
        self.shared.wait_idle()?;
        self.frame_issued.iter_mut().for_each(|issued| *issued = false);
        self.shared.retire(self.frame_count);
        Ok(())
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn read_buffer(&mut self, id: BufferId) -> Result<Vec<u8>, GraphicsError> {
        let (raw, desc) = self.shared.buffer_object(id)?;
        self.shared.read_subresource(raw, &desc, 0, 0)
    }

    fn read_texture(&mut self, id: TextureId, mip: u32, slice: u32) -> Result<Vec<u8>, GraphicsError> {
        let (raw, desc) = self.shared.texture_object(id)?;
        if desc.sample_count > 1 {
            return Err(GraphicsError::InvalidState(format!(
                "texture {id:?} is multisampled; resolve it before reading it back"
            )));
        }
        if mip >= desc.mip_levels.max(1) || slice >= desc.array_size() {
            return Err(GraphicsError::InvalidState(format!(
                "mip {mip} slice {slice} is outside texture {id:?}"
            )));
        }
        self.shared.read_subresource(raw, &desc, mip, slice)
    }

    fn stats(&self) -> DeviceStats {
        DeviceStats {
            frame_count: self.frame_count,
            live_buffers: lock(&self.shared.buffers).len(),
            live_textures: lock(&self.shared.textures).len(),
            live_samplers: lock(&self.shared.samplers).len(),
            live_pipelines: lock(&self.shared.pipelines).len(),
            live_swapchains: lock(&self.shared.swapchains).len(),
            pending_releases: self.shared.deferred.len(),
        }
    }
}

impl fmt::Debug for ImmediateDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImmediateDevice")
            .field("label", &self.label)
            .field("adapter", &self.adapter_info.name)
            .field("frame_count", &self.frame_count)
            .finish_non_exhaustive()
    }
}

impl Drop for ImmediateDevice {
    fn drop(&mut self) {
        if let Err(err) = self.shared.wait_idle() {
            log::warn!("ImmediateDevice: GPU wait failed during shutdown: {err}");
        }
        drop(self.shared.deferred.begin_teardown());
        self.context.unbind_all();
        self.shared.clear_tables();
        log::info!("ImmediateDevice: Destroyed device on '{}'", self.adapter_info.name);
    }
}
