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

use super::context::ExplicitContext;
use super::resources::*;
use super::root::{compute_root_signature, graphics_root_signature};
use crate::graphics::conversions::{buffer_resource_desc, explicit_memory_usage, texture_view_desc};
use crate::graphics::lock;
use crate::graphics::native::explicit::GpuAddress;
use crate::graphics::native::{
    ExplicitDriver, MemoryUsage, NativeHandle, NativeViewKind, ObjectLifetime,
    RawObject, ResourceDesc, SwapChainDesc, ViewDesc,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tessera_core::renderer::lifetime::{
    DeferredDestructionQueue, DescriptorAllocator, DescriptorBlock, DescriptorBlockSource,
    DescriptorHandle, DescriptorKind, QueueKind, ResourceState,
};
use tessera_core::renderer::validation::{self, describe};
use tessera_core::renderer::*;

/// Creates the CPU-only heaps the descriptor allocators grow into.
struct HeapSource {
    driver: Arc<dyn ExplicitDriver>,
    lifetime: Arc<dyn ObjectLifetime>,
}

impl DescriptorBlockSource<NativeHandle> for HeapSource {
    fn create_block(
        &self,
        kind: DescriptorKind,
        capacity: u32,
    ) -> Result<DescriptorBlock<NativeHandle>, GraphicsError> {
        let info = self
            .driver
            .create_descriptor_heap(kind, capacity, false)
            .map_err(|e| e.into_creation_error(format!("{kind:?} descriptor heap")))?;
        log::debug!("ExplicitDevice: Created {kind:?} descriptor heap of {capacity} handles");
        Ok(DescriptorBlock {
            heap: NativeHandle::from_raw(info.heap, self.lifetime.clone()),
            base: info.cpu_start,
            stride: self.driver.descriptor_increment(kind),
        })
    }
}

/// The state a heap type forces on its resources. Only default-heap
/// resources change state and are tracked.
fn heap_placement(usage: MemoryUsage) -> (ResourceState, bool) {
    match usage {
        MemoryUsage::Upload => (ResourceState::GENERIC_READ, false),
        MemoryUsage::Readback => (ResourceState::COPY_DEST, false),
        _ => (ResourceState::COMMON, true),
    }
}

fn null_view(kind: NativeViewKind) -> ViewDesc {
    ViewDesc {
        kind,
        format: TextureFormat::Unknown,
        first_mip: 0,
        mip_count: 1,
        first_slice: 0,
        slice_count: 1,
    }
}

/// A swapchain about to be presented, with the back buffer it will show.
pub(crate) struct PresentTarget {
    pub(crate) swapchain: RawObject,
    pub(crate) sync_interval: u32,
    pub(crate) back_buffer: ResourceRef,
}

/// The state shared between an [`ExplicitDevice`] and its command context.
pub(crate) struct ExplicitShared {
    pub(crate) driver: Arc<dyn ExplicitDriver>,
    pub(crate) lifetime: Arc<dyn ObjectLifetime>,
    heap_source: HeapSource,
    /// Indexed by [`DescriptorKind::index`].
    allocators: Vec<DescriptorAllocator<NativeHandle>>,

    buffers: Mutex<HashMap<BufferId, ExplicitBufferEntry>>,
    textures: Mutex<HashMap<TextureId, ExplicitTextureEntry>>,
    samplers: Mutex<HashMap<SamplerId, ExplicitSamplerEntry>>,
    pipelines: Mutex<HashMap<PipelineId, ExplicitPipelineEntry>>,
    swapchains: Mutex<HashMap<SwapChainId, ExplicitSwapChainEntry>>,

    next_buffer_id: AtomicUsize,
    next_texture_id: AtomicUsize,
    next_sampler_id: AtomicUsize,
    next_pipeline_id: AtomicUsize,
    next_swapchain_id: AtomicUsize,

    /// Objects and descriptors released by `destroy_*`, held until the GPU is past them.
    pub(crate) deferred: DeferredDestructionQueue<PendingRelease>,

    pub(crate) null_shader_resource: DescriptorHandle,
    pub(crate) null_unordered_access: DescriptorHandle,
    pub(crate) null_sampler: DescriptorHandle,

    pub(crate) graphics_root: NativeHandle,
    pub(crate) compute_root: NativeHandle,
    pub(crate) fence: NativeHandle,
    pub(crate) queue: NativeHandle,
}

impl ExplicitShared {
    fn new(driver: Arc<dyn ExplicitDriver>, descriptor: &DeviceDescriptor) -> Result<Self, GraphicsError> {
        let lifetime = driver.lifetime();
        let wrap = |raw| NativeHandle::from_raw(raw, lifetime.clone());

        // 1. Queue, fence and the two root signatures.
        let queue = wrap(
            driver
                .create_command_queue(QueueKind::Graphics)
                .map_err(|e| e.into_creation_error("command queue"))?,
        );
        let fence = wrap(driver.create_fence(0).map_err(|e| e.into_creation_error("fence"))?);
        let graphics_root = wrap(
            driver
                .create_root_signature(&graphics_root_signature())
                .map_err(|e| e.into_creation_error("graphics root signature"))?,
        );
        let compute_root = wrap(
            driver
                .create_root_signature(&compute_root_signature())
                .map_err(|e| e.into_creation_error("compute root signature"))?,
        );

        // 2. One CPU descriptor allocator per heap kind.
        let heap_source = HeapSource {
            driver: driver.clone(),
            lifetime: lifetime.clone(),
        };
        let allocators = DescriptorKind::ALL
            .iter()
            .map(|kind| {
                DescriptorAllocator::new(*kind, kind.block_size(&descriptor.descriptor_block_sizes), &heap_source)
            })
            .collect::<Result<Vec<_>, _>>()?;

        // 3. Null descriptors that fill the unbound slots of a table.
        let shader_resources = &allocators[DescriptorKind::ShaderResource.index()];
        let null_shader_resource = shader_resources.allocate(&heap_source)?;
        driver
            .create_view(None, &null_view(NativeViewKind::ShaderResource), null_shader_resource)
            .map_err(|e| e.into_creation_error("null shader resource view"))?;
        let null_unordered_access = shader_resources.allocate(&heap_source)?;
        driver
            .create_view(None, &null_view(NativeViewKind::UnorderedAccess), null_unordered_access)
            .map_err(|e| e.into_creation_error("null unordered access view"))?;
        let null_sampler = allocators[DescriptorKind::Sampler.index()].allocate(&heap_source)?;
        driver
            .create_sampler(&SamplerDescriptor::default(), null_sampler)
            .map_err(|e| e.into_creation_error("null sampler"))?;

        Ok(Self {
            driver,
            lifetime,
            heap_source,
            allocators,
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
            null_shader_resource,
            null_unordered_access,
            null_sampler,
            graphics_root,
            compute_root,
            fence,
            queue,
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

    fn allocator(&self, kind: DescriptorKind) -> &DescriptorAllocator<NativeHandle> {
        &self.allocators[kind.index()]
    }

    fn allocate_descriptor(&self, kind: DescriptorKind) -> Result<DescriptorHandle, GraphicsError> {
        self.allocator(kind).allocate(&self.heap_source)
    }

    /// Releases an item immediately. Only valid once the GPU is past it.
    pub(crate) fn release(&self, item: PendingRelease) {
        match item {
            PendingRelease::Object(handle) => drop(handle),
            PendingRelease::Descriptor(view) => self.allocator(view.kind).free(view.descriptor),
        }
    }

    pub(crate) fn defer(&self, items: impl IntoIterator<Item = PendingRelease>) {
        for item in items {
            // During teardown the queue hands the item straight back.
            if let Some(item) = self.deferred.defer(item) {
                self.release(item);
            }
        }
    }

    pub(crate) fn retire(&self, frame: u64) {
        let retired = self.deferred.process(frame);
        if !retired.is_empty() {
            log::debug!("ExplicitDevice: Released {} deferred objects", retired.len());
        }
        for item in retired {
            self.release(item);
        }
    }

    pub(crate) fn buffer(&self, id: BufferId) -> Result<(ResourceRef, ResourceDesc, GpuAddress), GraphicsError> {
        lock(&self.buffers)
            .get(&id)
            .map(|entry| (entry.resource.reference(), entry.resource.desc, entry.address))
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown buffer {id:?}")))
    }

    /// The texture, its description and whether it is a swapchain back buffer.
    pub(crate) fn texture(&self, id: TextureId) -> Result<(ResourceRef, ResourceDesc, bool), GraphicsError> {
        lock(&self.textures)
            .get(&id)
            .map(|entry| (entry.resource.reference(), entry.resource.desc, entry.swapchain.is_some()))
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown texture {id:?}")))
    }

    pub(crate) fn sampler_descriptor(&self, id: SamplerId) -> Result<DescriptorHandle, GraphicsError> {
        lock(&self.samplers)
            .get(&id)
            .map(|entry| entry.descriptor)
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown sampler {id:?}")))
    }

    pub(crate) fn pipeline_binding(&self, id: PipelineId) -> Result<PipelineBinding, GraphicsError> {
        lock(&self.pipelines)
            .get(&id)
            .map(ExplicitPipelineEntry::binding)
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown pipeline {id:?}")))
    }

    /// Returns the cached view of `texture`, writing its descriptor on first use.
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
            let view_desc = texture_view_desc(&entry.resource.desc, kind, key)?;
            let view = self.write_view(
                entry.resource.handle.raw(),
                &view_desc,
                format!("{kind:?} view of {texture:?}"),
            )?;
            log::debug!("ExplicitDevice: Created {kind:?} view {key:?} of {texture:?}");
            Ok(view)
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
            let view_desc = ViewDesc::whole_buffer(native_kind, &entry.resource.desc);
            self.write_view(
                entry.resource.handle.raw(),
                &view_desc,
                format!("{kind:?} view of {buffer:?}"),
            )
        })
    }

    /// Allocates a CPU descriptor and writes a view of `resource` into it.
    fn write_view(
        &self,
        resource: RawObject,
        desc: &ViewDesc,
        what: String,
    ) -> Result<DescriptorView, GraphicsError> {
        let kind = desc.kind.descriptor_kind();
        let descriptor = self.allocate_descriptor(kind)?;
        if let Err(err) = self.driver.create_view(Some(resource), desc, descriptor) {
            self.allocator(kind).free(descriptor);
            return Err(err.into_creation_error(what));
        }
        Ok(DescriptorView { kind, descriptor })
    }

    /// Registers the back buffers of a swapchain as tracked textures in `PRESENT`.
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
                ExplicitTextureEntry {
                    views: Default::default(),
                    resource: ExplicitResource::new(
                        self.wrap(buffer),
                        ResourceDesc::back_buffer(desc),
                        ResourceState::PRESENT,
                        true,
                    ),
                    label: None,
                    swapchain: Some(swapchain),
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    fn remove_textures(&self, ids: &[TextureId]) -> Vec<PendingRelease> {
        let mut released = Vec::new();
        let mut textures = lock(&self.textures);
        for id in ids {
            if let Some(entry) = textures.remove(id) {
                entry.release_into(&mut released);
            }
        }
        released
    }

    /// Every swapchain with the back buffer its next present shows.
    fn present_targets(&self) -> Result<Vec<PresentTarget>, GraphicsError> {
        let swapchains = lock(&self.swapchains);
        let textures = lock(&self.textures);
        swapchains
            .iter()
            .map(|(id, entry)| {
                let index = self.driver.current_back_buffer_index(entry.handle.raw())?;
                let back_buffer = entry
                    .back_buffers
                    .get(index as usize)
                    .and_then(|texture| textures.get(texture))
                    .ok_or_else(|| {
                        GraphicsError::InvalidState(format!("back buffer {index} of {id:?} is missing"))
                    })?;
                Ok(PresentTarget {
                    swapchain: entry.handle.raw(),
                    sync_interval: entry.desc.present_mode.sync_interval(),
                    back_buffer: back_buffer.resource.reference(),
                })
            })
            .collect()
    }

    /// Writes `data` at the start of an upload or readback heap resource.
    pub(crate) fn write_mapped(&self, resource: RawObject, data: &[u8]) -> Result<(), GraphicsError> {
        self.driver.map(resource)?;
        let written = self.driver.write_mapped(resource, 0, data);
        self.driver.unmap(resource);
        Ok(written?)
    }

    /// Reads `len` bytes from the start of an upload or readback heap resource.
    pub(crate) fn read_mapped(&self, resource: RawObject, len: usize) -> Result<Vec<u8>, GraphicsError> {
        self.driver.map(resource)?;
        let mut data = vec![0u8; len];
        let read = self.driver.read_mapped(resource, 0, &mut data);
        self.driver.unmap(resource);
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

    fn teardown_allocators(&self) -> Vec<NativeHandle> {
        self.allocators
            .iter()
            .flat_map(DescriptorAllocator::teardown)
            .collect()
    }
}

/// A [`GraphicsDevice`] on top of an [`ExplicitDriver`].
///
/// Resources are committed resources whose usage state is tracked per
/// resource; views are CPU descriptors drawn from block-grown allocators.
/// Destroyed objects and descriptors wait on the deferred destruction queue
/// until [`MAX_FRAMES_IN_FLIGHT`] frames have completed.
pub struct ExplicitDevice {
    shared: Arc<ExplicitShared>,
    context: ExplicitContext,
    adapter_info: GraphicsAdapterInfo,
    label: Option<String>,
    frame_count: u64,
}

impl ExplicitDevice {
    /// Opens a device on `driver`. Every object acquired before a failure is
    /// released again.
    pub fn new(
        driver: Arc<dyn ExplicitDriver>,
        adapter_info: GraphicsAdapterInfo,
        descriptor: &DeviceDescriptor,
    ) -> Result<Self, GraphicsError> {
        let shared = Arc::new(ExplicitShared::new(driver, descriptor)?);
        let context = ExplicitContext::new(shared.clone(), descriptor)?;
        log::info!(
            "ExplicitDevice: Opened '{}' on adapter '{}' ({:?})",
            descriptor.label.as_deref().unwrap_or("device"),
            adapter_info.name,
            adapter_info.feature_level
        );
        Ok(Self {
            shared,
            context,
            adapter_info,
            label: descriptor.label.as_deref().map(str::to_string),
            frame_count: 0,
        })
    }

    fn insert_buffer(
        &self,
        descriptor: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> Result<(BufferId, ResourceRef, MemoryUsage), GraphicsError> {
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
        let usage = explicit_memory_usage(descriptor);
        let desc = buffer_resource_desc(descriptor, usage);
        let (initial, tracked) = heap_placement(usage);
        let raw = self
            .shared
            .driver
            .create_committed_resource(&desc, initial)
            .map_err(|e| e.into_creation_error(what))?;
        let handle = self.shared.wrap(raw);
        if let Some(label) = descriptor.label.as_deref() {
            handle.set_name(label);
        }

        let resource = ExplicitResource::new(handle, desc, initial, tracked);
        let reference = resource.reference();
        let id = self.shared.generate_buffer_id();
        lock(&self.shared.buffers).insert(
            id,
            ExplicitBufferEntry {
                views: Default::default(),
                address: self.shared.driver.gpu_virtual_address(raw),
                resource,
                label: descriptor.label.as_deref().map(str::to_string),
            },
        );
        log::debug!(
            "ExplicitDevice: Created buffer {id:?} ({} bytes, {:?})",
            descriptor.size,
            usage
        );
        Ok((id, reference, usage))
    }

    fn insert_texture(
        &self,
        descriptor: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> Result<(TextureId, ResourceRef, ResourceDesc), GraphicsError> {
        validation::validate_texture(descriptor, SampleCount::X8)?;
        if let Some(data) = data {
            validation::validate_texture_data(descriptor, data, true)?;
        }
        // CPU access to textures goes through buffer copies, so every texture
        // lives in the default heap.
        let desc = ResourceDesc::texture(descriptor, MemoryUsage::Default);
        let raw = self
            .shared
            .driver
            .create_committed_resource(&desc, ResourceState::COMMON)
            .map_err(|e| e.into_creation_error(describe("texture", descriptor.label.as_deref())))?;
        let handle = self.shared.wrap(raw);
        if let Some(label) = descriptor.label.as_deref() {
            handle.set_name(label);
        }

        let resource = ExplicitResource::new(handle, desc, ResourceState::COMMON, true);
        let reference = resource.reference();
        let id = self.shared.generate_texture_id();
        lock(&self.shared.textures).insert(
            id,
            ExplicitTextureEntry {
                views: Default::default(),
                resource,
                label: descriptor.label.as_deref().map(str::to_string),
                swapchain: None,
            },
        );
        log::debug!(
            "ExplicitDevice: Created texture {id:?} ({}x{} {:?})",
            descriptor.width,
            descriptor.height,
            descriptor.format
        );
        Ok((id, reference, desc))
    }

    fn finish_frame(&mut self) -> Result<(), GraphicsError> {
        // 1. Back buffers return to PRESENT in the frame's last submission.
        let targets = self.shared.present_targets()?;
        let back_buffers: Vec<ResourceRef> = targets.iter().map(|target| target.back_buffer.clone()).collect();
        self.context.prepare_present(&back_buffers)?;
        self.context.submit()?;

        // 2. Present.
        for target in &targets {
            self.shared.driver.present(target.swapchain, target.sync_interval)?;
        }
        self.frame_count += 1;

        // 3. Reopen on the next slot once its previous frame has completed,
        //    then retire what the GPU can no longer be using.
        self.context.advance_frame(self.frame_count)?;
        self.shared.retire(self.frame_count);
        Ok(())
    }
}

impl GraphicsDevice for ExplicitDevice {
    fn backend_type(&self) -> GraphicsBackendType {
        GraphicsBackendType::Explicit
    }

    fn adapter_info(&self) -> &GraphicsAdapterInfo {
        &self.adapter_info
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, GraphicsError> {
        self.insert_buffer(descriptor, None).map(|(id, ..)| id)
    }

    fn create_buffer_with_data(
        &mut self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, GraphicsError> {
        let (id, resource, usage) = self.insert_buffer(descriptor, Some(data))?;
        if data.is_empty() {
            return Ok(id);
        }
        let uploaded = match usage {
            MemoryUsage::Upload | MemoryUsage::Readback => self.shared.write_mapped(resource.raw, data),
            _ => self.context.upload_buffer(&resource, data),
        };
        if let Err(err) = uploaded {
            self.destroy_buffer(id)?;
            return Err(err);
        }
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), GraphicsError> {
        let entry = lock(&self.shared.buffers)
            .remove(&id)
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown buffer {id:?}")))?;
        log::debug!(
            "ExplicitDevice: Destroyed buffer with ID: {id:?} ({})",
            entry.label.as_deref().unwrap_or("unlabeled")
        );
        let views = entry.views.drain().into_iter().map(PendingRelease::Descriptor);
        self.shared
            .defer(views.chain(std::iter::once(PendingRelease::Object(entry.resource.handle))));
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, GraphicsError> {
        self.insert_texture(descriptor, None).map(|(id, ..)| id)
    }

    fn create_texture_with_data(
        &mut self,
        descriptor: &TextureDescriptor,
        data: &[u8],
    ) -> Result<TextureId, GraphicsError> {
        let (id, resource, desc) = self.insert_texture(descriptor, Some(data))?;
        if let Err(err) = self.context.upload_texture(&resource, &desc, data) {
            self.destroy_texture(id)?;
            return Err(err);
        }
        Ok(id)
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
        let mut released = Vec::new();
        if let Some(entry) = entry {
            log::debug!(
                "ExplicitDevice: Destroyed texture with ID: {id:?} ({})",
                entry.label.as_deref().unwrap_or("unlabeled")
            );
            entry.release_into(&mut released);
        }
        self.shared.defer(released);
        Ok(())
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, GraphicsError> {
        validation::validate_sampler(descriptor)?;
        let what = describe("sampler", descriptor.label.as_deref());
        let handle = self.shared.allocate_descriptor(DescriptorKind::Sampler)?;
        if let Err(err) = self.shared.driver.create_sampler(descriptor, handle) {
            self.shared.allocator(DescriptorKind::Sampler).free(handle);
            return Err(err.into_creation_error(what));
        }
        let id = self.shared.generate_sampler_id();
        lock(&self.shared.samplers).insert(
            id,
            ExplicitSamplerEntry {
                descriptor: handle,
                label: descriptor.label.as_deref().map(str::to_string),
            },
        );
        log::debug!("ExplicitDevice: Created sampler {id:?}");
        Ok(id)
    }

    fn destroy_sampler(&self, id: SamplerId) -> Result<(), GraphicsError> {
        let entry = lock(&self.shared.samplers)
            .remove(&id)
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown sampler {id:?}")))?;
        log::debug!(
            "ExplicitDevice: Destroyed sampler with ID: {id:?} ({})",
            entry.label.as_deref().unwrap_or("unlabeled")
        );
        self.shared.defer([PendingRelease::Descriptor(DescriptorView {
            kind: DescriptorKind::Sampler,
            descriptor: entry.descriptor,
        })]);
        Ok(())
    }

    fn create_pipeline(&self, descriptor: &PipelineDescriptor) -> Result<PipelineId, GraphicsError> {
        let compute = descriptor.is_compute();
        let kind = if compute { "compute pipeline" } else { "render pipeline" };
        log::debug!("ExplicitDevice: Creating {kind} {:?}", descriptor.label());
        validation::validate_pipeline(descriptor)?;

        let root = if compute {
            self.shared.compute_root.raw()
        } else {
            self.shared.graphics_root.raw()
        };
        let raw = self
            .shared
            .driver
            .create_pipeline_state(root, descriptor)
            .map_err(|e| e.into_creation_error(describe(kind, descriptor.label())))?;
        let state = self.shared.wrap(raw);
        if let Some(label) = descriptor.label() {
            state.set_name(label);
        }
        let topology = match descriptor {
            PipelineDescriptor::Render(desc) => desc.topology,
            PipelineDescriptor::Compute(_) => PrimitiveTopology::default(),
        };

        let id = self.shared.generate_pipeline_id();
        lock(&self.shared.pipelines).insert(
            id,
            ExplicitPipelineEntry {
                state,
                compute,
                topology,
                label: descriptor.label().map(str::to_string),
            },
        );
        Ok(id)
    }

    fn destroy_pipeline(&self, id: PipelineId) -> Result<(), GraphicsError> {
        let entry = lock(&self.shared.pipelines)
            .remove(&id)
            .ok_or_else(|| GraphicsError::InvalidState(format!("unknown pipeline {id:?}")))?;
        log::debug!(
            "ExplicitDevice: Destroyed pipeline with ID: {id:?} ({})",
            entry.label.as_deref().unwrap_or("unlabeled")
        );
        self.shared.defer([PendingRelease::Object(entry.state)]);
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
            .create_swapchain(self.shared.queue.raw(), &desc)
            .map_err(|e| e.into_creation_error(describe("swapchain", descriptor.label.as_deref())))?;
        let handle = self.shared.wrap(raw);

        let id = self.shared.generate_swapchain_id();
        let back_buffers = self.shared.register_back_buffers(id, raw, &desc)?;
        lock(&self.shared.swapchains).insert(
            id,
            ExplicitSwapChainEntry {
                handle,
                desc,
                back_buffers,
                label: descriptor.label.as_deref().map(str::to_string),
            },
        );
        log::info!(
            "ExplicitDevice: Created swapchain {id:?} ({}x{} {:?}, {} buffers)",
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
            "ExplicitDevice: Destroyed swapchain with ID: {id:?} ({})",
            entry.label.as_deref().unwrap_or("unlabeled")
        );
        let mut released = self.shared.remove_textures(&entry.back_buffers);
        released.push(PendingRelease::Object(entry.handle));
        self.shared.defer(released);
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

        // 1. Nothing may still reference the old back buffers. The GPU is
        //    idle, so their views and references go right away.
        self.context.wait_idle()?;
        self.context.reset_bindings();
        for item in self.shared.remove_textures(&old_buffers) {
            self.shared.release(item);
        }

        // 2. Resize and register the new buffers under fresh ids.
        self.shared.driver.resize_swapchain(raw, width, height)?;
        desc.width = width;
        desc.height = height;
        let back_buffers = self.shared.register_back_buffers(id, raw, &desc)?;
        if let Some(entry) = lock(&self.shared.swapchains).get_mut(&id) {
            entry.desc = desc;
            entry.back_buffers = back_buffers;
        }
        log::info!("ExplicitDevice: Resized swapchain {id:?} to {width}x{height}");
        Ok(())
    }

    fn set_label(&self, resource: ResourceId, label: &str) -> Result<(), GraphicsError> {
        let unknown = || GraphicsError::InvalidState(format!("unknown resource {resource:?}"));
        match resource {
            ResourceId::Buffer(id) => {
                let mut buffers = lock(&self.shared.buffers);
                let entry = buffers.get_mut(&id).ok_or_else(unknown)?;
                entry.resource.handle.set_name(label);
                entry.label = Some(label.to_string());
            }
            ResourceId::Texture(id) => {
                let mut textures = lock(&self.shared.textures);
                let entry = textures.get_mut(&id).ok_or_else(unknown)?;
                entry.resource.handle.set_name(label);
                entry.label = Some(label.to_string());
            }
            ResourceId::Sampler(id) => {
                let mut samplers = lock(&self.shared.samplers);
                samplers.get_mut(&id).ok_or_else(unknown)?.label = Some(label.to_string());
            }
            ResourceId::Pipeline(id) => {
                let mut pipelines = lock(&self.shared.pipelines);
                let entry = pipelines.get_mut(&id).ok_or_else(unknown)?;
                entry.state.set_name(label);
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
        let result = self.finish_frame();
        if let Err(GraphicsError::DeviceLost(reason)) = &result {
            log::error!("ExplicitDevice: Device removed during frame {}: {reason}", self.frame_count);
        }
        result
    }

    fn wait_for_gpu(&mut self) -> Result<(), GraphicsError> {
        self.context.wait_idle()?;
        self.shared.retire(self.frame_count);
        Ok(())
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn read_buffer(&mut self, id: BufferId) -> Result<Vec<u8>, GraphicsError> {
        let (resource, desc, _) = self.shared.buffer(id)?;
        match desc.usage {
            MemoryUsage::Upload => self.shared.read_mapped(resource.raw, desc.width as usize),
            MemoryUsage::Readback => {
                self.context.wait_idle()?;
                self.shared.read_mapped(resource.raw, desc.width as usize)
            }
            _ => self.context.read_back(&resource, &desc, 0, 0),
        }
    }

    fn read_texture(&mut self, id: TextureId, mip: u32, slice: u32) -> Result<Vec<u8>, GraphicsError> {
        let (resource, desc, _) = self.shared.texture(id)?;
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
        self.context.read_back(&resource, &desc, mip, slice)
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

impl fmt::Debug for ExplicitDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExplicitDevice")
            .field("label", &self.label)
            .field("adapter", &self.adapter_info.name)
            .field("frame_count", &self.frame_count)
            .finish_non_exhaustive()
    }
}

impl Drop for ExplicitDevice {
    fn drop(&mut self) {
        // 1. Drain the GPU, then release everything still waiting.
        if let Err(err) = self.context.wait_idle() {
            log::warn!("ExplicitDevice: GPU wait failed during shutdown: {err}");
        }
        for item in self.shared.deferred.begin_teardown() {
            self.shared.release(item);
        }

        // 2. Resources, then the heaps their descriptors live in.
        self.context.reset_bindings();
        self.shared.clear_tables();
        drop(self.shared.teardown_allocators());
        log::info!("ExplicitDevice: Destroyed device on '{}'", self.adapter_info.name);
    }
}
