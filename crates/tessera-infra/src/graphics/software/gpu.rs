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


//! The object model shared by both software drivers: reference-counted
//! objects, resource memory, descriptor heaps and swapchains.

use super::explicit::RecordedList;
use super::texel;
use super::{AdapterConfig, AdapterShared, DriverStats};
use crate::graphics::native::explicit::{GpuAddress, RootSignatureDesc};
use crate::graphics::native::{
    BindFlags, DriverError, DriverResult, NativeViewKind, ObjectLifetime, RawObject,
    ResourceDesc, SwapChainDesc, ViewDesc,
};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tessera_core::renderer::lifetime::{DescriptorKind, QueueKind, ResourceState};
use tessera_core::renderer::{Color, FeatureLevel, ShaderStage};

/// Offset between the CPU and GPU address of a shader-visible descriptor.
pub(crate) const GPU_DESCRIPTOR_BASE: u64 = 1 << 44;

/// Buffers live at `id << BUFFER_ADDRESS_SHIFT` in the GPU address space.
const BUFFER_ADDRESS_SHIFT: u32 = 32;

const HEAP_ADDRESS_BASE: u64 = 0x1_0000;

/// A buffer or texture with its backing memory.
///
/// Textures are stored slice by slice, each slice holding its mips tightly
/// packed from the largest down. Multisampled textures keep one value per pixel.
pub(crate) struct ResourceObject {
    pub(crate) desc: ResourceDesc,
    pub(crate) memory: Vec<u8>,
    pub(crate) state: ResourceState,
    pub(crate) map_count: u32,
}

impl ResourceObject {
    fn new(desc: ResourceDesc, state: ResourceState) -> Self {
        let size = if desc.is_buffer() {
            desc.width as usize
        } else {
            Self::slice_size(&desc) * desc.array_size() as usize
        };
        Self {
            desc,
            memory: vec![0; size],
            state,
            map_count: 0,
        }
    }

    fn slice_size(desc: &ResourceDesc) -> usize {
        (0..desc.mip_levels.max(1))
            .map(|mip| desc.subresource_size(mip))
            .sum()
    }

    /// The bytes of one subresource.
    pub(crate) fn subresource_range(&self, subresource: u32) -> DriverResult<Range<usize>> {
        if subresource >= self.desc.subresource_count() {
            return Err(DriverError::InvalidCall(format!(
                "subresource {subresource} out of range ({} subresources)",
                self.desc.subresource_count()
            )));
        }
        if self.desc.is_buffer() {
            return Ok(0..self.memory.len());
        }
        let mips = self.desc.mip_levels.max(1);
        let slice = subresource / mips;
        let mip = subresource % mips;
        let start = slice as usize * Self::slice_size(&self.desc)
            + (0..mip).map(|m| self.desc.subresource_size(m)).sum::<usize>();
        Ok(start..start + self.desc.subresource_size(mip))
    }
}

/// What a swapchain object tracks; its back buffers are the object's `holds`.
pub(crate) struct SwapChainObject {
    pub(crate) desc: SwapChainDesc,
    pub(crate) current: u32,
    pub(crate) initial_state: ResourceState,
}

/// A descriptor written into a heap slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Descriptor {
    View {
        resource: Option<RawObject>,
        desc: ViewDesc,
    },
    ConstantBuffer(Option<(GpuAddress, u32)>),
    Sampler,
}

/// The address range of a descriptor heap.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeapRange {
    pub(crate) heap: RawObject,
    pub(crate) kind: DescriptorKind,
    pub(crate) cpu_start: u64,
    pub(crate) capacity: u32,
    pub(crate) increment: u32,
    pub(crate) shader_visible: bool,
}

impl HeapRange {
    fn end(&self) -> u64 {
        self.cpu_start + self.capacity as u64 * self.increment as u64
    }

    fn contains(&self, handle: u64) -> bool {
        handle >= self.cpu_start
            && handle < self.end()
            && (handle - self.cpu_start) % self.increment as u64 == 0
    }
}

pub(crate) enum Payload {
    Resource(ResourceObject),
    /// A view of the object's first held resource.
    View(ViewDesc),
    Sampler,
    Shader(ShaderStage),
    InputLayout,
    RasterizerState,
    BlendState,
    DepthStencilState,
    Query { signaled: bool },
    SwapChain(SwapChainObject),
    Queue(QueueKind),
    Fence(u64),
    CommandAllocator(QueueKind),
    CommandList(Box<RecordedList>),
    DescriptorHeap,
    RootSignature(RootSignatureDesc),
    /// A pipeline state object; its root signature is the first held object.
    PipelineState { compute: bool },
}

impl Payload {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Payload::Resource(_) => "resource",
            Payload::View(_) => "view",
            Payload::Sampler => "sampler",
            Payload::Shader(_) => "shader",
            Payload::InputLayout => "input layout",
            Payload::RasterizerState => "rasterizer state",
            Payload::BlendState => "blend state",
            Payload::DepthStencilState => "depth-stencil state",
            Payload::Query { .. } => "query",
            Payload::SwapChain(_) => "swapchain",
            Payload::Queue(_) => "command queue",
            Payload::Fence(_) => "fence",
            Payload::CommandAllocator(_) => "command allocator",
            Payload::CommandList(_) => "command list",
            Payload::DescriptorHeap => "descriptor heap",
            Payload::RootSignature(_) => "root signature",
            Payload::PipelineState { .. } => "pipeline state",
        }
    }
}

pub(crate) struct Object {
    pub(crate) refs: u32,
    pub(crate) name: String,
    /// References this object keeps on other objects, released with it.
    pub(crate) holds: Vec<RawObject>,
    pub(crate) payload: Payload,
}

/// Everything a device owns, behind one lock.
pub(crate) struct GpuState {
    pub(crate) objects: HashMap<u64, Object>,
    pub(crate) descriptors: HashMap<u64, Descriptor>,
    pub(crate) heaps: Vec<HeapRange>,
    next_heap_address: u64,
}

impl GpuState {
    fn new() -> Self {
        Self {
            objects: HashMap::new(),
            descriptors: HashMap::new(),
            heaps: Vec::new(),
            next_heap_address: HEAP_ADDRESS_BASE,
        }
    }

    pub(crate) fn object(&self, raw: RawObject) -> DriverResult<&Object> {
        self.objects
            .get(&raw.0)
            .ok_or_else(|| DriverError::InvalidCall(format!("object {} does not exist", raw.0)))
    }

    pub(crate) fn object_mut(&mut self, raw: RawObject) -> DriverResult<&mut Object> {
        self.objects
            .get_mut(&raw.0)
            .ok_or_else(|| DriverError::InvalidCall(format!("object {} does not exist", raw.0)))
    }

    pub(crate) fn resource(&self, raw: RawObject) -> DriverResult<&ResourceObject> {
        match &self.object(raw)?.payload {
            Payload::Resource(resource) => Ok(resource),
            other => Err(DriverError::InvalidCall(format!(
                "object {} is a {}, not a resource",
                raw.0,
                other.type_name()
            ))),
        }
    }

    pub(crate) fn resource_mut(&mut self, raw: RawObject) -> DriverResult<&mut ResourceObject> {
        match &mut self.object_mut(raw)?.payload {
            Payload::Resource(resource) => Ok(resource),
            other => Err(DriverError::InvalidCall(format!(
                "object {} is a {}, not a resource",
                raw.0,
                other.type_name()
            ))),
        }
    }

    /// The resource and range of an immediate-context view object.
    pub(crate) fn view(&self, raw: RawObject) -> DriverResult<(RawObject, ViewDesc)> {
        let object = self.object(raw)?;
        match (&object.payload, object.holds.first()) {
            (Payload::View(desc), Some(resource)) => Ok((*resource, *desc)),
            (other, _) => Err(DriverError::InvalidCall(format!(
                "object {} is a {}, not a view",
                raw.0,
                other.type_name()
            ))),
        }
    }

    /// Resolves a GPU address to the buffer containing it and the offset inside.
    pub(crate) fn buffer_at(&self, address: GpuAddress) -> Option<(RawObject, u64)> {
        let raw = RawObject(address >> BUFFER_ADDRESS_SHIFT);
        let offset = address & ((1 << BUFFER_ADDRESS_SHIFT) - 1);
        match self.resource(raw) {
            Ok(resource) if resource.desc.is_buffer() && offset < resource.desc.width => {
                Some((raw, offset))
            }
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn read_subresource(&self, raw: RawObject, subresource: u32) -> DriverResult<Vec<u8>> {
        let resource = self.resource(raw)?;
        let range = resource.subresource_range(subresource)?;
        Ok(resource.memory[range].to_vec())
    }

    /// Overwrites a subresource from its first byte on.
    pub(crate) fn write_subresource(
        &mut self,
        raw: RawObject,
        subresource: u32,
        data: &[u8],
    ) -> DriverResult<()> {
        let resource = self.resource_mut(raw)?;
        let range = resource.subresource_range(subresource)?;
        if data.len() > range.len() {
            return Err(DriverError::InvalidCall(format!(
                "{} bytes do not fit subresource {subresource} ({} bytes)",
                data.len(),
                range.len()
            )));
        }
        resource.memory[range.start..range.start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Copies every byte of `source` into `destination`.
    pub(crate) fn copy_resource(&mut self, destination: RawObject, source: RawObject) -> DriverResult<()> {
        let src = self.resource(source)?;
        let dst = self.resource(destination)?;
        if src.memory.len() != dst.memory.len()
            || src.desc.subresource_count() != dst.desc.subresource_count()
        {
            return Err(DriverError::InvalidCall(format!(
                "resources {} and {} do not have the same layout",
                destination.0, source.0
            )));
        }
        let bytes = src.memory.clone();
        self.resource_mut(destination)?.memory = bytes;
        Ok(())
    }

    /// Copies one subresource. A buffer on either side holds a tightly packed
    /// footprint of the texture subresource starting at offset 0.
    pub(crate) fn copy_subresource(
        &mut self,
        destination: RawObject,
        destination_subresource: u32,
        source: RawObject,
        source_subresource: u32,
    ) -> DriverResult<()> {
        let src = self.resource(source)?;
        let dst = self.resource(destination)?;
        let src_range = src.subresource_range(source_subresource)?;
        let dst_range = dst.subresource_range(destination_subresource)?;
        let len = match (dst.desc.is_buffer(), src.desc.is_buffer()) {
            (true, false) => src_range.len(),
            (false, true) => dst_range.len(),
            _ => {
                if src_range.len() != dst_range.len() {
                    return Err(DriverError::InvalidCall(format!(
                        "subresource sizes differ ({} vs {} bytes)",
                        dst_range.len(),
                        src_range.len()
                    )));
                }
                src_range.len()
            }
        };
        if len > src_range.len() || len > dst_range.len() {
            return Err(DriverError::InvalidCall(format!(
                "a {len}-byte footprint does not fit the copy buffer"
            )));
        }
        let bytes = src.memory[src_range.start..src_range.start + len].to_vec();
        let dst = self.resource_mut(destination)?;
        dst.memory[dst_range.start..dst_range.start + len].copy_from_slice(&bytes);
        Ok(())
    }

    pub(crate) fn copy_buffer_region(
        &mut self,
        destination: RawObject,
        destination_offset: u64,
        source: RawObject,
        source_offset: u64,
        size: u64,
    ) -> DriverResult<()> {
        let src = self.resource(source)?;
        let (src_start, dst_start, len) = (
            source_offset as usize,
            destination_offset as usize,
            size as usize,
        );
        if src_start + len > src.memory.len() {
            return Err(DriverError::InvalidCall(format!(
                "copy reads past the end of buffer {}",
                source.0
            )));
        }
        let bytes = src.memory[src_start..src_start + len].to_vec();
        let dst = self.resource_mut(destination)?;
        if dst_start + len > dst.memory.len() {
            return Err(DriverError::InvalidCall(format!(
                "copy writes past the end of buffer {}",
                destination.0
            )));
        }
        dst.memory[dst_start..dst_start + len].copy_from_slice(&bytes);
        Ok(())
    }

    /// Runs `write_texel` over every texel a view covers.
    fn fill_view(
        &mut self,
        resource: RawObject,
        view: &ViewDesc,
        mut write_texel: impl FnMut(&mut [u8]),
    ) -> DriverResult<()> {
        let resource = self.resource_mut(resource)?;
        let texel_size = resource.desc.format.bytes_per_pixel() as usize;
        if texel_size == 0 || resource.desc.is_buffer() {
            return Err(DriverError::InvalidCall(
                "only texture views can be cleared".to_string(),
            ));
        }
        let mip_end = view.first_mip.saturating_add(view.mip_count);
        let slice_end = view
            .first_slice
            .saturating_add(view.slice_count)
            .min(resource.desc.array_size());
        if mip_end > resource.desc.mip_levels.max(1) {
            return Err(DriverError::InvalidCall(format!(
                "view covers mips {}..{mip_end} of a {}-mip resource",
                view.first_mip, resource.desc.mip_levels
            )));
        }
        let mut ranges = Vec::new();
        for mip in view.first_mip..mip_end {
            for slice in view.first_slice..slice_end {
                ranges.push(resource.subresource_range(resource.desc.subresource(mip, slice))?);
            }
        }
        for range in ranges {
            resource.memory[range]
                .chunks_exact_mut(texel_size)
                .for_each(&mut write_texel);
        }
        Ok(())
    }

    /// Fills a render target view with a color.
    pub(crate) fn clear_color(
        &mut self,
        resource: RawObject,
        view: &ViewDesc,
        color: Color,
    ) -> DriverResult<()> {
        let format = self.resource(resource)?.desc.format;
        let encoded = texel::encode_color(format, color).ok_or_else(|| {
            DriverError::InvalidCall(format!("{format:?} is not a color format"))
        })?;
        self.fill_view(resource, view, |texel| texel.copy_from_slice(&encoded))
    }

    /// Clears the requested aspects of a depth-stencil view.
    pub(crate) fn clear_depth_stencil(
        &mut self,
        resource: RawObject,
        view: &ViewDesc,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) -> DriverResult<()> {
        let format = self.resource(resource)?.desc.format;
        if !format.is_depth() {
            return Err(DriverError::InvalidCall(format!(
                "{format:?} is not a depth format"
            )));
        }
        self.fill_view(resource, view, |texel| {
            texel::write_depth_stencil(format, texel, depth, stencil)
        })
    }

    /// The heap whose slots include `handle`.
    pub(crate) fn heap_containing(&self, handle: u64) -> Option<&HeapRange> {
        self.heaps.iter().find(|heap| heap.contains(handle))
    }

    /// The shader-visible heap whose GPU range includes `handle`.
    pub(crate) fn heap_containing_gpu(&self, handle: u64) -> Option<&HeapRange> {
        let cpu = handle.checked_sub(GPU_DESCRIPTOR_BASE)?;
        self.heap_containing(cpu).filter(|heap| heap.shader_visible)
    }

    fn reserve_heap_range(&mut self, mut range: HeapRange) -> HeapRange {
        range.cpu_start = self.next_heap_address;
        // Leave a gap so that off-by-one handles never land in the next heap.
        self.next_heap_address = range.end() + HEAP_ADDRESS_BASE;
        self.heaps.push(range);
        range
    }

    fn forget_heap(&mut self, heap: RawObject) {
        let Some(position) = self.heaps.iter().position(|range| range.heap == heap) else {
            return;
        };
        let range = self.heaps.swap_remove(position);
        self.descriptors
            .retain(|address, _| *address < range.cpu_start || *address >= range.end());
    }
}

/// One device of a software adapter.
pub(crate) struct SoftwareGpu {
    config: AdapterConfig,
    shared: Arc<AdapterShared>,
    validation: bool,
    next_id: AtomicU64,
    state: Mutex<GpuState>,
}

impl SoftwareGpu {
    pub(crate) fn new(config: AdapterConfig, shared: Arc<AdapterShared>, validation: bool) -> Self {
        Self {
            config,
            shared,
            validation,
            next_id: AtomicU64::new(1),
            state: Mutex::new(GpuState::new()),
        }
    }

    pub(crate) fn feature_level(&self) -> FeatureLevel {
        self.config.feature_level
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, GpuState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Bumps call counters.
    pub(crate) fn count(&self, update: impl FnOnce(&mut DriverStats)) {
        update(&mut self.shared.stats());
    }

    pub(crate) fn check_removed(&self) -> DriverResult<()> {
        if self.shared.is_removed() {
            log::error!("Software device on '{}' was removed", self.config.name);
            return Err(DriverError::DeviceRemoved(format!(
                "adapter '{}' was removed",
                self.config.name
            )));
        }
        Ok(())
    }

    /// Reports a broken API rule.
    pub(crate) fn invalid(&self, message: String) -> DriverError {
        if self.validation {
            log::warn!("Validation: {message}");
            self.shared.push_message(message.clone());
        }
        DriverError::InvalidCall(message)
    }

    /// Checks a rule only the debug layer enforces.
    pub(crate) fn validate(&self, ok: bool, message: impl FnOnce() -> String) -> DriverResult<()> {
        if self.validation && !ok {
            return Err(self.invalid(message()));
        }
        Ok(())
    }

    /// Creates an object with one reference, taking over the references in `holds`.
    pub(crate) fn insert_locked(
        &self,
        state: &mut GpuState,
        payload: Payload,
        holds: Vec<RawObject>,
    ) -> DriverResult<RawObject> {
        self.check_removed()?;
        if let Some(limit) = self.config.object_limit {
            if state.objects.len() >= limit {
                let kind = payload.type_name();
                for held in holds {
                    self.release_locked(state, held);
                }
                return Err(DriverError::OutOfMemory(format!(
                    "object limit of {limit} reached creating a {kind}"
                )));
            }
        }
        let raw = RawObject(self.next_id.fetch_add(1, Ordering::Relaxed));
        state.objects.insert(
            raw.0,
            Object {
                refs: 1,
                name: String::new(),
                holds,
                payload,
            },
        );
        self.count(|stats| {
            stats.objects_created += 1;
            stats.live_objects += 1;
        });
        Ok(raw)
    }

    pub(crate) fn insert(&self, payload: Payload) -> DriverResult<RawObject> {
        let mut state = self.lock();
        self.insert_locked(&mut state, payload, Vec::new())
    }

    pub(crate) fn add_ref_locked(&self, state: &mut GpuState, raw: RawObject) -> DriverResult<()> {
        state.object_mut(raw)?.refs += 1;
        Ok(())
    }

    /// Drops one reference, destroying the object and what it holds once unused.
    pub(crate) fn release_locked(&self, state: &mut GpuState, raw: RawObject) {
        let mut pending = vec![raw];
        let mut destroyed = 0;
        while let Some(raw) = pending.pop() {
            let Some(object) = state.objects.get_mut(&raw.0) else {
                log::warn!("Release of unknown object {}", raw.0);
                continue;
            };
            object.refs = object.refs.saturating_sub(1);
            if object.refs > 0 {
                continue;
            }
            if let Some(object) = state.objects.remove(&raw.0) {
                if matches!(object.payload, Payload::DescriptorHeap) {
                    state.forget_heap(raw);
                }
                pending.extend(object.holds);
                destroyed += 1;
            }
        }
        if destroyed > 0 {
            self.count(|stats| {
                stats.objects_released += destroyed;
                stats.live_objects = stats.live_objects.saturating_sub(destroyed);
            });
        }
    }

    #[cfg(test)]
    pub(crate) fn is_alive(&self, raw: RawObject) -> bool {
        self.lock().objects.contains_key(&raw.0)
    }

    // --- Resources ---

    pub(crate) fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_state: ResourceState,
        initial_data: Option<&[u8]>,
    ) -> DriverResult<RawObject> {
        if desc.width == 0 || desc.height == 0 || desc.depth_or_array_size == 0 {
            return Err(self.invalid("resources need a non-zero size".to_string()));
        }
        if !desc.is_buffer() && desc.format.bytes_per_pixel() == 0 {
            return Err(DriverError::Unsupported(format!(
                "{:?} textures are not supported",
                desc.format
            )));
        }
        let mut resource = ResourceObject::new(*desc, initial_state);
        if let Some(data) = initial_data {
            if data.len() > resource.memory.len() {
                return Err(self.invalid(format!(
                    "{} bytes of initial data for a {}-byte resource",
                    data.len(),
                    resource.memory.len()
                )));
            }
            resource.memory[..data.len()].copy_from_slice(data);
        }
        self.insert(Payload::Resource(resource))
    }

    /// The GPU address of a buffer, 0 for textures.
    pub(crate) fn gpu_address(&self, raw: RawObject) -> GpuAddress {
        match self.lock().resource(raw) {
            Ok(resource) if resource.desc.is_buffer() => raw.0 << BUFFER_ADDRESS_SHIFT,
            _ => 0,
        }
    }

    /// Checks that a view is legal for its resource.
    pub(crate) fn check_view(&self, resource: &ResourceObject, desc: &ViewDesc) -> DriverResult<()> {
        let required = match desc.kind {
            NativeViewKind::RenderTarget => BindFlags::RENDER_TARGET,
            NativeViewKind::DepthStencil => BindFlags::DEPTH_STENCIL,
            NativeViewKind::ShaderResource => BindFlags::SHADER_RESOURCE,
            NativeViewKind::UnorderedAccess => BindFlags::UNORDERED_ACCESS,
        };
        let allowed = resource.desc.bind.contains(required)
            || (resource.desc.is_buffer()
                && desc.kind == NativeViewKind::ShaderResource
                && resource.desc.bind.intersects(BindFlags::VERTEX_BUFFER | BindFlags::INDEX_BUFFER));
        if !allowed {
            return Err(self.invalid(format!(
                "{:?} view of a resource created without {required:?}",
                desc.kind
            )));
        }
        if !resource.desc.is_buffer() {
            if desc.format != resource.desc.format {
                return Err(self.invalid(format!(
                    "view format {:?} differs from resource format {:?}",
                    desc.format, resource.desc.format
                )));
            }
            if desc.first_mip + desc.mip_count > resource.desc.mip_levels.max(1) {
                return Err(self.invalid(format!(
                    "view mips {}..{} exceed the resource's {} mips",
                    desc.first_mip,
                    desc.first_mip + desc.mip_count,
                    resource.desc.mip_levels
                )));
            }
        }
        Ok(())
    }

    // --- Descriptor heaps ---

    pub(crate) fn create_heap(
        &self,
        kind: DescriptorKind,
        capacity: u32,
        increment: u32,
        shader_visible: bool,
    ) -> DriverResult<HeapRange> {
        let mut state = self.lock();
        let heap = self.insert_locked(&mut state, Payload::DescriptorHeap, Vec::new())?;
        let range = state.reserve_heap_range(HeapRange {
            heap,
            kind,
            cpu_start: 0,
            capacity,
            increment,
            shader_visible,
        });
        self.count(|stats| stats.heaps_created += 1);
        Ok(range)
    }

    // --- Swapchains ---

    fn create_back_buffers(
        &self,
        state: &mut GpuState,
        desc: &SwapChainDesc,
        initial_state: ResourceState,
    ) -> DriverResult<Vec<RawObject>> {
        let resource_desc = ResourceDesc::back_buffer(desc);
        let mut buffers = Vec::with_capacity(desc.buffer_count as usize);
        for _ in 0..desc.buffer_count {
            let resource = ResourceObject::new(resource_desc, initial_state);
            match self.insert_locked(state, Payload::Resource(resource), Vec::new()) {
                Ok(raw) => buffers.push(raw),
                Err(err) => {
                    for raw in buffers {
                        self.release_locked(state, raw);
                    }
                    return Err(err);
                }
            }
        }
        Ok(buffers)
    }

    pub(crate) fn create_swapchain(
        &self,
        desc: &SwapChainDesc,
        initial_state: ResourceState,
    ) -> DriverResult<RawObject> {
        if desc.width == 0 || desc.height == 0 || desc.buffer_count == 0 {
            return Err(self.invalid(format!(
                "invalid swapchain {}x{} with {} buffers",
                desc.width, desc.height, desc.buffer_count
            )));
        }
        let mut state = self.lock();
        let buffers = self.create_back_buffers(&mut state, desc, initial_state)?;
        let swapchain = SwapChainObject {
            desc: *desc,
            current: 0,
            initial_state,
        };
        self.insert_locked(&mut state, Payload::SwapChain(swapchain), buffers)
    }

    fn swapchain<'a>(state: &'a GpuState, raw: RawObject) -> DriverResult<(&'a SwapChainObject, &'a [RawObject])> {
        let object = state.object(raw)?;
        match &object.payload {
            Payload::SwapChain(swapchain) => Ok((swapchain, &object.holds)),
            other => Err(DriverError::InvalidCall(format!(
                "object {} is a {}, not a swapchain",
                raw.0,
                other.type_name()
            ))),
        }
    }

    pub(crate) fn swapchain_buffer(&self, raw: RawObject, index: u32) -> DriverResult<RawObject> {
        let mut state = self.lock();
        let buffer = {
            let (_, buffers) = Self::swapchain(&state, raw)?;
            *buffers.get(index as usize).ok_or_else(|| {
                DriverError::InvalidCall(format!("swapchain has no back buffer {index}"))
            })?
        };
        self.add_ref_locked(&mut state, buffer)?;
        Ok(buffer)
    }

    pub(crate) fn current_back_buffer_index(&self, raw: RawObject) -> DriverResult<u32> {
        let state = self.lock();
        Ok(Self::swapchain(&state, raw)?.0.current)
    }

    pub(crate) fn resize_swapchain(&self, raw: RawObject, width: u32, height: u32) -> DriverResult<()> {
        if width == 0 || height == 0 {
            return Err(self.invalid(format!("cannot resize a swapchain to {width}x{height}")));
        }
        let mut state = self.lock();
        let (desc, initial_state, old_buffers) = {
            let (swapchain, buffers) = Self::swapchain(&state, raw)?;
            (swapchain.desc, swapchain.initial_state, buffers.to_vec())
        };
        for buffer in &old_buffers {
            if state.object(*buffer)?.refs > 1 {
                return Err(self.invalid(format!(
                    "back buffer {} is still referenced during resize",
                    buffer.0
                )));
            }
        }
        let desc = SwapChainDesc {
            width,
            height,
            ..desc
        };
        let buffers = self.create_back_buffers(&mut state, &desc, initial_state)?;
        let object = state.object_mut(raw)?;
        object.holds = buffers;
        if let Payload::SwapChain(swapchain) = &mut object.payload {
            swapchain.desc = desc;
            swapchain.current = 0;
        }
        for buffer in old_buffers {
            self.release_locked(&mut state, buffer);
        }
        Ok(())
    }

    /// Presents the current back buffer. Explicit devices require it to be in `PRESENT`.
    pub(crate) fn present(&self, raw: RawObject, require_present_state: bool) -> DriverResult<()> {
        self.check_removed()?;
        let mut state = self.lock();
        let (current, count, buffer) = {
            let (swapchain, buffers) = Self::swapchain(&state, raw)?;
            let buffer = buffers
                .get(swapchain.current as usize)
                .copied()
                .unwrap_or(RawObject::NULL);
            (swapchain.current, swapchain.desc.buffer_count, buffer)
        };
        if require_present_state {
            let resource_state = state.resource(buffer)?.state;
            self.validate(resource_state == ResourceState::PRESENT, || {
                format!("presenting back buffer {} in state {resource_state:?}", buffer.0)
            })?;
        }
        if let Payload::SwapChain(swapchain) = &mut state.object_mut(raw)?.payload {
            swapchain.current = (current + 1) % count.max(1);
        }
        self.count(|stats| stats.presents += 1);
        Ok(())
    }
}

impl ObjectLifetime for SoftwareGpu {
    fn add_ref(&self, object: RawObject) {
        let mut state = self.lock();
        if self.add_ref_locked(&mut state, object).is_err() {
            log::warn!("add_ref of unknown object {}", object.0);
        }
    }

    fn release(&self, object: RawObject) {
        let mut state = self.lock();
        self.release_locked(&mut state, object);
    }

    fn set_name(&self, object: RawObject, name: &str) {
        if let Some(entry) = self.lock().objects.get_mut(&object.0) {
            entry.name = name.to_string();
        }
    }
}

#[cfg(test)]
impl SoftwareGpu {
    /// The debug name of an object.
    pub(crate) fn name_of(&self, object: RawObject) -> Option<String> {
        self.lock().objects.get(&object.0).map(|entry| entry.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::native::MemoryUsage;
    use tessera_core::renderer::{TextureDescriptor, TextureFormat, TextureUsage};

    fn gpu(limit: Option<usize>) -> SoftwareGpu {
        SoftwareGpu::new(
            AdapterConfig {
                name: "test".into(),
                feature_level: FeatureLevel::Level12_1,
                device_type: tessera_core::renderer::RendererDeviceType::Cpu,
                dedicated_video_memory: 0,
                object_limit: limit,
            },
            Arc::new(AdapterShared::default()),
            true,
        )
    }

    #[test]
    fn releasing_a_view_releases_its_resource() {
        let gpu = gpu(None);
        let desc = ResourceDesc::texture(
            &TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUsage::SHADER_RESOURCE),
            MemoryUsage::Default,
        );
        let texture = gpu.create_resource(&desc, ResourceState::COMMON, None).unwrap();
        let view = {
            let mut state = gpu.lock();
            gpu.add_ref_locked(&mut state, texture).unwrap();
            let view_desc = ViewDesc {
                kind: NativeViewKind::ShaderResource,
                format: TextureFormat::Rgba8Unorm,
                first_mip: 0,
                mip_count: 1,
                first_slice: 0,
                slice_count: 1,
            };
            gpu.insert_locked(&mut state, Payload::View(view_desc), vec![texture])
                .unwrap()
        };
        gpu.release(texture);
        assert!(gpu.is_alive(texture));
        gpu.release(view);
        assert!(!gpu.is_alive(texture));
        assert!(!gpu.is_alive(view));
    }

    #[test]
    fn object_limit_reports_out_of_memory() {
        let gpu = gpu(Some(1));
        let desc = ResourceDesc::buffer(16, BindFlags::VERTEX_BUFFER, MemoryUsage::Default, 0);
        gpu.create_resource(&desc, ResourceState::COMMON, None).unwrap();
        let err = gpu
            .create_resource(&desc, ResourceState::COMMON, None)
            .unwrap_err();
        assert!(matches!(err, DriverError::OutOfMemory(_)));
    }

    #[test]
    fn texture_footprint_copies_into_buffers() {
        let gpu = gpu(None);
        let mut tex = TextureDescriptor::new_2d(4, 4, TextureFormat::R8Unorm, TextureUsage::SHADER_RESOURCE);
        tex.mip_level_count = 2;
        let texture = gpu
            .create_resource(
                &ResourceDesc::texture(&tex, MemoryUsage::Default),
                ResourceState::COMMON,
                Some(&[7; 20]),
            )
            .unwrap();
        let buffer = gpu
            .create_resource(
                &ResourceDesc::buffer(16, BindFlags::EMPTY, MemoryUsage::Readback, 0),
                ResourceState::COPY_DEST,
                None,
            )
            .unwrap();
        let mut state = gpu.lock();
        state.copy_subresource(buffer, 0, texture, 1).unwrap();
        assert_eq!(state.read_subresource(buffer, 0).unwrap(), [7, 7, 7, 7, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }
}
