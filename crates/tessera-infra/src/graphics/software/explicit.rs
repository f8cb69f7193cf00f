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


//! The explicit software driver. Command lists record into memory and run on
//! the CPU when they are executed; fences complete as soon as they are signaled.

use super::gpu::{Descriptor, GpuState, Payload, SoftwareGpu, GPU_DESCRIPTOR_BASE};
use crate::graphics::native::explicit::{
    DescriptorHeapInfo, DescriptorRangeKind, GpuAddress, GpuDescriptorHandle, IndexBufferView,
    RootParameter, RootSignatureDesc, VertexBufferView,
};
use crate::graphics::native::{
    DriverError, DriverResult, ExplicitDriver, MemoryUsage, NativeViewKind, ObjectLifetime,
    RawObject, ResourceDesc, SwapChainDesc, ViewDesc,
};
use std::sync::Arc;
use tessera_core::renderer::lifetime::{
    DescriptorHandle, DescriptorKind, QueueKind, ResourceBarrier, ResourceState, SplitFlag,
};
use tessera_core::renderer::{
    Color, FeatureLevel, PipelineDescriptor, PrimitiveTopology, SamplerDescriptor, ScissorRect,
    Viewport,
};

/// A recorded command with an effect on resource memory or state.
#[derive(Debug, Clone)]
enum Command {
    Barriers(Vec<ResourceBarrier>),
    ClearRenderTarget {
        resource: RawObject,
        view: ViewDesc,
        color: Color,
    },
    ClearDepthStencil {
        resource: RawObject,
        view: ViewDesc,
        depth: Option<f32>,
        stencil: Option<u8>,
    },
    CopyBufferRegion {
        destination: RawObject,
        destination_offset: u64,
        source: RawObject,
        source_offset: u64,
        size: u64,
    },
    CopyResource {
        destination: RawObject,
        source: RawObject,
    },
    CopyTextureRegion {
        destination: RawObject,
        destination_subresource: u32,
        source: RawObject,
        source_subresource: u32,
    },
    Resolve {
        destination: RawObject,
        destination_subresource: u32,
        source: RawObject,
        source_subresource: u32,
    },
}

/// A command list and the bindings recorded into it so far.
pub(crate) struct RecordedList {
    kind: QueueKind,
    allocator: RawObject,
    open: bool,
    commands: Vec<Command>,
    heaps: Vec<RawObject>,
    pipeline: Option<RawObject>,
    graphics_root: Option<RawObject>,
    compute_root: Option<RawObject>,
}

impl RecordedList {
    fn new(kind: QueueKind, allocator: RawObject) -> Self {
        Self {
            kind,
            allocator,
            open: true,
            commands: Vec::new(),
            heaps: Vec::new(),
            pipeline: None,
            graphics_root: None,
            compute_root: None,
        }
    }
}

/// A software explicit device.
pub struct SoftwareExplicitDriver {
    gpu: Arc<SoftwareGpu>,
}

const fn increment(kind: DescriptorKind) -> u32 {
    match kind {
        DescriptorKind::ShaderResource => 32,
        DescriptorKind::Sampler => 16,
        DescriptorKind::RenderTarget => 32,
        DescriptorKind::DepthStencil => 8,
    }
}

impl SoftwareExplicitDriver {
    pub(crate) fn new(gpu: Arc<SoftwareGpu>) -> Self {
        Self { gpu }
    }

    fn list_mut<'a>(&self, state: &'a mut GpuState, list: RawObject) -> DriverResult<&'a mut RecordedList> {
        match &mut state.object_mut(list)?.payload {
            Payload::CommandList(recorded) => Ok(recorded.as_mut()),
            other => Err(self.gpu.invalid(format!(
                "object {} is a {}, not a command list",
                list.0,
                other.type_name()
            ))),
        }
    }

    fn open_list<'a>(&self, state: &'a mut GpuState, list: RawObject) -> DriverResult<&'a mut RecordedList> {
        let recorded = self.list_mut(state, list)?;
        if !recorded.open {
            return Err(self.gpu.invalid(format!(
                "recording into closed command list {}",
                list.0
            )));
        }
        Ok(recorded)
    }

    fn record(&self, list: RawObject, command: Command) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        self.open_list(&mut state, list)?.commands.push(command);
        Ok(())
    }

    fn check_open(&self, list: RawObject) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        self.open_list(&mut state, list).map(|_| ())
    }

    /// The resource and range of a view descriptor of `kind`.
    fn view_descriptor(
        &self,
        state: &GpuState,
        handle: DescriptorHandle,
        kind: NativeViewKind,
    ) -> DriverResult<(RawObject, ViewDesc)> {
        match state.descriptors.get(&handle.0) {
            Some(Descriptor::View {
                resource: Some(resource),
                desc,
            }) if desc.kind == kind => Ok((*resource, *desc)),
            _ => Err(self.gpu.invalid(format!(
                "descriptor {:#x} does not hold a {kind:?} view",
                handle.0
            ))),
        }
    }

    fn require_state(
        &self,
        state: &GpuState,
        resource: RawObject,
        required: ResourceState,
        usage: &str,
    ) -> DriverResult<()> {
        let current = state.resource(resource)?.state;
        self.gpu.validate(current.contains(required), || {
            format!(
                "resource {} used as {usage} in state {current:?}, expected {required:?}",
                resource.0
            )
        })
    }

    /// The root signature bound for graphics or compute work.
    fn root_parameter(
        &self,
        state: &mut GpuState,
        list: RawObject,
        compute: bool,
        parameter: u32,
    ) -> DriverResult<(RootParameter, Vec<RawObject>)> {
        let (root, heaps) = {
            let recorded = self.open_list(state, list)?;
            let root = if compute {
                recorded.compute_root
            } else {
                recorded.graphics_root
            };
            (root, recorded.heaps.clone())
        };
        let root = root.ok_or_else(|| {
            self.gpu
                .invalid("root argument set before the root signature".to_string())
        })?;
        let parameter_desc = match &state.object(root)?.payload {
            Payload::RootSignature(desc) => desc.parameters.get(parameter as usize).copied(),
            _ => None,
        };
        let parameter_desc = parameter_desc.ok_or_else(|| {
            self.gpu
                .invalid(format!("root signature has no parameter {parameter}"))
        })?;
        Ok((parameter_desc, heaps))
    }

    fn check_pipeline(&self, list: RawObject, compute: bool) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let (pipeline, root) = {
            let recorded = self.open_list(&mut state, list)?;
            let root = if compute {
                recorded.compute_root
            } else {
                recorded.graphics_root
            };
            (recorded.pipeline, root)
        };
        let what = if compute { "dispatch" } else { "draw" };
        let Some(pipeline) = pipeline else {
            return self
                .gpu
                .validate(false, || format!("{what} without a pipeline state"));
        };
        let object = state.object(pipeline)?;
        let (is_compute, pipeline_root) = match object.payload {
            Payload::PipelineState {
                compute: pipeline_compute,
            } => (pipeline_compute, object.holds.first().copied()),
            _ => (!compute, None),
        };
        self.gpu.validate(is_compute == compute, || {
            format!("{what} with a pipeline of the other kind")
        })?;
        self.gpu.validate(root.is_some() && root == pipeline_root, || {
            format!("{what} with a root signature the pipeline was not created against")
        })
    }

    fn execute(&self, state: &mut GpuState, command: &Command) -> DriverResult<()> {
        match *command {
            Command::Barriers(ref barriers) => {
                for barrier in barriers {
                    match *barrier {
                        ResourceBarrier::Transition {
                            resource,
                            before,
                            after,
                            split,
                        } => {
                            let raw = RawObject(resource);
                            let current = state.resource(raw)?.state;
                            self.gpu.validate(current == before, || {
                                format!(
                                    "barrier on resource {resource} expects {before:?} but it is in {current:?}"
                                )
                            })?;
                            if split != SplitFlag::BeginOnly {
                                state.resource_mut(raw)?.state = after;
                            }
                        }
                        ResourceBarrier::UnorderedAccess { resource } => {
                            self.require_state(
                                state,
                                RawObject(resource),
                                ResourceState::UNORDERED_ACCESS,
                                "a UAV barrier target",
                            )?;
                        }
                    }
                }
                Ok(())
            }
            Command::ClearRenderTarget {
                resource,
                view,
                color,
            } => {
                self.require_state(state, resource, ResourceState::RENDER_TARGET, "a render target")?;
                state.clear_color(resource, &view, color)
            }
            Command::ClearDepthStencil {
                resource,
                view,
                depth,
                stencil,
            } => {
                self.require_state(state, resource, ResourceState::DEPTH_WRITE, "a depth target")?;
                state.clear_depth_stencil(resource, &view, depth, stencil)
            }
            Command::CopyBufferRegion {
                destination,
                destination_offset,
                source,
                source_offset,
                size,
            } => {
                self.require_state(state, destination, ResourceState::COPY_DEST, "a copy destination")?;
                self.require_state(state, source, ResourceState::COPY_SOURCE, "a copy source")?;
                state.copy_buffer_region(destination, destination_offset, source, source_offset, size)
            }
            Command::CopyResource {
                destination,
                source,
            } => {
                self.require_state(state, destination, ResourceState::COPY_DEST, "a copy destination")?;
                self.require_state(state, source, ResourceState::COPY_SOURCE, "a copy source")?;
                state.copy_resource(destination, source)
            }
            Command::CopyTextureRegion {
                destination,
                destination_subresource,
                source,
                source_subresource,
            } => {
                self.require_state(state, destination, ResourceState::COPY_DEST, "a copy destination")?;
                self.require_state(state, source, ResourceState::COPY_SOURCE, "a copy source")?;
                state.copy_subresource(destination, destination_subresource, source, source_subresource)
            }
            Command::Resolve {
                destination,
                destination_subresource,
                source,
                source_subresource,
            } => {
                self.require_state(state, destination, ResourceState::RESOLVE_DEST, "a resolve destination")?;
                self.require_state(state, source, ResourceState::RESOLVE_SOURCE, "a resolve source")?;
                state.copy_subresource(destination, destination_subresource, source, source_subresource)
            }
        }
    }

    fn queue_kind(&self, state: &GpuState, queue: RawObject) -> DriverResult<QueueKind> {
        match state.object(queue)?.payload {
            Payload::Queue(kind) => Ok(kind),
            ref other => Err(self.gpu.invalid(format!(
                "object {} is a {}, not a command queue",
                queue.0,
                other.type_name()
            ))),
        }
    }
}

impl ExplicitDriver for SoftwareExplicitDriver {
    fn lifetime(&self) -> Arc<dyn ObjectLifetime> {
        self.gpu.clone()
    }

    fn feature_level(&self) -> FeatureLevel {
        self.gpu.feature_level()
    }

    fn descriptor_increment(&self, kind: DescriptorKind) -> u32 {
        increment(kind)
    }

    fn create_command_queue(&self, kind: QueueKind) -> DriverResult<RawObject> {
        self.gpu.insert(Payload::Queue(kind))
    }

    fn create_fence(&self, initial_value: u64) -> DriverResult<RawObject> {
        self.gpu.insert(Payload::Fence(initial_value))
    }

    fn execute_command_lists(&self, queue: RawObject, lists: &[RawObject]) -> DriverResult<()> {
        self.gpu.check_removed()?;
        let mut state = self.gpu.lock();
        let queue_kind = self.queue_kind(&state, queue)?;
        for &list in lists {
            let commands = {
                let recorded = self.list_mut(&mut state, list)?;
                if recorded.open {
                    return Err(self.gpu.invalid(format!(
                        "executing command list {} before it was closed",
                        list.0
                    )));
                }
                if recorded.kind != queue_kind {
                    return Err(self.gpu.invalid(format!(
                        "{:?} command list executed on a {queue_kind:?} queue",
                        recorded.kind
                    )));
                }
                recorded.commands.clone()
            };
            for command in &commands {
                self.execute(&mut state, command)?;
            }
        }
        self.gpu.count(|stats| stats.submissions += 1);
        Ok(())
    }

    fn queue_signal(&self, queue: RawObject, fence: RawObject, value: u64) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        self.queue_kind(&state, queue)?;
        match &mut state.object_mut(fence)?.payload {
            Payload::Fence(completed) => {
                *completed = value;
                Ok(())
            }
            other => Err(self.gpu.invalid(format!(
                "object {} is a {}, not a fence",
                fence.0,
                other.type_name()
            ))),
        }
    }

    fn fence_completed_value(&self, fence: RawObject) -> u64 {
        match self.gpu.lock().object(fence).map(|object| &object.payload) {
            Ok(Payload::Fence(value)) => *value,
            _ => 0,
        }
    }

    fn wait_for_fence(&self, fence: RawObject, value: u64) -> DriverResult<()> {
        let completed = self.fence_completed_value(fence);
        if completed < value {
            return Err(self.gpu.invalid(format!(
                "waiting for fence value {value} that is never signaled (completed {completed})"
            )));
        }
        self.gpu.count(|stats| stats.fence_waits += 1);
        Ok(())
    }

    fn create_command_allocator(&self, kind: QueueKind) -> DriverResult<RawObject> {
        self.gpu.insert(Payload::CommandAllocator(kind))
    }

    fn reset_command_allocator(&self, allocator: RawObject) -> DriverResult<()> {
        let state = self.gpu.lock();
        if !matches!(state.object(allocator)?.payload, Payload::CommandAllocator(_)) {
            return Err(self.gpu.invalid(format!(
                "object {} is not a command allocator",
                allocator.0
            )));
        }
        let recording = state.objects.values().any(|object| {
            matches!(&object.payload, Payload::CommandList(list) if list.open && list.allocator == allocator)
        });
        self.gpu.validate(!recording, || {
            format!("resetting allocator {} while a list records into it", allocator.0)
        })
    }

    fn create_command_list(&self, kind: QueueKind, allocator: RawObject) -> DriverResult<RawObject> {
        let mut state = self.gpu.lock();
        match state.object(allocator)?.payload {
            Payload::CommandAllocator(allocator_kind) if allocator_kind == kind => {}
            _ => {
                return Err(self.gpu.invalid(format!(
                    "object {} is not a {kind:?} command allocator",
                    allocator.0
                )))
            }
        }
        let list = RecordedList::new(kind, allocator);
        self.gpu
            .insert_locked(&mut state, Payload::CommandList(Box::new(list)), Vec::new())
    }

    fn close_command_list(&self, list: RawObject) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let recorded = self.list_mut(&mut state, list)?;
        if !recorded.open {
            return Err(self.gpu.invalid(format!("command list {} is already closed", list.0)));
        }
        recorded.open = false;
        Ok(())
    }

    fn reset_command_list(&self, list: RawObject, allocator: RawObject) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let allocator_kind = match state.object(allocator)?.payload {
            Payload::CommandAllocator(kind) => kind,
            _ => {
                return Err(self.gpu.invalid(format!(
                    "object {} is not a command allocator",
                    allocator.0
                )))
            }
        };
        let allocator_busy = state.objects.iter().any(|(id, object)| {
            *id != list.0
                && matches!(&object.payload, Payload::CommandList(other) if other.open && other.allocator == allocator)
        });
        self.gpu.validate(!allocator_busy, || {
            format!("allocator {} already has a list recording into it", allocator.0)
        })?;
        let recorded = self.list_mut(&mut state, list)?;
        if recorded.open {
            return Err(self.gpu.invalid(format!(
                "resetting command list {} while it is still open",
                list.0
            )));
        }
        if recorded.kind != allocator_kind {
            return Err(self.gpu.invalid(format!(
                "{:?} command list reset with a {allocator_kind:?} allocator",
                recorded.kind
            )));
        }
        *recorded = RecordedList::new(recorded.kind, allocator);
        Ok(())
    }

    fn create_descriptor_heap(
        &self,
        kind: DescriptorKind,
        capacity: u32,
        shader_visible: bool,
    ) -> DriverResult<DescriptorHeapInfo> {
        if capacity == 0 {
            return Err(self.gpu.invalid("descriptor heaps need a capacity".to_string()));
        }
        if shader_visible
            && matches!(kind, DescriptorKind::RenderTarget | DescriptorKind::DepthStencil)
        {
            return Err(self.gpu.invalid(format!(
                "{kind:?} heaps cannot be shader-visible"
            )));
        }
        let range = self
            .gpu
            .create_heap(kind, capacity, increment(kind), shader_visible)?;
        Ok(DescriptorHeapInfo {
            heap: range.heap,
            cpu_start: DescriptorHandle(range.cpu_start),
            gpu_start: if shader_visible {
                range.cpu_start + GPU_DESCRIPTOR_BASE
            } else {
                0
            },
        })
    }

    fn create_view(
        &self,
        resource: Option<RawObject>,
        desc: &ViewDesc,
        destination: DescriptorHandle,
    ) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let kind = desc.kind.descriptor_kind();
        let slot_kind = state.heap_containing(destination.0).map(|heap| heap.kind);
        self.gpu.validate(slot_kind == Some(kind), || {
            format!("descriptor {:#x} is not an allocated {kind:?} slot", destination.0)
        })?;
        if let Some(resource) = resource {
            self.gpu.check_view(state.resource(resource)?, desc)?;
        }
        state.descriptors.insert(
            destination.0,
            Descriptor::View {
                resource,
                desc: *desc,
            },
        );
        self.gpu.count(|stats| stats.views_created += 1);
        Ok(())
    }

    fn create_constant_buffer_view(
        &self,
        buffer: Option<(GpuAddress, u32)>,
        destination: DescriptorHandle,
    ) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let slot_kind = state.heap_containing(destination.0).map(|heap| heap.kind);
        self.gpu.validate(slot_kind == Some(DescriptorKind::ShaderResource), || {
            format!("descriptor {:#x} is not an allocated shader resource slot", destination.0)
        })?;
        if let Some((address, size)) = buffer {
            self.gpu.validate(state.buffer_at(address).is_some() && size % 256 == 0, || {
                format!("constant buffer view of {size} bytes at {address:#x}")
            })?;
        }
        state
            .descriptors
            .insert(destination.0, Descriptor::ConstantBuffer(buffer));
        self.gpu.count(|stats| stats.views_created += 1);
        Ok(())
    }

    fn create_sampler(&self, desc: &SamplerDescriptor, destination: DescriptorHandle) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let slot_kind = state.heap_containing(destination.0).map(|heap| heap.kind);
        self.gpu.validate(slot_kind == Some(DescriptorKind::Sampler), || {
            format!("descriptor {:#x} is not an allocated sampler slot", destination.0)
        })?;
        self.gpu.validate(desc.max_anisotropy <= 16, || {
            format!("max anisotropy {} exceeds 16", desc.max_anisotropy)
        })?;
        state.descriptors.insert(destination.0, Descriptor::Sampler);
        self.gpu.count(|stats| stats.samplers_created += 1);
        Ok(())
    }

    fn copy_descriptors_simple(
        &self,
        count: u32,
        destination: DescriptorHandle,
        source: DescriptorHandle,
        kind: DescriptorKind,
    ) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let stride = increment(kind);
        for index in 0..count {
            let dst = destination.offset(index, stride).0;
            let src = source.offset(index, stride).0;
            let in_heaps = [dst, src]
                .iter()
                .all(|handle| state.heap_containing(*handle).map(|heap| heap.kind) == Some(kind));
            self.gpu.validate(in_heaps, || {
                format!("descriptor copy {src:#x} -> {dst:#x} leaves the {kind:?} heaps")
            })?;
            match state.descriptors.get(&src).copied() {
                Some(descriptor) => state.descriptors.insert(dst, descriptor),
                None => state.descriptors.remove(&dst),
            };
        }
        self.gpu.count(|stats| stats.descriptors_copied += count as u64);
        Ok(())
    }

    fn create_committed_resource(
        &self,
        desc: &ResourceDesc,
        initial_state: ResourceState,
    ) -> DriverResult<RawObject> {
        match desc.usage {
            MemoryUsage::Dynamic | MemoryUsage::Staging => {
                return Err(DriverError::Unsupported(format!(
                    "{:?} memory on an explicit device",
                    desc.usage
                )))
            }
            MemoryUsage::Upload => self.gpu.validate(initial_state == ResourceState::GENERIC_READ, || {
                format!("upload heap resources start in GENERIC_READ, not {initial_state:?}")
            })?,
            MemoryUsage::Readback => self.gpu.validate(initial_state == ResourceState::COPY_DEST, || {
                format!("readback heap resources start in COPY_DEST, not {initial_state:?}")
            })?,
            MemoryUsage::Default => {}
        }
        self.gpu.create_resource(desc, initial_state, None)
    }

    fn gpu_virtual_address(&self, resource: RawObject) -> GpuAddress {
        self.gpu.gpu_address(resource)
    }

    fn map(&self, resource: RawObject) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let object = state.resource_mut(resource)?;
        if !matches!(object.desc.usage, MemoryUsage::Upload | MemoryUsage::Readback) {
            return Err(self.gpu.invalid(format!(
                "mapping resource {} in {:?} memory",
                resource.0, object.desc.usage
            )));
        }
        object.map_count += 1;
        self.gpu.count(|stats| stats.maps += 1);
        Ok(())
    }

    fn write_mapped(&self, resource: RawObject, offset: usize, data: &[u8]) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let object = state.resource_mut(resource)?;
        if object.map_count == 0 || offset + data.len() > object.memory.len() {
            return Err(self.gpu.invalid(format!(
                "write of {} bytes at {offset} outside the mapping of resource {}",
                data.len(),
                resource.0
            )));
        }
        object.memory[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_mapped(&self, resource: RawObject, offset: usize, out: &mut [u8]) -> DriverResult<()> {
        let state = self.gpu.lock();
        let object = state.resource(resource)?;
        if object.map_count == 0 || offset + out.len() > object.memory.len() {
            return Err(self.gpu.invalid(format!(
                "read of {} bytes at {offset} outside the mapping of resource {}",
                out.len(),
                resource.0
            )));
        }
        out.copy_from_slice(&object.memory[offset..offset + out.len()]);
        Ok(())
    }

    fn unmap(&self, resource: RawObject) {
        let mut state = self.gpu.lock();
        match state.resource_mut(resource) {
            Ok(object) if object.map_count > 0 => object.map_count -= 1,
            _ => log::warn!("unmap of resource {} that is not mapped", resource.0),
        }
    }

    fn create_root_signature(&self, desc: &RootSignatureDesc) -> DriverResult<RawObject> {
        self.gpu.insert(Payload::RootSignature(desc.clone()))
    }

    fn create_pipeline_state(
        &self,
        root_signature: RawObject,
        desc: &PipelineDescriptor,
    ) -> DriverResult<RawObject> {
        let mut state = self.gpu.lock();
        let allow_input_layout = match &state.object(root_signature)?.payload {
            Payload::RootSignature(root) => root.allow_input_layout,
            other => {
                return Err(self.gpu.invalid(format!(
                    "object {} is a {}, not a root signature",
                    root_signature.0,
                    other.type_name()
                )))
            }
        };
        match desc {
            PipelineDescriptor::Render(render) => {
                if render.vertex_shader.is_empty()
                    || render.fragment_shader.as_ref().is_some_and(|ps| ps.is_empty())
                {
                    return Err(self.gpu.invalid("pipeline with empty shader bytecode".into()));
                }
                self.gpu.validate(
                    render.vertex_attributes.is_empty() || allow_input_layout,
                    || "input layout on a root signature that denies it".to_string(),
                )?;
            }
            PipelineDescriptor::Compute(compute) => {
                if compute.compute_shader.is_empty() {
                    return Err(self.gpu.invalid("pipeline with empty shader bytecode".into()));
                }
            }
        }
        self.gpu.add_ref_locked(&mut state, root_signature)?;
        self.gpu.insert_locked(
            &mut state,
            Payload::PipelineState {
                compute: desc.is_compute(),
            },
            vec![root_signature],
        )
    }

    fn create_swapchain(&self, queue: RawObject, desc: &SwapChainDesc) -> DriverResult<RawObject> {
        {
            let state = self.gpu.lock();
            if self.queue_kind(&state, queue)? != QueueKind::Graphics {
                return Err(self.gpu.invalid("swapchains present from a graphics queue".into()));
            }
        }
        self.gpu.create_swapchain(desc, ResourceState::PRESENT)
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
        self.gpu.present(swapchain, true)
    }

    fn resource_barrier(&self, list: RawObject, barriers: &[ResourceBarrier]) -> DriverResult<()> {
        for barrier in barriers {
            if let ResourceBarrier::Transition { resource, before, after, .. } = barrier {
                self.gpu.validate(before != after, || {
                    format!("transition of resource {resource} to the state it is already in")
                })?;
            }
        }
        self.record(list, Command::Barriers(barriers.to_vec()))?;
        let transitions = barriers
            .iter()
            .filter(|barrier| matches!(barrier, ResourceBarrier::Transition { .. }))
            .count() as u64;
        self.gpu.count(|stats| {
            stats.barrier_calls += 1;
            stats.transition_barriers += transitions;
            stats.uav_barriers += barriers.len() as u64 - transitions;
        });
        Ok(())
    }

    fn clear_render_target_view(
        &self,
        list: RawObject,
        view: DescriptorHandle,
        color: Color,
    ) -> DriverResult<()> {
        let (resource, desc) = {
            let state = self.gpu.lock();
            self.view_descriptor(&state, view, NativeViewKind::RenderTarget)?
        };
        self.record(
            list,
            Command::ClearRenderTarget {
                resource,
                view: desc,
                color,
            },
        )?;
        self.gpu.count(|stats| stats.clears += 1);
        Ok(())
    }

    fn clear_depth_stencil_view(
        &self,
        list: RawObject,
        view: DescriptorHandle,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) -> DriverResult<()> {
        let (resource, desc) = {
            let state = self.gpu.lock();
            self.view_descriptor(&state, view, NativeViewKind::DepthStencil)?
        };
        self.record(
            list,
            Command::ClearDepthStencil {
                resource,
                view: desc,
                depth,
                stencil,
            },
        )?;
        self.gpu.count(|stats| stats.clears += 1);
        Ok(())
    }

    fn discard_resource(&self, list: RawObject, _resource: RawObject) -> DriverResult<()> {
        self.check_open(list)?;
        self.gpu.count(|stats| stats.discards += 1);
        Ok(())
    }

    fn om_set_render_targets(
        &self,
        list: RawObject,
        render_targets: &[DescriptorHandle],
        depth_stencil: Option<DescriptorHandle>,
    ) -> DriverResult<()> {
        {
            let state = self.gpu.lock();
            for handle in render_targets {
                self.view_descriptor(&state, *handle, NativeViewKind::RenderTarget)?;
            }
            if let Some(handle) = depth_stencil {
                self.view_descriptor(&state, handle, NativeViewKind::DepthStencil)?;
            }
        }
        self.check_open(list)?;
        self.gpu.count(|stats| stats.render_target_binds += 1);
        Ok(())
    }

    fn rs_set_viewports(&self, list: RawObject, _viewports: &[Viewport]) -> DriverResult<()> {
        self.check_open(list)?;
        self.gpu.count(|stats| stats.viewport_sets += 1);
        Ok(())
    }

    fn rs_set_scissor_rects(&self, list: RawObject, _rects: &[ScissorRect]) -> DriverResult<()> {
        self.check_open(list)?;
        self.gpu.count(|stats| stats.scissor_sets += 1);
        Ok(())
    }

    fn set_pipeline_state(&self, list: RawObject, pipeline: RawObject) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        if !matches!(state.object(pipeline)?.payload, Payload::PipelineState { .. }) {
            return Err(self.gpu.invalid(format!("object {} is not a pipeline state", pipeline.0)));
        }
        self.open_list(&mut state, list)?.pipeline = Some(pipeline);
        self.gpu.count(|stats| stats.pipeline_binds += 1);
        Ok(())
    }

    fn set_root_signature(&self, list: RawObject, compute: bool, root_signature: RawObject) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        if !matches!(state.object(root_signature)?.payload, Payload::RootSignature(_)) {
            return Err(self.gpu.invalid(format!(
                "object {} is not a root signature",
                root_signature.0
            )));
        }
        let recorded = self.open_list(&mut state, list)?;
        if compute {
            recorded.compute_root = Some(root_signature);
        } else {
            recorded.graphics_root = Some(root_signature);
        }
        self.gpu.count(|stats| stats.root_signature_binds += 1);
        Ok(())
    }

    fn ia_set_primitive_topology(&self, list: RawObject, _topology: PrimitiveTopology) -> DriverResult<()> {
        self.check_open(list)?;
        self.gpu.count(|stats| stats.topology_binds += 1);
        Ok(())
    }

    fn ia_set_vertex_buffers(&self, list: RawObject, _start_slot: u32, views: &[VertexBufferView]) -> DriverResult<()> {
        {
            let state = self.gpu.lock();
            for view in views.iter().filter(|view| view.location != 0) {
                self.gpu.validate(state.buffer_at(view.location).is_some(), || {
                    format!("vertex buffer view at unmapped address {:#x}", view.location)
                })?;
            }
        }
        self.check_open(list)?;
        self.gpu.count(|stats| stats.vertex_buffer_binds += 1);
        Ok(())
    }

    fn ia_set_index_buffer(&self, list: RawObject, view: Option<IndexBufferView>) -> DriverResult<()> {
        if let Some(view) = view {
            let state = self.gpu.lock();
            self.gpu.validate(state.buffer_at(view.location).is_some(), || {
                format!("index buffer view at unmapped address {:#x}", view.location)
            })?;
        }
        self.check_open(list)?;
        self.gpu.count(|stats| stats.index_buffer_binds += 1);
        Ok(())
    }

    fn set_descriptor_heaps(&self, list: RawObject, heaps: &[RawObject]) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        for heap in heaps {
            let visible = state
                .heaps
                .iter()
                .any(|range| range.heap == *heap && range.shader_visible);
            if !visible {
                return Err(self.gpu.invalid(format!(
                    "object {} is not a shader-visible descriptor heap",
                    heap.0
                )));
            }
        }
        self.open_list(&mut state, list)?.heaps = heaps.to_vec();
        Ok(())
    }

    fn set_root_descriptor_table(
        &self,
        list: RawObject,
        compute: bool,
        parameter: u32,
        base: GpuDescriptorHandle,
    ) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let (parameter_desc, heaps) = self.root_parameter(&mut state, list, compute, parameter)?;
        let RootParameter::Table { kind, count } = parameter_desc else {
            return Err(self.gpu.invalid(format!("root parameter {parameter} is not a table")));
        };
        let heap_kind = match kind {
            DescriptorRangeKind::ShaderResource | DescriptorRangeKind::UnorderedAccess => {
                DescriptorKind::ShaderResource
            }
            DescriptorRangeKind::Sampler => DescriptorKind::Sampler,
        };
        let last = base + count.saturating_sub(1) as u64 * increment(heap_kind) as u64;
        let in_bound_heap = [base, last].iter().all(|handle| {
            state
                .heap_containing_gpu(*handle)
                .is_some_and(|heap| heap.kind == heap_kind && heaps.contains(&heap.heap))
        });
        self.gpu.validate(in_bound_heap, || {
            format!("descriptor table at {base:#x} is outside the bound {heap_kind:?} heap")
        })?;
        self.gpu.count(|stats| match kind {
            DescriptorRangeKind::ShaderResource => stats.shader_resource_binds += 1,
            DescriptorRangeKind::UnorderedAccess => stats.unordered_access_binds += 1,
            DescriptorRangeKind::Sampler => stats.sampler_binds += 1,
        });
        Ok(())
    }

    fn set_root_constant_buffer_view(
        &self,
        list: RawObject,
        compute: bool,
        parameter: u32,
        address: GpuAddress,
    ) -> DriverResult<()> {
        let mut state = self.gpu.lock();
        let (parameter_desc, _) = self.root_parameter(&mut state, list, compute, parameter)?;
        if !matches!(parameter_desc, RootParameter::ConstantBuffer { .. }) {
            return Err(self.gpu.invalid(format!(
                "root parameter {parameter} is not a constant buffer view"
            )));
        }
        self.gpu.validate(address == 0 || state.buffer_at(address).is_some(), || {
            format!("root constant buffer at unmapped address {address:#x}")
        })?;
        self.gpu.count(|stats| stats.constant_buffer_binds += 1);
        Ok(())
    }

    fn om_set_stencil_ref(&self, list: RawObject, reference: u32) -> DriverResult<()> {
        self.check_open(list)?;
        self.gpu.count(|stats| {
            stats.depth_stencil_binds += 1;
            stats.last_stencil_reference = reference;
        });
        Ok(())
    }

    fn om_set_blend_factor(&self, list: RawObject, factor: Color) -> DriverResult<()> {
        self.check_open(list)?;
        self.gpu.count(|stats| {
            stats.blend_binds += 1;
            stats.last_blend_factor = factor;
        });
        Ok(())
    }

    fn draw_instanced(
        &self,
        list: RawObject,
        _vertex_count: u32,
        _instance_count: u32,
        _start_vertex: u32,
        _start_instance: u32,
    ) -> DriverResult<()> {
        self.check_pipeline(list, false)?;
        self.gpu.count(|stats| stats.draws_instanced += 1);
        Ok(())
    }

    fn draw_indexed_instanced(
        &self,
        list: RawObject,
        _index_count: u32,
        _instance_count: u32,
        _start_index: u32,
        _base_vertex: i32,
        _start_instance: u32,
    ) -> DriverResult<()> {
        self.check_pipeline(list, false)?;
        self.gpu.count(|stats| stats.draws_indexed_instanced += 1);
        Ok(())
    }

    fn dispatch(&self, list: RawObject, _x: u32, _y: u32, _z: u32) -> DriverResult<()> {
        self.check_pipeline(list, true)?;
        self.gpu.count(|stats| stats.dispatches += 1);
        Ok(())
    }

    fn copy_buffer_region(
        &self,
        list: RawObject,
        destination: RawObject,
        destination_offset: u64,
        source: RawObject,
        source_offset: u64,
        size: u64,
    ) -> DriverResult<()> {
        self.record(
            list,
            Command::CopyBufferRegion {
                destination,
                destination_offset,
                source,
                source_offset,
                size,
            },
        )?;
        self.gpu.count(|stats| stats.copies += 1);
        Ok(())
    }

    fn copy_resource(&self, list: RawObject, destination: RawObject, source: RawObject) -> DriverResult<()> {
        self.record(
            list,
            Command::CopyResource {
                destination,
                source,
            },
        )?;
        self.gpu.count(|stats| stats.copies += 1);
        Ok(())
    }

    fn copy_texture_region(
        &self,
        list: RawObject,
        destination: RawObject,
        destination_subresource: u32,
        source: RawObject,
        source_subresource: u32,
    ) -> DriverResult<()> {
        self.record(
            list,
            Command::CopyTextureRegion {
                destination,
                destination_subresource,
                source,
                source_subresource,
            },
        )?;
        self.gpu.count(|stats| stats.copies += 1);
        Ok(())
    }

    fn resolve_subresource(
        &self,
        list: RawObject,
        destination: RawObject,
        destination_subresource: u32,
        source: RawObject,
        source_subresource: u32,
    ) -> DriverResult<()> {
        self.record(
            list,
            Command::Resolve {
                destination,
                destination_subresource,
                source,
                source_subresource,
            },
        )?;
        self.gpu.count(|stats| stats.resolves += 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::native::BindFlags;
    use crate::graphics::software::SoftwareAdapter;
    use tessera_core::renderer::{TextureDescriptor, TextureFormat, TextureUsage};

    struct Recorder {
        driver: Arc<dyn ExplicitDriver>,
        queue: RawObject,
        list: RawObject,
    }

    fn recorder(adapter: &SoftwareAdapter) -> Recorder {
        let driver = adapter.open_explicit(true);
        let queue = driver.create_command_queue(QueueKind::Graphics).unwrap();
        let allocator = driver.create_command_allocator(QueueKind::Graphics).unwrap();
        let list = driver.create_command_list(QueueKind::Graphics, allocator).unwrap();
        Recorder { driver, queue, list }
    }

    fn render_target(driver: &dyn ExplicitDriver) -> (RawObject, DescriptorHandle) {
        let desc = TextureDescriptor::new_2d(2, 2, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET);
        let texture = driver
            .create_committed_resource(&ResourceDesc::texture(&desc, MemoryUsage::Default), ResourceState::COMMON)
            .unwrap();
        let heap = driver
            .create_descriptor_heap(DescriptorKind::RenderTarget, 4, false)
            .unwrap();
        let view = ViewDesc {
            kind: NativeViewKind::RenderTarget,
            format: TextureFormat::Rgba8Unorm,
            first_mip: 0,
            mip_count: 1,
            first_slice: 0,
            slice_count: 1,
        };
        driver.create_view(Some(texture), &view, heap.cpu_start).unwrap();
        (texture, heap.cpu_start)
    }

    #[test]
    fn list_lifecycle_rules() {
        let adapter = SoftwareAdapter::new("test");
        let r = recorder(&adapter);
        assert!(r.driver.execute_command_lists(r.queue, &[r.list]).is_err());
        r.driver.close_command_list(r.list).unwrap();
        assert!(r.driver.rs_set_viewports(r.list, &[]).is_err());
        r.driver.execute_command_lists(r.queue, &[r.list]).unwrap();
        assert_eq!(adapter.validation_messages().len(), 2);
    }

    #[test]
    fn clear_requires_render_target_state() {
        let adapter = SoftwareAdapter::new("test");
        let r = recorder(&adapter);
        let (texture, rtv) = render_target(r.driver.as_ref());
        r.driver
            .clear_render_target_view(r.list, rtv, Color::RED)
            .unwrap();
        r.driver.close_command_list(r.list).unwrap();
        assert!(r.driver.execute_command_lists(r.queue, &[r.list]).is_err());
        assert!(adapter.validation_messages()[0].contains(&format!("resource {}", texture.0)));
    }

    #[test]
    fn clear_and_read_back() {
        let adapter = SoftwareAdapter::new("test");
        let r = recorder(&adapter);
        let (texture, rtv) = render_target(r.driver.as_ref());
        let readback = r
            .driver
            .create_committed_resource(
                &ResourceDesc::buffer(16, BindFlags::EMPTY, MemoryUsage::Readback, 0),
                ResourceState::COPY_DEST,
            )
            .unwrap();
        let transition = |before, after| ResourceBarrier::Transition {
            resource: texture.0,
            before,
            after,
            split: SplitFlag::None,
        };
        r.driver
            .resource_barrier(r.list, &[transition(ResourceState::COMMON, ResourceState::RENDER_TARGET)])
            .unwrap();
        r.driver.clear_render_target_view(r.list, rtv, Color::RED).unwrap();
        r.driver
            .resource_barrier(r.list, &[transition(ResourceState::RENDER_TARGET, ResourceState::COPY_SOURCE)])
            .unwrap();
        r.driver.copy_texture_region(r.list, readback, 0, texture, 0).unwrap();
        r.driver.close_command_list(r.list).unwrap();
        r.driver.execute_command_lists(r.queue, &[r.list]).unwrap();

        let mut texels = [0u8; 16];
        r.driver.map(readback).unwrap();
        r.driver.read_mapped(readback, 0, &mut texels).unwrap();
        r.driver.unmap(readback);
        assert_eq!(texels.to_vec(), [255u8, 0, 0, 255].repeat(4));
        assert!(adapter.validation_messages().is_empty());
        assert_eq!(adapter.stats().transition_barriers, 2);
    }

    #[test]
    fn fences_complete_once_signaled() {
        let adapter = SoftwareAdapter::new("test");
        let r = recorder(&adapter);
        let fence = r.driver.create_fence(0).unwrap();
        assert!(r.driver.wait_for_fence(fence, 1).is_err());
        r.driver.queue_signal(r.queue, fence, 1).unwrap();
        assert_eq!(r.driver.fence_completed_value(fence), 1);
        r.driver.wait_for_fence(fence, 1).unwrap();
    }
}
