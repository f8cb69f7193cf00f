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


//! Per-frame-slot recording memory.
//!
//! Each of the [`MAX_FRAMES_IN_FLIGHT`] slots owns a command allocator, a pair
//! of shader-visible descriptor rings and an upload ring. A slot is only reset
//! after the fence value of the frame that last used it has completed.
//!
//! [`MAX_FRAMES_IN_FLIGHT`]: tessera_core::renderer::MAX_FRAMES_IN_FLIGHT

use crate::graphics::native::explicit::GpuDescriptorHandle;
use crate::graphics::native::{
    BindFlags, ExplicitDriver, MemoryUsage, NativeHandle, ObjectLifetime, RawObject, ResourceDesc,
};
use std::sync::Arc;
use tessera_core::renderer::lifetime::{DescriptorHandle, DescriptorKind, QueueKind, ResourceState};
use tessera_core::renderer::{DeviceDescriptor, GraphicsError};

/// Largest shader-visible sampler heap the native API allows.
const MAX_SAMPLER_RING: u32 = 2048;

/// Placement alignment of upload allocations, the constant buffer view alignment.
pub(crate) const UPLOAD_ALIGNMENT: u64 = 256;

/// A linear allocator over one shader-visible descriptor heap.
#[derive(Debug)]
pub(crate) struct DescriptorRing {
    heap: NativeHandle,
    kind: DescriptorKind,
    cpu_start: DescriptorHandle,
    gpu_start: GpuDescriptorHandle,
    increment: u32,
    capacity: u32,
    cursor: u32,
}

impl DescriptorRing {
    fn new(
        driver: &dyn ExplicitDriver,
        lifetime: &Arc<dyn ObjectLifetime>,
        kind: DescriptorKind,
        capacity: u32,
    ) -> Result<Self, GraphicsError> {
        let info = driver
            .create_descriptor_heap(kind, capacity, true)
            .map_err(|e| e.into_creation_error(format!("{kind:?} descriptor ring")))?;
        Ok(Self {
            heap: NativeHandle::from_raw(info.heap, lifetime.clone()),
            kind,
            cpu_start: info.cpu_start,
            gpu_start: info.gpu_start,
            increment: driver.descriptor_increment(kind),
            capacity,
            cursor: 0,
        })
    }

    pub(crate) fn heap(&self) -> RawObject {
        self.heap.raw()
    }

    pub(crate) fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub(crate) fn increment(&self) -> u32 {
        self.increment
    }

    pub(crate) fn remaining(&self) -> u32 {
        self.capacity - self.cursor
    }

    /// Reserves `count` consecutive descriptors, or `None` if the ring is full.
    pub(crate) fn allocate(&mut self, count: u32) -> Option<(DescriptorHandle, GpuDescriptorHandle)> {
        if count > self.capacity - self.cursor {
            return None;
        }
        let first = self.cursor;
        self.cursor += count;
        Some((
            self.cpu_start.offset(first, self.increment),
            self.gpu_start + first as u64 * self.increment as u64,
        ))
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

/// A persistently mapped upload-heap buffer handed out linearly.
#[derive(Debug)]
pub(crate) struct UploadRing {
    buffer: NativeHandle,
    size: u64,
    cursor: u64,
}

impl UploadRing {
    fn new(
        driver: &dyn ExplicitDriver,
        lifetime: &Arc<dyn ObjectLifetime>,
        size: u64,
    ) -> Result<Self, GraphicsError> {
        let desc = ResourceDesc::buffer(size, BindFlags::EMPTY, MemoryUsage::Upload, 0);
        let raw = driver
            .create_committed_resource(&desc, ResourceState::GENERIC_READ)
            .map_err(|e| e.into_creation_error("upload ring"))?;
        let buffer = NativeHandle::from_raw(raw, lifetime.clone());
        driver
            .map(raw)
            .map_err(|e| e.into_creation_error("upload ring mapping"))?;
        Ok(Self {
            buffer,
            size,
            cursor: 0,
        })
    }

    pub(crate) fn buffer(&self) -> RawObject {
        self.buffer.raw()
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    /// Copies `data` into the ring and returns its offset, or `None` if the
    /// ring has no room left this frame.
    pub(crate) fn write(
        &mut self,
        driver: &dyn ExplicitDriver,
        data: &[u8],
    ) -> Result<Option<u64>, GraphicsError> {
        let offset = self.cursor.next_multiple_of(UPLOAD_ALIGNMENT);
        let end = offset + data.len() as u64;
        if end > self.size {
            return Ok(None);
        }
        driver.write_mapped(self.buffer.raw(), offset as usize, data)?;
        self.cursor = end;
        Ok(Some(offset))
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

/// Everything one in-flight frame records into.
#[derive(Debug)]
pub(crate) struct FrameSlot {
    pub(crate) allocator: NativeHandle,
    /// Fence value signaled after this slot's last submission, 0 if never submitted.
    pub(crate) fence_value: u64,
    pub(crate) shader_resources: DescriptorRing,
    pub(crate) samplers: DescriptorRing,
    pub(crate) upload: UploadRing,
}

impl FrameSlot {
    pub(crate) fn new(
        driver: &dyn ExplicitDriver,
        lifetime: &Arc<dyn ObjectLifetime>,
        descriptor: &DeviceDescriptor,
    ) -> Result<Self, GraphicsError> {
        let allocator = driver
            .create_command_allocator(QueueKind::Graphics)
            .map_err(|e| e.into_creation_error("command allocator"))?;
        let allocator = NativeHandle::from_raw(allocator, lifetime.clone());
        let ring_size = descriptor.descriptor_ring_size.max(1);
        Ok(Self {
            allocator,
            fence_value: 0,
            shader_resources: DescriptorRing::new(driver, lifetime, DescriptorKind::ShaderResource, ring_size)?,
            samplers: DescriptorRing::new(
                driver,
                lifetime,
                DescriptorKind::Sampler,
                ring_size.min(MAX_SAMPLER_RING),
            )?,
            upload: UploadRing::new(driver, lifetime, descriptor.upload_ring_size.max(UPLOAD_ALIGNMENT))?,
        })
    }

    /// Rewinds the slot. The caller has waited for `fence_value`.
    pub(crate) fn reset(&mut self, driver: &dyn ExplicitDriver) -> Result<(), GraphicsError> {
        driver.reset_command_allocator(self.allocator.raw())?;
        self.shader_resources.reset();
        self.samplers.reset();
        self.upload.reset();
        Ok(())
    }

    pub(crate) fn heaps(&self) -> [RawObject; 2] {
        [self.shader_resources.heap(), self.samplers.heap()]
    }

    pub(crate) fn release_mappings(&self, driver: &dyn ExplicitDriver) {
        driver.unmap(self.upload.buffer());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::software::SoftwareAdapter;

    #[test]
    fn rings_hand_out_consecutive_ranges_until_full() {
        let adapter = SoftwareAdapter::new("rings");
        let driver = adapter.open_explicit(true);
        let lifetime = driver.lifetime();
        let mut ring = DescriptorRing::new(driver.as_ref(), &lifetime, DescriptorKind::ShaderResource, 4).unwrap();

        let (cpu, gpu) = ring.allocate(3).unwrap();
        let (next_cpu, next_gpu) = ring.allocate(1).unwrap();
        assert_eq!(next_cpu, cpu.offset(3, ring.increment()));
        assert_eq!(next_gpu, gpu + 3 * ring.increment() as u64);
        assert!(ring.allocate(1).is_none());

        ring.reset();
        assert_eq!(ring.allocate(4).map(|(cpu_start, _)| cpu_start), Some(cpu));
    }

    #[test]
    fn upload_ring_aligns_and_reports_exhaustion() {
        let adapter = SoftwareAdapter::new("upload");
        let driver = adapter.open_explicit(true);
        let lifetime = driver.lifetime();
        let mut ring = UploadRing::new(driver.as_ref(), &lifetime, 512).unwrap();

        assert_eq!(ring.write(driver.as_ref(), &[1; 64]).unwrap(), Some(0));
        assert_eq!(ring.write(driver.as_ref(), &[2; 64]).unwrap(), Some(256));
        assert_eq!(ring.write(driver.as_ref(), &[3; 64]).unwrap(), None);
        driver.unmap(ring.buffer());
    }
}
