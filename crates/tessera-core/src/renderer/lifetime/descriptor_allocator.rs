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


//! CPU descriptor-handle allocation for the explicit backend.
//!
//! Each [`DescriptorAllocator`] serves one [`DescriptorKind`]. It owns a list of
//! non-shader-visible heaps ("blocks") obtained from a [`DescriptorBlockSource`],
//! hands out handles from a free list, and grows by one block whenever the free
//! list runs dry. Handles are plain values; the allocator never checks who frees
//! what.

use crate::renderer::api::settings::DescriptorBlockSizes;
use crate::renderer::error::GraphicsError;
use std::sync::Mutex;

/// The kind of view a descriptor heap stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// Shader resource, unordered access and constant buffer views.
    ShaderResource,
    /// Samplers.
    Sampler,
    /// Render target views.
    RenderTarget,
    /// Depth-stencil views.
    DepthStencil,
}

impl DescriptorKind {
    /// Every kind, in allocator order.
    pub const ALL: [DescriptorKind; 4] = [
        DescriptorKind::ShaderResource,
        DescriptorKind::Sampler,
        DescriptorKind::RenderTarget,
        DescriptorKind::DepthStencil,
    ];

    /// The block capacity configured for this kind.
    pub fn block_size(&self, sizes: &DescriptorBlockSizes) -> u32 {
        match self {
            DescriptorKind::ShaderResource => sizes.shader_resource,
            DescriptorKind::Sampler => sizes.sampler,
            DescriptorKind::RenderTarget => sizes.render_target,
            DescriptorKind::DepthStencil => sizes.depth_stencil,
        }
    }

    /// A dense index usable for per-kind arrays.
    pub const fn index(&self) -> usize {
        match self {
            DescriptorKind::ShaderResource => 0,
            DescriptorKind::Sampler => 1,
            DescriptorKind::RenderTarget => 2,
            DescriptorKind::DepthStencil => 3,
        }
    }
}

/// A heap-relative CPU descriptor address. Zero means "not allocated".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DescriptorHandle(pub u64);

impl DescriptorHandle {
    /// The unallocated sentinel.
    pub const NULL: Self = Self(0);

    /// Returns `true` for the unallocated sentinel.
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// The handle `index` descriptors after this one.
    pub const fn offset(&self, index: u32, stride: u32) -> Self {
        Self(self.0 + index as u64 * stride as u64)
    }
}

/// A freshly created descriptor heap.
#[derive(Debug)]
pub struct DescriptorBlock<H> {
    /// The backend heap object, kept alive until teardown.
    pub heap: H,
    /// CPU address of the first descriptor in the heap.
    pub base: DescriptorHandle,
    /// Distance between consecutive descriptors (the kind's increment size).
    pub stride: u32,
}

/// Creates backend descriptor heaps on behalf of an allocator.
pub trait DescriptorBlockSource<H>: Send + Sync {
    /// Creates a non-shader-visible heap of `capacity` descriptors of `kind`.
    fn create_block(
        &self,
        kind: DescriptorKind,
        capacity: u32,
    ) -> Result<DescriptorBlock<H>, GraphicsError>;
}

#[derive(Debug)]
struct AllocatorState<H> {
    free: Vec<DescriptorHandle>,
    blocks: Vec<H>,
}

/// A growable pool of descriptor handles of a single kind.
#[derive(Debug)]
pub struct DescriptorAllocator<H> {
    kind: DescriptorKind,
    block_size: u32,
    state: Mutex<AllocatorState<H>>,
}

impl<H> DescriptorAllocator<H> {
    /// Creates an allocator and seeds it with its first block.
    pub fn new(
        kind: DescriptorKind,
        block_size: u32,
        source: &dyn DescriptorBlockSource<H>,
    ) -> Result<Self, GraphicsError> {
        if block_size == 0 {
            return Err(GraphicsError::creation_failed(
                "descriptor allocator",
                format!("{kind:?} block size must be non-zero"),
            ));
        }
        let allocator = Self {
            kind,
            block_size,
            state: Mutex::new(AllocatorState {
                free: Vec::new(),
                blocks: Vec::new(),
            }),
        };
        {
            let mut state = allocator.lock();
            allocator.grow(&mut state, source)?;
        }
        Ok(allocator)
    }

    /// The kind of descriptor this allocator hands out.
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    /// Takes a handle from the free list, growing by one block if it is empty.
    ///
    /// Only fails when the backend cannot create a new heap.
    pub fn allocate(
        &self,
        source: &dyn DescriptorBlockSource<H>,
    ) -> Result<DescriptorHandle, GraphicsError> {
        let mut state = self.lock();
        if state.free.is_empty() {
            self.grow(&mut state, source)?;
        }
        state
            .free
            .pop()
            .ok_or_else(|| GraphicsError::invalid_state("descriptor free list empty after growth"))
    }

    /// Returns a handle to the free list.
    pub fn free(&self, handle: DescriptorHandle) {
        if handle.is_null() {
            return;
        }
        self.lock().free.push(handle);
    }

    /// The number of heaps created so far.
    pub fn block_count(&self) -> usize {
        self.lock().blocks.len()
    }

    /// The number of handles currently available without growing.
    pub fn free_count(&self) -> usize {
        self.lock().free.len()
    }

    /// Empties the allocator and hands back every heap for release.
    pub fn teardown(&self) -> Vec<H> {
        let mut state = self.lock();
        state.free.clear();
        std::mem::take(&mut state.blocks)
    }

    fn grow(
        &self,
        state: &mut AllocatorState<H>,
        source: &dyn DescriptorBlockSource<H>,
    ) -> Result<(), GraphicsError> {
        let block = source.create_block(self.kind, self.block_size)?;
        log::debug!(
            "Growing {:?} descriptor allocator by {} handles (block #{})",
            self.kind,
            self.block_size,
            state.blocks.len() + 1
        );
        // Reversed so pops come out in ascending address order.
        state.free.extend(
            (0..self.block_size)
                .rev()
                .map(|i| block.base.offset(i, block.stride)),
        );
        state.blocks.push(block.heap);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AllocatorState<H>> {
        // A poisoned allocator only ever holds plain handles; keep using it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingSource {
        blocks: AtomicU64,
    }

    impl DescriptorBlockSource<u64> for CountingSource {
        fn create_block(
            &self,
            _kind: DescriptorKind,
            _capacity: u32,
        ) -> Result<DescriptorBlock<u64>, GraphicsError> {
            let index = self.blocks.fetch_add(1, Ordering::SeqCst);
            Ok(DescriptorBlock {
                heap: index,
                base: DescriptorHandle(0x1000 * (index + 1)),
                stride: 32,
            })
        }
    }

    struct FailingSource;

    impl DescriptorBlockSource<u64> for FailingSource {
        fn create_block(
            &self,
            _kind: DescriptorKind,
            _capacity: u32,
        ) -> Result<DescriptorBlock<u64>, GraphicsError> {
            Err(GraphicsError::creation_failed("descriptor heap", "out of memory"))
        }
    }

    #[test]
    fn new_allocator_is_seeded_with_one_block() {
        let source = CountingSource { blocks: AtomicU64::new(0) };
        let allocator = DescriptorAllocator::new(DescriptorKind::RenderTarget, 8, &source).unwrap();
        assert_eq!(allocator.block_count(), 1);
        assert_eq!(allocator.free_count(), 8);
    }

    #[test]
    fn exhausting_a_block_grows_exactly_once() {
        // Arrange
        let source = CountingSource { blocks: AtomicU64::new(0) };
        let allocator = DescriptorAllocator::new(DescriptorKind::Sampler, 4, &source).unwrap();

        // Act
        let handles: Vec<_> = (0..5).map(|_| allocator.allocate(&source).unwrap()).collect();

        // Assert
        assert_eq!(allocator.block_count(), 2);
        assert_eq!(allocator.free_count(), 3);
        let mut all: HashSet<_> = handles.into_iter().collect();
        while allocator.free_count() > 0 {
            all.insert(allocator.allocate(&source).unwrap());
        }
        assert_eq!(all.len(), 8);
        assert_eq!(allocator.block_count(), 2);
    }

    #[test]
    fn handles_are_strided_from_the_block_base() {
        let source = CountingSource { blocks: AtomicU64::new(0) };
        let allocator = DescriptorAllocator::new(DescriptorKind::ShaderResource, 3, &source).unwrap();
        let first = allocator.allocate(&source).unwrap();
        let second = allocator.allocate(&source).unwrap();
        assert_eq!(first, DescriptorHandle(0x1000));
        assert_eq!(second, DescriptorHandle(0x1000 + 32));
    }

    #[test]
    fn freed_handles_are_recycled_before_growing() {
        let source = CountingSource { blocks: AtomicU64::new(0) };
        let allocator = DescriptorAllocator::new(DescriptorKind::DepthStencil, 1, &source).unwrap();
        let handle = allocator.allocate(&source).unwrap();
        allocator.free(handle);
        assert_eq!(allocator.allocate(&source).unwrap(), handle);
        assert_eq!(allocator.block_count(), 1);
    }

    #[test]
    fn seeding_failure_is_reported() {
        let result = DescriptorAllocator::new(DescriptorKind::Sampler, 4, &FailingSource);
        assert!(matches!(
            result,
            Err(GraphicsError::ResourceCreationFailed { .. })
        ));
    }

    #[test]
    fn teardown_returns_every_block() {
        let source = CountingSource { blocks: AtomicU64::new(0) };
        let allocator = DescriptorAllocator::new(DescriptorKind::Sampler, 2, &source).unwrap();
        for _ in 0..5 {
            allocator.allocate(&source).unwrap();
        }
        assert_eq!(allocator.teardown(), vec![0, 1, 2]);
        assert_eq!(allocator.free_count(), 0);
    }
}
