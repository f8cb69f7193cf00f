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


//! GPU usage-state tracking and barrier batching for the explicit backend.
//!
//! Every buffer and texture created by the explicit backend carries a
//! [`ResourceStateCell`]. Command contexts route every state change through a
//! [`ResourceStateTracker`], which compares against the cell, queues the
//! matching [`ResourceBarrier`] and hands full batches to a [`BarrierSink`].

use crate::renderer::error::GraphicsError;
use crate::tessera_bitflags;
use std::sync::atomic::{AtomicU32, Ordering};

tessera_bitflags! {
    /// How the GPU is allowed to access a resource. Values match the native
    /// explicit API so they can be passed through unchanged.
    pub struct ResourceState: u32 {
        /// Shared, decayed state. Also the state required by present.
        const COMMON = 0;
        /// Alias of [`ResourceState::COMMON`] used for swapchain back buffers.
        const PRESENT = 0;
        /// Read as a vertex or constant buffer.
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        /// Read as an index buffer.
        const INDEX_BUFFER = 0x2;
        /// Written as a color attachment.
        const RENDER_TARGET = 0x4;
        /// Read and written through an unordered access view.
        const UNORDERED_ACCESS = 0x8;
        /// Written as a depth attachment.
        const DEPTH_WRITE = 0x10;
        /// Read-only depth attachment.
        const DEPTH_READ = 0x20;
        /// Read by non-pixel shader stages.
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        /// Read by the pixel shader stage.
        const PIXEL_SHADER_RESOURCE = 0x80;
        /// Read as indirect arguments.
        const INDIRECT_ARGUMENT = 0x200;
        /// Destination of a copy.
        const COPY_DEST = 0x400;
        /// Source of a copy.
        const COPY_SOURCE = 0x800;
        /// Destination of a multisample resolve.
        const RESOLVE_DEST = 0x1000;
        /// Source of a multisample resolve.
        const RESOLVE_SOURCE = 0x2000;
        /// Every read-only state an upload heap resource lives in.
        const GENERIC_READ = 0x1 | 0x2 | 0x40 | 0x80 | 0x200 | 0x800;
        /// Any shader stage may read the resource.
        const ALL_SHADER_RESOURCE = 0x40 | 0x80;
    }
}

impl ResourceState {
    /// States a compute-queue context may transition resources into.
    pub const COMPUTE_LEGAL: Self = Self::from_bits_truncate(
        Self::UNORDERED_ACCESS.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::COPY_DEST.bits()
            | Self::COPY_SOURCE.bits()
            | Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDIRECT_ARGUMENT.bits(),
    );

    /// Returns `true` if a compute-queue context may use this state.
    pub const fn is_compute_legal(&self) -> bool {
        Self::COMPUTE_LEGAL.contains(*self)
    }
}

const NO_TRANSITION: u32 = u32::MAX;

/// The tracked state of one GPU resource.
///
/// Only a [`ResourceStateTracker`] changes it. Atomics let the cell live inside
/// resources shared between the device tables and in-flight bindings.
#[derive(Debug)]
pub struct ResourceStateCell {
    current: AtomicU32,
    transitioning: AtomicU32,
}

impl ResourceStateCell {
    /// A cell whose resource was created in `initial`.
    pub fn new(initial: ResourceState) -> Self {
        Self {
            current: AtomicU32::new(initial.bits()),
            transitioning: AtomicU32::new(NO_TRANSITION),
        }
    }

    /// The state the most recent transition targeted.
    pub fn current(&self) -> ResourceState {
        ResourceState::from_bits_truncate(self.current.load(Ordering::Acquire))
    }

    /// The target of an open split barrier, if any.
    pub fn transitioning(&self) -> Option<ResourceState> {
        match self.transitioning.load(Ordering::Acquire) {
            NO_TRANSITION => None,
            bits => Some(ResourceState::from_bits_truncate(bits)),
        }
    }

    fn set_current(&self, state: ResourceState) {
        self.current.store(state.bits(), Ordering::Release);
    }

    fn set_transitioning(&self, state: Option<ResourceState>) {
        let bits = state.map_or(NO_TRANSITION, |s| s.bits());
        self.transitioning.store(bits, Ordering::Release);
    }
}

/// Which half of a split barrier a transition is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SplitFlag {
    /// A complete transition.
    #[default]
    None,
    /// Opens a split barrier; the resource may not be used until the end half.
    BeginOnly,
    /// Closes a split barrier.
    EndOnly,
}

/// One barrier, ready to be handed to the native command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceBarrier {
    /// A state transition of the whole resource.
    Transition {
        /// The native object id.
        resource: u64,
        /// State before the barrier.
        before: ResourceState,
        /// State after the barrier.
        after: ResourceState,
        /// Split-barrier half.
        split: SplitFlag,
    },
    /// Orders unordered-access writes against later accesses.
    UnorderedAccess {
        /// The native object id.
        resource: u64,
    },
}

/// Receives batches of barriers, typically a command list.
pub trait BarrierSink {
    /// Records every barrier in `barriers` with one native call.
    fn submit_barriers(&mut self, barriers: &[ResourceBarrier]) -> Result<(), GraphicsError>;
}

/// The queue a command context records for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueKind {
    /// The direct (graphics) queue.
    #[default]
    Graphics,
    /// An async compute queue.
    Compute,
}

/// Computes, batches and flushes resource barriers for one command context.
#[derive(Debug)]
pub struct ResourceStateTracker {
    queue: QueueKind,
    pending: Vec<ResourceBarrier>,
    capacity: usize,
}

impl ResourceStateTracker {
    /// Creates a tracker that flushes automatically every `capacity` barriers.
    pub fn new(queue: QueueKind, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue,
            pending: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// The queue this tracker validates against.
    pub fn queue(&self) -> QueueKind {
        self.queue
    }

    /// Barriers queued but not yet flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Moves `resource` into `new_state`.
    ///
    /// No barrier is queued if the resource is already there, except for
    /// `UNORDERED_ACCESS`, which always gets a UAV hazard barrier. A transition
    /// matching an open split barrier closes it with an end-only barrier.
    pub fn transition(
        &mut self,
        resource: u64,
        cell: &ResourceStateCell,
        new_state: ResourceState,
        flush_immediate: bool,
        sink: &mut dyn BarrierSink,
    ) -> Result<(), GraphicsError> {
        self.check_queue(new_state)?;

        let mut old_state = cell.current();
        if let Some(split_target) = cell.transitioning() {
            self.push(
                ResourceBarrier::Transition {
                    resource,
                    before: old_state,
                    after: split_target,
                    split: SplitFlag::EndOnly,
                },
                sink,
            )?;
            cell.set_transitioning(None);
            cell.set_current(split_target);
            old_state = split_target;
        }

        if old_state != new_state {
            self.push(
                ResourceBarrier::Transition {
                    resource,
                    before: old_state,
                    after: new_state,
                    split: SplitFlag::None,
                },
                sink,
            )?;
            cell.set_current(new_state);
        } else if new_state == ResourceState::UNORDERED_ACCESS {
            self.push(ResourceBarrier::UnorderedAccess { resource }, sink)?;
        }

        if flush_immediate {
            self.flush(sink)?;
        }
        Ok(())
    }

    /// Opens a split barrier towards `new_state`.
    ///
    /// The resource keeps its current state until a later [`transition`] to
    /// the same state closes the split.
    ///
    /// [`transition`]: ResourceStateTracker::transition
    pub fn begin_transition(
        &mut self,
        resource: u64,
        cell: &ResourceStateCell,
        new_state: ResourceState,
        flush_immediate: bool,
        sink: &mut dyn BarrierSink,
    ) -> Result<(), GraphicsError> {
        self.check_queue(new_state)?;

        if let Some(split_target) = cell.transitioning() {
            if split_target == new_state {
                return Ok(());
            }
            self.transition(resource, cell, split_target, false, sink)?;
        }

        let old_state = cell.current();
        if old_state != new_state {
            self.push(
                ResourceBarrier::Transition {
                    resource,
                    before: old_state,
                    after: new_state,
                    split: SplitFlag::BeginOnly,
                },
                sink,
            )?;
            cell.set_transitioning(Some(new_state));
        }

        if flush_immediate {
            self.flush(sink)?;
        }
        Ok(())
    }

    /// Queues an unordered-access hazard barrier.
    pub fn insert_uav_barrier(
        &mut self,
        resource: u64,
        flush_immediate: bool,
        sink: &mut dyn BarrierSink,
    ) -> Result<(), GraphicsError> {
        self.push(ResourceBarrier::UnorderedAccess { resource }, sink)?;
        if flush_immediate {
            self.flush(sink)?;
        }
        Ok(())
    }

    /// Hands every queued barrier to `sink` in a single call.
    pub fn flush(&mut self, sink: &mut dyn BarrierSink) -> Result<(), GraphicsError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let result = sink.submit_barriers(&self.pending);
        self.pending.clear();
        result
    }

    /// Drops queued barriers without recording them, used when a command list is reset.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    fn push(
        &mut self,
        barrier: ResourceBarrier,
        sink: &mut dyn BarrierSink,
    ) -> Result<(), GraphicsError> {
        self.pending.push(barrier);
        if self.pending.len() >= self.capacity {
            self.flush(sink)?;
        }
        Ok(())
    }

    fn check_queue(&self, state: ResourceState) -> Result<(), GraphicsError> {
        if self.queue == QueueKind::Compute && !state.is_compute_legal() {
            return Err(GraphicsError::InvalidState(format!(
                "{state:?} cannot be used on a compute queue"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<Vec<ResourceBarrier>>,
    }

    impl RecordingSink {
        fn total(&self) -> usize {
            self.calls.iter().map(Vec::len).sum()
        }
    }

    impl BarrierSink for RecordingSink {
        fn submit_barriers(&mut self, barriers: &[ResourceBarrier]) -> Result<(), GraphicsError> {
            self.calls.push(barriers.to_vec());
            Ok(())
        }
    }

    #[test]
    fn repeated_transition_emits_one_barrier() {
        // Arrange
        let cell = ResourceStateCell::new(ResourceState::COMMON);
        let mut tracker = ResourceStateTracker::new(QueueKind::Graphics, 16);
        let mut sink = RecordingSink::default();

        // Act
        tracker.transition(1, &cell, ResourceState::RENDER_TARGET, false, &mut sink).unwrap();
        tracker.transition(1, &cell, ResourceState::RENDER_TARGET, false, &mut sink).unwrap();
        tracker.flush(&mut sink).unwrap();

        // Assert
        assert_eq!(sink.calls.len(), 1);
        assert_eq!(
            sink.calls[0],
            vec![ResourceBarrier::Transition {
                resource: 1,
                before: ResourceState::COMMON,
                after: ResourceState::RENDER_TARGET,
                split: SplitFlag::None,
            }]
        );
        assert_eq!(cell.current(), ResourceState::RENDER_TARGET);
    }

    #[test]
    fn unordered_access_always_emits_a_hazard_barrier() {
        let cell = ResourceStateCell::new(ResourceState::COMMON);
        let mut tracker = ResourceStateTracker::new(QueueKind::Graphics, 16);
        let mut sink = RecordingSink::default();

        tracker.transition(7, &cell, ResourceState::UNORDERED_ACCESS, false, &mut sink).unwrap();
        tracker.transition(7, &cell, ResourceState::UNORDERED_ACCESS, false, &mut sink).unwrap();
        tracker.flush(&mut sink).unwrap();

        assert_eq!(sink.total(), 2);
        assert_eq!(sink.calls[0][1], ResourceBarrier::UnorderedAccess { resource: 7 });
    }

    #[test]
    fn batch_flushes_when_full() {
        let cells: Vec<_> = (0..17).map(|_| ResourceStateCell::new(ResourceState::COMMON)).collect();
        let mut tracker = ResourceStateTracker::new(QueueKind::Graphics, 16);
        let mut sink = RecordingSink::default();

        for (i, cell) in cells.iter().enumerate() {
            tracker
                .transition(i as u64, cell, ResourceState::COPY_DEST, false, &mut sink)
                .unwrap();
        }

        assert_eq!(sink.calls.len(), 1);
        assert_eq!(sink.calls[0].len(), 16);
        assert_eq!(tracker.pending_len(), 1);
    }

    #[test]
    fn flush_immediate_submits_right_away() {
        let cell = ResourceStateCell::new(ResourceState::COMMON);
        let mut tracker = ResourceStateTracker::new(QueueKind::Graphics, 16);
        let mut sink = RecordingSink::default();

        tracker.transition(3, &cell, ResourceState::COPY_SOURCE, true, &mut sink).unwrap();

        assert_eq!(sink.calls.len(), 1);
        assert_eq!(tracker.pending_len(), 0);
    }

    #[test]
    fn split_barrier_is_closed_by_matching_transition() {
        let cell = ResourceStateCell::new(ResourceState::RENDER_TARGET);
        let mut tracker = ResourceStateTracker::new(QueueKind::Graphics, 16);
        let mut sink = RecordingSink::default();

        tracker
            .begin_transition(2, &cell, ResourceState::PIXEL_SHADER_RESOURCE, false, &mut sink)
            .unwrap();
        assert_eq!(cell.current(), ResourceState::RENDER_TARGET);
        assert_eq!(cell.transitioning(), Some(ResourceState::PIXEL_SHADER_RESOURCE));

        tracker
            .transition(2, &cell, ResourceState::PIXEL_SHADER_RESOURCE, false, &mut sink)
            .unwrap();
        tracker.flush(&mut sink).unwrap();

        let splits: Vec<_> = sink.calls[0]
            .iter()
            .map(|b| match b {
                ResourceBarrier::Transition { split, .. } => *split,
                ResourceBarrier::UnorderedAccess { .. } => SplitFlag::None,
            })
            .collect();
        assert_eq!(splits, vec![SplitFlag::BeginOnly, SplitFlag::EndOnly]);
        assert_eq!(cell.current(), ResourceState::PIXEL_SHADER_RESOURCE);
        assert_eq!(cell.transitioning(), None);
    }

    #[test]
    fn mismatched_transition_closes_the_split_first() {
        let cell = ResourceStateCell::new(ResourceState::RENDER_TARGET);
        let mut tracker = ResourceStateTracker::new(QueueKind::Graphics, 16);
        let mut sink = RecordingSink::default();

        tracker
            .begin_transition(2, &cell, ResourceState::PIXEL_SHADER_RESOURCE, false, &mut sink)
            .unwrap();
        tracker
            .transition(2, &cell, ResourceState::COPY_SOURCE, true, &mut sink)
            .unwrap();

        assert_eq!(sink.total(), 3);
        assert_eq!(
            sink.calls[0][2],
            ResourceBarrier::Transition {
                resource: 2,
                before: ResourceState::PIXEL_SHADER_RESOURCE,
                after: ResourceState::COPY_SOURCE,
                split: SplitFlag::None,
            }
        );
    }

    #[test]
    fn compute_queue_rejects_graphics_states() {
        let cell = ResourceStateCell::new(ResourceState::COMMON);
        let mut tracker = ResourceStateTracker::new(QueueKind::Compute, 16);
        let mut sink = RecordingSink::default();

        let result = tracker.transition(1, &cell, ResourceState::RENDER_TARGET, false, &mut sink);

        assert!(matches!(result, Err(GraphicsError::InvalidState(_))));
        assert_eq!(cell.current(), ResourceState::COMMON);
        assert!(tracker
            .transition(1, &cell, ResourceState::UNORDERED_ACCESS, false, &mut sink)
            .is_ok());
    }

    #[test]
    fn generic_read_contains_the_read_states() {
        assert!(ResourceState::GENERIC_READ.contains(ResourceState::COPY_SOURCE));
        assert!(ResourceState::GENERIC_READ.contains(ResourceState::INDEX_BUFFER));
        assert!(!ResourceState::GENERIC_READ.intersects(ResourceState::COPY_DEST));
    }
}
