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


//! Shadow copies of bound state.
//!
//! Binding calls only write the "bound" half of a shadow. At draw or dispatch
//! time the backend asks for what changed since the last push, pushes exactly
//! that, and marks it applied.

use crate::renderer::error::GraphicsError;
use std::ops::Range;

/// Vertex buffer slots.
pub const MAX_VERTEX_BUFFERS: usize = 8;
/// Constant buffer slots per shader stage.
pub const MAX_CONSTANT_BUFFERS: usize = 4;
/// Sampler slots per shader stage.
pub const MAX_SAMPLERS: usize = 8;
/// Shader resource slots per shader stage.
pub const MAX_SHADER_RESOURCES: usize = 16;
/// Unordered access slots (compute only).
pub const MAX_UNORDERED_ACCESS: usize = 8;
/// Color attachments per render pass.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

/// A fixed array of binding slots with a record of what the backend last received.
#[derive(Debug, Clone)]
pub struct SlotShadow<T, const N: usize> {
    bound: [Option<T>; N],
    // `None` when the backend's copy is unknown; everything is then dirty.
    applied: Option<[Option<T>; N]>,
}

impl<T: Clone + PartialEq, const N: usize> Default for SlotShadow<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + PartialEq, const N: usize> SlotShadow<T, N> {
    /// Every slot unset, matching a freshly cleared backend.
    pub fn new() -> Self {
        Self {
            bound: std::array::from_fn(|_| None),
            applied: Some(std::array::from_fn(|_| None)),
        }
    }

    /// The number of slots.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Writes `value` into `slot`.
    pub fn set(&mut self, slot: u32, value: Option<T>) -> Result<(), GraphicsError> {
        let entry = self.bound.get_mut(slot as usize).ok_or_else(|| {
            GraphicsError::InvalidState(format!("slot {slot} is out of range (0..{N})"))
        })?;
        *entry = value;
        Ok(())
    }

    /// The value bound to `slot`, if any.
    pub fn get(&self, slot: usize) -> Option<&T> {
        self.bound.get(slot).and_then(Option::as_ref)
    }

    /// Every slot's bound value.
    pub fn bound(&self) -> &[Option<T>; N] {
        &self.bound
    }

    /// Iterates over `(slot, value)` for every set slot.
    pub fn iter_set(&self) -> impl Iterator<Item = (usize, &T)> {
        self.bound
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (i, v)))
    }

    /// Returns `true` if any slot differs from what the backend last received.
    pub fn is_dirty(&self) -> bool {
        self.dirty_range().is_some()
    }

    /// The smallest contiguous slot range covering every changed slot.
    pub fn dirty_range(&self) -> Option<Range<usize>> {
        let Some(applied) = &self.applied else {
            return Some(0..N);
        };
        let mut changed = self
            .bound
            .iter()
            .zip(applied.iter())
            .enumerate()
            .filter(|(_, (bound, applied))| bound != applied)
            .map(|(i, _)| i);
        let first = changed.next()?;
        let last = changed.last().unwrap_or(first);
        Some(first..last + 1)
    }

    /// Records that the backend now holds exactly the bound values.
    pub fn mark_applied(&mut self) {
        self.applied = Some(self.bound.clone());
    }

    /// Forgets what the backend holds, so the next push covers every slot.
    pub fn invalidate(&mut self) {
        self.applied = None;
    }

    /// Unbinds every slot, matching a backend whose state was just cleared.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// A single piece of bound state (pipeline, topology, a state object...).
#[derive(Debug, Clone, PartialEq)]
pub struct StateShadow<T> {
    bound: Option<T>,
    applied: Option<T>,
}

impl<T> Default for StateShadow<T> {
    fn default() -> Self {
        Self {
            bound: None,
            applied: None,
        }
    }
}

impl<T: Clone + PartialEq> StateShadow<T> {
    /// Creates an unset shadow.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the bound value.
    pub fn set(&mut self, value: Option<T>) {
        self.bound = value;
    }

    /// The bound value.
    pub fn get(&self) -> Option<&T> {
        self.bound.as_ref()
    }

    /// Returns the bound value if it differs from the applied one, marking it applied.
    pub fn take_change(&mut self) -> Option<T> {
        if self.bound == self.applied {
            return None;
        }
        self.applied = self.bound.clone();
        self.bound.clone()
    }

    /// Forgets the applied value so the next [`take_change`](Self::take_change) reports the bound one.
    pub fn invalidate(&mut self) {
        self.applied = None;
    }

    /// Clears both halves.
    pub fn reset(&mut self) {
        self.bound = None;
        self.applied = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_shadow_is_clean() {
        let shadow: SlotShadow<u32, 4> = SlotShadow::new();
        assert!(!shadow.is_dirty());
    }

    #[test]
    fn dirty_range_spans_changed_slots_only() {
        let mut shadow: SlotShadow<u32, 8> = SlotShadow::new();
        shadow.set(2, Some(5)).unwrap();
        shadow.set(5, Some(6)).unwrap();
        assert_eq!(shadow.dirty_range(), Some(2..6));

        shadow.mark_applied();
        assert_eq!(shadow.dirty_range(), None);

        shadow.set(5, Some(6)).unwrap();
        assert!(!shadow.is_dirty());
        shadow.set(5, None).unwrap();
        assert_eq!(shadow.dirty_range(), Some(5..6));
    }

    #[test]
    fn invalidated_shadow_is_fully_dirty() {
        let mut shadow: SlotShadow<u32, 3> = SlotShadow::new();
        shadow.invalidate();
        assert_eq!(shadow.dirty_range(), Some(0..3));
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let mut shadow: SlotShadow<u32, 2> = SlotShadow::new();
        assert!(matches!(shadow.set(2, Some(1)), Err(GraphicsError::InvalidState(_))));
    }

    #[test]
    fn state_shadow_reports_each_change_once() {
        let mut shadow = StateShadow::new();
        shadow.set(Some(3));
        assert_eq!(shadow.take_change(), Some(3));
        assert_eq!(shadow.take_change(), None);
        shadow.set(Some(3));
        assert_eq!(shadow.take_change(), None);
        shadow.set(Some(4));
        assert_eq!(shadow.take_change(), Some(4));
    }
}
