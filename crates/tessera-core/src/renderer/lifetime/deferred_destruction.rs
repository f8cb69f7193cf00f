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


//! Frame-stamped deferred release of backend objects.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct QueueState<T> {
    pending: VecDeque<(T, u64)>,
    current_frame: u64,
    tearing_down: bool,
}

/// Holds released backend objects until the GPU can no longer reference them.
///
/// An item deferred while the queue's frame is `f` is handed back by
/// [`process`](Self::process) once `f + window < current_frame`: never before
/// frame `f + window`, always by frame `f + window + 1`. Items are returned to
/// the caller rather than dropped under the lock, so releasing them never
/// blocks other deferrals.
#[derive(Debug)]
pub struct DeferredDestructionQueue<T> {
    window: u64,
    state: Mutex<QueueState<T>>,
}

impl<T> DeferredDestructionQueue<T> {
    /// Creates an empty queue retiring items after `window` frames.
    pub fn new(window: usize) -> Self {
        Self {
            window: window as u64,
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                current_frame: 0,
                tearing_down: false,
            }),
        }
    }

    /// Queues `item` stamped with the current frame.
    ///
    /// During teardown nothing is queued and the item is handed straight back
    /// for immediate release.
    pub fn defer(&self, item: T) -> Option<T> {
        let mut state = self.lock();
        if state.tearing_down {
            return Some(item);
        }
        let frame = state.current_frame;
        state.pending.push_back((item, frame));
        None
    }

    /// Advances the queue to `current_frame` and returns every item that left the window.
    ///
    /// Scanning stops at the first item still in flight; items are stamped in
    /// non-decreasing frame order.
    pub fn process(&self, current_frame: u64) -> Vec<T> {
        let mut state = self.lock();
        state.current_frame = state.current_frame.max(current_frame);
        let mut retired = Vec::new();
        while let Some((_, created)) = state.pending.front() {
            if created + self.window >= current_frame {
                break;
            }
            if let Some((item, _)) = state.pending.pop_front() {
                retired.push(item);
            }
        }
        retired
    }

    /// Returns every pending item regardless of age.
    ///
    /// Only valid right after a full GPU idle wait.
    pub fn drain_all(&self) -> Vec<T> {
        self.lock().pending.drain(..).map(|(item, _)| item).collect()
    }

    /// Switches to teardown mode and returns every pending item.
    pub fn begin_teardown(&self) -> Vec<T> {
        let mut state = self.lock();
        state.tearing_down = true;
        state.pending.drain(..).map(|(item, _)| item).collect()
    }

    /// The number of items waiting to be retired.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Returns `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The frame newly deferred items are stamped with.
    pub fn current_frame(&self) -> u64 {
        self.lock().current_frame
    }

    /// The in-flight window, in frames.
    pub fn window(&self) -> u64 {
        self.window
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::common::MAX_FRAMES_IN_FLIGHT;

    #[test]
    fn item_survives_the_in_flight_window() {
        // Arrange
        let queue = DeferredDestructionQueue::new(MAX_FRAMES_IN_FLIGHT);
        queue.process(5);
        queue.defer("texture");

        // Act / Assert
        assert!(queue.process(6).is_empty());
        assert!(queue.process(7).is_empty());
        assert_eq!(queue.process(8), vec!["texture"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn retirement_stops_at_the_first_item_in_flight() {
        let queue = DeferredDestructionQueue::new(2);
        queue.defer(1);
        queue.process(1);
        queue.defer(2);
        queue.process(2);
        queue.defer(3);

        assert_eq!(queue.process(3), vec![1]);
        assert_eq!(queue.process(4), vec![2]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.process(5), vec![3]);
    }

    #[test]
    fn teardown_hands_items_back() {
        let queue = DeferredDestructionQueue::new(2);
        queue.defer(10);
        queue.defer(11);

        assert_eq!(queue.begin_teardown(), vec![10, 11]);
        assert_eq!(queue.defer(12), Some(12));
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_all_ignores_age() {
        let queue = DeferredDestructionQueue::new(2);
        queue.process(9);
        queue.defer('a');
        assert_eq!(queue.drain_all(), vec!['a']);
        assert_eq!(queue.defer('b'), None);
    }

    #[test]
    fn frame_counter_never_moves_backwards() {
        let queue: DeferredDestructionQueue<u8> = DeferredDestructionQueue::new(2);
        queue.process(4);
        queue.process(2);
        assert_eq!(queue.current_frame(), 4);
    }
}
