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


//! Device-level counters.

/// A snapshot of a device's bookkeeping, returned by `GraphicsDevice::stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStats {
    /// Frames completed through `end_frame`.
    pub frame_count: u64,
    /// Live buffers.
    pub live_buffers: usize,
    /// Live textures, including swapchain back buffers.
    pub live_textures: usize,
    /// Live samplers.
    pub live_samplers: usize,
    /// Live pipelines.
    pub live_pipelines: usize,
    /// Live swapchains.
    pub live_swapchains: usize,
    /// Released backend objects still waiting out the in-flight window.
    pub pending_releases: usize,
}
