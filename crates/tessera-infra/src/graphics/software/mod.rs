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


//! A CPU implementation of both native driver interfaces.
//!
//! The software adapter plays the role a WARP device plays on Windows: it is
//! always available, executes every command on the CPU and keeps real texel
//! memory, so rendering results can be read back and compared. It also counts
//! every driver call in [`DriverStats`], which makes redundant-state
//! elimination, barrier batching and view creation observable from tests.
//!
//! Opening a device with validation enabled turns on the debug layer: calls
//! breaking a driver rule fail with [`DriverError::InvalidCall`] and the message
//! is kept in [`SoftwareAdapter::validation_messages`].
//!
//! [`DriverError::InvalidCall`]: crate::graphics::native::DriverError::InvalidCall

mod explicit;
mod gpu;
mod immediate;
mod texel;

pub use self::explicit::SoftwareExplicitDriver;
pub use self::immediate::SoftwareImmediateDriver;

use self::gpu::SoftwareGpu;
use crate::graphics::native::{ExplicitDriver, ImmediateDriver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tessera_core::renderer::{
    Color, FeatureLevel, GraphicsAdapterInfo, GraphicsBackendType, RendererDeviceType,
};

/// Call counters of a software adapter, shared by every device opened on it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriverStats {
    /// Driver objects created.
    pub objects_created: u64,
    /// Driver objects destroyed after their last reference was released.
    pub objects_released: u64,
    /// Driver objects currently alive.
    pub live_objects: u64,
    /// Views created (immediate) or view descriptors written (explicit).
    pub views_created: u64,
    /// Samplers created or written.
    pub samplers_created: u64,
    /// Descriptors copied between heaps.
    pub descriptors_copied: u64,
    /// Descriptor heaps created.
    pub heaps_created: u64,
    /// Render target and depth-stencil clears.
    pub clears: u64,
    /// Discard hints.
    pub discards: u64,
    /// Non-indexed, non-instanced draws.
    pub draws: u64,
    /// Non-indexed instanced draws.
    pub draws_instanced: u64,
    /// Indexed, non-instanced draws.
    pub draws_indexed: u64,
    /// Indexed instanced draws.
    pub draws_indexed_instanced: u64,
    /// Compute dispatches.
    pub dispatches: u64,
    /// Shader binds (immediate) or pipeline state binds (explicit).
    pub pipeline_binds: u64,
    /// Root signature binds.
    pub root_signature_binds: u64,
    /// Input layout binds.
    pub input_layout_binds: u64,
    /// Primitive topology changes.
    pub topology_binds: u64,
    /// Rasterizer state binds.
    pub rasterizer_binds: u64,
    /// Blend state and blend factor binds.
    pub blend_binds: u64,
    /// Depth-stencil state and stencil reference binds.
    pub depth_stencil_binds: u64,
    /// Render target binds.
    pub render_target_binds: u64,
    /// Viewport changes.
    pub viewport_sets: u64,
    /// Scissor changes.
    pub scissor_sets: u64,
    /// Vertex buffer bind calls.
    pub vertex_buffer_binds: u64,
    /// Index buffer bind calls.
    pub index_buffer_binds: u64,
    /// Constant buffer bind calls (root views on explicit devices).
    pub constant_buffer_binds: u64,
    /// Sampler bind calls (tables on explicit devices).
    pub sampler_binds: u64,
    /// Shader resource bind calls (tables on explicit devices).
    pub shader_resource_binds: u64,
    /// Unordered access bind calls (tables on explicit devices).
    pub unordered_access_binds: u64,
    /// `resource_barrier` calls.
    pub barrier_calls: u64,
    /// Transition barriers recorded.
    pub transition_barriers: u64,
    /// UAV hazard barriers recorded.
    pub uav_barriers: u64,
    /// `execute_command_lists` calls.
    pub submissions: u64,
    /// Presents.
    pub presents: u64,
    /// Successful maps.
    pub maps: u64,
    /// `update_subresource` calls.
    pub subresource_updates: u64,
    /// Copies of any kind.
    pub copies: u64,
    /// Multisample resolves.
    pub resolves: u64,
    /// Fence or query waits.
    pub fence_waits: u64,
    /// Blend factor of the most recent blend bind.
    pub last_blend_factor: Color,
    /// Stencil reference of the most recent depth-stencil bind.
    pub last_stencil_reference: u32,
}

/// The per-adapter state devices share.
#[derive(Default)]
pub(crate) struct AdapterShared {
    stats: Mutex<DriverStats>,
    removed: AtomicBool,
    messages: Mutex<Vec<String>>,
}

impl AdapterShared {
    pub(crate) fn stats(&self) -> MutexGuard<'_, DriverStats> {
        self.stats.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    pub(crate) fn push_message(&self, message: String) {
        self.messages
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(message);
    }
}

/// Static properties of a software adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AdapterConfig {
    pub(crate) name: String,
    pub(crate) feature_level: FeatureLevel,
    pub(crate) device_type: RendererDeviceType,
    pub(crate) dedicated_video_memory: u64,
    pub(crate) object_limit: Option<usize>,
}

/// A software adapter. Cloning yields another handle to the same adapter.
#[derive(Clone)]
pub struct SoftwareAdapter {
    config: AdapterConfig,
    shared: Arc<AdapterShared>,
}

impl SoftwareAdapter {
    /// Creates a CPU adapter at feature level 12_1.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: AdapterConfig {
                name: name.into(),
                feature_level: FeatureLevel::Level12_1,
                device_type: RendererDeviceType::Cpu,
                dedicated_video_memory: 0,
                object_limit: None,
            },
            shared: Arc::new(AdapterShared::default()),
        }
    }

    /// Reports a different feature level.
    pub fn with_feature_level(mut self, level: FeatureLevel) -> Self {
        self.config.feature_level = level;
        self
    }

    /// Reports the adapter as a different kind of device.
    pub fn with_device_type(mut self, device_type: RendererDeviceType, video_memory: u64) -> Self {
        self.config.device_type = device_type;
        self.config.dedicated_video_memory = video_memory;
        self
    }

    /// Fails object creation with an out-of-memory error once `limit` objects
    /// are alive on a device.
    pub fn with_object_limit(mut self, limit: usize) -> Self {
        self.config.object_limit = Some(limit);
        self
    }

    /// The adapter's name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The highest feature level the adapter supports.
    pub fn feature_level(&self) -> FeatureLevel {
        self.config.feature_level
    }

    /// Returns `true` for adapters that do not run on a GPU.
    pub fn is_software(&self) -> bool {
        self.config.device_type == RendererDeviceType::Cpu
    }

    /// Describes the adapter as seen through `backend`.
    pub fn info(&self, backend: GraphicsBackendType) -> GraphicsAdapterInfo {
        GraphicsAdapterInfo {
            name: self.config.name.clone(),
            backend_type: backend,
            device_type: self.config.device_type,
            feature_level: self.config.feature_level,
            dedicated_video_memory: self.config.dedicated_video_memory,
        }
    }

    /// Opens a device with an immediate context.
    pub fn open_immediate(&self, validation: bool) -> Arc<dyn ImmediateDriver> {
        Arc::new(SoftwareImmediateDriver::new(self.open_gpu(validation)))
    }

    /// Opens an explicit device.
    pub fn open_explicit(&self, validation: bool) -> Arc<dyn ExplicitDriver> {
        Arc::new(SoftwareExplicitDriver::new(self.open_gpu(validation)))
    }

    fn open_gpu(&self, validation: bool) -> Arc<SoftwareGpu> {
        log::debug!(
            "Opening software device on '{}' (validation: {validation})",
            self.config.name
        );
        Arc::new(SoftwareGpu::new(
            self.config.clone(),
            Arc::clone(&self.shared),
            validation,
        ))
    }

    /// A snapshot of the call counters.
    pub fn stats(&self) -> DriverStats {
        *self.shared.stats()
    }

    /// Removes every device opened on this adapter. Later presents and
    /// submissions fail with a device-removed error.
    pub fn simulate_device_removed(&self) {
        log::warn!("Software adapter '{}' removed", self.config.name);
        self.shared.removed.store(true, Ordering::Release);
    }

    /// Messages the validation layer reported so far.
    pub fn validation_messages(&self) -> Vec<String> {
        self.shared
            .messages
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl std::fmt::Debug for SoftwareAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareAdapter")
            .field("name", &self.config.name)
            .field("feature_level", &self.config.feature_level)
            .finish()
    }
}
