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


//! Configuration records for devices and backend selection.

use crate::renderer::api::common::{GraphicsAdapterInfo, GraphicsBackendType};
use std::borrow::Cow;

/// Capacity, in descriptors, of each block the explicit backend's allocators grow by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DescriptorBlockSizes {
    /// Shader resource, unordered access and constant buffer views.
    pub shader_resource: u32,
    /// Samplers.
    pub sampler: u32,
    /// Render target views.
    pub render_target: u32,
    /// Depth-stencil views.
    pub depth_stencil: u32,
}

impl Default for DescriptorBlockSizes {
    fn default() -> Self {
        Self {
            shader_resource: 4096,
            sampler: 256,
            render_target: 512,
            depth_stencil: 256,
        }
    }
}

/// Everything needed to open a device on a chosen backend.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceDescriptor<'a> {
    /// An optional debug label for the device.
    pub label: Option<Cow<'a, str>>,
    /// The backend to open. `Unknown` lets the factory decide.
    pub backend: GraphicsBackendType,
    /// Index into the factory's adapter list.
    pub adapter_index: usize,
    /// Enables the driver debug layer, which rejects API misuse at the offending call.
    pub enable_validation: bool,
    /// Block sizes for the explicit backend's CPU descriptor allocators.
    pub descriptor_block_sizes: DescriptorBlockSizes,
    /// Barriers buffered by the state tracker before an automatic flush.
    pub barrier_batch_size: usize,
    /// Bytes in each frame slot's upload ring.
    pub upload_ring_size: u64,
    /// Descriptors in each frame slot's shader-visible ring.
    pub descriptor_ring_size: u32,
}

impl Default for DeviceDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            backend: GraphicsBackendType::Unknown,
            adapter_index: 0,
            enable_validation: cfg!(debug_assertions),
            descriptor_block_sizes: DescriptorBlockSizes::default(),
            barrier_batch_size: 16,
            upload_ring_size: 4 * 1024 * 1024,
            descriptor_ring_size: 4096,
        }
    }
}

/// Configuration for backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BackendSelectionConfig {
    /// Preferred backends in order of preference.
    pub preferred_backends: Vec<GraphicsBackendType>,
    /// Whether CPU (software) adapters may be chosen.
    pub allow_software_adapter: bool,
    /// Whether to prefer discrete GPUs over integrated ones.
    pub prefer_discrete_gpu: bool,
}

impl Default for BackendSelectionConfig {
    fn default() -> Self {
        Self {
            preferred_backends: vec![GraphicsBackendType::Explicit, GraphicsBackendType::Immediate],
            allow_software_adapter: true,
            prefer_discrete_gpu: true,
        }
    }
}

/// Result of a backend selection operation.
#[derive(Debug)]
pub struct BackendSelectionResult<TDevice> {
    /// The opened device.
    pub device: TDevice,
    /// Information about the selected adapter.
    pub adapter_info: GraphicsAdapterInfo,
    /// Time taken for the selection process.
    pub selection_time_ms: u64,
    /// All backends that were attempted during selection, in order.
    pub attempted_backends: Vec<GraphicsBackendType>,
}
