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


//! Provides common, backend-agnostic enums and data structures for the graphics API.

use crate::renderer::api::buffer::BufferId;
use crate::renderer::api::pipeline::PipelineId;
use crate::renderer::api::sampler::SamplerId;
use crate::renderer::api::swapchain::SwapChainId;
use crate::renderer::api::texture::TextureId;

/// The number of frames the CPU may record ahead of the GPU.
///
/// Per-frame resources (command allocators, shader-visible descriptor rings, upload
/// rings) are indexed by `frame_count % MAX_FRAMES_IN_FLIGHT`, and the deferred
/// destruction window is this many frames wide.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// The execution model of a graphics backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GraphicsBackendType {
    /// A stateful, immediate-context backend: the driver tracks hazards and
    /// resource lifetimes, commands execute in call order (D3D11-style).
    Immediate,
    /// An explicit backend: pre-recorded command lists, explicit barriers,
    /// descriptor heaps and fences (D3D12-style).
    Explicit,
    /// An unknown or unsupported backend.
    #[default]
    Unknown,
}

impl GraphicsBackendType {
    /// Returns a human-readable name for the backend.
    pub fn name(&self) -> &'static str {
        match self {
            GraphicsBackendType::Immediate => "Immediate",
            GraphicsBackendType::Explicit => "Explicit",
            GraphicsBackendType::Unknown => "Unknown",
        }
    }
}

/// The physical type of a graphics device (GPU).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RendererDeviceType {
    /// A GPU integrated into the CPU.
    IntegratedGpu,
    /// A discrete, dedicated GPU.
    DiscreteGpu,
    /// A virtualized GPU.
    VirtualGpu,
    /// A software rasterizer running on the CPU.
    Cpu,
    /// An unknown device type.
    #[default]
    Unknown,
}

/// The hardware feature level reported by an adapter, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FeatureLevel {
    /// Feature level 10.0.
    Level10_0,
    /// Feature level 10.1.
    Level10_1,
    /// Feature level 11.0, the minimum both backends accept.
    #[default]
    Level11_0,
    /// Feature level 11.1.
    Level11_1,
    /// Feature level 12.0.
    Level12_0,
    /// Feature level 12.1.
    Level12_1,
}

/// Provides standardized, backend-agnostic information about a graphics adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphicsAdapterInfo {
    /// The name of the adapter (e.g., "Tessera Software Adapter").
    pub name: String,
    /// The backend this adapter was enumerated for.
    pub backend_type: GraphicsBackendType,
    /// The physical type of the adapter.
    pub device_type: RendererDeviceType,
    /// The highest feature level the adapter supports.
    pub feature_level: FeatureLevel,
    /// Dedicated video memory in bytes (0 for adapters sharing system memory).
    pub dedicated_video_memory: u64,
}

/// Specifies the data type of indices in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IndexFormat {
    /// Indices are 16-bit unsigned integers.
    Uint16,
    /// Indices are 32-bit unsigned integers.
    Uint32,
}

impl IndexFormat {
    /// The size in bytes of a single index.
    pub const fn size(&self) -> u32 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// Defines the programmable stage a binding or shader belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ShaderStage {
    /// The vertex shader stage.
    Vertex,
    /// The fragment (pixel) shader stage.
    Fragment,
    /// The compute shader stage.
    Compute,
}

impl ShaderStage {
    /// Every stage, in slot order.
    pub const ALL: [ShaderStage; 3] = [ShaderStage::Vertex, ShaderStage::Fragment, ShaderStage::Compute];

    /// A dense index usable for per-stage arrays.
    pub const fn index(&self) -> usize {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Fragment => 1,
            ShaderStage::Compute => 2,
        }
    }
}

/// The number of samples per pixel for multisample anti-aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SampleCount {
    /// 1 sample per pixel (MSAA disabled).
    #[default]
    X1,
    /// 2 samples per pixel.
    X2,
    /// 4 samples per pixel.
    X4,
    /// 8 samples per pixel.
    X8,
}

impl SampleCount {
    /// The number of samples as an integer.
    pub const fn count(&self) -> u32 {
        match self {
            SampleCount::X1 => 1,
            SampleCount::X2 => 2,
            SampleCount::X4 => 4,
            SampleCount::X8 => 8,
        }
    }

    /// Returns `true` if more than one sample is stored per pixel.
    pub const fn is_multisampled(&self) -> bool {
        !matches!(self, SampleCount::X1)
    }
}

/// Who may touch a resource's memory from the CPU, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CpuAccess {
    /// GPU-only memory; updates go through backend upload commands.
    #[default]
    None,
    /// CPU-writable, persistently mappable ("dynamic") memory.
    Write,
    /// CPU-readable memory used for readback.
    Read,
}

/// A linear RGBA color, used for clear values and blend factors.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Color {
    /// Red component.
    pub r: f32,
    /// Green component.
    pub g: f32,
    /// Blue component.
    pub b: f32,
    /// Alpha component.
    pub a: f32,
}

impl Color {
    /// Opaque black.
    pub const BLACK: Self = Self::rgba(0.0, 0.0, 0.0, 1.0);
    /// Opaque white.
    pub const WHITE: Self = Self::rgba(1.0, 1.0, 1.0, 1.0);
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::rgba(0.0, 0.0, 0.0, 0.0);
    /// Opaque red.
    pub const RED: Self = Self::rgba(1.0, 0.0, 0.0, 1.0);

    /// Creates a color from its four components.
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Returns the components as an array in RGBA order.
    pub const fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// A two-dimensional size in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Extent2D {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
}

impl Extent2D {
    /// Creates a new extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// The rectangle of the render target the rasterizer maps clip space onto.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Viewport {
    /// Left edge in pixels.
    pub x: f32,
    /// Top edge in pixels.
    pub y: f32,
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
    /// Minimum depth, usually `0.0`.
    pub min_depth: f32,
    /// Maximum depth, usually `1.0`.
    pub max_depth: f32,
}

impl Viewport {
    /// A viewport covering a whole extent with the full depth range.
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// An integer rectangle that restricts rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScissorRect {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ScissorRect {
    /// A scissor rectangle covering a whole extent.
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        }
    }
}

/// Any resource a device hands out, used by operations that apply to all kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    /// A buffer.
    Buffer(BufferId),
    /// A texture (including swapchain back buffers).
    Texture(TextureId),
    /// A sampler.
    Sampler(SamplerId),
    /// A render or compute pipeline.
    Pipeline(PipelineId),
    /// A swapchain.
    SwapChain(SwapChainId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_levels_are_ordered() {
        assert!(FeatureLevel::Level12_1 > FeatureLevel::Level11_0);
        assert!(FeatureLevel::Level10_1 < FeatureLevel::default());
    }

    #[test]
    fn shader_stage_indices_are_dense() {
        for (i, stage) in ShaderStage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
    }

    #[test]
    fn color_is_plain_old_data() {
        let color = Color::rgba(1.0, 0.0, 0.0, 1.0);
        let floats: [f32; 4] = bytemuck::cast(color);
        assert_eq!(floats, color.to_array());
        assert_eq!(color, Color::RED);
    }
}
