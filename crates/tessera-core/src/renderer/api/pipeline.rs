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


//! Pipeline descriptors: shader bytecode, input layout and fixed-function state.

use crate::renderer::api::common::SampleCount;
use crate::renderer::api::format::TextureFormat;
use crate::renderer::api::sampler::CompareFunction;
use crate::tessera_bitflags;
use std::borrow::Cow;

/// Compiled, backend-ready shader bytecode. Its content is opaque to the HAL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ShaderBytecode<'a> {
    /// The raw bytes handed to the driver.
    pub code: Cow<'a, [u8]>,
    /// The entry point name, kept for debugging.
    pub entry_point: Cow<'a, str>,
}

impl<'a> ShaderBytecode<'a> {
    /// Wraps borrowed bytecode with the conventional `main` entry point.
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            code: Cow::Borrowed(code),
            entry_point: Cow::Borrowed("main"),
        }
    }

    /// Returns `true` if no bytecode is present.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// The memory format of a single vertex attribute's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VertexFormat {
    /// Four 8-bit unsigned integer components normalized to `[0.0, 1.0]`.
    Unorm8x4,
    /// Two 16-bit float components.
    Float16x2,
    /// Four 16-bit float components.
    Float16x4,
    /// One 32-bit float component.
    Float32,
    /// Two 32-bit float components.
    Float32x2,
    /// Three 32-bit float components.
    Float32x3,
    /// Four 32-bit float components.
    Float32x4,
    /// One 32-bit unsigned integer component.
    Uint32,
    /// Four 32-bit unsigned integer components.
    Uint32x4,
}

impl VertexFormat {
    /// Returns the size in bytes of this vertex format.
    pub const fn size(&self) -> u32 {
        match self {
            VertexFormat::Unorm8x4 | VertexFormat::Float16x2 | VertexFormat::Float32 | VertexFormat::Uint32 => 4,
            VertexFormat::Float16x4 | VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 | VertexFormat::Uint32x4 => 16,
        }
    }
}

/// Defines how often the GPU advances to the next element in a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VertexStepMode {
    /// The GPU advances to the next element for each vertex.
    #[default]
    Vertex,
    /// The GPU advances to the next element for each instance.
    Instance,
}

/// One element of the input layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexAttribute<'a> {
    /// The semantic name the vertex shader reads (e.g. `POSITION`).
    pub semantic: Cow<'a, str>,
    /// The semantic index.
    pub semantic_index: u32,
    /// The data format.
    pub format: VertexFormat,
    /// The vertex buffer slot this attribute is fetched from.
    pub buffer_slot: u32,
    /// Byte offset from the start of the element.
    pub offset: u32,
    /// Per-vertex or per-instance stepping.
    pub step_mode: VertexStepMode,
}

/// Defines how vertices are connected to form a geometric primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PrimitiveTopology {
    /// Isolated points.
    PointList,
    /// Isolated line segments.
    LineList,
    /// A connected strip of lines.
    LineStrip,
    /// Isolated triangles.
    #[default]
    TriangleList,
    /// A connected strip of triangles.
    TriangleStrip,
}

/// How polygons are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FillMode {
    /// Filled triangles.
    #[default]
    Solid,
    /// Edges only.
    Wireframe,
}

/// Which faces are culled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CullMode {
    /// No culling.
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    #[default]
    Back,
}

/// Rasterizer configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RasterizerState {
    /// Polygon fill mode.
    pub fill_mode: FillMode,
    /// Face culling.
    pub cull_mode: CullMode,
    /// Counter-clockwise triangles face forward when `true`.
    pub front_counter_clockwise: bool,
    /// Constant depth bias.
    pub depth_bias: i32,
    /// Maximum depth bias.
    pub depth_bias_clamp: f32,
    /// Slope-scaled depth bias.
    pub slope_scaled_depth_bias: f32,
    /// Clip against the near and far planes.
    pub depth_clip_enable: bool,
    /// Rasterize only inside the scissor rectangle.
    pub scissor_enable: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_counter_clockwise: false,
            depth_bias: 0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clip_enable: true,
            scissor_enable: true,
        }
    }
}

/// A blend factor applied to source or destination color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlendFactor {
    /// `0.0`
    Zero,
    /// `1.0`
    One,
    /// Source alpha.
    SrcAlpha,
    /// `1.0 - source alpha`.
    OneMinusSrcAlpha,
    /// Destination alpha.
    DstAlpha,
    /// `1.0 - destination alpha`.
    OneMinusDstAlpha,
    /// The constant set through `set_blend_factor`.
    Constant,
}

/// How source and destination terms are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlendOperation {
    /// `src + dst`
    #[default]
    Add,
    /// `src - dst`
    Subtract,
    /// `dst - src`
    ReverseSubtract,
    /// `min(src, dst)`
    Min,
    /// `max(src, dst)`
    Max,
}

tessera_bitflags! {
    /// A bitmask to enable or disable writes to individual color channels.
    pub struct ColorWrites: u8 {
        /// Enable writes to the Red channel.
        const R = 0b0001;
        /// Enable writes to the Green channel.
        const G = 0b0010;
        /// Enable writes to the Blue channel.
        const B = 0b0100;
        /// Enable writes to the Alpha channel.
        const A = 0b1000;
        /// Enable writes to all channels.
        const ALL = Self::R.bits() | Self::G.bits() | Self::B.bits() | Self::A.bits();
    }
}

/// Output-merger blend configuration, shared by every color target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    /// Enables blending; when `false` the source replaces the destination.
    pub enabled: bool,
    /// Source color factor.
    pub src_color: BlendFactor,
    /// Destination color factor.
    pub dst_color: BlendFactor,
    /// Color operation.
    pub color_op: BlendOperation,
    /// Source alpha factor.
    pub src_alpha: BlendFactor,
    /// Destination alpha factor.
    pub dst_alpha: BlendFactor,
    /// Alpha operation.
    pub alpha_op: BlendOperation,
    /// Channel write mask.
    pub write_mask: ColorWrites,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            enabled: false,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            color_op: BlendOperation::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOperation::Add,
            write_mask: ColorWrites::ALL,
        }
    }
}

impl BlendState {
    /// Classic `src * a + dst * (1 - a)` alpha blending.
    pub fn alpha_blending() -> Self {
        Self {
            enabled: true,
            src_color: BlendFactor::SrcAlpha,
            dst_color: BlendFactor::OneMinusSrcAlpha,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::OneMinusSrcAlpha,
            ..Default::default()
        }
    }
}

/// An operation applied to the stencil buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StencilOperation {
    /// Keep the current value.
    #[default]
    Keep,
    /// Set the value to zero.
    Zero,
    /// Replace with the stencil reference.
    Replace,
    /// Increment and clamp.
    IncrementClamp,
    /// Decrement and clamp.
    DecrementClamp,
    /// Bitwise invert.
    Invert,
    /// Increment and wrap.
    IncrementWrap,
    /// Decrement and wrap.
    DecrementWrap,
}

/// Describes the stencil test and operations for a single face of a primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StencilFaceState {
    /// The comparison function used for the stencil test.
    pub compare: CompareFunction,
    /// The operation to perform if the stencil test fails.
    pub fail_op: StencilOperation,
    /// The operation to perform if the stencil test passes but the depth test fails.
    pub depth_fail_op: StencilOperation,
    /// The operation to perform if both the stencil and depth tests pass.
    pub pass_op: StencilOperation,
}

/// Describes the state for depth and stencil testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DepthStencilState {
    /// Enables the depth test.
    pub depth_test_enabled: bool,
    /// If `true`, depth values will be written to the depth buffer.
    pub depth_write_enabled: bool,
    /// The comparison function used for the depth test.
    pub depth_compare: CompareFunction,
    /// Enables the stencil test.
    pub stencil_enabled: bool,
    /// A bitmask for reading from the stencil buffer.
    pub stencil_read_mask: u8,
    /// A bitmask for writing to the stencil buffer.
    pub stencil_write_mask: u8,
    /// The stencil state for front-facing primitives.
    pub stencil_front: StencilFaceState,
    /// The stencil state for back-facing primitives.
    pub stencil_back: StencilFaceState,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test_enabled: true,
            depth_write_enabled: true,
            depth_compare: CompareFunction::Less,
            stencil_enabled: false,
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
            stencil_front: StencilFaceState::default(),
            stencil_back: StencilFaceState::default(),
        }
    }
}

impl DepthStencilState {
    /// Depth and stencil testing both disabled.
    pub fn disabled() -> Self {
        Self {
            depth_test_enabled: false,
            depth_write_enabled: false,
            depth_compare: CompareFunction::Always,
            ..Default::default()
        }
    }
}

/// Describes a graphics pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPipelineDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The vertex shader; required.
    pub vertex_shader: ShaderBytecode<'a>,
    /// The fragment shader; depth-only pipelines may omit it.
    pub fragment_shader: Option<ShaderBytecode<'a>>,
    /// The input layout.
    pub vertex_attributes: Cow<'a, [VertexAttribute<'a>]>,
    /// Primitive topology.
    pub topology: PrimitiveTopology,
    /// Rasterizer state.
    pub rasterizer: RasterizerState,
    /// Blend state.
    pub blend: BlendState,
    /// Depth-stencil state.
    pub depth_stencil: DepthStencilState,
    /// Formats of the color targets, in attachment order.
    pub color_formats: Cow<'a, [TextureFormat]>,
    /// Format of the depth target, if any.
    pub depth_format: Option<TextureFormat>,
    /// Sample count of every attachment.
    pub sample_count: SampleCount,
}

impl Default for RenderPipelineDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            vertex_shader: ShaderBytecode::default(),
            fragment_shader: None,
            vertex_attributes: Cow::Borrowed(&[]),
            topology: PrimitiveTopology::TriangleList,
            rasterizer: RasterizerState::default(),
            blend: BlendState::default(),
            depth_stencil: DepthStencilState::disabled(),
            color_formats: Cow::Borrowed(&[TextureFormat::Rgba8Unorm]),
            depth_format: None,
            sample_count: SampleCount::X1,
        }
    }
}

/// Describes a compute pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComputePipelineDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The compute shader; required.
    pub compute_shader: ShaderBytecode<'a>,
}

/// Either kind of pipeline a device can create.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineDescriptor<'a> {
    /// A graphics pipeline.
    Render(RenderPipelineDescriptor<'a>),
    /// A compute pipeline.
    Compute(ComputePipelineDescriptor<'a>),
}

impl PipelineDescriptor<'_> {
    /// The pipeline's debug label.
    pub fn label(&self) -> Option<&str> {
        match self {
            PipelineDescriptor::Render(desc) => desc.label.as_deref(),
            PipelineDescriptor::Compute(desc) => desc.label.as_deref(),
        }
    }

    /// Returns `true` for compute pipelines.
    pub fn is_compute(&self) -> bool {
        matches!(self, PipelineDescriptor::Compute(_))
    }
}

/// An opaque handle to a render or compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineId(pub usize);
