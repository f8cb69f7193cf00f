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


//! Texture and view formats.

/// Specifies the format of texels in a texture, render target or depth buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextureFormat {
    /// No format; never valid for a resource.
    #[default]
    Unknown,
    /// One 8-bit unsigned normalized channel.
    R8Unorm,
    /// Two 8-bit unsigned normalized channels.
    Rg8Unorm,
    /// Four 8-bit unsigned normalized channels (RGBA).
    Rgba8Unorm,
    /// Four 8-bit unsigned normalized channels (RGBA), sRGB encoded.
    Rgba8UnormSrgb,
    /// Four 8-bit unsigned normalized channels (BGRA).
    Bgra8Unorm,
    /// Four 8-bit unsigned normalized channels (BGRA), sRGB encoded.
    Bgra8UnormSrgb,
    /// One 16-bit float channel.
    R16Float,
    /// Two 16-bit float channels.
    Rg16Float,
    /// Four 16-bit float channels.
    Rgba16Float,
    /// One 32-bit float channel.
    R32Float,
    /// Two 32-bit float channels.
    Rg32Float,
    /// Four 32-bit float channels.
    Rgba32Float,
    /// One 32-bit unsigned integer channel.
    R32Uint,
    /// 16-bit normalized depth.
    Depth16Unorm,
    /// 24-bit normalized depth with 8-bit stencil.
    Depth24UnormStencil8,
    /// 32-bit float depth.
    Depth32Float,
    /// 32-bit float depth with 8-bit stencil (8 bytes per texel).
    Depth32FloatStencil8,
}

impl TextureFormat {
    /// Returns the size in bytes of a single texel, or 0 for `Unknown`.
    pub const fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Unknown => 0,
            TextureFormat::R8Unorm => 1,
            TextureFormat::Rg8Unorm | TextureFormat::R16Float | TextureFormat::Depth16Unorm => 2,
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Rg16Float
            | TextureFormat::R32Float
            | TextureFormat::R32Uint
            | TextureFormat::Depth24UnormStencil8
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float
            | TextureFormat::Rg32Float
            | TextureFormat::Depth32FloatStencil8 => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }

    /// Returns `true` if this is a depth (or depth-stencil) format.
    pub const fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth16Unorm
                | TextureFormat::Depth24UnormStencil8
                | TextureFormat::Depth32Float
                | TextureFormat::Depth32FloatStencil8
        )
    }

    /// Returns `true` if this format carries a stencil aspect.
    pub const fn has_stencil(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth24UnormStencil8 | TextureFormat::Depth32FloatStencil8
        )
    }

    /// Returns `true` if the format stores sRGB-encoded color.
    pub const fn is_srgb(&self) -> bool {
        matches!(
            self,
            TextureFormat::Rgba8UnormSrgb | TextureFormat::Bgra8UnormSrgb
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_formats_report_their_aspects() {
        assert!(TextureFormat::Depth32Float.is_depth());
        assert!(!TextureFormat::Depth32Float.has_stencil());
        assert!(TextureFormat::Depth24UnormStencil8.has_stencil());
        assert!(!TextureFormat::Rgba8Unorm.is_depth());
    }

    #[test]
    fn texel_sizes() {
        assert_eq!(TextureFormat::Unknown.bytes_per_pixel(), 0);
        assert_eq!(TextureFormat::R8Unorm.bytes_per_pixel(), 1);
        assert_eq!(TextureFormat::Bgra8UnormSrgb.bytes_per_pixel(), 4);
        assert_eq!(TextureFormat::Depth32FloatStencil8.bytes_per_pixel(), 8);
        assert_eq!(TextureFormat::Rgba32Float.bytes_per_pixel(), 16);
    }
}
