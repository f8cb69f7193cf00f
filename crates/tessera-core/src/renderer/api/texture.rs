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


//! Defines data structures related to GPU texture resources and their views.

use crate::renderer::api::common::{CpuAccess, Extent2D, SampleCount};
use crate::renderer::api::format::TextureFormat;
use crate::tessera_bitflags;
use std::borrow::Cow;

/// The dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextureDimension {
    /// A one-dimensional texture.
    D1,
    /// A two-dimensional texture (or 2D array).
    #[default]
    D2,
    /// A three-dimensional (volumetric) texture.
    D3,
}

tessera_bitflags! {
    /// A set of flags describing the allowed usages of a [`TextureId`].
    pub struct TextureUsage: u32 {
        /// The texture can be sampled from shaders.
        const SHADER_RESOURCE = 1 << 0;
        /// The texture can be a color attachment (or a resolve target).
        const RENDER_TARGET = 1 << 1;
        /// The texture can be a depth/stencil attachment.
        const DEPTH_STENCIL = 1 << 2;
        /// The texture can be written from compute shaders.
        const UNORDERED_ACCESS = 1 << 3;
    }
}

/// A descriptor used to create a [`TextureId`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextureDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The dimensionality of the texture.
    pub dimension: TextureDimension,
    /// Width of mip 0 in texels.
    pub width: u32,
    /// Height of mip 0 in texels (1 for 1D textures).
    pub height: u32,
    /// Depth for 3D textures, array layer count otherwise.
    pub depth_or_array_layers: u32,
    /// The number of mipmap levels.
    pub mip_level_count: u32,
    /// The format of the texels in the texture.
    pub format: TextureFormat,
    /// The number of samples per pixel.
    pub sample_count: SampleCount,
    /// A bitmask of [`TextureUsage`] flags describing how the texture will be used.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub usage: TextureUsage,
    /// The CPU access the texture is created with.
    pub cpu_access: CpuAccess,
}

impl Default for TextureDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            dimension: TextureDimension::D2,
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
            mip_level_count: 1,
            format: TextureFormat::Rgba8Unorm,
            sample_count: SampleCount::X1,
            usage: TextureUsage::SHADER_RESOURCE,
            cpu_access: CpuAccess::None,
        }
    }
}

impl<'a> TextureDescriptor<'a> {
    /// A single-mip 2D texture.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            width,
            height,
            format,
            usage,
            ..Default::default()
        }
    }

    /// Returns the same descriptor with a debug label attached.
    pub fn with_label(mut self, label: impl Into<Cow<'a, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The number of mips in a full chain for this texture's largest dimension.
    pub fn full_mip_chain_len(&self) -> u32 {
        let largest = match self.dimension {
            TextureDimension::D3 => self.width.max(self.height).max(self.depth_or_array_layers),
            _ => self.width.max(self.height),
        };
        u32::BITS - largest.max(1).leading_zeros()
    }

    /// The number of array slices (1 for 3D textures).
    pub fn array_layers(&self) -> u32 {
        match self.dimension {
            TextureDimension::D3 => 1,
            _ => self.depth_or_array_layers.max(1),
        }
    }

    /// The width and height of a mip level, clamped to 1.
    pub fn mip_extent(&self, mip: u32) -> Extent2D {
        Extent2D::new(
            (self.width >> mip.min(31)).max(1),
            (self.height >> mip.min(31)).max(1),
        )
    }

    /// The number of bytes a tightly packed copy of one subresource occupies.
    pub fn subresource_size(&self, mip: u32) -> usize {
        let extent = self.mip_extent(mip);
        let depth = match self.dimension {
            TextureDimension::D3 => (self.depth_or_array_layers >> mip.min(31)).max(1),
            _ => 1,
        };
        extent.width as usize * extent.height as usize * depth as usize
            * self.format.bytes_per_pixel() as usize
    }
}

/// An opaque handle to a GPU texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextureId(pub usize);

/// The kind of view a texture is accessed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureViewKind {
    /// A render target view.
    RenderTarget,
    /// A depth-stencil view.
    DepthStencil,
    /// A shader resource view.
    ShaderResource,
    /// An unordered access view.
    UnorderedAccess,
}

/// A packed `(mip, slice)` key identifying one cached view of a texture.
///
/// The mip lives in the high 32 bits and the slice in the low 32 bits.
/// [`ViewKey::ALL`] in either half selects every mip or every slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewKey(pub u64);

impl ViewKey {
    /// Sentinel for "every mip" or "every slice".
    pub const ALL: u32 = u32::MAX;

    /// Packs a mip and a slice.
    pub const fn new(mip: u32, slice: u32) -> Self {
        Self(((mip as u64) << 32) | slice as u64)
    }

    /// A key selecting one mip across all slices.
    pub const fn mip(mip: u32) -> Self {
        Self::new(mip, Self::ALL)
    }

    /// A key selecting the whole resource.
    pub const fn whole() -> Self {
        Self::new(Self::ALL, Self::ALL)
    }

    /// The mip half of the key.
    pub const fn mip_level(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The slice half of the key.
    pub const fn slice(&self) -> u32 {
        self.0 as u32
    }
}

/// An opaque, backend-defined view handle.
///
/// Two calls that hit the same cache entry return equal handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_key_packs_mip_and_slice() {
        let key = ViewKey::new(3, 7);
        assert_eq!(key.mip_level(), 3);
        assert_eq!(key.slice(), 7);
        assert_ne!(ViewKey::new(7, 3), key);
        assert_eq!(ViewKey::mip(2).slice(), ViewKey::ALL);
    }

    #[test]
    fn mip_chain_and_extents() {
        let desc = TextureDescriptor::new_2d(256, 64, TextureFormat::Rgba8Unorm, TextureUsage::SHADER_RESOURCE);
        assert_eq!(desc.full_mip_chain_len(), 9);
        assert_eq!(desc.mip_extent(7), Extent2D::new(2, 1));
        assert_eq!(desc.mip_extent(8), Extent2D::new(1, 1));
        assert_eq!(desc.subresource_size(0), 256 * 64 * 4);
    }
}
