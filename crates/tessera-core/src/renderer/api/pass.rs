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


//! Descriptors for render passes.

use crate::renderer::api::common::Color;
use crate::renderer::api::texture::TextureId;

/// Describes the operation to perform on an attachment at the start of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoadAction {
    /// The existing contents are preserved.
    #[default]
    Load,
    /// The attachment is cleared to the attachment's clear value.
    Clear,
    /// The existing contents are undefined; the backend receives a discard hint.
    Discard,
}

/// Describes the operation to perform on an attachment at the end of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StoreAction {
    /// The results are kept (and resolved if a resolve target is given).
    #[default]
    Store,
    /// The results are discarded; the backend receives a discard hint.
    Discard,
}

/// A subresource of a texture that receives a multisample resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolveTarget {
    /// The single-sampled destination texture.
    pub texture: TextureId,
    /// Destination mip.
    pub mip: u32,
    /// Destination array slice.
    pub slice: u32,
}

/// A single color attachment for a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassColorAttachment {
    /// The texture rendered to.
    pub texture: TextureId,
    /// The mip level rendered to.
    pub mip: u32,
    /// The array slice rendered to.
    pub slice: u32,
    /// What happens to the contents when the pass begins.
    pub load: LoadAction,
    /// What happens to the contents when the pass ends.
    pub store: StoreAction,
    /// The value used by [`LoadAction::Clear`].
    pub clear_color: Color,
    /// Receives the resolved output on [`StoreAction::Store`] when the attachment is multisampled.
    pub resolve_target: Option<ResolveTarget>,
}

impl RenderPassColorAttachment {
    /// An attachment on mip 0, slice 0 that is cleared and stored.
    pub fn clear(texture: TextureId, clear_color: Color) -> Self {
        Self {
            texture,
            mip: 0,
            slice: 0,
            load: LoadAction::Clear,
            store: StoreAction::Store,
            clear_color,
            resolve_target: None,
        }
    }

    /// An attachment on mip 0, slice 0 that keeps and stores its contents.
    pub fn load(texture: TextureId) -> Self {
        Self {
            load: LoadAction::Load,
            ..Self::clear(texture, Color::TRANSPARENT)
        }
    }
}

/// A depth/stencil attachment with independent depth and stencil actions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassDepthStencilAttachment {
    /// The depth texture.
    pub texture: TextureId,
    /// The mip level rendered to.
    pub mip: u32,
    /// The array slice rendered to.
    pub slice: u32,
    /// Load action for the depth aspect.
    pub depth_load: LoadAction,
    /// Store action for the depth aspect.
    pub depth_store: StoreAction,
    /// The value used when `depth_load` is [`LoadAction::Clear`].
    pub clear_depth: f32,
    /// Load action for the stencil aspect; ignored for formats without stencil.
    pub stencil_load: LoadAction,
    /// Store action for the stencil aspect; ignored for formats without stencil.
    pub stencil_store: StoreAction,
    /// The value used when `stencil_load` is [`LoadAction::Clear`].
    pub clear_stencil: u8,
}

impl RenderPassDepthStencilAttachment {
    /// Clears depth to `clear_depth` and stencil to 0, storing both.
    pub fn clear(texture: TextureId, clear_depth: f32) -> Self {
        Self {
            texture,
            mip: 0,
            slice: 0,
            depth_load: LoadAction::Clear,
            depth_store: StoreAction::Store,
            clear_depth,
            stencil_load: LoadAction::Clear,
            stencil_store: StoreAction::Store,
            clear_stencil: 0,
        }
    }
}

/// A descriptor for a render pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderPassDescriptor<'a> {
    /// An optional debug label for the render pass.
    pub label: Option<&'a str>,
    /// Color attachments, in render target slot order.
    pub color_attachments: &'a [RenderPassColorAttachment],
    /// An optional depth/stencil attachment for this pass.
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment>,
}
