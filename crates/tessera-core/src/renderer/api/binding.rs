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


//! Values a command context binds into shader resource and unordered access slots.

use crate::renderer::api::buffer::BufferId;
use crate::renderer::api::texture::TextureId;

/// What a shader resource slot reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderResourceBinding {
    /// Every mip of a texture.
    Texture(TextureId),
    /// A single mip of a texture.
    TextureMip(TextureId, u32),
    /// A whole buffer.
    Buffer(BufferId),
}

/// What an unordered access slot writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnorderedAccessBinding {
    /// One mip of a texture.
    Texture(TextureId, u32),
    /// A whole buffer.
    Buffer(BufferId),
}
