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


//! Conversions from the backend-agnostic descriptors to native driver descriptions.

use crate::graphics::native::{BindFlags, MemoryUsage, NativeViewKind, ResourceDesc, ViewDesc};
use tessera_core::renderer::{
    BufferDescriptor, BufferUsage, CpuAccess, GraphicsError, TextureViewKind, ViewKey,
};

/// Translates buffer usage flags into native bind flags.
pub fn buffer_bind_flags(usage: BufferUsage) -> BindFlags {
    let mut bind = BindFlags::EMPTY;
    if usage.contains(BufferUsage::VERTEX) {
        bind |= BindFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        bind |= BindFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::CONSTANT) {
        bind |= BindFlags::CONSTANT_BUFFER;
    }
    if usage.contains(BufferUsage::SHADER_RESOURCE) {
        bind |= BindFlags::SHADER_RESOURCE;
    }
    if usage.contains(BufferUsage::UNORDERED_ACCESS) {
        bind |= BindFlags::UNORDERED_ACCESS;
    }
    bind
}

/// Memory placement of a resource on the immediate backend.
pub fn immediate_memory_usage(access: CpuAccess) -> MemoryUsage {
    match access {
        CpuAccess::None => MemoryUsage::Default,
        CpuAccess::Write => MemoryUsage::Dynamic,
        CpuAccess::Read => MemoryUsage::Staging,
    }
}

/// Memory placement of a buffer on the explicit backend.
///
/// Constant buffers always live in the default heap. Their updates are
/// recorded as copies out of the frame's upload ring, ordered with the rest
/// of the command list.
pub fn explicit_memory_usage(desc: &BufferDescriptor) -> MemoryUsage {
    if desc.usage.contains(BufferUsage::CONSTANT) {
        return MemoryUsage::Default;
    }
    match desc.cpu_access {
        CpuAccess::None => MemoryUsage::Default,
        CpuAccess::Write => MemoryUsage::Upload,
        CpuAccess::Read => MemoryUsage::Readback,
    }
}

/// Builds the native description of a buffer placed in `usage` memory.
pub fn buffer_resource_desc(desc: &BufferDescriptor, usage: MemoryUsage) -> ResourceDesc {
    ResourceDesc::buffer(desc.size, buffer_bind_flags(desc.usage), usage, desc.stride)
}

/// Maps a view kind onto the native one.
pub fn native_view_kind(kind: TextureViewKind) -> NativeViewKind {
    match kind {
        TextureViewKind::RenderTarget => NativeViewKind::RenderTarget,
        TextureViewKind::DepthStencil => NativeViewKind::DepthStencil,
        TextureViewKind::ShaderResource => NativeViewKind::ShaderResource,
        TextureViewKind::UnorderedAccess => NativeViewKind::UnorderedAccess,
    }
}

/// Builds the view description for `key` on a texture.
///
/// Render-target, depth-stencil and unordered-access views address a single
/// mip; `ViewKey::ALL` as the slice selects every array slice. Shader-resource
/// views with `ViewKey::ALL` as the mip cover the whole chain.
pub fn texture_view_desc(
    desc: &ResourceDesc,
    kind: TextureViewKind,
    key: ViewKey,
) -> Result<ViewDesc, GraphicsError> {
    let mips = desc.mip_levels.max(1);
    let slices = desc.array_size();
    let (first_mip, mip_count) = match (kind, key.mip_level()) {
        (TextureViewKind::ShaderResource, ViewKey::ALL) => (0, mips),
        (_, ViewKey::ALL) => (0, 1),
        (_, mip) => (mip, 1),
    };
    let (first_slice, slice_count) = match key.slice() {
        ViewKey::ALL => (0, slices),
        slice => (slice, 1),
    };
    if first_mip >= mips || first_slice >= slices {
        return Err(GraphicsError::InvalidState(format!(
            "{kind:?} view of mip {first_mip} slice {first_slice} is outside a texture with \
             {mips} mips and {slices} slices"
        )));
    }
    Ok(ViewDesc {
        kind: native_view_kind(kind),
        format: desc.format,
        first_mip,
        mip_count,
        first_slice,
        slice_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::renderer::{TextureDescriptor, TextureFormat, TextureUsage};

    #[test]
    fn shader_resource_key_all_covers_the_chain() {
        let mut texture = TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba8Unorm, TextureUsage::SHADER_RESOURCE);
        texture.mip_level_count = 7;
        let desc = ResourceDesc::texture(&texture, MemoryUsage::Default);

        let whole = texture_view_desc(&desc, TextureViewKind::ShaderResource, ViewKey::whole()).unwrap();
        assert_eq!((whole.first_mip, whole.mip_count), (0, 7));

        let rtv = texture_view_desc(&desc, TextureViewKind::RenderTarget, ViewKey::new(3, 0)).unwrap();
        assert_eq!((rtv.first_mip, rtv.mip_count, rtv.slice_count), (3, 1, 1));

        assert!(texture_view_desc(&desc, TextureViewKind::RenderTarget, ViewKey::new(7, 0)).is_err());
    }

    #[test]
    fn cpu_access_picks_memory_per_backend() {
        assert_eq!(immediate_memory_usage(CpuAccess::Write), MemoryUsage::Dynamic);
        let vertices = BufferDescriptor {
            size: 64,
            usage: BufferUsage::VERTEX,
            cpu_access: CpuAccess::Write,
            ..Default::default()
        };
        assert_eq!(explicit_memory_usage(&vertices), MemoryUsage::Upload);
        let readback = BufferDescriptor {
            cpu_access: CpuAccess::Read,
            ..vertices.clone()
        };
        assert_eq!(explicit_memory_usage(&readback), MemoryUsage::Readback);
        assert_eq!(explicit_memory_usage(&BufferDescriptor::constant(256, true)), MemoryUsage::Default);
        let flags = buffer_bind_flags(BufferUsage::VERTEX | BufferUsage::CONSTANT);
        assert!(flags.contains(BindFlags::VERTEX_BUFFER | BindFlags::CONSTANT_BUFFER));
        assert!(!flags.contains(BindFlags::INDEX_BUFFER));
    }
}
