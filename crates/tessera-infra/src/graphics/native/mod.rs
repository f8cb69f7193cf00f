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


//! The native driver interfaces the backends are written against.
//!
//! [`ImmediateDriver`] models a stateful device with an immediate context and
//! driver-managed hazards. [`ExplicitDriver`] models command lists, descriptor
//! heaps, resource barriers and fences. Both hand out [`RawObject`]s whose
//! lifetime is reference counted by the driver; the backends wrap every one of
//! them in a [`NativeHandle`] so that exactly one owner releases it.

pub mod explicit;
pub mod immediate;

pub use self::explicit::ExplicitDriver;
pub use self::immediate::ImmediateDriver;

use std::fmt;
use std::sync::Arc;
use tessera_core::renderer::lifetime::DescriptorKind;
use tessera_core::renderer::{
    GraphicsError, IndexFormat, PresentMode, SurfaceHandle, TextureDescriptor, TextureDimension,
    TextureFormat, TextureUsage,
};
use tessera_core::tessera_bitflags;

/// A driver object id. Zero is never a valid object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RawObject(pub u64);

impl RawObject {
    /// The null object.
    pub const NULL: Self = Self(0);

    /// Returns `true` for the null object.
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Reference counting and naming of driver objects.
pub trait ObjectLifetime: Send + Sync {
    /// Adds a reference to `object`.
    fn add_ref(&self, object: RawObject);
    /// Drops a reference to `object`, destroying it when none are left.
    fn release(&self, object: RawObject);
    /// Sets the debug name shown by driver tools.
    fn set_name(&self, object: RawObject, name: &str);
}

/// Owns one reference to a driver object and releases it on drop.
///
/// Moving a handle transfers ownership. A second owner must be created
/// explicitly with [`add_ref`](Self::add_ref).
pub struct NativeHandle {
    raw: RawObject,
    owner: Arc<dyn ObjectLifetime>,
}

impl NativeHandle {
    /// Takes ownership of the reference a driver call returned.
    pub fn from_raw(raw: RawObject, owner: Arc<dyn ObjectLifetime>) -> Self {
        Self { raw, owner }
    }

    /// The wrapped object id.
    pub fn raw(&self) -> RawObject {
        self.raw
    }

    /// Creates a second owner of the same object.
    pub fn add_ref(&self) -> Self {
        self.owner.add_ref(self.raw);
        Self {
            raw: self.raw,
            owner: Arc::clone(&self.owner),
        }
    }

    /// Sets the object's debug name.
    pub fn set_name(&self, name: &str) {
        self.owner.set_name(self.raw, name);
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            self.owner.release(self.raw);
        }
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeHandle").field(&self.raw.0).finish()
    }
}

/// An error reported by a native driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The call broke an API rule (reported by the validation layer when enabled).
    InvalidCall(String),
    /// The driver could not allocate the object.
    OutOfMemory(String),
    /// The requested feature or format is not available.
    Unsupported(String),
    /// The device was removed; every later call fails the same way.
    DeviceRemoved(String),
}

impl DriverError {
    /// Converts a failed creation call into the public error type.
    pub fn into_creation_error(self, what: impl Into<String>) -> GraphicsError {
        match self {
            DriverError::DeviceRemoved(msg) => GraphicsError::DeviceLost(msg),
            other => GraphicsError::creation_failed(what, other),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::InvalidCall(msg) => write!(f, "invalid call: {msg}"),
            DriverError::OutOfMemory(msg) => write!(f, "out of memory: {msg}"),
            DriverError::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            DriverError::DeviceRemoved(msg) => write!(f, "device removed: {msg}"),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<DriverError> for GraphicsError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::DeviceRemoved(msg) => GraphicsError::DeviceLost(msg),
            DriverError::InvalidCall(msg) => GraphicsError::InvalidState(msg),
            other => GraphicsError::creation_failed("native object", other),
        }
    }
}

/// Result of a native driver call.
pub type DriverResult<T> = Result<T, DriverError>;

/// The shape of a native resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceDimension {
    /// A linear buffer; `width` is its size in bytes.
    Buffer,
    /// A 1D texture or texture array.
    Texture1D,
    /// A 2D texture or texture array.
    Texture2D,
    /// A volume texture.
    Texture3D,
}

tessera_bitflags! {
    /// How a native resource may be bound.
    pub struct BindFlags: u32 {
        /// Vertex buffer.
        const VERTEX_BUFFER = 1 << 0;
        /// Index buffer.
        const INDEX_BUFFER = 1 << 1;
        /// Constant buffer.
        const CONSTANT_BUFFER = 1 << 2;
        /// Shader resource view.
        const SHADER_RESOURCE = 1 << 3;
        /// Render target view.
        const RENDER_TARGET = 1 << 4;
        /// Depth-stencil view.
        const DEPTH_STENCIL = 1 << 5;
        /// Unordered access view.
        const UNORDERED_ACCESS = 1 << 6;
    }
}

/// Where a native resource lives and who can touch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryUsage {
    /// GPU read/write memory.
    #[default]
    Default,
    /// GPU read, CPU write-discard memory (immediate drivers).
    Dynamic,
    /// CPU read/write staging memory used for copies (immediate drivers).
    Staging,
    /// CPU-written, GPU-read upload heap (explicit drivers).
    Upload,
    /// GPU-written, CPU-read readback heap (explicit drivers).
    Readback,
}

impl MemoryUsage {
    /// Returns `true` if the CPU may map the resource.
    pub const fn is_cpu_visible(&self) -> bool {
        !matches!(self, MemoryUsage::Default)
    }
}

/// Creation parameters of a native buffer or texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceDesc {
    /// Buffer or texture shape.
    pub dimension: ResourceDimension,
    /// Width in texels, or size in bytes for buffers.
    pub width: u64,
    /// Height in texels (1 for buffers and 1D textures).
    pub height: u32,
    /// Depth of volume textures, array size otherwise.
    pub depth_or_array_size: u32,
    /// Mip levels.
    pub mip_levels: u32,
    /// Texel format (`Unknown` for buffers).
    pub format: TextureFormat,
    /// Samples per pixel.
    pub sample_count: u32,
    /// Allowed bindings.
    pub bind: BindFlags,
    /// Memory placement.
    pub usage: MemoryUsage,
    /// Structure stride of buffers, 0 for raw buffers.
    pub stride: u32,
}

impl ResourceDesc {
    /// A buffer of `size` bytes.
    pub fn buffer(size: u64, bind: BindFlags, usage: MemoryUsage, stride: u32) -> Self {
        Self {
            dimension: ResourceDimension::Buffer,
            width: size,
            height: 1,
            depth_or_array_size: 1,
            mip_levels: 1,
            format: TextureFormat::Unknown,
            sample_count: 1,
            bind,
            usage,
            stride,
        }
    }

    /// The native texture matching a public texture descriptor.
    pub fn texture(desc: &TextureDescriptor, usage: MemoryUsage) -> Self {
        let mut bind = BindFlags::EMPTY;
        if desc.usage.contains(TextureUsage::SHADER_RESOURCE) {
            bind |= BindFlags::SHADER_RESOURCE;
        }
        if desc.usage.contains(TextureUsage::RENDER_TARGET) {
            bind |= BindFlags::RENDER_TARGET;
        }
        if desc.usage.contains(TextureUsage::DEPTH_STENCIL) {
            bind |= BindFlags::DEPTH_STENCIL;
        }
        if desc.usage.contains(TextureUsage::UNORDERED_ACCESS) {
            bind |= BindFlags::UNORDERED_ACCESS;
        }
        Self {
            dimension: match desc.dimension {
                TextureDimension::D1 => ResourceDimension::Texture1D,
                TextureDimension::D2 => ResourceDimension::Texture2D,
                TextureDimension::D3 => ResourceDimension::Texture3D,
            },
            width: desc.width as u64,
            height: desc.height,
            depth_or_array_size: desc.depth_or_array_layers,
            mip_levels: desc.mip_level_count,
            format: desc.format,
            sample_count: desc.sample_count.count(),
            bind,
            usage,
            stride: 0,
        }
    }

    /// The description of every back buffer of a swapchain.
    pub fn back_buffer(desc: &SwapChainDesc) -> Self {
        Self {
            dimension: ResourceDimension::Texture2D,
            width: desc.width as u64,
            height: desc.height,
            depth_or_array_size: 1,
            mip_levels: 1,
            format: desc.format,
            sample_count: 1,
            bind: BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE,
            usage: MemoryUsage::Default,
            stride: 0,
        }
    }

    /// The same resource placed in different memory with no bindings, used for copies.
    pub fn staging_copy(&self, usage: MemoryUsage) -> Self {
        Self {
            bind: BindFlags::EMPTY,
            usage,
            sample_count: 1,
            ..*self
        }
    }

    /// Whether two resources can be copied onto each other as a whole.
    pub fn same_layout(&self, other: &Self) -> bool {
        self.dimension == other.dimension
            && self.width == other.width
            && self.height == other.height
            && self.depth_or_array_size == other.depth_or_array_size
            && self.mip_levels == other.mip_levels
            && self.format == other.format
            && self.sample_count == other.sample_count
    }

    /// Returns `true` for buffers.
    pub fn is_buffer(&self) -> bool {
        self.dimension == ResourceDimension::Buffer
    }

    /// Array slices (1 for buffers and volume textures).
    pub fn array_size(&self) -> u32 {
        match self.dimension {
            ResourceDimension::Texture1D | ResourceDimension::Texture2D => {
                self.depth_or_array_size.max(1)
            }
            _ => 1,
        }
    }

    /// The number of subresources.
    pub fn subresource_count(&self) -> u32 {
        self.mip_levels.max(1) * self.array_size()
    }

    /// The subresource index of a mip and slice.
    pub fn subresource(&self, mip: u32, slice: u32) -> u32 {
        mip + slice * self.mip_levels.max(1)
    }

    /// Width, height and depth of a mip.
    pub fn mip_extent(&self, mip: u32) -> (u32, u32, u32) {
        let shift = mip.min(31);
        let depth = match self.dimension {
            ResourceDimension::Texture3D => (self.depth_or_array_size >> shift).max(1),
            _ => 1,
        };
        (
            ((self.width as u32) >> shift).max(1),
            (self.height >> shift).max(1),
            depth,
        )
    }

    /// Tightly packed row size of a mip.
    pub fn row_pitch(&self, mip: u32) -> u32 {
        if self.is_buffer() {
            return self.width as u32;
        }
        self.mip_extent(mip).0 * self.format.bytes_per_pixel()
    }

    /// Bytes of one tightly packed subresource.
    pub fn subresource_size(&self, mip: u32) -> usize {
        if self.is_buffer() {
            return self.width as usize;
        }
        let (w, h, d) = self.mip_extent(mip);
        w as usize * h as usize * d as usize * self.format.bytes_per_pixel() as usize
    }
}

/// The kind of descriptor a view is created as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeViewKind {
    /// Render target view.
    RenderTarget,
    /// Depth-stencil view.
    DepthStencil,
    /// Shader resource view.
    ShaderResource,
    /// Unordered access view.
    UnorderedAccess,
}

impl NativeViewKind {
    /// The descriptor heap kind views of this kind are written into.
    pub fn descriptor_kind(&self) -> DescriptorKind {
        match self {
            NativeViewKind::RenderTarget => DescriptorKind::RenderTarget,
            NativeViewKind::DepthStencil => DescriptorKind::DepthStencil,
            NativeViewKind::ShaderResource | NativeViewKind::UnorderedAccess => {
                DescriptorKind::ShaderResource
            }
        }
    }
}

/// The subresource range a view covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewDesc {
    /// What the view is used as.
    pub kind: NativeViewKind,
    /// View format; always the resource's format.
    pub format: TextureFormat,
    /// First mip.
    pub first_mip: u32,
    /// Number of mips.
    pub mip_count: u32,
    /// First array slice, or first element for buffers.
    pub first_slice: u32,
    /// Number of array slices, or elements for buffers.
    pub slice_count: u32,
}

impl ViewDesc {
    /// A view of every element of a buffer.
    pub fn whole_buffer(kind: NativeViewKind, desc: &ResourceDesc) -> Self {
        let stride = if desc.stride == 0 { 4 } else { desc.stride };
        Self {
            kind,
            format: TextureFormat::Unknown,
            first_mip: 0,
            mip_count: 1,
            first_slice: 0,
            slice_count: (desc.width / stride as u64) as u32,
        }
    }
}

/// Creation parameters of a native swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDesc {
    /// The window to present into, if any.
    pub surface: Option<SurfaceHandle>,
    /// Back buffer width.
    pub width: u32,
    /// Back buffer height.
    pub height: u32,
    /// Back buffer format.
    pub format: TextureFormat,
    /// Number of back buffers.
    pub buffer_count: u32,
    /// Presentation mode.
    pub present_mode: PresentMode,
}

/// How the CPU maps a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapMode {
    /// Read access to staging memory.
    Read,
    /// Write access to staging memory.
    Write,
    /// Write access whose previous contents are discarded (dynamic resources).
    WriteDiscard,
}

/// Layout of a mapped subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MappedSubresource {
    /// Bytes between rows.
    pub row_pitch: u32,
    /// Bytes between depth slices.
    pub depth_pitch: u32,
    /// Bytes accessible through the mapping.
    pub len: usize,
}

/// One vertex buffer slot as seen by the input assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferBinding {
    /// The buffer, or `None` to unbind the slot.
    pub buffer: Option<RawObject>,
    /// Element stride.
    pub stride: u32,
    /// Byte offset of the first element.
    pub offset: u64,
}

/// The index buffer as seen by the input assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBufferBinding {
    /// The buffer.
    pub buffer: RawObject,
    /// Index width.
    pub format: IndexFormat,
    /// Byte offset of the first index.
    pub offset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLifetime {
        events: Mutex<Vec<(&'static str, u64)>>,
    }

    impl ObjectLifetime for RecordingLifetime {
        fn add_ref(&self, object: RawObject) {
            self.events.lock().unwrap().push(("add_ref", object.0));
        }
        fn release(&self, object: RawObject) {
            self.events.lock().unwrap().push(("release", object.0));
        }
        fn set_name(&self, _object: RawObject, _name: &str) {}
    }

    #[test]
    fn handle_releases_exactly_once_per_owner() {
        let lifetime = Arc::new(RecordingLifetime::default());
        let handle = NativeHandle::from_raw(RawObject(9), lifetime.clone());
        let second = handle.add_ref();
        drop(handle);
        drop(second);
        assert_eq!(
            *lifetime.events.lock().unwrap(),
            vec![("add_ref", 9), ("release", 9), ("release", 9)]
        );
    }

    #[test]
    fn device_removal_maps_to_device_lost() {
        let err: GraphicsError = DriverError::DeviceRemoved("hung".into()).into();
        assert!(err.is_fatal());
        let err = DriverError::OutOfMemory("heap".into()).into_creation_error("buffer");
        assert!(matches!(err, GraphicsError::ResourceCreationFailed { .. }));
    }

    #[test]
    fn subresource_layout() {
        let desc = ResourceDesc {
            dimension: ResourceDimension::Texture2D,
            width: 16,
            height: 8,
            depth_or_array_size: 3,
            mip_levels: 2,
            format: TextureFormat::Rgba8Unorm,
            sample_count: 1,
            bind: BindFlags::SHADER_RESOURCE,
            usage: MemoryUsage::Default,
            stride: 0,
        };
        assert_eq!(desc.subresource_count(), 6);
        assert_eq!(desc.subresource(1, 2), 5);
        assert_eq!(desc.subresource_size(1), 8 * 4 * 4);
        assert_eq!(desc.row_pitch(0), 64);
    }
}
