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


//! Defines data structures related to GPU buffer resources.

use crate::renderer::api::common::CpuAccess;
use crate::tessera_bitflags;
use std::borrow::Cow;

/// The smallest buffer a device will create, in bytes.
pub const MIN_BUFFER_SIZE: u64 = 4;

/// Constant buffers must be sized in multiples of this many bytes.
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 16;

tessera_bitflags! {
    /// A set of flags describing the allowed usages of a [`BufferId`].
    ///
    /// The backend uses them to pick the initial resource state and the memory
    /// heap, and the command context validates bindings against them.
    pub struct BufferUsage: u32 {
        /// The buffer can be bound as a vertex buffer.
        const VERTEX = 1 << 0;
        /// The buffer can be bound as an index buffer.
        const INDEX = 1 << 1;
        /// The buffer can be bound as a constant buffer.
        const CONSTANT = 1 << 2;
        /// The buffer can be read from shaders through a shader resource view.
        const SHADER_RESOURCE = 1 << 3;
        /// The buffer can be written from compute shaders.
        const UNORDERED_ACCESS = 1 << 4;
        /// The buffer can hold indirect draw or dispatch arguments.
        const INDIRECT = 1 << 5;
    }
}

/// A descriptor used to create a [`BufferId`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferDescriptor<'a> {
    /// An optional debug label for the buffer.
    pub label: Option<Cow<'a, str>>,
    /// The total size of the buffer in bytes.
    pub size: u64,
    /// The element stride in bytes for structured shader resource views, 0 for raw buffers.
    pub stride: u32,
    /// A bitmask of [`BufferUsage`] flags describing how the buffer will be used.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub usage: BufferUsage,
    /// The CPU access the buffer is created with.
    pub cpu_access: CpuAccess,
}

impl Default for BufferDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            size: MIN_BUFFER_SIZE,
            stride: 0,
            usage: BufferUsage::VERTEX,
            cpu_access: CpuAccess::None,
        }
    }
}

impl<'a> BufferDescriptor<'a> {
    /// A constant buffer of `size` bytes, CPU-writable when `dynamic` is set.
    pub fn constant(size: u64, dynamic: bool) -> Self {
        Self {
            size,
            usage: BufferUsage::CONSTANT,
            cpu_access: if dynamic { CpuAccess::Write } else { CpuAccess::None },
            ..Default::default()
        }
    }

    /// Returns the same descriptor with a debug label attached.
    pub fn with_label(mut self, label: impl Into<Cow<'a, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns `true` if the CPU maps this buffer to write it.
    pub fn is_dynamic(&self) -> bool {
        self.cpu_access == CpuAccess::Write
    }
}

/// An opaque handle to a GPU buffer resource.
///
/// This ID is returned by `GraphicsDevice::create_buffer` and is used to reference
/// the buffer in all subsequent operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferId(pub usize);
