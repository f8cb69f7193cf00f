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


//! Swapchain descriptors and the surface handle wrapper.

use crate::renderer::api::format::TextureFormat;
use raw_window_handle::{
    HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle,
};
use std::borrow::Cow;

/// How finished frames are handed to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PresentMode {
    /// Wait for vertical blank (sync interval 1).
    #[default]
    Fifo,
    /// Present as soon as possible, allowing tearing.
    Immediate,
}

impl PresentMode {
    /// The sync interval passed to the driver's present call.
    pub const fn sync_interval(&self) -> u32 {
        match self {
            PresentMode::Fifo => 1,
            PresentMode::Immediate => 0,
        }
    }
}

/// The raw window and display a swapchain presents into.
///
/// The handles are borrowed from the windowing layer, which must keep the
/// window alive for as long as the swapchain exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle {
    /// The native window.
    pub window: RawWindowHandle,
    /// The native display connection.
    pub display: RawDisplayHandle,
}

// SAFETY: the handles are plain identifiers; the windowing layer guarantees the
// window outlives the swapchain and the HAL never dereferences them itself.
unsafe impl Send for SurfaceHandle {}
// SAFETY: see above.
unsafe impl Sync for SurfaceHandle {}

impl SurfaceHandle {
    /// Captures the raw handles of any window type implementing the
    /// `raw-window-handle` traits (e.g. a `winit` window).
    pub fn from_window<W: HasWindowHandle + HasDisplayHandle>(
        window: &W,
    ) -> Result<Self, HandleError> {
        Ok(Self {
            window: window.window_handle()?.as_raw(),
            display: window.display_handle()?.as_raw(),
        })
    }
}

/// A descriptor used to create a [`SwapChainId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapChainDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The surface to present into; `None` creates an offscreen swapchain.
    pub surface: Option<SurfaceHandle>,
    /// Back buffer width in pixels.
    pub width: u32,
    /// Back buffer height in pixels.
    pub height: u32,
    /// Back buffer format.
    pub format: TextureFormat,
    /// Number of back buffers, in `2..=16`.
    pub buffer_count: u32,
    /// Presentation mode.
    pub present_mode: PresentMode,
}

impl Default for SwapChainDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            surface: None,
            width: 1,
            height: 1,
            format: TextureFormat::Bgra8Unorm,
            buffer_count: 2,
            present_mode: PresentMode::Fifo,
        }
    }
}

/// An opaque handle to a swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SwapChainId(pub usize);
