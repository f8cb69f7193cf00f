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


use crate::renderer::api::{DeviceDescriptor, GraphicsAdapterInfo, GraphicsBackendType};
use crate::renderer::error::GraphicsError;
use crate::renderer::traits::GraphicsDevice;

/// A trait for an object that discovers adapters for one backend and opens devices on them.
///
/// Probing is cheap (adapter enumeration and a minimum feature level check) and the
/// result is cached for the lifetime of the process, so `is_supported` may be called
/// freely.
pub trait GraphicsFactory: Send + Sync {
    /// The backend this factory opens devices for.
    fn backend_type(&self) -> GraphicsBackendType;

    /// Returns `true` if at least one adapter meets the backend's minimum feature level.
    fn is_supported(&self) -> bool;

    /// Lists every adapter this backend can use.
    ///
    /// # Errors
    ///
    /// `BackendUnsupported` if the backend cannot be initialized at all.
    fn enumerate_adapters(&self) -> Result<Vec<GraphicsAdapterInfo>, GraphicsError>;

    /// Opens a device on the adapter selected by `descriptor.adapter_index`.
    ///
    /// # Errors
    ///
    /// * `BackendUnsupported` if the probe failed or the adapter index is out of range.
    /// * `ResourceCreationFailed` if the driver rejected device creation. Anything
    ///   acquired before the failure has been released.
    fn create_device(
        &self,
        descriptor: &DeviceDescriptor,
    ) -> Result<Box<dyn GraphicsDevice>, GraphicsError>;
}
