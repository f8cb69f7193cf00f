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


//! # Tessera Infra
//!
//! Concrete implementations of the `tessera-core` graphics contracts: an
//! immediate backend, an explicit backend, the native driver interfaces both
//! are written against, and a software adapter implementing those drivers on
//! the CPU.
//!
//! Most callers only need [`create_device`]:
//!
//! ```
//! use tessera_core::renderer::{BackendSelectionConfig, DeviceDescriptor};
//!
//! let selected = tessera_infra::create_device(
//!     &BackendSelectionConfig::default(),
//!     &DeviceDescriptor::default(),
//! )
//! .unwrap();
//! println!("Running on {}", selected.adapter_info.name);
//! ```

#![warn(missing_docs)]

pub mod graphics;

pub use self::graphics::factory::{create_device, create_device_with, AdapterSource};
#[cfg(feature = "explicit")]
pub use self::graphics::factory::ExplicitFactory;
#[cfg(feature = "immediate")]
pub use self::graphics::factory::ImmediateFactory;
pub use self::graphics::software::SoftwareAdapter;
