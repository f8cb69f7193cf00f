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


//! Defines the core architectural traits of the graphics abstraction layer.
//!
//! These contracts decouple client rendering code from the backend in use.
//!
//! - [`GraphicsFactory`]: probes a backend and opens devices on it.
//! - [`GraphicsDevice`]: creates and destroys resources, owns frame boundaries.
//! - [`CommandContext`]: records render passes, bindings, draws and copies.

mod command_context;
mod factory;
mod graphics_device;

pub use self::command_context::CommandContext;
pub use self::factory::GraphicsFactory;
pub use self::graphics_device::GraphicsDevice;
