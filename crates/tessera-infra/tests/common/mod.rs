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


//! Helpers shared by the integration tests.

#![allow(dead_code)]

use tessera_core::renderer::{
    ComputePipelineDescriptor, DeviceDescriptor, GraphicsBackendType, GraphicsDevice,
    PipelineDescriptor, PipelineId, PrimitiveTopology, RenderPipelineDescriptor, ShaderBytecode,
};
use tessera_infra::graphics::factory::factory_for;
use tessera_infra::{AdapterSource, SoftwareAdapter};

/// Both backends, in the order tests run them.
pub const BACKENDS: [GraphicsBackendType; 2] =
    [GraphicsBackendType::Immediate, GraphicsBackendType::Explicit];

/// Opaque bytecode; the software adapter only checks that it is present.
pub const VERTEX_SHADER: &[u8] = b"vs_5_0 passthrough";
pub const FRAGMENT_SHADER: &[u8] = b"ps_5_0 solid";
pub const COMPUTE_SHADER: &[u8] = b"cs_5_0 fill";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Opens a validated device on `adapter`.
pub fn open_device(backend: GraphicsBackendType, adapter: &SoftwareAdapter) -> Box<dyn GraphicsDevice> {
    init_logging();
    let factory = factory_for(backend, AdapterSource::Custom(vec![adapter.clone()]))
        .expect("Both backends should be compiled in");
    factory
        .create_device(&DeviceDescriptor {
            label: Some(format!("{backend:?} test device").into()),
            backend,
            enable_validation: true,
            ..Default::default()
        })
        .expect("Device should open on a fresh software adapter")
}

pub fn render_pipeline(device: &dyn GraphicsDevice, topology: PrimitiveTopology) -> PipelineId {
    device
        .create_pipeline(&PipelineDescriptor::Render(RenderPipelineDescriptor {
            label: Some(format!("{topology:?} pipeline").into()),
            vertex_shader: ShaderBytecode::new(VERTEX_SHADER),
            fragment_shader: Some(ShaderBytecode::new(FRAGMENT_SHADER)),
            topology,
            ..Default::default()
        }))
        .expect("Render pipeline creation should succeed")
}

pub fn compute_pipeline(device: &dyn GraphicsDevice) -> PipelineId {
    device
        .create_pipeline(&PipelineDescriptor::Compute(ComputePipelineDescriptor {
            label: Some("fill".into()),
            compute_shader: ShaderBytecode::new(COMPUTE_SHADER),
        }))
        .expect("Compute pipeline creation should succeed")
}
