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


// Tessera Sandbox
// Draws a triangle into an offscreen swapchain on each backend.

use std::borrow::Cow;
use std::mem;

use anyhow::{Context, Result};
use tessera_core::renderer::{
    BackendSelectionConfig, BufferDescriptor, BufferUsage, Color, DeviceDescriptor,
    GraphicsBackendType, GraphicsDevice, PipelineDescriptor, RenderPassColorAttachment,
    RenderPassDescriptor, RenderPipelineDescriptor, ShaderBytecode, SwapChainDescriptor,
    TextureFormat, VertexAttribute, VertexFormat, VertexStepMode,
};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;
const FRAMES: u32 = 3;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
    color: [f32; 3],
}

impl Vertex {
    fn attributes() -> [VertexAttribute<'static>; 2] {
        [
            VertexAttribute {
                semantic: Cow::Borrowed("POSITION"),
                semantic_index: 0,
                format: VertexFormat::Float32x3,
                buffer_slot: 0,
                offset: 0,
                step_mode: VertexStepMode::Vertex,
            },
            VertexAttribute {
                semantic: Cow::Borrowed("COLOR"),
                semantic_index: 0,
                format: VertexFormat::Float32x3,
                buffer_slot: 0,
                offset: mem::size_of::<[f32; 3]>() as u32,
                step_mode: VertexStepMode::Vertex,
            },
        ]
    }
}

const VERTICES: &[Vertex] = &[
    Vertex {
        position: [0.0, 0.5, 0.0],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        position: [-0.5, -0.5, 0.0],
        color: [0.0, 1.0, 0.0],
    },
    Vertex {
        position: [0.5, -0.5, 0.0],
        color: [0.0, 0.0, 1.0],
    },
];

// Precompiled shader blobs would be loaded from disk in a real application.
const VERTEX_SHADER: &[u8] = b"vs_5_0 triangle";
const FRAGMENT_SHADER: &[u8] = b"ps_5_0 vertex_color";

fn render(device: &mut dyn GraphicsDevice) -> Result<()> {
    let attributes = Vertex::attributes();
    let pipeline = device.create_pipeline(&PipelineDescriptor::Render(RenderPipelineDescriptor {
        label: Some("Triangle".into()),
        vertex_shader: ShaderBytecode::new(VERTEX_SHADER),
        fragment_shader: Some(ShaderBytecode::new(FRAGMENT_SHADER)),
        vertex_attributes: Cow::Borrowed(&attributes[..]),
        color_formats: Cow::Borrowed(&[TextureFormat::Bgra8Unorm]),
        ..Default::default()
    }))?;
    let vertex_buffer = device.create_buffer_with_data(
        &BufferDescriptor {
            size: mem::size_of_val(VERTICES) as u64,
            usage: BufferUsage::VERTEX,
            ..Default::default()
        }
        .with_label("Triangle Vertices"),
        bytemuck::cast_slice(VERTICES),
    )?;
    let swapchain = device.create_swapchain(&SwapChainDescriptor {
        label: Some("Offscreen".into()),
        width: WIDTH,
        height: HEIGHT,
        ..Default::default()
    })?;

    let clear = Color::rgba(0.1, 0.2, 0.3, 1.0);
    for _ in 0..FRAMES {
        device.begin_frame()?;
        let back_buffer = device.swapchain_back_buffer(swapchain)?;
        let attachments = [RenderPassColorAttachment::clear(back_buffer, clear)];
        let context = device.context();
        context.begin_render_pass(&RenderPassDescriptor {
            label: Some("Main Pass"),
            color_attachments: &attachments,
            depth_stencil_attachment: None,
        })?;
        context.set_pipeline(Some(pipeline))?;
        context.set_vertex_buffer(0, Some(vertex_buffer), 0, mem::size_of::<Vertex>() as u32)?;
        context.draw(VERTICES.len() as u32, 1, 0, 0)?;
        context.end_render_pass()?;
        device.end_frame()?;
    }

    let back_buffer = device.swapchain_back_buffer(swapchain)?;
    let pixels = device.read_texture(back_buffer, 0, 0)?;
    let texels: &[[u8; 4]] = bytemuck::cast_slice(&pixels);
    log::info!(
        "Read back {} texels, first is {:?}",
        texels.len(),
        texels.first().copied().unwrap_or_default()
    );

    device.destroy_swapchain(swapchain)?;
    device.destroy_buffer(vertex_buffer)?;
    device.destroy_pipeline(pipeline)?;
    device.wait_for_gpu()?;
    log::info!("Device stats: {:?}", device.stats());
    Ok(())
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    for backend in [GraphicsBackendType::Explicit, GraphicsBackendType::Immediate] {
        let selection = tessera_infra::create_device(
            &BackendSelectionConfig::default(),
            &DeviceDescriptor {
                label: Some("Sandbox".into()),
                backend,
                ..Default::default()
            },
        )
        .with_context(|| format!("no {} device available", backend.name()))?;
        log::info!(
            "Opened {} device on '{}' in {} ms",
            backend.name(),
            selection.adapter_info.name,
            selection.selection_time_ms
        );
        let mut device = selection.device;
        render(device.as_mut())?;
    }
    Ok(())
}
