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


mod common;

use approx::assert_relative_eq;
use common::{open_device, render_pipeline, BACKENDS};
use tessera_core::renderer::{
    BufferDescriptor, BufferUsage, Color, GraphicsError, IndexFormat, LoadAction, PrimitiveTopology,
    RenderPassColorAttachment, RenderPassDepthStencilAttachment, RenderPassDescriptor,
    ResolveTarget, SampleCount, ShaderResourceBinding, ShaderStage, StoreAction, TextureDescriptor,
    TextureFormat, TextureUsage,
};
use tessera_infra::SoftwareAdapter;

const RED: Color = Color::rgba(1.0, 0.0, 0.0, 1.0);

#[test]
fn test_clear_to_red_reads_back_on_both_backends() {
    for backend in BACKENDS {
        // --- 1. ARRANGE ---
        let adapter = SoftwareAdapter::new("clear");
        let mut device = open_device(backend, &adapter);
        let target = device
            .create_texture(
                &TextureDescriptor::new_2d(256, 256, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET)
                    .with_label("Clear Target"),
            )
            .expect("Render target creation should succeed");

        // --- 2. ACT ---
        device.begin_frame().unwrap();
        let attachments = [RenderPassColorAttachment::clear(target, RED)];
        let context = device.context();
        context
            .begin_render_pass(&RenderPassDescriptor {
                label: Some("Clear"),
                color_attachments: &attachments,
                depth_stencil_attachment: None,
            })
            .unwrap();
        assert!(context.is_in_render_pass());
        context.end_render_pass().unwrap();
        device.end_frame().unwrap();
        let pixels = device.read_texture(target, 0, 0).expect("Readback should succeed");

        // --- 3. ASSERT ---
        let texels: &[[u8; 4]] = bytemuck::cast_slice(&pixels);
        assert_eq!(texels.len(), 256 * 256, "{backend:?}: one texel per pixel");
        assert!(
            texels.iter().all(|texel| *texel == [255, 0, 0, 255]),
            "{backend:?}: every pixel should hold the clear color"
        );
        assert_eq!(adapter.stats().clears, 1);
    }
}

#[test]
fn test_depth_clear_only_touches_requested_aspects() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("depth");
        let mut device = open_device(backend, &adapter);
        let color = device
            .create_texture(&TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET))
            .unwrap();
        let depth = device
            .create_texture(&TextureDescriptor::new_2d(8, 8, TextureFormat::Depth32Float, TextureUsage::DEPTH_STENCIL))
            .unwrap();

        let attachments = [RenderPassColorAttachment::clear(color, Color::BLACK)];
        let context = device.context();
        context
            .begin_render_pass(&RenderPassDescriptor {
                label: Some("Depth"),
                color_attachments: &attachments,
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment::clear(depth, 0.25)),
            })
            .unwrap();
        context.end_render_pass().unwrap();

        let bytes = device.read_texture(depth, 0, 0).unwrap();
        let values: &[f32] = bytemuck::cast_slice(&bytes);
        assert_eq!(values.len(), 64);
        for value in values {
            assert_relative_eq!(*value, 0.25);
        }
        // One color clear and one depth clear; the stencil action is ignored
        // for a format without stencil.
        assert_eq!(adapter.stats().clears, 2, "{backend:?}");
    }
}

#[test]
fn test_discard_actions_issue_hints() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("discard");
        let mut device = open_device(backend, &adapter);
        let target = device
            .create_texture(&TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET))
            .unwrap();
        let attachments = [RenderPassColorAttachment {
            load: LoadAction::Discard,
            store: StoreAction::Discard,
            ..RenderPassColorAttachment::load(target)
        }];
        let context = device.context();
        context
            .begin_render_pass(&RenderPassDescriptor {
                color_attachments: &attachments,
                ..Default::default()
            })
            .unwrap();
        context.end_render_pass().unwrap();

        let stats = adapter.stats();
        assert_eq!(stats.discards, 2, "{backend:?}: one hint on load, one on store");
        assert_eq!(stats.clears, 0);
    }
}

#[test]
fn test_nested_and_orphan_passes_are_rejected() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("nesting");
        let mut device = open_device(backend, &adapter);
        let target = device
            .create_texture(&TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET))
            .unwrap();
        let attachments = [RenderPassColorAttachment::clear(target, RED)];
        let pass = RenderPassDescriptor {
            label: Some("Outer"),
            color_attachments: &attachments,
            depth_stencil_attachment: None,
        };

        let context = device.context();
        assert!(matches!(context.end_render_pass(), Err(GraphicsError::InvalidState(_))));
        context.begin_render_pass(&pass).unwrap();
        assert!(matches!(context.begin_render_pass(&pass), Err(GraphicsError::InvalidState(_))));
        // The failed begin left the outer pass open.
        assert!(context.is_in_render_pass());
        assert!(matches!(device.end_frame(), Err(GraphicsError::InvalidState(_))));
        device.context().end_render_pass().unwrap();
        device.end_frame().unwrap();
    }
}

#[test]
fn test_render_area_is_the_smallest_attachment() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("area");
        let mut device = open_device(backend, &adapter);
        let large = device
            .create_texture(&TextureDescriptor {
                mip_level_count: 2,
                ..TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET)
            })
            .unwrap();
        let small = device
            .create_texture(&TextureDescriptor::new_2d(16, 48, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET))
            .unwrap();
        let attachments = [
            RenderPassColorAttachment {
                mip: 1,
                ..RenderPassColorAttachment::clear(large, RED)
            },
            RenderPassColorAttachment::clear(small, RED),
        ];
        let context = device.context();
        context
            .begin_render_pass(&RenderPassDescriptor {
                color_attachments: &attachments,
                ..Default::default()
            })
            .unwrap();
        context.end_render_pass().unwrap();

        // Mip 1 of the large target is 32x32; the pass clears whole views.
        let mip = device.read_texture(large, 1, 0).unwrap();
        assert_eq!(mip.len(), 32 * 32 * 4);
        let untouched = device.read_texture(large, 0, 0).unwrap();
        assert!(untouched.iter().all(|byte| *byte == 0), "{backend:?}: mip 0 was never bound");
    }
}

#[test]
fn test_multisampled_attachment_resolves_on_store() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("resolve");
        let mut device = open_device(backend, &adapter);
        let msaa = device
            .create_texture(&TextureDescriptor {
                sample_count: SampleCount::X4,
                ..TextureDescriptor::new_2d(32, 32, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET)
            })
            .unwrap();
        let resolved = device
            .create_texture(&TextureDescriptor::new_2d(32, 32, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET))
            .unwrap();
        let attachments = [RenderPassColorAttachment {
            resolve_target: Some(ResolveTarget {
                texture: resolved,
                mip: 0,
                slice: 0,
            }),
            ..RenderPassColorAttachment::clear(msaa, RED)
        }];
        let context = device.context();
        context
            .begin_render_pass(&RenderPassDescriptor {
                color_attachments: &attachments,
                ..Default::default()
            })
            .unwrap();
        context.end_render_pass().unwrap();

        assert_eq!(adapter.stats().resolves, 1, "{backend:?}");
        let pixels = device.read_texture(resolved, 0, 0).unwrap();
        let texels: &[[u8; 4]] = bytemuck::cast_slice(&pixels);
        assert!(texels.iter().all(|texel| *texel == [255, 0, 0, 255]));
        assert!(matches!(
            device.read_texture(msaa, 0, 0),
            Err(GraphicsError::InvalidState(_))
        ));
    }
}

#[test]
fn test_draw_preconditions() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("draws");
        let mut device = open_device(backend, &adapter);
        let target = device
            .create_texture(&TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET))
            .unwrap();
        let pipeline = render_pipeline(device.as_ref(), PrimitiveTopology::TriangleList);
        let compute = common::compute_pipeline(device.as_ref());
        let indices = device
            .create_buffer(&BufferDescriptor {
                size: 64,
                usage: BufferUsage::INDEX,
                ..Default::default()
            })
            .unwrap();
        let attachments = [RenderPassColorAttachment::clear(target, RED)];

        let context = device.context();
        // Outside a pass.
        context.set_pipeline(Some(pipeline)).unwrap();
        assert!(matches!(context.draw(3, 1, 0, 0), Err(GraphicsError::InvalidState(_))));

        context
            .begin_render_pass(&RenderPassDescriptor {
                color_attachments: &attachments,
                ..Default::default()
            })
            .unwrap();
        context.set_pipeline(None).unwrap();
        assert!(matches!(context.draw(3, 1, 0, 0), Err(GraphicsError::InvalidState(_))));
        context.set_pipeline(Some(compute)).unwrap();
        assert!(matches!(context.draw(3, 1, 0, 0), Err(GraphicsError::InvalidState(_))));
        context.set_pipeline(Some(pipeline)).unwrap();
        assert!(matches!(
            context.draw_indexed(3, 1, 0, 0, 0),
            Err(GraphicsError::InvalidState(_))
        ));
        assert!(matches!(context.dispatch(1, 1, 1), Err(GraphicsError::InvalidState(_))));

        context.draw(3, 1, 0, 0).unwrap();
        context.draw(0, 1, 0, 0).unwrap();
        context.set_index_buffer(Some(indices), IndexFormat::Uint16, 0).unwrap();
        context.draw_indexed(6, 2, 0, 0, 0).unwrap();
        context.end_render_pass().unwrap();

        let stats = adapter.stats();
        let draws = stats.draws + stats.draws_instanced;
        assert_eq!(draws, 1, "{backend:?}: the zero-count draw is a no-op");
        assert_eq!(stats.draws_indexed + stats.draws_indexed_instanced, 1);
    }
}

#[test]
fn test_buffer_bindings_must_start_inside_the_buffer() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("offsets");
        let mut device = open_device(backend, &adapter);
        let vertices = device
            .create_buffer(&BufferDescriptor {
                size: 256,
                usage: BufferUsage::VERTEX,
                ..Default::default()
            })
            .unwrap();
        let indices = device
            .create_buffer(&BufferDescriptor {
                size: 64,
                usage: BufferUsage::INDEX,
                ..Default::default()
            })
            .unwrap();

        let context = device.context();
        assert!(
            matches!(
                context.set_vertex_buffer(0, Some(vertices), 4096, 16),
                Err(GraphicsError::InvalidState(_))
            ),
            "{backend:?}: vertex offset past the end"
        );
        assert!(
            matches!(
                context.set_index_buffer(Some(indices), IndexFormat::Uint16, 64),
                Err(GraphicsError::InvalidState(_))
            ),
            "{backend:?}: index offset past the end"
        );
        context.set_vertex_buffer(0, Some(vertices), 240, 16).unwrap();
        context.set_index_buffer(Some(indices), IndexFormat::Uint16, 32).unwrap();
    }
}

#[test]
fn test_sampling_an_attachment_of_the_open_pass_is_rejected() {
    for backend in BACKENDS {
        // --- 1. ARRANGE ---
        let adapter = SoftwareAdapter::new("feedback");
        let mut device = open_device(backend, &adapter);
        let target = device
            .create_texture(&TextureDescriptor::new_2d(
                16,
                16,
                TextureFormat::Rgba8Unorm,
                TextureUsage::RENDER_TARGET | TextureUsage::SHADER_RESOURCE,
            ))
            .unwrap();
        let pipeline = render_pipeline(device.as_ref(), PrimitiveTopology::TriangleList);
        let attachments = [RenderPassColorAttachment::clear(target, RED)];
        let pass = RenderPassDescriptor {
            color_attachments: &attachments,
            ..Default::default()
        };
        let context = device.context();

        // --- 2. ACT ---
        context
            .set_shader_resource(ShaderStage::Fragment, 3, Some(ShaderResourceBinding::Texture(target)))
            .unwrap();
        context.begin_render_pass(&pass).unwrap();
        context.set_pipeline(Some(pipeline)).unwrap();
        let bound_before_pass = context.draw(3, 1, 0, 0);

        context.set_shader_resource(ShaderStage::Fragment, 3, None).unwrap();
        context
            .set_shader_resource(ShaderStage::Vertex, 0, Some(ShaderResourceBinding::TextureMip(target, 0)))
            .unwrap();
        let bound_inside_pass = context.draw(3, 1, 0, 0);

        context.set_shader_resource(ShaderStage::Vertex, 0, None).unwrap();
        let unbound = context.draw(3, 1, 0, 0);
        context.end_render_pass().unwrap();

        // --- 3. ASSERT ---
        assert!(matches!(bound_before_pass, Err(GraphicsError::InvalidState(_))), "{backend:?}");
        assert!(matches!(bound_inside_pass, Err(GraphicsError::InvalidState(_))), "{backend:?}");
        assert!(unbound.is_ok(), "{backend:?}: {unbound:?}");
        let stats = adapter.stats();
        assert_eq!(stats.draws + stats.draws_instanced, 1, "{backend:?}");
    }
}
