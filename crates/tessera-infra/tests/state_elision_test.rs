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

use common::{compute_pipeline, open_device, render_pipeline, BACKENDS};
use tessera_core::renderer::{
    BufferDescriptor, BufferUsage, Color, GraphicsBackendType, PrimitiveTopology,
    RenderPassColorAttachment, RenderPassDescriptor, ShaderResourceBinding, ShaderStage,
    TextureDescriptor, TextureFormat, TextureUsage, UnorderedAccessBinding,
};
use tessera_infra::SoftwareAdapter;

#[test]
fn test_rebinding_the_same_pipeline_is_elided() {
    for backend in BACKENDS {
        // --- 1. ARRANGE ---
        let adapter = SoftwareAdapter::new("elision");
        let mut device = open_device(backend, &adapter);
        let target = device
            .create_texture(&TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET))
            .unwrap();
        let pipeline = render_pipeline(device.as_ref(), PrimitiveTopology::TriangleList);
        let attachments = [RenderPassColorAttachment::clear(target, Color::BLACK)];
        let context = device.context();
        context
            .begin_render_pass(&RenderPassDescriptor {
                color_attachments: &attachments,
                ..Default::default()
            })
            .unwrap();
        context.set_pipeline(Some(pipeline)).unwrap();
        context.draw(3, 1, 0, 0).unwrap();
        let before = adapter.stats();

        // --- 2. ACT ---
        context.set_pipeline(Some(pipeline)).unwrap();
        context.draw(3, 1, 0, 0).unwrap();
        context.end_render_pass().unwrap();

        // --- 3. ASSERT ---
        let after = adapter.stats();
        assert_eq!(after.pipeline_binds, before.pipeline_binds, "{backend:?}");
        assert_eq!(after.topology_binds, before.topology_binds, "{backend:?}");
        assert_eq!(after.viewport_sets, before.viewport_sets, "{backend:?}");
        assert_eq!(after.scissor_sets, before.scissor_sets, "{backend:?}");
        assert_eq!(after.draws + after.draws_instanced, before.draws + before.draws_instanced + 1);
    }
}

#[test]
fn test_pipelines_differing_in_topology_only_rebind_topology() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("topology");
        let mut device = open_device(backend, &adapter);
        let target = device
            .create_texture(&TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET))
            .unwrap();
        let triangles = render_pipeline(device.as_ref(), PrimitiveTopology::TriangleList);
        let lines = render_pipeline(device.as_ref(), PrimitiveTopology::LineList);
        let attachments = [RenderPassColorAttachment::clear(target, Color::BLACK)];
        let context = device.context();
        context
            .begin_render_pass(&RenderPassDescriptor {
                color_attachments: &attachments,
                ..Default::default()
            })
            .unwrap();
        context.set_pipeline(Some(triangles)).unwrap();
        context.draw(3, 1, 0, 0).unwrap();
        let before = adapter.stats();

        context.set_pipeline(Some(lines)).unwrap();
        context.draw(2, 1, 0, 0).unwrap();
        context.end_render_pass().unwrap();

        let after = adapter.stats();
        assert_eq!(after.topology_binds, before.topology_binds + 1, "{backend:?}");
        assert_eq!(after.rasterizer_binds, before.rasterizer_binds, "{backend:?}");
        assert_eq!(after.blend_binds, before.blend_binds, "{backend:?}");
        assert_eq!(after.depth_stencil_binds, before.depth_stencil_binds, "{backend:?}");
        assert!(after.pipeline_binds > before.pipeline_binds);
    }
}

#[test]
fn test_unchanged_slots_are_not_rebound() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("slots");
        let mut device = open_device(backend, &adapter);
        let target = device
            .create_texture(&TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET))
            .unwrap();
        let constants = device.create_buffer(&BufferDescriptor::constant(256, true)).unwrap();
        let pipeline = render_pipeline(device.as_ref(), PrimitiveTopology::TriangleList);
        let attachments = [RenderPassColorAttachment::clear(target, Color::BLACK)];
        let context = device.context();
        context
            .begin_render_pass(&RenderPassDescriptor {
                color_attachments: &attachments,
                ..Default::default()
            })
            .unwrap();
        context.set_pipeline(Some(pipeline)).unwrap();
        context.set_constant_buffer(ShaderStage::Vertex, 0, Some(constants)).unwrap();
        context.draw(3, 1, 0, 0).unwrap();
        let before = adapter.stats();

        context.set_constant_buffer(ShaderStage::Vertex, 0, Some(constants)).unwrap();
        context.draw(3, 1, 0, 0).unwrap();
        let repeated = adapter.stats();
        context.set_constant_buffer(ShaderStage::Vertex, 0, None).unwrap();
        context.draw(3, 1, 0, 0).unwrap();
        context.end_render_pass().unwrap();
        let cleared = adapter.stats();

        assert_eq!(repeated.constant_buffer_binds, before.constant_buffer_binds, "{backend:?}");
        assert!(cleared.constant_buffer_binds > repeated.constant_buffer_binds, "{backend:?}");
        assert!(device
            .context()
            .set_constant_buffer(ShaderStage::Fragment, 99, None)
            .is_err());
    }
}

#[test]
fn test_repeated_dispatch_on_a_writable_buffer_inserts_a_hazard_barrier() {
    let adapter = SoftwareAdapter::new("uav");
    let mut device = open_device(GraphicsBackendType::Explicit, &adapter);
    let output = device
        .create_buffer(&BufferDescriptor {
            size: 1024,
            stride: 4,
            usage: BufferUsage::UNORDERED_ACCESS | BufferUsage::SHADER_RESOURCE,
            ..Default::default()
        })
        .unwrap();
    let pipeline = compute_pipeline(device.as_ref());
    let context = device.context();
    context.set_pipeline(Some(pipeline)).unwrap();
    context
        .set_unordered_access(0, Some(UnorderedAccessBinding::Buffer(output)))
        .unwrap();
    context.dispatch(4, 1, 1).unwrap();
    let before = adapter.stats();

    context.dispatch(4, 1, 1).unwrap();

    let after = adapter.stats();
    assert_eq!(after.uav_barriers, before.uav_barriers + 1);
    assert_eq!(after.transition_barriers, before.transition_barriers);
    assert_eq!(after.dispatches, before.dispatches + 1);
}

#[test]
fn test_a_resource_already_in_the_required_state_gets_no_barrier() {
    let adapter = SoftwareAdapter::new("transitions");
    let mut device = open_device(GraphicsBackendType::Explicit, &adapter);
    let target = device
        .create_texture(&TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET))
        .unwrap();
    let texture = device
        .create_texture(&TextureDescriptor::new_2d(
            16,
            16,
            TextureFormat::Rgba8Unorm,
            TextureUsage::SHADER_RESOURCE | TextureUsage::RENDER_TARGET,
        ))
        .unwrap();
    let pipeline = render_pipeline(device.as_ref(), PrimitiveTopology::TriangleList);
    let context = device.context();

    // Render into the texture, then sample it twice from another pass.
    let first = [RenderPassColorAttachment::clear(texture, Color::RED)];
    context
        .begin_render_pass(&RenderPassDescriptor {
            color_attachments: &first,
            ..Default::default()
        })
        .unwrap();
    context.end_render_pass().unwrap();
    let second = [RenderPassColorAttachment::clear(target, Color::BLACK)];
    context
        .begin_render_pass(&RenderPassDescriptor {
            color_attachments: &second,
            ..Default::default()
        })
        .unwrap();
    context.set_pipeline(Some(pipeline)).unwrap();
    context
        .set_shader_resource(ShaderStage::Fragment, 0, Some(ShaderResourceBinding::Texture(texture)))
        .unwrap();
    let before_first = adapter.stats();
    context.draw(3, 1, 0, 0).unwrap();
    let before_second = adapter.stats();
    context.draw(3, 1, 0, 0).unwrap();
    context.end_render_pass().unwrap();
    let after = adapter.stats();

    assert_eq!(before_second.transition_barriers, before_first.transition_barriers + 1);
    assert_eq!(after.transition_barriers, before_second.transition_barriers);
    assert_eq!(after.barrier_calls, before_second.barrier_calls);
}

#[test]
fn test_flush_discards_bindings() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("flush");
        let mut device = open_device(backend, &adapter);
        let target = device
            .create_texture(&TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET))
            .unwrap();
        let pipeline = render_pipeline(device.as_ref(), PrimitiveTopology::TriangleList);
        let attachments = [RenderPassColorAttachment::clear(target, Color::BLACK)];
        let pass = RenderPassDescriptor {
            color_attachments: &attachments,
            ..Default::default()
        };
        let context = device.context();
        context.set_pipeline(Some(pipeline)).unwrap();
        context.set_blend_factor(Color::rgba(0.25, 0.5, 0.75, 1.0));
        context.set_stencil_reference(7);
        context.flush(true).unwrap();
        context.begin_render_pass(&pass).unwrap();

        assert!(context.draw(3, 1, 0, 0).is_err(), "{backend:?}: the pipeline was unbound");
        assert!(context.flush(false).is_err(), "{backend:?}: flush inside a pass");

        context.set_pipeline(Some(pipeline)).unwrap();
        context.draw(3, 1, 0, 0).unwrap();
        context.end_render_pass().unwrap();

        let stats = adapter.stats();
        assert!(stats.submissions > 0);
        assert_eq!(stats.last_blend_factor, Color::WHITE, "{backend:?}: blend factor after flush");
        assert_eq!(stats.last_stencil_reference, 0, "{backend:?}: stencil reference after flush");
    }
}
