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

use common::{open_device, BACKENDS};
use tessera_core::renderer::{
    BufferDescriptor, BufferUsage, Color, GraphicsError, RenderPassColorAttachment,
    RenderPassDescriptor, SwapChainDescriptor, TextureDescriptor, TextureFormat, TextureUsage,
    MAX_FRAMES_IN_FLIGHT,
};
use tessera_infra::SoftwareAdapter;

#[test]
fn test_destroyed_buffer_outlives_the_in_flight_window() {
    for backend in BACKENDS {
        // --- 1. ARRANGE ---
        let adapter = SoftwareAdapter::new("deferred");
        let mut device = open_device(backend, &adapter);
        let buffer = device
            .create_buffer(&BufferDescriptor {
                size: 1024,
                usage: BufferUsage::VERTEX,
                ..Default::default()
            })
            .unwrap();
        let live_before = adapter.stats().live_objects;

        // --- 2. ACT ---
        device.destroy_buffer(buffer).expect("Destroying a live buffer should succeed");

        // --- 3. ASSERT ---
        assert!(device.stats().pending_releases > 0, "{backend:?}");
        assert!(matches!(device.destroy_buffer(buffer), Err(GraphicsError::InvalidState(_))));
        for frame in 0..MAX_FRAMES_IN_FLIGHT {
            device.end_frame().unwrap();
            assert!(
                device.stats().pending_releases > 0,
                "{backend:?}: released after only {} frames",
                frame + 1
            );
            assert_eq!(adapter.stats().live_objects, live_before);
        }
        device.end_frame().unwrap();
        assert_eq!(device.stats().pending_releases, 0, "{backend:?}");
        assert_eq!(adapter.stats().live_objects, live_before - 1);
    }
}

#[test]
fn test_views_are_cached_per_subresource() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("views");
        let device = open_device(backend, &adapter);
        let texture = device
            .create_texture(&TextureDescriptor {
                mip_level_count: 3,
                ..TextureDescriptor::new_2d(
                    32,
                    32,
                    TextureFormat::Rgba8Unorm,
                    TextureUsage::SHADER_RESOURCE | TextureUsage::RENDER_TARGET,
                )
            })
            .unwrap();
        let before = adapter.stats().views_created;

        let whole = device.shader_resource_view(texture, None).unwrap();
        let again = device.shader_resource_view(texture, None).unwrap();
        let mip = device.shader_resource_view(texture, Some(1)).unwrap();
        let target = device.render_target_view(texture, 2, 0).unwrap();

        assert_eq!(whole, again, "{backend:?}: the second lookup hits the cache");
        assert_ne!(whole, mip);
        assert_ne!(mip, target);
        assert_eq!(adapter.stats().views_created - before, 3);
        assert!(matches!(
            device.render_target_view(texture, 3, 0),
            Err(GraphicsError::InvalidState(_))
        ));
        assert!(device.depth_stencil_view(texture, 0, 0).is_err());
    }
}

#[test]
fn test_swapchain_presents_and_resizes() {
    for backend in BACKENDS {
        // --- 1. ARRANGE ---
        let adapter = SoftwareAdapter::new("swapchain");
        let mut device = open_device(backend, &adapter);
        let swapchain = device
            .create_swapchain(&SwapChainDescriptor {
                label: Some("Main".into()),
                width: 32,
                height: 32,
                ..Default::default()
            })
            .expect("Offscreen swapchain creation should succeed");

        // --- 2. ACT ---
        for _ in 0..3 {
            device.begin_frame().unwrap();
            let back_buffer = device.swapchain_back_buffer(swapchain).unwrap();
            let attachments = [RenderPassColorAttachment::clear(back_buffer, Color::WHITE)];
            let context = device.context();
            context
                .begin_render_pass(&RenderPassDescriptor {
                    label: Some("Present"),
                    color_attachments: &attachments,
                    depth_stencil_attachment: None,
                })
                .unwrap();
            context.end_render_pass().unwrap();
            device.end_frame().unwrap();
        }
        let old = device.swapchain_back_buffer(swapchain).unwrap();
        device.resize_swapchain(swapchain, 64, 32).expect("Resize should succeed");
        let new = device.swapchain_back_buffer(swapchain).unwrap();

        // --- 3. ASSERT ---
        assert_eq!(adapter.stats().presents, 3, "{backend:?}");
        assert_ne!(old, new, "{backend:?}: back buffers get new ids after a resize");
        assert!(device.read_texture(old, 0, 0).is_err());
        let pixels = device.read_texture(new, 0, 0).unwrap();
        assert_eq!(pixels.len(), 64 * 32 * 4);
        assert!(matches!(device.destroy_texture(new), Err(GraphicsError::InvalidState(_))));

        device.destroy_swapchain(swapchain).unwrap();
        assert_eq!(device.stats().live_swapchains, 0);
        assert_eq!(device.stats().live_textures, 0);
    }
}

#[test]
fn test_resize_inside_a_pass_is_rejected() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("swapchain");
        let mut device = open_device(backend, &adapter);
        let swapchain = device
            .create_swapchain(&SwapChainDescriptor {
                width: 16,
                height: 16,
                ..Default::default()
            })
            .unwrap();
        let back_buffer = device.swapchain_back_buffer(swapchain).unwrap();
        let attachments = [RenderPassColorAttachment::load(back_buffer)];
        device
            .context()
            .begin_render_pass(&RenderPassDescriptor {
                color_attachments: &attachments,
                ..Default::default()
            })
            .unwrap();

        assert!(matches!(
            device.resize_swapchain(swapchain, 8, 8),
            Err(GraphicsError::InvalidState(_))
        ));
        device.context().end_render_pass().unwrap();
        device.resize_swapchain(swapchain, 8, 8).unwrap();
        assert_ne!(device.swapchain_back_buffer(swapchain).unwrap(), back_buffer);
    }
}

#[test]
fn test_zero_sized_resources_are_rejected() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("validation");
        let device = open_device(backend, &adapter);
        let texture = device.create_texture(&TextureDescriptor::new_2d(
            0,
            16,
            TextureFormat::Rgba8Unorm,
            TextureUsage::SHADER_RESOURCE,
        ));
        let swapchain = device.create_swapchain(&SwapChainDescriptor {
            width: 0,
            ..Default::default()
        });

        assert!(matches!(texture, Err(GraphicsError::ResourceCreationFailed { .. })));
        assert!(matches!(swapchain, Err(GraphicsError::ResourceCreationFailed { .. })));
        assert_eq!(device.stats().live_textures, 0, "{backend:?}");
    }
}
