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
    BufferDescriptor, BufferUsage, CpuAccess, GraphicsError, TextureDescriptor, TextureFormat, TextureUsage,
};
use tessera_infra::SoftwareAdapter;

fn payload(seed: u8) -> Vec<u8> {
    (0..64u8).map(|i| i.wrapping_mul(3).wrapping_add(seed)).collect()
}

#[test]
fn test_last_constant_buffer_update_wins() {
    for backend in BACKENDS {
        for dynamic in [true, false] {
            // --- 1. ARRANGE ---
            let adapter = SoftwareAdapter::new("constants");
            let mut device = open_device(backend, &adapter);
            let buffer = device
                .create_buffer(&BufferDescriptor::constant(256, dynamic).with_label("Per Frame"))
                .expect("Constant buffer creation should succeed");
            let first = payload(1);
            let second = payload(200);

            // --- 2. ACT ---
            device.begin_frame().unwrap();
            let context = device.context();
            context.update_constant_buffer(buffer, &first).unwrap();
            context.update_constant_buffer(buffer, &second).unwrap();
            device.end_frame().unwrap();
            let contents = device.read_buffer(buffer).expect("Readback should succeed");

            // --- 3. ASSERT ---
            assert_eq!(contents.len(), 256);
            assert_eq!(
                &contents[..64],
                second.as_slice(),
                "{backend:?} (dynamic: {dynamic}): the second update should be visible"
            );
        }
    }
}

#[test]
fn test_update_rejects_oversized_and_non_constant_buffers() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("constants");
        let mut device = open_device(backend, &adapter);
        let constants = device.create_buffer(&BufferDescriptor::constant(256, true)).unwrap();
        let vertices = device
            .create_buffer(&BufferDescriptor {
                size: 256,
                usage: BufferUsage::VERTEX,
                cpu_access: CpuAccess::Write,
                ..Default::default()
            })
            .unwrap();

        let context = device.context();
        assert!(matches!(
            context.update_constant_buffer(constants, &[0; 512]),
            Err(GraphicsError::InvalidState(_))
        ));
        assert!(matches!(
            context.update_constant_buffer(vertices, &[0; 16]),
            Err(GraphicsError::InvalidState(_))
        ));
        context.update_constant_buffer(constants, &[]).unwrap();
    }
}

#[test]
fn test_constant_buffer_size_must_be_aligned() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("constants");
        let device = open_device(backend, &adapter);
        let result = device.create_buffer(&BufferDescriptor::constant(100, false));
        assert!(
            matches!(result, Err(GraphicsError::ResourceCreationFailed { .. })),
            "{backend:?}: got {result:?}"
        );
    }
}

#[test]
fn test_initial_data_is_visible_to_reads() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("initial data");
        let mut device = open_device(backend, &adapter);
        let data: Vec<u8> = (0..=255).collect();
        let buffer = device
            .create_buffer_with_data(
                &BufferDescriptor {
                    size: 256,
                    usage: BufferUsage::VERTEX | BufferUsage::SHADER_RESOURCE,
                    ..Default::default()
                },
                &data,
            )
            .expect("Buffer with data should be created");

        assert_eq!(device.read_buffer(buffer).unwrap(), data, "{backend:?}");
    }
}

#[test]
fn test_copy_buffer_requires_matching_sizes() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("copies");
        let mut device = open_device(backend, &adapter);
        let descriptor = BufferDescriptor {
            size: 64,
            usage: BufferUsage::VERTEX,
            ..Default::default()
        };
        let source = device.create_buffer_with_data(&descriptor, &[7; 64]).unwrap();
        let destination = device.create_buffer(&descriptor).unwrap();
        let larger = device
            .create_buffer(&BufferDescriptor {
                size: 128,
                ..descriptor.clone()
            })
            .unwrap();

        let context = device.context();
        assert!(matches!(
            context.copy_buffer(larger, source),
            Err(GraphicsError::InvalidState(_))
        ));
        context.copy_buffer(destination, source).unwrap();

        assert_eq!(device.read_buffer(destination).unwrap(), vec![7; 64], "{backend:?}");
    }
}

#[test]
fn test_copy_recorded_between_updates_keeps_the_earlier_contents() {
    for backend in BACKENDS {
        for dynamic in [true, false] {
            // --- 1. ARRANGE ---
            let adapter = SoftwareAdapter::new("ordering");
            let mut device = open_device(backend, &adapter);
            let constants = device.create_buffer(&BufferDescriptor::constant(256, dynamic)).unwrap();
            let snapshot = device
                .create_buffer(&BufferDescriptor {
                    size: 256,
                    usage: BufferUsage::SHADER_RESOURCE,
                    ..Default::default()
                })
                .unwrap();

            // --- 2. ACT ---
            let context = device.context();
            context.update_constant_buffer(constants, &[0xaa; 256]).unwrap();
            context.copy_buffer(snapshot, constants).unwrap();
            context.update_constant_buffer(constants, &[0xbb; 256]).unwrap();
            context.flush(true).unwrap();

            // --- 3. ASSERT ---
            assert_eq!(
                device.read_buffer(snapshot).unwrap(),
                vec![0xaa; 256],
                "{backend:?} (dynamic: {dynamic}): the copy should see the first update"
            );
            assert_eq!(device.read_buffer(constants).unwrap(), vec![0xbb; 256], "{backend:?}");
        }
    }
}

#[test]
fn test_copy_onto_the_source_is_rejected() {
    for backend in BACKENDS {
        let adapter = SoftwareAdapter::new("self copies");
        let mut device = open_device(backend, &adapter);
        let buffer = device
            .create_buffer(&BufferDescriptor {
                size: 64,
                usage: BufferUsage::VERTEX,
                ..Default::default()
            })
            .unwrap();
        let texture = device
            .create_texture(&TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm, TextureUsage::SHADER_RESOURCE))
            .unwrap();

        let context = device.context();
        assert!(
            matches!(context.copy_buffer(buffer, buffer), Err(GraphicsError::InvalidState(_))),
            "{backend:?}: copy_buffer onto itself"
        );
        assert!(
            matches!(context.copy_texture(texture, texture), Err(GraphicsError::InvalidState(_))),
            "{backend:?}: copy_texture onto itself"
        );
    }
}
