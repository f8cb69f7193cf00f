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

use common::{init_logging, open_device, BACKENDS, FRAGMENT_SHADER, VERTEX_SHADER};
use tessera_core::renderer::{
    BackendSelectionConfig, Color, DeviceDescriptor, FeatureLevel, GraphicsBackendType,
    GraphicsError, PipelineDescriptor, RenderPassColorAttachment,
    RenderPassDescriptor, RenderPipelineDescriptor, RendererDeviceType, ShaderBytecode,
    SwapChainDescriptor,
};
use tessera_infra::graphics::factory::factory_for;
use tessera_infra::{create_device_with, AdapterSource, SoftwareAdapter};

#[test]
fn test_adapter_below_feature_level_11_is_unsupported() {
    init_logging();
    let legacy = SoftwareAdapter::new("legacy").with_feature_level(FeatureLevel::Level10_1);

    for backend in BACKENDS {
        let factory = factory_for(backend, AdapterSource::Custom(vec![legacy.clone()]))
            .expect("Both backends should be compiled in");
        assert!(!factory.is_supported(), "{backend:?}");
        assert!(matches!(
            factory.enumerate_adapters(),
            Err(GraphicsError::BackendUnsupported { .. })
        ));
    }

    let result = create_device_with(
        AdapterSource::Custom(vec![legacy]),
        &BackendSelectionConfig::default(),
        &DeviceDescriptor::default(),
    );
    match result {
        Err(GraphicsError::BackendUnsupported { reason, .. }) => {
            assert!(reason.contains("Explicit"), "reason: {reason}");
            assert!(reason.contains("Immediate"), "reason: {reason}");
        }
        other => panic!("expected BackendUnsupported, got {:?}", other.map(|r| r.adapter_info)),
    }
}

#[test]
fn test_selection_prefers_the_first_backend_and_discrete_adapters() {
    init_logging();
    let integrated = SoftwareAdapter::new("integrated")
        .with_device_type(RendererDeviceType::IntegratedGpu, 0);
    let discrete = SoftwareAdapter::new("discrete")
        .with_device_type(RendererDeviceType::DiscreteGpu, 8 << 30);
    let source = AdapterSource::Custom(vec![integrated, discrete]);

    let selection = create_device_with(
        source.clone(),
        &BackendSelectionConfig::default(),
        &DeviceDescriptor::default(),
    )
    .expect("Selection should find a device");

    assert_eq!(selection.device.backend_type(), GraphicsBackendType::Explicit);
    assert_eq!(selection.adapter_info.name, "discrete");
    assert_eq!(selection.attempted_backends, vec![GraphicsBackendType::Explicit]);

    let config = BackendSelectionConfig {
        preferred_backends: vec![GraphicsBackendType::Immediate],
        prefer_discrete_gpu: false,
        ..Default::default()
    };
    let selection = create_device_with(source, &config, &DeviceDescriptor::default()).unwrap();
    assert_eq!(selection.device.backend_type(), GraphicsBackendType::Immediate);
    assert_eq!(selection.adapter_info.backend_type, GraphicsBackendType::Immediate);
}

#[test]
fn test_selection_falls_back_when_software_adapters_are_excluded() {
    init_logging();
    let software = SoftwareAdapter::new("cpu");
    let config = BackendSelectionConfig {
        allow_software_adapter: false,
        ..Default::default()
    };

    let result = create_device_with(
        AdapterSource::Custom(vec![software.clone()]),
        &config,
        &DeviceDescriptor::default(),
    );
    assert!(matches!(result, Err(GraphicsError::BackendUnsupported { .. })));

    // An explicit backend request bypasses the preference list.
    let selection = create_device_with(
        AdapterSource::Custom(vec![software]),
        &BackendSelectionConfig::default(),
        &DeviceDescriptor {
            backend: GraphicsBackendType::Immediate,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(selection.attempted_backends, vec![GraphicsBackendType::Immediate]);
}

#[test]
fn test_out_of_range_adapter_index_is_rejected() {
    let factory = factory_for(
        GraphicsBackendType::Immediate,
        AdapterSource::Custom(vec![SoftwareAdapter::new("only")]),
    )
    .unwrap();
    let result = factory.create_device(&DeviceDescriptor {
        backend: GraphicsBackendType::Immediate,
        adapter_index: 3,
        ..Default::default()
    });
    assert!(matches!(result, Err(GraphicsError::BackendUnsupported { .. })));
}

#[test]
fn test_failed_pipeline_creation_releases_partial_objects() {
    // --- 1. ARRANGE ---
    let probe = SoftwareAdapter::new("probe");
    let baseline = {
        let _device = open_device(GraphicsBackendType::Immediate, &probe);
        probe.stats().live_objects
    };
    // Room for exactly one more object: the vertex shader fits, the rest does not.
    let limited = SoftwareAdapter::new("limited").with_object_limit(baseline as usize + 1);
    let device = open_device(GraphicsBackendType::Immediate, &limited);
    assert_eq!(limited.stats().live_objects, baseline);

    // --- 2. ACT ---
    let result = device.create_pipeline(&PipelineDescriptor::Render(RenderPipelineDescriptor {
        vertex_shader: ShaderBytecode::new(VERTEX_SHADER),
        fragment_shader: Some(ShaderBytecode::new(FRAGMENT_SHADER)),
        ..Default::default()
    }));

    // --- 3. ASSERT ---
    assert!(
        matches!(result, Err(GraphicsError::ResourceCreationFailed { .. })),
        "creation past the object limit should fail, got {result:?}"
    );
    let stats = limited.stats();
    assert_eq!(stats.live_objects, baseline, "partial objects should be rolled back");
    assert!(stats.objects_released >= 1);
    assert_eq!(device.stats().live_pipelines, 0);
}

#[test]
fn test_object_limit_surfaces_as_creation_failure() {
    for backend in BACKENDS {
        let probe = SoftwareAdapter::new("probe");
        let baseline = {
            let _device = open_device(backend, &probe);
            probe.stats().live_objects
        };
        let limited = SoftwareAdapter::new("limited").with_object_limit(baseline as usize);
        let device = open_device(backend, &limited);

        let result = device.create_buffer(&Default::default());

        assert!(
            matches!(result, Err(GraphicsError::ResourceCreationFailed { .. })),
            "{backend:?}: got {result:?}"
        );
        assert_eq!(device.stats().live_buffers, 0);
        assert_eq!(limited.stats().live_objects, baseline);
    }
}

#[test]
fn test_removed_device_is_lost_at_present() {
    for backend in BACKENDS {
        // --- 1. ARRANGE ---
        let adapter = SoftwareAdapter::new("removable");
        let mut device = open_device(backend, &adapter);
        let swapchain = device
            .create_swapchain(&SwapChainDescriptor {
                width: 16,
                height: 16,
                ..Default::default()
            })
            .unwrap();
        let back_buffer = device.swapchain_back_buffer(swapchain).unwrap();
        let attachments = [RenderPassColorAttachment::clear(back_buffer, Color::WHITE)];
        let context = device.context();
        context
            .begin_render_pass(&RenderPassDescriptor {
                color_attachments: &attachments,
                ..Default::default()
            })
            .unwrap();
        context.end_render_pass().unwrap();

        // --- 2. ACT ---
        adapter.simulate_device_removed();
        let result = device.end_frame();

        // --- 3. ASSERT ---
        match result {
            Err(error @ GraphicsError::DeviceLost(_)) => assert!(error.is_fatal()),
            other => panic!("{backend:?}: expected DeviceLost, got {other:?}"),
        }
        assert!(device.create_buffer(&Default::default()).is_err());
    }
}
