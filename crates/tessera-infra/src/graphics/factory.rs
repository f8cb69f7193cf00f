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


//! Backend probing and device creation.
//!
//! Each backend has a [`GraphicsFactory`] that enumerates the adapters of an
//! [`AdapterSource`], keeps those reaching [`MIN_FEATURE_LEVEL`], and opens
//! devices on them. [`create_device`] walks a [`BackendSelectionConfig`] and
//! returns the first device that opens.

use crate::graphics::software::SoftwareAdapter;
use anyhow::{anyhow, Context, Result};
use std::sync::OnceLock;
use std::time::Instant;
use tessera_core::renderer::{
    BackendSelectionConfig, BackendSelectionResult, DeviceDescriptor, FeatureLevel,
    GraphicsAdapterInfo, GraphicsBackendType, GraphicsDevice, GraphicsError, GraphicsFactory,
    RendererDeviceType,
};

/// The lowest feature level either backend accepts.
pub const MIN_FEATURE_LEVEL: FeatureLevel = FeatureLevel::Level11_0;

/// Name of the adapter the system source always provides.
pub const SYSTEM_ADAPTER_NAME: &str = "Tessera Software Adapter";

/// Where a factory finds its adapters.
#[derive(Debug, Clone, Default)]
pub enum AdapterSource {
    /// The adapters of this machine. Probed once per process and backend.
    #[default]
    System,
    /// A fixed adapter list, probed once per factory.
    Custom(Vec<SoftwareAdapter>),
}

type ProbeResult = std::result::Result<Vec<SoftwareAdapter>, String>;

fn system_adapters() -> &'static [SoftwareAdapter] {
    static ADAPTERS: OnceLock<Vec<SoftwareAdapter>> = OnceLock::new();
    ADAPTERS.get_or_init(|| vec![SoftwareAdapter::new(SYSTEM_ADAPTER_NAME)])
}

/// Keeps the adapters that reach [`MIN_FEATURE_LEVEL`].
fn probe_adapters(adapters: &[SoftwareAdapter], backend: GraphicsBackendType) -> Result<Vec<SoftwareAdapter>> {
    if adapters.is_empty() {
        return Err(anyhow!("no adapter was enumerated"));
    }
    let capable: Vec<SoftwareAdapter> = adapters
        .iter()
        .filter(|adapter| {
            let capable = adapter.feature_level() >= MIN_FEATURE_LEVEL;
            if !capable {
                log::debug!(
                    "{backend:?} probe: skipping '{}' at {:?}",
                    adapter.name(),
                    adapter.feature_level()
                );
            }
            capable
        })
        .cloned()
        .collect();
    if capable.is_empty() {
        return Err(anyhow!(
            "none of {} adapter(s) reaches feature level {:?}",
            adapters.len(),
            MIN_FEATURE_LEVEL
        ));
    }
    Ok(capable)
}

/// The probe shared by both factories.
#[derive(Debug)]
struct AdapterProbe {
    backend: GraphicsBackendType,
    source: AdapterSource,
    cache: OnceLock<ProbeResult>,
}

impl AdapterProbe {
    fn new(backend: GraphicsBackendType, source: AdapterSource) -> Self {
        Self {
            backend,
            source,
            cache: OnceLock::new(),
        }
    }

    fn run(&self) -> ProbeResult {
        let adapters = match &self.source {
            AdapterSource::System => system_adapters(),
            AdapterSource::Custom(adapters) => adapters.as_slice(),
        };
        let result = probe_adapters(adapters, self.backend)
            .with_context(|| format!("{} backend probe failed", self.backend.name()));
        match &result {
            Ok(capable) => log::info!(
                "{} backend supported: {} capable adapter(s)",
                self.backend.name(),
                capable.len()
            ),
            Err(err) => log::warn!("{err:#}"),
        }
        result.map_err(|err| format!("{err:#}"))
    }

    fn result(&self) -> &ProbeResult {
        static SYSTEM_IMMEDIATE: OnceLock<ProbeResult> = OnceLock::new();
        static SYSTEM_EXPLICIT: OnceLock<ProbeResult> = OnceLock::new();
        let cache = match (&self.source, self.backend) {
            (AdapterSource::System, GraphicsBackendType::Immediate) => &SYSTEM_IMMEDIATE,
            (AdapterSource::System, GraphicsBackendType::Explicit) => &SYSTEM_EXPLICIT,
            _ => &self.cache,
        };
        cache.get_or_init(|| self.run())
    }

    fn adapters(&self) -> std::result::Result<&[SoftwareAdapter], GraphicsError> {
        self.result()
            .as_deref()
            .map_err(|reason| GraphicsError::BackendUnsupported {
                backend: self.backend,
                reason: reason.clone(),
            })
    }

    fn adapter(&self, index: usize) -> std::result::Result<&SoftwareAdapter, GraphicsError> {
        let adapters = self.adapters()?;
        adapters.get(index).ok_or_else(|| GraphicsError::BackendUnsupported {
            backend: self.backend,
            reason: format!("adapter index {index} is out of range ({} adapters)", adapters.len()),
        })
    }

    fn enumerate(&self) -> std::result::Result<Vec<GraphicsAdapterInfo>, GraphicsError> {
        Ok(self
            .adapters()?
            .iter()
            .map(|adapter| adapter.info(self.backend))
            .collect())
    }
}

/// Opens [`ImmediateDevice`](crate::graphics::immediate::ImmediateDevice)s.
#[cfg(feature = "immediate")]
#[derive(Debug)]
pub struct ImmediateFactory {
    probe: AdapterProbe,
}

#[cfg(feature = "immediate")]
impl ImmediateFactory {
    /// A factory over the system adapters.
    pub fn new() -> Self {
        Self::with_source(AdapterSource::System)
    }

    /// A factory over `source`.
    pub fn with_source(source: AdapterSource) -> Self {
        Self {
            probe: AdapterProbe::new(GraphicsBackendType::Immediate, source),
        }
    }
}

#[cfg(feature = "immediate")]
impl Default for ImmediateFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "immediate")]
impl GraphicsFactory for ImmediateFactory {
    fn backend_type(&self) -> GraphicsBackendType {
        GraphicsBackendType::Immediate
    }

    fn is_supported(&self) -> bool {
        self.probe.result().is_ok()
    }

    fn enumerate_adapters(&self) -> std::result::Result<Vec<GraphicsAdapterInfo>, GraphicsError> {
        self.probe.enumerate()
    }

    fn create_device(
        &self,
        descriptor: &DeviceDescriptor,
    ) -> std::result::Result<Box<dyn GraphicsDevice>, GraphicsError> {
        let adapter = self.probe.adapter(descriptor.adapter_index)?;
        let driver = adapter.open_immediate(descriptor.enable_validation);
        let device = crate::graphics::immediate::ImmediateDevice::new(
            driver,
            adapter.info(GraphicsBackendType::Immediate),
            descriptor,
        )?;
        Ok(Box::new(device))
    }
}

/// Opens [`ExplicitDevice`](crate::graphics::explicit::ExplicitDevice)s.
#[cfg(feature = "explicit")]
#[derive(Debug)]
pub struct ExplicitFactory {
    probe: AdapterProbe,
}

#[cfg(feature = "explicit")]
impl ExplicitFactory {
    /// A factory over the system adapters.
    pub fn new() -> Self {
        Self::with_source(AdapterSource::System)
    }

    /// A factory over `source`.
    pub fn with_source(source: AdapterSource) -> Self {
        Self {
            probe: AdapterProbe::new(GraphicsBackendType::Explicit, source),
        }
    }
}

#[cfg(feature = "explicit")]
impl Default for ExplicitFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "explicit")]
impl GraphicsFactory for ExplicitFactory {
    fn backend_type(&self) -> GraphicsBackendType {
        GraphicsBackendType::Explicit
    }

    fn is_supported(&self) -> bool {
        self.probe.result().is_ok()
    }

    fn enumerate_adapters(&self) -> std::result::Result<Vec<GraphicsAdapterInfo>, GraphicsError> {
        self.probe.enumerate()
    }

    fn create_device(
        &self,
        descriptor: &DeviceDescriptor,
    ) -> std::result::Result<Box<dyn GraphicsDevice>, GraphicsError> {
        let adapter = self.probe.adapter(descriptor.adapter_index)?;
        let driver = adapter.open_explicit(descriptor.enable_validation);
        let device = crate::graphics::explicit::ExplicitDevice::new(
            driver,
            adapter.info(GraphicsBackendType::Explicit),
            descriptor,
        )?;
        Ok(Box::new(device))
    }
}

/// Returns the factory of `backend`, or `None` if it was compiled out.
pub fn factory_for(backend: GraphicsBackendType, source: AdapterSource) -> Option<Box<dyn GraphicsFactory>> {
    match backend {
        #[cfg(feature = "immediate")]
        GraphicsBackendType::Immediate => Some(Box::new(ImmediateFactory::with_source(source))),
        #[cfg(feature = "explicit")]
        GraphicsBackendType::Explicit => Some(Box::new(ExplicitFactory::with_source(source))),
        _ => None,
    }
}

/// Orders the adapter indices a selection should try.
fn adapter_order(adapters: &[GraphicsAdapterInfo], config: &BackendSelectionConfig) -> Vec<usize> {
    let mut order: Vec<usize> = (0..adapters.len())
        .filter(|&index| config.allow_software_adapter || adapters[index].device_type != RendererDeviceType::Cpu)
        .collect();
    if config.prefer_discrete_gpu {
        // Stable, so enumeration order breaks ties.
        order.sort_by_key(|&index| adapters[index].device_type != RendererDeviceType::DiscreteGpu);
    }
    order
}

/// Opens a device on the system adapters. See [`create_device_with`].
pub fn create_device(
    config: &BackendSelectionConfig,
    descriptor: &DeviceDescriptor,
) -> std::result::Result<BackendSelectionResult<Box<dyn GraphicsDevice>>, GraphicsError> {
    create_device_with(AdapterSource::System, config, descriptor)
}

/// Opens a device on the first backend and adapter that accepts it.
///
/// A descriptor naming a backend restricts the search to that backend and to
/// `descriptor.adapter_index`. Otherwise the backends of
/// `config.preferred_backends` are tried in order, each over its adapters
/// sorted by the config.
///
/// # Errors
///
/// `BackendUnsupported` once every candidate failed. A device that fails to
/// open has released everything it acquired before the next one is tried.
pub fn create_device_with(
    source: AdapterSource,
    config: &BackendSelectionConfig,
    descriptor: &DeviceDescriptor,
) -> std::result::Result<BackendSelectionResult<Box<dyn GraphicsDevice>>, GraphicsError> {
    let start_time = Instant::now();
    let mut attempted_backends = Vec::new();
    let mut failures = Vec::new();

    let candidates = match descriptor.backend {
        GraphicsBackendType::Unknown => config.preferred_backends.clone(),
        backend => vec![backend],
    };
    log::info!("Starting backend selection over {candidates:?}...");

    for backend_type in candidates {
        attempted_backends.push(backend_type);
        let Some(factory) = factory_for(backend_type, source.clone()) else {
            log::warn!("{} backend is not compiled in.", backend_type.name());
            failures.push(format!("{}: not compiled in", backend_type.name()));
            continue;
        };
        let adapters = match factory.enumerate_adapters() {
            Ok(adapters) => adapters,
            Err(err) => {
                log::warn!("Failed to initialize {} backend: {err}", backend_type.name());
                failures.push(err.to_string());
                continue;
            }
        };
        let order = if descriptor.backend == GraphicsBackendType::Unknown {
            adapter_order(&adapters, config)
        } else {
            vec![descriptor.adapter_index]
        };
        if order.is_empty() {
            log::warn!("{} backend has no adapter allowed by the selection config.", backend_type.name());
            failures.push(format!("{}: no allowed adapter", backend_type.name()));
            continue;
        }

        for adapter_index in order {
            let attempt = DeviceDescriptor {
                backend: backend_type,
                adapter_index,
                ..descriptor.clone()
            };
            match factory.create_device(&attempt) {
                Ok(device) => {
                    let adapter_info = device.adapter_info().clone();
                    let selection_time_ms = start_time.elapsed().as_millis() as u64;
                    log::info!(
                        "Successfully selected {} backend with adapter: \"{}\" (Device: {:?})",
                        backend_type.name(),
                        adapter_info.name,
                        adapter_info.device_type,
                    );
                    return Ok(BackendSelectionResult {
                        device,
                        adapter_info,
                        selection_time_ms,
                        attempted_backends,
                    });
                }
                Err(err) => {
                    log::warn!(
                        "Failed to open {} device on adapter {adapter_index}: {err}",
                        backend_type.name()
                    );
                    failures.push(err.to_string());
                }
            }
        }
    }

    Err(GraphicsError::BackendUnsupported {
        backend: descriptor.backend,
        reason: format!(
            "all backend attempts failed. Attempted: {attempted_backends:?} ({})",
            failures.join("; ")
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(device_type: RendererDeviceType) -> GraphicsAdapterInfo {
        GraphicsAdapterInfo {
            name: format!("{device_type:?}"),
            backend_type: GraphicsBackendType::Explicit,
            device_type,
            feature_level: FeatureLevel::Level12_0,
            dedicated_video_memory: 0,
        }
    }

    #[test]
    fn probe_rejects_adapters_below_the_minimum_level() {
        let old = SoftwareAdapter::new("old").with_feature_level(FeatureLevel::Level10_1);
        let current = SoftwareAdapter::new("current");

        let err = probe_adapters(std::slice::from_ref(&old), GraphicsBackendType::Immediate).unwrap_err();
        assert!(err.to_string().contains("feature level"));

        let capable = probe_adapters(&[old, current], GraphicsBackendType::Immediate).unwrap();
        assert_eq!(capable.len(), 1);
        assert_eq!(capable[0].name(), "current");
    }

    #[test]
    fn adapter_order_prefers_discrete_and_can_exclude_software() {
        let adapters = [
            info(RendererDeviceType::Cpu),
            info(RendererDeviceType::IntegratedGpu),
            info(RendererDeviceType::DiscreteGpu),
        ];
        let config = BackendSelectionConfig::default();
        assert_eq!(adapter_order(&adapters, &config), vec![2, 0, 1]);

        let hardware_only = BackendSelectionConfig {
            allow_software_adapter: false,
            prefer_discrete_gpu: false,
            ..config
        };
        assert_eq!(adapter_order(&adapters, &hardware_only), vec![1, 2]);
    }

    #[test]
    fn system_probe_is_shared_across_factories() {
        let first = AdapterProbe::new(GraphicsBackendType::Explicit, AdapterSource::System);
        let second = AdapterProbe::new(GraphicsBackendType::Explicit, AdapterSource::System);
        assert!(std::ptr::eq(first.result(), second.result()));

        let custom = AdapterProbe::new(GraphicsBackendType::Explicit, AdapterSource::Custom(Vec::new()));
        assert!(custom.result().is_err());
    }
}
