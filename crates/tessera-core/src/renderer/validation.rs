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


//! Descriptor and command validation shared by every backend.
//!
//! Devices run these checks before touching the driver, so a rejected
//! descriptor never leaves a partially created object behind. Contexts run
//! the command checks before recording anything.

use crate::renderer::api::*;
use crate::renderer::error::GraphicsError;

/// Names a resource for error messages, e.g. `texture 'GBuffer'`.
pub fn describe(kind: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{kind} '{label}'"),
        None => kind.to_string(),
    }
}

fn reject(kind: &str, label: Option<&str>, details: impl std::fmt::Display) -> GraphicsError {
    GraphicsError::creation_failed(describe(kind, label), details)
}

/// Checks a buffer descriptor.
pub fn validate_buffer(desc: &BufferDescriptor) -> Result<(), GraphicsError> {
    let label = desc.label.as_deref();
    if desc.size < MIN_BUFFER_SIZE {
        return Err(reject(
            "buffer",
            label,
            format!("size {} is below the minimum of {MIN_BUFFER_SIZE} bytes", desc.size),
        ));
    }
    if desc.usage.is_empty() {
        return Err(reject("buffer", label, "usage flags are empty"));
    }
    if desc.usage.contains(BufferUsage::CONSTANT) && desc.size % CONSTANT_BUFFER_ALIGNMENT != 0 {
        return Err(reject(
            "buffer",
            label,
            format!(
                "constant buffer size {} is not a multiple of {CONSTANT_BUFFER_ALIGNMENT}",
                desc.size
            ),
        ));
    }
    if desc.cpu_access == CpuAccess::Write && desc.usage.contains(BufferUsage::UNORDERED_ACCESS) {
        return Err(reject(
            "buffer",
            label,
            "CPU-writable buffers cannot have unordered access",
        ));
    }
    if desc.stride != 0 && desc.size % desc.stride as u64 != 0 {
        return Err(reject(
            "buffer",
            label,
            format!("size {} is not a multiple of stride {}", desc.size, desc.stride),
        ));
    }
    Ok(())
}

/// Checks a texture descriptor against the adapter's largest sample count.
pub fn validate_texture(
    desc: &TextureDescriptor,
    max_sample_count: SampleCount,
) -> Result<(), GraphicsError> {
    let label = desc.label.as_deref();
    if desc.width == 0 || desc.height == 0 || desc.depth_or_array_layers == 0 {
        return Err(reject(
            "texture",
            label,
            format!(
                "extent {}x{}x{} has a zero dimension",
                desc.width, desc.height, desc.depth_or_array_layers
            ),
        ));
    }
    if desc.dimension == TextureDimension::D1 && desc.height != 1 {
        return Err(reject("texture", label, "1D textures must have a height of 1"));
    }
    if desc.format == TextureFormat::Unknown {
        return Err(reject("texture", label, "format is Unknown"));
    }
    if desc.mip_level_count == 0 || desc.mip_level_count > desc.full_mip_chain_len() {
        return Err(reject(
            "texture",
            label,
            format!(
                "mip count {} is outside 1..={}",
                desc.mip_level_count,
                desc.full_mip_chain_len()
            ),
        ));
    }
    if desc.sample_count.count() > max_sample_count.count() {
        return Err(reject(
            "texture",
            label,
            format!(
                "sample count {} exceeds the adapter maximum of {}",
                desc.sample_count.count(),
                max_sample_count.count()
            ),
        ));
    }
    if desc.sample_count.is_multisampled() {
        if desc.dimension != TextureDimension::D2 || desc.mip_level_count != 1 {
            return Err(reject(
                "texture",
                label,
                "multisampled textures must be 2D with a single mip",
            ));
        }
        if desc.usage.contains(TextureUsage::UNORDERED_ACCESS) {
            return Err(reject(
                "texture",
                label,
                "multisampled textures cannot have unordered access",
            ));
        }
    }
    let is_depth = desc.format.is_depth();
    if desc.usage.contains(TextureUsage::DEPTH_STENCIL) && !is_depth {
        return Err(reject(
            "texture",
            label,
            format!("{:?} cannot be a depth-stencil target", desc.format),
        ));
    }
    if is_depth
        && desc
            .usage
            .intersects(TextureUsage::RENDER_TARGET | TextureUsage::UNORDERED_ACCESS)
    {
        return Err(reject(
            "texture",
            label,
            format!("{:?} can only be used for depth-stencil and sampling", desc.format),
        ));
    }
    if desc.usage.contains(TextureUsage::DEPTH_STENCIL) && desc.dimension == TextureDimension::D3 {
        return Err(reject("texture", label, "3D textures cannot be depth-stencil targets"));
    }
    if desc.cpu_access != CpuAccess::None
        && desc.usage.intersects(
            TextureUsage::RENDER_TARGET | TextureUsage::DEPTH_STENCIL | TextureUsage::UNORDERED_ACCESS,
        )
    {
        return Err(reject(
            "texture",
            label,
            "CPU-accessible textures cannot be written by the GPU",
        ));
    }
    Ok(())
}

/// Checks that `data` covers exactly the first subresource of `desc`, or every
/// mip and slice when `full_chain` is set.
pub fn validate_texture_data(
    desc: &TextureDescriptor,
    data: &[u8],
    full_chain: bool,
) -> Result<(), GraphicsError> {
    let mips = if full_chain { desc.mip_level_count } else { 1 };
    let slices = if full_chain { desc.array_layers() } else { 1 };
    let expected: usize =
        (0..mips).map(|mip| desc.subresource_size(mip)).sum::<usize>() * slices as usize;
    if data.len() != expected {
        return Err(reject(
            "texture",
            desc.label.as_deref(),
            format!("initial data is {} bytes, expected {expected}", data.len()),
        ));
    }
    Ok(())
}

/// Checks a sampler descriptor.
pub fn validate_sampler(desc: &SamplerDescriptor) -> Result<(), GraphicsError> {
    let label = desc.label.as_deref();
    if !(1..=16).contains(&desc.max_anisotropy) {
        return Err(reject(
            "sampler",
            label,
            format!("max anisotropy {} is outside 1..=16", desc.max_anisotropy),
        ));
    }
    if desc.lod_min_clamp > desc.lod_max_clamp {
        return Err(reject(
            "sampler",
            label,
            format!(
                "lod range {}..{} is inverted",
                desc.lod_min_clamp, desc.lod_max_clamp
            ),
        ));
    }
    Ok(())
}

/// Checks a pipeline descriptor.
pub fn validate_pipeline(desc: &PipelineDescriptor) -> Result<(), GraphicsError> {
    match desc {
        PipelineDescriptor::Render(render) => {
            let label = render.label.as_deref();
            if render.vertex_shader.is_empty() {
                return Err(reject("render pipeline", label, "vertex shader bytecode is empty"));
            }
            if render
                .fragment_shader
                .as_ref()
                .is_some_and(|shader| shader.is_empty())
            {
                return Err(reject("render pipeline", label, "fragment shader bytecode is empty"));
            }
            if render.color_formats.len() > crate::renderer::context::MAX_COLOR_ATTACHMENTS {
                return Err(reject(
                    "render pipeline",
                    label,
                    format!("{} color targets exceed the limit", render.color_formats.len()),
                ));
            }
            if let Some(format) = render
                .color_formats
                .iter()
                .find(|f| **f == TextureFormat::Unknown || f.is_depth())
            {
                return Err(reject(
                    "render pipeline",
                    label,
                    format!("{format:?} is not a color format"),
                ));
            }
            if let Some(format) = render.depth_format.filter(|f| !f.is_depth()) {
                return Err(reject(
                    "render pipeline",
                    label,
                    format!("{format:?} is not a depth format"),
                ));
            }
            if let Some(attribute) = render
                .vertex_attributes
                .iter()
                .find(|a| a.buffer_slot as usize >= crate::renderer::context::MAX_VERTEX_BUFFERS)
            {
                return Err(reject(
                    "render pipeline",
                    label,
                    format!(
                        "attribute {} reads vertex buffer slot {}",
                        attribute.semantic, attribute.buffer_slot
                    ),
                ));
            }
            Ok(())
        }
        PipelineDescriptor::Compute(compute) => {
            if compute.compute_shader.is_empty() {
                return Err(reject(
                    "compute pipeline",
                    compute.label.as_deref(),
                    "compute shader bytecode is empty",
                ));
            }
            Ok(())
        }
    }
}

/// Checks a swapchain descriptor.
pub fn validate_swapchain(desc: &SwapChainDescriptor) -> Result<(), GraphicsError> {
    let label = desc.label.as_deref();
    if desc.width == 0 || desc.height == 0 {
        return Err(reject(
            "swapchain",
            label,
            format!("extent {}x{} has a zero dimension", desc.width, desc.height),
        ));
    }
    if desc.format == TextureFormat::Unknown || desc.format.is_depth() {
        return Err(reject(
            "swapchain",
            label,
            format!("{:?} is not a presentable format", desc.format),
        ));
    }
    if !(2..=16).contains(&desc.buffer_count) {
        return Err(reject(
            "swapchain",
            label,
            format!("buffer count {} is outside 2..=16", desc.buffer_count),
        ));
    }
    Ok(())
}

/// Checks that a vertex or index binding starts inside its buffer.
pub fn validate_bind_offset(buffer: BufferId, offset: u64, size: u64) -> Result<(), GraphicsError> {
    if offset >= size {
        return Err(GraphicsError::InvalidState(format!(
            "offset {offset} is past the end of the {size}-byte buffer {buffer:?}"
        )));
    }
    Ok(())
}

/// Rejects a copy whose source and destination are the same resource.
pub fn validate_copy_pair<T: PartialEq + std::fmt::Debug>(
    operation: &str,
    destination: T,
    source: T,
) -> Result<(), GraphicsError> {
    if destination == source {
        return Err(GraphicsError::InvalidState(format!("{operation} from {source:?} onto itself")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_must_start_inside_the_buffer() {
        assert!(validate_bind_offset(BufferId(1), 0, 256).is_ok());
        assert!(validate_bind_offset(BufferId(1), 252, 256).is_ok());
        assert!(matches!(
            validate_bind_offset(BufferId(1), 256, 256),
            Err(GraphicsError::InvalidState(_))
        ));
    }

    #[test]
    fn copies_onto_the_source_are_rejected() {
        assert!(validate_copy_pair("copy_buffer", BufferId(1), BufferId(2)).is_ok());
        assert!(matches!(
            validate_copy_pair("copy_texture", TextureId(3), TextureId(3)),
            Err(GraphicsError::InvalidState(_))
        ));
    }

    #[test]
    fn tiny_buffers_are_rejected() {
        let desc = BufferDescriptor {
            size: 3,
            ..Default::default()
        };
        assert!(matches!(
            validate_buffer(&desc),
            Err(GraphicsError::ResourceCreationFailed { .. })
        ));
    }

    #[test]
    fn constant_buffers_must_be_16_byte_multiples() {
        assert!(validate_buffer(&BufferDescriptor::constant(20, true)).is_err());
        assert!(validate_buffer(&BufferDescriptor::constant(256, true)).is_ok());
        let vertex = BufferDescriptor {
            size: 20,
            ..Default::default()
        };
        assert!(validate_buffer(&vertex).is_ok());
    }

    #[test]
    fn error_names_the_labelled_resource() {
        let desc = TextureDescriptor {
            format: TextureFormat::Unknown,
            ..Default::default()
        }
        .with_label("GBuffer");
        match validate_texture(&desc, SampleCount::X8) {
            Err(GraphicsError::ResourceCreationFailed { what, .. }) => {
                assert_eq!(what, "texture 'GBuffer'")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn texture_extent_and_mips_are_checked() {
        let mut desc = TextureDescriptor::new_2d(0, 4, TextureFormat::Rgba8Unorm, TextureUsage::SHADER_RESOURCE);
        assert!(validate_texture(&desc, SampleCount::X8).is_err());
        desc.width = 4;
        desc.mip_level_count = 3;
        assert!(validate_texture(&desc, SampleCount::X8).is_ok());
        desc.mip_level_count = 4;
        assert!(validate_texture(&desc, SampleCount::X8).is_err());
    }

    #[test]
    fn sample_count_must_be_supported() {
        let mut desc = TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET);
        desc.sample_count = SampleCount::X8;
        assert!(validate_texture(&desc, SampleCount::X4).is_err());
        desc.sample_count = SampleCount::X4;
        assert!(validate_texture(&desc, SampleCount::X4).is_ok());
    }

    #[test]
    fn pipelines_need_bytecode_for_their_kind() {
        let render = PipelineDescriptor::Render(RenderPipelineDescriptor::default());
        assert!(validate_pipeline(&render).is_err());

        let code = [0u8; 4];
        let compute = PipelineDescriptor::Compute(ComputePipelineDescriptor {
            label: None,
            compute_shader: ShaderBytecode::new(&code),
        });
        assert!(validate_pipeline(&compute).is_ok());
    }

    #[test]
    fn initial_data_must_match_the_subresource() {
        let desc = TextureDescriptor::new_2d(2, 2, TextureFormat::Rgba8Unorm, TextureUsage::SHADER_RESOURCE);
        assert!(validate_texture_data(&desc, &[0; 16], false).is_ok());
        assert!(validate_texture_data(&desc, &[0; 15], false).is_err());
    }
}
