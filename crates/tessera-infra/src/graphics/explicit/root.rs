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


//! The two root signatures every explicit pipeline is created against.
//!
//! Each shader stage gets a block of root parameters: one root constant buffer
//! view per constant buffer slot, then a shader resource table and a sampler
//! table. The graphics signature holds the vertex block followed by the
//! fragment block; the compute signature holds the compute block followed by
//! an unordered access table.

use crate::graphics::native::explicit::{DescriptorRangeKind, RootParameter, RootSignatureDesc};
use tessera_core::renderer::context::{
    MAX_CONSTANT_BUFFERS, MAX_SAMPLERS, MAX_SHADER_RESOURCES, MAX_UNORDERED_ACCESS,
};
use tessera_core::renderer::ShaderStage;

const STAGE_BLOCK: u32 = MAX_CONSTANT_BUFFERS as u32 + 2;

/// Root index of the compute unordered access table.
pub(crate) const UNORDERED_ACCESS_PARAMETER: u32 = STAGE_BLOCK;

/// Root indices of one stage's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StageParameters {
    pub(crate) first_constant_buffer: u32,
    pub(crate) shader_resources: u32,
    pub(crate) samplers: u32,
}

pub(crate) const fn stage_parameters(stage: ShaderStage) -> StageParameters {
    let base = match stage {
        ShaderStage::Vertex | ShaderStage::Compute => 0,
        ShaderStage::Fragment => STAGE_BLOCK,
    };
    StageParameters {
        first_constant_buffer: base,
        shader_resources: base + MAX_CONSTANT_BUFFERS as u32,
        samplers: base + MAX_CONSTANT_BUFFERS as u32 + 1,
    }
}

fn push_stage_block(parameters: &mut Vec<RootParameter>) {
    parameters.extend((0..MAX_CONSTANT_BUFFERS as u32).map(|register| RootParameter::ConstantBuffer { register }));
    parameters.push(RootParameter::Table {
        kind: DescriptorRangeKind::ShaderResource,
        count: MAX_SHADER_RESOURCES as u32,
    });
    parameters.push(RootParameter::Table {
        kind: DescriptorRangeKind::Sampler,
        count: MAX_SAMPLERS as u32,
    });
}

pub(crate) fn graphics_root_signature() -> RootSignatureDesc {
    let mut parameters = Vec::with_capacity(2 * STAGE_BLOCK as usize);
    push_stage_block(&mut parameters);
    push_stage_block(&mut parameters);
    RootSignatureDesc {
        parameters,
        allow_input_layout: true,
    }
}

pub(crate) fn compute_root_signature() -> RootSignatureDesc {
    let mut parameters = Vec::with_capacity(STAGE_BLOCK as usize + 1);
    push_stage_block(&mut parameters);
    parameters.push(RootParameter::Table {
        kind: DescriptorRangeKind::UnorderedAccess,
        count: MAX_UNORDERED_ACCESS as u32,
    });
    RootSignatureDesc {
        parameters,
        allow_input_layout: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_indices_point_at_matching_parameters() {
        let graphics = graphics_root_signature();
        for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
            let params = stage_parameters(stage);
            assert_eq!(
                graphics.parameters[params.first_constant_buffer as usize],
                RootParameter::ConstantBuffer { register: 0 }
            );
            assert!(matches!(
                graphics.parameters[params.shader_resources as usize],
                RootParameter::Table { kind: DescriptorRangeKind::ShaderResource, .. }
            ));
            assert!(matches!(
                graphics.parameters[params.samplers as usize],
                RootParameter::Table { kind: DescriptorRangeKind::Sampler, .. }
            ));
        }

        let compute = compute_root_signature();
        assert!(matches!(
            compute.parameters[UNORDERED_ACCESS_PARAMETER as usize],
            RootParameter::Table { kind: DescriptorRangeKind::UnorderedAccess, count } if count == MAX_UNORDERED_ACCESS as u32
        ));
        assert_eq!(compute.parameters.len(), UNORDERED_ACCESS_PARAMETER as usize + 1);
    }
}
