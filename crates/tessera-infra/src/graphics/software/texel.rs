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


//! Texel encoding used by clears and initial fills.

use tessera_core::renderer::{Color, TextureFormat};

/// Converts an `f32` to IEEE 754 half precision, rounding to nearest even.
pub(crate) fn f32_to_f16(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    if exponent == 0xff {
        // Infinity or NaN.
        let nan = if mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan;
    }

    let unbiased = exponent - 127 + 15;
    if unbiased >= 0x1f {
        return sign | 0x7c00;
    }
    if unbiased <= 0 {
        if unbiased < -10 {
            return sign;
        }
        let mantissa = mantissa | 0x0080_0000;
        let shift = (14 - unbiased) as u32;
        let half = mantissa >> shift;
        let remainder = mantissa & ((1 << shift) - 1);
        let halfway = 1 << (shift - 1);
        let rounded = if remainder > halfway || (remainder == halfway && half & 1 == 1) {
            half + 1
        } else {
            half
        };
        return sign | rounded as u16;
    }

    let half = ((unbiased as u32) << 10) | (mantissa >> 13);
    let remainder = mantissa & 0x1fff;
    let rounded = if remainder > 0x1000 || (remainder == 0x1000 && half & 1 == 1) {
        half + 1
    } else {
        half
    };
    sign | rounded as u16
}

fn linear_to_srgb(value: f32) -> f32 {
    if value <= 0.003_130_8 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

fn unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Encodes a clear color as one texel of `format`. Depth formats yield `None`.
pub(crate) fn encode_color(format: TextureFormat, color: Color) -> Option<Vec<u8>> {
    let [r, g, b, a] = color.to_array();
    let srgb = |c: f32| unorm8(linear_to_srgb(c.clamp(0.0, 1.0)));
    let texel = match format {
        TextureFormat::R8Unorm => vec![unorm8(r)],
        TextureFormat::Rg8Unorm => vec![unorm8(r), unorm8(g)],
        TextureFormat::Rgba8Unorm => vec![unorm8(r), unorm8(g), unorm8(b), unorm8(a)],
        TextureFormat::Rgba8UnormSrgb => vec![srgb(r), srgb(g), srgb(b), unorm8(a)],
        TextureFormat::Bgra8Unorm => vec![unorm8(b), unorm8(g), unorm8(r), unorm8(a)],
        TextureFormat::Bgra8UnormSrgb => vec![srgb(b), srgb(g), srgb(r), unorm8(a)],
        TextureFormat::R16Float => f32_to_f16(r).to_le_bytes().to_vec(),
        TextureFormat::Rg16Float => [r, g].iter().flat_map(|c| f32_to_f16(*c).to_le_bytes()).collect(),
        TextureFormat::Rgba16Float => [r, g, b, a]
            .iter()
            .flat_map(|c| f32_to_f16(*c).to_le_bytes())
            .collect(),
        TextureFormat::R32Float => r.to_le_bytes().to_vec(),
        TextureFormat::Rg32Float => bytemuck::cast_slice(&[r, g]).to_vec(),
        TextureFormat::Rgba32Float => bytemuck::cast_slice(&[r, g, b, a]).to_vec(),
        TextureFormat::R32Uint => (r.max(0.0) as u32).to_le_bytes().to_vec(),
        TextureFormat::Unknown
        | TextureFormat::Depth16Unorm
        | TextureFormat::Depth24UnormStencil8
        | TextureFormat::Depth32Float
        | TextureFormat::Depth32FloatStencil8 => return None,
    };
    Some(texel)
}

/// Overwrites the requested aspects of one depth-stencil texel in place.
pub(crate) fn write_depth_stencil(
    format: TextureFormat,
    texel: &mut [u8],
    depth: Option<f32>,
    stencil: Option<u8>,
) {
    match format {
        TextureFormat::Depth16Unorm => {
            if let Some(depth) = depth {
                let value = (depth.clamp(0.0, 1.0) * 65535.0).round() as u16;
                texel[..2].copy_from_slice(&value.to_le_bytes());
            }
        }
        TextureFormat::Depth24UnormStencil8 => {
            let mut packed = u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]);
            if let Some(depth) = depth {
                let value = (depth.clamp(0.0, 1.0) * 16_777_215.0).round() as u32;
                packed = (packed & 0xff00_0000) | value;
            }
            if let Some(stencil) = stencil {
                packed = (packed & 0x00ff_ffff) | ((stencil as u32) << 24);
            }
            texel[..4].copy_from_slice(&packed.to_le_bytes());
        }
        TextureFormat::Depth32Float => {
            if let Some(depth) = depth {
                texel[..4].copy_from_slice(&depth.to_le_bytes());
            }
        }
        TextureFormat::Depth32FloatStencil8 => {
            if let Some(depth) = depth {
                texel[..4].copy_from_slice(&depth.to_le_bytes());
            }
            if let Some(stencil) = stencil {
                texel[4] = stencil;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_floats() {
        assert_eq!(f32_to_f16(0.0), 0x0000);
        assert_eq!(f32_to_f16(1.0), 0x3c00);
        assert_eq!(f32_to_f16(-2.0), 0xc000);
        assert_eq!(f32_to_f16(0.5), 0x3800);
        assert_eq!(f32_to_f16(65504.0), 0x7bff);
        assert_eq!(f32_to_f16(1.0e6), 0x7c00);
    }

    #[test]
    fn unorm_clear_colors() {
        assert_eq!(
            encode_color(TextureFormat::Rgba8Unorm, Color::RED),
            Some(vec![255, 0, 0, 255])
        );
        assert_eq!(
            encode_color(TextureFormat::Bgra8Unorm, Color::RED),
            Some(vec![0, 0, 255, 255])
        );
        assert_eq!(encode_color(TextureFormat::Depth32Float, Color::RED), None);
    }

    #[test]
    fn depth_and_stencil_aspects_are_independent() {
        let mut texel = [0u8; 4];
        write_depth_stencil(TextureFormat::Depth24UnormStencil8, &mut texel, Some(1.0), Some(7));
        write_depth_stencil(TextureFormat::Depth24UnormStencil8, &mut texel, Some(0.0), None);
        assert_eq!(u32::from_le_bytes(texel), 7 << 24);
    }
}
