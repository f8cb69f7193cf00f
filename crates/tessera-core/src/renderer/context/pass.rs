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


//! Render-pass nesting and attachment action rules.

use super::binding::MAX_SHADER_RESOURCES;
use crate::renderer::api::common::{Extent2D, ShaderStage};
use crate::renderer::api::pass::{
    LoadAction, RenderPassDepthStencilAttachment, RenderPassDescriptor, StoreAction,
};
use crate::renderer::api::texture::TextureId;
use crate::renderer::error::GraphicsError;

/// Tracks whether a render pass is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassTracker {
    /// No pass is open.
    #[default]
    Idle,
    /// A pass covering `render_area` is open.
    InPass {
        /// The area shared by every attachment.
        render_area: Extent2D,
    },
}

impl PassTracker {
    /// Fails with `InvalidState` if a pass is already open.
    pub fn check_can_begin(&self) -> Result<(), GraphicsError> {
        match self {
            PassTracker::Idle => Ok(()),
            PassTracker::InPass { .. } => Err(GraphicsError::invalid_state(
                "begin_render_pass called while a render pass is already active",
            )),
        }
    }

    /// Opens a pass. Call [`check_can_begin`](Self::check_can_begin) first.
    pub fn enter(&mut self, render_area: Extent2D) {
        *self = PassTracker::InPass { render_area };
    }

    /// Closes the open pass and returns its render area.
    pub fn leave(&mut self) -> Result<Extent2D, GraphicsError> {
        match *self {
            PassTracker::InPass { render_area } => {
                *self = PassTracker::Idle;
                Ok(render_area)
            }
            PassTracker::Idle => Err(GraphicsError::invalid_state(
                "end_render_pass called without an active render pass",
            )),
        }
    }

    /// Returns `true` while a pass is open.
    pub fn is_in_pass(&self) -> bool {
        matches!(self, PassTracker::InPass { .. })
    }

    /// The open pass's render area.
    pub fn render_area(&self) -> Option<Extent2D> {
        match self {
            PassTracker::InPass { render_area } => Some(*render_area),
            PassTracker::Idle => None,
        }
    }

    /// Fails with `InvalidState` unless a pass is open.
    pub fn require_pass(&self, operation: &str) -> Result<Extent2D, GraphicsError> {
        self.render_area().ok_or_else(|| {
            GraphicsError::InvalidState(format!("{operation} requires an active render pass"))
        })
    }

    /// Fails with `InvalidState` while a pass is open.
    pub fn require_idle(&self, operation: &str) -> Result<(), GraphicsError> {
        if self.is_in_pass() {
            return Err(GraphicsError::InvalidState(format!(
                "{operation} cannot be recorded inside a render pass"
            )));
        }
        Ok(())
    }
}

/// The minimum width and height across every attachment extent.
pub fn render_area(extents: impl IntoIterator<Item = Extent2D>) -> Option<Extent2D> {
    extents.into_iter().reduce(|area, extent| {
        Extent2D::new(area.width.min(extent.width), area.height.min(extent.height))
    })
}

/// The depth-stencil work a pass performs, with the stencil aspect ignored
/// for formats that have none.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilOps {
    /// Depth clear value, when the depth load action is `Clear`.
    pub clear_depth: Option<f32>,
    /// Stencil clear value, when the stencil load action is `Clear`.
    pub clear_stencil: Option<u8>,
    /// Issue a discard hint when the pass begins.
    pub discard_on_load: bool,
    /// Issue a discard hint when the pass ends.
    pub discard_on_store: bool,
}

impl DepthStencilOps {
    /// Resolves an attachment's actions against its format.
    ///
    /// The discard hint covers the whole view, so it is only issued when every
    /// aspect the format has asked for a discard.
    pub fn resolve(attachment: &RenderPassDepthStencilAttachment, has_stencil: bool) -> Self {
        let clear_depth =
            (attachment.depth_load == LoadAction::Clear).then_some(attachment.clear_depth);
        let clear_stencil = (has_stencil && attachment.stencil_load == LoadAction::Clear)
            .then_some(attachment.clear_stencil);
        let discard_on_load = attachment.depth_load == LoadAction::Discard
            && (!has_stencil || attachment.stencil_load == LoadAction::Discard);
        let discard_on_store = attachment.depth_store == StoreAction::Discard
            && (!has_stencil || attachment.stencil_store == StoreAction::Discard);
        Self {
            clear_depth,
            clear_stencil,
            discard_on_load,
            discard_on_store,
        }
    }

    /// Returns `true` if a clear call is needed.
    pub fn needs_clear(&self) -> bool {
        self.clear_depth.is_some() || self.clear_stencil.is_some()
    }
}

/// Catches draws that sample a texture the open pass renders into.
///
/// Textures bound to the vertex and fragment shader-resource slots are
/// remembered by id. Compute slots are ignored since dispatches never run
/// inside a pass.
#[derive(Debug, Clone, Default)]
pub struct AttachmentHazards {
    attached: Vec<TextureId>,
    sampled: [[Option<TextureId>; MAX_SHADER_RESOURCES]; 2],
}

impl AttachmentHazards {
    /// Records the attachments of a pass that just began.
    pub fn attach(&mut self, descriptor: &RenderPassDescriptor) {
        self.attached.clear();
        self.attached
            .extend(descriptor.color_attachments.iter().map(|attachment| attachment.texture));
        self.attached
            .extend(descriptor.depth_stencil_attachment.iter().map(|attachment| attachment.texture));
    }

    /// Forgets the attachments when the pass ends.
    pub fn detach(&mut self) {
        self.attached.clear();
    }

    /// Records the texture bound to a shader-resource slot, `None` for
    /// buffers or an unbound slot. The slot must already be range-checked.
    pub fn sample(&mut self, stage: ShaderStage, slot: u32, texture: Option<TextureId>) {
        if stage == ShaderStage::Compute {
            return;
        }
        if let Some(entry) = self.sampled[stage.index()].get_mut(slot as usize) {
            *entry = texture;
        }
    }

    /// Unbinds every sampled texture.
    pub fn clear_sampled(&mut self) {
        self.sampled = Default::default();
    }

    /// Fails with `InvalidState` if a draw now would read an attachment.
    pub fn check_draw(&self, operation: &str) -> Result<(), GraphicsError> {
        let hazard = self
            .sampled
            .iter()
            .flatten()
            .flatten()
            .find(|texture| self.attached.contains(texture));
        match hazard {
            Some(texture) => Err(GraphicsError::InvalidState(format!(
                "{operation} samples {texture:?}, which is attached to the active render pass"
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::pass::RenderPassColorAttachment;
    use crate::renderer::api::common::Color;

    #[test]
    fn sampling_an_attachment_is_a_hazard_until_the_pass_ends() {
        let attachments = [RenderPassColorAttachment::clear(TextureId(4), Color::BLACK)];
        let descriptor = RenderPassDescriptor {
            color_attachments: &attachments,
            ..Default::default()
        };
        let mut hazards = AttachmentHazards::default();
        hazards.sample(ShaderStage::Fragment, 2, Some(TextureId(4)));
        hazards.sample(ShaderStage::Vertex, 0, Some(TextureId(5)));
        assert!(hazards.check_draw("draw").is_ok());

        hazards.attach(&descriptor);
        assert!(matches!(hazards.check_draw("draw"), Err(GraphicsError::InvalidState(_))));

        hazards.sample(ShaderStage::Fragment, 2, None);
        assert!(hazards.check_draw("draw").is_ok());

        hazards.sample(ShaderStage::Fragment, 2, Some(TextureId(4)));
        hazards.detach();
        assert!(hazards.check_draw("draw").is_ok());
    }

    #[test]
    fn nested_begin_and_orphan_end_are_rejected() {
        let mut tracker = PassTracker::default();
        assert!(tracker.leave().is_err());

        tracker.check_can_begin().unwrap();
        tracker.enter(Extent2D::new(4, 4));
        assert!(matches!(tracker.check_can_begin(), Err(GraphicsError::InvalidState(_))));

        assert_eq!(tracker.leave().unwrap(), Extent2D::new(4, 4));
        assert!(!tracker.is_in_pass());
    }

    #[test]
    fn render_area_is_the_smallest_extent() {
        let area = render_area([Extent2D::new(256, 128), Extent2D::new(128, 256)]);
        assert_eq!(area, Some(Extent2D::new(128, 128)));
        assert_eq!(render_area(Vec::<Extent2D>::new()), None);
    }

    #[test]
    fn clear_carries_only_requested_aspects() {
        let mut attachment = RenderPassDepthStencilAttachment::clear(TextureId(0), 1.0);
        attachment.stencil_load = LoadAction::Load;

        let ops = DepthStencilOps::resolve(&attachment, true);

        assert_eq!(ops.clear_depth, Some(1.0));
        assert_eq!(ops.clear_stencil, None);
        assert!(!ops.discard_on_load);
    }

    #[test]
    fn stencil_actions_are_ignored_without_stencil() {
        let mut attachment = RenderPassDepthStencilAttachment::clear(TextureId(0), 0.5);
        attachment.depth_load = LoadAction::Discard;
        attachment.depth_store = StoreAction::Discard;

        let ops = DepthStencilOps::resolve(&attachment, false);

        assert!(!ops.needs_clear());
        assert!(ops.discard_on_load);
        assert!(ops.discard_on_store);
        assert!(!DepthStencilOps::resolve(&attachment, true).discard_on_store);
    }
}
