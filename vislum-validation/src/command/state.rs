use std::collections::{BTreeMap, HashSet};

use ash::vk;

use crate::{handle::{Handle, ObjectKey}, vk_enum};

/// The lifecycle of a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifecycle {
    #[default]
    Initial,
    Recording,
    Executable,
    Pending,
    Invalid,
}

vk_enum! {
    pub enum CommandBufferLevel: vk::CommandBufferLevel {
        Primary => PRIMARY,
        Secondary => SECONDARY,
    }
}

vk_enum! {
    pub enum BindPoint: vk::PipelineBindPoint {
        Graphics => GRAPHICS,
        Compute => COMPUTE,
    }
}

vk_enum! {
    pub enum SubpassContents: vk::SubpassContents {
        Inline => INLINE,
        SecondaryCommandBuffers => SECONDARY_COMMAND_BUFFERS,
    }
}

vk_enum! {
    /// A category of pipeline state that can be set while recording.
    pub enum DynamicState: vk::DynamicState {
        Viewport => VIEWPORT,
        Scissor => SCISSOR,
        LineWidth => LINE_WIDTH,
        DepthBias => DEPTH_BIAS,
        BlendConstants => BLEND_CONSTANTS,
        DepthBounds => DEPTH_BOUNDS,
        StencilCompareMask => STENCIL_COMPARE_MASK,
        StencilWriteMask => STENCIL_WRITE_MASK,
        StencilReference => STENCIL_REFERENCE,
        CullMode => CULL_MODE,
        FrontFace => FRONT_FACE,
        PrimitiveTopology => PRIMITIVE_TOPOLOGY,
        ViewportWithCount => VIEWPORT_WITH_COUNT,
        ScissorWithCount => SCISSOR_WITH_COUNT,
        VertexInputBindingStride => VERTEX_INPUT_BINDING_STRIDE,
        DepthTestEnable => DEPTH_TEST_ENABLE,
        DepthWriteEnable => DEPTH_WRITE_ENABLE,
        DepthCompareOp => DEPTH_COMPARE_OP,
        DepthBoundsTestEnable => DEPTH_BOUNDS_TEST_ENABLE,
        StencilTestEnable => STENCIL_TEST_ENABLE,
        StencilOp => STENCIL_OP,
        RasterizerDiscardEnable => RASTERIZER_DISCARD_ENABLE,
        DepthBiasEnable => DEPTH_BIAS_ENABLE,
        PrimitiveRestartEnable => PRIMITIVE_RESTART_ENABLE,
    }
}

bitflags::bitflags! {
    /// One bit per [`DynamicState`], in declaration order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DynamicStateMask: u32 {
        const VIEWPORT = 1 << 0;
        const SCISSOR = 1 << 1;
        const LINE_WIDTH = 1 << 2;
        const DEPTH_BIAS = 1 << 3;
        const BLEND_CONSTANTS = 1 << 4;
        const DEPTH_BOUNDS = 1 << 5;
        const STENCIL_COMPARE_MASK = 1 << 6;
        const STENCIL_WRITE_MASK = 1 << 7;
        const STENCIL_REFERENCE = 1 << 8;
        const CULL_MODE = 1 << 9;
        const FRONT_FACE = 1 << 10;
        const PRIMITIVE_TOPOLOGY = 1 << 11;
        const VIEWPORT_WITH_COUNT = 1 << 12;
        const SCISSOR_WITH_COUNT = 1 << 13;
        const VERTEX_INPUT_BINDING_STRIDE = 1 << 14;
        const DEPTH_TEST_ENABLE = 1 << 15;
        const DEPTH_WRITE_ENABLE = 1 << 16;
        const DEPTH_COMPARE_OP = 1 << 17;
        const DEPTH_BOUNDS_TEST_ENABLE = 1 << 18;
        const STENCIL_TEST_ENABLE = 1 << 19;
        const STENCIL_OP = 1 << 20;
        const RASTERIZER_DISCARD_ENABLE = 1 << 21;
        const DEPTH_BIAS_ENABLE = 1 << 22;
        const PRIMITIVE_RESTART_ENABLE = 1 << 23;
    }
}

impl DynamicState {
    #[inline]
    pub const fn mask(self) -> DynamicStateMask {
        DynamicStateMask::from_bits_retain(1 << self.index())
    }
}

impl DynamicStateMask {
    /// The states whose bits are set, in declaration order.
    pub fn states(self) -> impl Iterator<Item = DynamicState> {
        DynamicState::ALL
            .iter()
            .copied()
            .filter(move |state| self.contains(state.mask()))
    }
}

/// What a secondary command buffer declared it continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InheritanceInfo {
    pub render_pass: Handle,
    pub subpass: u32,
    /// May be null when the framebuffer is not known at recording time.
    pub framebuffer: Handle,
}

/// An active render pass on a primary command buffer.
#[derive(Debug, Clone, Copy)]
pub struct RenderPassInstance {
    pub render_pass: Handle,
    pub framebuffer: Handle,
    pub subpass: u32,
    pub subpass_count: u32,
    pub render_area: vk::Rect2D,
    pub contents: SubpassContents,
}

/// Resources bound at one bind point.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    pub pipeline: Option<Handle>,
    /// Descriptor sets by set index.
    pub descriptor_sets: BTreeMap<u32, Handle>,
}

/// The mutable recording state of a command buffer.
#[derive(Debug, Clone, Default)]
pub struct CommandBufferState {
    pub lifecycle: Lifecycle,
    pub usage: vk::CommandBufferUsageFlags,
    pub inheritance: Option<InheritanceInfo>,
    /// Forward edges: every object referenced since the last reset.
    pub references: HashSet<ObjectKey>,
    pub dynamic_state: DynamicStateMask,
    pub graphics: Bindings,
    pub compute: Bindings,
    pub index_buffer: Option<Handle>,
    pub vertex_buffers: BTreeMap<u32, Handle>,
    pub render_pass: Option<RenderPassInstance>,
    /// Something it references went away while it was pending.
    pub stale: bool,
}

impl CommandBufferState {
    #[inline]
    pub fn is_recording(&self) -> bool {
        self.lifecycle == Lifecycle::Recording
    }

    #[inline]
    pub fn is_one_time_submit(&self) -> bool {
        self.usage.contains(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
    }

    #[inline]
    pub fn is_simultaneous_use(&self) -> bool {
        self.usage.contains(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)
    }

    #[inline]
    pub fn continues_render_pass(&self) -> bool {
        self.usage.contains(vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE)
    }

    #[inline]
    pub fn bindings(&self, bind_point: BindPoint) -> &Bindings {
        match bind_point {
            BindPoint::Graphics => &self.graphics,
            BindPoint::Compute => &self.compute,
        }
    }

    #[inline]
    pub fn bindings_mut(&mut self, bind_point: BindPoint) -> &mut Bindings {
        match bind_point {
            BindPoint::Graphics => &mut self.graphics,
            BindPoint::Compute => &mut self.compute,
        }
    }

    /// The render pass and subpass commands are recorded into, either from an
    /// active instance or inherited by a secondary buffer.
    pub fn render_pass_scope(&self) -> Option<(Handle, u32)> {
        if let Some(instance) = &self.render_pass {
            return Some((instance.render_pass, instance.subpass));
        }

        match &self.inheritance {
            Some(inheritance) if self.continues_render_pass() => {
                Some((inheritance.render_pass, inheritance.subpass))
            }
            _ => None,
        }
    }

    /// Drops everything recorded since the last begin and returns the forward edges.
    pub(crate) fn clear_recording(&mut self) -> HashSet<ObjectKey> {
        self.usage = vk::CommandBufferUsageFlags::empty();
        self.inheritance = None;
        self.dynamic_state = DynamicStateMask::empty();
        self.graphics = Bindings::default();
        self.compute = Bindings::default();
        self.index_buffer = None;
        self.vertex_buffers.clear();
        self.render_pass = None;
        self.stale = false;
        std::mem::take(&mut self.references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_state_sets_exactly_one_bit() {
        let mut seen = DynamicStateMask::empty();
        for &state in DynamicState::ALL {
            let bit = state.mask();
            assert_eq!(bit.bits().count_ones(), 1, "{state}");
            assert!(!seen.intersects(bit), "{state} shares a bit");
            seen |= bit;
        }

        assert_eq!(seen, DynamicStateMask::all());
        assert_eq!(DynamicState::Scissor.mask(), DynamicStateMask::SCISSOR);
        assert_eq!(
            DynamicState::PrimitiveRestartEnable.mask(),
            DynamicStateMask::PRIMITIVE_RESTART_ENABLE
        );
    }

    #[test]
    fn test_dynamic_state_vk_round_trip() {
        let line_width = DynamicState::from_vk(vk::DynamicState::LINE_WIDTH);
        assert_eq!(line_width, Some(DynamicState::LineWidth));
        assert_eq!(DynamicState::StencilOp.to_vk(), vk::DynamicState::STENCIL_OP);
    }

    #[test]
    fn test_mask_states() {
        let mask = DynamicStateMask::VIEWPORT | DynamicStateMask::DEPTH_BIAS;
        let states: Vec<_> = mask.states().collect();
        assert_eq!(states, [DynamicState::Viewport, DynamicState::DepthBias]);
    }

    #[test]
    fn test_clear_recording() {
        let mut state = CommandBufferState {
            lifecycle: Lifecycle::Recording,
            usage: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            dynamic_state: DynamicStateMask::VIEWPORT,
            index_buffer: Some(Handle::from_raw(1)),
            stale: true,
            ..Default::default()
        };
        state.references.insert(ObjectKey::buffer(Handle::from_raw(1)));

        let references = state.clear_recording();
        assert_eq!(references.len(), 1);
        assert!(state.references.is_empty());
        assert!(state.dynamic_state.is_empty());
        assert!(state.index_buffer.is_none());
        assert!(!state.is_one_time_submit());
        assert!(!state.stale);
    }

    #[test]
    fn test_inherited_render_pass_scope() {
        let mut state = CommandBufferState {
            inheritance: Some(InheritanceInfo {
                render_pass: Handle::from_raw(4),
                subpass: 1,
                framebuffer: Handle::NULL,
            }),
            ..Default::default()
        };
        assert_eq!(state.render_pass_scope(), None);

        state.usage = vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE;
        assert_eq!(state.render_pass_scope(), Some((Handle::from_raw(4), 1)));
    }
}
