use crate::{
    command::{BindPoint, Bindings},
    finding::{FindingCode, FindingCollector},
    handle::{Handle, ObjectKey, ObjectType},
    registry::{CommandBuffer, DescriptorSet, Image, Pipeline, RenderPass},
    tracker::Usage,
};

use super::{Target, Validator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DrawKind {
    Vertices,
    Indexed,
}

impl Validator {
    /// Checks and records the images the bound descriptor sets expose to a draw or dispatch.
    fn access_descriptor_images(
        &self,
        target: &mut Target,
        bindings: &Bindings,
        out: &mut FindingCollector,
    ) {
        for &set in bindings.descriptor_sets.values() {
            let Some(set) = self.resolve::<DescriptorSet>(set, out) else {
                continue;
            };

            for write in set.images() {
                if self.resolve::<Image>(write.image, out).is_none() {
                    continue;
                }

                self.check_tracked_layout(write.image, &write.range, write.layout, out);
                self.check_initialized(write.image, &write.range, out);
                let usage = Usage::DescriptorAccess;
                self.record(target, write.image, &write.range, usage, write.layout, out);
                self.reference(target, ObjectKey::image(write.image));
            }
        }
    }

    /// Checks that a graphics pipeline was built for the render pass scope it is used in.
    fn check_pipeline_scope(
        &self,
        key: ObjectKey,
        pipeline: Handle,
        object: &Pipeline,
        (render_pass, subpass): (Handle, u32),
        out: &mut FindingCollector,
    ) {
        let pipeline_key = ObjectKey::new(ObjectType::Pipeline, pipeline);
        let render_pass_key = ObjectKey::new(ObjectType::RenderPass, render_pass);

        let compatible = object.render_pass() == render_pass || {
            let ours = self.registry.lookup::<RenderPass>(object.render_pass());
            let theirs = self.registry.lookup::<RenderPass>(render_pass);
            matches!((ours, theirs), (Ok(ours), Ok(theirs)) if ours.is_compatible(&theirs))
        };
        if !compatible {
            out.push(
                FindingCode::RenderPassIncompatible,
                &[key, pipeline_key, render_pass_key],
                format!(
                    "{pipeline_key} was not created for a render pass compatible with \
                     {render_pass_key}"
                ),
            );
        }

        if object.subpass() != subpass {
            out.push(
                FindingCode::SubpassMismatch,
                &[key, pipeline_key],
                format!(
                    "{pipeline_key} targets subpass {} but {key} is in subpass {subpass}",
                    object.subpass()
                ),
            );
        }
    }

    pub(super) fn draw(
        &self,
        command_buffer: Handle,
        kind: DrawKind,
        count: u32,
        instance_count: u32,
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);
        let key = target.key();

        // A buffer that is not recording is checked against its last recorded state.
        if let Some(state) = target.state() {
            let scope = state.render_pass_scope();
            if scope.is_none() {
                let message = format!("{key} draws outside a render pass");
                out.push(FindingCode::OutsideRenderPass, &[key], message);
            }

            match state.bindings(BindPoint::Graphics).pipeline {
                None => out.push(
                    FindingCode::PipelineNotBound,
                    &[key],
                    format!("{key} draws without a graphics pipeline"),
                ),
                Some(pipeline) => {
                    if let Some(object) = self.resolve::<Pipeline>(pipeline, out) {
                        if let Some(scope) = scope {
                            self.check_pipeline_scope(key, pipeline, &object, scope, out);
                        }

                        let unset = object.dynamic_states().difference(state.dynamic_state);
                        for missing in unset.states() {
                            out.push(
                                FindingCode::DynamicStateNotSet,
                                &[key, ObjectKey::new(ObjectType::Pipeline, pipeline)],
                                format!("dynamic state {missing} was never set on {key}"),
                            );
                        }
                    }
                }
            }

            if kind == DrawKind::Indexed && state.index_buffer.is_none() {
                out.push(
                    FindingCode::IndexBufferNotBound,
                    &[key],
                    format!("{key} draws indexed without an index buffer"),
                );
            }
        }

        if count == 0 || instance_count == 0 {
            out.push(
                FindingCode::EmptyDraw,
                &[key],
                format!("draw of {count} elements and {instance_count} instances does nothing"),
            );
        }

        let bindings = target.state().map(|state| state.bindings(BindPoint::Graphics).clone());
        if let Some(bindings) = bindings {
            self.access_descriptor_images(&mut target, &bindings, out);
        }
    }

    pub(super) fn dispatch(
        &self,
        command_buffer: Handle,
        group_count: [u32; 3],
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);
        let key = target.key();

        self.check_outside_render_pass(&target, out);
        let bindings = target.state().map(|state| state.bindings(BindPoint::Compute).clone());

        if bindings.as_ref().is_some_and(|bindings| bindings.pipeline.is_none()) {
            out.push(
                FindingCode::PipelineNotBound,
                &[key],
                format!("{key} dispatches without a compute pipeline"),
            );
        }

        if group_count.contains(&0) {
            out.push(
                FindingCode::EmptyDraw,
                &[key],
                format!("dispatch of {group_count:?} groups does nothing"),
            );
        }

        if let Some(bindings) = bindings {
            self.access_descriptor_images(&mut target, &bindings, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use ash::vk;

    use super::*;
    use crate::{
        call::Call,
        command::DynamicState,
        registry::{DescriptorImage, PipelineCreateInfo},
        tracker::SubresourceRange,
        validate::tests::Harness,
    };

    struct Pass {
        harness: Harness,
        command_buffer: Handle,
        render_pass: Handle,
    }

    /// A recording buffer inside a render pass with no attachments.
    fn inside_pass(subpass_count: u32) -> Pass {
        let harness = Harness::new();
        let command_buffer = harness.recording();
        let render_pass = harness.render_pass(&[], subpass_count);
        let framebuffer = harness.framebuffer(render_pass, &[], 16, 16);
        harness.ok(Call::CmdBeginRenderPass {
            command_buffer,
            render_pass,
            framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: vk::Extent2D { width: 16, height: 16 },
            },
            contents: vk::SubpassContents::INLINE,
        });
        Pass { harness, command_buffer, render_pass }
    }

    impl Pass {
        fn bind(&self, info: PipelineCreateInfo) -> Handle {
            let pipeline = self.harness.pipeline(&PipelineCreateInfo {
                render_pass: self.render_pass,
                ..info
            });
            self.harness.ok(Call::CmdBindPipeline {
                command_buffer: self.command_buffer,
                bind_point: vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            });
            pipeline
        }

        fn draw(&self) -> crate::Report {
            self.harness.call(Call::CmdDraw {
                command_buffer: self.command_buffer,
                vertex_count: 3,
                instance_count: 1,
            })
        }
    }

    #[test]
    fn test_draw_requires_every_dynamic_state() {
        let pass = inside_pass(1);
        pass.bind(PipelineCreateInfo {
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            ..Default::default()
        });
        pass.harness.ok(Call::CmdSetDynamicState {
            command_buffer: pass.command_buffer,
            state: DynamicState::Viewport,
        });

        let report = pass.draw();
        assert_eq!(report.codes(), [FindingCode::DynamicStateNotSet]);
        assert!(report.findings()[0].message().contains("Scissor"));

        pass.harness.ok(Call::CmdSetDynamicState {
            command_buffer: pass.command_buffer,
            state: DynamicState::Scissor,
        });
        assert!(pass.draw().is_clean());
    }

    #[test]
    fn test_draw_without_scope_or_pipeline() {
        let harness = Harness::new();
        let command_buffer = harness.recording();

        let report = harness.call(Call::CmdDrawIndexed {
            command_buffer,
            index_count: 0,
            instance_count: 1,
        });
        assert_eq!(
            report.codes(),
            [
                FindingCode::OutsideRenderPass,
                FindingCode::PipelineNotBound,
                FindingCode::IndexBufferNotBound,
                FindingCode::EmptyDraw
            ]
        );
    }

    #[test]
    fn test_draw_in_wrong_subpass() {
        let pass = inside_pass(2);
        pass.bind(PipelineCreateInfo { subpass: 1, ..Default::default() });
        assert_eq!(pass.draw().codes(), [FindingCode::SubpassMismatch]);

        pass.harness.ok(Call::CmdNextSubpass {
            command_buffer: pass.command_buffer,
            contents: vk::SubpassContents::INLINE,
        });
        assert!(pass.draw().is_clean());
    }

    #[test]
    fn test_draw_with_incompatible_pipeline() {
        let pass = inside_pass(1);
        let other = pass.harness.render_pass(&[], 2);
        let info = PipelineCreateInfo { render_pass: other, ..Default::default() };
        let pipeline = pass.harness.pipeline(&info);
        pass.harness.ok(Call::CmdBindPipeline {
            command_buffer: pass.command_buffer,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            pipeline,
        });
        assert_eq!(pass.draw().codes(), [FindingCode::RenderPassIncompatible]);
    }

    #[test]
    fn test_draw_reads_descriptor_images() {
        let pass = inside_pass(1);
        let harness = &pass.harness;
        pass.bind(PipelineCreateInfo::default());

        let image = harness.color_image(8, 8);
        let set = harness.handle();
        harness.ok(Call::AllocateDescriptorSets { descriptor_sets: &[set] });
        harness.ok(Call::UpdateDescriptorSets {
            descriptor_set: set,
            writes: &[DescriptorImage {
                binding: 0,
                image,
                range: SubresourceRange::whole(vk::ImageAspectFlags::COLOR),
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }],
        });
        harness.ok(Call::CmdBindDescriptorSets {
            command_buffer: pass.command_buffer,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            first_set: 0,
            descriptor_sets: &[set],
        });

        let report = pass.draw();
        assert_eq!(report.codes(), [FindingCode::LayoutMismatch, FindingCode::UninitializedRead]);

        let holders = harness.validator.machine().references().holders(ObjectKey::image(image));
        assert_eq!(holders, [pass.command_buffer]);
    }

    #[test]
    fn test_dispatch() {
        let harness = Harness::new();
        let command_buffer = harness.recording();

        let report = harness.call(Call::CmdDispatch { command_buffer, group_count: [1, 0, 1] });
        assert_eq!(report.codes(), [FindingCode::PipelineNotBound, FindingCode::EmptyDraw]);

        let pipeline = harness.pipeline(&PipelineCreateInfo {
            bind_point: BindPoint::Compute,
            ..Default::default()
        });
        harness.ok(Call::CmdBindPipeline {
            command_buffer,
            bind_point: vk::PipelineBindPoint::COMPUTE,
            pipeline,
        });
        harness.ok(Call::CmdDispatch { command_buffer, group_count: [4, 4, 1] });
    }

    #[test]
    fn test_dispatch_inside_render_pass() {
        let pass = inside_pass(1);
        let report = pass.harness.call(Call::CmdDispatch {
            command_buffer: pass.command_buffer,
            group_count: [1, 1, 1],
        });
        assert_eq!(report.codes(), [FindingCode::InsideRenderPass, FindingCode::PipelineNotBound]);
    }

    #[test]
    fn test_draw_on_ended_buffer_is_still_checked() {
        let harness = Harness::new();
        let command_buffer = harness.recording();
        harness.ok(Call::EndCommandBuffer { command_buffer });

        let report =
            harness.call(Call::CmdDraw { command_buffer, vertex_count: 0, instance_count: 1 });
        assert_eq!(
            report.codes(),
            [
                FindingCode::NotRecording,
                FindingCode::OutsideRenderPass,
                FindingCode::PipelineNotBound,
                FindingCode::EmptyDraw
            ]
        );

        let report = harness.call(Call::CmdDispatch { command_buffer, group_count: [0, 1, 1] });
        assert_eq!(
            report.codes(),
            [FindingCode::NotRecording, FindingCode::PipelineNotBound, FindingCode::EmptyDraw]
        );
        let lifecycle = harness.validator.lifecycle(command_buffer);
        assert_eq!(lifecycle, Some(crate::command::Lifecycle::Executable));
    }
}
