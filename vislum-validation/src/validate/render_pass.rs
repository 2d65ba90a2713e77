use ash::vk;

use crate::{
    command::{CommandBufferLevel, RenderPassInstance, SubpassContents},
    finding::{FindingCode, FindingCollector},
    handle::{Handle, ObjectKey, ObjectType},
    registry::{CommandBuffer, Framebuffer, Image, RenderPass},
    tracker::Usage,
};

use super::{Target, Validator};

fn contents_from_vk(contents: vk::SubpassContents) -> SubpassContents {
    SubpassContents::from_vk(contents).unwrap_or_else(|| {
        log::debug!("treating subpass contents {contents:?} as inline");
        SubpassContents::Inline
    })
}

fn load_usage(load_op: vk::AttachmentLoadOp) -> Usage {
    match load_op {
        vk::AttachmentLoadOp::CLEAR => Usage::RenderPassCleared,
        vk::AttachmentLoadOp::LOAD => Usage::RenderPassReadToTile,
        _ => Usage::RenderPassDiscarded,
    }
}

fn store_usage(store_op: vk::AttachmentStoreOp) -> Usage {
    match store_op {
        vk::AttachmentStoreOp::STORE => Usage::RenderPassStored,
        _ => Usage::RenderPassDiscarded,
    }
}

impl Validator {
    /// Whether `framebuffer` was created against a render pass compatible with `render_pass`.
    fn is_framebuffer_compatible(
        &self,
        render_pass: Handle,
        object: &RenderPass,
        framebuffer: &Framebuffer,
    ) -> bool {
        framebuffer.render_pass() == render_pass
            || self
                .registry
                .lookup::<RenderPass>(framebuffer.render_pass())
                .is_ok_and(|other| other.is_compatible(object))
    }

    fn check_render_area(
        &self,
        keys: [ObjectKey; 2],
        area: vk::Rect2D,
        framebuffer: &Framebuffer,
        out: &mut FindingCollector,
    ) {
        if area.extent.width == 0 || area.extent.height == 0 {
            out.push(FindingCode::ZeroExtent, &keys, format!("render area {area:?} is empty"));
            return;
        }

        let fits = |offset: i32, len: u32, limit: u32| {
            offset >= 0 && offset as u64 + len as u64 <= limit as u64
        };
        if !fits(area.offset.x, area.extent.width, framebuffer.width())
            || !fits(area.offset.y, area.extent.height, framebuffer.height())
        {
            out.push(
                FindingCode::RenderAreaOutOfBounds,
                &keys,
                format!(
                    "render area {area:?} exceeds the {}x{} framebuffer {}",
                    framebuffer.width(),
                    framebuffer.height(),
                    keys[1]
                ),
            );
        }
    }

    /// Checks every attachment against its description and records the load operations.
    fn load_attachments(
        &self,
        target: &mut Target,
        render_pass: &RenderPass,
        framebuffer: &Framebuffer,
        out: &mut FindingCollector,
    ) {
        let pairs = render_pass.attachments().iter().zip(framebuffer.attachments());
        for (index, (description, attachment)) in pairs.enumerate() {
            let Some(image) = self.resolve::<Image>(attachment.image, out) else {
                continue;
            };

            let key = ObjectKey::image(attachment.image);
            if image.info().format != description.format {
                out.push(
                    FindingCode::FormatIncompatible,
                    &[key],
                    format!(
                        "attachment {index} is {:?} but the render pass expects {:?}",
                        image.info().format,
                        description.format
                    ),
                );
            }
            if image.info().samples != description.samples {
                out.push(
                    FindingCode::SampleCountMismatch,
                    &[key],
                    format!(
                        "attachment {index} has {:?} samples but the render pass expects {:?}",
                        image.info().samples,
                        description.samples
                    ),
                );
            }

            if description.initial_layout != vk::ImageLayout::UNDEFINED {
                let layout = description.initial_layout;
                self.check_tracked_layout(attachment.image, &attachment.range, layout, out);
            }
            if description.load_op == vk::AttachmentLoadOp::LOAD {
                self.check_initialized(attachment.image, &attachment.range, out);
            }

            self.record(
                target,
                attachment.image,
                &attachment.range,
                load_usage(description.load_op),
                description.initial_layout,
                out,
            );
            self.reference(target, key);
        }
    }

    pub(super) fn begin_render_pass(
        &self,
        command_buffer: Handle,
        render_pass: Handle,
        framebuffer: Handle,
        render_area: vk::Rect2D,
        contents: vk::SubpassContents,
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);

        let mut valid = true;
        if cb.as_ref().is_some_and(|cb| cb.level() != CommandBufferLevel::Primary) {
            let key = target.key();
            out.push(
                FindingCode::CommandBufferLevel,
                &[key],
                format!("{key} is a secondary command buffer and cannot begin a render pass"),
            );
            valid = false;
        }

        if target.state().and_then(|state| state.render_pass_scope()).is_some() {
            self.check_outside_render_pass(&target, out);
            valid = false;
        }

        let render_pass_object = self.resolve::<RenderPass>(render_pass, out);
        let framebuffer_object = self.resolve::<Framebuffer>(framebuffer, out);
        let keys = [
            ObjectKey::new(ObjectType::RenderPass, render_pass),
            ObjectKey::new(ObjectType::Framebuffer, framebuffer),
        ];

        let pair = render_pass_object.as_deref().zip(framebuffer_object.as_deref());
        if let Some((render_pass_object, framebuffer_object)) = pair {
            let compatible =
                self.is_framebuffer_compatible(render_pass, render_pass_object, framebuffer_object);
            if !compatible {
                out.push(
                    FindingCode::RenderPassIncompatible,
                    &keys,
                    format!("{} was created for an incompatible render pass", keys[1]),
                );
            }
        }

        if let Some(framebuffer_object) = &framebuffer_object {
            self.check_render_area(keys, render_area, framebuffer_object, out);
        }

        if let Some((render_pass_object, framebuffer_object)) = pair {
            let expected = render_pass_object.attachments().len();
            let actual = framebuffer_object.attachments().len();
            if expected != actual {
                out.push(
                    FindingCode::AttachmentCountMismatch,
                    &keys,
                    format!(
                        "{} expects {expected} attachments but {} has {actual}",
                        keys[0], keys[1]
                    ),
                );
            } else if valid {
                self.load_attachments(&mut target, render_pass_object, framebuffer_object, out);
            }
        }

        if !valid {
            return;
        }

        if render_pass_object.is_some() {
            self.reference(&mut target, keys[0]);
        }
        if framebuffer_object.is_some() {
            self.reference(&mut target, keys[1]);
        }

        // The instance only needs the render pass; an unknown framebuffer loads no attachments.
        let Some(render_pass_object) = render_pass_object else {
            return;
        };
        if let Some(state) = target.recording_state() {
            state.render_pass = Some(RenderPassInstance {
                render_pass,
                framebuffer,
                subpass: 0,
                subpass_count: render_pass_object.subpass_count(),
                render_area,
                contents: contents_from_vk(contents),
            });
        }
    }

    pub(super) fn next_subpass(
        &self,
        command_buffer: Handle,
        contents: vk::SubpassContents,
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);
        let key = target.key();

        let Some(state) = target.state() else {
            return;
        };
        let Some(instance) = state.render_pass else {
            let message = format!("{key} has no active render pass");
            out.push(FindingCode::OutsideRenderPass, &[key], message);
            return;
        };

        if instance.subpass + 1 >= instance.subpass_count {
            let render_pass = ObjectKey::new(ObjectType::RenderPass, instance.render_pass);
            out.push(
                FindingCode::SubpassOutOfRange,
                &[key, render_pass],
                format!(
                    "{render_pass} has {} subpasses and {key} is already on the last",
                    instance.subpass_count
                ),
            );
            return;
        }

        let active = target.recording_state().and_then(|state| state.render_pass.as_mut());
        if let Some(instance) = active {
            instance.subpass += 1;
            instance.contents = contents_from_vk(contents);
        }
    }

    pub(super) fn end_render_pass(&self, command_buffer: Handle, out: &mut FindingCollector) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);
        let key = target.key();

        let Some(state) = target.state() else {
            return;
        };
        let Some(instance) = state.render_pass else {
            let message = format!("{key} has no active render pass");
            out.push(FindingCode::OutsideRenderPass, &[key], message);
            return;
        };

        let render_pass_key = ObjectKey::new(ObjectType::RenderPass, instance.render_pass);
        if instance.subpass + 1 != instance.subpass_count {
            out.push(
                FindingCode::SubpassIncomplete,
                &[key, render_pass_key],
                format!(
                    "{render_pass_key} ends on subpass {} of {}",
                    instance.subpass, instance.subpass_count
                ),
            );
        }

        let render_pass = self.registry.lookup::<RenderPass>(instance.render_pass);
        let framebuffer = self.registry.lookup::<Framebuffer>(instance.framebuffer);
        if let (Ok(render_pass), Ok(framebuffer)) = (render_pass, framebuffer) {
            let pairs = render_pass.attachments().iter().zip(framebuffer.attachments());
            for (description, attachment) in pairs {
                self.record(
                    &target,
                    attachment.image,
                    &attachment.range,
                    store_usage(description.store_op),
                    description.final_layout,
                    out,
                );
            }
        }

        if let Some(state) = target.recording_state() {
            state.render_pass = None;
        }
    }
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use crate::{
        call::Call,
        command::{CommandBufferLevel, Lifecycle},
        tracker::SubresourceRange,
        validate::tests::Harness,
    };

    pub(crate) fn color_attachment(
        load_op: vk::AttachmentLoadOp,
        initial_layout: vk::ImageLayout,
    ) -> vk::AttachmentDescription {
        vk::AttachmentDescription {
            format: vk::Format::R8G8B8A8_UNORM,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ..Default::default()
        }
    }

    fn area(width: u32, height: u32) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: vk::Extent2D { width, height },
        }
    }

    struct Scene {
        harness: Harness,
        command_buffer: Handle,
        image: Handle,
        render_pass: Handle,
        framebuffer: Handle,
    }

    fn setup(
        load_op: vk::AttachmentLoadOp,
        initial_layout: vk::ImageLayout,
        subpass_count: u32,
    ) -> Scene {
        let harness = Harness::new();
        let command_buffer = harness.recording();
        let image = harness.color_image(16, 16);
        let attachment = color_attachment(load_op, initial_layout);
        let render_pass = harness.render_pass(&[attachment], subpass_count);
        let framebuffer = harness.framebuffer(render_pass, &[image], 16, 16);
        Scene { harness, command_buffer, image, render_pass, framebuffer }
    }

    impl Scene {
        fn begin(&self, render_area: vk::Rect2D) -> crate::Report {
            self.harness.call(Call::CmdBeginRenderPass {
                command_buffer: self.command_buffer,
                render_pass: self.render_pass,
                framebuffer: self.framebuffer,
                render_area,
                contents: vk::SubpassContents::INLINE,
            })
        }

        fn cell_usage(&self) -> (Usage, Option<vk::ImageLayout>) {
            let summary = self
                .harness
                .validator
                .tracker()
                .query_usage(self.image, &SubresourceRange::whole(vk::ImageAspectFlags::COLOR))
                .unwrap();
            (summary.cells()[0].1.usage, summary.uniform_layout())
        }
    }

    #[test]
    fn test_render_pass_records_load_and_store() {
        let scene = setup(vk::AttachmentLoadOp::CLEAR, vk::ImageLayout::UNDEFINED, 1);
        assert!(scene.begin(area(16, 16)).is_clean());
        let cleared = (Usage::RenderPassCleared, Some(vk::ImageLayout::UNDEFINED));
        assert_eq!(scene.cell_usage(), cleared);

        scene.harness.ok(Call::CmdEndRenderPass { command_buffer: scene.command_buffer });
        assert_eq!(
            scene.cell_usage(),
            (Usage::RenderPassStored, Some(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL))
        );

        scene.harness.ok(Call::EndCommandBuffer { command_buffer: scene.command_buffer });
        assert_eq!(
            scene.harness.validator.lifecycle(scene.command_buffer),
            Some(Lifecycle::Executable)
        );
    }

    #[test]
    fn test_load_of_uninitialized_attachment() {
        let scene = setup(vk::AttachmentLoadOp::LOAD, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, 1);
        let report = scene.begin(area(16, 16));
        assert_eq!(report.codes(), [FindingCode::LayoutMismatch, FindingCode::UninitializedRead]);
    }

    #[test]
    fn test_nested_render_pass() {
        let scene = setup(vk::AttachmentLoadOp::CLEAR, vk::ImageLayout::UNDEFINED, 1);
        assert!(scene.begin(area(16, 16)).is_clean());
        assert_eq!(scene.begin(area(16, 16)).codes(), [FindingCode::InsideRenderPass]);
    }

    #[test]
    fn test_render_area_bounds() {
        let scene = setup(vk::AttachmentLoadOp::CLEAR, vk::ImageLayout::UNDEFINED, 1);
        assert_eq!(scene.begin(area(32, 16)).codes(), [FindingCode::RenderAreaOutOfBounds]);

        let scene = setup(vk::AttachmentLoadOp::CLEAR, vk::ImageLayout::UNDEFINED, 1);
        assert_eq!(scene.begin(area(0, 16)).codes(), [FindingCode::ZeroExtent]);
    }

    #[test]
    fn test_begin_with_one_unknown_object() {
        let scene = setup(vk::AttachmentLoadOp::CLEAR, vk::ImageLayout::UNDEFINED, 2);
        let command_buffer = scene.command_buffer;
        let unknown = Handle::from_raw(0xdead);
        let begin = |render_pass: Handle, framebuffer: Handle| {
            scene.harness.call(Call::CmdBeginRenderPass {
                command_buffer,
                render_pass,
                framebuffer,
                render_area: area(32, 16),
                contents: vk::SubpassContents::INLINE,
            })
        };

        // The known framebuffer is still checked, but nothing starts.
        let report = begin(unknown, scene.framebuffer);
        assert_eq!(
            report.codes(),
            [FindingCode::UnknownHandle, FindingCode::RenderAreaOutOfBounds]
        );
        let report = scene.harness.call(Call::CmdEndRenderPass { command_buffer });
        assert_eq!(report.codes(), [FindingCode::OutsideRenderPass]);

        // The known render pass starts an instance that loads no attachments.
        assert_eq!(begin(scene.render_pass, unknown).codes(), [FindingCode::UnknownHandle]);
        let contents = vk::SubpassContents::INLINE;
        scene.harness.ok(Call::CmdNextSubpass { command_buffer, contents });
        scene.harness.ok(Call::CmdEndRenderPass { command_buffer });

        let references = scene.harness.validator.machine().references();
        let render_pass = ObjectKey::new(ObjectType::RenderPass, scene.render_pass);
        let framebuffer = ObjectKey::new(ObjectType::Framebuffer, scene.framebuffer);
        assert_eq!(references.holders(render_pass), [command_buffer]);
        assert_eq!(references.holders(framebuffer), [command_buffer]);
        assert!(references.holders(ObjectKey::image(scene.image)).is_empty());
    }

    #[test]
    fn test_subpass_progression() {
        let scene = setup(vk::AttachmentLoadOp::CLEAR, vk::ImageLayout::UNDEFINED, 2);
        let command_buffer = scene.command_buffer;
        assert!(scene.begin(area(16, 16)).is_clean());

        let report = scene.harness.call(Call::CmdEndRenderPass { command_buffer });
        assert_eq!(report.codes(), [FindingCode::SubpassIncomplete]);

        assert!(scene.begin(area(16, 16)).is_clean());
        let next = Call::CmdNextSubpass { command_buffer, contents: vk::SubpassContents::INLINE };
        scene.harness.ok(next);
        assert_eq!(scene.harness.call(next).codes(), [FindingCode::SubpassOutOfRange]);
        scene.harness.ok(Call::CmdEndRenderPass { command_buffer });

        assert_eq!(scene.harness.call(next).codes(), [FindingCode::OutsideRenderPass]);
    }

    #[test]
    fn test_transfer_inside_render_pass() {
        let scene = setup(vk::AttachmentLoadOp::CLEAR, vk::ImageLayout::UNDEFINED, 1);
        assert!(scene.begin(area(16, 16)).is_clean());

        let report = scene.harness.call(Call::CmdClearColorImage {
            command_buffer: scene.command_buffer,
            image: scene.image,
            layout: vk::ImageLayout::GENERAL,
            ranges: &[SubresourceRange::whole(vk::ImageAspectFlags::COLOR).to_vk()],
        });
        assert_eq!(report.count(FindingCode::InsideRenderPass), 1);

        let command_buffer = scene.command_buffer;
        let report = scene.harness.call(Call::EndCommandBuffer { command_buffer });
        assert_eq!(report.codes(), [FindingCode::UnterminatedRenderPass]);
    }

    #[test]
    fn test_secondary_cannot_begin_render_pass() {
        let scene = setup(vk::AttachmentLoadOp::CLEAR, vk::ImageLayout::UNDEFINED, 1);
        let harness = &scene.harness;
        let pool = harness.pool(true);
        let secondary = harness.allocate(pool, CommandBufferLevel::Secondary);
        harness.ok(Call::BeginCommandBuffer {
            command_buffer: secondary,
            usage: vk::CommandBufferUsageFlags::empty(),
            inheritance: None,
        });

        let report = harness.call(Call::CmdBeginRenderPass {
            command_buffer: secondary,
            render_pass: scene.render_pass,
            framebuffer: scene.framebuffer,
            render_area: area(16, 16),
            contents: vk::SubpassContents::INLINE,
        });
        assert_eq!(report.codes(), [FindingCode::CommandBufferLevel]);
        assert_eq!(scene.cell_usage().0, Usage::Undefined);
    }

    #[test]
    fn test_attachment_count_mismatch() {
        let harness = Harness::new();
        let command_buffer = harness.recording();
        let render_pass = harness.render_pass(&[], 1);
        let other = harness.render_pass(&[], 1);
        let framebuffer = harness.framebuffer(other, &[], 16, 16);

        // Compatible: both passes have no attachments and one subpass.
        harness.ok(Call::CmdBeginRenderPass {
            command_buffer,
            render_pass,
            framebuffer,
            render_area: area(16, 16),
            contents: vk::SubpassContents::INLINE,
        });
        harness.ok(Call::CmdEndRenderPass { command_buffer });

        let image = harness.color_image(16, 16);
        let wide = harness.render_pass(
            &[color_attachment(vk::AttachmentLoadOp::CLEAR, vk::ImageLayout::UNDEFINED)],
            1,
        );
        let wide_framebuffer = harness.framebuffer(wide, &[image], 16, 16);
        let report = harness.call(Call::CmdBeginRenderPass {
            command_buffer,
            render_pass,
            framebuffer: wide_framebuffer,
            render_area: area(16, 16),
            contents: vk::SubpassContents::INLINE,
        });
        assert_eq!(
            report.codes(),
            [FindingCode::RenderPassIncompatible, FindingCode::AttachmentCountMismatch]
        );
    }

    #[test]
    fn test_subpass_commands_on_ended_buffer_change_nothing() {
        let scene = setup(vk::AttachmentLoadOp::CLEAR, vk::ImageLayout::UNDEFINED, 2);
        let command_buffer = scene.command_buffer;
        assert!(scene.begin(area(16, 16)).is_clean());

        let report = scene.harness.call(Call::EndCommandBuffer { command_buffer });
        assert_eq!(report.codes(), [FindingCode::UnterminatedRenderPass]);

        let next = Call::CmdNextSubpass { command_buffer, contents: vk::SubpassContents::INLINE };
        assert_eq!(scene.harness.call(next).codes(), [FindingCode::NotRecording]);
        assert_eq!(scene.harness.call(next).codes(), [FindingCode::NotRecording]);

        let report = scene.harness.call(Call::CmdEndRenderPass { command_buffer });
        assert_eq!(report.codes(), [FindingCode::NotRecording, FindingCode::SubpassIncomplete]);
        assert_eq!(scene.cell_usage().0, Usage::RenderPassCleared);

        let registry = scene.harness.validator.registry();
        let cb = registry.lookup::<CommandBuffer>(command_buffer).unwrap();
        let instance = cb.lock().render_pass.expect("render pass still active");
        assert_eq!(instance.subpass, 0);
    }
}
