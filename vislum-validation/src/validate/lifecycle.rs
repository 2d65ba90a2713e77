use std::sync::Arc;

use ash::vk;

use crate::{
    command::{BeginInfo, BindPoint, CommandBufferLevel, InheritanceInfo},
    finding::{FindingCode, FindingCollector},
    handle::{Handle, ObjectKey, ObjectType},
    registry::{
        BufferCreateInfo, CommandBuffer, CommandPool, DescriptorImage, DescriptorSet, Framebuffer,
        FramebufferCreateInfo, Image, ImageCreateInfo, PipelineCreateInfo, RenderPass,
        RenderPassCreateInfo, Tracked,
    },
};

use super::{Target, Validator, registry_code};

/// The largest mip chain an extent supports.
fn max_mip_levels(info: &ImageCreateInfo) -> u32 {
    let largest = info.extent.width.max(info.extent.height).max(info.extent.depth);
    u32::BITS - largest.leading_zeros()
}

impl Validator {
    pub(super) fn check_image_create_info(
        &self,
        info: &ImageCreateInfo,
        out: &mut FindingCollector,
    ) {
        if info.mip_levels == 0 || info.array_layers == 0 {
            out.push(
                FindingCode::ZeroCount,
                &[],
                format!(
                    "image has {} mip levels and {} layers",
                    info.mip_levels, info.array_layers
                ),
            );
        }

        if info.extent.is_empty() {
            let message = format!("image extent {:?} is empty", info.extent);
            out.push(FindingCode::ZeroExtent, &[], message);
            return;
        }

        if info.image_type == vk::ImageType::TYPE_3D && info.array_layers != 1 {
            out.push(
                FindingCode::DimensionalityMismatch,
                &[],
                format!("3D image has {} array layers", info.array_layers),
            );
        }

        let max = max_mip_levels(info);
        if info.mip_levels > max {
            out.push(
                FindingCode::MipLevelOutOfRange,
                &[],
                format!(
                    "{} mip levels requested, {:?} supports {max}",
                    info.mip_levels, info.extent
                ),
            );
        }

        if info.samples != vk::SampleCountFlags::TYPE_1 && info.mip_levels > 1 {
            out.push(
                FindingCode::SampleCountMismatch,
                &[],
                format!("multisampled image with {} mip levels", info.mip_levels),
            );
        }
    }

    pub(super) fn check_buffer_create_info(
        &self,
        info: &BufferCreateInfo,
        out: &mut FindingCollector,
    ) {
        if info.size == 0 {
            out.push(FindingCode::ZeroSize, &[], "buffer size is zero");
        }
        if info.usage.is_empty() {
            out.push(FindingCode::UsageFlagMissing, &[], "buffer has no usage flags");
        }
    }

    pub(super) fn check_pipeline_create_info(
        &self,
        info: &PipelineCreateInfo,
        out: &mut FindingCollector,
    ) {
        if info.bind_point != BindPoint::Graphics {
            return;
        }

        let Some(render_pass) = self.resolve::<RenderPass>(info.render_pass, out) else {
            return;
        };
        if info.subpass >= render_pass.subpass_count() {
            let key = ObjectKey::new(ObjectType::RenderPass, info.render_pass);
            out.push(
                FindingCode::SubpassOutOfRange,
                &[key],
                format!(
                    "subpass {} of {key}, which has {}",
                    info.subpass,
                    render_pass.subpass_count()
                ),
            );
        }
    }

    pub(super) fn check_render_pass_create_info(
        &self,
        info: &RenderPassCreateInfo,
        out: &mut FindingCollector,
    ) {
        if info.subpass_count == 0 {
            out.push(FindingCode::ZeroCount, &[], "render pass has no subpasses");
        }
    }

    pub(super) fn check_framebuffer_create_info(
        &self,
        info: &FramebufferCreateInfo,
        out: &mut FindingCollector,
    ) {
        let render_pass_key = ObjectKey::new(ObjectType::RenderPass, info.render_pass);
        if info.width == 0 || info.height == 0 || info.layers == 0 {
            out.push(
                FindingCode::ZeroExtent,
                &[render_pass_key],
                format!("framebuffer is {}x{}x{}", info.width, info.height, info.layers),
            );
        }

        if let Some(render_pass) = self.resolve::<RenderPass>(info.render_pass, out) {
            let expected = render_pass.attachments().len();
            if expected != info.attachments.len() {
                out.push(
                    FindingCode::AttachmentCountMismatch,
                    &[render_pass_key],
                    format!(
                        "{render_pass_key} expects {expected} attachments, {} given",
                        info.attachments.len()
                    ),
                );
            }
        }

        let usable = vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
            | vk::ImageUsageFlags::INPUT_ATTACHMENT;
        for attachment in &info.attachments {
            let Some(image) = self.resolve::<Image>(attachment.image, out) else {
                continue;
            };

            let key = ObjectKey::image(attachment.image);
            if !image.info().usage.intersects(usable) {
                out.push(
                    FindingCode::UsageFlagMissing,
                    &[key],
                    format!(
                        "{key} has usage {:?}, which allows no attachment use",
                        image.info().usage
                    ),
                );
            }

            let Some(resolved) = self.check_range(key, &image, &attachment.range, out) else {
                continue;
            };
            let mip = resolved.mips().start;
            let fits = image
                .extent_at(mip)
                .is_some_and(|extent| extent.width >= info.width && extent.height >= info.height);
            if !fits || resolved.layers().len() < info.layers as usize {
                out.push(
                    FindingCode::RegionOutOfBounds,
                    &[key],
                    format!(
                        "mip {mip} of {key} is smaller than the {}x{}x{} framebuffer",
                        info.width, info.height, info.layers
                    ),
                );
            }
        }
    }

    /// Reports destroying an object that pending command buffers still use.
    pub(super) fn check_destroy<T: Tracked>(&self, handle: Handle, out: &mut FindingCollector) {
        if handle.is_null() || self.resolve::<T>(handle, out).is_none() {
            return;
        }

        let key = ObjectKey::new(T::TYPE, handle);
        for holder in self.machine.pending_holders(&self.registry, key) {
            let holder = ObjectKey::command_buffer(holder);
            out.push(
                FindingCode::DestroyInUse,
                &[key, holder],
                format!("{key} is destroyed while pending {holder} uses it"),
            );
        }
    }

    fn check_not_pending(&self, command_buffer: Handle, out: &mut FindingCollector) {
        if self.machine.is_pending(command_buffer) {
            let key = ObjectKey::command_buffer(command_buffer);
            let message = format!("{key} is freed while pending");
            out.push(FindingCode::FreeWhilePending, &[key], message);
        }
    }

    pub(super) fn check_destroy_command_pool(&self, pool: Handle, out: &mut FindingCollector) {
        if pool.is_null() {
            return;
        }

        if let Some(pool) = self.resolve::<CommandPool>(pool, out) {
            for command_buffer in pool.buffers() {
                self.check_not_pending(command_buffer, out);
            }
        }
    }

    pub(super) fn check_free_command_buffers(
        &self,
        pool: Handle,
        command_buffers: &[Handle],
        out: &mut FindingCollector,
    ) {
        let named_pool = self.resolve::<CommandPool>(pool, out);

        for &handle in command_buffers.iter().filter(|handle| !handle.is_null()) {
            let Some(command_buffer) = self.resolve::<CommandBuffer>(handle, out) else {
                continue;
            };

            let allocated_here = match &named_pool {
                Some(named_pool) => named_pool.contains(handle),
                None => command_buffer.pool() == pool,
            };
            if !allocated_here {
                let key = ObjectKey::command_buffer(handle);
                let owner = ObjectKey::new(ObjectType::CommandPool, command_buffer.pool());
                let named = ObjectKey::new(ObjectType::CommandPool, pool);
                out.push(
                    FindingCode::ParentMismatch,
                    &[key, owner, named],
                    format!("{key} was allocated from {owner} but freed through {named}"),
                );
            }
            self.check_not_pending(handle, out);
        }
    }

    /// Resets every buffer of a pool; pending buffers are reported and left alone.
    pub(super) fn reset_command_pool(&self, pool: Handle, out: &mut FindingCollector) {
        let Some(pool) = self.resolve::<CommandPool>(pool, out) else {
            return;
        };

        let mut reset = 0;
        for handle in pool.buffers() {
            let Ok(command_buffer) = self.registry.lookup::<CommandBuffer>(handle) else {
                continue;
            };
            let registry = &self.registry;
            if self.machine.reset(registry, &self.tracker, handle, &command_buffer, true, out) {
                reset += 1;
            }
        }
        log::debug!("pool reset returned {reset} command buffers to the initial state");
    }

    pub(super) fn update_descriptor_set(
        &self,
        set: Handle,
        writes: &[DescriptorImage],
        out: &mut FindingCollector,
    ) {
        let Some(object) = self.resolve::<DescriptorSet>(set, out) else {
            return;
        };

        let usable = vk::ImageUsageFlags::SAMPLED
            | vk::ImageUsageFlags::STORAGE
            | vk::ImageUsageFlags::INPUT_ATTACHMENT;
        for write in writes {
            let Some(image) = self.resolve::<Image>(write.image, out) else {
                continue;
            };

            let key = ObjectKey::image(write.image);
            self.check_range(key, &image, &write.range, out);
            if !image.info().usage.intersects(usable) {
                out.push(
                    FindingCode::UsageFlagMissing,
                    &[key],
                    format!(
                        "{key} has usage {:?}, which cannot back a descriptor",
                        image.info().usage
                    ),
                );
            }
            if matches!(
                write.layout,
                vk::ImageLayout::UNDEFINED | vk::ImageLayout::PREINITIALIZED
            ) {
                out.push(
                    FindingCode::LayoutInvalid,
                    &[key],
                    format!("binding {} cannot expect {key} in {:?}", write.binding, write.layout),
                );
            }
        }

        let key = ObjectKey::new(ObjectType::DescriptorSet, set);
        for holder in self.machine.pending_holders(&self.registry, key) {
            let holder = ObjectKey::command_buffer(holder);
            out.push(
                FindingCode::DestroyInUse,
                &[key, holder],
                format!("{key} is updated while pending {holder} uses it"),
            );
        }

        object.write(writes);
        self.machine.invalidate_referencing(&self.registry, key);
    }

    pub(super) fn begin_command_buffer(
        &self,
        command_buffer: Handle,
        usage: vk::CommandBufferUsageFlags,
        inheritance: Option<InheritanceInfo>,
        out: &mut FindingCollector,
    ) {
        let Some(object) = self.resolve::<CommandBuffer>(command_buffer, out) else {
            return;
        };

        let secondary = object.level() == CommandBufferLevel::Secondary;
        if let Some(inheritance) = inheritance.filter(|_| secondary) {
            if let Some(render_pass) = self.resolve::<RenderPass>(inheritance.render_pass, out) {
                if inheritance.subpass >= render_pass.subpass_count() {
                    let key = ObjectKey::new(ObjectType::RenderPass, inheritance.render_pass);
                    out.push(
                        FindingCode::SubpassOutOfRange,
                        &[ObjectKey::command_buffer(command_buffer), key],
                        format!(
                            "inherited subpass {} of {key}, which has {}",
                            inheritance.subpass,
                            render_pass.subpass_count()
                        ),
                    );
                }
            }
            if !inheritance.framebuffer.is_null() {
                self.resolve::<Framebuffer>(inheritance.framebuffer, out);
            }
        }

        let info = BeginInfo { usage, inheritance };
        self.machine.begin(
            &self.registry,
            &self.tracker,
            command_buffer,
            &object,
            self.permits_reset(&object),
            &info,
            out,
        );

        let mut target = Target { handle: command_buffer, state: Some(object.lock()) };
        if let Some(inherited) = target.state().and_then(|state| state.inheritance) {
            let render_pass = ObjectKey::new(ObjectType::RenderPass, inherited.render_pass);
            self.reference(&mut target, render_pass);
            if !inherited.framebuffer.is_null() {
                let framebuffer = ObjectKey::new(ObjectType::Framebuffer, inherited.framebuffer);
                self.reference(&mut target, framebuffer);
            }
        }
    }

    pub(super) fn end_command_buffer(&self, command_buffer: Handle, out: &mut FindingCollector) {
        if let Some(object) = self.resolve::<CommandBuffer>(command_buffer, out) {
            self.machine.end(command_buffer, &object, out);
        }
    }

    pub(super) fn reset_command_buffer(&self, command_buffer: Handle, out: &mut FindingCollector) {
        if let Some(object) = self.resolve::<CommandBuffer>(command_buffer, out) {
            let permits_reset = self.permits_reset(&object);
            self.machine
                .reset(&self.registry, &self.tracker, command_buffer, &object, permits_reset, out);
        }
    }

    /// Registers a created object, reporting a handle that is still live.
    pub(super) fn register<T: Tracked>(
        &self,
        handle: Handle,
        object: T,
        out: &mut FindingCollector,
    ) -> Option<Arc<T>> {
        match self.registry.create(handle, object) {
            Ok(object) => Some(object),
            Err(e) => {
                out.push(registry_code(&e), &[e.key()], e.to_string());
                None
            }
        }
    }

    pub(super) fn register_image(
        &self,
        image: Handle,
        info: &ImageCreateInfo,
        out: &mut FindingCollector,
    ) {
        if self.register(image, Image::new(info.clone()), out).is_some() {
            self.tracker
                .track(image, info.mip_levels, info.array_layers, info.initial_layout);
        }
    }

    pub(super) fn register_command_buffers(
        &self,
        pool: Handle,
        level: vk::CommandBufferLevel,
        command_buffers: &[Handle],
        out: &mut FindingCollector,
    ) {
        let Some(level) = CommandBufferLevel::from_vk(level) else {
            log::warn!("not tracking command buffers of level {level:?}");
            return;
        };
        let Ok(pool_object) = self.registry.lookup::<CommandPool>(pool) else {
            log::warn!("command buffers allocated from untracked pool {pool}");
            return;
        };

        for &handle in command_buffers {
            if self.register(handle, CommandBuffer::new(pool, level), out).is_some() {
                pool_object.insert(handle);
            }
        }
    }

    /// Tombstones a destroyed object and invalidates the buffers that referenced it.
    pub(super) fn retire<T: Tracked>(&self, handle: Handle) -> Option<Arc<T>> {
        if handle.is_null() {
            return None;
        }

        let key = ObjectKey::new(T::TYPE, handle);
        match self.registry.destroy::<T>(handle) {
            Ok(object) => {
                self.machine.invalidate_referencing(&self.registry, key);
                self.machine.references().forget(key);
                Some(object)
            }
            Err(e) => {
                log::warn!("ignoring destruction of {key}: {e}");
                None
            }
        }
    }

    pub(super) fn retire_command_buffer(&self, command_buffer: Handle, out: &mut FindingCollector) {
        if command_buffer.is_null() {
            return;
        }

        match self.registry.destroy::<CommandBuffer>(command_buffer) {
            Ok(object) => {
                if let Ok(pool) = self.registry.lookup::<CommandPool>(object.pool()) {
                    pool.remove(command_buffer);
                }
                self.machine.free(&self.registry, command_buffer, &object, out);
            }
            Err(e) => {
                log::warn!("ignoring free of {}: {e}", ObjectKey::command_buffer(command_buffer))
            }
        }
    }

    /// Destroys a pool along with every buffer still allocated from it.
    pub(super) fn retire_command_pool(&self, pool: Handle, out: &mut FindingCollector) {
        if pool.is_null() {
            return;
        }

        let Ok(object) = self.registry.lookup::<CommandPool>(pool) else {
            log::warn!("ignoring destruction of {}", ObjectKey::new(ObjectType::CommandPool, pool));
            return;
        };

        for command_buffer in object.buffers() {
            self.retire_command_buffer(command_buffer, out);
        }
        self.retire::<CommandPool>(pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        call::{Call, ImageBarrier},
        command::Lifecycle,
        extent::Extent3D,
        registry::{Buffer, RegistryError},
        settings::ValidationSettings,
        tracker::SubresourceRange,
        validate::tests::Harness,
    };

    fn referencing(harness: &Harness, pool: Handle, image: Handle) -> Handle {
        let command_buffer = harness.allocate(pool, CommandBufferLevel::Primary);
        harness.ok(Call::BeginCommandBuffer {
            command_buffer,
            usage: vk::CommandBufferUsageFlags::empty(),
            inheritance: None,
        });
        harness.transition(command_buffer, image, vk::ImageLayout::GENERAL);
        command_buffer
    }

    #[test]
    fn test_free_through_wrong_pool() {
        let harness = Harness::new();
        let (a, b) = (harness.pool(true), harness.pool(true));
        let command_buffer = harness.allocate(a, CommandBufferLevel::Primary);

        let report = harness.call(Call::FreeCommandBuffers {
            pool: b,
            command_buffers: &[command_buffer],
        });
        assert_eq!(report.codes(), [FindingCode::ParentMismatch]);

        let registry = harness.validator.registry();
        assert_eq!(
            registry.lookup::<CommandBuffer>(command_buffer).err(),
            Some(RegistryError::UseAfterFree(ObjectKey::command_buffer(command_buffer)))
        );
        assert!(!registry.lookup::<CommandPool>(a).unwrap().contains(command_buffer));
        assert!(registry.lookup::<CommandPool>(b).unwrap().buffers().is_empty());
    }

    #[test]
    fn test_free_through_unknown_pool() {
        let harness = Harness::new();
        let pool = harness.pool(true);
        let command_buffer = harness.allocate(pool, CommandBufferLevel::Primary);

        let unknown = Handle::from_raw(0xdead);
        let report = harness.call(Call::FreeCommandBuffers {
            pool: unknown,
            command_buffers: &[command_buffer],
        });
        assert_eq!(report.codes(), [FindingCode::UnknownHandle, FindingCode::ParentMismatch]);
    }

    #[test]
    fn test_destroy_invalidates_exactly_the_referencing_buffers() {
        let harness = Harness::new();
        let pool = harness.pool(true);
        let image = harness.color_image(8, 8);

        let referencing: Vec<_> = (0..3).map(|_| referencing(&harness, pool, image)).collect();
        harness.ok(Call::EndCommandBuffer { command_buffer: referencing[0] });
        let bystander = harness.recording();

        harness.ok(Call::DestroyImage { image });
        for &command_buffer in &referencing {
            assert_eq!(harness.validator.lifecycle(command_buffer), Some(Lifecycle::Invalid));
        }
        assert_eq!(harness.validator.lifecycle(bystander), Some(Lifecycle::Recording));
        assert!(!harness.validator.tracker().is_tracked(image));
        let references = harness.validator.machine().references();
        assert!(references.holders(ObjectKey::image(image)).is_empty());
    }

    #[test]
    fn test_destroy_while_pending() {
        let harness = Harness::new();
        let pool = harness.pool(true);
        let image = harness.color_image(8, 8);
        let command_buffer = referencing(&harness, pool, image);
        harness.ok(Call::EndCommandBuffer { command_buffer });
        let queue = harness.handle();
        harness.ok(Call::QueueSubmit { queue, command_buffers: &[command_buffer] });

        let report = harness.call(Call::DestroyImage { image });
        assert_eq!(report.codes(), [FindingCode::DestroyInUse]);
        assert_eq!(harness.validator.lifecycle(command_buffer), Some(Lifecycle::Pending));
    }

    #[test]
    fn test_destroy_while_pending_invalidates_on_completion() {
        let harness = Harness::new();
        let pool = harness.pool(true);
        let image = harness.color_image(8, 8);
        let command_buffer = referencing(&harness, pool, image);
        harness.ok(Call::EndCommandBuffer { command_buffer });

        let queue = harness.handle();
        let submit = Call::QueueSubmit { queue, command_buffers: &[command_buffer] };
        harness.ok(submit);
        assert_eq!(harness.call(Call::DestroyImage { image }).codes(), [FindingCode::DestroyInUse]);

        harness.ok(Call::DeviceWaitIdle);
        assert_eq!(harness.validator.lifecycle(command_buffer), Some(Lifecycle::Invalid));
        assert_eq!(harness.call(submit).codes(), [FindingCode::SubmitNotExecutable]);

        // Re-recording starts over with a buffer that is no longer stale.
        harness.ok(Call::ResetCommandBuffer { command_buffer });
        harness.ok(Call::BeginCommandBuffer {
            command_buffer,
            usage: vk::CommandBufferUsageFlags::empty(),
            inheritance: None,
        });
        harness.ok(Call::EndCommandBuffer { command_buffer });
        harness.ok(submit);
        harness.ok(Call::QueueWaitIdle { queue });
        assert_eq!(harness.validator.lifecycle(command_buffer), Some(Lifecycle::Executable));
    }

    #[test]
    fn test_use_after_free() {
        let harness = Harness::new();
        let buffer = harness.buffer(64, vk::BufferUsageFlags::VERTEX_BUFFER);
        harness.ok(Call::DestroyBuffer { buffer });

        let report = harness.call(Call::DestroyBuffer { buffer });
        assert_eq!(report.codes(), [FindingCode::UseAfterFree]);

        let command_buffer = harness.recording();
        let report = harness.call(Call::CmdBindVertexBuffers {
            command_buffer,
            first_binding: 0,
            buffers: &[(buffer, 0)],
        });
        assert_eq!(report.codes(), [FindingCode::UseAfterFree]);

        harness.ok(Call::DestroyBuffer { buffer: Handle::NULL });
    }

    #[test]
    fn test_recycled_handle_and_duplicates() {
        let harness = Harness::new();
        let buffer = harness.buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
        let info = BufferCreateInfo { size: 16, usage: vk::BufferUsageFlags::UNIFORM_BUFFER };
        let create = Call::CreateBuffer { buffer, info: &info };

        let report = harness.validator.post_call(&create, vk::Result::SUCCESS);
        assert_eq!(report.codes(), [FindingCode::DuplicateHandle]);
        assert_eq!(harness.validator.registry().lookup::<Buffer>(buffer).unwrap().size(), 64);

        harness.ok(Call::DestroyBuffer { buffer });
        harness.ok(create);
        assert_eq!(harness.validator.registry().lookup::<Buffer>(buffer).unwrap().size(), 16);
    }

    #[test]
    fn test_failed_creation_registers_nothing() {
        let harness = Harness::new();
        let buffer = harness.handle();
        let info = BufferCreateInfo { size: 16, usage: vk::BufferUsageFlags::UNIFORM_BUFFER };
        let create = Call::CreateBuffer { buffer, info: &info };

        assert!(harness.validator.pre_call(&create).is_clean());
        let failed = harness.validator.post_call(&create, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(failed.is_clean());
        assert_eq!(harness.validator.registry().live_count::<Buffer>(), 0);
    }

    #[test]
    fn test_create_info_checks() {
        let harness = Harness::new();
        let validator = &harness.validator;
        let image = |info: ImageCreateInfo| {
            validator.pre_call(&Call::CreateImage { image: Handle::from_raw(1), info: &info })
        };

        let report =
            image(ImageCreateInfo { extent: Extent3D::new(0, 4, 1), ..Default::default() });
        assert_eq!(report.codes(), [FindingCode::ZeroExtent]);

        let report = image(ImageCreateInfo {
            image_type: vk::ImageType::TYPE_3D,
            extent: Extent3D::new(16, 16, 4),
            array_layers: 2,
            mip_levels: 6,
            ..Default::default()
        });
        assert_eq!(
            report.codes(),
            [FindingCode::DimensionalityMismatch, FindingCode::MipLevelOutOfRange]
        );

        let report = image(ImageCreateInfo {
            extent: Extent3D::new(16, 16, 1),
            mip_levels: 5,
            samples: vk::SampleCountFlags::TYPE_4,
            ..Default::default()
        });
        assert_eq!(report.codes(), [FindingCode::SampleCountMismatch]);

        let info = BufferCreateInfo { size: 0, usage: vk::BufferUsageFlags::empty() };
        let buffer = Handle::from_raw(2);
        let report = validator.pre_call(&Call::CreateBuffer { buffer, info: &info });
        assert_eq!(report.codes(), [FindingCode::ZeroSize, FindingCode::UsageFlagMissing]);

        let info = RenderPassCreateInfo { attachments: Vec::new(), subpass_count: 0 };
        let render_pass = Handle::from_raw(3);
        let report = validator.pre_call(&Call::CreateRenderPass { render_pass, info: &info });
        assert_eq!(report.codes(), [FindingCode::ZeroCount]);

        let render_pass = harness.render_pass(&[], 1);
        let info = PipelineCreateInfo { render_pass, subpass: 1, ..Default::default() };
        let pipeline = Handle::from_raw(4);
        let report = validator.pre_call(&Call::CreatePipeline { pipeline, info: &info });
        assert_eq!(report.codes(), [FindingCode::SubpassOutOfRange]);
    }

    #[test]
    fn test_framebuffer_checks() {
        let harness = Harness::new();
        let render_pass = harness.render_pass(&[], 1);
        let image = harness.color_image(8, 8);

        let info = FramebufferCreateInfo {
            render_pass,
            attachments: vec![crate::registry::FramebufferAttachment {
                image,
                range: SubresourceRange::new(vk::ImageAspectFlags::COLOR, 0, 1, 0, 1),
            }],
            width: 16,
            height: 16,
            layers: 1,
        };
        let report = harness
            .validator
            .pre_call(&Call::CreateFramebuffer { framebuffer: harness.handle(), info: &info });
        assert_eq!(
            report.codes(),
            [FindingCode::AttachmentCountMismatch, FindingCode::RegionOutOfBounds]
        );
    }

    #[test]
    fn test_reset_permissions() {
        let harness = Harness::new();
        let pool = harness.pool(false);
        let command_buffer = harness.allocate(pool, CommandBufferLevel::Primary);
        let begin = Call::BeginCommandBuffer {
            command_buffer,
            usage: vk::CommandBufferUsageFlags::empty(),
            inheritance: None,
        };
        harness.ok(begin);
        harness.ok(Call::EndCommandBuffer { command_buffer });

        assert_eq!(harness.call(begin).codes(), [FindingCode::ImplicitResetNotPermitted]);
        assert_eq!(
            harness.call(Call::ResetCommandBuffer { command_buffer }).codes(),
            [FindingCode::ResetNotPermitted]
        );
        assert_eq!(harness.validator.lifecycle(command_buffer), Some(Lifecycle::Executable));

        // Pool resets ignore the per-buffer permission.
        harness.ok(Call::ResetCommandPool { pool });
        assert_eq!(harness.validator.lifecycle(command_buffer), Some(Lifecycle::Initial));
    }

    #[test]
    fn test_implicit_reset_is_informational() {
        let settings = ValidationSettings { report_info: true, ..Default::default() };
        let harness = Harness::with_settings(settings);
        let command_buffer = harness.recording();
        harness.ok(Call::EndCommandBuffer { command_buffer });

        let report = harness.call(Call::BeginCommandBuffer {
            command_buffer,
            usage: vk::CommandBufferUsageFlags::empty(),
            inheritance: None,
        });
        assert_eq!(report.codes(), [FindingCode::ImplicitReset]);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_pool_reset_skips_pending_buffers() {
        let harness = Harness::new();
        let pool = harness.pool(true);
        let (pending, idle) = (
            harness.allocate(pool, CommandBufferLevel::Primary),
            harness.allocate(pool, CommandBufferLevel::Primary),
        );
        for command_buffer in [pending, idle] {
            harness.ok(Call::BeginCommandBuffer {
                command_buffer,
                usage: vk::CommandBufferUsageFlags::empty(),
                inheritance: None,
            });
            harness.ok(Call::EndCommandBuffer { command_buffer });
        }
        harness.ok(Call::QueueSubmit { queue: harness.handle(), command_buffers: &[pending] });

        let report = harness.call(Call::ResetCommandPool { pool });
        assert_eq!(report.codes(), [FindingCode::ResetWhilePending]);
        assert_eq!(harness.validator.lifecycle(pending), Some(Lifecycle::Pending));
        assert_eq!(harness.validator.lifecycle(idle), Some(Lifecycle::Initial));
    }

    #[test]
    fn test_destroying_pool_frees_its_buffers() {
        let harness = Harness::new();
        let pool = harness.pool(true);
        let command_buffer = harness.allocate(pool, CommandBufferLevel::Primary);
        harness.ok(Call::BeginCommandBuffer {
            command_buffer,
            usage: vk::CommandBufferUsageFlags::empty(),
            inheritance: None,
        });
        harness.ok(Call::EndCommandBuffer { command_buffer });
        let queue = harness.handle();
        harness.ok(Call::QueueSubmit { queue, command_buffers: &[command_buffer] });

        let report = harness.validator.pre_call(&Call::DestroyCommandPool { pool });
        assert_eq!(report.codes(), [FindingCode::FreeWhilePending]);
        harness.validator.post_call(&Call::DestroyCommandPool { pool }, vk::Result::SUCCESS);

        let registry = harness.validator.registry();
        assert!(!registry.is_live(ObjectKey::command_buffer(command_buffer)));
        assert!(!registry.is_live(ObjectKey::new(ObjectType::CommandPool, pool)));
        assert!(!harness.validator.machine().is_pending(command_buffer));
    }

    #[test]
    fn test_descriptor_update_invalidates_bound_buffers() {
        let harness = Harness::new();
        let command_buffer = harness.recording();
        let image = harness.color_image(8, 8);
        let set = harness.handle();
        harness.ok(Call::AllocateDescriptorSets { descriptor_sets: &[set] });
        harness.ok(Call::CmdBindDescriptorSets {
            command_buffer,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            first_set: 0,
            descriptor_sets: &[set],
        });

        let write = DescriptorImage {
            binding: 0,
            image,
            range: SubresourceRange::whole(vk::ImageAspectFlags::COLOR),
            layout: vk::ImageLayout::UNDEFINED,
        };
        let report =
            harness.call(Call::UpdateDescriptorSets { descriptor_set: set, writes: &[write] });
        assert_eq!(report.codes(), [FindingCode::LayoutInvalid]);
        assert_eq!(harness.validator.lifecycle(command_buffer), Some(Lifecycle::Invalid));

        let stored = harness.validator.registry().lookup::<DescriptorSet>(set).unwrap().images();
        assert_eq!(stored, [write]);
    }

    #[test]
    fn test_secondary_inheritance_is_referenced() {
        let harness = Harness::new();
        let pool = harness.pool(true);
        let render_pass = harness.render_pass(&[], 2);
        let secondary = harness.allocate(pool, CommandBufferLevel::Secondary);

        let report = harness.call(Call::BeginCommandBuffer {
            command_buffer: secondary,
            usage: vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE,
            inheritance: Some(InheritanceInfo {
                render_pass,
                subpass: 2,
                framebuffer: Handle::NULL,
            }),
        });
        assert_eq!(report.codes(), [FindingCode::SubpassOutOfRange]);

        harness.ok(Call::DestroyRenderPass { render_pass });
        assert_eq!(harness.validator.lifecycle(secondary), Some(Lifecycle::Invalid));
    }

    #[test]
    fn test_free_drops_references() {
        let harness = Harness::new();
        let pool = harness.pool(true);
        let image = harness.color_image(4, 4);
        let command_buffer = referencing(&harness, pool, image);

        let barrier = ImageBarrier {
            image,
            old_layout: vk::ImageLayout::GENERAL,
            new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            range: SubresourceRange::whole(vk::ImageAspectFlags::COLOR).to_vk(),
        };
        harness.ok(Call::CmdPipelineBarrier {
            command_buffer,
            image_barriers: &[barrier],
            buffer_barriers: &[],
        });
        harness.ok(Call::FreeCommandBuffers { pool, command_buffers: &[command_buffer] });

        let pool = harness.validator.registry().lookup::<CommandPool>(pool).unwrap();
        assert!(pool.buffers().is_empty());
        let references = harness.validator.machine().references();
        assert!(references.holders(ObjectKey::image(image)).is_empty());
    }
}
