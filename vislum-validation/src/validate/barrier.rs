use ash::vk;

use crate::{
    call::{BufferBarrier, ImageBarrier},
    finding::{FindingCode, FindingCollector},
    handle::{Handle, ObjectKey},
    registry::{Buffer, CommandBuffer, Image},
    tracker::{SubresourceRange, Usage},
};

use super::{Target, Validator};

impl Validator {
    pub(super) fn pipeline_barrier(
        &self,
        command_buffer: Handle,
        image_barriers: &[ImageBarrier],
        buffer_barriers: &[BufferBarrier],
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);

        for barrier in image_barriers {
            self.image_barrier(&mut target, barrier, out);
        }

        for barrier in buffer_barriers {
            self.buffer_barrier(&mut target, barrier, out);
        }
    }

    fn image_barrier(
        &self,
        target: &mut Target,
        barrier: &ImageBarrier,
        out: &mut FindingCollector,
    ) {
        let Some(image) = self.resolve::<Image>(barrier.image, out) else {
            return;
        };

        let key = ObjectKey::image(barrier.image);
        let range = SubresourceRange::from_vk(barrier.range);
        if self.check_range(key, &image, &range, out).is_none() {
            return;
        }

        if matches!(
            barrier.new_layout,
            vk::ImageLayout::UNDEFINED | vk::ImageLayout::PREINITIALIZED
        ) {
            out.push(
                FindingCode::LayoutInvalid,
                &[key],
                format!("{key} cannot transition into {:?}", barrier.new_layout),
            );
            return;
        }

        if barrier.old_layout == vk::ImageLayout::UNDEFINED {
            // Contents are discarded.
            self.record(target, barrier.image, &range, Usage::Undefined, barrier.new_layout, out);
        } else {
            self.check_tracked_layout(barrier.image, &range, barrier.old_layout, out);
            self.record_layout(target, barrier.image, &range, barrier.new_layout, out);
        }

        self.reference(target, key);
    }

    fn buffer_barrier(
        &self,
        target: &mut Target,
        barrier: &BufferBarrier,
        out: &mut FindingCollector,
    ) {
        let Some(buffer) = self.resolve::<Buffer>(barrier.buffer, out) else {
            return;
        };

        let key = ObjectKey::buffer(barrier.buffer);
        if barrier.size == 0 {
            out.push(FindingCode::ZeroSize, &[key], format!("barrier on {key} covers zero bytes"));
        } else if barrier.offset >= buffer.size()
            || (barrier.size != vk::WHOLE_SIZE
                && barrier.offset.checked_add(barrier.size).is_none_or(|end| end > buffer.size()))
        {
            out.push(
                FindingCode::BufferRangeOutOfBounds,
                &[key],
                format!(
                    "barrier covers {}+{} of {key}, which holds {} bytes",
                    barrier.offset,
                    barrier.size,
                    buffer.size()
                ),
            );
        }

        self.reference(target, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{call::Call, extent::Extent3D, registry::ImageCreateInfo, validate::tests::Harness};

    fn barrier(
        image: Handle,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        mip: u32,
    ) -> ImageBarrier {
        ImageBarrier {
            image,
            old_layout,
            new_layout,
            range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: mip,
                level_count: 1,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            },
        }
    }

    fn mipped_image(harness: &Harness) -> Handle {
        harness.image(ImageCreateInfo {
            extent: Extent3D::new(16, 16, 1),
            mip_levels: 3,
            array_layers: 2,
            usage: vk::ImageUsageFlags::SAMPLED,
            ..Default::default()
        })
    }

    #[test]
    fn test_partial_transition_leaves_other_levels() {
        let harness = Harness::new();
        let command_buffer = harness.recording();
        let image = mipped_image(&harness);

        harness.ok(Call::CmdPipelineBarrier {
            command_buffer,
            image_barriers: &[barrier(
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                1,
            )],
            buffer_barriers: &[],
        });

        let tracker = harness.validator.tracker();
        let whole = tracker
            .query_usage(image, &SubresourceRange::whole(vk::ImageAspectFlags::COLOR))
            .unwrap();
        assert_eq!(whole.uniform_layout(), None);
        assert_eq!(whole.layout_mismatches(vk::ImageLayout::UNDEFINED).count(), 2);

        let mut whole =
            barrier(image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::GENERAL, 0);
        whole.range.level_count = vk::REMAINING_MIP_LEVELS;
        let report = harness.call(Call::CmdPipelineBarrier {
            command_buffer,
            image_barriers: &[whole],
            buffer_barriers: &[],
        });
        assert_eq!(report.codes(), [FindingCode::LayoutInconsistent]);
    }

    #[test]
    fn test_old_layout_must_match() {
        let harness = Harness::new();
        let command_buffer = harness.recording();
        let image = mipped_image(&harness);
        let transition = barrier(image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL, 0);
        harness.ok(Call::CmdPipelineBarrier {
            command_buffer,
            image_barriers: &[transition],
            buffer_barriers: &[],
        });

        let report = harness.call(Call::CmdPipelineBarrier {
            command_buffer,
            image_barriers: &[barrier(
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                0,
            )],
            buffer_barriers: &[],
        });
        assert_eq!(report.codes(), [FindingCode::LayoutMismatch]);

        let summary = harness
            .validator
            .tracker()
            .query_usage(image, &SubresourceRange::new(vk::ImageAspectFlags::COLOR, 0, 1, 0, 2))
            .unwrap();
        assert_eq!(summary.uniform_layout(), Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
    }

    #[test]
    fn test_transition_into_undefined_is_invalid() {
        let harness = Harness::new();
        let command_buffer = harness.recording();
        let image = mipped_image(&harness);

        let transition = barrier(image, vk::ImageLayout::GENERAL, vk::ImageLayout::UNDEFINED, 0);
        let report = harness.call(Call::CmdPipelineBarrier {
            command_buffer,
            image_barriers: &[transition],
            buffer_barriers: &[],
        });
        assert_eq!(report.codes(), [FindingCode::LayoutInvalid]);
    }

    #[test]
    fn test_barrier_range_out_of_bounds() {
        let harness = Harness::new();
        let command_buffer = harness.recording();
        let image = mipped_image(&harness);

        let transition = barrier(image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL, 3);
        let report = harness.call(Call::CmdPipelineBarrier {
            command_buffer,
            image_barriers: &[transition],
            buffer_barriers: &[],
        });
        assert_eq!(report.codes(), [FindingCode::MipLevelOutOfRange]);
    }

    #[test]
    fn test_buffer_barrier_bounds() {
        let harness = Harness::new();
        let command_buffer = harness.recording();
        let buffer = harness.buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);

        let report = harness.call(Call::CmdPipelineBarrier {
            command_buffer,
            image_barriers: &[],
            buffer_barriers: &[
                BufferBarrier { buffer, offset: 0, size: vk::WHOLE_SIZE },
                BufferBarrier { buffer, offset: 32, size: 32 },
                BufferBarrier { buffer, offset: 32, size: 64 },
                BufferBarrier { buffer, offset: 64, size: vk::WHOLE_SIZE },
                BufferBarrier { buffer, offset: 0, size: 0 },
            ],
        });
        assert_eq!(
            report.codes(),
            [
                FindingCode::BufferRangeOutOfBounds,
                FindingCode::BufferRangeOutOfBounds,
                FindingCode::ZeroSize
            ]
        );
    }

    #[test]
    fn test_barrier_outside_recording_changes_nothing() {
        let harness = Harness::new();
        let pool = harness.pool(true);
        let command_buffer = harness.allocate(pool, crate::command::CommandBufferLevel::Primary);
        let image = mipped_image(&harness);

        let transition = barrier(image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL, 0);
        let report = harness.call(Call::CmdPipelineBarrier {
            command_buffer,
            image_barriers: &[transition],
            buffer_barriers: &[],
        });
        assert_eq!(report.codes(), [FindingCode::NotRecording]);

        let summary = harness
            .validator
            .tracker()
            .query_usage(image, &SubresourceRange::whole(vk::ImageAspectFlags::COLOR))
            .unwrap();
        assert_eq!(summary.uniform_layout(), Some(vk::ImageLayout::UNDEFINED));
    }
}
