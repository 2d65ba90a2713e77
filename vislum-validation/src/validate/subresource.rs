use ash::vk;

use crate::{
    finding::{FindingCode, FindingCollector},
    handle::{Handle, ObjectKey},
    registry::{Buffer, Image},
    tracker::{Axis, REMAINING, ResolvedRange, SubresourceRange, TrackerError, Usage},
};

use super::{Target, Validator};

pub(super) const TRANSFER_SRC_LAYOUTS: &[vk::ImageLayout] =
    &[vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::GENERAL];

pub(super) const TRANSFER_DST_LAYOUTS: &[vk::ImageLayout] =
    &[vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::GENERAL];

pub(super) fn tracker_code(error: &TrackerError) -> FindingCode {
    match error {
        TrackerError::UnresolvedSentinel(_) => FindingCode::UnresolvedSentinel,
        TrackerError::ZeroCount(_) => FindingCode::ZeroCount,
        TrackerError::OutOfBounds { axis: Axis::MipLevels, .. } => FindingCode::MipLevelOutOfRange,
        TrackerError::OutOfBounds { axis: Axis::ArrayLayers, .. } => {
            FindingCode::LayerRangeOutOfBounds
        }
        TrackerError::UntrackedImage(_) => FindingCode::UnknownHandle,
    }
}

#[inline]
pub(super) fn is_zero(extent: vk::Extent3D) -> bool {
    extent.width == 0 || extent.height == 0 || extent.depth == 0
}

impl Validator {
    pub(super) fn check_image_usage(
        &self,
        key: ObjectKey,
        image: &Image,
        usage: vk::ImageUsageFlags,
        out: &mut FindingCollector,
    ) {
        if !image.info().usage.contains(usage) {
            out.push(
                FindingCode::UsageFlagMissing,
                &[key],
                format!("{key} was not created with {usage:?} usage"),
            );
        }
    }

    pub(super) fn check_buffer_usage(
        &self,
        key: ObjectKey,
        buffer: &Buffer,
        usage: vk::BufferUsageFlags,
        out: &mut FindingCollector,
    ) {
        if !buffer.usage().contains(usage) {
            out.push(
                FindingCode::UsageFlagMissing,
                &[key],
                format!("{key} was not created with {usage:?} usage"),
            );
        }
    }

    pub(super) fn check_aspects(
        &self,
        key: ObjectKey,
        image: &Image,
        mask: vk::ImageAspectFlags,
        out: &mut FindingCollector,
    ) -> bool {
        if image.accepts_aspects(mask) {
            return true;
        }

        out.push(
            FindingCode::AspectMaskInvalid,
            &[key],
            format!(
                "aspect mask {mask:?} is not a non-empty subset of {:?} for {key}",
                image.aspects()
            ),
        );
        false
    }

    /// Resolves a subresource range against an image, reporting every violated axis.
    ///
    /// `REMAINING` counts are allowed here.
    pub(super) fn check_range(
        &self,
        key: ObjectKey,
        image: &Image,
        range: &SubresourceRange,
        out: &mut FindingCollector,
    ) -> Option<ResolvedRange> {
        let aspects = self.check_aspects(key, image, range.aspect_mask, out);

        let info = image.info();
        let mips = range.resolve_mips(info.mip_levels);
        let layers = range.resolve_layers(info.array_layers);
        for error in [mips.as_ref().err(), layers.as_ref().err()].into_iter().flatten() {
            out.push(tracker_code(error), &[key], format!("{key}: {error}"));
        }

        if !aspects || mips.is_err() || layers.is_err() {
            return None;
        }

        range.resolve(info.mip_levels, info.array_layers).ok()
    }

    /// Checks the subresource layers of a transfer region.
    ///
    /// Regions must name explicit layer counts. Returns the addressed range
    /// when it is usable for tracking.
    pub(super) fn check_layers(
        &self,
        key: ObjectKey,
        image: &Image,
        layers: &vk::ImageSubresourceLayers,
        out: &mut FindingCollector,
    ) -> Option<SubresourceRange> {
        let mut valid = self.check_aspects(key, image, layers.aspect_mask, out);
        let info = image.info();

        if layers.mip_level >= info.mip_levels {
            out.push(
                FindingCode::MipLevelOutOfRange,
                &[key],
                format!(
                    "mip level {} of {key} is past its {} levels",
                    layers.mip_level, info.mip_levels
                ),
            );
            valid = false;
        }

        if layers.layer_count == REMAINING {
            out.push(
                FindingCode::UnresolvedSentinel,
                &[key],
                format!("region of {key} uses REMAINING as its layer count"),
            );
            return None;
        }

        if layers.layer_count == 0 {
            out.push(FindingCode::ZeroCount, &[key], format!("region of {key} has zero layers"));
            return None;
        }

        let end = layers.base_array_layer as u64 + layers.layer_count as u64;
        if end > info.array_layers as u64 {
            out.push(
                FindingCode::LayerRangeOutOfBounds,
                &[key],
                format!(
                    "layers {}..{end} of {key} exceed its {} layers",
                    layers.base_array_layer, info.array_layers
                ),
            );
            valid = false;
        }

        if image.is_3d() && (layers.base_array_layer != 0 || layers.layer_count != 1) {
            out.push(
                FindingCode::DimensionalityMismatch,
                &[key],
                format!("3D image {key} must be addressed with base layer 0 and one layer"),
            );
            valid = false;
        }

        valid.then(|| SubresourceRange::from_layers(*layers))
    }

    /// Checks that a region lies inside a mip level and honors the texel block grid.
    pub(super) fn check_region_box(
        &self,
        key: ObjectKey,
        image: &Image,
        mip_level: u32,
        offset: vk::Offset3D,
        extent: vk::Extent3D,
        out: &mut FindingCollector,
    ) {
        let Some(level) = image.extent_at(mip_level) else {
            return;
        };

        if !level.contains_box(offset, extent) {
            out.push(
                FindingCode::RegionOutOfBounds,
                &[key],
                format!(
                    "region at {offset:?} sized {extent:?} exceeds mip {mip_level} of {key} \
                     ({}x{}x{})",
                    level.width, level.height, level.depth
                ),
            );
        }

        let Some(format) = image.format().filter(|format| format.is_compressed()) else {
            return;
        };

        let block = format.block_extent;
        let aligned = |offset: i32, len: u32, edge: u32, block: u32| {
            let reaches_edge = offset as i64 + len as i64 == edge as i64;
            offset.rem_euclid(block as i32) == 0 && (len % block == 0 || reaches_edge)
        };

        if !(aligned(offset.x, extent.width, level.width, block.width)
            && aligned(offset.y, extent.height, level.height, block.height)
            && aligned(offset.z, extent.depth, level.depth, block.depth))
        {
            out.push(
                FindingCode::BlockMisaligned,
                &[key],
                format!(
                    "region at {offset:?} sized {extent:?} of {key} is not aligned to {}x{} blocks",
                    block.width, block.height
                ),
            );
        }
    }

    pub(super) fn check_layout_allowed(
        &self,
        key: ObjectKey,
        layout: vk::ImageLayout,
        allowed: &[vk::ImageLayout],
        out: &mut FindingCollector,
    ) {
        if !allowed.contains(&layout) {
            out.push(
                FindingCode::LayoutInvalid,
                &[key],
                format!("{key} cannot be used in {layout:?} here, expected one of {allowed:?}"),
            );
        }
    }

    /// Checks that the tracked layouts of a range agree with the layout a call declares.
    pub(super) fn check_tracked_layout(
        &self,
        image: Handle,
        range: &SubresourceRange,
        declared: vk::ImageLayout,
        out: &mut FindingCollector,
    ) {
        let key = ObjectKey::image(image);
        let Ok(summary) = self.tracker.query_usage(image, range) else {
            return;
        };

        match summary.uniform_layout() {
            Some(layout) if layout == declared => {}
            Some(layout) => out.push(
                FindingCode::LayoutMismatch,
                &[key],
                format!("{key} is in {layout:?} but is used as {declared:?}"),
            ),
            None => out.push(
                FindingCode::LayoutInconsistent,
                &[key],
                format!("subresources of {key} used as {declared:?} are in different layouts"),
            ),
        }
    }

    /// Warns when any subresource of a range is read before it was written.
    pub(super) fn check_initialized(
        &self,
        image: Handle,
        range: &SubresourceRange,
        out: &mut FindingCollector,
    ) {
        let key = ObjectKey::image(image);
        let Ok(summary) = self.tracker.query_usage(image, range) else {
            return;
        };

        let mut uninitialized = summary.uninitialized();
        if let Some(first) = uninitialized.next() {
            let count = 1 + uninitialized.count();
            out.push(
                FindingCode::UninitializedRead,
                &[key],
                format!(
                    "{key} is read with {count} uninitialized subresources \
                     (first: layer {}, mip {})",
                    first.layer, first.mip
                ),
            );
        }
    }

    /// Records a usage when the target is recording.
    pub(super) fn record(
        &self,
        target: &Target,
        image: Handle,
        range: &SubresourceRange,
        usage: Usage,
        layout: vk::ImageLayout,
        out: &mut FindingCollector,
    ) {
        if !target.is_recording() {
            return;
        }

        if let Err(e) = self.tracker.record_usage(image, range, usage, layout, target.handle) {
            let key = ObjectKey::image(image);
            out.push(tracker_code(&e), &[key], format!("{key}: {e}"));
        }
    }

    /// Records a layout change when the target is recording.
    pub(super) fn record_layout(
        &self,
        target: &Target,
        image: Handle,
        range: &SubresourceRange,
        layout: vk::ImageLayout,
        out: &mut FindingCollector,
    ) {
        if !target.is_recording() {
            return;
        }

        if let Err(e) = self.tracker.record_layout(image, range, layout, target.handle) {
            let key = ObjectKey::image(image);
            out.push(tracker_code(&e), &[key], format!("{key}: {e}"));
        }
    }
}
