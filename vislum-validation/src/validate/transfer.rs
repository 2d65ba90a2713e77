//! Copy, blit, resolve and clear commands.

use std::ops::Range;

use ash::vk;

use crate::{
    finding::{FindingCode, FindingCollector},
    format::FormatInfo,
    handle::{Handle, ObjectKey},
    registry::{Buffer, CommandBuffer, Image},
    tracker::{SubresourceRange, Usage},
};

use super::{
    Target, Validator,
    subresource::{TRANSFER_DST_LAYOUTS, TRANSFER_SRC_LAYOUTS, is_zero},
};

/// Which way a buffer-image copy moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BufferImageDirection {
    BufferToImage,
    ImageToBuffer,
}

/// One image of an image-to-image transfer.
#[derive(Clone, Copy)]
struct Side<'a> {
    handle: Handle,
    image: &'a Image,
    layout: vk::ImageLayout,
}

impl Side<'_> {
    #[inline]
    fn key(&self) -> ObjectKey {
        ObjectKey::image(self.handle)
    }
}

fn span(offset: i32, len: u32) -> Range<i64> {
    offset as i64..offset as i64 + len as i64
}

fn intersects<T: Ord>(a: &Range<T>, b: &Range<T>) -> bool {
    a.start < b.end && b.start < a.end
}

fn boxes_intersect(
    a: vk::Offset3D,
    a_extent: vk::Extent3D,
    b: vk::Offset3D,
    b_extent: vk::Extent3D,
) -> bool {
    intersects(&span(a.x, a_extent.width), &span(b.x, b_extent.width))
        && intersects(&span(a.y, a_extent.height), &span(b.y, b_extent.height))
        && intersects(&span(a.z, a_extent.depth), &span(b.z, b_extent.depth))
}

/// A region of an image: the subresources it addresses and its texel box.
type RegionBox<'a> = (&'a vk::ImageSubresourceLayers, vk::Offset3D, vk::Extent3D);

/// Whether two regions of the same image touch the same texels.
fn regions_overlap(a: RegionBox<'_>, b: RegionBox<'_>) -> bool {
    let ((a, a_offset, a_extent), (b, b_offset, b_extent)) = (a, b);
    let layers = |layers: &vk::ImageSubresourceLayers| {
        layers.base_array_layer as u64..layers.base_array_layer as u64 + layers.layer_count as u64
    };

    a.mip_level == b.mip_level
        && intersects(&layers(a), &layers(b))
        && boxes_intersect(a_offset, a_extent, b_offset, b_extent)
}

/// The destination extent of a copy whose extent is given in source texels.
fn destination_extent(
    src: Option<&FormatInfo>,
    dst: Option<&FormatInfo>,
    extent: vk::Extent3D,
) -> vk::Extent3D {
    match (src, dst) {
        (Some(src), Some(dst)) if src.block_extent != dst.block_extent => vk::Extent3D {
            width: extent.width.div_ceil(src.block_extent.width) * dst.block_extent.width,
            height: extent.height.div_ceil(src.block_extent.height) * dst.block_extent.height,
            depth: extent.depth,
        },
        _ => extent,
    }
}

/// The normalized box a pair of blit corners spans.
fn blit_box(offsets: [vk::Offset3D; 2]) -> (vk::Offset3D, vk::Extent3D) {
    let [a, b] = offsets;
    let min = vk::Offset3D {
        x: a.x.min(b.x),
        y: a.y.min(b.y),
        z: a.z.min(b.z),
    };
    let extent = vk::Extent3D {
        width: a.x.abs_diff(b.x),
        height: a.y.abs_diff(b.y),
        depth: a.z.abs_diff(b.z),
    };
    (min, extent)
}

/// Bytes a buffer-image region touches past its buffer offset.
fn buffer_footprint(format: &FormatInfo, region: &vk::BufferImageCopy, layers: u32) -> u64 {
    let block = format.block_extent;
    let extent = region.image_extent;
    let row_texels = match region.buffer_row_length {
        0 => extent.width,
        length => length,
    };
    let height_texels = match region.buffer_image_height {
        0 => extent.height,
        height => height,
    };

    let blocks_per_row = row_texels.div_ceil(block.width) as u64;
    let rows_per_slice = height_texels.div_ceil(block.height) as u64;
    let width_blocks = extent.width.div_ceil(block.width) as u64;
    let height_blocks = extent.height.div_ceil(block.height) as u64;
    let slices = extent.depth as u64 * layers as u64;

    let blocks = (slices - 1)
        .saturating_mul(rows_per_slice)
        .saturating_mul(blocks_per_row)
        .saturating_add((height_blocks - 1) * blocks_per_row)
        .saturating_add(width_blocks);
    blocks.saturating_mul(format.copy_block_size(region.image_subresource.aspect_mask) as u64)
}

impl Validator {
    /// Checks and records a read of an image range by a transfer.
    fn read_range(
        &self,
        target: &Target,
        side: Side,
        range: &SubresourceRange,
        usage: Usage,
        out: &mut FindingCollector,
    ) {
        self.check_tracked_layout(side.handle, range, side.layout, out);
        self.check_initialized(side.handle, range, out);
        self.record(target, side.handle, range, usage, side.layout, out);
    }

    /// Checks and records a write of an image range by a transfer.
    fn write_range(
        &self,
        target: &Target,
        side: Side,
        range: &SubresourceRange,
        usage: Usage,
        out: &mut FindingCollector,
    ) {
        self.check_tracked_layout(side.handle, range, side.layout, out);
        self.record(target, side.handle, range, usage, side.layout, out);
    }

    /// Checks the usage flags and declared layouts of whichever images of a transfer resolved.
    fn transfer_sides<'a>(
        &self,
        src: (Handle, vk::ImageLayout, Option<&'a Image>),
        dst: (Handle, vk::ImageLayout, Option<&'a Image>),
        check_usage: bool,
        out: &mut FindingCollector,
    ) -> (Option<Side<'a>>, Option<Side<'a>>) {
        let src = src.2.map(|image| Side { handle: src.0, layout: src.1, image });
        let dst = dst.2.map(|image| Side { handle: dst.0, layout: dst.1, image });

        if check_usage {
            if let Some(src) = src {
                let usage = vk::ImageUsageFlags::TRANSFER_SRC;
                self.check_image_usage(src.key(), src.image, usage, out);
            }
            if let Some(dst) = dst {
                let usage = vk::ImageUsageFlags::TRANSFER_DST;
                self.check_image_usage(dst.key(), dst.image, usage, out);
            }
        }
        if let Some(src) = src {
            self.check_layout_allowed(src.key(), src.layout, TRANSFER_SRC_LAYOUTS, out);
        }
        if let Some(dst) = dst {
            self.check_layout_allowed(dst.key(), dst.layout, TRANSFER_DST_LAYOUTS, out);
        }
        (src, dst)
    }

    fn check_copy_dimensions(
        &self,
        index: usize,
        src: Side,
        dst: Side,
        region: &vk::ImageCopy,
        out: &mut FindingCollector,
    ) -> bool {
        let src_layers = region.src_subresource.layer_count;
        let dst_layers = region.dst_subresource.layer_count;
        let depth = region.extent.depth;

        let problem = match (src.image.is_3d(), dst.image.is_3d()) {
            (false, false) if depth != 1 => {
                format!("region {index} copies {depth} slices between 2D images")
            }
            (false, false) if src_layers != dst_layers => {
                format!("region {index} copies {src_layers} layers into {dst_layers} layers")
            }
            (false, true) if src_layers != depth => {
                format!("region {index} copies {src_layers} layers into {depth} slices")
            }
            (true, false) if dst_layers != depth => {
                format!("region {index} copies {depth} slices into {dst_layers} layers")
            }
            _ => return true,
        };

        out.push(FindingCode::DimensionalityMismatch, &[src.key(), dst.key()], problem);
        false
    }

    /// The region rules shared by copies and resolves.
    ///
    /// A side that did not resolve is skipped; rules relating both sides
    /// need both.
    #[allow(clippy::too_many_arguments)]
    fn check_image_regions(
        &self,
        target: &Target,
        keys: [ObjectKey; 2],
        src: Option<Side>,
        dst: Option<Side>,
        regions: &[vk::ImageCopy],
        (reads, writes): (Usage, Usage),
        out: &mut FindingCollector,
    ) {
        if regions.is_empty() {
            out.push(FindingCode::ZeroCount, &keys, "no regions given");
            return;
        }

        for (index, region) in regions.iter().enumerate() {
            if is_zero(region.extent) {
                out.push(
                    FindingCode::ZeroExtent,
                    &keys,
                    format!("region {index} has an empty extent {:?}", region.extent),
                );
                continue;
            }

            let matched = match (src, dst) {
                (Some(src), Some(dst)) => self.check_copy_dimensions(index, src, dst, region, out),
                _ => true,
            };
            if !matched {
                continue;
            }

            let (src_layers, dst_layers) = (&region.src_subresource, &region.dst_subresource);
            let src_range =
                src.and_then(|src| self.check_layers(src.key(), src.image, src_layers, out));
            let dst_range =
                dst.and_then(|dst| self.check_layers(dst.key(), dst.image, dst_layers, out));

            let dst_extent = destination_extent(
                src.and_then(|src| src.image.format()),
                dst.and_then(|dst| dst.image.format()),
                region.extent,
            );
            if let Some(src) = src {
                self.check_region_box(
                    src.key(),
                    src.image,
                    region.src_subresource.mip_level,
                    region.src_offset,
                    region.extent,
                    out,
                );
            }
            if let Some(dst) = dst {
                self.check_region_box(
                    dst.key(),
                    dst.image,
                    region.dst_subresource.mip_level,
                    region.dst_offset,
                    dst_extent,
                    out,
                );
            }

            let same_image = src.zip(dst).is_some_and(|(src, dst)| src.handle == dst.handle);
            let src_box = (src_layers, region.src_offset, region.extent);
            let dst_box = (dst_layers, region.dst_offset, dst_extent);
            if same_image && regions_overlap(src_box, dst_box) {
                out.push(
                    FindingCode::RegionOverlap,
                    &[keys[0]],
                    format!("region {index} reads and writes the same texels of {}", keys[0]),
                );
            }

            if let (Some(src), Some(range)) = (src, src_range) {
                self.read_range(target, src, &range, reads, out);
            }
            if let (Some(dst), Some(range)) = (dst, dst_range) {
                self.write_range(target, dst, &range, writes, out);
            }
        }
    }

    /// Adds reference edges for the images of a transfer that resolved.
    fn reference_sides(&self, target: &mut Target, sides: [Option<Side>; 2]) {
        for side in sides.into_iter().flatten() {
            self.reference(target, side.key());
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn copy_image(
        &self,
        command_buffer: Handle,
        src: Handle,
        src_layout: vk::ImageLayout,
        dst: Handle,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);
        self.check_outside_render_pass(&target, out);

        let src_image = self.resolve::<Image>(src, out);
        let dst_image = self.resolve::<Image>(dst, out);
        let keys = [ObjectKey::image(src), ObjectKey::image(dst)];
        let (src_side, dst_side) = self.transfer_sides(
            (src, src_layout, src_image.as_deref()),
            (dst, dst_layout, dst_image.as_deref()),
            true,
            out,
        );

        if let (Some(src_image), Some(dst_image)) = (&src_image, &dst_image) {
            let (src_samples, dst_samples) = (src_image.info().samples, dst_image.info().samples);
            if src_samples != dst_samples {
                out.push(
                    FindingCode::SampleCountMismatch,
                    &keys,
                    format!("copy from {src_samples:?} samples to {dst_samples:?} samples"),
                );
            }

            if let (Some(src_format), Some(dst_format)) = (src_image.format(), dst_image.format()) {
                if !src_format.is_size_compatible(dst_format) {
                    out.push(
                        FindingCode::FormatIncompatible,
                        &keys,
                        format!("cannot copy {:?} into {:?}", src_format.format, dst_format.format),
                    );
                }
            }
        }

        self.check_image_regions(
            &target,
            keys,
            src_side,
            dst_side,
            regions,
            (Usage::CopyRead, Usage::CopyWrite),
            out,
        );
        self.reference_sides(&mut target, [src_side, dst_side]);
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn resolve_image(
        &self,
        command_buffer: Handle,
        src: Handle,
        src_layout: vk::ImageLayout,
        dst: Handle,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageResolve],
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);
        self.check_outside_render_pass(&target, out);

        let src_image = self.resolve::<Image>(src, out);
        let dst_image = self.resolve::<Image>(dst, out);
        let keys = [ObjectKey::image(src), ObjectKey::image(dst)];
        let (src_side, dst_side) = self.transfer_sides(
            (src, src_layout, src_image.as_deref()),
            (dst, dst_layout, dst_image.as_deref()),
            false,
            out,
        );

        if let Some(src_image) = &src_image {
            if src_image.info().samples == vk::SampleCountFlags::TYPE_1 {
                out.push(
                    FindingCode::SampleCountMismatch,
                    &keys,
                    format!("resolve source {} is single-sampled", keys[0]),
                );
            }
        }
        if let Some(dst_image) = &dst_image {
            if dst_image.info().samples != vk::SampleCountFlags::TYPE_1 {
                out.push(
                    FindingCode::SampleCountMismatch,
                    &keys,
                    format!("resolve destination {} is multisampled", keys[1]),
                );
            }
        }

        if let (Some(src_image), Some(dst_image)) = (&src_image, &dst_image) {
            let (src_format, dst_format) = (src_image.info().format, dst_image.info().format);
            if src_format != dst_format {
                out.push(
                    FindingCode::FormatIncompatible,
                    &keys,
                    format!("resolve from {src_format:?} into {dst_format:?}"),
                );
            }
        }
        if let Some(src_image) = &src_image {
            if src_image.format().is_some_and(FormatInfo::is_depth_or_stencil) {
                out.push(
                    FindingCode::FormatClassMismatch,
                    &keys,
                    format!("cannot resolve depth/stencil format {:?}", src_image.info().format),
                );
            }
        }

        let regions: Vec<_> = regions
            .iter()
            .map(|region| vk::ImageCopy {
                src_subresource: region.src_subresource,
                src_offset: region.src_offset,
                dst_subresource: region.dst_subresource,
                dst_offset: region.dst_offset,
                extent: region.extent,
            })
            .collect();

        self.check_image_regions(
            &target,
            keys,
            src_side,
            dst_side,
            &regions,
            (Usage::ResolveRead, Usage::ResolveWrite),
            out,
        );
        self.reference_sides(&mut target, [src_side, dst_side]);
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn blit_image(
        &self,
        command_buffer: Handle,
        src: Handle,
        src_layout: vk::ImageLayout,
        dst: Handle,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);
        self.check_outside_render_pass(&target, out);

        let src_image = self.resolve::<Image>(src, out);
        let dst_image = self.resolve::<Image>(dst, out);
        let keys = [ObjectKey::image(src), ObjectKey::image(dst)];
        let (src_side, dst_side) = self.transfer_sides(
            (src, src_layout, src_image.as_deref()),
            (dst, dst_layout, dst_image.as_deref()),
            true,
            out,
        );

        for side in [src_side, dst_side].into_iter().flatten() {
            if side.image.info().samples != vk::SampleCountFlags::TYPE_1 {
                out.push(
                    FindingCode::SampleCountMismatch,
                    &[side.key()],
                    format!("{} is multisampled and cannot be blitted", side.key()),
                );
            }
        }

        let formats = (
            src_side.and_then(|side| side.image.format()),
            dst_side.and_then(|side| side.image.format()),
        );
        if let (Some(src_format), Some(dst_format)) = formats {
            self.check_blit_formats(keys, src_format, dst_format, filter, out);
        }

        if regions.is_empty() {
            out.push(FindingCode::ZeroCount, &keys, "no regions given");
        }

        for (index, region) in regions.iter().enumerate() {
            let (src_offset, src_extent) = blit_box(region.src_offsets);
            let (dst_offset, dst_extent) = blit_box(region.dst_offsets);

            if is_zero(src_extent) || is_zero(dst_extent) {
                out.push(
                    FindingCode::ZeroExtent,
                    &keys,
                    format!("region {index} blits {src_extent:?} into {dst_extent:?}"),
                );
                continue;
            }

            let mut flat = true;
            let boxes = [(src_side, src_offset, src_extent), (dst_side, dst_offset, dst_extent)];
            for (side, offset, extent) in boxes {
                let Some(side) = side.filter(|side| !side.image.is_3d()) else {
                    continue;
                };
                if offset.z != 0 || extent.depth != 1 {
                    let end = offset.z as i64 + extent.depth as i64;
                    out.push(
                        FindingCode::DimensionalityMismatch,
                        &[side.key()],
                        format!(
                            "region {index} spans z {}..{end} of 2D image {}",
                            offset.z,
                            side.key()
                        ),
                    );
                    flat = false;
                }
            }
            if !flat {
                continue;
            }

            let (src_layers, dst_layers) = (&region.src_subresource, &region.dst_subresource);
            let both_2d = src_side
                .zip(dst_side)
                .is_some_and(|(src, dst)| !src.image.is_3d() && !dst.image.is_3d());
            if both_2d && src_layers.layer_count != dst_layers.layer_count {
                out.push(
                    FindingCode::DimensionalityMismatch,
                    &keys,
                    format!(
                        "region {index} blits {} layers into {} layers",
                        src_layers.layer_count, dst_layers.layer_count
                    ),
                );
                continue;
            }

            let src_range =
                src_side.and_then(|side| self.check_layers(keys[0], side.image, src_layers, out));
            let dst_range =
                dst_side.and_then(|side| self.check_layers(keys[1], side.image, dst_layers, out));
            if let Some(side) = src_side {
                let mip = src_layers.mip_level;
                self.check_region_box(keys[0], side.image, mip, src_offset, src_extent, out);
            }
            if let Some(side) = dst_side {
                let mip = dst_layers.mip_level;
                self.check_region_box(keys[1], side.image, mip, dst_offset, dst_extent, out);
            }

            let same_image = src_side.is_some() && src == dst;
            let src_box = (src_layers, src_offset, src_extent);
            let dst_box = (dst_layers, dst_offset, dst_extent);
            if same_image && regions_overlap(src_box, dst_box) {
                out.push(
                    FindingCode::RegionOverlap,
                    &[keys[0]],
                    format!("region {index} reads and writes the same texels of {}", keys[0]),
                );
            }

            if let (Some(side), Some(range)) = (src_side, src_range) {
                self.read_range(&target, side, &range, Usage::BlitRead, out);
            }
            if let (Some(side), Some(range)) = (dst_side, dst_range) {
                self.write_range(&target, side, &range, Usage::BlitWrite, out);
            }
        }

        self.reference_sides(&mut target, [src_side, dst_side]);
    }

    fn check_blit_formats(
        &self,
        keys: [ObjectKey; 2],
        src: &FormatInfo,
        dst: &FormatInfo,
        filter: vk::Filter,
        out: &mut FindingCollector,
    ) {
        if src.is_depth_or_stencil() || dst.is_depth_or_stencil() {
            if src.format != dst.format {
                out.push(
                    FindingCode::FormatIncompatible,
                    &keys,
                    format!("depth/stencil blit from {:?} into {:?}", src.format, dst.format),
                );
            }
            if filter != vk::Filter::NEAREST {
                out.push(
                    FindingCode::FilterUnsupported,
                    &keys,
                    format!("depth/stencil blits must use NEAREST, not {filter:?}"),
                );
            }
            return;
        }

        if src.is_integer() != dst.is_integer() || (src.is_integer() && src.class != dst.class) {
            out.push(
                FindingCode::FormatClassMismatch,
                &keys,
                format!("blit from {:?} into {:?} mixes numeric classes", src.format, dst.format),
            );
        }

        if src.is_integer() && filter != vk::Filter::NEAREST {
            out.push(
                FindingCode::FilterUnsupported,
                &keys,
                format!("integer format {:?} cannot be blitted with {filter:?}", src.format),
            );
        }
    }

    pub(super) fn copy_buffer(
        &self,
        command_buffer: Handle,
        src: Handle,
        dst: Handle,
        regions: &[vk::BufferCopy],
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);
        self.check_outside_render_pass(&target, out);

        let src_buffer = self.resolve::<Buffer>(src, out);
        let dst_buffer = self.resolve::<Buffer>(dst, out);

        let keys = [ObjectKey::buffer(src), ObjectKey::buffer(dst)];
        if let Some(buffer) = &src_buffer {
            self.check_buffer_usage(keys[0], buffer, vk::BufferUsageFlags::TRANSFER_SRC, out);
        }
        if let Some(buffer) = &dst_buffer {
            self.check_buffer_usage(keys[1], buffer, vk::BufferUsageFlags::TRANSFER_DST, out);
        }

        if regions.is_empty() {
            out.push(FindingCode::ZeroCount, &keys, "no regions given");
        }

        for (index, region) in regions.iter().enumerate() {
            if region.size == 0 {
                out.push(FindingCode::ZeroSize, &keys, format!("region {index} copies zero bytes"));
                continue;
            }

            let sides = [
                (keys[0], src_buffer.as_deref(), region.src_offset),
                (keys[1], dst_buffer.as_deref(), region.dst_offset),
            ];
            for (key, buffer, offset) in sides {
                let Some(buffer) = buffer else {
                    continue;
                };
                if offset.checked_add(region.size).is_none_or(|end| end > buffer.size()) {
                    out.push(
                        FindingCode::BufferRangeOutOfBounds,
                        &[key],
                        format!(
                            "region {index} covers {offset}+{} of {key}, which holds {} bytes",
                            region.size,
                            buffer.size()
                        ),
                    );
                }
            }

            let src_span = region.src_offset..region.src_offset.saturating_add(region.size);
            let dst_span = region.dst_offset..region.dst_offset.saturating_add(region.size);
            if src_buffer.is_some() && src == dst && intersects(&src_span, &dst_span) {
                out.push(
                    FindingCode::RegionOverlap,
                    &[keys[0]],
                    format!("region {index} reads and writes the same bytes of {}", keys[0]),
                );
            }
        }

        if src_buffer.is_some() {
            self.reference(&mut target, keys[0]);
        }
        if dst_buffer.is_some() {
            self.reference(&mut target, keys[1]);
        }
    }

    /// Checks a buffer-image copy in either direction.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn copy_buffer_image(
        &self,
        command_buffer: Handle,
        direction: BufferImageDirection,
        buffer: Handle,
        image: Handle,
        layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);
        self.check_outside_render_pass(&target, out);

        let buffer_object = self.resolve::<Buffer>(buffer, out);
        let image_object = self.resolve::<Image>(image, out);

        let buffer_key = ObjectKey::buffer(buffer);
        let image_key = ObjectKey::image(image);
        let keys = [buffer_key, image_key];
        let side =
            image_object.as_deref().map(|object| Side { handle: image, image: object, layout });

        let (buffer_usage, image_usage, layouts) = match direction {
            BufferImageDirection::BufferToImage => (
                vk::BufferUsageFlags::TRANSFER_SRC,
                vk::ImageUsageFlags::TRANSFER_DST,
                TRANSFER_DST_LAYOUTS,
            ),
            BufferImageDirection::ImageToBuffer => (
                vk::BufferUsageFlags::TRANSFER_DST,
                vk::ImageUsageFlags::TRANSFER_SRC,
                TRANSFER_SRC_LAYOUTS,
            ),
        };
        if let Some(object) = &buffer_object {
            self.check_buffer_usage(buffer_key, object, buffer_usage, out);
        }
        if let Some(side) = side {
            self.check_image_usage(image_key, side.image, image_usage, out);
            self.check_layout_allowed(image_key, layout, layouts, out);
        }

        if regions.is_empty() {
            out.push(FindingCode::ZeroCount, &keys, "no regions given");
        }

        for (index, region) in regions.iter().enumerate() {
            let extent = region.image_extent;
            if is_zero(extent) {
                out.push(
                    FindingCode::ZeroExtent,
                    &keys,
                    format!("region {index} has an empty extent {extent:?}"),
                );
                continue;
            }

            let layers = &region.image_subresource;
            if layers.aspect_mask.as_raw().count_ones() != 1 {
                out.push(
                    FindingCode::AspectMaskInvalid,
                    &[image_key],
                    format!(
                        "region {index} must name exactly one aspect, not {:?}",
                        layers.aspect_mask
                    ),
                );
                continue;
            }

            if buffer_object.is_some() {
                self.check_buffer_rows(index, buffer_key, region, out);
            }

            let Some(side) = side else {
                continue;
            };

            if !side.image.is_3d() && (region.image_offset.z != 0 || extent.depth != 1) {
                out.push(
                    FindingCode::DimensionalityMismatch,
                    &[image_key],
                    format!(
                        "region {index} spans z {}..{} of 2D image {image_key}",
                        region.image_offset.z,
                        region.image_offset.z as i64 + extent.depth as i64
                    ),
                );
                continue;
            }

            let range = self.check_layers(image_key, side.image, layers, out);
            let (mip, offset) = (layers.mip_level, region.image_offset);
            self.check_region_box(image_key, side.image, mip, offset, extent, out);

            if let Some(format) = side.image.format() {
                let alignment = format.buffer_offset_alignment(layers.aspect_mask);
                if region.buffer_offset % alignment != 0 {
                    out.push(
                        FindingCode::OffsetMisaligned,
                        &[buffer_key],
                        format!(
                            "region {index} buffer offset {} is not a multiple of {alignment}",
                            region.buffer_offset
                        ),
                    );
                }

                if let (Some(range), Some(object)) = (&range, &buffer_object) {
                    let footprint = buffer_footprint(format, region, range.layer_count);
                    let end = region.buffer_offset.saturating_add(footprint);
                    if end > object.size() {
                        out.push(
                            FindingCode::BufferRangeOutOfBounds,
                            &[buffer_key],
                            format!(
                                "region {index} touches bytes {}..{end} of {buffer_key}, \
                                 which holds {} bytes",
                                region.buffer_offset,
                                object.size()
                            ),
                        );
                    }
                }
            }

            if let Some(range) = range {
                match direction {
                    BufferImageDirection::BufferToImage => {
                        self.write_range(&target, side, &range, Usage::CopyWrite, out)
                    }
                    BufferImageDirection::ImageToBuffer => {
                        self.read_range(&target, side, &range, Usage::CopyRead, out)
                    }
                }
            }
        }

        if buffer_object.is_some() {
            self.reference(&mut target, buffer_key);
        }
        if side.is_some() {
            self.reference(&mut target, image_key);
        }
    }

    /// Checks the row length and image height a buffer-image region lays its texels out with.
    fn check_buffer_rows(
        &self,
        index: usize,
        buffer_key: ObjectKey,
        region: &vk::BufferImageCopy,
        out: &mut FindingCollector,
    ) {
        let extent = region.image_extent;
        if region.buffer_row_length != 0 && region.buffer_row_length < extent.width {
            out.push(
                FindingCode::RowLengthTooSmall,
                &[buffer_key],
                format!(
                    "region {index} row length {} is below its width {}",
                    region.buffer_row_length, extent.width
                ),
            );
        }
        if region.buffer_image_height != 0 && region.buffer_image_height < extent.height {
            out.push(
                FindingCode::RowLengthTooSmall,
                &[buffer_key],
                format!(
                    "region {index} image height {} is below its height {}",
                    region.buffer_image_height, extent.height
                ),
            );
        }
    }

    /// Checks a color or depth/stencil clear.
    pub(super) fn clear_image(
        &self,
        command_buffer: Handle,
        image: Handle,
        layout: vk::ImageLayout,
        ranges: &[vk::ImageSubresourceRange],
        depth_stencil: bool,
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);
        self.check_outside_render_pass(&target, out);

        let Some(object) = self.resolve::<Image>(image, out) else {
            return;
        };

        let key = ObjectKey::image(image);
        self.check_image_usage(key, &object, vk::ImageUsageFlags::TRANSFER_DST, out);
        self.check_layout_allowed(key, layout, TRANSFER_DST_LAYOUTS, out);

        if let Some(format) = object.format() {
            if depth_stencil && format.is_color() {
                out.push(
                    FindingCode::FormatClassMismatch,
                    &[key],
                    format!("depth/stencil clear of color format {:?}", format.format),
                );
            } else if !depth_stencil && format.is_depth_or_stencil() {
                out.push(
                    FindingCode::FormatClassMismatch,
                    &[key],
                    format!("color clear of depth/stencil format {:?}", format.format),
                );
            } else if !depth_stencil && format.is_compressed() {
                out.push(
                    FindingCode::FormatIncompatible,
                    &[key],
                    format!("color clear of compressed format {:?}", format.format),
                );
            }
        }

        if ranges.is_empty() {
            out.push(FindingCode::ZeroCount, &[key], "no ranges given");
        }

        for range in ranges {
            let range = SubresourceRange::from_vk(*range);
            if self.check_range(key, &object, &range, out).is_none() {
                continue;
            }

            self.check_tracked_layout(image, &range, layout, out);
            self.record(&target, image, &range, Usage::Cleared, layout, out);
        }

        self.reference(&mut target, key);
    }
}
