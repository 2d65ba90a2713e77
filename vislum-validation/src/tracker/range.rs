use std::ops::Range;

use ash::vk;

use super::TrackerError;

/// The "all remaining mip levels / array layers" count.
pub const REMAINING: u32 = vk::REMAINING_MIP_LEVELS;

const _: () = assert!(vk::REMAINING_MIP_LEVELS == vk::REMAINING_ARRAY_LAYERS);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    MipLevels,
    ArrayLayers,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Axis::MipLevels => "mip level",
            Axis::ArrayLayers => "array layer",
        })
    }
}

/// One addressable (array layer, mip level) slice of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subresource {
    pub layer: u32,
    pub mip: u32,
}

/// A subresource range as the application passed it; counts may be [`REMAINING`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    pub aspect_mask: vk::ImageAspectFlags,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

impl SubresourceRange {
    pub const fn new(
        aspect_mask: vk::ImageAspectFlags,
        base_mip_level: u32,
        level_count: u32,
        base_array_layer: u32,
        layer_count: u32,
    ) -> Self {
        Self {
            aspect_mask,
            base_mip_level,
            level_count,
            base_array_layer,
            layer_count,
        }
    }

    /// Every mip level and array layer.
    pub const fn whole(aspect_mask: vk::ImageAspectFlags) -> Self {
        Self::new(aspect_mask, 0, REMAINING, 0, REMAINING)
    }

    pub const fn from_vk(range: vk::ImageSubresourceRange) -> Self {
        Self::new(
            range.aspect_mask,
            range.base_mip_level,
            range.level_count,
            range.base_array_layer,
            range.layer_count,
        )
    }

    pub const fn to_vk(self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect_mask,
            base_mip_level: self.base_mip_level,
            level_count: self.level_count,
            base_array_layer: self.base_array_layer,
            layer_count: self.layer_count,
        }
    }

    /// The single-mip range a copy region's subresource layers address.
    pub const fn from_layers(layers: vk::ImageSubresourceLayers) -> Self {
        Self::new(
            layers.aspect_mask,
            layers.mip_level,
            1,
            layers.base_array_layer,
            layers.layer_count,
        )
    }

    #[inline]
    pub const fn has_sentinel(&self) -> bool {
        self.level_count == REMAINING || self.layer_count == REMAINING
    }

    pub fn resolve_mips(&self, mip_levels: u32) -> Result<Range<u32>, TrackerError> {
        resolve_axis(Axis::MipLevels, self.base_mip_level, self.level_count, mip_levels)
    }

    pub fn resolve_layers(&self, array_layers: u32) -> Result<Range<u32>, TrackerError> {
        resolve_axis(Axis::ArrayLayers, self.base_array_layer, self.layer_count, array_layers)
    }

    /// Resolves sentinel counts against the image's true extent.
    ///
    /// Zero counts and ranges running past the image are errors, never clamped.
    pub fn resolve(
        &self,
        mip_levels: u32,
        array_layers: u32,
    ) -> Result<ResolvedRange, TrackerError> {
        let mips = self.resolve_mips(mip_levels)?;
        let layers = self.resolve_layers(array_layers)?;

        Ok(ResolvedRange {
            base_mip: mips.start,
            level_count: mips.end - mips.start,
            base_layer: layers.start,
            layer_count: layers.end - layers.start,
        })
    }
}

impl From<vk::ImageSubresourceRange> for SubresourceRange {
    fn from(range: vk::ImageSubresourceRange) -> Self {
        Self::from_vk(range)
    }
}

fn resolve_axis(axis: Axis, base: u32, count: u32, limit: u32) -> Result<Range<u32>, TrackerError> {
    if count == REMAINING {
        if base >= limit {
            return Err(TrackerError::OutOfBounds {
                axis,
                base,
                end: base as u64 + 1,
                limit,
            });
        }

        return Ok(base..limit);
    }

    if count == 0 {
        return Err(TrackerError::ZeroCount(axis));
    }

    let end = base as u64 + count as u64;
    if end > limit as u64 {
        return Err(TrackerError::OutOfBounds { axis, base, end, limit });
    }

    Ok(base..end as u32)
}

/// A range whose counts are concrete and within the image's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedRange {
    base_mip: u32,
    level_count: u32,
    base_layer: u32,
    layer_count: u32,
}

impl ResolvedRange {
    #[inline]
    pub fn mips(&self) -> Range<u32> {
        self.base_mip..self.base_mip + self.level_count
    }

    #[inline]
    pub fn layers(&self) -> Range<u32> {
        self.base_layer..self.base_layer + self.layer_count
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.level_count as usize * self.layer_count as usize
    }

    /// Covered subresources, layer-major and mip-minor.
    pub fn iter(&self) -> impl Iterator<Item = Subresource> + use<> {
        let mips = self.mips();
        self.layers()
            .flat_map(move |layer| mips.clone().map(move |mip| Subresource { layer, mip }))
    }

    /// The equivalent application range with explicit counts.
    pub fn to_range(&self, aspect_mask: vk::ImageAspectFlags) -> SubresourceRange {
        SubresourceRange::new(
            aspect_mask,
            self.base_mip,
            self.level_count,
            self.base_layer,
            self.layer_count,
        )
    }
}
