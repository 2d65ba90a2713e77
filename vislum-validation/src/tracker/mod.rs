//! Per-subresource usage and layout tracking.
//!
//! Every tracked image owns a dense grid of [`SubresourceCell`]s indexed by
//! (array layer, mip level). Partial-resource operations are common (one mip
//! cleared while its siblings stay undefined), so state is never collapsed to
//! a per-image value.

mod range;

pub use range::{Axis, ResolvedRange, Subresource, SubresourceRange, REMAINING};

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use ash::vk;
use smallvec::SmallVec;
use thiserror::Error;

use crate::handle::Handle;

/// The last known way a subresource was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Usage {
    #[default]
    Undefined,
    Cleared,
    RenderPassCleared,
    RenderPassReadToTile,
    RenderPassStored,
    RenderPassDiscarded,
    BlitRead,
    BlitWrite,
    ResolveRead,
    ResolveWrite,
    CopyRead,
    CopyWrite,
    DescriptorAccess,
}

impl Usage {
    /// Whether the contents are defined after this usage.
    #[inline]
    pub const fn is_initialized(self) -> bool {
        !matches!(self, Usage::Undefined | Usage::RenderPassDiscarded)
    }
}

/// The tracked state of one (layer, mip) slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceCell {
    pub usage: Usage,
    pub layout: vk::ImageLayout,
    /// The command buffer whose recording produced this state.
    pub producer: Option<Handle>,
}

impl SubresourceCell {
    pub const fn initial(layout: vk::ImageLayout) -> Self {
        Self {
            usage: Usage::Undefined,
            layout,
            producer: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("unresolved REMAINING sentinel in {0} count")]
    UnresolvedSentinel(Axis),
    #[error("zero {0} count")]
    ZeroCount(Axis),
    #[error("{axis} {base}..{end} exceed the image's {limit}")]
    OutOfBounds {
        axis: Axis,
        base: u32,
        end: u64,
        limit: u32,
    },
    #[error("image {0:?} is not tracked")]
    UntrackedImage(Handle),
}

/// The dense (layer, mip) cell grid of one image.
#[derive(Debug, Clone)]
pub struct SubresourceGrid {
    mip_levels: u32,
    array_layers: u32,
    initial: SubresourceCell,
    cells: Vec<SubresourceCell>,
}

impl SubresourceGrid {
    pub fn new(mip_levels: u32, array_layers: u32, initial_layout: vk::ImageLayout) -> Self {
        let initial = SubresourceCell::initial(initial_layout);
        let count = mip_levels as usize * array_layers as usize;

        Self {
            mip_levels,
            array_layers,
            initial,
            cells: vec![initial; count],
        }
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    #[inline]
    fn index(&self, subresource: Subresource) -> usize {
        subresource.layer as usize * self.mip_levels as usize + subresource.mip as usize
    }

    pub fn cell(&self, subresource: Subresource) -> Option<&SubresourceCell> {
        if subresource.mip >= self.mip_levels || subresource.layer >= self.array_layers {
            return None;
        }

        self.cells.get(self.index(subresource))
    }

    /// Resolves a range against this grid's bounds.
    pub fn resolve(&self, range: &SubresourceRange) -> Result<ResolvedRange, TrackerError> {
        range.resolve(self.mip_levels, self.array_layers)
    }

    /// Applies `update` to every cell of an already-resolved range.
    ///
    /// A range still carrying the [`REMAINING`] sentinel is rejected: callers
    /// must resolve it against the image first.
    pub fn update_cells(
        &mut self,
        range: &SubresourceRange,
        mut update: impl FnMut(&mut SubresourceCell),
    ) -> Result<(), TrackerError> {
        if range.level_count == REMAINING {
            return Err(TrackerError::UnresolvedSentinel(Axis::MipLevels));
        }
        if range.layer_count == REMAINING {
            return Err(TrackerError::UnresolvedSentinel(Axis::ArrayLayers));
        }

        let resolved = self.resolve(range)?;
        for subresource in resolved.iter() {
            let index = self.index(subresource);
            update(&mut self.cells[index]);
        }

        Ok(())
    }

    fn summarize(&self, resolved: &ResolvedRange) -> UsageSummary {
        UsageSummary {
            cells: resolved
                .iter()
                .map(|subresource| (subresource, self.cells[self.index(subresource)]))
                .collect(),
        }
    }

    /// Reverts every cell produced by `command_buffer`. Returns the number of cells reverted.
    fn reset_producer(&mut self, command_buffer: Handle) -> usize {
        let initial = self.initial;
        let mut reverted = 0;
        for cell in self.cells.iter_mut().filter(|c| c.producer == Some(command_buffer)) {
            *cell = initial;
            reverted += 1;
        }

        reverted
    }
}

/// A read-only snapshot of the cells a range covers, in visit order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UsageSummary {
    cells: SmallVec<[(Subresource, SubresourceCell); 8]>,
}

impl UsageSummary {
    #[inline]
    pub fn cells(&self) -> &[(Subresource, SubresourceCell)] {
        &self.cells
    }

    /// The layout shared by every covered cell, if they agree.
    pub fn uniform_layout(&self) -> Option<vk::ImageLayout> {
        let (_, first) = self.cells.first()?;
        self.cells
            .iter()
            .all(|(_, cell)| cell.layout == first.layout)
            .then_some(first.layout)
    }

    #[inline]
    pub fn is_layout_consistent(&self) -> bool {
        self.cells.is_empty() || self.uniform_layout().is_some()
    }

    /// Cells whose contents were never written, or were discarded.
    pub fn uninitialized(&self) -> impl Iterator<Item = Subresource> + '_ {
        self.cells
            .iter()
            .filter(|(_, cell)| !cell.usage.is_initialized())
            .map(|(subresource, _)| *subresource)
    }

    pub fn is_fully_initialized(&self) -> bool {
        self.uninitialized().next().is_none()
    }

    /// Cells whose layout differs from `expected`.
    pub fn layout_mismatches(
        &self,
        expected: vk::ImageLayout,
    ) -> impl Iterator<Item = (Subresource, vk::ImageLayout)> + '_ {
        self.cells
            .iter()
            .filter(move |(_, cell)| cell.layout != expected)
            .map(|(subresource, cell)| (*subresource, cell.layout))
    }
}

/// Owns the subresource grids of every live image.
#[derive(Default)]
pub struct ResourceStateTracker {
    images: RwLock<HashMap<Handle, Arc<RwLock<SubresourceGrid>>>>,
}

static_assertions::assert_impl_all!(ResourceStateTracker: Send, Sync);

impl ResourceStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking an image. Replaces any grid left over from a recycled handle.
    pub fn track(
        &self,
        image: Handle,
        mip_levels: u32,
        array_layers: u32,
        initial_layout: vk::ImageLayout,
    ) {
        let grid = SubresourceGrid::new(mip_levels, array_layers, initial_layout);
        self.images
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(image, Arc::new(RwLock::new(grid)));
    }

    /// Stops tracking an image, dropping its grid.
    pub fn untrack(&self, image: Handle) -> bool {
        self.images
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&image)
            .is_some()
    }

    pub fn is_tracked(&self, image: Handle) -> bool {
        self.images
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&image)
    }

    fn grid(&self, image: Handle) -> Result<Arc<RwLock<SubresourceGrid>>, TrackerError> {
        self.images
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&image)
            .cloned()
            .ok_or(TrackerError::UntrackedImage(image))
    }

    /// Resolves `range` against the true extent of `image`.
    pub fn resolve(
        &self,
        image: Handle,
        range: &SubresourceRange,
    ) -> Result<ResolvedRange, TrackerError> {
        let grid = self.grid(image)?;
        let grid = grid.read().unwrap_or_else(PoisonError::into_inner);
        grid.resolve(range)
    }

    /// Visits every (layer, mip) pair `range` covers exactly once, layer-major.
    pub fn for_each_subresource(
        &self,
        image: Handle,
        range: &SubresourceRange,
        mut visit: impl FnMut(Subresource),
    ) -> Result<(), TrackerError> {
        let resolved = self.resolve(image, range)?;
        resolved.iter().for_each(|subresource| visit(subresource));
        Ok(())
    }

    /// Overwrites usage and layout of every covered cell.
    pub fn record_usage(
        &self,
        image: Handle,
        range: &SubresourceRange,
        usage: Usage,
        layout: vk::ImageLayout,
        command_buffer: Handle,
    ) -> Result<(), TrackerError> {
        self.update(image, range, |cell| {
            *cell = SubresourceCell {
                usage,
                layout,
                producer: Some(command_buffer),
            };
        })
    }

    /// Overwrites only the layout of every covered cell.
    pub fn record_layout(
        &self,
        image: Handle,
        range: &SubresourceRange,
        layout: vk::ImageLayout,
        command_buffer: Handle,
    ) -> Result<(), TrackerError> {
        self.update(image, range, |cell| {
            cell.layout = layout;
            cell.producer = Some(command_buffer);
        })
    }

    fn update(
        &self,
        image: Handle,
        range: &SubresourceRange,
        update: impl FnMut(&mut SubresourceCell),
    ) -> Result<(), TrackerError> {
        let grid = self.grid(image)?;
        let mut grid = grid.write().unwrap_or_else(PoisonError::into_inner);
        let resolved = grid.resolve(range)?;
        grid.update_cells(&resolved.to_range(range.aspect_mask), update)
    }

    /// Snapshots the covered cells.
    pub fn query_usage(
        &self,
        image: Handle,
        range: &SubresourceRange,
    ) -> Result<UsageSummary, TrackerError> {
        let grid = self.grid(image)?;
        let grid = grid.read().unwrap_or_else(PoisonError::into_inner);
        let resolved = grid.resolve(range)?;
        Ok(grid.summarize(&resolved))
    }

    /// Reverts the cells of `image` that `command_buffer` produced.
    pub fn reset_effects(&self, image: Handle, command_buffer: Handle) -> usize {
        let Ok(grid) = self.grid(image) else {
            return 0;
        };

        let reverted = grid
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .reset_producer(command_buffer);

        if reverted > 0 {
            log::trace!(
                "reverted {reverted} cells of image {image:?} produced by {command_buffer:?}"
            );
        }

        reverted
    }
}
