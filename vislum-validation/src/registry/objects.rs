use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard, PoisonError, RwLock},
};

use ash::vk;

use crate::{
    command::{BindPoint, CommandBufferLevel, CommandBufferState, DynamicState, DynamicStateMask},
    extent::Extent3D,
    format::FormatInfo,
    handle::Handle,
    tracker::SubresourceRange,
};

/// Image creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCreateInfo {
    pub flags: vk::ImageCreateFlags,
    pub image_type: vk::ImageType,
    pub format: vk::Format,
    pub extent: Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub initial_layout: vk::ImageLayout,
}

impl Default for ImageCreateInfo {
    fn default() -> Self {
        Self {
            flags: vk::ImageCreateFlags::empty(),
            image_type: vk::ImageType::TYPE_2D,
            format: vk::Format::R8G8B8A8_UNORM,
            extent: Extent3D::new(1, 1, 1),
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::empty(),
            initial_layout: vk::ImageLayout::UNDEFINED,
        }
    }
}

impl From<&vk::ImageCreateInfo<'_>> for ImageCreateInfo {
    fn from(info: &vk::ImageCreateInfo<'_>) -> Self {
        Self {
            flags: info.flags,
            image_type: info.image_type,
            format: info.format,
            extent: Extent3D::from_vk(info.extent),
            mip_levels: info.mip_levels,
            array_layers: info.array_layers,
            samples: info.samples,
            tiling: info.tiling,
            usage: info.usage,
            initial_layout: info.initial_layout,
        }
    }
}

#[derive(Debug)]
pub struct Image {
    info: ImageCreateInfo,
    format: Option<FormatInfo>,
}

impl Image {
    pub fn new(info: ImageCreateInfo) -> Self {
        let format = FormatInfo::of(info.format);
        if format.is_none() {
            log::debug!("image format {:?} has no format table entry", info.format);
        }

        Self { info, format }
    }

    #[inline]
    pub fn info(&self) -> &ImageCreateInfo {
        &self.info
    }

    /// The format description, if the format is known.
    #[inline]
    pub fn format(&self) -> Option<&FormatInfo> {
        self.format.as_ref()
    }

    #[inline]
    pub fn is_3d(&self) -> bool {
        self.info.image_type == vk::ImageType::TYPE_3D
    }

    /// Every aspect of the image's format.
    pub fn aspects(&self) -> vk::ImageAspectFlags {
        self.format
            .as_ref()
            .map_or(vk::ImageAspectFlags::COLOR, |format| format.aspects())
    }

    /// Whether `mask` is a non-empty subset of the image's aspects.
    pub fn accepts_aspects(&self, mask: vk::ImageAspectFlags) -> bool {
        match &self.format {
            Some(format) => format.accepts_aspects(mask),
            None => mask == vk::ImageAspectFlags::COLOR,
        }
    }

    /// The extent of a mip level, or `None` past the last level.
    pub fn extent_at(&self, mip_level: u32) -> Option<Extent3D> {
        (mip_level < self.info.mip_levels).then(|| self.info.extent.mip_level(mip_level))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCreateInfo {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

#[derive(Debug)]
pub struct Buffer {
    info: BufferCreateInfo,
}

impl Buffer {
    pub fn new(info: BufferCreateInfo) -> Self {
        Self { info }
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.info.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.info.usage
    }
}

/// Command pool creation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandPoolCreateInfo {
    pub queue_family_index: u32,
    /// Whether command buffers are short-lived.
    pub transient: bool,
    /// Whether command buffers may be reset individually.
    pub reset_command_buffer: bool,
}

impl CommandPoolCreateInfo {
    pub fn from_vk(info: &vk::CommandPoolCreateInfo<'_>) -> Self {
        Self {
            queue_family_index: info.queue_family_index,
            transient: info.flags.contains(vk::CommandPoolCreateFlags::TRANSIENT),
            reset_command_buffer: info
                .flags
                .contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
        }
    }
}

#[derive(Debug)]
pub struct CommandPool {
    info: CommandPoolCreateInfo,
    buffers: Mutex<HashSet<Handle>>,
}

impl CommandPool {
    pub fn new(info: CommandPoolCreateInfo) -> Self {
        Self {
            info,
            buffers: Mutex::new(HashSet::new()),
        }
    }

    #[inline]
    pub fn info(&self) -> &CommandPoolCreateInfo {
        &self.info
    }

    /// Whether buffers of this pool may be reset individually.
    #[inline]
    pub fn permits_reset(&self) -> bool {
        self.info.reset_command_buffer
    }

    pub(crate) fn insert(&self, command_buffer: Handle) {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(command_buffer);
    }

    pub(crate) fn remove(&self, command_buffer: Handle) -> bool {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&command_buffer)
    }

    /// Whether a buffer is currently allocated from this pool.
    pub fn contains(&self, command_buffer: Handle) -> bool {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&command_buffer)
    }

    /// The buffers currently allocated from this pool, sorted by handle.
    pub fn buffers(&self) -> Vec<Handle> {
        let mut buffers: Vec<_> = self
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();
        buffers.sort_unstable();
        buffers
    }
}

#[derive(Debug)]
pub struct CommandBuffer {
    pool: Handle,
    level: CommandBufferLevel,
    state: Mutex<CommandBufferState>,
}

impl CommandBuffer {
    pub fn new(pool: Handle, level: CommandBufferLevel) -> Self {
        Self {
            pool,
            level,
            state: Mutex::new(CommandBufferState::default()),
        }
    }

    /// The pool the buffer was allocated from.
    #[inline]
    pub fn pool(&self) -> Handle {
        self.pool
    }

    #[inline]
    pub fn level(&self) -> CommandBufferLevel {
        self.level
    }

    /// Locks the recording state.
    ///
    /// When several buffers are locked at once, they must be locked in
    /// ascending handle order.
    pub fn lock(&self) -> MutexGuard<'_, CommandBufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineCreateInfo {
    pub bind_point: BindPoint,
    /// The render pass a graphics pipeline is compatible with.
    pub render_pass: Handle,
    pub subpass: u32,
    pub dynamic_states: Vec<vk::DynamicState>,
}

impl Default for PipelineCreateInfo {
    fn default() -> Self {
        Self {
            bind_point: BindPoint::Graphics,
            render_pass: Handle::NULL,
            subpass: 0,
            dynamic_states: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Pipeline {
    bind_point: BindPoint,
    render_pass: Handle,
    subpass: u32,
    dynamic_states: DynamicStateMask,
}

impl Pipeline {
    pub fn new(info: &PipelineCreateInfo) -> Self {
        let mut dynamic_states = DynamicStateMask::empty();
        for &state in &info.dynamic_states {
            match DynamicState::from_vk(state) {
                Some(state) => dynamic_states |= state.mask(),
                None => log::debug!("ignoring untracked dynamic state {state:?}"),
            }
        }

        Self {
            bind_point: info.bind_point,
            render_pass: info.render_pass,
            subpass: info.subpass,
            dynamic_states,
        }
    }

    #[inline]
    pub fn bind_point(&self) -> BindPoint {
        self.bind_point
    }

    #[inline]
    pub fn render_pass(&self) -> Handle {
        self.render_pass
    }

    #[inline]
    pub fn subpass(&self) -> u32 {
        self.subpass
    }

    /// The state categories the pipeline leaves to command buffer recording.
    #[inline]
    pub fn dynamic_states(&self) -> DynamicStateMask {
        self.dynamic_states
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderPassCreateInfo {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub subpass_count: u32,
}

#[derive(Debug)]
pub struct RenderPass {
    attachments: Vec<vk::AttachmentDescription>,
    subpass_count: u32,
}

impl RenderPass {
    pub fn new(info: RenderPassCreateInfo) -> Self {
        Self {
            attachments: info.attachments,
            subpass_count: info.subpass_count,
        }
    }

    #[inline]
    pub fn attachments(&self) -> &[vk::AttachmentDescription] {
        &self.attachments
    }

    #[inline]
    pub fn subpass_count(&self) -> u32 {
        self.subpass_count
    }

    /// Render passes are compatible when their attachments agree in format
    /// and sample count and they have the same number of subpasses.
    pub fn is_compatible(&self, other: &RenderPass) -> bool {
        self.subpass_count == other.subpass_count
            && self.attachments.len() == other.attachments.len()
            && self
                .attachments
                .iter()
                .zip(&other.attachments)
                .all(|(a, b)| a.format == b.format && a.samples == b.samples)
    }
}

/// One framebuffer attachment: the image and the subresources its view covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferAttachment {
    pub image: Handle,
    pub range: SubresourceRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FramebufferCreateInfo {
    pub render_pass: Handle,
    pub attachments: Vec<FramebufferAttachment>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

#[derive(Debug)]
pub struct Framebuffer {
    info: FramebufferCreateInfo,
}

impl Framebuffer {
    pub fn new(info: FramebufferCreateInfo) -> Self {
        Self { info }
    }

    #[inline]
    pub fn render_pass(&self) -> Handle {
        self.info.render_pass
    }

    #[inline]
    pub fn attachments(&self) -> &[FramebufferAttachment] {
        &self.info.attachments
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.info.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.info.height
    }

    #[inline]
    pub fn layers(&self) -> u32 {
        self.info.layers
    }
}

/// An image written into a descriptor set binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorImage {
    pub binding: u32,
    pub image: Handle,
    pub range: SubresourceRange,
    /// The layout the image is expected to be in when accessed.
    pub layout: vk::ImageLayout,
}

#[derive(Debug, Default)]
pub struct DescriptorSet {
    images: RwLock<Vec<DescriptorImage>>,
}

impl DescriptorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies writes, replacing earlier writes to the same binding.
    pub fn write(&self, writes: &[DescriptorImage]) {
        let mut images = self.images.write().unwrap_or_else(PoisonError::into_inner);
        for write in writes {
            images.retain(|image| image.binding != write.binding);
            images.push(*write);
        }
        images.sort_by_key(|image| image.binding);
    }

    pub fn images(&self) -> Vec<DescriptorImage> {
        self.images
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncKind {
    Fence,
    Semaphore,
    Event,
}

#[derive(Debug)]
pub struct SyncPrimitive {
    kind: SyncKind,
}

impl SyncPrimitive {
    pub fn new(kind: SyncKind) -> Self {
        Self { kind }
    }

    #[inline]
    pub fn kind(&self) -> SyncKind {
        self.kind
    }
}
