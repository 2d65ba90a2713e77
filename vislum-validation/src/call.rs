use ash::vk;

use crate::{
    command::{DynamicState, InheritanceInfo},
    handle::Handle,
    registry::{
        BufferCreateInfo, CommandPoolCreateInfo, DescriptorImage, FramebufferCreateInfo,
        ImageCreateInfo, PipelineCreateInfo, RenderPassCreateInfo, SyncKind,
    },
    settings::RuleCategory,
};

/// An image memory barrier.
#[derive(Debug, Clone, Copy)]
pub struct ImageBarrier {
    pub image: Handle,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub range: vk::ImageSubresourceRange,
}

/// A buffer memory barrier.
#[derive(Debug, Clone, Copy)]
pub struct BufferBarrier {
    pub buffer: Handle,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

/// One intercepted API call with borrowed arguments.
///
/// Creation calls carry the handle the driver returned; the object is only
/// registered by [`Validator::post_call`] once the call succeeded.
///
/// [`Validator::post_call`]: crate::Validator::post_call
#[derive(Debug, Clone, Copy)]
pub enum Call<'a> {
    CreateImage { image: Handle, info: &'a ImageCreateInfo },
    DestroyImage { image: Handle },
    CreateBuffer { buffer: Handle, info: &'a BufferCreateInfo },
    DestroyBuffer { buffer: Handle },
    CreateCommandPool { pool: Handle, info: &'a CommandPoolCreateInfo },
    DestroyCommandPool { pool: Handle },
    ResetCommandPool { pool: Handle },
    AllocateCommandBuffers {
        pool: Handle,
        level: vk::CommandBufferLevel,
        command_buffers: &'a [Handle],
    },
    FreeCommandBuffers { pool: Handle, command_buffers: &'a [Handle] },
    CreatePipeline { pipeline: Handle, info: &'a PipelineCreateInfo },
    DestroyPipeline { pipeline: Handle },
    CreateRenderPass { render_pass: Handle, info: &'a RenderPassCreateInfo },
    DestroyRenderPass { render_pass: Handle },
    CreateFramebuffer { framebuffer: Handle, info: &'a FramebufferCreateInfo },
    DestroyFramebuffer { framebuffer: Handle },
    AllocateDescriptorSets { descriptor_sets: &'a [Handle] },
    FreeDescriptorSets { descriptor_sets: &'a [Handle] },
    UpdateDescriptorSets { descriptor_set: Handle, writes: &'a [DescriptorImage] },
    CreateSyncPrimitive { handle: Handle, kind: SyncKind },
    DestroySyncPrimitive { handle: Handle },

    BeginCommandBuffer {
        command_buffer: Handle,
        usage: vk::CommandBufferUsageFlags,
        inheritance: Option<InheritanceInfo>,
    },
    EndCommandBuffer { command_buffer: Handle },
    ResetCommandBuffer { command_buffer: Handle },
    QueueSubmit { queue: Handle, command_buffers: &'a [Handle] },
    QueueWaitIdle { queue: Handle },
    DeviceWaitIdle,

    CmdCopyImage {
        command_buffer: Handle,
        src: Handle,
        src_layout: vk::ImageLayout,
        dst: Handle,
        dst_layout: vk::ImageLayout,
        regions: &'a [vk::ImageCopy],
    },
    CmdCopyBuffer {
        command_buffer: Handle,
        src: Handle,
        dst: Handle,
        regions: &'a [vk::BufferCopy],
    },
    CmdCopyBufferToImage {
        command_buffer: Handle,
        src: Handle,
        dst: Handle,
        dst_layout: vk::ImageLayout,
        regions: &'a [vk::BufferImageCopy],
    },
    CmdCopyImageToBuffer {
        command_buffer: Handle,
        src: Handle,
        src_layout: vk::ImageLayout,
        dst: Handle,
        regions: &'a [vk::BufferImageCopy],
    },
    CmdClearColorImage {
        command_buffer: Handle,
        image: Handle,
        layout: vk::ImageLayout,
        ranges: &'a [vk::ImageSubresourceRange],
    },
    CmdClearDepthStencilImage {
        command_buffer: Handle,
        image: Handle,
        layout: vk::ImageLayout,
        ranges: &'a [vk::ImageSubresourceRange],
    },
    CmdBlitImage {
        command_buffer: Handle,
        src: Handle,
        src_layout: vk::ImageLayout,
        dst: Handle,
        dst_layout: vk::ImageLayout,
        regions: &'a [vk::ImageBlit],
        filter: vk::Filter,
    },
    CmdResolveImage {
        command_buffer: Handle,
        src: Handle,
        src_layout: vk::ImageLayout,
        dst: Handle,
        dst_layout: vk::ImageLayout,
        regions: &'a [vk::ImageResolve],
    },

    CmdPipelineBarrier {
        command_buffer: Handle,
        image_barriers: &'a [ImageBarrier],
        buffer_barriers: &'a [BufferBarrier],
    },

    CmdBindPipeline { command_buffer: Handle, bind_point: vk::PipelineBindPoint, pipeline: Handle },
    CmdBindDescriptorSets {
        command_buffer: Handle,
        bind_point: vk::PipelineBindPoint,
        first_set: u32,
        descriptor_sets: &'a [Handle],
    },
    /// Buffers and their offsets, starting at `first_binding`.
    CmdBindVertexBuffers {
        command_buffer: Handle,
        first_binding: u32,
        buffers: &'a [(Handle, vk::DeviceSize)],
    },
    CmdBindIndexBuffer {
        command_buffer: Handle,
        buffer: Handle,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    },
    CmdSetDynamicState { command_buffer: Handle, state: DynamicState },

    CmdDraw { command_buffer: Handle, vertex_count: u32, instance_count: u32 },
    CmdDrawIndexed { command_buffer: Handle, index_count: u32, instance_count: u32 },
    CmdDispatch { command_buffer: Handle, group_count: [u32; 3] },

    CmdBeginRenderPass {
        command_buffer: Handle,
        render_pass: Handle,
        framebuffer: Handle,
        render_area: vk::Rect2D,
        contents: vk::SubpassContents,
    },
    CmdNextSubpass { command_buffer: Handle, contents: vk::SubpassContents },
    CmdEndRenderPass { command_buffer: Handle },
    CmdExecuteCommands { command_buffer: Handle, secondaries: &'a [Handle] },
}

impl Call<'_> {
    /// The entry point name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Call::CreateImage { .. } => "vkCreateImage",
            Call::DestroyImage { .. } => "vkDestroyImage",
            Call::CreateBuffer { .. } => "vkCreateBuffer",
            Call::DestroyBuffer { .. } => "vkDestroyBuffer",
            Call::CreateCommandPool { .. } => "vkCreateCommandPool",
            Call::DestroyCommandPool { .. } => "vkDestroyCommandPool",
            Call::ResetCommandPool { .. } => "vkResetCommandPool",
            Call::AllocateCommandBuffers { .. } => "vkAllocateCommandBuffers",
            Call::FreeCommandBuffers { .. } => "vkFreeCommandBuffers",
            Call::CreatePipeline { .. } => "vkCreatePipeline",
            Call::DestroyPipeline { .. } => "vkDestroyPipeline",
            Call::CreateRenderPass { .. } => "vkCreateRenderPass",
            Call::DestroyRenderPass { .. } => "vkDestroyRenderPass",
            Call::CreateFramebuffer { .. } => "vkCreateFramebuffer",
            Call::DestroyFramebuffer { .. } => "vkDestroyFramebuffer",
            Call::AllocateDescriptorSets { .. } => "vkAllocateDescriptorSets",
            Call::FreeDescriptorSets { .. } => "vkFreeDescriptorSets",
            Call::UpdateDescriptorSets { .. } => "vkUpdateDescriptorSets",
            Call::CreateSyncPrimitive { .. } => "vkCreateSyncPrimitive",
            Call::DestroySyncPrimitive { .. } => "vkDestroySyncPrimitive",
            Call::BeginCommandBuffer { .. } => "vkBeginCommandBuffer",
            Call::EndCommandBuffer { .. } => "vkEndCommandBuffer",
            Call::ResetCommandBuffer { .. } => "vkResetCommandBuffer",
            Call::QueueSubmit { .. } => "vkQueueSubmit",
            Call::QueueWaitIdle { .. } => "vkQueueWaitIdle",
            Call::DeviceWaitIdle => "vkDeviceWaitIdle",
            Call::CmdCopyImage { .. } => "vkCmdCopyImage",
            Call::CmdCopyBuffer { .. } => "vkCmdCopyBuffer",
            Call::CmdCopyBufferToImage { .. } => "vkCmdCopyBufferToImage",
            Call::CmdCopyImageToBuffer { .. } => "vkCmdCopyImageToBuffer",
            Call::CmdClearColorImage { .. } => "vkCmdClearColorImage",
            Call::CmdClearDepthStencilImage { .. } => "vkCmdClearDepthStencilImage",
            Call::CmdBlitImage { .. } => "vkCmdBlitImage",
            Call::CmdResolveImage { .. } => "vkCmdResolveImage",
            Call::CmdPipelineBarrier { .. } => "vkCmdPipelineBarrier",
            Call::CmdBindPipeline { .. } => "vkCmdBindPipeline",
            Call::CmdBindDescriptorSets { .. } => "vkCmdBindDescriptorSets",
            Call::CmdBindVertexBuffers { .. } => "vkCmdBindVertexBuffers",
            Call::CmdBindIndexBuffer { .. } => "vkCmdBindIndexBuffer",
            Call::CmdSetDynamicState { .. } => "vkCmdSet*",
            Call::CmdDraw { .. } => "vkCmdDraw",
            Call::CmdDrawIndexed { .. } => "vkCmdDrawIndexed",
            Call::CmdDispatch { .. } => "vkCmdDispatch",
            Call::CmdBeginRenderPass { .. } => "vkCmdBeginRenderPass",
            Call::CmdNextSubpass { .. } => "vkCmdNextSubpass",
            Call::CmdEndRenderPass { .. } => "vkCmdEndRenderPass",
            Call::CmdExecuteCommands { .. } => "vkCmdExecuteCommands",
        }
    }

    /// The rule family the call is validated under.
    pub fn category(&self) -> RuleCategory {
        match self {
            Call::CreateImage { .. }
            | Call::DestroyImage { .. }
            | Call::CreateBuffer { .. }
            | Call::DestroyBuffer { .. }
            | Call::CreateCommandPool { .. }
            | Call::DestroyCommandPool { .. }
            | Call::AllocateCommandBuffers { .. }
            | Call::FreeCommandBuffers { .. }
            | Call::CreatePipeline { .. }
            | Call::DestroyPipeline { .. }
            | Call::CreateRenderPass { .. }
            | Call::DestroyRenderPass { .. }
            | Call::CreateFramebuffer { .. }
            | Call::DestroyFramebuffer { .. }
            | Call::AllocateDescriptorSets { .. }
            | Call::FreeDescriptorSets { .. }
            | Call::UpdateDescriptorSets { .. }
            | Call::CreateSyncPrimitive { .. }
            | Call::DestroySyncPrimitive { .. } => RuleCategory::ObjectLifecycle,

            Call::ResetCommandPool { .. }
            | Call::BeginCommandBuffer { .. }
            | Call::EndCommandBuffer { .. }
            | Call::ResetCommandBuffer { .. } => RuleCategory::CommandBuffer,

            Call::QueueSubmit { .. } | Call::QueueWaitIdle { .. } | Call::DeviceWaitIdle => {
                RuleCategory::Submit
            }

            Call::CmdCopyImage { .. }
            | Call::CmdCopyBuffer { .. }
            | Call::CmdCopyBufferToImage { .. }
            | Call::CmdCopyImageToBuffer { .. }
            | Call::CmdClearColorImage { .. }
            | Call::CmdClearDepthStencilImage { .. }
            | Call::CmdBlitImage { .. }
            | Call::CmdResolveImage { .. } => RuleCategory::Transfer,

            Call::CmdPipelineBarrier { .. } => RuleCategory::Barrier,

            Call::CmdBindPipeline { .. }
            | Call::CmdBindDescriptorSets { .. }
            | Call::CmdBindVertexBuffers { .. }
            | Call::CmdBindIndexBuffer { .. }
            | Call::CmdSetDynamicState { .. } => RuleCategory::Bind,

            Call::CmdDraw { .. } | Call::CmdDrawIndexed { .. } | Call::CmdDispatch { .. } => {
                RuleCategory::Draw
            }

            Call::CmdBeginRenderPass { .. }
            | Call::CmdNextSubpass { .. }
            | Call::CmdEndRenderPass { .. } => RuleCategory::RenderPass,

            Call::CmdExecuteCommands { .. } => RuleCategory::Execute,
        }
    }
}
