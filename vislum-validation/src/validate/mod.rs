//! The per-call rule evaluator.

mod barrier;
mod bind;
mod draw;
mod execute;
mod lifecycle;
mod render_pass;
mod subresource;
mod transfer;

use std::sync::{Arc, MutexGuard};

use ash::vk;

use crate::{
    call::Call,
    command::{CommandBufferMachine, CommandBufferState, Lifecycle},
    diagnostic::{DiagnosticSink, Diagnostics},
    finding::{Finding, FindingCode, FindingCollector},
    handle::{Handle, ObjectKey, ObjectType},
    registry::{
        Buffer, CommandBuffer, CommandPool, DescriptorSet, Framebuffer, Image, ObjectRegistry,
        Pipeline, RegistryError, RenderPass, SyncPrimitive, Tracked,
    },
    settings::RuleFilter,
    tracker::ResourceStateTracker,
};

/// The findings of one intercepted call.
#[derive(Debug, Clone, Default)]
pub struct Report {
    findings: Vec<Finding>,
    has_errors: bool,
}

impl Report {
    /// The findings, in the order they were produced.
    #[inline]
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Whether any finding has error severity.
    #[inline]
    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    #[inline]
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn codes(&self) -> Vec<FindingCode> {
        self.findings.iter().map(Finding::code).collect()
    }

    pub fn count(&self, code: FindingCode) -> usize {
        self.findings.iter().filter(|finding| finding.code() == code).count()
    }
}

/// Validates intercepted calls against tracked object state.
///
/// Shared across every thread that issues API calls. Calls on different
/// command buffers proceed in parallel.
pub struct Validator {
    registry: ObjectRegistry,
    tracker: ResourceStateTracker,
    machine: CommandBufferMachine,
    filter: Box<dyn RuleFilter>,
    diagnostics: Diagnostics,
}

static_assertions::assert_impl_all!(Validator: Send, Sync);

impl Validator {
    pub fn new(filter: impl RuleFilter + 'static, sink: impl DiagnosticSink + 'static) -> Self {
        Self {
            registry: ObjectRegistry::new(),
            tracker: ResourceStateTracker::new(),
            machine: CommandBufferMachine::new(),
            filter: Box::new(filter),
            diagnostics: Diagnostics::new(Box::new(sink)),
        }
    }

    #[inline]
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    #[inline]
    pub fn tracker(&self) -> &ResourceStateTracker {
        &self.tracker
    }

    #[inline]
    pub fn machine(&self) -> &CommandBufferMachine {
        &self.machine
    }

    /// The lifecycle state of a live command buffer.
    pub fn lifecycle(&self, command_buffer: Handle) -> Option<Lifecycle> {
        self.registry
            .lookup::<CommandBuffer>(command_buffer)
            .ok()
            .map(|command_buffer| command_buffer.lock().lifecycle)
    }

    /// Checks a call before it is forwarded to the driver.
    ///
    /// Recording commands and command buffer transitions take effect here;
    /// the call is always forwarded, whatever the report says.
    pub fn pre_call(&self, call: &Call) -> Report {
        if !self.filter.validation_enabled() {
            return Report::default();
        }

        log::trace!("pre-call {}", call.name());
        let mut collector = FindingCollector::new(call.category(), &*self.filter);
        let out = &mut collector;

        match *call {
            Call::CreateImage { info, .. } => self.check_image_create_info(info, out),
            Call::DestroyImage { image } => self.check_destroy::<Image>(image, out),
            Call::CreateBuffer { info, .. } => self.check_buffer_create_info(info, out),
            Call::DestroyBuffer { buffer } => self.check_destroy::<Buffer>(buffer, out),
            Call::CreateCommandPool { .. } => {}
            Call::DestroyCommandPool { pool } => self.check_destroy_command_pool(pool, out),
            Call::ResetCommandPool { pool } => self.reset_command_pool(pool, out),
            Call::AllocateCommandBuffers { pool, .. } => {
                self.resolve::<CommandPool>(pool, out);
            }
            Call::FreeCommandBuffers { pool, command_buffers } => {
                self.check_free_command_buffers(pool, command_buffers, out)
            }
            Call::CreatePipeline { info, .. } => self.check_pipeline_create_info(info, out),
            Call::DestroyPipeline { pipeline } => self.check_destroy::<Pipeline>(pipeline, out),
            Call::CreateRenderPass { info, .. } => self.check_render_pass_create_info(info, out),
            Call::DestroyRenderPass { render_pass } => {
                self.check_destroy::<RenderPass>(render_pass, out)
            }
            Call::CreateFramebuffer { info, .. } => self.check_framebuffer_create_info(info, out),
            Call::DestroyFramebuffer { framebuffer } => {
                self.check_destroy::<Framebuffer>(framebuffer, out)
            }
            Call::AllocateDescriptorSets { .. } => {}
            Call::FreeDescriptorSets { descriptor_sets } => {
                for &set in descriptor_sets {
                    self.check_destroy::<DescriptorSet>(set, out);
                }
            }
            Call::UpdateDescriptorSets { descriptor_set, writes } => {
                self.update_descriptor_set(descriptor_set, writes, out)
            }
            Call::CreateSyncPrimitive { .. } => {}
            Call::DestroySyncPrimitive { handle } => {
                self.check_destroy::<SyncPrimitive>(handle, out)
            }

            Call::BeginCommandBuffer { command_buffer, usage, inheritance } => {
                self.begin_command_buffer(command_buffer, usage, inheritance, out)
            }
            Call::EndCommandBuffer { command_buffer } => {
                self.end_command_buffer(command_buffer, out)
            }
            Call::ResetCommandBuffer { command_buffer } => {
                self.reset_command_buffer(command_buffer, out)
            }
            Call::QueueSubmit { queue, command_buffers } => {
                self.queue_submit(queue, command_buffers, out)
            }
            Call::QueueWaitIdle { queue } => {
                self.machine.complete(&self.registry, Some(queue));
            }
            Call::DeviceWaitIdle => {
                self.machine.complete(&self.registry, None);
            }

            Call::CmdCopyImage { command_buffer, src, src_layout, dst, dst_layout, regions } => {
                self.copy_image(command_buffer, src, src_layout, dst, dst_layout, regions, out)
            }
            Call::CmdCopyBuffer { command_buffer, src, dst, regions } => {
                self.copy_buffer(command_buffer, src, dst, regions, out)
            }
            Call::CmdCopyBufferToImage { command_buffer, src, dst, dst_layout, regions } => self
                .copy_buffer_image(
                    command_buffer,
                    transfer::BufferImageDirection::BufferToImage,
                    src,
                    dst,
                    dst_layout,
                    regions,
                    out,
                ),
            Call::CmdCopyImageToBuffer { command_buffer, src, src_layout, dst, regions } => self
                .copy_buffer_image(
                    command_buffer,
                    transfer::BufferImageDirection::ImageToBuffer,
                    dst,
                    src,
                    src_layout,
                    regions,
                    out,
                ),
            Call::CmdClearColorImage { command_buffer, image, layout, ranges } => {
                self.clear_image(command_buffer, image, layout, ranges, false, out)
            }
            Call::CmdClearDepthStencilImage { command_buffer, image, layout, ranges } => {
                self.clear_image(command_buffer, image, layout, ranges, true, out)
            }
            Call::CmdBlitImage {
                command_buffer,
                src,
                src_layout,
                dst,
                dst_layout,
                regions,
                filter,
            } => self.blit_image(
                command_buffer,
                src,
                src_layout,
                dst,
                dst_layout,
                regions,
                filter,
                out,
            ),
            Call::CmdResolveImage { command_buffer, src, src_layout, dst, dst_layout, regions } => {
                self.resolve_image(command_buffer, src, src_layout, dst, dst_layout, regions, out)
            }

            Call::CmdPipelineBarrier { command_buffer, image_barriers, buffer_barriers } => {
                self.pipeline_barrier(command_buffer, image_barriers, buffer_barriers, out)
            }

            Call::CmdBindPipeline { command_buffer, bind_point, pipeline } => {
                self.bind_pipeline(command_buffer, bind_point, pipeline, out)
            }
            Call::CmdBindDescriptorSets {
                command_buffer,
                bind_point,
                first_set,
                descriptor_sets,
            } => self.bind_descriptor_sets(
                command_buffer,
                bind_point,
                first_set,
                descriptor_sets,
                out,
            ),
            Call::CmdBindVertexBuffers { command_buffer, first_binding, buffers } => {
                self.bind_vertex_buffers(command_buffer, first_binding, buffers, out)
            }
            Call::CmdBindIndexBuffer { command_buffer, buffer, offset, index_type } => {
                self.bind_index_buffer(command_buffer, buffer, offset, index_type, out)
            }
            Call::CmdSetDynamicState { command_buffer, state } => {
                self.set_dynamic_state(command_buffer, state, out)
            }

            Call::CmdDraw { command_buffer, vertex_count, instance_count } => {
                let kind = draw::DrawKind::Vertices;
                self.draw(command_buffer, kind, vertex_count, instance_count, out)
            }
            Call::CmdDrawIndexed { command_buffer, index_count, instance_count } => {
                let kind = draw::DrawKind::Indexed;
                self.draw(command_buffer, kind, index_count, instance_count, out)
            }
            Call::CmdDispatch { command_buffer, group_count } => {
                self.dispatch(command_buffer, group_count, out)
            }

            Call::CmdBeginRenderPass {
                command_buffer,
                render_pass,
                framebuffer,
                render_area,
                contents,
            } => self.begin_render_pass(
                command_buffer,
                render_pass,
                framebuffer,
                render_area,
                contents,
                out,
            ),
            Call::CmdNextSubpass { command_buffer, contents } => {
                self.next_subpass(command_buffer, contents, out)
            }
            Call::CmdEndRenderPass { command_buffer } => self.end_render_pass(command_buffer, out),
            Call::CmdExecuteCommands { command_buffer, secondaries } => {
                self.execute_commands(command_buffer, secondaries, out)
            }
        }

        self.publish(collector)
    }

    /// Records the effect of a call the driver has returned from.
    ///
    /// Creations register their handle only when `result` is
    /// [`vk::Result::SUCCESS`]; destructions always take effect.
    pub fn post_call(&self, call: &Call, result: vk::Result) -> Report {
        if !self.filter.validation_enabled() {
            return Report::default();
        }

        log::trace!("post-call {} -> {result:?}", call.name());
        let mut out = FindingCollector::new(call.category(), &*self.filter);
        let succeeded = result == vk::Result::SUCCESS;

        match *call {
            Call::CreateImage { image, info } if succeeded => {
                self.register_image(image, info, &mut out)
            }
            Call::DestroyImage { image } => {
                if self.retire::<Image>(image).is_some() {
                    self.tracker.untrack(image);
                }
            }
            Call::CreateBuffer { buffer, info } if succeeded => {
                self.register(buffer, Buffer::new(*info), &mut out);
            }
            Call::DestroyBuffer { buffer } => {
                self.retire::<Buffer>(buffer);
            }
            Call::CreateCommandPool { pool, info } if succeeded => {
                self.register(pool, CommandPool::new(*info), &mut out);
            }
            Call::DestroyCommandPool { pool } => self.retire_command_pool(pool, &mut out),
            Call::AllocateCommandBuffers { pool, level, command_buffers } if succeeded => {
                self.register_command_buffers(pool, level, command_buffers, &mut out)
            }
            Call::FreeCommandBuffers { command_buffers, .. } => {
                for &command_buffer in command_buffers {
                    self.retire_command_buffer(command_buffer, &mut out);
                }
            }
            Call::CreatePipeline { pipeline, info } if succeeded => {
                self.register(pipeline, Pipeline::new(info), &mut out);
            }
            Call::DestroyPipeline { pipeline } => {
                self.retire::<Pipeline>(pipeline);
            }
            Call::CreateRenderPass { render_pass, info } if succeeded => {
                self.register(render_pass, RenderPass::new(info.clone()), &mut out);
            }
            Call::DestroyRenderPass { render_pass } => {
                self.retire::<RenderPass>(render_pass);
            }
            Call::CreateFramebuffer { framebuffer, info } if succeeded => {
                self.register(framebuffer, Framebuffer::new(info.clone()), &mut out);
            }
            Call::DestroyFramebuffer { framebuffer } => {
                self.retire::<Framebuffer>(framebuffer);
            }
            Call::AllocateDescriptorSets { descriptor_sets } if succeeded => {
                for &set in descriptor_sets {
                    self.register(set, DescriptorSet::new(), &mut out);
                }
            }
            Call::FreeDescriptorSets { descriptor_sets } => {
                for &set in descriptor_sets {
                    self.retire::<DescriptorSet>(set);
                }
            }
            Call::CreateSyncPrimitive { handle, kind } if succeeded => {
                self.register(handle, SyncPrimitive::new(kind), &mut out);
            }
            Call::DestroySyncPrimitive { handle } => {
                self.retire::<SyncPrimitive>(handle);
            }
            _ => {}
        }

        self.publish(out)
    }

    fn publish(&self, out: FindingCollector) -> Report {
        let findings = out.finish();
        let has_errors = self.diagnostics.publish(&findings);
        Report { findings, has_errors }
    }

    /// Resolves a handle, reporting unknown and destroyed handles.
    fn resolve<T: Tracked>(&self, handle: Handle, out: &mut FindingCollector) -> Option<Arc<T>> {
        match self.registry.lookup::<T>(handle) {
            Ok(object) => Some(object),
            Err(e) => {
                out.push(registry_code(&e), &[e.key()], e.to_string());
                None
            }
        }
    }

    /// Whether the pool that owns `command_buffer` allows resetting it individually.
    fn permits_reset(&self, command_buffer: &CommandBuffer) -> bool {
        self.registry
            .lookup::<CommandPool>(command_buffer.pool())
            .is_ok_and(|pool| pool.permits_reset())
    }

    /// Locks the command buffer a recording command targets and checks it is recording.
    ///
    /// An unresolved buffer still yields a target so the command's other
    /// arguments are checked; it just records nothing.
    fn target<'a>(
        &self,
        handle: Handle,
        command_buffer: Option<&'a CommandBuffer>,
        out: &mut FindingCollector,
    ) -> Target<'a> {
        self.locked_target(handle, command_buffer.map(CommandBuffer::lock), out)
    }

    /// [`Validator::target`] for a command buffer the caller already locked.
    fn locked_target<'a>(
        &self,
        handle: Handle,
        state: Option<MutexGuard<'a, CommandBufferState>>,
        out: &mut FindingCollector,
    ) -> Target<'a> {
        if let Some(state) = &state {
            if !state.is_recording() {
                let key = ObjectKey::command_buffer(handle);
                out.push(
                    FindingCode::NotRecording,
                    &[key],
                    format!("{key} is {:?}, not recording", state.lifecycle),
                );
            }
        }

        Target { handle, state }
    }

    fn check_outside_render_pass(&self, target: &Target, out: &mut FindingCollector) {
        let scope = target.state().and_then(CommandBufferState::render_pass_scope);
        let Some((render_pass, _)) = scope else {
            return;
        };

        let key = target.key();
        let render_pass = ObjectKey::new(ObjectType::RenderPass, render_pass);
        out.push(
            FindingCode::InsideRenderPass,
            &[key, render_pass],
            format!("command recorded into {key} inside {render_pass}"),
        );
    }

    /// Adds a reference edge when the target is recording.
    fn reference(&self, target: &mut Target, key: ObjectKey) {
        let handle = target.handle;
        if let Some(state) = target.recording_state() {
            self.machine.reference(handle, state, key);
        }
    }
}

/// The command buffer a recording command is recorded into.
struct Target<'a> {
    handle: Handle,
    state: Option<MutexGuard<'a, CommandBufferState>>,
}

impl Target<'_> {
    #[inline]
    fn key(&self) -> ObjectKey {
        ObjectKey::command_buffer(self.handle)
    }

    #[inline]
    fn state(&self) -> Option<&CommandBufferState> {
        self.state.as_deref()
    }

    /// Whether the command's effects should be recorded.
    #[inline]
    fn is_recording(&self) -> bool {
        self.state().is_some_and(CommandBufferState::is_recording)
    }

    /// The state to update, if the buffer is recording.
    fn recording_state(&mut self) -> Option<&mut CommandBufferState> {
        self.state.as_deref_mut().filter(|state| state.is_recording())
    }
}

fn registry_code(error: &RegistryError) -> FindingCode {
    match error {
        RegistryError::UnknownHandle(_) => FindingCode::UnknownHandle,
        RegistryError::UseAfterFree(_) => FindingCode::UseAfterFree,
        RegistryError::DuplicateHandle(_) => FindingCode::DuplicateHandle,
    }
}
