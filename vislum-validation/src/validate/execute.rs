use std::{collections::HashSet, sync::Arc};

use crate::{
    command::{CommandBufferLevel, InheritanceInfo, Lifecycle, RenderPassInstance},
    finding::{FindingCode, FindingCollector},
    handle::{Handle, ObjectKey, ObjectType},
    registry::{CommandBuffer, RenderPass},
};

use super::Validator;

/// What execution needs to know about a secondary, read under its lock.
#[derive(Debug, Clone, Copy)]
struct Secondary {
    handle: Handle,
    level: CommandBufferLevel,
    lifecycle: Lifecycle,
    simultaneous_use: bool,
    continues_render_pass: bool,
    inheritance: Option<InheritanceInfo>,
}

impl Secondary {
    #[inline]
    fn key(&self) -> ObjectKey {
        ObjectKey::command_buffer(self.handle)
    }
}

impl Validator {
    /// Checks a secondary's inheritance against the render pass instance it is executed in.
    fn check_inheritance(
        &self,
        key: ObjectKey,
        secondary: &Secondary,
        instance: &RenderPassInstance,
        out: &mut FindingCollector,
    ) {
        let secondary_key = secondary.key();
        if !secondary.continues_render_pass {
            out.push(
                FindingCode::RenderPassContinue,
                &[key, secondary_key],
                format!(
                    "{secondary_key} is executed inside a render pass but does not continue one"
                ),
            );
            return;
        }

        let Some(inheritance) = secondary.inheritance else {
            out.push(
                FindingCode::InheritanceMissing,
                &[key, secondary_key],
                format!("{secondary_key} continues a render pass but names no inheritance"),
            );
            return;
        };

        let render_pass_key = ObjectKey::new(ObjectType::RenderPass, instance.render_pass);
        let compatible = inheritance.render_pass == instance.render_pass || {
            let inherited = self.registry.lookup::<RenderPass>(inheritance.render_pass);
            let active = self.registry.lookup::<RenderPass>(instance.render_pass);
            match (inherited, active) {
                (Ok(inherited), Ok(active)) => inherited.is_compatible(&active),
                _ => false,
            }
        };
        if !compatible {
            out.push(
                FindingCode::RenderPassIncompatible,
                &[secondary_key, render_pass_key],
                format!(
                    "{secondary_key} was recorded for a render pass incompatible with \
                     {render_pass_key}"
                ),
            );
        }

        if inheritance.subpass != instance.subpass {
            out.push(
                FindingCode::SubpassMismatch,
                &[key, secondary_key],
                format!(
                    "{secondary_key} was recorded for subpass {} but {key} is in subpass {}",
                    inheritance.subpass, instance.subpass
                ),
            );
        }

        if !inheritance.framebuffer.is_null() && inheritance.framebuffer != instance.framebuffer {
            let inherited = ObjectKey::new(ObjectType::Framebuffer, inheritance.framebuffer);
            let active = ObjectKey::new(ObjectType::Framebuffer, instance.framebuffer);
            out.push(
                FindingCode::FramebufferMismatch,
                &[secondary_key, inherited, active],
                format!("{secondary_key} inherits {inherited} but the render pass uses {active}"),
            );
        }
    }

    pub(super) fn execute_commands(
        &self,
        command_buffer: Handle,
        secondaries: &[Handle],
        out: &mut FindingCollector,
    ) {
        let primary = self.resolve::<CommandBuffer>(command_buffer, out);
        let resolved: Vec<(Handle, Arc<CommandBuffer>)> = secondaries
            .iter()
            .filter_map(|&handle| self.resolve::<CommandBuffer>(handle, out).map(|cb| (handle, cb)))
            .collect();

        let mut involved: Vec<(Handle, &CommandBuffer)> = primary
            .as_deref()
            .map(|cb| (command_buffer, cb))
            .into_iter()
            .chain(resolved.iter().map(|(handle, cb)| (*handle, &**cb)))
            .collect();
        involved.sort_by_key(|(handle, _)| *handle);
        involved.dedup_by_key(|(handle, _)| *handle);

        let mut locked: Vec<_> = involved.iter().map(|(handle, cb)| (*handle, cb.lock())).collect();
        let snapshots: Vec<Secondary> = resolved
            .iter()
            .filter_map(|(handle, cb)| {
                let (_, state) = locked.iter().find(|(locked, _)| locked == handle)?;
                Some(Secondary {
                    handle: *handle,
                    level: cb.level(),
                    lifecycle: state.lifecycle,
                    simultaneous_use: state.is_simultaneous_use(),
                    continues_render_pass: state.continues_render_pass(),
                    inheritance: state.inheritance,
                })
            })
            .collect();

        let primary_state = locked
            .iter()
            .position(|(handle, _)| *handle == command_buffer)
            .map(|index| locked.swap_remove(index).1);
        let mut target = self.locked_target(command_buffer, primary_state, out);
        let key = target.key();

        if primary.as_ref().is_some_and(|cb| cb.level() != CommandBufferLevel::Primary) {
            out.push(
                FindingCode::CommandBufferLevel,
                &[key],
                format!("{key} is a secondary command buffer and cannot execute others"),
            );
            return;
        }

        if secondaries.is_empty() {
            out.push(FindingCode::ZeroCount, &[key], "no secondary command buffers given");
        }

        let instance = target.state().and_then(|state| state.render_pass);
        let mut seen = HashSet::new();
        for secondary in &snapshots {
            let secondary_key = secondary.key();
            if secondary.level != CommandBufferLevel::Secondary {
                out.push(
                    FindingCode::CommandBufferLevel,
                    &[key, secondary_key],
                    format!("{secondary_key} is a primary command buffer"),
                );
                continue;
            }

            let repeated = !seen.insert(secondary.handle);
            match secondary.lifecycle {
                Lifecycle::Executable | Lifecycle::Pending => {
                    let in_use = repeated || secondary.lifecycle == Lifecycle::Pending;
                    if in_use && !secondary.simultaneous_use {
                        out.push(
                            FindingCode::SimultaneousUse,
                            &[key, secondary_key],
                            format!(
                                "{secondary_key} is already in use and was not begun for \
                                 simultaneous use"
                            ),
                        );
                    }
                }
                lifecycle => out.push(
                    FindingCode::SecondaryNotExecutable,
                    &[key, secondary_key],
                    format!("{secondary_key} is {lifecycle:?}, not executable"),
                ),
            }

            match &instance {
                Some(instance) => self.check_inheritance(key, secondary, instance, out),
                None if secondary.continues_render_pass => out.push(
                    FindingCode::RenderPassContinue,
                    &[key, secondary_key],
                    format!("{secondary_key} continues a render pass but {key} has none active"),
                ),
                None => {}
            }

            self.reference(&mut target, secondary_key);
        }
    }

    pub(super) fn queue_submit(
        &self,
        queue: Handle,
        command_buffers: &[Handle],
        out: &mut FindingCollector,
    ) {
        let resolved: Vec<_> = command_buffers
            .iter()
            .filter_map(|&handle| self.resolve::<CommandBuffer>(handle, out).map(|cb| (handle, cb)))
            .collect();

        log::trace!("submitting {} command buffers to {queue:?}", resolved.len());
        self.machine.submit(queue, &resolved, out);
    }
}
