//! Command buffer lifecycle.

mod references;
mod state;

pub use references::ReferenceIndex;
pub use state::*;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use ash::vk;

use crate::{
    finding::{FindingCode, FindingCollector},
    handle::{Handle, ObjectKey, ObjectType},
    registry::{CommandBuffer, ObjectRegistry},
    tracker::ResourceStateTracker,
};

/// The parameters of a begin call.
#[derive(Debug, Clone, Copy, Default)]
pub struct BeginInfo {
    pub usage: vk::CommandBufferUsageFlags,
    pub inheritance: Option<InheritanceInfo>,
}

/// The outcome of walking reverse edges after an object went away.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidation {
    /// Buffers flipped to [`Lifecycle::Invalid`], in visit order.
    pub invalidated: Vec<Handle>,
    /// Pending buffers, marked to become invalid once they complete.
    pub in_use: Vec<Handle>,
}

/// Drives command buffer state transitions.
///
/// Lock order: command buffer locks (ascending handle) before tracker grids,
/// with the reference index and the pending set as leaves.
#[derive(Default)]
pub struct CommandBufferMachine {
    references: ReferenceIndex,
    /// Submitted buffers and the queue they went to.
    pending: Mutex<HashMap<Handle, Handle>>,
}

static_assertions::assert_impl_all!(CommandBufferMachine: Send, Sync);

impl CommandBufferMachine {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn references(&self) -> &ReferenceIndex {
        &self.references
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<Handle, Handle>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_pending(&self, command_buffer: Handle) -> bool {
        self.pending().contains_key(&command_buffer)
    }

    /// Adds a forward edge from `command_buffer` to `key` and the matching reverse edge.
    pub fn reference(
        &self,
        command_buffer: Handle,
        state: &mut CommandBufferState,
        key: ObjectKey,
    ) {
        if state.references.insert(key) {
            self.references.insert(key, command_buffer);
        }
    }

    /// Drops everything a buffer recorded, including its subresource effects.
    fn clear(
        &self,
        tracker: &ResourceStateTracker,
        command_buffer: Handle,
        state: &mut CommandBufferState,
    ) {
        let references = state.clear_recording();
        for key in references.iter().filter(|key| key.ty == ObjectType::Image) {
            tracker.reset_effects(key.handle, command_buffer);
        }

        self.references.remove_all(references, command_buffer);
    }

    pub fn begin(
        &self,
        registry: &ObjectRegistry,
        tracker: &ResourceStateTracker,
        handle: Handle,
        command_buffer: &CommandBuffer,
        permits_reset: bool,
        info: &BeginInfo,
        out: &mut FindingCollector,
    ) {
        let key = ObjectKey::command_buffer(handle);
        let pool = ObjectKey::new(ObjectType::CommandPool, command_buffer.pool());
        let mut state = command_buffer.lock();

        let mut reset = false;
        match state.lifecycle {
            Lifecycle::Initial => {}
            Lifecycle::Recording => {
                let message = format!("{key} is already recording");
                out.push(FindingCode::AlreadyRecording, &[key], message);
                return;
            }
            Lifecycle::Pending => {
                out.push(
                    FindingCode::ResetWhilePending,
                    &[key],
                    format!("begin would implicitly reset {key} while it is pending"),
                );
                return;
            }
            Lifecycle::Executable | Lifecycle::Invalid => {
                if !permits_reset {
                    out.push(
                        FindingCode::ImplicitResetNotPermitted,
                        &[key, pool],
                        format!(
                            "begin implicitly resets {key} but {pool} does not allow resetting \
                             buffers"
                        ),
                    );
                    return;
                }

                let message = format!("begin implicitly resets {key}");
                out.push(FindingCode::ImplicitReset, &[key], message);
                self.clear(tracker, handle, &mut state);
                reset = true;
            }
        }

        let secondary = command_buffer.level() == CommandBufferLevel::Secondary;
        if secondary
            && info.usage.contains(vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE)
            && info.inheritance.is_none()
        {
            out.push(
                FindingCode::InheritanceMissing,
                &[key],
                format!("{key} continues a render pass but names no inheritance"),
            );
        }

        state.lifecycle = Lifecycle::Recording;
        state.usage = info.usage;
        state.inheritance = if secondary { info.inheritance } else { None };
        state.dynamic_state = DynamicStateMask::empty();
        drop(state);

        if reset {
            self.invalidate_executors(registry, handle, out);
        }
    }

    pub fn end(&self, handle: Handle, command_buffer: &CommandBuffer, out: &mut FindingCollector) {
        let key = ObjectKey::command_buffer(handle);
        let mut state = command_buffer.lock();

        if !state.is_recording() {
            out.push(
                FindingCode::NotRecording,
                &[key],
                format!("{key} is {:?}, not recording", state.lifecycle),
            );
            return;
        }

        if let Some(instance) = &state.render_pass {
            let render_pass = ObjectKey::new(ObjectType::RenderPass, instance.render_pass);
            out.push(
                FindingCode::UnterminatedRenderPass,
                &[key, render_pass],
                format!("{key} ends inside {render_pass}"),
            );
        }

        state.lifecycle = Lifecycle::Executable;
    }

    /// Resets a buffer to [`Lifecycle::Initial`]. Returns whether the reset happened.
    pub fn reset(
        &self,
        registry: &ObjectRegistry,
        tracker: &ResourceStateTracker,
        handle: Handle,
        command_buffer: &CommandBuffer,
        permits_reset: bool,
        out: &mut FindingCollector,
    ) -> bool {
        let key = ObjectKey::command_buffer(handle);
        if !permits_reset {
            let pool = ObjectKey::new(ObjectType::CommandPool, command_buffer.pool());
            out.push(
                FindingCode::ResetNotPermitted,
                &[key, pool],
                format!("{pool} does not allow resetting {key} individually"),
            );
            return false;
        }

        let mut state = command_buffer.lock();
        if state.lifecycle == Lifecycle::Pending {
            let message = format!("{key} is reset while pending");
            out.push(FindingCode::ResetWhilePending, &[key], message);
            return false;
        }

        self.clear(tracker, handle, &mut state);
        state.lifecycle = Lifecycle::Initial;
        drop(state);

        self.invalidate_executors(registry, handle, out);
        true
    }

    /// Moves submitted buffers to [`Lifecycle::Pending`].
    ///
    /// `command_buffers` is in submission order; buffers are locked in
    /// ascending handle order.
    pub fn submit(
        &self,
        queue: Handle,
        command_buffers: &[(Handle, Arc<CommandBuffer>)],
        out: &mut FindingCollector,
    ) {
        let mut order: Vec<_> = command_buffers.iter().collect();
        order.sort_by_key(|(handle, _)| *handle);
        order.dedup_by_key(|(handle, _)| *handle);

        let mut locked: Vec<_> = order
            .iter()
            .map(|(handle, command_buffer)| {
                (*handle, command_buffer.level(), command_buffer.lock())
            })
            .collect();

        for (handle, _) in command_buffers {
            let found = locked.iter_mut().find(|(locked, ..)| locked == handle);
            let Some((_, level, state)) = found else {
                continue;
            };

            let key = ObjectKey::command_buffer(*handle);
            if *level == CommandBufferLevel::Secondary {
                out.push(
                    FindingCode::SecondarySubmitted,
                    &[key],
                    format!("{key} is a secondary command buffer"),
                );
                continue;
            }

            match state.lifecycle {
                Lifecycle::Executable => {
                    state.lifecycle = Lifecycle::Pending;
                    self.pending().insert(*handle, queue);
                }
                Lifecycle::Pending if state.is_simultaneous_use() => {
                    self.pending().insert(*handle, queue);
                }
                Lifecycle::Pending => out.push(
                    FindingCode::SimultaneousUse,
                    &[key],
                    format!("{key} is already pending and was not begun for simultaneous use"),
                ),
                lifecycle => out.push(
                    FindingCode::SubmitNotExecutable,
                    &[key],
                    format!("{key} is {lifecycle:?}, not executable"),
                ),
            }
        }
    }

    /// Retires pending buffers once their queue (or the whole device) is idle.
    pub fn complete(&self, registry: &ObjectRegistry, queue: Option<Handle>) -> usize {
        let mut done: Vec<Handle> = {
            let mut pending = self.pending();
            match queue {
                None => pending.drain().map(|(handle, _)| handle).collect(),
                Some(queue) => {
                    let done: Vec<_> = pending
                        .iter()
                        .filter(|(_, submitted)| **submitted == queue)
                        .map(|(handle, _)| *handle)
                        .collect();
                    for handle in &done {
                        pending.remove(handle);
                    }
                    done
                }
            }
        };
        done.sort_unstable();

        let mut retired = 0;
        for handle in done {
            let Ok(command_buffer) = registry.lookup::<CommandBuffer>(handle) else {
                continue;
            };

            let mut state = command_buffer.lock();
            if state.lifecycle == Lifecycle::Pending {
                state.lifecycle = if state.is_one_time_submit() || state.stale {
                    Lifecycle::Invalid
                } else {
                    Lifecycle::Executable
                };
                retired += 1;
            }
        }

        log::debug!("retired {retired} pending command buffers");
        retired
    }

    /// Forgets a freed buffer: drops its edges and invalidates the primaries that executed it.
    pub fn free(
        &self,
        registry: &ObjectRegistry,
        handle: Handle,
        command_buffer: &CommandBuffer,
        out: &mut FindingCollector,
    ) {
        let references = {
            let mut state = command_buffer.lock();
            state.lifecycle = Lifecycle::Invalid;
            state.clear_recording()
        };

        self.references.remove_all(references, handle);
        self.pending().remove(&handle);
        self.invalidate_executors(registry, handle, out);
        self.references.forget(ObjectKey::command_buffer(handle));
    }

    /// Invalidates the primaries that executed a secondary that was reset or freed.
    fn invalidate_executors(
        &self,
        registry: &ObjectRegistry,
        secondary: Handle,
        out: &mut FindingCollector,
    ) {
        let key = ObjectKey::command_buffer(secondary);
        let invalidation = self.invalidate_referencing(registry, key);
        for primary in invalidation.in_use {
            let primary = ObjectKey::command_buffer(primary);
            out.push(
                FindingCode::DestroyInUse,
                &[key, primary],
                format!("{key} is executed by pending {primary}"),
            );
        }
    }

    /// Invalidates every recording or executable buffer referencing `key`,
    /// and transitively the primaries that executed an invalidated buffer.
    ///
    /// Pending buffers keep running and are reported back; they become
    /// invalid when they complete.
    pub fn invalidate_referencing(
        &self,
        registry: &ObjectRegistry,
        key: ObjectKey,
    ) -> Invalidation {
        let mut invalidation = Invalidation::default();
        let mut worklist = vec![key];

        while let Some(key) = worklist.pop() {
            for holder in self.references.holders(key) {
                let Ok(command_buffer) = registry.lookup::<CommandBuffer>(holder) else {
                    continue;
                };

                let mut state = command_buffer.lock();
                match state.lifecycle {
                    Lifecycle::Recording | Lifecycle::Executable => {
                        state.lifecycle = Lifecycle::Invalid;
                        invalidation.invalidated.push(holder);
                        worklist.push(ObjectKey::command_buffer(holder));
                    }
                    Lifecycle::Pending => {
                        state.stale = true;
                        invalidation.in_use.push(holder);
                    }
                    Lifecycle::Initial | Lifecycle::Invalid => {}
                }
            }
        }

        if !invalidation.invalidated.is_empty() {
            log::debug!(
                "{key:?} invalidated {} command buffers",
                invalidation.invalidated.len()
            );
        }

        invalidation
    }

    /// The pending buffers referencing `key`.
    pub fn pending_holders(&self, registry: &ObjectRegistry, key: ObjectKey) -> Vec<Handle> {
        self.references
            .holders(key)
            .into_iter()
            .filter(|holder| {
                registry
                    .lookup::<CommandBuffer>(*holder)
                    .is_ok_and(|object| object.lock().lifecycle == Lifecycle::Pending)
            })
            .collect()
    }
}
