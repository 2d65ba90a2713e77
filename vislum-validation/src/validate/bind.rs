use ash::vk;

use crate::{
    command::{BindPoint, DynamicState},
    finding::{FindingCode, FindingCollector},
    handle::{Handle, ObjectKey, ObjectType},
    registry::{Buffer, CommandBuffer, DescriptorSet, Pipeline},
};

use super::Validator;

/// The alignment an index buffer offset must honor.
fn index_alignment(index_type: vk::IndexType) -> u64 {
    match index_type {
        vk::IndexType::UINT32 => 4,
        vk::IndexType::UINT16 => 2,
        _ => 1,
    }
}

impl Validator {
    fn check_bind_point(
        &self,
        key: ObjectKey,
        bind_point: vk::PipelineBindPoint,
        out: &mut FindingCollector,
    ) -> Option<BindPoint> {
        let resolved = BindPoint::from_vk(bind_point);
        if resolved.is_none() {
            out.push(
                FindingCode::BindPointMismatch,
                &[key],
                format!("bind point {bind_point:?} is not supported"),
            );
        }
        resolved
    }

    pub(super) fn bind_pipeline(
        &self,
        command_buffer: Handle,
        bind_point: vk::PipelineBindPoint,
        pipeline: Handle,
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);

        let Some(object) = self.resolve::<Pipeline>(pipeline, out) else {
            return;
        };

        let key = ObjectKey::new(ObjectType::Pipeline, pipeline);
        let Some(bind_point) = self.check_bind_point(key, bind_point, out) else {
            return;
        };

        if bind_point != object.bind_point() {
            out.push(
                FindingCode::BindPointMismatch,
                &[key],
                format!(
                    "{} pipeline {key} bound to the {bind_point} bind point",
                    object.bind_point()
                ),
            );
            return;
        }

        if let Some(state) = target.recording_state() {
            state.bindings_mut(bind_point).pipeline = Some(pipeline);
        }
        self.reference(&mut target, key);
    }

    pub(super) fn bind_descriptor_sets(
        &self,
        command_buffer: Handle,
        bind_point: vk::PipelineBindPoint,
        first_set: u32,
        descriptor_sets: &[Handle],
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);

        let Some(bind_point) = self.check_bind_point(target.key(), bind_point, out) else {
            return;
        };

        if descriptor_sets.is_empty() {
            out.push(FindingCode::ZeroCount, &[target.key()], "no descriptor sets given");
        }

        for (&set, index) in descriptor_sets.iter().zip(first_set..) {
            if self.resolve::<DescriptorSet>(set, out).is_none() {
                continue;
            }

            if let Some(state) = target.recording_state() {
                state.bindings_mut(bind_point).descriptor_sets.insert(index, set);
            }
            self.reference(&mut target, ObjectKey::new(ObjectType::DescriptorSet, set));
        }
    }

    pub(super) fn bind_vertex_buffers(
        &self,
        command_buffer: Handle,
        first_binding: u32,
        buffers: &[(Handle, vk::DeviceSize)],
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);

        if buffers.is_empty() {
            out.push(FindingCode::ZeroCount, &[target.key()], "no vertex buffers given");
        }

        for (&(buffer, offset), binding) in buffers.iter().zip(first_binding..) {
            let Some(object) = self.resolve::<Buffer>(buffer, out) else {
                continue;
            };

            let key = ObjectKey::buffer(buffer);
            self.check_buffer_usage(key, &object, vk::BufferUsageFlags::VERTEX_BUFFER, out);
            if offset >= object.size() {
                out.push(
                    FindingCode::BufferRangeOutOfBounds,
                    &[key],
                    format!(
                        "binding {binding} starts at {offset} past the end of {key} ({} bytes)",
                        object.size()
                    ),
                );
            }

            if let Some(state) = target.recording_state() {
                state.vertex_buffers.insert(binding, buffer);
            }
            self.reference(&mut target, key);
        }
    }

    pub(super) fn bind_index_buffer(
        &self,
        command_buffer: Handle,
        buffer: Handle,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);

        let Some(object) = self.resolve::<Buffer>(buffer, out) else {
            return;
        };

        let key = ObjectKey::buffer(buffer);
        self.check_buffer_usage(key, &object, vk::BufferUsageFlags::INDEX_BUFFER, out);

        let alignment = index_alignment(index_type);
        if offset % alignment != 0 {
            out.push(
                FindingCode::OffsetMisaligned,
                &[key],
                format!(
                    "index offset {offset} is not a multiple of {alignment} for {index_type:?}"
                ),
            );
        }
        if offset >= object.size() {
            out.push(
                FindingCode::BufferRangeOutOfBounds,
                &[key],
                format!("index offset {offset} is past the end of {key} ({} bytes)", object.size()),
            );
        }

        if let Some(state) = target.recording_state() {
            state.index_buffer = Some(buffer);
        }
        self.reference(&mut target, key);
    }

    pub(super) fn set_dynamic_state(
        &self,
        command_buffer: Handle,
        state: DynamicState,
        out: &mut FindingCollector,
    ) {
        let cb = self.resolve::<CommandBuffer>(command_buffer, out);
        let mut target = self.target(command_buffer, cb.as_deref(), out);

        if let Some(recording) = target.recording_state() {
            recording.dynamic_state |= state.mask();
        }
    }
}
