//! Owning map from attribute/index identity to GPU buffer handles.

use crate::gpu::{BufferTarget, GpuBufferHandle, GpuContext};
use std::collections::HashMap;
use tile_geometry::{GeometryBuffer, GroupKind, ResourceId};

/// Every attribute and index array holds at most one GPU buffer. Handles are
/// released explicitly with [`GpuBufferCache::release`]; releasing twice is a
/// no-op.
#[derive(Debug, Default)]
pub struct GpuBufferCache {
    buffers: HashMap<ResourceId, GpuBufferHandle>,
}

impl GpuBufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ResourceId) -> Option<GpuBufferHandle> {
        self.buffers.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Uploads dirty or missing attributes and missing index arrays.
    /// Returns the number of buffers created or updated.
    pub fn upload(&mut self, ctx: &mut dyn GpuContext, buffer: &mut GeometryBuffer) -> usize {
        let mut uploads = 0;
        for (_, attr) in buffer.attributes_mut() {
            match self.buffers.get(&attr.id) {
                Some(&handle) if attr.dirty => {
                    ctx.update_buffer(handle, attr.data.as_bytes());
                    uploads += 1;
                }
                Some(_) => {}
                None => {
                    let handle = ctx.create_buffer(BufferTarget::Vertex, attr.data.as_bytes());
                    self.buffers.insert(attr.id, handle);
                    uploads += 1;
                }
            }
            attr.dirty = false;
        }
        for group in buffer.groups() {
            if let GroupKind::Indexed { id, index } = &group.kind {
                if !self.buffers.contains_key(id) {
                    let handle = ctx.create_buffer(BufferTarget::Index, index.as_bytes());
                    self.buffers.insert(*id, handle);
                    uploads += 1;
                }
            }
        }
        if uploads > 0 {
            log::trace!("uploaded {uploads} gpu buffers for {:?}", buffer.kind);
        }
        uploads
    }

    /// Deletes every GPU buffer owned by `buffer`. Returns how many were
    /// actually deleted.
    pub fn release(&mut self, ctx: &mut dyn GpuContext, buffer: &GeometryBuffer) -> usize {
        let attributes = buffer.attributes().map(|(_, attr)| attr.id);
        let indices = buffer.groups().iter().filter_map(|g| match &g.kind {
            GroupKind::Indexed { id, .. } => Some(*id),
            GroupKind::Arrays { .. } => None,
        });
        let mut released = 0;
        for id in attributes.chain(indices) {
            if let Some(handle) = self.buffers.remove(&id) {
                ctx.delete_buffer(handle);
                released += 1;
            }
        }
        log::trace!("released {released} gpu buffers for {:?}", buffer.kind);
        released
    }

    pub fn release_all(&mut self, ctx: &mut dyn GpuContext) -> usize {
        let released = self.buffers.len();
        for (_, handle) in self.buffers.drain() {
            ctx.delete_buffer(handle);
        }
        released
    }
}
