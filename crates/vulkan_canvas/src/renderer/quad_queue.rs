//! Batches coloured quads into indexed draws

use super::caches::MAX_QUADS;
use super::programs::QuadVertex;
use super::spans::SpanSource;
use crate::foundation::math::{PixelArgb, Rect};
use crate::vulkan::{BufferCreateInfo, CommandBuffer, MemoryBuffer, PoolRef, VulkanResult};

/// Vertices one flush can draw with the shared index buffer
pub const MAX_VERTICES: usize = MAX_QUADS * 4;

/// Pending quads of one render frame
///
/// Every flush writes its vertices to a fresh host-visible buffer, binds it
/// and issues one indexed draw. The buffers stay alive until
/// [`reset`](Self::reset), which the owner calls once the frame's GPU work
/// has completed.
#[derive(Debug, Default)]
pub struct QuadQueue {
    vertices: Vec<QuadVertex>,
    buffers: Vec<MemoryBuffer>,
}

impl QuadQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self {
            vertices: Vec::with_capacity(MAX_VERTICES),
            buffers: Vec::new(),
        }
    }

    /// Queue one quad, flushing first if the batch is full
    pub fn add(&mut self, cb: &CommandBuffer, pool: &PoolRef, area: Rect, colour: PixelArgb) -> VulkanResult<()> {
        if self.vertices.len() + 4 > MAX_VERTICES {
            self.flush(cb, pool)?;
        }

        let (l, t, r, b) = (area.x, area.y, area.right(), area.bottom());
        self.vertices.extend([
            QuadVertex::new(l, t, colour),
            QuadVertex::new(r, t, colour),
            QuadVertex::new(l, b, colour),
            QuadVertex::new(r, b, colour),
        ]);
        Ok(())
    }

    /// Queue one quad per span, scaling `colour` by each span's coverage
    pub fn add_spans<S: SpanSource + ?Sized>(
        &mut self,
        cb: &CommandBuffer,
        pool: &PoolRef,
        spans: &S,
        colour: PixelArgb,
    ) -> VulkanResult<()> {
        let mut result = Ok(());
        spans.for_each_span(&mut |area, alpha| {
            if result.is_ok() {
                let colour = if alpha == 255 { colour } else { colour.multiply_alpha(alpha) };
                result = self.add(cb, pool, area, colour);
            }
        });
        result
    }

    /// Draw every queued quad
    pub fn flush(&mut self, cb: &CommandBuffer, pool: &PoolRef) -> VulkanResult<()> {
        if self.vertices.is_empty() {
            return Ok(());
        }

        let info = BufferCreateInfo::for_elements::<QuadVertex>(self.vertices.len())
            .vertex_buffer()
            .host_visible();
        let mut buffer = MemoryBuffer::new(pool, &info)?;
        buffer.set_defragment_on_release(false);
        buffer.write_slice(&self.vertices)?;

        cb.bind_vertex_buffer(buffer.handle());
        cb.draw_indexed((self.vertices.len() * 3 / 2) as u32);

        self.vertices.clear();
        self.buffers.push(buffer);
        Ok(())
    }

    /// Quads waiting for a flush
    pub fn pending(&self) -> usize {
        self.vertices.len() / 4
    }

    /// Vertex buffers written since the last reset
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Release every vertex buffer; call once their draws have executed
    pub fn reset(&mut self) {
        self.vertices.clear();
        for buffer in &mut self.buffers {
            buffer.set_defragment_on_release(true);
        }
        self.buffers.clear();
    }
}
