//! GPU collaborator interface.
//!
//! The compositor never talks to a device directly; it drives this trait.
//! Texture handles are created and destroyed here and nowhere else. Draw
//! submission is fire-and-forget, but painter's-algorithm correctness depends
//! on the call order the compositor emits, so implementations must submit in
//! call order.

use paint_protocol::{BlendMode, PixelRect, TextureHandle};

use crate::brush_batch::BrushVertex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureCreateError {
    ZeroSized { width: u32, height: u32 },
    AllocationFailed { width: u32, height: u32 },
}

pub trait RenderBackend {
    fn create_texture(&mut self, width: u32, height: u32)
    -> Result<TextureHandle, TextureCreateError>;

    fn destroy_texture(&mut self, handle: TextureHandle);

    /// Makes `handle` samplable from hardware unit `slot_index`.
    fn bind_texture(&mut self, slot_index: usize, handle: TextureHandle);

    /// Regenerates the brush stencil image into `target` for the given edge
    /// softness.
    fn write_brush_stencil(&mut self, target: TextureHandle, softness: f32);

    /// Replaces every pixel of `rect` in `target` with `color`.
    fn clear_rect(&mut self, target: TextureHandle, rect: PixelRect, color: [f32; 4]);

    /// Blends a constant color over `rect` in `target`.
    fn fill_rect(&mut self, target: TextureHandle, rect: PixelRect, color: [f32; 4]);

    /// Samples `rect` from the texture bound at `source_slot` and composites
    /// it over the same `rect` of `target` at `opacity`.
    fn draw_texture_rect(&mut self, target: TextureHandle, source_slot: usize, rect: PixelRect, opacity: f32);

    /// Submits the accumulated brush quads as a single draw call, sampling
    /// the stencil bound at `stencil_slot`.
    fn draw_brush_vertices(
        &mut self,
        target: TextureHandle,
        stencil_slot: usize,
        vertices: &[BrushVertex],
        blend: BlendMode,
    );

    /// Blits `source` to the visible surface at full viewport.
    fn present(&mut self, source: TextureHandle);
}
