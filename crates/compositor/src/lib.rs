//! Compositor crate root.
//!
//! This crate defines the per-frame orchestration (`FrameCompositor`), the
//! GPU collaborator seam (`RenderBackend`), and the domain subsystems it
//! drives:
//! - `dirty`: block-grained dirty-region tracking with time-based decay.
//! - `texture_slots`: fixed pool of hardware texture units with eviction.
//! - `brush_batch`: brush point batching into a quad vertex buffer.
//!
//! Everything runs single-threaded inside the host's frame callback. The
//! dirty tracker, slot table, and previous-frame projection are owned and
//! mutated only by the `FrameCompositor`.

use std::collections::HashMap;

use layer_model::{CollectedLayer, LayerId, SplitDiff, SplitLayers, diff};
use paint_protocol::{
    BlendMode, BrushPoint, BrushSettings, CanvasResolution, PixelRect, TextureHandle,
};

mod backend;
mod brush_batch;
mod dirty;
mod texture_slots;

pub use backend::{RenderBackend, TextureCreateError};
pub use brush_batch::{BrushBatchAccumulator, BrushVertex, VERTICES_PER_POINT};
pub use dirty::{BLOCK_SIZE, Block, BlockHighlight, DirtyRegionTracker};
pub use texture_slots::{SlotBind, TEXTURE_SLOT_COUNT, TextureSlotManager};

const BACKGROUND_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
const TRANSPARENT: [f32; 4] = [0.0, 0.0, 0.0, 0.0];
const HIGHLIGHT_COLOR: [f32; 3] = [1.0, 0.45, 0.1];
const HIGHLIGHT_MAX_ALPHA: f32 = 0.35;
const BRUSH_STENCIL_SIZE: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderError {
    TextureCreate(TextureCreateError),
}

impl From<TextureCreateError> for RenderError {
    fn from(source: TextureCreateError) -> Self {
        RenderError::TextureCreate(source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StrokeState {
    Idle,
    Stroking,
}

/// Everything the host delivers for one animation-frame callback.
#[derive(Debug, Clone)]
pub struct FrameArgs {
    pub split_layers: SplitLayers,
    pub blend_mode: BlendMode,
    pub brush: BrushSettings,
    pub now: f64,
}

pub struct FrameCompositor {
    backend: Box<dyn RenderBackend>,
    resolution: CanvasResolution,
    dirty_tracker: DirtyRegionTracker,
    slot_manager: TextureSlotManager,
    brush_batch: BrushBatchAccumulator,
    stroke_state: StrokeState,
    stroke_blend_mode: BlendMode,
    /// Brush settings from the most recent frame; a stroke ending between
    /// frames still flushes with them.
    brush: BrushSettings,
    /// Layer that received flushed brush geometry during the current stroke.
    active_stroke_layer: Option<LayerId>,
    previous_split: Option<SplitLayers>,
    /// Persistent per-layer content textures, lazily created.
    layer_textures: HashMap<LayerId, TextureHandle>,
    /// Per-layer off-screen stroke buffers, lazily created and cached by
    /// layer id.
    scratch_textures: HashMap<LayerId, TextureHandle>,
    above_composite: TextureHandle,
    below_composite: TextureHandle,
    output_texture: TextureHandle,
    brush_stencil: TextureHandle,
    stencil_softness: Option<f32>,
}

impl FrameCompositor {
    /// Allocates the fixed render targets up front; texture creation is the
    /// only fallible step and is reported once, not retried.
    pub fn new(
        mut backend: Box<dyn RenderBackend>,
        resolution: CanvasResolution,
        highlight_duration: f64,
    ) -> Result<Self, RenderError> {
        let above_composite = backend.create_texture(resolution.width, resolution.height)?;
        let below_composite = backend.create_texture(resolution.width, resolution.height)?;
        let output_texture = backend.create_texture(resolution.width, resolution.height)?;
        let brush_stencil = backend.create_texture(BRUSH_STENCIL_SIZE, BRUSH_STENCIL_SIZE)?;
        Ok(Self {
            backend,
            resolution,
            dirty_tracker: DirtyRegionTracker::new(BLOCK_SIZE, highlight_duration),
            slot_manager: TextureSlotManager::new(TEXTURE_SLOT_COUNT),
            brush_batch: BrushBatchAccumulator::new(),
            stroke_state: StrokeState::Idle,
            stroke_blend_mode: BlendMode::Normal,
            brush: BrushSettings { softness: 1.0 },
            active_stroke_layer: None,
            previous_split: None,
            layer_textures: HashMap::new(),
            scratch_textures: HashMap::new(),
            above_composite,
            below_composite,
            output_texture,
            brush_stencil,
            stencil_softness: None,
        })
    }

    pub fn resolution(&self) -> CanvasResolution {
        self.resolution
    }

    pub fn begin_stroke(&mut self) {
        self.stroke_state = StrokeState::Stroking;
    }

    /// Routes one coalesced batch of pointer samples to both the brush batch
    /// (geometry) and the dirty tracker (which blocks changed). A batch
    /// arriving while idle starts the stroke.
    pub fn add_brush_points(&mut self, points: &[BrushPoint]) {
        if points.is_empty() {
            return;
        }
        self.stroke_state = StrokeState::Stroking;
        self.brush_batch.add_points(points);
        self.dirty_tracker.add_points(points);
    }

    pub fn render(&mut self, frame: FrameArgs) -> Result<(), RenderError> {
        let split_diff = match &self.previous_split {
            Some(previous) => diff(previous, &frame.split_layers),
            None => SplitDiff {
                above_dirty: true,
                below_dirty: true,
                structural_change: true,
            },
        };
        if split_diff.structural_change {
            self.dirty_tracker.fill_all(self.resolution, frame.now);
        }
        self.dirty_tracker.update(frame.now);

        let frame_blocks = self.dirty_tracker.frame_blocks();
        if frame_blocks.is_empty() {
            // The previous projection is intentionally kept: composite
            // dirtiness must survive until there are blocks to redraw.
            return Ok(());
        }

        self.stroke_blend_mode = frame.blend_mode;
        self.brush = frame.brush;
        if self.brush_batch.can_flush() {
            if let Some(current) = &frame.split_layers.current {
                self.flush_brush_batch(current.id, self.brush.softness, frame.blend_mode)?;
            }
        }

        if split_diff.above_dirty {
            self.regenerate_composite(self.above_composite, &frame.split_layers.above)?;
        }
        if split_diff.below_dirty {
            self.regenerate_composite(self.below_composite, &frame.split_layers.below)?;
        }

        let current_draw = match &frame.split_layers.current {
            Some(current) => {
                let layer_texture = self.ensure_layer_texture(current.id)?;
                let scratch = self.scratch_textures.get(&current.id).copied();
                Some((layer_texture, scratch, current.effective_opacity))
            }
            None => None,
        };

        let canvas_rect = self.canvas_rect();
        for block in &frame_blocks {
            let rect = block.pixel_rect(BLOCK_SIZE).intersect(&canvas_rect);
            if rect.is_empty() {
                continue;
            }
            self.backend
                .clear_rect(self.output_texture, rect, BACKGROUND_COLOR);
            self.draw_sampled(self.output_texture, self.below_composite, rect, 1.0);
            if let Some((layer_texture, scratch, opacity)) = current_draw {
                self.draw_sampled(self.output_texture, layer_texture, rect, opacity);
                if let Some(scratch) = scratch {
                    self.draw_sampled(self.output_texture, scratch, rect, opacity);
                }
            }
            self.draw_sampled(self.output_texture, self.above_composite, rect, 1.0);
        }

        let highlights = self.dirty_tracker.highlights(frame.now);
        for highlight in highlights {
            let rect = highlight
                .block
                .pixel_rect(BLOCK_SIZE)
                .intersect(&canvas_rect);
            if rect.is_empty() {
                continue;
            }
            self.backend.fill_rect(
                self.output_texture,
                rect,
                [
                    HIGHLIGHT_COLOR[0],
                    HIGHLIGHT_COLOR[1],
                    HIGHLIGHT_COLOR[2],
                    HIGHLIGHT_MAX_ALPHA * highlight.opacity,
                ],
            );
        }

        self.backend.present(self.output_texture);
        self.previous_split = Some(frame.split_layers);
        Ok(())
    }

    /// Fires on pointer release; the bake runs exactly once per
    /// Stroking -> Idle transition.
    pub fn end_stroke(&mut self) -> Result<(), RenderError> {
        if self.stroke_state != StrokeState::Stroking {
            return Ok(());
        }
        self.stroke_state = StrokeState::Idle;
        self.bake_stroke()
    }

    pub fn frame_blocks(&self) -> Vec<Block> {
        self.dirty_tracker.frame_blocks()
    }

    pub fn stroke_blocks(&self) -> Vec<Block> {
        self.dirty_tracker.stroke_blocks()
    }

    pub fn highlights(&self, now: f64) -> Vec<BlockHighlight> {
        self.dirty_tracker.highlights(now)
    }

    pub fn layer_texture(&self, layer_id: LayerId) -> Option<TextureHandle> {
        self.layer_textures.get(&layer_id).copied()
    }

    /// Releases the content and scratch textures of a deleted layer.
    pub fn release_layer_textures(&mut self, layer_id: LayerId) {
        if let Some(handle) = self.layer_textures.remove(&layer_id) {
            self.backend.destroy_texture(handle);
        }
        if let Some(handle) = self.scratch_textures.remove(&layer_id) {
            self.backend.destroy_texture(handle);
        }
    }

    fn bake_stroke(&mut self) -> Result<(), RenderError> {
        // Points added since the last frame never went through `update`;
        // their blocks must still count toward the stroke being baked.
        self.dirty_tracker.commit_pending_to_stroke();
        if self.brush_batch.can_flush() {
            let destination = self.active_stroke_layer.or_else(|| {
                self.previous_split
                    .as_ref()
                    .and_then(|split| split.current.as_ref())
                    .map(|current| current.id)
            });
            match destination {
                Some(layer_id) => {
                    let softness = self.brush.softness;
                    self.flush_brush_batch(layer_id, softness, self.stroke_blend_mode)?;
                }
                // Selection is a group: the stroke never had a destination.
                None => self.brush_batch.reset(),
            }
        }

        let Some(layer_id) = self.active_stroke_layer.take() else {
            self.dirty_tracker.stroke_ended();
            return Ok(());
        };
        let scratch = self
            .scratch_textures
            .get(&layer_id)
            .copied()
            .expect("scratch texture must exist for the active stroke layer");
        let layer_texture = self.ensure_layer_texture(layer_id)?;
        let canvas_rect = self.canvas_rect();
        for block in self.dirty_tracker.stroke_blocks() {
            let rect = block.pixel_rect(BLOCK_SIZE).intersect(&canvas_rect);
            if rect.is_empty() {
                continue;
            }
            self.draw_sampled(layer_texture, scratch, rect, 1.0);
            self.backend.clear_rect(scratch, rect, TRANSPARENT);
        }
        self.dirty_tracker.stroke_ended();
        Ok(())
    }

    /// Flushes pending brush geometry into the layer's scratch texture at
    /// full-viewport resolution; only the later compositing step is
    /// block-restricted.
    fn flush_brush_batch(
        &mut self,
        layer_id: LayerId,
        softness: f32,
        blend: BlendMode,
    ) -> Result<(), RenderError> {
        if self.stencil_softness != Some(softness) {
            self.backend.write_brush_stencil(self.brush_stencil, softness);
            self.stencil_softness = Some(softness);
        }
        let scratch = self.ensure_scratch_texture(layer_id)?;
        let bind = self.slot_manager.ensure_bound(self.brush_stencil);
        if bind.newly_bound {
            self.backend.bind_texture(bind.slot_index, self.brush_stencil);
        }
        self.brush_batch
            .flush(self.backend.as_mut(), scratch, bind.slot_index, blend);
        self.active_stroke_layer = Some(layer_id);
        Ok(())
    }

    /// Rebuilds one of the above/below composites from its member list.
    /// Members arrive topmost-first, so drawing runs back to front.
    fn regenerate_composite(
        &mut self,
        composite: TextureHandle,
        members: &[CollectedLayer],
    ) -> Result<(), RenderError> {
        let canvas_rect = self.canvas_rect();
        self.backend.clear_rect(composite, canvas_rect, TRANSPARENT);
        for member in members.iter().rev() {
            let layer_texture = self.ensure_layer_texture(member.id)?;
            self.draw_sampled(composite, layer_texture, canvas_rect, member.effective_opacity);
        }
        Ok(())
    }

    fn draw_sampled(
        &mut self,
        target: TextureHandle,
        source: TextureHandle,
        rect: PixelRect,
        opacity: f32,
    ) {
        let bind = self.slot_manager.ensure_bound(source);
        if bind.newly_bound {
            self.backend.bind_texture(bind.slot_index, source);
        }
        self.backend
            .draw_texture_rect(target, bind.slot_index, rect, opacity);
    }

    fn ensure_layer_texture(&mut self, layer_id: LayerId) -> Result<TextureHandle, RenderError> {
        if let Some(&handle) = self.layer_textures.get(&layer_id) {
            return Ok(handle);
        }
        let handle = self
            .backend
            .create_texture(self.resolution.width, self.resolution.height)?;
        self.layer_textures.insert(layer_id, handle);
        Ok(handle)
    }

    fn ensure_scratch_texture(&mut self, layer_id: LayerId) -> Result<TextureHandle, RenderError> {
        if let Some(&handle) = self.scratch_textures.get(&layer_id) {
            return Ok(handle);
        }
        let handle = self
            .backend
            .create_texture(self.resolution.width, self.resolution.height)?;
        self.scratch_textures.insert(layer_id, handle);
        Ok(handle)
    }

    fn canvas_rect(&self) -> PixelRect {
        PixelRect::new(
            0,
            0,
            self.resolution.width as i32,
            self.resolution.height as i32,
        )
    }
}
