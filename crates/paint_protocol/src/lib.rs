//! Shared vocabulary types for the painting compositor.
//!
//! This crate holds the data exchanged between the input side (brush points),
//! the layer model, and the compositor, plus the opaque GPU texture handle.

slotmap::new_key_type! {
    /// Opaque identifier for a GPU-resident image. Handles are created and
    /// destroyed by the render backend (the texture factory); everything else
    /// only passes them around.
    pub struct TextureHandle;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Standard premultiplied source-over compositing.
    Normal,
    /// Zero source color factor; reduces destination alpha only.
    Erase,
}

/// One coalesced pointer sample after input-device normalization.
///
/// `rotation` is carried through from the input layer but is not currently
/// applied to quad geometry by the batch accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushPoint {
    pub position_x: f64,
    pub position_y: f64,
    pub scaled_diameter: f64,
    /// Linear-RGB brush color.
    pub color: [f32; 3],
    pub alpha: f64,
    pub rotation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushSettings {
    /// Edge softness of the brush stencil in `[0, 1]`; a change forces the
    /// stencil texture to be regenerated before the next flush.
    pub softness: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasResolution {
    pub width: u32,
    pub height: u32,
}

/// Half-open pixel rectangle: `[min_x, max_x) x [min_y, max_y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl PixelRect {
    pub const fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.min_x >= self.max_x || self.min_y >= self.max_y
    }

    pub fn width(&self) -> u32 {
        (self.max_x - self.min_x).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.max_y - self.min_y).max(0) as u32
    }

    pub fn intersect(&self, other: &PixelRect) -> PixelRect {
        PixelRect {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.min_x && x < self.max_x && y >= self.min_y && y < self.max_y
    }
}
