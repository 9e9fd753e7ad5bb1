//! Block-grained dirty-region tracking.
//!
//! The canvas is divided into a fixed grid of blocks. Brush points buffer up
//! between frames; `update` converts their footprints into touched blocks and
//! ages out blocks that have outlived the highlight duration. Aged blocks get
//! exactly one more redraw (the fading pass) to erase any stale highlight.

use std::collections::{HashMap, HashSet};

use paint_protocol::{BrushPoint, CanvasResolution, PixelRect};

pub const BLOCK_SIZE: u32 = 32;

/// Grid cell identified by block coordinates; equality and hashing are by
/// coordinates only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
    pub block_x: i32,
    pub block_y: i32,
}

impl Block {
    pub fn pixel_rect(&self, block_size: u32) -> PixelRect {
        let size = block_size as i32;
        PixelRect::new(
            self.block_x * size,
            self.block_y * size,
            (self.block_x + 1) * size,
            (self.block_y + 1) * size,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockHighlight {
    pub block: Block,
    pub opacity: f32,
}

#[derive(Debug)]
pub struct DirtyRegionTracker {
    block_size: u32,
    /// Seconds an untouched block stays active for highlight display; zero
    /// disables highlighting.
    highlight_duration: f64,
    pending_points: Vec<BrushPoint>,
    active: HashMap<Block, f64>,
    stroke_accum: HashSet<Block>,
    fading: HashSet<Block>,
    last_update_at: Option<f64>,
}

impl DirtyRegionTracker {
    pub fn new(block_size: u32, highlight_duration: f64) -> Self {
        assert!(block_size > 0, "block size must be positive");
        assert!(
            highlight_duration >= 0.0 && highlight_duration.is_finite(),
            "highlight duration must be finite and non-negative"
        );
        Self {
            block_size,
            highlight_duration,
            pending_points: Vec::new(),
            active: HashMap::new(),
            stroke_accum: HashSet::new(),
            fading: HashSet::new(),
            last_update_at: None,
        }
    }

    /// Buffers raw points; no geometry is computed until `update`.
    pub fn add_points(&mut self, points: &[BrushPoint]) {
        self.pending_points.extend_from_slice(points);
    }

    pub fn update(&mut self, now: f64) {
        let points = std::mem::take(&mut self.pending_points);
        for point in &points {
            let (min_block, max_block) = footprint_block_range(point, self.block_size);
            for block_y in min_block.block_y..=max_block.block_y {
                for block_x in min_block.block_x..=max_block.block_x {
                    let block = Block { block_x, block_y };
                    self.active.insert(block, now);
                    self.stroke_accum.insert(block);
                }
            }
        }

        let highlight_duration = self.highlight_duration;
        let mut aged_out = HashSet::new();
        self.active.retain(|block, last_touched_at| {
            if now - *last_touched_at > highlight_duration {
                aged_out.insert(*block);
                false
            } else {
                true
            }
        });
        // A repeated update at the same instant must not discard a fading
        // pass that has not been consumed yet.
        if self.last_update_at == Some(now) {
            self.fading.extend(aged_out);
        } else {
            self.fading = aged_out;
        }
        self.last_update_at = Some(now);
    }

    /// Blocks that must be redrawn this frame: everything still active plus
    /// the blocks that aged out in the last `update`.
    pub fn frame_blocks(&self) -> Vec<Block> {
        self.active
            .keys()
            .copied()
            .chain(self.fading.iter().copied())
            .collect()
    }

    /// Every block touched since the stroke began.
    pub fn stroke_blocks(&self) -> Vec<Block> {
        self.stroke_accum.iter().copied().collect()
    }

    pub fn highlights(&self, now: f64) -> Vec<BlockHighlight> {
        if self.highlight_duration == 0.0 {
            return Vec::new();
        }
        self.active
            .iter()
            .map(|(block, last_touched_at)| BlockHighlight {
                block: *block,
                opacity: (1.0 - (now - last_touched_at) / self.highlight_duration)
                    .clamp(0.0, 1.0) as f32,
            })
            .collect()
    }

    /// Replaces the active set with every block covering `resolution`, all
    /// stamped `now`. Used when layer structure changes and block-local
    /// tracking cannot express the damage.
    pub fn fill_all(&mut self, resolution: CanvasResolution, now: f64) {
        self.active.clear();
        let blocks_x = resolution.width.div_ceil(self.block_size) as i32;
        let blocks_y = resolution.height.div_ceil(self.block_size) as i32;
        for block_y in 0..blocks_y {
            for block_x in 0..blocks_x {
                self.active.insert(Block { block_x, block_y }, now);
            }
        }
    }

    /// Charges the footprints of still-buffered points to the current stroke
    /// without consuming them; the next `update` still marks their blocks
    /// active for redraw.
    pub fn commit_pending_to_stroke(&mut self) {
        for point in &self.pending_points {
            let (min_block, max_block) = footprint_block_range(point, self.block_size);
            for block_y in min_block.block_y..=max_block.block_y {
                for block_x in min_block.block_x..=max_block.block_x {
                    self.stroke_accum.insert(Block { block_x, block_y });
                }
            }
        }
    }

    /// Empties the per-stroke accumulator; active and fading are untouched.
    pub fn stroke_ended(&mut self) {
        self.stroke_accum.clear();
    }
}

fn footprint_block_range(point: &BrushPoint, block_size: u32) -> (Block, Block) {
    let half = point.scaled_diameter / 2.0;
    let size = block_size as f64;
    let min = Block {
        block_x: ((point.position_x - half) / size).floor() as i32,
        block_y: ((point.position_y - half) / size).floor() as i32,
    };
    let max = Block {
        block_x: ((point.position_x + half) / size).floor() as i32,
        block_y: ((point.position_y + half) / size).floor() as i32,
    };
    (min, max)
}
