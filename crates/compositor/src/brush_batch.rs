//! Brush point batching into a growable quad vertex buffer.
//!
//! Each brush point becomes two triangles mapping the unit-square stencil
//! texcoords. The buffer shadows a GPU vertex buffer, so capacity is tracked
//! explicitly and grows by doubling.

use bytemuck::Zeroable;
use paint_protocol::{BlendMode, BrushPoint, PixelRect, TextureHandle};

use crate::backend::RenderBackend;

pub const VERTICES_PER_POINT: usize = 6;

const INITIAL_VERTEX_CAPACITY: usize = 256 * VERTICES_PER_POINT;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BrushVertex {
    pub position: [f32; 2],
    pub texcoord: [f32; 2],
    pub color: [f32; 4],
}

static_assertions::const_assert_eq!(std::mem::size_of::<BrushVertex>(), 32);

#[derive(Debug)]
pub struct BrushBatchAccumulator {
    vertices: Box<[BrushVertex]>,
    vertex_count: usize,
    pending_point_count: usize,
    bounds: Option<(f64, f64, f64, f64)>,
}

impl Default for BrushBatchAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl BrushBatchAccumulator {
    pub fn new() -> Self {
        Self {
            vertices: vec![BrushVertex::zeroed(); INITIAL_VERTEX_CAPACITY].into_boxed_slice(),
            vertex_count: 0,
            pending_point_count: 0,
            bounds: None,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn pending_point_count(&self) -> usize {
        self.pending_point_count
    }

    pub fn vertex_capacity(&self) -> usize {
        self.vertices.len()
    }

    pub fn pending_vertices(&self) -> &[BrushVertex] {
        &self.vertices[..self.vertex_count]
    }

    /// Bounding box of every point footprint added since the last flush.
    pub fn pending_bounds(&self) -> Option<PixelRect> {
        self.bounds.map(|(min_x, min_y, max_x, max_y)| {
            PixelRect::new(
                min_x.floor() as i32,
                min_y.floor() as i32,
                max_x.ceil() as i32,
                max_y.ceil() as i32,
            )
        })
    }

    /// Appends six vertices per point. The point's `rotation` is carried by
    /// the input record but not applied to quad geometry.
    pub fn add_points(&mut self, points: &[BrushPoint]) {
        for point in points {
            let half = point.scaled_diameter / 2.0;
            let min_x = point.position_x - half;
            let min_y = point.position_y - half;
            let max_x = point.position_x + half;
            let max_y = point.position_y + half;

            self.bounds = Some(match self.bounds {
                Some((bounds_min_x, bounds_min_y, bounds_max_x, bounds_max_y)) => (
                    bounds_min_x.min(min_x),
                    bounds_min_y.min(min_y),
                    bounds_max_x.max(max_x),
                    bounds_max_y.max(max_y),
                ),
                None => (min_x, min_y, max_x, max_y),
            });

            let color = [
                point.color[0],
                point.color[1],
                point.color[2],
                point.alpha as f32,
            ];
            let corners = [
                (min_x, min_y, 0.0, 0.0),
                (max_x, min_y, 1.0, 0.0),
                (min_x, max_y, 0.0, 1.0),
                (max_x, min_y, 1.0, 0.0),
                (max_x, max_y, 1.0, 1.0),
                (min_x, max_y, 0.0, 1.0),
            ];
            self.ensure_capacity(self.vertex_count + VERTICES_PER_POINT);
            for (x, y, u, v) in corners {
                self.vertices[self.vertex_count] = BrushVertex {
                    position: [x as f32, y as f32],
                    texcoord: [u, v],
                    color,
                };
                self.vertex_count += 1;
            }
            self.pending_point_count += 1;
        }
    }

    pub fn can_flush(&self) -> bool {
        self.pending_point_count > 0
    }

    /// Submits the buffered quads as one draw call, then resets the offset
    /// and bounding box.
    pub fn flush(
        &mut self,
        backend: &mut dyn RenderBackend,
        target: TextureHandle,
        stencil_slot: usize,
        blend: BlendMode,
    ) {
        if !self.can_flush() {
            return;
        }
        backend.draw_brush_vertices(
            target,
            stencil_slot,
            &self.vertices[..self.vertex_count],
            blend,
        );
        self.reset();
    }

    pub fn reset(&mut self) {
        self.vertex_count = 0;
        self.pending_point_count = 0;
        self.bounds = None;
    }

    fn ensure_capacity(&mut self, required: usize) {
        if required <= self.vertices.len() {
            return;
        }
        let mut new_capacity = self.vertices.len().max(INITIAL_VERTEX_CAPACITY);
        while new_capacity < required {
            new_capacity = new_capacity
                .checked_mul(2)
                .expect("brush vertex capacity overflow");
        }
        let mut new_vertices = vec![BrushVertex::zeroed(); new_capacity].into_boxed_slice();
        new_vertices[..self.vertex_count].copy_from_slice(&self.vertices[..self.vertex_count]);
        self.vertices = new_vertices;
    }
}
