/// Clip volumes and contour polygons used to cut pieces down.
use crate::registry::PieceRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Axis aligned clip volume.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClipBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl ClipBox {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Build from `[min_x, max_x, min_y, max_y, min_z, max_z]`.
    pub fn from_bounds(bounds: [f64; 6]) -> Self {
        Self {
            min: [bounds[0], bounds[2], bounds[4]],
            max: [bounds[1], bounds[3], bounds[5]],
        }
    }

    pub fn contains(&self, point: [f64; 3]) -> bool {
        (0..3).all(|axis| point[axis] >= self.min[axis] && point[axis] <= self.max[axis])
    }
}

/// Session clip setting. The box is remembered while clipping is switched off.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClipSpec {
    pub enabled: bool,
    pub bounds: ClipBox,
}

impl ClipSpec {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn enabled(bounds: ClipBox) -> Self {
        Self {
            enabled: true,
            bounds,
        }
    }

    /// The box to clip against, if clipping is on.
    pub fn active(&self) -> Option<&ClipBox> {
        self.enabled.then_some(&self.bounds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContourMode {
    /// Points must fall inside at least one keep polygon.
    Keep,
    /// Points inside are discarded.
    Remove,
}

/// Closed polygon in the XY plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourPolygon {
    pub vertices: Vec<[f64; 2]>,
    pub mode: ContourMode,
}

impl ContourPolygon {
    pub fn new(vertices: Vec<[f64; 2]>, mode: ContourMode) -> Self {
        Self { vertices, mode }
    }

    /// Even-odd crossing test.
    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }

        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let [xi, yi] = self.vertices[i];
            let [xj, yj] = self.vertices[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Contours attached to individual pieces.
#[derive(Debug, Clone, Default)]
pub struct ContourSet {
    polygons: HashMap<PieceRef, Vec<ContourPolygon>>,
}

impl ContourSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, piece: PieceRef, polygon: ContourPolygon) {
        self.polygons.entry(piece).or_default().push(polygon);
    }

    pub fn for_piece(&self, piece: &PieceRef) -> &[ContourPolygon] {
        self.polygons.get(piece).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `point` survives every contour in `polygons`.
    pub fn keeps(polygons: &[ContourPolygon], point: [f64; 3]) -> bool {
        let [x, y, _] = point;
        let mut has_keep = false;
        let mut in_keep = false;

        for polygon in polygons {
            let inside = polygon.contains_xy(x, y);
            match polygon.mode {
                ContourMode::Remove if inside => return false,
                ContourMode::Remove => {}
                ContourMode::Keep => {
                    has_keep = true;
                    in_keep |= inside;
                }
            }
        }
        !has_keep || in_keep
    }
}
