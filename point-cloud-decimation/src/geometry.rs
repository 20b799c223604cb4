/// In-memory point geometry produced by a piece read.
use crate::bounds::PointCloudBounds;
use crate::precision::Precision;
use rayon::prelude::*;

const BOUNDS_CHUNK_SIZE: usize = 25_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Positions {
    Float(Vec<[f32; 3]>),
    Double(Vec<[f64; 3]>),
}

impl Positions {
    pub fn len(&self) -> usize {
        match self {
            Positions::Float(points) => points.len(),
            Positions::Double(points) => points.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> [f64; 3] {
        match self {
            Positions::Float(points) => {
                let [x, y, z] = points[index];
                [x as f64, y as f64, z as f64]
            }
            Positions::Double(points) => points[index],
        }
    }
}

/// Points plus optional per point classification codes.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    positions: Positions,
    classifications: Option<Vec<u8>>,
    bounds: PointCloudBounds,
}

impl Geometry {
    pub fn new(points: Vec<[f64; 3]>, classifications: Option<Vec<u8>>) -> Self {
        let bounds = compute_bounds(&points);
        Self {
            positions: Positions::Double(points),
            classifications,
            bounds,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), None)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn precision(&self) -> Precision {
        match self.positions {
            Positions::Float(_) => Precision::Float,
            Positions::Double(_) => Precision::Double,
        }
    }

    pub fn positions(&self) -> &Positions {
        &self.positions
    }

    pub fn classifications(&self) -> Option<&[u8]> {
        self.classifications.as_deref()
    }

    /// Bounds of the points as read, before any float narrowing.
    pub fn bounds(&self) -> &PointCloudBounds {
        &self.bounds
    }

    pub fn point(&self, index: usize) -> [f64; 3] {
        self.positions.get(index)
    }

    pub fn iter_points(&self) -> impl Iterator<Item = [f64; 3]> + '_ {
        (0..self.len()).map(|index| self.positions.get(index))
    }

    /// Convert the stored coordinates to the requested width.
    pub fn with_precision(self, precision: Precision) -> Self {
        let positions = match (self.positions, precision) {
            (Positions::Double(points), Precision::Float) => Positions::Float(
                points
                    .into_iter()
                    .map(|[x, y, z]| [x as f32, y as f32, z as f32])
                    .collect(),
            ),
            (Positions::Float(points), Precision::Double) => Positions::Double(
                points
                    .into_iter()
                    .map(|[x, y, z]| [x as f64, y as f64, z as f64])
                    .collect(),
            ),
            (positions, _) => positions,
        };

        Self {
            positions,
            classifications: self.classifications,
            bounds: self.bounds,
        }
    }

    /// Keep only the points accepted by `keep`, preserving precision.
    pub fn filter<F>(&self, keep: F) -> Geometry
    where
        F: Fn([f64; 3]) -> bool + Sync,
    {
        let mask: Vec<bool> = (0..self.len())
            .into_par_iter()
            .map(|index| keep(self.positions.get(index)))
            .collect();

        let classifications = self.classifications.as_ref().map(|codes| {
            codes
                .iter()
                .zip(&mask)
                .filter_map(|(code, keep)| keep.then_some(*code))
                .collect()
        });

        let kept: Vec<[f64; 3]> = self
            .iter_points()
            .zip(&mask)
            .filter_map(|(point, keep)| keep.then_some(point))
            .collect();

        Geometry::new(kept, classifications).with_precision(self.precision())
    }
}

/// Compute bounds in parallel chunks.
fn compute_bounds(points: &[[f64; 3]]) -> PointCloudBounds {
    points
        .par_chunks(BOUNDS_CHUNK_SIZE)
        .map(|chunk| {
            let mut bounds = PointCloudBounds::new();
            for &[x, y, z] in chunk {
                bounds.update(x, y, z);
            }
            bounds
        })
        .reduce_with(|mut a, b| {
            a.merge(&b);
            a
        })
        .unwrap_or_default()
}
