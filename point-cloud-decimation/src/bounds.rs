/// Point cloud coordinate bounds tracking
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointCloudBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub min_z: f64,
    pub max_z: f64,
}

impl Default for PointCloudBounds {
    fn default() -> Self {
        Self::new()
    }
}

impl PointCloudBounds {
    /// Create new bounds initialised to infinity values
    pub fn new() -> Self {
        Self {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
            min_z: f64::INFINITY,
            max_z: f64::NEG_INFINITY,
        }
    }

    /// Build bounds from `[min_x, max_x, min_y, max_y, min_z, max_z]`.
    pub fn from_array(bounds: [f64; 6]) -> Self {
        Self {
            min_x: bounds[0],
            max_x: bounds[1],
            min_y: bounds[2],
            max_y: bounds[3],
            min_z: bounds[4],
            max_z: bounds[5],
        }
    }

    /// Flatten into `[min_x, max_x, min_y, max_y, min_z, max_z]`.
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.min_x, self.max_x, self.min_y, self.max_y, self.min_z, self.max_z,
        ]
    }

    /// Update bounds with a new point
    pub fn update(&mut self, x: f64, y: f64, z: f64) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
        self.min_z = self.min_z.min(z);
        self.max_z = self.max_z.max(z);
    }

    /// Grow these bounds to also cover `other`.
    pub fn merge(&mut self, other: &PointCloudBounds) {
        self.min_x = self.min_x.min(other.min_x);
        self.max_x = self.max_x.max(other.max_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_y = self.max_y.max(other.max_y);
        self.min_z = self.min_z.min(other.min_z);
        self.max_z = self.max_z.max(other.max_z);
    }

    /// True once at least one point has been added.
    pub fn is_valid(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y && self.min_z <= self.max_z
    }

    /// Get world space dimensions
    pub fn dimensions(&self) -> (f64, f64, f64) {
        (
            self.max_x - self.min_x,
            self.max_y - self.min_y,
            self.max_z - self.min_z,
        )
    }

    /// Minimum corner of the box.
    pub fn min_corner(&self) -> [f64; 3] {
        [self.min_x, self.min_y, self.min_z]
    }

    pub fn contains(&self, point: [f64; 3]) -> bool {
        point[0] >= self.min_x
            && point[0] <= self.max_x
            && point[1] >= self.min_y
            && point[1] <= self.max_y
            && point[2] >= self.min_z
            && point[2] <= self.max_z
    }
}
