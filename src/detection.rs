use serde::{Deserialize, Serialize};

use crate::my_types::*;

/// A candidate circle found in a single frame, before any identity is assigned.
/// Coordinates are whole pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Detection {
    pub x: i32,
    pub y: i32,
    pub r: i32,
}

impl Detection {
    pub fn new(x: i32, y: i32, r: i32) -> Self {
        Detection { x, y, r }
    }

    /// Round a sub-pixel circle as produced by a detector, halves to even.
    pub fn from_f32(x: f32, y: f32, r: f32) -> Self {
        Detection {
            x: x.round_ties_even() as i32,
            y: y.round_ties_even() as i32,
            r: r.round_ties_even() as i32,
        }
    }

    pub fn center(&self) -> Vector2d {
        Vector2d::new(self.x as f64, self.y as f64)
    }

    /// Bounding square of the circle clipped to an image of the given shape.
    pub fn region(&self, width: i32, height: i32) -> Region {
        Region {
            x1: (self.x - self.r).max(0),
            y1: (self.y - self.r).max(0),
            x2: (self.x + self.r).min(width),
            y2: (self.y + self.r).min(height),
        }
    }
}

/// Half-open pixel rectangle `[x1, x2) x [y1, y2)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Region {
    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Drop detections whose radius is below the floor.
pub fn filter_min_radius(detections: &mut Vec<Detection>, min_radius: f64) {
    detections.retain(|d| d.r as f64 >= min_radius);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding() {
        let d = Detection::from_f32(100.4, 99.5, 14.6);
        assert_eq!(d, Detection::new(100, 100, 15));

        let halves = Detection::from_f32(100.5, 101.5, 14.5);
        assert_eq!(halves, Detection::new(100, 102, 14));
    }

    #[test]
    fn test_region_is_clipped() {
        let d = Detection::new(5, 95, 10);
        let region = d.region(100, 100);
        assert_eq!(region, Region { x1: 0, y1: 85, x2: 15, y2: 100 });
        assert_eq!(region.width(), 15);
        assert_eq!(region.height(), 15);

        let outside = Detection::new(-30, 50, 10).region(100, 100);
        assert!(outside.is_empty());
    }

    #[test]
    fn test_min_radius_floor() {
        let mut detections = vec![
            Detection::new(0, 0, 9),
            Detection::new(0, 0, 10),
            Detection::new(0, 0, 40),
        ];
        filter_min_radius(&mut detections, 10.);
        assert_eq!(detections.len(), 2);
        assert!(detections.iter().all(|d| d.r >= 10));
    }
}
