//! Mathematical structs and functions.

use cgmath::prelude::*;
use cgmath::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// A 2D point
pub type Point2d = Point2<f64>;

/// A 2D vector
pub type Vector2d = Vector2<f64>;

/// Rotates a vector 90 degrees clockwise.
pub fn rot90(vec: Vector2d) -> Vector2d {
    Vector2d::new(-vec.y, vec.x)
}

/// A straight line segment, used as the centre line of a lane.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineSegment2d {
    pub start: [f64; 2],
    pub end: [f64; 2],
}

impl LineSegment2d {
    /// Creates a line segment from its two end points.
    pub fn from_ends(start: Point2d, end: Point2d) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn start(&self) -> Point2d {
        self.start.into()
    }

    pub fn end(&self) -> Point2d {
        self.end.into()
    }

    /// The length of the segment in m.
    pub fn length(&self) -> f64 {
        self.start().distance(self.end())
    }

    /// A unit vector pointing from the start to the end of the segment.
    pub fn tangent(&self) -> Vector2d {
        let delta = self.end() - self.start();
        if delta.magnitude2() > 0.0 {
            delta.normalize()
        } else {
            Vector2d::new(1.0, 0.0)
        }
    }

    /// Samples the point `pos` metres along the segment, which is
    /// linearly extrapolated when outside of it.
    pub fn sample(&self, pos: f64) -> Point2d {
        self.start() + self.tangent() * pos
    }

    /// Translates the segment sideways by `offset` metres.
    pub fn offset(&self, offset: f64) -> Self {
        let perp = rot90(self.tangent()) * offset;
        Self::from_ends(self.start() + perp, self.end() + perp)
    }
}
