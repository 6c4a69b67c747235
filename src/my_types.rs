use nalgebra as na;

pub type Vector2d = na::Vector2<f64>;

/// Identity of a track, assigned from 1 upwards and never reused.
pub type TrackId = u64;

/// 1-based index of a processed frame.
pub type FrameIndex = u64;
