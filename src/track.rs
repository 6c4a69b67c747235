use std::collections::VecDeque;

use crate::descriptor::Descriptor;
use crate::my_types::*;

#[derive(Clone, Debug)]
pub struct Track {
    pub(crate) id: TrackId,
    /// Most recent centres, oldest first
    pub(crate) positions: VecDeque<Vector2d>,
    pub(crate) window: usize,
    pub(crate) descriptor: Option<Descriptor>,
    pub(crate) last_seen: FrameIndex,
    pub(crate) appearance_count: u32,
}

impl Track {
    pub fn new(
        id: TrackId,
        position: Vector2d,
        window: usize,
        descriptor: Option<Descriptor>,
        frame_number: FrameIndex,
    ) -> Self {
        let mut positions = VecDeque::with_capacity(window);
        positions.push_back(position);
        Track {
            id,
            positions,
            window,
            descriptor,
            last_seen: frame_number,
            appearance_count: 1,
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn positions(&self) -> &VecDeque<Vector2d> {
        &self.positions
    }

    pub fn descriptor(&self) -> Option<&Descriptor> {
        self.descriptor.as_ref()
    }

    pub fn last_seen(&self) -> FrameIndex {
        self.last_seen
    }

    pub fn appearance_count(&self) -> u32 {
        self.appearance_count
    }

    /// Mean of the position window.
    pub fn reference_position(&self) -> Vector2d {
        let sum = self
            .positions
            .iter()
            .fold(Vector2d::zeros(), |acc, p| acc + p);
        sum / self.positions.len() as f64
    }

    pub(crate) fn push_position(&mut self, position: Vector2d) {
        self.positions.push_back(position);
        while self.positions.len() > self.window {
            self.positions.pop_front();
        }
    }
}
