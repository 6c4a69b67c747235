use std::collections::BTreeMap;

use log::{debug, warn};

use crate::descriptor::Descriptor;
use crate::detection::Detection;
use crate::my_types::*;
use crate::persistence::AppearanceHistory;
use crate::track::Track;

/// Owner of every live track. Tracks are only mutated through `upsert` and `evict_idle`.
#[derive(Debug)]
pub struct TrackStore {
    tracks: BTreeMap<TrackId, Track>,
    window: usize,
    /// `(id, final appearance count)` of evicted tracks, in eviction order
    retired: Vec<(TrackId, u32)>,
}

impl TrackStore {
    pub fn new(window: usize) -> Self {
        TrackStore {
            tracks: BTreeMap::new(),
            window: window.max(1),
            retired: vec![],
        }
    }

    /// Update the track `id` with a new observation, or create it when it does not exist.
    /// An existing track only replaces its descriptor when `descriptor` is `Some`.
    pub fn upsert(
        &mut self,
        id: TrackId,
        detection: &Detection,
        descriptor: Option<Descriptor>,
        frame_number: FrameIndex,
    ) {
        if let Some(track) = self.tracks.get_mut(&id) {
            track.push_position(detection.center());
            if descriptor.is_some() {
                track.descriptor = descriptor;
            }
            if frame_number < track.last_seen {
                warn!(
                    "track {} updated at frame {} after frame {}",
                    id, frame_number, track.last_seen
                );
            }
            track.last_seen = track.last_seen.max(frame_number);
            track.appearance_count += 1;
        } else {
            debug!("new track {} at ({}, {}) frame {}", id, detection.x, detection.y, frame_number);
            self.tracks.insert(
                id,
                Track::new(id, detection.center(), self.window, descriptor, frame_number),
            );
        }
    }

    /// Forget every track unseen for more than `max_idle` frames. Returns the evicted ids.
    pub fn evict_idle(&mut self, frame_number: FrameIndex, max_idle: u64) -> Vec<TrackId> {
        let idle: Vec<TrackId> = self
            .tracks
            .values()
            .filter(|t| frame_number.saturating_sub(t.last_seen) > max_idle)
            .map(|t| t.id)
            .collect();
        for id in &idle {
            if let Some(track) = self.tracks.remove(id) {
                debug!(
                    "evict track {} at frame {} (last seen {}, {} appearances)",
                    id, frame_number, track.last_seen, track.appearance_count
                );
                self.retired.push((track.id, track.appearance_count));
            }
        }
        idle
    }

    pub fn reference_position(&self, id: TrackId) -> Option<Vector2d> {
        self.tracks.get(&id).map(|t| t.reference_position())
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.tracks.contains_key(&id)
    }

    /// Live tracks in ascending id order.
    pub fn snapshot(&self) -> impl Iterator<Item = &Track> + '_ {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Appearance counts of every track ever created, evicted ones included.
    pub fn history(&self) -> AppearanceHistory {
        let mut history = AppearanceHistory::default();
        for &(id, count) in &self.retired {
            history.record(id, count);
        }
        for track in self.tracks.values() {
            history.record(track.id, track.appearance_count);
        }
        history
    }
}
