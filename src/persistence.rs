use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::my_types::*;

/// Cumulative appearance count of every identity seen during a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AppearanceHistory {
    counts: BTreeMap<TrackId, u32>,
}

impl AppearanceHistory {
    pub fn record(&mut self, id: TrackId, count: u32) {
        self.counts.insert(id, count);
    }

    pub fn count(&self, id: TrackId) -> Option<u32> {
        self.counts.get(&id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TrackId, u32)> + '_ {
        self.counts.iter().map(|(&id, &count)| (id, count))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl FromIterator<(TrackId, u32)> for AppearanceHistory {
    fn from_iter<I: IntoIterator<Item = (TrackId, u32)>>(iter: I) -> Self {
        AppearanceHistory {
            counts: iter.into_iter().collect(),
        }
    }
}

/// Decides which identities were real objects rather than noise.
#[derive(Clone, Copy, Debug)]
pub struct PersistenceFilter {
    min_persistence: u32,
}

impl PersistenceFilter {
    pub fn new(min_persistence: u32) -> Self {
        Self { min_persistence }
    }

    pub fn is_persistent(&self, appearance_count: u32) -> bool {
        appearance_count >= self.min_persistence
    }

    pub fn filter(&self, history: &AppearanceHistory) -> BTreeSet<TrackId> {
        history
            .iter()
            .filter(|&(_, count)| self.is_persistent(count))
            .map(|(id, _)| id)
            .collect()
    }
}
