use std::collections::BTreeSet;

use log::debug;

use crate::config::Config;
use crate::descriptor::*;
use crate::detection::Detection;
use crate::error::Result;
use crate::my_types::*;
use crate::persistence::{AppearanceHistory, PersistenceFilter};
use crate::track_store::TrackStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignmentKind {
    Matched,
    Created,
}

/// Identity given to one detection of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub detection: Detection,
    pub track_id: TrackId,
    pub kind: AssignmentKind,
}

/// Result of associating one frame.
#[derive(Clone, Debug, Default)]
pub struct FrameOutcome {
    pub frame_number: FrameIndex,
    /// In detection order. Undescribable detections are absent.
    pub assignments: Vec<Assignment>,
    /// Detections dropped because no descriptor could be computed
    pub discarded: usize,
    pub evicted: Vec<TrackId>,
}

impl FrameOutcome {
    /// Identities matched or created in this frame.
    pub fn unique_ids(&self) -> BTreeSet<TrackId> {
        self.assignments.iter().map(|a| a.track_id).collect()
    }

    pub fn unique_count(&self) -> usize {
        self.unique_ids().len()
    }

    pub fn created(&self) -> usize {
        self.assignments
            .iter()
            .filter(|a| a.kind == AssignmentKind::Created)
            .count()
    }
}

/// Frame-by-frame association of detections to tracks.
///
/// Each described detection is gated against every live track, first on the distance to the
/// track's averaged position and then on the average descriptor distance. The passing track with
/// the lowest descriptor distance wins. Detections are decided one at a time in input order, so
/// several detections of the same frame can land on the same track.
pub struct Tracker<M = HammingMatcher> {
    config: Config,
    matcher: M,
    store: TrackStore,
    next_id: TrackId,
    /// Number of frames processed so far
    step: FrameIndex,
}

impl Tracker<HammingMatcher> {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_matcher(config, HammingMatcher::default())
    }
}

impl<M: DescriptorMatcher> Tracker<M> {
    pub fn with_matcher(config: Config, matcher: M) -> Result<Self> {
        config.validate()?;
        Ok(Tracker {
            store: TrackStore::new(config.position_window),
            config,
            matcher,
            next_id: 1,
            step: 0,
        })
    }

    /// Describe and associate the detections of the next frame.
    ///
    /// Descriptors are computed for the whole frame before the store is touched, so a provider
    /// failure leaves the tracker exactly as it was after the previous frame.
    pub fn process<P: DescriptorProvider>(
        &mut self,
        frame: &P::Frame,
        detections: &[Detection],
        provider: &mut P,
    ) -> Result<FrameOutcome> {
        let descriptors = provider.describe_all(frame, detections)?;
        let described = detections.iter().copied().zip(descriptors).collect();
        Ok(self.associate(described))
    }

    /// Associate already described detections as the next frame.
    pub fn associate(&mut self, described: Vec<(Detection, Option<Descriptor>)>) -> FrameOutcome {
        self.step += 1;
        let frame_number = self.step;
        let mut outcome = FrameOutcome {
            frame_number,
            ..Default::default()
        };

        for (detection, descriptor) in described {
            let Some(descriptor) = descriptor else {
                debug!(
                    "frame {}: no descriptor for ({}, {}, r={}), dropped",
                    frame_number, detection.x, detection.y, detection.r
                );
                outcome.discarded += 1;
                continue;
            };

            let assignment = match self.best_match(&detection, &descriptor) {
                Some((id, distance)) => {
                    let replacement =
                        (distance < self.config.update_descriptor_threshold).then_some(descriptor);
                    debug!(
                        "frame {}: ({}, {}) matched track {} at distance {:.1}{}",
                        frame_number,
                        detection.x,
                        detection.y,
                        id,
                        distance,
                        if replacement.is_some() { ", descriptor refreshed" } else { "" }
                    );
                    self.store.upsert(id, &detection, replacement, frame_number);
                    Assignment {
                        detection,
                        track_id: id,
                        kind: AssignmentKind::Matched,
                    }
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.store.upsert(id, &detection, Some(descriptor), frame_number);
                    Assignment {
                        detection,
                        track_id: id,
                        kind: AssignmentKind::Created,
                    }
                }
            };
            outcome.assignments.push(assignment);
        }

        outcome.evicted = self.store.evict_idle(frame_number, self.config.max_idle);
        outcome
    }

    /// Best gate-passing track for a detection and its average descriptor distance.
    fn best_match(&self, detection: &Detection, descriptor: &Descriptor) -> Option<(TrackId, f64)> {
        let center = detection.center();
        let mut best: Option<(TrackId, f64)> = None;
        for track in self.store.snapshot() {
            if (center - track.reference_position()).norm() > self.config.spatial_threshold {
                continue;
            }
            // never match on position alone
            let Some(track_descriptor) = track.descriptor() else {
                continue;
            };
            let comparison = self.matcher.compare(descriptor, track_descriptor);
            if comparison.pairs < self.config.min_match_count {
                continue;
            }
            let distance = comparison.average_distance;
            if distance < self.config.descriptor_threshold
                && best.map_or(true, |(_, best_distance)| distance < best_distance)
            {
                best = Some((track.id(), distance));
            }
        }
        best
    }

    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Index of the last processed frame, 0 before the first one.
    pub fn frame_number(&self) -> FrameIndex {
        self.step
    }

    /// Number of identities handed out so far.
    pub fn total_created(&self) -> u64 {
        self.next_id - 1
    }

    pub fn history(&self) -> AppearanceHistory {
        self.store.history()
    }

    /// Identities seen in at least `min_persistence` frames over the whole run so far.
    pub fn persistent_ids(&self) -> BTreeSet<TrackId> {
        PersistenceFilter::new(self.config.min_persistence).filter(&self.history())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackerError;
    use crate::track::Track;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;
    use std::collections::HashMap;

    fn random_descriptor(rng: &mut Xoshiro256PlusPlus, rows: usize) -> Descriptor {
        let rows = (0..rows)
            .map(|_| {
                let mut row = [0u8; DESCRIPTOR_BYTES];
                rng.fill(&mut row[..]);
                row
            })
            .collect();
        Descriptor::new(rows).unwrap()
    }

    /// Flip the first `bits` bits of every row.
    fn perturb(descriptor: &Descriptor, bits: usize) -> Descriptor {
        let rows = descriptor
            .rows()
            .iter()
            .map(|row| {
                let mut row = *row;
                for b in 0..bits {
                    row[b / 8] ^= 1 << (b % 8);
                }
                row
            })
            .collect();
        Descriptor::new(rows).unwrap()
    }

    fn tracker() -> Tracker {
        Tracker::new(Config::default()).unwrap()
    }

    struct NoDescriptor;

    impl DescriptorProvider for NoDescriptor {
        type Frame = ();

        fn describe(&mut self, _frame: &(), _detection: &Detection) -> Result<Option<Descriptor>> {
            Ok(None)
        }
    }

    struct Failing;

    impl DescriptorProvider for Failing {
        type Frame = ();

        fn describe(&mut self, _frame: &(), _detection: &Detection) -> Result<Option<Descriptor>> {
            Err(TrackerError::source_unavailable("extractor crashed"))
        }
    }

    #[test]
    fn test_single_stable_circle() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let descriptor = random_descriptor(&mut rng, 12);
        let config = Config {
            spatial_threshold: 23.,
            descriptor_threshold: 35.,
            min_persistence: 16,
            ..Config::default()
        };
        let mut tracker = Tracker::new(config).unwrap();
        let detection = Detection::new(100, 100, 15);

        for frame in 1..=20 {
            let outcome = tracker.associate(vec![(detection, Some(descriptor.clone()))]);
            assert_eq!(outcome.frame_number, frame);
            assert_eq!(outcome.assignments.len(), 1);
            assert_eq!(outcome.assignments[0].track_id, 1);
            let expected = if frame == 1 {
                AssignmentKind::Created
            } else {
                AssignmentKind::Matched
            };
            assert_eq!(outcome.assignments[0].kind, expected);
            assert_eq!(outcome.unique_count(), 1);
        }
        assert_eq!(tracker.total_created(), 1);
        assert_eq!(tracker.history().count(1), Some(20));
        assert_eq!(tracker.persistent_ids().len(), 1);
    }

    #[test]
    fn test_short_lived_track_is_evicted_and_not_persistent() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        let descriptor = random_descriptor(&mut rng, 10);
        let mut tracker = tracker();
        let detection = Detection::new(200, 150, 20);

        for _ in 0..3 {
            tracker.associate(vec![(detection, Some(descriptor.clone()))]);
        }
        assert!(tracker.store().contains(1));

        let max_idle = tracker.config().max_idle;
        for _ in 0..max_idle {
            let outcome = tracker.associate(vec![]);
            assert!(outcome.evicted.is_empty());
            assert_eq!(outcome.unique_count(), 0);
        }
        let outcome = tracker.associate(vec![]);
        assert_eq!(outcome.evicted, vec![1]);
        assert!(tracker.store().is_empty());

        assert_eq!(tracker.history().count(1), Some(3));
        assert!(tracker.persistent_ids().is_empty());

        // the same object returning is a new identity
        let outcome = tracker.associate(vec![(detection, Some(descriptor))]);
        assert_eq!(outcome.assignments[0].track_id, 2);
        assert_eq!(outcome.assignments[0].kind, AssignmentKind::Created);
    }

    #[test]
    fn test_two_detections_can_share_a_track() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let descriptor = random_descriptor(&mut rng, 10);
        let mut tracker = tracker();
        tracker.associate(vec![(Detection::new(100, 100, 15), Some(descriptor.clone()))]);

        let outcome = tracker.associate(vec![
            (Detection::new(98, 100, 15), Some(descriptor.clone())),
            (Detection::new(103, 101, 15), Some(descriptor.clone())),
        ]);
        let ids: Vec<TrackId> = outcome.assignments.iter().map(|a| a.track_id).collect();
        assert_eq!(ids, vec![1, 1]);
        assert!(outcome
            .assignments
            .iter()
            .all(|a| a.kind == AssignmentKind::Matched));
        assert_eq!(outcome.unique_count(), 1);
        assert_eq!(tracker.store().len(), 1);
        assert_eq!(tracker.store().get(1).map(Track::appearance_count), Some(3));
    }

    #[test]
    fn test_undescribable_detection_is_dropped() {
        let mut tracker = tracker();
        let outcome = tracker
            .process(&(), &[Detection::new(50, 50, 12)], &mut NoDescriptor)
            .unwrap();
        assert_eq!(outcome.discarded, 1);
        assert!(outcome.assignments.is_empty());
        assert_eq!(outcome.unique_count(), 0);
        assert!(tracker.store().is_empty());
        assert_eq!(tracker.total_created(), 0);
    }

    #[test]
    fn test_provider_failure_leaves_tracker_untouched() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);
        let mut tracker = tracker();
        tracker.associate(vec![(Detection::new(10, 10, 12), Some(random_descriptor(&mut rng, 8)))]);

        let err = tracker.process(&(), &[Detection::new(10, 10, 12)], &mut Failing);
        assert!(matches!(err, Err(TrackerError::SourceUnavailable(_))));
        assert_eq!(tracker.frame_number(), 1);
        assert_eq!(tracker.history().count(1), Some(1));
    }

    #[test]
    fn test_descriptor_refreshed_only_on_strong_match() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let original = random_descriptor(&mut rng, 10);
        let mut tracker = tracker();
        let detection = Detection::new(300, 300, 25);
        tracker.associate(vec![(detection, Some(original.clone()))]);

        // 20 differing bits per row: accepted (< 35) but not strong enough (>= 18)
        let borderline = perturb(&original, 20);
        let outcome = tracker.associate(vec![(detection, Some(borderline))]);
        assert_eq!(outcome.assignments[0].kind, AssignmentKind::Matched);
        assert_eq!(tracker.store().get(1).unwrap().descriptor(), Some(&original));

        let strong = perturb(&original, 5);
        tracker.associate(vec![(detection, Some(strong.clone()))]);
        assert_eq!(tracker.store().get(1).unwrap().descriptor(), Some(&strong));
    }

    #[test]
    fn test_spatial_gate_is_inclusive() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(6);
        let descriptor = random_descriptor(&mut rng, 10);
        let mut tracker = tracker();
        tracker.associate(vec![(Detection::new(100, 100, 15), Some(descriptor.clone()))]);

        let outcome = tracker.associate(vec![(Detection::new(123, 100, 15), Some(descriptor.clone()))]);
        assert_eq!(outcome.assignments[0].track_id, 1);

        // reference is now the mean (111.5, 100); 135 is 23.5 away
        let outcome = tracker.associate(vec![(Detection::new(135, 100, 15), Some(descriptor))]);
        assert_eq!(outcome.assignments[0].kind, AssignmentKind::Created);
        assert_eq!(outcome.assignments[0].track_id, 2);
    }

    #[test]
    fn test_descriptor_gate_separates_nearby_objects() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let a = random_descriptor(&mut rng, 10);
        let b = random_descriptor(&mut rng, 10);
        let mut tracker = tracker();
        tracker.associate(vec![(Detection::new(100, 100, 15), Some(a))]);

        let outcome = tracker.associate(vec![(Detection::new(101, 100, 15), Some(b))]);
        assert_eq!(outcome.assignments[0].kind, AssignmentKind::Created);
        assert_eq!(tracker.store().len(), 2);
    }

    #[test]
    fn test_too_few_pairs_is_no_match() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(8);
        let small = random_descriptor(&mut rng, 4);
        let mut tracker = tracker();
        tracker.associate(vec![(Detection::new(100, 100, 15), Some(small.clone()))]);
        let outcome = tracker.associate(vec![(Detection::new(100, 100, 15), Some(small))]);
        assert_eq!(outcome.assignments[0].kind, AssignmentKind::Created);
    }

    #[test]
    fn test_closest_descriptor_wins() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);
        let base = random_descriptor(&mut rng, 10);
        let mut tracker = tracker();
        tracker.associate(vec![
            (Detection::new(100, 100, 15), Some(perturb(&base, 30))),
            (Detection::new(140, 100, 15), Some(perturb(&base, 3))),
        ]);
        assert_eq!(tracker.store().len(), 2);

        // both tracks within 23 px of (120, 100); track 2 is the closer descriptor
        let outcome = tracker.associate(vec![(Detection::new(120, 100, 15), Some(base))]);
        assert_eq!(outcome.assignments[0].track_id, 2);
    }

    #[test]
    fn test_random_streams_keep_invariants() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let config = Config::default();
        let mut tracker = Tracker::new(config.clone()).unwrap();
        let objects: Vec<(Detection, Descriptor)> = (0..6)
            .map(|i| {
                (
                    Detection::new(60 + 90 * i, 120, 15),
                    random_descriptor(&mut rng, 10),
                )
            })
            .collect();

        let mut last_seen: HashMap<TrackId, FrameIndex> = HashMap::new();
        let mut max_id_seen: TrackId = 0;
        for _ in 0..300 {
            let mut frame = vec![];
            for (detection, descriptor) in &objects {
                if rng.gen_bool(0.7) {
                    let jitter = Detection::new(
                        detection.x + rng.gen_range(-4..=4),
                        detection.y + rng.gen_range(-4..=4),
                        detection.r,
                    );
                    let described = if rng.gen_bool(0.1) {
                        None
                    } else {
                        Some(perturb(descriptor, rng.gen_range(0..25)))
                    };
                    frame.push((jitter, described));
                }
            }
            if rng.gen_bool(0.3) {
                let noise = Detection::new(rng.gen_range(0..640), rng.gen_range(0..480), 12);
                frame.push((noise, Some(random_descriptor(&mut rng, 8))));
            }

            let outcome = tracker.associate(frame);
            let frame_number = outcome.frame_number;

            for assignment in &outcome.assignments {
                if assignment.kind == AssignmentKind::Created {
                    // fresh identities are strictly increasing, never reused
                    assert!(assignment.track_id > max_id_seen);
                    max_id_seen = assignment.track_id;
                }
            }
            for track in tracker.store().snapshot() {
                assert!(track.positions().len() <= config.position_window);
                assert!(frame_number - track.last_seen() <= config.max_idle);
                let previous = last_seen.insert(track.id(), track.last_seen());
                assert!(previous.map_or(true, |p| p <= track.last_seen()));
            }
            for id in &outcome.evicted {
                assert!(!tracker.store().contains(*id));
                assert_eq!(frame_number - last_seen[id], config.max_idle + 1);
            }
        }

        let history = tracker.history();
        assert_eq!(history.len() as u64, tracker.total_created());
        let filter = PersistenceFilter::new(config.min_persistence);
        assert_eq!(filter.filter(&history), filter.filter(&history));
        assert!(!filter.filter(&history).is_empty());
    }
}
