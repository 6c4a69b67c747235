use serde::{Deserialize, Serialize};

use crate::detection::Detection;
use crate::error::Result;

/// Bytes in one binary feature row (256-bit ORB / BRIEF layout).
pub const DESCRIPTOR_BYTES: usize = 32;

pub type DescriptorRow = [u8; DESCRIPTOR_BYTES];

/// Appearance fingerprint of one detection: the binary rows of the keypoints found in its region.
/// Never empty, an undescribable region has no descriptor at all.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Descriptor {
    rows: Vec<DescriptorRow>,
}

impl Descriptor {
    pub fn new(rows: Vec<DescriptorRow>) -> Option<Descriptor> {
        if rows.is_empty() {
            None
        } else {
            Some(Descriptor { rows })
        }
    }

    pub fn rows(&self) -> &[DescriptorRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<'de> Deserialize<'de> for Descriptor {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let rows = Vec::<DescriptorRow>::deserialize(deserializer)?;
        Descriptor::new(rows).ok_or_else(|| serde::de::Error::custom("descriptor has no rows"))
    }
}

/// Outcome of comparing two descriptors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Comparison {
    /// Mean distance over the matched pairs, infinite when there are none
    pub average_distance: f64,
    pub pairs: usize,
}

/// Distance function between descriptors.
pub trait DescriptorMatcher {
    fn compare(&self, query: &Descriptor, train: &Descriptor) -> Comparison;
}

/// Brute-force Hamming matcher. With `cross_check` a pair `(i, j)` is kept only when `j` is the
/// nearest train row of query `i` and `i` is the nearest query row of train `j`.
#[derive(Clone, Copy, Debug)]
pub struct HammingMatcher {
    pub cross_check: bool,
}

impl Default for HammingMatcher {
    fn default() -> Self {
        HammingMatcher { cross_check: true }
    }
}

#[inline]
pub fn hamming(a: &DescriptorRow, b: &DescriptorRow) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Index and distance of the first minimum.
fn argmin(distances: impl Iterator<Item = u32>) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (idx, d) in distances.enumerate() {
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((idx, d)),
        }
    }
    best
}

impl DescriptorMatcher for HammingMatcher {
    fn compare(&self, query: &Descriptor, train: &Descriptor) -> Comparison {
        let n_train = train.len();
        let distances: Vec<u32> = query
            .rows()
            .iter()
            .flat_map(|q| train.rows().iter().map(move |t| hamming(q, t)))
            .collect();
        let at = |qi: usize, ti: usize| distances[qi * n_train + ti];

        let mut total = 0u64;
        let mut pairs = 0usize;
        for qi in 0..query.len() {
            let Some((ti, d)) = argmin((0..n_train).map(|ti| at(qi, ti))) else {
                continue;
            };
            if self.cross_check {
                let back = argmin((0..query.len()).map(|qj| at(qj, ti)));
                if back.map(|(qj, _)| qj) != Some(qi) {
                    continue;
                }
            }
            total += d as u64;
            pairs += 1;
        }

        let average_distance = if pairs == 0 {
            f64::INFINITY
        } else {
            total as f64 / pairs as f64
        };
        Comparison {
            average_distance,
            pairs,
        }
    }
}

/// Computes the appearance descriptor of a detection within its frame.
pub trait DescriptorProvider {
    type Frame;

    /// `Ok(None)` when the region is too small or too uniform to describe. Errors are reserved
    /// for collaborator failures and end the run.
    fn describe(&mut self, frame: &Self::Frame, detection: &Detection) -> Result<Option<Descriptor>>;

    /// Describe a frame's detections, one result per detection in the same order.
    fn describe_all(
        &mut self,
        frame: &Self::Frame,
        detections: &[Detection],
    ) -> Result<Vec<Option<Descriptor>>> {
        detections.iter().map(|d| self.describe(frame, d)).collect()
    }
}
