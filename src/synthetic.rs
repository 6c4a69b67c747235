use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::descriptor::{Descriptor, DESCRIPTOR_BYTES};
use crate::detection::Detection;
use crate::error::Result;
use crate::my_types::*;
use crate::source::{DetectionSource, ReplayEntry, ReplayFrame};

/// Shape of a generated scene.
#[derive(Clone, Debug)]
pub struct SyntheticScene {
    pub seed: u64,
    pub frames: u64,
    pub objects: usize,
    pub width: f64,
    pub height: f64,
    /// Probability that a visible object is missed by the detector in a frame
    pub miss_rate: f64,
    /// Probability that a detected object's region cannot be described
    pub blank_rate: f64,
    /// Probability of one spurious detection per frame
    pub noise_rate: f64,
}

impl Default for SyntheticScene {
    fn default() -> Self {
        Self {
            seed: 0,
            frames: 300,
            objects: 5,
            width: 640.,
            height: 480.,
            miss_rate: 0.1,
            blank_rate: 0.03,
            noise_rate: 0.2,
        }
    }
}

#[derive(Debug)]
struct SceneObject {
    position: Vector2d,
    velocity: Vector2d,
    radius: f64,
    rows: Vec<[u8; DESCRIPTOR_BYTES]>,
    enter: u64,
    exit: u64,
}

/// Circles drifting across a frame, with detector misses, undescribable regions, jitter and
/// one-frame noise. Deterministic for a given seed.
pub struct SyntheticSource {
    scene: SyntheticScene,
    rng: Xoshiro256PlusPlus,
    objects: Vec<SceneObject>,
    step: u64,
}

fn random_rows(rng: &mut Xoshiro256PlusPlus, count: usize) -> Vec<[u8; DESCRIPTOR_BYTES]> {
    (0..count)
        .map(|_| {
            let mut row = [0u8; DESCRIPTOR_BYTES];
            rng.fill(&mut row[..]);
            row
        })
        .collect()
}

impl SyntheticSource {
    pub fn new(scene: SyntheticScene) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(scene.seed);
        let frames = scene.frames.max(1);
        let objects = (0..scene.objects)
            .map(|_| {
                let radius = rng.gen_range(12.0..40.0);
                let enter = rng.gen_range(0..=frames / 3);
                let exit = rng.gen_range((2 * frames / 3)..=frames);
                SceneObject {
                    position: Vector2d::new(
                        rng.gen_range(radius..(scene.width - radius).max(radius + 1.)),
                        rng.gen_range(radius..(scene.height - radius).max(radius + 1.)),
                    ),
                    velocity: Vector2d::new(rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0)),
                    radius,
                    rows: random_rows(&mut rng, 24),
                    enter,
                    exit,
                }
            })
            .collect();
        SyntheticSource {
            scene,
            rng,
            objects,
            step: 0,
        }
    }

    /// Number of scene objects visible for at least one frame.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn observe(&mut self, object_idx: usize) -> ReplayEntry {
        let object = &self.objects[object_idx];
        let detection = Detection::from_f32(
            (object.position.x + self.rng.gen_range(-1.5..1.5)) as f32,
            (object.position.y + self.rng.gen_range(-1.5..1.5)) as f32,
            (object.radius + self.rng.gen_range(-1.0..1.0)) as f32,
        );
        let descriptor = if self.rng.gen_bool(self.scene.blank_rate) {
            None
        } else {
            // appearance drift: a few bits flipped per row
            let mut rows = object.rows.clone();
            for row in rows.iter_mut() {
                for _ in 0..self.rng.gen_range(0..6) {
                    let bit = self.rng.gen_range(0..DESCRIPTOR_BYTES * 8);
                    row[bit / 8] ^= 1 << (bit % 8);
                }
            }
            Descriptor::new(rows)
        };
        ReplayEntry {
            detection,
            descriptor,
        }
    }

    fn advance(&mut self) {
        let (width, height) = (self.scene.width, self.scene.height);
        for object in self.objects.iter_mut() {
            object.position += object.velocity;
            if object.position.x < object.radius || object.position.x > width - object.radius {
                object.velocity.x = -object.velocity.x;
            }
            if object.position.y < object.radius || object.position.y > height - object.radius {
                object.velocity.y = -object.velocity.y;
            }
        }
    }
}

impl DetectionSource for SyntheticSource {
    type Frame = ReplayFrame;

    fn next_frame(&mut self) -> Result<Option<ReplayFrame>> {
        if self.step >= self.scene.frames {
            return Ok(None);
        }
        let step = self.step;
        self.step += 1;

        let mut entries = vec![];
        for idx in 0..self.objects.len() {
            let visible = self.objects[idx].enter <= step && step < self.objects[idx].exit;
            if visible && !self.rng.gen_bool(self.scene.miss_rate) {
                entries.push(self.observe(idx));
            }
        }
        if self.rng.gen_bool(self.scene.noise_rate) {
            let rows = random_rows(&mut self.rng, 8);
            entries.push(ReplayEntry {
                detection: Detection::new(
                    self.rng.gen_range(0..self.scene.width as i32),
                    self.rng.gen_range(0..self.scene.height as i32),
                    self.rng.gen_range(6..30),
                ),
                descriptor: Descriptor::new(rows),
            });
        }
        self.advance();

        Ok(Some(ReplayFrame {
            label: Some(step + 1),
            entries,
        }))
    }

    fn detect(&mut self, frame: &ReplayFrame) -> Result<Vec<Detection>> {
        Ok(frame.detections())
    }

    fn length(&self) -> Option<u64> {
        Some(self.scene.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(source: &mut SyntheticSource) -> Vec<ReplayFrame> {
        let mut frames = vec![];
        while let Some(frame) = source.next_frame().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_same_seed_same_stream() {
        let scene = SyntheticScene {
            seed: 11,
            frames: 40,
            ..Default::default()
        };
        let a = drain(&mut SyntheticSource::new(scene.clone()));
        let b = drain(&mut SyntheticSource::new(scene));
        assert_eq!(a.len(), 40);
        assert_eq!(a, b);
    }

    #[test]
    fn test_length_and_labels() {
        let mut source = SyntheticSource::new(SyntheticScene {
            frames: 5,
            ..Default::default()
        });
        assert_eq!(source.length(), Some(5));
        let labels: Vec<_> = drain(&mut source).iter().map(|f| f.label).collect();
        assert_eq!(labels, (1..=5).map(Some).collect::<Vec<_>>());
    }
}
