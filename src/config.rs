use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, TrackerError};

/// Tracking thresholds. Every field is a tunable number, none of them switches behaviour.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[derive(clap::Parser)]
#[serde(default)]
pub struct Config {
    /// Seed of the synthetic detection source
    #[clap(long, default_value = "0")]
    pub seed: u64,

    /// Max pixel distance between a detection and a track's averaged position
    #[clap(long, default_value = "23")]
    pub spatial_threshold: f64,

    /// Average descriptor distance must be below this to accept a match
    #[clap(long, default_value = "35")]
    pub descriptor_threshold: f64,

    /// Only replace a track's descriptor when the match is below this distance
    #[clap(long, default_value = "18")]
    pub update_descriptor_threshold: f64,

    /// A track must be matched in at least this many frames to be counted
    #[clap(long, default_value = "16")]
    pub min_persistence: u32,

    /// Forget a track after this many frames without a match
    #[clap(long, default_value = "4")]
    pub max_idle: u64,

    /// Number of recent positions averaged into a track's reference position
    #[clap(long, default_value = "5")]
    pub position_window: usize,

    /// Minimum number of descriptor pairs for a comparison to be usable
    #[clap(long, default_value = "6")]
    pub min_match_count: usize,

    /// Detections with a smaller radius are dropped as noise
    #[clap(long, default_value = "10")]
    pub min_radius: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: 0,
            spatial_threshold: 23.,
            descriptor_threshold: 35.,
            update_descriptor_threshold: 18.,
            min_persistence: 16,
            max_idle: 4,
            position_window: 5,
            min_match_count: 6,
            min_radius: 10.,
        }
    }
}

impl Config {
    /// Load a config from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Config> {
        let file = File::open(path)?;
        let config: Config = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.position_window == 0 {
            return Err(TrackerError::invalid_config("position window must hold at least one position"));
        }
        if self.min_match_count == 0 {
            return Err(TrackerError::invalid_config("min match count must be at least 1"));
        }
        if !(self.spatial_threshold >= 0.) {
            return Err(TrackerError::invalid_config(format!(
                "spatial threshold must be non-negative, got {}",
                self.spatial_threshold
            )));
        }
        if self.update_descriptor_threshold > self.descriptor_threshold {
            return Err(TrackerError::invalid_config(format!(
                "update threshold {} is looser than the acceptance threshold {}",
                self.update_descriptor_threshold, self.descriptor_threshold
            )));
        }
        Ok(())
    }
}
