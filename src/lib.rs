//! Multi-frame tracking of circular objects.
//!
//! Raw circle detections arrive frame by frame with no identity. The [`tracker::Tracker`] gates
//! each one against the live tracks on averaged position and binary descriptor distance, assigns
//! the best match or a new identity, and forgets tracks that stay unmatched for too long. At the
//! end of a stream [`persistence::PersistenceFilter`] keeps the identities seen often enough to be
//! real objects.

pub mod config;
pub mod descriptor;
pub mod detection;
pub mod error;
pub mod my_types;
pub mod persistence;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod synthetic;
pub mod track;
pub mod track_store;
pub mod tracker;

#[cfg(feature = "opencv")]
pub mod vision;
#[cfg(feature = "opencv")]
pub mod visualization;

pub use config::Config;
pub use error::{Result, TrackerError};
pub use pipeline::Pipeline;
pub use tracker::{Assignment, AssignmentKind, FrameOutcome, Tracker};
