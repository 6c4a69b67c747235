use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::config::Config;
use crate::descriptor::DescriptorProvider;
use crate::detection::filter_min_radius;
use crate::error::Result;
use crate::report::*;
use crate::source::DetectionSource;
use crate::tracker::{FrameOutcome, Tracker};

/// Drives a detection source through the tracker one frame at a time.
pub struct Pipeline {
    tracker: Tracker,
    min_radius: f64,
    max_frames: Option<u64>,
    stop: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        let min_radius = config.min_radius;
        Ok(Self {
            tracker: Tracker::new(config)?,
            min_radius,
            max_frames: None,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Setting the flag ends the run after the frame being processed.
    #[cfg(test)]
    pub(crate) fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Detect, describe and associate one frame.
    pub fn process_frame<S, P>(
        &mut self,
        source: &mut S,
        provider: &mut P,
        frame: &S::Frame,
    ) -> Result<FrameOutcome>
    where
        S: DetectionSource,
        P: DescriptorProvider<Frame = S::Frame>,
    {
        let mut detections = source.detect(frame)?;
        let raw = detections.len();
        filter_min_radius(&mut detections, self.min_radius);
        if detections.len() < raw {
            debug!("{} detections below radius {} dropped", raw - detections.len(), self.min_radius);
        }
        self.tracker.process(frame, &detections, provider)
    }

    /// Run until the source ends, the frame limit is reached or the stop flag is raised.
    /// `on_frame` sees every frame with its outcome, e.g. to draw overlays. Progress is reported
    /// on the caller's span.
    pub fn run<S, P, R, F>(
        &mut self,
        source: &mut S,
        provider: &mut P,
        report: &mut R,
        mut on_frame: F,
    ) -> Result<RunSummary>
    where
        S: DetectionSource,
        P: DescriptorProvider<Frame = S::Frame>,
        R: FrameReportEmitter,
        F: FnMut(&S::Frame, &FrameOutcome) -> Result<()>,
    {
        let mut stopped_early = false;
        loop {
            if self.stop.load(Ordering::SeqCst)
                || self.max_frames.map_or(false, |n| self.tracker.frame_number() >= n)
            {
                stopped_early = true;
                break;
            }
            let Some(frame) = source.next_frame()? else {
                break;
            };

            let outcome = self.process_frame(source, provider, &frame)?;
            report.emit_frame(&FrameRecord {
                frame: outcome.frame_number,
                unique_circles: outcome.unique_count(),
            })?;
            on_frame(&frame, &outcome)?;
            Span::current().pb_inc(1);
        }

        let summary = self.summary(stopped_early);
        info!(
            "tracking complete: {} frames, {} identities, {} persistent circles",
            summary.frames_processed,
            summary.identities_created,
            summary.persistent_count()
        );
        report.finish(&summary)?;
        Ok(summary)
    }

    pub fn summary(&self, stopped_early: bool) -> RunSummary {
        let history = self.tracker.history();
        let persistent = self
            .tracker
            .persistent_ids()
            .into_iter()
            .map(|id| PersistentCircle {
                id,
                appearances: history.count(id).unwrap_or(0),
            })
            .collect();
        RunSummary {
            frames_processed: self.tracker.frame_number(),
            identities_created: self.tracker.total_created(),
            stopped_early,
            persistent,
        }
    }
}
