use std::time::Duration;

use chrono::{DateTime, Utc};
use miette::{miette, Context, IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};

use crate::results::batch_trace::{BatchTrace, FrameOutcome};

#[serde_as]
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct BatchPerformance {
    pub total_frames_rendered: usize,

    pub total_frames_skipped: usize,

    pub total_frames_failed: usize,

    /// Frames dropped from the queue because their job was cancelled or failed.
    pub total_frames_discarded: usize,

    pub total_jobs_failed: usize,

    /// Total batch run time.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub total_time: Duration,

    /// Total time between render submission and render completion.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub total_rendering_time: Duration,

    /// Total time spent not rendering (settling delays, skipped frames, polling).
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub total_idle_time: Duration,
}

fn duration_between(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    what: &'static str,
) -> Result<Duration> {
    (to - from)
        .to_std()
        .into_diagnostic()
        .wrap_err_with(|| miette!("Could not calculate {what}."))
}

impl BatchPerformance {
    pub fn from_batch_trace(trace: &BatchTrace) -> Result<Self> {
        let count_frames = |predicate: fn(&FrameOutcome) -> bool| {
            trace
                .frames
                .iter()
                .filter(|frame| predicate(&frame.outcome))
                .count()
        };

        let total_frames_rendered = count_frames(|outcome| *outcome == FrameOutcome::Rendered);
        let total_frames_skipped = count_frames(|outcome| *outcome == FrameOutcome::Skipped);
        let total_frames_failed =
            count_frames(|outcome| matches!(outcome, FrameOutcome::Failed { .. }));

        let total_frames_discarded = trace.jobs.iter().map(|job| job.frames_discarded).sum();
        let total_jobs_failed = trace.failed_jobs().count();

        let total_time = duration_between(
            trace.batch_start_time,
            trace.batch_finish_time,
            "total batch time",
        )?;

        let mut total_rendering_time = Duration::new(0, 0);
        for frame in trace
            .frames
            .iter()
            .filter(|frame| frame.outcome != FrameOutcome::Skipped)
        {
            total_rendering_time +=
                duration_between(frame.started_at, frame.finished_at, "rendering time")?;
        }

        let total_idle_time = total_time.saturating_sub(total_rendering_time);

        Ok(Self {
            total_frames_rendered,
            total_frames_skipped,
            total_frames_failed,
            total_frames_discarded,
            total_jobs_failed,
            total_time,
            total_rendering_time,
            total_idle_time,
        })
    }
}


#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::results::batch_trace::{FrameTrace, JobOutcome, JobTrace};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn frame(frame: i64, outcome: FrameOutcome, started: i64, finished: i64) -> FrameTrace {
        FrameTrace {
            job: 0,
            camera: "CamA".to_string(),
            frame,
            outcome,
            started_at: at(started),
            finished_at: at(finished),
        }
    }

    #[test]
    fn summarizes_rendered_skipped_and_discarded_frames() {
        let trace = BatchTrace {
            batch_start_time: at(0),
            batch_finish_time: at(20),
            was_cancelled: false,
            jobs: vec![
                JobTrace {
                    job: 0,
                    camera: "CamA".to_string(),
                    outcome: JobOutcome::Finished,
                    frames_discarded: 0,
                },
                JobTrace {
                    job: 1,
                    camera: "CamB".to_string(),
                    outcome: JobOutcome::Failed {
                        reason: "boom".to_string(),
                    },
                    frames_discarded: 3,
                },
            ],
            frames: vec![
                frame(1, FrameOutcome::Skipped, 1, 1),
                frame(2, FrameOutcome::Rendered, 2, 7),
                frame(3, FrameOutcome::Rendered, 8, 12),
                frame(
                    5,
                    FrameOutcome::Failed {
                        reason: "boom".to_string(),
                    },
                    13,
                    14,
                ),
            ],
        };

        let performance = BatchPerformance::from_batch_trace(&trace).unwrap();

        assert_eq!(performance.total_frames_rendered, 2);
        assert_eq!(performance.total_frames_skipped, 1);
        assert_eq!(performance.total_frames_failed, 1);
        assert_eq!(performance.total_frames_discarded, 3);
        assert_eq!(performance.total_jobs_failed, 1);
        assert_eq!(performance.total_time, Duration::from_secs(20));
        assert_eq!(performance.total_rendering_time, Duration::from_secs(10));
        assert_eq!(performance.total_idle_time, Duration::from_secs(10));
    }

    #[test]
    fn finish_before_start_is_an_error() {
        let trace = BatchTrace {
            batch_start_time: at(10),
            batch_finish_time: at(0),
            was_cancelled: true,
            jobs: Vec::new(),
            frames: Vec::new(),
        };

        assert!(BatchPerformance::from_batch_trace(&trace).is_err());
    }
}
