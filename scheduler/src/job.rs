use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::errors::{HostError, JobError};
use shared::jobs::CameraSetting;
use shared::paths::{frame_output_file_name, join_output_path};
use shared::results::batch_trace::{
    BatchTraceBuilder,
    FrameOutcome,
    FrameTrace,
    JobOutcome,
    JobTrace,
};
use tracing::{debug, error, info, warn};

use crate::events::{DeferredAction, JobOrdinal};
use crate::frames::expand_frame_spec;
use crate::host::{HostRenderGateway, RenderMode};

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum JobPhase {
    /// Not started yet, or waiting for the next frame to be advanced to.
    Idle,

    /// The last frame was skipped because its output already exists.
    Skipping { frame: i64 },

    /// A render of `frame` has been submitted and not yet completed.
    Rendering {
        frame: i64,
        submitted_at: DateTime<Utc>,
    },

    Finished,
}


/// Renders one camera's frames, one at a time.
///
/// All progress is driven from the outside: the scheduler calls `start` once, then forwards
/// render completions and the job's own deferred actions to it.
pub struct RenderJob {
    ordinal: JobOrdinal,

    setting: CameraSetting,

    frame_delay: Duration,

    pending_frames: VecDeque<i64>,

    expanded: bool,

    running: bool,

    cancelled: bool,

    saved_output_path: Option<String>,

    phase: JobPhase,

    failure: Option<JobError>,

    advance_passes: usize,
}

impl RenderJob {
    pub fn new(ordinal: JobOrdinal, setting: CameraSetting, frame_delay: Duration) -> Self {
        Self {
            ordinal,
            setting,
            frame_delay,
            pending_frames: VecDeque::new(),
            expanded: false,
            running: false,
            cancelled: false,
            saved_output_path: None,
            phase: JobPhase::Idle,
            failure: None,
            advance_passes: 0,
        }
    }

    pub fn ordinal(&self) -> JobOrdinal {
        self.ordinal
    }

    pub fn camera_setting(&self) -> &CameraSetting {
        &self.setting
    }

    pub fn pending_frames(&self) -> &VecDeque<i64> {
        &self.pending_frames
    }

    pub fn phase(&self) -> &JobPhase {
        &self.phase
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_finished(&self) -> bool {
        self.phase == JobPhase::Finished
    }

    pub fn failure(&self) -> Option<&JobError> {
        self.failure.as_ref()
    }

    /// How many times the job has tried to advance to a next frame
    /// (once per consumed frame, plus the pass that found the queue empty).
    pub fn advance_passes(&self) -> usize {
        self.advance_passes
    }

    pub fn saved_output_path(&self) -> Option<&str> {
        self.saved_output_path.as_deref()
    }

    /// Saves the scene's output path, expands the frame specification and advances to the first frame.
    /// Frames are expanded only once; starting a job twice does nothing.
    pub fn start<H: HostRenderGateway + ?Sized>(
        &mut self,
        host: &mut H,
        trace: &mut BatchTraceBuilder,
    ) {
        if self.expanded {
            warn!(job = self.ordinal, "Render job has already been started, ignoring.");
            return;
        }
        self.expanded = true;

        self.saved_output_path = Some(host.output_path());

        info!(
            job = self.ordinal,
            camera = %self.setting.camera,
            frame_ranges = %self.setting.frame_ranges,
            "Starting render job."
        );

        match expand_frame_spec(&self.setting.frame_ranges) {
            Ok(frames) => {
                debug!(job = self.ordinal, frames = ?frames, "Expanded frame ranges.");
                self.pending_frames = frames.into();
            }
            Err(error) => {
                self.fail(host, trace, error.into());
                return;
            }
        }

        self.advance_one_frame(host, trace);
    }

    /// Consumes the next pending frame: either skips it (existing output, overwriting disabled)
    /// or submits a render for it. Finishes the job when cancelled or out of frames.
    pub fn advance_one_frame<H: HostRenderGateway + ?Sized>(
        &mut self,
        host: &mut H,
        trace: &mut BatchTraceBuilder,
    ) {
        if self.is_finished() {
            debug!(job = self.ordinal, "Render job already finished, not advancing.");
            return;
        }

        self.advance_passes += 1;

        if self.cancelled {
            self.finish(host, trace);
            return;
        }

        let Some(frame) = self.pending_frames.pop_front() else {
            self.finish(host, trace);
            return;
        };

        let original_output_path = self.saved_output_path.clone().unwrap_or_default();
        let output_path = join_output_path(
            &original_output_path,
            &frame_output_file_name(&self.setting.camera, frame),
        );
        let existing_output_path = host.image_format().apply_extension(&output_path);

        host.schedule_deferred(
            DeferredAction::MarkRunning { job: self.ordinal },
            Duration::ZERO,
        );

        if !host.overwrite_enabled() && host.file_exists(Path::new(&existing_output_path)) {
            info!(
                job = self.ordinal,
                camera = %self.setting.camera,
                frame = frame,
                path = %existing_output_path,
                "Output already exists, skipping frame."
            );

            let now = Utc::now();
            self.trace_frame(trace, frame, FrameOutcome::Skipped, now);
            self.phase = JobPhase::Skipping { frame };

            host.schedule_deferred(
                DeferredAction::AdvanceFrame { job: self.ordinal },
                self.frame_delay,
            );
            return;
        }

        if let Err(error) = host.set_camera(Some(&self.setting.camera)) {
            self.fail_frame(host, trace, frame, Utc::now(), error);
            return;
        }
        host.set_frame(frame);
        host.set_output_path(&output_path);

        host.register_post_render_callback();

        let submitted_at = Utc::now();
        self.phase = JobPhase::Rendering {
            frame,
            submitted_at,
        };

        match host.submit_render(RenderMode::from_show_preview(self.setting.show_preview)) {
            Ok(()) => {
                info!(
                    job = self.ordinal,
                    camera = %self.setting.camera,
                    frame = frame,
                    path = %output_path,
                    "Submitted frame for rendering."
                );
            }
            Err(error) => {
                self.fail_frame(host, trace, frame, submitted_at, error);
            }
        }
    }

    pub fn on_render_complete<H: HostRenderGateway + ?Sized>(
        &mut self,
        host: &mut H,
        trace: &mut BatchTraceBuilder,
    ) {
        let JobPhase::Rendering {
            frame,
            submitted_at,
        } = self.phase
        else {
            warn!(
                job = self.ordinal,
                phase = ?self.phase,
                "Got a render completion while no render was outstanding, ignoring."
            );
            return;
        };

        self.trace_frame(trace, frame, FrameOutcome::Rendered, submitted_at);
        self.phase = JobPhase::Idle;

        info!(
            job = self.ordinal,
            camera = %self.setting.camera,
            frame = frame,
            frames_left = self.pending_frames.len(),
            "Frame rendered."
        );

        if self.cancelled {
            return;
        }

        host.schedule_deferred(
            DeferredAction::AdvanceFrame { job: self.ordinal },
            self.frame_delay,
        );
    }

    pub fn on_render_failed<H: HostRenderGateway + ?Sized>(
        &mut self,
        host: &mut H,
        trace: &mut BatchTraceBuilder,
        error: HostError,
    ) {
        let JobPhase::Rendering {
            frame,
            submitted_at,
        } = self.phase
        else {
            warn!(
                job = self.ordinal,
                error = %error,
                "Got a render failure while no render was outstanding, ignoring."
            );
            return;
        };

        self.fail_frame(host, trace, frame, submitted_at, error);
    }

    pub fn on_deferred<H: HostRenderGateway + ?Sized>(
        &mut self,
        action: DeferredAction,
        host: &mut H,
        trace: &mut BatchTraceBuilder,
    ) {
        match action {
            DeferredAction::MarkRunning { .. } => {
                if !self.is_finished() {
                    self.running = true;
                }
            }
            DeferredAction::AdvanceFrame { .. } => self.advance_one_frame(host, trace),
        }
    }

    /// Stops advancing at the next opportunity. A render that is already submitted is left
    /// for the host to cancel.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Clears the running flag and restores the output path saved by `start`.
    /// Frames still pending are discarded.
    pub fn finish<H: HostRenderGateway + ?Sized>(
        &mut self,
        host: &mut H,
        trace: &mut BatchTraceBuilder,
    ) {
        if self.is_finished() {
            return;
        }

        let outcome = match (&self.failure, self.cancelled) {
            (Some(error), _) => JobOutcome::Failed {
                reason: error.to_string(),
            },
            (None, true) => JobOutcome::Cancelled,
            (None, false) => JobOutcome::Finished,
        };

        self.running = false;
        self.phase = JobPhase::Finished;

        if let Some(saved_output_path) = &self.saved_output_path {
            host.set_output_path(saved_output_path);
        }

        let frames_discarded = self.pending_frames.len();
        self.pending_frames.clear();

        if frames_discarded > 0 {
            warn!(
                job = self.ordinal,
                camera = %self.setting.camera,
                frames_discarded = frames_discarded,
                "Render job stopped early, discarding remaining frames."
            );
        }

        info!(
            job = self.ordinal,
            camera = %self.setting.camera,
            outcome = ?outcome,
            "Render job finished."
        );

        trace.trace_job(JobTrace {
            job: self.ordinal,
            camera: self.setting.camera.clone(),
            outcome,
            frames_discarded,
        });
    }

    fn fail<H: HostRenderGateway + ?Sized>(
        &mut self,
        host: &mut H,
        trace: &mut BatchTraceBuilder,
        error: JobError,
    ) {
        error!(
            job = self.ordinal,
            camera = %self.setting.camera,
            error = %error,
            "Render job failed."
        );

        self.failure = Some(error);
        self.finish(host, trace);
    }

    fn fail_frame<H: HostRenderGateway + ?Sized>(
        &mut self,
        host: &mut H,
        trace: &mut BatchTraceBuilder,
        frame: i64,
        started_at: DateTime<Utc>,
        error: HostError,
    ) {
        self.trace_frame(
            trace,
            frame,
            FrameOutcome::Failed {
                reason: error.to_string(),
            },
            started_at,
        );
        self.fail(host, trace, error.into());
    }

    fn trace_frame(
        &self,
        trace: &mut BatchTraceBuilder,
        frame: i64,
        outcome: FrameOutcome,
        started_at: DateTime<Utc>,
    ) {
        trace.trace_frame(FrameTrace {
            job: self.ordinal,
            camera: self.setting.camera.clone(),
            frame,
            outcome,
            started_at,
            finished_at: Utc::now(),
        });
    }
}
