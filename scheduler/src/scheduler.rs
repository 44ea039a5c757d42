use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use miette::Result;
use shared::errors::JobError;
use shared::jobs::{BatchTiming, CameraSetting, RenderBatch};
use shared::results::batch_trace::{BatchTrace, BatchTraceBuilder};
use tracing::{debug, error, info, warn};

use crate::events::{JobOrdinal, SchedulerEvent};
use crate::host::HostRenderGateway;
use crate::job::RenderJob;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct SchedulerConfig {
    /// How often the host polls the scheduler.
    pub tick_interval: Duration,

    /// Settling delay between consecutive frames of a job.
    pub frame_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        BatchTiming::default().into()
    }
}

impl From<BatchTiming> for SchedulerConfig {
    fn from(value: BatchTiming) -> Self {
        Self {
            tick_interval: value.tick_interval(),
            frame_delay: value.frame_delay(),
        }
    }
}


#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum SchedulerStatus {
    /// Built, but `execute` has not been called yet.
    Idle,
    Running,
    /// Every job ran (successfully or not).
    Finished,
    Cancelled,
}


#[derive(Clone, Eq, PartialEq, Debug)]
pub struct JobFailure {
    pub job: JobOrdinal,
    pub camera: String,
    pub error: JobError,
}


#[derive(Clone, Debug)]
struct SceneSnapshot {
    camera: Option<String>,
    frame: i64,
    output_path: String,
}


/// Runs render jobs one after another, driven by host ticks.
///
/// At most one job is current at any time and it is the only one that talks to the host,
/// so at most one render is outstanding for the whole batch.
pub struct JobScheduler {
    config: SchedulerConfig,

    job_queue: VecDeque<RenderJob>,

    current_job: Option<RenderJob>,

    original_scene: Option<SceneSnapshot>,

    cancel_requested: bool,

    status: SchedulerStatus,

    failures: Vec<JobFailure>,

    trace: BatchTraceBuilder,
}

impl JobScheduler {
    /// One job per camera setting, in list order.
    pub fn new<I>(settings: I, config: SchedulerConfig) -> Self
    where
        I: IntoIterator<Item = CameraSetting>,
    {
        let job_queue = settings
            .into_iter()
            .enumerate()
            .map(|(ordinal, setting)| RenderJob::new(ordinal, setting, config.frame_delay))
            .collect();

        Self {
            config,
            job_queue,
            current_job: None,
            original_scene: None,
            cancel_requested: false,
            status: SchedulerStatus::Idle,
            failures: Vec::new(),
            trace: BatchTraceBuilder::new_empty(),
        }
    }

    pub fn from_batch(batch: &RenderBatch) -> Self {
        Self::new(batch.cameras.iter().cloned(), batch.timing.into())
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status
    }

    pub fn current_job(&self) -> Option<&RenderJob> {
        self.current_job.as_ref()
    }

    pub fn queued_jobs(&self) -> usize {
        self.job_queue.len()
    }

    /// Jobs that stopped because of an error, in the order they failed.
    pub fn failures(&self) -> &[JobFailure] {
        &self.failures
    }

    pub fn trace(&self) -> Result<BatchTrace> {
        self.trace.build()
    }

    /// Remembers the scene's camera, frame and output path, then registers the tick source
    /// and the cancel callback. Jobs are started from subsequent ticks.
    pub fn execute<H: HostRenderGateway + ?Sized>(&mut self, host: &mut H) -> SchedulerStatus {
        if self.status != SchedulerStatus::Idle {
            warn!(status = ?self.status, "Scheduler has already been executed.");
            return self.status;
        }

        self.original_scene = Some(SceneSnapshot {
            camera: host.camera(),
            frame: host.current_frame(),
            output_path: host.output_path(),
        });

        self.trace.set_batch_start_time(Utc::now());

        host.register_cancel_callback();
        host.register_tick_source(self.config.tick_interval);

        self.status = SchedulerStatus::Running;

        info!(
            jobs = self.job_queue.len(),
            tick_interval = ?self.config.tick_interval,
            frame_delay = ?self.config.frame_delay,
            "Render batch started."
        );

        self.status
    }

    /// Handles a single host event. Events arriving after the scheduler stopped are ignored.
    pub fn handle_event<H: HostRenderGateway + ?Sized>(
        &mut self,
        host: &mut H,
        event: SchedulerEvent,
    ) -> SchedulerStatus {
        if self.status != SchedulerStatus::Running {
            debug!(event = ?event, status = ?self.status, "Scheduler not running, ignoring event.");
            return self.status;
        }

        match event {
            SchedulerEvent::Tick => self.on_tick(host),
            SchedulerEvent::RenderComplete => match self.current_job.as_mut() {
                Some(job) => job.on_render_complete(host, &mut self.trace),
                None => warn!("Got a render completion without a current job, ignoring."),
            },
            SchedulerEvent::RenderFailed(error) => match self.current_job.as_mut() {
                Some(job) => job.on_render_failed(host, &mut self.trace, error),
                None => warn!(
                    error = %error,
                    "Got a render failure without a current job, ignoring."
                ),
            },
            SchedulerEvent::RenderCancelled => {
                info!("Render cancelled by user, stopping on next tick.");

                self.cancel_requested = true;
                if let Some(job) = self.current_job.as_mut() {
                    job.cancel();
                }
            }
            SchedulerEvent::Deferred(action) => match self.current_job.as_mut() {
                Some(job) if job.ordinal() == action.job() => {
                    job.on_deferred(action, host, &mut self.trace)
                }
                _ => debug!(action = ?action, "Deferred action for a job that is not current, dropping."),
            },
        }

        self.status
    }

    fn on_tick<H: HostRenderGateway + ?Sized>(&mut self, host: &mut H) {
        let current_job_cancelled = self
            .current_job
            .as_ref()
            .is_some_and(|job| job.is_cancelled());

        if self.cancel_requested || current_job_cancelled {
            self.cancel(host);
            return;
        }

        if self
            .current_job
            .as_ref()
            .is_some_and(|job| job.is_running())
        {
            return;
        }

        if let Some(job) = self.current_job.take() {
            self.retire_job(host, job);
        }

        match self.job_queue.pop_front() {
            Some(mut job) => {
                job.start(host, &mut self.trace);
                self.current_job = Some(job);
            }
            None => {
                info!("All render jobs done.");
                self.stop(host, SchedulerStatus::Finished);
            }
        }
    }

    /// Stops the batch: the current job is finished on the spot (its remaining frames are
    /// discarded) and jobs that never started are dropped.
    pub fn cancel<H: HostRenderGateway + ?Sized>(&mut self, host: &mut H) {
        if self.status != SchedulerStatus::Running {
            return;
        }

        if let Some(mut job) = self.current_job.take() {
            job.cancel();
            self.retire_job(host, job);
        }

        if !self.job_queue.is_empty() {
            warn!(
                jobs_dropped = self.job_queue.len(),
                "Dropping render jobs that never started."
            );
            self.job_queue.clear();
        }

        self.trace.set_cancelled();
        self.stop(host, SchedulerStatus::Cancelled);
    }

    fn retire_job<H: HostRenderGateway + ?Sized>(&mut self, host: &mut H, mut job: RenderJob) {
        if !job.is_finished() {
            job.finish(host, &mut self.trace);
        }

        if let Some(error) = job.failure() {
            self.failures.push(JobFailure {
                job: job.ordinal(),
                camera: job.camera_setting().camera.clone(),
                error: error.clone(),
            });
        }
    }

    fn stop<H: HostRenderGateway + ?Sized>(&mut self, host: &mut H, status: SchedulerStatus) {
        host.unregister_tick_source();
        host.unregister_cancel_callback();

        if let Some(scene) = self.original_scene.take() {
            if let Err(error) = host.set_camera(scene.camera.as_deref()) {
                error!(error = %error, "Could not restore the original camera.");
            }
            host.set_frame(scene.frame);
            host.set_output_path(&scene.output_path);
        }

        self.trace.set_batch_finish_time(Utc::now());
        self.status = status;

        for failure in &self.failures {
            error!(
                job = failure.job,
                camera = %failure.camera,
                error = %failure.error,
                "Render job failed."
            );
        }

        info!(
            status = ?status,
            jobs_failed = self.failures.len(),
            "Render batch stopped."
        );
    }
}
