use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::{miette, Result};
use shared::errors::HostError;
use shared::formats::ImageFormat;
use shared::paths::resolve_blend_relative_path;
use tracing::trace;

use crate::events::{DeferredAction, HostEventQueue, RenderOutcome, SchedulerEvent};
use crate::host::{HostRenderGateway, RenderMode};
use crate::scheduler::{JobScheduler, SchedulerStatus};

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SubmittedRender {
    pub camera: Option<String>,
    pub frame: i64,
    pub output_path: String,
    pub mode: RenderMode,
    /// Whether a post-render callback was armed when the render was submitted.
    pub post_render_armed: bool,
}

/// Every gateway call the simulated host received, in order.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum HostCall {
    SubmitRender(SubmittedRender),
    RegisterPostRenderCallback,
    RegisterCancelCallback,
    UnregisterCancelCallback,
    RegisterTickSource(Duration),
    UnregisterTickSource,
    ScheduleDeferred {
        action: DeferredAction,
        delay: Duration,
    },
    SetOutputPath(String),
    SetCamera(Option<String>),
    SetFrame(i64),
}


/// A host with a virtual clock and no renderer.
///
/// Renders "complete" after `render_duration` of virtual time and mark their output file
/// (output path + format extension) as existing. Failures and user cancellation can be injected
/// for a chosen render submission (0-based).
pub struct SimulatedHost {
    now: Duration,

    events: HostEventQueue,

    camera: Option<String>,

    frame: i64,

    output_path: String,

    image_format: ImageFormat,

    overwrite_enabled: bool,

    known_cameras: Option<HashSet<String>>,

    existing_files: HashSet<PathBuf>,

    existing_directories: HashSet<PathBuf>,

    /// Also consult the real filesystem (with `//` paths resolved against this directory).
    filesystem_root: Option<PathBuf>,

    render_duration: Duration,

    reject_submission: Option<usize>,

    fail_render: Option<usize>,

    cancel_render: Option<usize>,

    submissions: usize,

    calls: Vec<HostCall>,
}

impl SimulatedHost {
    pub fn new<S: Into<String>>(output_path: S) -> Self {
        Self {
            now: Duration::ZERO,
            events: HostEventQueue::new(),
            camera: None,
            frame: 1,
            output_path: output_path.into(),
            image_format: ImageFormat::Png,
            overwrite_enabled: true,
            known_cameras: None,
            existing_files: HashSet::new(),
            existing_directories: HashSet::new(),
            filesystem_root: None,
            render_duration: Duration::from_secs(2),
            reject_submission: None,
            fail_render: None,
            cancel_render: None,
            submissions: 0,
            calls: Vec::new(),
        }
    }

    pub fn with_image_format(mut self, image_format: ImageFormat) -> Self {
        self.image_format = image_format;
        self
    }

    pub fn with_overwrite_enabled(mut self, overwrite_enabled: bool) -> Self {
        self.overwrite_enabled = overwrite_enabled;
        self
    }

    pub fn with_scene_camera<S: Into<String>>(mut self, camera: S) -> Self {
        self.camera = Some(camera.into());
        self
    }

    pub fn with_scene_frame(mut self, frame: i64) -> Self {
        self.frame = frame;
        self
    }

    /// Restricts `set_camera` to these camera names.
    pub fn with_known_cameras<I, S>(mut self, cameras: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_cameras = Some(cameras.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_existing_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.existing_files.insert(path.into());
        self
    }

    pub fn with_existing_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.existing_directories.insert(path.into());
        self
    }

    pub fn with_filesystem_root<P: Into<PathBuf>>(mut self, project_directory: P) -> Self {
        self.filesystem_root = Some(project_directory.into());
        self
    }

    pub fn with_render_duration(mut self, render_duration: Duration) -> Self {
        self.render_duration = render_duration;
        self
    }

    pub fn rejecting_submission(mut self, submission: usize) -> Self {
        self.reject_submission = Some(submission);
        self
    }

    pub fn failing_render(mut self, submission: usize) -> Self {
        self.fail_render = Some(submission);
        self
    }

    pub fn cancelling_render(mut self, submission: usize) -> Self {
        self.cancel_render = Some(submission);
        self
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    pub fn submitted_renders(&self) -> Vec<&SubmittedRender> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                HostCall::SubmitRender(render) => Some(render),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> &HostEventQueue {
        &self.events
    }

    /// Advances the virtual clock to the next due event and returns it.
    /// `None` once nothing is left to deliver.
    pub fn next_event(&mut self) -> Option<SchedulerEvent> {
        loop {
            if let Some(event) = self.events.pop_due(self.now) {
                return Some(event);
            }

            let deadline = self.events.next_deadline()?;
            self.now = self.now.max(deadline);
        }
    }

    /// Executes the scheduler and feeds it events until it stops.
    pub fn run(&mut self, scheduler: &mut JobScheduler) -> Result<SchedulerStatus> {
        let mut status = scheduler.execute(self);

        while status == SchedulerStatus::Running {
            let event = self
                .next_event()
                .ok_or_else(|| miette!("No more host events, but the scheduler is still running."))?;

            let is_tick = event == SchedulerEvent::Tick;
            let calls_before = self.calls.len();

            trace!(now = ?self.now, event = ?event, "Delivering simulated host event.");
            status = scheduler.handle_event(self, event);

            // Only events move a running job forward. A tick that changed nothing while no
            // event is queued would be followed by the same tick forever.
            if is_tick
                && status == SchedulerStatus::Running
                && self.calls.len() == calls_before
                && !self.events.has_pending_events()
            {
                return Err(miette!(
                    "Scheduler stalled at {:?}: a job is running, but no host event is pending.",
                    self.now
                ));
            }
        }

        Ok(status)
    }

    fn probe_filesystem(&self, path: &Path) -> Option<PathBuf> {
        let root = self.filesystem_root.as_ref()?;
        Some(resolve_blend_relative_path(&path.to_string_lossy(), root))
    }
}

impl HostRenderGateway for SimulatedHost {
    fn submit_render(&mut self, mode: RenderMode) -> Result<(), HostError> {
        let submission = self.submissions;
        self.submissions += 1;

        let render = SubmittedRender {
            camera: self.camera.clone(),
            frame: self.frame,
            output_path: self.output_path.clone(),
            mode,
            post_render_armed: self.events.is_post_render_armed(),
        };
        self.calls.push(HostCall::SubmitRender(render));

        let camera = self.camera.clone().unwrap_or_default();

        if self.reject_submission == Some(submission) {
            return Err(HostError::SubmitFailed {
                camera,
                frame: self.frame,
                reason: "submission rejected by simulated host".to_string(),
            });
        }

        let finished_at = self.now + self.render_duration;

        let outcome = if self.cancel_render == Some(submission) {
            RenderOutcome::Cancelled
        } else if self.fail_render == Some(submission) {
            RenderOutcome::Failed(HostError::RenderFailed {
                camera,
                frame: self.frame,
                reason: "render failed in simulated host".to_string(),
            })
        } else {
            self.existing_files.insert(PathBuf::from(
                self.image_format.apply_extension(&self.output_path),
            ));
            RenderOutcome::Completed
        };

        self.events.render_finished(finished_at, outcome);
        Ok(())
    }

    fn register_post_render_callback(&mut self) {
        self.calls.push(HostCall::RegisterPostRenderCallback);
        self.events.arm_post_render();
    }

    fn register_cancel_callback(&mut self) {
        self.calls.push(HostCall::RegisterCancelCallback);
        self.events.arm_cancel();
    }

    fn unregister_cancel_callback(&mut self) {
        self.calls.push(HostCall::UnregisterCancelCallback);
        self.events.disarm_cancel();
    }

    fn register_tick_source(&mut self, interval: Duration) {
        self.calls.push(HostCall::RegisterTickSource(interval));
        self.events.register_tick_source(self.now, interval);
    }

    fn unregister_tick_source(&mut self) {
        self.calls.push(HostCall::UnregisterTickSource);
        self.events.unregister_tick_source();
    }

    fn schedule_deferred(&mut self, action: DeferredAction, delay: Duration) {
        self.calls.push(HostCall::ScheduleDeferred { action, delay });
        self.events.schedule_deferred(self.now, action, delay);
    }

    fn output_path(&self) -> String {
        self.output_path.clone()
    }

    fn set_output_path(&mut self, path: &str) {
        self.calls.push(HostCall::SetOutputPath(path.to_string()));
        self.output_path = path.to_string();
    }

    fn camera(&self) -> Option<String> {
        self.camera.clone()
    }

    fn set_camera(&mut self, camera: Option<&str>) -> Result<(), HostError> {
        if let (Some(camera), Some(known_cameras)) = (camera, &self.known_cameras) {
            if !known_cameras.contains(camera) {
                return Err(HostError::UnknownCamera {
                    camera: camera.to_string(),
                });
            }
        }

        self.calls.push(HostCall::SetCamera(camera.map(str::to_string)));
        self.camera = camera.map(str::to_string);
        Ok(())
    }

    fn current_frame(&self) -> i64 {
        self.frame
    }

    fn set_frame(&mut self, frame: i64) {
        self.calls.push(HostCall::SetFrame(frame));
        self.frame = frame;
    }

    fn image_format(&self) -> ImageFormat {
        self.image_format.clone()
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.existing_files.contains(path)
            || self
                .probe_filesystem(path)
                .is_some_and(|resolved| resolved.is_file())
    }

    fn directory_exists(&self, path: &Path) -> bool {
        self.existing_directories.contains(path)
            || self
                .probe_filesystem(path)
                .is_some_and(|resolved| resolved.is_dir())
    }

    fn overwrite_enabled(&self) -> bool {
        self.overwrite_enabled
    }
}
