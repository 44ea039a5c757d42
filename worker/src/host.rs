use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use miette::{miette, Result};
use scheduler::blocking::{render_batch_blocking, RenderedFrame};
use scheduler::events::{DeferredAction, HostEventQueue, RenderOutcome, SchedulerEvent};
use scheduler::host::{HostRenderGateway, RenderMode};
use scheduler::scheduler::{JobScheduler, SchedulerStatus};
use shared::errors::{BatchError, HostError};
use shared::formats::ImageFormat;
use shared::jobs::CameraSetting;
use shared::paths::resolve_blend_relative_path;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::batch::ResolvedBatch;
use crate::rendering::runner::{BlenderFrameRunner, FrameRequest};

/// Notifications from background tasks back into the host loop.
#[derive(Clone, Debug)]
enum HostMessage {
    RenderFinished(RenderOutcome),
    Interrupted,
}


/// Drives a [`JobScheduler`] against real Blender processes.
///
/// The scene state (camera, frame, output path) lives here and is handed to Blender with each
/// submitted frame. Timers are kept in a [`HostEventQueue`] measured from the host's creation.
pub struct BlenderHost {
    epoch: Instant,

    events: HostEventQueue,

    runner: Arc<BlenderFrameRunner>,

    project_directory: PathBuf,

    camera: Option<String>,

    frame: i64,

    output_path: String,

    image_format: ImageFormat,

    overwrite_enabled: bool,

    /// Whether `submit_render` waits for Blender to exit (the blocking variant).
    blocking_renders: bool,

    message_sender: UnboundedSender<HostMessage>,

    message_receiver: UnboundedReceiver<HostMessage>,

    render_task: Option<JoinHandle<()>>,
}

impl BlenderHost {
    pub fn new(runner: BlenderFrameRunner, batch: &ResolvedBatch) -> Self {
        let (message_sender, message_receiver) = unbounded::<HostMessage>();

        Self {
            epoch: Instant::now(),
            events: HostEventQueue::new(),
            runner: Arc::new(runner),
            project_directory: batch.project_directory.clone(),
            camera: None,
            frame: 1,
            output_path: batch.output_directory.clone(),
            image_format: batch.batch.output_file_format.clone(),
            overwrite_enabled: batch.batch.overwrite_existing,
            blocking_renders: false,
            message_sender,
            message_receiver,
            render_task: None,
        }
    }

    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn local_path(&self, path: &Path) -> PathBuf {
        resolve_blend_relative_path(&path.to_string_lossy(), &self.project_directory)
    }

    fn frame_request(&self, mode: RenderMode) -> FrameRequest {
        FrameRequest {
            camera: self.camera.clone(),
            frame: self.frame,
            output_path: self.output_path.clone(),
            image_format: self.image_format.clone(),
            mode,
        }
    }

    /// Executes the scheduler and feeds it host events until it stops.
    /// Ctrl-C is delivered to the scheduler as a user cancel.
    pub async fn run(&mut self, scheduler: &mut JobScheduler) -> Result<SchedulerStatus> {
        let interrupt_task = tokio::spawn(forward_interrupts(self.message_sender.clone()));

        let mut status = scheduler.execute(self);
        while status == SchedulerStatus::Running {
            let event = self.next_event().await?;

            trace!(now = ?self.now(), event = ?event, "Delivering host event.");
            status = scheduler.handle_event(self, event);
        }

        interrupt_task.abort();

        if let Some(render_task) = self.render_task.take() {
            if !render_task.is_finished() {
                warn!("Scheduler stopped while Blender was still rendering, stopping it.");
                render_task.abort();
            }
        }

        Ok(status)
    }

    /// Renders every setting with the blocking variant, one Blender process after another.
    pub fn render_blocking(
        &mut self,
        settings: &[CameraSetting],
    ) -> Result<Vec<RenderedFrame>, BatchError> {
        self.blocking_renders = true;
        let result = render_batch_blocking(self, settings);
        self.blocking_renders = false;

        result
    }

    async fn next_event(&mut self) -> Result<SchedulerEvent> {
        loop {
            if let Some(event) = self.events.pop_due(self.now()) {
                return Ok(event);
            }

            let deadline = self.events.next_deadline().map(|due| self.epoch + due);

            let message = tokio::select! {
                message = self.message_receiver.next() => Some(message),
                _ = sleep_until_deadline(deadline) => None,
            };

            if let Some(message) = message {
                let message =
                    message.ok_or_else(|| miette!("Host message channel closed unexpectedly."))?;
                self.handle_message(message);
            }
        }
    }

    fn handle_message(&mut self, message: HostMessage) {
        let now = self.now();

        match message {
            HostMessage::RenderFinished(outcome) => {
                debug!(outcome = ?outcome, "Render task finished.");
                self.render_task = None;
                self.events.render_finished(now, outcome);
            }
            HostMessage::Interrupted => {
                if !self.events.is_cancel_armed() {
                    info!("Received interrupt, but no cancel callback is registered, ignoring.");
                    return;
                }

                info!("Received interrupt, cancelling rendering.");
                self.events.user_cancelled(now);
            }
        }
    }

    fn submit_blocking(&mut self, request: FrameRequest) -> Result<(), HostError> {
        let camera = request.camera.clone().unwrap_or_default();
        let frame = request.frame;

        let runner = self.runner.clone();
        let outcome = tokio::task::block_in_place(|| {
            Handle::current().block_on(async move { runner.render_frame(request).await })
        });

        match outcome {
            RenderOutcome::Completed => Ok(()),
            RenderOutcome::Cancelled => {
                warn!(camera = %camera, frame = frame, "Blocking render was cancelled.");
                Err(HostError::Cancelled)
            }
            RenderOutcome::Failed(error) => Err(error),
        }
    }
}

impl HostRenderGateway for BlenderHost {
    fn submit_render(&mut self, mode: RenderMode) -> Result<(), HostError> {
        let request = self.frame_request(mode);

        if self.blocking_renders {
            return self.submit_blocking(request);
        }

        if self.render_task.as_ref().is_some_and(|task| !task.is_finished()) {
            return Err(HostError::SubmitFailed {
                camera: request.camera.unwrap_or_default(),
                frame: request.frame,
                reason: "another render is still in progress".to_string(),
            });
        }

        if !self.events.is_post_render_armed() {
            warn!(
                frame = request.frame,
                "Submitting a render without a post-render callback, its completion will not be reported."
            );
        }

        let runner = self.runner.clone();
        let sender = self.message_sender.clone();

        self.render_task = Some(tokio::spawn(async move {
            let outcome = runner.render_frame(request).await;

            // The receiver only goes away when the host is dropped, nobody is left to notify.
            let _ = sender.unbounded_send(HostMessage::RenderFinished(outcome));
        }));

        Ok(())
    }

    fn register_post_render_callback(&mut self) {
        self.events.arm_post_render();
    }

    fn register_cancel_callback(&mut self) {
        self.events.arm_cancel();
    }

    fn unregister_cancel_callback(&mut self) {
        self.events.disarm_cancel();
    }

    fn register_tick_source(&mut self, interval: Duration) {
        let now = self.now();
        self.events.register_tick_source(now, interval);
    }

    fn unregister_tick_source(&mut self) {
        self.events.unregister_tick_source();
    }

    fn schedule_deferred(&mut self, action: DeferredAction, delay: Duration) {
        let now = self.now();
        self.events.schedule_deferred(now, action, delay);
    }

    fn output_path(&self) -> String {
        self.output_path.clone()
    }

    fn set_output_path(&mut self, path: &str) {
        self.output_path = path.to_string();
    }

    fn camera(&self) -> Option<String> {
        self.camera.clone()
    }

    fn set_camera(&mut self, camera: Option<&str>) -> Result<(), HostError> {
        self.camera = camera.map(str::to_string);
        Ok(())
    }

    fn current_frame(&self) -> i64 {
        self.frame
    }

    fn set_frame(&mut self, frame: i64) {
        self.frame = frame;
    }

    fn image_format(&self) -> ImageFormat {
        self.image_format.clone()
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.local_path(path).is_file()
    }

    fn directory_exists(&self, path: &Path) -> bool {
        self.local_path(path).is_dir()
    }

    fn overwrite_enabled(&self) -> bool {
        self.overwrite_enabled
    }
}


async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

async fn forward_interrupts(sender: UnboundedSender<HostMessage>) {
    loop {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "Could not listen for interrupts.");
            return;
        }

        if sender.unbounded_send(HostMessage::Interrupted).is_err() {
            return;
        }
    }
}
