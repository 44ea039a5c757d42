use std::path::Path;
use std::time::Duration;

use shared::errors::HostError;
use shared::formats::ImageFormat;

use crate::events::DeferredAction;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum RenderMode {
    /// Let the user follow the render as it happens. What that means is up to the host:
    /// the Blender process host still renders in the background and only streams Blender's
    /// own output to the terminal instead of capturing it.
    Preview,

    /// Render without user-facing output.
    Headless,
}

impl RenderMode {
    pub fn from_show_preview(show_preview: bool) -> Self {
        if show_preview {
            Self::Preview
        } else {
            Self::Headless
        }
    }
}


/// The renderer hosting the scheduler.
///
/// The scheduler never renders anything itself, it only sequences calls into this gateway.
/// Notifications flow back as [`SchedulerEvent`](crate::events::SchedulerEvent)s, which the host
/// hands to [`JobScheduler::handle_event`](crate::scheduler::JobScheduler::handle_event)
/// one at a time.
pub trait HostRenderGateway {
    /// Starts rendering the scene's current camera and frame to the current output path.
    /// For the asynchronous scheduler this must return without waiting for the render to finish.
    fn submit_render(&mut self, mode: RenderMode) -> Result<(), HostError>;

    /// Deliver exactly one `RenderComplete` after the next render finishes.
    fn register_post_render_callback(&mut self);

    /// Deliver `RenderCancelled` whenever the user cancels rendering.
    fn register_cancel_callback(&mut self);

    fn unregister_cancel_callback(&mut self);

    /// Deliver `Tick` every `interval` until unregistered.
    fn register_tick_source(&mut self, interval: Duration);

    fn unregister_tick_source(&mut self);

    /// Hand `action` back as a `Deferred` event once `delay` has passed.
    fn schedule_deferred(&mut self, action: DeferredAction, delay: Duration);

    fn output_path(&self) -> String;

    fn set_output_path(&mut self, path: &str);

    fn camera(&self) -> Option<String>;

    fn set_camera(&mut self, camera: Option<&str>) -> Result<(), HostError>;

    fn current_frame(&self) -> i64;

    fn set_frame(&mut self, frame: i64);

    fn image_format(&self) -> ImageFormat;

    fn file_exists(&self, path: &Path) -> bool;

    fn directory_exists(&self, path: &Path) -> bool;

    /// Whether existing output files may be overwritten. When disabled, frames whose
    /// output file already exists are skipped.
    fn overwrite_enabled(&self) -> bool;
}
