use std::path::Path;

use shared::errors::{BatchError, ConfigError};
use shared::jobs::CameraSetting;
use shared::paths::{frame_output_file_name, join_output_path};
use tracing::{error, info};

use crate::frames::expand_frame_spec;
use crate::host::{HostRenderGateway, RenderMode};

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RenderedFrame {
    pub camera: String,
    pub frame: i64,
    pub output_path: String,
}

/// Renders every camera setting's frames in one go, without yielding to the host in between.
///
/// `submit_render` is expected to return only once the frame has been written. Unlike the
/// asynchronous scheduler this never skips existing files and refuses to start unless the
/// scene's output path is an existing directory.
/// The scene's camera, frame and output path are restored whether rendering succeeds or not.
pub fn render_batch_blocking<H: HostRenderGateway + ?Sized>(
    host: &mut H,
    settings: &[CameraSetting],
) -> Result<Vec<RenderedFrame>, BatchError> {
    let original_camera = host.camera();
    let original_frame = host.current_frame();
    let original_output_path = host.output_path();

    if !host.directory_exists(Path::new(&original_output_path)) {
        error!(path = %original_output_path, "The output path is not a directory.");
        return Err(ConfigError::OutputPathNotDirectory {
            path: original_output_path.into(),
        }
        .into());
    }

    let result = render_all_settings(host, settings, &original_output_path);

    if let Err(error) = host.set_camera(original_camera.as_deref()) {
        error!(error = %error, "Could not restore the original camera.");
    }
    host.set_frame(original_frame);
    host.set_output_path(&original_output_path);

    result
}

fn render_all_settings<H: HostRenderGateway + ?Sized>(
    host: &mut H,
    settings: &[CameraSetting],
    original_output_path: &str,
) -> Result<Vec<RenderedFrame>, BatchError> {
    let mut rendered_frames = Vec::new();

    for setting in settings {
        host.set_camera(Some(&setting.camera))?;

        let frames = expand_frame_spec(&setting.frame_ranges)?;
        let mode = RenderMode::from_show_preview(setting.show_preview);

        for frame in frames {
            let output_path = join_output_path(
                original_output_path,
                &frame_output_file_name(&setting.camera, frame),
            );

            host.set_frame(frame);
            host.set_output_path(&output_path);
            host.submit_render(mode)?;

            info!(camera = %setting.camera, frame = frame, path = %output_path, "Rendered frame.");

            rendered_frames.push(RenderedFrame {
                camera: setting.camera.clone(),
                frame,
                output_path,
            });
        }
    }

    Ok(rendered_frames)
}
