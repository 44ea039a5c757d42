use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// A camera's frame specification could not be expanded into frame numbers.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum FrameSpecError {
    #[error("Invalid frame \"{token}\": not an integer.")]
    #[diagnostic(
        code(frame_spec::invalid_frame),
        help("Frames are separated by commas, for example: 11,25,250")
    )]
    InvalidFrame { token: String },

    #[error("Invalid frame range \"{token}\": expected <start>-<end>.")]
    #[diagnostic(
        code(frame_spec::malformed_range),
        help("Ranges are written as two frame numbers joined by a dash, for example: 25-40")
    )]
    MalformedRange { token: String },

    #[error("Invalid frame range \"{token}\": start frame {start} is after end frame {end}.")]
    #[diagnostic(code(frame_spec::descending_range))]
    DescendingRange {
        token: String,
        start: i64,
        end: i64,
    },

    #[error("Frame range \"{token}\" would bring the camera to more than {max} frames.")]
    #[diagnostic(
        code(frame_spec::too_many_frames),
        help("Check the range for a typo, or split the batch into several cameras.")
    )]
    TooManyFrames { token: String, max: usize },
}


#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("The output path is not a directory: {path:?}")]
    #[diagnostic(code(config::output_path_not_directory))]
    OutputPathNotDirectory { path: PathBuf },

    #[error("Path {path:?} uses the %BASE% placeholder, but no base directory was provided.")]
    #[diagnostic(
        code(config::missing_base_directory),
        help("Pass --baseDirectory on the command line.")
    )]
    MissingBaseDirectory { path: String },

    #[error("The batch does not contain any camera settings.")]
    #[diagnostic(code(config::no_cameras))]
    NoCameras,

    #[error("Camera setting #{index} has an empty camera name.")]
    #[diagnostic(code(config::empty_camera_name))]
    EmptyCameraName { index: usize },

    #[error("The scheduler tick interval must be greater than zero.")]
    #[diagnostic(code(config::zero_tick_interval))]
    ZeroTickInterval,
}


/// Failures reported by the host renderer.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Could not submit render of camera {camera}, frame {frame}: {reason}")]
    #[diagnostic(code(host::submit_failed))]
    SubmitFailed {
        camera: String,
        frame: i64,
        reason: String,
    },

    #[error("Render of camera {camera}, frame {frame} failed: {reason}")]
    #[diagnostic(code(host::render_failed))]
    RenderFailed {
        camera: String,
        frame: i64,
        reason: String,
    },

    #[error("No such camera in the scene: {camera}")]
    #[diagnostic(code(host::unknown_camera))]
    UnknownCamera { camera: String },

    #[error("Render was cancelled.")]
    #[diagnostic(code(host::cancelled))]
    Cancelled,
}


/// Reason a single render job stopped before consuming all of its frames.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    FrameSpec(#[from] FrameSpecError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Host(#[from] HostError),
}


/// Errors aborting the synchronous (single-shot) batch variant.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    FrameSpec(#[from] FrameSpecError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Host(#[from] HostError),
}
