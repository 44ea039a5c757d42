use std::fs::read_to_string;
use std::path::Path;
use std::time::Duration;

use miette::{miette, Context, IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::formats::ImageFormat;

/// One row of the camera list: which camera to render, which frames, and whether to show a preview.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub struct CameraSetting {
    /// Name of the camera object in the scene.
    pub camera: String,

    /// Frames or frame ranges separated by commas, for example `11,25,250` or `25-40`.
    #[serde(default)]
    pub frame_ranges: String,

    #[serde(default)]
    pub show_preview: bool,
}

impl CameraSetting {
    pub fn new<C: Into<String>, F: Into<String>>(camera: C, frame_ranges: F, show_preview: bool) -> Self {
        Self {
            camera: camera.into(),
            frame_ranges: frame_ranges.into(),
            show_preview,
        }
    }
}


#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub struct BatchTiming {
    /// Interval between scheduler polling ticks.
    #[serde(default = "BatchTiming::default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Delay between finishing (or skipping) one frame and starting the next.
    #[serde(default = "BatchTiming::default_frame_delay_ms")]
    pub frame_delay_ms: u64,
}

impl BatchTiming {
    fn default_tick_interval_ms() -> u64 {
        1000
    }

    fn default_frame_delay_ms() -> u64 {
        1000
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(self.frame_delay_ms)
    }
}

impl Default for BatchTiming {
    fn default() -> Self {
        Self {
            tick_interval_ms: Self::default_tick_interval_ms(),
            frame_delay_ms: Self::default_frame_delay_ms(),
        }
    }
}


/// A batch of per-camera render jobs, usually loaded from a TOML file.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub struct RenderBatch {
    pub batch_name: String,

    pub batch_description: Option<String>,

    pub project_file_path: String,

    /// Directory the frames are written into. Becomes the scene's original output path.
    pub output_directory_path: String,

    #[serde(default)]
    pub output_file_format: ImageFormat,

    /// When `false`, frames whose output file already exists are skipped.
    #[serde(default = "RenderBatch::default_overwrite_existing")]
    pub overwrite_existing: bool,

    #[serde(default)]
    pub timing: BatchTiming,

    #[serde(default)]
    pub cameras: Vec<CameraSetting>,
}

impl RenderBatch {
    fn default_overwrite_existing() -> bool {
        true
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() && !path.is_file() {
            return Err(miette!("Path exists, but it is not a file!"));
        } else if !path.exists() {
            return Err(miette!("No such file: {:?}", path));
        }

        let file_contents = read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| miette!("Could not read batch from file."))?;

        Self::from_toml_str(&file_contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let batch: Self = toml::from_str(contents)
            .into_diagnostic()
            .wrap_err_with(|| miette!("Could not parse TOML contents of batch file."))?;

        batch
            .validate()
            .into_diagnostic()
            .wrap_err_with(|| miette!("Invalid batch \"{}\".", batch.batch_name))?;

        Ok(batch)
    }

    /// Checks the parts of a batch that can be checked without touching the scene.
    /// Frame specifications are not checked here, a malformed one fails only its own job.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::NoCameras);
        }

        if let Some(index) = self
            .cameras
            .iter()
            .position(|setting| setting.camera.trim().is_empty())
        {
            return Err(ConfigError::EmptyCameraName { index });
        }

        if self.timing.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }

        Ok(())
    }
}
