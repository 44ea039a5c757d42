use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use miette::{miette, Context, IntoDiagnostic, Result};
use shared::jobs::RenderBatch;
use shared::paths::{parse_with_base_directory_prefix, resolve_blend_relative_path};
use tracing::{debug, info};

use crate::cli::BatchSource;

/// A loaded batch with its `%BASE%` placeholders resolved and command-line overrides applied.
#[derive(Clone, Debug)]
pub struct ResolvedBatch {
    pub batch: RenderBatch,

    pub project_file_path: PathBuf,

    /// Directory `//` host paths are relative to.
    pub project_directory: PathBuf,

    /// The output directory as the host sees it (may still be `//`-relative).
    pub output_directory: String,
}

impl ResolvedBatch {
    pub fn load(source: &BatchSource) -> Result<Self> {
        let mut batch = RenderBatch::load_from_file(&source.batch_file_path)
            .wrap_err_with(|| miette!("Could not load batch file {:?}.", source.batch_file_path))?;

        if let Some(tick_interval_ms) = source.tick_interval_ms {
            batch.timing.tick_interval_ms = tick_interval_ms;
        }
        if let Some(frame_delay_ms) = source.frame_delay_ms {
            batch.timing.frame_delay_ms = frame_delay_ms;
        }
        batch.validate()?;

        Self::resolve(batch, source.base_directory_path.as_deref())
    }

    pub fn resolve(batch: RenderBatch, base_directory: Option<&Path>) -> Result<Self> {
        let project_file_path =
            parse_with_base_directory_prefix(&batch.project_file_path, base_directory)?;

        let project_directory = project_file_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let output_directory =
            parse_with_base_directory_prefix(&batch.output_directory_path, base_directory)?
                .to_string_lossy()
                .to_string();

        debug!(
            project_file = ?project_file_path,
            output_directory = %output_directory,
            "Resolved batch paths."
        );

        Ok(Self {
            batch,
            project_file_path,
            project_directory,
            output_directory,
        })
    }

    /// The output directory on the local filesystem.
    pub fn local_output_directory(&self) -> PathBuf {
        resolve_blend_relative_path(&self.output_directory, &self.project_directory)
    }

    pub fn ensure_output_directory_exists(&self) -> Result<()> {
        let output_directory = self.local_output_directory();

        if !output_directory.exists() {
            info!(path = ?output_directory, "Creating missing output directory.");
            create_dir_all(&output_directory)
                .into_diagnostic()
                .wrap_err_with(|| miette!("Could not create missing directories."))?;
        }

        Ok(())
    }
}
