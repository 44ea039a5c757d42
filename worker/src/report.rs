use std::fs;
use std::path::Path;

use miette::{miette, Context, IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use shared::results::batch_trace::BatchTrace;
use shared::results::performance::BatchPerformance;
use tracing::info;

/// JSON report written after a batch run.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct BatchReport {
    pub batch_name: String,

    pub performance: BatchPerformance,

    pub trace: BatchTrace,
}

impl BatchReport {
    pub fn from_trace<S: Into<String>>(batch_name: S, trace: BatchTrace) -> Result<Self> {
        let performance = BatchPerformance::from_batch_trace(&trace)
            .wrap_err_with(|| miette!("Could not summarize batch performance."))?;

        Ok(Self {
            batch_name: batch_name.into(),
            performance,
            trace,
        })
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        let serialized_report = serde_json::to_string_pretty(self)
            .into_diagnostic()
            .wrap_err_with(|| miette!("Could not serialize batch report."))?;

        fs::write(path, serialized_report)
            .into_diagnostic()
            .wrap_err_with(|| miette!("Could not write batch report to {:?}.", path))?;

        info!(path = ?path, "Saved batch report.");
        Ok(())
    }
}
