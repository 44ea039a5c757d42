use chrono::{DateTime, Utc};
use miette::{miette, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrameOutcome {
    Rendered,
    /// An output file already existed and overwriting was disabled.
    Skipped,
    Failed { reason: String },
}

#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub struct FrameTrace {
    pub job: usize,
    pub camera: String,
    pub frame: i64,
    pub outcome: FrameOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobOutcome {
    Finished,
    Cancelled,
    Failed { reason: String },
}

#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub struct JobTrace {
    pub job: usize,
    pub camera: String,
    pub outcome: JobOutcome,

    /// Frames still queued when the job stopped (cancellation or failure).
    pub frames_discarded: usize,
}

#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub struct BatchTrace {
    pub batch_start_time: DateTime<Utc>,

    pub batch_finish_time: DateTime<Utc>,

    pub was_cancelled: bool,

    /// Every job that was started, in the order they were started.
    pub jobs: Vec<JobTrace>,

    /// Every consumed frame (in the order they were consumed).
    pub frames: Vec<FrameTrace>,
}

impl BatchTrace {
    pub fn failed_jobs(&self) -> impl Iterator<Item = &JobTrace> {
        self.jobs
            .iter()
            .filter(|job| matches!(job.outcome, JobOutcome::Failed { .. }))
    }
}


#[derive(Clone, Default, Debug)]
pub struct BatchTraceBuilder {
    batch_start_time: Option<DateTime<Utc>>,
    batch_finish_time: Option<DateTime<Utc>>,
    was_cancelled: bool,
    jobs: Vec<JobTrace>,
    frames: Vec<FrameTrace>,
}

impl BatchTraceBuilder {
    pub fn new_empty() -> Self {
        Self::default()
    }

    pub fn build(&self) -> Result<BatchTrace> {
        Ok(BatchTrace {
            batch_start_time: self
                .batch_start_time
                .ok_or_else(|| miette!("Missing batch start time, can't build."))?,
            batch_finish_time: self
                .batch_finish_time
                .ok_or_else(|| miette!("Missing batch finish time, can't build."))?,
            was_cancelled: self.was_cancelled,
            jobs: self.jobs.clone(),
            frames: self.frames.clone(),
        })
    }

    pub fn set_batch_start_time(&mut self, start_time: DateTime<Utc>) {
        self.batch_start_time = Some(start_time);
    }

    pub fn set_batch_finish_time(&mut self, finish_time: DateTime<Utc>) {
        self.batch_finish_time = Some(finish_time);
    }

    pub fn set_cancelled(&mut self) {
        self.was_cancelled = true;
    }

    pub fn trace_frame(&mut self, frame: FrameTrace) {
        self.frames.push(frame);
    }

    pub fn trace_job(&mut self, job: JobTrace) {
        self.jobs.push(job);
    }

    pub fn frames(&self) -> &[FrameTrace] {
        &self.frames
    }

    pub fn jobs(&self) -> &[JobTrace] {
        &self.jobs
    }
}
