mod batch;
mod cli;
mod host;
mod rendering;
mod report;

use std::time::Duration;

use clap::Parser;
use miette::{miette, Context, Result};
use scheduler::scheduler::{JobScheduler, SchedulerStatus};
use scheduler::simulated::SimulatedHost;
use shared::logging::initialize_console_and_file_logging;
use shared::results::batch_trace::FrameOutcome;
use tracing::{info, warn};

use crate::batch::ResolvedBatch;
use crate::cli::{CLIArgs, CLICommand, PlanBatch, RunBatch};
use crate::host::BlenderHost;
use crate::rendering::runner::BlenderFrameRunner;
use crate::report::BatchReport;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CLIArgs::parse();

    let _guard = initialize_console_and_file_logging(args.log_file_path.as_deref(), "info")?;

    match args.command {
        CLICommand::Run(run_args) => run_batch(run_args).await,
        CLICommand::Plan(plan_args) => plan_batch(plan_args),
    }
}

async fn run_batch(args: RunBatch) -> Result<()> {
    info!("Loading batch file.");
    let batch = ResolvedBatch::load(&args.source)?;
    batch.ensure_output_directory_exists()?;

    info!("Initializing BlenderFrameRunner.");
    let runner = BlenderFrameRunner::new(
        args.blender_binary_path,
        args.blender_prepend_arguments,
        args.blender_append_arguments,
        batch.project_file_path.clone(),
    )?;

    let mut host = BlenderHost::new(runner, &batch);

    if args.blocking {
        if args.report_file_path.is_some() {
            warn!("Reports are only written by the scheduled run, ignoring --reportFile.");
        }

        info!(batch = %batch.batch.batch_name, "Rendering batch in blocking mode.");
        let rendered_frames = host.render_blocking(&batch.batch.cameras)?;

        info!(frames = rendered_frames.len(), "Blocking render finished.");
        return Ok(());
    }

    info!(
        batch = %batch.batch.batch_name,
        cameras = batch.batch.cameras.len(),
        "Running render batch."
    );

    let mut scheduler = JobScheduler::from_batch(&batch.batch);
    let status = host.run(&mut scheduler).await?;

    let report = BatchReport::from_trace(&batch.batch.batch_name, scheduler.trace()?)?;
    info!(
        rendered = report.performance.total_frames_rendered,
        skipped = report.performance.total_frames_skipped,
        failed = report.performance.total_frames_failed,
        discarded = report.performance.total_frames_discarded,
        seconds = report.performance.total_time.as_secs_f64(),
        "Batch summary."
    );

    if let Some(report_file_path) = &args.report_file_path {
        report
            .save_to_file(report_file_path)
            .wrap_err_with(|| miette!("Could not save batch report."))?;
    }

    if status == SchedulerStatus::Cancelled {
        return Err(miette!("Render batch was cancelled."));
    }

    if !scheduler.failures().is_empty() {
        return Err(miette!(
            "{} of {} render jobs failed.",
            scheduler.failures().len(),
            batch.batch.cameras.len()
        ));
    }

    Ok(())
}

/// Runs the batch against a simulated host that looks at the real output directory,
/// printing what a real run would do with each frame.
fn plan_batch(args: PlanBatch) -> Result<()> {
    let batch = ResolvedBatch::load(&args.source)?;

    let mut host = SimulatedHost::new(batch.output_directory.clone())
        .with_image_format(batch.batch.output_file_format.clone())
        .with_overwrite_enabled(batch.batch.overwrite_existing)
        .with_filesystem_root(&batch.project_directory)
        .with_render_duration(Duration::ZERO);

    let mut scheduler = JobScheduler::from_batch(&batch.batch);
    host.run(&mut scheduler)?;

    let output_paths: Vec<String> = host
        .submitted_renders()
        .iter()
        .map(|render| render.output_path.clone())
        .collect();
    let mut output_paths = output_paths.into_iter();

    println!("Batch \"{}\":", batch.batch.batch_name);
    for frame in scheduler.trace()?.frames {
        match frame.outcome {
            FrameOutcome::Rendered => println!(
                "  render  {:<16} frame {:>6}  -> {}",
                frame.camera,
                frame.frame,
                output_paths.next().unwrap_or_default()
            ),
            FrameOutcome::Skipped => {
                println!("  skip    {:<16} frame {:>6}", frame.camera, frame.frame)
            }
            FrameOutcome::Failed { reason } => println!(
                "  fail    {:<16} frame {:>6}  ({reason})",
                frame.camera, frame.frame
            ),
        }
    }

    for failure in scheduler.failures() {
        println!("  job {} ({}) fails: {}", failure.job, failure.camera, failure.error);
    }

    Ok(())
}
