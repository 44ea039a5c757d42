use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "render-batch",
    about = "Renders multiple cameras and frame ranges of a Blender project, one frame at a time."
)]
pub struct CLIArgs {
    #[arg(
        long = "logFilePath",
        global = true,
        help = "Additionally write logs to this file (without colours)."
    )]
    pub log_file_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CLICommand,
}

#[derive(Subcommand, Debug)]
pub enum CLICommand {
    #[command(name = "run", about = "Render the specified batch to completion.")]
    Run(RunBatch),

    #[command(
        name = "plan",
        about = "Show which frames of the batch would be rendered or skipped, without rendering."
    )]
    Plan(PlanBatch),
}

#[derive(Args, Debug, Eq, PartialEq)]
pub struct BatchSource {
    #[arg(help = "Path to the batch file (TOML).")]
    pub batch_file_path: PathBuf,

    #[arg(
        long = "baseDirectory",
        help = "Sets the value of the %BASE% placeholder used in batch files."
    )]
    pub base_directory_path: Option<PathBuf>,

    #[arg(long = "tickIntervalMs", help = "Overrides the batch's scheduler tick interval.")]
    pub tick_interval_ms: Option<u64>,

    #[arg(long = "frameDelayMs", help = "Overrides the batch's delay between frames.")]
    pub frame_delay_ms: Option<u64>,
}

#[derive(Args, Debug, Eq, PartialEq)]
pub struct RunBatch {
    #[command(flatten)]
    pub source: BatchSource,

    #[arg(
        short = 'b',
        long = "blenderBinary",
        help = "Path to the Blender binary to use for rendering."
    )]
    pub blender_binary_path: PathBuf,

    #[arg(
        long = "blenderPrependArguments",
        allow_hyphen_values = true,
        help = "Arguments to insert before the project file (shell-quoted)."
    )]
    pub blender_prepend_arguments: Option<String>,

    #[arg(
        long = "blenderAppendArguments",
        allow_hyphen_values = true,
        help = "Arguments to add after the render invocation (shell-quoted)."
    )]
    pub blender_append_arguments: Option<String>,

    #[arg(
        long = "blocking",
        help = "Render every frame in one go instead of through the tick-driven scheduler."
    )]
    pub blocking: bool,

    #[arg(long = "reportFile", help = "Write a JSON report of the batch to this file.")]
    pub report_file_path: Option<PathBuf>,
}

#[derive(Args, Debug, Eq, PartialEq)]
pub struct PlanBatch {
    #[command(flatten)]
    pub source: BatchSource,
}
