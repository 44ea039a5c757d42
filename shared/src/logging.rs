use std::path::Path;

use miette::Result;
use miette::{miette, Context, IntoDiagnostic};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Initialize the console and file logging.
///
/// Console output is filtered by `RUST_LOG`, falling back to `default_directive`
/// (e.g. `"info"`) when the variable is unset or invalid.
/// If `log_output_file_path` is `Some`, the logs will additionally be written (without ANSI colours)
/// to the specified file.
///
/// **IMPORTANT: Retain the returned `Option<WorkerGuard>` in scope, otherwise flushing to file will stop.**
pub fn initialize_console_and_file_logging(
    log_output_file_path: Option<&Path>,
    default_directive: &str,
) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .into_diagnostic()
        .wrap_err_with(|| miette!("Invalid default log directive: {default_directive}"))?;

    let (file_writer, guard) = match log_output_file_path {
        Some(output_path) => {
            let directory = output_path
                .parent()
                .ok_or_else(|| miette!("Could not parse --logFilePath's parent directory path."))?;

            let file_name = output_path
                .file_name()
                .ok_or_else(|| miette!("Could not parse --logFilePath's file name."))?;

            let (non_blocking_appender, guard) = tracing_appender::non_blocking(
                tracing_appender::rolling::never(directory, file_name),
            );

            (Some(non_blocking_appender), Some(guard))
        }
        None => (None, None),
    };


    let console_subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .finish();

    let file_layer = file_writer.map(|writer| {
        tracing_subscriber::fmt::Layer::default()
            .with_ansi(false)
            .with_writer(writer)
    });

    let subscriber = console_subscriber.with(file_layer);


    tracing::subscriber::set_global_default(subscriber)
        .into_diagnostic()
        .wrap_err_with(|| miette!("Failed to set up logging."))?;


    Ok(guard)
}
