use std::path::PathBuf;
use std::process::Stdio;

use chrono::Utc;
use miette::{miette, Context, IntoDiagnostic, Result};
use scheduler::events::RenderOutcome;
use scheduler::host::RenderMode;
use shared::errors::HostError;
use shared::formats::ImageFormat;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// How many trailing lines of captured Blender output end up in a failure reason.
const FAILURE_OUTPUT_TAIL_LINES: usize = 12;


/// Everything Blender needs to know to render a single frame.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FrameRequest {
    /// Scene camera to render from. `None` keeps the camera saved in the project file.
    pub camera: Option<String>,

    pub frame: i64,

    /// Output path without extension. Blender appends the extension of `image_format`.
    pub output_path: String,

    pub image_format: ImageFormat,

    pub mode: RenderMode,
}

impl FrameRequest {
    fn camera_name(&self) -> String {
        self.camera.clone().unwrap_or_default()
    }
}


/// Renders frames by running Blender in the background, one process per frame.
pub struct BlenderFrameRunner {
    blender_binary_path: PathBuf,

    blender_prepend_arguments: Vec<String>,

    blender_append_arguments: Vec<String>,

    project_file_path: PathBuf,
}

impl BlenderFrameRunner {
    pub fn new(
        blender_binary: PathBuf,
        blender_prepend_arguments: Option<String>,
        blender_append_arguments: Option<String>,
        project_file_path: PathBuf,
    ) -> Result<Self> {
        if !blender_binary.is_file() {
            return Err(miette!("Provided Blender path is not a file."));
        }

        if !project_file_path.is_file() {
            return Err(miette!(
                "Invalid blender project file path: file doesn't exist: {:?}",
                project_file_path
            ));
        }

        let parsed_prepend_arguments = parse_extra_arguments(blender_prepend_arguments)
            .wrap_err_with(|| miette!("Failed to parse prepend arguments."))?;
        let parsed_append_arguments = parse_extra_arguments(blender_append_arguments)
            .wrap_err_with(|| miette!("Failed to parse append arguments."))?;

        debug!(
            prepend = ?parsed_prepend_arguments,
            append = ?parsed_append_arguments,
            "Parsed extra Blender arguments."
        );

        Ok(Self {
            blender_binary_path: blender_binary,
            blender_prepend_arguments: parsed_prepend_arguments,
            blender_append_arguments: parsed_append_arguments,
            project_file_path,
        })
    }

    /// Full argument list for rendering `request`, prepend and append arguments included.
    pub fn build_arguments(&self, request: &FrameRequest) -> Result<Vec<String>> {
        let render_script = build_render_script(request)?;

        let mut blender_args = self.blender_prepend_arguments.clone();
        blender_args.extend([
            self.project_file_path.to_string_lossy().to_string(),
            "--background".to_string(),
            "--python-exit-code".to_string(),
            "1".to_string(),
            "--python-expr".to_string(),
            render_script,
        ]);
        blender_args.extend(self.blender_append_arguments.iter().cloned());

        Ok(blender_args)
    }

    /// Renders one frame and waits for Blender to exit.
    ///
    /// A Blender process killed by a signal (e.g. the user pressing Ctrl-C) counts as a cancelled
    /// render; any other unsuccessful exit is a render failure.
    pub async fn render_frame(&self, request: FrameRequest) -> RenderOutcome {
        match self.run_blender(&request).await {
            Ok(outcome) => outcome,
            Err(error) => RenderOutcome::Failed(HostError::RenderFailed {
                camera: request.camera_name(),
                frame: request.frame,
                reason: error
                    .chain()
                    .map(|cause| cause.to_string())
                    .collect::<Vec<_>>()
                    .join(": "),
            }),
        }
    }

    async fn run_blender(&self, request: &FrameRequest) -> Result<RenderOutcome> {
        let blender_args = self.build_arguments(request)?;
        debug!(arguments = ?blender_args, "Blender arguments.");

        info!(
            camera = ?request.camera,
            frame = request.frame,
            mode = ?request.mode,
            "Starting Blender."
        );

        let mut command = Command::new(&self.blender_binary_path);
        command.args(blender_args).kill_on_drop(true);

        let process_start_time = Utc::now();

        let (status, captured_output) = match request.mode {
            RenderMode::Preview => {
                let status = command
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit())
                    .status()
                    .await
                    .into_diagnostic()
                    .wrap_err_with(|| miette!("Failed while executing Blender binary."))?;

                (status, None)
            }
            RenderMode::Headless => {
                let output = command
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .output()
                    .await
                    .into_diagnostic()
                    .wrap_err_with(|| miette!("Failed while executing Blender binary."))?;

                let mut captured = String::from_utf8_lossy(&output.stdout).to_string();
                captured.push_str(&String::from_utf8_lossy(&output.stderr));

                (output.status, Some(captured))
            }
        };

        let elapsed = Utc::now() - process_start_time;

        if status.success() {
            info!(
                camera = ?request.camera,
                frame = request.frame,
                seconds = elapsed.num_milliseconds() as f64 / 1000.0,
                "Blender finished rendering."
            );
            return Ok(RenderOutcome::Completed);
        }

        let Some(exit_code) = status.code() else {
            warn!(frame = request.frame, "Blender was terminated by a signal.");
            return Ok(RenderOutcome::Cancelled);
        };

        let mut reason = format!("Blender exited with code {exit_code}");
        if let Some(captured) = captured_output {
            reason.push_str(":\n");
            reason.push_str(&output_tail(&captured, FAILURE_OUTPUT_TAIL_LINES));
        }

        Ok(RenderOutcome::Failed(HostError::RenderFailed {
            camera: request.camera_name(),
            frame: request.frame,
            reason,
        }))
    }
}


fn parse_extra_arguments(arguments: Option<String>) -> Result<Vec<String>> {
    match arguments {
        Some(arguments) => {
            shlex::split(&arguments).ok_or_else(|| miette!("Invalid quoting in: {arguments}"))
        }
        None => Ok(Vec::new()),
    }
}

/// The Python expression handed to Blender. String values are JSON-quoted,
/// which is also a valid Python string literal.
pub fn build_render_script(request: &FrameRequest) -> Result<String> {
    let mut lines = vec![
        "import bpy".to_string(),
        "scene = bpy.context.scene".to_string(),
    ];

    if let Some(camera) = &request.camera {
        let quoted_camera = serde_json::to_string(camera).into_diagnostic()?;
        lines.push(format!("scene.camera = bpy.data.objects[{quoted_camera}]"));
    }

    let quoted_output_path = serde_json::to_string(&request.output_path).into_diagnostic()?;
    let quoted_format = serde_json::to_string(request.image_format.identifier()).into_diagnostic()?;

    lines.extend([
        format!("scene.frame_set({})", request.frame),
        format!("scene.render.filepath = {quoted_output_path}"),
        format!("scene.render.image_settings.file_format = {quoted_format}"),
        "bpy.ops.render.render(write_still=True)".to_string(),
    ]);

    Ok(lines.join("\n"))
}

fn output_tail(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}


#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn request() -> FrameRequest {
        FrameRequest {
            camera: Some("CamA".to_string()),
            frame: 5,
            output_path: "//renders/CamA_frame5".to_string(),
            image_format: ImageFormat::OpenExr,
            mode: RenderMode::Headless,
        }
    }

    #[test]
    fn render_script_selects_camera_frame_and_output() {
        let script = build_render_script(&request()).unwrap();

        assert_eq!(
            script,
            [
                "import bpy",
                "scene = bpy.context.scene",
                "scene.camera = bpy.data.objects[\"CamA\"]",
                "scene.frame_set(5)",
                "scene.render.filepath = \"//renders/CamA_frame5\"",
                "scene.render.image_settings.file_format = \"OPEN_EXR\"",
                "bpy.ops.render.render(write_still=True)",
            ]
            .join("\n")
        );
    }

    #[test]
    fn render_script_quotes_awkward_names_and_keeps_scene_camera() {
        let mut request = request();
        request.camera = None;
        request.output_path = "C:\\renders\\\"quoted\"".to_string();

        let script = build_render_script(&request).unwrap();

        assert!(!script.contains("scene.camera"));
        assert!(script.contains(r#"scene.render.filepath = "C:\\renders\\\"quoted\"""#));
    }

    #[test]
    fn arguments_wrap_extra_arguments_around_the_render_invocation() {
        let directory = tempfile::tempdir().unwrap();
        let blender_binary = directory.path().join("blender");
        let project_file = directory.path().join("scene.blend");
        fs::write(&blender_binary, b"").unwrap();
        fs::write(&project_file, b"").unwrap();

        let runner = BlenderFrameRunner::new(
            blender_binary,
            Some("--factory-startup".to_string()),
            Some("-- --cycles-device 'CUDA+CPU'".to_string()),
            project_file.clone(),
        )
        .unwrap();

        let arguments = runner.build_arguments(&request()).unwrap();

        assert_eq!(arguments[0], "--factory-startup");
        assert_eq!(arguments[1], project_file.to_string_lossy());
        assert_eq!(
            &arguments[2..6],
            &["--background", "--python-exit-code", "1", "--python-expr"]
        );
        assert_eq!(arguments[6], build_render_script(&request()).unwrap());
        assert_eq!(&arguments[7..], &["--", "--cycles-device", "CUDA+CPU"]);
    }

    #[test]
    fn preview_mode_still_renders_in_the_background() {
        let directory = tempfile::tempdir().unwrap();
        let blender_binary = directory.path().join("blender");
        let project_file = directory.path().join("scene.blend");
        fs::write(&blender_binary, b"").unwrap();
        fs::write(&project_file, b"").unwrap();

        let runner = BlenderFrameRunner::new(blender_binary, None, None, project_file).unwrap();

        let mut preview_request = request();
        preview_request.mode = RenderMode::Preview;

        let preview_arguments = runner.build_arguments(&preview_request).unwrap();
        assert!(preview_arguments.iter().any(|argument| argument == "--background"));
        assert_eq!(preview_arguments, runner.build_arguments(&request()).unwrap());
    }

    #[test]
    fn runner_rejects_missing_files_and_bad_quoting() {
        let directory = tempfile::tempdir().unwrap();
        let blender_binary = directory.path().join("blender");
        let project_file = directory.path().join("scene.blend");
        fs::write(&blender_binary, b"").unwrap();

        assert!(BlenderFrameRunner::new(
            blender_binary.clone(),
            None,
            None,
            project_file.clone()
        )
        .is_err());

        fs::write(&project_file, b"").unwrap();
        assert!(BlenderFrameRunner::new(
            blender_binary,
            Some("\"unterminated".to_string()),
            None,
            project_file
        )
        .is_err());
    }

    #[test]
    fn failure_reason_keeps_only_the_output_tail() {
        let output = (1..=20).map(|line| line.to_string()).collect::<Vec<_>>().join("\n");

        assert_eq!(output_tail(&output, 3), "18\n19\n20");
        assert_eq!(output_tail("only line", 3), "only line");
    }
}
