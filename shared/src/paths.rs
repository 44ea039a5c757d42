use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

pub const BASE_DIRECTORY_PLACEHOLDER: &str = "%BASE%";

/// Prefix marking a host path as relative to the project file's directory.
pub const BLEND_RELATIVE_PREFIX: &str = "//";

/// Replaces a leading `%BASE%` placeholder with the given base directory.
/// Paths without the placeholder are returned as-is.
pub fn parse_with_base_directory_prefix(
    path: &str,
    base: Option<&Path>,
) -> Result<PathBuf, ConfigError> {
    let Some(prefixless_path) = path.strip_prefix(BASE_DIRECTORY_PLACEHOLDER) else {
        return Ok(PathBuf::from(path));
    };

    let Some(base) = base else {
        return Err(ConfigError::MissingBaseDirectory {
            path: path.to_string(),
        });
    };

    let prefixless_path = prefixless_path
        .strip_prefix('/')
        .or_else(|| prefixless_path.strip_prefix('\\'))
        .unwrap_or(prefixless_path);

    Ok(base.join(prefixless_path))
}

/// Resolves a `//`-prefixed host path against the directory containing the project file.
pub fn resolve_blend_relative_path<P: AsRef<Path>>(path: &str, project_directory: P) -> PathBuf {
    match path.strip_prefix(BLEND_RELATIVE_PREFIX) {
        Some(relative) => project_directory.as_ref().join(relative),
        None => PathBuf::from(path),
    }
}

/// Joins an output directory and an (extension-less) file name the same way
/// a POSIX path join does: no doubled separator, and an empty directory yields just the name.
pub fn join_output_path(directory: &str, file_name: &str) -> String {
    Path::new(directory)
        .join(file_name)
        .to_string_lossy()
        .to_string()
}

/// `<camera>_frame<frame>`, the per-frame output file name (without extension).
pub fn frame_output_file_name(camera: &str, frame: i64) -> String {
    format!("{camera}_frame{frame}")
}
